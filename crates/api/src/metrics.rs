use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Prediction metrics, exported through the global meter provider.
///
/// Without a [`common::TelemetryGuard`] the global provider is a no-op.
#[derive(Clone)]
pub struct ApiMetrics {
    predictions: Counter<u64>,
    errors: Counter<u64>,
    detections: Counter<u64>,
    inference_duration: Histogram<f64>,
}

impl ApiMetrics {
    pub fn init(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0, 10.0,
        ];

        Self {
            predictions: meter
                .u64_counter("api_predictions_total")
                .with_description("Predictions served successfully")
                .build(),
            errors: meter
                .u64_counter("api_prediction_errors_total")
                .with_description("Failed prediction requests, by error kind")
                .build(),
            detections: meter
                .u64_counter("api_detections_total")
                .with_description("Total detections returned")
                .build(),
            inference_duration: meter
                .f64_histogram("api_inference_duration_seconds")
                .with_description("Time to run the predictor on one decoded image")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
        }
    }

    pub fn record_success(&self, detections: usize, inference: Duration) {
        self.predictions.add(1, &[]);
        self.detections.add(detections as u64, &[]);
        self.inference_duration.record(inference.as_secs_f64(), &[]);
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors.add(1, &[KeyValue::new("kind", kind)]);
    }
}
