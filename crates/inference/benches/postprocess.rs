use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use inference::processing::{
    post::{PostProcessor, decode_yolo, non_max_suppression},
    pre::PreProcessor,
};
use inference::{RawOutput, Rescale};
use ndarray::{Array, Array2, IxDyn};

/// Mock YOLOv8 head `[1, 4 + nc, anchors]` with `num_detections` confident anchors
fn create_mock_yolo_head(anchors: usize, classes: usize, num_detections: usize) -> Array<f32, IxDyn> {
    let channels = 4 + classes;
    let mut data = vec![0.01f32; channels * anchors];

    for j in 0..num_detections.min(anchors) {
        let offset = (j % 20) as f32 * 30.0;
        data[j] = 100.0 + offset;
        data[anchors + j] = 100.0 + offset;
        data[2 * anchors + j] = 40.0;
        data[3 * anchors + j] = 40.0;
        data[(4 + j % classes) * anchors + j] = 0.9;
    }

    Array::from_shape_vec(IxDyn(&[1, channels, anchors]), data).unwrap()
}

/// Mock generic rows `[n, 6]`, half of them above the threshold
fn create_mock_rows(n: usize) -> Array2<f32> {
    let mut data = Vec::with_capacity(n * 6);
    for i in 0..n {
        let conf = if i % 2 == 0 { 0.9 } else { 0.1 };
        data.extend_from_slice(&[320.0, 320.0, 50.0, 50.0, conf, (i % 3) as f32]);
    }
    Array2::from_shape_vec((n, 6), data).unwrap()
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let preprocessor = PreProcessor::new((640, 640));

    for (width, height) in [(640, 480), (1280, 720), (1920, 1080)] {
        let image = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
        let label = format!("{width}x{height}");

        group.bench_with_input(BenchmarkId::new("lanczos3", &label), &image, |b, image| {
            b.iter(|| preprocessor.preprocess(black_box(image)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("letterbox", &label), &image, |b, image| {
            b.iter(|| preprocessor.letterbox(black_box(image)).unwrap())
        });
    }

    group.finish();
}

fn benchmark_yolo_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("yolo_decode");

    for num_detections in [0, 10, 100] {
        let head = create_mock_yolo_head(8400, 3, num_detections);
        group.bench_with_input(
            BenchmarkId::new("decode_nms", num_detections),
            &head,
            |b, head| {
                b.iter(|| {
                    let candidates = decode_yolo(black_box(head.view()), 0.25).unwrap();
                    non_max_suppression(candidates, 0.7)
                })
            },
        );
    }

    group.finish();
}

fn benchmark_rows_postprocess(c: &mut Criterion) {
    let postprocessor = PostProcessor::new(0.5);
    let rescale = Rescale::between((1920, 1080), (640, 640));
    let rows = create_mock_rows(1000);

    c.bench_function("rows_postprocess_1000", |b| {
        b.iter(|| {
            postprocessor
                .process(RawOutput::Rows(black_box(rows.clone())), &rescale)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_preprocessing,
    benchmark_yolo_decode,
    benchmark_rows_postprocess
);
criterion_main!(benches);
