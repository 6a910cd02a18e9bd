use serde::{Deserialize, Serialize};

/// Prefix for labels of class indices the model does not name.
pub const SYNTHETIC_LABEL_PREFIX: &str = "weed_class_";

/// Label used when a model reports a bare class index.
pub fn class_label(index: i64) -> String {
    format!("{SYNTHETIC_LABEL_PREFIX}{index}")
}

/// One predicted object: a box in original-image pixels, a label and a score.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` with `x1 <= x2` and `y1 <= y2`.
    pub bbox: [f32; 4],
    pub class_name: String,
    /// Always within `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    /// Builds a detection, ordering the box corners and clamping the score.
    pub fn new(bbox: [f32; 4], class_name: impl Into<String>, confidence: f32) -> Self {
        let [ax, ay, bx, by] = bbox;
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            bbox: [ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)],
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// Borrowed view of the `i`-th entry of a [`DetectionResult`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionRef<'a> {
    pub bbox: &'a [f32; 4],
    pub class_name: &'a str,
    pub confidence: f32,
}

/// Normalized prediction output.
///
/// Boxes, classes and confidences are index aligned. The fields are private so
/// the three sequences can only grow together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedResult")]
pub struct DetectionResult {
    boxes: Vec<[f32; 4]>,
    classes: Vec<String>,
    confidences: Vec<f32>,
}

impl DetectionResult {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(capacity),
            classes: Vec::with_capacity(capacity),
            confidences: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, detection: Detection) {
        let Detection {
            bbox,
            class_name,
            confidence,
        } = Detection::new(detection.bbox, detection.class_name, detection.confidence);
        self.boxes.push(bbox);
        self.classes.push(class_name);
        self.confidences.push(confidence);
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[[f32; 4]] {
        &self.boxes
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn confidences(&self) -> &[f32] {
        &self.confidences
    }

    pub fn iter(&self) -> impl Iterator<Item = DetectionRef<'_>> {
        self.boxes
            .iter()
            .zip(&self.classes)
            .zip(&self.confidences)
            .map(|((bbox, class_name), &confidence)| DetectionRef {
                bbox,
                class_name,
                confidence,
            })
    }

    pub fn into_detections(self) -> Vec<Detection> {
        self.boxes
            .into_iter()
            .zip(self.classes)
            .zip(self.confidences)
            .map(|((bbox, class_name), confidence)| Detection {
                bbox,
                class_name,
                confidence,
            })
            .collect()
    }
}

impl FromIterator<Detection> for DetectionResult {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut result = Self::with_capacity(iter.size_hint().0);
        for detection in iter {
            result.push(detection);
        }
        result
    }
}

#[derive(Deserialize)]
struct UncheckedResult {
    boxes: Vec<[f32; 4]>,
    classes: Vec<String>,
    confidences: Vec<f32>,
}

impl TryFrom<UncheckedResult> for DetectionResult {
    type Error = String;

    fn try_from(raw: UncheckedResult) -> Result<Self, Self::Error> {
        if raw.boxes.len() != raw.classes.len() || raw.boxes.len() != raw.confidences.len() {
            return Err(format!(
                "misaligned detection result: {} boxes, {} classes, {} confidences",
                raw.boxes.len(),
                raw.classes.len(),
                raw.confidences.len()
            ));
        }

        Ok(raw
            .boxes
            .into_iter()
            .zip(raw.classes)
            .zip(raw.confidences)
            .map(|((bbox, class_name), confidence)| Detection::new(bbox, class_name, confidence))
            .collect())
    }
}

/// Independent x/y scale factors between model input space and the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Rescale {
    /// Factors mapping `target` (model input) coordinates onto `original` pixels.
    pub fn between(original: (u32, u32), target: (u32, u32)) -> Self {
        Self {
            scale_x: original.0 as f32 / target.0 as f32,
            scale_y: original.1 as f32 / target.1 as f32,
        }
    }

    /// Model space to original image space.
    pub fn apply(&self, [x1, y1, x2, y2]: [f32; 4]) -> [f32; 4] {
        [
            x1 * self.scale_x,
            y1 * self.scale_y,
            x2 * self.scale_x,
            y2 * self.scale_y,
        ]
    }

    /// Original image space back to model space.
    pub fn invert(&self, [x1, y1, x2, y2]: [f32; 4]) -> [f32; 4] {
        [
            x1 / self.scale_x,
            y1 / self.scale_y,
            x2 / self.scale_x,
            y2 / self.scale_y,
        ]
    }
}
