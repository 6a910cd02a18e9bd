use crate::backend::{RawOutput, squeeze_batch};
use crate::detection::{Detection, DetectionResult, Rescale, class_label};
use crate::errors::PredictError;
use ndarray::{Array2, ArrayView2, ArrayViewD, Ix2};

/// Mapping from a letterboxed model input back to the original image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl LetterboxTransform {
    /// Undoes padding and scaling, then clamps to the image bounds.
    pub fn to_original(&self, [x1, y1, x2, y2]: [f32; 4]) -> [f32; 4] {
        let w = self.orig_width as f32;
        let h = self.orig_height as f32;
        [
            ((x1 - self.offset_x) / self.scale).clamp(0.0, w),
            ((y1 - self.offset_y) / self.scale).clamp(0.0, h),
            ((x2 - self.offset_x) / self.scale).clamp(0.0, w),
            ((y2 - self.offset_y) / self.scale).clamp(0.0, h),
        ]
    }
}

/// Turns raw backend output into a [`DetectionResult`] in original image pixels.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    pub confidence_threshold: f32,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn process(
        &self,
        raw: RawOutput,
        rescale: &Rescale,
    ) -> Result<DetectionResult, PredictError> {
        match raw {
            // Already thresholded and in pixel space
            RawOutput::Detections(detections) => Ok(detections
                .into_iter()
                .filter(|d| d.confidence.is_finite() && is_finite_box(&d.bbox))
                .collect()),
            RawOutput::Labeled {
                boxes,
                scores,
                labels,
            } => self.labeled(boxes.view(), &scores, &labels, rescale),
            RawOutput::Rows(rows) => self.rows(rows.view(), rescale),
        }
    }

    fn keep(&self, score: f32) -> bool {
        score.is_finite() && score >= self.confidence_threshold
    }

    fn labeled(
        &self,
        boxes: ArrayView2<f32>,
        scores: &[f32],
        labels: &[i64],
        rescale: &Rescale,
    ) -> Result<DetectionResult, PredictError> {
        if boxes.nrows() != scores.len() || boxes.nrows() != labels.len() {
            return Err(PredictError::UnexpectedOutput(format!(
                "{} boxes, {} scores, {} labels",
                boxes.nrows(),
                scores.len(),
                labels.len()
            )));
        }
        if boxes.nrows() > 0 && boxes.ncols() < 4 {
            return Err(PredictError::UnexpectedOutput(format!(
                "boxes need 4 coordinates, got {}",
                boxes.ncols()
            )));
        }

        Ok(boxes
            .rows()
            .into_iter()
            .zip(scores.iter().zip(labels))
            .filter(|(_, (score, _))| self.keep(**score))
            .map(|(row, (&score, &label))| ([row[0], row[1], row[2], row[3]], score, label))
            .filter(|(bbox, _, _)| is_finite_box(bbox))
            .map(|(bbox, score, label)| {
                Detection::new(rescale.apply(bbox), class_label(label), score)
            })
            .collect())
    }

    fn rows(
        &self,
        rows: ArrayView2<f32>,
        rescale: &Rescale,
    ) -> Result<DetectionResult, PredictError> {
        if rows.ncols() < 6 {
            return Err(PredictError::UnexpectedOutput(format!(
                "expected at least 6 columns per row, got {}",
                rows.ncols()
            )));
        }

        Ok(rows
            .rows()
            .into_iter()
            .filter(|row| self.keep(row[4]))
            .map(|row| (cxcywh_to_xyxy(row[0], row[1], row[2], row[3]), row))
            .filter(|(bbox, _)| is_finite_box(bbox))
            .map(|(bbox, row)| {
                Detection::new(rescale.apply(bbox), class_label(row[5] as i64), row[4])
            })
            .collect())
    }
}

/// NaN or infinite coordinates cannot be drawn or serialized.
#[inline]
pub fn is_finite_box(bbox: &[f32; 4]) -> bool {
    bbox.iter().all(|v| v.is_finite())
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
pub fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// A scored box in model input space, before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: i64,
}

/// Anchors a YOLOv8 head emits for `input_size`: one per cell at strides 8, 16 and 32.
pub fn yolo_anchor_count((width, height): (u32, u32)) -> usize {
    [8, 16, 32]
        .iter()
        .map(|stride| (width / stride) as usize * (height / stride) as usize)
        .sum()
}

/// Brings a head output to `[4 + nc, N]`, channels first.
fn head_table(output: ArrayViewD<f32>) -> Result<Array2<f32>, PredictError> {
    let output = squeeze_batch(output.to_owned(), 2);
    let shape = output.shape().to_vec();
    let table = output.into_dimensionality::<Ix2>().map_err(|_| {
        PredictError::UnexpectedOutput(format!("expected [1, 4+nc, N] output, got {shape:?}"))
    })?;

    // A side shorter than 5 cannot hold channels. Otherwise anchors outnumber
    // channels, so the longer axis is the anchor axis.
    let transposed = table.nrows() < 5 || (table.ncols() >= 5 && table.nrows() > table.ncols());
    let table = if transposed {
        table.reversed_axes()
    } else {
        table
    };
    if table.nrows() < 5 {
        return Err(PredictError::UnexpectedOutput(format!(
            "expected at least one class channel, got {} channels",
            table.nrows()
        )));
    }
    Ok(table)
}

/// Checks that `output` is what a YOLOv8 head returns for `input_size`.
pub fn check_yolo_head(
    output: ArrayViewD<f32>,
    input_size: (u32, u32),
) -> Result<(), PredictError> {
    let table = head_table(output)?;
    let expected = yolo_anchor_count(input_size);
    if table.ncols() != expected {
        return Err(PredictError::UnexpectedOutput(format!(
            "expected {expected} anchors for a {}x{} input, got {}",
            input_size.0,
            input_size.1,
            table.ncols()
        )));
    }
    Ok(())
}

/// Decodes a YOLOv8 head output of shape `[1, 4 + nc, N]`.
///
/// Each column holds `cx, cy, w, h` followed by one score per class; the class
/// is the argmax. Outputs laid out as `[N, 4 + nc]` are accepted too.
pub fn decode_yolo(
    output: ArrayViewD<f32>,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, PredictError> {
    let table = head_table(output)?;

    let mut candidates = Vec::new();
    for anchor in table.columns() {
        let (class_idx, score) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .fold((0usize, f32::NEG_INFINITY), |best, (i, s)| {
                if s > best.1 { (i, s) } else { best }
            });

        if score < confidence_threshold {
            continue;
        }
        let bbox = cxcywh_to_xyxy(anchor[0], anchor[1], anchor[2], anchor[3]);
        if !is_finite_box(&bbox) {
            continue;
        }

        candidates.push(Candidate {
            bbox,
            score,
            class_id: class_idx as i64,
        });
    }

    Ok(candidates)
}

/// Per-class greedy non-maximum suppression. Output is sorted by score, highest first.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union <= 0.0 { 0.0 } else { inter / union }
}
