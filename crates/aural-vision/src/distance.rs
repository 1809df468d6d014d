//! Monocular distance estimation with a pinhole camera model.
//!
//! Assumes a 60° field of view on both axes; estimates are heuristics, not
//! calibrated measurements.

use aural_models::Detection;

use crate::detection::{LandmarkKind, PoseLandmarks};

/// Half of the assumed 60° field of view.
const HALF_FOV_DEGREES: f64 = 30.0;

/// Centimeters to meters.
const CM_TO_M: f64 = 0.01;

/// Average adult shoulder width.
pub const SHOULDER_WIDTH_CM: f64 = 40.0;

/// Empirical correction applied to shoulder-based estimates.
pub const SHOULDER_CALIBRATION: f64 = 0.8;

/// Shoulders must be more visible than this to be used.
pub const MIN_SHOULDER_VISIBILITY: f32 = 0.5;

/// Confidence assigned to a person found only through pose landmarks.
pub const POSE_PERSON_CONFIDENCE: f32 = 0.95;

pub const PERSON_LABEL: &str = "person";

/// Assumed real-world heights in centimeters.
const REFERENCE_HEIGHTS_CM: &[(&str, f64)] = &[
    ("person", 170.0),
    ("chair", 80.0),
    ("dining table", 75.0),
    ("couch", 90.0),
    ("bed", 60.0),
    ("refrigerator", 180.0),
    ("tv", 55.0),
    ("laptop", 35.0),
    ("cell phone", 15.0),
    ("book", 25.0),
    ("bottle", 25.0),
];

/// Reference height for a label, if the label has one.
pub fn reference_height_cm(label: &str) -> Option<f64> {
    REFERENCE_HEIGHTS_CM
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, cm)| *cm)
}

/// Focal length in pixels for an image extent under the assumed FOV.
pub fn focal_length_px(extent_px: f64) -> f64 {
    extent_px / (2.0 * HALF_FOV_DEGREES.to_radians().tan())
}

/// Distance in meters from a bounding-box height.
///
/// `None` for labels without a reference height and for non-positive box or
/// frame heights.
pub fn estimate(label: &str, bbox_height_px: f64, frame_height_px: f64) -> Option<f64> {
    let real_height_cm = reference_height_cm(label)?;
    if !is_positive(bbox_height_px) || !is_positive(frame_height_px) {
        return None;
    }
    let distance_cm = real_height_cm * focal_length_px(frame_height_px) / bbox_height_px;
    Some(distance_cm * CM_TO_M)
}

/// Distance in meters to a person from the apparent shoulder width.
///
/// Requires both shoulders visible above [`MIN_SHOULDER_VISIBILITY`].
pub fn estimate_from_shoulders(pose: &PoseLandmarks, frame_width_px: f64) -> Option<f64> {
    let left = pose.get(LandmarkKind::LeftShoulder)?;
    let right = pose.get(LandmarkKind::RightShoulder)?;
    if left.visibility <= MIN_SHOULDER_VISIBILITY || right.visibility <= MIN_SHOULDER_VISIBILITY {
        return None;
    }

    let shoulder_width_px = f64::from((left.x - right.x).abs()) * frame_width_px;
    if !is_positive(shoulder_width_px) {
        return None;
    }
    let distance_cm = SHOULDER_WIDTH_CM * focal_length_px(frame_width_px) / shoulder_width_px;
    Some(distance_cm * CM_TO_M * SHOULDER_CALIBRATION)
}

/// Rejects zero, negatives and NaN.
fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Fold a pose-derived person distance into the detections.
///
/// The first `person` detection keeps its box-based distance and only takes
/// the pose distance when it has none. Without a `person` detection a
/// box-less entry is appended.
pub fn merge_person_distance(detections: &mut Vec<Detection>, pose_distance_m: f64) {
    match detections.iter_mut().find(|d| d.is_person()) {
        Some(person) => {
            if person.distance.is_none() {
                person.distance = Some(pose_distance_m);
            }
        }
        None => detections.push(
            Detection::new(PERSON_LABEL, POSE_PERSON_CONFIDENCE).with_distance(Some(pose_distance_m)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Landmark;
    use aural_models::BoundingBox;

    fn shoulders(left_x: f32, right_x: f32, visibility: f32) -> PoseLandmarks {
        PoseLandmarks::new()
            .with(LandmarkKind::LeftShoulder, Landmark::new(left_x, 0.4, visibility))
            .with(LandmarkKind::RightShoulder, Landmark::new(right_x, 0.4, visibility))
    }

    #[test]
    fn test_chair_scenario() {
        let focal = focal_length_px(480.0);
        assert!((focal - 415.69).abs() < 0.01);
        let d = estimate("chair", 200.0, 480.0).unwrap();
        assert!((d - 1.6628).abs() < 0.001, "got {}", d);
    }

    #[test]
    fn test_unknown_label() {
        assert_eq!(estimate("giraffe", 200.0, 480.0), None);
        assert_eq!(estimate("giraffe", 1.0, 1.0), None);
        assert_eq!(estimate("", 0.0, 0.0), None);
    }

    #[test]
    fn test_non_positive_height_is_absent() {
        assert_eq!(estimate("chair", 0.0, 480.0), None);
        assert_eq!(estimate("chair", -12.0, 480.0), None);
        assert_eq!(estimate("chair", 100.0, 0.0), None);
        assert_eq!(estimate("chair", f64::NAN, 480.0), None);
    }

    #[test]
    fn test_distance_decreases_as_box_grows() {
        let mut previous = f64::INFINITY;
        for h in [1.0, 10.0, 50.0, 120.0, 300.0, 480.0, 1000.0] {
            let d = estimate("bottle", h, 480.0).unwrap();
            assert!(d > 0.0);
            assert!(d < previous);
            previous = d;
        }
    }

    #[test]
    fn test_shoulder_scenario() {
        let pose = shoulders(0.6, 0.4, 0.9);
        let d = estimate_from_shoulders(&pose, 640.0).unwrap();
        assert!((d - 1.3856).abs() < 0.001, "got {}", d);
    }

    #[test]
    fn test_shoulders_need_visibility() {
        assert!(estimate_from_shoulders(&shoulders(0.6, 0.4, 0.5), 640.0).is_none());
        let pose = PoseLandmarks::new()
            .with(LandmarkKind::LeftShoulder, Landmark::new(0.6, 0.4, 0.9))
            .with(LandmarkKind::RightShoulder, Landmark::new(0.4, 0.4, 0.3));
        assert!(estimate_from_shoulders(&pose, 640.0).is_none());
    }

    #[test]
    fn test_overlapping_shoulders_are_absent() {
        assert!(estimate_from_shoulders(&shoulders(0.5, 0.5, 0.9), 640.0).is_none());
    }

    #[test]
    fn test_merge_keeps_box_distance() {
        let mut dets = vec![Detection::new("person", 0.8)
            .with_bbox(BoundingBox::new(0, 0, 10, 100))
            .with_distance(Some(3.0))];
        merge_person_distance(&mut dets, 1.2);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].distance, Some(3.0));
    }

    #[test]
    fn test_merge_fills_missing_distance() {
        let mut dets = vec![Detection::new("person", 0.8)];
        merge_person_distance(&mut dets, 1.2);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].distance, Some(1.2));
    }

    #[test]
    fn test_merge_appends_person() {
        let mut dets = vec![Detection::new("chair", 0.8).with_distance(Some(2.0))];
        merge_person_distance(&mut dets, 1.2);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[1].label, "person");
        assert_eq!(dets[1].confidence, POSE_PERSON_CONFIDENCE);
        assert!(dets[1].bbox.is_none());
    }
}
