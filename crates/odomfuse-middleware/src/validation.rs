//! Boundary validation.
//!
//! The fusion core assumes well-formed poses.  Everything that crosses into
//! it passes through here first.

use odomfuse_types::{FuseError, MappingCorrectionSample, Point, Pose6, Quaternion, RawOdometrySample};

/// Maximum accepted deviation of a quaternion's norm from 1.
pub const QUATERNION_NORM_TOLERANCE: f64 = 1e-3;

/// Reject raw samples with a bad stamp, non-finite components or a
/// non-unit orientation.
pub fn validate_raw(sample: &RawOdometrySample) -> Result<(), FuseError> {
    check_stamp(sample.stamp)?;
    check_position(&sample.position)?;
    check_orientation(&sample.orientation)
}

/// Reject malformed corrections and return the resolved pre-correction pose.
pub fn validate_correction(sample: &MappingCorrectionSample) -> Result<Pose6, FuseError> {
    check_stamp(sample.stamp)?;
    check_position(&sample.position)?;
    check_orientation(&sample.orientation)?;
    let pre = sample.pre_correction_pose().ok_or_else(|| {
        FuseError::InvalidSample("correction carries no pre-correction pose".to_string())
    })?;
    if !pre.is_finite() {
        return Err(FuseError::InvalidSample(format!(
            "pre-correction pose is not finite: {pre:?}"
        )));
    }
    Ok(pre)
}

fn check_stamp(stamp: f64) -> Result<(), FuseError> {
    if !stamp.is_finite() || stamp < 0.0 {
        return Err(FuseError::InvalidSample(format!("invalid stamp {stamp}")));
    }
    Ok(())
}

fn check_position(p: &Point) -> Result<(), FuseError> {
    if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
        return Err(FuseError::InvalidSample(format!("position is not finite: {p:?}")));
    }
    Ok(())
}

fn check_orientation(q: &Quaternion) -> Result<(), FuseError> {
    let norm = q.norm();
    if !norm.is_finite() {
        return Err(FuseError::InvalidSample(format!("orientation is not finite: {q:?}")));
    }
    if (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
        return Err(FuseError::InvalidSample(format!(
            "orientation is not a unit quaternion (norm {norm:.6})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use odomfuse_types::{Twist, Vector3};

    fn raw(stamp: f64, orientation: Quaternion, position: Point) -> RawOdometrySample {
        RawOdometrySample {
            stamp,
            frame_id: String::new(),
            child_frame_id: String::new(),
            orientation,
            position,
        }
    }

    fn correction(pre: Option<Pose6>, twist: Option<Twist>) -> MappingCorrectionSample {
        MappingCorrectionSample {
            stamp: 10.0,
            orientation: Quaternion::identity(),
            position: Point::default(),
            pre_correction: pre,
            twist,
        }
    }

    #[test]
    fn accepts_well_formed_raw_sample() {
        let q = Quaternion::new(0.0, 0.0, 0.6, 0.8);
        assert!(validate_raw(&raw(1.5, q, Point::new(1.0, 2.0, 3.0))).is_ok());
    }

    #[test]
    fn rejects_bad_stamps() {
        for stamp in [f64::NAN, f64::INFINITY, -1.0] {
            let result = validate_raw(&raw(stamp, Quaternion::identity(), Point::default()));
            assert!(matches!(result, Err(FuseError::InvalidSample(_))), "stamp {stamp} accepted");
        }
    }

    #[test]
    fn rejects_non_finite_position() {
        let result = validate_raw(&raw(1.0, Quaternion::identity(), Point::new(0.0, f64::NAN, 0.0)));
        assert!(matches!(result, Err(FuseError::InvalidSample(_))));
    }

    #[test]
    fn rejects_non_unit_quaternion() {
        let result = validate_raw(&raw(1.0, Quaternion::new(0.0, 0.0, 0.0, 2.0), Point::default()));
        let Err(FuseError::InvalidSample(reason)) = result else {
            panic!("expected InvalidSample");
        };
        assert!(reason.contains("unit quaternion"));

        let zero = validate_raw(&raw(1.0, Quaternion::new(0.0, 0.0, 0.0, 0.0), Point::default()));
        assert!(zero.is_err());
    }

    #[test]
    fn tolerates_small_norm_error() {
        let q = Quaternion::new(0.0, 0.0, 0.0, 1.0 + QUATERNION_NORM_TOLERANCE / 2.0);
        assert!(validate_raw(&raw(1.0, q, Point::default())).is_ok());
    }

    #[test]
    fn correction_returns_explicit_pre_pose() {
        let pre = Pose6::new(0.1, 0.2, 0.3, 1.0, 2.0, 3.0);
        assert_eq!(validate_correction(&correction(Some(pre), None)).unwrap(), pre);
    }

    #[test]
    fn correction_returns_piggybacked_pre_pose() {
        let twist = Twist {
            linear: Vector3::new(1.0, 2.0, 3.0),
            angular: Vector3::new(0.1, 0.2, 0.3),
        };
        let pre = validate_correction(&correction(None, Some(twist))).unwrap();
        assert_eq!(pre, Pose6::new(0.1, 0.2, 0.3, 1.0, 2.0, 3.0));
    }

    #[test]
    fn correction_without_pre_pose_is_rejected() {
        assert!(matches!(
            validate_correction(&correction(None, None)),
            Err(FuseError::InvalidSample(_))
        ));
    }

    #[test]
    fn correction_with_non_finite_pre_pose_is_rejected() {
        let pre = Pose6::new(f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(validate_correction(&correction(Some(pre), None)).is_err());
    }
}
