//! Pose Fusion Engine.
//!
//! Re-expresses the latest raw odometry pose through the most recent map
//! correction.  With `T(p)` the rigid transform of a [`Pose6`], the fused
//! pose is
//!
//! ```text
//! T(fused) = T(post) · T(pre)⁻¹ · T(raw)
//! ```
//!
//! i.e. the motion accumulated since the anchor instant, replayed on top of
//! the corrected anchor pose.  The computation runs in three stages:
//!
//! 1. **Translation increment** – `incre = R(raw)ᵀ · (pre.t − raw.t)`.
//! 2. **Orientation composition** – `R_f = R(post) · R(pre)ᵀ · R(raw)`,
//!    decomposed back into `(rx, ry, rz)` with `asin`/`atan2`.
//! 3. **Translation composition** – `fused.t = post.t − R(fused) · incre`.
//!
//! Rotations use the processing convention `R(p) = Ry(ry) · Rx(rx) · Rz(rz)`.
//! The decomposition is singular when `cos(rx) → 0`: both `atan2` arguments
//! vanish.  Below [`FusionEngine::singularity_epsilon`] the engine keeps `ry`
//! and `rz` at their previous fused values instead of producing NaN.
//!
//! # Example
//!
//! ```rust
//! use odomfuse_perception::{FusionEngine, PoseStore};
//! use odomfuse_types::Pose6;
//!
//! let engine = FusionEngine::default();
//! let mut store = PoseStore::new();
//!
//! // The map stage moved the anchor pose 0.5 forward along the third axis.
//! store.set_correction_anchor(
//!     Pose6::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0),
//!     Pose6::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.5),
//! );
//! store.set_raw_pose(Pose6::new(0.0, 0.0, 0.0, 0.0, 0.0, 3.0));
//!
//! let fused = engine.update(&mut store).pose;
//! assert!((fused.tz - 3.5).abs() < 1e-12);
//! ```

use nalgebra::{Rotation3, Vector3};
use odomfuse_types::Pose6;
use tracing::{debug, warn};

use crate::pose_store::{CorrectionAnchor, PoseStore};

/// Default threshold on `|cos(rx)|` below which the Euler decomposition is
/// treated as singular.
pub const DEFAULT_SINGULARITY_EPSILON: f64 = 1e-6;

/// Result of one fusion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Association {
    pub pose: Pose6,
    /// `true` when `ry`/`rz` were held at their previous values.
    pub singular: bool,
}

/// Stateless fusion of a raw pose with a [`CorrectionAnchor`].
#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    singularity_epsilon: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SINGULARITY_EPSILON)
    }
}

impl FusionEngine {
    /// Create an engine.  Non-finite or negative thresholds fall back to
    /// [`DEFAULT_SINGULARITY_EPSILON`].
    pub fn new(singularity_epsilon: f64) -> Self {
        let singularity_epsilon = if singularity_epsilon.is_finite() && singularity_epsilon >= 0.0 {
            singularity_epsilon
        } else {
            DEFAULT_SINGULARITY_EPSILON
        };
        Self { singularity_epsilon }
    }

    pub fn singularity_epsilon(&self) -> f64 {
        self.singularity_epsilon
    }

    /// Fuse the store's raw pose with its anchor and write the result back.
    pub fn update(&self, store: &mut PoseStore) -> Association {
        let association = self.associate(
            &store.raw_pose(),
            &store.correction_anchor(),
            &store.current_fused(),
        );
        store.set_fused(association.pose);
        association
    }

    /// Map `raw` through `anchor`.
    ///
    /// `previous` is only consulted on the singular path, where it supplies
    /// the held `ry` and `rz`.
    pub fn associate(&self, raw: &Pose6, anchor: &CorrectionAnchor, previous: &Pose6) -> Association {
        let r_raw = processing_rotation(raw.rx, raw.ry, raw.rz);
        let r_pre = processing_rotation(anchor.pre.rx, anchor.pre.ry, anchor.pre.rz);
        let r_post = processing_rotation(anchor.post.rx, anchor.post.ry, anchor.post.rz);

        // Stage A: motion since the anchor, in the raw body frame.
        let incre = r_raw.inverse() * (translation(&anchor.pre) - translation(raw));

        // Stage B
        let composed = r_post * r_pre.inverse() * r_raw;
        let m = composed.matrix();
        let rx = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
        let singular = rx.cos().abs() < self.singularity_epsilon;
        let (ry, rz) = if singular {
            warn!(
                rx,
                held_ry = previous.ry,
                held_rz = previous.rz,
                "fused orientation at decomposition singularity; holding ry/rz"
            );
            (previous.ry, previous.rz)
        } else {
            (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
        };

        // Stage C
        let r_fused = processing_rotation(rx, ry, rz);
        let t = translation(&anchor.post) - r_fused * incre;

        let pose = Pose6::new(rx, ry, rz, t.x, t.y, t.z);
        debug!(?pose, singular, "fused pose");
        Association { pose, singular }
    }
}

/// `Ry(ry) · Rx(rx) · Rz(rz)`.
fn processing_rotation(rx: f64, ry: f64, rz: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), ry)
        * Rotation3::from_axis_angle(&Vector3::x_axis(), rx)
        * Rotation3::from_axis_angle(&Vector3::z_axis(), rz)
}

fn translation(pose: &Pose6) -> Vector3<f64> {
    Vector3::new(pose.tx, pose.ty, pose.tz)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
