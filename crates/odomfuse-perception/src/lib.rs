//! `odomfuse-perception` – the pose fusion core.
//!
//! Fuses a high-rate, drift-prone odometry pose with the low-rate,
//! drift-corrected pose of a map-matching stage.  Every raw sample is
//! re-expressed through the most recent correction, giving a continuous,
//! low-latency corrected trajectory.
//!
//! # Modules
//!
//! - [`pose_store`] – [`PoseStore`][pose_store::PoseStore]: the latest raw
//!   pose, the current [`CorrectionAnchor`][pose_store::CorrectionAnchor] and
//!   the latest fused pose.
//! - [`fusion`] – [`FusionEngine`][fusion::FusionEngine]: memoryless
//!   `post ∘ pre⁻¹ ∘ raw` composition with a guarded Euler extraction.
//! - [`convention`] – [`AxisConvention`][convention::AxisConvention]: the fixed
//!   bijection between the sensor/world convention and the processing
//!   convention.
//! - [`transform`] – [`FrameTree`][transform::FrameTree]: directed graph of
//!   named frames fed by frame-transform records.

pub mod convention;
pub mod fusion;
pub mod pose_store;
pub mod transform;

pub use convention::AxisConvention;
pub use fusion::{Association, FusionEngine, DEFAULT_SINGULARITY_EPSILON};
pub use pose_store::{CorrectionAnchor, PoseStore};
pub use transform::FrameTree;
