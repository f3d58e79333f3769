//! Pose state shared by the raw-sample and correction handlers.
//!
//! Mutation requires `&mut PoseStore`, so the borrow checker already forces
//! the strictly serialized access the fusion node relies on.  A caller that
//! dispatches handlers from several threads must wrap the store in a mutex;
//! every pose is replaced by value, so a reader holding the lock never sees a
//! half-written [`Pose6`].

use odomfuse_types::Pose6;

/// The (pre, post) pose pair captured at the instant of a map correction.
///
/// Both poses describe the same moment of the trajectory: `pre` is the raw
/// odometry pose the mapping stage started from and `post` is its corrected
/// result.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectionAnchor {
    pub pre: Pose6,
    pub post: Pose6,
}

impl CorrectionAnchor {
    pub fn new(pre: Pose6, post: Pose6) -> Self {
        Self { pre, post }
    }
}

/// Latest raw pose, correction anchor and fused pose.
///
/// Every pose starts as [`Pose6::identity`].  Only the most recent anchor is
/// retained.
#[derive(Debug, Clone, Default)]
pub struct PoseStore {
    raw: Pose6,
    anchor: CorrectionAnchor,
    fused: Pose6,
}

impl PoseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest raw odometry pose.
    pub fn set_raw_pose(&mut self, pose: Pose6) {
        self.raw = pose;
    }

    /// Replace the correction anchor.  `pre` and `post` are swapped in as one
    /// value.
    pub fn set_correction_anchor(&mut self, pre: Pose6, post: Pose6) {
        self.anchor = CorrectionAnchor::new(pre, post);
    }

    pub fn raw_pose(&self) -> Pose6 {
        self.raw
    }

    pub fn correction_anchor(&self) -> CorrectionAnchor {
        self.anchor
    }

    /// The fused pose computed for the latest raw sample.
    pub fn current_fused(&self) -> Pose6 {
        self.fused
    }

    pub(crate) fn set_fused(&mut self, pose: Pose6) {
        self.fused = pose;
    }
}
