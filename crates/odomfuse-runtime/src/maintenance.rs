//! [`TransformMaintenance`] – the fusion node.
//!
//! Owns the [`PoseStore`] and [`FusionEngine`] and is driven by two inputs:
//!
//! 1. **Corrections** (low rate) – decoded and stored as the new
//!    [`CorrectionAnchor`][odomfuse_perception::CorrectionAnchor].  Nothing is
//!    emitted.
//! 2. **Raw samples** (high rate) – decoded, fused against the current anchor
//!    and emitted immediately, once to the [`FusedPoseSink`] and once to the
//!    [`TransformBroadcaster`].
//!
//! Both handlers take `&mut self`, so the store is never touched by two
//! handlers at once.  [`TransformMaintenance::run`] drains a
//! [`SampleSource`] from a single task; a node shared between tasks must sit
//! behind a mutex.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use odomfuse_middleware::{BusSampleSource, EventBus, OdometryAdapter};
//! use odomfuse_perception::FusionEngine;
//! use odomfuse_runtime::maintenance::{FrameConfig, TransformMaintenance};
//!
//! # async fn demo() {
//! let bus = Arc::new(EventBus::default());
//! let adapter = Arc::new(OdometryAdapter::new(Arc::clone(&bus)));
//! let mut node = TransformMaintenance::new(
//!     FusionEngine::default(),
//!     FrameConfig::default(),
//!     adapter.clone(),
//!     adapter,
//! );
//! let mut source = BusSampleSource::new(&bus);
//! let stats = node.run(&mut source).await;
//! println!("fused {} poses", stats.fused);
//! # }
//! ```

use std::sync::Arc;

use odomfuse_middleware::validation::{validate_correction, validate_raw};
use odomfuse_middleware::{FusedPoseSink, SampleSource, TransformBroadcaster};
use odomfuse_perception::{AxisConvention, FusionEngine, PoseStore};
use odomfuse_types::{
    FrameTransformRecord, FuseError, FusedPoseSample, InboundSample, MappingCorrectionSample,
    Pose6, RawOdometrySample,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Frame names stamped on every output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    pub parent_frame: String,
    pub child_frame: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            parent_frame: "camera_init".to_string(),
            child_frame: "camera".to_string(),
        }
    }
}

/// Running counters.  `fused == raw` whenever every sink accepted its
/// output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceStats {
    pub raw: u64,
    pub corrections: u64,
    pub fused: u64,
    pub singular: u64,
    pub rejected: u64,
}

pub struct TransformMaintenance {
    store: PoseStore,
    engine: FusionEngine,
    frames: FrameConfig,
    fused_sink: Arc<dyn FusedPoseSink>,
    broadcaster: Arc<dyn TransformBroadcaster>,
    stats: MaintenanceStats,
}

impl TransformMaintenance {
    pub fn new(
        engine: FusionEngine,
        frames: FrameConfig,
        fused_sink: Arc<dyn FusedPoseSink>,
        broadcaster: Arc<dyn TransformBroadcaster>,
    ) -> Self {
        Self {
            store: PoseStore::new(),
            engine,
            frames,
            fused_sink,
            broadcaster,
            stats: MaintenanceStats::default(),
        }
    }

    /// Replace the correction anchor.  Emits nothing.
    pub fn handle_correction(&mut self, sample: &MappingCorrectionSample) -> Result<(), FuseError> {
        let pre = validate_correction(sample).inspect_err(|_| self.stats.rejected += 1)?;
        let post = AxisConvention::decode(&sample.orientation, &sample.position);
        self.store.set_correction_anchor(pre, post);
        self.stats.corrections += 1;
        info!(
            stamp = sample.stamp,
            post_tx = post.tx,
            post_ty = post.ty,
            post_tz = post.tz,
            "correction anchor updated"
        );
        Ok(())
    }

    /// Fuse one raw sample and hand the result to both outputs.
    ///
    /// The fused sample is returned even to callers that ignore the sinks.
    /// A sink error is returned after both outputs have been attempted.
    #[instrument(level = "trace", skip_all, fields(stamp = sample.stamp))]
    pub fn handle_raw(&mut self, sample: &RawOdometrySample) -> Result<FusedPoseSample, FuseError> {
        validate_raw(sample).inspect_err(|_| self.stats.rejected += 1)?;
        self.stats.raw += 1;

        self.store
            .set_raw_pose(AxisConvention::decode(&sample.orientation, &sample.position));
        let association = self.engine.update(&mut self.store);
        if association.singular {
            self.stats.singular += 1;
        }

        let (orientation, position) = AxisConvention::encode(&association.pose);
        let fused = FusedPoseSample {
            stamp: sample.stamp,
            frame_id: self.frames.parent_frame.clone(),
            child_frame_id: self.frames.child_frame.clone(),
            orientation,
            position,
        };

        let published = self.fused_sink.publish_fused(&fused);
        let broadcast = self
            .broadcaster
            .send_transform(&FrameTransformRecord::from(&fused));
        published?;
        broadcast?;
        self.stats.fused += 1;
        Ok(fused)
    }

    /// Dispatch either kind of sample.  Returns the fused output for raw
    /// samples.
    pub fn handle(&mut self, sample: &InboundSample) -> Result<Option<FusedPoseSample>, FuseError> {
        match sample {
            InboundSample::Raw(raw) => self.handle_raw(raw).map(Some),
            InboundSample::Correction(correction) => self.handle_correction(correction).map(|_| None),
        }
    }

    /// Drain `source` until it is exhausted, handling samples strictly in
    /// order.  Per-sample failures are logged and do not stop the loop.
    pub async fn run<S>(&mut self, source: &mut S) -> MaintenanceStats
    where
        S: SampleSource + ?Sized,
    {
        info!(
            parent = %self.frames.parent_frame,
            child = %self.frames.child_frame,
            "transform maintenance started"
        );
        while let Some(sample) = source.next_sample().await {
            match self.handle(&sample) {
                Ok(_) => {}
                Err(FuseError::InvalidSample(reason)) => {
                    warn!(%reason, "sample rejected");
                }
                Err(e) => warn!(error = %e, "fused output not delivered"),
            }
        }
        info!(
            raw = self.stats.raw,
            corrections = self.stats.corrections,
            fused = self.stats.fused,
            singular = self.stats.singular,
            rejected = self.stats.rejected,
            "sample source exhausted"
        );
        self.stats
    }

    pub fn stats(&self) -> MaintenanceStats {
        self.stats
    }

    /// Latest fused pose in the processing convention.
    pub fn current_fused(&self) -> Pose6 {
        self.store.current_fused()
    }

    pub fn pose_store(&self) -> &PoseStore {
        &self.store
    }

    pub fn frames(&self) -> &FrameConfig {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use odomfuse_types::{Point, Quaternion};
    use std::f64::consts::FRAC_PI_2;
    use std::sync::Mutex;

    /// Records every output it is handed.
    #[derive(Default)]
    struct Recorder {
        fused: Mutex<Vec<FusedPoseSample>>,
        records: Mutex<Vec<FrameTransformRecord>>,
    }

    impl FusedPoseSink for Recorder {
        fn publish_fused(&self, sample: &FusedPoseSample) -> Result<(), FuseError> {
            self.fused.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    impl TransformBroadcaster for Recorder {
        fn send_transform(&self, record: &FrameTransformRecord) -> Result<(), FuseError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl FusedPoseSink for FailingSink {
        fn publish_fused(&self, _: &FusedPoseSample) -> Result<(), FuseError> {
            Err(FuseError::Transport("link down".to_string()))
        }
    }

    struct VecSource(std::vec::IntoIter<InboundSample>);

    #[async_trait::async_trait]
    impl SampleSource for VecSource {
        async fn next_sample(&mut self) -> Option<InboundSample> {
            self.0.next()
        }
    }

    fn node() -> (Arc<Recorder>, TransformMaintenance) {
        let recorder = Arc::new(Recorder::default());
        let node = TransformMaintenance::new(
            FusionEngine::default(),
            FrameConfig::default(),
            recorder.clone(),
            recorder.clone(),
        );
        (recorder, node)
    }

    fn raw_from_pose(stamp: f64, pose: &Pose6) -> RawOdometrySample {
        let (orientation, position) = AxisConvention::encode(pose);
        RawOdometrySample {
            stamp,
            frame_id: "camera_init".to_string(),
            child_frame_id: "laser_odom".to_string(),
            orientation,
            position,
        }
    }

    fn correction_from_poses(stamp: f64, pre: Pose6, post: &Pose6) -> MappingCorrectionSample {
        let (orientation, position) = AxisConvention::encode(post);
        MappingCorrectionSample {
            stamp,
            orientation,
            position,
            pre_correction: Some(pre),
            twist: None,
        }
    }

    fn assert_pose_eq(a: &Pose6, b: &Pose6) {
        for (x, y) in a.rotation().iter().zip(b.rotation()) {
            assert_abs_diff_eq!(*x, y, epsilon = 1e-9);
        }
        for (x, y) in a.translation().iter().zip(b.translation()) {
            assert_abs_diff_eq!(*x, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn without_correction_fused_follows_raw() {
        let (recorder, mut node) = node();
        let raw_pose = Pose6::new(0.1, -0.4, 0.25, 3.0, -1.0, 0.5);

        let fused = node.handle_raw(&raw_from_pose(1.0, &raw_pose)).unwrap();

        let decoded = AxisConvention::decode(&fused.orientation, &fused.position);
        assert_pose_eq(&decoded, &raw_pose);
        assert_eq!(fused.frame_id, "camera_init");
        assert_eq!(fused.child_frame_id, "camera");
        assert_eq!(recorder.fused.lock().unwrap().len(), 1);
        assert_eq!(recorder.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn anchor_equal_to_raw_is_identity() {
        let (_recorder, mut node) = node();
        let raw_pose = Pose6::new(-0.3, 1.2, 0.7, 10.0, 2.0, -4.0);

        node.handle_correction(&correction_from_poses(5.0, raw_pose, &raw_pose))
            .unwrap();
        let fused = node.handle_raw(&raw_from_pose(5.0, &raw_pose)).unwrap();

        let decoded = AxisConvention::decode(&fused.orientation, &fused.position);
        assert_pose_eq(&decoded, &raw_pose);
    }

    #[test]
    fn quarter_turn_correction_rotates_raw_translation() {
        let (_recorder, mut node) = node();
        let post = Pose6::new(0.0, FRAC_PI_2, 0.0, 0.0, 0.0, 0.0);
        node.handle_correction(&correction_from_poses(1.0, Pose6::identity(), &post))
            .unwrap();

        let raw = RawOdometrySample {
            stamp: 1.1,
            frame_id: String::new(),
            child_frame_id: String::new(),
            orientation: Quaternion::identity(),
            position: Point::new(1.0, 0.0, 0.0),
        };
        let fused = node.handle_raw(&raw).unwrap();

        let pose = node.current_fused();
        assert_abs_diff_eq!(pose.rx, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.ry, FRAC_PI_2, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.rz, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.position.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.position.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.position.z, -1.0, epsilon = 1e-9);
        assert_eq!(fused.stamp, 1.1);
    }

    #[test]
    fn anchor_is_reused_until_replaced() {
        let (_recorder, mut node) = node();
        let post = Pose6::new(0.0, 0.0, 0.0, 100.0, 0.0, 0.0);
        node.handle_correction(&correction_from_poses(0.0, Pose6::identity(), &post))
            .unwrap();

        for (i, x) in [1.0, 2.0, 3.0].into_iter().enumerate() {
            let raw = Pose6::new(0.0, 0.0, 0.0, x, 0.0, 0.0);
            let fused = node.handle_raw(&raw_from_pose(i as f64, &raw)).unwrap();
            assert_abs_diff_eq!(fused.position.x, 100.0 + x, epsilon = 1e-9);
        }
        assert_eq!(node.pose_store().correction_anchor().post, post);

        let replacement = Pose6::new(0.0, 0.0, 0.0, 0.0, 50.0, 0.0);
        node.handle_correction(&correction_from_poses(4.0, Pose6::identity(), &replacement))
            .unwrap();
        let fused = node.handle_raw(&raw_from_pose(5.0, &Pose6::identity())).unwrap();
        assert_abs_diff_eq!(fused.position.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.position.y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_samples_are_rejected_and_counted() {
        let (recorder, mut node) = node();
        let mut bad = raw_from_pose(1.0, &Pose6::identity());
        bad.orientation = Quaternion::new(0.0, 0.0, 0.0, 0.5);

        assert!(matches!(node.handle_raw(&bad), Err(FuseError::InvalidSample(_))));

        let mut correction = correction_from_poses(1.0, Pose6::identity(), &Pose6::identity());
        correction.pre_correction = None;
        assert!(node.handle_correction(&correction).is_err());

        let stats = node.stats();
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.raw, 0);
        assert_eq!(stats.corrections, 0);
        assert!(recorder.fused.lock().unwrap().is_empty());
    }

    #[test]
    fn sink_failure_is_returned_after_broadcast() {
        let recorder = Arc::new(Recorder::default());
        let mut node = TransformMaintenance::new(
            FusionEngine::default(),
            FrameConfig::default(),
            Arc::new(FailingSink),
            recorder.clone(),
        );
        let result = node.handle_raw(&raw_from_pose(1.0, &Pose6::identity()));
        assert!(matches!(result, Err(FuseError::Transport(_))));
        assert_eq!(recorder.records.lock().unwrap().len(), 1);
        assert_eq!(node.stats().raw, 1);
        assert_eq!(node.stats().fused, 0);
    }

    #[test]
    fn singular_output_is_counted() {
        let (_recorder, mut node) = node();
        let raw = Pose6::new(FRAC_PI_2, 0.0, 0.0, 0.0, 0.0, 0.0);
        let fused = node.handle_raw(&raw_from_pose(1.0, &raw)).unwrap();
        assert!(fused.orientation.norm().is_finite());
        assert!(fused.position.x.is_finite());
        assert_eq!(node.stats().singular, 1);
    }

    #[tokio::test]
    async fn run_emits_one_output_per_raw_sample() {
        let (recorder, mut node) = node();
        let mut samples = Vec::new();
        for i in 0..20 {
            if i % 7 == 0 {
                let post = Pose6::new(0.0, 0.01 * i as f64, 0.0, i as f64, 0.0, 0.0);
                samples.push(InboundSample::Correction(correction_from_poses(
                    i as f64,
                    Pose6::identity(),
                    &post,
                )));
            }
            let raw = Pose6::new(0.0, 0.0, 0.0, 0.1 * i as f64, 0.0, 0.0);
            samples.push(InboundSample::Raw(raw_from_pose(i as f64, &raw)));
        }
        let mut bad = raw_from_pose(99.0, &Pose6::identity());
        bad.stamp = f64::NAN;
        samples.push(InboundSample::Raw(bad));

        let stats = node.run(&mut VecSource(samples.into_iter())).await;

        assert_eq!(stats.raw, 20);
        assert_eq!(stats.fused, 20);
        assert_eq!(stats.corrections, 3);
        assert_eq!(stats.rejected, 1);
        let fused = recorder.fused.lock().unwrap();
        assert_eq!(fused.len(), 20);
        let stamps: Vec<f64> = fused.iter().map(|s| s.stamp).collect();
        let expected: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(stamps, expected);
    }
}
