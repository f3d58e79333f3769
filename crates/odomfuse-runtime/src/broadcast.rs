//! Transform broadcaster targets owned by the runtime.
//!
//! [`SharedFrameTree`] keeps an in-process [`FrameTree`] current with every
//! fused transform; [`TransformFanout`] hands one record to several
//! broadcasters, e.g. the bus adapter and a local tree.

use std::sync::{Arc, Mutex, MutexGuard};

use nalgebra::Isometry3;
use odomfuse_middleware::TransformBroadcaster;
use odomfuse_perception::FrameTree;
use odomfuse_types::{FrameTransformRecord, FuseError};

/// A [`FrameTree`] that can be written by the fusion node and read elsewhere.
#[derive(Clone, Default)]
pub struct SharedFrameTree {
    inner: Arc<Mutex<FrameTree>>,
}

impl SharedFrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compose `source → target` from the current edges.
    pub fn lookup(&self, source: &str, target: &str) -> Result<Option<Isometry3<f64>>, FuseError> {
        Ok(self.lock()?.lookup(source, target))
    }

    pub fn stamp(&self, parent: &str, child: &str) -> Result<Option<f64>, FuseError> {
        Ok(self.lock()?.stamp(parent, child))
    }

    fn lock(&self) -> Result<MutexGuard<'_, FrameTree>, FuseError> {
        self.inner
            .lock()
            .map_err(|_| FuseError::Channel("frame tree lock poisoned".to_string()))
    }
}

impl TransformBroadcaster for SharedFrameTree {
    fn send_transform(&self, record: &FrameTransformRecord) -> Result<(), FuseError> {
        self.lock()?.apply_record(record);
        Ok(())
    }
}

/// Sends each record to every target in order.  All targets are tried; the
/// first error is returned.
pub struct TransformFanout {
    targets: Vec<Arc<dyn TransformBroadcaster>>,
}

impl TransformFanout {
    pub fn new(targets: Vec<Arc<dyn TransformBroadcaster>>) -> Self {
        Self { targets }
    }
}

impl TransformBroadcaster for TransformFanout {
    fn send_transform(&self, record: &FrameTransformRecord) -> Result<(), FuseError> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.send_transform(record) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odomfuse_types::{Quaternion, Vector3};

    fn record(stamp: f64, x: f64) -> FrameTransformRecord {
        FrameTransformRecord {
            stamp,
            parent_frame: "camera_init".to_string(),
            child_frame: "camera".to_string(),
            rotation: Quaternion::identity(),
            translation: Vector3::new(x, 0.0, 0.0),
        }
    }

    struct Refusing;

    impl TransformBroadcaster for Refusing {
        fn send_transform(&self, _: &FrameTransformRecord) -> Result<(), FuseError> {
            Err(FuseError::Transport("refused".to_string()))
        }
    }

    #[test]
    fn shared_tree_tracks_latest_record() {
        let tree = SharedFrameTree::new();
        tree.send_transform(&record(1.0, 1.0)).unwrap();
        tree.send_transform(&record(2.0, 4.0)).unwrap();

        let t = tree.lookup("camera_init", "camera").unwrap().unwrap();
        assert!((t.translation.vector.x - 4.0).abs() < 1e-12);
        assert_eq!(tree.stamp("camera_init", "camera").unwrap(), Some(2.0));
    }

    #[test]
    fn fanout_reaches_every_target_despite_errors() {
        let tree = SharedFrameTree::new();
        let targets: Vec<Arc<dyn TransformBroadcaster>> =
            vec![Arc::new(Refusing), Arc::new(tree.clone())];
        let fanout = TransformFanout::new(targets);

        let result = fanout.send_transform(&record(1.0, 2.0));

        assert!(matches!(result, Err(FuseError::Transport(_))));
        assert_eq!(tree.stamp("camera_init", "camera").unwrap(), Some(1.0));
    }
}
