//! In-process transform tree.
//!
//! Keeps a directed graph of named frames and the rigid transforms relating
//! them, fed by [`FrameTransformRecord`]s.  [`FrameTree::lookup`] composes a
//! chain of edges (BFS, shortest path) into a single [`Isometry3`].
//!
//! Records carry boundary-convention quaternions; the tree stores them as-is
//! and does not interpret the processing convention.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::{Isometry3, Vector3};
//! use odomfuse_perception::FrameTree;
//!
//! let mut tree = FrameTree::new();
//! tree.set_transform("camera_init", "camera", Isometry3::translation(1.0, 0.0, 0.0));
//! tree.set_transform("camera", "lidar", Isometry3::translation(0.5, 0.0, 0.0));
//!
//! let t = tree.lookup("camera_init", "lidar").unwrap();
//! assert!((t.translation.vector - Vector3::new(1.5, 0.0, 0.0)).norm() < 1e-12);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::{Isometry3, Quaternion as NaQuaternion, Translation3, UnitQuaternion};
use odomfuse_types::FrameTransformRecord;

/// A stamped edge of the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    transform: Isometry3<f64>,
    stamp: f64,
}

/// Directed graph of named frames.  Adding `A → B` does not create `B → A`.
#[derive(Debug, Default)]
pub struct FrameTree {
    /// `edges[parent][child]`
    edges: HashMap<String, HashMap<String, Edge>>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the transform from `parent` to `child`.
    pub fn set_transform(&mut self, parent: &str, child: &str, transform: Isometry3<f64>) {
        self.insert(parent, child, transform, f64::NAN);
    }

    /// Register or replace the edge described by `record`.
    pub fn apply_record(&mut self, record: &FrameTransformRecord) {
        let rotation = UnitQuaternion::from_quaternion(NaQuaternion::new(
            record.rotation.w,
            record.rotation.x,
            record.rotation.y,
            record.rotation.z,
        ));
        let translation = Translation3::new(
            record.translation.x,
            record.translation.y,
            record.translation.z,
        );
        self.insert(
            &record.parent_frame,
            &record.child_frame,
            Isometry3::from_parts(translation, rotation),
            record.stamp,
        );
    }

    /// Stamp of the last record applied to `parent → child`, if any.
    pub fn stamp(&self, parent: &str, child: &str) -> Option<f64> {
        self.edges
            .get(parent)
            .and_then(|children| children.get(child))
            .map(|edge| edge.stamp)
            .filter(|stamp| !stamp.is_nan())
    }

    /// Compose the transform that maps points in `target` into `source`.
    ///
    /// Returns `None` when no directed path exists.
    pub fn lookup(&self, source: &str, target: &str) -> Option<Isometry3<f64>> {
        if source == target {
            return Some(Isometry3::identity());
        }

        let mut queue: VecDeque<(&str, Isometry3<f64>)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((source, Isometry3::identity()));
        visited.insert(source);

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(children) = self.edges.get(current) else {
                continue;
            };
            for (next, edge) in children {
                if visited.contains(next.as_str()) {
                    continue;
                }
                let composed = accumulated * edge.transform;
                if next == target {
                    return Some(composed);
                }
                visited.insert(next.as_str());
                queue.push_back((next.as_str(), composed));
            }
        }

        None
    }

    fn insert(&mut self, parent: &str, child: &str, transform: Isometry3<f64>, stamp: f64) {
        self.edges
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string(), Edge { transform, stamp });
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
