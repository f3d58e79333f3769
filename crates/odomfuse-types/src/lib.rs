use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Six-degree-of-freedom pose in the fusion core's processing convention.
///
/// `rx`, `ry`, `rz` are elemental rotation angles (radians) composed as
/// `Ry(ry) · Rx(rx) · Rz(rz)`; `tx`, `ty`, `tz` are the translation in the
/// same length unit as the input samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pose6 {
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

impl Pose6 {
    pub fn new(rx: f64, ry: f64, rz: f64, tx: f64, ty: f64, tz: f64) -> Self {
        Self { rx, ry, rz, tx, ty, tz }
    }

    /// Zero rotation, zero translation.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a pose from separate rotation and translation triples.
    pub fn from_arrays(rotation: [f64; 3], translation: [f64; 3]) -> Self {
        Self::new(
            rotation[0],
            rotation[1],
            rotation[2],
            translation[0],
            translation[1],
            translation[2],
        )
    }

    pub fn rotation(&self) -> [f64; 3] {
        [self.rx, self.ry, self.rz]
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.tx, self.ty, self.tz]
    }

    pub fn is_finite(&self) -> bool {
        self.rotation()
            .iter()
            .chain(self.translation().iter())
            .all(|v| v.is_finite())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// geometry_msgs-shaped primitives
// ────────────────────────────────────────────────────────────────────────────

/// Orientation as a quaternion, `geometry_msgs/Quaternion` field layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Position of a point in free space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A free vector (only rotation applies when transformed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Velocity-shaped payload; the mapping stage reuses it to carry the
/// pre-correction pose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound samples
// ────────────────────────────────────────────────────────────────────────────

/// High-rate, drift-prone pose from the odometry stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawOdometrySample {
    /// Seconds since the epoch of the upstream clock.
    pub stamp: f64,
    #[serde(default)]
    pub frame_id: String,
    #[serde(default)]
    pub child_frame_id: String,
    pub orientation: Quaternion,
    pub position: Point,
}

/// Low-rate, drift-corrected pose from the mapping stage.
///
/// The pre-correction pose is the raw pose at the instant the correction was
/// computed. It is expected in `pre_correction`; samples bridged from the
/// legacy pipeline carry it in `twist` instead (`angular` = rotation,
/// `linear` = translation, processing convention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MappingCorrectionSample {
    pub stamp: f64,
    pub orientation: Quaternion,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_correction: Option<Pose6>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twist: Option<Twist>,
}

impl MappingCorrectionSample {
    /// Resolve the pre-correction pose, preferring the explicit field.
    pub fn pre_correction_pose(&self) -> Option<Pose6> {
        self.pre_correction.or_else(|| {
            self.twist
                .map(|t| Pose6::from_arrays(t.angular.to_array(), t.linear.to_array()))
        })
    }
}

/// Either kind of inbound sample, tagged for JSON-lines replay files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundSample {
    Raw(RawOdometrySample),
    Correction(MappingCorrectionSample),
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound records
// ────────────────────────────────────────────────────────────────────────────

/// Drift-corrected pose emitted once per [`RawOdometrySample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FusedPoseSample {
    /// Copied from the triggering raw sample.
    pub stamp: f64,
    pub frame_id: String,
    pub child_frame_id: String,
    pub orientation: Quaternion,
    pub position: Point,
}

/// The fused pose as a named parent→child frame relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameTransformRecord {
    pub stamp: f64,
    pub parent_frame: String,
    pub child_frame: String,
    pub rotation: Quaternion,
    pub translation: Vector3,
}

impl From<&FusedPoseSample> for FrameTransformRecord {
    fn from(sample: &FusedPoseSample) -> Self {
        Self {
            stamp: sample.stamp,
            parent_frame: sample.frame_id.clone(),
            child_frame: sample.child_frame_id.clone(),
            rotation: sample.orientation,
            translation: Vector3::new(sample.position.x, sample.position.y, sample.position.z),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Event bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "odomfuse-middleware::odometry/raw"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    RawOdometry(RawOdometrySample),
    MappingCorrection(MappingCorrectionSample),
    FusedPose(FusedPoseSample),
    FrameTransform(FrameTransformRecord),
    /// A sample failed boundary validation and never reached the core.
    SampleRejected { origin: String, reason: String },
}

/// Error type for the boundary layers. The fusion core itself is total.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum FuseError {
    #[error("Invalid Sample: {0}")]
    InvalidSample(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Transport Error: {0}")]
    Transport(String),
}
