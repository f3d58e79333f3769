//! rosbridge JSON codec.
//!
//! Speaks the `rosbridge_server` v2 wire format: every frame is a JSON object
//! `{"op": "publish", "topic": "...", "msg": {...}}`.  Inbound frames on the
//! configured raw / correction topics carry `nav_msgs/Odometry`; outbound,
//! fused samples are rendered as `nav_msgs/Odometry` and frame records as
//! `tf2_msgs/TFMessage`.
//!
//! The mapping stage of the upstream pipeline publishes its pre-correction
//! pose in the correction message's `twist.twist` field (angular = rotation,
//! linear = translation).  The codec forwards that payload untouched; the
//! sample type decides how to interpret it.

use odomfuse_types::{
    FrameTransformRecord, FuseError, FusedPoseSample, InboundSample, MappingCorrectionSample,
    Point, Quaternion, RawOdometrySample, Twist, Vector3,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RAW_TOPIC: &str = "/laser_odom_to_init";
pub const DEFAULT_CORRECTION_TOPIC: &str = "/aft_mapped_to_init";
pub const DEFAULT_OUTPUT_TOPIC: &str = "/integrated_to_init";
pub const DEFAULT_TF_TOPIC: &str = "/tf";

const NAV_ODOMETRY: &str = "nav_msgs/Odometry";
const TF_MESSAGE: &str = "tf2_msgs/TFMessage";

// ────────────────────────────────────────────────────────────────────────────
// Message shapes
// ────────────────────────────────────────────────────────────────────────────

/// `builtin_interfaces/Time`.  ROS 1 field names are accepted on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Time {
    #[serde(alias = "secs")]
    pub sec: i64,
    #[serde(alias = "nsecs", default)]
    pub nanosec: u32,
}

impl Time {
    pub fn from_seconds(stamp: f64) -> Self {
        let mut sec = stamp.floor();
        let mut nanosec = ((stamp - sec) * 1e9).round();
        if nanosec >= 1e9 {
            sec += 1.0;
            nanosec = 0.0;
        }
        Self {
            sec: sec as i64,
            nanosec: nanosec as u32,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        self.sec as f64 + f64::from(self.nanosec) * 1e-9
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub stamp: Time,
    #[serde(default)]
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    #[serde(default)]
    pub covariance: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwistWithCovariance {
    pub twist: Twist,
    #[serde(default)]
    pub covariance: Vec<f64>,
}

/// `nav_msgs/Odometry`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub header: Header,
    #[serde(default)]
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twist: Option<TwistWithCovariance>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vector3,
    pub rotation: Quaternion,
}

/// `geometry_msgs/TransformStamped`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: Transform,
}

/// `tf2_msgs/TFMessage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfMessage {
    pub transforms: Vec<TransformStamped>,
}

/// A rosbridge operation frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub op: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub msg_type: Option<String>,
    pub msg: Option<T>,
}

// ────────────────────────────────────────────────────────────────────────────
// Codec
// ────────────────────────────────────────────────────────────────────────────

/// Topic-aware translator between rosbridge frames and odomfuse samples.
#[derive(Debug, Clone)]
pub struct RosbridgeCodec {
    raw_topic: String,
    correction_topic: String,
    output_topic: String,
    tf_topic: String,
}

impl RosbridgeCodec {
    pub fn new(
        raw_topic: impl Into<String>,
        correction_topic: impl Into<String>,
        output_topic: impl Into<String>,
    ) -> Self {
        Self {
            raw_topic: raw_topic.into(),
            correction_topic: correction_topic.into(),
            output_topic: output_topic.into(),
            tf_topic: DEFAULT_TF_TOPIC.to_string(),
        }
    }

    pub fn with_tf_topic(mut self, tf_topic: impl Into<String>) -> Self {
        self.tf_topic = tf_topic.into();
        self
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    pub fn tf_topic(&self) -> &str {
        &self.tf_topic
    }

    /// Decode one inbound text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames this codec does not handle
    /// (other ops, other topics).  Malformed JSON or a malformed odometry
    /// message on a handled topic is a [`FuseError::Serialization`].
    pub fn decode(&self, text: &str) -> Result<Option<InboundSample>, FuseError> {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(text).map_err(|e| FuseError::Serialization(e.to_string()))?;
        if envelope.op != "publish" {
            return Ok(None);
        }
        let is_raw = envelope.topic == self.raw_topic;
        if !is_raw && envelope.topic != self.correction_topic {
            return Ok(None);
        }
        let Some(msg) = envelope.msg else {
            return Err(FuseError::Serialization(format!(
                "publish on {} carries no msg",
                envelope.topic
            )));
        };
        let odom: Odometry = serde_json::from_value(msg)
            .map_err(|e| FuseError::Serialization(format!("{}: {e}", envelope.topic)))?;

        let stamp = odom.header.stamp.as_seconds();
        let pose = odom.pose.pose;
        let sample = if is_raw {
            InboundSample::Raw(RawOdometrySample {
                stamp,
                frame_id: odom.header.frame_id,
                child_frame_id: odom.child_frame_id,
                orientation: pose.orientation,
                position: pose.position,
            })
        } else {
            InboundSample::Correction(MappingCorrectionSample {
                stamp,
                orientation: pose.orientation,
                position: pose.position,
                pre_correction: None,
                twist: odom.twist.map(|t| t.twist),
            })
        };
        Ok(Some(sample))
    }

    /// Render a fused sample as a publish frame on the output topic.
    pub fn encode_fused(&self, sample: &FusedPoseSample) -> Result<String, FuseError> {
        let msg = Odometry {
            header: Header {
                stamp: Time::from_seconds(sample.stamp),
                frame_id: sample.frame_id.clone(),
            },
            child_frame_id: sample.child_frame_id.clone(),
            pose: PoseWithCovariance {
                pose: Pose {
                    position: sample.position,
                    orientation: sample.orientation,
                },
                covariance: vec![0.0; 36],
            },
            twist: None,
        };
        publish_frame(&self.output_topic, NAV_ODOMETRY, msg)
    }

    /// Render a frame record as a single-transform `TFMessage` publish frame.
    pub fn encode_transform(&self, record: &FrameTransformRecord) -> Result<String, FuseError> {
        let msg = TfMessage {
            transforms: vec![TransformStamped {
                header: Header {
                    stamp: Time::from_seconds(record.stamp),
                    frame_id: record.parent_frame.clone(),
                },
                child_frame_id: record.child_frame.clone(),
                transform: Transform {
                    translation: record.translation,
                    rotation: record.rotation,
                },
            }],
        };
        publish_frame(&self.tf_topic, TF_MESSAGE, msg)
    }
}

impl Default for RosbridgeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_RAW_TOPIC, DEFAULT_CORRECTION_TOPIC, DEFAULT_OUTPUT_TOPIC)
    }
}

fn publish_frame<T: Serialize>(topic: &str, msg_type: &str, msg: T) -> Result<String, FuseError> {
    let envelope = Envelope {
        op: "publish".to_string(),
        topic: topic.to_string(),
        msg_type: Some(msg_type.to_string()),
        msg: Some(msg),
    };
    serde_json::to_string(&envelope).map_err(|e| FuseError::Serialization(e.to_string()))
}
