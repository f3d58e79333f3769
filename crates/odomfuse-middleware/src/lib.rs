//! `odomfuse-middleware` – boundary adapters around the fusion core.
//!
//! Moves pose samples between the outside world and the fusion node without
//! caring about the algebra in between.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`adapter`] – the sink and source traits the fusion node is wired
//!   through.
//! - [`validation`] – rejects malformed samples before they reach the core.
//! - [`odometry_adapter`] – [`OdometryAdapter`]: validates and publishes
//!   inbound samples, and publishes fused output onto the bus.
//! - [`rosbridge`] – JSON codec for `rosbridge`-style `nav_msgs/Odometry` and
//!   `tf2_msgs/TFMessage` frames.
//! - [`ws_bridge`] – WebSocket endpoint speaking the rosbridge codec.

pub mod adapter;
pub mod bus;
pub mod odometry_adapter;
pub mod rosbridge;
pub mod validation;
pub mod ws_bridge;

pub use adapter::{FusedPoseSink, SampleSource, TransformBroadcaster};
pub use bus::{EventBus, Topic, TopicReceiver};
pub use odometry_adapter::{BusSampleSource, OdometryAdapter};
pub use rosbridge::RosbridgeCodec;
pub use ws_bridge::WsBridge;
