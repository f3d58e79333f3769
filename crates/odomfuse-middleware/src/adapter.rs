//! Seams between the fusion node and the outside world.
//!
//! The node never owns a transport.  It is handed a [`SampleSource`] to read
//! from and a [`FusedPoseSink`] / [`TransformBroadcaster`] pair to write to;
//! the boundary layer creates, owns and tears those down.
//!
//! # Contract
//!
//! * Sinks are called synchronously from inside the raw-sample handler,
//!   exactly once per raw sample.  They must not block; queueing and
//!   backpressure are their own business.
//! * A source yields samples in the order they should be handled and returns
//!   `None` once it is exhausted or its transport has shut down.

use async_trait::async_trait;
use odomfuse_types::{FrameTransformRecord, FuseError, FusedPoseSample, InboundSample};

/// Receives every fused pose.
pub trait FusedPoseSink: Send + Sync {
    fn publish_fused(&self, sample: &FusedPoseSample) -> Result<(), FuseError>;
}

/// Receives the fused pose re-expressed as a frame relationship.
pub trait TransformBroadcaster: Send + Sync {
    fn send_transform(&self, record: &FrameTransformRecord) -> Result<(), FuseError>;
}

/// Supplies inbound samples to the fusion node.
#[async_trait]
pub trait SampleSource: Send {
    async fn next_sample(&mut self) -> Option<InboundSample>;
}
