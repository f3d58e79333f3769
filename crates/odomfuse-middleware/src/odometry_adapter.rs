//! Odometry adapter.
//!
//! [`OdometryAdapter`] bridges between external odometry producers and the
//! internal [`EventBus`]:
//!
//! * **Inbound** – raw and correction samples are validated and published on
//!   the single [`Topic::InboundOdometry`] lane, so their relative order is
//!   kept.  Rejected samples are reported on [`Topic::SystemAlerts`] and
//!   never reach the fusion node.
//!
//! * **Outbound** – the adapter is the node's [`FusedPoseSink`] and
//!   [`TransformBroadcaster`], publishing onto [`Topic::IntegratedOdometry`]
//!   and [`Topic::FrameTransforms`].
//!
//! [`BusSampleSource`] closes the loop: it reads the inbound lane and feeds
//! the node.

use std::sync::Arc;

use async_trait::async_trait;
use odomfuse_types::{
    Event, EventPayload, FrameTransformRecord, FuseError, FusedPoseSample, InboundSample,
    MappingCorrectionSample, RawOdometrySample,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::adapter::{FusedPoseSink, SampleSource, TransformBroadcaster};
use crate::bus::{EventBus, Topic, TopicReceiver};
use crate::validation::{validate_correction, validate_raw};

const RAW_SOURCE: &str = "odomfuse-middleware::odometry/raw";
const CORRECTION_SOURCE: &str = "odomfuse-middleware::odometry/correction";
const FUSED_SOURCE: &str = "odomfuse-middleware::odometry/integrated";
const TF_SOURCE: &str = "odomfuse-middleware::tf";

/// Validates inbound samples and publishes fused output on the bus.
#[derive(Clone)]
pub struct OdometryAdapter {
    bus: Arc<EventBus>,
}

impl OdometryAdapter {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Validate and publish a raw odometry sample.
    pub fn ingest_raw(&self, sample: RawOdometrySample) -> Result<usize, FuseError> {
        if let Err(e) = validate_raw(&sample) {
            self.report_rejection(RAW_SOURCE, &e);
            return Err(e);
        }
        self.bus.publish_to(
            Topic::InboundOdometry,
            Event::new(RAW_SOURCE, EventPayload::RawOdometry(sample)),
        )
    }

    /// Validate and publish a mapping correction sample.
    pub fn ingest_correction(&self, sample: MappingCorrectionSample) -> Result<usize, FuseError> {
        if let Err(e) = validate_correction(&sample) {
            self.report_rejection(CORRECTION_SOURCE, &e);
            return Err(e);
        }
        self.bus.publish_to(
            Topic::InboundOdometry,
            Event::new(CORRECTION_SOURCE, EventPayload::MappingCorrection(sample)),
        )
    }

    pub fn ingest(&self, sample: InboundSample) -> Result<usize, FuseError> {
        match sample {
            InboundSample::Raw(raw) => self.ingest_raw(raw),
            InboundSample::Correction(correction) => self.ingest_correction(correction),
        }
    }

    fn report_rejection(&self, origin: &str, error: &FuseError) {
        warn!(origin, error = %error, "rejected inbound sample");
        let event = Event::new(
            origin,
            EventPayload::SampleRejected {
                origin: origin.to_string(),
                reason: error.to_string(),
            },
        );
        // Nobody listening for alerts is not a failure of the ingest path.
        let _ = self.bus.publish_to(Topic::SystemAlerts, event);
    }
}

impl FusedPoseSink for OdometryAdapter {
    fn publish_fused(&self, sample: &FusedPoseSample) -> Result<(), FuseError> {
        let event = Event::new(FUSED_SOURCE, EventPayload::FusedPose(sample.clone()));
        match self.bus.publish_to(Topic::IntegratedOdometry, event) {
            Ok(_) => Ok(()),
            Err(FuseError::Channel(_)) => {
                debug!(stamp = sample.stamp, "no subscribers for fused pose");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl TransformBroadcaster for OdometryAdapter {
    fn send_transform(&self, record: &FrameTransformRecord) -> Result<(), FuseError> {
        let event = Event::new(TF_SOURCE, EventPayload::FrameTransform(record.clone()));
        match self.bus.publish_to(Topic::FrameTransforms, event) {
            Ok(_) => Ok(()),
            Err(FuseError::Channel(_)) => {
                debug!(stamp = record.stamp, "no subscribers for frame transform");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus-backed sample source
// ---------------------------------------------------------------------------

/// Reads raw and correction samples off the bus, in publication order.
pub struct BusSampleSource {
    inbound: TopicReceiver,
}

impl BusSampleSource {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            inbound: bus.subscribe_to(Topic::InboundOdometry),
        }
    }
}

#[async_trait]
impl SampleSource for BusSampleSource {
    async fn next_sample(&mut self) -> Option<InboundSample> {
        loop {
            match self.inbound.recv().await {
                Ok(event) => match event.payload {
                    EventPayload::RawOdometry(sample) => return Some(InboundSample::Raw(sample)),
                    EventPayload::MappingCorrection(sample) => {
                        return Some(InboundSample::Correction(sample));
                    }
                    _ => continue,
                },
                Err(RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "fusion input lagged; samples dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
