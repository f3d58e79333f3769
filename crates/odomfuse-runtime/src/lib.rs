//! `odomfuse-runtime` – the transform maintenance node.
//!
//! Wires the fusion core to its boundary: samples come in through a
//! [`SampleSource`][odomfuse_middleware::SampleSource], fused poses go out
//! through a [`FusedPoseSink`][odomfuse_middleware::FusedPoseSink] and a
//! [`TransformBroadcaster`][odomfuse_middleware::TransformBroadcaster].
//!
//! # Modules
//!
//! - [`maintenance`] – [`TransformMaintenance`][maintenance::TransformMaintenance]:
//!   owns the pose store and fusion engine, and handles raw and correction
//!   samples strictly one at a time.
//! - [`broadcast`] – [`SharedFrameTree`][broadcast::SharedFrameTree] and
//!   [`TransformFanout`][broadcast::TransformFanout] broadcaster targets.
//! - [`replay`] – JSON-lines sample source and fused-pose sink for offline
//!   runs.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod broadcast;
pub mod maintenance;
pub mod replay;
pub mod telemetry;

pub use broadcast::{SharedFrameTree, TransformFanout};
pub use maintenance::{FrameConfig, MaintenanceStats, TransformMaintenance};
pub use replay::{JsonLinesSink, JsonLinesSource};
pub use telemetry::{TracerProviderGuard, init_tracing};
