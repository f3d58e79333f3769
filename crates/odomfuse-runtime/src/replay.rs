//! JSON-lines replay.
//!
//! A replay file holds one [`InboundSample`] per line, tagged with
//! `"kind": "raw"` or `"kind": "correction"`.  Blank lines and lines starting
//! with `#` are skipped; lines that fail to parse are logged and skipped so a
//! single corrupt record does not end the replay.
//!
//! ```text
//! {"kind":"correction","stamp":0.0,"orientation":{"x":0,"y":0,"z":0,"w":1},"position":{"x":0,"y":0,"z":0},"pre_correction":{"rx":0,"ry":0,"rz":0,"tx":0,"ty":0,"tz":0}}
//! {"kind":"raw","stamp":0.1,"orientation":{"x":0,"y":0,"z":0,"w":1},"position":{"x":1,"y":0,"z":0}}
//! ```

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use odomfuse_middleware::{FusedPoseSink, SampleSource};
use odomfuse_types::{FuseError, FusedPoseSample, InboundSample};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

/// Reads tagged samples from any async line source.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
    skipped: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Lines that could not be parsed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> SampleSource for JsonLinesSource<R> {
    async fn next_sample(&mut self) -> Option<InboundSample> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!(line = self.line_no + 1, error = %e, "replay input unreadable");
                    return None;
                }
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<InboundSample>(trimmed) {
                Ok(sample) => return Some(sample),
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %e, "skipping malformed replay line");
                }
            }
        }
    }
}

/// Writes each fused sample as one JSON line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, FuseError> {
        self.writer
            .into_inner()
            .map_err(|_| FuseError::Channel("replay writer lock poisoned".to_string()))
    }
}

impl<W: Write + Send> FusedPoseSink for JsonLinesSink<W> {
    fn publish_fused(&self, sample: &FusedPoseSample) -> Result<(), FuseError> {
        let line =
            serde_json::to_string(sample).map_err(|e| FuseError::Serialization(e.to_string()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| FuseError::Channel("replay writer lock poisoned".to_string()))?;
        writeln!(writer, "{line}").map_err(|e| FuseError::Transport(e.to_string()))
    }
}
