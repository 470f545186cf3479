//! Deterministic buffer source.

use std::time::Duration;

use crate::core::buffers::Buffer;
use crate::core::config::StageConfig;
use crate::core::error::Result;
use crate::core::ports::{MediaType, PortDescriptor};
use crate::core::stage::{Progress, StageContext, StageImpl};

/// Granularity of the pacing sleep, so shutdown can interrupt it.
const PACE_POLL: Duration = Duration::from_millis(20);

/// Emits a configurable number of buffers on `out`, optionally paced,
/// then reports end of stream.
///
/// Config keys: `count` (buffers to emit; absent means unbounded),
/// `interval-ms` (pacing between buffers, default 0), `media-type`
/// (default `*`), `payload-bytes` (buffer size, default 0).
pub struct TestSource {
    remaining: Option<u64>,
    seq: u64,
    interval: Duration,
    media_type: MediaType,
    payload: Vec<u8>,
}

impl TestSource {
    pub fn from_config(cfg: &StageConfig) -> Result<Self> {
        let media_type = cfg
            .get_str("media-type")
            .map(MediaType::new)
            .unwrap_or_else(MediaType::any);
        Ok(Self {
            remaining: cfg.get_u64("count"),
            seq: 0,
            interval: Duration::from_millis(cfg.get_u64("interval-ms").unwrap_or(0)),
            media_type,
            payload: vec![0u8; cfg.get_u64("payload-bytes").unwrap_or(0) as usize],
        })
    }

    fn pace(&self, ctx: &StageContext) {
        let mut left = self.interval;
        while !left.is_zero() && !ctx.shutting_down() {
            let step = left.min(PACE_POLL);
            std::thread::sleep(step);
            left -= step;
        }
    }
}

impl StageImpl for TestSource {
    fn declared_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::output("out", self.media_type.clone())]
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<Progress> {
        if self.remaining == Some(0) {
            return Ok(Progress::Eos);
        }
        self.pace(ctx);
        if ctx.shutting_down() {
            return Ok(Progress::Eos);
        }
        ctx.push("out", Buffer::new(self.seq, self.payload.clone()));
        self.seq += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(Progress::Continue)
    }
}
