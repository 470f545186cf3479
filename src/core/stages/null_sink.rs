//! Sink that discards everything.

use crate::core::config::StageConfig;
use crate::core::error::Result;
use crate::core::ports::{MediaType, PortDescriptor};
use crate::core::stage::{Progress, StageContext, StageImpl};

/// Consumes and drops buffers on `in`. The terminal branch of a fan-out
/// when only one branch's output matters.
///
/// Config keys: `media-type` (default `*`).
pub struct NullSink {
    media_type: MediaType,
}

impl NullSink {
    pub fn from_config(cfg: &StageConfig) -> Result<Self> {
        Ok(Self {
            media_type: cfg
                .get_str("media-type")
                .map(MediaType::new)
                .unwrap_or_else(MediaType::any),
        })
    }
}

impl StageImpl for NullSink {
    fn declared_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::input("in", self.media_type.clone())]
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<Progress> {
        match ctx.pull("in") {
            Some(_) => Ok(Progress::Continue),
            None => Ok(Progress::Eos),
        }
    }
}
