//! Identity transform.

use crate::core::config::StageConfig;
use crate::core::error::Result;
use crate::core::ports::{MediaType, PortDescriptor};
use crate::core::stage::{Progress, StageContext, StageImpl};

/// Forwards every buffer from `in` to `out` unchanged. Stands in for
/// any one-in-one-out transform when wiring and lifecycle are what is
/// under test.
///
/// Config keys: `media-type` (applied to both ports, default `*`).
pub struct Passthrough {
    media_type: MediaType,
    forwarded: u64,
}

impl Passthrough {
    pub fn from_config(cfg: &StageConfig) -> Result<Self> {
        Ok(Self {
            media_type: cfg
                .get_str("media-type")
                .map(MediaType::new)
                .unwrap_or_else(MediaType::any),
            forwarded: 0,
        })
    }
}

impl StageImpl for Passthrough {
    fn declared_ports(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("in", self.media_type.clone()),
            PortDescriptor::output("out", self.media_type.clone()),
        ]
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<Progress> {
        match ctx.pull("in") {
            Some(buffer) => {
                ctx.push("out", buffer);
                self.forwarded += 1;
                Ok(Progress::Continue)
            }
            None => {
                tracing::debug!(forwarded = self.forwarded, "input closed");
                Ok(Progress::Eos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ports::PortDirection;

    #[test]
    fn test_declares_matching_ports() {
        let stage =
            Passthrough::from_config(&StageConfig::new().with("media-type", "video/x-h264"))
                .unwrap();
        let ports = stage.declared_ports();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].direction, PortDirection::Input);
        assert_eq!(ports[1].direction, PortDirection::Output);
        assert_eq!(ports[0].media_type, ports[1].media_type);
    }
}
