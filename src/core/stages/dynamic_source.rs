//! Decoder-style source whose output ports appear at run time.

use crate::core::buffers::Buffer;
use crate::core::config::StageConfig;
use crate::core::error::Result;
use crate::core::ports::{MediaType, PortDescriptor};
use crate::core::stage::{Progress, StageContext, StageImpl, StageState};

/// Announces its output ports (`src_0` .. `src_{streams-1}`) only once
/// processing starts, the way container demuxers and decoders discover
/// their streams, then emits `count` buffers on each.
///
/// Config keys: `streams` (default 1), `count` (default 10),
/// `media-type` (default `video/x-raw`), `announce-twice` (re-announce
/// `src_0`, default false; duplicate announcements must surface as a
/// warning, not an error).
pub struct DynamicSource {
    streams: u64,
    remaining: u64,
    seq: u64,
    media_type: MediaType,
    announce_twice: bool,
    announced: bool,
}

impl DynamicSource {
    pub fn from_config(cfg: &StageConfig) -> Result<Self> {
        Ok(Self {
            streams: cfg.get_u64("streams").unwrap_or(1).max(1),
            remaining: cfg.get_u64("count").unwrap_or(10),
            seq: 0,
            media_type: cfg
                .get_str("media-type")
                .map(MediaType::new)
                .unwrap_or_else(|| MediaType::new("video/x-raw")),
            announce_twice: cfg.get_bool("announce-twice").unwrap_or(false),
            announced: false,
        })
    }

    fn port_name(index: u64) -> String {
        format!("src_{index}")
    }
}

impl StageImpl for DynamicSource {
    fn declared_ports(&self) -> Vec<PortDescriptor> {
        (0..self.streams)
            .map(|i| PortDescriptor::dynamic_output(Self::port_name(i), self.media_type.clone()))
            .collect()
    }

    fn on_state_request(&mut self, target: StageState) -> Result<()> {
        // Dynamic wiring is stripped at teardown; announce again on the
        // next activation so pending links can renegotiate.
        if target == StageState::Null {
            self.announced = false;
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<Progress> {
        if !self.announced {
            for i in 0..self.streams {
                ctx.port_appeared(PortDescriptor::dynamic_output(
                    Self::port_name(i),
                    self.media_type.clone(),
                ));
            }
            if self.announce_twice {
                ctx.port_appeared(PortDescriptor::dynamic_output(
                    Self::port_name(0),
                    self.media_type.clone(),
                ));
            }
            self.announced = true;
        }

        if self.remaining == 0 {
            return Ok(Progress::Eos);
        }
        for i in 0..self.streams {
            ctx.push(&Self::port_name(i), Buffer::new(self.seq, Vec::new()));
        }
        self.seq += 1;
        self.remaining -= 1;
        Ok(Progress::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let src = DynamicSource::from_config(&StageConfig::new()).unwrap();
        assert_eq!(src.streams, 1);
        assert_eq!(src.remaining, 10);
        assert!(!src.announce_twice);
    }

    #[test]
    fn test_all_declared_ports_are_dynamic() {
        let src =
            DynamicSource::from_config(&StageConfig::new().with("streams", 3)).unwrap();
        let ports = src.declared_ports();
        assert_eq!(ports.len(), 3);
        assert!(ports.iter().all(|p| p.dynamic));
        assert_eq!(ports[2].name, "src_2");
    }

    #[test]
    fn test_zero_streams_clamped_to_one() {
        let src = DynamicSource::from_config(&StageConfig::new().with("streams", 0)).unwrap();
        assert_eq!(src.streams, 1);
    }

    #[test]
    fn test_return_to_null_resets_announcement() {
        let mut src = DynamicSource::from_config(&StageConfig::new()).unwrap();
        src.announced = true;

        src.on_state_request(StageState::Ready).unwrap();
        assert!(src.announced);
        src.on_state_request(StageState::Null).unwrap();
        assert!(!src.announced);
    }
}
