//! Sink that counts what it receives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::config::StageConfig;
use crate::core::error::Result;
use crate::core::ports::{MediaType, PortDescriptor};
use crate::core::stage::{Progress, StageContext, StageImpl};

/// Consumes buffers on `in` and counts them into a shared counter,
/// which callers can hold on to across the stage's lifetime.
///
/// Config keys: `media-type` (default `*`), `log-every` (emit a debug
/// line every N buffers, default off).
pub struct CountingSink {
    seen: Arc<AtomicU64>,
    media_type: MediaType,
    log_every: Option<u64>,
}

impl CountingSink {
    pub fn from_config(cfg: &StageConfig) -> Result<Self> {
        Ok(Self::with_counter(
            Arc::new(AtomicU64::new(0)),
            cfg,
        ))
    }

    /// Build around an externally owned counter, so tests and embedding
    /// applications can observe throughput directly.
    pub fn with_counter(seen: Arc<AtomicU64>, cfg: &StageConfig) -> Self {
        Self {
            seen,
            media_type: cfg
                .get_str("media-type")
                .map(MediaType::new)
                .unwrap_or_else(MediaType::any),
            log_every: cfg.get_u64("log-every"),
        }
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.seen)
    }
}

impl StageImpl for CountingSink {
    fn declared_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::input("in", self.media_type.clone())]
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<Progress> {
        match ctx.pull("in") {
            Some(_) => {
                let total = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(every) = self.log_every {
                    if total % every == 0 {
                        tracing::debug!(stage = ctx.stage_name(), total, "buffers received");
                    }
                }
                Ok(Progress::Continue)
            }
            None => {
                tracing::debug!(
                    stage = ctx.stage_name(),
                    total = self.seen.load(Ordering::Relaxed),
                    "input closed"
                );
                Ok(Progress::Eos)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_shared() {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = CountingSink::with_counter(Arc::clone(&seen), &StageConfig::new());
        sink.counter().fetch_add(3, Ordering::Relaxed);
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_declares_one_required_input() {
        let sink = CountingSink::from_config(&StageConfig::new()).unwrap();
        let ports = sink.declared_ports();
        assert_eq!(ports.len(), 1);
        assert!(ports[0].required);
    }
}
