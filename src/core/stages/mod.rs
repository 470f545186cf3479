//! Built-in stage kinds.
//!
//! These cover the needs of self-contained topologies and tests:
//! deterministic sources, a passthrough transform, a decoder-style
//! source whose output ports appear at run time, and two sinks. Real
//! deployments register their own kinds alongside these.

mod counting_sink;
mod dynamic_source;
mod null_sink;
mod passthrough;
mod test_source;

pub use counting_sink::CountingSink;
pub use dynamic_source::DynamicSource;
pub use null_sink::NullSink;
pub use passthrough::Passthrough;
pub use test_source::TestSource;

use super::registry::StageRegistry;
use super::stage::StageImpl;

pub(crate) fn register_builtins(registry: &mut StageRegistry) {
    registry.register("test-source", |cfg| {
        Ok(Box::new(TestSource::from_config(cfg)?) as Box<dyn StageImpl>)
    });
    registry.register("dynamic-source", |cfg| {
        Ok(Box::new(DynamicSource::from_config(cfg)?) as Box<dyn StageImpl>)
    });
    registry.register("passthrough", |cfg| {
        Ok(Box::new(Passthrough::from_config(cfg)?) as Box<dyn StageImpl>)
    });
    registry.register("counting-sink", |cfg| {
        Ok(Box::new(CountingSink::from_config(cfg)?) as Box<dyn StageImpl>)
    });
    registry.register("null-sink", |cfg| {
        Ok(Box::new(NullSink::from_config(cfg)?) as Box<dyn StageImpl>)
    });
}
