//! Stage registry: kind string to implementation factory.
//!
//! Topologies name stages by kind; the registry turns a kind plus an
//! opaque configuration into a live stage. Applications extend the
//! built-in set by registering their own factories before building a
//! graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::config::StageConfig;
use super::error::{GraphError, Result};
use super::stage::{Stage, StageImpl};
use super::stages;

type Factory = Box<dyn Fn(&StageConfig) -> Result<Box<dyn StageImpl>> + Send + Sync>;

/// Maps stage-kind names to factories.
pub struct StageRegistry {
    factories: BTreeMap<String, Factory>,
}

impl StageRegistry {
    /// An empty registry with no kinds.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry preloaded with the built-in stage kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        stages::register_builtins(&mut registry);
        registry
    }

    /// Register a factory for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StageConfig) -> Result<Box<dyn StageImpl>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.factories.insert(kind.clone(), Box::new(factory)).is_some() {
            tracing::debug!(kind, "replacing stage factory");
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiate a stage of `kind` named `name`, applying `config`
    /// exactly once at construction.
    pub fn create(&self, kind: &str, name: &str, config: &StageConfig) -> Result<Arc<Stage>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| GraphError::UnknownKind(kind.to_string()))?;
        let imp = factory(config).map_err(|e| match e {
            GraphError::InvalidConfig { .. } => e,
            other => GraphError::InvalidConfig {
                stage: name.to_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(Stage::new(name, kind, imp))
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ports::{MediaType, PortDescriptor};
    use crate::core::stage::{Progress, StageClass, StageContext};

    struct Noop;

    impl StageImpl for Noop {
        fn declared_ports(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::output("out", MediaType::any())]
        }

        fn process(&mut self, _ctx: &mut StageContext) -> Result<Progress> {
            Ok(Progress::Eos)
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let registry = StageRegistry::new();
        let err = registry
            .create("no-such-kind", "x", &StageConfig::new())
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownKind(_)));
    }

    #[test]
    fn test_registered_kind_builds_a_stage() {
        let mut registry = StageRegistry::new();
        registry.register("noop", |_cfg| Ok(Box::new(Noop) as Box<dyn StageImpl>));

        let stage = registry.create("noop", "src0", &StageConfig::new()).unwrap();
        assert_eq!(stage.name(), "src0");
        assert_eq!(stage.kind(), "noop");
        assert_eq!(stage.class(), StageClass::Source);
    }

    #[test]
    fn test_factory_error_surfaces_as_invalid_config() {
        let mut registry = StageRegistry::new();
        registry.register("fussy", |cfg: &StageConfig| {
            if cfg.get_str("uri").is_none() {
                return Err(GraphError::Stage("uri is required".into()));
            }
            Ok(Box::new(Noop) as Box<dyn StageImpl>)
        });

        let err = registry
            .create("fussy", "cam0", &StageConfig::new())
            .unwrap_err();
        match err {
            GraphError::InvalidConfig { stage, reason } => {
                assert_eq!(stage, "cam0");
                assert!(reason.contains("uri"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builtins_present() {
        let registry = StageRegistry::with_builtins();
        assert!(registry.contains("test-source"));
        assert!(registry.contains("passthrough"));
        assert!(registry.contains("counting-sink"));
    }
}
