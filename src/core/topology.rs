//! Declarative topology descriptions.
//!
//! A topology file names stages (kind plus opaque config) and links
//! ("stage.port" endpoints, `*` for dynamic producer ports), and builds
//! into a validated [`Graph`] against a stage registry. YAML and JSON
//! are both accepted.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::config::StageConfig;
use super::error::{GraphError, Result};
use super::graph::{Graph, GraphSettings};
use super::ports::PortRef;
use super::registry::StageRegistry;

/// Optional per-graph tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsSpec {
    #[serde(default, rename = "queue-capacity")]
    pub queue_capacity: Option<usize>,
    #[serde(default, rename = "teardown-grace-ms")]
    pub teardown_grace_ms: Option<u64>,
}

/// One stage: unique name, registered kind, opaque configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: StageConfig,
}

/// One link between two "stage.port" endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSpec {
    pub from: String,
    pub to: String,
}

/// A complete graph description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologySpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: SettingsSpec,
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

fn parse_endpoint(raw: &str) -> Result<PortRef> {
    match raw.split_once('.') {
        Some((stage, port)) if !stage.is_empty() && !port.is_empty() => {
            Ok(PortRef::new(stage, port))
        }
        _ => Err(GraphError::Other(anyhow::anyhow!(
            "link endpoint '{raw}' must be of the form 'stage.port'"
        ))),
    }
}

impl TopologySpec {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let spec: Self = serde_yaml::from_str(text)
            .context("failed to parse topology YAML")
            .map_err(GraphError::Other)?;
        Ok(spec)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let spec: Self = serde_json::from_str(text)
            .context("failed to parse topology JSON")
            .map_err(GraphError::Other)?;
        Ok(spec)
    }

    /// Load from a file, dispatching on extension (`.json` is JSON,
    /// anything else is YAML).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e == "json") {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        }
    }

    /// Instantiate every stage and link and validate the result.
    pub fn build(&self, registry: &StageRegistry) -> Result<Graph> {
        let mut settings = GraphSettings::default();
        if let Some(capacity) = self.settings.queue_capacity {
            settings.queue_capacity = capacity;
        }
        if let Some(ms) = self.settings.teardown_grace_ms {
            settings.teardown_grace = Duration::from_millis(ms);
        }

        let mut graph = Graph::with_settings(settings);
        for stage in &self.stages {
            graph.add_stage(registry.create(&stage.kind, &stage.name, &stage.config)?)?;
        }
        for link in &self.links {
            graph.add_link(parse_endpoint(&link.from)?, parse_endpoint(&link.to)?)?;
        }
        graph.validate()?;
        if let Some(name) = &self.name {
            tracing::info!(topology = %name, stages = self.stages.len(), "topology built");
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FANOUT_YAML: &str = r#"
name: splitter
settings:
  queue-capacity: 4
stages:
  - name: source
    kind: test-source
    config:
      count: 10
  - name: sink-a
    kind: counting-sink
  - name: sink-b
    kind: counting-sink
links:
  - from: source.out
    to: sink-a.in
  - from: source.out
    to: sink-b.in
"#;

    #[test]
    fn test_parse_endpoint_shapes() {
        let ok = parse_endpoint("decoder.src_0").unwrap();
        assert_eq!(ok.stage, "decoder");
        assert_eq!(ok.port, "src_0");

        let wildcard = parse_endpoint("decoder.*").unwrap();
        assert!(wildcard.is_wildcard());

        assert!(parse_endpoint("decoder").is_err());
        assert!(parse_endpoint(".port").is_err());
        assert!(parse_endpoint("stage.").is_err());
    }

    #[test]
    fn test_yaml_round_trips_into_spec() {
        let spec = TopologySpec::from_yaml(FANOUT_YAML).unwrap();
        assert_eq!(spec.name.as_deref(), Some("splitter"));
        assert_eq!(spec.settings.queue_capacity, Some(4));
        assert_eq!(spec.stages.len(), 3);
        assert_eq!(spec.links.len(), 2);
        assert_eq!(spec.stages[0].config.get_u64("count"), Some(10));
    }

    #[test]
    fn test_build_fanout_graph() {
        let spec = TopologySpec::from_yaml(FANOUT_YAML).unwrap();
        let registry = StageRegistry::with_builtins();
        let graph = spec.build(&registry).unwrap();

        assert!(graph.is_validated());
        assert_eq!(graph.stages().count(), 3);
        // Two branches fan out of one producer port over a single link.
        let links: Vec<_> = graph.links().collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].branches().len(), 2);
    }

    #[test]
    fn test_unknown_kind_fails_build() {
        let spec = TopologySpec::from_yaml(
            r#"
stages:
  - name: x
    kind: no-such-kind
"#,
        )
        .unwrap();
        let err = spec.build(&StageRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownKind(_)));
    }

    #[test]
    fn test_json_accepted() {
        let spec = TopologySpec::from_json(
            r#"{"stages": [{"name": "s", "kind": "test-source", "config": {"count": 1}}]}"#,
        )
        .unwrap();
        assert_eq!(spec.stages.len(), 1);
    }
}
