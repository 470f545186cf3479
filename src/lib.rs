//! A runtime engine for directed media-processing graphs.
//!
//! Applications describe a topology of stages (sources, transforms,
//! sinks) connected by typed links, then hand it to a supervisor that
//! activates the graph, routes stage events, and guarantees bounded
//! teardown on end of stream, error, or an external stop request.
//!
//! ```no_run
//! use mediagraph::core::{StageRegistry, Supervisor, TopologySpec};
//!
//! # fn main() -> mediagraph::core::Result<()> {
//! let spec = TopologySpec::from_yaml(
//!     r#"
//! stages:
//!   - name: source
//!     kind: test-source
//!     config: { count: 100 }
//!   - name: sink
//!     kind: counting-sink
//! links:
//!   - from: source.out
//!     to: sink.in
//! "#,
//! )?;
//! let graph = spec.build(&StageRegistry::with_builtins())?;
//! let terminal = Supervisor::new(graph).run()?;
//! assert!(terminal.is_success());
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use core::{
    Buffer, EventBus, EventCategory, EventSender, Graph, GraphError, GraphSettings, MediaType,
    Observer, Port, PortDescriptor, PortDirection, PortRef, Progress, Result, Stage, StageClass,
    StageConfig, StageContext, StageEvent, StageImpl, StageRegistry, StageState, Supervisor,
    SupervisorState, TerminalCondition, TopologySpec,
};
