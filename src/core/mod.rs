//! Core engine: stages, ports, links, graph assembly and supervision.

pub mod buffers;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod link;
pub mod ports;
pub mod registry;
pub mod resolver;
pub mod signals;
pub mod stage;
pub mod stages;
pub mod supervisor;
pub mod topology;

pub use buffers::Buffer;
pub use config::StageConfig;
pub use error::{GraphError, Result};
pub use events::{EventBus, EventCategory, EventSender, StageEvent};
pub use graph::{Graph, GraphSettings};
pub use link::{Link, LinkState, DEFAULT_QUEUE_CAPACITY};
pub use ports::{MediaType, Port, PortDescriptor, PortDirection, PortRef};
pub use registry::StageRegistry;
pub use resolver::PortResolver;
pub use stage::{Progress, Stage, StageClass, StageContext, StageImpl, StageState};
pub use stages::{CountingSink, DynamicSource, NullSink, Passthrough, TestSource};
pub use supervisor::{Observer, Supervisor, SupervisorState, TerminalCondition};
pub use topology::{LinkSpec, SettingsSpec, StageSpec, TopologySpec};
