//! Supervision: driving a graph to a terminal condition.
//!
//! The supervisor owns the graph and the consumer end of its event bus.
//! It activates the graph, then waits for the first terminal event: an
//! error from any stage fails the run, end of stream completes it, and
//! an external stop request (a signal handler flag) is honored as a
//! clean end of stream. Whatever the trigger, the same bounded teardown
//! runs before the terminal condition is reported, and the first
//! terminal event wins; later ones are logged and ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use super::error::{GraphError, Result};
use super::events::{EventCategory, StageEvent};
use super::graph::Graph;

/// How often the wait loop re-checks the external stop flag.
const POLL: Duration = Duration::from_millis(50);

/// Where the supervisor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCondition {
    /// End of stream, or an external stop request.
    Success,
    /// A stage reported a fatal error.
    Failure(String),
}

impl TerminalCondition {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalCondition::Success)
    }

    /// Process exit code: zero for success, non-zero for failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            TerminalCondition::Success => 0,
            TerminalCondition::Failure(_) => 1,
        }
    }
}

/// Hook for callers that want to see events and the terminal condition
/// without polling.
pub trait Observer: Send {
    fn on_event(&mut self, event: &StageEvent) {
        let _ = event;
    }

    fn on_terminal(&mut self, condition: &TerminalCondition) {
        let _ = condition;
    }
}

/// Runs one graph to completion.
pub struct Supervisor {
    graph: Graph,
    stop: Arc<AtomicBool>,
    observer: Option<Box<dyn Observer>>,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            stop: Arc::new(AtomicBool::new(false)),
            observer: None,
            state: SupervisorState::Idle,
        }
    }

    /// Use an externally owned stop flag (typically registered with a
    /// signal handler). Setting it ends the run as a clean end of
    /// stream.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// The flag that ends this run when set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn dispatch(&mut self, event: &StageEvent) {
        match event.category {
            EventCategory::Warning => {
                tracing::warn!(origin = %event.origin, "{}", event.detail);
            }
            EventCategory::Error => {
                tracing::error!(origin = %event.origin, "{}", event.detail);
            }
            _ => {
                tracing::debug!(origin = %event.origin, category = %event.category, "{}", event.detail);
            }
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(event);
        }
    }

    /// Activate (validating first if needed), wait for the first
    /// terminal event, tear the graph down, and report.
    pub fn run(mut self) -> Result<TerminalCondition> {
        let events = self.graph.take_events().ok_or_else(|| {
            GraphError::InvalidState("event receiver already taken from this graph".into())
        })?;

        if !self.graph.is_active() {
            if !self.graph.is_validated() {
                self.graph.validate()?;
            }
            self.graph.activate()?;
        }
        self.state = SupervisorState::Running;
        tracing::info!("supervisor running");

        let terminal = loop {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!("stop requested; treating as end of stream");
                break TerminalCondition::Success;
            }
            match events.recv_timeout(POLL) {
                Ok(event) => {
                    self.dispatch(&event);
                    match event.category {
                        EventCategory::Error => {
                            break TerminalCondition::Failure(format!(
                                "{}: {}",
                                event.origin, event.detail
                            ));
                        }
                        EventCategory::EndOfStream => break TerminalCondition::Success,
                        EventCategory::Warning | EventCategory::StateChanged => {}
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    break TerminalCondition::Failure("event bus closed unexpectedly".into());
                }
            }
        };

        self.state = SupervisorState::Draining;
        self.graph.deactivate()?;

        // Teardown itself can emit (state changes, detach warnings);
        // surface those before declaring the run over.
        while let Ok(event) = events.try_recv() {
            self.dispatch(&event);
        }

        self.state = SupervisorState::Stopped;
        if let Some(observer) = self.observer.as_mut() {
            observer.on_terminal(&terminal);
        }
        match &terminal {
            TerminalCondition::Success => tracing::info!("run complete"),
            TerminalCondition::Failure(reason) => tracing::error!(%reason, "run failed"),
        }
        Ok(terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Result;
    use crate::core::ports::{MediaType, PortDescriptor};
    use crate::core::stage::{Progress, Stage, StageContext, StageImpl};
    use parking_lot::Mutex;

    struct Finite {
        remaining: u64,
    }

    impl StageImpl for Finite {
        fn declared_ports(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::output("out", MediaType::any()).optional()]
        }

        fn process(&mut self, _ctx: &mut StageContext) -> Result<Progress> {
            if self.remaining == 0 {
                return Ok(Progress::Eos);
            }
            self.remaining -= 1;
            Ok(Progress::Continue)
        }
    }

    struct Faulty;

    impl StageImpl for Faulty {
        fn declared_ports(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::output("out", MediaType::any()).optional()]
        }

        fn process(&mut self, _ctx: &mut StageContext) -> Result<Progress> {
            Err(GraphError::Stage("decode failed".into()))
        }
    }

    struct Endless;

    impl StageImpl for Endless {
        fn declared_ports(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::output("out", MediaType::any()).optional()]
        }

        fn process(&mut self, _ctx: &mut StageContext) -> Result<Progress> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Progress::Continue)
        }
    }

    #[test]
    fn test_end_of_stream_is_success() {
        let mut graph = Graph::new();
        graph
            .add_stage(Stage::new("src", "finite", Box::new(Finite { remaining: 3 })))
            .unwrap();

        let terminal = Supervisor::new(graph).run().unwrap();
        assert!(terminal.is_success());
        assert_eq!(terminal.exit_code(), 0);
    }

    #[test]
    fn test_stage_error_is_failure() {
        let mut graph = Graph::new();
        graph
            .add_stage(Stage::new("src", "faulty", Box::new(Faulty)))
            .unwrap();

        let terminal = Supervisor::new(graph).run().unwrap();
        match &terminal {
            TerminalCondition::Failure(reason) => {
                assert!(reason.contains("src"));
                assert!(reason.contains("decode failed"));
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
        assert_eq!(terminal.exit_code(), 1);
    }

    #[test]
    fn test_stop_flag_ends_run_cleanly() {
        let mut graph = Graph::new();
        graph
            .add_stage(Stage::new("src", "endless", Box::new(Endless)))
            .unwrap();

        let supervisor = Supervisor::new(graph);
        let stop = supervisor.stop_flag();
        let handle = std::thread::spawn(move || supervisor.run());

        std::thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);

        let terminal = handle.join().unwrap().unwrap();
        assert!(terminal.is_success());
    }

    #[test]
    fn test_observer_sees_terminal_condition() {
        #[derive(Clone, Default)]
        struct Capture {
            terminal: Arc<Mutex<Option<TerminalCondition>>>,
        }

        impl Observer for Capture {
            fn on_terminal(&mut self, condition: &TerminalCondition) {
                *self.terminal.lock() = Some(condition.clone());
            }
        }

        let mut graph = Graph::new();
        graph
            .add_stage(Stage::new("src", "finite", Box::new(Finite { remaining: 1 })))
            .unwrap();

        let capture = Capture::default();
        let seen = Arc::clone(&capture.terminal);
        Supervisor::new(graph)
            .with_observer(Box::new(capture))
            .run()
            .unwrap();

        assert_eq!(*seen.lock(), Some(TerminalCondition::Success));
    }
}
