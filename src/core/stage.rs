//! Stages: the unit of work in a graph.
//!
//! A stage wraps one opaque processing collaborator ([`StageImpl`])
//! behind declared input/output ports and a strictly ordered local state
//! machine (Null, Ready, Paused, Playing). The engine only ever asks the
//! collaborator three things: its declared ports, consent to a state
//! transition, and one unit of processing work; everything codec-,
//! model- or transport-specific stays on the collaborator's side.
//!
//! State transitions move exactly one level at a time in both
//! directions, so a stage always releases resources acquired at one
//! level before the next release below it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use super::buffers::Buffer;
use super::error::{GraphError, Result};
use super::events::{EventSender, StageEvent};
use super::link::LinkOutput;
use super::ports::{Port, PortDescriptor, PortDirection};
use super::resolver::PortResolver;

/// How often a blocked pull re-checks the shutdown flag.
const RECV_POLL: Duration = Duration::from_millis(20);

/// Local lifecycle state of one stage.
///
/// Ordered: Null < Ready < Paused < Playing. The graph walks this ladder
/// one rung at a time and never skips a level, up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl StageState {
    /// The next state one level toward `target`, or `self` if already
    /// there.
    pub fn step_toward(self, target: StageState) -> StageState {
        use StageState::*;
        match self.cmp(&target) {
            std::cmp::Ordering::Equal => self,
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Capability class derived from a stage's declared ports. The engine
/// trusts ports, not kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageClass {
    Source,
    Transform,
    Sink,
}

/// Outcome of one unit of collaborator work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More work to do; call `process` again.
    Continue,
    /// The stage has delivered everything it will ever deliver.
    Eos,
}

/// The stage-implementation collaborator contract.
///
/// Implementations own all signal-processing specifics; the engine calls
/// `process` from a dedicated worker thread while the stage is Playing.
pub trait StageImpl: Send + 'static {
    /// Ports this stage exposes. Static ports are instantiated at stage
    /// creation; dynamic descriptors are templates for ports the stage
    /// announces later through [`StageContext::port_appeared`].
    fn declared_ports(&self) -> Vec<PortDescriptor>;

    /// Consent hook for a single-level state transition. Rejecting
    /// fails the enclosing lifecycle walk.
    fn on_state_request(&mut self, target: StageState) -> Result<()> {
        let _ = target;
        Ok(())
    }

    /// One unit of work: pull inputs, process, push outputs.
    fn process(&mut self, ctx: &mut StageContext) -> Result<Progress>;
}

/// Execution context handed to a collaborator's `process` call.
///
/// Pull blocks on an empty input queue and push blocks on a full
/// single-branch output queue, both re-checking the shutdown flag so
/// teardown can always interrupt them.
pub struct StageContext {
    stage: Arc<Stage>,
    events: EventSender,
    resolver: Arc<PortResolver>,
    shutdown: Arc<AtomicBool>,
    inputs: HashMap<String, Receiver<Buffer>>,
}

impl StageContext {
    pub(crate) fn new(
        stage: Arc<Stage>,
        events: EventSender,
        resolver: Arc<PortResolver>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let inputs = stage.input_receivers();
        Self {
            stage,
            events,
            resolver,
            shutdown,
            inputs,
        }
    }

    pub fn stage_name(&self) -> &str {
        self.stage.name()
    }

    pub fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Blocking pull from an input port. Returns `None` when the queue
    /// is closed or the graph is shutting down.
    pub fn pull(&self, port: &str) -> Option<Buffer> {
        let rx = match self.inputs.get(port) {
            Some(rx) => rx,
            None => {
                tracing::trace!(stage = self.stage.name(), port, "pull on unknown input");
                return None;
            }
        };
        loop {
            if self.shutting_down() {
                return None;
            }
            match rx.recv_timeout(RECV_POLL) {
                Ok(buffer) => return Some(buffer),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Push a buffer to an output port. A push on an output with no
    /// resolved link drops the buffer (optional, unused outputs are
    /// tolerated after activation).
    pub fn push(&self, port: &str, buffer: Buffer) {
        let output = self.stage.output_handle(port);
        match output {
            Some(output) => output.push(buffer, &self.shutdown),
            None => {
                tracing::trace!(stage = self.stage.name(), port, "push on unlinked output");
            }
        }
    }

    /// Announce a dynamic output port discovered at run time. The port
    /// resolver reconciles it against pending links; duplicate
    /// announcements are reported as warnings, never errors.
    pub fn port_appeared(&mut self, descriptor: PortDescriptor) {
        debug_assert_eq!(descriptor.direction, PortDirection::Output);
        self.resolver.on_port_appeared(&self.stage, descriptor);
    }

    /// Post an informational event on the bus.
    pub fn emit(&self, event: StageEvent) {
        self.events.emit(event);
    }

    pub fn warn(&self, detail: impl Into<String>) {
        self.events
            .emit(StageEvent::warning(self.stage.name(), detail));
    }
}

/// One stage owned by a graph: identity, ports, state machine and the
/// collaborator behind it.
pub struct Stage {
    name: String,
    kind: String,
    class: StageClass,
    state: Mutex<StageState>,
    ports: Mutex<Vec<Arc<Port>>>,
    dynamic_templates: Vec<PortDescriptor>,
    imp: Mutex<Option<Box<dyn StageImpl>>>,
    outputs: Mutex<HashMap<String, Arc<LinkOutput>>>,
    inputs: Mutex<HashMap<String, Receiver<Buffer>>>,
}

impl Stage {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, imp: Box<dyn StageImpl>) -> Arc<Self> {
        let declared = imp.declared_ports();

        let has_input = declared
            .iter()
            .any(|d| d.direction == PortDirection::Input);
        let has_output = declared
            .iter()
            .any(|d| d.direction == PortDirection::Output);
        let class = match (has_input, has_output) {
            (false, _) => StageClass::Source,
            (true, true) => StageClass::Transform,
            (true, false) => StageClass::Sink,
        };

        let (dynamic_templates, static_ports): (Vec<_>, Vec<_>) =
            declared.into_iter().partition(|d| d.dynamic);

        Arc::new(Self {
            name: name.into(),
            kind: kind.into(),
            class,
            state: Mutex::new(StageState::Null),
            ports: Mutex::new(static_ports.into_iter().map(Port::new).collect()),
            dynamic_templates,
            imp: Mutex::new(Some(imp)),
            outputs: Mutex::new(HashMap::new()),
            inputs: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn class(&self) -> StageClass {
        self.class
    }

    pub fn state(&self) -> StageState {
        *self.state.lock()
    }

    pub fn find_port(&self, name: &str) -> Option<Arc<Port>> {
        self.ports.lock().iter().find(|p| p.name() == name).cloned()
    }

    pub fn ports(&self) -> Vec<Arc<Port>> {
        self.ports.lock().clone()
    }

    /// Dynamic port descriptors declared but not yet announced.
    pub fn dynamic_templates(&self) -> &[PortDescriptor] {
        &self.dynamic_templates
    }

    /// Instantiate a runtime-announced port. Returns the port and
    /// whether it was newly added (false means this name already
    /// appeared before).
    pub(crate) fn add_runtime_port(&self, descriptor: PortDescriptor) -> (Arc<Port>, bool) {
        let mut ports = self.ports.lock();
        if let Some(existing) = ports.iter().find(|p| p.name() == descriptor.name) {
            return (Arc::clone(existing), false);
        }
        let port = Port::new(descriptor);
        ports.push(Arc::clone(&port));
        (port, true)
    }

    /// Walk the state ladder one level at a time until `target`,
    /// consulting the collaborator at every rung and reporting each
    /// completed transition on the bus.
    pub fn set_state(&self, target: StageState, events: &EventSender) -> Result<StageState> {
        loop {
            let current = self.state();
            if current == target {
                return Ok(current);
            }
            let next = current.step_toward(target);
            if let Some(imp) = self.imp.lock().as_mut() {
                imp.on_state_request(next)
                    .map_err(|e| GraphError::StateTransitionRejected {
                        stage: self.name.clone(),
                        target: next,
                        reason: e.to_string(),
                    })?;
            }
            *self.state.lock() = next;
            tracing::debug!(stage = %self.name, %current, %next, "state changed");
            events.emit(StageEvent::state_changed(
                &self.name,
                format!("{current} -> {next}"),
            ));
        }
    }

    /// Force the state without consulting the collaborator. Teardown
    /// path for stages whose worker missed the grace period: resources
    /// are released by detaching, and teardown must still complete.
    pub(crate) fn force_state(&self, target: StageState, events: &EventSender) {
        let current = self.state();
        if current == target {
            return;
        }
        *self.state.lock() = target;
        events.emit(StageEvent::state_changed(
            &self.name,
            format!("{current} -> {target} (forced)"),
        ));
    }

    pub(crate) fn take_impl(&self) -> Option<Box<dyn StageImpl>> {
        self.imp.lock().take()
    }

    pub(crate) fn restore_impl(&self, imp: Box<dyn StageImpl>) {
        *self.imp.lock() = Some(imp);
    }

    pub(crate) fn set_input(&self, port: impl Into<String>, rx: Receiver<Buffer>) {
        self.inputs.lock().insert(port.into(), rx);
    }

    pub(crate) fn input_receivers(&self) -> HashMap<String, Receiver<Buffer>> {
        self.inputs.lock().clone()
    }

    pub(crate) fn set_output_handle(&self, port: impl Into<String>, output: Arc<LinkOutput>) {
        self.outputs.lock().insert(port.into(), output);
    }

    pub(crate) fn output_handle(&self, port: &str) -> Option<Arc<LinkOutput>> {
        self.outputs.lock().get(port).cloned()
    }

    /// Discard everything that only exists while activated: live output
    /// handles, dynamically appeared ports, and any undrained input
    /// buffers.
    pub(crate) fn clear_runtime_wiring(&self) {
        self.outputs.lock().clear();
        self.ports.lock().retain(|p| !p.is_dynamic());
        for rx in self.inputs.lock().values() {
            while rx.try_recv().is_ok() {}
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("class", &self.class)
            .field("state", &self.state())
            .finish()
    }
}
