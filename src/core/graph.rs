//! Graph assembly and lifecycle.
//!
//! A graph owns stages, links, the event bus and the port resolver, and
//! walks the whole ensemble through build, validate, activate and
//! deactivate. Validation is an explicit step: activation refuses to run
//! on a graph whose topology changed since it last validated.
//!
//! Activation raises stages producers-first in topological order, one
//! state level at a time, then hands each stage its own worker thread.
//! Deactivation reverses that order and bounds every join with a grace
//! timeout; a worker that misses the deadline is detached and reported
//! as a warning so teardown always completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::error::{GraphError, Result};
use super::events::{EventBus, EventSender, StageEvent};
use super::link::{Link, DEFAULT_QUEUE_CAPACITY};
use super::ports::{PortDirection, PortRef};
use super::resolver::PortResolver;
use super::stage::{Progress, Stage, StageContext, StageImpl, StageState};

/// Tunables for one graph.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Bounded capacity of each link branch queue.
    pub queue_capacity: usize,
    /// How long deactivation waits for each worker before detaching it.
    pub teardown_grace: Duration,
    /// Capacity of the event bus.
    pub event_capacity: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            teardown_grace: Duration::from_secs(2),
            event_capacity: EventBus::DEFAULT_CAPACITY,
        }
    }
}

struct Worker {
    stage: Arc<Stage>,
    handle: JoinHandle<()>,
    done_rx: Receiver<Box<dyn StageImpl>>,
}

/// A directed media-processing graph.
pub struct Graph {
    stages: Vec<Arc<Stage>>,
    by_name: HashMap<String, usize>,
    links: Vec<Arc<Link>>,
    bus: EventBus,
    events: EventSender,
    resolver: Arc<PortResolver>,
    settings: GraphSettings,
    shutdown: Arc<AtomicBool>,
    workers: Vec<Worker>,
    /// Topological activation order; `None` until validated, cleared by
    /// any topology mutation.
    order: Option<Vec<usize>>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("stages", &self.stages)
            .field("links", &self.links)
            .field("settings", &self.settings)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_settings(GraphSettings::default())
    }

    pub fn with_settings(settings: GraphSettings) -> Self {
        let bus = EventBus::new(settings.event_capacity);
        let events = bus.sender();
        let resolver = PortResolver::new(events.clone());
        Self {
            stages: Vec::new(),
            by_name: HashMap::new(),
            links: Vec::new(),
            bus,
            events,
            resolver,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            order: None,
        }
    }

    /// Take the single consumer end of the event bus.
    pub fn take_events(&mut self) -> Option<Receiver<StageEvent>> {
        self.bus.take_receiver()
    }

    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Shared flag the supervisor and signal handlers use to interrupt
    /// blocked workers.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn is_validated(&self) -> bool {
        self.order.is_some()
    }

    pub fn stage(&self, name: &str) -> Option<&Arc<Stage>> {
        self.by_name.get(name).map(|&i| &self.stages[i])
    }

    pub fn stages(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.stages.iter()
    }

    pub fn links(&self) -> impl Iterator<Item = &Arc<Link>> {
        self.links.iter()
    }

    /// Add a stage under its unique name.
    pub fn add_stage(&mut self, stage: Arc<Stage>) -> Result<()> {
        if self.is_active() {
            return Err(GraphError::InvalidState(
                "cannot add stages to an active graph".into(),
            ));
        }
        let name = stage.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(GraphError::DuplicateStage(name));
        }
        tracing::debug!(stage = %name, kind = stage.kind(), "stage added");
        self.by_name.insert(name, self.stages.len());
        self.stages.push(stage);
        self.order = None;
        Ok(())
    }

    /// Declare a link from a producer port to a consumer port.
    ///
    /// The consumer side is wired immediately: its bounded queue exists
    /// from this moment, whether or not the producer port does. A second
    /// link from the same producer port fans out onto the existing link
    /// as a new branch. A producer port that is neither a static port
    /// nor covered by a dynamic template is rejected; a consumer port
    /// may be linked at most once.
    pub fn add_link(&mut self, producer: PortRef, consumer: PortRef) -> Result<()> {
        if self.is_active() {
            return Err(GraphError::InvalidState(
                "cannot add links to an active graph".into(),
            ));
        }
        let consumer_stage = Arc::clone(
            self.stage(&consumer.stage)
                .ok_or_else(|| GraphError::NoSuchStage(consumer.stage.clone()))?,
        );
        let consumer_port = consumer_stage
            .find_port(&consumer.port)
            .filter(|p| p.direction() == PortDirection::Input)
            .ok_or_else(|| GraphError::NoSuchPort {
                stage: consumer.stage.clone(),
                port: consumer.port.clone(),
            })?;
        let producer_stage = Arc::clone(
            self.stage(&producer.stage)
                .ok_or_else(|| GraphError::NoSuchStage(producer.stage.clone()))?,
        );

        let (offered, dynamic) = match producer_stage.find_port(&producer.port) {
            Some(port) if port.direction() == PortDirection::Output => {
                (port.media_type().clone(), false)
            }
            _ => {
                let template = producer_stage
                    .dynamic_templates()
                    .iter()
                    .find(|d| producer.is_wildcard() || d.name == producer.port)
                    .ok_or_else(|| GraphError::NoSuchPort {
                        stage: producer.stage.clone(),
                        port: producer.port.clone(),
                    })?;
                (template.media_type.clone(), true)
            }
        };

        let expected = consumer_port.media_type().clone();
        if !offered.compatible(&expected) {
            return Err(GraphError::TypeMismatch {
                producer: producer.to_string(),
                offered: offered.as_str().to_string(),
                consumer: consumer.to_string(),
                expected: expected.as_str().to_string(),
            });
        }

        if !consumer_port.mark_linked() {
            return Err(GraphError::ConsumerAlreadyLinked {
                stage: consumer.stage.clone(),
                port: consumer.port.clone(),
            });
        }

        let capacity = self.settings.queue_capacity;
        let (tx, rx) = bounded(capacity);
        consumer_stage.set_input(&consumer.port, rx);

        let link = match self.links.iter().find(|l| l.producer() == &producer) {
            Some(existing) => Arc::clone(existing),
            None => {
                let media = if expected.is_any() { offered } else { expected };
                let link = Link::new(producer.clone(), media, dynamic);
                if dynamic {
                    self.resolver.track(Arc::clone(&link));
                } else if let Some(port) = producer_stage.find_port(&producer.port) {
                    port.mark_linked();
                }
                self.links.push(Arc::clone(&link));
                link
            }
        };
        tracing::debug!(
            link = link.id(),
            %producer,
            %consumer,
            fan_out = link.branches().len() + 1,
            "link branch added"
        );
        link.add_branch(consumer, capacity, tx);
        self.order = None;
        Ok(())
    }

    /// Check structural integrity and compute the activation order.
    ///
    /// Every required port must be linked (pending links count: their
    /// consumers are wired) and the link relation must be acyclic.
    pub fn validate(&mut self) -> Result<()> {
        for stage in &self.stages {
            for port in stage.ports() {
                if port.is_required() && !port.is_linked() {
                    return Err(match port.direction() {
                        PortDirection::Input => GraphError::UnboundRequiredPort {
                            stage: stage.name().to_string(),
                            port: port.name().to_string(),
                        },
                        PortDirection::Output => GraphError::UnboundRequiredOutput {
                            stage: stage.name().to_string(),
                            port: port.name().to_string(),
                        },
                    });
                }
            }
        }

        let mut dag = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.stages.len()).map(|i| dag.add_node(i)).collect();
        for link in &self.links {
            let p = self.by_name[&link.producer().stage];
            for branch in link.branches() {
                let c = self.by_name[&branch.consumer.stage];
                dag.update_edge(nodes[p], nodes[c], ());
            }
        }
        match toposort(&dag, None) {
            Ok(order) => {
                self.order = Some(order.into_iter().map(|n| dag[n]).collect());
            }
            Err(cycle) => {
                let name = self.stages[dag[cycle.node_id()]].name().to_string();
                return Err(GraphError::CyclicTopology(name));
            }
        }
        tracing::info!(
            stages = self.stages.len(),
            links = self.links.len(),
            "graph validated"
        );
        Ok(())
    }

    /// Bring every stage to Playing and start its worker.
    ///
    /// Refuses to run unless the current topology has been validated.
    /// If any stage rejects a transition, already-raised stages are
    /// walked back to Null and the error is returned.
    pub fn activate(&mut self) -> Result<()> {
        let order = self.order.clone().ok_or(GraphError::NotValidated)?;
        if self.is_active() {
            return Err(GraphError::InvalidState("graph is already active".into()));
        }
        self.shutdown.store(false, Ordering::SeqCst);

        // Static producer outputs are re-wired on every activation
        // (deactivation strips them).
        for link in &self.links {
            if !link.is_dynamic() {
                if let Some(stage) = self.stage(&link.producer().stage) {
                    stage.set_output_handle(&link.producer().port, Arc::clone(link.output()));
                }
            }
        }

        let mut raised: Vec<Arc<Stage>> = Vec::new();
        for &i in &order {
            let stage = Arc::clone(&self.stages[i]);
            if let Err(e) = stage.set_state(StageState::Playing, &self.events) {
                raised.push(stage);
                for s in raised.iter().rev() {
                    if s.set_state(StageState::Null, &self.events).is_err() {
                        s.force_state(StageState::Null, &self.events);
                    }
                }
                return Err(e);
            }
            raised.push(stage);
        }

        for &i in &order {
            self.spawn_worker(Arc::clone(&self.stages[i]))?;
        }
        tracing::info!(stages = order.len(), "graph activated");
        Ok(())
    }

    fn spawn_worker(&mut self, stage: Arc<Stage>) -> Result<()> {
        let imp = stage.take_impl().ok_or_else(|| {
            GraphError::InvalidState(format!(
                "stage '{}' has no implementation attached",
                stage.name()
            ))
        })?;
        let events = self.events.clone();
        let resolver = Arc::clone(&self.resolver);
        let shutdown = Arc::clone(&self.shutdown);
        let (done_tx, done_rx) = bounded::<Box<dyn StageImpl>>(1);
        let thread_stage = Arc::clone(&stage);

        let handle = thread::Builder::new()
            .name(stage.name().to_string())
            .spawn(move || {
                let mut imp = imp;
                let mut ctx = StageContext::new(
                    Arc::clone(&thread_stage),
                    events.clone(),
                    resolver,
                    Arc::clone(&shutdown),
                );
                loop {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    match imp.process(&mut ctx) {
                        Ok(Progress::Continue) => {}
                        Ok(Progress::Eos) => {
                            if !shutdown.load(Ordering::Relaxed) {
                                events.emit(StageEvent::end_of_stream(thread_stage.name()));
                            }
                            break;
                        }
                        Err(e) => {
                            if !shutdown.load(Ordering::Relaxed) {
                                events.emit(StageEvent::error(thread_stage.name(), e.to_string()));
                            }
                            break;
                        }
                    }
                }
                let _ = done_tx.send(imp);
            })?;

        self.workers.push(Worker {
            stage,
            handle,
            done_rx,
        });
        Ok(())
    }

    /// Stop workers and walk every stage back to Null. Idempotent.
    ///
    /// Workers are reaped in reverse activation order, each with the
    /// configured grace period; one that fails to stop in time is
    /// detached with a warning rather than blocking teardown. Dynamic
    /// ports are removed and dynamic links revert to pending, so a later
    /// activation renegotiates from scratch.
    pub fn deactivate(&mut self) -> Result<()> {
        if self.workers.is_empty() && self.stages.iter().all(|s| s.state() == StageState::Null) {
            return Ok(());
        }
        self.shutdown.store(true, Ordering::SeqCst);
        let grace = self.settings.teardown_grace;

        let workers: Vec<Worker> = self.workers.drain(..).collect();
        for worker in workers.into_iter().rev() {
            let Worker {
                stage,
                handle,
                done_rx,
            } = worker;
            match done_rx.recv_timeout(grace) {
                Ok(imp) => {
                    if handle.join().is_err() {
                        self.events
                            .emit(StageEvent::warning(stage.name(), "worker thread panicked"));
                    }
                    stage.restore_impl(imp);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = handle.join();
                    self.events
                        .emit(StageEvent::warning(stage.name(), "worker thread panicked"));
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.events.emit(StageEvent::warning(
                        stage.name(),
                        format!("worker did not stop within {grace:?}; detaching"),
                    ));
                    drop(handle);
                }
            }
        }

        // Same reverse activation order as the worker reap above, so
        // consumers reach Null before their producers. Insertion order
        // stands in when the graph never validated.
        let downward: Vec<usize> = match &self.order {
            Some(order) => order.iter().rev().copied().collect(),
            None => (0..self.stages.len()).rev().collect(),
        };
        for i in downward {
            let stage = &self.stages[i];
            if stage.state() != StageState::Null
                && stage.set_state(StageState::Null, &self.events).is_err()
            {
                stage.force_state(StageState::Null, &self.events);
            }
            stage.clear_runtime_wiring();
        }
        self.resolver.reset();
        tracing::info!("graph deactivated");
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if self.is_active() {
            let _ = self.deactivate();
        }
    }
}
