//! Lifecycle integration: activation, deterministic teardown, and
//! re-activation of the same graph.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mediagraph::core::{
    Graph, GraphSettings, PortRef, Progress, Result, Stage, StageConfig, StageContext, StageImpl,
    StageState, TestSource,
};
use mediagraph::core::{CountingSink, EventCategory, MediaType, PortDescriptor};

fn wait_for(counter: &AtomicU64, target: u64, deadline: Duration) -> u64 {
    let until = Instant::now() + deadline;
    while counter.load(Ordering::Relaxed) < target && Instant::now() < until {
        std::thread::sleep(Duration::from_millis(5));
    }
    counter.load(Ordering::Relaxed)
}

fn pipeline(count: u64) -> (Graph, Arc<AtomicU64>) {
    let seen = Arc::new(AtomicU64::new(0));
    let mut graph = Graph::new();
    graph
        .add_stage(Stage::new(
            "source",
            "test-source",
            Box::new(TestSource::from_config(&StageConfig::new().with("count", count)).unwrap()),
        ))
        .unwrap();
    graph
        .add_stage(Stage::new(
            "sink",
            "counting-sink",
            Box::new(CountingSink::with_counter(
                Arc::clone(&seen),
                &StageConfig::new(),
            )),
        ))
        .unwrap();
    graph
        .add_link(PortRef::new("source", "out"), PortRef::new("sink", "in"))
        .unwrap();
    graph.validate().unwrap();
    (graph, seen)
}

#[test]
fn test_activate_deactivate_leaves_every_stage_null() {
    let (mut graph, seen) = pipeline(10);
    graph.activate().unwrap();
    assert!(graph.is_active());

    assert_eq!(wait_for(&seen, 10, Duration::from_secs(2)), 10);

    graph.deactivate().unwrap();
    assert!(!graph.is_active());
    for stage in graph.stages() {
        assert_eq!(stage.state(), StageState::Null);
    }
    // Deactivation is idempotent.
    graph.deactivate().unwrap();
}

#[test]
fn test_same_graph_activates_again_after_teardown() {
    let (mut graph, seen) = pipeline(5);

    graph.activate().unwrap();
    assert_eq!(wait_for(&seen, 5, Duration::from_secs(2)), 5);
    graph.deactivate().unwrap();

    // Second run: static links are rewired, the source emits nothing
    // more (its budget is spent), and teardown still completes.
    graph.activate().unwrap();
    graph.deactivate().unwrap();
    for stage in graph.stages() {
        assert_eq!(stage.state(), StageState::Null);
    }
}

#[test]
fn test_teardown_lowers_consumers_before_producers() {
    let seen = Arc::new(AtomicU64::new(0));
    let mut graph = Graph::new();
    // Insertion order is deliberately consumer-first; teardown order
    // must follow the data flow, not insertion.
    graph
        .add_stage(Stage::new(
            "sink",
            "counting-sink",
            Box::new(CountingSink::with_counter(
                Arc::clone(&seen),
                &StageConfig::new(),
            )),
        ))
        .unwrap();
    graph
        .add_stage(Stage::new(
            "source",
            "test-source",
            Box::new(TestSource::from_config(&StageConfig::new().with("count", 5)).unwrap()),
        ))
        .unwrap();
    graph
        .add_link(PortRef::new("source", "out"), PortRef::new("sink", "in"))
        .unwrap();
    graph.validate().unwrap();
    let events = graph.take_events().unwrap();

    graph.activate().unwrap();
    assert_eq!(wait_for(&seen, 5, Duration::from_secs(2)), 5);
    graph.deactivate().unwrap();

    let to_null: Vec<String> = events
        .try_iter()
        .filter(|e| e.category == EventCategory::StateChanged && e.detail.contains("Ready -> Null"))
        .map(|e| e.origin)
        .collect();
    assert_eq!(to_null, vec!["sink".to_string(), "source".to_string()]);
}

#[test]
fn test_stuck_worker_is_detached_within_grace() {
    struct Wedged;

    impl StageImpl for Wedged {
        fn declared_ports(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::output("out", MediaType::any()).optional()]
        }

        fn process(&mut self, _ctx: &mut StageContext) -> Result<Progress> {
            // Ignores shutdown entirely.
            std::thread::sleep(Duration::from_secs(30));
            Ok(Progress::Continue)
        }
    }

    let mut graph = Graph::with_settings(GraphSettings {
        teardown_grace: Duration::from_millis(200),
        ..GraphSettings::default()
    });
    graph
        .add_stage(Stage::new("wedged", "custom", Box::new(Wedged)))
        .unwrap();
    graph.validate().unwrap();
    let events = graph.take_events().unwrap();

    graph.activate().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    graph.deactivate().unwrap();
    let elapsed = started.elapsed();

    // Teardown completed without waiting out the 30s sleep.
    assert!(elapsed < Duration::from_secs(2), "teardown took {elapsed:?}");
    assert_eq!(graph.stage("wedged").unwrap().state(), StageState::Null);

    let warned = events
        .try_iter()
        .any(|e| e.category == EventCategory::Warning && e.detail.contains("detaching"));
    assert!(warned, "expected a detach warning");
}
