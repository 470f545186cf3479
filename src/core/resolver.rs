//! Port resolution: reconciling runtime-announced ports with pending
//! links.
//!
//! Links whose producer port is dynamic start out pending; the consumer
//! side of such a link is wired eagerly when the link is declared, so
//! resolution only has to hand the producer its output. That makes it
//! safe to resolve from the producer's own worker thread, which is
//! exactly where announcements originate.
//!
//! A duplicate announcement against an already resolved link is reported
//! as a warning and skipped, never treated as an error.

use std::sync::Arc;

use parking_lot::Mutex;

use super::events::{EventSender, StageEvent};
use super::link::Link;
use super::ports::PortDescriptor;
use super::stage::Stage;

/// Matches ports announced at run time against the pending links that
/// wait for them.
pub struct PortResolver {
    links: Mutex<Vec<Arc<Link>>>,
    events: EventSender,
}

impl PortResolver {
    pub fn new(events: EventSender) -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(Vec::new()),
            events,
        })
    }

    /// Track a link whose producer port may appear later.
    pub(crate) fn track(&self, link: Arc<Link>) {
        self.links.lock().push(link);
    }

    /// Handle one announced output port on `stage`.
    ///
    /// Resolves every pending link the port satisfies; an announcement
    /// that matches only already-resolved links yields one warning per
    /// link and no other effect; an announcement matching nothing is
    /// tolerated silently (the stage may expose streams the topology
    /// does not consume).
    pub fn on_port_appeared(&self, stage: &Arc<Stage>, descriptor: PortDescriptor) {
        let (port, newly_added) = stage.add_runtime_port(descriptor);
        tracing::debug!(
            stage = stage.name(),
            port = port.name(),
            media_type = %port.media_type(),
            newly_added,
            "output port appeared"
        );

        let candidates: Vec<Arc<Link>> = self
            .links
            .lock()
            .iter()
            .filter(|l| l.matches_appeared(stage.name(), port.name(), port.media_type()))
            .cloned()
            .collect();

        if candidates.is_empty() {
            tracing::debug!(
                stage = stage.name(),
                port = port.name(),
                "no link waiting for this port"
            );
            return;
        }

        for link in candidates {
            if link.is_resolved() {
                self.events.emit(StageEvent::warning(
                    stage.name(),
                    format!("port {} already linked; skipping", port.name()),
                ));
                continue;
            }
            if !port.mark_linked() {
                self.events.emit(StageEvent::warning(
                    stage.name(),
                    format!("port {} already linked; skipping", port.name()),
                ));
                continue;
            }
            stage.set_output_handle(port.name(), Arc::clone(link.output()));
            link.mark_resolved();
            tracing::info!(
                stage = stage.name(),
                port = port.name(),
                link = link.id(),
                "pending link resolved"
            );
        }
    }

    /// Revert every dynamic link to pending. Called on deactivation so a
    /// later activation renegotiates from scratch.
    pub(crate) fn reset(&self) {
        for link in self.links.lock().iter() {
            if link.is_dynamic() {
                link.mark_pending();
            }
        }
    }
}
