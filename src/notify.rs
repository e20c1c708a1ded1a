//! Event delivery.
//!
//! The [`Notifier`] hands each [`ChangeEvent`] of a cycle to an
//! [`EventSink`], one synchronous call per event.  A failing sink call is
//! logged and counted; the remaining events of the cycle are still
//! delivered.  New arrivals with a non-empty name are announced through an
//! optional [`Announcer`] first.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::types::{ChangeEvent, Record};

/// Consumer of classified events.
pub trait EventSink: Send + Sync {
    fn on_added(&self, id: &str, display_name: &str, record: &Record) -> anyhow::Result<()>;
    fn on_changed(&self, id: &str, display_name: &str, record: &Record) -> anyhow::Result<()>;
    fn on_removed(&self, id: &str) -> anyhow::Result<()>;
}

/// Fire-and-forget, user-visible message (a toast, a desktop notification).
pub trait Announcer: Send + Sync {
    fn announce(&self, message: &str);
}

/// Outcome of delivering one cycle's events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Notifier {
    sink: Arc<dyn EventSink>,
    announcer: Option<Arc<dyn Announcer>>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            announcer: None,
        }
    }

    pub fn with_announcer(mut self, announcer: Arc<dyn Announcer>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    pub fn deliver(&self, events: &[ChangeEvent]) -> Delivery {
        let mut report = Delivery::default();
        for event in events {
            match self.deliver_one(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Event sink failed on {} event for {}: {:#}",
                        kind(event),
                        event.id(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn deliver_one(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        match event {
            ChangeEvent::Added { id, record } => {
                if let Some(announcer) = &self.announcer {
                    let name = record.announce_name();
                    if !name.is_empty() {
                        announcer.announce(&format!("{} is now available", name));
                    }
                }
                self.sink.on_added(id, &record.display_name(), record)
            }
            ChangeEvent::Changed { id, record } => {
                self.sink.on_changed(id, &record.display_name(), record)
            }
            ChangeEvent::Removed { id } => self.sink.on_removed(id),
        }
    }
}

fn kind(event: &ChangeEvent) -> &'static str {
    match event {
        ChangeEvent::Added { .. } => "added",
        ChangeEvent::Changed { .. } => "changed",
        ChangeEvent::Removed { .. } => "removed",
    }
}

/// Forwards events into a channel so they can cross to another task.
/// The channel is unbounded so a burst of events is never cut short; only a
/// closed receiver counts as a failed delivery.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ChangeEvent>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: ChangeEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("event channel closed, dropped {}", e.0.id()))
    }
}

impl EventSink for ChannelSink {
    fn on_added(&self, id: &str, _display_name: &str, record: &Record) -> anyhow::Result<()> {
        self.forward(ChangeEvent::Added {
            id: id.to_string(),
            record: record.clone(),
        })
    }

    fn on_changed(&self, id: &str, _display_name: &str, record: &Record) -> anyhow::Result<()> {
        self.forward(ChangeEvent::Changed {
            id: id.to_string(),
            record: record.clone(),
        })
    }

    fn on_removed(&self, id: &str) -> anyhow::Result<()> {
        self.forward(ChangeEvent::Removed { id: id.to_string() })
    }
}

pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&self, message: &str) {
        info!("{}", message);
    }
}
