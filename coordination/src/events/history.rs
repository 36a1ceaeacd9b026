//! In-memory debate transcript
//!
//! Owned by the caller; nothing here is global. Recording happens either
//! from a `solve` outcome or live, as a [`DebateCallback`].

use std::collections::HashMap;
use std::sync::Mutex;

use super::callback::DebateCallback;
use super::types::DebateEvent;

/// Ordered log of debate events
#[derive(Debug, Default)]
pub struct EventHistory {
    events: Mutex<Vec<DebateEvent>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: DebateEvent) {
        self.lock().push(event);
    }

    pub fn record_all(&self, events: impl IntoIterator<Item = DebateEvent>) {
        self.lock().extend(events);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DebateEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every recorded event
    pub fn events(&self) -> Vec<DebateEvent> {
        self.lock().clone()
    }

    /// Events of one type, in recording order
    pub fn of_type(&self, event_type: &str) -> Vec<DebateEvent> {
        self.lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Events of one debate, in recording order
    pub fn for_debate(&self, debate_id: &str) -> Vec<DebateEvent> {
        self.lock()
            .iter()
            .filter(|e| e.debate_id() == debate_id)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> EventStats {
        EventStats::from_events(&self.lock())
    }

    /// One JSON document per line
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for event in self.lock().iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl DebateCallback for EventHistory {
    fn on_event(&self, event: &DebateEvent) {
        self.record(event.clone());
    }
}

/// Summary counts over a set of events
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: HashMap<String, usize>,
    pub debates: usize,
    pub responses: usize,
    pub rounds_completed: usize,
    pub failures: usize,
    pub fatal_failures: usize,
}

impl EventStats {
    pub fn from_events(events: &[DebateEvent]) -> Self {
        let mut stats = Self::default();
        let mut debates = std::collections::HashSet::new();

        for event in events {
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            debates.insert(event.debate_id().to_string());

            match event {
                DebateEvent::AgentResponse { .. } => stats.responses += 1,
                DebateEvent::RoundComplete { .. } => stats.rounds_completed += 1,
                DebateEvent::AgentFailed { fatal, .. } => {
                    stats.failures += 1;
                    if *fatal {
                        stats.fatal_failures += 1;
                    }
                }
                _ => {}
            }
        }

        stats.debates = debates.len();
        stats
    }
}
