//! Simulation event stream. Stage code pushes, the SSE layer pops.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    PressureApplied,
    TectonicStep,
    NicheEvaluated,
    PredationPrepared,
    MortalityComputed,
    GenesActivated,
    ReproductionApplied,
    ExtinctionsChecked,
    SpeciationRun,
    HabitatSnapshot,
    ReportBuilt,
    Complete,
    Stream,
    Heartbeat,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::PressureApplied => "pressure_applied",
            EventKind::TectonicStep => "tectonic_step",
            EventKind::NicheEvaluated => "niche_evaluated",
            EventKind::PredationPrepared => "predation_prepared",
            EventKind::MortalityComputed => "mortality_computed",
            EventKind::GenesActivated => "genes_activated",
            EventKind::ReproductionApplied => "reproduction_applied",
            EventKind::ExtinctionsChecked => "extinctions_checked",
            EventKind::SpeciationRun => "speciation_run",
            EventKind::HabitatSnapshot => "habitat_snapshot",
            EventKind::ReportBuilt => "report_built",
            EventKind::Complete => "complete",
            EventKind::Stream => "stream",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub category: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl SimEvent {
    pub fn new(kind: EventKind, message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            category: category.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Broadcast fan-out: every SSE connection gets its own receiver; events
/// preserve FIFO order per receiver.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SimEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn emit(&self, event: SimEvent) {
        tracing::debug!(kind = event.kind.as_str(), "{}", event.message);
        // No receivers is fine; events are advisory.
        let _ = self.tx.send(event);
    }

    pub fn emit_stage(&self, kind: EventKind, message: impl Into<String>) {
        self.emit(SimEvent::new(kind, message, "stage"));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit_stage(EventKind::Start, "turn start");
        bus.emit_stage(EventKind::Complete, "turn done");
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Start);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Complete);
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = SimEvent::new(EventKind::Stream, "chunk", "ai");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stream");
    }
}
