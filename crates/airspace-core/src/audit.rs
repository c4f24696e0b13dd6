//! Audit events for security-relevant state transitions.
//!
//! Audit records travel through [`AuditSink`], separate from ordinary
//! `tracing` diagnostics, so a deployment can route them to a file or a
//! message bus without scraping logs.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracing target used by [`TracingAuditSink`].
pub const AUDIT_TARGET: &str = "airspace::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Reservation refused because another vehicle holds the cell
    ReservationDenied,
    UnauthorizedRenew,
    UnauthorizedOccupy,
    UnauthorizedExit,
    OwnershipChanged,
    RestrictedEntered,
    NoFlyEntered,
    LeaseExpired,
    RevokeRequested,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: AuditSeverity,
    pub kind: AuditEventKind,
    pub cell_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(
        severity: AuditSeverity,
        kind: AuditEventKind,
        cell_id: Option<&str>,
        vehicle_id: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            kind,
            cell_id: cell_id.map(str::to_string),
            vehicle_id: vehicle_id.map(str::to_string),
            detail: detail.into(),
        }
    }
}

/// Destination for audit records. Implementations must not call back into
/// the engine.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Writes audit records as tracing events under [`AUDIT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        let cell_id = event.cell_id.as_deref().unwrap_or("-");
        let vehicle_id = event.vehicle_id.as_deref().unwrap_or("-");
        match event.severity {
            AuditSeverity::Critical => tracing::error!(
                target: AUDIT_TARGET,
                kind = ?event.kind,
                cell_id,
                vehicle_id,
                "{}",
                event.detail
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: AUDIT_TARGET,
                kind = ?event.kind,
                cell_id,
                vehicle_id,
                "{}",
                event.detail
            ),
            AuditSeverity::Info => tracing::info!(
                target: AUDIT_TARGET,
                kind = ?event.kind,
                cell_id,
                vehicle_id,
                "{}",
                event.detail
            ),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_of(&self, kind: AuditEventKind) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl AuditSink for RecordingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards each record to several sinks in order.
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }
}

impl AuditSink for FanoutAuditSink {
    fn emit(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
