// ==============================================================================
// audit.rs - Audit Logging for Analysis Sessions
// ==============================================================================
// Description: Structured audit trail of session lifecycle events
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Events are emitted as tracing events on the "audit" target, so any
// subscriber layer (stdout, JSON, file) can route them separately.
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionCreated,
    SessionExpired,
    SessionRemoved,

    UploadAccepted,
    UploadRejected,

    AnalysisStarted,
    AnalysisCompleted,
    AnalysisFailed,
    AnalysisCancelled,

    LaneDegraded,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub session_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        session_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            AuditEventType::UploadRejected
            | AuditEventType::AnalysisCancelled
            | AuditEventType::LaneDegraded => LogSeverity::Warning,

            AuditEventType::AnalysisFailed => LogSeverity::Error,

            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            session_id,
            details,
            severity,
        }
    }

    /// Emit the event on the audit target
    pub fn log(&self) {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| self.details.to_string());
        let session = self
            .session_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        match self.severity {
            LogSeverity::Info => {
                info!(target: "audit", event = ?self.event_type, session = %session, "{}", payload)
            }
            LogSeverity::Warning => {
                warn!(target: "audit", event = ?self.event_type, session = %session, "{}", payload)
            }
            LogSeverity::Error => {
                error!(target: "audit", event = ?self.event_type, session = %session, "{}", payload)
            }
        }
    }
}

/// Convenience function to build and emit an audit event
pub fn log_event(
    event_type: AuditEventType,
    session_id: Option<Uuid>,
    details: serde_json::Value,
) -> AuditEvent {
    let event = AuditEvent::new(event_type, session_id, details);
    event.log();
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_creation() {
        let session = Uuid::new_v4();
        let event = log_event(
            AuditEventType::UploadAccepted,
            Some(session),
            serde_json::json!({
                "size": 5242880,
                "hash": "abc123"
            }),
        );

        assert_eq!(event.session_id, Some(session));
        assert_eq!(event.details["size"], 5242880);
        assert_eq!(event.severity, LogSeverity::Info);
    }

    #[test]
    fn test_failure_severity() {
        let failed = AuditEvent::new(AuditEventType::AnalysisFailed, None, serde_json::json!({}));
        let degraded = AuditEvent::new(AuditEventType::LaneDegraded, None, serde_json::json!({}));

        assert_eq!(failed.severity, LogSeverity::Error);
        assert_eq!(degraded.severity, LogSeverity::Warning);
    }

    #[test]
    fn test_event_type_serialization() {
        let json = serde_json::to_string(&AuditEventType::AnalysisCompleted).unwrap();
        assert_eq!(json, "\"analysis_completed\"");
    }
}
