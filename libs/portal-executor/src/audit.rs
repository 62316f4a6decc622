//! Append-only audit events.
//!
//! Sinks are best-effort by contract: `record` never blocks and never
//! reports failure to the caller; a sink that cannot persist an event logs
//! the loss out-of-band and moves on.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationFinding;
use crate::rate_limit::RateLimitExceeded;
use crate::whitelist::CommandIntent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Execution,
    ValidationFailure,
    RateLimitExceeded,
    Security,
}

impl AuditEventType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Execution => "execution",
            AuditEventType::ValidationFailure => "validation_failure",
            AuditEventType::RateLimitExceeded => "rate_limit_exceeded",
            AuditEventType::Security => "security",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

impl AuditSeverity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Critical => "critical",
        }
    }
}

/// One immutable audit record. There is no update or delete path anywhere
/// in the system; records are only ever appended and queried.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub request_id: String,
    pub intent: Option<CommandIntent>,
    /// Arguments as issued, with redacted positions replaced by `***`.
    pub args: Vec<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Option<Duration>,
    pub metadata: serde_json::Value,
}

impl AuditRecord {
    fn base(
        event_type: AuditEventType,
        severity: AuditSeverity,
        user_id: Uuid,
        tenant_id: Uuid,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type,
            severity,
            user_id,
            tenant_id,
            request_id: request_id.into(),
            intent: None,
            args: Vec::new(),
            remote_addr: None,
            user_agent: None,
            success: false,
            error: None,
            duration: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// A completed (or failed) execution.
    #[must_use]
    pub fn execution(
        user_id: Uuid,
        tenant_id: Uuid,
        request_id: impl Into<String>,
        intent: CommandIntent,
        args: Vec<String>,
        success: bool,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        let severity = if success {
            AuditSeverity::Info
        } else {
            AuditSeverity::Warning
        };
        let mut record = Self::base(
            AuditEventType::Execution,
            severity,
            user_id,
            tenant_id,
            request_id,
        );
        record.intent = Some(intent);
        record.args = args;
        record.success = success;
        record.error = error;
        record.duration = Some(duration);
        record
    }

    /// A request that failed validation; no child process was started.
    #[must_use]
    pub fn validation_failure(
        user_id: Uuid,
        tenant_id: Uuid,
        request_id: impl Into<String>,
        intent: CommandIntent,
        findings: &[ValidationFinding],
    ) -> Self {
        let mut record = Self::base(
            AuditEventType::ValidationFailure,
            AuditSeverity::Warning,
            user_id,
            tenant_id,
            request_id,
        );
        record.intent = Some(intent);
        record.error = findings.first().map(ToString::to_string);
        record.metadata = serde_json::json!({
            "findings": findings
                .iter()
                .map(|f| serde_json::json!({ "code": f.code.as_str(), "field": f.field }))
                .collect::<Vec<_>>(),
        });
        record
    }

    /// A request rejected by the rate limiter.
    #[must_use]
    pub fn rate_limited(
        user_id: Uuid,
        tenant_id: Uuid,
        request_id: impl Into<String>,
        intent: CommandIntent,
        detail: &RateLimitExceeded,
    ) -> Self {
        let mut record = Self::base(
            AuditEventType::RateLimitExceeded,
            AuditSeverity::Warning,
            user_id,
            tenant_id,
            request_id,
        );
        record.intent = Some(intent);
        record.error = Some(detail.to_string());
        record.metadata = serde_json::json!({
            "limit": detail.limit,
            "reset_at": detail.reset_at,
            "blocked": detail.blocked,
        });
        record
    }

    /// A free-form security event.
    #[must_use]
    pub fn security(
        user_id: Uuid,
        tenant_id: Uuid,
        request_id: impl Into<String>,
        severity: AuditSeverity,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        let mut record = Self::base(
            AuditEventType::Security,
            severity,
            user_id,
            tenant_id,
            request_id,
        );
        record.error = Some(message.into());
        record.metadata = metadata;
        record
    }

    #[must_use]
    pub fn with_client(mut self, remote_addr: Option<String>, user_agent: Option<String>) -> Self {
        self.remote_addr = remote_addr;
        self.user_agent = user_agent;
        self
    }

    /// Environment metadata for HashMap-shaped extras.
    #[must_use]
    pub fn with_metadata_map(mut self, map: &HashMap<String, String>) -> Self {
        if !map.is_empty() {
            self.metadata = serde_json::json!(map);
        }
        self
    }
}

/// Best-effort, never-blocking audit sink.
pub trait AuditSink: Send + Sync {
    /// Record an event. Implementations must not block the caller and must
    /// swallow (but log) their own failures.
    fn record(&self, record: AuditRecord);
}

/// Sink that emits records as structured tracing events. Used as the
/// default in tests and as a fallback when no persistent sink is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            event_id = %record.event_id,
            event_type = record.event_type.as_str(),
            severity = record.severity.as_str(),
            user_id = %record.user_id,
            tenant_id = %record.tenant_id,
            request_id = %record.request_id,
            intent = record.intent.map(|i| i.as_str()),
            success = record.success,
            error = record.error.as_deref(),
            "audit event"
        );
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::{AuditRecord, AuditSink};

    /// Collects records in memory for assertions.
    #[derive(Default)]
    pub struct MemorySink {
        pub records: Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for MemorySink {
        fn record(&self, record: AuditRecord) {
            self.records.lock().unwrap().push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ValidationCode, ValidationFinding};

    #[test]
    fn execution_severity_follows_success() {
        let ok = AuditRecord::execution(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "req-1",
            CommandIntent::ServerEnable,
            vec!["github".to_owned()],
            true,
            None,
            Duration::from_millis(12),
        );
        assert_eq!(ok.severity, AuditSeverity::Info);
        assert_eq!(ok.event_type, AuditEventType::Execution);

        let failed = AuditRecord::execution(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "req-2",
            CommandIntent::ServerEnable,
            vec![],
            false,
            Some("exit 1".to_owned()),
            Duration::from_millis(5),
        );
        assert_eq!(failed.severity, AuditSeverity::Warning);
    }

    #[test]
    fn validation_failure_keeps_codes_not_content() {
        let findings = vec![ValidationFinding::new(
            ValidationCode::DangerousPattern,
            "server",
            "argument contains a forbidden pattern",
        )];
        let record = AuditRecord::validation_failure(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "req-3",
            CommandIntent::ServerEnable,
            &findings,
        );
        let json = serde_json::to_string(&record.metadata).unwrap();
        assert!(json.contains("DANGEROUS_PATTERN"));
        assert!(record.args.is_empty());
    }

    #[test]
    fn timestamps_are_monotonic_non_decreasing() {
        let a = AuditRecord::security(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "r",
            AuditSeverity::Info,
            "a",
            serde_json::Value::Null,
        );
        let b = AuditRecord::security(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "r",
            AuditSeverity::Info,
            "b",
            serde_json::Value::Null,
        );
        assert!(b.timestamp >= a.timestamp);
    }
}
