//! Database-backed audit sink.
//!
//! `record` hands the event to an unbounded channel and returns; a writer
//! task appends to `audit_log`. Failures are logged and dropped, never
//! surfaced to the caller.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use portal_db::DbHandle;
use portal_db::entities::audit_log;
use portal_db::repos;
use portal_executor::{AuditRecord, AuditSink};

pub struct DbAuditSink {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl DbAuditSink {
    /// Start the writer task and return the sink handle. The task drains
    /// remaining events after cancellation before exiting.
    #[must_use]
    pub fn spawn(db: DbHandle, cancel: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        // Best-effort drain of anything already queued.
                        while let Ok(record) = rx.try_recv() {
                            write(&db, record).await;
                        }
                        break;
                    }
                    received = rx.recv() => {
                        match received {
                            Some(record) => write(&db, record).await,
                            None => break,
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

async fn write(db: &DbHandle, record: AuditRecord) {
    let model = to_model(record);
    if let Err(e) = repos::audit::append(db.conn(), model).await {
        warn!(error = %e, "failed to persist audit record");
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_model(record: AuditRecord) -> audit_log::Model {
    audit_log::Model {
        id: record.event_id,
        timestamp: record.timestamp,
        event_type: record.event_type.as_str().to_owned(),
        severity: record.severity.as_str().to_owned(),
        user_id: record.user_id,
        tenant_id: record.tenant_id,
        request_id: record.request_id,
        intent: record.intent.map(|i| i.as_str().to_owned()),
        args: serde_json::json!(record.args),
        remote_addr: record.remote_addr,
        user_agent: record.user_agent,
        success: record.success,
        error: record.error,
        duration_ms: record.duration.map(|d| d.as_millis() as i64),
        metadata: record.metadata,
    }
}

impl AuditSink for DbAuditSink {
    fn record(&self, record: AuditRecord) {
        // An unbounded send only fails when the writer task is gone;
        // best-effort by contract, so log and move on.
        if self.tx.send(record).is_err() {
            warn!("audit writer task is gone, dropping audit record");
        }
    }
}
