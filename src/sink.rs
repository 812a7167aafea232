use crate::error::{AuditError, SinkError};
use crate::vote_codec::VoteRecord;
use async_trait::async_trait;

/// Delivers a textual command to the running game server.
///
/// Shared with other producers in the host process, so implementations must
/// tolerate concurrent calls.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_command(&self, command: &str) -> Result<(), SinkError>;
}

/// Best-effort record of every rewarded vote.
pub trait AuditSink: Send + Sync {
    fn record(&self, vote: &VoteRecord) -> Result<(), AuditError>;
}

/// Writes the audit line to the `votifier::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, vote: &VoteRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "votifier::audit",
            username = vote.username(),
            address = vote.address(),
            service = vote.service_name(),
            timestamp = vote.timestamp(),
            "{vote}"
        );
        Ok(())
    }
}

/// Discards everything; for hosts that do not keep an audit trail.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudit;

impl AuditSink for NoAudit {
    fn record(&self, _vote: &VoteRecord) -> Result<(), AuditError> {
        Ok(())
    }
}
