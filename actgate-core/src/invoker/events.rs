//! # Call Records
//!
//! Every invocation emits a [`CallRecord`] when it starts and another one when it finishes.
//! Records are handed to an [`EventSink`]; where they end up (an event bus, an audit store, the
//! log) is up to the sink. Publishing is best effort: a failing sink never fails the call.
use crate::BoxError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CallPhase {
    Started,
    Finished { status: CallStatus, elapsed_ms: u64 },
}

/// A structured record of one phase of a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// The correlation identifier supplied by the caller.
    pub parent_id: String,
    pub name: String,
    #[serde(flatten)]
    pub phase: CallPhase,
    /// The request on start; the response, or the error, on finish.
    pub body: serde_json::Value,
}

impl CallRecord {
    pub fn started(parent_id: &str, name: impl Into<String>, request: serde_json::Value) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            name: name.into(),
            phase: CallPhase::Started,
            body: request,
        }
    }

    pub fn finished(
        parent_id: &str,
        name: impl Into<String>,
        status: CallStatus,
        elapsed_ms: u64,
        body: serde_json::Value,
    ) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            name: name.into(),
            phase: CallPhase::Finished { status, elapsed_ms },
            body,
        }
    }

    pub fn status(&self) -> Option<CallStatus> {
        match self.phase {
            CallPhase::Started => None,
            CallPhase::Finished { status, .. } => Some(status),
        }
    }
}

/// Receives call records.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, record: CallRecord) -> Result<(), BoxError>;
}

/// Writes call records to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, record: CallRecord) -> Result<(), BoxError> {
        let body = serde_json::to_string(&record.body)?;
        match record.phase {
            CallPhase::Started => {
                info!(parent_id = %record.parent_id, name = %record.name, %body, "call started")
            }
            CallPhase::Finished { status, elapsed_ms } => info!(
                parent_id = %record.parent_id,
                name = %record.name,
                ?status,
                elapsed_ms,
                %body,
                "call finished"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_serialize_flat() {
        let record = CallRecord::finished(
            "evt-1",
            "router:Echo method Ping call",
            CallStatus::Failed,
            12,
            json!({ "error": "boom" }),
        );

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "parent_id": "evt-1",
                "name": "router:Echo method Ping call",
                "phase": "finished",
                "status": "FAILED",
                "elapsed_ms": 12,
                "body": { "error": "boom" }
            })
        );
        assert_eq!(record.status(), Some(CallStatus::Failed));
    }
}
