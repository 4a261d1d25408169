//! Activity events
//!
//! Every registry, table and migration operation produces one
//! [`ActivityEvent`]. Where events end up is the sink's business; emitting
//! never blocks and never fails the operation that produced it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateSchema,
    DropSchema,
    InitializeTables,
    ExportSchema,
    MigrateSchema,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateSchema => write!(f, "create_schema"),
            Operation::DropSchema => write!(f, "drop_schema"),
            Operation::InitializeTables => write!(f, "initialize_tables"),
            Operation::ExportSchema => write!(f, "export_schema"),
            Operation::MigrateSchema => write!(f, "migrate_schema"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub operation: Operation,
    pub schemas: Vec<String>,
    pub actor_id: Option<String>,
    pub success: bool,
    pub detail: JsonValue,
    pub at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        operation: Operation,
        schemas: &[&str],
        actor_id: Option<&str>,
        success: bool,
        detail: JsonValue,
    ) -> Self {
        Self {
            operation,
            schemas: schemas.iter().map(|s| s.to_string()).collect(),
            actor_id: actor_id.map(str::to_string),
            success,
            detail,
            at: Utc::now(),
        }
    }
}

/// Receiver of activity events. Implementations must return promptly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ActivityEvent);
}

/// Writes events as structured records on the `activity` tracing target.
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ActivityEvent) {
        let schemas = event.schemas.join(",");
        let actor = event.actor_id.as_deref().unwrap_or("-");

        if event.success {
            info!(
                target: "activity",
                operation = %event.operation,
                schemas = %schemas,
                actor_id = %actor,
                success = event.success,
                detail = %event.detail,
                "activity"
            );
        } else {
            warn!(
                target: "activity",
                operation = %event.operation,
                schemas = %schemas,
                actor_id = %actor,
                success = event.success,
                detail = %event.detail,
                "activity"
            );
        }
    }
}

/// Hands events to a consumer task, e.g. one that persists an activity log.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: UnboundedSender<ActivityEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: UnboundedSender<ActivityEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ActivityEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!(
                "Activity consumer is gone, dropping {} event",
                e.0.operation
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn test_operation_display_matches_serde() {
        let op = Operation::MigrateSchema;
        assert_eq!(op.to_string(), "migrate_schema");
        assert_eq!(serde_json::to_value(op).unwrap(), json!("migrate_schema"));
    }

    #[test]
    fn test_channel_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelEventSink::new(tx);

        sink.emit(ActivityEvent::new(
            Operation::CreateSchema,
            &["tenant_a"],
            Some("admin-1"),
            true,
            json!({"created_at": "now"}),
        ));

        let event = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(event.operation, Operation::CreateSchema);
        assert_eq!(event.schemas, vec!["tenant_a"]);
        assert_eq!(event.actor_id.as_deref(), Some("admin-1"));
        assert!(event.success);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelEventSink::new(tx);
        sink.emit(ActivityEvent::new(
            Operation::DropSchema,
            &["tenant_a"],
            None,
            false,
            JsonValue::Null,
        ));
    }
}
