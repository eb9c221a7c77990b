//! Change notifications.
//!
//! The transport delivers untyped [`RawChange`] payloads. Each read-model
//! converts them into the tagged variant for its table before touching local
//! state; payloads that fail validation are logged and dropped.

pub mod loader;

use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::shared::{AuditLogEntry, SyncError, Ticket, TicketMessage};
use crate::gateway::{Subscription, SubscriptionSpec, Table};
use crate::session::Session;

pub use loader::LoadSlot;

/// Opens a subscription for a view. A failure degrades the view to
/// load-only and raises a notice rather than failing activation.
pub async fn open_feed(session: &Session, spec: SubscriptionSpec) -> Option<Subscription> {
    let table = spec.table;
    match session.gateway().subscribe(spec).await {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            error!("Failed to subscribe to {}: {}", table, e);
            session.notices().error("Live updates are unavailable.");
            None
        }
    }
}

pub async fn close_feed(session: &Session, subscription: Option<Subscription>) {
    let Some(subscription) = subscription else {
        return;
    };
    if let Err(e) = session.gateway().unsubscribe(subscription.id).await {
        warn!("Failed to release {}: {}", subscription.id, e);
    }
}

pub fn try_next(subscription: &mut Option<Subscription>) -> Option<RawChange> {
    subscription.as_mut()?.receiver.try_recv().ok()
}

/// Waits for the next change; never resolves when there is no feed.
pub async fn next(subscription: &mut Option<Subscription>) -> Option<RawChange> {
    match subscription {
        Some(subscription) => subscription.receiver.recv().await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub new_row: Option<Value>,
    pub old_row: Option<Value>,
}

fn expect_table(change: &RawChange, table: Table) -> Result<(), SyncError> {
    if change.table == table {
        Ok(())
    } else {
        Err(SyncError::Payload(format!(
            "expected {} change, got {}",
            table, change.table
        )))
    }
}

fn decode_row<T: serde::de::DeserializeOwned>(row: Option<Value>, what: &str) -> Result<T, SyncError> {
    let row = row.ok_or_else(|| SyncError::Payload(format!("{what} payload has no row")))?;
    serde_json::from_value(row).map_err(|e| SyncError::Payload(format!("{what}: {e}")))
}

#[derive(Debug, Clone, PartialEq)]
pub enum TicketChange {
    Inserted(Ticket),
    Updated(Ticket),
    Deleted { id: Uuid },
}

impl TicketChange {
    pub fn ticket_id(&self) -> Uuid {
        match self {
            Self::Inserted(t) | Self::Updated(t) => t.id,
            Self::Deleted { id } => *id,
        }
    }
}

#[derive(Deserialize)]
struct RowId {
    id: Uuid,
}

impl TryFrom<RawChange> for TicketChange {
    type Error = SyncError;

    fn try_from(change: RawChange) -> Result<Self, Self::Error> {
        expect_table(&change, Table::Tickets)?;
        match change.kind {
            ChangeKind::Insert => Ok(Self::Inserted(decode_row(change.new_row, "ticket insert")?)),
            ChangeKind::Update => Ok(Self::Updated(decode_row(change.new_row, "ticket update")?)),
            ChangeKind::Delete => {
                let RowId { id } = decode_row(change.old_row, "ticket delete")?;
                Ok(Self::Deleted { id })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageChange {
    Inserted(TicketMessage),
}

impl TryFrom<RawChange> for MessageChange {
    type Error = SyncError;

    fn try_from(change: RawChange) -> Result<Self, Self::Error> {
        expect_table(&change, Table::TicketMessages)?;
        match change.kind {
            ChangeKind::Insert => Ok(Self::Inserted(decode_row(change.new_row, "message insert")?)),
            other => Err(SyncError::Payload(format!(
                "messages are append-only, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuditChange {
    Inserted(AuditLogEntry),
}

impl TryFrom<RawChange> for AuditChange {
    type Error = SyncError;

    fn try_from(change: RawChange) -> Result<Self, Self::Error> {
        expect_table(&change, Table::AuditLogs)?;
        match change.kind {
            ChangeKind::Insert => Ok(Self::Inserted(decode_row(change.new_row, "audit insert")?)),
            other => Err(SyncError::Payload(format!(
                "audit log is append-only, got {other:?}"
            ))),
        }
    }
}
