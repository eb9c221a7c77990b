use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{TicketCategory, TicketPriority, TicketStatus, UNKNOWN_PRIORITY_RANK};

/// Row of the `tickets` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: TicketCategory,
    pub description: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn priority_rank(&self) -> u8 {
        self.priority
            .as_ref()
            .map_or(UNKNOWN_PRIORITY_RANK, TicketPriority::rank)
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }
}

/// Row of the `ticket_messages` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Row of the `audit_logs` table, written by the backend on every status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    /// `None` marks the creation of the ticket
    pub old_status: Option<TicketStatus>,
    pub new_status: TicketStatus,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    pub user_id: Uuid,
    pub category: TicketCategory,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTicketMessage {
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketStatusPatch {
    pub status: TicketStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticket_without_priority_ranks_last() {
        let ticket: Ticket = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "category": "Payment",
            "description": "Card declined",
            "status": "Open",
            "created_at": "2026-02-27T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(ticket.priority, None);
        assert_eq!(ticket.priority_rank(), UNKNOWN_PRIORITY_RANK);
    }

    #[test]
    fn test_audit_entry_with_null_old_status() {
        let entry: AuditLogEntry = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "ticket_id": Uuid::new_v4(),
            "old_status": null,
            "new_status": "Pending",
            "changed_by": null,
            "created_at": "2026-02-27T01:00:00.000Z"
        }))
        .unwrap();

        assert!(entry.old_status.is_none());
        assert_eq!(entry.new_status, TicketStatus::Pending);
    }
}
