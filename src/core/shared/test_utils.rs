use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use super::{AuditLogEntry, Ticket, TicketCategory, TicketPriority, TicketStatus};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 27, 9, 0, 0).unwrap()
}

pub fn ticket_at(status: TicketStatus, priority: Option<TicketPriority>, minutes: i64) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        category: TicketCategory::Payment,
        description: "Card declined at checkout".to_string(),
        status,
        priority,
        created_at: base_time() + Duration::minutes(minutes),
    }
}

pub fn ticket_with(status: TicketStatus, priority: Option<TicketPriority>) -> Ticket {
    ticket_at(status, priority, 0)
}

pub fn audit_entry(ticket_id: Uuid, old: Option<TicketStatus>, new: TicketStatus) -> AuditLogEntry {
    AuditLogEntry {
        id: Uuid::new_v4(),
        ticket_id,
        old_status: old,
        new_status: new,
        changed_by: Some(Uuid::new_v4()),
        created_at: Utc::now(),
    }
}
