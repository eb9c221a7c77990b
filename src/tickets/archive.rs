//! Open/resolved split and the admin display order.

use crate::core::shared::Ticket;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partitions {
    pub open: Vec<Ticket>,
    pub resolved: Vec<Ticket>,
}

impl Partitions {
    pub fn len(&self) -> usize {
        self.open.len() + self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.resolved.is_empty()
    }

    pub fn contains(&self, id: uuid::Uuid) -> bool {
        self.open.iter().chain(&self.resolved).any(|t| t.id == id)
    }

    pub fn filtered(&self, query: &str) -> Self {
        Self {
            open: self.open.iter().filter(|t| matches_search(t, query)).cloned().collect(),
            resolved: self
                .resolved
                .iter()
                .filter(|t| matches_search(t, query))
                .cloned()
                .collect(),
        }
    }
}

/// Priority rank first (Critical, High, Medium, Low, then anything else),
/// oldest first within a rank.
pub fn sort_for_display(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        a.priority_rank()
            .cmp(&b.priority_rank())
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

pub fn partition(tickets: &[Ticket]) -> Partitions {
    let (mut resolved, mut open): (Vec<Ticket>, Vec<Ticket>) =
        tickets.iter().cloned().partition(Ticket::is_resolved);
    sort_for_display(&mut open);
    sort_for_display(&mut resolved);
    Partitions { open, resolved }
}

/// Case-insensitive match on category or description; a blank query matches everything.
pub fn matches_search(ticket: &Ticket, query: &str) -> bool {
    let query = query.trim();
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    ticket.category.as_str().to_lowercase().contains(&needle)
        || ticket.description.to_lowercase().contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{ticket_at, ticket_with};
    use crate::core::shared::{TicketPriority, TicketStatus};

    #[test]
    fn test_partition_splits_on_resolved() {
        let tickets = vec![
            ticket_with(TicketStatus::Open, Some(TicketPriority::High)),
            ticket_with(TicketStatus::Resolved, Some(TicketPriority::Low)),
            ticket_with(TicketStatus::InProgress, None),
            ticket_with(TicketStatus::Unknown("Escalated".into()), None),
        ];

        let parts = partition(&tickets);

        assert_eq!(parts.open.len(), 3);
        assert_eq!(parts.resolved.len(), 1);
        assert!(parts.resolved.iter().all(Ticket::is_resolved));
        assert!(parts.open.iter().all(|t| !t.is_resolved()));
    }

    #[test]
    fn test_priority_then_age_ordering() {
        let low_old = ticket_at(TicketStatus::Open, Some(TicketPriority::Low), 0);
        let unknown = ticket_at(TicketStatus::Open, Some(TicketPriority::Unknown("P0".into())), 1);
        let critical_new = ticket_at(TicketStatus::Open, Some(TicketPriority::Critical), 5);
        let high_new = ticket_at(TicketStatus::Open, Some(TicketPriority::High), 4);
        let high_old = ticket_at(TicketStatus::Open, Some(TicketPriority::High), 2);
        let missing = ticket_at(TicketStatus::Open, None, 0);
        let medium = ticket_at(TicketStatus::Pending, Some(TicketPriority::Medium), 3);

        let parts = partition(&[
            low_old.clone(),
            unknown.clone(),
            critical_new.clone(),
            high_new.clone(),
            high_old.clone(),
            missing.clone(),
            medium.clone(),
        ]);

        let ids: Vec<_> = parts.open.iter().map(|t| t.id).collect();
        assert_eq!(
            ids,
            vec![
                critical_new.id,
                high_old.id,
                high_new.id,
                medium.id,
                low_old.id,
                missing.id,
                unknown.id,
            ]
        );
    }

    #[test]
    fn test_partition_is_idempotent() {
        let tickets = vec![
            ticket_at(TicketStatus::Resolved, Some(TicketPriority::Medium), 3),
            ticket_at(TicketStatus::Open, Some(TicketPriority::Critical), 2),
            ticket_at(TicketStatus::Resolved, Some(TicketPriority::Critical), 1),
            ticket_at(TicketStatus::Pending, None, 0),
        ];

        let once = partition(&tickets);
        let mut combined = once.open.clone();
        combined.extend(once.resolved.clone());
        let twice = partition(&combined);

        assert_eq!(once, twice);
        assert_eq!(once, partition(&tickets));
    }

    #[test]
    fn test_search_matches_category_and_description() {
        let mut ticket = ticket_with(TicketStatus::Open, None);
        ticket.description = "Wire transfer stuck".to_string();

        assert!(matches_search(&ticket, "  "));
        assert!(matches_search(&ticket, "WIRE"));
        assert!(matches_search(&ticket, "payment"));
        assert!(!matches_search(&ticket, "kyc"));
    }
}
