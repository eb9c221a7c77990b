use log::{debug, error, warn};
use std::collections::HashSet;
use uuid::Uuid;

use crate::core::shared::{AuditLogEntry, ListOrder};
use crate::gateway::{Filter, GatewayResult, Query, Subscription, SubscriptionSpec, Table};
use crate::realtime::{self, AuditChange, LoadSlot, RawChange};
use crate::session::Session;

/// Status history of one ticket. Read-only: entries are written by the
/// backend whenever a ticket changes status.
pub struct AuditTrail {
    session: Session,
    ticket_id: Option<Uuid>,
    order: ListOrder,
    entries: Vec<AuditLogEntry>,
    seen: HashSet<Uuid>,
    buffered: Vec<AuditLogEntry>,
    loads: LoadSlot<AuditLogEntry>,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("ticket_id", &self.ticket_id)
            .field("order", &self.order)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl AuditTrail {
    pub fn new(session: Session, order: ListOrder) -> Self {
        Self {
            session,
            ticket_id: None,
            order,
            entries: Vec::new(),
            seen: HashSet::new(),
            buffered: Vec::new(),
            loads: LoadSlot::new(),
            subscription: None,
        }
    }

    pub async fn activate(session: Session, ticket_id: Uuid, order: ListOrder) -> Self {
        let mut trail = Self::new(session, order);
        trail.switch_ticket(ticket_id).await;
        trail
    }

    /// Uses the configured detail-view ordering.
    pub async fn activate_default(session: Session, ticket_id: Uuid) -> Self {
        let order = session.config().audit_order;
        Self::activate(session, ticket_id, order).await
    }

    pub async fn switch_ticket(&mut self, ticket_id: Uuid) {
        self.unbind().await;
        self.ticket_id = Some(ticket_id);

        let spec = SubscriptionSpec::inserts(Table::AuditLogs)
            .with_filter(Filter::eq("ticket_id", ticket_id));
        self.subscription = realtime::open_feed(&self.session, spec).await;

        let query = Query::from(Table::AuditLogs)
            .filter(Filter::eq("ticket_id", ticket_id))
            .order_by("created_at", self.order.is_ascending());
        self.loads.start(self.session.gateway(), query);
    }

    pub async fn unbind(&mut self) {
        self.loads.cancel();
        realtime::close_feed(&self.session, self.subscription.take()).await;
        self.ticket_id = None;
        self.entries.clear();
        self.seen.clear();
        self.buffered.clear();
    }

    pub async fn deactivate(mut self) {
        self.unbind().await;
    }

    pub fn ticket_id(&self) -> Option<Uuid> {
        self.ticket_id
    }

    pub fn loading(&self) -> bool {
        self.loads.is_loading()
    }

    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        if let Some(result) = self.loads.try_complete() {
            self.finish_load(result);
            handled += 1;
        }
        while let Some(raw) = realtime::try_next(&mut self.subscription) {
            self.handle_raw(raw);
            handled += 1;
        }
        handled
    }

    pub async fn wait_for_update(&mut self) -> bool {
        if !self.loading() && self.subscription.is_none() {
            return false;
        }
        tokio::select! {
            Some(result) = self.loads.complete() => {
                self.finish_load(result);
                true
            }
            raw = realtime::next(&mut self.subscription) => match raw {
                Some(raw) => {
                    self.handle_raw(raw);
                    true
                }
                None => {
                    self.subscription = None;
                    false
                }
            }
        }
    }

    pub async fn settle(&mut self) {
        if let Some(result) = self.loads.complete().await {
            self.finish_load(result);
        }
        self.process_pending();
    }

    fn finish_load(&mut self, result: GatewayResult<Vec<AuditLogEntry>>) {
        self.entries.clear();
        self.seen.clear();
        match result {
            Ok(entries) => {
                for entry in entries {
                    if self.seen.insert(entry.id) {
                        self.entries.push(entry);
                    }
                }
                debug!(
                    "Loaded {} audit entries for ticket {:?}",
                    self.entries.len(),
                    self.ticket_id
                );
                for entry in std::mem::take(&mut self.buffered) {
                    self.apply(entry);
                }
            }
            Err(e) => {
                error!("Failed to load audit history for {:?}: {}", self.ticket_id, e);
                self.buffered.clear();
                self.session.notices().error("Failed to load status history.");
            }
        }
    }

    fn handle_raw(&mut self, raw: RawChange) {
        match AuditChange::try_from(raw) {
            Ok(AuditChange::Inserted(entry)) if self.loading() => self.buffered.push(entry),
            Ok(AuditChange::Inserted(entry)) => {
                self.apply(entry);
            }
            Err(e) => warn!("Dropping audit change: {}", e),
        }
    }

    /// Adds an entry unless one with the same id is already held. New entries
    /// go to the end of an ascending trail and the front of a descending one.
    pub fn apply(&mut self, entry: AuditLogEntry) -> bool {
        if self.ticket_id != Some(entry.ticket_id) {
            return false;
        }
        if !self.seen.insert(entry.id) {
            debug!("Audit entry {} already present", entry.id);
            return false;
        }
        match self.order {
            ListOrder::Ascending => self.entries.push(entry),
            ListOrder::Descending => self.entries.insert(0, entry),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SyncConfig;
    use crate::core::shared::test_utils::audit_entry;
    use crate::core::shared::TicketStatus;
    use crate::gateway::memory::InMemoryBackend;
    use crate::session::Identity;
    use serde_json::json;

    fn admin_session(backend: &InMemoryBackend) -> Session {
        let admin = Uuid::new_v4();
        Session::signed_in(
            backend.gateway_for(Some(admin)),
            SyncConfig::default(),
            Identity::admin(admin),
        )
    }

    async fn seed_ticket(backend: &InMemoryBackend, status: &str) -> Uuid {
        let row = backend
            .seed(
                Table::Tickets,
                json!({
                    "user_id": Uuid::new_v4(),
                    "category": "Technical",
                    "description": "App crashes on login",
                    "status": status,
                }),
            )
            .await
            .unwrap();
        serde_json::from_value(row["id"].clone()).unwrap()
    }

    #[tokio::test]
    async fn test_repeated_delivery_keeps_one_entry() {
        let backend = InMemoryBackend::new();
        let ticket_id = Uuid::new_v4();
        let mut trail = AuditTrail::activate(admin_session(&backend), ticket_id, ListOrder::Ascending).await;
        trail.settle().await;

        let entry = audit_entry(ticket_id, Some(TicketStatus::Open), TicketStatus::Resolved);
        for _ in 0..4 {
            trail.apply(entry.clone());
        }

        assert_eq!(trail.entries().len(), 1);
        trail.deactivate().await;
    }

    #[tokio::test]
    async fn test_live_entries_follow_order() {
        let backend = InMemoryBackend::new();
        let ticket_id = seed_ticket(&backend, "Open").await;
        let session = admin_session(&backend);

        let mut newest_first = AuditTrail::activate(session.clone(), ticket_id, ListOrder::Descending).await;
        let mut oldest_first = AuditTrail::activate(session.clone(), ticket_id, ListOrder::Ascending).await;
        newest_first.settle().await;
        oldest_first.settle().await;
        assert_eq!(newest_first.entries().len(), 1);

        session
            .gateway()
            .update(
                Table::Tickets,
                json!({ "status": "In Progress" }),
                &[Filter::eq("id", ticket_id)],
            )
            .await
            .unwrap();
        assert!(newest_first.wait_for_update().await);
        assert!(oldest_first.wait_for_update().await);

        assert_eq!(newest_first.entries()[0].new_status, TicketStatus::InProgress);
        assert_eq!(oldest_first.entries()[1].new_status, TicketStatus::InProgress);
        assert_eq!(oldest_first.entries()[0].old_status, None);

        newest_first.deactivate().await;
        oldest_first.deactivate().await;
    }

    #[tokio::test]
    async fn test_entries_for_other_tickets_are_ignored() {
        let backend = InMemoryBackend::new();
        let ticket_id = Uuid::new_v4();
        let mut trail = AuditTrail::activate(admin_session(&backend), ticket_id, ListOrder::Ascending).await;
        trail.settle().await;

        let foreign = audit_entry(Uuid::new_v4(), None, TicketStatus::Pending);
        assert!(!trail.apply(foreign));
        assert!(trail.entries().is_empty());

        trail.deactivate().await;
    }

    #[tokio::test]
    async fn test_notification_racing_load_is_deduplicated() {
        let backend = InMemoryBackend::new();
        let ticket_id = seed_ticket(&backend, "Open").await;
        let session = admin_session(&backend);

        let mut trail = AuditTrail::activate(session.clone(), ticket_id, ListOrder::Ascending).await;
        // Lands in the load result and in the feed.
        session
            .gateway()
            .update(
                Table::Tickets,
                json!({ "status": "Resolved" }),
                &[Filter::eq("id", ticket_id)],
            )
            .await
            .unwrap();
        trail.settle().await;

        assert_eq!(trail.entries().len(), 2);
        let ids: HashSet<Uuid> = trail.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 2);

        trail.deactivate().await;
    }
}
