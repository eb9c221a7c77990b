pub mod archive;
pub mod audit;
pub mod messages;
pub mod submit;
pub mod ui;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::shared::models::TicketStatusPatch;
use crate::core::shared::{ListOrder, SyncResult, Ticket, TicketStatus};
use crate::gateway::{Filter, Query, Subscription, SubscriptionSpec, Table};
use crate::realtime::{self, LoadSlot, RawChange, TicketChange};
use crate::session::{Identity, Role, Session};

pub use archive::{partition, Partitions};

/// Which tickets a read-model may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Owner(Uuid),
    All,
}

impl Audience {
    pub fn for_identity(identity: &Identity) -> Self {
        match identity.role {
            Role::Admin => Self::All,
            Role::Customer => Self::Owner(identity.user_id),
        }
    }

    pub fn admits(&self, ticket: &Ticket) -> bool {
        match self {
            Self::Owner(user_id) => ticket.user_id == *user_id,
            Self::All => true,
        }
    }

    fn filter(&self) -> Option<Filter> {
        match self {
            Self::Owner(user_id) => Some(Filter::eq("user_id", user_id)),
            Self::All => None,
        }
    }
}

/// Local copy of the `tickets` table for one audience.
pub struct TicketReadModel {
    session: Session,
    audience: Audience,
    order: ListOrder,
    tickets: Vec<Ticket>,
    partitions: Partitions,
    selected: Option<Ticket>,
    buffered: Vec<TicketChange>,
    loads: LoadSlot<Ticket>,
    subscription: Option<Subscription>,
    refresh_key: u64,
}

impl std::fmt::Debug for TicketReadModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketReadModel")
            .field("audience", &self.audience)
            .field("tickets", &self.tickets.len())
            .field("loading", &self.loading())
            .field("subscription", &self.subscription.as_ref().map(|s| s.id))
            .finish()
    }
}

impl TicketReadModel {
    pub async fn activate(session: Session, audience: Audience) -> Self {
        let order = match audience {
            Audience::Owner(_) => session.config().customer_list_order,
            Audience::All => session.config().admin_list_order,
        };

        let mut spec = SubscriptionSpec::all(Table::Tickets);
        if let Some(filter) = audience.filter() {
            spec = spec.with_filter(filter);
        }
        let subscription = realtime::open_feed(&session, spec).await;

        let mut model = Self {
            session,
            audience,
            order,
            tickets: Vec::new(),
            partitions: Partitions::default(),
            selected: None,
            buffered: Vec::new(),
            loads: LoadSlot::new(),
            subscription,
            refresh_key: 0,
        };
        model.start_load();
        model
    }

    /// Activates with the audience implied by the signed-in identity.
    pub async fn activate_for(session: Session) -> SyncResult<Self> {
        let identity = session.require_identity()?;
        Ok(Self::activate(session, Audience::for_identity(&identity)).await)
    }

    pub async fn deactivate(mut self) {
        self.loads.cancel();
        realtime::close_feed(&self.session, self.subscription.take()).await;
        debug!("Ticket read-model for {:?} deactivated", self.audience);
    }

    /// Re-runs the bulk query, e.g. after the customer submitted a ticket.
    pub fn refresh(&mut self) {
        self.start_load();
    }

    /// Follows a submission form's refresh counter: reloads when `key`
    /// differs from the last key seen.
    pub fn refresh_on(&mut self, key: u64) -> bool {
        if key == self.refresh_key {
            return false;
        }
        self.refresh_key = key;
        self.refresh();
        true
    }

    fn start_load(&mut self) {
        let mut query = Query::from(Table::Tickets).order_by("created_at", self.order.is_ascending());
        if let Some(filter) = self.audience.filter() {
            query = query.filter(filter);
        }
        let generation = self.loads.start(self.session.gateway(), query);
        debug!("Loading tickets for {:?} (generation {})", self.audience, generation);
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    pub fn loading(&self) -> bool {
        self.loads.is_loading()
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn get(&self, id: Uuid) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    pub fn search(&self, query: &str) -> Partitions {
        self.partitions.filtered(query)
    }

    /// Ticket bound to the open detail view, kept current as updates arrive.
    pub fn selected(&self) -> Option<&Ticket> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, id: Uuid) -> Option<&Ticket> {
        self.selected = self.get(id).cloned();
        self.selected.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn subscription_id(&self) -> Option<crate::gateway::SubscriptionId> {
        self.subscription.as_ref().map(|s| s.id)
    }

    /// Applies whatever has already arrived without waiting. Returns the
    /// number of events handled.
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

    /// Waits for the next load result or notification and applies it.
    /// Returns `false` when there is nothing left to wait for.
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
                    warn!("Ticket change feed closed by the gateway");
                    self.subscription = None;
                    false
                }
            }
        }
    }

    /// Waits for an in-flight load, then applies everything already delivered.
    pub async fn settle(&mut self) {
        if let Some(result) = self.loads.complete().await {
            self.finish_load(result);
        }
        self.process_pending();
    }

    fn finish_load(&mut self, result: crate::gateway::GatewayResult<Vec<Ticket>>) {
        match result {
            Ok(tickets) => {
                self.tickets = tickets
                    .into_iter()
                    .filter(|t| self.audience.admits(t))
                    .collect();
                info!("Loaded {} tickets for {:?}", self.tickets.len(), self.audience);
                for change in std::mem::take(&mut self.buffered) {
                    self.apply(change);
                }
            }
            Err(e) => {
                error!("Failed to load tickets: {}", e);
                self.tickets.clear();
                self.buffered.clear();
                self.session.notices().error("Failed to load tickets.");
            }
        }
        self.repartition();
    }

    fn handle_raw(&mut self, raw: RawChange) {
        match TicketChange::try_from(raw) {
            Ok(change) if self.loading() => {
                debug!("Buffering change to ticket {} until the load completes", change.ticket_id());
                self.buffered.push(change);
            }
            Ok(change) => {
                self.apply(change);
                self.repartition();
            }
            Err(e) => warn!("Dropping ticket change: {}", e),
        }
    }

    /// Applies one change to the local collection. Inserts and updates are
    /// upserts keyed by id so a replayed or echoed change never duplicates.
    pub fn apply(&mut self, change: TicketChange) {
        match change {
            TicketChange::Inserted(ticket) => {
                if !self.audience.admits(&ticket) {
                    debug!("Ignoring ticket {} outside {:?}", ticket.id, self.audience);
                    return;
                }
                self.upsert(ticket);
            }
            TicketChange::Updated(ticket) => {
                if !self.audience.admits(&ticket) {
                    self.remove(ticket.id);
                    return;
                }
                if let Some(selected) = self.selected.as_mut().filter(|s| s.id == ticket.id) {
                    *selected = ticket.clone();
                }
                self.upsert(ticket);
            }
            TicketChange::Deleted { id } => self.remove(id),
        }
    }

    fn upsert(&mut self, ticket: Ticket) {
        match self.tickets.iter_mut().find(|t| t.id == ticket.id) {
            Some(existing) => *existing = ticket,
            None => self.tickets.push(ticket),
        }
    }

    fn remove(&mut self, id: Uuid) {
        self.tickets.retain(|t| t.id != id);
        if self.selected.as_ref().is_some_and(|s| s.id == id) {
            self.selected = None;
        }
    }

    fn repartition(&mut self) {
        self.partitions = partition(&self.tickets);
    }

    /// Administrator status change. Local state is only touched once the
    /// backend confirmed the write.
    pub async fn change_status(&mut self, id: Uuid, status: TicketStatus) -> bool {
        let patch = match serde_json::to_value(TicketStatusPatch {
            status: status.clone(),
        }) {
            Ok(patch) => patch,
            Err(e) => {
                error!("Failed to encode status patch: {}", e);
                self.session.notices().error("Failed to update ticket status.");
                return false;
            }
        };

        let result = self
            .session
            .gateway()
            .update(Table::Tickets, patch, &[Filter::eq("id", id)])
            .await;

        match result {
            Ok(0) => {
                warn!("Status update for ticket {} matched no rows", id);
                self.session.notices().error("Failed to update ticket status.");
                false
            }
            Ok(_) => {
                if let Some(ticket) = self.tickets.iter_mut().find(|t| t.id == id) {
                    ticket.status = status.clone();
                }
                if let Some(selected) = self.selected.as_mut().filter(|s| s.id == id) {
                    selected.status = status.clone();
                }
                self.repartition();
                info!("Ticket {} moved to {}", id, status);
                self.session.notices().success("Ticket status updated.");
                true
            }
            Err(e) => {
                error!("Failed to update ticket {}: {}", id, e);
                self.session.notices().error("Failed to update ticket status.");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SyncConfig;
    use crate::core::shared::{TicketCategory, TicketPriority};
    use crate::gateway::memory::{InMemoryBackend, Operation};
    use crate::notice::{drain, NoticeLevel};
    use crate::tickets::submit::{SubmitOutcome, TicketForm};
    use serde_json::json;

    fn admin_session(backend: &InMemoryBackend) -> Session {
        let admin = Uuid::new_v4();
        Session::signed_in(
            backend.gateway_for(Some(admin)),
            SyncConfig::default(),
            Identity::admin(admin),
        )
    }

    async fn seed_ticket(backend: &InMemoryBackend, user_id: Uuid, status: &str, priority: &str) -> Uuid {
        let row = backend
            .seed(
                Table::Tickets,
                json!({
                    "user_id": user_id,
                    "category": "Payment",
                    "description": "Card declined",
                    "status": status,
                    "priority": priority,
                }),
            )
            .await
            .unwrap();
        serde_json::from_value(row["id"].clone()).unwrap()
    }

    #[tokio::test]
    async fn test_activation_loads_and_clears_loading() {
        let backend = InMemoryBackend::new();
        seed_ticket(&backend, Uuid::new_v4(), "Open", "High").await;
        seed_ticket(&backend, Uuid::new_v4(), "Resolved", "Low").await;

        let mut model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;
        assert!(model.loading());

        model.settle().await;
        assert!(!model.loading());
        assert_eq!(model.tickets().len(), 2);
        assert_eq!(model.partitions().open.len(), 1);
        assert_eq!(model.partitions().resolved.len(), 1);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_customer_audience_ignores_other_users() {
        let backend = InMemoryBackend::new();
        let customer = Uuid::new_v4();
        seed_ticket(&backend, customer, "Open", "Low").await;
        seed_ticket(&backend, Uuid::new_v4(), "Open", "Low").await;

        let session = Session::signed_in(
            backend.gateway_for(Some(customer)),
            SyncConfig::default(),
            Identity::customer(customer),
        );
        let mut model = TicketReadModel::activate_for(session).await.unwrap();
        model.settle().await;
        assert_eq!(model.tickets().len(), 1);

        model.apply(TicketChange::Inserted(Ticket {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            category: TicketCategory::Technical,
            description: "Not mine".to_string(),
            status: TicketStatus::Open,
            priority: None,
            created_at: chrono::Utc::now(),
        }));
        assert_eq!(model.tickets().len(), 1);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_activate_for_requires_sign_in() {
        let backend = InMemoryBackend::new();
        let session = Session::new(backend.gateway_for(None), SyncConfig::default());

        assert!(TicketReadModel::activate_for(session).await.is_err());
        assert_eq!(backend.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_update_moves_ticket_between_partitions_and_refreshes_selection() {
        let backend = InMemoryBackend::new();
        let id = seed_ticket(&backend, Uuid::new_v4(), "Open", "High").await;

        let mut model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;
        model.settle().await;
        model.select(id);

        let other_admin = backend.connect(Some(Uuid::new_v4()));
        crate::gateway::DataGateway::update(
            &other_admin,
            Table::Tickets,
            json!({ "status": "Resolved" }),
            &[Filter::eq("id", id)],
        )
        .await
        .unwrap();

        assert!(model.wait_for_update().await);
        assert!(model.partitions().open.is_empty());
        assert_eq!(model.partitions().resolved[0].id, id);
        assert_eq!(model.selected().unwrap().status, TicketStatus::Resolved);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_delete_notification_removes_ticket() {
        let backend = InMemoryBackend::new();
        let id = seed_ticket(&backend, Uuid::new_v4(), "Open", "Medium").await;

        let mut model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;
        model.settle().await;
        model.select(id);

        backend.delete_rows(Table::Tickets, &[Filter::eq("id", id)]).await;
        model.process_pending();

        assert!(model.tickets().is_empty());
        assert!(model.partitions().is_empty());
        assert!(model.selected().is_none());

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_changes_during_load_are_replayed_once() {
        let backend = InMemoryBackend::new();
        let mut model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;

        // Written before the spawned load has run, so it shows up both in the
        // load result and as a notification.
        seed_ticket(&backend, Uuid::new_v4(), "Open", "Critical").await;
        model.settle().await;

        assert_eq!(model.tickets().len(), 1);
        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_load_failure_raises_notice_and_stays_empty() {
        let backend = InMemoryBackend::new();
        seed_ticket(&backend, Uuid::new_v4(), "Open", "High").await;
        backend.fail_next(Operation::Select, Table::Tickets).await;

        let session = admin_session(&backend);
        let mut notices = session.notices().subscribe();
        let mut model = TicketReadModel::activate(session, Audience::All).await;
        model.settle().await;

        assert!(!model.loading());
        assert!(model.tickets().is_empty());
        let raised = drain(&mut notices);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].level, NoticeLevel::Error);
        assert_eq!(raised[0].message, "Failed to load tickets.");
        assert_eq!(backend.stats().await.selects, 1);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_change_status_applies_after_success() {
        let backend = InMemoryBackend::new();
        let id = seed_ticket(&backend, Uuid::new_v4(), "Open", "High").await;

        let session = admin_session(&backend);
        let mut notices = session.notices().subscribe();
        let mut model = TicketReadModel::activate(session, Audience::All).await;
        model.settle().await;

        assert!(model.change_status(id, TicketStatus::Resolved).await);
        assert_eq!(model.partitions().resolved.len(), 1);
        assert_eq!(drain(&mut notices)[0].message, "Ticket status updated.");

        // The echo of our own write is a harmless overwrite.
        model.process_pending();
        assert_eq!(model.tickets().len(), 1);
        assert_eq!(model.get(id).unwrap().status, TicketStatus::Resolved);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_change_status_failure_leaves_state_untouched() {
        let backend = InMemoryBackend::new();
        let id = seed_ticket(&backend, Uuid::new_v4(), "Open", "High").await;

        let session = admin_session(&backend);
        let mut notices = session.notices().subscribe();
        let mut model = TicketReadModel::activate(session, Audience::All).await;
        model.settle().await;
        let before = model.partitions().clone();

        backend.fail_next(Operation::Update, Table::Tickets).await;
        assert!(!model.change_status(id, TicketStatus::Resolved).await);

        assert_eq!(model.partitions(), &before);
        assert_eq!(drain(&mut notices)[0].message, "Failed to update ticket status.");

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_refresh_discards_superseded_load() {
        let backend = InMemoryBackend::new();
        seed_ticket(&backend, Uuid::new_v4(), "Open", "Low").await;

        let mut model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;
        model.refresh();
        model.settle().await;

        assert!(!model.loading());
        assert_eq!(model.tickets().len(), 1);
        assert_eq!(backend.stats().await.selects, 2);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_submission_refresh_reaches_load_only_list() {
        let backend = InMemoryBackend::new();
        let customer = Uuid::new_v4();
        let session = Session::signed_in(
            backend.gateway_for(Some(customer)),
            SyncConfig::default(),
            Identity::customer(customer),
        );
        let mut notices = session.notices().subscribe();
        backend.fail_next(Operation::Subscribe, Table::Tickets).await;

        let mut model = TicketReadModel::activate_for(session.clone()).await.unwrap();
        model.settle().await;
        assert!(model.subscription_id().is_none());
        assert!(model.tickets().is_empty());
        let raised = drain(&mut notices);
        assert_eq!(raised[0].message, "Live updates are unavailable.");

        let mut form = TicketForm::new(session.clone());
        form.category = Some(TicketCategory::Payment);
        form.description = "Charged twice".to_string();
        assert_eq!(form.submit().await, SubmitOutcome::Created);

        // Without a feed the new row only shows up through the re-fetch.
        model.process_pending();
        assert!(model.tickets().is_empty());

        assert!(model.refresh_on(form.refresh_key()));
        assert!(!model.refresh_on(form.refresh_key()));
        model.settle().await;

        assert_eq!(model.tickets().len(), 1);
        assert_eq!(model.tickets()[0].description, "Charged twice");
        assert_eq!(backend.stats().await.selects, 2);

        model.deactivate().await;
    }

    #[tokio::test]
    async fn test_deactivate_releases_subscription() {
        let backend = InMemoryBackend::new();
        let model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;
        assert_eq!(backend.active_subscriptions_for(Table::Tickets).await, 1);

        model.deactivate().await;
        assert_eq!(backend.active_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn test_search_filters_both_partitions() {
        let backend = InMemoryBackend::new();
        backend
            .seed(
                Table::Tickets,
                json!({
                    "user_id": Uuid::new_v4(),
                    "category": "KYC / Compliance",
                    "description": "Passport upload rejected",
                    "status": "Resolved",
                }),
            )
            .await
            .unwrap();
        seed_ticket(&backend, Uuid::new_v4(), "Open", "Critical").await;

        let mut model = TicketReadModel::activate(admin_session(&backend), Audience::All).await;
        model.settle().await;

        let hits = model.search("passport");
        assert!(hits.open.is_empty());
        assert_eq!(hits.resolved.len(), 1);
        assert_eq!(model.search("").len(), 2);
        assert_eq!(
            model.partitions().open[0].priority,
            Some(TicketPriority::Critical)
        );

        model.deactivate().await;
    }
}
