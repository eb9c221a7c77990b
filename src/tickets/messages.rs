//! Per-ticket message thread.
//!
//! Messages are append-only and arrive in creation order, so new rows are
//! pushed to the end without re-sorting. A sent message is not appended
//! locally; it comes back through the subscription like everyone else's.

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::shared::models::NewTicketMessage;
use crate::core::shared::TicketMessage;
use crate::gateway::{Filter, GatewayResult, Query, Subscription, SubscriptionSpec, Table};
use crate::realtime::{self, LoadSlot, MessageChange, RawChange};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank draft, nothing was sent
    Skipped,
    /// No ticket bound or nobody signed in
    Rejected,
    Failed,
    Sent,
}

pub struct MessageThread {
    session: Session,
    ticket_id: Option<Uuid>,
    messages: Vec<TicketMessage>,
    buffered: Vec<TicketMessage>,
    draft: String,
    loads: LoadSlot<TicketMessage>,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for MessageThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageThread")
            .field("ticket_id", &self.ticket_id)
            .field("messages", &self.messages.len())
            .field("loading", &self.loading())
            .finish()
    }
}

impl MessageThread {
    /// Unbound thread; call [`MessageThread::switch_ticket`] to load one.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            ticket_id: None,
            messages: Vec::new(),
            buffered: Vec::new(),
            draft: String::new(),
            loads: LoadSlot::new(),
            subscription: None,
        }
    }

    pub async fn activate(session: Session, ticket_id: Uuid) -> Self {
        let mut thread = Self::new(session);
        thread.switch_ticket(ticket_id).await;
        thread
    }

    /// Rebinds to another ticket. The previous feed is released before the
    /// new one opens and any load still running for it is discarded.
    pub async fn switch_ticket(&mut self, ticket_id: Uuid) {
        self.unbind().await;
        self.ticket_id = Some(ticket_id);

        let spec = SubscriptionSpec::inserts(Table::TicketMessages)
            .with_filter(Filter::eq("ticket_id", ticket_id));
        self.subscription = realtime::open_feed(&self.session, spec).await;

        let query = Query::from(Table::TicketMessages)
            .filter(Filter::eq("ticket_id", ticket_id))
            .order_by("created_at", true);
        self.loads.start(self.session.gateway(), query);
    }

    pub async fn unbind(&mut self) {
        self.loads.cancel();
        realtime::close_feed(&self.session, self.subscription.take()).await;
        self.ticket_id = None;
        self.messages.clear();
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

    pub fn messages(&self) -> &[TicketMessage] {
        &self.messages
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
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

    fn finish_load(&mut self, result: GatewayResult<Vec<TicketMessage>>) {
        match result {
            Ok(messages) => {
                self.messages = messages;
                debug!(
                    "Loaded {} messages for ticket {:?}",
                    self.messages.len(),
                    self.ticket_id
                );
                for message in std::mem::take(&mut self.buffered) {
                    self.apply(message);
                }
            }
            Err(e) => {
                error!("Failed to load messages for {:?}: {}", self.ticket_id, e);
                self.messages.clear();
                self.buffered.clear();
                self.session.notices().error("Failed to load messages.");
            }
        }
    }

    fn handle_raw(&mut self, raw: RawChange) {
        match MessageChange::try_from(raw) {
            Ok(MessageChange::Inserted(message)) if self.loading() => self.buffered.push(message),
            Ok(MessageChange::Inserted(message)) => {
                self.apply(message);
            }
            Err(e) => warn!("Dropping message change: {}", e),
        }
    }

    /// Appends a message for the bound ticket. Returns `false` for foreign or
    /// already-held messages.
    pub fn apply(&mut self, message: TicketMessage) -> bool {
        if self.ticket_id != Some(message.ticket_id) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub async fn send(&mut self) -> SendOutcome {
        let body = self.draft.trim();
        if body.is_empty() {
            return SendOutcome::Skipped;
        }
        let Some(ticket_id) = self.ticket_id else {
            self.session
                .notices()
                .error("Select a ticket before sending a message.");
            return SendOutcome::Rejected;
        };
        let Some(sender_id) = self.session.user_id() else {
            self.session.notices().error("Sign in to send messages.");
            return SendOutcome::Rejected;
        };

        let message = NewTicketMessage {
            ticket_id,
            sender_id,
            body: body.to_string(),
        };
        let record = match serde_json::to_value(&message) {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to encode message: {}", e);
                self.session.notices().error("Failed to send message.");
                return SendOutcome::Failed;
            }
        };

        match self
            .session
            .gateway()
            .insert(Table::TicketMessages, record)
            .await
        {
            Ok(_) => {
                info!("Message sent on ticket {}", ticket_id);
                self.draft.clear();
                SendOutcome::Sent
            }
            Err(e) => {
                error!("Failed to send message on ticket {}: {}", ticket_id, e);
                self.session.notices().error("Failed to send message.");
                SendOutcome::Failed
            }
        }
    }
}
