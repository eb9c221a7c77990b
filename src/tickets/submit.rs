use log::{debug, error, info};

use crate::core::shared::models::NewTicket;
use crate::core::shared::{SyncError, SyncResult, Ticket, TicketCategory};
use crate::gateway::Table;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Invalid,
    Rejected,
    Failed,
    Created,
}

/// The customer's "Submit a Ticket" form. A successful submission bumps
/// `refresh_key`; the owning dashboard refreshes its ticket list when the
/// key changes.
#[derive(Debug)]
pub struct TicketForm {
    session: Session,
    pub category: Option<TicketCategory>,
    pub description: String,
    refresh_key: u64,
    last_created: Option<Ticket>,
}

impl TicketForm {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            category: None,
            description: String::new(),
            refresh_key: 0,
            last_created: None,
        }
    }

    pub fn refresh_key(&self) -> u64 {
        self.refresh_key
    }

    pub fn last_created(&self) -> Option<&Ticket> {
        self.last_created.as_ref()
    }

    /// Checks the fields without touching the backend. Returns the category
    /// and the trimmed description.
    pub fn validate(&self) -> SyncResult<(TicketCategory, String)> {
        let description = self.description.trim();
        let Some(category) = self.category.clone().filter(|_| !description.is_empty()) else {
            return Err(SyncError::Validation("Please fill in all fields.".to_string()));
        };

        let limit = self.session.config().description_limit;
        if description.chars().count() > limit {
            return Err(SyncError::Validation(format!(
                "Description must be at most {limit} characters."
            )));
        }

        Ok((category, description.to_string()))
    }

    pub async fn submit(&mut self) -> SubmitOutcome {
        let (category, description) = match self.validate() {
            Ok(fields) => fields,
            Err(e) => {
                debug!("Ticket form rejected: {}", e);
                if let SyncError::Validation(message) = e {
                    self.session.notices().error(message);
                }
                return SubmitOutcome::Invalid;
            }
        };

        let Some(user_id) = self.session.user_id() else {
            return SubmitOutcome::Rejected;
        };

        let new_ticket = NewTicket {
            user_id,
            category,
            description,
        };
        let record = match serde_json::to_value(&new_ticket) {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to encode ticket: {}", e);
                self.session.notices().error("Failed to create ticket.");
                return SubmitOutcome::Failed;
            }
        };

        let created = match self.session.gateway().insert(Table::Tickets, record).await {
            Ok(row) => row,
            Err(e) => {
                error!("Failed to create ticket for {}: {}", user_id, e);
                self.session.notices().error("Failed to create ticket.");
                return SubmitOutcome::Failed;
            }
        };

        self.last_created = serde_json::from_value(created).ok();
        info!("Ticket created by {}", user_id);
        self.session.notices().success("Ticket created successfully.");
        self.category = None;
        self.description.clear();
        self.refresh_key += 1;
        SubmitOutcome::Created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SyncConfig;
    use crate::core::shared::TicketStatus;
    use crate::gateway::memory::{InMemoryBackend, Operation};
    use crate::notice::{drain, NoticeLevel};
    use crate::session::Identity;
    use uuid::Uuid;

    fn form(backend: &InMemoryBackend) -> TicketForm {
        let customer = Uuid::new_v4();
        TicketForm::new(Session::signed_in(
            backend.gateway_for(Some(customer)),
            SyncConfig::default(),
            Identity::customer(customer),
        ))
    }

    #[tokio::test]
    async fn test_submit_creates_pending_ticket() {
        let backend = InMemoryBackend::new();
        let mut form = form(&backend);
        let mut notices = form.session.notices().subscribe();

        form.category = Some(TicketCategory::KycCompliance);
        form.description = "  Need to update my ID document  ".to_string();
        assert_eq!(form.submit().await, SubmitOutcome::Created);

        let created = form.last_created().unwrap();
        assert_eq!(created.description, "Need to update my ID document");
        assert_eq!(created.status, TicketStatus::Pending);
        assert_eq!(form.refresh_key(), 1);
        assert!(form.category.is_none());
        assert!(form.description.is_empty());
        assert_eq!(drain(&mut notices)[0].level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_missing_fields_issue_no_request() {
        let backend = InMemoryBackend::new();
        let mut form = form(&backend);
        let mut notices = form.session.notices().subscribe();

        form.description = "No category chosen".to_string();
        assert_eq!(form.submit().await, SubmitOutcome::Invalid);

        form.category = Some(TicketCategory::Payment);
        form.description = "   ".to_string();
        assert_eq!(form.submit().await, SubmitOutcome::Invalid);

        assert_eq!(backend.stats().await.inserts, 0);
        let raised = drain(&mut notices);
        assert_eq!(raised.len(), 2);
        assert!(raised.iter().all(|n| n.message == "Please fill in all fields."));
    }

    #[tokio::test]
    async fn test_description_limit() {
        let backend = InMemoryBackend::new();
        let mut form = form(&backend);

        form.category = Some(TicketCategory::GeneralInquiry);
        form.description = "x".repeat(1001);
        match form.validate() {
            Err(SyncError::Validation(message)) => {
                assert_eq!(message, "Description must be at most 1000 characters.")
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
        assert_eq!(form.submit().await, SubmitOutcome::Invalid);

        form.description = "x".repeat(1000);
        assert_eq!(form.submit().await, SubmitOutcome::Created);
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_fields() {
        let backend = InMemoryBackend::new();
        let mut form = form(&backend);
        backend.fail_next(Operation::Insert, Table::Tickets).await;

        form.category = Some(TicketCategory::Technical);
        form.description = "Two-factor codes never arrive".to_string();
        assert_eq!(form.submit().await, SubmitOutcome::Failed);

        assert_eq!(form.category, Some(TicketCategory::Technical));
        assert_eq!(form.refresh_key(), 0);
    }

    #[tokio::test]
    async fn test_signed_out_submit_is_silent() {
        let backend = InMemoryBackend::new();
        let mut form = TicketForm::new(Session::new(backend.gateway_for(None), SyncConfig::default()));
        let mut notices = form.session.notices().subscribe();

        form.category = Some(TicketCategory::Payment);
        form.description = "Refund".to_string();
        assert_eq!(form.submit().await, SubmitOutcome::Rejected);
        assert!(drain(&mut notices).is_empty());
    }
}
