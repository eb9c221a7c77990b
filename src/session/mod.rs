//! Explicit session context.
//!
//! Every read-model is built from a [`Session`] instead of reaching for a
//! process-wide client or signed-in user. A session lives from sign-in to
//! sign-out; views hold clones of it for as long as they are active.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::SyncConfig;
use crate::core::shared::{SyncError, SyncResult};
use crate::gateway::DataGateway;
use crate::notice::Notices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Clone)]
pub struct Session {
    gateway: Arc<dyn DataGateway>,
    identity: Option<Identity>,
    config: Arc<SyncConfig>,
    notices: Notices,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Signed-out session on `gateway`.
    pub fn new(gateway: Arc<dyn DataGateway>, config: SyncConfig) -> Self {
        let notices = Notices::new(config.notice_capacity);
        Self {
            gateway,
            identity: None,
            config: Arc::new(config),
            notices,
        }
    }

    pub fn signed_in(gateway: Arc<dyn DataGateway>, config: SyncConfig, identity: Identity) -> Self {
        let mut session = Self::new(gateway, config);
        session.identity = Some(identity);
        session
    }

    pub fn sign_in(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    pub fn sign_out(&mut self) {
        self.identity = None;
    }

    pub fn gateway(&self) -> Arc<dyn DataGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.identity.map(|i| i.user_id)
    }

    pub fn require_identity(&self) -> SyncResult<Identity> {
        self.identity.ok_or(SyncError::NotAuthenticated)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }
}
