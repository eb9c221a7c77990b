use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::shared::ListOrder;

pub const ENV_PREFIX: &str = "SUPPORTDESK_";

const DEFAULT_DESCRIPTION_LIMIT: usize = 1000;
const DEFAULT_NOTICE_CAPACITY: usize = 64;
const MIN_NOTICE_CAPACITY: usize = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum ticket description length, in characters, after trimming
    pub description_limit: usize,

    pub notice_capacity: usize,

    /// Order of the customer's "My Tickets" list
    pub customer_list_order: ListOrder,

    pub admin_list_order: ListOrder,

    /// Order of the audit history shown in the ticket detail view
    pub audit_order: ListOrder,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            description_limit: DEFAULT_DESCRIPTION_LIMIT,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            customer_list_order: ListOrder::Descending,
            admin_list_order: ListOrder::Ascending,
            audit_order: ListOrder::Descending,
        }
    }
}

impl SyncConfig {
    /// Defaults, then the optional TOML file, then `SUPPORTDESK_*` variables.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            debug!("Loading sync config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;

        Ok(config.validated())
    }

    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(source))
            .extract()?;
        Ok(config.validated())
    }

    fn validated(mut self) -> Self {
        if self.description_limit == 0 {
            warn!(
                "Description limit of 0 would reject every ticket, using {}",
                DEFAULT_DESCRIPTION_LIMIT
            );
            self.description_limit = DEFAULT_DESCRIPTION_LIMIT;
        }

        if self.notice_capacity < MIN_NOTICE_CAPACITY {
            warn!(
                "Notice capacity {} is too low, setting to minimum of {}",
                self.notice_capacity, MIN_NOTICE_CAPACITY
            );
            self.notice_capacity = MIN_NOTICE_CAPACITY;
        }

        self
    }
}
