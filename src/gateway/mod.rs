//! Remote data gateway seam.
//!
//! The hosted backend is reached only through [`DataGateway`]: point-in-time
//! queries, row writes and per-table change subscriptions. Rows travel as
//! JSON objects and are decoded into typed models by the read-models.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::mpsc;

pub use error::GatewayError;

use crate::realtime::{ChangeKind, RawChange};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tickets,
    TicketMessages,
    AuditLogs,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tickets => "tickets",
            Self::TicketMessages => "ticket_messages",
            Self::AuditLogs => "audit_logs",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Column predicate shared by queries, updates and subscription filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: &str, op: FilterOp, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            warn!("Filter value for {} is not serializable, comparing against null: {}", column, e);
            Value::Null
        });
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    pub fn eq(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    pub fn neq(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Neq, value)
    }

    pub fn gte(column: &str, value: impl Serialize) -> Self {
        Self::new(column, FilterOp::Gte, value)
    }

    /// Evaluates the predicate against a JSON row; a missing column never matches.
    pub fn matches(&self, row: &Value) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        let ordering = compare_values(actual, &self.value);
        match self.op {
            FilterOp::Eq => ordering == Some(Ordering::Equal),
            FilterOp::Neq => ordering != Some(Ordering::Equal),
            FilterOp::Gt => ordering == Some(Ordering::Greater),
            FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => ordering == Some(Ordering::Less),
            FilterOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// Compares two JSON scalars. RFC 3339 strings compare as instants so that
/// timestamps with different fractional precision still order correctly.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub projection: Projection,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            projection: Projection::All,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.projection = Projection::Columns(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub table: Table,
    pub kinds: Vec<ChangeKind>,
    pub filter: Option<Filter>,
}

impl SubscriptionSpec {
    pub fn all(table: Table) -> Self {
        Self {
            table,
            kinds: vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete],
            filter: None,
        }
    }

    pub fn inserts(table: Table) -> Self {
        Self {
            table,
            kinds: vec![ChangeKind::Insert],
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether a change should be delivered to this subscriber. Deletes are
    /// matched on the old row, everything else on the new row.
    pub fn accepts(&self, change: &RawChange) -> bool {
        if change.table != self.table || !self.kinds.contains(&change.kind) {
            return false;
        }
        let Some(filter) = &self.filter else {
            return true;
        };
        let row = match change.kind {
            ChangeKind::Delete => change.old_row.as_ref(),
            _ => change.new_row.as_ref(),
        };
        row.is_some_and(|row| filter.matches(row))
    }
}

/// Live change feed. Dropping it does not release the gateway-side
/// registration; call [`DataGateway::unsubscribe`] with its id.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub spec: SubscriptionSpec,
    pub receiver: mpsc::UnboundedReceiver<RawChange>,
}

#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn select(&self, query: &Query) -> GatewayResult<Vec<Value>>;

    async fn count(&self, query: &Query) -> GatewayResult<u64>;

    /// Inserts a record and returns the stored row with server-assigned columns.
    async fn insert(&self, table: Table, record: Value) -> GatewayResult<Value>;

    /// Applies `patch` to every row matching `filters`, returning the number of rows changed.
    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> GatewayResult<u64>;

    async fn subscribe(&self, spec: SubscriptionSpec) -> GatewayResult<Subscription>;

    async fn unsubscribe(&self, id: SubscriptionId) -> GatewayResult<()>;
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> GatewayResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
        .collect()
}
