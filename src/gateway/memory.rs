//! In-process stand-in for the hosted backend.
//!
//! Behaves like the production database for the parts the read-models rely
//! on: server-assigned `id` and `created_at`, default ticket status and
//! priority, the audit trigger that records every status transition, and
//! filtered change fan-out to subscribers. Tests use the failure hooks and
//! counters to observe request traffic and subscription leaks.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::{debug, trace, warn};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::{
    compare_values, DataGateway, Filter, GatewayError, GatewayResult, Projection, Query,
    Subscription, SubscriptionId, SubscriptionSpec, Table,
};
use crate::realtime::{ChangeKind, RawChange};

const DEFAULT_TICKET_STATUS: &str = "Pending";
const DEFAULT_TICKET_PRIORITY: &str = "Medium";
const IMMUTABLE_COLUMNS: [&str; 2] = ["id", "created_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Count,
    Insert,
    Update,
    Subscribe,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub selects: u64,
    pub counts: u64,
    pub inserts: u64,
    pub updates: u64,
    pub subscribes: u64,
    pub unsubscribes: u64,
}

struct Subscriber {
    spec: SubscriptionSpec,
    sender: mpsc::UnboundedSender<RawChange>,
}

#[derive(Default)]
struct BackendState {
    tables: HashMap<Table, Vec<Value>>,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    next_subscription: u64,
    failures: Vec<(Operation, Table)>,
    stats: GatewayStats,
    last_timestamp: Option<DateTime<Utc>>,
}

impl BackendState {
    fn take_failure(&mut self, op: Operation, table: Table) -> bool {
        match self.failures.iter().position(|f| *f == (op, table)) {
            Some(idx) => {
                self.failures.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Strictly increasing so rows written back to back still have a total order.
    fn next_timestamp(&mut self) -> String {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn emit(&mut self, change: RawChange) {
        for (id, subscriber) in &self.subscribers {
            if !subscriber.spec.accepts(&change) {
                continue;
            }
            if subscriber.sender.send(change.clone()).is_err() {
                debug!("Subscriber {} dropped its receiver without unsubscribing", id);
            }
        }
    }

    fn insert_row(&mut self, table: Table, record: Value, actor: Option<Uuid>) -> GatewayResult<Value> {
        let Value::Object(mut row) = record else {
            return Err(GatewayError::Write(format!(
                "{table} record must be a JSON object"
            )));
        };

        row.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
        if !row.contains_key("created_at") {
            let created_at = self.next_timestamp();
            row.insert("created_at".to_string(), json!(created_at));
        }

        if table == Table::Tickets {
            row.entry("status").or_insert_with(|| json!(DEFAULT_TICKET_STATUS));
            row.entry("priority").or_insert_with(|| json!(DEFAULT_TICKET_PRIORITY));
        }

        let row = Value::Object(row);
        self.tables.entry(table).or_default().push(row.clone());
        trace!("Inserted into {}: {}", table, row);

        self.emit(RawChange {
            table,
            kind: ChangeKind::Insert,
            new_row: Some(row.clone()),
            old_row: None,
        });

        if table == Table::Tickets {
            let changed_by = actor
                .map(|a| json!(a))
                .or_else(|| row.get("user_id").cloned())
                .unwrap_or(Value::Null);
            self.record_transition(&row, Value::Null, changed_by);
        }

        Ok(row)
    }

    fn record_transition(&mut self, ticket: &Value, old_status: Value, changed_by: Value) {
        let entry = json!({
            "ticket_id": ticket.get("id").cloned().unwrap_or(Value::Null),
            "old_status": old_status,
            "new_status": ticket.get("status").cloned().unwrap_or(Value::Null),
            "changed_by": changed_by,
        });
        // The audit row itself never triggers further audit rows.
        if let Err(e) = self.insert_row(Table::AuditLogs, entry, None) {
            warn!("Failed to record status transition: {}", e);
        }
    }

    fn update_rows(
        &mut self,
        table: Table,
        patch: Value,
        filters: &[Filter],
        actor: Option<Uuid>,
    ) -> GatewayResult<u64> {
        let Value::Object(mut patch) = patch else {
            return Err(GatewayError::Write(format!("{table} patch must be a JSON object")));
        };
        for column in IMMUTABLE_COLUMNS {
            patch.remove(column);
        }

        let rows = self.tables.entry(table).or_default();
        let mut changes = Vec::new();
        for row in rows.iter_mut() {
            if !filters.iter().all(|f| f.matches(row)) {
                continue;
            }
            let old_row = row.clone();
            if let Value::Object(fields) = row {
                merge(fields, &patch);
            }
            changes.push((old_row, row.clone()));
        }

        let affected = changes.len() as u64;
        for (old_row, new_row) in changes {
            let old_status = old_row.get("status").cloned().unwrap_or(Value::Null);
            let status_changed = new_row.get("status") != old_row.get("status");

            self.emit(RawChange {
                table,
                kind: ChangeKind::Update,
                new_row: Some(new_row.clone()),
                old_row: Some(old_row),
            });

            if table == Table::Tickets && status_changed {
                let changed_by = actor.map_or(Value::Null, |a| json!(a));
                self.record_transition(&new_row, old_status, changed_by);
            }
        }

        Ok(affected)
    }

    fn delete_rows(&mut self, table: Table, filters: &[Filter]) -> u64 {
        let rows = self.tables.entry(table).or_default();
        let (removed, kept): (Vec<Value>, Vec<Value>) = rows
            .drain(..)
            .partition(|row| filters.iter().all(|f| f.matches(row)));
        *rows = kept;

        let count = removed.len() as u64;
        for row in removed {
            self.emit(RawChange {
                table,
                kind: ChangeKind::Delete,
                new_row: None,
                old_row: Some(row),
            });
        }
        count
    }

    fn select_rows(&self, query: &Query) -> Vec<Value> {
        let mut rows: Vec<Value> = self
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = match (a.get(&order.column), b.get(&order.column)) {
                    (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Projection::Columns(columns) = &query.projection {
            rows = rows
                .into_iter()
                .map(|row| {
                    let projected: Map<String, Value> = columns
                        .iter()
                        .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                        .collect();
                    Value::Object(projected)
                })
                .collect();
        }

        rows
    }
}

fn merge(fields: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        fields.insert(key.clone(), value.clone());
    }
}

fn simulated(op: Operation, table: Table) -> GatewayError {
    let message = format!("simulated {op:?} failure on {table}");
    match op {
        Operation::Select | Operation::Count => GatewayError::Query(message),
        Operation::Insert | Operation::Update => GatewayError::Write(message),
        Operation::Subscribe => GatewayError::Subscription(message),
    }
}

/// Shared backend state. Cheap to clone; every clone sees the same tables.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend").finish_non_exhaustive()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection acting as `actor`; the actor is recorded as
    /// `changed_by` on audit rows produced by its writes.
    pub fn connect(&self, actor: Option<Uuid>) -> InMemoryGateway {
        InMemoryGateway {
            backend: self.clone(),
            actor,
        }
    }

    pub fn gateway_for(&self, actor: Option<Uuid>) -> Arc<dyn DataGateway> {
        Arc::new(self.connect(actor))
    }

    /// Makes the next `op` against `table` fail once.
    pub async fn fail_next(&self, op: Operation, table: Table) {
        self.state.lock().await.failures.push((op, table));
    }

    pub async fn stats(&self) -> GatewayStats {
        self.state.lock().await.stats
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    pub async fn active_subscriptions_for(&self, table: Table) -> usize {
        self.state
            .lock()
            .await
            .subscribers
            .values()
            .filter(|s| s.spec.table == table)
            .count()
    }

    pub async fn rows(&self, table: Table) -> Vec<Value> {
        self.state
            .lock()
            .await
            .tables
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Writes a row directly, bypassing failure injection and request counters.
    pub async fn seed(&self, table: Table, record: Value) -> GatewayResult<Value> {
        self.state.lock().await.insert_row(table, record, None)
    }

    /// Deletes rows out of band. Nothing in the dashboard originates deletes,
    /// but subscribers still have to cope with them.
    pub async fn delete_rows(&self, table: Table, filters: &[Filter]) -> u64 {
        self.state.lock().await.delete_rows(table, filters)
    }
}

/// One authenticated connection to an [`InMemoryBackend`].
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    backend: InMemoryBackend,
    actor: Option<Uuid>,
}

#[async_trait]
impl DataGateway for InMemoryGateway {
    async fn select(&self, query: &Query) -> GatewayResult<Vec<Value>> {
        let mut state = self.backend.state.lock().await;
        state.stats.selects += 1;
        if state.take_failure(Operation::Select, query.table) {
            return Err(simulated(Operation::Select, query.table));
        }
        Ok(state.select_rows(query))
    }

    async fn count(&self, query: &Query) -> GatewayResult<u64> {
        let mut state = self.backend.state.lock().await;
        state.stats.counts += 1;
        if state.take_failure(Operation::Count, query.table) {
            return Err(simulated(Operation::Count, query.table));
        }
        Ok(state.select_rows(query).len() as u64)
    }

    async fn insert(&self, table: Table, record: Value) -> GatewayResult<Value> {
        let mut state = self.backend.state.lock().await;
        state.stats.inserts += 1;
        if state.take_failure(Operation::Insert, table) {
            return Err(simulated(Operation::Insert, table));
        }
        state.insert_row(table, record, self.actor)
    }

    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> GatewayResult<u64> {
        let mut state = self.backend.state.lock().await;
        state.stats.updates += 1;
        if state.take_failure(Operation::Update, table) {
            return Err(simulated(Operation::Update, table));
        }
        state.update_rows(table, patch, filters, self.actor)
    }

    async fn subscribe(&self, spec: SubscriptionSpec) -> GatewayResult<Subscription> {
        let mut state = self.backend.state.lock().await;
        state.stats.subscribes += 1;
        if state.take_failure(Operation::Subscribe, spec.table) {
            return Err(simulated(Operation::Subscribe, spec.table));
        }

        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.insert(
            id,
            Subscriber {
                spec: spec.clone(),
                sender,
            },
        );
        debug!("Opened {} on {}", id, spec.table);

        Ok(Subscription { id, spec, receiver })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> GatewayResult<()> {
        let mut state = self.backend.state.lock().await;
        state.stats.unsubscribes += 1;
        match state.subscribers.remove(&id) {
            Some(_) => {
                debug!("Closed {}", id);
                Ok(())
            }
            None => Err(GatewayError::Subscription(format!("unknown subscription {id}"))),
        }
    }
}
