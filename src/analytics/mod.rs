//! Dashboard analytics: open tickets, tickets resolved today, and the open
//! tickets per category.
//!
//! Two strategies exist side by side:
//!
//! * [`ServerMetrics`] asks the backend for aggregate counts and recomputes
//!   whenever the `tickets` table changes or an audit entry is written.
//!   "Resolved today" counts audit transitions into `Resolved` since UTC
//!   midnight, which is the canonical definition.
//! * [`derive_metrics`] reduces an already loaded ticket list. It has no
//!   resolution timestamps, so "resolved today" is approximated as resolved
//!   tickets *created* since local midnight.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::shared::{Ticket, TicketStatus};
use crate::gateway::{Filter, GatewayResult, Query, Subscription, SubscriptionSpec, Table};
use crate::realtime;
use crate::session::Session;
use crate::tickets::TicketReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub open_total: u64,
    pub resolved_today: u64,
    pub open_by_category: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn has_open_tickets(&self) -> bool {
        !self.open_by_category.is_empty()
    }

    pub fn category_breakdown(&self) -> Vec<CategoryCount> {
        self.open_by_category
            .iter()
            .map(|(category, count)| CategoryCount {
                category: category.clone(),
                count: *count,
            })
            .collect()
    }
}

/// What a metrics card renders: a placeholder until the first computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsState {
    pub loading: bool,
    pub snapshot: Option<MetricsSnapshot>,
}

pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn start_of_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| start_of_utc_day(now.with_timezone(&Utc)), |d| d.with_timezone(&Utc))
}

pub fn accumulate_categories<'a>(categories: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for category in categories {
        *counts.entry(category.to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn derive_metrics(tickets: &[Ticket], day_start: DateTime<Utc>) -> MetricsSnapshot {
    let open: Vec<&Ticket> = tickets.iter().filter(|t| !t.is_resolved()).collect();
    let resolved_today = tickets
        .iter()
        .filter(|t| t.is_resolved() && t.created_at >= day_start)
        .count() as u64;

    MetricsSnapshot {
        open_total: open.len() as u64,
        resolved_today,
        open_by_category: accumulate_categories(open.iter().map(|t| t.category.as_str())),
    }
}

/// Client-derived metrics for an admin ticket table.
pub fn client_metrics(model: &TicketReadModel) -> MetricsState {
    if model.loading() {
        return MetricsState {
            loading: true,
            snapshot: None,
        };
    }
    MetricsState {
        loading: false,
        snapshot: Some(derive_metrics(model.tickets(), start_of_local_day(Local::now()))),
    }
}

/// Server-recomputed metrics kept live by two change feeds.
pub struct ServerMetrics {
    session: Session,
    ticket_feed: Option<Subscription>,
    audit_feed: Option<Subscription>,
    snapshot: Option<MetricsSnapshot>,
    loading: bool,
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics")
            .field("snapshot", &self.snapshot)
            .field("loading", &self.loading)
            .finish()
    }
}

impl ServerMetrics {
    /// Opens both feeds. The figures report `loading` until the first
    /// computation runs from [`Self::settle`], [`Self::process_pending`] or
    /// [`Self::wait_for_update`].
    pub async fn activate(session: Session) -> Self {
        let ticket_feed = realtime::open_feed(&session, SubscriptionSpec::all(Table::Tickets)).await;
        let audit_feed = realtime::open_feed(&session, SubscriptionSpec::inserts(Table::AuditLogs)).await;

        let metrics = Self {
            session,
            ticket_feed,
            audit_feed,
            snapshot: None,
            loading: true,
        };
        debug!("Server metrics activated, first computation pending");
        metrics
    }

    pub async fn deactivate(mut self) {
        realtime::close_feed(&self.session, self.ticket_feed.take()).await;
        realtime::close_feed(&self.session, self.audit_feed.take()).await;
    }

    pub fn state(&self) -> MetricsState {
        MetricsState {
            loading: self.loading,
            snapshot: self.snapshot.clone(),
        }
    }

    pub fn snapshot(&self) -> Option<&MetricsSnapshot> {
        self.snapshot.as_ref()
    }

    /// Runs the three aggregate queries. On failure the previous figures stay.
    pub async fn recompute(&mut self) -> bool {
        let result = self.query_snapshot(Utc::now()).await;
        self.loading = false;
        match result {
            Ok(snapshot) => {
                debug!(
                    "Metrics recomputed: {} open, {} resolved today",
                    snapshot.open_total, snapshot.resolved_today
                );
                self.snapshot = Some(snapshot);
                true
            }
            Err(e) => {
                error!("Failed to recompute metrics: {}", e);
                self.session.notices().error("Failed to load analytics.");
                false
            }
        }
    }

    async fn query_snapshot(&self, now: DateTime<Utc>) -> GatewayResult<MetricsSnapshot> {
        let gateway = self.session.gateway();
        let resolved = TicketStatus::Resolved;

        let open_query = Query::from(Table::Tickets).filter(Filter::neq("status", &resolved));
        let resolved_query = Query::from(Table::AuditLogs)
            .filter(Filter::eq("new_status", &resolved))
            .filter(Filter::gte("created_at", start_of_utc_day(now)));
        let category_query = Query::from(Table::Tickets)
            .filter(Filter::neq("status", &resolved))
            .columns(&["category"]);

        let (open_total, resolved_today, rows) = tokio::try_join!(
            gateway.count(&open_query),
            gateway.count(&resolved_query),
            gateway.select(&category_query),
        )?;

        let open_by_category =
            accumulate_categories(rows.iter().filter_map(|row| row.get("category")?.as_str()));

        Ok(MetricsSnapshot {
            open_total,
            resolved_today,
            open_by_category,
        })
    }

    fn drain_feeds(&mut self) -> usize {
        let mut drained = 0;
        while realtime::try_next(&mut self.ticket_feed).is_some() {
            drained += 1;
        }
        while realtime::try_next(&mut self.audit_feed).is_some() {
            drained += 1;
        }
        drained
    }

    /// Recomputes once if any change arrived since the last computation, or
    /// if nothing has been computed yet.
    pub async fn process_pending(&mut self) -> usize {
        let drained = self.drain_feeds();
        if self.loading || drained > 0 {
            self.recompute().await;
        }
        drained
    }

    /// Runs the first computation if it is still pending, then folds in
    /// whatever has already been delivered.
    pub async fn settle(&mut self) {
        self.process_pending().await;
    }

    /// Waits for a change on either feed, then recomputes once for
    /// everything that has queued up.
    /// Returns `false` once both feeds are gone.
    pub async fn wait_for_update(&mut self) -> bool {
        if self.loading {
            self.process_pending().await;
            return true;
        }
        if self.ticket_feed.is_none() && self.audit_feed.is_none() {
            return false;
        }
        let received = tokio::select! {
            change = realtime::next(&mut self.ticket_feed) => {
                if change.is_none() {
                    warn!("Ticket feed for metrics closed");
                    self.ticket_feed = None;
                }
                change.is_some()
            }
            change = realtime::next(&mut self.audit_feed) => {
                if change.is_none() {
                    warn!("Audit feed for metrics closed");
                    self.audit_feed = None;
                }
                change.is_some()
            }
        };
        if received {
            self.drain_feeds();
            self.recompute().await;
            return true;
        }
        self.ticket_feed.is_some() || self.audit_feed.is_some()
    }
}
