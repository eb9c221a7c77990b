//! Realtime read-model synchronization for a support ticket dashboard.
//!
//! Each view of the dashboard (ticket list, message thread, status history,
//! analytics) owns a read-model that performs one bulk fetch on activation
//! and then applies change notifications from the backend until it is
//! deactivated.

pub mod analytics;
pub mod core;
pub mod gateway;
pub mod notice;
pub mod realtime;
pub mod session;
pub mod tickets;

pub use crate::core::config::SyncConfig;
pub use crate::core::shared::{SyncError, SyncResult};
pub use crate::session::{Identity, Role, Session};
