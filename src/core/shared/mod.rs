pub mod enums;
pub mod error;
pub mod models;
#[cfg(test)]
pub mod test_utils;

pub use enums::*;
pub use error::{SyncError, SyncResult};
pub use models::{AuditLogEntry, Ticket, TicketMessage};
