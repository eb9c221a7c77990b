use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient message shown to the user, the dashboard's toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.raise(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.raise(NoticeLevel::Error, message);
    }

    fn raise(&self, level: NoticeLevel, message: String) {
        // Nobody listening is fine; notices are fire-and-forget.
        let _ = self.tx.send(Notice {
            level,
            message,
            raised_at: Utc::now(),
        });
    }
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Drains every notice currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(notice) => notices.push(notice),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Notice receiver lagged, {} notices skipped", skipped);
            }
            Err(_) => break,
        }
    }
    notices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_reach_subscribers() {
        let notices = Notices::new(8);
        let mut rx = notices.subscribe();

        notices.error("Failed to load tickets.");
        notices.success("Ticket status updated.");

        let received = drain(&mut rx);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].level, NoticeLevel::Error);
        assert_eq!(received[1].message, "Ticket status updated.");
    }

    #[test]
    fn test_raise_without_listeners_does_not_panic() {
        Notices::new(1).error("nobody is watching");
    }
}
