use std::fmt;

use chrono::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// User-facing messages emitted by the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The session will end soon.
    ExpiringSoon { remaining: Duration },
    /// The session was ended because the token expired.
    Expired,
    /// The user logged out.
    LoggedOut,
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Expired)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ExpiringSoon { remaining } => {
                write!(f, "Session expires in {} seconds", remaining.num_seconds().max(0))
            }
            Notice::Expired => write!(f, "Session expired, please log in again"),
            Notice::LoggedOut => write!(f, "Logged out"),
        }
    }
}

/// Fire-and-forget sink for notices.
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Forwards notices to whoever holds the receiving end.
impl Notifier for mpsc::UnboundedSender<Notice> {
    fn notify(&self, notice: Notice) {
        if self.send(notice).is_err() {
            warn!("Notice dropped - receiver closed");
        }
    }
}

/// Writes notices to the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        if notice.is_error() {
            warn!(%notice, "Session notice");
        } else {
            info!(%notice, "Session notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_display() {
        let soon = Notice::ExpiringSoon {
            remaining: Duration::seconds(60),
        };
        assert_eq!(soon.to_string(), "Session expires in 60 seconds");
        assert_eq!(Notice::Expired.to_string(), "Session expired, please log in again");
        assert_eq!(Notice::LoggedOut.to_string(), "Logged out");
    }

    #[test]
    fn test_channel_notifier_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.notify(Notice::Expired);
        assert_eq!(rx.try_recv().ok(), Some(Notice::Expired));
    }

    #[test]
    fn test_channel_notifier_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<Notice>();
        drop(rx);
        tx.notify(Notice::LoggedOut);
    }
}
