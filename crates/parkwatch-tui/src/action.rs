//! Everything that can change UI state goes through an [`Action`].

use std::sync::Arc;

use parkwatch_core::{ConnectionState, FeedNotice, OccupancySnapshot};

use crate::screen::ScreenId;

#[derive(Debug, Clone)]
pub enum Action {
    Quit,
    Tick,
    Render,

    SwitchScreen(ScreenId),
    ToggleHelp,

    // ── Feed ────────────────────────────────────────────────────
    SnapshotUpdated(Arc<OccupancySnapshot>),
    ConnectionChanged(ConnectionState),

    // ── Floor-plan modal ────────────────────────────────────────
    OpenSite(String),
    RefreshSite,
    CloseSite,

    Notify(Notification),
    DismissNotification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A toast in the corner of the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn info(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Info,
        }
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Warning,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            level: NotificationLevel::Error,
        }
    }
}

impl From<FeedNotice> for Notification {
    fn from(notice: FeedNotice) -> Self {
        match notice {
            FeedNotice::MalformedPayload { reason } => {
                Self::warning(format!("Ignored bad update: {reason}"))
            }
            FeedNotice::ConnectionLost { reason } => {
                Self::error(format!("Feed connection lost: {reason}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn feed_notices_become_toasts() {
        let toast = Notification::from(FeedNotice::MalformedPayload {
            reason: "expected an object, got an array".into(),
        });
        assert_eq!(toast.level, NotificationLevel::Warning);
        assert_eq!(
            toast.message,
            "Ignored bad update: expected an object, got an array"
        );

        let toast = Notification::from(FeedNotice::ConnectionLost {
            reason: "reset".into(),
        });
        assert_eq!(toast.level, NotificationLevel::Error);
    }
}
