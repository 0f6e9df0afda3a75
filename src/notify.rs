//! Transient user-facing messages.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub icon: Option<&'static str>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
            icon: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.icon {
            Some(icon) => write!(f, "{icon} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sends notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => tracing::info!(target: "notify", "{notification}"),
            Level::Error => tracing::error!(target: "notify", "{notification}"),
        }
    }
}

/// Keeps every notification; used by tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.message).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_notifier_shares_its_log() {
        let notifier = MemoryNotifier::new();
        let clone = notifier.clone();

        clone.notify(Notification::success("Lesson completed! 86 points earned"));
        notifier.notify(Notification::error("Failed to submit quiz results"));

        assert_eq!(
            notifier.messages(),
            vec!["Lesson completed! 86 points earned", "Failed to submit quiz results"]
        );
        assert_eq!(notifier.sent()[1].level, Level::Error);
    }

    #[test]
    fn display_includes_icon() {
        let n = Notification::success("Achievement Unlocked: First Light").with_icon("🏆");
        assert_eq!(n.to_string(), "🏆 Achievement Unlocked: First Light");
    }
}
