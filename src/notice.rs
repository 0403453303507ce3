//! User-facing notices
//!
//! Failures that the user should see (bad API key, unreachable endpoint,
//! saved settings) are reported through a [`Notifier`] instead of being
//! printed where they happen. The terminal front-end prints them in color;
//! tests record them.

use std::sync::{Mutex, PoisonError};

use colored::Colorize;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Neutral information
    Info,
    /// A requested change took effect
    Success,
    /// An operation failed
    Error,
}

/// A short message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Text shown to the user
    pub message: String,
}

impl Notice {
    /// Create an informational notice
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Create a success notice
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    /// Create an error notice
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Sink for user-facing notices
pub trait Notifier: Send + Sync {
    /// Deliver one notice
    fn notify(&self, notice: Notice);
}

/// Notifier that only writes to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!("{}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => tracing::info!("{}", notice.message),
        }
    }
}

/// Notifier that prints colored lines to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        tracing::debug!("notice ({:?}): {}", notice.level, notice.message);
        match notice.level {
            NoticeLevel::Error => eprintln!("{}", notice.message.red()),
            NoticeLevel::Success => eprintln!("{}", notice.message.green()),
            NoticeLevel::Info => eprintln!("{}", notice.message.cyan()),
        }
    }
}

/// Notifier that keeps every notice in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices delivered so far, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages of notices at `level`
    pub fn messages_at(&self, level: NoticeLevel) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}
