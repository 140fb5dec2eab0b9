use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SearchAborted;

/// Progress is reported once every this many records to keep event volume bounded.
pub const RECORD_DIVISOR: usize = 1231;

/// The event stream an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusChannel {
    Search,
    SearchSub,
    Remove,
}

impl StatusChannel {
    pub fn event_name(&self) -> &'static str {
        match self {
            StatusChannel::Search => "search-status",
            StatusChannel::SearchSub => "search-sub-status",
            StatusChannel::Remove => "remove-status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub progress: u8,
    pub message: String,
    pub stage: String,
}

/// Trait for reporting progress of long-running operations.
///
/// The CLI implements it with indicatif bars; a UI host forwards updates as events.
/// The default implementation is a no-op.
pub trait StatusReporter: Send + Sync {
    fn on_status(&self, _channel: StatusChannel, _update: &StatusUpdate) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl StatusReporter for SilentReporter {}

pub(crate) fn emit(
    reporter: &dyn StatusReporter,
    channel: StatusChannel,
    stage: &str,
    progress: usize,
    message: impl Into<String>,
) {
    reporter.on_status(
        channel,
        &StatusUpdate {
            progress: progress.min(100) as u8,
            message: message.into(),
            stage: stage.to_string(),
        },
    );
}

/// Integer percentage, safe for an empty total.
pub(crate) fn percent(done: usize, total: usize) -> usize {
    if total == 0 {
        100
    } else {
        done * 100 / total
    }
}

/// Shared cancellation flag, observed by long-running detectors per file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), SearchAborted> {
        if self.is_cancelled() {
            Err(SearchAborted::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());

        token.cancel();
        assert_eq!(observer.check(), Err(SearchAborted::Cancelled));

        observer.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_percent_handles_empty_total() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(5, 10), 50);
    }
}
