use parking_lot::Mutex;

use crate::status::Status;

/// A log message emitted by a component through its logger callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub instance: String,
    pub status: Status,
    pub category: String,
    pub message: String,
}

/// Receives callbacks issued by a component.
///
/// Callbacks may arrive on whichever thread the component calls from, and
/// for remote components they arrive interleaved with replies, so sinks must
/// be shareable.
pub trait CallbackSink: Send + Sync {
    fn log(&self, message: &LogMessage);

    /// Notification that an asynchronous `do_step` has finished.
    fn step_finished(&self, _status: Status) {}
}

/// Routes component log messages to `tracing`.
///
/// The level follows the message status: `Ok` logs at debug, `Warning` and
/// `Discard` at warn, and `Error` and `Fatal` at error.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl CallbackSink for TracingSink {
    fn log(&self, message: &LogMessage) {
        let LogMessage {
            instance,
            status,
            category,
            message,
        } = message;
        match status {
            Status::Ok | Status::Pending => {
                tracing::debug!(instance = %instance, category = %category, "{message}");
            }
            Status::Warning | Status::Discard => {
                tracing::warn!(instance = %instance, category = %category, "{message}");
            }
            Status::Error | Status::Fatal => {
                tracing::error!(instance = %instance, category = %category, "{message}");
            }
        }
    }

    fn step_finished(&self, status: Status) {
        tracing::debug!(status = %status, "asynchronous step finished");
    }
}

/// Forwards to an inner sink and remembers the latest diagnostic.
///
/// Every instance installs one of these so that a failed call can report the
/// last message the component logged before failing.
pub(crate) struct DiagnosticSink {
    inner: std::sync::Arc<dyn CallbackSink>,
    last: Mutex<Option<String>>,
}

impl DiagnosticSink {
    pub(crate) fn new(inner: std::sync::Arc<dyn CallbackSink>) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    pub(crate) fn last(&self) -> Option<String> {
        self.last.lock().clone()
    }
}

impl CallbackSink for DiagnosticSink {
    fn log(&self, message: &LogMessage) {
        if message.status != Status::Ok {
            *self.last.lock() = Some(format!("[{}] {}", message.category, message.message));
        }
        self.inner.log(message);
    }

    fn step_finished(&self, status: Status) {
        self.inner.step_finished(status);
    }
}
