//! Sequential executors and cancellation for the model loader.
//!
//! Gradle connections, persistent cache writes and listener notifications each run on their
//! own named worker thread so work of one kind is strictly ordered and never overlaps.

mod serial;

pub use serial::{InlineExecutor, SerialExecutor, TaskExecutor};
pub use tokio_util::sync::CancellationToken;

/// Renders a panic payload for logging.
pub fn panic_payload_to_str(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
