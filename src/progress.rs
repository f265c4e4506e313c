//! Progress sinks for window-level progress events.
//!
//! The chunk processor reports through an injected [`ProgressSink`] instead
//! of knowing about the job tracker, HTTP polling or terminal output. The
//! service binds a sink to its job tracker; the CLI can forward to a
//! progress bar; tests collect events into a channel.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr_workbench::{ProgressSink, ChannelProgress};
//!
//! let (sink, mut rx) = ChannelProgress::new();
//! sink.on_window_start(1, 10, "Processing page 1 of 10...");
//! let update = rx.try_recv().unwrap();
//! assert_eq!(update.current_page, 1);
//! ```

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Receives progress events from a running chunk processor.
///
/// Exactly one processor writes to a given sink, but sinks may be shared
/// behind an `Arc` with readers on other threads, so implementations must be
/// `Send + Sync`. Only `on_window_start` is required.
pub trait ProgressSink: Send + Sync {
    /// Called before each window is rendered.
    ///
    /// # Arguments
    /// * `current_page`: 1-indexed first page of the window
    /// * `total_pages` : page count of the whole document
    /// * `message`     : human-readable description
    fn on_window_start(&self, current_page: usize, total_pages: usize, message: &str);

    /// Called when a window is dropped because it failed.
    fn on_window_failed(&self, first: usize, last: usize, error: &str) {
        let _ = (first, last, error);
    }
}

/// Sink that discards every event.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_window_start(&self, _current_page: usize, _total_pages: usize, _message: &str) {}
}

/// One progress event as delivered by [`ChannelProgress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub current_page: usize,
    pub total_pages: usize,
    pub message: String,
}

/// Sink that forwards every window start into an unbounded tokio channel.
///
/// Useful for streaming progress to a client without polling.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    /// Create the sink and the receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create the sink and expose the receiving half as a `Stream`.
    pub fn stream() -> (Self, impl Stream<Item = ProgressUpdate>) {
        let (sink, rx) = Self::new();
        (sink, UnboundedReceiverStream::new(rx))
    }
}

impl ProgressSink for ChannelProgress {
    fn on_window_start(&self, current_page: usize, total_pages: usize, message: &str) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(ProgressUpdate {
            current_page,
            total_pages,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;

    #[test]
    fn noop_does_not_panic() {
        let sink = NoopProgress;
        sink.on_window_start(1, 3, "page 1");
        sink.on_window_failed(2, 2, "boom");
    }

    #[tokio::test]
    async fn channel_stream_delivers_in_order() {
        let (sink, stream) = ChannelProgress::stream();
        sink.on_window_start(1, 3, "a");
        sink.on_window_start(2, 3, "b");
        drop(sink);

        let pages: Vec<usize> = stream.map(|u| u.current_page).collect().await;
        assert_eq!(pages, vec![1, 2]);
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelProgress::new();
        drop(rx);
        let sink: Arc<dyn ProgressSink> = Arc::new(sink);
        sink.on_window_start(1, 1, "nobody listening");
    }
}
