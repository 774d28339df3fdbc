//! Streaming side channel for incremental run output.
//!
//! A sink receives `emit` calls in the order steps produce text, and exactly
//! one `close` when the run suspends or reaches a terminal state. The engine
//! never retracts emitted chunks; a failed run is reported out-of-band by
//! whoever consumes the run result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One piece of incremental output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    pub stage_id: String,
    pub text: String,
}

pub trait StreamSink: Send + Sync {
    fn emit(&self, chunk: StreamChunk);

    fn close(&self);
}

/// Forwards chunks into an unbounded channel. Closing drops the sender, so
/// the receiving side sees the end of the stream.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<StreamChunk>>>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl StreamSink for ChannelSink {
    fn emit(&self, chunk: StreamChunk) {
        if let Ok(guard) = self.tx.lock() {
            if let Some(tx) = guard.as_ref() {
                // Receiver gone means the client disconnected; the run goes on.
                let _ = tx.send(chunk);
            }
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// Engine-side handle: optional sink plus a shared "closed" latch so that
/// `close` reaches the sink at most once no matter how many clones call it.
#[derive(Clone, Default)]
pub(crate) struct SinkHandle {
    sink: Option<Arc<dyn StreamSink>>,
    closed: Arc<AtomicBool>,
}

impl SinkHandle {
    pub(crate) fn new(sink: Arc<dyn StreamSink>) -> Self {
        Self {
            sink: Some(sink),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn none() -> Self {
        Self::default()
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.sink.is_some()
    }

    pub(crate) fn emit(&self, stage_id: &str, text: String) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.emit(StreamChunk {
                stage_id: stage_id.to_string(),
                text,
            });
        }
    }

    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.close();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records everything it receives, for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub chunks: Mutex<Vec<StreamChunk>>,
        pub closes: std::sync::atomic::AtomicUsize,
    }

    impl RecordingSink {
        pub fn texts(&self) -> Vec<String> {
            self.chunks
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.text.clone())
                .collect()
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl StreamSink for RecordingSink {
        fn emit(&self, chunk: StreamChunk) {
            self.chunks.lock().unwrap().push(chunk);
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn test_handle_closes_once_and_drops_late_chunks() {
        let sink = Arc::new(RecordingSink::default());
        let handle = SinkHandle::new(sink.clone());
        let clone = handle.clone();

        handle.emit("a", "one".to_string());
        clone.emit("a", "two".to_string());
        handle.close();
        clone.close();
        handle.emit("a", "late".to_string());

        assert_eq!(sink.texts(), vec!["one", "two"]);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_ends_stream_on_close() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(StreamChunk {
            stage_id: "s".to_string(),
            text: "hello".to_string(),
        });
        sink.close();

        assert_eq!(rx.recv().await.unwrap().text, "hello");
        assert!(rx.recv().await.is_none());
    }
}
