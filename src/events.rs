use crate::writer::Capture;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Notifications produced by the capture loop for the consumer.
///
/// Each event is delivered to exactly one receiver and consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Informational engine message
    Info {
        message: String,
        timestamp: SystemTime,
    },
    /// A runtime fault inside the capture loop
    Error {
        message: String,
        timestamp: SystemTime,
    },
    /// A capture was persisted successfully
    CaptureSaved(Capture),
}

impl Event {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self::Info {
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Event::Info { timestamp, .. } => *timestamp,
            Event::Error { timestamp, .. } => *timestamp,
            Event::CaptureSaved(capture) => capture.timestamp.into(),
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            Event::Info { message, .. } => message.clone(),
            Event::Error { message, .. } => format!("Error: {}", message),
            Event::CaptureSaved(capture) => {
                format!(
                    "Capture saved: {} ({} bytes, {})",
                    capture.filename,
                    capture.size_bytes,
                    capture.kind.label()
                )
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Info { .. } => "info",
            Event::Error { .. } => "error",
            Event::CaptureSaved(_) => "capture_saved",
        }
    }
}

/// Producer half of the event channel, cloned into the capture task.
///
/// Sends never block; if the consumer side is gone the event is dropped
/// with a debug log.
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        match &event {
            Event::Error { message, .. } => error!("Engine error: {}", message),
            Event::CaptureSaved(capture) => {
                info!(
                    filename = %capture.filename,
                    size_bytes = capture.size_bytes,
                    kind = capture.kind.label(),
                    "Capture saved"
                );
            }
            Event::Info { message, .. } => debug!("Engine event: {}", message),
        }

        if self.sender.send(event).is_err() {
            debug!("Event channel closed, dropping event");
        }
    }

    pub fn info<S: Into<String>>(&self, message: S) {
        self.send(Event::info(message));
    }

    pub fn error<S: Into<String>>(&self, message: S) {
        self.send(Event::error(message));
    }
}

/// Unbounded single-consumer event queue between the capture task and the
/// caller.
///
/// There is no backpressure: a consumer that never drains lets the queue
/// grow without bound.
pub struct EventChannel {
    sender: mpsc::UnboundedSender<Event>,
    receiver: Mutex<mpsc::UnboundedReceiver<Event>>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Get a producer handle for the capture task
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Receive the next event.
    ///
    /// With `timeout == None` this is a non-blocking poll; with a timeout it
    /// waits up to that long for an event to arrive.
    pub async fn poll(&self, timeout: Option<Duration>) -> Option<Event> {
        let mut receiver = self.receiver.lock().await;
        match timeout {
            None => receiver.try_recv().ok(),
            Some(wait) => tokio::time::timeout(wait, receiver.recv())
                .await
                .ok()
                .flatten(),
        }
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Capture, CaptureKind};
    use chrono::Utc;

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let channel = EventChannel::new();
        let sender = channel.sender();

        sender.info("first");
        sender.error("second");
        sender.info("third");

        let first = channel.poll(None).await.unwrap();
        assert_eq!(first.event_type(), "info");
        assert!(first.description().contains("first"));

        let second = channel.poll(None).await.unwrap();
        assert_eq!(second.event_type(), "error");

        let third = channel.poll(None).await.unwrap();
        assert!(third.description().contains("third"));

        // Queue drained, nothing left
        assert!(channel.poll(None).await.is_none());
    }

    #[tokio::test]
    async fn test_poll_timeout_on_empty_channel() {
        let channel = EventChannel::new();

        let start = std::time::Instant::now();
        let result = channel.poll(Some(Duration::from_millis(50))).await;
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_poll_with_timeout_returns_pending_event_immediately() {
        let channel = EventChannel::new();
        channel.sender().info("pending");

        let start = std::time::Instant::now();
        let event = channel.poll(Some(Duration::from_secs(5))).await;
        assert!(event.is_some());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_capture_event_properties() {
        let capture = Capture {
            filename: "20240101_120000_000.jpg".to_string(),
            timestamp: Utc::now(),
            kind: CaptureKind::Automatic,
            size_bytes: 4096,
        };

        let event = Event::CaptureSaved(capture);
        assert_eq!(event.event_type(), "capture_saved");
        assert!(event.description().contains("20240101_120000_000.jpg"));
        assert!(event.description().contains("4096"));
    }

    #[tokio::test]
    async fn test_sender_outlives_drained_channel() {
        let channel = EventChannel::new();
        let sender = channel.sender();

        sender.info("one");
        assert!(channel.poll(None).await.is_some());
        assert!(channel.poll(None).await.is_none());

        // Channel stays usable after a drain
        sender.info("two");
        assert!(channel.poll(None).await.is_some());
    }
}
