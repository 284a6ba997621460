//! Pipeline event system.
//!
//! Every event names the pipeline that raised it, so a recipient linked to
//! several upstream pipelines can tell them apart.

use crate::element::SoundInfo;
use crate::executor::TaskState;
use std::fmt;
use tokio::sync::broadcast;

/// Events raised by a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The pipeline's executor is about to change state.
    StateChanged {
        /// Originating pipeline.
        pipeline: String,
        /// Previous state.
        from: TaskState,
        /// New state.
        to: TaskState,
    },

    /// Every job reported done.
    Eos {
        /// Originating pipeline.
        pipeline: String,
    },

    /// A job failed.
    Error {
        /// Originating pipeline.
        pipeline: String,
        /// The error message.
        message: String,
        /// The element whose job failed (if known).
        element: Option<String>,
    },

    /// Sound format reported through the pipeline.
    SoundInfo {
        /// Originating pipeline.
        pipeline: String,
        /// Element that reported the format.
        element: String,
        /// The reported format.
        info: SoundInfo,
    },

    /// Custom user-defined event.
    Custom {
        /// Originating pipeline.
        pipeline: String,
        /// Event name.
        name: String,
        /// Event payload (opaque bytes).
        payload: Vec<u8>,
    },
}

impl PipelineEvent {
    /// Name of the pipeline that raised the event.
    pub fn pipeline(&self) -> &str {
        match self {
            PipelineEvent::StateChanged { pipeline, .. }
            | PipelineEvent::Eos { pipeline }
            | PipelineEvent::Error { pipeline, .. }
            | PipelineEvent::SoundInfo { pipeline, .. }
            | PipelineEvent::Custom { pipeline, .. } => pipeline,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::StateChanged { pipeline, from, to } => {
                write!(f, "[{}] state {} -> {}", pipeline, from, to)
            }
            PipelineEvent::Eos { pipeline } => write!(f, "[{}] EOS", pipeline),
            PipelineEvent::Error {
                pipeline,
                message,
                element,
            } => {
                if let Some(el) = element {
                    write!(f, "[{}] error in {}: {}", pipeline, el, message)
                } else {
                    write!(f, "[{}] error: {}", pipeline, message)
                }
            }
            PipelineEvent::SoundInfo {
                pipeline,
                element,
                info,
            } => write!(f, "[{}] {} reports {}", pipeline, element, info),
            PipelineEvent::Custom {
                pipeline,
                name,
                payload,
            } => {
                write!(f, "[{}] custom event '{}' ({} bytes)", pipeline, name, payload.len())
            }
        }
    }
}

/// Sender for pipeline events.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventSender {
    /// Create a new event sender with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event.
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no receivers (which is fine).
    pub fn send(&self, event: PipelineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Create a receiver for events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new(256)
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Receiver for pipeline events.
///
/// Multiple receivers can be created from a single sender.
pub struct EventReceiver {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("event receiver lagged, {} events dropped", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is available or the sender has been dropped.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Receive from a synchronous context, blocking the calling thread.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for EOS or an error from the named pipeline.
    ///
    /// Returns `Ok(())` on EOS, `Err(message)` on error.
    pub async fn wait_eos(&mut self, pipeline: &str) -> Result<(), String> {
        while let Some(event) = self.recv().await {
            if event.pipeline() != pipeline {
                continue;
            }
            match event {
                PipelineEvent::Eos { .. } => return Ok(()),
                PipelineEvent::Error {
                    message, element, ..
                } => {
                    let full_msg = if let Some(el) = element {
                        format!("error in {}: {}", el, message)
                    } else {
                        message
                    };
                    return Err(full_msg);
                }
                _ => continue,
            }
        }
        Err("event channel closed unexpectedly".to_string())
    }
}

impl fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReceiver")
            .field("pending", &self.receiver.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_send_recv() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        sender.send(PipelineEvent::Eos {
            pipeline: "play".into(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.pipeline(), "play");
        assert!(matches!(event, PipelineEvent::Eos { .. }));
    }

    #[tokio::test]
    async fn test_multiple_receivers() {
        let sender = EventSender::new(16);
        let mut receiver1 = sender.subscribe();
        let mut receiver2 = sender.subscribe();
        assert_eq!(sender.receiver_count(), 2);

        sender.send(PipelineEvent::StateChanged {
            pipeline: "play".into(),
            from: TaskState::Initialized,
            to: TaskState::Running,
        });

        let e1 = receiver1.recv().await.unwrap();
        let e2 = receiver2.recv().await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_wait_eos_filters_pipeline() {
        let sender = EventSender::new(16);
        let mut receiver = sender.subscribe();

        let sender_clone = sender.clone();
        tokio::spawn(async move {
            sender_clone.send(PipelineEvent::Eos {
                pipeline: "other".into(),
            });
            sender_clone.send(PipelineEvent::Error {
                pipeline: "play".into(),
                message: "job failed".into(),
                element: Some("fade".into()),
            });
        });

        let result = receiver.wait_eos("play").await;
        assert_eq!(result.unwrap_err(), "error in fade: job failed");
    }

    #[test]
    fn test_try_recv_empty() {
        let sender = EventSender::default();
        let mut receiver = sender.subscribe();
        assert!(receiver.try_recv().is_none());
        sender.send(PipelineEvent::Eos {
            pipeline: "p".into(),
        });
        assert!(receiver.try_recv().is_some());
    }

    #[test]
    fn test_event_display() {
        let event = PipelineEvent::Error {
            pipeline: "play".into(),
            message: "test error".into(),
            element: Some("node1".into()),
        };
        assert_eq!(event.to_string(), "[play] error in node1: test error");

        let event = PipelineEvent::StateChanged {
            pipeline: "play".into(),
            from: TaskState::Running,
            to: TaskState::Paused,
        };
        assert_eq!(event.to_string(), "[play] state running -> paused");
    }
}
