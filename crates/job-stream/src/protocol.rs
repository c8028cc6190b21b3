//! Server-to-client wire messages and the publish seam sessions write through.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::job::{JobSnapshot, JobUpdate};

/// Close code sent when the `period` query parameter is rejected.
pub const CLOSE_INVALID_PERIOD: u16 = 4000;

/// Text frame pushed to a client.
///
/// Encodes as `{"event": "<kebab-name>", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    InitialJobs(Vec<JobSnapshot>),
    JobUpdate(JobUpdate),
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, PublishError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("client channel closed")]
    ChannelClosed,
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound half of a connection, as seen by a session.
///
/// `can_publish` is checked before every publish; a `false` answer is an
/// expected outcome (the peer went away) and not an error.
pub trait Publisher: Send + Sync + 'static {
    fn can_publish(&self) -> bool;

    fn publish(&self, event: &ServerEvent) -> Result<(), PublishError>;
}

/// Publisher that queues encoded frames for the connection's writer task.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl Publisher for ChannelPublisher {
    fn can_publish(&self) -> bool {
        !self.tx.is_closed()
    }

    fn publish(&self, event: &ServerEvent) -> Result<(), PublishError> {
        let text = event.encode()?;
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| PublishError::ChannelClosed)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every event; can be flipped to refuse writes.
    #[derive(Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<ServerEvent>>,
        refuse: AtomicBool,
    }

    impl RecordingPublisher {
        pub fn events(&self) -> Vec<ServerEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn updates(&self) -> Vec<JobUpdate> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ServerEvent::JobUpdate(u) => Some(u),
                    ServerEvent::InitialJobs(_) => None,
                })
                .collect()
        }

        pub fn refuse_writes(&self) {
            self.refuse.store(true, Ordering::SeqCst);
        }
    }

    impl Publisher for RecordingPublisher {
        fn can_publish(&self) -> bool {
            !self.refuse.load(Ordering::SeqCst)
        }

        fn publish(&self, event: &ServerEvent) -> Result<(), PublishError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(PublishError::ChannelClosed);
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
