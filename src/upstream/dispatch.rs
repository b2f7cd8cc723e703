//! Best-effort verification email dispatch.
//!
//! Signup and resend ask the identity API to send a verification email. The
//! call runs as its own task, bounded by the dispatch timeout, and its outcome
//! is both returned to the caller and broadcast to subscribers. A failed
//! dispatch never fails the operation that triggered it.

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{types::EmailRequest, UpstreamClient, UpstreamError};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Upstream accepted the request (2xx).
    Dispatched { status: u16 },
    /// Upstream answered with a non-2xx status.
    Rejected { status: u16 },
    TimedOut,
    /// Transport, configuration or task failure.
    Failed,
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_dispatched(self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }

    /// Status upstream answered with, if it answered at all.
    #[must_use]
    pub fn status(self) -> Option<u16> {
        match self {
            Self::Dispatched { status } | Self::Rejected { status } => Some(status),
            Self::TimedOut | Self::Failed => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatchEvent {
    pub email: String,
    pub outcome: DispatchOutcome,
}

#[derive(Clone, Debug)]
pub struct VerificationDispatcher {
    client: UpstreamClient,
    events: broadcast::Sender<DispatchEvent>,
}

impl VerificationDispatcher {
    #[must_use]
    pub fn new(client: UpstreamClient) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { client, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Run the dispatch as a detached task.
    pub fn spawn(&self, email: String) -> JoinHandle<DispatchOutcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(email).await })
    }

    /// Run the dispatch on its own task and wait for the outcome.
    pub async fn run(&self, email: String) -> DispatchOutcome {
        match self.spawn(email).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("verification dispatch task failed: {err}");
                DispatchOutcome::Failed
            }
        }
    }

    pub async fn dispatch(&self, email: String) -> DispatchOutcome {
        let request = EmailRequest { email };
        let outcome = match self.client.send_verification(&request).await {
            Ok(response) if response.status.is_success() => DispatchOutcome::Dispatched {
                status: response.status.as_u16(),
            },
            Ok(response) => DispatchOutcome::Rejected {
                status: response.status.as_u16(),
            },
            Err(UpstreamError::Timeout) => DispatchOutcome::TimedOut,
            Err(err) => {
                debug!("verification dispatch error: {err}");
                DispatchOutcome::Failed
            }
        };

        if outcome.is_dispatched() {
            info!("verification email dispatched");
        } else {
            warn!("verification email not dispatched: {outcome:?}");
        }

        // No subscribers is fine.
        let _ = self.events.send(DispatchEvent {
            email: request.email,
            outcome,
        });

        outcome
    }
}
