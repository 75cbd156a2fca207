//! The agent's own task and the page-side handle to it.
//!
//! The page and the agent share no state: every intercepted request and
//! every control message crosses an MPSC channel, and each reply comes back
//! on a oneshot channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::net::{Fetch, FetchError, Request, Response};

use super::control::{parse_wire, reply_to_wire, ControlMessage, ControlReply};
use super::lifecycle::LifecycleState;
use super::OfflineProxyAgent;

/// Buffer size for the agent event channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("No reply from proxy agent within {0:?}")]
    Timeout(Duration),

    #[error("Proxy agent has shut down")]
    Closed,
}

/// Events delivered to the agent task.
enum AgentEvent {
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Response, FetchError>>,
    },
    Message {
        message: ControlMessage,
        reply: Option<oneshot::Sender<ControlReply>>,
    },
    /// Every page controlled by the previous version has closed
    ClientsReleased,
}

/// Page-side handle to a running agent.
/// Clone is cheap - all clones feed the same channel.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentEvent>,
}

impl AgentHandle {
    async fn send(&self, event: AgentEvent) -> Result<(), ChannelError> {
        self.tx.send(event).await.map_err(|_| ChannelError::Closed)
    }

    /// Send a message and wait for its single reply. No retries.
    pub async fn request(&self, message: ControlMessage, timeout: Duration) -> Result<ControlReply, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentEvent::Message {
            message,
            reply: Some(reply),
        })
        .await?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::Timeout(timeout)),
        }
    }

    /// Send a message without waiting for a reply.
    pub async fn post(&self, message: ControlMessage) -> Result<(), ChannelError> {
        self.send(AgentEvent::Message { message, reply: None }).await
    }

    /// JSON form of [`AgentHandle::request`]. Malformed messages are answered
    /// locally with a failure reply.
    pub async fn request_wire(
        &self,
        value: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ChannelError> {
        match parse_wire(value) {
            Ok(message) => self.request(message, timeout).await.map(|r| reply_to_wire(&r)),
            Err(reply) => Ok(reply_to_wire(&reply)),
        }
    }

    /// Report that no page is held by an older version any more.
    pub async fn release_clients(&self) -> Result<(), ChannelError> {
        self.send(AgentEvent::ClientsReleased).await
    }
}

#[async_trait]
impl Fetch for AgentHandle {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentEvent::Fetch {
            request: request.clone(),
            reply,
        })
        .await
        .map_err(|e| FetchError::AgentUnavailable(e.to_string()))?;
        rx.await
            .map_err(|_| FetchError::AgentUnavailable("request dropped".to_string()))?
    }
}

/// Start the agent in its own task.
///
/// The task installs, then activates unless an older version still holds
/// the pages, then serves events until every handle is dropped.
pub fn spawn_agent(agent: Arc<OfflineProxyAgent>) -> (AgentHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let task = tokio::spawn(run(agent, rx));
    (AgentHandle { tx }, task)
}

async fn run(agent: Arc<OfflineProxyAgent>, mut rx: mpsc::Receiver<AgentEvent>) {
    agent.install().await;
    if agent.has_previous_version().await {
        info!(version = %agent.version(), "Installed; waiting for previous version to release pages");
    } else {
        agent.activate().await;
    }

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::Fetch { request, reply } => {
                let agent = Arc::clone(&agent);
                tokio::spawn(async move {
                    let result = agent.handle_fetch(&request).await;
                    if reply.send(result).is_err() {
                        debug!(url = %request.url, "Requester went away before the response");
                    }
                });
            }
            // Lifecycle transitions run inline so later events see them
            AgentEvent::Message {
                message: ControlMessage::SkipWaiting,
                reply,
            } => {
                let result = agent.handle_message(ControlMessage::SkipWaiting).await;
                if let Some(reply) = reply {
                    if reply.send(result).is_err() {
                        debug!("Control reply dropped; caller stopped waiting");
                    }
                }
            }
            AgentEvent::Message { message, reply } => {
                let agent = Arc::clone(&agent);
                tokio::spawn(async move {
                    let result = agent.handle_message(message).await;
                    if let Some(reply) = reply {
                        if reply.send(result).is_err() {
                            debug!("Control reply dropped; caller stopped waiting");
                        }
                    }
                });
            }
            AgentEvent::ClientsReleased => {
                if agent.state().await == LifecycleState::Waiting {
                    agent.activate().await;
                }
            }
        }
    }

    if agent.state().await != LifecycleState::Active {
        error!(version = %agent.version(), "Agent stopped before activation");
    }
    info!("Proxy agent stopped");
}
