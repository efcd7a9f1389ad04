//! In-process event queue for background workflows.
//!
//! Events are deduplicated by id for a fixed window, queued on a bounded
//! channel and dispatched one task per run, so runs for different tickets
//! never wait on each other.

use crate::workflow::ticket_created::{TicketCreatedWorkflow, WorkflowOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TICKET_CREATED: &str = "ticket/created";

const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEvent {
    /// Deduplication key. Generated when the sender leaves it out.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketCreatedData {
    ticket_id: Uuid,
}

impl WorkflowEvent {
    pub fn ticket_created(ticket_id: Uuid) -> Self {
        Self {
            id: Some(format!("{}:{}", TICKET_CREATED, ticket_id)),
            name: TICKET_CREATED.to_string(),
            data: serde_json::json!({ "ticketId": ticket_id }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("invalid payload for '{0}': {1}")]
    InvalidPayload(String, String),
    #[error("workflow queue closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Queued,
    Duplicate,
}

struct Job {
    event_id: String,
    ticket_id: Uuid,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    tx: mpsc::Sender<Job>,
    seen: Arc<Mutex<HashMap<String, Instant>>>,
    dedup_window: Duration,
}

impl WorkflowEngine {
    /// Spawns the dispatcher. Every completed run is also forwarded to
    /// `outcomes` when given.
    pub fn start(
        workflow: Arc<TicketCreatedWorkflow>,
        dedup_window: Duration,
        outcomes: Option<mpsc::UnboundedSender<WorkflowOutcome>>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let workflow = workflow.clone();
                let outcomes = outcomes.clone();
                tokio::spawn(async move {
                    tracing::info!("Running {} for ticket {} (event {})", TICKET_CREATED, job.ticket_id, job.event_id);
                    let outcome = workflow.run(job.ticket_id).await;
                    if !outcome.success {
                        tracing::error!(
                            "Workflow for ticket {} failed: {}",
                            job.ticket_id,
                            outcome.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    if let Some(tx) = outcomes {
                        let _ = tx.send(outcome);
                    }
                });
            }
            tracing::info!("Workflow dispatcher stopped");
        });

        (
            Self {
                tx,
                seen: Arc::new(Mutex::new(HashMap::new())),
                dedup_window,
            },
            handle,
        )
    }

    pub async fn send(&self, event: WorkflowEvent) -> Result<Delivery, EngineError> {
        if event.name != TICKET_CREATED {
            return Err(EngineError::UnknownEvent(event.name));
        }
        let data: TicketCreatedData = serde_json::from_value(event.data)
            .map_err(|e| EngineError::InvalidPayload(event.name.clone(), e.to_string()))?;

        let event_id = event.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if !self.mark_seen(&event_id) {
            tracing::debug!("Duplicate event {} ignored", event_id);
            return Ok(Delivery::Duplicate);
        }

        let job = Job {
            event_id: event_id.clone(),
            ticket_id: data.ticket_id,
        };
        if self.tx.send(job).await.is_err() {
            self.forget(&event_id);
            return Err(EngineError::Closed);
        }
        Ok(Delivery::Queued)
    }

    /// Records the id; false when it was already seen inside the window.
    fn mark_seen(&self, event_id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        match seen.get(event_id) {
            Some(at) if now.duration_since(*at) < self.dedup_window => false,
            _ => {
                seen.insert(event_id.to_string(), now);
                true
            }
        }
    }

    fn forget(&self, event_id: &str) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(event_id);
    }

    /// Drops ids older than the dedup window (call periodically).
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let before = seen.len();
        seen.retain(|_, at| now.duration_since(*at) < self.dedup_window);
        let removed = before - seen.len();
        tracing::debug!("Workflow dedup cache: {} pruned, {} kept", removed, seen.len());
        removed
    }
}
