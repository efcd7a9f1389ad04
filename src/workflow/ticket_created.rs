//! Background pipeline run for every `ticket/created` event:
//! fetch → mark todo → AI triage → assign by skills → notify assignee.
//!
//! Only a missing ticket fails the run. Every later step degrades: a failed
//! triage leaves the ticket without AI fields, a failed assignment leaves it
//! unassigned, a failed email is logged and dropped.

use crate::db::{self, TicketAnalysisUpdate};
use crate::domain::models::{ModeratorProfile, Ticket, TicketStatus, User};
use crate::services::ai::{parse_analysis, AiService, TicketAnalysis};
use crate::services::mailer::{assignment_email, EmailContent, Mailer};
use crate::workflow::matcher;
use crate::workflow::retry::{run_step, RetryPolicy};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn fetch_ticket(&self, id: Uuid) -> Result<Option<Ticket>>;
    async fn set_status(&self, id: Uuid, status: TicketStatus) -> Result<()>;
    async fn save_analysis(&self, id: Uuid, update: &TicketAnalysisUpdate) -> Result<()>;
    async fn active_moderators(&self) -> Result<Vec<ModeratorProfile>>;
    async fn active_admin(&self) -> Result<Option<User>>;
    async fn assign(&self, id: Uuid, user_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait Triage: Send + Sync {
    /// False when the backend is not configured; the step is then skipped
    /// instead of retried.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Raw model reply for the ticket.
    async fn complete(&self, ticket: &Ticket) -> Result<String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn notify(&self, to: &str, content: &EmailContent) -> Result<()>;
}

/// [`TicketStore`] over the Postgres pool.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn fetch_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        db::find_ticket_by_id(&self.pool, id).await
    }

    async fn set_status(&self, id: Uuid, status: TicketStatus) -> Result<()> {
        db::set_ticket_status(&self.pool, id, status).await
    }

    async fn save_analysis(&self, id: Uuid, update: &TicketAnalysisUpdate) -> Result<()> {
        db::save_ticket_analysis(&self.pool, id, update).await
    }

    async fn active_moderators(&self) -> Result<Vec<ModeratorProfile>> {
        db::get_active_moderators(&self.pool).await
    }

    async fn active_admin(&self) -> Result<Option<User>> {
        db::find_active_admin(&self.pool).await
    }

    async fn assign(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        db::assign_ticket(&self.pool, id, user_id).await
    }
}

#[async_trait]
impl Triage for AiService {
    fn is_enabled(&self) -> bool {
        AiService::is_enabled(self)
    }

    async fn complete(&self, ticket: &Ticket) -> Result<String> {
        self.complete_triage(ticket).await
    }
}

#[async_trait]
impl Notifier for Mailer {
    fn is_enabled(&self) -> bool {
        Mailer::is_enabled(self)
    }

    async fn notify(&self, to: &str, content: &EmailContent) -> Result<()> {
        self.send(to, content).await
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutcome {
    pub success: bool,
    pub ticket_id: Uuid,
    pub ai_processed: bool,
    pub assigned_to: Option<Uuid>,
    pub email_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowOutcome {
    fn failed(ticket_id: Uuid, error: String) -> Self {
        Self {
            success: false,
            ticket_id,
            ai_processed: false,
            assigned_to: None,
            email_sent: false,
            error: Some(error),
        }
    }
}

pub struct TicketCreatedWorkflow {
    store: Arc<dyn TicketStore>,
    triage: Arc<dyn Triage>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    app_url: String,
}

impl TicketCreatedWorkflow {
    pub fn new(
        store: Arc<dyn TicketStore>,
        triage: Arc<dyn Triage>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
        app_url: String,
    ) -> Self {
        Self {
            store,
            triage,
            notifier,
            retry,
            app_url,
        }
    }

    pub async fn run(&self, ticket_id: Uuid) -> WorkflowOutcome {
        let store: &dyn TicketStore = self.store.as_ref();

        // 1. fetch
        let mut ticket = match run_step(self.retry, "fetch-ticket", move || store.fetch_ticket(ticket_id)).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                tracing::error!("Workflow aborted: ticket {} not found", ticket_id);
                return WorkflowOutcome::failed(ticket_id, format!("Ticket {} not found", ticket_id));
            }
            Err(e) => {
                return WorkflowOutcome::failed(ticket_id, format!("Failed to fetch ticket: {e}"));
            }
        };

        // 2. mark pipeline start
        if run_step(self.retry, "update-ticket-status", move || {
            store.set_status(ticket_id, TicketStatus::Todo)
        })
        .await
        .is_ok()
        {
            ticket.status = TicketStatus::Todo;
        }

        // 3. triage
        let analysis = self.analyze(&ticket).await;
        let mut ai_processed = false;
        let mut required_skills: Vec<String> = Vec::new();
        if let Some(analysis) = analysis {
            let update = TicketAnalysisUpdate {
                summary: analysis.summary,
                notes: analysis.helpful_notes,
                priority: analysis.priority,
                related_skills: analysis.related_skills,
            };
            let update_ref = &update;
            match run_step(self.retry, "save-analysis", move || store.save_analysis(ticket_id, update_ref)).await {
                Ok(()) => {
                    ai_processed = true;
                    required_skills = update.related_skills.clone();
                    ticket.ai_summary = Some(update.summary);
                    ticket.ai_notes = Some(update.notes);
                    ticket.priority = update.priority;
                    ticket.related_skills = update.related_skills;
                    ticket.status = TicketStatus::InProgress;
                }
                Err(e) => tracing::warn!("Triage result for ticket {} not saved: {:#}", ticket_id, e),
            }
        }

        // 4. assignment
        let assignee = self.assign(&ticket, &required_skills).await;
        if let Some(user) = &assignee {
            ticket.assigned_to = Some(user.id);
        }

        // 5. notify
        let email_sent = match &assignee {
            Some(user) => self.notify(&ticket, user).await,
            None => false,
        };

        let outcome = WorkflowOutcome {
            success: true,
            ticket_id,
            ai_processed,
            assigned_to: assignee.map(|u| u.id),
            email_sent,
            error: None,
        };
        tracing::info!(
            "Ticket {} processed: ai={}, assigned_to={:?}, email_sent={}",
            ticket_id,
            outcome.ai_processed,
            outcome.assigned_to,
            outcome.email_sent
        );
        outcome
    }

    async fn analyze(&self, ticket: &Ticket) -> Option<TicketAnalysis> {
        let triage: &dyn Triage = self.triage.as_ref();
        if !triage.is_enabled() {
            tracing::debug!("AI triage disabled, skipping ticket {}", ticket.id);
            return None;
        }
        let raw = match run_step(self.retry, "ai-processing", move || triage.complete(ticket)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("AI triage unavailable for ticket {}: {:#}", ticket.id, e);
                return None;
            }
        };

        match parse_analysis(&raw) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::warn!("Could not parse AI triage for ticket {}: {}", ticket.id, e);
                None
            }
        }
    }

    /// Best skill-matched moderator, else any active admin. Errors are
    /// absorbed and leave the ticket unassigned.
    async fn assign(&self, ticket: &Ticket, required_skills: &[String]) -> Option<User> {
        let store: &dyn TicketStore = self.store.as_ref();

        let mut chosen: Option<User> = None;
        if !required_skills.is_empty() {
            match run_step(self.retry, "load-moderators", move || store.active_moderators()).await {
                Ok(moderators) => {
                    let candidates: Vec<(usize, Vec<String>)> = moderators
                        .iter()
                        .enumerate()
                        .map(|(idx, m)| (idx, m.skill_names()))
                        .collect();
                    if let Some(idx) = matcher::best_candidate(&candidates, required_skills) {
                        chosen = moderators.into_iter().nth(idx).map(|m| m.user);
                    }
                }
                Err(e) => tracing::warn!("Could not load moderators: {:#}", e),
            }
        }

        if chosen.is_none() {
            match run_step(self.retry, "load-admin", move || store.active_admin()).await {
                Ok(admin) => chosen = admin,
                Err(e) => tracing::warn!("Could not load fallback admin: {:#}", e),
            }
        }

        let Some(user) = chosen else {
            tracing::warn!("No moderator or admin available, ticket {} left unassigned", ticket.id);
            return None;
        };

        let (ticket_id, user_id) = (ticket.id, user.id);
        match run_step(self.retry, "assign-moderator", move || store.assign(ticket_id, user_id)).await {
            Ok(()) => {
                tracing::info!("Ticket {} assigned to {} ({:?})", ticket_id, user.email, user.role);
                Some(user)
            }
            Err(e) => {
                tracing::warn!("Assignment of ticket {} failed: {:#}", ticket_id, e);
                None
            }
        }
    }

    async fn notify(&self, ticket: &Ticket, assignee: &User) -> bool {
        if !self.notifier.is_enabled() {
            tracing::debug!("Mail disabled, no notification for ticket {}", ticket.id);
            return false;
        }
        let content = assignment_email(ticket, assignee, &self.app_url);
        let content_ref = &content;
        let to = assignee.email.as_str();
        let notifier: &dyn Notifier = self.notifier.as_ref();
        match run_step(self.retry, "send-email-notification", move || notifier.notify(to, content_ref)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Notification for ticket {} not sent: {:#}", ticket.id, e);
                false
            }
        }
    }
}
