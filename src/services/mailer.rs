use crate::config::SmtpConfig;
use crate::domain::models::{Ticket, User};
use anyhow::{anyhow, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

/// Subject and plain-text body of an outgoing notification.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// Notification sent to the user a ticket was assigned to.
pub fn assignment_email(ticket: &Ticket, assignee: &User, app_url: &str) -> EmailContent {
    let summary = ticket
        .ai_summary
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("No summary available.");
    let notes = ticket
        .ai_notes
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|n| format!("\nNotes for the assignee:\n{}\n", n))
        .unwrap_or_default();
    let skills = if ticket.related_skills.is_empty() {
        "none identified".to_string()
    } else {
        ticket.related_skills.join(", ")
    };

    let body = format!(
        r#"Hi {name},

A support ticket has been assigned to you.

Title: {title}
Priority: {priority}
Status: {status}
Required skills: {skills}

Summary:
{summary}
{notes}
Open the ticket: {url}/tickets/{id}

This is an automated message from the support desk."#,
        name = assignee.display_name(),
        title = ticket.title,
        priority = ticket.priority.as_str(),
        status = ticket.status.as_str(),
        skills = skills,
        summary = summary,
        notes = notes,
        url = app_url.trim_end_matches('/'),
        id = ticket.id,
    );

    EmailContent {
        subject: format!("Ticket assigned: {}", ticket.title),
        body,
    }
}

#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl Mailer {
    pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self> {
        let Some(smtp) = smtp else {
            tracing::warn!("SMTP_HOST not set, email notifications disabled");
            return Ok(Self::disabled());
        };

        let from: Mailbox = smtp
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid SMTP_FROM address: {}", e))?;

        let mut builder = match (&smtp.user, &smtp.pass) {
            (Some(user), Some(pass)) => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
                .map_err(|e| anyhow!("SMTP relay error: {}", e))?
                .credentials(Credentials::new(user.clone(), pass.clone())),
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host),
        };
        if let Some(port) = smtp.port {
            builder = builder.port(port);
        }

        Ok(Self {
            transport: Some(builder.build()),
            from: Some(from),
        })
    }

    pub fn disabled() -> Self {
        Self {
            transport: None,
            from: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn send(&self, to: &str, content: &EmailContent) -> Result<()> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            return Err(anyhow!("email notifications disabled"));
        };

        let email = Message::builder()
            .from(from.clone())
            .to(to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(content.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(content.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        transport
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        tracing::info!("Email '{}' sent to {}", content.subject, to);
        Ok(())
    }
}
