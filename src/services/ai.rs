use crate::domain::models::{Ticket, TicketPriority};
use anyhow::{anyhow, Result};
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use serde::{Deserialize, Serialize};

const TRIAGE_SYSTEM_PROMPT: &str = r#"You are an expert support triage assistant for a ticketing system.
Your job is to read a support ticket and help the team route and resolve it.

Respond with ONLY a single JSON object, no prose, no markdown, using exactly these keys:
- "summary": one or two sentences describing the problem
- "priority": one of "low", "medium", "high"
- "helpfulNotes": detailed technical notes for the person resolving the ticket, including likely causes and useful references
- "relatedSkills": array of technical skills needed to resolve it (e.g. ["React", "PostgreSQL"])"#;

/// Structured triage result extracted from the model's reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketAnalysis {
    pub summary: String,
    pub priority: TicketPriority,
    pub helpful_notes: String,
    pub related_skills: Vec<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AnalysisError {
    #[error("empty model response")]
    Empty,
    #[error("no JSON object in model response")]
    NoJson,
    #[error("malformed analysis JSON: {0}")]
    Malformed(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    priority: Option<serde_json::Value>,
    #[serde(default, alias = "helpful_notes")]
    helpful_notes: Option<String>,
    #[serde(default, alias = "related_skills")]
    related_skills: Option<Vec<serde_json::Value>>,
}

/// Removes a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parses the model's raw reply into a [`TicketAnalysis`].
pub fn parse_analysis(raw: &str) -> Result<TicketAnalysis, AnalysisError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(AnalysisError::Empty);
    }

    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => return Err(AnalysisError::NoJson),
    };

    let parsed: RawAnalysis =
        serde_json::from_str(json).map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    let priority = match parsed.priority {
        Some(serde_json::Value::String(p)) => TicketPriority::from_triage(&p),
        _ => TicketPriority::Medium,
    };

    let mut related_skills: Vec<String> = Vec::new();
    for value in parsed.related_skills.unwrap_or_default() {
        let Some(skill) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        if !related_skills.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
            related_skills.push(skill.to_string());
        }
    }

    Ok(TicketAnalysis {
        summary: parsed.summary.unwrap_or_default().trim().to_string(),
        priority,
        helpful_notes: parsed.helpful_notes.unwrap_or_default().trim().to_string(),
        related_skills,
    })
}

fn ticket_prompt(ticket: &Ticket) -> String {
    format!(
        "Analyze the following support ticket.\n\nTitle: {}\nDescription:\n{}",
        ticket.title, ticket.description
    )
}

#[derive(Clone)]
pub struct AiService {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl AiService {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let client = api_key.map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));
        if client.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, ticket triage disabled");
        }
        Self { client, model }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Raw completion text for a ticket. Errors only on transport/API failure.
    pub async fn complete_triage(&self, ticket: &Ticket) -> Result<String> {
        let client = self.client.as_ref().ok_or_else(|| anyhow!("AI triage disabled"))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .temperature(0.2)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(TRIAGE_SYSTEM_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ticket_prompt(ticket))
                    .build()?
                    .into(),
            ])
            .build()?;

        let resp = client
            .chat()
            .create(request)
            .await
            .map_err(|e| anyhow!("OpenAI error: {e}"))?;

        Ok(resp
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = r#"```json
{
  "summary": "User cannot log in after password reset",
  "priority": "HIGH",
  "helpfulNotes": "Check session cookie domain.",
  "relatedSkills": ["Authentication", "React", "react", " "]
}
```"#;
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.summary, "User cannot log in after password reset");
        assert_eq!(analysis.priority, TicketPriority::High);
        assert_eq!(analysis.helpful_notes, "Check session cookie domain.");
        assert_eq!(analysis.related_skills, vec!["Authentication", "React"]);
    }

    #[test]
    fn test_unknown_priority_becomes_medium() {
        let raw = r#"{"summary":"s","priority":"urgent","helpfulNotes":"n","relatedSkills":[]}"#;
        assert_eq!(parse_analysis(raw).unwrap().priority, TicketPriority::Medium);

        let raw = r#"{"summary":"s","priority":5,"relatedSkills":["Go"]}"#;
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.priority, TicketPriority::Medium);
        assert_eq!(analysis.helpful_notes, "");
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let raw = "Sure! Here is the analysis: {\"summary\":\"x\",\"relatedSkills\":[\"SQL\"]} Hope it helps.";
        assert_eq!(parse_analysis(raw).unwrap().related_skills, vec!["SQL"]);
    }

    #[test]
    fn test_unparsable_replies() {
        assert_eq!(parse_analysis("   "), Err(AnalysisError::Empty));
        assert_eq!(parse_analysis("I cannot help with that"), Err(AnalysisError::NoJson));
        assert!(matches!(parse_analysis("{not json}"), Err(AnalysisError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_disabled_service_errors() {
        let ai = AiService::new(None, "gpt-4o-mini".to_string());
        assert!(!ai.is_enabled());
        let ticket = Ticket {
            id: uuid::Uuid::new_v4(),
            title: "Cannot login".to_string(),
            description: "The login button does nothing".to_string(),
            status: crate::domain::models::TicketStatus::Todo,
            priority: TicketPriority::Medium,
            created_by: uuid::Uuid::new_v4(),
            assigned_to: None,
            ai_summary: None,
            ai_notes: None,
            related_skills: Vec::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(ai.complete_triage(&ticket).await.is_err());
    }
}
