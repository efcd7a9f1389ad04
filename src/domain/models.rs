use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Moderators and admins see and triage every ticket.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Todo,
    InProgress,
    WaitingForCustomer,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::WaitingForCustomer => "waiting_for_customer",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "ticket_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Priority as the triage model may set it. Only low/medium/high are
    /// accepted; anything else lands on medium.
    pub fn from_triage(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub hash: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let trimmed = full.trim();
        if trimmed.is_empty() {
            self.email.clone()
        } else {
            trimmed.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSkill {
    pub skill_name: String,
    pub proficiency: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub ai_summary: Option<String>,
    pub ai_notes: Option<String>,
    pub related_skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TicketSkill {
    pub skill_name: String,
    pub importance: i16,
}

/// Candidate for assignment: an active moderator and the skills they declared.
#[derive(Debug, Clone)]
pub struct ModeratorProfile {
    pub user: User,
    pub skills: Vec<UserSkill>,
}

impl ModeratorProfile {
    pub fn skill_names(&self) -> Vec<String> {
        self.skills.iter().map(|s| s.skill_name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triage_priority_coercion() {
        assert_eq!(TicketPriority::from_triage("HIGH"), TicketPriority::High);
        assert_eq!(TicketPriority::from_triage(" low "), TicketPriority::Low);
        assert_eq!(TicketPriority::from_triage("urgent"), TicketPriority::Medium);
        assert_eq!(TicketPriority::from_triage("critical"), TicketPriority::Medium);
        assert_eq!(TicketPriority::from_triage(""), TicketPriority::Medium);
    }

    #[test]
    fn test_role_round_trip_and_staff() {
        assert_eq!(UserRole::parse("moderator"), Some(UserRole::Moderator));
        assert_eq!(UserRole::parse("ADMIN"), None);
        assert!(UserRole::Admin.is_staff());
        assert!(!UserRole::User.is_staff());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TicketStatus::WaitingForCustomer).unwrap();
        assert_eq!(json, "\"waiting_for_customer\"");
        assert_eq!(TicketStatus::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn test_moderator_skill_names_keep_order() {
        let profile = ModeratorProfile {
            user: User {
                id: Uuid::new_v4(),
                email: "mod@example.com".to_string(),
                hash: String::new(),
                role: UserRole::Moderator,
                first_name: "Mo".to_string(),
                last_name: "Derator".to_string(),
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            skills: vec![
                UserSkill { skill_name: "React".to_string(), proficiency: 4 },
                UserSkill { skill_name: "Node.js".to_string(), proficiency: 2 },
            ],
        };
        assert_eq!(profile.skill_names(), vec!["React", "Node.js"]);
    }
}
