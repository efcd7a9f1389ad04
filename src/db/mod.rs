pub mod seed;

use crate::domain::models::{
    ModeratorProfile, Ticket, TicketPriority, TicketSkill, TicketStatus, User, UserRole, UserSkill,
};
use anyhow::Result;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, hash, role, first_name, last_name, is_active, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, title, description, status, priority, created_by, assigned_to, \
     ai_summary, ai_notes, related_skills, created_at, updated_at";

pub struct NewUser<'a> {
    pub email: &'a str,
    pub hash: &'a str,
    pub role: UserRole,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

pub struct NewTicket<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub priority: TicketPriority,
    pub created_by: Uuid,
}

/// Partial ticket update. `None` leaves the column as is; `assigned_to:
/// Some(None)` clears the assignee.
#[derive(Debug, Default)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Option<Uuid>>,
}

impl TicketChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.assigned_to.is_none()
    }
}

#[derive(Debug, Default)]
pub struct TicketFilter {
    /// Restricts the listing to one creator (plain users only see their own).
    pub created_by: Option<Uuid>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
}

/// Output of the triage step as persisted on the ticket.
#[derive(Debug, Clone)]
pub struct TicketAnalysisUpdate {
    pub summary: String,
    pub notes: String,
    pub priority: TicketPriority,
    pub related_skills: Vec<String>,
}

// ============================================
// Users
// ============================================

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn insert_user(pool: &PgPool, new: NewUser<'_>) -> Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, email, hash, role, first_name, last_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.email.trim().to_lowercase())
    .bind(new.hash)
    .bind(new.role)
    .bind(new.first_name)
    .bind(new.last_name)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn set_user_role(pool: &PgPool, id: Uuid, role: UserRole) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(role)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn list_users(pool: &PgPool, limit: i64, offset: i64) -> Result<(Vec<User>, i64)> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok((users, total))
}

pub async fn get_user_skills(pool: &PgPool, user_id: Uuid) -> Result<Vec<UserSkill>> {
    let skills = sqlx::query_as::<_, UserSkill>(
        r#"
        SELECT skill_name, proficiency
        FROM user_skills
        WHERE user_id = $1
        ORDER BY created_at, skill_name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(skills)
}

/// Replaces the whole skill set of a user in one transaction.
pub async fn replace_user_skills(pool: &PgPool, user_id: Uuid, skills: &[UserSkill]) -> Result<Vec<UserSkill>> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_skills WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    for skill in skills {
        sqlx::query(
            r#"
            INSERT INTO user_skills (id, user_id, skill_name, proficiency)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(skill.skill_name.trim())
        .bind(skill.proficiency)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    get_user_skills(pool, user_id).await
}

#[derive(FromRow)]
struct SkillRow {
    user_id: Uuid,
    skill_name: String,
    proficiency: i16,
}

/// Active moderators with their declared skills, oldest account first.
pub async fn get_active_moderators(pool: &PgPool) -> Result<Vec<ModeratorProfile>> {
    let users = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE role = 'moderator'
          AND is_active = true
        ORDER BY created_at, id
        "#
    ))
    .fetch_all(pool)
    .await?;

    if users.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let rows = sqlx::query_as::<_, SkillRow>(
        r#"
        SELECT user_id, skill_name, proficiency
        FROM user_skills
        WHERE user_id = ANY($1)
        ORDER BY created_at, skill_name
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_user: HashMap<Uuid, Vec<UserSkill>> = HashMap::new();
    for row in rows {
        by_user.entry(row.user_id).or_default().push(UserSkill {
            skill_name: row.skill_name,
            proficiency: row.proficiency,
        });
    }

    Ok(users
        .into_iter()
        .map(|user| {
            let skills = by_user.remove(&user.id).unwrap_or_default();
            ModeratorProfile { user, skills }
        })
        .collect())
}

pub async fn find_active_admin(pool: &PgPool) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE role = 'admin'
          AND is_active = true
        ORDER BY created_at, id
        LIMIT 1
        "#
    ))
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

// ============================================
// Tickets
// ============================================

pub async fn insert_ticket(pool: &PgPool, new: NewTicket<'_>) -> Result<Ticket> {
    let ticket = sqlx::query_as::<_, Ticket>(&format!(
        r#"
        INSERT INTO tickets (id, title, description, status, priority, created_by)
        VALUES ($1, $2, $3, 'todo', $4, $5)
        RETURNING {TICKET_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.title)
    .bind(new.description)
    .bind(new.priority)
    .bind(new.created_by)
    .fetch_one(pool)
    .await?;
    Ok(ticket)
}

pub async fn find_ticket_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Ticket>> {
    let ticket = sqlx::query_as::<_, Ticket>(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(ticket)
}

/// Makes `%`, `_` and `\` match literally inside an `ILIKE ... ESCAPE '\'` pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_ticket_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TicketFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(created_by) = filter.created_by {
        qb.push(" AND created_by = ").push_bind(created_by);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(assigned_to) = filter.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(assigned_to);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR description ILIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\')");
    }
}

pub async fn list_tickets(
    pool: &PgPool,
    filter: &TicketFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Ticket>, i64)> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {TICKET_COLUMNS} FROM tickets"));
    push_ticket_filter(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let tickets = qb.build_query_as::<Ticket>().fetch_all(pool).await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tickets");
    push_ticket_filter(&mut count, filter);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    Ok((tickets, total))
}

pub async fn update_ticket(pool: &PgPool, id: Uuid, changes: &TicketChanges) -> Result<Option<Ticket>> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE tickets SET updated_at = NOW()");
    if let Some(title) = &changes.title {
        qb.push(", title = ").push_bind(title.clone());
    }
    if let Some(description) = &changes.description {
        qb.push(", description = ").push_bind(description.clone());
    }
    if let Some(status) = changes.status {
        qb.push(", status = ").push_bind(status);
    }
    if let Some(priority) = changes.priority {
        qb.push(", priority = ").push_bind(priority);
    }
    if let Some(assigned_to) = changes.assigned_to {
        qb.push(", assigned_to = ").push_bind(assigned_to);
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(format!(" RETURNING {TICKET_COLUMNS}"));

    let ticket = qb.build_query_as::<Ticket>().fetch_optional(pool).await?;
    Ok(ticket)
}

pub async fn delete_ticket(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_ticket_status(pool: &PgPool, id: Uuid, status: TicketStatus) -> Result<()> {
    sqlx::query("UPDATE tickets SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

/// Writes the triage result, records the required skills and moves the
/// ticket to `in_progress`.
pub async fn save_ticket_analysis(pool: &PgPool, id: Uuid, analysis: &TicketAnalysisUpdate) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE tickets
        SET ai_summary = $2,
            ai_notes = $3,
            priority = $4,
            related_skills = $5,
            status = 'in_progress',
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&analysis.summary)
    .bind(&analysis.notes)
    .bind(analysis.priority)
    .bind(&analysis.related_skills)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM ticket_skills WHERE ticket_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for skill in &analysis.related_skills {
        sqlx::query(
            r#"
            INSERT INTO ticket_skills (id, ticket_id, skill_name, importance)
            VALUES ($1, $2, $3, 3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(skill)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_ticket_skills(pool: &PgPool, ticket_id: Uuid) -> Result<Vec<TicketSkill>> {
    let skills = sqlx::query_as::<_, TicketSkill>(
        "SELECT skill_name, importance FROM ticket_skills WHERE ticket_id = $1 ORDER BY created_at, skill_name",
    )
    .bind(ticket_id)
    .fetch_all(pool)
    .await?;
    Ok(skills)
}

pub async fn assign_ticket(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE tickets SET assigned_to = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}
