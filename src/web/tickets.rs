use crate::db::{self, NewTicket, TicketChanges, TicketFilter};
use crate::domain::models::{Ticket, TicketPriority, TicketSkill, TicketStatus, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::messages::{self, interpolate_message};
use crate::state::SharedState;
use crate::web::extract::{check_length, AppJson, AppPath, AppQuery};
use crate::web::response::{ApiResponse, Page};
use crate::web::session::UserSession;
use crate::web::normalize_page;
use crate::workflow::{Delivery, WorkflowEvent};
use axum::{
    extract::State,
    routing::get,
    Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

const TITLE_MIN: usize = 5;
const TITLE_MAX: usize = 200;
const DESCRIPTION_MIN: usize = 10;
const DESCRIPTION_MAX: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct CreateTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
}

/// Absent → `None`, `null` → `Some(None)`.
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicket {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub skills: Vec<TicketSkill>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_tickets).post(create_ticket))
        .route("/:id", get(get_ticket).patch(update_ticket).delete(delete_ticket))
        .with_state(state)
}

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(interpolate_message(messages::TICKET_NOT_FOUND, &[("id", &id.to_string())]))
}

fn can_view(session: &UserSession, ticket: &Ticket) -> bool {
    session.role.is_staff() || ticket.created_by == session.user_id || ticket.assigned_to == Some(session.user_id)
}

pub fn validate_create(payload: &CreateTicket) -> Result<(), ApiError> {
    check_length("title", &payload.title, TITLE_MIN, TITLE_MAX)?;
    check_length("description", &payload.description, DESCRIPTION_MIN, DESCRIPTION_MAX)?;
    Ok(())
}

/// Validates the patch and checks the caller may touch every field in it.
/// Creators edit wording; triage fields are for moderators and admins.
pub fn authorize_update(session: &UserSession, ticket: &Ticket, payload: &UpdateTicket) -> Result<(), ApiError> {
    if let Some(title) = &payload.title {
        check_length("title", title, TITLE_MIN, TITLE_MAX)?;
    }
    if let Some(description) = &payload.description {
        check_length("description", description, DESCRIPTION_MIN, DESCRIPTION_MAX)?;
    }

    if session.role.is_staff() {
        return Ok(());
    }
    if ticket.created_by != session.user_id {
        return Err(ApiError::forbidden());
    }
    if payload.status.is_some() || payload.priority.is_some() || payload.assigned_to.is_some() {
        return Err(ApiError::Forbidden(
            "Only moderators and admins can change status, priority or assignee".to_string(),
        ));
    }
    Ok(())
}

async fn create_ticket(
    session: UserSession,
    State(state): State<SharedState>,
    AppJson(payload): AppJson<CreateTicket>,
) -> ApiResult<ApiResponse<Ticket>> {
    validate_create(&payload)?;

    // creator always comes from the session, never from the body
    let ticket = db::insert_ticket(
        &state.pool,
        NewTicket {
            title: payload.title.trim(),
            description: payload.description.trim(),
            priority: payload.priority.unwrap_or_default(),
            created_by: session.user_id,
        },
    )
    .await?;
    tracing::info!("Ticket {} created by {}", ticket.id, session.user_id);

    match state.workflow.send(WorkflowEvent::ticket_created(ticket.id)).await {
        Ok(Delivery::Queued) => tracing::debug!("ticket/created queued for {}", ticket.id),
        Ok(Delivery::Duplicate) => tracing::warn!("ticket/created for {} was already queued", ticket.id),
        Err(e) => tracing::error!("Failed to queue workflow for ticket {}: {}", ticket.id, e),
    }

    let message = interpolate_message(messages::TICKET_CREATED, &[("id", &ticket.id.to_string())]);
    Ok(ApiResponse::created(message, ticket))
}

async fn list_tickets(
    session: UserSession,
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<TicketQuery>,
) -> ApiResult<ApiResponse<Page<Ticket>>> {
    let (page, limit) = normalize_page(query.page, query.limit);
    let filter = TicketFilter {
        created_by: (!session.role.is_staff()).then_some(session.user_id),
        status: query.status,
        priority: query.priority,
        assigned_to: query.assigned_to,
        search: query.search,
    };

    let (tickets, total) = db::list_tickets(&state.pool, &filter, limit, (page - 1) * limit).await?;
    Ok(ApiResponse::ok(messages::TICKETS_OK, Page::new(tickets, total, page, limit)))
}

async fn get_ticket(
    session: UserSession,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<TicketDetail>> {
    let ticket = db::find_ticket_by_id(&state.pool, id).await?.ok_or_else(|| not_found(id))?;
    if !can_view(&session, &ticket) {
        return Err(ApiError::forbidden());
    }
    let skills = db::get_ticket_skills(&state.pool, id).await?;
    let message = interpolate_message(messages::TICKET_OK, &[("id", &id.to_string())]);
    Ok(ApiResponse::ok(message, TicketDetail { ticket, skills }))
}

async fn update_ticket(
    session: UserSession,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateTicket>,
) -> ApiResult<ApiResponse<Ticket>> {
    let ticket = db::find_ticket_by_id(&state.pool, id).await?.ok_or_else(|| not_found(id))?;
    authorize_update(&session, &ticket, &payload)?;

    if let Some(Some(assignee_id)) = payload.assigned_to {
        let assignee = db::find_user_by_id(&state.pool, assignee_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::BadRequest(format!("User {} cannot be assigned", assignee_id)))?;
        if assignee.role == UserRole::User {
            return Err(ApiError::BadRequest("Tickets can only be assigned to moderators or admins".to_string()));
        }
    }

    let changes = TicketChanges {
        title: payload.title.map(|t| t.trim().to_string()),
        description: payload.description.map(|d| d.trim().to_string()),
        status: payload.status,
        priority: payload.priority,
        assigned_to: payload.assigned_to,
    };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let updated = db::update_ticket(&state.pool, id, &changes)
        .await?
        .ok_or_else(|| not_found(id))?;
    tracing::info!("Ticket {} updated by {}", id, session.user_id);
    let message = interpolate_message(messages::TICKET_UPDATED, &[("id", &id.to_string())]);
    Ok(ApiResponse::ok(message, updated))
}

async fn delete_ticket(
    session: UserSession,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let ticket = db::find_ticket_by_id(&state.pool, id).await?.ok_or_else(|| not_found(id))?;
    if ticket.created_by != session.user_id && session.role != UserRole::Admin {
        return Err(ApiError::forbidden());
    }

    if !db::delete_ticket(&state.pool, id).await? {
        return Err(not_found(id));
    }
    tracing::info!("Ticket {} deleted by {}", id, session.user_id);
    Ok(ApiResponse::message(interpolate_message(messages::TICKET_DELETED, &[("id", &id.to_string())])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::web::routes;
    use crate::web::session::sign_session;
    use crate::web::tests::{body_json, state_from, test_config};
    use crate::workflow::ticket_created::tests::ticket;
    use crate::workflow::PgTicketStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::PgPool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn session(role: UserRole) -> UserSession {
        UserSession {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_create_validation() {
        let ok = CreateTicket {
            title: "Cannot login".to_string(),
            description: "Login button does nothing".to_string(),
            priority: None,
        };
        assert!(validate_create(&ok).is_ok());

        let short_title = CreateTicket {
            title: "Help".to_string(),
            ..ok
        };
        assert!(validate_create(&short_title).is_err());

        let short_description = CreateTicket {
            title: "Cannot login".to_string(),
            description: "broken".to_string(),
            priority: Some(TicketPriority::High),
        };
        assert!(validate_create(&short_description).is_err());
    }

    #[test]
    fn test_create_payload_rejects_unknown_priority() {
        let parsed: Result<CreateTicket, _> =
            serde_json::from_str(r#"{"title":"Cannot login","description":"It just spins","priority":"critical"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_update_payload_assignee_states() {
        let absent: UpdateTicket = serde_json::from_str(r#"{"title":"New title"}"#).unwrap();
        assert_eq!(absent.assigned_to, None);

        let cleared: UpdateTicket = serde_json::from_str(r#"{"assignedTo":null}"#).unwrap();
        assert_eq!(cleared.assigned_to, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateTicket = serde_json::from_str(&format!(r#"{{"assignedTo":"{}"}}"#, id)).unwrap();
        assert_eq!(set.assigned_to, Some(Some(id)));
    }

    #[test]
    fn test_creator_may_edit_wording_only() {
        let creator = session(UserRole::User);
        let t = ticket(creator.user_id);

        let wording = UpdateTicket {
            title: Some("Cannot login anymore".to_string()),
            ..Default::default()
        };
        assert!(authorize_update(&creator, &t, &wording).is_ok());

        let status = UpdateTicket {
            status: Some(TicketStatus::Resolved),
            ..Default::default()
        };
        assert!(matches!(authorize_update(&creator, &t, &status), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn test_other_users_cannot_edit_but_staff_can() {
        let t = ticket(Uuid::new_v4());
        let status = UpdateTicket {
            status: Some(TicketStatus::WaitingForCustomer),
            ..Default::default()
        };
        assert!(authorize_update(&session(UserRole::User), &t, &status).is_err());
        assert!(authorize_update(&session(UserRole::Moderator), &t, &status).is_ok());

        let bad_title = UpdateTicket {
            title: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            authorize_update(&session(UserRole::Admin), &t, &bad_title),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_visibility() {
        let owner = session(UserRole::User);
        let mut t = ticket(owner.user_id);
        assert!(can_view(&owner, &t));
        assert!(!can_view(&session(UserRole::User), &t));
        assert!(can_view(&session(UserRole::Moderator), &t));

        let assignee = session(UserRole::User);
        t.assigned_to = Some(assignee.user_id);
        assert!(can_view(&assignee, &t));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_create_ticket_stores_creator_and_runs_workflow(pool: PgPool) {
        let creator = db::insert_user(
            &pool,
            NewUser {
                email: "uma@example.com",
                hash: "unused",
                role: UserRole::User,
                first_name: "Uma",
                last_name: "User",
            },
        )
        .await
        .unwrap();

        let config = test_config(None);
        let token = sign_session(creator.id, creator.role, &config.session_key).unwrap();
        let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
        let state = state_from(config, pool.clone(), Arc::new(PgTicketStore::new(pool.clone())), Some(outcome_tx));

        // a spoofed creator in the body is ignored
        let body = format!(
            r#"{{"title":"Cannot login","description":"The login form hangs after submit","createdBy":"{}"}}"#,
            Uuid::new_v4()
        );
        let resp = routes(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tickets")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["status"], "todo");
        let id: Uuid = json["data"]["id"].as_str().unwrap().parse().unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.ticket_id, id);
        assert!(!outcome.ai_processed);
        assert_eq!(outcome.assigned_to, None);

        let stored = db::find_ticket_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(stored.created_by, creator.id);
        assert_eq!(stored.status, TicketStatus::Todo);
        assert_eq!(stored.title, "Cannot login");
        assert!(stored.related_skills.is_empty());
    }
}
