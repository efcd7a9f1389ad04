use crate::db;
use crate::domain::models::{User, UserRole, UserSkill};
use crate::error::{ApiError, ApiResult};
use crate::messages::{self, interpolate_message};
use crate::state::SharedState;
use crate::web::extract::{check_length, AppJson, AppPath, AppQuery};
use crate::web::response::{ApiResponse, Page};
use crate::web::session::UserSession;
use crate::web::PageQuery;
use axum::{
    extract::State,
    routing::{get, patch},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_SKILLS: usize = 50;

#[derive(Deserialize)]
pub struct RoleUpdate {
    pub role: UserRole,
}

#[derive(Deserialize)]
pub struct SkillsUpdate {
    pub skills: Vec<UserSkill>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub skills: Vec<UserSkill>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/all", get(all_users))
        .route("/moderator", get(moderators))
        .route("/:id/role", patch(update_role))
        .route("/:id/skills", get(get_skills).put(replace_skills))
        .with_state(state)
}

async fn me(session: UserSession, State(state): State<SharedState>) -> ApiResult<ApiResponse<Profile>> {
    let user = db::find_user_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    let skills = db::get_user_skills(&state.pool, user.id).await?;
    Ok(ApiResponse::ok(messages::PROFILE_OK, Profile { user, skills }))
}

async fn all_users(
    session: UserSession,
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> ApiResult<ApiResponse<Page<User>>> {
    session.require_admin()?;
    let (page, limit) = query.normalized();
    let (users, total) = db::list_users(&state.pool, limit, (page - 1) * limit).await?;
    Ok(ApiResponse::ok(messages::USERS_OK, Page::new(users, total, page, limit)))
}

async fn moderators(session: UserSession, State(state): State<SharedState>) -> ApiResult<ApiResponse<Vec<Profile>>> {
    session.require_staff()?;
    let profiles = db::get_active_moderators(&state.pool)
        .await?
        .into_iter()
        .map(|m| Profile {
            user: m.user,
            skills: m.skills,
        })
        .collect::<Vec<_>>();
    Ok(ApiResponse::ok(messages::MODERATORS_OK, profiles))
}

async fn update_role(
    session: UserSession,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<RoleUpdate>,
) -> ApiResult<ApiResponse<User>> {
    session.require_admin()?;
    if id == session.user_id && payload.role != UserRole::Admin {
        return Err(ApiError::BadRequest("Admins cannot demote themselves".to_string()));
    }

    let id_str = id.to_string();
    let user = db::set_user_role(&state.pool, id, payload.role)
        .await?
        .ok_or_else(|| ApiError::NotFound(interpolate_message(messages::USER_NOT_FOUND, &[("id", &id_str)])))?;

    tracing::info!("User {} changed role of {} to {}", session.user_id, id, payload.role.as_str());
    let message = interpolate_message(messages::ROLE_UPDATED, &[("id", &id_str), ("role", payload.role.as_str())]);
    Ok(ApiResponse::ok(message, user))
}

async fn get_skills(
    _session: UserSession,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Vec<UserSkill>>> {
    let id_str = id.to_string();
    if db::find_user_by_id(&state.pool, id).await?.is_none() {
        return Err(ApiError::NotFound(interpolate_message(messages::USER_NOT_FOUND, &[("id", &id_str)])));
    }
    let skills = db::get_user_skills(&state.pool, id).await?;
    Ok(ApiResponse::ok(interpolate_message(messages::SKILLS_OK, &[("id", &id_str)]), skills))
}

fn validate_skills(skills: &[UserSkill]) -> Result<(), ApiError> {
    if skills.len() > MAX_SKILLS {
        return Err(ApiError::BadRequest(format!("At most {} skills are allowed", MAX_SKILLS)));
    }
    for skill in skills {
        check_length("skillName", &skill.skill_name, 1, 100)?;
        if !(1..=5).contains(&skill.proficiency) {
            return Err(ApiError::BadRequest("proficiency must be between 1 and 5".to_string()));
        }
    }
    Ok(())
}

async fn replace_skills(
    session: UserSession,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<SkillsUpdate>,
) -> ApiResult<ApiResponse<Vec<UserSkill>>> {
    session.require_self_or_admin(id)?;
    validate_skills(&payload.skills)?;

    let id_str = id.to_string();
    if db::find_user_by_id(&state.pool, id).await?.is_none() {
        return Err(ApiError::NotFound(interpolate_message(messages::USER_NOT_FOUND, &[("id", &id_str)])));
    }

    let skills = db::replace_user_skills(&state.pool, id, &payload.skills).await?;
    tracing::info!("Skills of user {} replaced ({} entries)", id, skills.len());
    Ok(ApiResponse::ok(interpolate_message(messages::SKILLS_UPDATED, &[("id", &id_str)]), skills))
}
