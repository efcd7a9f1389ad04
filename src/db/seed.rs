use crate::config::Config;
use crate::db::{self, NewUser};
use crate::domain::models::UserRole;
use crate::web::auth::hash_password;
use anyhow::Result;
use sqlx::PgPool;

/// Creates the bootstrap admin from `ADMIN_EMAIL` / `ADMIN_PASSWORD` when
/// both are set and the account does not exist yet.
pub async fn seed_admin(pool: &PgPool, config: &Config) -> Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    if db::find_user_by_email(pool, email).await?.is_some() {
        tracing::debug!("Bootstrap admin {} already present", email);
        return Ok(());
    }

    let hash = hash_password(password)?;
    let user = db::insert_user(
        pool,
        NewUser {
            email,
            hash: &hash,
            role: UserRole::Admin,
            first_name: "Admin",
            last_name: "",
        },
    )
    .await?;

    tracing::info!("Seeded bootstrap admin {} ({})", user.email, user.id);
    Ok(())
}
