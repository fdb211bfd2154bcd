use axum::http::StatusCode;
use serde::Serialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::Database,
    models::{Role, User},
    utils::verify_token,
};

pub const AUTH_COOKIE: &str = "auth_token";

/// Authenticated identity resolved from the session cookie, with the user's
/// normalized role set. Every protected route derives one of these before
/// touching data.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub roles: Vec<Role>,
}

impl CurrentUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }
}

pub async fn get_current_user(cookies: &Cookies, db: &Database) -> Option<CurrentUser> {
    let token = cookies.get(AUTH_COOKIE)?.value().to_string();
    let claims = verify_token(&token).ok()?;
    let user_id = Uuid::parse_str(&claims.sub).ok()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND enabled = true")
        .bind(user_id)
        .fetch_optional(db)
        .await
        .ok()??;

    let roles = load_roles(db, user.id).await;

    Some(CurrentUser {
        id: user.id,
        name: user.name,
        email: user.email,
        roles,
    })
}

async fn load_roles(db: &Database, user_id: Uuid) -> Vec<Role> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT r.name
        FROM roles r
        JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .unwrap_or_default();

    names.iter().filter_map(|n| Role::parse(n)).collect()
}

/// No session -> 401. Session without one of the required roles -> 403.
pub async fn require_any_role(
    cookies: &Cookies,
    db: &Database,
    roles: &[Role],
) -> Result<CurrentUser, StatusCode> {
    let user = get_current_user(cookies, db)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !user.has_any_role(roles) {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(user)
}

pub async fn require_admin(cookies: &Cookies, db: &Database) -> Result<CurrentUser, StatusCode> {
    require_any_role(cookies, db, &[Role::Admin]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(roles: Vec<Role>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            roles,
        }
    }

    #[test]
    fn role_membership_checks() {
        let reviewer = user_with(vec![Role::Manager]);
        assert!(reviewer.has_role(Role::Manager));
        assert!(!reviewer.has_role(Role::Admin));
        assert!(reviewer.has_any_role(&crate::models::REVIEWER_ROLES));
        assert!(!reviewer.has_any_role(&crate::models::REPORTING_ROLES));
    }

    #[test]
    fn employee_is_not_a_reviewer() {
        let employee = user_with(vec![Role::Employee]);
        assert!(!employee.has_any_role(&crate::models::REVIEWER_ROLES));
        assert!(!employee.has_any_role(&[Role::Admin]));
    }

    #[test]
    fn empty_role_set_matches_nothing() {
        let nobody = user_with(vec![]);
        assert!(!nobody.has_any_role(&crate::models::REVIEWER_ROLES));
        assert!(!nobody.has_role(Role::Employee));
    }
}
