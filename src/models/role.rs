use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Normalized role set. The stored `roles.name` column is free text and the
/// historical data carries spelling drift ("Admin", "ADMIN", "ACCOUNTANT");
/// every authorization decision goes through this enum instead of comparing
/// raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Accounting,
    Manager,
    Employee,
}

impl Role {
    pub fn parse(name: &str) -> Option<Role> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            // Both spellings exist in seeded data.
            "ACCOUNTING" | "ACCOUNTANT" => Some(Role::Accounting),
            "MANAGER" => Some(Role::Manager),
            "EMPLOYEE" => Some(Role::Employee),
            _ => None,
        }
    }
}

/// Roles allowed to approve, reject, and review pending expenses.
pub const REVIEWER_ROLES: [Role; 3] = [Role::Admin, Role::Accounting, Role::Manager];

/// Roles allowed to read reports and dashboard aggregates.
pub const REPORTING_ROLES: [Role; 2] = [Role::Admin, Role::Accounting];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("admin "), Some(Role::Admin));
        assert_eq!(Role::parse("manager"), Some(Role::Manager));
    }

    #[test]
    fn parse_folds_accountant_spelling() {
        assert_eq!(Role::parse("ACCOUNTANT"), Some(Role::Accounting));
        assert_eq!(Role::parse("Accounting"), Some(Role::Accounting));
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert_eq!(Role::parse("SUPERUSER"), None);
        assert_eq!(Role::parse(""), None);
    }
}
