//! Roles and user categories
//!
//! `Role` is the authorization field and is only written by an admin.
//! `UserType` is the category chosen at sign-up and shown in listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authorization role carried on every profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Entrepreneur,
    Investor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Entrepreneur => "entrepreneur",
            Role::Investor => "investor",
            Role::Admin => "admin",
        }
    }

    /// Category that matches this role, if any. Admins keep their sign-up category.
    pub fn user_type(&self) -> Option<UserType> {
        match self {
            Role::Entrepreneur => Some(UserType::Entrepreneur),
            Role::Investor => Some(UserType::Investor),
            Role::Admin => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entrepreneur" => Ok(Role::Entrepreneur),
            "investor" => Ok(Role::Investor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Category selected at sign-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Entrepreneur,
    Investor,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Entrepreneur => "entrepreneur",
            UserType::Investor => "investor",
        }
    }

    /// Role granted to a freshly signed-up user of this category
    pub fn initial_role(&self) -> Role {
        match self {
            UserType::Entrepreneur => Role::Entrepreneur,
            UserType::Investor => Role::Investor,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a role against an allow-list. An empty list allows nobody.
pub fn is_role_allowed(role: Role, allowed: &[Role]) -> bool {
    allowed.contains(&role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [Role::Entrepreneur, Role::Investor, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_initial_role_matches_user_type() {
        assert_eq!(UserType::Investor.initial_role(), Role::Investor);
        assert_eq!(UserType::Entrepreneur.initial_role(), Role::Entrepreneur);
        assert_eq!(Role::Admin.user_type(), None);
    }

    #[test]
    fn test_role_allow_list() {
        assert!(is_role_allowed(Role::Admin, &[Role::Admin]));
        assert!(!is_role_allowed(Role::Investor, &[Role::Admin]));
        assert!(!is_role_allowed(Role::Investor, &[]));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let t: UserType = serde_json::from_str("\"investor\"").unwrap();
        assert_eq!(t, UserType::Investor);
    }
}
