//! Who is acting: marketplace roles and the authenticated actor.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::UserId;

/// Marketplace role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seller,
    Supplier,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Admin and super-admin share every admin gate.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Seller => "seller",
            Role::Supplier => "supplier",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "seller" => Ok(Role::Seller),
            "supplier" => Ok(Role::Supplier),
            "admin" => Ok(Role::Admin),
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// The authenticated user issuing a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self, action: &str) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::not_authorized(format!("only admins may {action}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_counts_as_admin() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(!Role::Seller.is_admin());
        assert!(!Role::Supplier.is_admin());
    }

    #[test]
    fn role_round_trips_through_its_wire_name() {
        for role in [Role::Seller, Role::Supplier, Role::Admin, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json, serde_json::json!(role.as_str()));
        }
    }

    #[test]
    fn require_admin_names_the_action() {
        let seller = Actor::new(UserId::new(), Role::Seller);
        match seller.require_admin("approve orders") {
            Err(DomainError::NotAuthorized(msg)) => assert!(msg.contains("approve orders")),
            other => panic!("Expected NotAuthorized, got {other:?}"),
        }
    }
}
