use std::collections::HashSet;

use thiserror::Error;

use tradelane_core::{Actor, Role, UserId};

use crate::{Permission, permissions_for};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve permissions from the static role policy.
    pub fn from_role(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            permissions: permissions_for(role),
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked before dispatch).
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Pure policy check: no IO, no business logic.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %principal.user_id,
            role = %principal.role,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_everything() {
        let admin = Principal::from_role(UserId::new(), Role::Admin);
        assert!(authorize(&admin, &Permission::WALLET_SETTLE).is_ok());
        assert!(authorize(&admin, &Permission::new("anything.at_all")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let seller = Principal::from_role(UserId::new(), Role::Seller);
        assert!(authorize(&seller, &Permission::ORDERS_PLACE).is_ok());
        assert_eq!(
            authorize(&seller, &Permission::ORDERS_REVIEW),
            Err(AuthzError::Forbidden("orders.review".to_string()))
        );
    }

    #[test]
    fn actor_carries_identity_and_role() {
        let user = UserId::new();
        let actor = Principal::from_role(user, Role::Supplier).actor();
        assert_eq!(actor.user_id, user);
        assert_eq!(actor.role, Role::Supplier);
    }
}
