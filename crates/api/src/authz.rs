//! API-side authorization guard.
//!
//! Enforces the role policy at the HTTP boundary, before the settlement
//! service runs. Ownership checks stay in the aggregates.

use tradelane_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::PrincipalContext;

/// Static permission set attached to an endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Requires {
    pub permissions: &'static [Permission],
}

impl CommandAuthorization for Requires {
    fn required_permissions(&self) -> &[Permission] {
        self.permissions
    }
}

pub const READ_PRODUCTS: Requires = Requires { permissions: &[Permission::PRODUCTS_READ] };
pub const MANAGE_PRODUCTS: Requires = Requires { permissions: &[Permission::PRODUCTS_MANAGE] };
pub const READ_ORDERS: Requires = Requires { permissions: &[Permission::ORDERS_READ] };
pub const PLACE_ORDERS: Requires = Requires { permissions: &[Permission::ORDERS_PLACE] };
pub const UPDATE_ORDER_STATUS: Requires = Requires { permissions: &[Permission::ORDERS_UPDATE_STATUS] };
pub const REVIEW_ORDERS: Requires = Requires { permissions: &[Permission::ORDERS_REVIEW] };
pub const READ_PAYOUTS: Requires = Requires { permissions: &[Permission::PAYOUTS_READ] };
pub const MANAGE_PAYOUTS: Requires = Requires { permissions: &[Permission::PAYOUTS_MANAGE] };
pub const USE_WALLET: Requires = Requires { permissions: &[Permission::WALLET_USE] };
pub const SETTLE_WITHDRAWALS: Requires = Requires { permissions: &[Permission::WALLET_SETTLE] };
pub const MANAGE_USERS: Requires = Requires { permissions: &[Permission::USERS_MANAGE] };

/// Check every permission `command` requires against the caller's role.
///
/// Called **before** the settlement service is invoked.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    for perm in command.required_permissions() {
        authorize(principal.principal(), perm)?;
    }
    Ok(())
}
