use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings of the form `"area.action"`. The wildcard
/// `"*"` is granted by policy to admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const PRODUCTS_READ: Permission = Permission::from_static("products.read");
    pub const PRODUCTS_MANAGE: Permission = Permission::from_static("products.manage");

    pub const ORDERS_READ: Permission = Permission::from_static("orders.read");
    pub const ORDERS_PLACE: Permission = Permission::from_static("orders.place");
    pub const ORDERS_UPDATE_STATUS: Permission = Permission::from_static("orders.update_status");
    pub const ORDERS_REVIEW: Permission = Permission::from_static("orders.review");

    pub const PAYOUTS_READ: Permission = Permission::from_static("payouts.read");
    pub const PAYOUTS_MANAGE: Permission = Permission::from_static("payouts.manage");

    pub const WALLET_USE: Permission = Permission::from_static("wallet.use");
    pub const WALLET_SETTLE: Permission = Permission::from_static("wallet.settle");

    pub const USERS_MANAGE: Permission = Permission::from_static("users.manage");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
