//! Static role→permission policy.
//!
//! Ownership ("your own order", "your own payout") is not a permission; the
//! aggregates check it. This table only decides which endpoints a role may hit.

use tradelane_core::Role;

use crate::Permission;

pub fn permissions_for(role: Role) -> Vec<Permission> {
    match role {
        Role::Admin | Role::SuperAdmin => vec![Permission::WILDCARD],
        Role::Seller => vec![
            Permission::PRODUCTS_READ,
            Permission::ORDERS_READ,
            Permission::ORDERS_PLACE,
            Permission::ORDERS_UPDATE_STATUS,
            Permission::PAYOUTS_READ,
            Permission::WALLET_USE,
        ],
        Role::Supplier => vec![
            Permission::PRODUCTS_READ,
            Permission::PRODUCTS_MANAGE,
            Permission::ORDERS_READ,
            Permission::ORDERS_UPDATE_STATUS,
            Permission::PAYOUTS_READ,
            Permission::WALLET_USE,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_get_the_wildcard() {
        assert_eq!(permissions_for(Role::Admin), vec![Permission::WILDCARD]);
        assert_eq!(permissions_for(Role::SuperAdmin), vec![Permission::WILDCARD]);
    }

    #[test]
    fn only_sellers_place_and_only_suppliers_manage_products() {
        assert!(permissions_for(Role::Seller).contains(&Permission::ORDERS_PLACE));
        assert!(!permissions_for(Role::Supplier).contains(&Permission::ORDERS_PLACE));
        assert!(permissions_for(Role::Supplier).contains(&Permission::PRODUCTS_MANAGE));
        assert!(!permissions_for(Role::Seller).contains(&Permission::PRODUCTS_MANAGE));
    }

    #[test]
    fn nobody_but_admins_reviews_or_settles() {
        for role in [Role::Seller, Role::Supplier] {
            let perms = permissions_for(role);
            assert!(!perms.contains(&Permission::ORDERS_REVIEW));
            assert!(!perms.contains(&Permission::PAYOUTS_MANAGE));
            assert!(!perms.contains(&Permission::WALLET_SETTLE));
            assert!(!perms.contains(&Permission::USERS_MANAGE));
        }
    }
}
