//! Role registry: the fixed mapping from role to permission tokens.
//!
//! This module is pure. It is the only place that knows which tokens a role
//! carries. The owner is not enumerated in the table; [`role_grants`] treats
//! it as granting every token, and [`permissions_for`] expands it to the full
//! catalogue only when a caller needs a concrete set.

pub mod role;
pub mod token;

pub use role::{Role, UnknownRole};
pub use token::{tokens, InvalidToken, PermissionToken};

use std::collections::HashSet;
use token::tokens::*;

const VIEWER: &[PermissionToken] = &[WORKSPACE_READ, CANVAS_READ, CARD_READ];

const MEMBER: &[PermissionToken] = &[
    WORKSPACE_READ,
    CANVAS_READ,
    CANVAS_CREATE,
    CANVAS_UPDATE,
    CARD_READ,
    CARD_CREATE,
    CARD_UPDATE,
    CARD_DELETE,
];

const ADMIN: &[PermissionToken] = &[
    WORKSPACE_READ,
    WORKSPACE_UPDATE,
    CANVAS_READ,
    CANVAS_CREATE,
    CANVAS_UPDATE,
    CANVAS_DELETE,
    CARD_READ,
    CARD_CREATE,
    CARD_UPDATE,
    CARD_DELETE,
    MEMBER_INVITE,
    MEMBER_REMOVE,
    MEMBER_UPDATE_ROLE,
];

/// Tokens that only the workspace owner may exercise.
const OWNER_ONLY: &[PermissionToken] = &[WORKSPACE_DELETE, WORKSPACE_TRANSFER_OWNERSHIP];

/// Every token the system knows about.
const CATALOGUE: &[PermissionToken] = &[
    WORKSPACE_READ,
    WORKSPACE_UPDATE,
    WORKSPACE_DELETE,
    WORKSPACE_TRANSFER_OWNERSHIP,
    CANVAS_READ,
    CANVAS_CREATE,
    CANVAS_UPDATE,
    CANVAS_DELETE,
    CARD_READ,
    CARD_CREATE,
    CARD_UPDATE,
    CARD_DELETE,
    MEMBER_INVITE,
    MEMBER_REMOVE,
    MEMBER_UPDATE_ROLE,
];

/// Explicit table for non-owner roles. `None` for the owner.
fn table(role: Role) -> Option<&'static [PermissionToken]> {
    match role {
        Role::Owner => None,
        Role::Admin => Some(ADMIN),
        Role::Member => Some(MEMBER),
        Role::Viewer => Some(VIEWER),
    }
}

/// The full known token universe.
pub fn catalogue() -> &'static [PermissionToken] {
    CATALOGUE
}

/// Whether `token` requires `role == owner` regardless of other grants.
pub fn is_owner_only(token: &PermissionToken) -> bool {
    OWNER_ONLY.contains(token)
}

/// Point check: does `role` carry `token`?
pub fn role_grants(role: Role, token: &PermissionToken) -> bool {
    match table(role) {
        None => true,
        Some(tokens) => tokens.contains(token),
    }
}

/// Enumerate the tokens carried by `role`.
///
/// The owner expands to the whole [`catalogue`]. Prefer [`role_grants`]
/// for decisions.
pub fn permissions_for(role: Role) -> HashSet<PermissionToken> {
    table(role).unwrap_or(CATALOGUE).iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// The thirteen-token catalogue used for containment checks.
    fn base_catalogue() -> Vec<PermissionToken> {
        CATALOGUE
            .iter()
            .filter(|t| !is_owner_only(t))
            .cloned()
            .collect()
    }

    #[test]
    fn test_base_catalogue_size() {
        assert_eq!(base_catalogue().len(), 13);
        assert_eq!(catalogue().len(), 15);
    }

    #[test]
    fn test_role_containment() {
        let viewer = permissions_for(Role::Viewer);
        let member = permissions_for(Role::Member);
        let admin = permissions_for(Role::Admin);

        assert!(viewer.is_subset(&member), "viewer must be within member");
        assert!(member.is_subset(&admin), "member must be within admin");
        for token in base_catalogue() {
            assert!(admin.contains(&token), "admin missing {token}");
        }
    }

    #[test]
    fn test_owner_only_tokens_are_not_in_any_table() {
        for role in [Role::Admin, Role::Member, Role::Viewer] {
            for token in OWNER_ONLY {
                assert!(!role_grants(role, token), "{role} carries {token}");
            }
        }
    }

    #[test]
    fn test_owner_expands_to_catalogue() {
        let owner = permissions_for(Role::Owner);
        assert_eq!(owner.len(), CATALOGUE.len());
        assert!(owner.contains(&WORKSPACE_TRANSFER_OWNERSHIP));
    }

    #[test]
    fn test_tables_only_use_known_tokens() {
        for role in Role::ALL {
            for token in permissions_for(role) {
                assert!(CATALOGUE.contains(&token), "{role} has unknown {token}");
            }
        }
    }

    #[test]
    fn test_viewer_scenario() {
        assert!(role_grants(Role::Viewer, &WORKSPACE_READ));
        assert!(!role_grants(Role::Viewer, &CANVAS_CREATE));
        assert!(role_grants(Role::Member, &CANVAS_CREATE));
        assert!(!role_grants(Role::Member, &MEMBER_INVITE));
        assert!(role_grants(Role::Admin, &MEMBER_INVITE));
        assert!(role_grants(Role::Admin, &WORKSPACE_UPDATE));
    }

    proptest! {
        #[test]
        fn owner_grants_any_well_formed_token(
            resource in "[a-z][a-z_]{0,12}",
            action in "[a-z][a-z_]{0,12}",
        ) {
            let token = PermissionToken::parse(&format!("{resource}:{action}")).unwrap();
            prop_assert!(role_grants(Role::Owner, &token));
        }

        #[test]
        fn non_owner_grants_match_enumeration(
            idx in 0usize..3,
            resource in "[a-z]{1,10}",
            action in "[a-z]{1,10}",
        ) {
            let role = [Role::Admin, Role::Member, Role::Viewer][idx];
            let token = PermissionToken::parse(&format!("{resource}:{action}")).unwrap();
            prop_assert_eq!(role_grants(role, &token), permissions_for(role).contains(&token));
        }
    }
}
