//! Built-in roles.
//!
//! A fresh installation gets one role per permission plus three groups.
//! Groups are roles too; an edge from a group to a role grants the role to
//! every holder of the group.

use std::collections::HashMap;

use tracing::info;

use crate::application::core::Core;
use crate::cache::{Database, Store, StoreError};
use crate::domain::entities::{Role, RoleEdge};

pub const GUEST_GROUP: &str = "guest_group";
pub const USER_GROUP: &str = "user_group";
pub const ADMIN_GROUP: &str = "admin_group";

pub const LOGIN_ROLE: &str = "login";
pub const LOGOUT_ROLE: &str = "logout";
pub const REGISTER_ROLE: &str = "register";
pub const STATUS_ROLE: &str = "status";
pub const OBSERVE_USER_ROLE: &str = "observe_user";
pub const OBSERVE_QUIZZES_ROLE: &str = "observe_quizzes";
pub const OBSERVE_PROBLEMS_ROLE: &str = "observe_problems";

pub const BUILTIN_ROLES: &[&str] = &[
    LOGIN_ROLE,
    LOGOUT_ROLE,
    REGISTER_ROLE,
    STATUS_ROLE,
    "observe_settings",
    "create_setting",
    "update_setting",
    "delete_setting",
    "observe_roles",
    "create_role",
    "delete_role",
    "observe_role_roles",
    "create_role_role",
    "delete_role_role",
    "observe_user_roles",
    "create_user_role",
    "delete_user_role",
    OBSERVE_USER_ROLE,
    "update_user",
    "observe_user_email",
    "observe_user_first_name",
    "observe_user_last_name",
    "observe_user_middle_name",
    "observe_user_sessions",
    "update_user_password",
    "update_user_email",
    "update_user_first_name",
    "update_user_last_name",
    "update_user_middle_name",
    "observe_session",
    "delete_session",
    OBSERVE_QUIZZES_ROLE,
    "observe_quiz",
    "create_quiz",
    "update_quiz",
    "delete_quiz",
    "observe_pools",
    "observe_pool",
    "create_pool",
    "update_pool",
    "delete_pool",
    OBSERVE_PROBLEMS_ROLE,
    "observe_problem",
    "create_problem",
    "update_problem",
    "delete_problem",
];

pub const BUILTIN_GROUPS: &[&str] = &[GUEST_GROUP, USER_GROUP, ADMIN_GROUP];

const GUEST_ROLES: &[&str] = &[
    LOGIN_ROLE,
    REGISTER_ROLE,
    STATUS_ROLE,
    OBSERVE_USER_ROLE,
    OBSERVE_QUIZZES_ROLE,
    OBSERVE_PROBLEMS_ROLE,
];

const USER_ROLES: &[&str] = &[
    LOGIN_ROLE,
    LOGOUT_ROLE,
    STATUS_ROLE,
    OBSERVE_USER_ROLE,
    OBSERVE_QUIZZES_ROLE,
    OBSERVE_PROBLEMS_ROLE,
];

/// Outcome of [`seed_builtin_roles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created { roles: usize, edges: usize },
    AlreadySeeded,
}

/// Creates the built-in roles, groups and group edges in one transaction.
/// Does nothing when the role table already has rows.
pub async fn seed_builtin_roles<D: Database>(core: &Core<D>) -> Result<SeedOutcome, StoreError> {
    core.roles.init().await?;
    if !core.roles.is_empty() {
        info!(roles = core.roles.len(), "Built-in roles already present");
        return Ok(SeedOutcome::AlreadySeeded);
    }

    let roles = core.roles.clone();
    let edges = core.role_edges.clone();
    let outcome = core
        .wrap_tx(|tx| {
            Box::pin(async move {
                let mut ids = HashMap::new();
                for name in BUILTIN_ROLES.iter().chain(BUILTIN_GROUPS) {
                    let role = roles
                        .create_in(
                            tx,
                            Role {
                                id: 0,
                                name: (*name).to_string(),
                            },
                        )
                        .await?;
                    ids.insert(*name, role.id);
                }

                let grants = GUEST_ROLES
                    .iter()
                    .map(|role| (GUEST_GROUP, *role))
                    .chain(USER_ROLES.iter().map(|role| (USER_GROUP, *role)))
                    .chain(BUILTIN_ROLES.iter().map(|role| (ADMIN_GROUP, *role)));
                let mut edge_count = 0;
                for (group, role) in grants {
                    let (Some(&role_id), Some(&child_id)) = (ids.get(group), ids.get(role)) else {
                        continue;
                    };
                    edges
                        .create_in(
                            tx,
                            RoleEdge {
                                id: 0,
                                role_id,
                                child_id,
                            },
                        )
                        .await?;
                    edge_count += 1;
                }

                Ok(SeedOutcome::Created {
                    roles: ids.len(),
                    edges: edge_count,
                })
            })
        })
        .await?;

    if let SeedOutcome::Created { roles, edges } = outcome {
        info!(roles, edges, "Seeded built-in roles");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn role_names_are_unique() {
        let names: HashSet<&str> = BUILTIN_ROLES.iter().chain(BUILTIN_GROUPS).copied().collect();
        assert_eq!(names.len(), BUILTIN_ROLES.len() + BUILTIN_GROUPS.len());
    }

    #[test]
    fn group_members_are_builtin_roles() {
        for role in GUEST_ROLES.iter().chain(USER_ROLES) {
            assert!(BUILTIN_ROLES.contains(role), "{role} is not a built-in role");
        }
    }
}
