//! Role-based access control service
//!
//! Validates role payloads against the global permission registry before
//! they reach the [`RoleStore`], and resolves the permissions a role grants.

use crate::{
    permission::{Permission, PermissionManager},
    role::{NewRole, Pagination, Role, RoleFilter, RoleStore, RoleUpdate},
};
use keyward_core::{KeywardError, KeywardResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Permission required by the role management endpoints
pub fn manage_roles_permission() -> Permission {
    Permission::new("admin", "manage-roles", "Manage roles")
}

pub struct RbacService {
    store: Arc<dyn RoleStore>,
    permissions: PermissionManager,
    default_roles: Vec<NewRole>,
}

impl RbacService {
    /// `permissions` is the global registry harvested from the routes
    pub fn new(store: Arc<dyn RoleStore>, permissions: PermissionManager) -> Self {
        Self {
            store,
            permissions,
            default_roles: Vec::new(),
        }
    }

    /// Roles created at startup when missing. Without any, an `admin` role
    /// holding every permission is used.
    pub fn with_default_roles(mut self, roles: Vec<NewRole>) -> Self {
        self.default_roles = roles;
        self
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn store(&self) -> &Arc<dyn RoleStore> {
        &self.store
    }

    pub async fn ensure_default_roles(&self) -> KeywardResult<()> {
        let defaults = if self.default_roles.is_empty() {
            vec![NewRole {
                name: "admin".to_string(),
                pretty_name: "Administrator".to_string(),
                description: "Role with all permissions".to_string(),
                permissions: self.permissions.ids(),
            }]
        } else {
            self.default_roles.clone()
        };

        for role in defaults {
            match self.store.get(&role.name).await {
                Ok(_) => debug!(role = %role.name, "Default role already present"),
                Err(e) if e.is_not_found() => {
                    info!(role = %role.name, "Creating default role");
                    self.store.create(role).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub async fn get_role(&self, name: &str) -> KeywardResult<Role> {
        require_name(name)?;
        self.store.get(name).await
    }

    pub async fn list_roles(
        &self,
        filter: &RoleFilter,
        pagination: Pagination,
    ) -> KeywardResult<(Vec<Role>, usize)> {
        if pagination.limit == 0 {
            return Err(KeywardError::validation(
                "page size must be positive",
                Some("page_size"),
            ));
        }
        self.store.list(filter, pagination).await
    }

    pub async fn add_role(&self, role: NewRole) -> KeywardResult<Role> {
        require_name(&role.name)?;
        self.require_known_permissions(&role.permissions)?;
        self.store.create(role).await
    }

    pub async fn update_role(&self, name: &str, update: RoleUpdate) -> KeywardResult<Role> {
        require_name(name)?;
        self.require_known_permissions(&update.permissions)?;
        self.store.update(name, update).await
    }

    pub async fn remove_role(&self, name: &str) -> KeywardResult<()> {
        require_name(name)?;
        self.store.delete(name).await
    }

    /// Permissions granted by `role_name`, restricted to the global registry
    pub async fn granted_permissions(&self, role_name: &str) -> KeywardResult<PermissionManager> {
        let role = self.get_role(role_name).await?;
        Ok(self.permissions.restrict(&role.permissions))
    }

    fn require_known_permissions(&self, ids: &[i64]) -> KeywardResult<()> {
        if self.permissions.has_all_ids(ids) {
            Ok(())
        } else {
            Err(KeywardError::validation(
                "invalid role permissions",
                Some("permissions"),
            ))
        }
    }
}

fn require_name(name: &str) -> KeywardResult<()> {
    if name.trim().is_empty() {
        return Err(KeywardError::validation("role name is empty", Some("name")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::InMemoryRoleStore;

    fn registry() -> PermissionManager {
        PermissionManager::new([
            manage_roles_permission(),
            Permission::new("docs", "read", "Read documents"),
        ])
    }

    fn service() -> RbacService {
        RbacService::new(Arc::new(InMemoryRoleStore::new()), registry())
    }

    #[tokio::test]
    async fn test_default_admin_role_holds_everything() {
        let rbac = service();
        rbac.ensure_default_roles().await.unwrap();
        // running twice must not fail on the existing role
        rbac.ensure_default_roles().await.unwrap();

        let admin = rbac.get_role("admin").await.unwrap();
        assert_eq!(admin.pretty_name, "Administrator");
        assert_eq!(admin.description, "Role with all permissions");
        assert_eq!(admin.permissions, registry().ids());
    }

    #[tokio::test]
    async fn test_configured_default_roles_replace_admin() {
        let rbac = service().with_default_roles(vec![NewRole {
            name: "reader".to_string(),
            permissions: vec![Permission::new("docs", "read", "").id],
            ..Default::default()
        }]);
        rbac.ensure_default_roles().await.unwrap();

        assert!(rbac.get_role("reader").await.is_ok());
        assert!(rbac.get_role("admin").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_permissions_rejected() {
        let rbac = service();
        let err = rbac
            .add_role(NewRole {
                name: "broken".to_string(),
                permissions: vec![7],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: invalid role permissions");

        rbac.add_role(NewRole {
            name: "editor".to_string(),
            permissions: vec![manage_roles_permission().id],
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(rbac
            .update_role(
                "editor",
                RoleUpdate {
                    permissions: vec![7],
                    ..Default::default()
                }
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_names_rejected() {
        let rbac = service();
        assert!(matches!(
            rbac.get_role("").await,
            Err(KeywardError::Validation { .. })
        ));
        assert!(matches!(
            rbac.remove_role("  ").await,
            Err(KeywardError::Validation { .. })
        ));
        assert!(matches!(
            rbac.add_role(NewRole::default()).await,
            Err(KeywardError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_granted_permissions_drop_stale_ids() {
        let store = Arc::new(InMemoryRoleStore::new());
        store
            .create(NewRole {
                name: "legacy".to_string(),
                permissions: vec![manage_roles_permission().id, 99],
                ..Default::default()
            })
            .await
            .unwrap();

        let rbac = RbacService::new(store, registry());
        let granted = rbac.granted_permissions("legacy").await.unwrap();
        assert_eq!(granted.ids(), vec![manage_roles_permission().id]);
    }
}
