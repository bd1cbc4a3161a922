//! Roles and the role store boundary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_core::{KeywardError, KeywardResult};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicI64, Ordering},
};
use tokio::sync::RwLock;
use tracing::debug;

/// A named set of granted permission ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub pretty_name: String,
    pub description: String,
    pub permissions: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub pretty_name: String,
    #[serde(default)]
    pub description: String,
    pub permissions: Vec<i64>,
}

/// Changes applied to an existing role; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub pretty_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub permissions: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleFilter {
    /// Substring matched against the role name
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// Persistence for roles
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fails with `NotFound` when no role has this name
    async fn get(&self, name: &str) -> KeywardResult<Role>;

    /// Matching roles for the page plus the total number of matches
    async fn list(
        &self,
        filter: &RoleFilter,
        pagination: Pagination,
    ) -> KeywardResult<(Vec<Role>, usize)>;

    async fn create(&self, role: NewRole) -> KeywardResult<Role>;

    async fn update(&self, name: &str, update: RoleUpdate) -> KeywardResult<Role>;

    async fn delete(&self, name: &str) -> KeywardResult<()>;
}

/// Process-local role store
#[derive(Debug)]
pub struct InMemoryRoleStore {
    roles: RwLock<BTreeMap<String, Role>>,
    next_id: AtomicI64,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get(&self, name: &str) -> KeywardResult<Role> {
        self.roles
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| KeywardError::not_found(format!("role '{}'", name)))
    }

    async fn list(
        &self,
        filter: &RoleFilter,
        pagination: Pagination,
    ) -> KeywardResult<(Vec<Role>, usize)> {
        let roles = self.roles.read().await;
        let keyword = filter.keyword.as_deref().filter(|k| !k.is_empty());
        let matching: Vec<&Role> = roles
            .values()
            .filter(|role| keyword.map_or(true, |k| role.name.contains(k)))
            .collect();

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn create(&self, role: NewRole) -> KeywardResult<Role> {
        let mut roles = self.roles.write().await;
        if roles.contains_key(&role.name) {
            return Err(KeywardError::validation(
                format!("role '{}' already exists", role.name),
                Some("name"),
            ));
        }

        let now = Utc::now();
        let created = Role {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: role.name,
            pretty_name: role.pretty_name,
            description: role.description,
            permissions: role.permissions,
            created_at: now,
            updated_at: now,
        };
        debug!(role = %created.name, "Created role");
        roles.insert(created.name.clone(), created.clone());
        Ok(created)
    }

    async fn update(&self, name: &str, update: RoleUpdate) -> KeywardResult<Role> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(name)
            .ok_or_else(|| KeywardError::not_found(format!("role '{}'", name)))?;

        if let Some(pretty_name) = update.pretty_name {
            role.pretty_name = pretty_name;
        }
        if let Some(description) = update.description {
            role.description = description;
        }
        role.permissions = update.permissions;
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete(&self, name: &str) -> KeywardResult<()> {
        self.roles
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| KeywardError::not_found(format!("role '{}'", name)))
    }
}
