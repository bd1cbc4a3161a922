//! Permissions, endpoints and permission sets
//!
//! Permission and endpoint ids are derived from their content with 32-bit
//! FNV-1, so the same `(group, name)` or `(method, path)` maps to the same id
//! in every process. The id, not the struct, is what roles persist.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1 (multiply, then xor)
pub fn hash32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV_PRIME) ^ u32::from(*byte)
    })
}

/// Id of the pair `(a, b)`: `hash32(a ++ 0x00 ++ b)` widened to `i64`
pub fn content_id(a: &str, b: &str) -> i64 {
    let mut data = Vec::with_capacity(a.len() + b.len() + 1);
    data.extend_from_slice(a.as_bytes());
    data.push(0);
    data.extend_from_slice(b.as_bytes());
    i64::from(hash32(&data))
}

/// A grantable capability, unique by `(group, name)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub group: String,
    pub name: String,
    pub pretty_name: String,
}

impl Permission {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        pretty_name: impl Into<String>,
    ) -> Self {
        let group = group.into();
        let name = name.into();
        Self {
            id: content_id(&group, &name),
            group,
            name,
            pretty_name: pretty_name.into(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

/// Id of the endpoint `(method, path)`
pub fn endpoint_id(method: &str, path: &str) -> i64 {
    content_id(method, path)
}

/// A route template bound to the permission it requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub permission: Permission,
}

impl Endpoint {
    pub fn new(method: impl Into<String>, path: impl Into<String>, permission: Permission) -> Self {
        let method = method.into();
        let path = path.into();
        Self {
            id: endpoint_id(&method, &path),
            method,
            path,
            permission,
        }
    }
}

/// A set of permissions, viewable in registration order or by id.
///
/// Duplicate ids keep their first position while the metadata of the last
/// occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct PermissionManager {
    order: Vec<i64>,
    by_id: HashMap<i64, Permission>,
}

impl PermissionManager {
    pub fn new<I>(permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        let mut manager = Self::default();
        for permission in permissions {
            if manager.by_id.insert(permission.id, permission.clone()).is_none() {
                manager.order.push(permission.id);
            }
        }
        manager
    }

    /// Narrow this manager to `ids`; ids it does not know are dropped.
    pub fn restrict(&self, ids: &[i64]) -> Self {
        Self::new(ids.iter().filter_map(|id| self.by_id.get(id).cloned()))
    }

    pub fn has(&self, permission: &Permission) -> bool {
        self.has_id(permission.id)
    }

    pub fn has_any(&self, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has(p))
    }

    pub fn has_all(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has(p))
    }

    pub fn has_id(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn has_any_ids(&self, ids: &[i64]) -> bool {
        ids.iter().any(|id| self.has_id(*id))
    }

    pub fn has_all_ids(&self, ids: &[i64]) -> bool {
        ids.iter().all(|id| self.has_id(*id))
    }

    pub fn get(&self, id: i64) -> Option<&Permission> {
        self.by_id.get(&id)
    }

    pub fn all(&self) -> Vec<Permission> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.order.clone()
    }

    pub fn as_map(&self) -> &HashMap<i64, Permission> {
        &self.by_id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash32_vectors() {
        assert_eq!(hash32(b""), 0x811c9dc5);
        assert_eq!(hash32(b"a"), 0x050c5d7e);
        assert_eq!(hash32(b"foobar"), 0x31f0b262);
    }

    #[test]
    fn test_ids_are_content_derived() {
        let a = Permission::new("admin", "manage-roles", "Manage roles");
        let b = Permission::new("admin", "manage-roles", "Another label");
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), 0x3d02e8b7);
        assert_ne!(a.id(), Permission::new("admin", "manage-users", "").id());

        // separator keeps ("ab", "c") apart from ("a", "bc")
        assert_ne!(content_id("ab", "c"), content_id("a", "bc"));
        assert_eq!(endpoint_id("POST", "/roles"), 0xfa29727f);
        assert!(endpoint_id("POST", "/roles") > 0);
    }

    #[test]
    fn test_set_queries() {
        let read = Permission::new("docs", "read", "Read");
        let write = Permission::new("docs", "write", "Write");
        let delete = Permission::new("docs", "delete", "Delete");
        let manager = PermissionManager::new([read.clone(), write.clone()]);

        assert!(manager.has(&read));
        assert!(!manager.has(&delete));
        assert!(manager.has_any(&[delete.clone(), write.clone()]));
        assert!(!manager.has_any(&[delete.clone()]));
        assert!(manager.has_all(&[read.clone(), write.clone()]));
        assert!(!manager.has_all(&[read.clone(), delete.clone()]));
        assert!(manager.has_all_ids(&[read.id, write.id]));
        assert!(!manager.has_any_ids(&[delete.id]));
    }

    #[test]
    fn test_empty_queries() {
        let manager = PermissionManager::new([Permission::new("docs", "read", "Read")]);
        assert!(manager.has_all(&[]));
        assert!(manager.has_all_ids(&[]));
        assert!(!manager.has_any(&[]));
        assert!(!manager.has_any_ids(&[]));
    }

    #[test]
    fn test_duplicates_last_write_wins() {
        let first = Permission::new("docs", "read", "Read");
        let other = Permission::new("docs", "write", "Write");
        let relabeled = Permission::new("docs", "read", "Read documents");
        let manager = PermissionManager::new([first.clone(), other.clone(), relabeled.clone()]);

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.ids(), vec![first.id, other.id]);
        assert_eq!(manager.all()[0].pretty_name, "Read documents");
        assert_eq!(manager.as_map()[&first.id].pretty_name, "Read documents");
    }

    #[test]
    fn test_restrict_drops_unknown_ids() {
        let read = Permission::new("docs", "read", "Read");
        let write = Permission::new("docs", "write", "Write");
        let global = PermissionManager::new([read.clone(), write.clone()]);

        let granted = global.restrict(&[write.id, 42]);
        assert_eq!(granted.ids(), vec![write.id]);
        assert!(!granted.has(&read));
        assert!(!granted.has_id(42));
    }
}
