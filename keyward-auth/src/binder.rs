//! Route-permission binding
//!
//! A router that knows which handlers carry a permission exposes that through
//! [`RouteWalk`]. One walk after the routes are assembled builds the global
//! [`PermissionManager`], a second one the [`EndpointIndex`].

use crate::permission::{endpoint_id, Endpoint, Permission, PermissionManager};
use keyward_core::KeywardResult;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Visits every registered `(method, path, permission)` triple exactly once
pub trait RouteWalk {
    fn walk(
        &self,
        visit: &mut dyn FnMut(&str, &str, Option<&Permission>) -> KeywardResult<()>,
    ) -> KeywardResult<()>;
}

/// Endpoints that require a permission, keyed by endpoint id
pub type EndpointIndex = HashMap<i64, Endpoint>;

/// Collect every permission tagged on a route.
///
/// The first registration of an id is kept; a later one with different
/// metadata is reported and ignored.
pub fn harvest_permissions(routes: &dyn RouteWalk) -> KeywardResult<Vec<Permission>> {
    let mut seen: HashMap<i64, usize> = HashMap::new();
    let mut permissions: Vec<Permission> = Vec::new();

    routes.walk(&mut |method, path, permission| {
        let Some(permission) = permission else {
            return Ok(());
        };

        match seen.get(&permission.id) {
            Some(&index) => {
                let existing = &permissions[index];
                if existing != permission {
                    warn!(
                        permission_id = permission.id,
                        kept = %existing.pretty_name,
                        ignored = %permission.pretty_name,
                        method,
                        path,
                        "Permission id registered twice with different metadata"
                    );
                }
            }
            None => {
                seen.insert(permission.id, permissions.len());
                permissions.push(permission.clone());
            }
        }
        Ok(())
    })?;

    debug!(count = permissions.len(), "Harvested route permissions");
    Ok(permissions)
}

/// Index every tagged route whose permission `global` knows about.
pub fn index_endpoints(
    routes: &dyn RouteWalk,
    global: &PermissionManager,
) -> KeywardResult<EndpointIndex> {
    let mut index = EndpointIndex::new();

    routes.walk(&mut |method, path, permission| {
        let Some(permission) = permission else {
            return Ok(());
        };
        let Some(known) = global.get(permission.id) else {
            return Ok(());
        };

        let endpoint = Endpoint::new(method, path, known.clone());
        debug!(method, path, permission = %known.pretty_name, "Protected endpoint");
        index.insert(endpoint.id, endpoint);
        Ok(())
    })?;

    Ok(index)
}

/// Look up the endpoint matched by a request
pub fn find_endpoint<'a>(index: &'a EndpointIndex, method: &str, path: &str) -> Option<&'a Endpoint> {
    index.get(&endpoint_id(method, path))
}
