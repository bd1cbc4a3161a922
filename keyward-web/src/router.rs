//! Permission-aware route registration
//!
//! [`PermissionRouter`] records every `(method, path)` it hands to axum in a
//! side table. A permission is attached to a route with an explicit
//! [`PermissionRouter::bind`] call on the handle returned at registration.

use axum::{
    handler::Handler,
    http::Method,
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use keyward_auth::{Permission, RouteWalk};
use keyward_core::{KeywardError, KeywardResult};
use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

static NEXT_ROUTER_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies a route registered on a [`PermissionRouter`]; only valid for
/// the router that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHandle {
    router: usize,
    index: usize,
}

#[derive(Debug)]
struct RouteEntry {
    method: Method,
    path: String,
    permission: Option<Permission>,
}

pub struct PermissionRouter<S = ()> {
    id: usize,
    methods: BTreeMap<String, MethodRouter<S>>,
    entries: Vec<RouteEntry>,
}

impl<S> PermissionRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            id: NEXT_ROUTER_ID.fetch_add(1, Ordering::Relaxed),
            methods: BTreeMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn route<H, T>(&mut self, method: Method, path: &str, handler: H) -> KeywardResult<RouteHandle>
    where
        H: Handler<T, S>,
        T: 'static,
    {
        let filter = MethodFilter::try_from(method.clone()).map_err(|_| {
            KeywardError::invalid_configuration(format!(
                "unsupported method {} for route {}",
                method, path
            ))
        })?;

        if self
            .entries
            .iter()
            .any(|entry| entry.method == method && entry.path == path)
        {
            return Err(KeywardError::invalid_configuration(format!(
                "route {} {} is registered twice",
                method, path
            )));
        }

        let method_router = match self.methods.remove(path) {
            Some(existing) => existing.on(filter, handler),
            None => on(filter, handler),
        };
        self.methods.insert(path.to_string(), method_router);

        self.entries.push(RouteEntry {
            method,
            path: path.to_string(),
            permission: None,
        });
        Ok(RouteHandle {
            router: self.id,
            index: self.entries.len() - 1,
        })
    }

    /// Require `permission` on the route behind `handle`.
    pub fn bind(&mut self, handle: RouteHandle, permission: Permission) -> KeywardResult<()> {
        let entry = self
            .entries
            .get_mut(handle.index)
            .filter(|_| handle.router == self.id)
            .ok_or_else(|| {
                KeywardError::invalid_configuration("route handle does not belong to this router")
            })?;
        entry.permission = Some(permission);
        Ok(())
    }

    /// Register and bind in one step
    pub fn protected<H, T>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
        permission: Permission,
    ) -> KeywardResult<RouteHandle>
    where
        H: Handler<T, S>,
        T: 'static,
    {
        let handle = self.route(method, path, handler)?;
        self.bind(handle, permission)?;
        Ok(handle)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn into_router(self) -> Router<S> {
        self.methods
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            })
    }
}

impl<S> Default for PermissionRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> RouteWalk for PermissionRouter<S> {
    fn walk(
        &self,
        visit: &mut dyn FnMut(&str, &str, Option<&Permission>) -> KeywardResult<()>,
    ) -> KeywardResult<()> {
        for entry in &self.entries {
            visit(entry.method.as_str(), &entry.path, entry.permission.as_ref())?;
        }
        Ok(())
    }
}

/// Walks several routers as one tree
pub struct RouteGroups<'a, S>(pub &'a [&'a PermissionRouter<S>]);

impl<S> RouteGroups<'_, S> {
    /// Fail when two groups register the same `(method, path)`.
    pub fn ensure_disjoint(&self) -> KeywardResult<()> {
        let mut seen = HashSet::new();
        self.walk(&mut |method, path, _| {
            if seen.insert((method.to_string(), path.to_string())) {
                Ok(())
            } else {
                Err(KeywardError::invalid_configuration(format!(
                    "route {} {} is registered in more than one group",
                    method, path
                )))
            }
        })
    }
}

impl<S> RouteWalk for RouteGroups<'_, S> {
    fn walk(
        &self,
        visit: &mut dyn FnMut(&str, &str, Option<&Permission>) -> KeywardResult<()>,
    ) -> KeywardResult<()> {
        for group in self.0 {
            group.walk(visit)?;
        }
        Ok(())
    }
}
