//! keyward web
//!
//! axum integration: routes are registered on a [`PermissionRouter`], then
//! [`AppBuilder::build`] walks them once to derive the permission registry
//! and endpoint index before installing the authentication and RBAC layers.

pub mod context;
pub mod demo;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod state;

pub use context::{AuthContext, Authenticated, GrantedPermissions, Session};
pub use error::ApiError;
pub use router::{PermissionRouter, RouteGroups, RouteHandle};
pub use server::{KeywardServer, KeywardServerBuilder};
pub use state::{AppState, UnauthorizedHandler};

use axum::{middleware::from_fn, middleware::from_fn_with_state, response::Response, Router};
use keyward_auth::{
    harvest_permissions, index_endpoints, AuthHook, AuthService, InMemoryRoleStore, NewRole,
    PermissionManager, RbacService, RoleStore, User, UserLoader,
};
use keyward_core::{KeywardResult, Settings};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Assembled application
pub struct App<U: User> {
    pub router: Router,
    pub state: AppState<U>,
}

/// Collects routes and collaborators, then assembles the [`App`]
pub struct AppBuilder<U: User> {
    settings: Settings,
    loader: Arc<dyn UserLoader<U>>,
    role_store: Arc<dyn RoleStore>,
    hooks: Vec<Arc<dyn AuthHook<U>>>,
    default_roles: Vec<NewRole>,
    unauthorized: Option<UnauthorizedHandler>,
    builtin_routes: bool,
    public: PermissionRouter<AppState<U>>,
    private: PermissionRouter<AppState<U>>,
}

impl<U: User> AppBuilder<U> {
    pub fn new(settings: Settings, loader: Arc<dyn UserLoader<U>>) -> Self {
        Self {
            settings,
            loader,
            role_store: Arc::new(InMemoryRoleStore::new()),
            hooks: Vec::new(),
            default_roles: Vec::new(),
            unauthorized: None,
            builtin_routes: true,
            public: PermissionRouter::new(),
            private: PermissionRouter::new(),
        }
    }

    pub fn role_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.role_store = store;
        self
    }

    pub fn hook(mut self, hook: Arc<dyn AuthHook<U>>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn default_roles(mut self, roles: Vec<NewRole>) -> Self {
        self.default_roles = roles;
        self
    }

    pub fn unauthorized_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn() -> Response + Send + Sync + 'static,
    {
        self.unauthorized = Some(Arc::new(handler));
        self
    }

    /// Whether to register the login, logout and role management routes
    pub fn builtin_routes(mut self, enabled: bool) -> Self {
        self.builtin_routes = enabled;
        self
    }

    /// Routes reachable without a token, unless RBAC protects them
    pub fn public_routes(&mut self) -> &mut PermissionRouter<AppState<U>> {
        &mut self.public
    }

    /// Routes that require an authenticated caller
    pub fn private_routes(&mut self) -> &mut PermissionRouter<AppState<U>> {
        &mut self.private
    }

    pub async fn build(mut self) -> KeywardResult<App<U>> {
        if self.builtin_routes {
            handlers::register_routes(&mut self.public, &mut self.private)?;
        }

        let mut auth = AuthService::from_settings(&self.settings.auth, self.loader)?;
        for hook in self.hooks {
            auth = auth.with_hook(hook);
        }

        let groups = [&self.public, &self.private];
        let routes = RouteGroups(&groups);
        // axum panics when merging overlapping routes
        routes.ensure_disjoint()?;
        let permissions = PermissionManager::new(harvest_permissions(&routes)?);
        let endpoints = index_endpoints(&routes, &permissions)?;
        info!(
            permissions = permissions.len(),
            protected_endpoints = endpoints.len(),
            "Route permissions bound"
        );

        let rbac = RbacService::new(self.role_store, permissions)
            .with_default_roles(self.default_roles);
        rbac.ensure_default_roles().await?;

        let state = AppState {
            auth: Arc::new(auth),
            rbac: Arc::new(rbac),
            endpoints: Arc::new(endpoints),
            unauthorized: self.unauthorized,
        };

        let enabled = self.settings.auth.enabled;
        let public = guard(self.public, &state, enabled, false);
        let private = guard(self.private, &state, enabled, true);

        let router = public
            .merge(private)
            .layer(from_fn(context::session_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        Ok(App { router, state })
    }
}

/// Attach the middleware to one route group. Layers added later run first, so
/// authentication precedes the permission check.
fn guard<U: User>(
    routes: PermissionRouter<AppState<U>>,
    state: &AppState<U>,
    enabled: bool,
    requires_auth: bool,
) -> Router<AppState<U>> {
    // route_layer refuses routers without routes
    if !enabled || routes.is_empty() {
        return routes.into_router();
    }

    let router = routes.into_router().route_layer(from_fn_with_state(
        state.clone(),
        middleware::rbac_middleware::<U>,
    ));
    if requires_auth {
        router.route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware::<U>,
        ))
    } else {
        router
    }
}
