//! Application state shared by the middleware and handlers

use axum::response::Response;
use keyward_auth::{AuthService, EndpointIndex, RbacService, User};
use std::sync::Arc;

/// Builds the response sent for every rejected request
pub type UnauthorizedHandler = Arc<dyn Fn() -> Response + Send + Sync>;

pub struct AppState<U: User> {
    pub auth: Arc<AuthService<U>>,
    pub rbac: Arc<RbacService>,
    /// Built once from the assembled routes, read-only afterwards
    pub endpoints: Arc<EndpointIndex>,
    pub unauthorized: Option<UnauthorizedHandler>,
}

impl<U: User> AppState<U> {
    pub fn unauthorized_response(&self) -> Response {
        match &self.unauthorized {
            Some(handler) => handler(),
            None => crate::error::unauthorized_response(),
        }
    }
}

impl<U: User> Clone for AppState<U> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
            rbac: Arc::clone(&self.rbac),
            endpoints: Arc::clone(&self.endpoints),
            unauthorized: self.unauthorized.clone(),
        }
    }
}
