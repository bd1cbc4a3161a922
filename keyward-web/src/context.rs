//! Per-request authentication context and session

use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, Extensions},
    middleware::Next,
    response::Response,
};
use keyward_auth::{PermissionManager, Token, User};
use keyward_core::KeywardResult;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Session key under which the authenticated user is cached
pub const SESSION_USER_KEY: &str = "user";

/// Token and user of an authenticated request
pub struct AuthContext<U> {
    pub token: Arc<Token>,
    pub user: Arc<U>,
}

impl<U> Clone for AuthContext<U> {
    fn clone(&self) -> Self {
        Self {
            token: Arc::clone(&self.token),
            user: Arc::clone(&self.user),
        }
    }
}

/// Extractor for handlers that require an authenticated caller
pub struct Authenticated<U>(pub AuthContext<U>);

/// Rejects with the application's unauthorized response.
impl<U: User> FromRequestParts<AppState<U>> for Authenticated<U> {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<U>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext<U>>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| state.unauthorized_response())
    }
}

/// Permissions granted to the caller on an RBAC-protected route
#[derive(Debug, Clone)]
pub struct GrantedPermissions(pub Arc<PermissionManager>);

pub fn token_from_extensions<U: User>(extensions: &Extensions) -> Option<Arc<Token>> {
    extensions
        .get::<AuthContext<U>>()
        .map(|ctx| Arc::clone(&ctx.token))
}

pub fn is_authenticated<U: User>(extensions: &Extensions) -> bool {
    extensions.get::<AuthContext<U>>().is_some()
}

/// Request-scoped key/value store shared by the middleware and handlers
#[derive(Debug, Clone, Default)]
pub struct Session {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl Session {
    /// `None` when absent or not representable as `T`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.read().await.get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub async fn insert<T: Serialize>(&self, key: impl Into<String>, value: &T) -> KeywardResult<()> {
        let value = serde_json::to_value(value)?;
        self.values.write().await.insert(key.into(), value);
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().await.remove(key)
    }
}

/// Install a fresh [`Session`] for the request
pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(Session::default());
    next.run(request).await
}
