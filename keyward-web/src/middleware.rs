//! Authentication and RBAC middleware
//!
//! `auth_middleware` guards private route groups: no valid bearer token, no
//! entry. `rbac_middleware` runs on every group and only acts on endpoints
//! present in the endpoint index, authenticating on demand when it has to.
//! Every rejection produces the same 401; the cause is only logged.

use crate::{
    context::{AuthContext, GrantedPermissions, Session, SESSION_USER_KEY},
    state::AppState,
};
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::AUTHORIZATION, Method},
    middleware::Next,
    response::Response,
};
use keyward_auth::{find_endpoint, Endpoint, User};
use keyward_core::{KeywardError, KeywardResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Token carried by an `Authorization: Bearer <token>` header value
pub fn bearer_payload(header: &str) -> Option<&str> {
    let payload = header.trim_start().strip_prefix("Bearer")?.trim();
    (!payload.is_empty()).then_some(payload)
}

pub async fn auth_middleware<U: User>(
    State(state): State<AppState<U>>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &mut request).await {
        Ok(_) => next.run(request).await,
        Err(e) => {
            debug!(stage = "authenticate", error = %e, path = %request.uri().path(), "Request rejected");
            state.unauthorized_response()
        }
    }
}

pub async fn rbac_middleware<U: User>(
    State(state): State<AppState<U>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(route) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
    else {
        return next.run(request).await;
    };

    let Some((method, endpoint)) = protected_endpoint(&state, request.method(), &route) else {
        return next.run(request).await;
    };

    let ctx = match authenticate(&state, &mut request).await {
        Ok(ctx) => ctx,
        Err(e) => {
            debug!(stage = "authenticate", error = %e, %method, %route, "Request rejected");
            return state.unauthorized_response();
        }
    };

    let granted = match state.rbac.granted_permissions(ctx.user.role_name()).await {
        Ok(granted) => granted,
        Err(e) => {
            warn!(
                stage = "role",
                error = %e,
                login_id = %ctx.user.login_id(),
                role = %ctx.user.role_name(),
                "Request rejected"
            );
            return state.unauthorized_response();
        }
    };

    if !granted.has(&endpoint.permission) {
        warn!(
            stage = "permission",
            login_id = %ctx.user.login_id(),
            role = %ctx.user.role_name(),
            permission = %endpoint.permission.pretty_name,
            %method,
            %route,
            "Request rejected"
        );
        return state.unauthorized_response();
    }

    request
        .extensions_mut()
        .insert(GrantedPermissions(Arc::new(granted)));
    next.run(request).await
}

/// Endpoint guarding `method` on `route`. A HEAD request without its own
/// entry is served by the GET handler, so it inherits the GET requirement.
fn protected_endpoint<U: User>(
    state: &AppState<U>,
    method: &Method,
    route: &str,
) -> Option<(Method, Endpoint)> {
    if let Some(endpoint) = find_endpoint(&state.endpoints, method.as_str(), route) {
        return Some((method.clone(), endpoint.clone()));
    }
    if *method == Method::HEAD {
        return find_endpoint(&state.endpoints, Method::GET.as_str(), route)
            .map(|endpoint| (Method::GET, endpoint.clone()));
    }
    None
}

/// Verify the bearer token and resolve its user, once per request
async fn authenticate<U: User>(
    state: &AppState<U>,
    request: &mut Request,
) -> KeywardResult<AuthContext<U>> {
    if let Some(ctx) = request.extensions().get::<AuthContext<U>>() {
        return Ok(ctx.clone());
    }

    let token = {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .ok_or(KeywardError::Unauthorized)?
            .to_str()
            .map_err(|_| KeywardError::invalid_token("authorization header is not visible ASCII"))?;
        let payload = bearer_payload(header)
            .ok_or_else(|| KeywardError::invalid_token("missing bearer credential"))?;
        state.auth.verify(payload)?
    };

    let session = request.extensions().get::<Session>().cloned();
    let user = resolve_user(state, session.as_ref(), &token.subject).await?;

    let ctx = AuthContext {
        token: Arc::new(token),
        user: Arc::new(user),
    };
    request.extensions_mut().insert(ctx.clone());
    Ok(ctx)
}

async fn resolve_user<U: User>(
    state: &AppState<U>,
    session: Option<&Session>,
    subject: &str,
) -> KeywardResult<U> {
    if let Some(session) = session {
        if let Some(user) = session.get::<U>(SESSION_USER_KEY).await {
            if user.login_id() == subject {
                return Ok(user);
            }
        }
    }

    let user = state.auth.loader().user_by_id(subject).await?;
    if let Some(session) = session {
        session.insert(SESSION_USER_KEY, &user).await?;
    }
    Ok(user)
}
