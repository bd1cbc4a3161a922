//! HTTP handlers for authentication and role management

pub mod auth;
pub mod roles;
pub mod types;

pub use types::*;

use crate::{router::PermissionRouter, state::AppState};
use axum::http::Method;
use keyward_auth::{manage_roles_permission, User};
use keyward_core::KeywardResult;

/// Register the built-in routes. Login is public, everything else sits
/// behind authentication; role mutations additionally need `admin:manage-roles`.
pub fn register_routes<U: User>(
    public: &mut PermissionRouter<AppState<U>>,
    private: &mut PermissionRouter<AppState<U>>,
) -> KeywardResult<()> {
    public.route(Method::POST, "/auth/login", auth::login::<U>)?;

    private.route(Method::POST, "/auth/logout", auth::logout::<U>)?;
    private.route(Method::GET, "/permissions", roles::list_permissions::<U>)?;
    private.route(Method::GET, "/users/me/role", roles::current_user_role::<U>)?;
    private.route(Method::GET, "/roles", roles::list_roles::<U>)?;

    let manage_roles = manage_roles_permission();
    private.protected(Method::POST, "/roles", roles::create_role::<U>, manage_roles.clone())?;
    private.protected(Method::PUT, "/roles/{name}", roles::update_role::<U>, manage_roles.clone())?;
    private.protected(Method::DELETE, "/roles/{name}", roles::delete_role::<U>, manage_roles.clone())?;
    private.protected(Method::GET, "/users/{id}/role", roles::user_role::<U>, manage_roles)?;

    Ok(())
}
