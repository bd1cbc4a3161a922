//! keyward auth - tokens, keys and role-based permissions
//!
//! Nothing here knows about HTTP. The web crate wires these pieces into an
//! axum router.

pub mod binder;
pub mod permission;
pub mod rbac;
pub mod role;
pub mod service;
pub mod token;
pub mod user;

pub use binder::{find_endpoint, harvest_permissions, index_endpoints, EndpointIndex, RouteWalk};
pub use permission::{endpoint_id, hash32, Endpoint, Permission, PermissionManager};
pub use rbac::{manage_roles_permission, RbacService};
pub use role::{InMemoryRoleStore, NewRole, Pagination, Role, RoleFilter, RoleStore, RoleUpdate};
pub use service::AuthService;
pub use token::{
    codec_from_settings, HeadlessJwtCodec, JwtCodec, Key, KeyStore, Token, TokenCodec,
};
pub use user::{AuthHook, User, UserLoader};
