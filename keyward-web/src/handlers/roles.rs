//! Permission listing and role management

use super::types::{ListRolesQuery, MessageResponse, PageInfo, Paginated, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::{context::Authenticated, error::ApiError, state::AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use keyward_auth::{NewRole, Pagination, Permission, Role, RoleFilter, RoleUpdate, User};

/// `GET /permissions`
pub async fn list_permissions<U: User>(State(state): State<AppState<U>>) -> Json<Vec<Permission>> {
    Json(state.rbac.permissions().all())
}

/// `GET /users/me/role`
pub async fn current_user_role<U: User>(
    State(state): State<AppState<U>>,
    Authenticated(ctx): Authenticated<U>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.rbac.get_role(ctx.user.role_name()).await?))
}

/// `GET /users/{id}/role`
pub async fn user_role<U: User>(
    State(state): State<AppState<U>>,
    Path(id): Path<String>,
) -> Result<Json<Role>, ApiError> {
    let user = state.auth.loader().user_by_id(&id).await?;
    Ok(Json(state.rbac.get_role(user.role_name()).await?))
}

/// `GET /roles?keyword=&page=&page_size=`
pub async fn list_roles<U: User>(
    State(state): State<AppState<U>>,
    Query(query): Query<ListRolesQuery>,
) -> Result<Json<Paginated<Role>>, ApiError> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return Err(ApiError::validation("page must be at least 1", "page"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ApiError::validation(
            format!("page_size must be between 1 and {}", MAX_PAGE_SIZE),
            "page_size",
        ));
    }

    let filter = RoleFilter {
        keyword: query.keyword,
    };
    let pagination = Pagination {
        offset: (page - 1).saturating_mul(page_size),
        limit: page_size,
    };
    let (items, total) = state.rbac.list_roles(&filter, pagination).await?;

    Ok(Json(Paginated {
        items,
        pagination: PageInfo {
            page,
            page_size,
            total,
        },
    }))
}

/// `POST /roles`
pub async fn create_role<U: User>(
    State(state): State<AppState<U>>,
    Json(payload): Json<NewRole>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let role = state.rbac.add_role(payload).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// `PUT /roles/{name}`
pub async fn update_role<U: User>(
    State(state): State<AppState<U>>,
    Path(name): Path<String>,
    Json(payload): Json<RoleUpdate>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(state.rbac.update_role(&name, payload).await?))
}

/// `DELETE /roles/{name}`
pub async fn delete_role<U: User>(
    State(state): State<AppState<U>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.rbac.remove_role(&name).await?;
    Ok(Json(MessageResponse::new("role deleted")))
}
