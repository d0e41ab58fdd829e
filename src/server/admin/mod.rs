mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}", patch(users::update_user))
        .route("/users/{id}", delete(users::delete_user))
        .route("/users/{id}/roles", post(users::add_role))
        .route("/users/{id}/roles/{role}", delete(users::remove_role))
}
