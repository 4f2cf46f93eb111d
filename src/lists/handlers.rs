// HTTP handlers for stored product list endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AdminSession;
use crate::lists::{ListDefinition, ListError, ListPredicate, ListSort};

/// Request DTO for creating or replacing a list definition
#[derive(Debug, Deserialize, Validate)]
pub struct SaveListRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub predicates: Vec<ListPredicate>,
    #[serde(default)]
    pub sort: ListSort,
}

/// Response DTO for a stored list definition
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub list_id: Uuid,
    pub name: String,
    pub predicates: Vec<ListPredicate>,
    pub sort: ListSort,
    pub updated_at: DateTime<Utc>,
}

impl From<ListDefinition> for ListResponse {
    fn from(definition: ListDefinition) -> Self {
        Self {
            list_id: definition.list_id,
            name: definition.name,
            predicates: definition.predicates,
            sort: definition.sort,
            updated_at: definition.updated_at,
        }
    }
}

/// Response DTO for an evaluated list
#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub list_id: Uuid,
    pub product_ids: Vec<i32>,
    pub evaluated_at: DateTime<Utc>,
}

/// Handler for POST /api/lists
/// Creates a new stored list (Admin only)
pub async fn create_list_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Json(request): Json<SaveListRequest>,
) -> Result<(StatusCode, Json<ListResponse>), ListError> {
    request
        .validate()
        .map_err(|e| ListError::InvalidDefinition(e.to_string()))?;

    let definition = ListDefinition {
        list_id: Uuid::new_v4(),
        name: request.name,
        predicates: request.predicates,
        sort: request.sort,
        updated_at: Utc::now(),
    };

    state.list_store.save(&definition).await?;
    state.events.list_saved(definition.list_id);

    Ok((StatusCode::CREATED, Json(definition.into())))
}

/// Handler for PUT /api/lists/{list_id}
/// Replaces a stored list definition (Admin only)
pub async fn update_list_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(list_id): Path<Uuid>,
    Json(request): Json<SaveListRequest>,
) -> Result<Json<ListResponse>, ListError> {
    request
        .validate()
        .map_err(|e| ListError::InvalidDefinition(e.to_string()))?;

    // Replacing a list that does not exist is a 404, not an upsert
    state.list_store.get(list_id).await?;

    let definition = ListDefinition {
        list_id,
        name: request.name,
        predicates: request.predicates,
        sort: request.sort,
        updated_at: Utc::now(),
    };

    state.list_store.save(&definition).await?;
    state.events.list_saved(list_id);

    Ok(Json(definition.into()))
}

/// Handler for GET /api/lists
pub async fn get_lists_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
) -> Result<Json<Vec<ListResponse>>, ListError> {
    let definitions = state.list_store.list().await?;
    Ok(Json(definitions.into_iter().map(Into::into).collect()))
}

/// Handler for GET /api/lists/{list_id}
pub async fn get_list_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(list_id): Path<Uuid>,
) -> Result<Json<ListResponse>, ListError> {
    let definition = state.list_store.get(list_id).await?;
    Ok(Json(definition.into()))
}

/// Handler for DELETE /api/lists/{list_id}
pub async fn delete_list_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(list_id): Path<Uuid>,
) -> Result<StatusCode, ListError> {
    state.list_store.delete(list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/lists/{list_id}/evaluate
/// Recomputes the list against the live catalog; results are never cached
pub async fn evaluate_list_handler(
    State(state): State<crate::AppState>,
    _admin: AdminSession,
    Path(list_id): Path<Uuid>,
) -> Result<Json<EvaluationResponse>, ListError> {
    let definition = state.list_store.get(list_id).await?;
    let product_ids = state.list_store.evaluate(&definition).await?;

    tracing::debug!(
        "List {} evaluated to {} products",
        list_id,
        product_ids.len()
    );

    Ok(Json(EvaluationResponse {
        list_id,
        product_ids,
        evaluated_at: Utc::now(),
    }))
}
