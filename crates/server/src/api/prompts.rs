//! Prompt template management

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{blocking, ApiError, ErrorResponse};
use crate::SharedState;

#[derive(Serialize, ToSchema)]
pub struct PromptListItem {
    pub slug: String,
    pub version: i32,
}

#[derive(Serialize, ToSchema)]
pub struct PromptListResponse {
    pub prompts: Vec<PromptListItem>,
}

#[derive(Serialize, ToSchema)]
pub struct PromptResponse {
    pub slug: String,
    pub content: String,
    pub version: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePromptRequest {
    pub content: String,
}

#[derive(Serialize, ToSchema)]
pub struct UpdatePromptResponse {
    pub success: bool,
    pub slug: String,
    pub new_version: i32,
}

pub fn prompt_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_prompts))
        .route("/:slug", get(get_prompt).put(update_prompt))
}

/// List all prompts
#[utoipa::path(
    get,
    path = "/api/prompts",
    tag = "prompts",
    responses(
        (status = 200, description = "List of prompts", body = PromptListResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn list_prompts(
    State(state): State<SharedState>,
) -> Result<Json<PromptListResponse>, ApiError> {
    let db = state.db.clone();
    let templates = blocking(move || db.list_prompts()).await?;

    Ok(Json(PromptListResponse {
        prompts: templates
            .into_iter()
            .map(|t| PromptListItem {
                slug: t.slug,
                version: t.version,
            })
            .collect(),
    }))
}

/// Get a prompt by slug
#[utoipa::path(
    get,
    path = "/api/prompts/{slug}",
    tag = "prompts",
    params(("slug" = String, Path, description = "Prompt slug")),
    responses(
        (status = 200, description = "Prompt content", body = PromptResponse),
        (status = 404, description = "Unknown slug", body = ErrorResponse)
    )
)]
pub async fn get_prompt(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Json<PromptResponse>, ApiError> {
    let db = state.db.clone();
    let lookup = slug.clone();
    let template = blocking(move || db.prompt(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown prompt '{}'", slug)))?;

    Ok(Json(PromptResponse {
        slug: template.slug,
        content: template.content,
        version: template.version,
    }))
}

/// Replace a prompt; the next run picks it up
#[utoipa::path(
    put,
    path = "/api/prompts/{slug}",
    tag = "prompts",
    params(("slug" = String, Path, description = "Prompt slug")),
    request_body = UpdatePromptRequest,
    responses(
        (status = 200, description = "Prompt updated", body = UpdatePromptResponse),
        (status = 400, description = "Blank content", body = ErrorResponse),
        (status = 404, description = "Unknown slug", body = ErrorResponse)
    )
)]
pub async fn update_prompt(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Json(req): Json<UpdatePromptRequest>,
) -> Result<Json<UpdatePromptResponse>, ApiError> {
    let db = state.db.clone();
    let target = slug.clone();
    let new_version = blocking(move || db.set_prompt(&target, &req.content)).await?;

    Ok(Json(UpdatePromptResponse {
        success: true,
        slug,
        new_version,
    }))
}

#[cfg(test)]
mod tests {
    use crate::router;
    use crate::tests::{body_json, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn put_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_contains_every_stage_prompt() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/api/prompts").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        let slugs: Vec<_> = body["prompts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["slug"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(slugs.len(), 7);
        assert!(slugs.contains(&"validator".to_string()));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let state = test_state();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(put_json(
                "/api/prompts/simplifier",
                serde_json::json!({"content": "Be brief."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["new_version"], 2);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/prompts/simplifier")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["content"], "Be brief.");
        assert_eq!(body["version"], 2);
    }

    #[tokio::test]
    async fn test_blank_content_is_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(put_json("/api/prompts/validator", serde_json::json!({"content": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_slug_is_not_found() {
        let app = router(test_state());

        let response = app
            .clone()
            .oneshot(put_json("/api/prompts/poet", serde_json::json!({"content": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::builder().uri("/api/prompts/poet").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
