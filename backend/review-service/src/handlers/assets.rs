/// Review and publish endpoints for a single asset
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::middleware::AccountId;
use crate::models::{Decision, EditMetadata};
use crate::services::PublishOptions;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitEditRequest {
    #[validate(length(min = 1, max = 1024))]
    pub edited_ref: String,
    #[validate(length(max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DecisionRequest {
    pub decision: Decision,
    #[validate(length(max = 5000))]
    pub feedback: Option<String>,
}

pub async fn list_assigned(state: web::Data<AppState>, account_id: AccountId) -> Result<HttpResponse> {
    let assets = state.workflow.list_assigned(account_id.0).await?;
    Ok(HttpResponse::Ok().json(assets))
}

pub async fn get_asset(
    state: web::Data<AppState>,
    account_id: AccountId,
    asset_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let asset = state
        .workflow
        .get_asset(account_id.0, asset_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(asset))
}

pub async fn submit_edit(
    state: web::Data<AppState>,
    account_id: AccountId,
    asset_id: web::Path<Uuid>,
    req: web::Json<SubmitEditRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    let req = req.into_inner();

    let metadata = EditMetadata {
        title: req.title,
        description: req.description,
        tags: req.tags,
    };
    let asset = state
        .workflow
        .submit_edit(account_id.0, asset_id.into_inner(), &req.edited_ref, metadata)
        .await?;
    Ok(HttpResponse::Ok().json(asset))
}

pub async fn decide(
    state: web::Data<AppState>,
    account_id: AccountId,
    asset_id: web::Path<Uuid>,
    req: web::Json<DecisionRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    let req = req.into_inner();

    let asset = state
        .workflow
        .decide(account_id.0, asset_id.into_inner(), req.decision, req.feedback)
        .await?;
    Ok(HttpResponse::Ok().json(asset))
}

/// Publish an approved asset; a repeat call answers 409 with the recorded id
pub async fn publish(
    state: web::Data<AppState>,
    account_id: AccountId,
    asset_id: web::Path<Uuid>,
    req: web::Json<PublishOptions>,
) -> Result<HttpResponse> {
    let asset_id = asset_id.into_inner();
    let record = state
        .workflow
        .publish(account_id.0, asset_id, req.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "asset_id": asset_id,
        "platform_id": record.platform_id,
        "publication": record,
    })))
}
