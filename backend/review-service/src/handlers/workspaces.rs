/// Workspace, delegation and asset-submission endpoints
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::middleware::AccountId;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkspaceRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitOriginalRequest {
    #[validate(email)]
    pub delegate_email: String,
    /// Reference returned by the upload endpoints
    #[validate(length(min = 1, max = 1024))]
    pub binary_ref: String,
}

pub async fn create_workspace(
    state: web::Data<AppState>,
    account_id: AccountId,
    req: web::Json<CreateWorkspaceRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    let workspace = state
        .workflow
        .create_workspace(account_id.0, &req.name)
        .await?;
    Ok(HttpResponse::Created().json(workspace))
}

pub async fn list_workspaces(
    state: web::Data<AppState>,
    account_id: AccountId,
) -> Result<HttpResponse> {
    let workspaces = state.workflow.list_workspaces(account_id.0).await?;
    Ok(HttpResponse::Ok().json(workspaces))
}

pub async fn accept_delegation(
    state: web::Data<AppState>,
    account_id: AccountId,
    workspace_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let delegation = state
        .workflow
        .accept_delegation(account_id.0, workspace_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(delegation))
}

pub async fn submit_original(
    state: web::Data<AppState>,
    account_id: AccountId,
    workspace_id: web::Path<Uuid>,
    req: web::Json<SubmitOriginalRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    let asset = state
        .workflow
        .submit_original(
            account_id.0,
            workspace_id.into_inner(),
            &req.delegate_email,
            &req.binary_ref,
        )
        .await?;
    Ok(HttpResponse::Created().json(asset))
}

pub async fn list_workspace_assets(
    state: web::Data<AppState>,
    account_id: AccountId,
    workspace_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let assets = state
        .workflow
        .list_workspace_assets(account_id.0, workspace_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(assets))
}
