/// HTTP handlers for review-service
pub mod assets;
pub mod auth;
pub mod uploads;
pub mod workspaces;

use actix_web::{web, HttpResponse};

use crate::metrics;
use crate::middleware::JwtAuthMiddleware;

pub use assets::*;
pub use auth::*;
pub use uploads::*;
pub use workspaces::*;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Mount every route; the application must carry `web::Data<AppState>`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(
            web::scope("/api/v1/auth")
                .route("/sign-in", web::get().to(auth::sign_in))
                .route("/oauth2callback", web::get().to(auth::oauth2_callback))
                .route("/refresh-token", web::post().to(auth::refresh_token))
                .route("/logout", web::post().to(auth::logout)),
        )
        .service(
            web::scope("/api/v1")
                .wrap(JwtAuthMiddleware)
                .route("/me", web::get().to(auth::me))
                .service(
                    web::scope("/workspaces")
                        .route("", web::post().to(workspaces::create_workspace))
                        .route("", web::get().to(workspaces::list_workspaces))
                        .route(
                            "/{id}/delegation/accept",
                            web::post().to(workspaces::accept_delegation),
                        )
                        .route("/{id}/assets", web::post().to(workspaces::submit_original))
                        .route("/{id}/assets", web::get().to(workspaces::list_workspace_assets)),
                )
                .service(
                    web::scope("/assets")
                        .route("/assigned", web::get().to(assets::list_assigned))
                        .route("/{id}", web::get().to(assets::get_asset))
                        .route("/{id}/edit", web::put().to(assets::submit_edit))
                        .route("/{id}/decision", web::post().to(assets::decide))
                        .route("/{id}/publish", web::post().to(assets::publish)),
                )
                .service(
                    web::scope("/uploads")
                        .route("", web::post().to(uploads::upload_binary))
                        .route("/presigned-url", web::post().to(uploads::presigned_upload)),
                ),
        );
}
