/// Sign-in, session rotation and logout endpoints
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::error::{Result, ReviewError};
use crate::middleware::{access_token, AccountId, ACCESS_COOKIE, SESSION_COOKIE};
use crate::models::{AccountView, Role};
use crate::services::{TokenPair, TokenPairResponse};
use crate::state::{AppState, HttpSettings};

#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Producer
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declines consent
    pub error: Option<String>,
}

/// Redirect the browser to the identity provider's consent screen
pub async fn sign_in(state: web::Data<AppState>, query: web::Query<SignInQuery>) -> HttpResponse {
    let location = state.credentials.begin_consent(query.role);
    HttpResponse::Found()
        .insert_header(("Location", location))
        .finish()
}

/// Finish consent, start a session and hand the browser back to the frontend
pub async fn oauth2_callback(
    state: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
) -> Result<HttpResponse> {
    if let Some(error) = &query.error {
        return Err(ReviewError::Unauthenticated(format!("consent declined: {error}")));
    }

    let (code, oauth_state) = match (&query.code, &query.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => {
            return Err(ReviewError::Validation(
                "code and state are required".to_string(),
            ))
        }
    };

    let (account, pair) = state.credentials.complete_consent(code, oauth_state).await?;
    tracing::debug!(account_id = %account.id, "consent completed");

    let mut response = HttpResponse::Found();
    response.insert_header(("Location", state.http.frontend_url.clone()));
    for cookie in session_cookies(&pair, &state.http) {
        response.cookie(cookie);
    }
    Ok(response.finish())
}

/// Exchange the session cookie for a fresh token pair
pub async fn refresh_token(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let presented = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
    let (_, pair) = state.credentials.rotate(presented.as_deref()).await?;

    let mut response = HttpResponse::Ok();
    for cookie in session_cookies(&pair, &state.http) {
        response.cookie(cookie);
    }
    Ok(response.json(TokenPairResponse::from(&pair)))
}

/// Drop the stored session and clear both cookies
///
/// Succeeds even without a valid access token so a stale browser can always
/// clear its cookies.
pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let token = access_token(&req);
    if let Ok(account_id) = state.credentials.verify_access(token.as_deref()).await {
        state.credentials.invalidate(account_id).await?;
    }

    let mut response = HttpResponse::NoContent();
    for name in [ACCESS_COOKIE, SESSION_COOKIE] {
        response.cookie(expired_cookie(name, &state.http));
    }
    Ok(response.finish())
}

pub async fn me(state: web::Data<AppState>, account_id: AccountId) -> Result<HttpResponse> {
    let account = state.credentials.account(account_id.0).await?;
    Ok(HttpResponse::Ok().json(AccountView::from(&account)))
}

fn session_cookies(pair: &TokenPair, http: &HttpSettings) -> [Cookie<'static>; 2] {
    [
        build_cookie(ACCESS_COOKIE, pair.access.token.clone(), pair.access.expires_in(), http),
        build_cookie(
            SESSION_COOKIE,
            pair.session.token.clone(),
            pair.session.expires_in(),
            http,
        ),
    ]
}

fn build_cookie(name: &'static str, value: String, max_age_secs: i64, http: &HttpSettings) -> Cookie<'static> {
    Cookie::build(name, value)
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .secure(http.secure_cookies)
        .max_age(CookieDuration::seconds(max_age_secs.max(0)))
        .finish()
}

fn expired_cookie(name: &'static str, http: &HttpSettings) -> Cookie<'static> {
    build_cookie(name, String::new(), 0, http)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(secure: bool) -> HttpSettings {
        HttpSettings {
            secure_cookies: secure,
            frontend_url: "http://localhost:3000".into(),
            max_upload_bytes: 1024,
            storage_timeout: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = build_cookie(ACCESS_COOKIE, "abc".into(), 900, &http(true));

        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(900)));
    }

    #[test]
    fn test_expired_cookie_clears_value() {
        let cookie = expired_cookie(SESSION_COOKIE, &http(false));
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
        assert_eq!(cookie.secure(), Some(false));
    }
}
