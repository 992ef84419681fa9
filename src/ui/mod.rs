// Dashboard UI module
// Server-side rendering with Askama templates; all state changes go
// through HTML forms.

mod templates;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::auth;
use crate::db::SignupError;
use crate::error::AppError;
use crate::session::{SessionContext, SESSION_COOKIE};
use crate::AppState;

pub use templates::*;

pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(report_view))
        .route("/login", get(login_page))
        .route("/login", post(login_submit))
        .route("/signup", get(signup_page))
        .route("/signup", post(signup_submit))
        .route("/feedback", post(feedback_submit))
        .route("/logout", post(logout))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

// Helper to render templates and handle errors
fn render_template<T: Template>(template: T) -> Result<Response, AppError> {
    let html = template.render()?;
    Ok(Html(html).into_response())
}

fn login_template(error: Option<String>, notice: Option<String>) -> LoginTemplate {
    LoginTemplate {
        error,
        notice,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn report_template(
    state: &AppState,
    username: &str,
    error: Option<String>,
    notice: Option<String>,
) -> ReportTemplate {
    let report = &state.config.report;
    ReportTemplate {
        username: username.to_string(),
        title: report.title.clone(),
        embed_url: report.embed_url.clone(),
        frame_height: report.frame_height,
        error,
        notice,
    }
}

// Authenticated view: embedded report plus the feedback form. The
// SessionContext extractor redirects unauthenticated requests to /login.
async fn report_view(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
) -> Result<Response, AppError> {
    render_template(report_template(&state, &ctx.username, None, None))
}

async fn login_page() -> Result<Response, AppError> {
    render_template(login_template(None, None))
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let user = state.store.find_user(&form.username).await?;

    // One message for both unknown username and wrong password
    let authenticated = match &user {
        Some(user) => auth::verify_password(&form.password, &user.password_hash),
        None => false,
    };
    if !authenticated {
        info!("rejected login for {:?}", form.username);
        let page = render_template(login_template(
            Some("Invalid credentials".to_string()),
            None,
        ))?;
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    }

    state.store.open_session(&form.username).await?;

    let token = auth::generate_token();
    state.sessions.insert(token.clone(), form.username.clone());

    let jar = jar.add(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    );
    Ok((jar, Redirect::to("/")).into_response())
}

async fn signup_page() -> Result<Response, AppError> {
    render_template(SignupTemplate {
        error: None,
        username: String::new(),
    })
}

#[derive(Deserialize)]
struct SignupForm {
    username: String,
    password: String,
}

async fn signup_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let username = form.username.trim();

    if username.is_empty() {
        return signup_rejected("Username is required.".to_string(), "");
    }
    if let Some(message) = auth::validate_password(&form.password) {
        return signup_rejected(message.to_string(), username);
    }

    let password_hash = auth::hash_password(&form.password).map_err(|_| AppError::Hashing)?;

    match state.store.create_user(username, &password_hash).await {
        Ok(()) => {
            let page = render_template(login_template(
                None,
                Some("Account created successfully! Please log in.".to_string()),
            ))?;
            Ok(page)
        }
        Err(SignupError::UsernameTaken) => {
            signup_rejected(SignupError::UsernameTaken.to_string(), username)
        }
        Err(SignupError::Db(e)) => Err(e.into()),
    }
}

fn signup_rejected(message: String, username: &str) -> Result<Response, AppError> {
    let page = render_template(SignupTemplate {
        error: Some(message),
        username: username.to_string(),
    })?;
    Ok((StatusCode::BAD_REQUEST, page).into_response())
}

#[derive(Deserialize)]
struct FeedbackForm {
    feedback: String,
}

/// The 500-character cap is enforced by the input widget; the server only
/// rejects empty submissions.
fn validate_feedback(text: &str) -> Result<&str, &'static str> {
    if text.trim().is_empty() {
        Err("Feedback cannot be empty. Please enter your details.")
    } else {
        Ok(text)
    }
}

async fn feedback_submit(
    State(state): State<Arc<AppState>>,
    ctx: SessionContext,
    Form(form): Form<FeedbackForm>,
) -> Result<Response, AppError> {
    let feedback = match validate_feedback(&form.feedback) {
        Ok(text) => text,
        Err(message) => {
            let page = render_template(report_template(
                &state,
                &ctx.username,
                Some(message.to_string()),
                None,
            ))?;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
    };

    // A failed insert keeps the user on the page with a generic message
    match state.store.insert_feedback(&ctx.username, feedback).await {
        Ok(()) => render_template(report_template(
            &state,
            &ctx.username,
            None,
            Some("Thank you for your feedback!".to_string()),
        )),
        Err(e) => {
            tracing::error!("feedback insert failed for {}: {e}", ctx.username);
            let page = render_template(report_template(
                &state,
                &ctx.username,
                Some("An error occurred while saving your feedback.".to_string()),
                None,
            ))?;
            Ok((StatusCode::INTERNAL_SERVER_ERROR, page).into_response())
        }
    }
}

async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ctx: SessionContext,
) -> Result<Response, AppError> {
    state.store.close_latest_session(&ctx.username).await?;
    state.sessions.remove(&ctx.token);

    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    Ok((jar, Redirect::to("/login")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_feedback_is_rejected() {
        assert!(validate_feedback("").is_err());
        assert!(validate_feedback("   ").is_err());
        assert!(validate_feedback("\n\t ").is_err());
    }

    #[test]
    fn real_feedback_passes_untrimmed() {
        assert_eq!(validate_feedback("Great report!"), Ok("Great report!"));
        // Surrounding whitespace is kept, matching what the user typed
        assert_eq!(validate_feedback(" ok "), Ok(" ok "));
    }
}
