use chrono::Utc;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::QueryResult;
use crate::error::{AuthError, BackendError};

pub const DEFAULT_REDIRECT: &str = "/";
pub const MIN_PASSWORD_LEN: usize = 8;
pub const OAUTH_PROVIDERS: [&str; 3] = ["github", "google", "linkedin_oidc"];

const MAX_REDIRECT_LEN: usize = 2048;
// refresh a little before the provider would reject the token
const EXPIRY_MARGIN_SECS: i64 = 60;
const CALLBACK_PATH: &str = "/auth/callback";
pub const ERROR_PATH: &str = "/auth/error";
const RESET_PATH: &str = "/auth/reset-password";

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid scheme regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub trait AuthApi {
    fn sign_in_with_password(&self, email: &str, password: &str) -> QueryResult<Session>;
    fn sign_up(&self, email: &str, password: &str, full_name: Option<&str>) -> QueryResult<Option<Session>>;
    fn sign_out(&self, access_token: &str) -> QueryResult<()>;
    fn send_password_reset(&self, email: &str, redirect_to: &str) -> QueryResult<()>;
    fn update_user(&self, access_token: &str, attributes: &UserAttributes) -> QueryResult<AuthUser>;
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> QueryResult<Url>;
    fn exchange_code(&self, code: &str, code_verifier: &str) -> QueryResult<Session>;
    fn refresh_session(&self, refresh_token: &str) -> QueryResult<Session>;
}

pub fn validate_redirect_url(next: &str) -> String {
    if is_safe_path(next) {
        next.to_string()
    } else {
        debug!(next = %next, "rejected redirect target");
        DEFAULT_REDIRECT.to_string()
    }
}

fn is_safe_path(next: &str) -> bool {
    if next.is_empty() || next.len() > MAX_REDIRECT_LEN {
        return false;
    }
    // Must be rooted at this origin; "//host" and "/\host" are
    // protocol-relative to browsers.
    if !next.starts_with('/') || next.starts_with("//") {
        return false;
    }
    if next.contains('\\') || next.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return false;
    }
    if SCHEME.is_match(next) || next.contains("://") {
        return false;
    }
    let lower = next.to_ascii_lowercase();
    if lower.contains("%2f") || lower.contains("%5c") || lower.contains("%00") {
        return false;
    }
    let path = next.split(['?', '#']).next().unwrap_or_default();
    !path.split('/').any(|segment| segment == "..")
}

pub fn sanitize_auth_error(err: &BackendError) -> String {
    debug!(error = %err, "auth backend error");
    let message = match err {
        BackendError::NotConfigured => "Sign-in is unavailable right now. Please try again later.",
        BackendError::Network(_) => "Unable to reach the server. Check your connection and try again.",
        BackendError::Unauthenticated => "Your session has expired. Please sign in again.",
        BackendError::Decode(_) => GENERIC_AUTH_ERROR,
        BackendError::Api {
            status,
            code,
            message,
        } => known_auth_message(*status, code.as_deref(), message).unwrap_or(GENERIC_AUTH_ERROR),
    };
    message.to_string()
}

const GENERIC_AUTH_ERROR: &str = "Something went wrong. Please try again.";

fn known_auth_message(status: u16, code: Option<&str>, message: &str) -> Option<&'static str> {
    let by_code = match code.unwrap_or_default() {
        "invalid_credentials" | "invalid_grant" => Some("Invalid email or password."),
        "email_not_confirmed" => Some("Please confirm your email address before signing in."),
        "user_already_exists" | "email_exists" => Some("An account with this email already exists."),
        "weak_password" => Some("Password is too weak. Use at least 8 characters."),
        "same_password" => Some("New password must be different from your current password."),
        "over_request_rate_limit" | "over_email_send_rate_limit" => {
            Some("Too many attempts. Please wait a moment and try again.")
        }
        "session_not_found" | "refresh_token_not_found" | "bad_jwt" => {
            Some("Your session has expired. Please sign in again.")
        }
        "validation_failed" | "email_address_invalid" => Some("Please enter a valid email address."),
        _ => None,
    };
    if by_code.is_some() {
        return by_code;
    }

    let lower = message.to_ascii_lowercase();
    let table: [(&str, &'static str); 6] = [
        ("invalid login credentials", "Invalid email or password."),
        ("email not confirmed", "Please confirm your email address before signing in."),
        ("user already registered", "An account with this email already exists."),
        ("password should be at least", "Password is too weak. Use at least 8 characters."),
        ("unable to validate email address", "Please enter a valid email address."),
        ("rate limit", "Too many attempts. Please wait a moment and try again."),
    ];
    if let Some((_, friendly)) = table.iter().find(|(needle, _)| lower.contains(needle)) {
        return Some(*friendly);
    }
    if status == 429 {
        return Some("Too many attempts. Please wait a moment and try again.");
    }
    None
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    if EMAIL.is_match(email.trim()) {
        Ok(())
    } else {
        Err(AuthError::Validation("Please enter a valid email address.".to_string()))
    }
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    if password != confirm {
        return Err(AuthError::Validation("Passwords do not match.".to_string()));
    }
    Ok(())
}

fn sanitized(err: BackendError) -> AuthError {
    AuthError::Backend(sanitize_auth_error(&err))
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn load(&self) -> Option<Session> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    pub fn clear(&self) {
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(self.verifier_path());
    }

    fn verifier_path(&self) -> PathBuf {
        self.path.with_extension("verifier")
    }

    fn save_verifier(&self, verifier: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(self.verifier_path(), verifier)?;
        Ok(())
    }

    fn take_verifier(&self) -> Option<String> {
        let path = self.verifier_path();
        let verifier = std::fs::read_to_string(&path).ok()?;
        let _ = std::fs::remove_file(&path);
        Some(verifier.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationSent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OAuthStart {
    pub authorize_url: Url,
    pub next: String,
}

pub struct AuthClient<A: AuthApi> {
    api: A,
    sessions: SessionStore,
    site_url: Url,
}

impl<A: AuthApi> AuthClient<A> {
    pub fn new(api: A, sessions: SessionStore, site_url: Url) -> Self {
        Self {
            api,
            sessions,
            site_url,
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.sessions.load()
    }

    // an offline refresh keeps the expired session, a refused one signs out
    pub fn active_session(&self) -> Option<Session> {
        self.active_session_at(Utc::now().timestamp())
    }

    fn active_session_at(&self, now: i64) -> Option<Session> {
        let session = self.sessions.load()?;
        match session.expires_at {
            Some(expires_at) if expires_at <= now + EXPIRY_MARGIN_SECS => {}
            _ => return Some(session),
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            info!("session expired, signing out");
            self.sessions.clear();
            return None;
        };
        match self.api.refresh_session(refresh_token).into_result() {
            Ok(refreshed) => {
                if let Err(e) = self.sessions.save(&refreshed) {
                    warn!(error = %e, "failed to store refreshed session");
                }
                debug!(user = %refreshed.user.id, "session refreshed");
                Some(refreshed)
            }
            Err(err) if err.is_offline() || err == BackendError::NotConfigured => {
                debug!(error = %err, "can't refresh now, keeping expired session");
                Some(session)
            }
            Err(err) => {
                info!(error = %err, "session refresh rejected, signing out");
                self.sessions.clear();
                None
            }
        }
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(AuthError::Validation("Please enter your password.".to_string()));
        }
        let session = self
            .api
            .sign_in_with_password(email.trim(), password)
            .into_result()
            .map_err(sanitized)?;
        self.persist(&session)?;
        info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpOutcome, AuthError> {
        validate_email(email)?;
        validate_new_password(password, confirm)?;
        let session = self
            .api
            .sign_up(email.trim(), password, full_name)
            .into_result()
            .map_err(sanitized)?;
        match session {
            Some(session) => {
                self.persist(&session)?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            None => Ok(SignUpOutcome::ConfirmationSent),
        }
    }

    pub fn sign_in_with_oauth(&self, provider: &str, next: Option<&str>) -> Result<OAuthStart, AuthError> {
        let next = validate_redirect_url(next.unwrap_or(DEFAULT_REDIRECT));
        if !OAUTH_PROVIDERS.contains(&provider) {
            return Err(AuthError::Validation(format!(
                "Unsupported sign-in provider '{}'.",
                provider
            )));
        }

        let mut callback = self.site_url.join(CALLBACK_PATH).map_err(|_| {
            AuthError::Backend(GENERIC_AUTH_ERROR.to_string())
        })?;
        callback.query_pairs_mut().append_pair("next", &next);

        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.sessions
            .save_verifier(&verifier)
            .map_err(|_| AuthError::Backend(GENERIC_AUTH_ERROR.to_string()))?;

        let authorize_url = self
            .api
            .authorize_url(provider, callback.as_str(), &verifier)
            .into_result()
            .map_err(sanitized)?;
        Ok(OAuthStart { authorize_url, next })
    }

    pub fn complete_oauth(&self, params: &CallbackParams) -> String {
        let verifier = self.sessions.take_verifier();
        handle_oauth_callback(params, |code| {
            let verifier = verifier.as_deref().ok_or(BackendError::Unauthenticated)?;
            let session = self.api.exchange_code(code, verifier).into_result()?;
            self.sessions
                .save(&session)
                .map_err(|e| BackendError::Decode(e.to_string()))?;
            Ok(session)
        })
    }

    pub fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.sessions.load();
        self.sessions.clear();
        if let Some(session) = session {
            let result = self.api.sign_out(&session.access_token);
            if let Some(err) = result.error {
                warn!(error = %err, "remote sign-out failed, local session cleared");
            }
        }
        Ok(())
    }

    // any well-formed address succeeds so responses don't reveal which emails have accounts
    pub fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        let redirect_to = self
            .site_url
            .join(RESET_PATH)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.site_url.to_string());
        let result = self.api.send_password_reset(email.trim(), &redirect_to);
        if let Some(err) = result.error {
            debug!(error = %err, "password reset request failed");
        }
        Ok(())
    }

    pub fn update_password(&self, password: &str, confirm: &str) -> Result<(), AuthError> {
        validate_new_password(password, confirm)?;
        let session = self.require_session()?;
        let attributes = UserAttributes {
            password: Some(password.to_string()),
            data: None,
        };
        self.api
            .update_user(&session.access_token, &attributes)
            .into_result()
            .map_err(sanitized)?;
        Ok(())
    }

    pub fn update_profile(&self, full_name: &str) -> Result<AuthUser, AuthError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AuthError::Validation("Name must not be empty.".to_string()));
        }
        let session = self.require_session()?;
        let attributes = UserAttributes {
            password: None,
            data: Some(serde_json::json!({ "full_name": full_name })),
        };
        self.api
            .update_user(&session.access_token, &attributes)
            .into_result()
            .map_err(sanitized)
    }

    fn require_session(&self) -> Result<Session, AuthError> {
        self.sessions
            .load()
            .ok_or_else(|| sanitized(BackendError::Unauthenticated))
    }

    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        self.sessions.save(session).map_err(|e| {
            warn!(error = %e, "failed to store session");
            AuthError::Backend(GENERIC_AUTH_ERROR.to_string())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub next: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn parse(input: &str) -> Self {
        let query = match Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) => match input.split_once('?') {
                Some((_, query)) => query.to_string(),
                None => input.to_string(),
            },
        };
        let mut params = CallbackParams::default();
        let mut url = Url::parse("http://localhost/").expect("static url");
        url.set_query(Some(&query));
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "next" => params.next = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}

pub fn handle_oauth_callback<F>(params: &CallbackParams, exchange: F) -> String
where
    F: FnOnce(&str) -> Result<Session, BackendError>,
{
    if let Some(error) = params.error.as_deref() {
        warn!(error = %error, "oauth provider returned an error");
        return error_redirect(error, params.error_description.as_deref());
    }

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return error_redirect("missing_code", None);
    };

    let next = validate_redirect_url(params.next.as_deref().unwrap_or(DEFAULT_REDIRECT));
    match exchange(code) {
        Ok(session) => {
            info!(user = %session.user.id, "oauth sign-in complete");
            next
        }
        Err(err) => {
            debug!(error = %err, "code exchange failed");
            error_redirect("exchange_failed", None)
        }
    }
}

fn error_redirect(code: &str, description: Option<&str>) -> String {
    let mut url = Url::parse("http://localhost/").expect("static url");
    url.set_path(ERROR_PATH);
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("error", code);
        if let Some(description) = description.filter(|d| !d.is_empty()) {
            pairs.append_pair("error_description", description);
        }
    }
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct OAuthErrorInfo {
    pub title: &'static str,
    pub message: &'static str,
}

const OAUTH_ERRORS: [(&str, OAuthErrorInfo); 7] = [
    (
        "access_denied",
        OAuthErrorInfo {
            title: "Access denied",
            message: "You cancelled the sign-in or didn't grant the requested permissions.",
        },
    ),
    (
        "server_error",
        OAuthErrorInfo {
            title: "Provider error",
            message: "The sign-in provider ran into a problem. Please try again.",
        },
    ),
    (
        "temporarily_unavailable",
        OAuthErrorInfo {
            title: "Temporarily unavailable",
            message: "The sign-in provider is temporarily unavailable. Please try again shortly.",
        },
    ),
    (
        "invalid_request",
        OAuthErrorInfo {
            title: "Invalid request",
            message: "The sign-in request was malformed. Please start again.",
        },
    ),
    (
        "unauthorized_client",
        OAuthErrorInfo {
            title: "Sign-in not allowed",
            message: "This sign-in method isn't enabled for the app.",
        },
    ),
    (
        "missing_code",
        OAuthErrorInfo {
            title: "Sign-in incomplete",
            message: "No authorization code was received. Please try signing in again.",
        },
    ),
    (
        "exchange_failed",
        OAuthErrorInfo {
            title: "Sign-in failed",
            message: "We couldn't complete sign-in. The link may have expired; please try again.",
        },
    ),
];

const DEFAULT_OAUTH_ERROR: OAuthErrorInfo = OAuthErrorInfo {
    title: "Authentication error",
    message: "An unexpected error occurred during sign-in. Please try again.",
};

pub fn oauth_error_message(code: &str) -> OAuthErrorInfo {
    OAUTH_ERRORS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, info)| info.clone())
        .unwrap_or(DEFAULT_OAUTH_ERROR)
}
