use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{AuthApi, AuthUser, Session, UserAttributes};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::models::{Activity, Job, Note, UserProfile};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub data: Option<T>,
    pub error: Option<BackendError>,
}

impl<T> QueryResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: BackendError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, BackendError> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(BackendError::Decode("empty response".to_string())),
        }
    }
}

impl<T> From<Result<T, BackendError>> for QueryResult<T> {
    fn from(result: Result<T, BackendError>) -> Self {
        match result {
            Ok(data) => QueryResult::ok(data),
            Err(error) => QueryResult::err(error),
        }
    }
}

pub trait Backend {
    fn fetch_jobs(&self) -> QueryResult<Vec<Job>>;
    fn fetch_job(&self, id: Uuid) -> QueryResult<Option<Job>>;
    fn create_job(&self, job: &Job) -> QueryResult<Job>;
    fn update_job(&self, job: &Job) -> QueryResult<Job>;
    fn delete_job(&self, id: Uuid) -> QueryResult<()>;
    // stands in for a live subscription
    fn fetch_jobs_since(&self, since: DateTime<Utc>) -> QueryResult<Vec<Job>>;

    fn fetch_profile(&self) -> QueryResult<Option<UserProfile>>;
    fn upsert_profile(&self, profile: &UserProfile) -> QueryResult<UserProfile>;

    fn fetch_notes(&self, job_id: Option<Uuid>) -> QueryResult<Vec<Note>>;
    fn create_note(&self, note: &Note) -> QueryResult<Note>;
    fn update_note(&self, note: &Note) -> QueryResult<Note>;
    fn delete_note(&self, id: Uuid) -> QueryResult<()>;

    fn log_activity(&self, activity: &Activity) -> QueryResult<()>;
    fn fetch_activities(&self, limit: usize) -> QueryResult<Vec<Activity>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderBackend;

impl Backend for PlaceholderBackend {
    fn fetch_jobs(&self) -> QueryResult<Vec<Job>> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn fetch_job(&self, _id: Uuid) -> QueryResult<Option<Job>> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn create_job(&self, _job: &Job) -> QueryResult<Job> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn update_job(&self, _job: &Job) -> QueryResult<Job> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn delete_job(&self, _id: Uuid) -> QueryResult<()> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn fetch_jobs_since(&self, _since: DateTime<Utc>) -> QueryResult<Vec<Job>> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn fetch_profile(&self) -> QueryResult<Option<UserProfile>> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn upsert_profile(&self, _profile: &UserProfile) -> QueryResult<UserProfile> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn fetch_notes(&self, _job_id: Option<Uuid>) -> QueryResult<Vec<Note>> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn create_note(&self, _note: &Note) -> QueryResult<Note> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn update_note(&self, _note: &Note) -> QueryResult<Note> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn delete_note(&self, _id: Uuid) -> QueryResult<()> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn log_activity(&self, _activity: &Activity) -> QueryResult<()> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn fetch_activities(&self, _limit: usize) -> QueryResult<Vec<Activity>> {
        QueryResult::err(BackendError::NotConfigured)
    }
}

impl AuthApi for PlaceholderBackend {
    fn sign_in_with_password(&self, _email: &str, _password: &str) -> QueryResult<Session> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn sign_up(&self, _email: &str, _password: &str, _full_name: Option<&str>) -> QueryResult<Option<Session>> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn sign_out(&self, _access_token: &str) -> QueryResult<()> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn send_password_reset(&self, _email: &str, _redirect_to: &str) -> QueryResult<()> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn update_user(&self, _access_token: &str, _attributes: &UserAttributes) -> QueryResult<AuthUser> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn authorize_url(&self, _provider: &str, _redirect_to: &str, _code_challenge: &str) -> QueryResult<Url> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn exchange_code(&self, _code: &str, _code_verifier: &str) -> QueryResult<Session> {
        QueryResult::err(BackendError::NotConfigured)
    }
    fn refresh_session(&self, _refresh_token: &str) -> QueryResult<Session> {
        QueryResult::err(BackendError::NotConfigured)
    }
}

#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: Url,
    api_key: String,
    access_token: Option<String>,
    client: Client,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(BackendError::from)?;
        Ok(Self {
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
            access_token: None,
            client,
        })
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Decode(format!("bad endpoint {}: {}", path, e)))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let url = self.endpoint(path)?;
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer))
    }

    fn table(&self, method: reqwest::Method, table: &str) -> Result<RequestBuilder, BackendError> {
        self.request(method, &format!("rest/v1/{}", table))
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = check_status(request.send()?)?;
        response.json::<T>().map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn send_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        check_status(request.send()?)?;
        Ok(())
    }

    fn send_returning<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let mut rows: Vec<T> = self.send_json(request.header("Prefer", "return=representation"))?;
        if rows.is_empty() {
            return Err(BackendError::Decode("write returned no rows".to_string()));
        }
        Ok(rows.remove(0))
    }

    fn insert<B: Serialize, T: DeserializeOwned>(&self, table: &str, body: &B) -> Result<T, BackendError> {
        self.send_returning(self.table(reqwest::Method::POST, table)?.json(body))
    }

    fn upsert<B: Serialize, T: DeserializeOwned>(&self, table: &str, body: &B, on_conflict: &str) -> Result<T, BackendError> {
        let request = self
            .table(reqwest::Method::POST, table)?
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates")
            .json(body);
        self.send_returning(request)
    }

    fn patch_by_id<B: Serialize, T: DeserializeOwned>(&self, table: &str, id: Uuid, body: &B) -> Result<T, BackendError> {
        let request = self
            .table(reqwest::Method::PATCH, table)?
            .query(&[("id", format!("eq.{}", id))])
            .json(body);
        self.send_returning(request)
    }

    fn delete_by_id(&self, table: &str, id: Uuid) -> Result<(), BackendError> {
        let request = self
            .table(reqwest::Method::DELETE, table)?
            .query(&[("id", format!("eq.{}", id))]);
        self.send_empty(request)
    }
}

fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        debug!(body = %response.text().unwrap_or_default(), "backend rejected credentials");
        return Err(BackendError::Unauthenticated);
    }
    let body = response.text().unwrap_or_default();
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| parsed.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };
    let message = pick(&["message", "msg", "error_description", "error"])
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    let code = pick(&["code", "error_code", "error"]);
    warn!(status = status.as_u16(), code = ?code, "backend request failed");
    debug!(body = %body, "backend error body");
    Err(BackendError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn timestamp_filter(since: DateTime<Utc>) -> String {
    format!("gt.{}", since.to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl Backend for RestBackend {
    fn fetch_jobs(&self) -> QueryResult<Vec<Job>> {
        let result: Result<Vec<Job>, BackendError> = self.table(reqwest::Method::GET, "jobs").and_then(|r| {
            self.send_json(r.query(&[("select", "*"), ("order", "created_at.desc")]))
        });
        result.into()
    }

    fn fetch_job(&self, id: Uuid) -> QueryResult<Option<Job>> {
        let result: Result<Option<Job>, BackendError> = self.table(reqwest::Method::GET, "jobs").and_then(|r| {
            let rows: Vec<Job> = self.send_json(r.query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{}", id)),
            ]))?;
            Ok(rows.into_iter().next())
        });
        result.into()
    }

    fn create_job(&self, job: &Job) -> QueryResult<Job> {
        self.insert::<_, Job>("jobs", job).into()
    }

    fn update_job(&self, job: &Job) -> QueryResult<Job> {
        self.patch_by_id::<_, Job>("jobs", job.id, job).into()
    }

    fn delete_job(&self, id: Uuid) -> QueryResult<()> {
        self.delete_by_id("jobs", id).into()
    }

    fn fetch_jobs_since(&self, since: DateTime<Utc>) -> QueryResult<Vec<Job>> {
        let result: Result<Vec<Job>, BackendError> = self.table(reqwest::Method::GET, "jobs").and_then(|r| {
            self.send_json(r.query(&[
                ("select", "*".to_string()),
                ("updated_at", timestamp_filter(since)),
                ("order", "updated_at.asc".to_string()),
            ]))
        });
        result.into()
    }

    fn fetch_profile(&self) -> QueryResult<Option<UserProfile>> {
        let result: Result<Option<UserProfile>, BackendError> = self.table(reqwest::Method::GET, "profiles").and_then(|r| {
            let rows: Vec<UserProfile> = self.send_json(r.query(&[("select", "*"), ("limit", "1")]))?;
            Ok(rows.into_iter().next())
        });
        result.into()
    }

    fn upsert_profile(&self, profile: &UserProfile) -> QueryResult<UserProfile> {
        self.upsert::<_, UserProfile>("profiles", profile, "user_id").into()
    }

    fn fetch_notes(&self, job_id: Option<Uuid>) -> QueryResult<Vec<Note>> {
        let result: Result<Vec<Note>, BackendError> = self.table(reqwest::Method::GET, "notes").and_then(|r| {
            let mut query = vec![
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
            ];
            if let Some(id) = job_id {
                query.push(("job_id", format!("eq.{}", id)));
            }
            self.send_json(r.query(&query))
        });
        result.into()
    }

    fn create_note(&self, note: &Note) -> QueryResult<Note> {
        self.upsert::<_, Note>("notes", note, "id").into()
    }

    fn update_note(&self, note: &Note) -> QueryResult<Note> {
        self.patch_by_id::<_, Note>("notes", note.id, note).into()
    }

    fn delete_note(&self, id: Uuid) -> QueryResult<()> {
        self.delete_by_id("notes", id).into()
    }

    fn log_activity(&self, activity: &Activity) -> QueryResult<()> {
        let result: Result<(), BackendError> = self
            .table(reqwest::Method::POST, "activities")
            .and_then(|r| self.send_empty(r.json(activity)));
        result.into()
    }

    fn fetch_activities(&self, limit: usize) -> QueryResult<Vec<Activity>> {
        let result: Result<Vec<Activity>, BackendError> = self.table(reqwest::Method::GET, "activities").and_then(|r| {
            self.send_json(r.query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ]))
        });
        result.into()
    }
}

impl AuthApi for RestBackend {
    fn sign_in_with_password(&self, email: &str, password: &str) -> QueryResult<Session> {
        let result: Result<Session, BackendError> = self.request(reqwest::Method::POST, "auth/v1/token").and_then(|r| {
            self.send_json(
                r.query(&[("grant_type", "password")])
                    .json(&json!({ "email": email, "password": password })),
            )
        });
        result.into()
    }

    fn sign_up(&self, email: &str, password: &str, full_name: Option<&str>) -> QueryResult<Option<Session>> {
        let result: Result<Option<Session>, BackendError> = self.request(reqwest::Method::POST, "auth/v1/signup").and_then(|r| {
            let body: Value = self.send_json(r.json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            })))?;
            // No session comes back while the address awaits confirmation.
            if body.get("access_token").is_some() {
                serde_json::from_value::<Session>(body)
                    .map(Some)
                    .map_err(|e| BackendError::Decode(e.to_string()))
            } else {
                Ok(None)
            }
        });
        result.into()
    }

    fn sign_out(&self, access_token: &str) -> QueryResult<()> {
        let result: Result<(), BackendError> = self
            .request(reqwest::Method::POST, "auth/v1/logout")
            .and_then(|r| self.send_empty(r.bearer_auth(access_token)));
        result.into()
    }

    fn send_password_reset(&self, email: &str, redirect_to: &str) -> QueryResult<()> {
        let result: Result<(), BackendError> = self.request(reqwest::Method::POST, "auth/v1/recover").and_then(|r| {
            self.send_empty(
                r.query(&[("redirect_to", redirect_to)])
                    .json(&json!({ "email": email })),
            )
        });
        result.into()
    }

    fn update_user(&self, access_token: &str, attributes: &UserAttributes) -> QueryResult<AuthUser> {
        let result: Result<AuthUser, BackendError> = self
            .request(reqwest::Method::PUT, "auth/v1/user")
            .and_then(|r| self.send_json(r.bearer_auth(access_token).json(attributes)));
        result.into()
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> QueryResult<Url> {
        let result: Result<Url, BackendError> = self.endpoint("auth/v1/authorize").map(|mut url| {
            url.query_pairs_mut()
                .append_pair("provider", provider)
                .append_pair("redirect_to", redirect_to)
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "plain");
            url
        });
        result.into()
    }

    fn exchange_code(&self, code: &str, code_verifier: &str) -> QueryResult<Session> {
        let result: Result<Session, BackendError> = self.request(reqwest::Method::POST, "auth/v1/token").and_then(|r| {
            self.send_json(
                r.query(&[("grant_type", "pkce")])
                    .json(&json!({ "auth_code": code, "code_verifier": code_verifier })),
            )
        });
        result.into()
    }

    fn refresh_session(&self, refresh_token: &str) -> QueryResult<Session> {
        let result: Result<Session, BackendError> = self.request(reqwest::Method::POST, "auth/v1/token").and_then(|r| {
            self.send_json(
                r.query(&[("grant_type", "refresh_token")])
                    .json(&json!({ "refresh_token": refresh_token })),
            )
        });
        result.into()
    }
}
