//! HTTP implementation of the BaaS traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use rural_grow_core::{Email, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use super::{
    AccessToken, AuthApi, AuthSession, BaasError, DataApi, FunctionsApi, Identity, Query, SignUp,
    StorageApi, function_error,
};
use crate::config::BaasConfig;

/// Per-request timeout for every BaaS call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// BaaS client speaking the auth, `PostgREST`, functions and storage APIs.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct BaasClient {
    client: reqwest::Client,
    base: Url,
    api_key: SecretString,
}

impl std::fmt::Debug for BaasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaasClient")
            .field("base", &self.base.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Token endpoint response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserResponse,
}

/// Auth user object.
#[derive(Deserialize)]
struct UserResponse {
    id: UserId,
    email: Email,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        Self {
            access_token: AccessToken::new(token.access_token),
            refresh_token: SecretString::from(token.refresh_token),
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
            user: token.user.into(),
        }
    }
}

/// Error body shapes used across the BaaS APIs.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

impl BaasClient {
    /// Create a new BaaS client.
    ///
    /// # Errors
    ///
    /// Returns `BaasError::Config` if the API key is not a valid header value,
    /// or `BaasError::Http` if the HTTP client fails to build.
    pub fn new(config: &BaasConfig) -> Result<Self, BaasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| BaasError::Config(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        // Url::join drops the last path segment unless the base ends in '/'
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str, pairs: &[(String, String)]) -> Result<Url, BaasError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| BaasError::Config(format!("invalid endpoint {path}: {e}")))?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs.iter());
        }
        Ok(url)
    }

    fn bearer(&self, token: Option<&AccessToken>) -> String {
        let raw = token.map_or_else(|| self.api_key.expose_secret(), AccessToken::expose);
        format!("Bearer {raw}")
    }

    fn request(&self, method: Method, url: Url, token: Option<&AccessToken>) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", self.bearer(token))
    }

    /// Turn a non-2xx response into `BaasError::Api`.
    async fn check(response: Response) -> Result<Response, BaasError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

        let code = body.error_code.or_else(|| {
            body.code.map(|c| match c {
                Value::String(s) => s,
                other => other.to_string(),
            })
        });
        let message = body
            .message
            .or(body.msg)
            .or(body.error_description)
            .or_else(|| body.error.map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_owned)))
            .unwrap_or(text);

        Err(BaasError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    /// Decode a JSON body, treating an empty body as `null`.
    async fn json_or_null(response: Response) -> Result<Value, BaasError> {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<AuthSession, BaasError> {
        let url = self.url(
            "auth/v1/token",
            &[("grant_type".to_owned(), grant_type.to_owned())],
        )?;
        let response = self.request(Method::POST, url, None).json(&body).send().await?;

        match Self::check(response).await {
            Ok(response) => Ok(response.json::<TokenResponse>().await?.into()),
            // The auth service answers bad passwords and dead refresh tokens with 400
            Err(BaasError::Api { status: 400, .. }) => Err(BaasError::InvalidCredentials),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AuthApi for BaasClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BaasError> {
        self.token_grant(
            "password",
            serde_json::json!({
                "email": email.as_str(),
                "password": password.expose_secret(),
            }),
        )
        .await
    }

    #[instrument(skip(self, password, metadata), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: Value,
    ) -> Result<SignUp, BaasError> {
        let url = self.url("auth/v1/signup", &[])?;
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "data": metadata,
        });
        let response = self.request(Method::POST, url, None).json(&body).send().await?;
        let body = Self::json_or_null(Self::check(response).await?).await?;

        // With email confirmation enabled the response is the bare user object
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            let session = AuthSession::from(token);
            Ok(SignUp {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user = body.get("user").cloned().unwrap_or(body);
            let user: UserResponse = serde_json::from_value(user)?;
            Ok(SignUp {
                user: user.into(),
                session: None,
            })
        }
    }

    #[instrument(skip_all)]
    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, BaasError> {
        match self
            .token_grant(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token.expose_secret() }),
            )
            .await
        {
            Err(BaasError::InvalidCredentials) => Err(BaasError::SessionExpired),
            other => other,
        }
    }

    #[instrument(skip_all)]
    async fn get_user(&self, token: &AccessToken) -> Result<Identity, BaasError> {
        let url = self.url("auth/v1/user", &[])?;
        let response = self.request(Method::GET, url, Some(token)).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(BaasError::SessionExpired);
        }
        let user: UserResponse = Self::check(response).await?.json().await?;
        Ok(user.into())
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, token: &AccessToken) -> Result<(), BaasError> {
        let url = self.url("auth/v1/logout", &[])?;
        let response = self.request(Method::POST, url, Some(token)).send().await?;
        // An already-expired token means the session is gone either way
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DataApi for BaasClient {
    #[instrument(skip(self, query, token), fields(table = query.table_name()))]
    async fn select(
        &self,
        query: &Query,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError> {
        let url = self.url(&format!("rest/v1/{}", query.table_name()), &query.to_pairs(true))?;
        let response = self.request(Method::GET, url, token).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, rows, token), fields(rows = rows.len()))]
    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError> {
        let url = self.url(&format!("rest/v1/{table}"), &[])?;
        let response = self
            .request(Method::POST, url, token)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, query, patch, token), fields(table = query.table_name()))]
    async fn update(
        &self,
        query: &Query,
        patch: Value,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Value>, BaasError> {
        let url = self.url(&format!("rest/v1/{}", query.table_name()), &query.to_pairs(false))?;
        let response = self
            .request(Method::PATCH, url, token)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    #[instrument(skip(self, query, token), fields(table = query.table_name()))]
    async fn delete(&self, query: &Query, token: Option<&AccessToken>) -> Result<(), BaasError> {
        let url = self.url(&format!("rest/v1/{}", query.table_name()), &query.to_pairs(false))?;
        let response = self.request(Method::DELETE, url, token).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, args, token))]
    async fn rpc(
        &self,
        function: &str,
        args: Value,
        token: Option<&AccessToken>,
    ) -> Result<Value, BaasError> {
        let url = self.url(&format!("rest/v1/rpc/{function}"), &[])?;
        let response = self.request(Method::POST, url, token).json(&args).send().await?;
        Self::json_or_null(Self::check(response).await?).await
    }
}

#[async_trait]
impl FunctionsApi for BaasClient {
    #[instrument(skip(self, body, token))]
    async fn invoke(
        &self,
        name: &str,
        body: Value,
        token: Option<&AccessToken>,
    ) -> Result<Value, BaasError> {
        let url = self.url(&format!("functions/v1/{name}"), &[])?;
        let response = self.request(Method::POST, url, token).json(&body).send().await?;
        let status = response.status().as_u16();
        let body = Self::json_or_null(Self::check(response).await?).await?;

        if let Some(message) = function_error(&body) {
            return Err(BaasError::Api {
                status,
                code: None,
                message,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl StorageApi for BaasClient {
    #[instrument(skip(self, bytes, token), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        token: Option<&AccessToken>,
    ) -> Result<(), BaasError> {
        let url = self.url(&format!("storage/v1/object/{bucket}/{path}"), &[])?;
        let response = self
            .request(Method::POST, url, token)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}storage/v1/object/public/{bucket}/{path}", self.base)
    }
}
