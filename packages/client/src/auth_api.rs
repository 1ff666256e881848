//! HTTP calls to the identity API.

use reqwest::StatusCode;
use tandem_server::infrastructure::dto::http::{
    ErrorResponse, LoginRequest, LoginResponse, RegisterRequest, UserDto,
};

use crate::error::ClientError;

/// Thin client for `/api/auth/*`
#[derive(Debug, Clone)]
pub struct AuthApi {
    base_url: String,
    http: reqwest::Client,
}

impl AuthApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserDto, ClientError> {
        let response = self
            .http
            .post(self.url("/api/auth/register"))
            .json(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                display_name: display_name.to_string(),
                role: None,
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: Option<&str>,
    ) -> Result<LoginResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
                device: device.map(str::to_string),
            })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("/api/auth/logout"))
            .bearer_auth(token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Turn an error status into [`ClientError::Api`]
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.json::<ErrorResponse>().await.ok();
    Err(ClientError::Api {
        status: status.as_u16(),
        message: body.as_ref().map_or_else(
            || status.canonical_reason().unwrap_or("error").to_string(),
            |b| b.error.clone(),
        ),
        retry_after_ms: body.and_then(|b| b.retry_after_ms),
    })
}

/// Milliseconds left in an account lockout, if `error` is one
pub fn is_locked_out(error: &ClientError) -> Option<u64> {
    match error {
        ClientError::Api {
            status,
            retry_after_ms,
            ..
        } if *status == StatusCode::LOCKED.as_u16() => *retry_after_ms,
        _ => None,
    }
}
