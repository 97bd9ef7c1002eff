// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cloud Pak for Data credentials.
//!
//! These credentials obtain a bearer token from a Cloud Pak for Data
//! deployment, using either a username and password or a username and API
//! key. The token is a JWT, its `iat` and `exp` claims determine when the
//! token is refreshed.

use crate::build_errors::{Error as BuilderError, check_property};
use crate::credentials::{AUTH_TYPE_CP4D, BuildResult, Credentials, CredentialsProvider, Result};
use crate::errors;
use crate::headers_util::build_bearer_headers;
use crate::http;
use crate::token::{Token, TokenProvider, instant_from_unix};
use crate::token_cache::TokenCache;
use ::http::HeaderMap;
use ::http::header::ACCEPT;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

const VALIDATE_AUTH_PATH: &str = "/v1/preauth/validateAuth";
const AUTHORIZE_PATH: &str = "/v1/authorize";

/// A builder for Cloud Pak for Data credentials.
///
/// Exactly one of [with_password][Builder::with_password] or
/// [with_api_key][Builder::with_api_key] must be called.
///
/// # Example
/// ```
/// # use ibm_cloud_auth::credentials::cp4d::Builder;
/// let credentials = Builder::new("https://cp4d.example.com", "my-user")
///     .with_api_key("my-api-key")
///     .build()?;
/// assert_eq!(credentials.auth_type(), "cp4d");
/// # Ok::<(), ibm_cloud_auth::errors::BuildError>(())
/// ```
#[derive(Debug)]
pub struct Builder {
    url: String,
    username: String,
    password: Option<String>,
    apikey: Option<String>,
    headers: HeaderMap,
    disable_ssl_verification: bool,
}

impl Builder {
    /// Creates a new builder for the deployment at `url`.
    pub fn new<S, T>(url: S, username: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            url: url.into(),
            username: username.into(),
            password: None,
            apikey: None,
            headers: HeaderMap::new(),
            disable_ssl_verification: false,
        }
    }

    /// Authenticates with a password.
    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Authenticates with an API key.
    pub fn with_api_key<S: Into<String>>(mut self, apikey: S) -> Self {
        self.apikey = Some(apikey.into());
        self
    }

    /// Adds headers to each token request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Skips the verification of the server certificate.
    pub fn with_disable_ssl_verification(mut self, v: bool) -> Self {
        self.disable_ssl_verification = v;
        self
    }

    fn build_token_provider(self) -> BuildResult<Cp4dTokenProvider> {
        check_property("url", &self.url)?;
        check_property("username", &self.username)?;
        let secret = match (self.password, self.apikey) {
            (Some(password), None) => {
                check_property("password", &password)?;
                Secret::Password(password)
            }
            (None, Some(apikey)) => {
                check_property("apikey", &apikey)?;
                Secret::ApiKey(apikey)
            }
            (None, None) => return Err(BuilderError::missing_field("password")),
            (Some(_), Some(_)) => {
                return Err(BuilderError::invalid_property(
                    "exactly one of password or apikey must be set",
                ));
            }
        };

        let base = self.url.trim_end_matches('/').to_string();
        url::Url::parse(&base).map_err(|e| {
            BuilderError::invalid_property(format!("invalid CP4D url {:?}: {e}", self.url))
        })?;

        Ok(Cp4dTokenProvider {
            http_client: http::client(self.disable_ssl_verification)?,
            base,
            username: self.username,
            secret,
            headers: self.headers,
        })
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns a [BuildError][crate::errors::BuildError] if the URL or username
    /// are missing or invalid, or unless exactly one of the password and the
    /// API key is set.
    pub fn build(self) -> BuildResult<Credentials> {
        Ok(Credentials::from(Cp4dCredentials {
            token_provider: TokenCache::new(self.build_token_provider()?),
        }))
    }
}

enum Secret {
    Password(String),
    ApiKey(String),
}

struct Cp4dTokenProvider {
    http_client: reqwest::Client,
    base: String,
    username: String,
    secret: Secret,
    headers: HeaderMap,
}

impl std::fmt::Debug for Cp4dTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = match self.secret {
            Secret::Password(_) => "password [censored]",
            Secret::ApiKey(_) => "apikey [censored]",
        };
        f.debug_struct("Cp4dTokenProvider")
            .field("base", &self.base)
            .field("username", &self.username)
            .field("secret", &secret)
            .field("headers", &self.headers)
            .finish()
    }
}

#[derive(Deserialize)]
struct ValidateAuthResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    username: &'a str,
    api_key: &'a str,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    token: String,
}

#[derive(Deserialize)]
struct Claims {
    iat: Option<i64>,
    exp: i64,
}

#[async_trait::async_trait]
impl TokenProvider for Cp4dTokenProvider {
    async fn token(&self) -> Result<Token> {
        let raw = match &self.secret {
            Secret::Password(password) => {
                let builder = self
                    .http_client
                    .get(format!("{}{VALIDATE_AUTH_PATH}", self.base))
                    .headers(self.headers.clone())
                    .header(ACCEPT, "application/json")
                    .basic_auth(&self.username, Some(password));
                http::execute::<ValidateAuthResponse>(builder)
                    .await?
                    .access_token
            }
            Secret::ApiKey(apikey) => {
                let builder = self
                    .http_client
                    .post(format!("{}{AUTHORIZE_PATH}", self.base))
                    .headers(self.headers.clone())
                    .header(ACCEPT, "application/json")
                    .json(&AuthorizeRequest {
                        username: &self.username,
                        api_key: apikey,
                    });
                http::execute::<AuthorizeResponse>(builder).await?.token
            }
        };
        jwt_token(raw, Instant::now())
    }
}

/// Creates a token from a JWT, using its claims to set the expiration and
/// refresh times.
///
/// The signature is not verified, the token is only forwarded to the
/// service.
fn jwt_token(raw: String, now: Instant) -> Result<Token> {
    let segments: Vec<&str> = raw.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(errors::non_retryable_from_str("the access token is not a JWT"));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(errors::non_retryable)?;
    let claims: Claims = http::parse_json(&bytes)?;

    let expires_at = instant_from_unix(now, claims.exp);
    let refresh_at = match claims.iat {
        // Same arithmetic as `refresh_time`, done on the wall clock values.
        Some(iat) => {
            let lifetime = claims.exp.saturating_sub(iat).max(0);
            instant_from_unix(now, claims.exp.saturating_sub(lifetime / 5))
        }
        None => expires_at,
    };
    Ok(Token {
        token: raw,
        token_type: "Bearer".to_string(),
        expires_at: Some(expires_at),
        refresh_at: Some(refresh_at),
        metadata: None,
    })
}

#[derive(Debug)]
struct Cp4dCredentials<T>
where
    T: TokenProvider,
{
    token_provider: T,
}

impl<T> CredentialsProvider for Cp4dCredentials<T>
where
    T: TokenProvider,
{
    async fn token(&self) -> Result<Token> {
        self.token_provider.token().await
    }

    async fn headers(&self) -> Result<HeaderMap> {
        let token = self.token_provider.token().await?;
        build_bearer_headers(&token)
    }

    fn auth_type(&self) -> &'static str {
        AUTH_TYPE_CP4D
    }
}
