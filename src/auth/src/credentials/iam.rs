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

//! [IAM] API key credentials.
//!
//! These credentials exchange an API key for an IAM access token. The token
//! is cached, and refreshed in the background shortly before it expires.
//!
//! # Example
//! ```
//! # use ibm_cloud_auth::credentials::iam::Builder;
//! let credentials = Builder::new("my-api-key")
//!     .with_url("https://iam.test.cloud.ibm.com")
//!     .build()?;
//! assert_eq!(credentials.auth_type(), "iam");
//! # Ok::<(), ibm_cloud_auth::errors::BuildError>(())
//! ```
//!
//! [IAM]: https://cloud.ibm.com/docs/account?topic=account-iamoverview

use crate::build_errors::{Error as BuilderError, check_property};
use crate::credentials::{AUTH_TYPE_IAM, BuildResult, Credentials, CredentialsProvider, Result};
use crate::errors;
use crate::headers_util::build_bearer_headers;
use crate::http;
use crate::token::{Token, TokenProvider, instant_after, instant_from_unix};
use crate::token_cache::TokenCache;
use ::http::HeaderMap;
use ::http::header::ACCEPT;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_URL: &str = "https://iam.cloud.ibm.com";
const OPERATION_PATH: &str = "/identity/token";
const GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
const RESPONSE_TYPE: &str = "cloud_iam";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// A builder for IAM credentials.
#[derive(Debug)]
pub struct Builder {
    apikey: String,
    url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: Option<String>,
    headers: HeaderMap,
    disable_ssl_verification: bool,
}

impl Builder {
    /// Creates a new builder using the given API key.
    pub fn new<S: Into<String>>(apikey: S) -> Self {
        Self {
            apikey: apikey.into(),
            url: None,
            client_id: None,
            client_secret: None,
            scope: None,
            headers: HeaderMap::new(),
            disable_ssl_verification: false,
        }
    }

    /// Sets the URL of the IAM service.
    ///
    /// Defaults to `https://iam.cloud.ibm.com`. A trailing `/identity/token`
    /// path is removed, the builder always appends it.
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Authenticates the token requests with a client id and secret.
    ///
    /// Both values must be set together.
    pub fn with_client_id_and_secret<S, T>(mut self, client_id: S, client_secret: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Requests a token restricted to `scope`.
    pub fn with_scope<S: Into<String>>(mut self, scope: S) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Adds headers to each token request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Skips the verification of the server certificate.
    ///
    /// Only use this in test environments.
    pub fn with_disable_ssl_verification(mut self, v: bool) -> Self {
        self.disable_ssl_verification = v;
        self
    }

    fn build_token_provider(self) -> BuildResult<IamTokenProvider> {
        check_property("apikey", &self.apikey)?;

        let client_credentials = match (self.client_id, self.client_secret) {
            (None, None) => None,
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                check_property("client_id", &id)?;
                check_property("client_secret", &secret)?;
                Some((id, secret))
            }
            _ => {
                return Err(BuilderError::invalid_property(
                    "client_id and client_secret must be set together",
                ));
            }
        };
        if let Some(scope) = &self.scope {
            check_property("scope", scope)?;
        }

        let endpoint = token_endpoint(self.url.as_deref().unwrap_or(DEFAULT_URL))?;
        Ok(IamTokenProvider {
            http_client: http::client(self.disable_ssl_verification)?,
            endpoint,
            apikey: self.apikey,
            client_credentials,
            scope: self.scope,
            headers: self.headers,
        })
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns a [BuildError][crate::errors::BuildError] if the API key is
    /// missing, if only one of the client id and secret is set, or if the URL
    /// is not valid.
    pub fn build(self) -> BuildResult<Credentials> {
        Ok(Credentials::from(IamCredentials {
            token_provider: TokenCache::new(self.build_token_provider()?),
        }))
    }
}

fn token_endpoint(url: &str) -> BuildResult<String> {
    check_property("url", url)?;
    let base = url.trim_end_matches('/');
    let base = base.strip_suffix(OPERATION_PATH).unwrap_or(base);
    let endpoint = format!("{base}{OPERATION_PATH}");
    url::Url::parse(&endpoint)
        .map_err(|e| BuilderError::invalid_property(format!("invalid IAM url {url:?}: {e}")))?;
    Ok(endpoint)
}

struct IamTokenProvider {
    http_client: reqwest::Client,
    endpoint: String,
    apikey: String,
    client_credentials: Option<(String, String)>,
    scope: Option<String>,
    headers: HeaderMap,
}

impl std::fmt::Debug for IamTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IamTokenProvider")
            .field("endpoint", &self.endpoint)
            .field("apikey", &"[censored]")
            .field(
                "client_id",
                &self.client_credentials.as_ref().map(|(id, _)| id),
            )
            .field(
                "client_secret",
                &self.client_credentials.as_ref().map(|_| "[censored]"),
            )
            .field("scope", &self.scope)
            .field("headers", &self.headers)
            .finish()
    }
}

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    expiration: Option<i64>,
}

impl IamTokenResponse {
    fn into_token(self, issued_at: Instant) -> Result<Token> {
        let expires_at = match (self.expires_in, self.expiration) {
            (Some(seconds), _) => instant_after(issued_at, Duration::from_secs(seconds)),
            (None, Some(timestamp)) => instant_from_unix(issued_at, timestamp),
            (None, None) => {
                return Err(errors::non_retryable_from_str(
                    "IAM token response has neither expires_in nor expiration",
                ));
            }
        };
        let mut token = Token::issued(self.access_token, self.token_type, issued_at, expires_at);
        token.metadata = self
            .refresh_token
            .map(|t| HashMap::from([(REFRESH_TOKEN_KEY.to_string(), t)]));
        Ok(token)
    }
}

#[async_trait::async_trait]
impl TokenProvider for IamTokenProvider {
    async fn token(&self) -> Result<Token> {
        let mut form = vec![
            ("grant_type", GRANT_TYPE),
            ("apikey", self.apikey.as_str()),
            ("response_type", RESPONSE_TYPE),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let mut builder = self
            .http_client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json")
            .form(&form);
        if let Some((id, secret)) = &self.client_credentials {
            builder = builder.basic_auth(id, Some(secret));
        }

        let issued_at = Instant::now();
        let response: IamTokenResponse = http::execute(builder).await?;
        response.into_token(issued_at)
    }
}

#[derive(Debug)]
struct IamCredentials<T>
where
    T: TokenProvider,
{
    token_provider: T,
}

impl<T> CredentialsProvider for IamCredentials<T>
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
        AUTH_TYPE_IAM
    }
}
