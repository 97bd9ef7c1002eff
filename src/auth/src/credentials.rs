// Copyright 2024 Google LLC
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

pub mod anonymous;
pub mod basic;
pub mod bearer;
pub mod cp4d;
pub mod iam;

use crate::build_errors::Error as BuilderError;
use crate::config;
use crate::errors::CredentialsError;
use crate::token::Token;
use http::HeaderMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, CredentialsError>;
pub type BuildResult<T> = std::result::Result<T, BuilderError>;

pub(crate) const AUTH_TYPE_IAM: &str = "iam";
pub(crate) const AUTH_TYPE_CP4D: &str = "cp4d";
pub(crate) const AUTH_TYPE_BASIC: &str = "basic";
pub(crate) const AUTH_TYPE_BEARER: &str = "bearerToken";
pub(crate) const AUTH_TYPE_NO_AUTH: &str = "noAuth";

/// Represents the credentials used to authenticate requests to a service.
/// Use one of the builders in the submodules, or [Builder] to create the
/// credentials configured for a service in its environment.
///
/// The credentials refresh their tokens as needed. Cloning a `Credentials`
/// is cheap, and all clones share the same cached token.
///
/// # Example
/// ```
/// # use ibm_cloud_auth::credentials::basic;
/// # tokio_test::block_on(async {
/// let credentials = basic::Builder::new("my-user", "my-password").build()?;
/// let mut headers = http::HeaderMap::new();
/// credentials.authenticate(&mut headers).await?;
/// assert!(headers.contains_key(http::header::AUTHORIZATION));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone, Debug)]
pub struct Credentials {
    // We use an `Arc` to hold the inner implementation.
    //
    // Credentials may be shared across threads (`Send + Sync`), so an `Rc`
    // will not do.
    //
    // They also need to derive `Clone`, as the request builders for a
    // service need to attach the same credentials to many requests.
    inner: Arc<dyn dynamic::CredentialsProvider>,
}

impl<T> std::convert::From<T> for Credentials
where
    T: crate::credentials::CredentialsProvider + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl Credentials {
    /// Returns the current token, fetching a new one if needed.
    pub async fn token(&self) -> Result<Token> {
        self.inner.token().await
    }

    /// Returns the headers that authenticate a request.
    pub async fn headers(&self) -> Result<HeaderMap> {
        self.inner.headers().await
    }

    /// Adds the authentication headers to `headers`, replacing any
    /// `Authorization` header already present.
    pub async fn authenticate(&self, headers: &mut HeaderMap) -> Result<()> {
        let auth = self.inner.headers().await?;
        headers.extend(auth);
        Ok(())
    }

    /// The name of the authentication scheme, such as `iam` or `cp4d`.
    pub fn auth_type(&self) -> &'static str {
        self.inner.auth_type()
    }
}

/// Produces the tokens and headers that authenticate requests.
///
/// Applications can implement this trait, and convert the implementation
/// into [Credentials] with `Credentials::from()`, to mock the credentials
/// in tests or to add their own authentication schemes.
pub trait CredentialsProvider: std::fmt::Debug {
    /// Asynchronously retrieves a token.
    ///
    /// The underlying implementation refreshes the token as needed.
    fn token(&self) -> impl Future<Output = Result<Token>> + Send;

    /// Asynchronously constructs the auth headers.
    fn headers(&self) -> impl Future<Output = Result<HeaderMap>> + Send;

    /// The name of the authentication scheme.
    fn auth_type(&self) -> &'static str;
}

pub(crate) mod dynamic {
    use super::Result;
    use crate::token::Token;
    use http::HeaderMap;

    /// A dyn-compatible, crate-private version of `CredentialsProvider`.
    #[async_trait::async_trait]
    pub trait CredentialsProvider: Send + Sync + std::fmt::Debug {
        async fn token(&self) -> Result<Token>;

        async fn headers(&self) -> Result<HeaderMap>;

        fn auth_type(&self) -> &'static str;
    }

    /// The public CredentialsProvider implements the dyn-compatible CredentialsProvider.
    #[async_trait::async_trait]
    impl<T> CredentialsProvider for T
    where
        T: super::CredentialsProvider + Send + Sync,
    {
        async fn token(&self) -> Result<Token> {
            T::token(self).await
        }

        async fn headers(&self) -> Result<HeaderMap> {
            T::headers(self).await
        }

        fn auth_type(&self) -> &'static str {
            T::auth_type(self)
        }
    }
}

/// Creates the [Credentials] configured for a service.
///
/// The configuration is loaded as described in [crate::config]. The
/// `AUTH_TYPE` property selects the authenticator, and is matched without
/// regard to case. If it is not set, and an `APIKEY` is configured, the
/// builder creates [iam] credentials.
///
/// | `AUTH_TYPE`   | Properties used |
/// |---------------|-----------------|
/// | `iam`         | `APIKEY`, `AUTH_URL`, `CLIENT_ID`, `CLIENT_SECRET`, `SCOPE`, `AUTH_DISABLE_SSL` |
/// | `cp4d`        | `AUTH_URL`, `USERNAME`, `PASSWORD` or `APIKEY`, `AUTH_DISABLE_SSL` |
/// | `basic`       | `USERNAME`, `PASSWORD` |
/// | `bearerToken` | `BEARER_TOKEN` |
/// | `noAuth`      | none |
///
/// # Example
/// ```
/// # use ibm_cloud_auth::credentials::Builder;
/// # use std::collections::HashMap;
/// let properties = HashMap::from([
///     ("AUTH_TYPE".to_string(), "basic".to_string()),
///     ("USERNAME".to_string(), "my-user".to_string()),
///     ("PASSWORD".to_string(), "my-password".to_string()),
/// ]);
/// let credentials = Builder::from_properties(properties).build()?;
/// assert_eq!(credentials.auth_type(), "basic");
/// # Ok::<(), ibm_cloud_auth::errors::BuildError>(())
/// ```
#[derive(Debug)]
pub struct Builder {
    source: PropertySource,
}

#[derive(Debug)]
enum PropertySource {
    ServiceName(String),
    Properties(HashMap<String, String>),
}

impl Builder {
    /// Creates a builder that loads the configuration of `service_name`.
    pub fn from_service_name<S: Into<String>>(service_name: S) -> Self {
        Self {
            source: PropertySource::ServiceName(service_name.into()),
        }
    }

    /// Creates a builder from properties that are already loaded.
    ///
    /// The keys are property names without the service prefix, such as
    /// `APIKEY`.
    pub fn from_properties(properties: HashMap<String, String>) -> Self {
        Self {
            source: PropertySource::Properties(properties),
        }
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns a [BuildError][crate::errors::BuildError] if the configuration
    /// cannot be loaded, if it is empty, if the auth type is unknown, or if the
    /// authenticator rejects its properties.
    pub fn build(self) -> BuildResult<Credentials> {
        let properties = match self.source {
            PropertySource::ServiceName(name) => {
                let properties = config::service_properties(&name)?;
                if properties.is_empty() {
                    return Err(BuilderError::loading(format!(
                        "no configuration found for service {name}"
                    )));
                }
                properties
            }
            PropertySource::Properties(p) => p,
        };
        build_from_properties(&properties)
    }
}

fn build_from_properties(properties: &HashMap<String, String>) -> BuildResult<Credentials> {
    if properties.is_empty() {
        return Err(BuilderError::loading("no configuration properties"));
    }

    let auth_type = match properties.get(config::PROP_AUTH_TYPE) {
        Some(t) => t.to_lowercase(),
        None if properties.contains_key(config::PROP_APIKEY) => AUTH_TYPE_IAM.to_string(),
        None => return Err(BuilderError::missing_field("AUTH_TYPE")),
    };
    tracing::debug!("creating {auth_type} credentials from configuration");

    let get = |key: &str| properties.get(key).cloned();
    let disable_ssl = get(config::PROP_AUTH_DISABLE_SSL)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    match auth_type.as_str() {
        AUTH_TYPE_IAM => {
            let mut builder = iam::Builder::new(get(config::PROP_APIKEY).unwrap_or_default())
                .with_disable_ssl_verification(disable_ssl);
            if let Some(url) = get(config::PROP_AUTH_URL) {
                builder = builder.with_url(url);
            }
            let client_id = get(config::PROP_CLIENT_ID);
            let client_secret = get(config::PROP_CLIENT_SECRET);
            if client_id.is_some() || client_secret.is_some() {
                builder = builder.with_client_id_and_secret(
                    client_id.unwrap_or_default(),
                    client_secret.unwrap_or_default(),
                );
            }
            if let Some(scope) = get(config::PROP_SCOPE) {
                builder = builder.with_scope(scope);
            }
            builder.build()
        }
        AUTH_TYPE_CP4D => {
            let mut builder = cp4d::Builder::new(
                get(config::PROP_AUTH_URL).unwrap_or_default(),
                get(config::PROP_USERNAME).unwrap_or_default(),
            )
            .with_disable_ssl_verification(disable_ssl);
            if let Some(password) = get(config::PROP_PASSWORD) {
                builder = builder.with_password(password);
            }
            if let Some(apikey) = get(config::PROP_APIKEY) {
                builder = builder.with_api_key(apikey);
            }
            builder.build()
        }
        AUTH_TYPE_BASIC => basic::Builder::new(
            get(config::PROP_USERNAME).unwrap_or_default(),
            get(config::PROP_PASSWORD).unwrap_or_default(),
        )
        .build(),
        "bearertoken" => {
            bearer::Builder::new(get(config::PROP_BEARER_TOKEN).unwrap_or_default()).build()
        }
        "noauth" => Ok(anonymous::Builder::new().build()),
        other => Err(BuilderError::unknown_type(format!(
            "unknown auth type {other:?}, expected one of {AUTH_TYPE_IAM}, {AUTH_TYPE_CP4D}, \
             {AUTH_TYPE_BASIC}, {AUTH_TYPE_BEARER} or {AUTH_TYPE_NO_AUTH}"
        ))),
    }
}
