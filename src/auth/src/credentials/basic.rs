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

//! HTTP basic authentication.
//!
//! These credentials send the username and password with each request, in
//! an `Authorization: Basic ...` header.

use crate::build_errors::check_property;
use crate::credentials::{AUTH_TYPE_BASIC, BuildResult, Credentials, CredentialsProvider, Result};
use crate::headers_util::{basic_auth_value, build_basic_headers};
use crate::token::Token;
use http::HeaderMap;

struct BasicCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"[censored]")
            .finish()
    }
}

/// A builder for basic authentication credentials.
#[derive(Debug)]
pub struct Builder {
    username: String,
    password: String,
}

impl Builder {
    /// Creates a new builder with the given username and password.
    ///
    /// # Example
    /// ```
    /// # use ibm_cloud_auth::credentials::basic::Builder;
    /// let credentials = Builder::new("my-user", "my-password").build()?;
    /// # Ok::<(), ibm_cloud_auth::errors::BuildError>(())
    /// ```
    pub fn new<S, T>(username: S, password: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns a [Credentials] instance with the configured settings.
    pub fn build(self) -> BuildResult<Credentials> {
        check_property("username", &self.username)?;
        check_property("password", &self.password)?;
        Ok(Credentials::from(BasicCredentials {
            username: self.username,
            password: self.password,
        }))
    }
}

impl CredentialsProvider for BasicCredentials {
    async fn token(&self) -> Result<Token> {
        let value = basic_auth_value(&self.username, &self.password);
        let token = value.strip_prefix("Basic ").unwrap_or(&value);
        Ok(Token {
            token: token.to_string(),
            token_type: "Basic".to_string(),
            expires_at: None,
            refresh_at: None,
            metadata: None,
        })
    }

    async fn headers(&self) -> Result<HeaderMap> {
        build_basic_headers(&self.username, &self.password)
    }

    fn auth_type(&self) -> &'static str {
        AUTH_TYPE_BASIC
    }
}
