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

//! Bearer token credentials.
//!
//! The application obtains the token and is responsible for replacing the
//! credentials before the token expires. These credentials never refresh it.

use crate::build_errors::check_property;
use crate::credentials::{AUTH_TYPE_BEARER, BuildResult, Credentials, CredentialsProvider, Result};
use crate::headers_util::build_bearer_headers;
use crate::token::Token;
use http::HeaderMap;

struct BearerCredentials {
    token: Token,
}

impl std::fmt::Debug for BearerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerCredentials")
            .field("token", &self.token)
            .finish()
    }
}

/// A builder for bearer token credentials.
#[derive(Debug)]
pub struct Builder {
    token: String,
}

impl Builder {
    /// Creates a new builder with the given token.
    ///
    /// # Example
    /// ```
    /// # use ibm_cloud_auth::credentials::bearer::Builder;
    /// let credentials = Builder::new("my-token").build()?;
    /// assert_eq!(credentials.auth_type(), "bearerToken");
    /// # Ok::<(), ibm_cloud_auth::errors::BuildError>(())
    /// ```
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Returns a [Credentials] instance with the configured settings.
    pub fn build(self) -> BuildResult<Credentials> {
        check_property("bearer_token", &self.token)?;
        Ok(Credentials::from(BearerCredentials {
            token: Token {
                token: self.token,
                token_type: "Bearer".to_string(),
                expires_at: None,
                refresh_at: None,
                metadata: None,
            },
        }))
    }
}

impl CredentialsProvider for BearerCredentials {
    async fn token(&self) -> Result<Token> {
        Ok(self.token.clone())
    }

    async fn headers(&self) -> Result<HeaderMap> {
        build_bearer_headers(&self.token)
    }

    fn auth_type(&self) -> &'static str {
        AUTH_TYPE_BEARER
    }
}
