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

//! Anonymous credentials.
//!
//! These credentials do not provide any authentication information. They are
//! useful for accessing services that do not require authentication.

use crate::credentials::{AUTH_TYPE_NO_AUTH, Credentials, CredentialsProvider, Result};
use crate::errors;
use crate::token::Token;
use http::HeaderMap;

#[derive(Debug)]
struct AnonymousCredentials;

/// A builder for creating anonymous credentials.
#[derive(Debug, Default)]
pub struct Builder {}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a [Credentials] instance.
    pub fn build(self) -> Credentials {
        Credentials::from(AnonymousCredentials)
    }
}

impl CredentialsProvider for AnonymousCredentials {
    async fn token(&self) -> Result<Token> {
        Err(errors::non_retryable_from_str("anonymous credentials do not have a token"))
    }

    async fn headers(&self) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    fn auth_type(&self) -> &'static str {
        AUTH_TYPE_NO_AUTH
    }
}
