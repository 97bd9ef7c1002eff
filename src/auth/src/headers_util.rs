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

use crate::Result;
use crate::errors;
use crate::token::Token;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderMap;
use http::header::{AUTHORIZATION, HeaderValue};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// A utility function to create bearer headers.
pub(crate) fn build_bearer_headers(token: &Token) -> Result<HeaderMap> {
    let token_type = match token.token_type.as_str() {
        "" => DEFAULT_TOKEN_TYPE,
        t => t,
    };
    build_headers(format!("{token_type} {}", token.token))
}

/// A utility function to create basic auth headers.
pub(crate) fn build_basic_headers(username: &str, password: &str) -> Result<HeaderMap> {
    build_headers(basic_auth_value(username, password))
}

/// The value of an `Authorization: Basic ...` header.
pub(crate) fn basic_auth_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn build_headers(value: String) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(&value).map_err(errors::non_retryable)?;
    value.set_sensitive(true);

    let mut header_map = HeaderMap::new();
    header_map.insert(AUTHORIZATION, value);
    Ok(header_map)
}
