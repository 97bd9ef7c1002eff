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
use crate::build_errors::Error as BuilderError;
use crate::errors::{self, CredentialsError, is_retryable};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Token requests give up after this long.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the HTTP client used to contact a token endpoint.
pub(crate) fn client(
    disable_ssl_verification: bool,
) -> std::result::Result<reqwest::Client, BuilderError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(disable_ssl_verification)
        .build()
        .map_err(|e| BuilderError::invalid_property(format!("cannot create HTTP client: {e}")))
}

/// Sends a token request and parses the JSON response.
///
/// Transport errors and some HTTP status codes are retryable. A malformed
/// response is not.
pub(crate) async fn execute<O>(builder: reqwest::RequestBuilder) -> Result<O>
where
    O: DeserializeOwned,
{
    let resp = builder.send().await.map_err(|e| match e.is_builder() {
        true => errors::non_retryable(e),
        false => errors::retryable(e),
    })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .await
            .map_err(|e| CredentialsError::new(is_retryable(status), e))?;
        return Err(CredentialsError::from_msg(
            is_retryable(status),
            format!("failed to fetch token, status={status}, body={body}"),
        ));
    }

    resp.json::<O>().await.map_err(|e| {
        let retryable = !e.is_decode();
        CredentialsError::new(retryable, e)
    })
}

/// Parses a JSON payload that is not an HTTP response body, such as the claims
/// of a JWT.
pub(crate) fn parse_json<O>(bytes: &[u8]) -> Result<O>
where
    O: DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(errors::non_retryable)
}
