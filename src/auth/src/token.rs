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

//! Types and functions to work with access tokens.

use crate::Result;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Represents an auth token.
#[derive(Clone, PartialEq)]
pub struct Token {
    /// The actual token string.
    ///
    /// This is the value used in `Authorization:` header.
    pub token: String,

    /// The type of the token.
    ///
    /// The most common type is `"Bearer"`.
    pub token_type: String,

    /// The instant at which the token expires.
    ///
    /// If `None`, the token does not expire.
    ///
    /// Note that the `Instant` is not valid across processes. Let the
    /// authentication library refresh tokens within a process instead of
    /// handling expirations yourself.
    pub expires_at: Option<Instant>,

    /// The instant after which the token should be refreshed in the
    /// background.
    ///
    /// This is 80% of the way from the instant the token was issued to the
    /// instant it expires. If `None`, the token is never refreshed early.
    pub refresh_at: Option<Instant>,

    /// Optional metadata associated with the token.
    ///
    /// For example, the IAM refresh token is stored here.
    pub metadata: Option<HashMap<String, String>>,
}

impl Token {
    /// Creates a token that was issued at `issued_at` and expires at
    /// `expires_at`, computing the refresh threshold from both.
    pub(crate) fn issued<S, T>(
        token: S,
        token_type: T,
        issued_at: Instant,
        expires_at: Instant,
    ) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Token {
            token: token.into(),
            token_type: token_type.into(),
            expires_at: Some(expires_at),
            refresh_at: Some(refresh_time(issued_at, expires_at)),
            metadata: None,
        }
    }

    /// Returns `true` if the token cannot be used anymore.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }

    /// Returns `true` if the token is past its refresh threshold.
    pub(crate) fn needs_refresh(&self, now: Instant) -> bool {
        self.refresh_at.is_some_and(|r| r <= now)
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[censored]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("refresh_at", &self.refresh_at)
            .field(
                "metadata",
                &self.metadata.as_ref().map(|m| m.keys().collect::<Vec<_>>()),
            )
            .finish()
    }
}

/// `expiration - 0.2 * (expiration - issued)`
pub(crate) fn refresh_time(issued_at: Instant, expires_at: Instant) -> Instant {
    let ttl = expires_at.saturating_duration_since(issued_at);
    expires_at - ttl / 5
}

/// Maps a timestamp in seconds since the epoch to an `Instant` in this
/// process.
///
/// Timestamps in the past map to `now`.
pub(crate) fn instant_from_unix(now: Instant, seconds: i64) -> Instant {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let delta = seconds.saturating_sub(wall);
    if delta <= 0 {
        return now;
    }
    instant_after(now, Duration::from_secs(delta as u64))
}

// Roughly 30 years, as far as tokio itself looks into the future.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Returns `now + delta`, clamped to a far-future instant when `delta` is
/// too large to represent.
pub(crate) fn instant_after(now: Instant, delta: Duration) -> Instant {
    now.checked_add(delta.min(FAR_FUTURE)).unwrap_or(now)
}

#[async_trait::async_trait]
pub(crate) trait TokenProvider: std::fmt::Debug + Send + Sync {
    async fn token(&self) -> Result<Token>;
}
