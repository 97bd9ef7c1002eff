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
use crate::token::{Token, TokenProvider};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
// Using tokio's wrapper makes the cache testable without relying on clock times.
use tokio::time::Instant;

/// Caches the token returned by a [TokenProvider].
///
/// A token moves through these states:
///
/// * no token, or an expired token: callers block while one of them fetches
///   a new token.
/// * a valid token: returned without contacting the provider.
/// * a valid token past its refresh threshold: returned immediately, while a
///   single background task fetches its replacement.
///
/// If the background refresh fails the current token is kept. No other
/// background refresh is started for that token, the next fetch happens
/// synchronously once it expires.
#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    // The cached token. Replaced wholesale, never updated in place.
    token: Arc<RwLock<Option<CachedToken>>>,

    // Held while a request to the inner provider is in flight. At most one
    // request, synchronous or background, runs at any time.
    fetch_lock: Arc<Mutex<()>>,

    // Guards the decision to start a background refresh.
    refresh_state: Arc<Mutex<RefreshState>>,

    // The token provider. This thing does the refreshing.
    inner: Arc<T>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    token: Token,
    // Incremented each time a new token is stored.
    generation: u64,
}

#[derive(Debug, Default)]
struct RefreshState {
    // The generation of the last token that triggered a background refresh.
    triggered_for: Option<u64>,
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`. :shrug:
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            token: self.token.clone(),
            fetch_lock: self.fetch_lock.clone(),
            refresh_state: self.refresh_state.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider + 'static> TokenCache<T> {
    pub(crate) fn new(inner: T) -> TokenCache<T> {
        TokenCache {
            token: Arc::new(RwLock::new(None)),
            fetch_lock: Arc::new(Mutex::new(())),
            refresh_state: Arc::new(Mutex::new(RefreshState::default())),
            inner: Arc::new(inner),
        }
    }

    /// Fetches a token while holding the fetch lock.
    async fn fetch(&self) -> Result<Token> {
        let _guard = self.fetch_lock.lock().await;

        // Another caller may have stored a new token while we waited.
        if let Some(cached) = current(&self.token).await {
            if !cached.token.is_expired(Instant::now()) {
                return Ok(cached.token);
            }
        }

        tracing::debug!("fetching a new access token");
        let token = self.inner.token().await?;
        store(&self.token, token.clone()).await;
        Ok(token)
    }

    /// Starts a background refresh, unless one was already started for this
    /// token.
    async fn maybe_refresh(&self, generation: u64) {
        let mut state = self.refresh_state.lock().await;
        if state.triggered_for == Some(generation) {
            return;
        }
        state.triggered_for = Some(generation);
        drop(state);

        tracing::debug!("access token is close to its expiration, refreshing it in the background");
        tokio::spawn(refresh_task(
            self.inner.clone(),
            self.token.clone(),
            self.fetch_lock.clone(),
            generation,
        ));
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider + 'static> TokenProvider for TokenCache<T> {
    async fn token(&self) -> Result<Token> {
        let now = Instant::now();
        match current(&self.token).await {
            Some(cached) if !cached.token.is_expired(now) => {
                if cached.token.needs_refresh(now) {
                    self.maybe_refresh(cached.generation).await;
                }
                Ok(cached.token)
            }
            _ => self.fetch().await,
        }
    }
}

async fn refresh_task<T>(
    inner: Arc<T>,
    token: Arc<RwLock<Option<CachedToken>>>,
    fetch_lock: Arc<Mutex<()>>,
    generation: u64,
) where
    T: TokenProvider,
{
    let _guard = fetch_lock.lock().await;

    // A synchronous fetch may have replaced the token while we waited.
    if current(&token).await.map(|c| c.generation) != Some(generation) {
        return;
    }

    match inner.token().await {
        Ok(t) => store(&token, t).await,
        Err(e) => tracing::warn!(
            "background refresh of the access token failed, using the current token until it expires: {e}"
        ),
    }
}

// Clones the current token, in a thread-safe manner. Releases the lock on return.
async fn current(token: &RwLock<Option<CachedToken>>) -> Option<CachedToken> {
    token.read().await.clone()
}

async fn store(token: &RwLock<Option<CachedToken>>, new: Token) {
    let mut guard = token.write().await;
    let generation = guard.as_ref().map_or(0, |c| c.generation + 1);
    *guard = Some(CachedToken {
        token: new,
        generation,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors;
    use crate::token::tests::MockTokenProvider;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    static TOKEN_VALID_DURATION: Duration = Duration::from_secs(3600);

    fn issued_at(now: Instant, name: &str) -> Token {
        Token::issued(name, "Bearer", now, now + TOKEN_VALID_DURATION)
    }

    // Gives spawned tasks a chance to run.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn initial_token_success() {
        let expected = Token {
            token: "test-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: None,
            refresh_at: None,
            metadata: None,
        };
        let expected_clone = expected.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(expected_clone));

        let cache = TokenCache::new(mock);
        let actual = cache.token().await.unwrap();
        assert_eq!(actual, expected);

        // Verify that we use the cached token instead of making a new request
        // to the mock token provider.
        let actual = cache.token().await.unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn initial_token_failure() {
        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(2)
            .returning(|| Err(errors::non_retryable_from_str("fail")));

        let cache = TokenCache::new(mock);
        assert!(cache.token().await.is_err());

        // Verify that a new request is made to the mock token provider when we
        // don't have a valid token.
        assert!(cache.token().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn valid_token_is_cached() {
        let initial = issued_at(Instant::now(), "initial-token");
        let initial_clone = initial.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token().await.unwrap(), initial);

        // Still before the refresh threshold, 80% of the lifetime.
        tokio::time::advance(TOKEN_VALID_DURATION * 3 / 4).await;
        assert_eq!(cache.token().await.unwrap(), initial);
        settle().await;
        assert_eq!(cache.token().await.unwrap(), initial);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_success() {
        let now = Instant::now();
        let initial = issued_at(now, "initial-token");
        let initial_clone = initial.clone();
        let refresh = issued_at(now + TOKEN_VALID_DURATION, "refresh-token");
        let refresh_clone = refresh.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(refresh_clone));

        // fetch an initial token
        let cache = TokenCache::new(mock);
        let actual = cache.token().await.unwrap();
        assert_eq!(actual, initial);

        // wait long enough for the token to be expired
        tokio::time::advance(TOKEN_VALID_DURATION).await;

        // make sure this is the new token
        let actual = cache.token().await.unwrap();
        assert_eq!(actual, refresh);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_failure() {
        let initial = issued_at(Instant::now(), "initial-token");
        let initial_clone = initial.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Err(errors::non_retryable_from_str("fail")));

        // fetch an initial token
        let cache = TokenCache::new(mock);
        let actual = cache.token().await.unwrap();
        assert_eq!(actual, initial);

        // wait long enough for the token to be expired
        tokio::time::advance(TOKEN_VALID_DURATION).await;

        // make sure we return the error, not the expired token
        assert!(cache.token().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn near_expiry_refreshes_in_background() {
        let now = Instant::now();
        let initial = issued_at(now, "initial-token");
        let initial_clone = initial.clone();
        let refresh = issued_at(now + TOKEN_VALID_DURATION, "refresh-token");
        let refresh_clone = refresh.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(refresh_clone));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token().await.unwrap(), initial);

        tokio::time::advance(TOKEN_VALID_DURATION * 9 / 10).await;

        // The cached token is still valid, and returned without waiting for
        // the refresh.
        assert_eq!(cache.token().await.unwrap(), initial);

        settle().await;
        assert_eq!(cache.token().await.unwrap(), refresh);
    }

    #[tokio::test(start_paused = true)]
    async fn near_expiry_triggers_at_most_one_refresh() {
        let now = Instant::now();
        let initial = issued_at(now, "initial-token");
        let initial_clone = initial.clone();
        let refresh = issued_at(now + TOKEN_VALID_DURATION, "refresh-token");
        let refresh_clone = refresh.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(refresh_clone));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token().await.unwrap(), initial);

        tokio::time::advance(TOKEN_VALID_DURATION * 9 / 10).await;
        for _ in 0..10 {
            assert_eq!(cache.token().await.unwrap(), initial);
        }

        settle().await;
        assert_eq!(cache.token().await.unwrap(), refresh);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn near_expiry_concurrent_callers_trigger_one_refresh() {
        let now = Instant::now();
        // Already past its refresh threshold, far from its expiration.
        let initial = Token {
            token: "initial-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Some(now + TOKEN_VALID_DURATION),
            refresh_at: Some(now),
            metadata: None,
        };
        let initial_clone = initial.clone();
        let refresh = issued_at(now, "refresh-token");
        let refresh_clone = refresh.clone();
        let calls = Arc::new(StdMutex::new(0));
        let calls_clone = calls.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));
        mock.expect_token().returning(move || {
            *calls_clone.lock().unwrap() += 1;
            Ok(refresh_clone.clone())
        });

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token().await.unwrap(), initial);

        let tasks = (0..100)
            .map(|_| {
                let cache_clone = cache.clone();
                tokio::spawn(async move { cache_clone.token().await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            let actual = task.await.unwrap().unwrap();
            assert!(actual == initial || actual == refresh, "{actual:?}");
        }

        // Wait for the background refresh to store its token.
        for _ in 0..100 {
            if cache.token().await.unwrap() == refresh {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.token().await.unwrap(), refresh);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_background_refresh_keeps_token() {
        let now = Instant::now();
        let initial = issued_at(now, "initial-token");
        let initial_clone = initial.clone();
        let replacement = issued_at(now + TOKEN_VALID_DURATION, "replacement-token");
        let replacement_clone = replacement.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(initial_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Err(errors::non_retryable_from_str("fail")));
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(replacement_clone));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token().await.unwrap(), initial);

        tokio::time::advance(TOKEN_VALID_DURATION * 9 / 10).await;
        assert_eq!(cache.token().await.unwrap(), initial);
        settle().await;

        // The failure is not surfaced, and the refresh is not retried while
        // the token is still valid.
        assert_eq!(cache.token().await.unwrap(), initial);
        settle().await;
        assert_eq!(cache.token().await.unwrap(), initial);

        // Once the token expires it is fetched synchronously.
        tokio::time::advance(TOKEN_VALID_DURATION / 10).await;
        assert_eq!(cache.token().await.unwrap(), replacement);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_token_can_refresh_again() {
        let now = Instant::now();
        let first = issued_at(now, "first-token");
        let first_clone = first.clone();
        let second = issued_at(now + TOKEN_VALID_DURATION * 9 / 10, "second-token");
        let second_clone = second.clone();
        let third = issued_at(now + TOKEN_VALID_DURATION * 2, "third-token");
        let third_clone = third.clone();

        let mut mock = MockTokenProvider::new();
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(first_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(second_clone));
        mock.expect_token()
            .times(1)
            .return_once(|| Ok(third_clone));

        let cache = TokenCache::new(mock);
        assert_eq!(cache.token().await.unwrap(), first);

        tokio::time::advance(TOKEN_VALID_DURATION * 9 / 10).await;
        assert_eq!(cache.token().await.unwrap(), first);
        settle().await;
        assert_eq!(cache.token().await.unwrap(), second);

        tokio::time::advance(TOKEN_VALID_DURATION * 9 / 10).await;
        assert_eq!(cache.token().await.unwrap(), second);
        settle().await;
        assert_eq!(cache.token().await.unwrap(), third);
    }

    #[derive(Clone, Debug)]
    struct FakeTokenProvider {
        result: Result<Token>,
        calls: Arc<StdMutex<i32>>,
    }

    impl FakeTokenProvider {
        pub fn new(result: Result<Token>) -> Self {
            FakeTokenProvider {
                result,
                calls: Arc::new(StdMutex::new(0)),
            }
        }

        pub fn calls(&self) -> i32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl TokenProvider for FakeTokenProvider {
        async fn token(&self) -> Result<Token> {
            // Release a token periodically. We give enough time for the
            // waiters in a thundering herd to pile up.
            tokio::time::sleep(Duration::from_millis(50)).await;

            // Track how many calls were made to the inner token provider.
            *self.calls.lock().unwrap() += 1;

            // Return the result.
            self.result.clone()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn initial_token_thundering_herd_success() {
        let token = issued_at(Instant::now(), "initial-token");

        let tp = FakeTokenProvider::new(Ok(token.clone()));

        let cache = TokenCache::new(tp.clone());

        // Spawn N tasks, all asking for a token at once.
        let tasks = (0..100)
            .map(|_| {
                let cache_clone = cache.clone();
                tokio::spawn(async move { cache_clone.token().await })
            })
            .collect::<Vec<_>>();

        // Wait for the N token requests to complete, verifying the returned token.
        for task in tasks {
            let actual = task.await.unwrap();
            assert!(actual.is_ok(), "{}", actual.err().unwrap());
            assert_eq!(actual.unwrap(), token);
        }

        // The waiters find the token stored by the first caller.
        assert_eq!(tp.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn initial_token_thundering_herd_failure() {
        let err = Err(errors::non_retryable_from_str("epic fail"));

        let tp = FakeTokenProvider::new(err);

        let cache = TokenCache::new(tp.clone());

        let tasks = (0..10)
            .map(|_| {
                let cache_clone = cache.clone();
                tokio::spawn(async move { cache_clone.token().await })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            let actual = task.await.unwrap();
            assert!(actual.is_err(), "{:?}", actual.unwrap());
            let e = format!("{}", actual.err().unwrap());
            assert!(e.contains("epic fail"), "{e}");
        }

        // Errors are not cached, each caller makes its own attempt, one at a
        // time.
        assert_eq!(tp.calls(), 10);
    }
}
