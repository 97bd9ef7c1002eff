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

//! IBM Cloud Client Libraries for Rust - Authentication Components
//!
//! This crate contains types and functions used to authenticate requests to
//! IBM Cloud services. Applications create [credentials::Credentials], and
//! use them to add the `Authorization` header to each request.
//!
//! The [IAM][credentials::iam] and [Cloud Pak for Data][credentials::cp4d]
//! credentials exchange a long-lived secret for a short-lived access token.
//! The token is cached, and refreshed in the background once 80% of its
//! lifetime has elapsed, so requests rarely wait for a token endpoint.
//!
//! ```
//! # use ibm_cloud_auth::credentials::iam;
//! # tokio_test::block_on(async {
//! let credentials = iam::Builder::new("my-api-key").build()?;
//! let mut headers = http::HeaderMap::new();
//! # if false {
//! credentials.authenticate(&mut headers).await?;
//! # }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod errors;

pub mod config;

/// Types and functions to work with authentication credentials.
pub mod credentials;

pub mod token;

/// The token cache
pub(crate) mod token_cache;

/// A `Result` alias where the `Err` case is
/// `ibm_cloud_auth::errors::CredentialsError`.
pub(crate) type Result<T> = std::result::Result<T, crate::errors::CredentialsError>;

pub(crate) mod build_errors;

/// Headers utility functions to work with authentication credentials.
pub(crate) mod headers_util;

pub(crate) mod http;
