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

//! Load service configuration from the environment.
//!
//! The configuration of a service is a set of properties such as `APIKEY`,
//! `AUTH_TYPE` or `AUTH_URL`. They are read from the first of these sources
//! that contains any property for the service:
//!
//! 1. A credentials file. Its path is taken from the `IBM_CREDENTIALS_FILE`
//!    environment variable, or else it is the `ibm-credentials.env` file in
//!    the current directory, or else the file with the same name in the home
//!    directory.
//! 2. The environment variables.
//!
//! In both sources the properties are named `<SERVICE>_<PROPERTY>`, where
//! `<SERVICE>` is the service name in upper case, with any `-` replaced by
//! `_`. For example, the API key of the `my-service` service is
//! `MY_SERVICE_APIKEY`.
//!
//! Credentials files contain one `KEY=VALUE` assignment per line. Empty lines
//! and lines starting with `#` are ignored.
//!
//! ```text
//! # ibm-credentials.env
//! MY_SERVICE_AUTH_TYPE=iam
//! MY_SERVICE_APIKEY=my-api-key
//! ```

use crate::build_errors::Error as BuilderError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, BuilderError>;

pub(crate) const CREDENTIALS_FILE_VAR: &str = "IBM_CREDENTIALS_FILE";
const DEFAULT_CREDENTIALS_FILE_NAME: &str = "ibm-credentials.env";

pub(crate) const PROP_AUTH_TYPE: &str = "AUTH_TYPE";
pub(crate) const PROP_APIKEY: &str = "APIKEY";
pub(crate) const PROP_AUTH_URL: &str = "AUTH_URL";
pub(crate) const PROP_USERNAME: &str = "USERNAME";
pub(crate) const PROP_PASSWORD: &str = "PASSWORD";
pub(crate) const PROP_BEARER_TOKEN: &str = "BEARER_TOKEN";
pub(crate) const PROP_CLIENT_ID: &str = "CLIENT_ID";
pub(crate) const PROP_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub(crate) const PROP_SCOPE: &str = "SCOPE";
pub(crate) const PROP_AUTH_DISABLE_SSL: &str = "AUTH_DISABLE_SSL";

/// Returns the properties configured for `service_name`.
///
/// The keys in the returned map do not include the service name prefix. The
/// map is empty if no source has properties for the service.
///
/// # Errors
///
/// Returns an error if the credentials file named by `IBM_CREDENTIALS_FILE`
/// cannot be read, or if a credentials file contains a malformed line.
///
/// # Example
/// ```
/// # use ibm_cloud_auth::config::service_properties;
/// let properties = service_properties("my-service")?;
/// if let Some(auth_type) = properties.get("AUTH_TYPE") {
///     println!("my-service uses {auth_type} authentication");
/// }
/// # Ok::<(), ibm_cloud_auth::errors::BuildError>(())
/// ```
pub fn service_properties(service_name: &str) -> Result<HashMap<String, String>> {
    let prefix = property_prefix(service_name);

    if let Some(path) = credentials_file_path()? {
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| BuilderError::loading(format!("{}: {e}", path.display())))?;
        let properties = parse_credentials_file(&contents, &prefix)
            .map_err(|e| BuilderError::parsing(format!("{}: {e}", path.display())))?;
        if !properties.is_empty() {
            tracing::debug!(
                "loaded {} properties for {service_name} from {}",
                properties.len(),
                path.display()
            );
            return Ok(properties);
        }
    }

    let properties = filter_properties(std::env::vars(), &prefix);
    if !properties.is_empty() {
        tracing::debug!(
            "loaded {} properties for {service_name} from the environment",
            properties.len()
        );
    }
    Ok(properties)
}

fn property_prefix(service_name: &str) -> String {
    format!("{}_", service_name.to_uppercase().replace('-', "_"))
}

fn credentials_file_path() -> Result<Option<PathBuf>> {
    if let Ok(path) = std::env::var(CREDENTIALS_FILE_VAR) {
        let path = PathBuf::from(path);
        if !path.is_file() {
            return Err(BuilderError::loading(format!(
                "{} set by {CREDENTIALS_FILE_VAR} is not a file",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    let cwd = Path::new(DEFAULT_CREDENTIALS_FILE_NAME);
    if cwd.is_file() {
        return Ok(Some(cwd.to_path_buf()));
    }

    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(DEFAULT_CREDENTIALS_FILE_NAME))
        .filter(|path| path.is_file());
    Ok(home)
}

fn parse_credentials_file(
    contents: &str,
    prefix: &str,
) -> std::result::Result<HashMap<String, String>, String> {
    let mut pairs = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {} is not a KEY=VALUE assignment", number + 1))?;
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(filter_properties(pairs, prefix))
}

fn filter_properties<I>(pairs: I, prefix: &str) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    pairs
        .into_iter()
        .filter_map(|(k, v)| k.strip_prefix(prefix).map(|p| (p.to_string(), v)))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}
