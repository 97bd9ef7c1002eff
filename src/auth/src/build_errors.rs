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

//! Errors created during credentials construction.

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for [Credentials] builders.
///
/// Builders validate their configuration before any token is requested, so
/// these errors are never retryable: the configuration must change before the
/// builder can succeed.
///
/// [Credentials]: super::credentials::Credentials
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// A problem finding or reading the service configuration.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// A problem parsing the service configuration.
    pub fn is_parsing(&self) -> bool {
        matches!(self.0, ErrorKind::Parsing(_))
    }

    /// The authentication type is invalid or unknown.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.0, ErrorKind::UnknownType(_))
    }

    /// A required property was missing or empty.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// A property had an invalid value, or conflicts with another property.
    pub fn is_invalid_property(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidProperty(_))
    }

    pub(crate) fn loading<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Loading(source.into()))
    }

    pub(crate) fn parsing<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::Parsing(source.into()))
    }

    pub(crate) fn unknown_type<T>(source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::UnknownType(source.into()))
    }

    pub(crate) fn missing_field(field: &'static str) -> Error {
        Error(ErrorKind::MissingField(field))
    }

    pub(crate) fn invalid_property<T: Into<String>>(message: T) -> Error {
        Error(ErrorKind::InvalidProperty(message.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("could not find or read the service configuration {0}")]
    Loading(#[source] BoxError),
    #[error("cannot parse the service configuration {0}")]
    Parsing(#[source] BoxError),
    #[error("unknown or invalid authentication type {0}")]
    UnknownType(#[source] BoxError),
    #[error("missing required property: {0}")]
    MissingField(&'static str),
    #[error("invalid property: {0}")]
    InvalidProperty(String),
}

/// Rejects values that still carry the quotes or braces of a copied JSON
/// snippet, e.g. `"my-apikey"` or `{my-apikey}`.
pub(crate) fn check_property(name: &'static str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::missing_field(name));
    }
    if value.starts_with(['{', '"']) || value.ends_with(['}', '"']) {
        return Err(Error::invalid_property(format!(
            "the {name} property is invalid, remove any surrounding {{, }}, or \" characters"
        )));
    }
    Ok(())
}
