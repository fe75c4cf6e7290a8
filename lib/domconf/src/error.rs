// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The error taxonomy shared by every parser, serializer and store operation.

use std::io;
use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The diagnostic class of an [`Error`], for callers that want to branch on
/// the kind of failure without inspecting messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    XmlError,
    ConfigUnsupported,
    InternalError,
    InvalidArg,
    OperationInvalid,
    OperationFailed,
    NoSource,
    NoTarget,
    NoName,
    OsType,
    SystemError,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Structurally malformed input.
    #[error("XML error: {0}")]
    Xml(String),

    /// Well-formed input describing a combination that is not accepted.
    #[error("unsupported configuration: {0}")]
    ConfigUnsupported(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("requested operation is not valid: {0}")]
    OperationInvalid(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("missing source information for device {0}")]
    NoSource(String),

    #[error("missing target information for device {0}")]
    NoTarget(String),

    #[error("missing name information in {0}")]
    NoName(String),

    #[error("unknown OS type {0}")]
    OsType(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Xml(_) => ErrorKind::XmlError,
            Error::ConfigUnsupported(_) => ErrorKind::ConfigUnsupported,
            Error::Internal(_) => ErrorKind::InternalError,
            Error::InvalidArg(_) => ErrorKind::InvalidArg,
            Error::OperationInvalid(_) => ErrorKind::OperationInvalid,
            Error::OperationFailed(_) => ErrorKind::OperationFailed,
            Error::NoSource(_) => ErrorKind::NoSource,
            Error::NoTarget(_) => ErrorKind::NoTarget,
            Error::NoName(_) => ErrorKind::NoName,
            Error::OsType(_) => ErrorKind::OsType,
            Error::Io { .. } => ErrorKind::SystemError,
        }
    }

    pub(crate) fn io(
        what: &str,
        path: &Path,
        source: io::Error,
    ) -> Self {
        Error::Io { context: format!("{} '{}'", what, path.display()), source }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(Error::Xml("x".into()).kind(), ErrorKind::XmlError);
        assert_eq!(
            Error::ConfigUnsupported("x".into()).kind(),
            ErrorKind::ConfigUnsupported
        );
        assert_eq!(
            ErrorKind::ConfigUnsupported.to_string(),
            "CONFIG_UNSUPPORTED"
        );


        let e = Error::io(
            "cannot read",
            Path::new("/nonexistent"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert_eq!(e.kind(), ErrorKind::SystemError);
        assert_eq!(e.to_string(), "cannot read '/nonexistent'");
    }
}
