//
// errors.rs
//
// Copyright (C) 2025 Posit Software, PBC. All rights reserved.
//
//

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced across the bus, the interpreter manager, and the
/// symbol index.
///
/// Transient variants (`TransportClosed`, `InterpreterUnavailable`,
/// `StaleIndex`, `ResolverNotFound`, `MalformedReply`, `ProcessLost`) are
/// expected to occur in normal operation and must never abort the server;
/// callers degrade to an empty LSP response. `Io`, `Json`, and `Anyhow` wrap
/// lower-level failures so free functions can keep using `?` against
/// `anyhow::Result` while the public API surfaces a typed enum at the seams
/// callers actually branch on.
pub enum Error {
    /// Operation attempted on a bus whose connection has been torn down.
    TransportClosed,
    /// An on-demand feature needed the interpreter but connection policy is
    /// `never`, or the interpreter failed to launch.
    InterpreterUnavailable,
    /// The index held a value written before the source changed; silently
    /// superseded by the next index.
    StaleIndex,
    /// The path resolver returned no candidate file.
    ResolverNotFound,
    /// A reply arrived in a shape the caller didn't expect.
    MalformedReply,
    /// The subordinate interpreter process terminated unexpectedly.
    ProcessLost,
    Io(std::io::Error),
    Json(serde_json::Error),
    Anyhow(anyhow::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TransportClosed => write!(f, "the bus connection is closed"),
            Error::InterpreterUnavailable => write!(f, "the interpreter is not available"),
            Error::StaleIndex => write!(f, "index entry superseded by a newer write"),
            Error::ResolverNotFound => write!(f, "path resolver found no candidate file"),
            Error::MalformedReply => write!(f, "reply had an unexpected shape"),
            Error::ProcessLost => write!(f, "the interpreter process terminated unexpectedly"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Json(err) => write!(f, "JSON error: {err}"),
            Error::Anyhow(err) => write!(f, "{err}"),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Anyhow(err) => err.source(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Anyhow(err)
    }
}
