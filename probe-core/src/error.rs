// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the probe engine's error taxonomy.
//!
//! Every error belongs to one of four kinds, matching the domain error kinds
//! a caller's log hook receives: `Trace`, `Format`, `OsError`, and `UseError`.
//! `Format` and `OsError` are non-fatal to an in-progress scan (the offending
//! file or field is skipped and the scan continues); `UseError` aborts the
//! scan outright.

use std::fmt;
use std::io;

/// The four error kinds a scan job's log hook is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Diagnostic detail with no bearing on correctness.
    Trace,
    /// The stream contained malformed or unexpected data for its recognized
    /// format. Non-fatal: the field or block is skipped.
    Format,
    /// A system call failed (open, read, stat). Non-fatal to the scan as a
    /// whole, but fatal to the decoder call in progress.
    OsError,
    /// Misuse of the library's interface by the caller (invalid flags,
    /// nonexistent root path). Fatal to the scan.
    UseError,
}

/// `ProbeError` enumerates every way a stream read or a decoder call can
/// fail.
#[derive(Debug)]
pub enum ProbeError {
    /// An OS-level IO error occurred while opening, reading, or seeking.
    Io(io::Error),
    /// The stream contained malformed data for its recognized format.
    Format(String),
    /// The requested range falls outside the bounds of the stream.
    OutOfBounds,
    /// A recognized but unsupported container/codec feature was encountered
    /// (e.g. ID3v2.2, an unrecognized TIFF entry type).
    Unsupported(&'static str),
    /// The caller supplied invalid scan flags or an invalid root path.
    UseError(String),
}

impl ProbeError {
    /// The domain error kind this error is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::Io(_) => ErrorKind::OsError,
            ProbeError::Format(_) | ProbeError::OutOfBounds | ProbeError::Unsupported(_) => {
                ErrorKind::Format
            }
            ProbeError::UseError(_) => ErrorKind::UseError,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Io(err) => write!(f, "io error: {}", err),
            ProbeError::Format(msg) => write!(f, "format error: {}", msg),
            ProbeError::OutOfBounds => write!(f, "read past end of stream"),
            ProbeError::Unsupported(feature) => write!(f, "unsupported: {}", feature),
            ProbeError::UseError(msg) => write!(f, "invalid use: {}", msg),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> ProbeError {
        ProbeError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Convenience function to create a format error.
pub fn format_error<T>(desc: impl Into<String>) -> Result<T> {
    Err(ProbeError::Format(desc.into()))
}

/// Convenience function to create an unsupported-feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(ProbeError::Unsupported(feature))
}

/// Convenience function to create a use error.
pub fn use_error<T>(desc: impl Into<String>) -> Result<T> {
    Err(ProbeError::UseError(desc.into()))
}
