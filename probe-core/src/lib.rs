// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primitives shared by every decoder in the probe engine: the byte-stream
//! capability abstraction and its page-cached overlay, a bit reader, the
//! file/metadata data model, the scan job, and the probe dispatcher registry.

pub mod bits;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod stream;

pub use error::{format_error, unsupported_error, use_error, ErrorKind, ProbeError, Result};
