// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The probe dispatcher registry.
//!
//! The teacher's `symphonia-core::probe` matches candidates with a bloom
//! filter over registered marker bytes plus a scoring function, because it
//! has to disambiguate dozens of container/codec combinations that can
//! share a magic prefix. This engine's dispatch problem is simpler: the
//! spec fixes both the match order and a first-match-wins policy across
//! four decoders, so the registry here is a flat `Vec` scanned in
//! registration order — closer to a `support_format!`-style static
//! descriptor list than to the teacher's bloom/score machinery.

use std::path::Path;

use crate::error::{ErrorKind, Result};
use crate::model::FileRecord;
use crate::stream::Stream;

/// Context passed to a decoder: the path (for error messages) and a sink
/// for the four domain error kinds, routed to the job's logger hook by the
/// facade crate.
pub struct DecodeContext<'a> {
    pub path: &'a Path,
    log: &'a mut dyn FnMut(ErrorKind, &str),
}

impl<'a> DecodeContext<'a> {
    pub fn new(path: &'a Path, log: &'a mut dyn FnMut(ErrorKind, &str)) -> Self {
        DecodeContext { path, log }
    }

    pub fn log(&mut self, kind: ErrorKind, msg: impl AsRef<str>) {
        (self.log)(kind, msg.as_ref());
    }
}

/// A single registered format decoder.
pub trait Decoder {
    /// Short name used only for diagnostics (`"flac"`, `"id3v2"`, ...).
    fn name(&self) -> &'static str;

    /// Tests whether `header` (the stream's first page) matches this
    /// decoder's magic bytes. Must not read past `header`.
    fn matches(&self, header: &[u8]) -> bool;

    /// Decodes recognized frames from `stream` into `file.elements`.
    /// Per §7's propagation policy: a decoder reports only success or
    /// failure, never escalates to the scan level; on failure the
    /// dispatcher moves to the next matcher (or gives up) and the file is
    /// still emitted, un-enriched.
    fn decode(&self, stream: &mut dyn Stream, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()>;
}

/// A flat, registration-ordered table of decoders. `dispatch` matches the
/// first page against each decoder's magic bytes in order and invokes the
/// first match.
#[derive(Default)]
pub struct Dispatcher {
    decoders: Vec<Box<dyn Decoder>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher { decoders: Vec::new() }
    }

    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        self.decoders.push(decoder);
    }

    /// Reads the first page of `stream`, matches it against every
    /// registered decoder in order, and invokes the first match. Returns
    /// `Ok(true)` if a decoder matched (regardless of whether decoding
    /// itself subsequently failed — failures are logged, not propagated),
    /// `Ok(false)` if nothing matched.
    pub fn dispatch(
        &self,
        stream: &mut dyn Stream,
        file: &mut FileRecord,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<bool> {
        let header_len = crate::stream::PAGE_SIZE.min(stream.size() as usize);
        if header_len == 0 {
            return Ok(false);
        }
        let header = stream.get(0, header_len)?.to_vec();

        for decoder in &self.decoders {
            if decoder.matches(&header) {
                if let Err(err) = decoder.decode(stream, file, ctx) {
                    ctx.log(ErrorKind::Format, format!("{}: {}", decoder.name(), err));
                }
                return Ok(true);
            }
        }
        Ok(false)
    }
}
