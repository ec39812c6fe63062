// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![forbid(unsafe_code)]

//! The facade crate: wires the four format decoders into a [`Dispatcher`],
//! walks a directory tree, and drives one [`ScanJob`] to completion.
//!
//! Grounded on the teacher's top-level `lib.rs`, which re-exports
//! feature-gated codec/format crates behind a `default` module holding a
//! lazily built [`CodecRegistry`]/[`Probe`] pair. This crate has no feature
//! matrix to gate on — the four decoders are always available — so
//! `default::dispatcher()` builds a fresh [`Dispatcher`] per call rather
//! than caching one behind `lazy_static!`; a `Dispatcher` is cheap to build
//! and a caller may legitimately want more than one (e.g. one per thread).

pub mod default {
    //! Convenience constructors for a fully-populated [`Dispatcher`].

    use probe_core::dispatch::Dispatcher;

    /// Builds a [`Dispatcher`] with all four decoders registered in the
    /// order the probe dispatcher's magic-byte table implies: FLAC, ID3v2,
    /// BMFF, TIFF, then the JPEG/EXIF wrapper (not itself named in the
    /// dispatcher's illustrative magic-byte table, but required by the
    /// decoder set this engine recognizes, so it is registered last behind
    /// its own SOI marker).
    pub fn dispatcher() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        register_enabled_decoders(&mut dispatcher);
        dispatcher
    }

    /// Registers all decoders this crate knows about on `dispatcher`. Split
    /// out from [`dispatcher`] so a caller assembling a custom registry can
    /// call this directly, mirroring the teacher's
    /// `register_enabled_codecs`/`register_enabled_formats`.
    pub fn register_enabled_decoders(dispatcher: &mut Dispatcher) {
        dispatcher.register(Box::new(probe_metadata::FlacDecoder));
        dispatcher.register(Box::new(probe_metadata::Id3v2Decoder));
        dispatcher.register(Box::new(probe_isobmff::BmffDecoder));
        dispatcher.register(Box::new(probe_tiff::TiffDecoder));
        dispatcher.register(Box::new(probe_tiff::JpegDecoder));
    }
}

use std::path::Path;

use log::{trace, warn};

use probe_core::dispatch::{DecodeContext, Dispatcher};
use probe_core::model::{FileRecord, FileType, ScanFlags, ScanJob};
use probe_core::ErrorKind;
use probe_core::stream::{CachedStream, FileStream, Stream};
use probe_core::{use_error, Result};

/// Files shorter than this are not probed: too small to hold any recognized
/// container's magic bytes plus a minimal body.
const MIN_PROBE_SIZE: u64 = 256;

/// Default MIME type assigned to a file the dispatcher could not
/// recognize, or whose matched decoder failed.
const BINARY_STREAM_MIME: &str = "application/octet-stream";

/// Runs one scan: walks `job.root`, and for every regular file reached
/// (subject to `job.flags` and `job.hooks.begin`), opens a cached
/// file-backed stream, dispatches it against `dispatcher`, and appends the
/// resulting [`FileRecord`] to `job.files`.
///
/// Per §7's propagation policy, only top-level argument violations and an
/// unrecoverable failure to open the root cause this to return `Err`;
/// every per-file or per-decoder failure is routed to `job.hooks.logger`
/// and the walk continues.
pub fn scan(job: &mut ScanJob<'_>, dispatcher: &Dispatcher) -> Result<()> {
    if !job.root.exists() {
        return use_error(format!("scan root does not exist: {}", job.root.display()));
    }

    let root = job.root.clone();
    let flags = job.flags;

    let walker = walkdir::WalkDir::new(&root).follow_links(false).contents_first(false).sort_by_file_name();

    let mut entries = walker.into_iter();
    // `min_depth`/`max_depth` can't express "descend only at the caller's
    // request," so the recursive/non-recursive split is done by hand below.
    loop {
        let entry = match entries.next() {
            Some(entry) => entry,
            None => break,
        };

        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                job.hooks.log(&root, ErrorKind::OsError, &format!("walk error: {}", err));
                continue;
            }
        };

        let path = entry.path();
        let is_root = entry.depth() == 0;
        let is_dir = entry.file_type().is_dir();

        if is_dir && !is_root && !flags.contains(ScanFlags::RECURSIVE) {
            entries.skip_current_dir();
            continue;
        }

        if let Some(begin) = job.hooks.begin.as_mut() {
            if begin(path) {
                if is_dir {
                    entries.skip_current_dir();
                }
                continue;
            }
        }

        if is_dir {
            job.accumulators.n_dir_opens += 1;
            let mut record = FileRecord::new(path.to_path_buf(), 0, FileType::Directory);
            record.mime_type = None;
            emit(job, record);
            continue;
        }

        let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let mut record = FileRecord::new(path.to_path_buf(), len, FileType::File);

        if flags.contains(ScanFlags::METADATA) {
            probe_file(job, dispatcher, path, len, &mut record);
        }

        emit(job, record);
    }

    Ok(())
}

fn emit(job: &mut ScanJob<'_>, record: FileRecord) {
    let drop_record = match job.hooks.finish.as_mut() {
        Some(finish) => finish(&record),
        None => false,
    };
    if !drop_record {
        job.files.push(record);
    }
}

fn probe_file(job: &mut ScanJob<'_>, dispatcher: &Dispatcher, path: &Path, len: u64, record: &mut FileRecord) {
    if len < MIN_PROBE_SIZE {
        trace!("skipping probe for {}: below minimum probe size", path.display());
        return;
    }

    let file_stream = match FileStream::open(path) {
        Ok(fs) => fs,
        Err(err) => {
            job.hooks.log(path, ErrorKind::OsError, &format!("cannot open for probing: {}", err));
            return;
        }
    };
    job.accumulators.n_file_opens += 1;

    let mut stream = CachedStream::new(Box::new(file_stream));

    // `ctx`'s log sink both feeds the `log` crate (for a developer running
    // with `RUST_LOG`) and forwards to the caller's own hook, so a format
    // diagnostic a decoder emits via `ctx.log(...)` reaches both channels.
    let dispatch_result = {
        let hooks = &mut job.hooks;
        let mut log = |kind: ErrorKind, msg: &str| {
            warn!("{}: {:?}: {}", path.display(), kind, msg);
            hooks.log(path, kind, msg);
        };
        let mut ctx = DecodeContext::new(path, &mut log);
        dispatcher.dispatch(&mut stream, record, &mut ctx)
    };

    let matched = match dispatch_result {
        Ok(matched) => matched,
        Err(err) => {
            job.hooks.log(path, ErrorKind::OsError, &format!("probe failed: {}", err));
            false
        }
    };

    // UNTYPED (no magic matched) and FAILED (matched, but the decoder left
    // the record untyped per its own success-only contract) both fall back
    // to the same default MIME; only TYPED leaves it alone.
    if record.mime_type.is_none() {
        let reason = if matched { "decoder failed, file left untyped" } else { "no decoder recognized this file" };
        job.hooks.log(path, ErrorKind::Trace, reason);
        record.mime_type = Some(BINARY_STREAM_MIME);
    }

    stream.close();
    job.accumulators.merge(stream.stats());
}
