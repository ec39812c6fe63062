// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The file/metadata data model: file records, metadata elements, and the
//! scan job that owns them for the duration of one `scan()` call.

use std::path::PathBuf;

use crate::error::ErrorKind;

bitflags::bitflags! {
    /// Flags controlling a single [`ScanJob`]'s behavior, mirroring the
    /// `fmdsf_*` bitset of the system this engine replaces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanFlags: u32 {
        /// Descend into subdirectories.
        const RECURSIVE = 1 << 0;
        /// Probe each non-directory file for embedded metadata.
        const METADATA = 1 << 1;
        /// Treat recognized archive entries as pseudo-children.
        const ARCHIVES = 1 << 2;
    }
}

/// A coarse content classification, independent of the specific decoder
/// that recognized a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Archive,
    Media,
    Audio,
    Video,
    Raster,
    Vector,
    Text,
    RichText,
    Spreadsheet,
    Presentation,
    Mail,
}

/// The element-type tag of a [`MetadataElement`]. The data-type carried by
/// `value` is prescribed per element-type (see [`ElementValue`]); decoders
/// are responsible for honoring the pairing, not this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Title,
    Creator,
    Subject,
    Description,
    Artist,
    Performer,
    Album,
    Genre,
    TrackNo,
    Date,
    Isrc,
    Duration,
    SamplingRate,
    NumChannels,
    BitsPerSample,
    FrameWidth,
    FrameHeight,
    ExposureTime,
    FNumber,
    IsoSpeed,
    FocalLength,
    FocalLength35,
    Other,
}

/// The value carried by a [`MetadataElement`]. Rationals are always stored
/// already reduced by `gcd(numerator, denominator)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Int(i64),
    Frac(f64),
    Rational(i32, i32),
    Timestamp(String),
    Text(String),
    /// `key=value` pairs that don't map onto a recognized element-type.
    Other(String, String),
}

impl ElementValue {
    /// Builds a reduced `Rational`, matching the `gcd(num,denom) = 1`
    /// invariant every TIFF-decoder-emitted rational must satisfy.
    pub fn rational(num: i32, denom: i32) -> ElementValue {
        if denom == 0 || num == 0 {
            return ElementValue::Rational(0, 1);
        }
        let g = gcd(num.unsigned_abs(), denom.unsigned_abs()) as i32;
        ElementValue::Rational(num / g, denom / g)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// One piece of extracted metadata, owned by the [`FileRecord`] it was
/// decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataElement {
    pub element_type: ElementType,
    pub value: ElementValue,
}

impl MetadataElement {
    pub fn new(element_type: ElementType, value: ElementValue) -> Self {
        MetadataElement { element_type, value }
    }
}

/// One regular file or directory discovered by the walker, enriched in
/// place by whichever decoder the probe dispatcher selects.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub len: u64,
    pub file_type: FileType,
    /// A borrowed pointer into a static MIME-type table; `None` until a
    /// decoder (or the dispatcher's extension fallback) sets it.
    pub mime_type: Option<&'static str>,
    /// Reverse-discovery order: the most recently appended element is
    /// first. Callers must not assume discovery order.
    pub elements: Vec<MetadataElement>,
}

impl FileRecord {
    pub fn new(path: PathBuf, len: u64, file_type: FileType) -> Self {
        FileRecord { path, len, file_type, mime_type: None, elements: Vec::new() }
    }

    /// Prepends an element, matching the spec's reverse-discovery insertion
    /// order.
    pub fn push_element(&mut self, element_type: ElementType, value: ElementValue) {
        self.elements.insert(0, MetadataElement::new(element_type, value));
    }
}

/// Per-job resource accounting, surfaced to the CLI's `-m` telemetry and to
/// a caller inspecting a finished job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanAccumulators {
    pub n_file_opens: u64,
    pub n_dir_opens: u64,
    pub n_physical_reads: u64,
    pub n_logical_reads: u64,
    pub v_physical_reads: u64,
    pub v_logical_reads: u64,
    pub n_cache_hits: u64,
    pub n_cache_misses: u64,
}

impl ScanAccumulators {
    /// Folds another stream's (or sub-stream's) contribution into this one.
    /// Used by the dispatcher to roll a per-file stream's counters into the
    /// owning job once probing that file completes.
    pub fn merge(&mut self, other: ScanAccumulators) {
        self.n_file_opens += other.n_file_opens;
        self.n_dir_opens += other.n_dir_opens;
        self.n_physical_reads += other.n_physical_reads;
        self.n_logical_reads += other.n_logical_reads;
        self.v_physical_reads += other.v_physical_reads;
        self.v_logical_reads += other.v_logical_reads;
        self.n_cache_hits += other.n_cache_hits;
        self.n_cache_misses += other.n_cache_misses;
    }
}

/// Log level passed to a job's logger hook, one per [`ErrorKind`].
pub type LogLevel = ErrorKind;

/// Caller-supplied hooks, each optional.
pub struct ScanHooks<'a> {
    pub logger: Option<Box<dyn FnMut(&std::path::Path, LogLevel, &str) + 'a>>,
    /// Returning `true` skips probing this path.
    pub begin: Option<Box<dyn FnMut(&std::path::Path) -> bool + 'a>>,
    /// Returning `true` drops the file from the output chain.
    pub finish: Option<Box<dyn FnMut(&FileRecord) -> bool + 'a>>,
}

impl<'a> Default for ScanHooks<'a> {
    fn default() -> Self {
        ScanHooks { logger: None, begin: None, finish: None }
    }
}

impl<'a> ScanHooks<'a> {
    pub fn log(&mut self, path: &std::path::Path, level: LogLevel, msg: &str) {
        if let Some(logger) = self.logger.as_mut() {
            logger(path, level, msg);
        }
    }
}

/// A single `scan()` invocation's state: root location, flags, hooks,
/// accumulators, and the output chain. Owns everything reachable from it;
/// two scans must use two jobs.
pub struct ScanJob<'a> {
    pub root: PathBuf,
    pub flags: ScanFlags,
    pub hooks: ScanHooks<'a>,
    pub accumulators: ScanAccumulators,
    pub files: Vec<FileRecord>,
}

impl<'a> ScanJob<'a> {
    pub fn new(root: PathBuf, flags: ScanFlags) -> Self {
        ScanJob { root, flags, hooks: ScanHooks::default(), accumulators: ScanAccumulators::default(), files: Vec::new() }
    }

    /// Drops every file record, matching `fmd_free_chain`'s bulk-free
    /// contract. Left explicit (rather than relying on `Drop`) since
    /// callers are expected to drain `files` themselves; provided for
    /// parity with the documented library surface.
    pub fn free(&mut self) {
        self.files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_is_reduced() {
        assert_eq!(ElementValue::rational(4, 8), ElementValue::Rational(1, 2));
        assert_eq!(ElementValue::rational(-6, 9), ElementValue::Rational(-2, 3));
        assert_eq!(ElementValue::rational(0, 5), ElementValue::Rational(0, 1));
    }

    #[test]
    fn elements_prepend_in_reverse_discovery_order() {
        let mut file = FileRecord::new(PathBuf::from("a.flac"), 0, FileType::Audio);
        file.push_element(ElementType::Title, ElementValue::Text("first".into()));
        file.push_element(ElementType::Artist, ElementValue::Text("second".into()));
        assert_eq!(file.elements[0].element_type, ElementType::Artist);
        assert_eq!(file.elements[1].element_type, ElementType::Title);
    }
}
