// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The byte-stream capability abstraction every decoder is written against,
//! and its four implementations: file-backed, paged-cached, ranged, and
//! (behind the `archive` feature) archive-backed.
//!
//! The teacher's `MediaSourceStream` amortizes sequential reads behind one
//! exponentially growing ring buffer tuned for a decode pass that mostly
//! reads forward. Decoders here instead call `get(offs, len)` at scattered
//! offsets scattered across a container (a BMFF `moov` tree, a TIFF IFD
//! chain with external values) with very little locality, so the cache
//! below is a small fully-associative set of fixed pages with LRU
//! replacement, matching the random-access pattern rather than the
//! sequential one.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{ProbeError, Result};
use crate::model::ScanAccumulators;

/// Default page size for the cached stream: 32 KiB, per the spec's budget.
pub const PAGE_SIZE: usize = 32 * 1024;
/// Default page count for the cached stream: 4 fully-associative pages.
pub const PAGE_COUNT: usize = 4;

/// The capability every decoder reads through.
///
/// `get` returns a view borrowed from the stream's own buffer; the borrow's
/// lifetime (tied to `&mut self`) is exactly the spec's "valid until the
/// next `get` or `close`" invariant — the borrow checker enforces it, since
/// no second call can be made while the first view is still held.
pub trait Stream {
    /// Total size of the stream in bytes.
    fn size(&self) -> u64;

    /// Returns a borrowed view of `len` bytes starting at `offs`. A negative
    /// `offs` is relative to end-of-file (`size() + offs`). `len` must not
    /// exceed the stream's page size.
    fn get(&mut self, offs: i64, len: usize) -> Result<&[u8]>;

    /// Releases resources held by this stream (file descriptors, archive
    /// handles). A no-op for streams that don't own anything to release.
    fn close(&mut self);

    /// This stream's own contribution to job-level telemetry. Streams that
    /// wrap another stream are responsible for folding the wrapped stream's
    /// stats into their own so the dispatcher only has to read the
    /// outermost stream after a decode call completes.
    fn stats(&self) -> ScanAccumulators {
        ScanAccumulators::default()
    }

    fn resolve_offset(&self, offs: i64) -> Result<u64> {
        let size = self.size();
        if offs >= 0 {
            Ok(offs as u64)
        } else {
            let back = (-offs) as u64;
            if back > size {
                Err(ProbeError::OutOfBounds)
            } else {
                Ok(size - back)
            }
        }
    }
}

/// A single file opened by path, with one page-sized buffer covering the
/// most recently read range.
pub struct FileStream {
    file: File,
    size: u64,
    buf: Vec<u8>,
    buf_start: u64,
    buf_len: usize,
    stats: ScanAccumulators,
}

impl FileStream {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut stats = ScanAccumulators::default();
        stats.n_file_opens = 1;
        Ok(FileStream { file, size, buf: vec![0u8; PAGE_SIZE], buf_start: 0, buf_len: 0, stats })
    }

    fn covers(&self, offs: u64, len: usize) -> bool {
        self.buf_len > 0
            && offs >= self.buf_start
            && offs + len as u64 <= self.buf_start + self.buf_len as u64
    }

    fn fill_page(&mut self, offs: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offs))?;
        let to_read = PAGE_SIZE.min((self.size - offs) as usize);
        let n = self.file.read(&mut self.buf[..to_read])?;
        self.buf_start = offs;
        self.buf_len = n;
        self.stats.n_physical_reads += 1;
        self.stats.v_physical_reads += n as u64;
        Ok(())
    }
}

impl Stream for FileStream {
    fn size(&self) -> u64 {
        self.size
    }

    fn get(&mut self, offs: i64, len: usize) -> Result<&[u8]> {
        let abs = self.resolve_offset(offs)?;
        if abs + len as u64 > self.size {
            return Err(ProbeError::OutOfBounds);
        }
        if !self.covers(abs, len) {
            self.fill_page(abs)?;
        }
        let start = (abs - self.buf_start) as usize;
        Ok(&self.buf[start..start + len])
    }

    fn close(&mut self) {
        // `File`'s descriptor is released on drop; nothing further to do.
    }

    fn stats(&self) -> ScanAccumulators {
        self.stats
    }
}

struct Page {
    start: u64,
    len: usize,
    data: Box<[u8; PAGE_SIZE]>,
    generation: u64,
    occupied: bool,
}

impl Page {
    fn empty() -> Self {
        Page { start: 0, len: 0, data: Box::new([0u8; PAGE_SIZE]), generation: 0, occupied: false }
    }

    fn covers(&self, offs: u64, len: usize) -> bool {
        self.occupied && offs >= self.start && offs + len as u64 <= self.start + self.len as u64
    }
}

/// A fixed-size fully-associative page cache over another stream.
///
/// On `get`, pages are scanned starting from the most-recent-hit index
/// (circularly) for one that covers the request. A miss evicts the first
/// empty page found during the scan, or, if all pages are full, the page
/// with the lowest `generation` (least-recently-used).
pub struct CachedStream {
    inner: Box<dyn Stream>,
    pages: [Page; PAGE_COUNT],
    most_recent_hit: usize,
    generation: u64,
    stats: ScanAccumulators,
    /// Holds the bytes of a request that straddles two page-aligned pages,
    /// since no single page's `[u8; PAGE_SIZE]` buffer can back a
    /// contiguous slice across the boundary.
    straddle: Vec<u8>,
}

impl CachedStream {
    pub fn new(inner: Box<dyn Stream>) -> Self {
        CachedStream {
            inner,
            pages: [Page::empty(), Page::empty(), Page::empty(), Page::empty()],
            most_recent_hit: 0,
            generation: 0,
            stats: ScanAccumulators::default(),
            straddle: Vec::new(),
        }
    }

    fn find_covering(&self, offs: u64, len: usize) -> Option<usize> {
        for i in 0..PAGE_COUNT {
            let idx = (self.most_recent_hit + i) % PAGE_COUNT;
            if self.pages[idx].covers(offs, len) {
                return Some(idx);
            }
        }
        None
    }

    fn pick_victim(&self) -> usize {
        for i in 0..PAGE_COUNT {
            let idx = (self.most_recent_hit + i) % PAGE_COUNT;
            if !self.pages[idx].occupied {
                return idx;
            }
        }
        self.pages
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.generation)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn load(&mut self, page_aligned_start: u64) -> Result<usize> {
        let victim = self.pick_victim();
        let want = PAGE_SIZE.min((self.inner.size() - page_aligned_start) as usize);
        let bytes = self.inner.get(page_aligned_start as i64, want)?;
        self.pages[victim].data[..want].copy_from_slice(bytes);
        self.pages[victim].start = page_aligned_start;
        self.pages[victim].len = want;
        self.pages[victim].occupied = true;
        self.generation += 1;
        self.pages[victim].generation = self.generation;
        self.stats.n_cache_misses += 1;
        self.stats.n_logical_reads += 1;
        self.stats.v_logical_reads += want as u64;
        Ok(victim)
    }
}

impl Stream for CachedStream {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn get(&mut self, offs: i64, len: usize) -> Result<&[u8]> {
        let abs = self.resolve_offset(offs)?;
        if len > PAGE_SIZE {
            return Err(ProbeError::Unsupported("get() len exceeds page size"));
        }
        if abs + len as u64 > self.size() {
            return Err(ProbeError::OutOfBounds);
        }

        // A request straddling a page boundary can't be served by any single
        // page-aligned page (nor cached in one), since a page's backing
        // buffer is exactly `PAGE_SIZE` bytes wide. Read it directly from
        // the underlying stream into a scratch buffer instead of indexing
        // past a page's bounds.
        if len > 0 {
            let last_byte_page = (abs + len as u64 - 1) / PAGE_SIZE as u64;
            let first_byte_page = abs / PAGE_SIZE as u64;
            if first_byte_page != last_byte_page {
                let bytes = self.inner.get(abs as i64, len)?;
                self.straddle.clear();
                self.straddle.extend_from_slice(bytes);
                self.stats.n_cache_misses += 1;
                self.stats.n_logical_reads += 1;
                self.stats.v_logical_reads += len as u64;
                return Ok(&self.straddle[..len]);
            }
        }

        let idx = match self.find_covering(abs, len) {
            Some(idx) => {
                self.generation += 1;
                self.pages[idx].generation = self.generation;
                self.stats.n_cache_hits += 1;
                self.stats.n_logical_reads += 1;
                self.stats.v_logical_reads += len as u64;
                idx
            }
            None => {
                let page_aligned_start = (abs / PAGE_SIZE as u64) * PAGE_SIZE as u64;
                self.load(page_aligned_start)?
            }
        };

        self.most_recent_hit = idx;
        let page = &self.pages[idx];
        let start = (abs - page.start) as usize;
        Ok(&page.data[start..start + len])
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn stats(&self) -> ScanAccumulators {
        let mut s = self.stats;
        s.merge(self.inner.stats());
        s
    }
}

/// A view `[start, start+len)` of an underlying stream. Does not own the
/// underlying stream: `close` releases nothing beyond the ranged stream
/// itself.
pub struct RangedStream<'a> {
    inner: &'a mut dyn Stream,
    start: u64,
    len: u64,
}

impl<'a> RangedStream<'a> {
    pub fn new(inner: &'a mut dyn Stream, start: u64, len: u64) -> Self {
        RangedStream { inner, start, len }
    }
}

impl<'a> Stream for RangedStream<'a> {
    fn size(&self) -> u64 {
        self.len
    }

    fn get(&mut self, offs: i64, len: usize) -> Result<&[u8]> {
        let abs = self.resolve_offset(offs)?;
        if abs + len as u64 > self.len {
            return Err(ProbeError::OutOfBounds);
        }
        self.inner.get((self.start + abs) as i64, len)
    }

    fn close(&mut self) {
        // Intentionally does not close `inner`: the ranged stream never
        // owned it.
    }

    fn stats(&self) -> ScanAccumulators {
        self.inner.stats()
    }
}

/// Forward-only stream over a single archive entry, present when the
/// `archive` feature is enabled. Backward `get` calls fail with
/// `Unsupported`; meant to be wrapped in a [`CachedStream`] so random-access
/// decoders can still operate on the leading portion of the entry.
#[cfg(feature = "archive")]
pub struct ArchiveStream {
    data: Vec<u8>,
    pos: u64,
    stats: ScanAccumulators,
}

#[cfg(feature = "archive")]
impl ArchiveStream {
    /// Archive entries are read from a `zip::read::ZipFile` eagerly into
    /// memory by the caller (archive members are typically small relative
    /// to the pages a metadata decoder touches), then wrapped here so the
    /// rest of the stream stack is uniform.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mut stats = ScanAccumulators::default();
        stats.n_physical_reads = 1;
        stats.v_physical_reads = data.len() as u64;
        ArchiveStream { data, pos: 0, stats }
    }
}

#[cfg(feature = "archive")]
impl Stream for ArchiveStream {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn get(&mut self, offs: i64, len: usize) -> Result<&[u8]> {
        let abs = self.resolve_offset(offs)?;
        if (abs as i64) < self.pos as i64 {
            return Err(ProbeError::Unsupported("archive stream is forward-only"));
        }
        if abs + len as u64 > self.size() {
            return Err(ProbeError::OutOfBounds);
        }
        self.pos = abs;
        Ok(&self.data[abs as usize..abs as usize + len])
    }

    fn close(&mut self) {}

    fn stats(&self) -> ScanAccumulators {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("probe-core-test-{}-{}", std::process::id(), bytes.len()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn file_stream_reads_match_source() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let path = write_temp(&data);
        let mut fs = FileStream::open(&path).unwrap();

        assert_eq!(fs.size(), data.len() as u64);
        assert_eq!(fs.get(0, 16).unwrap(), &data[0..16]);
        assert_eq!(fs.get(100_000, 16).unwrap(), &data[100_000..100_016]);
        assert_eq!(fs.get(-10, 10).unwrap(), &data[data.len() - 10..]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn cached_stream_matches_uncached_and_counts_hits() {
        let data: Vec<u8> = (0..500_000u32).map(|i| (i % 197) as u8).collect();
        let path = write_temp(&data);
        let fs = FileStream::open(&path).unwrap();
        let mut cs = CachedStream::new(Box::new(fs));

        let offsets = [0usize, 10, 5, 40_000, 40_010, 200_000, 0];
        for &o in &offsets {
            assert_eq!(cs.get(o as i64, 8).unwrap(), &data[o..o + 8]);
        }

        let stats = cs.stats();
        assert_eq!(stats.n_cache_hits + stats.n_cache_misses, offsets.len() as u64);
        assert!(stats.n_cache_hits > 0, "repeated offsets should hit");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn cached_stream_handles_cross_page_request() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 233) as u8).collect();
        let path = write_temp(&data);
        let fs = FileStream::open(&path).unwrap();
        let mut cs = CachedStream::new(Box::new(fs));

        // [32760, 32776) straddles the page-aligned boundary at 32768.
        let offs = PAGE_SIZE - 8;
        assert_eq!(cs.get(offs as i64, 16).unwrap(), &data[offs..offs + 16]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn ranged_stream_bounds_and_offsets() {
        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let path = write_temp(&data);
        let mut fs = FileStream::open(&path).unwrap();
        let mut ranged = RangedStream::new(&mut fs, 100, 50);

        assert_eq!(ranged.size(), 50);
        assert_eq!(ranged.get(0, 10).unwrap(), &data[100..110]);
        assert!(ranged.get(45, 10).is_err());

        std::fs::remove_file(path).ok();
    }
}
