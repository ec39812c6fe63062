// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The TIFF IFD walker.
//!
//! Grounded on `TiffParser::read_ifd` (an `ome-bioformats-rs` reference
//! file): a 16-bit entry count, that many 12-byte entries, then a 32-bit
//! next-IFD offset, with the `n_bytes > 4` inline-vs-external branch taken
//! per entry. The ascending-tag invariant and the per-tag type-mask/count
//! table are grounded on the original C implementation's `fmdp_tiff_parse_ifd_entry`
//! and its per-IFD tag tables (`fmdp_tiff_do_baseline_ifd`, `do_exififd`,
//! `do_gpsifd`), which reject out-of-order tags and silently skip entries
//! whose type or count doesn't match what the tag expects.

use probe_core::stream::Stream;
use probe_core::{format_error, ErrorKind, ProbeError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn u16(&self, b: &[u8]) -> u16 {
        match self {
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
        }
    }

    pub fn u32(&self, b: &[u8]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }
}

/// TIFF 6.0 field types. `type_size` is `None` for anything outside 1..=12,
/// which the walker treats as a format error per the original's `type > 12`
/// rejection.
pub fn type_size(ty: u16) -> Option<u32> {
    match ty {
        1 | 2 | 6 | 7 => Some(1),       // byte, ascii, sbyte, undefined
        3 | 8 => Some(2),               // short, sshort
        4 | 9 | 11 => Some(4),          // long, slong, float
        5 | 10 | 12 => Some(8),         // rational, srational, double
        _ => None,
    }
}

#[derive(Copy, Clone, Debug)]
pub struct RawEntry {
    pub tag: u16,
    pub ty: u16,
    pub count: u32,
    /// The 4 value/offset bytes, exactly as stored in the entry.
    pub value: [u8; 4],
}

/// Resolves an entry's value bytes: inline if `count * type_size(ty) <= 4`,
/// otherwise an external read at the offset stored in `value`, bounds
/// checked against the stream size.
pub fn entry_bytes(stream: &mut dyn Stream, order: ByteOrder, entry: &RawEntry) -> Result<Vec<u8>> {
    let elem_size = type_size(entry.ty).ok_or(ProbeError::Format("tiff: unrecognized field type".into()))?;
    let total = elem_size as u64 * entry.count as u64;

    if total <= 4 {
        Ok(entry.value[..total as usize].to_vec())
    } else {
        let offset = order.u32(&entry.value) as u64;
        if offset + total > stream.size() {
            return format_error("tiff: external field value out of bounds");
        }
        let mut out = Vec::with_capacity(total as usize);
        let mut remaining = total;
        let mut pos = offset;
        while remaining > 0 {
            let chunk = remaining.min(probe_core::stream::PAGE_SIZE as u64) as usize;
            out.extend_from_slice(stream.get(pos as i64, chunk)?);
            pos += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(out)
    }
}

fn read_entry(stream: &mut dyn Stream, order: ByteOrder, pos: u64) -> Result<RawEntry> {
    let raw = stream.get(pos as i64, 12)?;
    let tag = order.u16(&raw[0..2]);
    let ty = order.u16(&raw[2..4]);
    let count = order.u32(&raw[4..8]);
    let mut value = [0u8; 4];
    value.copy_from_slice(&raw[8..12]);
    if count == 0 {
        return format_error("tiff: ifd entry has zero count");
    }
    Ok(RawEntry { tag, ty, count, value })
}

/// Walks one IFD at `offset`, invoking `handler` for every entry whose tag
/// and type pass `handler`'s own recognition check. Tags must appear in
/// strictly ascending order; a violation is logged as a format error and
/// stops walking *this* IFD (the caller may still have already captured
/// pointers to child IFDs from earlier, in-order entries).
///
/// Returns the next-IFD offset (0 means "no more IFDs").
pub fn walk_ifd(
    stream: &mut dyn Stream,
    order: ByteOrder,
    offset: u64,
    mut log: impl FnMut(ErrorKind, &str),
    mut handler: impl FnMut(&mut dyn Stream, ByteOrder, &RawEntry) -> Result<()>,
) -> Result<u32> {
    if offset + 2 > stream.size() {
        return format_error("tiff: ifd offset out of bounds");
    }
    let count = order.u16(stream.get(offset as i64, 2)?) as u64;

    let mut last_tag: Option<u16> = None;
    let mut pos = offset + 2;

    for i in 0..count {
        if pos + 12 > stream.size() {
            return format_error("tiff: ifd entry out of bounds");
        }
        let entry = match read_entry(stream, order, pos) {
            Ok(e) => e,
            Err(err) => {
                log(ErrorKind::Format, &format!("tiff: malformed ifd entry {}: {}", i, err));
                pos += 12;
                continue;
            }
        };

        if let Some(last) = last_tag {
            if entry.tag <= last {
                log(ErrorKind::Format, "tiff: ifd entries are not in ascending tag order");
                return Ok(0);
            }
        }
        last_tag = Some(entry.tag);

        if let Err(err) = handler(stream, order, &entry) {
            log(ErrorKind::Format, &format!("tiff: entry for tag {} skipped: {}", entry.tag, err));
        }

        pos += 12;
    }

    if pos + 4 > stream.size() {
        return format_error("tiff: missing next-ifd offset");
    }
    Ok(order.u32(stream.get(pos as i64, 4)?))
}
