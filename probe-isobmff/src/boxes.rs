// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The BMFF box iterator.
//!
//! Grounded on the teacher's `AtomHeader`/`AtomIterator` pair in
//! `symphonia-format-isomp4::atoms`, adapted from a sequential `ReadBytes`
//! cursor to this engine's random-access `Stream::get(offs, len)` contract:
//! a box header is read with two explicit `get` calls at an absolute offset
//! rather than consumed off a forward-only reader, and a child iterator is
//! bounded to `[start, end)` instead of carrying a borrowed parent header.

use probe_core::stream::Stream;
use probe_core::{format_error, ProbeError, Result};

/// A box header: 4-byte big-endian size, 4-byte type, with the size=0
/// ("extends to container end") and size=1 ("64-bit size follows") cases
/// from the spec resolved into `box_len`/`header_len`.
#[derive(Copy, Clone, Debug)]
pub struct BoxHeader {
    pub box_type: [u8; 4],
    /// Absolute offset of the first header byte.
    pub pos: u64,
    pub header_len: u8,
    /// Total box length including the header, if bounded by this box's own
    /// size field rather than the enclosing container.
    pub box_len: Option<u64>,
}

impl BoxHeader {
    /// Absolute offset of the first payload byte.
    pub fn payload_pos(&self) -> u64 {
        self.pos + self.header_len as u64
    }

    /// Payload length, if `box_len` is known.
    pub fn payload_len(&self) -> Option<u64> {
        self.box_len.map(|l| l - self.header_len as u64)
    }
}

fn read_header(stream: &mut dyn Stream, pos: u64) -> Result<BoxHeader> {
    let head = stream.get(pos as i64, 8)?;
    let small_len = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let box_type: [u8; 4] = [head[4], head[5], head[6], head[7]];

    match small_len {
        0 => Ok(BoxHeader { box_type, pos, header_len: 8, box_len: None }),
        1 => {
            let ext = stream.get((pos + 8) as i64, 8)?;
            let large_len = u64::from_be_bytes(ext.try_into().unwrap());
            if large_len < 16 {
                return format_error("isobmff: box size is invalid");
            }
            Ok(BoxHeader { box_type, pos, header_len: 16, box_len: Some(large_len) })
        }
        n => {
            if (n as u64) < 8 {
                return format_error("isobmff: box size is invalid");
            }
            Ok(BoxHeader { box_type, pos, header_len: 8, box_len: Some(n as u64) })
        }
    }
}

/// Walks sibling boxes within `[start, end)` of a stream. `end` is `None`
/// for the root iterator (spans the whole stream, which is itself bounded
/// by the file's size).
pub struct BoxIterator {
    pos: u64,
    end: Option<u64>,
}

impl BoxIterator {
    pub fn new_root(stream: &dyn Stream) -> Self {
        BoxIterator { pos: 0, end: Some(stream.size()) }
    }

    /// A child iterator over `header`'s payload.
    pub fn child(header: &BoxHeader) -> Self {
        BoxIterator { pos: header.payload_pos(), end: header.box_len.map(|_| header.payload_pos() + header.payload_len().unwrap()) }
    }

    /// Reads the next sibling header, or `None` at the end of this
    /// iterator's range.
    pub fn next(&mut self, stream: &mut dyn Stream) -> Result<Option<BoxHeader>> {
        if let Some(end) = self.end {
            if self.pos >= end {
                return Ok(None);
            }
        } else if self.pos >= stream.size() {
            return Ok(None);
        }

        let header = read_header(stream, self.pos)?;

        self.pos = match header.box_len {
            Some(len) => self.pos + len,
            None => self.end.unwrap_or_else(|| stream.size()),
        };

        if let Some(end) = self.end {
            if self.pos > end {
                return Err(ProbeError::Format("isobmff: box overruns its container".into()));
            }
        }

        Ok(Some(header))
    }
}
