// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vorbis comment decoding, shared by the FLAC decoder (and reusable by an
//! Ogg Vorbis decoder should one be added later, as the teacher's own
//! `symphonia-metadata::vorbis` is shared between its FLAC and Ogg readers).

use std::collections::HashMap;

use lazy_static::lazy_static;

use probe_core::model::{ElementType, ElementValue, FileRecord};

lazy_static! {
    /// Unlike the teacher's `VORBIS_COMMENT_MAP` (which maps dozens of
    /// freeform keys to `StandardTagKey` variants for a general-purpose tag
    /// library), this engine recognizes only the fixed set of keys named by
    /// the metadata element-type enumeration.
    static ref VORBIS_KEY_MAP: HashMap<&'static str, ElementType> = {
        let mut m = HashMap::new();
        m.insert("title", ElementType::Title);
        m.insert("album", ElementType::Album);
        m.insert("tracknumber", ElementType::TrackNo);
        m.insert("artist", ElementType::Artist);
        m.insert("performer", ElementType::Performer);
        m.insert("description", ElementType::Description);
        m.insert("genre", ElementType::Genre);
        m.insert("date", ElementType::Date);
        m.insert("isrc", ElementType::Isrc);
        m
    };
}

/// Splits one `key=value` Vorbis comment and, if recognized, pushes the
/// corresponding element onto `file`. `tracknumber` is parsed as an integer
/// and silently dropped if non-decimal, per the spec.
fn parse_comment(comment: &str, file: &mut FileRecord) {
    let mut parts = comment.splitn(2, '=');
    let key = match parts.next() {
        Some(k) => k,
        None => return,
    };
    let value = parts.next().unwrap_or("");

    let element_type = match VORBIS_KEY_MAP.get(key.to_ascii_lowercase().as_str()) {
        Some(&t) => t,
        None => return,
    };

    match element_type {
        ElementType::TrackNo => {
            if let Ok(n) = value.trim().parse::<i64>() {
                file.push_element(ElementType::TrackNo, ElementValue::Int(n));
            }
        }
        other => file.push_element(other, ElementValue::Text(value.to_string())),
    }
}

/// Reads an un-framed Vorbis comment block: a 4-byte little-endian vendor
/// length + vendor string (pushed as `creator`), a 4-byte little-endian
/// comment count, then each comment as a 4-byte length + UTF-8 text.
pub fn read_comment_no_framing(buf: &[u8], file: &mut FileRecord) -> probe_core::Result<()> {
    let mut pos = 0usize;
    let read_u32_le = |buf: &[u8], pos: usize| -> probe_core::Result<u32> {
        buf.get(pos..pos + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or(probe_core::ProbeError::OutOfBounds)
    };

    let vendor_len = read_u32_le(buf, pos)? as usize;
    pos += 4;
    let vendor = buf
        .get(pos..pos + vendor_len)
        .ok_or(probe_core::ProbeError::OutOfBounds)?;
    file.push_element(ElementType::Creator, ElementValue::Text(String::from_utf8_lossy(vendor).into_owned()));
    pos += vendor_len;

    let n_comments = read_u32_le(buf, pos)?;
    pos += 4;

    for _ in 0..n_comments {
        let len = read_u32_le(buf, pos)? as usize;
        pos += 4;
        let bytes = buf.get(pos..pos + len).ok_or(probe_core::ProbeError::OutOfBounds)?;
        pos += len;
        parse_comment(&String::from_utf8_lossy(bytes), file);
    }

    Ok(())
}
