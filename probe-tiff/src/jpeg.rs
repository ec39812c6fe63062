// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The JPEG segment iterator and the APP1/EXIF wrapper decoder.
//!
//! JPEG has no part in the teacher's own tree (an audio demuxer has no use
//! for still-image containers); this module is grounded entirely on the
//! segment-framing rules named directly in the specification this engine
//! implements: a `0xFF`-prefixed marker byte, `SOI`/`EOI` carrying no
//! length, every other segment framed by a 2-byte big-endian length that
//! includes the length field itself.

use probe_core::dispatch::{DecodeContext, Decoder};
use probe_core::model::{FileRecord, FileType};
use probe_core::stream::{RangedStream, Stream};
use probe_core::{format_error, Result};

use crate::decoder::TiffDecoder;

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const APP1: u8 = 0xE1;
const EXIF_PREFIX: &[u8; 6] = b"Exif\0\0";

struct Segment {
    marker: u8,
    /// Absolute offset of the first payload byte (after the length field,
    /// if this marker has one).
    payload_pos: u64,
    payload_len: u64,
}

/// Walks the JPEG segment chain starting at `pos`, returning the next
/// segment or `None` at end of stream.
fn next_segment(stream: &mut dyn Stream, pos: &mut u64) -> Result<Option<Segment>> {
    if *pos + 2 > stream.size() {
        return Ok(None);
    }

    let prefix = stream.get(*pos as i64, 2)?;
    if prefix[0] != MARKER_PREFIX {
        return format_error("jpeg: expected marker prefix 0xFF");
    }
    let marker = prefix[1];
    *pos += 2;

    if marker == SOI || marker == EOI {
        return Ok(Some(Segment { marker, payload_pos: *pos, payload_len: 0 }));
    }

    if *pos + 2 > stream.size() {
        return format_error("jpeg: truncated segment length");
    }
    let len_bytes = stream.get(*pos as i64, 2)?;
    let seg_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as u64;
    if seg_len < 2 {
        return format_error("jpeg: segment length is too small");
    }

    let payload_pos = *pos + 2;
    let payload_len = seg_len - 2;
    *pos = payload_pos + payload_len;

    Ok(Some(Segment { marker, payload_pos, payload_len }))
}

/// Recognizes a JPEG file and, if it carries an APP1 Exif payload, decodes
/// it by handing a ranged stream over the embedded TIFF to [`TiffDecoder`].
pub struct JpegDecoder;

impl Decoder for JpegDecoder {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn matches(&self, header: &[u8]) -> bool {
        header.len() >= 2 && header[0] == MARKER_PREFIX && header[1] == SOI
    }

    fn decode(&self, stream: &mut dyn Stream, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let mut pos = 0u64;
        while let Some(segment) = next_segment(stream, &mut pos)? {
            if segment.marker == EOI {
                break;
            }
            if segment.marker != APP1 || segment.payload_len < EXIF_PREFIX.len() as u64 {
                continue;
            }

            let prefix = stream.get(segment.payload_pos as i64, EXIF_PREFIX.len())?;
            if prefix != EXIF_PREFIX {
                continue;
            }

            let tiff_start = segment.payload_pos + EXIF_PREFIX.len() as u64;
            let tiff_len = segment.payload_len - EXIF_PREFIX.len() as u64;
            let mut ranged = RangedStream::new(stream, tiff_start, tiff_len);

            return match TiffDecoder.decode(&mut ranged, file, ctx) {
                Ok(()) => {
                    // The TIFF decoder stamps its own MIME type; restore the
                    // wrapper's, per the spec's "on success set MIME to
                    // image/jpeg".
                    file.file_type = FileType::Raster;
                    file.mime_type = Some("image/jpeg");
                    Ok(())
                }
                Err(err) => {
                    ctx.log(probe_core::ErrorKind::Format, format!("jpeg: embedded exif decode failed: {}", err));
                    format_error("jpeg: no usable embedded exif payload")
                }
            };
        }

        format_error("jpeg: no embedded exif payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::model::{ElementType, ElementValue};
    use probe_core::stream::{CachedStream, FileStream};
    use std::io::Write;
    use std::path::PathBuf;

    fn write_temp(bytes: &[u8]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("probe-jpeg-test-{}-{}", std::process::id(), bytes.len()));
        std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    fn build_tiff_payload() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"MM");
        data.extend_from_slice(&42u16.to_be_bytes());
        data.extend_from_slice(&8u32.to_be_bytes());

        data.extend_from_slice(&1u16.to_be_bytes()); // one entry
        data.extend_from_slice(&256u16.to_be_bytes()); // width tag
        data.extend_from_slice(&4u16.to_be_bytes()); // type long
        data.extend_from_slice(&1u32.to_be_bytes()); // count 1
        data.extend_from_slice(&800u32.to_be_bytes()); // value
        data.extend_from_slice(&0u32.to_be_bytes()); // next ifd

        data
    }

    #[test]
    fn decodes_embedded_exif_via_app1() {
        let tiff = build_tiff_payload();

        let mut app1_payload = EXIF_PREFIX.to_vec();
        app1_payload.extend_from_slice(&tiff);

        let mut data = vec![MARKER_PREFIX, SOI];
        data.push(MARKER_PREFIX);
        data.push(APP1);
        data.extend_from_slice(&((app1_payload.len() + 2) as u16).to_be_bytes());
        data.extend_from_slice(&app1_payload);
        data.push(MARKER_PREFIX);
        data.push(EOI);

        let path = write_temp(&data);
        let mut stream = CachedStream::new(Box::new(FileStream::open(&path).unwrap()));
        let mut file = FileRecord::new(path.clone(), data.len() as u64, FileType::File);
        let mut log = |_k, _m: &str| {};
        let mut ctx = DecodeContext::new(&path, &mut log);

        JpegDecoder.decode(&mut stream, &mut file, &mut ctx).unwrap();

        assert_eq!(file.mime_type, Some("image/jpeg"));
        assert!(file.elements.iter().any(|e| e.element_type == ElementType::FrameWidth
            && e.value == ElementValue::Int(800)));

        std::fs::remove_file(path).ok();
    }
}
