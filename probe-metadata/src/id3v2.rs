// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ID3v2.3/2.4 tag and frame decoding.
//!
//! Grounded on the teacher's `symphonia-metadata::id3v2` header/frame split:
//! a 10-byte tag header (3-byte `ID3` marker, major/minor version, flags, a
//! synchsafe 28-bit size) followed by a frame stream whose per-frame header
//! differs only in how the frame size is encoded — a plain big-endian u32
//! in 2.3, a synchsafe u32 in 2.4. Unlike the teacher, which supports
//! 2.2 through 2.4 and dozens of frame types via a declarative frame-reader
//! table, this decoder only recognizes the fixed frame set the spec names
//! and rejects 2.2 outright (its 3-byte frame ids and 3-byte sizes are a
//! different wire format, not just a smaller frame table).

use probe_core::dispatch::{DecodeContext, Decoder};
use probe_core::model::{ElementType, ElementValue, FileRecord, FileType};
use probe_core::stream::Stream;
use probe_core::{format_error, unsupported_error, ErrorKind, Result};

const ID3_MARKER: &[u8; 3] = b"ID3";

fn read_syncsafe28(bytes: &[u8; 4]) -> u32 {
    ((bytes[0] as u32) << 21) | ((bytes[1] as u32) << 14) | ((bytes[2] as u32) << 7) | (bytes[3] as u32)
}

fn frame_element(id: &[u8; 4]) -> Option<ElementType> {
    match id {
        b"TIT2" => Some(ElementType::Title),
        b"TALB" => Some(ElementType::Album),
        b"TRCK" => Some(ElementType::TrackNo),
        b"TOPE" => Some(ElementType::Artist),
        b"TPE1" => Some(ElementType::Performer),
        b"TENC" => Some(ElementType::Creator),
        b"TDAT" | b"TYER" => Some(ElementType::Date),
        b"TSRC" => Some(ElementType::Isrc),
        _ => None,
    }
}

/// Decodes a text frame body: a one-byte encoding indicator followed by the
/// text. Encoding `0` is ISO-8859-1 (every byte maps 1:1 to the matching
/// Unicode code point); encoding `1` is UCS-2 with a leading byte-order
/// mark. Any other encoding byte is ignored, per the spec.
fn decode_text_frame(body: &[u8]) -> Option<String> {
    let (&encoding, rest) = body.split_first()?;
    match encoding {
        0 => Some(rest.iter().map(|&b| b as char).collect()),
        1 => decode_ucs2_with_bom(rest),
        _ => None,
    }
}

fn decode_ucs2_with_bom(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 2 {
        return Some(String::new());
    }
    let big_endian = match [bytes[0], bytes[1]] {
        [0xFE, 0xFF] => true,
        [0xFF, 0xFE] => false,
        _ => return None,
    };

    let units: Vec<u16> = bytes[2..]
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .take_while(|&u| u != 0)
        .collect();

    Some(String::from_utf16_lossy(&units))
}

fn push_frame_value(file: &mut FileRecord, element_type: ElementType, text: &str) {
    if element_type == ElementType::TrackNo {
        let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse::<i64>() {
            file.push_element(ElementType::TrackNo, ElementValue::Int(n));
        }
    } else {
        file.push_element(element_type, ElementValue::Text(text.trim_end_matches('\0').to_string()));
    }
}

/// Decodes an ID3v2.3/2.4 tag: the tag header, then frames until the
/// declared tag size is exhausted.
pub struct Id3v2Decoder;

impl Decoder for Id3v2Decoder {
    fn name(&self) -> &'static str {
        "id3v2"
    }

    fn matches(&self, header: &[u8]) -> bool {
        // The spec's five-byte sanity check beyond the "ID3" marker: bytes
        // 3,4 (version) < 0xFF, bytes 6-9 (synchsafe size) each < 0x80.
        header.len() >= 10
            && &header[..3] == ID3_MARKER
            && header[3] < 0xFF
            && header[4] < 0xFF
            && header[6] < 0x80
            && header[7] < 0x80
            && header[8] < 0x80
            && header[9] < 0x80
    }

    fn decode(&self, stream: &mut dyn Stream, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let header = stream.get(0, 10)?.to_vec();
        let major_version = header[3];
        let tag_size = read_syncsafe28(&[header[6], header[7], header[8], header[9]]);

        if major_version < 3 || major_version > 4 {
            return unsupported_error("id3v2: only ID3v2.3 and ID3v2.4 are supported");
        }

        let tag_end = 10u64 + tag_size as u64;
        if tag_end > stream.size() {
            return format_error("id3v2: tag size extends past end of file");
        }

        let mut pos = 10u64;
        while pos + 10 <= tag_end {
            let frame_header = stream.get(pos as i64, 10)?.to_vec();
            let id: [u8; 4] = frame_header[0..4].try_into().unwrap();

            if id == [0, 0, 0, 0] {
                // Padding: nothing more to read in this tag.
                break;
            }

            let frame_size = if major_version == 4 {
                read_syncsafe28(&[frame_header[4], frame_header[5], frame_header[6], frame_header[7]])
            } else {
                u32::from_be_bytes([frame_header[4], frame_header[5], frame_header[6], frame_header[7]])
            };

            pos += 10;

            if pos + frame_size as u64 > tag_end {
                ctx.log(ErrorKind::Format, "id3v2: frame size extends past end of tag");
                break;
            }

            if let Some(element_type) = frame_element(&id) {
                let body = stream.get(pos as i64, frame_size as usize)?.to_vec();
                match decode_text_frame(&body) {
                    Some(text) => push_frame_value(file, element_type, &text),
                    None => ctx.log(ErrorKind::Format, format!("id3v2: unsupported text encoding in {:?}", id)),
                }
            }

            pos += frame_size as u64;
        }

        file.file_type = FileType::Audio;
        file.mime_type = Some("audio/mpeg");

        Ok(())
    }
}
