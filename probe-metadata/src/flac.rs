// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC stream-info and Vorbis-comment decoding.
//!
//! Grounded on the teacher's `symphonia-bundle-flac::demuxer` metadata-block
//! loop: read a one-byte (last-flag, type) header plus a 3-byte big-endian
//! length, dispatch on type, and keep reading until the last-block flag is
//! set. The teacher additionally demuxes audio frames and several other
//! block types (seek table, cuesheet, picture) this engine has no use for;
//! only `STREAMINFO` (0) and `VORBIS_COMMENT` (4) carry metadata elements,
//! with `PADDING` (1) and any unrecognized type walked past with zero
//! interpretation so a trailing comment block past a padding block is still
//! reached.

use log::info;

use probe_core::bits::bits_be;
use probe_core::dispatch::{DecodeContext, Decoder};
use probe_core::model::{ElementType, ElementValue, FileRecord, FileType};
use probe_core::stream::Stream;
use probe_core::{format_error, ProbeError, Result};

use crate::vorbis;

const FLAC_MARKER: &[u8; 4] = b"fLaC";
const STREAM_INFO_BLOCK_LEN: u32 = 34;

enum BlockType {
    StreamInfo,
    Padding,
    VorbisComment,
    Unknown(u8),
}

impl BlockType {
    fn from_id(id: u8) -> BlockType {
        match id {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            4 => BlockType::VorbisComment,
            other => BlockType::Unknown(other),
        }
    }
}

struct BlockHeader {
    is_last: bool,
    block_type: BlockType,
    block_len: u32,
}

fn read_block_header(stream: &mut dyn Stream, pos: u64) -> Result<BlockHeader> {
    let hdr = stream.get(pos as i64, 4)?;
    let first = hdr[0];
    let is_last = first & 0x80 != 0;
    let block_type = BlockType::from_id(first & 0x7f);
    let block_len = u32::from_be_bytes([0, hdr[1], hdr[2], hdr[3]]);
    Ok(BlockHeader { is_last, block_type, block_len })
}

fn read_stream_info(block: &[u8], file: &mut FileRecord) -> Result<()> {
    if block.len() < STREAM_INFO_BLOCK_LEN as usize {
        return format_error("flac: stream info block is too short");
    }

    let sample_rate = bits_be(block, 80, 20) as u32;
    let num_channels = bits_be(block, 100, 3) as u32 + 1;
    let bits_per_sample = bits_be(block, 103, 5) as u32 + 1;
    let total_samples = bits_be(block, 108, 36);

    file.push_element(ElementType::SamplingRate, ElementValue::Int(sample_rate as i64));
    file.push_element(ElementType::NumChannels, ElementValue::Int(num_channels as i64));
    file.push_element(ElementType::BitsPerSample, ElementValue::Int(bits_per_sample as i64));

    if sample_rate > 0 {
        let duration = total_samples as f64 / sample_rate as f64;
        file.push_element(ElementType::Duration, ElementValue::Frac(duration));
    }

    Ok(())
}

/// Decodes FLAC's stream-info and Vorbis-comment metadata blocks.
pub struct FlacDecoder;

impl Decoder for FlacDecoder {
    fn name(&self) -> &'static str {
        "flac"
    }

    fn matches(&self, header: &[u8]) -> bool {
        header.len() >= 4 && &header[..4] == FLAC_MARKER
    }

    fn decode(&self, stream: &mut dyn Stream, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let mut pos: u64 = 4;
        let mut have_stream_info = false;

        loop {
            if pos + 4 > stream.size() {
                return format_error("flac: truncated metadata block header");
            }
            let header = read_block_header(stream, pos)?;
            pos += 4;

            if pos + header.block_len as u64 > stream.size() {
                return format_error("flac: metadata block extends past end of file");
            }

            match header.block_type {
                BlockType::StreamInfo => {
                    if have_stream_info {
                        ctx.log(probe_core::ErrorKind::Format, "flac: duplicate stream info block");
                    } else {
                        let block = stream.get(pos as i64, header.block_len as usize)?.to_vec();
                        read_stream_info(&block, file)?;
                        have_stream_info = true;
                    }
                }
                BlockType::VorbisComment => {
                    let block = stream.get(pos as i64, header.block_len as usize)?.to_vec();
                    if let Err(err) = vorbis::read_comment_no_framing(&block, file) {
                        ctx.log(probe_core::ErrorKind::Format, format!("flac: malformed vorbis comment: {}", err));
                    }
                }
                BlockType::Padding | BlockType::Unknown(_) => {
                    info!("flac: skipping {} bytes of block type at 0x{:x}", header.block_len, pos);
                }
            }

            pos += header.block_len as u64;

            if header.is_last {
                break;
            }
        }

        if !have_stream_info {
            return Err(ProbeError::Format("flac: missing stream info block".into()));
        }

        file.file_type = FileType::Audio;
        file.mime_type = Some("audio/flac");

        Ok(())
    }
}
