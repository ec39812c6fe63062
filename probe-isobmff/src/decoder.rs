// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The BMFF decoder: a static parent-to-child handler map walked with
//! [`BoxIterator`], replacing the teacher's general-purpose demuxer (which
//! builds a full track/sample-table model to hand off to an audio decoder)
//! with a narrow walk that only visits the boxes carrying metadata this
//! engine recognizes.

use probe_core::dispatch::{DecodeContext, Decoder};
use probe_core::model::{ElementType, ElementValue, FileRecord, FileType};
use probe_core::stream::Stream;
use probe_core::{ErrorKind, Result};

use crate::boxes::{BoxHeader, BoxIterator};

fn ilst_tag_element(tag: &[u8; 4]) -> Option<ElementType> {
    match tag {
        b"\xa9nam" => Some(ElementType::Title),
        b"\xa9alb" => Some(ElementType::Album),
        b"aART" => Some(ElementType::Artist),
        b"\xa9ART" => Some(ElementType::Performer),
        b"\xa9too" => Some(ElementType::Creator),
        b"\xa9cmt" | b"desc" => Some(ElementType::Description),
        b"trkn" => Some(ElementType::TrackNo),
        _ => None,
    }
}

fn file_type_for_brand(brand: &[u8; 4]) -> (FileType, &'static str) {
    match brand {
        b"M4V " | b"mp41" | b"mp42" => (FileType::Video, "video/mp4"),
        b"M4A " => (FileType::Audio, "audio/mp4"),
        _ => (FileType::Media, "application/mp4"),
    }
}

fn decode_ftyp(stream: &mut dyn Stream, header: &BoxHeader) -> Result<(FileType, &'static str)> {
    let payload = stream.get(header.payload_pos() as i64, 4)?;
    let brand: [u8; 4] = payload.try_into().unwrap();
    Ok(file_type_for_brand(&brand))
}

fn decode_mvhd(stream: &mut dyn Stream, header: &BoxHeader, file: &mut FileRecord) -> Result<()> {
    let version = stream.get(header.payload_pos() as i64, 1)?[0];

    let (timescale, duration) = if version == 1 {
        // version(1) + flags(3) + ctime(8) + mtime(8) + timescale(4) + duration(8)
        let buf = stream.get((header.payload_pos() + 4) as i64, 28)?;
        let timescale = u32::from_be_bytes(buf[16..20].try_into().unwrap());
        let duration = u64::from_be_bytes(buf[20..28].try_into().unwrap());
        (timescale, duration)
    } else {
        // version(1) + flags(3) + ctime(4) + mtime(4) + timescale(4) + duration(4)
        let buf = stream.get((header.payload_pos() + 4) as i64, 16)?;
        let timescale = u32::from_be_bytes(buf[8..12].try_into().unwrap());
        let duration = u32::from_be_bytes(buf[12..16].try_into().unwrap()) as u64;
        (timescale, duration)
    };

    if timescale > 0 {
        file.push_element(ElementType::Duration, ElementValue::Frac(duration as f64 / timescale as f64));
    }
    Ok(())
}

fn decode_ilst_entry(stream: &mut dyn Stream, header: &BoxHeader, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) {
    let element_type = match ilst_tag_element(&header.box_type) {
        Some(t) => t,
        None => return,
    };

    let mut children = BoxIterator::child(header);
    let data_box = loop {
        match children.next(stream) {
            Ok(Some(h)) if &h.box_type == b"data" => break Some(h),
            Ok(Some(_)) => continue,
            Ok(None) => break None,
            Err(err) => {
                ctx.log(ErrorKind::Format, format!("isobmff: malformed ilst child: {}", err));
                break None;
            }
        }
    };

    let data_box = match data_box {
        Some(h) => h,
        None => return,
    };
    let payload_len = match data_box.payload_len() {
        Some(l) => l,
        None => return,
    };
    if payload_len < 8 {
        return;
    }

    // The data box's payload is `{ typeid(32), locale(32) }` then the value.
    let value_pos = data_box.payload_pos() + 8;
    let value_len = (payload_len - 8) as usize;

    if element_type == ElementType::TrackNo {
        if value_len < 4 {
            return;
        }
        match stream.get(value_pos as i64, 4) {
            Ok(bytes) => {
                let n = u32::from_be_bytes(bytes.try_into().unwrap());
                file.push_element(ElementType::TrackNo, ElementValue::Int(n as i64));
            }
            Err(err) => ctx.log(ErrorKind::Format, format!("isobmff: trkn read failed: {}", err)),
        }
        return;
    }

    match stream.get(value_pos as i64, value_len) {
        Ok(bytes) => {
            file.push_element(element_type, ElementValue::Text(String::from_utf8_lossy(bytes).into_owned()));
        }
        Err(err) => ctx.log(ErrorKind::Format, format!("isobmff: tag value read failed: {}", err)),
    }
}

fn decode_ilst(stream: &mut dyn Stream, header: &BoxHeader, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
    let mut it = BoxIterator::child(header);
    while let Some(child) = it.next(stream)? {
        decode_ilst_entry(stream, &child, file, ctx);
    }
    Ok(())
}

fn decode_meta(stream: &mut dyn Stream, header: &BoxHeader, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
    let version_flags = stream.get(header.payload_pos() as i64, 4)?;
    if version_flags != [0, 0, 0, 0] {
        ctx.log(ErrorKind::Format, "isobmff: unsupported meta full-box version");
        return Ok(());
    }

    let meta_header =
        BoxHeader { box_type: header.box_type, pos: header.pos, header_len: header.header_len + 4, box_len: header.box_len };

    let mut it = BoxIterator::child(&meta_header);
    while let Some(child) = it.next(stream)? {
        if &child.box_type == b"ilst" {
            decode_ilst(stream, &child, file, ctx)?;
        }
    }
    Ok(())
}

fn decode_udta(stream: &mut dyn Stream, header: &BoxHeader, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
    let mut it = BoxIterator::child(header);
    while let Some(child) = it.next(stream)? {
        if &child.box_type == b"meta" {
            decode_meta(stream, &child, file, ctx)?;
        }
    }
    Ok(())
}

fn decode_moov(stream: &mut dyn Stream, header: &BoxHeader, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
    let mut it = BoxIterator::child(header);
    while let Some(child) = it.next(stream)? {
        match &child.box_type {
            b"mvhd" => decode_mvhd(stream, &child, file)?,
            b"udta" => decode_udta(stream, &child, file, ctx)?,
            _ => {}
        }
    }
    Ok(())
}

/// Decodes `ftyp`/`moov` metadata from an MP4/M4A/QuickTime container.
pub struct BmffDecoder;

impl Decoder for BmffDecoder {
    fn name(&self) -> &'static str {
        "isobmff"
    }

    fn matches(&self, header: &[u8]) -> bool {
        header.len() >= 8 && &header[4..8] == b"ftyp"
    }

    fn decode(&self, stream: &mut dyn Stream, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let mut root = BoxIterator::new_root(stream);
        let mut brand: Option<(FileType, &'static str)> = None;

        while let Some(child) = root.next(stream)? {
            match &child.box_type {
                b"ftyp" => brand = Some(decode_ftyp(stream, &child)?),
                b"moov" => decode_moov(stream, &child, file, ctx)?,
                _ => {}
            }
        }

        let (file_type, mime) = match brand {
            Some(b) => b,
            None => return probe_core::format_error("isobmff: missing ftyp box"),
        };
        file.file_type = file_type;
        file.mime_type = Some(mime);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::stream::{CachedStream, FileStream};
    use std::io::Write;
    use std::path::PathBuf;

    fn write_temp(bytes: &[u8]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("probe-isobmff-decoder-test-{}-{}", std::process::id(), bytes.len()));
        std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    fn make_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(box_type);
        out.extend_from_slice(payload);
        out
    }

    fn make_data_box(value: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; 8];
        payload.extend_from_slice(value);
        make_box(b"data", &payload)
    }

    #[test]
    fn decodes_title_and_duration() {
        let ftyp = make_box(b"ftyp", b"M4A \0\0\0\0");

        let mut mvhd_payload = vec![0u8; 4]; // version 0 + flags
        mvhd_payload.extend_from_slice(&[0u8; 8]); // ctime, mtime
        mvhd_payload.extend_from_slice(&1000u32.to_be_bytes()); // timescale
        mvhd_payload.extend_from_slice(&5000u32.to_be_bytes()); // duration
        let mvhd = make_box(b"mvhd", &mvhd_payload);

        let nam_data = make_data_box(b"Example Title");
        let nam = make_box(b"\xa9nam", &nam_data);
        let ilst = make_box(b"ilst", &nam);

        let mut meta_payload = vec![0u8; 4]; // version+flags
        meta_payload.extend_from_slice(&ilst);
        let meta = make_box(b"meta", &meta_payload);
        let udta = make_box(b"udta", &meta);

        let mut moov_payload = mvhd.clone();
        moov_payload.extend_from_slice(&udta);
        let moov = make_box(b"moov", &moov_payload);

        let mut data = ftyp;
        data.extend_from_slice(&moov);
        let path = write_temp(&data);

        let mut stream = CachedStream::new(Box::new(FileStream::open(&path).unwrap()));
        let mut file = FileRecord::new(path.clone(), data.len() as u64, FileType::File);
        let mut log = |_k, _m: &str| {};
        let mut ctx = DecodeContext::new(&path, &mut log);

        BmffDecoder.decode(&mut stream, &mut file, &mut ctx).unwrap();

        assert_eq!(file.file_type, FileType::Audio);
        assert!(file.elements.iter().any(|e| e.element_type == ElementType::Title
            && e.value == ElementValue::Text("Example Title".into())));
        assert!(file.elements.iter().any(|e| e.element_type == ElementType::Duration
            && matches!(e.value, ElementValue::Frac(d) if (d - 5.0).abs() < 1e-9)));

        std::fs::remove_file(path).ok();
    }
}
