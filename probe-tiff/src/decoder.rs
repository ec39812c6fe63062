// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The TIFF/EXIF decoder.
//!
//! The recognized-tag table and the baseline/Exif/GPS split are grounded on
//! the original C implementation's `fmdp_tiff_do_baseline_ifd`,
//! `fmdp_tiff_do_exififd`, and `fmdp_tiff_do_gpsifd`: GPS tags are walked
//! (so the ascending-tag invariant still applies to that IFD and a
//! malformed GPS IFD is still reported) but never turn into elements.

use probe_core::dispatch::{DecodeContext, Decoder};
use probe_core::model::{ElementType, ElementValue, FileRecord, FileType};
use probe_core::stream::Stream;
use probe_core::{format_error, ErrorKind, Result};

use crate::ifd::{entry_bytes, type_size, walk_ifd, ByteOrder, RawEntry};

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

const TAG_WIDTH: u16 = 256;
const TAG_HEIGHT: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_DOCNAME: u16 = 269;
const TAG_DESCRIPTION: u16 = 270;
const TAG_DEVICEVENDOR: u16 = 271;
const TAG_DEVICEMODEL: u16 = 272;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_SOFTWARE: u16 = 305;
const TAG_ARTIST: u16 = 315;
const TAG_EXIFIFD: u16 = 34665;
const TAG_GPSIFD: u16 = 34853;

const TAG_EXPOSURE_TIME: u16 = 33434;
const TAG_FNUMBER: u16 = 33437;
const TAG_EXPOSURE_PROGRAM: u16 = 34850;
const TAG_ISO_SPEED: u16 = 34855;
const TAG_FOCAL_LENGTH: u16 = 37386;
const TAG_FOCAL_LENGTH35: u16 = 41989;

fn read_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn read_unsigned(bytes: &[u8], order: ByteOrder, ty: u16) -> Option<u32> {
    match ty {
        TYPE_SHORT => Some(order.u16(bytes) as u32),
        TYPE_LONG => Some(order.u32(bytes)),
        _ => None,
    }
}

fn read_rational(bytes: &[u8], order: ByteOrder) -> (i32, i32) {
    let num = order.u32(&bytes[0..4]) as i32;
    let denom = order.u32(&bytes[4..8]) as i32;
    (num, denom)
}

fn expect_type_and_count(entry: &RawEntry, allowed: &[u16], required_count: Option<u32>) -> Result<()> {
    if type_size(entry.ty).is_none() {
        return format_error("tiff: field has unrecognized type");
    }
    if !allowed.contains(&entry.ty) {
        return format_error("tiff: field has unexpected type");
    }
    if let Some(n) = required_count {
        if entry.count != n {
            return format_error("tiff: field has unexpected count");
        }
    }
    Ok(())
}

#[derive(Default)]
struct BaselineState {
    width: Option<u32>,
    height: Option<u32>,
    samples_per_pixel: Option<u32>,
    bits_per_sample_sum: Option<u32>,
    docname: Option<String>,
    description: Option<String>,
    devicevendor: Option<String>,
    devicemodel: Option<String>,
    software: Option<String>,
    artist: Option<String>,
    exif_ifd_offset: Option<u32>,
    gps_ifd_offset: Option<u32>,
}

#[derive(Default)]
struct ExifState {
    exposure_time: Option<(i32, i32)>,
    fnumber: Option<f64>,
    iso_speed: Option<u32>,
    focal_length: Option<f64>,
    focal_length35: Option<f64>,
}

fn handle_baseline_entry(
    stream: &mut dyn Stream,
    order: ByteOrder,
    entry: &RawEntry,
    state: &mut BaselineState,
) -> Result<()> {
    match entry.tag {
        TAG_WIDTH => {
            expect_type_and_count(entry, &[TYPE_SHORT, TYPE_LONG], Some(1))?;
            state.width = read_unsigned(&entry.value, order, entry.ty);
        }
        TAG_HEIGHT => {
            expect_type_and_count(entry, &[TYPE_SHORT, TYPE_LONG], Some(1))?;
            state.height = read_unsigned(&entry.value, order, entry.ty);
        }
        TAG_SAMPLES_PER_PIXEL => {
            expect_type_and_count(entry, &[TYPE_SHORT], Some(1))?;
            state.samples_per_pixel = read_unsigned(&entry.value, order, entry.ty);
        }
        TAG_BITS_PER_SAMPLE => {
            expect_type_and_count(entry, &[TYPE_SHORT], None)?;
            let bytes = entry_bytes(stream, order, entry)?;
            let sum: u32 = bytes.chunks_exact(2).map(|c| order.u16(c) as u32).sum();
            state.bits_per_sample_sum = Some(sum);
        }
        TAG_DOCNAME => {
            expect_type_and_count(entry, &[TYPE_ASCII], None)?;
            state.docname = Some(read_ascii(&entry_bytes(stream, order, entry)?));
        }
        TAG_DESCRIPTION => {
            expect_type_and_count(entry, &[TYPE_ASCII], None)?;
            state.description = Some(read_ascii(&entry_bytes(stream, order, entry)?));
        }
        TAG_DEVICEVENDOR => {
            expect_type_and_count(entry, &[TYPE_ASCII], None)?;
            state.devicevendor = Some(read_ascii(&entry_bytes(stream, order, entry)?));
        }
        TAG_DEVICEMODEL => {
            expect_type_and_count(entry, &[TYPE_ASCII], None)?;
            state.devicemodel = Some(read_ascii(&entry_bytes(stream, order, entry)?));
        }
        TAG_SOFTWARE => {
            expect_type_and_count(entry, &[TYPE_ASCII], None)?;
            state.software = Some(read_ascii(&entry_bytes(stream, order, entry)?));
        }
        TAG_ARTIST => {
            expect_type_and_count(entry, &[TYPE_ASCII], None)?;
            state.artist = Some(read_ascii(&entry_bytes(stream, order, entry)?));
        }
        TAG_EXIFIFD => {
            expect_type_and_count(entry, &[TYPE_LONG], Some(1))?;
            state.exif_ifd_offset = Some(order.u32(&entry.value));
        }
        TAG_GPSIFD => {
            expect_type_and_count(entry, &[TYPE_LONG], Some(1))?;
            state.gps_ifd_offset = Some(order.u32(&entry.value));
        }
        // Unrecognized tags are simply not this engine's concern.
        _ => {}
    }
    Ok(())
}

/// Decodes a recognized field in the EXIF IFD. The rational fields here are
/// always 8 bytes, so resolution always goes through [`entry_bytes`] rather
/// than reading `entry.value` inline.
fn handle_exif_entry(stream: &mut dyn Stream, order: ByteOrder, entry: &RawEntry, state: &mut ExifState) -> Result<()> {
    match entry.tag {
        TAG_EXPOSURE_TIME => {
            expect_type_and_count(entry, &[TYPE_RATIONAL], Some(1))?;
            let bytes = entry_bytes(stream, order, entry)?;
            state.exposure_time = Some(read_rational(&bytes, order));
        }
        TAG_FNUMBER => {
            expect_type_and_count(entry, &[TYPE_RATIONAL], Some(1))?;
            let bytes = entry_bytes(stream, order, entry)?;
            let (num, denom) = read_rational(&bytes, order);
            if denom != 0 {
                state.fnumber = Some(num as f64 / denom as f64);
            }
        }
        TAG_EXPOSURE_PROGRAM => {
            expect_type_and_count(entry, &[TYPE_SHORT], Some(1))?;
            // Recognized but not emitted, matching the original's GPS-style
            // "walked but not reported" handling for this one field.
        }
        TAG_ISO_SPEED => {
            expect_type_and_count(entry, &[TYPE_SHORT], Some(1))?;
            state.iso_speed = read_unsigned(&entry.value, order, entry.ty);
        }
        TAG_FOCAL_LENGTH => {
            expect_type_and_count(entry, &[TYPE_RATIONAL], Some(1))?;
            let bytes = entry_bytes(stream, order, entry)?;
            let (num, denom) = read_rational(&bytes, order);
            if denom != 0 {
                state.focal_length = Some(num as f64 / denom as f64);
            }
        }
        TAG_FOCAL_LENGTH35 => {
            expect_type_and_count(entry, &[TYPE_RATIONAL], Some(1))?;
            let bytes = entry_bytes(stream, order, entry)?;
            let (num, denom) = read_rational(&bytes, order);
            if denom != 0 {
                state.focal_length35 = Some(num as f64 / denom as f64);
            }
        }
        _ => {}
    }
    Ok(())
}

fn push_text(file: &mut FileRecord, element_type: ElementType, value: &Option<String>) {
    if let Some(text) = value {
        if !text.is_empty() {
            file.push_element(element_type, ElementValue::Text(text.clone()));
        }
    }
}

/// Decodes TIFF 6.0 baseline tags plus the recognized subset of the Exif
/// sub-IFD. Can be invoked directly (magic-matched `MM`/`II` files) or by
/// the JPEG wrapper over a ranged stream covering an APP1 `Exif` payload.
pub struct TiffDecoder;

impl Decoder for TiffDecoder {
    fn name(&self) -> &'static str {
        "tiff"
    }

    fn matches(&self, header: &[u8]) -> bool {
        header.len() >= 4 && (&header[..4] == b"MM\0\x2A" || &header[..4] == b"II\x2A\0")
    }

    fn decode(&self, stream: &mut dyn Stream, file: &mut FileRecord, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let header = stream.get(0, 8)?.to_vec();
        let order = match &header[0..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return format_error("tiff: unrecognized byte-order marker"),
        };

        let magic = order.u16(&header[2..4]);
        if magic != 42 {
            return format_error("tiff: invalid magic number");
        }

        let ifd0_offset = order.u32(&header[4..8]) as u64;

        let mut baseline = BaselineState::default();
        let log_fn = |kind, msg: &str| ctx.log(kind, msg);
        walk_ifd(stream, order, ifd0_offset, log_fn, |s, o, e| handle_baseline_entry(s, o, e, &mut baseline))?;

        let mut exif = ExifState::default();
        if let Some(offset) = baseline.exif_ifd_offset {
            let log_fn = |kind, msg: &str| ctx.log(kind, msg);
            let _ = walk_ifd(stream, order, offset as u64, log_fn, |s, o, e| handle_exif_entry(s, o, e, &mut exif));
        }

        if let Some(offset) = baseline.gps_ifd_offset {
            let log_fn = |kind, msg: &str| ctx.log(kind, msg);
            let _ = walk_ifd(stream, order, offset as u64, log_fn, |_, _, _| Ok(()));
        }

        file.file_type = FileType::Raster;
        file.mime_type = Some("image/tiff");

        if let Some(w) = baseline.width {
            file.push_element(ElementType::FrameWidth, ElementValue::Int(w as i64));
        }
        if let Some(h) = baseline.height {
            file.push_element(ElementType::FrameHeight, ElementValue::Int(h as i64));
        }
        if let Some(spp) = baseline.samples_per_pixel {
            file.push_element(ElementType::NumChannels, ElementValue::Int(spp as i64));
        }
        if let Some(bps) = baseline.bits_per_sample_sum {
            file.push_element(ElementType::BitsPerSample, ElementValue::Int(bps as i64));
        }

        push_text(file, ElementType::Title, &baseline.docname);
        push_text(file, ElementType::Description, &baseline.description);
        push_text(file, ElementType::Creator, &baseline.devicevendor);
        push_text(file, ElementType::Creator, &baseline.devicemodel);
        push_text(file, ElementType::Creator, &baseline.software);
        push_text(file, ElementType::Artist, &baseline.artist);

        if let Some((num, denom)) = exif.exposure_time {
            file.push_element(ElementType::ExposureTime, ElementValue::rational(num, denom));
        }
        if let Some(f) = exif.fnumber {
            file.push_element(ElementType::FNumber, ElementValue::Frac(f));
        }
        if let Some(iso) = exif.iso_speed {
            file.push_element(ElementType::IsoSpeed, ElementValue::Int(iso as i64));
        }
        if let Some(f) = exif.focal_length {
            file.push_element(ElementType::FocalLength, ElementValue::Frac(f));
        }
        if let Some(f) = exif.focal_length35 {
            file.push_element(ElementType::FocalLength35, ElementValue::Frac(f));
        }

        Ok(())
    }
}
