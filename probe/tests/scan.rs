// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios driven through the probe dispatcher: one test per
//! concrete scenario, each writing a single synthetic file into a fresh
//! temporary directory and running the whole `scan()` pipeline over it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use probe_core::model::{ElementType, ElementValue, FileType, ScanFlags, ScanJob};

fn temp_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("probe-scan-test-{}-{}", std::process::id(), name));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::File::create(&path).unwrap().write_all(bytes).unwrap();
    path
}

/// A minimal MSB-first bit writer, just enough to build a synthetic FLAC
/// `STREAMINFO` block.
struct BitWriter {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter { bytes: Vec::new(), bit_pos: 0 }
    }

    fn push(&mut self, val: u64, len: u32) {
        for i in (0..len).rev() {
            let bit = (val >> i) & 1;
            let byte_idx = self.bit_pos / 8;
            if byte_idx == self.bytes.len() {
                self.bytes.push(0);
            }
            if bit == 1 {
                self.bytes[byte_idx] |= 1 << (7 - (self.bit_pos % 8));
            }
            self.bit_pos += 1;
        }
    }
}

fn encode_stream_info(sample_rate: u32, channels: u32, bits: u32, total_samples: u64) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.push(4096, 16);
    w.push(4096, 16);
    w.push(0, 24);
    w.push(0, 24);
    w.push(sample_rate as u64, 20);
    w.push((channels - 1) as u64, 3);
    w.push((bits - 1) as u64, 5);
    w.push(total_samples, 36);
    let mut out = w.bytes;
    out.extend_from_slice(&[0u8; 16]);
    out
}

fn flac_block(id: u8, is_last: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![if is_last { id | 0x80 } else { id }];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

fn vorbis_comment_block(vendor: &str, comments: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    out.extend_from_slice(vendor.as_bytes());
    out.extend_from_slice(&(comments.len() as u32).to_le_bytes());
    for c in comments {
        out.extend_from_slice(&(c.len() as u32).to_le_bytes());
        out.extend_from_slice(c.as_bytes());
    }
    out
}

fn pad_to_min_probe_size(mut data: Vec<u8>) -> Vec<u8> {
    if data.len() < 256 {
        data.resize(256, 0);
    }
    data
}

fn run_scan(root: &Path) -> ScanJob<'static> {
    let dispatcher = probe::default::dispatcher();
    let mut job = ScanJob::new(root.to_path_buf(), ScanFlags::METADATA);
    probe::scan(&mut job, &dispatcher).unwrap();
    job
}

fn has_element(file: &probe_core::model::FileRecord, element_type: ElementType, value: ElementValue) -> bool {
    file.elements.iter().any(|e| e.element_type == element_type && e.value == value)
}

#[test]
fn flac_minimal() {
    let dir = temp_dir("flac-minimal");
    let mut data = b"fLaC".to_vec();
    data.extend_from_slice(&flac_block(0, true, &encode_stream_info(44100, 2, 16, 441000)));
    write_file(&dir, "a.flac", &pad_to_min_probe_size(data));

    let job = run_scan(&dir);
    let file = job.files.iter().find(|f| f.path.extension().is_some()).unwrap();

    assert_eq!(file.file_type, FileType::Audio);
    assert_eq!(file.mime_type, Some("audio/flac"));
    assert!(has_element(file, ElementType::SamplingRate, ElementValue::Int(44100)));
    assert!(has_element(file, ElementType::NumChannels, ElementValue::Int(2)));
    assert!(has_element(file, ElementType::BitsPerSample, ElementValue::Int(16)));
    assert!(has_element(file, ElementType::Duration, ElementValue::Frac(10.0)));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn flac_with_vorbis_comment() {
    let dir = temp_dir("flac-vorbis");
    let mut data = b"fLaC".to_vec();
    data.extend_from_slice(&flac_block(0, false, &encode_stream_info(44100, 2, 16, 441000)));
    data.extend_from_slice(&flac_block(4, true, &vorbis_comment_block("ref libFLAC 1.3.3", &["TITLE=Example"])));
    write_file(&dir, "a.flac", &pad_to_min_probe_size(data));

    let job = run_scan(&dir);
    let file = job.files.iter().find(|f| f.path.extension().is_some()).unwrap();

    assert!(has_element(file, ElementType::Creator, ElementValue::Text("ref libFLAC 1.3.3".into())));
    assert!(has_element(file, ElementType::Title, ElementValue::Text("Example".into())));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn id3v2_3_title_frame() {
    let dir = temp_dir("id3v2");
    let mut frame = b"TIT2".to_vec();
    let mut payload = vec![0u8]; // ISO-8859-1
    payload.extend_from_slice(b"Hello");
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&[0u8; 2]);
    frame.extend_from_slice(&payload);

    let tag_size = frame.len() as u32;
    let mut data = b"ID3".to_vec();
    data.extend_from_slice(&[0x03, 0x00, 0x00]);
    data.extend_from_slice(&[
        ((tag_size >> 21) & 0x7f) as u8,
        ((tag_size >> 14) & 0x7f) as u8,
        ((tag_size >> 7) & 0x7f) as u8,
        (tag_size & 0x7f) as u8,
    ]);
    data.extend_from_slice(&frame);
    write_file(&dir, "a.mp3", &pad_to_min_probe_size(data));

    let job = run_scan(&dir);
    let file = job.files.iter().find(|f| f.path.extension().is_some()).unwrap();

    assert_eq!(file.file_type, FileType::Audio);
    assert_eq!(file.mime_type, Some("audio/mpeg"));
    assert!(has_element(file, ElementType::Title, ElementValue::Text("Hello".into())));

    fs::remove_dir_all(&dir).ok();
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
fn mp4_mvhd_and_ilst_title() {
    let dir = temp_dir("mp4");
    let ftyp = make_box(b"ftyp", b"mp42\0\0\0\0");

    let mut mvhd_payload = vec![0u8; 4];
    mvhd_payload.extend_from_slice(&[0u8; 8]);
    mvhd_payload.extend_from_slice(&1000u32.to_be_bytes());
    mvhd_payload.extend_from_slice(&60000u32.to_be_bytes());
    let mvhd = make_box(b"mvhd", &mvhd_payload);

    let nam_data = make_data_box(b"Song");
    let nam = make_box(b"\xa9nam", &nam_data);
    let ilst = make_box(b"ilst", &nam);

    let mut meta_payload = vec![0u8; 4];
    meta_payload.extend_from_slice(&ilst);
    let meta = make_box(b"meta", &meta_payload);
    let udta = make_box(b"udta", &meta);

    let mut moov_payload = mvhd;
    moov_payload.extend_from_slice(&udta);
    let moov = make_box(b"moov", &moov_payload);

    let mut data = ftyp;
    data.extend_from_slice(&moov);
    // Root-level boxes are walked to the end of the stream, so padding must
    // itself be a well-formed (ignored) box rather than raw zero bytes.
    if data.len() < 256 {
        data.extend_from_slice(&make_box(b"free", &vec![0u8; 256 - data.len() - 8]));
    }
    write_file(&dir, "a.mp4", &data);

    let job = run_scan(&dir);
    let file = job.files.iter().find(|f| f.path.extension().is_some()).unwrap();

    assert_eq!(file.file_type, FileType::Video);
    assert_eq!(file.mime_type, Some("video/mp4"));
    assert!(has_element(file, ElementType::Duration, ElementValue::Frac(60.0)));
    assert!(has_element(file, ElementType::Title, ElementValue::Text("Song".into())));

    fs::remove_dir_all(&dir).ok();
}

/// A little-endian TIFF with a 3-channel, 8-bit-per-sample image: width,
/// height, a `bits-per-sample` entry with one value per channel (stored
/// externally, since 3 shorts exceed the 4-byte inline slot), samples-per-
/// pixel, and an inline ASCII artist. Matches the baseline scenario this
/// engine is tested against: `bits_per_sample` sums the per-channel values
/// (8+8+8 = 24), not just the first one.
fn tiff_baseline_payload() -> Vec<u8> {
    const HEADER_LEN: u32 = 8;
    const ENTRY_COUNT: u16 = 5;
    const IFD_LEN: u32 = 2 + 12 * ENTRY_COUNT as u32 + 4;

    let ifd0_offset = HEADER_LEN;
    let bits_per_sample_offset = HEADER_LEN + IFD_LEN;
    let bits_per_sample_bytes: Vec<u8> = [8u16, 8, 8].iter().flat_map(|v| v.to_le_bytes()).collect();

    fn short_inline(v: u16) -> [u8; 4] {
        let mut b = [0u8; 4];
        b[..2].copy_from_slice(&v.to_le_bytes());
        b
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&ifd0_offset.to_le_bytes());

    out.extend_from_slice(&ENTRY_COUNT.to_le_bytes());

    out.extend_from_slice(&256u16.to_le_bytes()); // width
    out.extend_from_slice(&4u16.to_le_bytes()); // LONG
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1920u32.to_le_bytes());

    out.extend_from_slice(&257u16.to_le_bytes()); // height
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1080u32.to_le_bytes());

    out.extend_from_slice(&258u16.to_le_bytes()); // bits per sample, external
    out.extend_from_slice(&3u16.to_le_bytes()); // SHORT
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&bits_per_sample_offset.to_le_bytes());

    out.extend_from_slice(&277u16.to_le_bytes()); // samples per pixel
    out.extend_from_slice(&3u16.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&short_inline(3));

    out.extend_from_slice(&315u16.to_le_bytes()); // artist, inline ASCII
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(b"Ada\0");

    out.extend_from_slice(&0u32.to_le_bytes()); // next ifd offset

    out.extend_from_slice(&bits_per_sample_bytes);
    out
}

#[test]
fn tiff_baseline() {
    let dir = temp_dir("tiff");
    write_file(&dir, "a.tif", &pad_to_min_probe_size(tiff_baseline_payload()));

    let job = run_scan(&dir);
    let file = job.files.iter().find(|f| f.path.extension().is_some()).unwrap();

    assert_eq!(file.file_type, FileType::Raster);
    assert_eq!(file.mime_type, Some("image/tiff"));
    assert!(has_element(file, ElementType::FrameWidth, ElementValue::Int(1920)));
    assert!(has_element(file, ElementType::FrameHeight, ElementValue::Int(1080)));
    assert!(has_element(file, ElementType::NumChannels, ElementValue::Int(3)));
    assert!(has_element(file, ElementType::BitsPerSample, ElementValue::Int(24)));
    assert!(has_element(file, ElementType::Artist, ElementValue::Text("Ada".into())));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn jpeg_app1_exif_round_trip() {
    let dir = temp_dir("jpeg");
    let tiff = tiff_baseline_payload();

    let mut app1_payload = b"Exif\0\0".to_vec();
    app1_payload.extend_from_slice(&tiff);

    let mut data = vec![0xFF, 0xD8];
    data.push(0xFF);
    data.push(0xE1);
    data.extend_from_slice(&((app1_payload.len() + 2) as u16).to_be_bytes());
    data.extend_from_slice(&app1_payload);
    data.push(0xFF);
    data.push(0xD9);
    write_file(&dir, "a.jpg", &pad_to_min_probe_size(data));

    let job = run_scan(&dir);
    let file = job.files.iter().find(|f| f.path.extension().is_some()).unwrap();

    assert_eq!(file.mime_type, Some("image/jpeg"));
    assert!(has_element(file, ElementType::FrameWidth, ElementValue::Int(1920)));
    assert!(has_element(file, ElementType::Artist, ElementValue::Text("Ada".into())));

    fs::remove_dir_all(&dir).ok();
}
