// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TIFF 6.0/EXIF decoding, and a JPEG segment wrapper that decodes an
//! embedded APP1 Exif payload through the same TIFF decoder.

pub mod decoder;
pub mod ifd;
pub mod jpeg;

pub use decoder::TiffDecoder;
pub use jpeg::JpegDecoder;
