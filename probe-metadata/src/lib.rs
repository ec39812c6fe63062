// Copyright (c) 2019-2022 The Project Symphonia Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC (stream info + Vorbis comment) and ID3v2.3/2.4 decoders.

pub mod flac;
pub mod id3v2;
pub mod vorbis;

pub use flac::FlacDecoder;
pub use id3v2::Id3v2Decoder;
