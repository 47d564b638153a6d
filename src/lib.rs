// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reader for HEIF and AVIF still image containers (ISO-BMFF).
//!
//! This crate parses the box tree of a HEIF/AVIF file, reconstructs the
//! logical item graph (primary item, item info, locations, properties,
//! references, inline data) and exposes the pieces a decoder needs: the
//! coded bitstream of the primary item, the synthesized HEVC parameter set
//! header, raw EXIF metadata and grid tiling geometry. It does not decode
//! pixels; see [`codecs`] for the decoder interfaces it feeds.

#![deny(unsafe_code)]

pub mod codecs;
pub mod decoder;
pub mod parser;

mod internal_utils;

use num_derive::FromPrimitive;
use num_traits::cast::FromPrimitive;

#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub enum PixelFormat {
    Yuv444,
    Yuv422,
    #[default]
    Yuv420,
    Monochrome,
}

impl PixelFormat {
    pub fn plane_count(&self) -> usize {
        match self {
            PixelFormat::Monochrome => 1,
            PixelFormat::Yuv420 | PixelFormat::Yuv422 | PixelFormat::Yuv444 => 3,
        }
    }
}

macro_rules! impl_from_primitive {
    ($from:ty, $from_func: ident, $to: ident, $default: ident) => {
        impl From<$from> for $to {
            fn from(value: $from) -> Self {
                $to::$from_func(value).unwrap_or($to::$default)
            }
        }
    };
}

/// Axis of an `imir` mirror property.
#[derive(Debug, Default, PartialEq, Copy, Clone, FromPrimitive)]
pub enum MirrorAxis {
    #[default]
    Vertical = 0,
    Horizontal = 1,
}

impl_from_primitive!(u8, from_u8, MirrorAxis, Vertical);

/// How an item's extents locate its bytes (`iloc` construction method).
#[derive(Debug, Default, PartialEq, Copy, Clone, FromPrimitive)]
pub enum ConstructionMethod {
    #[default]
    File = 0,
    Idat = 1,
    Item = 2,
}

#[derive(Debug, PartialEq, Clone)]
pub enum HeifError {
    InvalidFtyp,
    BmffParseFailed(String),
    TruncatedData,
    IoError,
    NoPrimaryItem,
    NoExifItem,
    UnknownItem(u32),
    BadItemLocation(String),
    TooLarge(u64),
    Unsupported(String),
    InvalidImageGrid(String),
}

impl std::fmt::Display for HeifError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            HeifError::InvalidFtyp => write!(f, "ftyp box missing or brand not supported"),
            HeifError::BmffParseFailed(reason) => write!(f, "bmff parsing failed: {reason}"),
            HeifError::TruncatedData => write!(f, "read past the end of a box or of the file"),
            HeifError::IoError => write!(f, "underlying read failed"),
            HeifError::NoPrimaryItem => write!(f, "file has no pitm box"),
            HeifError::NoExifItem => write!(f, "file has no Exif item"),
            HeifError::UnknownItem(id) => write!(f, "no infe entry for item {id}"),
            HeifError::BadItemLocation(reason) => write!(f, "bad item location: {reason}"),
            HeifError::TooLarge(size) => write!(f, "declared size {size} exceeds sanity cap"),
            HeifError::Unsupported(what) => write!(f, "unsupported: {what}"),
            HeifError::InvalidImageGrid(reason) => write!(f, "invalid image grid: {reason}"),
        }
    }
}

impl std::error::Error for HeifError {}

pub type HeifResult<T> = Result<T, HeifError>;
