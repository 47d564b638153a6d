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

//! Interfaces of the pixel decoders this crate feeds. The container reader
//! never decodes; implementations of these traits live in codec binding
//! crates.

use crate::HeifResult;
use crate::PixelFormat;

/// One decoded picture in planar YCbCr layout, 8 or 10 bits per component.
/// Plane order is Y, Cb, Cr; monochrome pictures populate only Y.
#[derive(Debug, Default)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    pub depth: u8,
    pub format: PixelFormat,
    pub planes: [Vec<u8>; 3],
    pub row_bytes: [u32; 3],
}

/// HEVC decoder driven in push/pull style. For an `hvc1` item, push the
/// header synthesized by `HevcConfiguration::as_header` first, then the
/// item's coded data, then call `decode` until a picture is produced.
pub trait HevcDecoder {
    fn reset(&mut self) -> HeifResult<()>;
    fn push(&mut self, payload: &[u8]) -> HeifResult<()>;
    fn decode(&mut self) -> HeifResult<Picture>;
    // Destruction must be implemented using Drop.
}

/// AV1 decoder driven analogously. `av01` item payloads are passed through
/// unchanged; no header synthesis is performed.
pub trait Av1Decoder {
    fn reset(&mut self) -> HeifResult<()>;
    fn send_data(&mut self, payload: &[u8]) -> HeifResult<()>;
    fn get_picture(&mut self) -> HeifResult<Picture>;
}
