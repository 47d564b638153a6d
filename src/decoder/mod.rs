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

pub mod item;

use crate::decoder::item::*;
use crate::internal_utils::io::*;
use crate::internal_utils::stream::*;
use crate::internal_utils::*;
use crate::parser::mp4box;
use crate::parser::mp4box::*;
use crate::*;

// Sanity cap against hostile inputs that declare absurd extent lengths.
pub const MAX_ITEM_DATA_SIZE: u64 = 200 << 20;

/// Geometry of a `grid` derived item: the tile layout and the output crop.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Grid {
    pub rows: u32,
    pub columns: u32,
    pub width: u32,
    pub height: u32,
}

/// Handle over one HEIF/AVIF file.
///
/// Construction is cheap; the box tree is parsed on the first query and the
/// result (or the first failure) is cached for the lifetime of the handle.
/// Methods take `&mut self` for the lazy parse and the IO buffer; a
/// `HeifFile` must not be shared across threads.
pub struct HeifFile {
    io: GenericIOBox,
    boxes: Option<HeifBoxes>,
    // The first parsing failure. Once set it is returned by every
    // subsequent operation, so callers always observe the same error.
    parse_error: Option<HeifError>,
}

impl HeifFile {
    pub fn new(io: GenericIOBox) -> Self {
        Self {
            io,
            boxes: None,
            parse_error: None,
        }
    }

    pub fn from_file(filename: impl AsRef<std::path::Path>) -> HeifResult<Self> {
        Ok(Self::new(Box::new(FileIO::create(filename)?)))
    }

    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Box::new(MemoryIO::create(data)))
    }

    /// Accepts a sequential reader by slurping it into memory first.
    pub fn from_reader(reader: &mut impl std::io::Read) -> HeifResult<Self> {
        Ok(Self::new(Box::new(MemoryIO::create_from_reader(reader)?)))
    }

    pub fn peek_compatible_file_type(data: &[u8]) -> bool {
        mp4box::peek_compatible_file_type(data).unwrap_or(false)
    }

    fn parse_boxes(&mut self) -> HeifResult<()> {
        if let Some(error) = &self.parse_error {
            return Err(error.clone());
        }
        if self.boxes.is_some() {
            return Ok(());
        }
        match mp4box::parse(self.io.as_mut()) {
            Ok(boxes) => {
                self.boxes = Some(boxes);
                Ok(())
            }
            Err(error) => {
                self.parse_error = Some(error.clone());
                Err(error)
            }
        }
    }

    fn meta(&mut self) -> HeifResult<&MetaBox> {
        self.parse_boxes()?;
        Ok(&self.boxes.as_ref().unwrap().meta)
    }

    pub fn file_type(&mut self) -> HeifResult<&FileTypeBox> {
        self.parse_boxes()?;
        Ok(&self.boxes.as_ref().unwrap().ftyp)
    }

    /// The 4CC of the meta handler, usually "pict".
    pub fn handler_type(&mut self) -> HeifResult<&str> {
        Ok(self.meta()?.handler_type.as_str())
    }

    /// Builds the view of the item with the given id.
    pub fn item_by_id(&mut self, id: u32) -> HeifResult<Item> {
        construct_item(self.meta()?, id)
    }

    /// The item the `pitm` box designates as the primary image.
    pub fn primary_item(&mut self) -> HeifResult<Item> {
        let primary_item_id = self.meta()?.primary_item_id;
        if primary_item_id == 0 {
            return Err(HeifError::NoPrimaryItem);
        }
        self.item_by_id(primary_item_id)
    }

    /// Width and height of the primary item without touching coded data.
    pub fn primary_config(&mut self) -> HeifResult<(u32, u32)> {
        self.primary_item()?
            .spatial_extents()
            .ok_or(HeifError::BmffParseFailed(
                "primary item has no ispe property".into(),
            ))
    }

    /// The raw EXIF blob of the file, with the 4 byte TIFF header offset
    /// prefix of the HEIF EXIF item format removed.
    pub fn exif(&mut self) -> HeifResult<Vec<u8>> {
        let exif_item_id = self
            .meta()?
            .exif_item_id()
            .ok_or(HeifError::NoExifItem)?;
        let item = self.item_by_id(exif_item_id)?;
        let data = self.item_data(&item)?;
        if data.len() < 4 {
            return Err(HeifError::BmffParseFailed("exif payload too short".into()));
        }
        Ok(data[4..].to_vec())
    }

    /// Resolves the item's single extent and returns a copy of its bytes.
    /// Items with zero or multiple extents are rejected.
    pub fn item_data(&mut self, item: &Item) -> HeifResult<Vec<u8>> {
        self.parse_boxes()?;
        let location = item
            .location
            .as_ref()
            .ok_or(HeifError::BadItemLocation("item has no location".into()))?;
        if location.extents.len() != 1 {
            return Err(HeifError::BadItemLocation(format!(
                "expected 1 extent, saw {}",
                location.extents.len()
            )));
        }
        let extent = &location.extents[0];
        match location.construction_method {
            ConstructionMethod::Idat => {
                let idat = &self.boxes.as_ref().unwrap().meta.idat;
                if idat.is_empty() {
                    return Err(HeifError::BadItemLocation("no idat for item".into()));
                }
                let start = usize_from_u64(extent.offset)?;
                let end = usize_from_u64(checked_add!(extent.offset, extent.length)?)?;
                if end > idat.len() {
                    return Err(HeifError::BadItemLocation("idat extent out of bounds".into()));
                }
                Ok(idat[start..end].to_vec())
            }
            ConstructionMethod::File => {
                if extent.length > MAX_ITEM_DATA_SIZE {
                    return Err(HeifError::TooLarge(extent.length));
                }
                let offset = checked_add!(location.base_offset, extent.offset)?;
                let end = checked_add!(offset, extent.length)?;
                if end > self.io.size_hint() {
                    return Err(HeifError::BadItemLocation(
                        "extent is out of file bounds".into(),
                    ));
                }
                let data = self.io.read_exact(offset, usize_from_u64(extent.length)?)?;
                Ok(data.to_vec())
            }
            ConstructionMethod::Item => Err(HeifError::Unsupported(
                "iloc construction method 2".into(),
            )),
        }
    }

    /// Parses the grid descriptor record of a `grid` derived item.
    pub fn grid_info(&mut self, item: &Item) -> HeifResult<Grid> {
        if item.item_type() != "grid" {
            return Err(HeifError::InvalidImageGrid(
                "item is not a grid derivation".into(),
            ));
        }
        let data = self.item_data(item)?;
        let mut stream = IStream::create(&data);
        // unsigned int(8) version; ignored.
        stream.read_u8()?;
        // unsigned int(8) flags;
        let flags = stream.read_u8()?;
        let mut grid = Grid {
            // unsigned int(8) rows_minus_one;
            rows: stream.read_u8()? as u32 + 1,
            // unsigned int(8) columns_minus_one;
            columns: stream.read_u8()? as u32 + 1,
            ..Grid::default()
        };
        if (flags & 1) == 1 {
            // unsigned int(32) output_width;
            grid.width = stream.read_u32()?;
            // unsigned int(32) output_height;
            grid.height = stream.read_u32()?;
        } else {
            // unsigned int(16) output_width;
            grid.width = stream.read_u16()? as u32;
            // unsigned int(16) output_height;
            grid.height = stream.read_u16()? as u32;
        }
        Ok(grid)
    }

    /// Resolves a grid item to its geometry and its tile item ids in
    /// row-major order. The `dimg` fan-out must match rows x columns;
    /// callers decode each tile and stitch them, cropping to the declared
    /// output dimensions.
    pub fn grid_tiles(&mut self, item: &Item) -> HeifResult<(Grid, Vec<u32>)> {
        let grid = self.grid_info(item)?;
        let dimg = item.reference("dimg").ok_or(HeifError::InvalidImageGrid(
            "grid item has no dimg reference".into(),
        ))?;
        let tile_count = checked_mul!(grid.rows as u64, grid.columns as u64)?;
        if dimg.to_item_ids.len() as u64 != tile_count {
            return Err(HeifError::InvalidImageGrid(format!(
                "tiles number not matched: {} != {}",
                dimg.to_item_ids.len(),
                tile_count
            )));
        }
        Ok((grid, dimg.to_item_ids.clone()))
    }
}
