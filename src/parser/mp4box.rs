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

use crate::internal_utils::io::GenericIO;
use crate::internal_utils::stream::*;
use crate::internal_utils::*;
use crate::*;

use derivative::Derivative;
use log::{debug, warn};
use num_traits::cast::FromPrimitive as _;
use std::collections::HashSet;

#[derive(Debug, PartialEq)]
pub enum BoxSize {
    FixedSize(usize),
    // The box with size 0 extends to the end of the enclosing stream and is
    // the last box of its container.
    UntilEndOfStream,
}

#[derive(Debug)]
struct BoxHeader {
    size: BoxSize,
    box_type: String,
}

#[derive(Debug)]
pub struct FileTypeBox {
    pub major_brand: String,
    #[allow(unused)]
    minor_version: u32,
    compatible_brands: Vec<String>,
}

impl FileTypeBox {
    fn has_brand(&self, brand: &str) -> bool {
        if self.major_brand.as_str() == brand {
            return true;
        }
        self.compatible_brands.iter().any(|x| x.as_str() == brand)
    }

    pub fn is_heif(&self) -> bool {
        [
            "heic", "heix", "heim", "heis", "hevc", "hevx", "mif1", "msf1", "miaf", "avif", "avis",
        ]
        .iter()
        .any(|brand| self.has_brand(brand))
    }

    pub fn is_avif(&self) -> bool {
        self.has_brand("avif") || self.has_brand("avis")
    }
}

#[derive(Debug, Clone)]
pub struct ItemLocationExtent {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Default, Clone)]
pub struct ItemLocationEntry {
    pub item_id: u32,
    pub construction_method: ConstructionMethod,
    #[allow(unused)]
    pub data_reference_index: u16,
    pub base_offset: u64,
    pub extents: Vec<ItemLocationExtent>,
}

#[derive(Debug, Default)]
pub struct ItemLocationBox {
    offset_size: u8,
    length_size: u8,
    base_offset_size: u8,
    index_size: u8,
    pub items: Vec<ItemLocationEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSpatialExtents {
    pub width: u32,
    pub height: u32,
}

#[derive(Derivative, Clone, PartialEq)]
#[derivative(Debug)]
pub struct HevcNalArray {
    pub array_completeness: bool,
    pub nal_unit_type: u8,
    #[derivative(Debug = "ignore")]
    pub units: Vec<Vec<u8>>,
}

/// Contents of an `hvcC` box: the decoder configuration record followed by
/// the parameter set NAL units (VPS/SPS/PPS).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HevcConfiguration {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: u8,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: [u8; 6],
    pub general_level_idc: u8,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub nal_arrays: Vec<HevcNalArray>,
}

impl HevcConfiguration {
    /// Re-emits the parameter set NAL units with 4-byte big endian length
    /// prefixes, in iteration order. This is the prologue an HEVC decoder
    /// must receive before the coded slice data of an item.
    pub fn as_header(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for array in &self.nal_arrays {
            for unit in &array.units {
                out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
                out.extend_from_slice(unit);
            }
        }
        out
    }

    pub fn depth(&self) -> u8 {
        self.bit_depth_luma
    }

    pub fn pixel_format(&self) -> PixelFormat {
        match self.chroma_format_idc {
            0 => PixelFormat::Monochrome,
            1 => PixelFormat::Yuv420,
            2 => PixelFormat::Yuv422,
            _ => PixelFormat::Yuv444,
        }
    }
}

/// Contents of an `av1C` box.
#[derive(Derivative, Default, Clone, PartialEq)]
#[derivative(Debug)]
pub struct Av1Configuration {
    pub seq_profile: u8,
    pub seq_level_idx0: u8,
    pub seq_tier0: u8,
    pub high_bitdepth: bool,
    pub twelve_bit: bool,
    pub monochrome: bool,
    pub chroma_subsampling_x: u8,
    pub chroma_subsampling_y: u8,
    pub chroma_sample_position: u8,
    #[derivative(Debug = "ignore")]
    pub config_obus: Vec<u8>,
}

impl Av1Configuration {
    pub fn depth(&self) -> u8 {
        match self.twelve_bit {
            true => 12,
            false => match self.high_bitdepth {
                true => 10,
                false => 8,
            },
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        if self.monochrome {
            PixelFormat::Monochrome
        } else if self.chroma_subsampling_x == 1 && self.chroma_subsampling_y == 1 {
            PixelFormat::Yuv420
        } else if self.chroma_subsampling_x == 1 {
            PixelFormat::Yuv422
        } else {
            PixelFormat::Yuv444
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemProperty {
    ImageSpatialExtents(ImageSpatialExtents),
    ImageRotation(u8),
    ImageMirror(MirrorAxis),
    HevcConfiguration(HevcConfiguration),
    Av1Configuration(Av1Configuration),
    Unknown(String),
}

#[derive(Debug, Default)]
pub struct ItemPropertyAssociation {
    #[allow(unused)]
    pub(crate) version: u8,
    #[allow(unused)]
    pub(crate) flags: u32,
    pub item_id: u32,
    // (1-based property index, essential)
    pub associations: Vec<(u16, bool)>,
}

#[derive(Debug, Default)]
pub struct ItemPropertyBox {
    pub properties: Vec<ItemProperty>,
    pub associations: Vec<ItemPropertyAssociation>,
}

#[derive(Debug, Default, Clone)]
pub struct ItemInfo {
    pub item_id: u32,
    #[allow(unused)]
    pub item_protection_index: u16,
    pub item_type: String,
    pub item_name: String,
    // If item_type is "mime":
    pub content_type: String,
    pub content_encoding: String,
    // If item_type is "uri ":
    pub uri_type: String,
}

#[derive(Debug, Clone)]
pub struct ItemReferenceEntry {
    pub reference_type: String,
    pub from_item_id: u32,
    pub to_item_ids: Vec<u32>,
}

#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct MetaBox {
    pub handler_type: String,
    // 0 means the file carried no pitm box.
    pub primary_item_id: u32,
    pub iinf: Vec<ItemInfo>,
    pub iloc: ItemLocationBox,
    pub iprp: ItemPropertyBox,
    pub iref: Vec<ItemReferenceEntry>,
    #[derivative(Debug = "ignore")]
    pub idat: Vec<u8>,
}

impl MetaBox {
    pub fn exif_item_id(&self) -> Option<u32> {
        self.iinf
            .iter()
            .find(|x| x.item_type == "Exif")
            .map(|x| x.item_id)
    }
}

#[derive(Debug)]
pub struct HeifBoxes {
    pub ftyp: FileTypeBox,
    pub meta: MetaBox,
}

fn parse_header(stream: &mut IStream) -> HeifResult<BoxHeader> {
    let start_offset = stream.offset;
    let size32 = stream.read_u32()?;
    let box_type = stream.read_string(4)?;
    let mut size64 = size32 as u64;
    if size32 == 1 {
        // unsigned int(64) largesize;
        size64 = stream.read_u64()?;
    }
    if box_type == "uuid" {
        // unsigned int(8)[16] usertype;
        stream.skip(16)?;
    }
    let header_bytes = (stream.offset - start_offset) as u64;
    let size = match size32 {
        0 => BoxSize::UntilEndOfStream,
        _ => BoxSize::FixedSize(usize_from_u64(checked_sub!(size64, header_bytes)?)?),
    };
    Ok(BoxHeader { size, box_type })
}

fn parse_ftyp(stream: &mut IStream) -> HeifResult<FileTypeBox> {
    let major_brand = stream.read_string(4)?;
    let minor_version = stream.read_u32()?;
    let mut compatible_brands: Vec<String> = Vec::new();
    while stream.has_bytes_left() {
        compatible_brands.push(stream.read_string(4)?);
    }
    Ok(FileTypeBox {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

fn parse_hdlr(stream: &mut IStream) -> HeifResult<String> {
    let (_version, _flags) = stream.read_and_enforce_version_and_flags(0)?;
    // unsigned int(32) pre_defined = 0;
    let predefined = stream.read_u32()?;
    if predefined != 0 {
        return Err(HeifError::BmffParseFailed(
            "invalid pre_defined value in hdlr".into(),
        ));
    }
    // unsigned int(32) handler_type;
    let handler_type = stream.read_string(4)?;
    if handler_type != "pict" {
        warn!("handler type is {handler_type}, not pict");
    }
    // const unsigned int(32)[3] reserved = 0;
    stream.skip(4 * 3)?;
    // string name;
    // Verify that a valid string is here, but don't bother to store it.
    stream.read_c_string()?;
    Ok(handler_type)
}

fn parse_pitm(stream: &mut IStream) -> HeifResult<u32> {
    let (version, _flags) = stream.read_version_and_flags()?;
    let primary_item_id = if version == 0 {
        // unsigned int(16) item_ID;
        stream.read_u16()? as u32
    } else {
        // unsigned int(32) item_ID;
        stream.read_u32()?
    };
    Ok(primary_item_id)
}

fn parse_iloc(stream: &mut IStream) -> HeifResult<ItemLocationBox> {
    let (version, _flags) = stream.read_version_and_flags()?;
    if version > 2 {
        return Err(HeifError::BmffParseFailed("invalid version in iloc".into()));
    }
    let mut iloc = ItemLocationBox::default();
    let mut bits = stream.sub_bit_stream(2)?;
    // unsigned int(4) offset_size;
    iloc.offset_size = bits.read(4)? as u8;
    // unsigned int(4) length_size;
    iloc.length_size = bits.read(4)? as u8;
    // unsigned int(4) base_offset_size;
    iloc.base_offset_size = bits.read(4)? as u8;
    // unsigned int(4) index_size; (reserved when version is 0)
    if version >= 1 {
        iloc.index_size = bits.read(4)? as u8;
    } else {
        bits.read(4)?;
    }
    for size in [
        iloc.offset_size,
        iloc.length_size,
        iloc.base_offset_size,
        iloc.index_size,
    ] {
        if !matches!(size, 0 | 4 | 8) {
            return Err(HeifError::BmffParseFailed(
                "invalid field width in iloc".into(),
            ));
        }
    }
    let item_count: u32 = if version < 2 {
        // unsigned int(16) item_count;
        stream.read_u16()? as u32
    } else {
        // unsigned int(32) item_count;
        stream.read_u32()?
    };
    for _i in 0..item_count {
        let mut entry = ItemLocationEntry {
            item_id: if version < 2 {
                // unsigned int(16) item_ID;
                stream.read_u16()? as u32
            } else {
                // unsigned int(32) item_ID;
                stream.read_u32()?
            },
            ..ItemLocationEntry::default()
        };
        if entry.item_id == 0 {
            return Err(HeifError::BmffParseFailed("invalid item id in iloc".into()));
        }
        if version >= 1 {
            // unsigned int(12) reserved = 0;
            // unsigned int(4) construction_method;
            let cmeth = stream.read_u16()?;
            entry.construction_method = ConstructionMethod::from_u16(cmeth & 0xF).ok_or(
                HeifError::BmffParseFailed("unknown construction method in iloc".into()),
            )?;
        }
        // unsigned int(16) data_reference_index;
        entry.data_reference_index = stream.read_u16()?;
        // unsigned int(base_offset_size*8) base_offset;
        entry.base_offset = stream.read_uxx(iloc.base_offset_size)?;
        // unsigned int(16) extent_count;
        let extent_count = stream.read_u16()?;
        for _j in 0..extent_count {
            if version >= 1 && iloc.index_size > 0 {
                // unsigned int(index_size*8) extent_index;
                stream.read_uxx(iloc.index_size)?;
            }
            let extent = ItemLocationExtent {
                // unsigned int(offset_size*8) extent_offset;
                offset: stream.read_uxx(iloc.offset_size)?,
                // unsigned int(length_size*8) extent_length;
                length: stream.read_uxx(iloc.length_size)?,
            };
            entry.extents.push(extent);
        }
        iloc.items.push(entry);
    }
    Ok(iloc)
}

fn parse_infe(stream: &mut IStream) -> HeifResult<ItemInfo> {
    let (version, _flags) = stream.read_version_and_flags()?;
    if version != 2 {
        return Err(HeifError::Unsupported(format!("infe version {version}")));
    }
    let mut entry = ItemInfo {
        // unsigned int(16) item_ID;
        item_id: stream.read_u16()? as u32,
        ..ItemInfo::default()
    };
    if entry.item_id == 0 {
        return Err(HeifError::BmffParseFailed("invalid item id in infe".into()));
    }
    // unsigned int(16) item_protection_index;
    entry.item_protection_index = stream.read_u16()?;
    // unsigned int(32) item_type;
    entry.item_type = stream.read_string(4)?;
    // string item_name;
    entry.item_name = stream.read_c_string()?;
    match entry.item_type.as_str() {
        "mime" => {
            // string content_type;
            entry.content_type = stream.read_c_string()?;
            // string content_encoding; (optional)
            if stream.has_bytes_left() {
                entry.content_encoding = stream.read_c_string()?;
            }
        }
        "uri " => {
            // string item_uri_type;
            entry.uri_type = stream.read_c_string()?;
        }
        // Other item types leave any trailing bytes untouched.
        _ => {}
    }
    Ok(entry)
}

fn parse_iinf(stream: &mut IStream) -> HeifResult<Vec<ItemInfo>> {
    let (version, _flags) = stream.read_version_and_flags()?;
    let entry_count: u32 = if version == 0 {
        // unsigned int(16) entry_count;
        stream.read_u16()? as u32
    } else {
        // unsigned int(32) entry_count;
        stream.read_u32()?
    };
    let mut iinf: Vec<ItemInfo> = Vec::new();
    while stream.has_bytes_left() {
        let header = parse_header(stream)?;
        let mut sub_stream = stream.sub_stream(&header.size)?;
        if header.box_type == "infe" {
            iinf.push(parse_infe(&mut sub_stream)?);
        } else {
            debug!("skipping box {} in iinf", header.box_type);
        }
    }
    if iinf.len() as u32 != entry_count {
        debug!(
            "iinf declared {entry_count} entries but contained {}",
            iinf.len()
        );
    }
    Ok(iinf)
}

fn parse_iref(stream: &mut IStream) -> HeifResult<Vec<ItemReferenceEntry>> {
    let (version, _flags) = stream.read_version_and_flags()?;
    let mut iref: Vec<ItemReferenceEntry> = Vec::new();
    while stream.has_bytes_left() {
        let header = parse_header(stream)?;
        let mut sub_stream = stream.sub_stream(&header.size)?;
        let from_item_id: u32 = if version == 0 {
            // unsigned int(16) from_item_ID;
            sub_stream.read_u16()? as u32
        } else {
            // unsigned int(32) from_item_ID;
            sub_stream.read_u32()?
        };
        if from_item_id == 0 {
            return Err(HeifError::BmffParseFailed(
                "invalid from_item_id in iref".into(),
            ));
        }
        // unsigned int(16) reference_count;
        let reference_count = sub_stream.read_u16()?;
        let mut entry = ItemReferenceEntry {
            reference_type: header.box_type,
            from_item_id,
            to_item_ids: Vec::new(),
        };
        for _i in 0..reference_count {
            let to_item_id: u32 = if version == 0 {
                // unsigned int(16) to_item_ID;
                sub_stream.read_u16()? as u32
            } else {
                // unsigned int(32) to_item_ID;
                sub_stream.read_u32()?
            };
            if to_item_id == 0 {
                return Err(HeifError::BmffParseFailed(
                    "invalid to_item_id in iref".into(),
                ));
            }
            entry.to_item_ids.push(to_item_id);
        }
        iref.push(entry);
    }
    Ok(iref)
}

fn parse_idat(stream: &mut IStream) -> HeifResult<Vec<u8>> {
    Ok(stream.get_slice(stream.bytes_left())?.to_vec())
}

fn parse_ispe(stream: &mut IStream) -> HeifResult<ItemProperty> {
    let (_version, _flags) = stream.read_and_enforce_version_and_flags(0)?;
    let ispe = ImageSpatialExtents {
        // unsigned int(32) image_width;
        width: stream.read_u32()?,
        // unsigned int(32) image_height;
        height: stream.read_u32()?,
    };
    Ok(ItemProperty::ImageSpatialExtents(ispe))
}

fn parse_irot(stream: &mut IStream) -> HeifResult<ItemProperty> {
    // unsigned int(6) reserved = 0;
    // unsigned int(2) angle;
    let angle = stream.read_u8()? & 3;
    Ok(ItemProperty::ImageRotation(angle))
}

fn parse_imir(stream: &mut IStream) -> HeifResult<ItemProperty> {
    // unsigned int(7) reserved = 0;
    // unsigned int(1) axis;
    let axis = stream.read_u8()? & 1;
    Ok(ItemProperty::ImageMirror(axis.into()))
}

#[allow(non_snake_case)]
fn parse_hvcC(stream: &mut IStream) -> HeifResult<ItemProperty> {
    let mut config = HevcConfiguration {
        // unsigned int(8) configurationVersion;
        configuration_version: stream.read_u8()?,
        ..HevcConfiguration::default()
    };
    // unsigned int(2) general_profile_space;
    // unsigned int(1) general_tier_flag;
    // unsigned int(5) general_profile_idc;
    let byte = stream.read_u8()?;
    config.general_profile_space = (byte >> 6) & 0x3;
    config.general_tier_flag = (byte >> 5) & 0x1;
    config.general_profile_idc = byte & 0x1F;
    // unsigned int(32) general_profile_compatibility_flags;
    config.general_profile_compatibility_flags = stream.read_u32()?;
    // unsigned int(48) general_constraint_indicator_flags;
    config
        .general_constraint_indicator_flags
        .copy_from_slice(stream.get_slice(6)?);
    // unsigned int(8) general_level_idc;
    config.general_level_idc = stream.read_u8()?;
    // bits(4) reserved = 1111b;
    // unsigned int(12) min_spatial_segmentation_idc;
    config.min_spatial_segmentation_idc = stream.read_u16()? & 0x0FFF;
    // bits(6) reserved = 111111b;
    // unsigned int(2) parallelismType;
    config.parallelism_type = stream.read_u8()? & 0x3;
    // bits(6) reserved = 111111b;
    // unsigned int(2) chroma_format_idc;
    config.chroma_format_idc = stream.read_u8()? & 0x3;
    // bits(5) reserved = 11111b;
    // unsigned int(3) bit_depth_luma_minus8;
    config.bit_depth_luma = (stream.read_u8()? & 0x7) + 8;
    // bits(5) reserved = 11111b;
    // unsigned int(3) bit_depth_chroma_minus8;
    config.bit_depth_chroma = (stream.read_u8()? & 0x7) + 8;
    // unsigned int(16) avgFrameRate;
    config.avg_frame_rate = stream.read_u16()?;
    // unsigned int(2) constantFrameRate;
    // unsigned int(3) numTemporalLayers;
    // unsigned int(1) temporalIdNested;
    // unsigned int(2) lengthSizeMinusOne;
    let byte = stream.read_u8()?;
    config.constant_frame_rate = (byte >> 6) & 0x3;
    config.num_temporal_layers = (byte >> 3) & 0x7;
    config.temporal_id_nested = (byte >> 2) & 0x1 == 1;
    // unsigned int(8) numOfArrays;
    let num_arrays = stream.read_u8()?;
    for _i in 0..num_arrays {
        // unsigned int(1) array_completeness;
        // unsigned int(1) reserved = 0;
        // unsigned int(6) NAL_unit_type;
        let byte = stream.read_u8()?;
        let mut array = HevcNalArray {
            array_completeness: (byte >> 7) & 0x1 == 1,
            nal_unit_type: byte & 0x3F,
            units: Vec::new(),
        };
        // unsigned int(16) numNalus;
        let num_units = stream.read_u16()?;
        for _j in 0..num_units {
            // unsigned int(16) nalUnitLength;
            let size = stream.read_u16()? as usize;
            if size == 0 {
                // Ignore empty NAL units.
                continue;
            }
            array.units.push(stream.get_slice(size)?.to_vec());
        }
        config.nal_arrays.push(array);
    }
    Ok(ItemProperty::HevcConfiguration(config))
}

#[allow(non_snake_case)]
fn parse_av1C(stream: &mut IStream) -> HeifResult<ItemProperty> {
    // unsigned int(1) marker = 1;
    // unsigned int(7) version = 1;
    let mut bits = stream.sub_bit_stream(4)?;
    if bits.read(1)? != 1 {
        return Err(HeifError::BmffParseFailed("invalid marker in av1C".into()));
    }
    if bits.read(7)? != 1 {
        return Err(HeifError::BmffParseFailed("invalid version in av1C".into()));
    }
    let mut av1C = Av1Configuration {
        // unsigned int(3) seq_profile;
        // unsigned int(5) seq_level_idx_0;
        seq_profile: bits.read(3)? as u8,
        seq_level_idx0: bits.read(5)? as u8,
        // unsigned int(1) seq_tier_0;
        // unsigned int(1) high_bitdepth;
        // unsigned int(1) twelve_bit;
        // unsigned int(1) monochrome;
        // unsigned int(1) chroma_subsampling_x;
        // unsigned int(1) chroma_subsampling_y;
        // unsigned int(2) chroma_sample_position;
        seq_tier0: bits.read(1)? as u8,
        high_bitdepth: bits.read_bool()?,
        twelve_bit: bits.read_bool()?,
        monochrome: bits.read_bool()?,
        chroma_subsampling_x: bits.read(1)? as u8,
        chroma_subsampling_y: bits.read(1)? as u8,
        chroma_sample_position: bits.read(2)? as u8,
        ..Av1Configuration::default()
    };
    // unsigned int(3) reserved = 0;
    // unsigned int(1) initial_presentation_delay_present;
    // unsigned int(4) initial_presentation_delay_minus_one or reserved;
    bits.read(8)?;
    // unsigned int(8) configOBUs[];
    av1C.config_obus = stream.get_slice(stream.bytes_left())?.to_vec();
    Ok(ItemProperty::Av1Configuration(av1C))
}

fn parse_ipco(stream: &mut IStream) -> HeifResult<Vec<ItemProperty>> {
    let mut properties: Vec<ItemProperty> = Vec::new();
    while stream.has_bytes_left() {
        let header = parse_header(stream)?;
        let mut sub_stream = stream.sub_stream(&header.size)?;
        match header.box_type.as_str() {
            "ispe" => properties.push(parse_ispe(&mut sub_stream)?),
            "irot" => properties.push(parse_irot(&mut sub_stream)?),
            "imir" => properties.push(parse_imir(&mut sub_stream)?),
            "hvcC" => properties.push(parse_hvcC(&mut sub_stream)?),
            "av1C" => properties.push(parse_av1C(&mut sub_stream)?),
            // Unrecognized properties still occupy their 1-based index in
            // the pool.
            _ => properties.push(ItemProperty::Unknown(header.box_type)),
        }
    }
    Ok(properties)
}

fn parse_ipma(stream: &mut IStream) -> HeifResult<Vec<ItemPropertyAssociation>> {
    let (version, flags) = stream.read_version_and_flags()?;
    // unsigned int(32) entry_count;
    let entry_count = stream.read_u32()?;
    let mut ipma: Vec<ItemPropertyAssociation> = Vec::new();
    for _i in 0..entry_count {
        let mut entry = ItemPropertyAssociation {
            version,
            flags,
            ..ItemPropertyAssociation::default()
        };
        if version < 1 {
            // unsigned int(16) item_ID;
            entry.item_id = stream.read_u16()? as u32;
        } else {
            // unsigned int(32) item_ID;
            entry.item_id = stream.read_u32()?;
        }
        if entry.item_id == 0 {
            return Err(HeifError::BmffParseFailed("invalid item id in ipma".into()));
        }
        // unsigned int(8) association_count;
        let association_count = stream.read_u8()?;
        for _j in 0..association_count {
            // bit(1) essential;
            // unsigned int(7 or 15) property_index;
            let mut bits = stream.sub_bit_stream(1)?;
            let essential = bits.read_bool()?;
            let mut property_index: u16 = bits.read(7)? as u16;
            if (flags & 0x1) == 1 {
                let property_index_lsb: u16 = stream.read_u8()? as u16;
                property_index <<= 8;
                property_index |= property_index_lsb;
            }
            entry.associations.push((property_index, essential));
        }
        ipma.push(entry);
    }
    Ok(ipma)
}

fn parse_iprp(stream: &mut IStream) -> HeifResult<ItemPropertyBox> {
    let header = parse_header(stream)?;
    if header.box_type != "ipco" {
        return Err(HeifError::BmffParseFailed(
            "first box in iprp is not ipco".into(),
        ));
    }
    let mut iprp = ItemPropertyBox::default();
    // Parse the ipco box.
    {
        let mut sub_stream = stream.sub_stream(&header.size)?;
        iprp.properties = parse_ipco(&mut sub_stream)?;
    }
    // Parse the ipma boxes.
    while stream.has_bytes_left() {
        let header = parse_header(stream)?;
        if header.box_type != "ipma" {
            return Err(HeifError::BmffParseFailed(
                "found non ipma box in iprp".into(),
            ));
        }
        let mut sub_stream = stream.sub_stream(&header.size)?;
        iprp.associations.append(&mut parse_ipma(&mut sub_stream)?);
    }
    Ok(iprp)
}

fn parse_dref(stream: &mut IStream) -> HeifResult<()> {
    let (_version, _flags) = stream.read_version_and_flags()?;
    // unsigned int(32) entry_count;
    let entry_count = stream.read_u32()?;
    for _i in 0..entry_count {
        if !stream.has_bytes_left() {
            break;
        }
        // DataEntryBox() entries are validated structurally and skipped.
        let header = parse_header(stream)?;
        stream.sub_stream(&header.size)?;
    }
    Ok(())
}

fn parse_dinf(stream: &mut IStream) -> HeifResult<()> {
    while stream.has_bytes_left() {
        let header = parse_header(stream)?;
        let mut sub_stream = stream.sub_stream(&header.size)?;
        match header.box_type.as_str() {
            "dref" => parse_dref(&mut sub_stream)?,
            _ => debug!("skipping box {} in dinf", header.box_type),
        }
    }
    Ok(())
}

fn parse_meta(stream: &mut IStream) -> HeifResult<MetaBox> {
    let (_version, _flags) = stream.read_and_enforce_version_and_flags(0)?;
    let mut meta = MetaBox::default();
    let mut boxes_seen: HashSet<String> = HashSet::new();
    while stream.has_bytes_left() {
        let header = parse_header(stream)?;
        match header.box_type.as_str() {
            "hdlr" | "iloc" | "pitm" | "iprp" | "iinf" | "iref" | "idat" => {
                if !boxes_seen.insert(header.box_type.clone()) {
                    return Err(HeifError::BmffParseFailed(format!(
                        "duplicate {} box in meta",
                        header.box_type
                    )));
                }
            }
            _ => {}
        }
        let mut sub_stream = stream.sub_stream(&header.size)?;
        match header.box_type.as_str() {
            "hdlr" => meta.handler_type = parse_hdlr(&mut sub_stream)?,
            "pitm" => meta.primary_item_id = parse_pitm(&mut sub_stream)?,
            "iloc" => meta.iloc = parse_iloc(&mut sub_stream)?,
            "iinf" => meta.iinf = parse_iinf(&mut sub_stream)?,
            "iprp" => meta.iprp = parse_iprp(&mut sub_stream)?,
            "iref" => meta.iref = parse_iref(&mut sub_stream)?,
            "idat" => meta.idat = parse_idat(&mut sub_stream)?,
            "dinf" => parse_dinf(&mut sub_stream)?,
            _ => debug!("skipping box {} in meta", header.box_type),
        }
    }
    Ok(meta)
}

pub fn parse(io: &mut dyn GenericIO) -> HeifResult<HeifBoxes> {
    let mut ftyp: Option<FileTypeBox> = None;
    let mut meta: Option<MetaBox> = None;
    let mut parse_offset: u64 = 0;
    loop {
        // Read just enough to cover the next box header (size + type +
        // largesize + uuid usertype).
        let header_data = io.read(parse_offset, 32)?;
        if header_data.is_empty() {
            // End of the stream.
            break;
        }
        let mut header_stream = IStream::create(header_data);
        let header = parse_header(&mut header_stream)?;
        checked_incr!(parse_offset, header_stream.offset as u64);
        let body_size = match header.size {
            BoxSize::FixedSize(size) => size,
            BoxSize::UntilEndOfStream => {
                usize_from_u64(io.size_hint().saturating_sub(parse_offset))?
            }
        };
        match header.box_type.as_str() {
            "ftyp" | "meta" => {
                let box_data = io.read_exact(parse_offset, body_size)?;
                let mut box_stream = IStream::create(box_data);
                match header.box_type.as_str() {
                    "ftyp" => {
                        let filetype = parse_ftyp(&mut box_stream)?;
                        if !filetype.is_heif() {
                            return Err(HeifError::InvalidFtyp);
                        }
                        ftyp = Some(filetype);
                    }
                    _ => meta = Some(parse_meta(&mut box_stream)?),
                }
                if ftyp.is_some() && meta.is_some() {
                    // Enough information has been parsed to consider parse a
                    // success.
                    break;
                }
            }
            _ => debug!("skipping box {}", header.box_type),
        }
        if matches!(header.size, BoxSize::UntilEndOfStream) {
            // The final box of the file.
            break;
        }
        checked_incr!(parse_offset, body_size as u64);
    }
    if ftyp.is_none() {
        return Err(HeifError::InvalidFtyp);
    }
    match meta {
        Some(meta) => Ok(HeifBoxes {
            ftyp: ftyp.unwrap(),
            meta,
        }),
        None => Err(HeifError::BmffParseFailed("file has no meta box".into())),
    }
}

/// Returns true if the bytes look like the start of a HEIF/AVIF file: 4
/// arbitrary bytes (the box size) followed by `ftyp` and a supported brand.
pub fn peek_compatible_file_type(data: &[u8]) -> HeifResult<bool> {
    let mut stream = IStream::create(data);
    let header = parse_header(&mut stream)?;
    if header.box_type != "ftyp" {
        return Ok(false);
    }
    let mut sub_stream = stream.sub_stream(&header.size)?;
    let ftyp = parse_ftyp(&mut sub_stream)?;
    Ok(ftyp.is_heif())
}
