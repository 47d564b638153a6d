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

use crate::parser::mp4box::*;
use crate::*;

/// Read-only view of one item of the file: its info entry, location,
/// resolved properties and outgoing references.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: u32,
    pub info: ItemInfo,
    pub location: Option<ItemLocationEntry>,
    pub properties: Vec<ItemProperty>,
    pub references: Vec<ItemReferenceEntry>,
}

macro_rules! find_property {
    ($self:ident, $a:ident) => {
        $self
            .properties
            .iter()
            .find(|x| matches!(x, ItemProperty::$a(_)))
    };
}

impl Item {
    pub fn item_type(&self) -> &str {
        &self.info.item_type
    }

    pub fn spatial_extents(&self) -> Option<(u32, u32)> {
        match find_property!(self, ImageSpatialExtents) {
            Some(ItemProperty::ImageSpatialExtents(ispe)) => Some((ispe.width, ispe.height)),
            _ => None,
        }
    }

    /// The number of 90 degree counter-clockwise rotations this image should
    /// be rendered at, in the range [0, 3].
    pub fn rotation(&self) -> u8 {
        match find_property!(self, ImageRotation) {
            Some(ItemProperty::ImageRotation(angle)) => *angle,
            _ => 0,
        }
    }

    pub fn mirror(&self) -> Option<MirrorAxis> {
        match find_property!(self, ImageMirror) {
            Some(ItemProperty::ImageMirror(axis)) => Some(*axis),
            _ => None,
        }
    }

    /// Spatial extents corrected for rotation: an odd number of quarter
    /// turns swaps width and height.
    pub fn visual_dimensions(&self) -> Option<(u32, u32)> {
        let (width, height) = self.spatial_extents()?;
        match self.rotation() % 2 {
            0 => Some((width, height)),
            _ => Some((height, width)),
        }
    }

    pub fn hevc_config(&self) -> Option<&HevcConfiguration> {
        match find_property!(self, HevcConfiguration) {
            Some(ItemProperty::HevcConfiguration(config)) => Some(config),
            _ => None,
        }
    }

    pub fn av1_config(&self) -> Option<&Av1Configuration> {
        match find_property!(self, Av1Configuration) {
            Some(ItemProperty::Av1Configuration(config)) => Some(config),
            _ => None,
        }
    }

    /// The outgoing reference of the given type, if any (for example "dimg"
    /// on a grid item, or "thmb" on a thumbnail).
    pub fn reference(&self, reference_type: &str) -> Option<&ItemReferenceEntry> {
        self.references
            .iter()
            .find(|x| x.reference_type == reference_type)
    }
}

pub(crate) fn construct_item(meta: &MetaBox, id: u32) -> HeifResult<Item> {
    let info = meta
        .iinf
        .iter()
        .find(|x| x.item_id == id)
        .ok_or(HeifError::UnknownItem(id))?
        .clone();
    let location = meta.iloc.items.iter().find(|x| x.item_id == id).cloned();
    let references: Vec<ItemReferenceEntry> = meta
        .iref
        .iter()
        .filter(|x| x.from_item_id == id)
        .cloned()
        .collect();
    let mut properties: Vec<ItemProperty> = Vec::new();
    for association in &meta.iprp.associations {
        if !properties.is_empty() {
            // Merge only the first ipma entry that yields anything. Entries
            // for the same item in further association boxes are ignored.
            break;
        }
        if association.item_id != id {
            continue;
        }
        for (property_index, _essential) in &association.associations {
            let property_index = *property_index as usize;
            // An index of 0 means no association; out of range indices are
            // ignored as well.
            if property_index == 0 || property_index > meta.iprp.properties.len() {
                continue;
            }
            // property_index is 1-indexed.
            properties.push(meta.iprp.properties[property_index - 1].clone());
        }
    }
    Ok(Item {
        id,
        info,
        location,
        properties,
        references,
    })
}
