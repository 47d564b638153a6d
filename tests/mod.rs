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

// Not all helpers are used from all test targets. So allow unused functions
// in this module.
#![allow(unused)]

/// Big endian box writer used to synthesize HEIF structures in memory. The
/// 4-byte size of a started box is backpatched when the box is finished.
#[derive(Default)]
pub struct BoxWriter {
    pub data: Vec<u8>,
    box_marker_offsets: Vec<usize>,
}

impl BoxWriter {
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_slice(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    pub fn write_str_with_nul(&mut self, value: &str) {
        self.write_slice(value.as_bytes());
        self.write_u8(0);
    }

    pub fn start_box(&mut self, box_type: &str) {
        self.box_marker_offsets.push(self.data.len());
        // 4 bytes for the size to be filled out later.
        self.write_u32(0);
        self.write_slice(box_type.as_bytes());
    }

    pub fn start_full_box(&mut self, box_type: &str, version_and_flags: (u8, u32)) {
        self.start_box(box_type);
        self.write_u8(version_and_flags.0);
        self.write_slice(&version_and_flags.1.to_be_bytes()[1..]);
    }

    pub fn finish_box(&mut self) {
        let offset = self.box_marker_offsets.pop().expect("no box to finish");
        let box_size = (self.data.len() - offset) as u32;
        self.data[offset..offset + 4].copy_from_slice(&box_size.to_be_bytes());
    }
}

pub fn write_ftyp(w: &mut BoxWriter) {
    w.start_box("ftyp");
    w.write_slice(b"mif1");
    w.write_u32(0);
    w.write_slice(b"mif1");
    w.write_slice(b"heic");
    w.finish_box();
}

pub fn write_hdlr(w: &mut BoxWriter) {
    w.start_full_box("hdlr", (0, 0));
    w.write_u32(0); // pre_defined
    w.write_slice(b"pict");
    w.write_slice(&[0u8; 12]); // reserved
    w.write_str_with_nul("");
    w.finish_box();
}

pub fn write_pitm(w: &mut BoxWriter, item_id: u16) {
    w.start_full_box("pitm", (0, 0));
    w.write_u16(item_id);
    w.finish_box();
}

pub fn write_infe(w: &mut BoxWriter, item_id: u16, item_type: &str) {
    w.start_full_box("infe", (2, 0));
    w.write_u16(item_id);
    w.write_u16(0); // item_protection_index
    w.write_slice(item_type.as_bytes());
    w.write_str_with_nul("");
    w.finish_box();
}

pub fn write_iinf(w: &mut BoxWriter, entries: &[(u16, &str)]) {
    w.start_full_box("iinf", (0, 0));
    w.write_u16(entries.len() as u16);
    for (item_id, item_type) in entries {
        write_infe(w, *item_id, item_type);
    }
    w.finish_box();
}

pub fn write_iref_dimg(w: &mut BoxWriter, from_item_id: u16, to_item_ids: &[u16]) {
    w.start_full_box("iref", (0, 0));
    w.start_box("dimg");
    w.write_u16(from_item_id);
    w.write_u16(to_item_ids.len() as u16);
    for to_item_id in to_item_ids {
        w.write_u16(*to_item_id);
    }
    w.finish_box();
    w.finish_box();
}

pub struct IlocEntry {
    pub item_id: u16,
    // 0 = from the file, 1 = from idat.
    pub construction_method: u16,
    pub extents: Vec<(u32, u32)>,
}

/// Writes a version 1 iloc with 4 byte offsets and lengths and no base
/// offsets.
pub fn write_iloc(w: &mut BoxWriter, entries: &[IlocEntry]) {
    w.start_full_box("iloc", (1, 0));
    w.write_u8(0x44); // offset_size 4, length_size 4
    w.write_u8(0x00); // base_offset_size 0, index_size 0
    w.write_u16(entries.len() as u16);
    for entry in entries {
        w.write_u16(entry.item_id);
        w.write_u16(entry.construction_method);
        w.write_u16(0); // data_reference_index
        w.write_u16(entry.extents.len() as u16);
        for (offset, length) in &entry.extents {
            w.write_u32(*offset);
            w.write_u32(*length);
        }
    }
    w.finish_box();
}

pub fn write_idat(w: &mut BoxWriter, data: &[u8]) {
    w.start_box("idat");
    w.write_slice(data);
    w.finish_box();
}

pub fn write_ispe(w: &mut BoxWriter, width: u32, height: u32) {
    w.start_full_box("ispe", (0, 0));
    w.write_u32(width);
    w.write_u32(height);
    w.finish_box();
}

pub fn write_irot(w: &mut BoxWriter, angle: u8) {
    w.start_box("irot");
    w.write_u8(angle & 3);
    w.finish_box();
}

pub fn write_imir(w: &mut BoxWriter, axis: u8) {
    w.start_box("imir");
    w.write_u8(axis & 1);
    w.finish_box();
}

pub fn write_hvcc(w: &mut BoxWriter) {
    w.start_box("hvcC");
    w.write_slice(&sample_hvcc_body());
    w.finish_box();
}

pub fn write_av1c(w: &mut BoxWriter) {
    w.start_box("av1C");
    // marker 1, version 1, profile 0, level 8, 8 bit 4:2:0.
    w.write_slice(&[0x81, 0x08, 0x0C, 0x00]);
    w.finish_box();
}

/// A minimal hvcC body carrying one VPS and one SPS unit.
pub fn sample_hvcc_body() -> Vec<u8> {
    let mut body = vec![
        1,    // configurationVersion
        0x01, // profile space 0, tier 0, profile idc 1
        0x60, 0x00, 0x00, 0x00, // profile compatibility
        0x90, 0x00, 0x00, 0x00, 0x00, 0x00, // constraint indicator
        93,   // level idc
        0xF0, 0x00, // min spatial segmentation
        0xFC, // parallelism type
        0xFD, // chroma format 4:2:0
        0xF8, // bit depth luma minus 8
        0xF8, // bit depth chroma minus 8
        0x00, 0x00, // avg frame rate
        0x0F, // constant frame rate 0, one temporal layer, nested
        2,    // two arrays
    ];
    body.extend_from_slice(&[0xA0]); // VPS array
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&2u16.to_be_bytes());
    body.extend_from_slice(&[0x40, 0x01]);
    body.extend_from_slice(&[0xA1]); // SPS array
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&3u16.to_be_bytes());
    body.extend_from_slice(&[0x42, 0x01, 0x02]);
    body
}

/// The header bytes `sample_hvcc_body` should synthesize.
pub fn sample_hvcc_header() -> Vec<u8> {
    vec![
        0, 0, 0, 2, 0x40, 0x01, // VPS
        0, 0, 0, 3, 0x42, 0x01, 0x02, // SPS
    ]
}

/// Writes an iprp with the given property writer and (item id, [(property
/// index, essential)]) associations.
pub fn write_iprp(
    w: &mut BoxWriter,
    write_properties: impl FnOnce(&mut BoxWriter),
    associations: &[(u16, &[(u8, bool)])],
) {
    w.start_box("iprp");
    w.start_box("ipco");
    write_properties(w);
    w.finish_box();
    w.start_full_box("ipma", (0, 0));
    w.write_u32(associations.len() as u32);
    for (item_id, entries) in associations {
        w.write_u16(*item_id);
        w.write_u8(entries.len() as u8);
        for (index, essential) in *entries {
            w.write_u8(((*essential as u8) << 7) | index);
        }
    }
    w.finish_box();
    w.finish_box();
}

/// An 8 byte grid descriptor with 16 bit output dimensions.
pub fn grid_descriptor(rows: u8, columns: u8, width: u16, height: u16) -> Vec<u8> {
    let mut record = vec![0, 0, rows - 1, columns - 1];
    record.extend_from_slice(&width.to_be_bytes());
    record.extend_from_slice(&height.to_be_bytes());
    record
}

/// Builds ftyp + meta with the standard hdlr and the given children.
pub fn build_meta_file(children: impl FnOnce(&mut BoxWriter)) -> Vec<u8> {
    let mut w = BoxWriter::default();
    write_ftyp(&mut w);
    w.start_full_box("meta", (0, 0));
    write_hdlr(&mut w);
    children(&mut w);
    w.finish_box();
    w.data
}
