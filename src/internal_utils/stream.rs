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

use crate::internal_utils::*;
use crate::parser::mp4box::BoxSize;
use crate::*;

/// Big-endian bit cursor over a byte window. Used for the handful of boxes
/// whose fields are not byte aligned (iloc size nibbles, av1C bit fields).
#[derive(Debug)]
pub struct IBitStream<'a> {
    pub data: &'a [u8],
    pub bit_offset: usize,
}

impl IBitStream<'_> {
    fn read_bit(&mut self) -> HeifResult<u8> {
        let byte_offset = self.bit_offset / 8;
        if byte_offset >= self.data.len() {
            return Err(HeifError::BmffParseFailed("not enough bits".into()));
        }
        let byte = self.data[byte_offset];
        let shift = 7 - (self.bit_offset % 8);
        self.bit_offset += 1;
        Ok((byte >> shift) & 0x01)
    }

    pub(crate) fn read(&mut self, n: usize) -> HeifResult<u32> {
        assert!(n <= 32);
        let mut value: u32 = 0;
        for _i in 0..n {
            value <<= 1;
            value |= self.read_bit()? as u32;
        }
        Ok(value)
    }

    pub(crate) fn read_bool(&mut self) -> HeifResult<bool> {
        let bit = self.read_bit()?;
        Ok(bit == 1)
    }
}

/// Byte cursor over a bounded window of the input. Sub-streams share the
/// parent's backing slice, so a child can never read past the byte range its
/// enclosing box declared.
#[derive(Debug)]
pub struct IStream<'a> {
    // The bytes to parse.
    pub data: &'a [u8],
    // The number of bytes read so far within self.data.
    pub offset: usize,
}

impl IStream<'_> {
    pub(crate) fn create(data: &[u8]) -> IStream<'_> {
        IStream { data, offset: 0 }
    }

    fn check(&self, size: usize) -> HeifResult<()> {
        if self.bytes_left() < size {
            return Err(HeifError::TruncatedData);
        }
        Ok(())
    }

    pub(crate) fn sub_stream<'a>(&'a mut self, size: &BoxSize) -> HeifResult<IStream<'a>> {
        let offset = self.offset;
        checked_incr!(
            self.offset,
            match size {
                BoxSize::FixedSize(size) => {
                    self.check(*size)?;
                    *size
                }
                BoxSize::UntilEndOfStream => self.bytes_left(),
            }
        );
        Ok(IStream {
            data: &self.data[offset..self.offset],
            offset: 0,
        })
    }

    pub(crate) fn sub_bit_stream(&mut self, num_bytes: usize) -> HeifResult<IBitStream<'_>> {
        self.check(num_bytes)?;
        let offset = self.offset;
        checked_incr!(self.offset, num_bytes);
        Ok(IBitStream {
            data: &self.data[offset..self.offset],
            bit_offset: 0,
        })
    }

    pub(crate) fn bytes_left(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub(crate) fn has_bytes_left(&self) -> bool {
        self.bytes_left() > 0
    }

    pub(crate) fn get_slice(&mut self, size: usize) -> HeifResult<&[u8]> {
        self.check(size)?;
        let offset_start = self.offset;
        checked_incr!(self.offset, size);
        Ok(&self.data[offset_start..offset_start + size])
    }

    fn get_vec(&mut self, size: usize) -> HeifResult<Vec<u8>> {
        Ok(self.get_slice(size)?.to_vec())
    }

    pub(crate) fn read_u8(&mut self) -> HeifResult<u8> {
        self.check(1)?;
        let value = self.data[self.offset];
        checked_incr!(self.offset, 1);
        Ok(value)
    }

    pub(crate) fn read_u16(&mut self) -> HeifResult<u16> {
        Ok(u16::from_be_bytes(self.get_slice(2)?.try_into().unwrap()))
    }

    pub(crate) fn read_u24(&mut self) -> HeifResult<u32> {
        Ok(self.read_uxx(3)? as u32)
    }

    pub(crate) fn read_u32(&mut self) -> HeifResult<u32> {
        Ok(u32::from_be_bytes(self.get_slice(4)?.try_into().unwrap()))
    }

    pub(crate) fn read_u64(&mut self) -> HeifResult<u64> {
        Ok(u64::from_be_bytes(self.get_slice(8)?.try_into().unwrap()))
    }

    // Reads size characters of a non-null-terminated string.
    pub(crate) fn read_string(&mut self, size: usize) -> HeifResult<String> {
        Ok(String::from_utf8(self.get_vec(size)?).unwrap_or("".into()))
    }

    // Reads an xx-byte unsigned integer. A width of 0 produces 0 without
    // consuming anything.
    pub(crate) fn read_uxx(&mut self, xx: u8) -> HeifResult<u64> {
        let n: usize = xx.into();
        if n == 0 {
            return Ok(0);
        }
        if n > 8 {
            return Err(HeifError::BmffParseFailed("invalid integer width".into()));
        }
        let mut out = [0; 8];
        let start = out.len() - n;
        out[start..].copy_from_slice(self.get_slice(n)?);
        Ok(u64::from_be_bytes(out))
    }

    // Reads a null-terminated string. The terminator must appear before the
    // end of the window; a missing one would otherwise mask truncation.
    pub(crate) fn read_c_string(&mut self) -> HeifResult<String> {
        self.check(1)?;
        let null_position = self.data[self.offset..]
            .iter()
            .position(|&x| x == b'\0')
            .ok_or(HeifError::BmffParseFailed(
                "unterminated string in box".into(),
            ))?;
        let range = self.offset..self.offset + null_position;
        self.offset += null_position + 1;
        Ok(String::from_utf8(self.data[range].to_vec()).unwrap_or("".into()))
    }

    pub(crate) fn read_version_and_flags(&mut self) -> HeifResult<(u8, u32)> {
        let version = self.read_u8()?;
        let flags = self.read_u24()?;
        Ok((version, flags))
    }

    pub(crate) fn read_and_enforce_version_and_flags(
        &mut self,
        enforced_version: u8,
    ) -> HeifResult<(u8, u32)> {
        let (version, flags) = self.read_version_and_flags()?;
        if version != enforced_version {
            return Err(HeifError::BmffParseFailed("unexpected box version".into()));
        }
        Ok((version, flags))
    }

    pub(crate) fn skip(&mut self, size: usize) -> HeifResult<()> {
        self.check(size)?;
        checked_incr!(self.offset, size);
        Ok(())
    }
}
