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
use crate::*;

use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;

/// Random access byte source. `read` may return fewer bytes than requested
/// at the end of the source; `read_exact` never does.
pub trait GenericIO {
    fn read(&mut self, offset: u64, size: usize) -> HeifResult<&[u8]>;

    fn read_exact(&mut self, offset: u64, size: usize) -> HeifResult<&[u8]> {
        let data = self.read(offset, size)?;
        if data.len() != size {
            return Err(HeifError::TruncatedData);
        }
        Ok(data)
    }

    fn size_hint(&self) -> u64;
}

pub type GenericIOBox = Box<dyn GenericIO>;

#[derive(Debug, Default)]
pub struct FileIO {
    file: Option<File>,
    buffer: Vec<u8>,
}

impl FileIO {
    pub fn create(filename: impl AsRef<std::path::Path>) -> HeifResult<FileIO> {
        let file = File::open(filename).or(Err(HeifError::IoError))?;
        Ok(FileIO {
            file: Some(file),
            buffer: Vec::new(),
        })
    }
}

impl GenericIO for FileIO {
    fn read(&mut self, offset: u64, size: usize) -> HeifResult<&[u8]> {
        let file_size = self.size_hint();
        if offset > file_size {
            return Err(HeifError::IoError);
        }
        let available_size = usize_from_u64(file_size - offset)?;
        let size_to_read = std::cmp::min(size, available_size);
        self.buffer.resize(size_to_read, 0);
        if size_to_read > 0 {
            let file = self.file.as_mut().ok_or(HeifError::IoError)?;
            file.seek(SeekFrom::Start(offset)).or(Err(HeifError::IoError))?;
            file.read_exact(self.buffer.as_mut_slice())
                .or(Err(HeifError::IoError))?;
        }
        Ok(self.buffer.as_slice())
    }

    fn size_hint(&self) -> u64 {
        match self.file.as_ref().map(|x| x.metadata()) {
            Some(Ok(metadata)) => metadata.len(),
            _ => 0,
        }
    }
}

/// In-memory source. Sequential readers are accepted by slurping them into
/// one of these first.
#[derive(Debug, Default)]
pub struct MemoryIO {
    data: Vec<u8>,
}

impl MemoryIO {
    pub fn create(data: impl Into<Vec<u8>>) -> MemoryIO {
        MemoryIO { data: data.into() }
    }

    pub fn create_from_reader(reader: &mut impl Read) -> HeifResult<MemoryIO> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).or(Err(HeifError::IoError))?;
        Ok(MemoryIO { data })
    }
}

impl GenericIO for MemoryIO {
    fn read(&mut self, offset: u64, size: usize) -> HeifResult<&[u8]> {
        let offset = usize_from_u64(offset)?;
        if offset > self.data.len() {
            return Err(HeifError::IoError);
        }
        let end = std::cmp::min(offset.saturating_add(size), self.data.len());
        Ok(&self.data[offset..end])
    }

    fn size_hint(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_io_reads_are_clamped() {
        let mut io = MemoryIO::create(vec![1, 2, 3, 4]);
        assert_eq!(io.read(0, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(io.read(2, 10).unwrap(), &[3, 4]);
        assert_eq!(io.read_exact(1, 2).unwrap(), &[2, 3]);
        assert_eq!(io.read_exact(2, 10), Err(HeifError::TruncatedData));
        assert!(io.read(5, 1).is_err());
    }

    #[test]
    fn file_io_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[10, 20, 30, 40, 50]).unwrap();
        let mut io = FileIO::create(file.path()).unwrap();
        assert_eq!(io.size_hint(), 5);
        assert_eq!(io.read_exact(1, 3).unwrap(), &[20, 30, 40]);
        assert_eq!(io.read(3, 10).unwrap(), &[40, 50]);
    }
}
