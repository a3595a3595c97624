//! Cursor over a byte slice with the scalar reads the image and value
//! formats need. Multi-byte integers in those formats are big-endian;
//! code words are little-endian.

use crate::{VmError, VmResult};

#[derive(Debug)]
pub struct StreamReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn take(&mut self, n: usize) -> VmResult<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(VmError::decode("end of stream reached"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> VmResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i8(&mut self) -> VmResult<i8> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_u16be(&mut self) -> VmResult<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_i16be(&mut self) -> VmResult<i16> {
        Ok(self.get_u16be()? as i16)
    }

    pub fn get_u32be(&mut self) -> VmResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_i32be(&mut self) -> VmResult<i32> {
        Ok(self.get_u32be()? as i32)
    }

    pub fn get_u64be(&mut self) -> VmResult<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_i64be(&mut self) -> VmResult<i64> {
        Ok(self.get_u64be()? as i64)
    }

    pub fn get_f64(&mut self, big_endian: bool) -> VmResult<f64> {
        let raw = self.take(8)?.try_into().unwrap();
        Ok(f64::from_bits(if big_endian {
            u64::from_be_bytes(raw)
        } else {
            u64::from_le_bytes(raw)
        }))
    }

    /// Read a NUL-terminated string.
    pub fn get_cstring(&mut self) -> VmResult<String> {
        let mut buffer = Vec::new();
        loop {
            match self.get_u8()? {
                0 => break,
                byte => buffer.push(byte),
            }
        }
        String::from_utf8(buffer)
            .map_err(|_| VmError::decode("string is not valid utf-8"))
    }
}
