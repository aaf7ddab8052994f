//! Byte-level (de)serialization helpers shared by every on-disk page
//! format. Integer fields are big-endian two's-complement; strings are a
//! 4-byte big-endian length prefix followed by padded UTF-8 bytes — see
//! spec §6.

use std::io::{self, Read, Write};

use crate::error::SmallError;

/// Accumulates bytes for a single page (or sub-structure of one) in
/// encoding order.
#[derive(Default)]
pub struct SmallWriter {
    buf: Vec<u8>,
}

impl SmallWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, v: &T) {
        v.encode(self);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn to_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Pads (with zero bytes) or truncates the accumulated content to
    /// exactly `size` bytes. Panics if asked to truncate non-zero content,
    /// since that would silently corrupt a page.
    pub fn to_padded_bytes(self, size: usize) -> Vec<u8> {
        let mut bytes = self.buf;
        if bytes.len() > size {
            panic!(
                "content ({} bytes) does not fit in {} bytes",
                bytes.len(),
                size
            );
        }
        bytes.resize(size, 0);
        bytes
    }
}

pub trait Encodeable {
    fn encode(&self, writer: &mut SmallWriter);
}

pub trait Decodeable: Sized {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SmallError>;
}

macro_rules! impl_be_serialization {
    ($t:ty) => {
        impl Encodeable for $t {
            fn encode(&self, writer: &mut SmallWriter) {
                writer.write_bytes(&self.to_be_bytes());
            }
        }

        impl Decodeable for $t {
            fn decode<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                reader.read_exact(&mut buf)?;
                Ok(<$t>::from_be_bytes(buf))
            }
        }
    };
}

impl_be_serialization!(i32);
impl_be_serialization!(u32);
impl_be_serialization!(u64);
impl_be_serialization!(u8);
impl_be_serialization!(u16);

impl Encodeable for bool {
    fn encode(&self, writer: &mut SmallWriter) {
        writer.write_bytes(&[*self as u8]);
    }
}

impl Decodeable for bool {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SmallError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

pub fn read_exact_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, SmallError> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_at(file: &mut std::fs::File, offset: u64, bytes: &[u8]) -> Result<(), SmallError> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(())
}

pub fn read_at(
    file: &mut std::fs::File,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>, SmallError> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).map_err(|e| -> SmallError {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SmallError::illegal_page("read past end of file")
        } else {
            e.into()
        }
    })?;
    Ok(buf)
}
