//! Sequential typed encode/decode over a byte buffer.
//!
//! Three serializers share one operation set, [`SerializerOps`], so that a
//! single codec function describes a structure for measuring, writing and
//! reading alike. `encode(x); decode() == x` then holds by construction: the
//! two directions cannot drift apart because they are the same code.
//!
//! - [`MeasureSerializer`] counts bytes without writing, so callers can lay
//!   out tables of offsets before committing anything.
//! - [`WriteSerializer`] appends to a `Vec<u8>`.
//! - [`ReadSerializer`] walks a borrowed byte slice. Every read validates
//!   `cursor + n <= end` and fails with
//!   [`DecodeUnderflow`](crate::ArchiveError::DecodeUnderflow) otherwise.
//!
//! Decoded strings and byte ranges alias the read buffer; the caller must
//! copy them (typically into a [`DecodeArena`](crate::arena::DecodeArena))
//! if the buffer is freed before the decoded value.

use bytemuck::Pod;

use crate::error::{ArchiveError, Result};

#[inline]
fn underflow(what: &str) -> ArchiveError {
    ArchiveError::DecodeUnderflow(format!("unexpected end of data while reading {what}"))
}

/// The shared operation set.
///
/// The lifetime `'a` is the lifetime of the buffer a [`ReadSerializer`]
/// decodes from; borrowed results (`cstr`, `bytes`, `tail`) alias it. The
/// write-side serializers implement the trait for any `'a`.
pub trait SerializerOps<'a> {
    /// True when this serializer fills values instead of consuming them.
    /// Codec functions use this to size containers before decoding elements.
    fn is_reading(&self) -> bool;

    /// A single byte.
    fn u8(&mut self, v: &mut u8) -> Result<()>;
    /// Little-endian `u16`.
    fn u16(&mut self, v: &mut u16) -> Result<()>;
    /// Little-endian `u32`.
    fn u32(&mut self, v: &mut u32) -> Result<()>;
    /// Little-endian `u64`.
    fn u64(&mut self, v: &mut u64) -> Result<()>;
    /// Little-endian IEEE-754 `f32`.
    fn f32(&mut self, v: &mut f32) -> Result<()>;
    /// One byte; any non-zero value decodes as `true`.
    fn bool(&mut self, v: &mut bool) -> Result<()>;

    /// Typed view of a fixed-layout structure. Advances by
    /// `size_of::<T>()`; unaligned sources are handled by copying out.
    fn pod<T: Pod>(&mut self, v: &mut T) -> Result<()>;

    /// NUL-terminated string. The decoded `&str` aliases the buffer.
    fn cstr(&mut self, v: &mut &'a str) -> Result<()>;

    /// `u32`-length-prefixed byte range. The decoded slice aliases the
    /// buffer.
    fn bytes(&mut self, v: &mut &'a [u8]) -> Result<()>;

    /// Everything up to the end of the buffer, with no length prefix.
    /// Must be the last field of an entry.
    fn tail(&mut self, v: &mut &'a [u8]) -> Result<()>;
}

macro_rules! le_int_write {
    ($($name:ident: $ty:ty),*) => {
        $(fn $name(&mut self, v: &mut $ty) -> Result<()> {
            self.buf.extend_from_slice(&v.to_le_bytes());
            Ok(())
        })*
    };
}

macro_rules! le_int_measure {
    ($($name:ident: $ty:ty),*) => {
        $(fn $name(&mut self, _v: &mut $ty) -> Result<()> {
            self.size += std::mem::size_of::<$ty>();
            Ok(())
        })*
    };
}

macro_rules! le_int_read {
    ($($name:ident: $ty:ty),*) => {
        $(fn $name(&mut self, v: &mut $ty) -> Result<()> {
            const N: usize = std::mem::size_of::<$ty>();
            let raw = self.take(N, stringify!($ty))?;
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(raw);
            *v = <$ty>::from_le_bytes(bytes);
            Ok(())
        })*
    };
}

/// Counts the bytes a codec function would produce.
#[derive(Debug, Default)]
pub struct MeasureSerializer {
    size: usize,
}

impl MeasureSerializer {
    /// Creates a measurer with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes measured so far.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<'a> SerializerOps<'a> for MeasureSerializer {
    fn is_reading(&self) -> bool {
        false
    }

    le_int_measure!(u16: u16, u32: u32, u64: u64);

    fn u8(&mut self, _v: &mut u8) -> Result<()> {
        self.size += 1;
        Ok(())
    }

    fn f32(&mut self, _v: &mut f32) -> Result<()> {
        self.size += 4;
        Ok(())
    }

    fn bool(&mut self, _v: &mut bool) -> Result<()> {
        self.size += 1;
        Ok(())
    }

    fn pod<T: Pod>(&mut self, _v: &mut T) -> Result<()> {
        self.size += std::mem::size_of::<T>();
        Ok(())
    }

    fn cstr(&mut self, v: &mut &'a str) -> Result<()> {
        self.size += v.len() + 1;
        Ok(())
    }

    fn bytes(&mut self, v: &mut &'a [u8]) -> Result<()> {
        self.size += 4 + v.len();
        Ok(())
    }

    fn tail(&mut self, v: &mut &'a [u8]) -> Result<()> {
        self.size += v.len();
        Ok(())
    }
}

/// Appends encoded bytes to a `Vec<u8>`.
#[derive(Debug, Default)]
pub struct WriteSerializer {
    buf: Vec<u8>,
}

impl WriteSerializer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer that will hold at least `capacity` bytes without
    /// reallocating, typically a [`MeasureSerializer::size`] result.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, returning the encoded bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl<'a> SerializerOps<'a> for WriteSerializer {
    fn is_reading(&self) -> bool {
        false
    }

    le_int_write!(u16: u16, u32: u32, u64: u64);

    fn u8(&mut self, v: &mut u8) -> Result<()> {
        self.buf.push(*v);
        Ok(())
    }

    fn f32(&mut self, v: &mut f32) -> Result<()> {
        self.buf.extend_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn bool(&mut self, v: &mut bool) -> Result<()> {
        self.buf.push(u8::from(*v));
        Ok(())
    }

    fn pod<T: Pod>(&mut self, v: &mut T) -> Result<()> {
        self.buf.extend_from_slice(bytemuck::bytes_of(v));
        Ok(())
    }

    fn cstr(&mut self, v: &mut &'a str) -> Result<()> {
        self.buf.extend_from_slice(v.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    fn bytes(&mut self, v: &mut &'a [u8]) -> Result<()> {
        let len = u32::try_from(v.len()).map_err(|_| {
            ArchiveError::DecodeUnderflow("byte range exceeds u32 length".into())
        })?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(v);
        Ok(())
    }

    fn tail(&mut self, v: &mut &'a [u8]) -> Result<()> {
        self.buf.extend_from_slice(v);
        Ok(())
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Debug)]
pub struct ReadSerializer<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadSerializer<'a> {
    /// Creates a reader over `buf` with the cursor at 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// True when the cursor has consumed the whole buffer.
    pub fn is_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| underflow(what))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

impl<'a> SerializerOps<'a> for ReadSerializer<'a> {
    fn is_reading(&self) -> bool {
        true
    }

    le_int_read!(u16: u16, u32: u32, u64: u64);

    fn u8(&mut self, v: &mut u8) -> Result<()> {
        *v = self.take(1, "u8")?[0];
        Ok(())
    }

    fn f32(&mut self, v: &mut f32) -> Result<()> {
        let raw = self.take(4, "f32")?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(raw);
        *v = f32::from_le_bytes(bytes);
        Ok(())
    }

    fn bool(&mut self, v: &mut bool) -> Result<()> {
        *v = self.take(1, "bool")?[0] != 0;
        Ok(())
    }

    fn pod<T: Pod>(&mut self, v: &mut T) -> Result<()> {
        let raw = self.take(std::mem::size_of::<T>(), std::any::type_name::<T>())?;
        *v = bytemuck::pod_read_unaligned(raw);
        Ok(())
    }

    fn cstr(&mut self, v: &mut &'a str) -> Result<()> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| underflow("string terminator"))?;
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| {
            ArchiveError::DecodeUnderflow("string is not valid UTF-8".into())
        })?;
        self.pos += nul + 1;
        *v = s;
        Ok(())
    }

    fn bytes(&mut self, v: &mut &'a [u8]) -> Result<()> {
        let mut len = 0u32;
        self.u32(&mut len)?;
        *v = self.take(len as usize, "byte range")?;
        Ok(())
    }

    fn tail(&mut self, v: &mut &'a [u8]) -> Result<()> {
        *v = &self.buf[self.pos..];
        self.pos = self.buf.len();
        Ok(())
    }
}
