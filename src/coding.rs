//! Coding related traits.

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

use crate::VarInt;

/// Error indicating that the provided buffer was too small
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("unexpected end of buffer")]
pub struct UnexpectedEnd;

/// Coding result type
pub type Result<T> = ::std::result::Result<T, UnexpectedEnd>;

/// Infallible encoding and decoding of wire primitives
pub trait Codec: Sized {
    /// Decode a `Self` from the provided buffer, if the buffer is large enough
    fn decode<B: Buf>(buf: &mut B) -> Result<Self>;
    /// Append the encoding of `self` to the provided buffer
    fn encode<B: BufMut>(&self, buf: &mut B);
}

impl Codec for u8 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(UnexpectedEnd);
        }
        Ok(buf.get_u8())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(*self);
    }
}

impl Codec for u16 {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(UnexpectedEnd);
        }
        Ok(buf.get_u16())
    }
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(*self);
    }
}

/// Extension trait for reading from buffers
pub trait BufExt {
    /// Read and decode a value from the buffer
    fn get<T: Codec>(&mut self) -> Result<T>;
    /// Read a variable-length integer from the buffer
    fn get_var(&mut self) -> Result<u64>;
    /// Copy exactly `len` bytes out of the buffer
    fn get_exact(&mut self, len: usize) -> Result<Bytes>;
}

impl<T: Buf> BufExt for T {
    fn get<U: Codec>(&mut self) -> Result<U> {
        U::decode(self)
    }

    fn get_var(&mut self) -> Result<u64> {
        Ok(VarInt::decode(self)?.into_inner())
    }

    fn get_exact(&mut self, len: usize) -> Result<Bytes> {
        if self.remaining() < len {
            return Err(UnexpectedEnd);
        }
        Ok(self.copy_to_bytes(len))
    }
}

/// Extension trait for writing to buffers
pub trait BufMutExt {
    /// Write and encode a value to the buffer
    fn write<T: Codec>(&mut self, x: T);
    /// Write a variable-length integer to the buffer
    fn write_var(&mut self, x: VarInt);
}

impl<T: BufMut> BufMutExt for T {
    fn write<U: Codec>(&mut self, x: U) {
        x.encode(self);
    }

    fn write_var(&mut self, x: VarInt) {
        x.encode(self);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_reads() {
        // `<[u8]>::get` shadows the extension method on plain slices
        let mut buf: &[u8] = &[0x01];
        assert_eq!(BufExt::get::<u16>(&mut buf), Err(UnexpectedEnd));
        assert_eq!(BufExt::get::<u8>(&mut buf), Ok(1));
        assert_eq!(BufExt::get::<u8>(&mut buf), Err(UnexpectedEnd));
    }

    #[test]
    fn exact_bytes() {
        let mut buf: &[u8] = &[1, 2, 3, 4];
        assert_eq!(buf.get_exact(5), Err(UnexpectedEnd));
        assert_eq!(&buf.get_exact(3).unwrap()[..], &[1, 2, 3]);
        assert_eq!(buf.remaining(), 1);
    }
}
