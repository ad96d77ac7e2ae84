//! Variable-length integers as used inside the transport parameters extension
//!
//! Every integer-valued parameter is carried as a QUIC varint: the two high bits of the first
//! byte give the encoded length (1, 2, 4 or 8 bytes) and the remaining bits hold the value in
//! network byte order.

use std::fmt;

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::coding::{self, Codec, UnexpectedEnd};

#[cfg(feature = "arbitrary")]
use arbitrary::Arbitrary;

/// An integer parameter value, always below 2^62
#[derive(Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VarInt(pub(crate) u64);

impl VarInt {
    /// The largest representable value
    pub const MAX: Self = Self((1 << 62) - 1);
    /// Length of the longest encoding
    pub const MAX_SIZE: usize = 8;

    /// Every `u32` fits in four encoded bytes
    pub const fn from_u32(x: u32) -> Self {
        Self(x as u64)
    }

    /// Succeeds iff `x` < 2^62
    pub fn from_u64(x: u64) -> Result<Self, VarIntBoundsExceeded> {
        if x < 2u64.pow(62) {
            Ok(Self(x))
        } else {
            Err(VarIntBoundsExceeded)
        }
    }

    /// Extract the integer value
    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// Encoded length in bytes, always the shortest form
    pub const fn size(self) -> usize {
        let x = self.0;
        if x < 2u64.pow(6) {
            1
        } else if x < 2u64.pow(14) {
            2
        } else if x < 2u64.pow(30) {
            4
        } else {
            8
        }
    }
}

impl From<VarInt> for u64 {
    fn from(x: VarInt) -> Self {
        x.0
    }
}

impl From<u8> for VarInt {
    fn from(x: u8) -> Self {
        Self(x.into())
    }
}

impl From<u16> for VarInt {
    fn from(x: u16) -> Self {
        Self(x.into())
    }
}

impl From<u32> for VarInt {
    fn from(x: u32) -> Self {
        Self(x.into())
    }
}

impl std::convert::TryFrom<u64> for VarInt {
    type Error = VarIntBoundsExceeded;
    /// Succeeds iff `x` < 2^62
    fn try_from(x: u64) -> Result<Self, VarIntBoundsExceeded> {
        Self::from_u64(x)
    }
}

impl std::convert::TryFrom<usize> for VarInt {
    type Error = VarIntBoundsExceeded;
    /// Succeeds iff `x` < 2^62
    fn try_from(x: usize) -> Result<Self, VarIntBoundsExceeded> {
        Self::try_from(x as u64)
    }
}

impl fmt::Debug for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(feature = "arbitrary")]
impl<'arbitrary> Arbitrary<'arbitrary> for VarInt {
    fn arbitrary(u: &mut arbitrary::Unstructured<'arbitrary>) -> arbitrary::Result<Self> {
        Ok(Self(u.int_in_range(0..=Self::MAX.0)?))
    }
}

/// Error returned when constructing a `VarInt` from a value >= 2^62
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("value too large for varint encoding")]
pub struct VarIntBoundsExceeded;

impl Codec for VarInt {
    fn decode<B: Buf>(r: &mut B) -> coding::Result<Self> {
        if !r.has_remaining() {
            return Err(UnexpectedEnd);
        }
        let mut buf = [0; 8];
        buf[0] = r.get_u8();
        let tag = buf[0] >> 6;
        buf[0] &= 0b0011_1111;
        let len = 1usize << tag;
        if r.remaining() < len - 1 {
            return Err(UnexpectedEnd);
        }
        r.copy_to_slice(&mut buf[1..len]);
        let x = match len {
            1 => u64::from(buf[0]),
            2 => u64::from(u16::from_be_bytes([buf[0], buf[1]])),
            4 => u64::from(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
            _ => u64::from_be_bytes(buf),
        };
        Ok(Self(x))
    }

    fn encode<B: BufMut>(&self, w: &mut B) {
        let x = self.0;
        match self.size() {
            1 => w.put_u8(x as u8),
            2 => w.put_u16((0b01 << 14) | x as u16),
            4 => w.put_u32((0b10 << 30) | x as u32),
            _ => w.put_u64((0b11 << 62) | x),
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use test_strategy::proptest;

    use super::*;

    fn encoded(x: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        VarInt::from_u64(x).unwrap().encode(&mut buf);
        buf
    }

    #[test]
    fn boundaries() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(63), [0x3f]);
        assert_eq!(encoded(64), [0x40, 0x40]);
        assert_eq!(encoded((1 << 14) - 1), [0x7f, 0xff]);
        assert_eq!(encoded(1 << 14), [0x80, 0x00, 0x40, 0x00]);
        assert_eq!(encoded((1 << 30) - 1), [0xbf, 0xff, 0xff, 0xff]);
        assert_eq!(encoded(1 << 30), [0xc0, 0, 0, 0, 0x40, 0, 0, 0]);
        assert_eq!(encoded(VarInt::MAX.0), [0xff; 8]);
    }

    #[test]
    fn rfc_sample() {
        // RFC 9000 appendix A.1
        let mut buf: &[u8] = &[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c];
        assert_eq!(VarInt::decode(&mut buf).unwrap().0, 151_288_809_941_952_652);
        let mut buf: &[u8] = &[0x9d, 0x7f, 0x3e, 0x7d];
        assert_eq!(VarInt::decode(&mut buf).unwrap().0, 494_878_333);
        let mut buf: &[u8] = &[0x7b, 0xbd];
        assert_eq!(VarInt::decode(&mut buf).unwrap().0, 15_293);
        let mut buf: &[u8] = &[0x25];
        assert_eq!(VarInt::decode(&mut buf).unwrap().0, 37);
    }

    #[test]
    fn truncated() {
        let cases: [&[u8]; 4] = [&[], &[0x40], &[0x80, 0, 0], &[0xc0, 0, 0, 0, 0, 0, 0]];
        for bytes in cases {
            let mut buf = bytes;
            assert_eq!(VarInt::decode(&mut buf), Err(UnexpectedEnd));
        }
    }

    #[test]
    fn bounds() {
        assert_eq!(VarInt::from_u64(1 << 62), Err(VarIntBoundsExceeded));
        assert_eq!(VarInt::from_u64(u64::MAX), Err(VarIntBoundsExceeded));
        assert_eq!(VarInt::from_u64((1 << 62) - 1), Ok(VarInt::MAX));
    }

    #[proptest]
    fn round_trip(#[strategy(0..=VarInt::MAX.0)] x: u64) {
        let buf = encoded(x);
        let expected = match x {
            0..=0x3f => 1,
            0x40..=0x3fff => 2,
            0x4000..=0x3fff_ffff => 4,
            _ => 8,
        };
        prop_assert_eq!(buf.len(), expected);
        let mut slice = &buf[..];
        prop_assert_eq!(VarInt::decode(&mut slice).unwrap().into_inner(), x);
        prop_assert!(slice.is_empty());
    }
}
