//! Extension bodies carried without interpretation

use bytes::{Buf, BufMut, Bytes};

/// Transport parameters kept as the raw extension body
///
/// Used when parameter semantics are handled entirely outside the TLS layer.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OpaqueTransportParameters {
    body: Bytes,
}

impl OpaqueTransportParameters {
    /// Wrap an existing body
    pub fn from_bytes(body: Bytes) -> Self {
        Self { body }
    }

    /// Take everything left in `r` as the body, replacing any previous content
    pub fn read<R: Buf>(&mut self, r: &mut R) {
        self.body = r.copy_to_bytes(r.remaining());
    }

    /// Append the body to `w`
    pub fn write<W: BufMut>(&self, w: &mut W) {
        w.put_slice(&self.body);
    }

    /// A copy of the body
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&self.body)
    }

    /// The stored body
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }
}
