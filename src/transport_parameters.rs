//! QUIC transport parameters as carried in the TLS extension
//!
//! The `TransportParameters` type is the typed view of the extension body: a set of
//! parameter identifiers mapped to values whose wire shape is fixed by the identifier. Each
//! record on the wire is a 16 bit identifier followed by a payload, repeated until the
//! extension body is exhausted. Nothing here interprets the values; they are only checked
//! against the shape their identifier declares.

use std::{
    collections::BTreeMap,
    fmt::{self, Write as _},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    RESET_TOKEN_SIZE, VarInt,
    coding::{BufExt, BufMutExt, UnexpectedEnd},
    config::ParameterConfig,
    extension::ExtensionSlot,
};

// Apply a given macro to the table of all known transport parameters, along with their wire
// identifiers and payload shapes. Decoding, encoding, name lookup and rendering are all derived
// from this single list.
macro_rules! apply_ids {
    ($macro:ident) => {
        $macro! {
            // #[doc] name (wire id) = Variant: Shape,
            /// Destination connection id of the client's first Initial packet
            original_connection_id(0x00) = OriginalConnectionId: VariableBytes,
            /// Milliseconds, disabled if zero
            idle_timeout(0x01) = IdleTimeout: VarInt,
            /// Token used by the client to verify a stateless reset from the server
            stateless_reset_token(0x02) = StatelessResetToken: FixedBytes16,
            /// Limits the size of packets that the endpoint is willing to receive
            max_packet_size(0x03) = MaxPacketSize: VarInt,
            /// Initial value for the maximum amount of data that can be sent on the connection
            initial_max_data(0x04) = InitialMaxData: VarInt,
            /// Initial flow control limit for locally-initiated bidirectional streams
            initial_max_stream_data_bidi_local(0x05) = InitialMaxStreamDataBidiLocal: VarInt,
            /// Initial flow control limit for peer-initiated bidirectional streams
            initial_max_stream_data_bidi_remote(0x06) = InitialMaxStreamDataBidiRemote: VarInt,
            /// Initial flow control limit for unidirectional streams
            initial_max_stream_data_uni(0x07) = InitialMaxStreamDataUni: VarInt,
            /// Initial maximum number of bidirectional streams the peer may initiate
            initial_max_streams_bidi(0x08) = InitialMaxStreamsBidi: VarInt,
            /// Initial maximum number of unidirectional streams the peer may initiate
            initial_max_streams_uni(0x09) = InitialMaxStreamsUni: VarInt,
            /// Exponent used to decode the ACK Delay field in the ACK frame
            ack_delay_exponent(0x0A) = AckDelayExponent: VarInt,
            /// Maximum amount of time in milliseconds by which the endpoint will delay sending
            /// acknowledgments
            max_ack_delay(0x0B) = MaxAckDelay: VarInt,
            /// The endpoint does not support active connection migration
            disable_migration(0x0C) = DisableMigration: Flag,
            /// The server's preferred address for communication after handshake completion
            preferred_address(0x0D) = PreferredAddress: Unsupported,
            /// Maximum number of connection IDs from the peer that an endpoint is willing to store
            active_connection_id_limit(0x0E) = ActiveConnectionIdLimit: VarInt,
        }
    };
}

macro_rules! make_ids {
    {$($(#[$doc:meta])* $name:ident ($wire:literal) = $id:ident: $shape:ident,)*} => {
        /// Identifier of a transport parameter
        #[repr(u16)]
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub enum TransportParameterId {
            $($(#[$doc])* $id = $wire,)*
        }

        impl TransportParameterId {
            /// Every known identifier, in wire order
            pub const ALL: &'static [Self] = &[$(Self::$id,)*];

            /// Name used for this parameter in configuration and diagnostics
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$id => stringify!($name),)*
                }
            }

            /// Wire shape of this parameter's payload
            pub fn shape(self) -> Shape {
                match self {
                    $(Self::$id => Shape::$shape,)*
                }
            }
        }

        impl TryFrom<u16> for TransportParameterId {
            type Error = Error;

            fn try_from(value: u16) -> Result<Self, Error> {
                match value {
                    $($wire => Ok(Self::$id),)*
                    _ => Err(Error::UnknownParameter(value)),
                }
            }
        }
    }
}

apply_ids!(make_ids);

impl TransportParameterId {
    /// Look up a parameter by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }
}

impl fmt::Display for TransportParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload layout of a transport parameter on the wire
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Shape {
    /// One length byte followed by that many bytes
    VariableBytes,
    /// Exactly 16 bytes
    FixedBytes16,
    /// Empty payload; presence means `true`
    Flag,
    /// A QUIC variable-length integer
    VarInt,
    /// No wire format is implemented
    Unsupported,
}

/// Value of a single transport parameter
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParameterValue {
    /// Opaque bytes, at most 255 of them
    VariableBytes(Bytes),
    /// Exactly [`RESET_TOKEN_SIZE`] bytes once encoded
    FixedBytes16(Bytes),
    /// Presence-only parameter
    Flag(bool),
    /// Integer parameter
    VarInt(VarInt),
}

impl ParameterValue {
    /// Wrap a stateless reset token
    pub fn reset_token(token: [u8; RESET_TOKEN_SIZE]) -> Self {
        Self::FixedBytes16(Bytes::copy_from_slice(&token))
    }

    /// Wrap a connection id
    pub fn connection_id(cid: &[u8]) -> Self {
        Self::VariableBytes(Bytes::copy_from_slice(cid))
    }

    /// The wire shape this value would be encoded with
    pub fn shape(&self) -> Shape {
        match self {
            Self::VariableBytes(_) => Shape::VariableBytes,
            Self::FixedBytes16(_) => Shape::FixedBytes16,
            Self::Flag(_) => Shape::Flag,
            Self::VarInt(_) => Shape::VarInt,
        }
    }

    /// The integer, if this is an integer parameter
    pub fn as_varint(&self) -> Option<VarInt> {
        match *self {
            Self::VarInt(x) => Some(x),
            _ => None,
        }
    }

    /// The raw bytes, if this is a byte string parameter
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::VariableBytes(b) | Self::FixedBytes16(b) => Some(b),
            _ => None,
        }
    }

    /// The flag, if this is a presence-only parameter
    pub fn as_flag(&self) -> Option<bool> {
        match *self {
            Self::Flag(x) => Some(x),
            _ => None,
        }
    }
}

impl From<VarInt> for ParameterValue {
    fn from(x: VarInt) -> Self {
        Self::VarInt(x)
    }
}

impl From<u32> for ParameterValue {
    fn from(x: u32) -> Self {
        Self::VarInt(x.into())
    }
}

impl From<bool> for ParameterValue {
    fn from(x: bool) -> Self {
        Self::Flag(x)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariableBytes(b) | Self::FixedBytes16(b) => {
                for byte in b.iter() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Flag(x) => x.fmt(f),
            Self::VarInt(x) => x.fmt(f),
        }
    }
}

/// Errors encountered while decoding, encoding or binding transport parameters
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum Error {
    /// The extension body was truncated or otherwise badly framed
    #[error("parameters were malformed")]
    Malformed,
    /// A parameter identifier outside the known table
    #[error("unknown transport parameter {0:#06x}")]
    UnknownParameter(u16),
    /// A parameter whose wire format is not implemented
    #[error("{0} is not supported")]
    Unsupported(TransportParameterId),
    /// A locally supplied value that does not fit its parameter's wire shape
    #[error("{0} had illegal value")]
    IllegalValue(TransportParameterId),
    /// Configuration of the wrong kind for the extension's mode
    #[error("configuration does not match the extension mode")]
    ModeMismatch,
    /// The extension was seen in a message that cannot carry it for this endpoint
    #[error("transport parameters not expected in {0}")]
    UnexpectedSlot(ExtensionSlot),
}

impl From<UnexpectedEnd> for Error {
    fn from(_: UnexpectedEnd) -> Self {
        Self::Malformed
    }
}

/// Transport parameters exchanged in the TLS handshake
///
/// Entries are kept sorted by identifier, which is also the order they are encoded in.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TransportParameters {
    params: BTreeMap<TransportParameterId, ParameterValue>,
}

impl Default for TransportParameters {
    /// A set holding only `disable_migration = false` and `active_connection_id_limit = 0`
    fn default() -> Self {
        let mut params = BTreeMap::new();
        params.insert(
            TransportParameterId::DisableMigration,
            ParameterValue::Flag(false),
        );
        params.insert(
            TransportParameterId::ActiveConnectionIdLimit,
            ParameterValue::VarInt(VarInt(0)),
        );
        Self { params }
    }
}

impl TransportParameters {
    /// Decode a fresh set from an extension body
    pub fn decode<R: Buf>(r: &mut R) -> Result<Self, Error> {
        let mut params = Self::default();
        params.read(r)?;
        Ok(params)
    }

    /// Value of `id`, if present
    pub fn get(&self, id: TransportParameterId) -> Option<&ParameterValue> {
        self.params.get(&id)
    }

    /// Integer value of `id`, if present and an integer
    pub fn varint(&self, id: TransportParameterId) -> Option<VarInt> {
        self.get(id).and_then(ParameterValue::as_varint)
    }

    /// Whether the endpoint asked to disable active migration
    pub fn disable_migration(&self) -> bool {
        self.get(TransportParameterId::DisableMigration)
            .and_then(ParameterValue::as_flag)
            .unwrap_or(false)
    }

    /// Set `id` to `value`, returning the previous value
    ///
    /// The value is not checked against the parameter's shape until the set is encoded.
    pub fn insert(
        &mut self,
        id: TransportParameterId,
        value: impl Into<ParameterValue>,
    ) -> Option<ParameterValue> {
        self.params.insert(id, value.into())
    }

    /// Remove `id`, returning its value
    ///
    /// Decoding always starts from the defaults, so a removed `active_connection_id_limit` comes
    /// back as 0 after a round trip, just as `disable_migration = false` is never written but is
    /// present again once decoded.
    pub fn remove(&mut self, id: TransportParameterId) -> Option<ParameterValue> {
        self.params.remove(&id)
    }

    /// Iterate over the entries in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (TransportParameterId, &ParameterValue)> + '_ {
        self.params.iter().map(|(id, value)| (*id, value))
    }

    /// Number of entries, including defaults
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the set has no entries at all
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Copy in every parameter named by `config`
    ///
    /// Names that do not belong to a known parameter are ignored.
    pub fn merge_from(&mut self, config: &ParameterConfig) {
        for (name, value) in config.iter() {
            match TransportParameterId::from_name(name) {
                Some(id) => {
                    self.params.insert(id, value.clone());
                }
                None => debug!(%name, "ignoring unknown transport parameter in configuration"),
            }
        }
    }

    /// Decode records from `r` into this set until the buffer is exhausted
    ///
    /// Later occurrences of an identifier replace earlier ones. On error the set is left
    /// untouched.
    pub fn read<R: Buf>(&mut self, r: &mut R) -> Result<(), Error> {
        let mut staged = self.params.clone();
        let mut seen = [false; TransportParameterId::ALL.len()];

        while r.has_remaining() {
            let id = TransportParameterId::try_from(r.get::<u16>()?)?;
            let value = match id.shape() {
                Shape::VariableBytes => {
                    let len = r.get::<u8>()?;
                    ParameterValue::VariableBytes(r.get_exact(len.into())?)
                }
                Shape::FixedBytes16 => ParameterValue::FixedBytes16(r.get_exact(RESET_TOKEN_SIZE)?),
                Shape::Flag => ParameterValue::Flag(true),
                Shape::VarInt => ParameterValue::VarInt(r.get()?),
                Shape::Unsupported => return Err(Error::Unsupported(id)),
            };
            if seen[id as usize] {
                trace!(%id, "duplicate transport parameter, keeping the last occurrence");
            }
            seen[id as usize] = true;
            staged.insert(id, value);
        }

        self.params = staged;
        Ok(())
    }

    /// Check that every entry can be encoded
    pub fn validate(&self) -> Result<(), Error> {
        for (&id, value) in &self.params {
            if id.shape() == Shape::Unsupported {
                return Err(Error::Unsupported(id));
            }
            if value.shape() != id.shape() {
                return Err(Error::IllegalValue(id));
            }
            let fits = match value {
                ParameterValue::FixedBytes16(b) => b.len() == RESET_TOKEN_SIZE,
                ParameterValue::VariableBytes(b) => b.len() <= usize::from(u8::MAX),
                _ => true,
            };
            if !fits {
                return Err(Error::IllegalValue(id));
            }
        }
        Ok(())
    }

    /// Encode the set into `w`
    ///
    /// Nothing is written unless every entry is encodable. A `disable_migration` flag that is
    /// `false` is omitted.
    pub fn write<W: BufMut>(&self, w: &mut W) -> Result<(), Error> {
        self.validate()?;
        for (&id, value) in &self.params {
            if let ParameterValue::Flag(false) = value {
                continue;
            }
            w.write::<u16>(id as u16);
            match value {
                ParameterValue::VariableBytes(b) => {
                    w.write::<u8>(b.len() as u8);
                    w.put_slice(b);
                }
                ParameterValue::FixedBytes16(b) => w.put_slice(b),
                ParameterValue::Flag(_) => {}
                ParameterValue::VarInt(x) => w.write_var(*x),
            }
        }
        Ok(())
    }

    /// Encode the set into a freshly allocated buffer
    pub fn encode(&self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.write(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Human-readable dump of the set, one indented `"name": value` line per entry
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(32 * self.params.len());
        for (id, value) in &self.params {
            if writeln!(out, "  \"{id}\": {value}").is_err() {
                return String::from("<unprintable transport parameters>");
            }
        }
        out
    }

    /// Render a raw extension body for diagnostics, or describe why it could not be decoded
    pub fn describe(mut body: &[u8]) -> String {
        match Self::decode(&mut body) {
            Ok(params) => params.render(),
            Err(e) => e.to_string(),
        }
    }
}

impl fmt::Display for TransportParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use proptest::{collection::vec, prelude::*};
    use test_strategy::proptest;

    use super::*;

    use TransportParameterId::*;

    #[test]
    fn table() {
        assert_eq!(TransportParameterId::ALL.len(), 15);
        for (wire, &id) in TransportParameterId::ALL.iter().enumerate() {
            assert_eq!(id as usize, wire);
            assert_eq!(TransportParameterId::try_from(wire as u16), Ok(id));
            assert_eq!(TransportParameterId::from_name(id.name()), Some(id));
        }
        assert_eq!(
            TransportParameterId::try_from(0x0f),
            Err(Error::UnknownParameter(0x0f))
        );
        assert_eq!(TransportParameterId::from_name("max_udp_payload_size"), None);
        assert_eq!(InitialMaxStreamDataBidiRemote.name(), "initial_max_stream_data_bidi_remote");
    }

    #[test]
    fn defaults() {
        let params = TransportParameters::default();
        assert_eq!(params.len(), 2);
        assert!(!params.disable_migration());
        assert_eq!(params.varint(ActiveConnectionIdLimit), Some(VarInt(0)));
        assert_eq!(&params.encode().unwrap()[..], &hex!("000e 00")[..]);
    }

    #[test]
    fn scenario() {
        let mut config = ParameterConfig::default();
        config
            .set("initial_max_data", 100u32)
            .set("disable_migration", true);
        let mut params = TransportParameters::default();
        params.remove(ActiveConnectionIdLimit);
        params.merge_from(&config);
        assert_eq!(&params.encode().unwrap()[..], &hex!("0004 4064 000c")[..]);

        let decoded = TransportParameters::decode(&mut &hex!("0004 4064 000c")[..]).unwrap();
        let mut expected = TransportParameters::default();
        expected.insert(InitialMaxData, 100u32);
        expected.insert(DisableMigration, true);
        assert_eq!(decoded, expected);
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn single_byte_varint() {
        let mut params = TransportParameters::default();
        params.remove(ActiveConnectionIdLimit);
        params.insert(InitialMaxData, 60u32);
        params.insert(DisableMigration, true);
        assert_eq!(&params.encode().unwrap()[..], &hex!("0004 3c 000c")[..]);
    }

    #[test]
    fn unknown_id() {
        let mut params = TransportParameters::default();
        let before = params.clone();
        let mut buf = &hex!("0004 3c 000f 01")[..];
        assert_eq!(params.read(&mut buf), Err(Error::UnknownParameter(0x0f)));
        assert_eq!(params, before);
    }

    #[test]
    fn preferred_address() {
        let mut buf = &hex!("000d 00")[..];
        assert_eq!(
            TransportParameters::decode(&mut buf),
            Err(Error::Unsupported(PreferredAddress))
        );

        let mut params = TransportParameters::default();
        params.insert(PreferredAddress, ParameterValue::VariableBytes(Bytes::new()));
        let mut out = Vec::new();
        assert_eq!(params.write(&mut out), Err(Error::Unsupported(PreferredAddress)));
        assert!(out.is_empty());
    }

    #[test]
    fn reset_token_length() {
        let mut params = TransportParameters::default();
        params.insert(InitialMaxData, 1u32);
        params.insert(
            StatelessResetToken,
            ParameterValue::FixedBytes16(Bytes::from_static(&[0xab; 15])),
        );
        let mut out = Vec::new();
        assert_eq!(params.write(&mut out), Err(Error::IllegalValue(StatelessResetToken)));
        assert!(out.is_empty());

        params.insert(StatelessResetToken, ParameterValue::reset_token([0xab; 16]));
        let encoded = params.encode().unwrap();
        let decoded = TransportParameters::decode(&mut &encoded[..]).unwrap();
        assert_eq!(
            decoded.get(StatelessResetToken).and_then(ParameterValue::as_bytes),
            Some(&[0xab; 16][..])
        );

        let mut truncated = &hex!("0002 abababab")[..];
        assert_eq!(TransportParameters::decode(&mut truncated), Err(Error::Malformed));
    }

    #[test]
    fn shape_mismatch() {
        let mut params = TransportParameters::default();
        params.insert(IdleTimeout, true);
        assert_eq!(params.encode(), Err(Error::IllegalValue(IdleTimeout)));
    }

    #[test]
    fn long_connection_id() {
        let mut params = TransportParameters::default();
        params.insert(OriginalConnectionId, ParameterValue::connection_id(&[7; 255]));
        let encoded = params.encode().unwrap();
        assert_eq!(&encoded[..3], &hex!("0000 ff"));
        assert_eq!(TransportParameters::decode(&mut &encoded[..]).unwrap(), params);

        params.insert(OriginalConnectionId, ParameterValue::connection_id(&[7; 256]));
        assert_eq!(params.encode(), Err(Error::IllegalValue(OriginalConnectionId)));
    }

    #[test]
    fn truncated_connection_id() {
        let mut buf = &hex!("0000 05 0102")[..];
        assert_eq!(TransportParameters::decode(&mut buf), Err(Error::Malformed));
        let mut buf = &hex!("00")[..];
        assert_eq!(TransportParameters::decode(&mut buf), Err(Error::Malformed));
        let mut buf = &hex!("0004 80")[..];
        assert_eq!(TransportParameters::decode(&mut buf), Err(Error::Malformed));
    }

    #[test]
    fn suppression() {
        let mut params = TransportParameters::default();
        params.insert(DisableMigration, true);
        let on = params.encode().unwrap();
        assert!(on.windows(2).any(|w| w == hex!("000c")));

        params.insert(DisableMigration, false);
        let off = params.encode().unwrap();
        assert_eq!(&off[..], &hex!("000e 00")[..]);
    }

    #[test]
    fn removed_default_is_restored_by_decode() {
        let mut params = TransportParameters::default();
        params.insert(IdleTimeout, 10u32);
        params.remove(ActiveConnectionIdLimit);
        assert_eq!(params.len(), 2);

        let encoded = params.encode().unwrap();
        assert_eq!(&encoded[..], &hex!("0001 0a")[..]);
        let decoded = TransportParameters::decode(&mut &encoded[..]).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.varint(ActiveConnectionIdLimit), Some(VarInt(0)));
        assert_ne!(decoded, params);

        params.insert(ActiveConnectionIdLimit, 0u32);
        assert_eq!(decoded, params);
    }

    #[test]
    fn duplicates_keep_last() {
        let mut buf = &hex!("0001 05 0001 06")[..];
        let params = TransportParameters::decode(&mut buf).unwrap();
        assert_eq!(params.varint(IdleTimeout), Some(VarInt(6)));
    }

    #[test]
    fn merge_ignores_unknown_names() {
        let mut config = ParameterConfig::default();
        config.set("max_udp_payload_size", 1200u32).set("idle_timeout", 30u32);
        let mut params = TransportParameters::default();
        params.merge_from(&config);
        assert_eq!(params.len(), 3);
        assert_eq!(params.varint(IdleTimeout), Some(VarInt(30)));
    }

    #[test]
    fn render() {
        let mut params = TransportParameters::default();
        params.insert(OriginalConnectionId, ParameterValue::connection_id(&[0xde, 0xad]));
        params.insert(InitialMaxData, 100u32);
        assert_eq!(
            params.render(),
            "  \"original_connection_id\": dead\n  \"initial_max_data\": 100\n  \
             \"disable_migration\": false\n  \"active_connection_id_limit\": 0\n"
        );
        assert_eq!(params.to_string(), params.render());
    }

    #[test]
    fn describe() {
        assert_eq!(
            TransportParameters::describe(&hex!("000c")),
            "  \"disable_migration\": true\n  \"active_connection_id_limit\": 0\n"
        );
        assert_eq!(
            TransportParameters::describe(&hex!("0010")),
            "unknown transport parameter 0x0010"
        );
    }

    #[proptest]
    fn round_trip(
        #[strategy(vec((0u16..15, 0..=VarInt::MAX.0, vec(any::<u8>(), 0..=255), any::<bool>()), 0..24))]
        entries: Vec<(u16, u64, Vec<u8>, bool)>,
    ) {
        let mut params = TransportParameters::default();
        for (wire, int, bytes, flag) in entries {
            let id = TransportParameterId::try_from(wire).unwrap();
            let value = match id.shape() {
                Shape::VariableBytes => ParameterValue::VariableBytes(bytes.into()),
                Shape::FixedBytes16 => ParameterValue::reset_token([int as u8; RESET_TOKEN_SIZE]),
                Shape::Flag => ParameterValue::Flag(flag),
                Shape::VarInt => ParameterValue::VarInt(VarInt(int)),
                Shape::Unsupported => continue,
            };
            params.insert(id, value);
        }
        let encoded = params.encode().unwrap();
        prop_assert_eq!(TransportParameters::decode(&mut &encoded[..]).unwrap(), params);
    }
}
