//! Binding of the transport parameters extension to handshake messages
//!
//! Parameters are stored per [`ExtensionSlot`], the handshake message that carries them. A
//! client sends its parameters in the ClientHello; a server answers in the ServerHello or, with
//! TLS 1.3 style handshakes, in EncryptedExtensions. Which slot an operation touches is decided
//! from the endpoint's [`Side`] and the negotiated [`HandshakePhase`].

use std::fmt;

use bytes::{Buf, Bytes};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    Side,
    config::{LocalParameters, Mode},
    opaque::OpaqueTransportParameters,
    session::{self, Session},
    transport_parameters::{Error, TransportParameters},
};

/// Handshake message a transport parameters extension belongs to
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExtensionSlot {
    /// Sent by the client
    ClientHello,
    /// Sent by the server in legacy handshakes
    ServerHello,
    /// Sent by the server in TLS 1.3 style handshakes
    EncryptedExtensions,
}

impl ExtensionSlot {
    /// The slot holding the parameters sent by `side`
    pub fn written_by(side: Side, phase: HandshakePhase) -> Self {
        match (side, phase) {
            (Side::Client, _) => Self::ClientHello,
            (Side::Server, HandshakePhase::Legacy) => Self::ServerHello,
            (Side::Server, HandshakePhase::EncryptedExtensions) => Self::EncryptedExtensions,
        }
    }
}

impl fmt::Display for ExtensionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientHello => "ClientHello",
            Self::ServerHello => "ServerHello",
            Self::EncryptedExtensions => "EncryptedExtensions",
        })
    }
}

/// Which message carries the server's parameters
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum HandshakePhase {
    /// The ServerHello
    Legacy,
    /// EncryptedExtensions
    #[default]
    EncryptedExtensions,
}

/// Parameters stored for one slot
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExtensionData {
    /// Decoded parameters
    Structured(TransportParameters),
    /// Raw extension body
    Opaque(OpaqueTransportParameters),
}

impl ExtensionData {
    fn new(mode: Mode) -> Self {
        match mode {
            Mode::Structured => Self::Structured(TransportParameters::default()),
            Mode::Opaque => Self::Opaque(OpaqueTransportParameters::default()),
        }
    }

    /// The mode this data was created for
    pub fn mode(&self) -> Mode {
        match self {
            Self::Structured(_) => Mode::Structured,
            Self::Opaque(_) => Mode::Opaque,
        }
    }

    fn read<R: Buf>(&mut self, r: &mut R) -> Result<(), Error> {
        match self {
            Self::Structured(params) => params.read(r),
            Self::Opaque(params) => {
                params.read(r);
                Ok(())
            }
        }
    }

    fn populate(&mut self, config: &LocalParameters) -> Result<(), Error> {
        match (self, config) {
            (Self::Structured(params), LocalParameters::Structured(config)) => {
                params.merge_from(config);
            }
            (Self::Opaque(params), LocalParameters::Opaque(body)) => {
                *params = OpaqueTransportParameters::from_bytes(Bytes::copy_from_slice(body));
            }
            _ => return Err(Error::ModeMismatch),
        }
        Ok(())
    }

    /// Encode the stored parameters as an extension body
    pub fn encode(&self) -> Result<Bytes, Error> {
        match self {
            Self::Structured(params) => params.encode(),
            Self::Opaque(params) => Ok(params.encode()),
        }
    }
}

/// Per-handshake storage of transport parameters, keyed by slot
///
/// A slot is absent until the first time parameters are received or produced for it.
#[derive(Debug, Default)]
pub struct HandshakeStore {
    slots: FxHashMap<ExtensionSlot, ExtensionData>,
}

impl HandshakeStore {
    /// Parameters stored for `slot`, if any
    pub fn get(&self, slot: ExtensionSlot) -> Option<&ExtensionData> {
        self.slots.get(&slot)
    }

    /// Whether `slot` has been populated
    pub fn is_populated(&self, slot: ExtensionSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    // Fetch-or-create, without touching the store
    fn checkout(&self, slot: ExtensionSlot, mode: Mode) -> Result<ExtensionData, Error> {
        match self.slots.get(&slot) {
            Some(data) if data.mode() == mode => Ok(data.clone()),
            Some(_) => Err(Error::ModeMismatch),
            None => Ok(ExtensionData::new(mode)),
        }
    }

    fn commit(&mut self, slot: ExtensionSlot, data: ExtensionData) {
        if self.slots.insert(slot, data).is_some() {
            trace!(%slot, "updated populated slot");
        }
    }
}

/// State of a single handshake as seen by the extension
#[derive(Debug)]
pub struct Handshake {
    side: Side,
    phase: HandshakePhase,
    store: HandshakeStore,
    exported: bool,
}

impl Handshake {
    /// Start a handshake for `side`, assuming a TLS 1.3 style exchange
    pub fn new(side: Side) -> Self {
        Self {
            side,
            phase: HandshakePhase::default(),
            store: HandshakeStore::default(),
            exported: false,
        }
    }

    /// Which end of the handshake we are
    pub fn side(&self) -> Side {
        self.side
    }

    /// Which message carries the server's parameters
    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Record the negotiated phase once the protocol version is known
    ///
    /// Parameters already received from the server stay visible to
    /// [`peer_parameters`](Self::peer_parameters) if the phase changes afterwards.
    pub fn set_phase(&mut self, phase: HandshakePhase) {
        self.phase = phase;
    }

    /// Stored parameters
    pub fn store(&self) -> &HandshakeStore {
        &self.store
    }

    /// The slot our own parameters go into
    pub fn local_slot(&self) -> ExtensionSlot {
        ExtensionSlot::written_by(self.side, self.phase)
    }

    /// The slot the peer's parameters go into
    pub fn peer_slot(&self) -> ExtensionSlot {
        ExtensionSlot::written_by(self.side.peer(), self.phase)
    }

    /// The peer's stored parameters and the slot they were found in
    ///
    /// A client falls back to the other server slot when the phase changed after the server's
    /// parameters arrived.
    pub fn peer_parameters(&self) -> Option<(ExtensionSlot, &ExtensionData)> {
        let slot = self.peer_slot();
        let fallback = match slot {
            ExtensionSlot::ClientHello => None,
            ExtensionSlot::ServerHello => Some(ExtensionSlot::EncryptedExtensions),
            ExtensionSlot::EncryptedExtensions => Some(ExtensionSlot::ServerHello),
        };
        [Some(slot), fallback]
            .into_iter()
            .flatten()
            .find_map(|slot| Some((slot, self.store.get(slot)?)))
    }

    /// Whether the peer's parameters were handed to a session
    pub fn is_exported(&self) -> bool {
        self.exported
    }

    // Marks the handshake as exported; false if it already was
    pub(crate) fn begin_export(&mut self) -> bool {
        !std::mem::replace(&mut self.exported, true)
    }
}

/// TLS alert sent when the extension cannot be processed
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AlertDescription {
    /// A field was out of range or not recognized
    IllegalParameter = 47,
    /// The message could not be decoded
    DecodeError = 50,
    /// A local failure unrelated to the peer
    InternalError = 80,
    /// An extension arrived in a message that may not carry it
    UnsupportedExtension = 110,
}

impl AlertDescription {
    /// QUIC `CRYPTO_ERROR` code carrying this alert
    pub fn quic_error_code(self) -> u64 {
        0x100 | self as u64
    }
}

impl Error {
    /// The alert that aborts the handshake on this error
    pub fn alert(self) -> AlertDescription {
        match self {
            Self::Malformed => AlertDescription::DecodeError,
            Self::UnknownParameter(_) | Self::Unsupported(_) => AlertDescription::IllegalParameter,
            Self::UnexpectedSlot(_) => AlertDescription::UnsupportedExtension,
            Self::IllegalValue(_) | Self::ModeMismatch => AlertDescription::InternalError,
        }
    }
}

/// The transport parameters extension
///
/// Holds no per-handshake state, so one value can serve every handshake of an endpoint.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TransportParamsExtension {
    mode: Mode,
}

impl TransportParamsExtension {
    /// Create the extension for the given representation
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Representation used for extension bodies
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decode `r` into `slot`
    ///
    /// The slot is only updated if the whole body decodes.
    pub fn consume<R: Buf>(
        &self,
        store: &mut HandshakeStore,
        slot: ExtensionSlot,
        r: &mut R,
    ) -> Result<(), Error> {
        let len = r.remaining();
        let mut data = store.checkout(slot, self.mode)?;
        data.read(r)?;
        trace!(%slot, len, "consumed transport parameters");
        store.commit(slot, data);
        Ok(())
    }

    /// Populate `slot` from `config` and encode it
    ///
    /// Returns `None` when nothing is configured, in which case the extension must be left out
    /// of the message.
    pub fn produce(
        &self,
        store: &mut HandshakeStore,
        slot: ExtensionSlot,
        config: Option<&LocalParameters>,
    ) -> Result<Option<Bytes>, Error> {
        let Some(config) = config else {
            trace!(%slot, "no transport parameters configured, omitting extension");
            return Ok(None);
        };
        let mut data = store.checkout(slot, self.mode)?;
        data.populate(config)?;
        let encoded = data.encode()?;
        trace!(%slot, len = encoded.len(), "produced transport parameters");
        store.commit(slot, data);
        Ok(Some(encoded))
    }

    /// Called when the extension arrives in `slot`
    pub fn on_extension_received<R: Buf>(
        &self,
        hs: &mut Handshake,
        slot: ExtensionSlot,
        r: &mut R,
    ) -> Result<(), Error> {
        if slot != hs.peer_slot() {
            debug!(side = %hs.side, %slot, "transport parameters received in unexpected message");
            return Err(Error::UnexpectedSlot(slot));
        }
        self.consume(&mut hs.store, slot, r).map_err(|e| {
            debug!(side = %hs.side, %slot, error = %e, "rejecting transport parameters");
            e
        })
    }

    /// Called when a message that may carry the extension is being built for `slot`
    pub fn on_extension_requested(
        &self,
        hs: &mut Handshake,
        slot: ExtensionSlot,
        config: Option<&LocalParameters>,
    ) -> Result<Option<Bytes>, Error> {
        if slot != hs.local_slot() {
            return Err(Error::UnexpectedSlot(slot));
        }
        self.produce(&mut hs.store, slot, config)
    }

    /// Called once the handshake is complete; hands the peer's parameters to `session`
    ///
    /// Returns whether anything was exported. Only the first successful call per handshake
    /// reaches the session.
    pub fn export_to_session<S: Session + ?Sized>(
        &self,
        hs: &mut Handshake,
        session: &mut S,
    ) -> bool {
        session::export_to_session(hs, session)
    }
}
