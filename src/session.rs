//! Handing negotiated parameters to the established session

use bytes::Bytes;
use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::{
    extension::{ExtensionData, Handshake},
    transport_parameters::{ParameterValue, TransportParameterId, TransportParameters},
};

/// The peer's transport parameters as seen by an established session
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PeerParameters {
    /// Decoded parameters
    Structured(TransportParameters),
    /// The raw extension body
    Opaque(Bytes),
}

impl PeerParameters {
    // Deep copy, so later changes to the handshake store cannot leak into the session
    fn snapshot(data: &ExtensionData) -> Self {
        match data {
            ExtensionData::Structured(params) => Self::Structured(params.clone()),
            ExtensionData::Opaque(params) => {
                Self::Opaque(Bytes::copy_from_slice(params.as_bytes()))
            }
        }
    }

    /// Value of `id`, for structured parameters
    pub fn get(&self, id: TransportParameterId) -> Option<&ParameterValue> {
        self.structured()?.get(id)
    }

    /// Value of the parameter called `name`, for structured parameters
    pub fn value(&self, name: &str) -> Option<&ParameterValue> {
        self.get(TransportParameterId::from_name(name)?)
    }

    /// The decoded parameters, unless running in opaque mode
    pub fn structured(&self) -> Option<&TransportParameters> {
        match self {
            Self::Structured(params) => Some(params),
            Self::Opaque(_) => None,
        }
    }

    /// The raw extension body, in opaque mode
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Structured(_) => None,
            Self::Opaque(body) => Some(body),
        }
    }
}

/// Long-lived session receiving the peer's parameters after the handshake
pub trait Session {
    /// Store the peer's parameters
    fn put_transport_parameters(&mut self, params: PeerParameters);
}

/// Session state holding the peer's parameters
///
/// The parameters can be set once; later attempts are ignored.
#[derive(Debug, Default)]
pub struct SessionState {
    transport_parameters: OnceCell<PeerParameters>,
}

impl SessionState {
    /// An empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// The peer's parameters, if the extension was negotiated
    pub fn transport_parameters(&self) -> Option<&PeerParameters> {
        self.transport_parameters.get()
    }
}

impl Session for SessionState {
    fn put_transport_parameters(&mut self, params: PeerParameters) {
        if self.transport_parameters.set(params).is_err() {
            warn!("transport parameters already exported to this session");
        }
    }
}

/// Copy the peer's parameters from `hs` into `session`
///
/// Does nothing if the peer never sent the extension, or if this handshake was already exported.
/// Returns whether the session received anything.
pub fn export_to_session<S: Session + ?Sized>(hs: &mut Handshake, session: &mut S) -> bool {
    let Some((slot, data)) = hs.peer_parameters() else {
        debug!(side = %hs.side(), slot = %hs.peer_slot(), "peer sent no transport parameters");
        return false;
    };
    let params = PeerParameters::snapshot(data);
    if !hs.begin_export() {
        debug!(side = %hs.side(), "transport parameters already exported for this handshake");
        return false;
    }
    trace!(side = %hs.side(), %slot, "exporting peer transport parameters");
    session.put_transport_parameters(params);
    true
}
