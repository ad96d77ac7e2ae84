//! Codec and handshake binding for the QUIC transport parameters TLS extension
//!
//! During a QUIC handshake each endpoint advertises its transport parameters inside a TLS
//! extension. This crate contains no TLS or networking code: it parses and generates the
//! extension body, and keeps track of which handshake message (ClientHello, ServerHello or
//! EncryptedExtensions) the parameters belong to, so the peer's parameters can be handed to the
//! established session once the handshake completes.
//!
//! The most important types are [`TransportParameters`], the typed parameter set, and
//! [`TransportParamsExtension`], which the surrounding handshake engine calls whenever the
//! extension is received or needs to be produced. Deployments that interpret parameters outside
//! this crate can run the extension in [`Mode::Opaque`], where the body is carried as raw bytes.

#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![cfg_attr(test, allow(dead_code))]
#![warn(clippy::use_self)]

#[doc(hidden)]
pub mod coding;
mod varint;

pub use varint::{VarInt, VarIntBoundsExceeded};

pub mod config;
pub use crate::config::{LocalParameters, Mode, ParameterConfig};

pub mod extension;
pub use crate::extension::{
    AlertDescription, ExtensionData, ExtensionSlot, Handshake, HandshakePhase, HandshakeStore,
    TransportParamsExtension,
};

pub mod opaque;
pub use crate::opaque::OpaqueTransportParameters;

pub mod session;
pub use crate::session::{PeerParameters, Session, SessionState};

pub mod transport_parameters;
pub use crate::transport_parameters::{
    Error, ParameterValue, Shape, TransportParameterId, TransportParameters,
};

/// Which end of the handshake this endpoint is
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Side {
    /// The initiator of a connection
    Client = 0,
    /// The acceptor of a connection
    Server = 1,
}

impl Side {
    #[inline]
    /// Shorthand for `self == Side::Client`
    pub fn is_client(self) -> bool {
        self == Self::Client
    }

    #[inline]
    /// Shorthand for `self == Side::Server`
    pub fn is_server(self) -> bool {
        self == Self::Server
    }

    /// The other end of the handshake
    #[inline]
    pub fn peer(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Server => "server",
        })
    }
}

/// Length of a stateless reset token on the wire
pub const RESET_TOKEN_SIZE: usize = 16;
