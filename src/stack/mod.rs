//! Mesh session machinery that glues the layers together.
//!
//! - [`transport::MeshTransport`] runs Access -> Upper -> Lower -> Network for outgoing messages
//!   and the reverse for incoming PDUs.
//! - [`handler::MeshMessageHandler`] owns the outstanding request table and drives every message
//!   through its [`state::MessageState`].
//! - [`full::MeshSession`] is the single owner actor that feeds the handler from a bearer.
pub mod bearer;
pub mod full;
pub mod handler;
pub mod messages;
pub mod provisioner;
pub mod registry;
pub mod segments;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

use crate::access::AccessError;
use crate::address::{Address, UnicastAddress};
use crate::control::ControlMessageError;
use crate::lower::LowerTransportError;
use crate::mesh::{AppKeyIndex, TTL};
use crate::models::MessagePackError;
use crate::net::NetworkError;
use crate::reassembler::ReassembleError;
use crate::stack::bearer::BearerError;
use crate::upper::UpperTransportError;
use core::fmt::{Display, Formatter};
use core::time::Duration;

/// Minimum incomplete timer for segmented messages.
pub const INCOMPLETE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportConfig {
    /// TTL for messages that don't pick their own.
    pub default_ttl: TTL,
    /// How long a reassembly buffer may sit without a new segment.
    pub incomplete_timeout: Duration,
    /// How long to wait for a Segment Acknowledgment before resending the unacked segments.
    pub ack_timeout: Duration,
    /// Resends of one segmented message before giving up.
    pub segment_retransmit_limit: u8,
}
impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_ttl: TTL::DEFAULT,
            incomplete_timeout: INCOMPLETE_TIMEOUT,
            ack_timeout: Duration::from_millis(200 + 50 * u64::from(TTL::DEFAULT.value())),
            segment_retransmit_limit: 2,
        }
    }
}

/// Returned when an outgoing message can't be built or sent.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SendError {
    Pack(MessagePackError),
    Access(AccessError),
    Upper(UpperTransportError),
    Lower(LowerTransportError),
    Network(NetworkError),
    Bearer(BearerError),
    InvalidAppKeyIndex(AppKeyIndex),
    /// No device key for the destination.
    UnknownNode(Address),
    /// The source address isn't one of our provisioners.
    UnknownProvisioner(UnicastAddress),
    InvalidDestination(Address),
    /// The 24 bit sequence number space is used up. The IV Index has to be updated.
    OutOfSeq,
    ChannelClosed,
}
/// Returned when an incoming PDU can't be received.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum RecvError {
    Network(NetworkError),
    /// Replay protection rejected the PDU.
    OldSeq,
    Lower(LowerTransportError),
    Reassemble(ReassembleError),
    Upper(UpperTransportError),
    Control(ControlMessageError),
    Access(AccessError),
    Pack(MessagePackError),
    /// SeqAuth couldn't be recovered from the segment's SEQ and SeqZero.
    InvalidSequence,
    ChannelClosed,
}

macro_rules! impl_from {
    ( $target:ident, $( $variant:ident($source:ty) ),* ) => {
        $(
            impl From<$source> for $target {
                fn from(e: $source) -> Self {
                    $target::$variant(e)
                }
            }
        )*
    };
}
impl_from!(
    SendError,
    Pack(MessagePackError),
    Access(AccessError),
    Upper(UpperTransportError),
    Lower(LowerTransportError),
    Network(NetworkError),
    Bearer(BearerError)
);
impl_from!(
    RecvError,
    Network(NetworkError),
    Lower(LowerTransportError),
    Reassemble(ReassembleError),
    Upper(UpperTransportError),
    Control(ControlMessageError),
    Access(AccessError),
    Pack(MessagePackError)
);

impl Display for SendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            SendError::Pack(e) => write!(f, "pack: {}", e),
            SendError::Access(e) => write!(f, "access: {}", e),
            SendError::Upper(e) => write!(f, "upper transport: {}", e),
            SendError::Lower(e) => write!(f, "lower transport: {}", e),
            SendError::Network(e) => write!(f, "network: {}", e),
            SendError::Bearer(e) => write!(f, "bearer: {}", e),
            SendError::InvalidAppKeyIndex(i) => write!(f, "no application key at index {}", i.0),
            SendError::UnknownNode(a) => write!(f, "unknown node {}", a),
            SendError::UnknownProvisioner(a) => write!(f, "{} isn't a provisioner address", a),
            SendError::InvalidDestination(a) => write!(f, "invalid destination {}", a),
            SendError::OutOfSeq => f.write_str("out of sequence numbers"),
            SendError::ChannelClosed => f.write_str("channel closed"),
        }
    }
}
impl std::error::Error for SendError {}

impl Display for RecvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            RecvError::Network(e) => write!(f, "network: {}", e),
            RecvError::OldSeq => f.write_str("replayed PDU"),
            RecvError::Lower(e) => write!(f, "lower transport: {}", e),
            RecvError::Reassemble(e) => write!(f, "reassembly: {}", e),
            RecvError::Upper(e) => write!(f, "upper transport: {}", e),
            RecvError::Control(e) => write!(f, "control: {}", e),
            RecvError::Access(e) => write!(f, "access: {}", e),
            RecvError::Pack(e) => write!(f, "status: {}", e),
            RecvError::InvalidSequence => f.write_str("can't recover SeqAuth"),
            RecvError::ChannelClosed => f.write_str("channel closed"),
        }
    }
}
impl std::error::Error for RecvError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::aes;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.default_ttl, TTL::new(8));
        assert_eq!(config.incomplete_timeout, Duration::from_secs(10));
        assert_eq!(config.ack_timeout, Duration::from_millis(600));
    }
    #[test]
    fn test_error_conversion() {
        let e: RecvError = UpperTransportError::Decryption(aes::Error::AuthenticationFailure).into();
        assert_eq!(
            e,
            RecvError::Upper(UpperTransportError::Decryption(
                aes::Error::AuthenticationFailure
            ))
        );
        let e: SendError = AccessError::ParameterLength(380).into();
        assert_eq!(e.to_string(), "access: 380 parameter bytes exceeds the 379 byte maximum");
    }
}
