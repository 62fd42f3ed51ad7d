//! Bearer side of the stack. The bearer itself (GATT proxy, advertising) lives outside this crate;
//! it only has to accept [`OutgoingPdu`]s and hand back [`IncomingPdu`]s.
use crate::address::Address;
use crate::net::PduType;
use core::fmt::{Display, Formatter};
use tokio::sync::mpsc;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum BearerError {
    /// The bearer can't take more PDUs right now.
    Busy,
    Closed,
}
impl Display for BearerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            BearerError::Busy => f.write_str("bearer busy"),
            BearerError::Closed => f.write_str("bearer closed"),
        }
    }
}
impl std::error::Error for BearerError {}

/// Encrypted PDU ready to go out over the air.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct OutgoingPdu {
    pub pdu: Vec<u8>,
    pub pdu_type: PduType,
    /// Network destination. Proxy configuration PDUs are `Unassigned`.
    pub dst: Address,
}
/// Raw PDU received by the bearer.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct IncomingPdu {
    pub pdu: Vec<u8>,
    pub pdu_type: PduType,
}
impl IncomingPdu {
    #[must_use]
    pub fn network(pdu: Vec<u8>) -> Self {
        Self {
            pdu,
            pdu_type: PduType::Network,
        }
    }
}

/// Hands encrypted PDUs to the radio. Writes must not block. Completion is reported back through
/// `MeshMessageHandler::handle_write_callback`.
pub trait Bearer {
    fn write(&mut self, pdu: OutgoingPdu) -> Result<(), BearerError>;
}
impl Bearer for mpsc::Sender<OutgoingPdu> {
    fn write(&mut self, pdu: OutgoingPdu) -> Result<(), BearerError> {
        self.try_send(pdu).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BearerError::Busy,
            mpsc::error::TrySendError::Closed(_) => BearerError::Closed,
        })
    }
}
impl Bearer for mpsc::UnboundedSender<OutgoingPdu> {
    fn write(&mut self, pdu: OutgoingPdu) -> Result<(), BearerError> {
        self.send(pdu).map_err(|_| BearerError::Closed)
    }
}
/// Collects everything written. Used when PDUs are sent out in batches by the caller.
impl Bearer for Vec<OutgoingPdu> {
    fn write(&mut self, pdu: OutgoingPdu) -> Result<(), BearerError> {
        self.push(pdu);
        Ok(())
    }
}
