//! Working envelopes for messages moving through the layers. Outgoing ones collect the encrypted
//! network PDUs, incoming ones carry the decoded payload.
use crate::access::Opcode;
use crate::address::{Address, UnicastAddress};
use crate::crypto::{AID, AKF};
use crate::lower::{SeqZero, SZMIC};
use crate::mesh::{CompanyID, IVIndex, SequenceNumber, TTL};
use crate::net::PduType;
use crate::stack::bearer::OutgoingPdu;
use std::collections::BTreeMap;

/// One encrypted network PDU and the SEQ it was encrypted with.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NetworkSegment {
    pub seq: SequenceNumber,
    pub pdu: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AccessMessage {
    pub src: UnicastAddress,
    pub dst: Address,
    /// SeqAuth. The sequence number the upper transport PDU was encrypted with.
    pub seq: SequenceNumber,
    pub iv_index: IVIndex,
    pub ttl: TTL,
    pub opcode: Opcode,
    pub parameters: Vec<u8>,
    pub akf: AKF,
    pub aid: Option<AID>,
    pub aszmic: SZMIC,
    pub company_id: Option<CompanyID>,
    /// Encrypted access payload with its TransMIC.
    pub upper_pdu: Vec<u8>,
    /// Network PDUs by SegO. Unsegmented messages only have segment 0.
    pub network_pdus: BTreeMap<u8, NetworkSegment>,
}
impl AccessMessage {
    #[must_use]
    pub fn seq_zero(&self) -> SeqZero {
        SeqZero::from(self.seq)
    }
    #[must_use]
    pub fn is_segmented(&self) -> bool {
        self.network_pdus.len() > 1
            || self.upper_pdu.len() > crate::lower::UNSEGMENTED_ACCESS_MAX_LEN
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ControlMessage {
    pub src: UnicastAddress,
    pub dst: Address,
    pub seq: SequenceNumber,
    pub iv_index: IVIndex,
    pub ttl: TTL,
    /// Transport control opcode, or the proxy configuration opcode.
    pub opcode: u8,
    pub parameters: Vec<u8>,
    pub pdu_type: PduType,
    pub network_pdus: BTreeMap<u8, NetworkSegment>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Message {
    Access(AccessMessage),
    Control(ControlMessage),
}
impl Message {
    #[must_use]
    pub fn src(&self) -> UnicastAddress {
        match self {
            Message::Access(m) => m.src,
            Message::Control(m) => m.src,
        }
    }
    #[must_use]
    pub fn dst(&self) -> Address {
        match self {
            Message::Access(m) => m.dst,
            Message::Control(m) => m.dst,
        }
    }
    #[must_use]
    pub fn seq(&self) -> SequenceNumber {
        match self {
            Message::Access(m) => m.seq,
            Message::Control(m) => m.seq,
        }
    }
    #[must_use]
    pub fn pdu_type(&self) -> PduType {
        match self {
            Message::Access(_) => PduType::Network,
            Message::Control(m) => m.pdu_type,
        }
    }
    #[must_use]
    pub fn network_pdus(&self) -> &BTreeMap<u8, NetworkSegment> {
        match self {
            Message::Access(m) => &m.network_pdus,
            Message::Control(m) => &m.network_pdus,
        }
    }
    /// Bearer PDUs in SegO order.
    pub fn outgoing(&self) -> impl Iterator<Item = OutgoingPdu> + '_ {
        let pdu_type = self.pdu_type();
        let dst = self.dst();
        self.network_pdus().values().map(move |s| OutgoingPdu {
            pdu: s.pdu.clone(),
            pdu_type,
            dst,
        })
    }
    /// `true` if `pdu` is the last network PDU of this message.
    #[must_use]
    pub fn ends_with(&self, pdu: &[u8]) -> bool {
        self.network_pdus()
            .values()
            .next_back()
            .map_or(false, |s| s.pdu == pdu)
    }
    #[must_use]
    pub fn contains_pdu(&self, pdu: &[u8]) -> bool {
        self.network_pdus().values().any(|s| s.pdu == pdu)
    }
}
impl From<AccessMessage> for Message {
    fn from(m: AccessMessage) -> Self {
        Message::Access(m)
    }
}
impl From<ControlMessage> for Message {
    fn from(m: ControlMessage) -> Self {
        Message::Control(m)
    }
}
