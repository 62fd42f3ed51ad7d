//! Transport Control messages. Only carried in control (CTL=1) lower transport PDUs.
use crate::lower::{BlockAck, SeqZero, UnsegmentedControlPDU, SEQ_ZERO_MAX};
use crate::mesh::TTL;
use core::convert::TryFrom;
use core::fmt::{Display, Formatter};

/// 7 Bit Control Opcode
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum ControlOpcode {
    /// Segment Acknowledgment. Handled by the lower transport layer.
    Ack = 0x00,
    Heartbeat = 0x0A,
}
impl ControlOpcode {
    #[must_use]
    pub fn new(opcode: u8) -> Option<Self> {
        match opcode {
            0x00 => Some(ControlOpcode::Ack),
            0x0A => Some(ControlOpcode::Heartbeat),
            _ => None,
        }
    }
}
impl From<ControlOpcode> for u8 {
    fn from(opcode: ControlOpcode) -> Self {
        opcode as u8
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ControlMessageError {
    BadLength,
    UnknownOpcode(u8),
}
impl Display for ControlMessageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ControlMessageError::BadLength => f.write_str("bad control message length"),
            ControlMessageError::UnknownOpcode(o) => write!(f, "unknown control opcode {:#04x}", o),
        }
    }
}
impl std::error::Error for ControlMessageError {}

/// Segment Acknowledgment. `OBO(1) | SeqZero(13) | RFU(2)` followed by the 32 bit BlockAck.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct SegmentAck {
    /// Set by a friend node acking on behalf of a low power node.
    pub obo: bool,
    pub seq_zero: SeqZero,
    pub block_ack: BlockAck,
}
impl SegmentAck {
    pub const OPCODE: ControlOpcode = ControlOpcode::Ack;
    pub const PARAMETERS_LEN: usize = 6;
    #[must_use]
    pub fn new(seq_zero: SeqZero, block_ack: BlockAck) -> Self {
        Self {
            obo: false,
            seq_zero,
            block_ack,
        }
    }
    #[must_use]
    pub fn pack(&self) -> [u8; Self::PARAMETERS_LEN] {
        let head = (u16::from(self.obo) << 15) | ((self.seq_zero.value() & SEQ_ZERO_MAX) << 2);
        let head = head.to_be_bytes();
        let ack = self.block_ack.0.to_be_bytes();
        [head[0], head[1], ack[0], ack[1], ack[2], ack[3]]
    }
    pub fn unpack(parameters: &[u8]) -> Result<Self, ControlMessageError> {
        if parameters.len() != Self::PARAMETERS_LEN {
            return Err(ControlMessageError::BadLength);
        }
        let head = u16::from_be_bytes([parameters[0], parameters[1]]);
        let ack = u32::from_be_bytes([parameters[2], parameters[3], parameters[4], parameters[5]]);
        Ok(Self {
            obo: head & 0x8000 != 0,
            seq_zero: SeqZero::new_masked(head >> 2),
            block_ack: BlockAck(ack),
        })
    }
    #[must_use]
    pub fn to_pdu(&self) -> UnsegmentedControlPDU {
        UnsegmentedControlPDU {
            opcode: Self::OPCODE.into(),
            parameters: self.pack().to_vec(),
        }
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Heartbeat {
    pub init_ttl: TTL,
    pub features: u16,
}
impl Heartbeat {
    pub const OPCODE: ControlOpcode = ControlOpcode::Heartbeat;
    pub fn unpack(parameters: &[u8]) -> Result<Self, ControlMessageError> {
        if parameters.len() != 3 {
            return Err(ControlMessageError::BadLength);
        }
        Ok(Self {
            init_ttl: TTL::from_masked_u8(parameters[0]),
            features: u16::from_be_bytes([parameters[1], parameters[2]]),
        })
    }
    #[must_use]
    pub fn pack(&self) -> [u8; 3] {
        let f = self.features.to_be_bytes();
        [self.init_ttl.value(), f[0], f[1]]
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ControlPDU {
    Ack(SegmentAck),
    Heartbeat(Heartbeat),
}
impl ControlPDU {
    #[must_use]
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            ControlPDU::Ack(_) => SegmentAck::OPCODE,
            ControlPDU::Heartbeat(_) => Heartbeat::OPCODE,
        }
    }
    pub fn try_unpack(opcode: u8, parameters: &[u8]) -> Result<Self, ControlMessageError> {
        match ControlOpcode::new(opcode).ok_or(ControlMessageError::UnknownOpcode(opcode))? {
            ControlOpcode::Ack => Ok(ControlPDU::Ack(SegmentAck::unpack(parameters)?)),
            ControlOpcode::Heartbeat => Ok(ControlPDU::Heartbeat(Heartbeat::unpack(parameters)?)),
        }
    }
}
impl TryFrom<&UnsegmentedControlPDU> for ControlPDU {
    type Error = ControlMessageError;

    fn try_from(pdu: &UnsegmentedControlPDU) -> Result<Self, Self::Error> {
        ControlPDU::try_unpack(pdu.opcode, &pdu.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::PDU;
    use crate::mesh::CTL;

    #[test]
    fn test_segment_ack_layout() {
        let ack = SegmentAck::new(SeqZero::new(0x1FFF), BlockAck(0x0000_0007));
        assert_eq!(ack.pack(), [0x7F, 0xFC, 0x00, 0x00, 0x00, 0x07]);
        assert_eq!(SegmentAck::unpack(&ack.pack()), Ok(ack));
        assert_eq!(
            SegmentAck::unpack(&[0x00]),
            Err(ControlMessageError::BadLength)
        );
    }
    #[test]
    fn test_segment_ack_lower_pdu() {
        let ack = SegmentAck::new(SeqZero::new(0x0123), BlockAck(0x8000_0001));
        let bytes = PDU::UnsegmentedControl(ack.to_pdu()).to_bytes().unwrap();
        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], 0x00);
        match PDU::from_bytes(&bytes, CTL(true)).unwrap() {
            PDU::UnsegmentedControl(pdu) => {
                assert_eq!(ControlPDU::try_from(&pdu), Ok(ControlPDU::Ack(ack)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test]
    fn test_unknown_opcode() {
        assert_eq!(
            ControlPDU::try_unpack(0x03, &[]),
            Err(ControlMessageError::UnknownOpcode(0x03))
        );
    }
}
