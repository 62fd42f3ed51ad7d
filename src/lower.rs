//! Lower Transport Layer PDUs. Segments Upper Transport PDUs that don't fit into one Network PDU.
//!
//! | PDU                  | First Octet            | Segment Header (24 bits)          | Payload  |
//! | -------------------- | ---------------------- | --------------------------------- | -------- |
//! | Unsegmented Access   | SEG=0, AKF, AID(6)     |                                   | <= 15    |
//! | Segmented Access     | SEG=1, AKF, AID(6)     | SZMIC, SeqZero(13), SegO, SegN    | <= 12    |
//! | Unsegmented Control  | SEG=0, Opcode(7)       |                                   | <= 11    |
//! | Segmented Control    | SEG=1, Opcode(7)       | RFU, SeqZero(13), SegO, SegN      | <= 8     |
use crate::crypto::{AID, AKF};
use crate::mesh::{SequenceNumber, CTL, U24};
use core::fmt::{Display, Formatter};

pub const UNSEGMENTED_ACCESS_MAX_LEN: usize = 15;
pub const SEGMENTED_ACCESS_MAX_LEN: usize = 12;
pub const UNSEGMENTED_CONTROL_MAX_LEN: usize = 11;
pub const SEGMENTED_CONTROL_MAX_LEN: usize = 8;

#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub enum LowerTransportError {
    TooShort,
    TooLong(usize),
    /// SegO bigger than SegN.
    InvalidSegmentOffset,
}
impl Display for LowerTransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            LowerTransportError::TooShort => f.write_str("lower transport PDU too short"),
            LowerTransportError::TooLong(l) => write!(f, "lower transport payload too long ({})", l),
            LowerTransportError::InvalidSegmentOffset => f.write_str("SegO > SegN"),
        }
    }
}
impl std::error::Error for LowerTransportError {}

/// Selects the 64 bit TransMIC for segmented access messages.
#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq, Default)]
pub struct SZMIC(pub bool);

pub const SEQ_ZERO_MAX: u16 = (1_u16 << 13) - 1;
/// 13 Bits SeqZero. Low 13 bits of the sequence number of the first segment.
#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub struct SeqZero(u16);
impl SeqZero {
    /// # Panics
    /// Panics if `v > SEQ_ZERO_MAX`.
    #[must_use]
    pub fn new(v: u16) -> Self {
        assert!(v <= SEQ_ZERO_MAX, "SeqZero is 13 bits");
        SeqZero(v)
    }
    #[must_use]
    pub const fn new_masked(v: u16) -> Self {
        SeqZero(v & SEQ_ZERO_MAX)
    }
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}
impl From<SequenceNumber> for SeqZero {
    fn from(seq: SequenceNumber) -> Self {
        SeqZero::new_masked((seq.value() & u32::from(SEQ_ZERO_MAX)) as u16)
    }
}
impl Display for SeqZero {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "SeqZero({})", self.0)
    }
}

/// Recovers the sequence number an upper transport PDU was encrypted with from the sequence number
/// of a later segment and the segment's `SeqZero`. Valid as long as the later segment was sent
/// within 8191 sequence numbers of the first one.
#[must_use]
pub fn recover_sequence_number(
    network_seq: SequenceNumber,
    seq_zero: SeqZero,
) -> Option<SequenceNumber> {
    let net = i64::from(network_seq.value());
    let low = net & i64::from(SEQ_ZERO_MAX);
    let zero = i64::from(seq_zero.value());
    let seq = if low < zero {
        net - (low - zero) - 0x2000
    } else {
        net - (low - zero)
    };
    if seq < 0 {
        None
    } else {
        Some(SequenceNumber(U24::new_masked(seq as u32)))
    }
}

pub const SEG_MAX: u8 = 0x1F;

/// 5 bit SegO (Segment Offset number)
#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub struct SegO(u8);
impl SegO {
    #[must_use]
    pub fn new(v: u8) -> Self {
        assert!(v <= SEG_MAX, "SegO is 5 bits");
        Self(v)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}
impl From<SegO> for u8 {
    fn from(s: SegO) -> Self {
        s.0
    }
}
/// 5 bit SegN (Last Segment number)
#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub struct SegN(u8);
impl SegN {
    #[must_use]
    pub fn new(v: u8) -> Self {
        assert!(v <= SEG_MAX, "SegN is 5 bits");
        Self(v)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
    /// Total amount of segments (`SegN + 1`).
    #[must_use]
    pub fn segment_count(self) -> usize {
        usize::from(self.0) + 1
    }
}
impl From<SegN> for u8 {
    fn from(s: SegN) -> Self {
        s.0
    }
}
/// Bit `n` set means segment `n` was received.
#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq, Default)]
pub struct BlockAck(pub u32);
impl BlockAck {
    /// Sets the `bit` bit to 1. Does nothing if bit >= 32
    pub fn set(&mut self, bit: u8) {
        if bit < 32 {
            (self.0) |= 1_u32 << u32::from(bit);
        }
    }
    /// Returns the bit status (1 or 0) of the `bit` bit. Returns `false` for bit >= 32
    #[must_use]
    pub fn get(self, bit: u8) -> bool {
        bit < 32 && (self.0 & (1_u32 << u32::from(bit))) != 0
    }
    /// Mask with a bit for every segment `0..=seg_n`.
    #[must_use]
    pub fn full(seg_n: SegN) -> BlockAck {
        BlockAck(((1_u64 << (u32::from(seg_n.0) + 1)) - 1) as u32)
    }
    /// Returns if the block ack has every segment `0..=seg_n` set.
    #[must_use]
    pub fn all_acked(self, seg_n: SegN) -> bool {
        let full = Self::full(seg_n).0;
        self.0 & full == full
    }
    /// Segments in `0..=seg_n` that are still missing.
    pub fn missing(self, seg_n: SegN) -> impl Iterator<Item = SegO> {
        (0..=seg_n.0).filter(move |&i| !self.get(i)).map(SegO)
    }
    #[must_use]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// The 24 bits after the first octet of a segmented PDU. `flag` is SZMIC for access PDUs and RFU
/// (0) for control PDUs.
#[derive(Copy, Clone, Hash, Debug, Ord, PartialOrd, Eq, PartialEq)]
pub struct SegmentHeader {
    pub flag: bool,
    pub seq_zero: SeqZero,
    pub seg_o: SegO,
    pub seg_n: SegN,
}
impl SegmentHeader {
    #[must_use]
    pub fn new(flag: bool, seq_zero: SeqZero, seg_o: SegO, seg_n: SegN) -> Self {
        Self {
            flag,
            seq_zero,
            seg_o,
            seg_n,
        }
    }
    #[must_use]
    pub fn pack_into_u24(self) -> U24 {
        let flag = u32::from(self.flag) << 23;
        let seq_zero = u32::from(self.seq_zero.0) << 10;
        let seg_o = u32::from(self.seg_o.0) << 5;
        let seg_n = u32::from(self.seg_n.0);
        U24::new_masked(flag | seq_zero | seg_o | seg_n)
    }
    pub fn unpack_from_u24(v: U24) -> Result<Self, LowerTransportError> {
        let v = v.value();
        let header = Self {
            flag: v & (1 << 23) != 0,
            seq_zero: SeqZero::new_masked((v >> 10) as u16),
            seg_o: SegO(((v >> 5) & u32::from(SEG_MAX)) as u8),
            seg_n: SegN((v & u32::from(SEG_MAX)) as u8),
        };
        if header.seg_o > SegO(header.seg_n.0) {
            Err(LowerTransportError::InvalidSegmentOffset)
        } else {
            Ok(header)
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct UnsegmentedAccessPDU {
    pub akf: AKF,
    pub aid: Option<AID>,
    pub upper_pdu: Vec<u8>,
}
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SegmentedAccessPDU {
    pub akf: AKF,
    pub aid: Option<AID>,
    pub header: SegmentHeader,
    pub segment: Vec<u8>,
}
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct UnsegmentedControlPDU {
    /// 7 bit transport control opcode.
    pub opcode: u8,
    pub parameters: Vec<u8>,
}
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SegmentedControlPDU {
    pub opcode: u8,
    pub header: SegmentHeader,
    pub segment: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PDU {
    UnsegmentedAccess(UnsegmentedAccessPDU),
    SegmentedAccess(SegmentedAccessPDU),
    UnsegmentedControl(UnsegmentedControlPDU),
    SegmentedControl(SegmentedControlPDU),
}
fn access_first_octet(seg: bool, akf: AKF, aid: Option<AID>) -> u8 {
    (u8::from(seg) << 7) | (u8::from(akf.0) << 6) | aid.map_or(0, AID::value)
}
fn push_header(out: &mut Vec<u8>, header: SegmentHeader) {
    out.extend_from_slice(&header.pack_into_u24().to_bytes_be());
}
impl PDU {
    #[must_use]
    pub fn is_seg(&self) -> bool {
        matches!(self, PDU::SegmentedAccess(_) | PDU::SegmentedControl(_))
    }
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            PDU::UnsegmentedControl(_) | PDU::SegmentedControl(_)
        )
    }
    #[must_use]
    pub fn ctl(&self) -> CTL {
        CTL(self.is_control())
    }
    #[must_use]
    pub fn segment_header(&self) -> Option<SegmentHeader> {
        match self {
            PDU::SegmentedAccess(p) => Some(p.header),
            PDU::SegmentedControl(p) => Some(p.header),
            _ => None,
        }
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, LowerTransportError> {
        let mut out = Vec::with_capacity(16);
        match self {
            PDU::UnsegmentedAccess(p) => {
                if p.upper_pdu.len() > UNSEGMENTED_ACCESS_MAX_LEN {
                    return Err(LowerTransportError::TooLong(p.upper_pdu.len()));
                }
                out.push(access_first_octet(false, p.akf, p.aid));
                out.extend_from_slice(&p.upper_pdu);
            }
            PDU::SegmentedAccess(p) => {
                if p.segment.len() > SEGMENTED_ACCESS_MAX_LEN {
                    return Err(LowerTransportError::TooLong(p.segment.len()));
                }
                out.push(access_first_octet(true, p.akf, p.aid));
                push_header(&mut out, p.header);
                out.extend_from_slice(&p.segment);
            }
            PDU::UnsegmentedControl(p) => {
                if p.parameters.len() > UNSEGMENTED_CONTROL_MAX_LEN {
                    return Err(LowerTransportError::TooLong(p.parameters.len()));
                }
                out.push(p.opcode & 0x7F);
                out.extend_from_slice(&p.parameters);
            }
            PDU::SegmentedControl(p) => {
                if p.segment.len() > SEGMENTED_CONTROL_MAX_LEN {
                    return Err(LowerTransportError::TooLong(p.segment.len()));
                }
                out.push(0x80 | (p.opcode & 0x7F));
                push_header(&mut out, p.header);
                out.extend_from_slice(&p.segment);
            }
        }
        Ok(out)
    }
    pub fn from_bytes(bytes: &[u8], ctl: CTL) -> Result<Self, LowerTransportError> {
        let first = *bytes.first().ok_or(LowerTransportError::TooShort)?;
        let seg = first & 0x80 != 0;
        let header = || -> Result<SegmentHeader, LowerTransportError> {
            let h = U24::from_bytes_be(bytes.get(1..4).ok_or(LowerTransportError::TooShort)?)
                .ok_or(LowerTransportError::TooShort)?;
            SegmentHeader::unpack_from_u24(h)
        };
        let (akf, aid) = if first & 0x40 != 0 {
            (AKF(true), Some(AID::new_masked(first)))
        } else {
            (AKF(false), None)
        };
        let pdu = match (ctl.0, seg) {
            (false, false) => PDU::UnsegmentedAccess(UnsegmentedAccessPDU {
                akf,
                aid,
                upper_pdu: bytes[1..].to_vec(),
            }),
            (false, true) => PDU::SegmentedAccess(SegmentedAccessPDU {
                akf,
                aid,
                header: header()?,
                segment: bytes[4..].to_vec(),
            }),
            (true, false) => PDU::UnsegmentedControl(UnsegmentedControlPDU {
                opcode: first & 0x7F,
                parameters: bytes[1..].to_vec(),
            }),
            (true, true) => PDU::SegmentedControl(SegmentedControlPDU {
                opcode: first & 0x7F,
                header: header()?,
                segment: bytes[4..].to_vec(),
            }),
        };
        Ok(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_header() {
        let header = SegmentHeader::new(true, SeqZero::new(0x1FFF), SegO::new(2), SegN::new(3));
        let packed = header.pack_into_u24();
        assert_eq!(SegmentHeader::unpack_from_u24(packed), Ok(header));
        let bad = SegmentHeader::new(false, SeqZero::new(1), SegO::new(4), SegN::new(3));
        assert_eq!(
            SegmentHeader::unpack_from_u24(bad.pack_into_u24()),
            Err(LowerTransportError::InvalidSegmentOffset)
        );
    }
    #[test]
    fn test_block_ack() {
        let mut ack = BlockAck::default();
        ack.set(0);
        ack.set(2);
        assert!(!ack.all_acked(SegN::new(2)));
        assert_eq!(ack.missing(SegN::new(2)).collect::<Vec<_>>(), vec![SegO::new(1)]);
        ack.set(1);
        assert!(ack.all_acked(SegN::new(2)));
        assert!(BlockAck(u32::MAX).all_acked(SegN::new(31)));
        assert_eq!(BlockAck::full(SegN::new(31)), BlockAck(u32::MAX));
    }
    #[test]
    fn test_recover_sequence_number_window() {
        for &seq_zero in &[0_u32, 1, 4096, 8191] {
            for &original in &[seq_zero, seq_zero + 0x2000, seq_zero + 0x10_0000] {
                for &delta in &[0_u32, 1, 31, 4095, 8191] {
                    let recovered = recover_sequence_number(
                        SequenceNumber::new(original + delta),
                        SeqZero::from(SequenceNumber::new(original)),
                    );
                    assert_eq!(recovered, Some(SequenceNumber::new(original)));
                }
            }
        }
    }
    #[test]
    fn test_recover_wraps_past_13_bits() {
        // SeqZero 8191, later segment sent after the low 13 bits wrapped.
        assert_eq!(
            recover_sequence_number(SequenceNumber::new(0x2001), SeqZero::new(0x1FFF)),
            Some(SequenceNumber::new(0x1FFF))
        );
        assert_eq!(
            recover_sequence_number(SequenceNumber::new(0x0001), SeqZero::new(0x1FFF)),
            None
        );
    }
    #[test]
    fn test_recover_borrows_when_low_bits_wrapped() {
        for &(original, later) in &[
            (0x12_3456_u32, 0x12_4056_u32),
            (0x00_1F00, 0x00_2100),
            (0x00_1234, 0x00_3233),
            (0x7F_FFFF, 0x80_0010),
        ] {
            let seq_zero = SeqZero::from(SequenceNumber::new(original));
            assert!(later & u32::from(SEQ_ZERO_MAX) < u32::from(seq_zero.value()));
            assert_eq!(
                recover_sequence_number(SequenceNumber::new(later), seq_zero),
                Some(SequenceNumber::new(original))
            );
        }
        // One past the window resolves to the newer SeqZero instead.
        assert_eq!(
            recover_sequence_number(SequenceNumber::new(0x00_3234), SeqZero::new(0x1234)),
            Some(SequenceNumber::new(0x00_3234))
        );
    }
    #[test]
    fn test_pdu_bytes() {
        let pdu = PDU::SegmentedAccess(SegmentedAccessPDU {
            akf: AKF(true),
            aid: Some(AID::new(0x26)),
            header: SegmentHeader::new(false, SeqZero::new(0x0B), SegO::new(1), SegN::new(1)),
            segment: vec![1, 2, 3],
        });
        let bytes = pdu.to_bytes().unwrap();
        assert_eq!(bytes[0], 0xE6);
        assert_eq!(PDU::from_bytes(&bytes, CTL(false)), Ok(pdu));

        let too_long = PDU::UnsegmentedControl(UnsegmentedControlPDU {
            opcode: 0x0A,
            parameters: vec![0; 12],
        });
        assert_eq!(too_long.to_bytes(), Err(LowerTransportError::TooLong(12)));
    }
}
