//! Splits Upper Transport PDUs into lower transport PDUs.
use crate::crypto::{AID, AKF};
use crate::lower::{
    BlockAck, LowerTransportError, SegN, SegO, SegmentHeader, SegmentedAccessPDU,
    SegmentedControlPDU, SeqZero, UnsegmentedAccessPDU, UnsegmentedControlPDU, PDU, SEG_MAX,
    SEGMENTED_ACCESS_MAX_LEN, SEGMENTED_CONTROL_MAX_LEN, SZMIC, UNSEGMENTED_ACCESS_MAX_LEN,
    UNSEGMENTED_CONTROL_MAX_LEN,
};
use crate::upper::UpperPDU;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum SegmentKind {
    Access {
        akf: AKF,
        aid: Option<AID>,
        szmic: SZMIC,
    },
    Control {
        opcode: u8,
    },
}
impl SegmentKind {
    #[must_use]
    pub fn max_seg_len(&self) -> usize {
        match self {
            SegmentKind::Access { .. } => SEGMENTED_ACCESS_MAX_LEN,
            SegmentKind::Control { .. } => SEGMENTED_CONTROL_MAX_LEN,
        }
    }
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(self, SegmentKind::Control { .. })
    }
    fn header_flag(&self) -> bool {
        match self {
            SegmentKind::Access { szmic, .. } => szmic.0,
            SegmentKind::Control { .. } => false,
        }
    }
}

/// Holds an upper transport payload and hands out its segments. Segments can be regenerated any
/// number of times for retransmission.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Segmenter {
    kind: SegmentKind,
    seq_zero: SeqZero,
    payload: Vec<u8>,
    seg_n: SegN,
}
impl Segmenter {
    pub fn new(
        kind: SegmentKind,
        seq_zero: SeqZero,
        payload: Vec<u8>,
    ) -> Result<Self, LowerTransportError> {
        let max = kind.max_seg_len();
        let count = (payload.len() + max - 1) / max;
        if count == 0 {
            return Err(LowerTransportError::TooShort);
        }
        if count > usize::from(SEG_MAX) + 1 {
            return Err(LowerTransportError::TooLong(payload.len()));
        }
        Ok(Self {
            kind,
            seq_zero,
            payload,
            seg_n: SegN::new((count - 1) as u8),
        })
    }
    pub fn access(pdu: &UpperPDU, seq_zero: SeqZero) -> Result<Self, LowerTransportError> {
        Self::new(
            SegmentKind::Access {
                akf: pdu.akf,
                aid: pdu.aid,
                szmic: pdu.szmic,
            },
            seq_zero,
            pdu.payload.clone(),
        )
    }
    pub fn control(
        opcode: u8,
        parameters: &[u8],
        seq_zero: SeqZero,
    ) -> Result<Self, LowerTransportError> {
        Self::new(
            SegmentKind::Control { opcode },
            seq_zero,
            parameters.to_vec(),
        )
    }
    #[must_use]
    pub fn seg_n(&self) -> SegN {
        self.seg_n
    }
    #[must_use]
    pub fn seq_zero(&self) -> SeqZero {
        self.seq_zero
    }
    #[must_use]
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }
    #[must_use]
    pub fn seg_count(&self) -> usize {
        self.seg_n.segment_count()
    }
    /// Lower transport PDU for segment `seg_o` or `None` if it's past `SegN`.
    #[must_use]
    pub fn segment(&self, seg_o: SegO) -> Option<PDU> {
        if seg_o.value() > self.seg_n.value() {
            return None;
        }
        let max = self.kind.max_seg_len();
        let start = usize::from(seg_o.value()) * max;
        let end = core::cmp::min(start + max, self.payload.len());
        let segment = self.payload[start..end].to_vec();
        let header = SegmentHeader::new(self.kind.header_flag(), self.seq_zero, seg_o, self.seg_n);
        Some(match self.kind {
            SegmentKind::Access { akf, aid, .. } => PDU::SegmentedAccess(SegmentedAccessPDU {
                akf,
                aid,
                header,
                segment,
            }),
            SegmentKind::Control { opcode } => PDU::SegmentedControl(SegmentedControlPDU {
                opcode,
                header,
                segment,
            }),
        })
    }
    /// Every segment not set in `block_ack`.
    pub fn iter(&self, block_ack: BlockAck) -> impl Iterator<Item = (SegO, PDU)> + '_ {
        block_ack
            .missing(self.seg_n)
            .filter_map(move |seg_o| Some((seg_o, self.segment(seg_o)?)))
    }
}

/// Lower transport PDUs for an upper access PDU. Unsegmented when it fits in one PDU.
pub fn lower_access(pdu: &UpperPDU, seq_zero: SeqZero) -> Result<Vec<PDU>, LowerTransportError> {
    if pdu.payload.len() <= UNSEGMENTED_ACCESS_MAX_LEN {
        Ok(vec![PDU::UnsegmentedAccess(UnsegmentedAccessPDU {
            akf: pdu.akf,
            aid: pdu.aid,
            upper_pdu: pdu.payload.clone(),
        })])
    } else {
        let segmenter = Segmenter::access(pdu, seq_zero)?;
        Ok(segmenter.iter(BlockAck::default()).map(|(_, p)| p).collect())
    }
}
/// Lower transport PDUs for a transport control message.
pub fn lower_control(
    opcode: u8,
    parameters: &[u8],
    seq_zero: SeqZero,
) -> Result<Vec<PDU>, LowerTransportError> {
    if parameters.len() <= UNSEGMENTED_CONTROL_MAX_LEN {
        Ok(vec![PDU::UnsegmentedControl(UnsegmentedControlPDU {
            opcode,
            parameters: parameters.to_vec(),
        })])
    } else {
        let segmenter = Segmenter::control(opcode, parameters, seq_zero)?;
        Ok(segmenter.iter(BlockAck::default()).map(|(_, p)| p).collect())
    }
}
