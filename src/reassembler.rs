//! Transport Layer Reassembler. One sparse buffer per `(src, SeqZero)`.
use crate::address::UnicastAddress;
use crate::lower::{BlockAck, SegN, SegO, SegmentHeader, SeqZero, PDU};
use crate::segmenter::SegmentKind;
use core::fmt::{Display, Formatter};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum ReassembleError {
    SegmentAlreadyInserted(SegO),
    DataTooLong,
    SegmentOutOfBounds,
    /// A segment disagrees with the first one about SegN, SZMIC or its kind.
    HeaderMismatch,
    NotSegmented,
}
impl Display for ReassembleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ReassembleError::SegmentAlreadyInserted(o) => {
                write!(f, "segment {} already inserted", o.value())
            }
            ReassembleError::DataTooLong => f.write_str("segment data too long"),
            ReassembleError::SegmentOutOfBounds => f.write_str("segment offset out of bounds"),
            ReassembleError::HeaderMismatch => f.write_str("segment header mismatch"),
            ReassembleError::NotSegmented => f.write_str("PDU isn't segmented"),
        }
    }
}
impl std::error::Error for ReassembleError {}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct ReassemblyKey {
    pub src: UnicastAddress,
    pub seq_zero: SeqZero,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Context {
    kind: SegmentKind,
    seg_n: SegN,
    segments: BTreeMap<u8, Vec<u8>>,
    block_ack: BlockAck,
}
impl Context {
    #[must_use]
    pub fn new(kind: SegmentKind, seg_n: SegN) -> Self {
        Self {
            kind,
            seg_n,
            segments: BTreeMap::new(),
            block_ack: BlockAck::default(),
        }
    }
    #[must_use]
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }
    #[must_use]
    pub fn seg_n(&self) -> SegN {
        self.seg_n
    }
    #[must_use]
    pub const fn block_ack(&self) -> BlockAck {
        self.block_ack
    }
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.block_ack.all_acked(self.seg_n)
    }
    pub fn insert(
        &mut self,
        kind: SegmentKind,
        seg_o: SegO,
        seg_n: SegN,
        data: &[u8],
    ) -> Result<(), ReassembleError> {
        if kind != self.kind || seg_n != self.seg_n {
            return Err(ReassembleError::HeaderMismatch);
        }
        if seg_o.value() > seg_n.value() {
            return Err(ReassembleError::SegmentOutOfBounds);
        }
        if data.len() > kind.max_seg_len() {
            return Err(ReassembleError::DataTooLong);
        }
        match self.segments.entry(seg_o.value()) {
            Entry::Occupied(_) => Err(ReassembleError::SegmentAlreadyInserted(seg_o)),
            Entry::Vacant(v) => {
                v.insert(data.to_vec());
                self.block_ack.set(seg_o.value());
                Ok(())
            }
        }
    }
    /// Concatenates the segments in offset order. `None` until every segment is in.
    #[must_use]
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_ready() {
            return None;
        }
        Some(self.segments.values().flatten().copied().collect())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReassembleOutcome {
    /// Still waiting for segments. `started` is set when this segment opened the buffer.
    Incomplete {
        key: ReassemblyKey,
        block_ack: BlockAck,
        started: bool,
    },
    /// Every segment arrived. The buffer has been removed.
    Complete {
        key: ReassemblyKey,
        kind: SegmentKind,
        seg_n: SegN,
        block_ack: BlockAck,
        data: Vec<u8>,
    },
}

#[derive(Clone, Debug, Default)]
pub struct Reassembler {
    contexts: BTreeMap<ReassemblyKey, Context>,
}
impl Reassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Inserts one segment into the buffer for `key`, creating it if needed.
    pub fn insert_segment(
        &mut self,
        key: ReassemblyKey,
        kind: SegmentKind,
        seg_o: SegO,
        seg_n: SegN,
        data: &[u8],
    ) -> Result<ReassembleOutcome, ReassembleError> {
        let started = !self.contexts.contains_key(&key);
        let context = self
            .contexts
            .entry(key)
            .or_insert_with(|| Context::new(kind, seg_n));
        let inserted = context.insert(kind, seg_o, seg_n, data);
        if let Err(e) = inserted {
            if started {
                self.contexts.remove(&key);
            }
            return Err(e);
        }
        let block_ack = context.block_ack();
        match context.assemble() {
            Some(data) => {
                let seg_n = context.seg_n();
                self.contexts.remove(&key);
                Ok(ReassembleOutcome::Complete {
                    key,
                    kind,
                    seg_n,
                    block_ack,
                    data,
                })
            }
            None => Ok(ReassembleOutcome::Incomplete {
                key,
                block_ack,
                started,
            }),
        }
    }
    /// Inserts a segmented lower transport PDU received from `src`.
    pub fn insert(
        &mut self,
        src: UnicastAddress,
        pdu: &PDU,
    ) -> Result<ReassembleOutcome, ReassembleError> {
        let (kind, header, data): (SegmentKind, SegmentHeader, &[u8]) = match pdu {
            PDU::SegmentedAccess(p) => (
                SegmentKind::Access {
                    akf: p.akf,
                    aid: p.aid,
                    szmic: crate::lower::SZMIC(p.header.flag),
                },
                p.header,
                p.segment.as_slice(),
            ),
            PDU::SegmentedControl(p) => (
                SegmentKind::Control { opcode: p.opcode },
                p.header,
                p.segment.as_slice(),
            ),
            _ => return Err(ReassembleError::NotSegmented),
        };
        let key = ReassemblyKey {
            src,
            seq_zero: header.seq_zero,
        };
        self.insert_segment(key, kind, header.seg_o, header.seg_n, data)
    }
    #[must_use]
    pub fn get(&self, key: &ReassemblyKey) -> Option<&Context> {
        self.contexts.get(key)
    }
    #[must_use]
    pub fn contains(&self, key: &ReassemblyKey) -> bool {
        self.contexts.contains_key(key)
    }
    pub fn remove(&mut self, key: &ReassemblyKey) -> Option<Context> {
        self.contexts.remove(key)
    }
    /// Drops every buffer for `src`. Returns the dropped keys.
    pub fn remove_src(&mut self, src: UnicastAddress) -> Vec<ReassemblyKey> {
        let keys: Vec<ReassemblyKey> = self
            .contexts
            .keys()
            .filter(|k| k.src == src)
            .copied()
            .collect();
        for k in &keys {
            self.contexts.remove(k);
        }
        keys
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AID, AKF};
    use crate::lower::SZMIC;
    use crate::segmenter::Segmenter;
    use rand::seq::SliceRandom;

    fn key() -> ReassemblyKey {
        ReassemblyKey {
            src: UnicastAddress::new(0x0002),
            seq_zero: SeqZero::new(0x0010),
        }
    }

    #[test]
    fn test_out_of_order_control_reassembly() {
        let original: Vec<u8> = (0..30).collect();
        let kind = SegmentKind::Control { opcode: 0x0A };
        let mut r = Reassembler::new();
        let segments = [
            (3_u8, &original[24..30]),
            (0, &original[0..8]),
            (2, &original[16..24]),
            (1, &original[8..16]),
        ];
        for (i, (seg_o, data)) in segments.iter().enumerate() {
            let outcome = r
                .insert_segment(key(), kind, SegO::new(*seg_o), SegN::new(3), data)
                .unwrap();
            if i < 3 {
                assert!(matches!(outcome, ReassembleOutcome::Incomplete { .. }));
                assert!(r.contains(&key()));
            } else {
                match outcome {
                    ReassembleOutcome::Complete {
                        data, block_ack, ..
                    } => {
                        assert_eq!(data, original);
                        assert_eq!(block_ack, BlockAck(0b1111));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
        assert!(r.is_empty());
    }
    #[test]
    fn test_segment_length_depends_on_kind() {
        let control = SegmentKind::Control { opcode: 0x0A };
        let mut r = Reassembler::new();
        assert_eq!(
            r.insert_segment(key(), control, SegO::new(0), SegN::new(1), &[0; 9]),
            Err(ReassembleError::DataTooLong)
        );
        assert!(r.is_empty());
        r.insert_segment(key(), control, SegO::new(0), SegN::new(1), &[0; 8])
            .unwrap();

        let access = SegmentKind::Access {
            akf: AKF(false),
            aid: None,
            szmic: SZMIC(false),
        };
        let other = ReassemblyKey {
            src: UnicastAddress::new(0x0003),
            seq_zero: SeqZero::new(0x0010),
        };
        r.insert_segment(other, access, SegO::new(0), SegN::new(1), &[0; 12])
            .unwrap();
        assert_eq!(
            r.insert_segment(other, access, SegO::new(1), SegN::new(1), &[0; 13]),
            Err(ReassembleError::DataTooLong)
        );
        assert_eq!(r.len(), 2);
    }
    #[test]
    fn test_duplicate_and_mismatch() {
        let kind = SegmentKind::Control { opcode: 0x0A };
        let mut r = Reassembler::new();
        r.insert_segment(key(), kind, SegO::new(0), SegN::new(2), &[1; 8])
            .unwrap();
        assert_eq!(
            r.insert_segment(key(), kind, SegO::new(0), SegN::new(2), &[1; 8]),
            Err(ReassembleError::SegmentAlreadyInserted(SegO::new(0)))
        );
        assert_eq!(
            r.insert_segment(key(), kind, SegO::new(1), SegN::new(3), &[1; 8]),
            Err(ReassembleError::HeaderMismatch)
        );
        assert_eq!(r.get(&key()).unwrap().block_ack(), BlockAck(0b1));
        assert_eq!(r.remove_src(UnicastAddress::new(0x0002)), vec![key()]);
        assert!(r.is_empty());
    }
    #[test]
    fn test_segmentation_round_trip_any_order() {
        let kind = SegmentKind::Access {
            akf: AKF(true),
            aid: Some(AID::new(0x26)),
            szmic: SZMIC(true),
        };
        let mut rng = rand::thread_rng();
        for &len in &[16_usize, 24, 25, 100, 200, 379, 384] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let segmenter = Segmenter::new(kind, SeqZero::new(0x1FFF), payload.clone()).unwrap();
            let mut pdus: Vec<PDU> = segmenter.iter(BlockAck::default()).map(|(_, p)| p).collect();
            assert!(pdus.len() <= 32);
            pdus.shuffle(&mut rng);
            let mut r = Reassembler::new();
            let mut result = None;
            for pdu in &pdus {
                let pdu = PDU::from_bytes(&pdu.to_bytes().unwrap(), crate::mesh::CTL(false)).unwrap();
                if let ReassembleOutcome::Complete { data, .. } =
                    r.insert(UnicastAddress::new(1), &pdu).unwrap()
                {
                    assert!(result.is_none());
                    result = Some(data);
                }
            }
            assert_eq!(result, Some(payload));
            assert!(r.is_empty());
        }
    }
}
