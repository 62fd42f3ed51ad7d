//! Common Mesh scalar types shared by every layer (`TTL`, `NID`, `IVIndex`, `SequenceNumber`, ...).
use core::convert::TryFrom;
use core::fmt::{Display, Error, Formatter};
#[cfg(feature = "serde-1")]
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct IVI(pub bool);
impl From<IVI> for bool {
    #[must_use]
    fn from(i: IVI) -> Self {
        i.0
    }
}
impl From<bool> for IVI {
    #[must_use]
    fn from(b: bool) -> Self {
        IVI(b)
    }
}
/// Network Control flag. `true` for transport control PDUs (and proxy configuration).
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct CTL(pub bool);
impl From<CTL> for bool {
    #[must_use]
    fn from(c: CTL) -> Self {
        c.0
    }
}
impl From<bool> for CTL {
    #[must_use]
    fn from(b: bool) -> Self {
        CTL(b)
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct TTL(u8);

const TTL_MASK: u8 = 127;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct TTLOutOfRange(pub u8);

impl TTL {
    /// Proxy configuration messages are never relayed.
    pub const PROXY_CONFIGURATION: TTL = TTL(0);
    pub const DEFAULT: TTL = TTL(8);
    pub const MAX: TTL = TTL(TTL_MASK);
    /// # Panics
    /// Panics if `v > 127`. Use `TTL::try_from` for untrusted input.
    #[must_use]
    pub fn new(v: u8) -> TTL {
        assert!(
            v <= TTL_MASK,
            "TTL {} is bigger than max TTL {}",
            v,
            TTL_MASK
        );
        TTL(v)
    }
    /// Returns u8 with 7 lower bits being TTL and the 1 highest bit being a flag
    #[must_use]
    pub const fn with_flag(self, flag: bool) -> u8 {
        self.0 | ((flag as u8) << 7)
    }
    /// returns 7 bit TTL + 1 bit bool flag from 8bit uint.
    #[must_use]
    pub const fn new_with_flag(v: u8) -> (TTL, bool) {
        (TTL(v & TTL_MASK), v & !TTL_MASK != 0)
    }
    #[must_use]
    pub const fn from_masked_u8(v: u8) -> TTL {
        TTL(v & TTL_MASK)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
    #[must_use]
    pub fn should_relay(self) -> bool {
        matches!(self.0, 2..=127)
    }
}
impl Default for TTL {
    fn default() -> Self {
        TTL::DEFAULT
    }
}
impl TryFrom<u8> for TTL {
    type Error = TTLOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= TTL_MASK {
            Ok(TTL(value))
        } else {
            Err(TTLOutOfRange(value))
        }
    }
}
impl Display for TTL {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "TTL({})", self.0)
    }
}
/// 7-bit `NID` (different than `NetworkID`!!)
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct NID(u8);

impl Display for NID {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "NID({:#04x})", self.0)
    }
}
const NID_MASK: u8 = 127;

impl NID {
    #[must_use]
    pub fn new(v: u8) -> NID {
        assert!(
            v <= NID_MASK,
            "NID {} is bigger than max NID {}",
            v,
            NID_MASK
        );
        NID(v)
    }
    #[must_use]
    pub const fn with_flag(self, flag: bool) -> u8 {
        self.0 | ((flag as u8) << 7)
    }
    #[must_use]
    pub const fn from_masked_u8(v: u8) -> NID {
        NID(v & NID_MASK)
    }
    #[must_use]
    pub const fn new_with_flag(v: u8) -> (NID, bool) {
        (NID(v & NID_MASK), v & 0x80 != 0)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

#[derive(Default, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
/// 24-bit Unsigned Integer. Backing type for `SequenceNumber`.
pub struct U24(u32);
pub const U24_MAX: u32 = (1_u32 << 24) - 1;
impl Display for U24 {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "U24({})", self.0)
    }
}
impl U24 {
    #[must_use]
    pub fn new(v: u32) -> U24 {
        if v > U24_MAX {
            panic!("number {} is bigger than max U24 {}", v, U24_MAX);
        } else {
            U24(v)
        }
    }
    /// Creates a U24 by masking the 4th byte of 'v'
    #[must_use]
    pub const fn new_masked(v: u32) -> U24 {
        U24(v & U24_MAX)
    }
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
    #[must_use]
    pub fn to_bytes_be(self) -> [u8; 3] {
        let b = self.0.to_be_bytes();
        [b[1], b[2], b[3]]
    }
    #[must_use]
    pub fn from_bytes_be(bytes: &[u8]) -> Option<U24> {
        if bytes.len() == 3 {
            Some(U24(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])))
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Eq, Ord, PartialOrd, PartialEq, Debug, Default, Hash)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct IVIndex(pub u32);
impl IVIndex {
    #[must_use]
    pub fn ivi(self) -> IVI {
        IVI(self.0 & 1 == 1)
    }
    /// Returns the IV Index an incoming PDU with `ivi` was sent under. Either the current index
    /// or the one before it (during an IV Update).
    #[must_use]
    pub fn matching_ivi(self, ivi: IVI) -> Option<IVIndex> {
        if self.ivi() == ivi {
            Some(self)
        } else if self.0 == 0 {
            None
        } else {
            Some(IVIndex(self.0 - 1))
        }
    }
    #[must_use]
    pub fn to_bytes_be(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl Display for IVIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "IVIndex({})", self.0)
    }
}

/// 24bit Sequence number
#[derive(Copy, Clone, Eq, Ord, PartialOrd, PartialEq, Debug, Default, Hash)]
pub struct SequenceNumber(pub U24);
impl SequenceNumber {
    #[must_use]
    pub fn new(v: u32) -> SequenceNumber {
        SequenceNumber(U24::new(v))
    }
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0.value()
    }
    /// Next sequence number or `None` if the 24-bit space is exhausted.
    #[must_use]
    pub fn next(self) -> Option<SequenceNumber> {
        let v = self.value() + 1;
        if v > U24_MAX {
            None
        } else {
            Some(SequenceNumber(U24(v)))
        }
    }
    #[must_use]
    pub fn to_bytes_be(self) -> [u8; 3] {
        self.0.to_bytes_be()
    }
    #[must_use]
    pub fn from_bytes_be(bytes: &[u8]) -> Option<SequenceNumber> {
        Some(SequenceNumber(U24::from_bytes_be(bytes)?))
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "SequenceNumber({})", self.value())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct CompanyID(pub u16);
impl CompanyID {
    #[must_use]
    pub fn to_bytes_le(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}
impl Display for CompanyID {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "CompanyID({:#06x})", self.0)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct ModelID(pub u16);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct NetKeyIndex(pub u16);
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default)]
#[cfg_attr(feature = "serde-1", derive(Serialize, Deserialize))]
pub struct AppKeyIndex(pub u16);

/// Key indexes are 12 bits on the wire.
pub const KEY_INDEX_MAX: u16 = 0x0FFF;

/// Packs a NetKeyIndex and AppKeyIndex into the 3 octet little-endian form used by Config
/// AppKey messages.
#[must_use]
pub fn pack_key_indexes(net: NetKeyIndex, app: AppKeyIndex) -> [u8; 3] {
    let v = u32::from(net.0 & KEY_INDEX_MAX) | (u32::from(app.0 & KEY_INDEX_MAX) << 12);
    let b = v.to_le_bytes();
    [b[0], b[1], b[2]]
}
#[must_use]
pub fn unpack_key_indexes(bytes: [u8; 3]) -> (NetKeyIndex, AppKeyIndex) {
    let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    (
        NetKeyIndex((v & 0xFFF) as u16),
        AppKeyIndex(((v >> 12) & 0xFFF) as u16),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl() {
        assert!(!TTL::new(0).should_relay());
        assert!(!TTL::new(1).should_relay());
        assert!(TTL::new(2).should_relay());
        assert!(TTL::new(127).should_relay());
        assert_eq!(TTL::try_from(128), Err(TTLOutOfRange(128)));
        assert_eq!(TTL::new_with_flag(0x85), (TTL::new(5), true));
    }
    #[test]
    #[should_panic]
    fn test_ttl_out_of_range() {
        let _ = TTL::new(128);
    }
    #[test]
    fn test_seq_bytes() {
        let seq = SequenceNumber::new(0x07080B);
        assert_eq!(seq.to_bytes_be(), [0x07, 0x08, 0x0B]);
        assert_eq!(SequenceNumber::from_bytes_be(&[0x07, 0x08, 0x0B]), Some(seq));
        assert_eq!(SequenceNumber::new(U24_MAX).next(), None);
    }
    #[test]
    fn test_key_index_packing() {
        let packed = pack_key_indexes(NetKeyIndex(0x456), AppKeyIndex(0x123));
        assert_eq!(packed, [0x56, 0x34, 0x12]);
        assert_eq!(
            unpack_key_indexes(packed),
            (NetKeyIndex(0x456), AppKeyIndex(0x123))
        );
    }
    #[test]
    fn test_matching_ivi() {
        let iv = IVIndex(0x1234_5678);
        assert_eq!(iv.matching_ivi(IVI(false)), Some(iv));
        assert_eq!(iv.matching_ivi(IVI(true)), Some(IVIndex(0x1234_5677)));
        assert_eq!(IVIndex(0).matching_ivi(IVI(true)), None);
    }
}
