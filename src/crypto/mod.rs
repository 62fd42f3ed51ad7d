//! Crypto functions (AES-CCM, AES-CMAC, k-functions) that the Mesh uses.
//! AES is used in the `crypto::k_funcs` and in network/upper transport layer encryption.
use crate::crypto::key::{Key, NetKey};
use core::convert::TryFrom;
use core::fmt::{Display, Error, Formatter};

pub mod aes;
pub mod k_funcs;
pub mod key;
pub mod materials;
pub mod nonce;

pub use k_funcs::{k1, k2, k3, k4, s1};

/// Helper function to convert a 16 byte (32 character) hex string to 16 byte array.
/// Returns `None` if `hex.len() != 32` or if `hex` contains non-hex characters.
#[must_use]
pub fn hex_16_to_array(hex: &str) -> Option<[u8; 16]> {
    if hex.len() != 32 {
        None
    } else {
        let mut out = [0_u8; 16];
        for (pos, c) in hex.chars().enumerate() {
            let value = u8::try_from(c.to_digit(16)?).ok()?;
            let byte_pos = pos / 2;
            if pos % 2 == 1 {
                out[byte_pos] |= value;
            } else {
                out[byte_pos] |= value << 4;
            }
        }
        Some(out)
    }
}

/// Decodes an even length hex string of any size.
#[must_use]
pub fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 == 1 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Message Integrity Check. 32 or 64 bits, always big endian on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum MIC {
    Big(u64),
    Small(u32),
}
const BIG_MIC_SIZE: usize = 8;
const SMALL_MIC_SIZE: usize = 4;
impl MIC {
    #[must_use]
    pub fn try_from_bytes_be(bytes: &[u8]) -> Option<MIC> {
        match bytes.len() {
            SMALL_MIC_SIZE => Some(MIC::Small(u32::from_be_bytes(
                <[u8; 4]>::try_from(bytes).ok()?,
            ))),
            BIG_MIC_SIZE => Some(MIC::Big(u64::from_be_bytes(
                <[u8; 8]>::try_from(bytes).ok()?,
            ))),
            _ => None,
        }
    }
    #[must_use]
    pub fn mic(&self) -> u64 {
        match self {
            MIC::Big(b) => *b,
            MIC::Small(s) => u64::from(*s),
        }
    }
    #[must_use]
    pub fn is_big(&self) -> bool {
        matches!(self, MIC::Big(_))
    }
    /// Return the size in bytes (4 or 8) needed to represent the MIC.
    /// ```
    /// use mesh_transport::crypto::MIC;
    /// assert_eq!(MIC::Big(0u64).byte_size(), 8);
    /// assert_eq!(MIC::Small(0u32).byte_size(), 4);
    /// ```
    #[must_use]
    pub fn byte_size(&self) -> usize {
        if self.is_big() {
            BIG_MIC_SIZE
        } else {
            SMALL_MIC_SIZE
        }
    }
    /// Appends the big endian MIC bytes to `out`.
    pub fn extend_be(&self, out: &mut Vec<u8>) {
        match self {
            MIC::Big(b) => out.extend_from_slice(&b.to_be_bytes()),
            MIC::Small(s) => out.extend_from_slice(&s.to_be_bytes()),
        }
    }
    #[must_use]
    pub const fn small_size() -> usize {
        SMALL_MIC_SIZE
    }
    #[must_use]
    pub const fn big_size() -> usize {
        BIG_MIC_SIZE
    }
}
impl Display for MIC {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            MIC::Big(b) => write!(f, "Big({:#018x})", b),
            MIC::Small(s) => write!(f, "Small({:#010x})", s),
        }
    }
}

/// 6 bit Application Key ID
#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct AID(u8);
const AID_MAX: u8 = (1 << 6) - 1;

impl AID {
    /// Creates a new 6 bit `AID`
    /// # Panics
    /// Panics if `aid > AID_MAX` (63)
    #[must_use]
    pub fn new(aid: u8) -> AID {
        assert!(aid <= AID_MAX, "AID {} is bigger than 6 bits", aid);
        AID(aid)
    }
    #[must_use]
    pub const fn new_masked(aid: u8) -> AID {
        AID(aid & AID_MAX)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}
impl Display for AID {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "AID({:#04x})", self.0)
    }
}
/// Application Key Flag. `false` means the upper transport PDU is secured with a device key.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
pub struct AKF(pub bool);
impl From<bool> for AKF {
    fn from(b: bool) -> Self {
        AKF(b)
    }
}
impl From<AKF> for bool {
    fn from(a: AKF) -> Self {
        a.0
    }
}
const SALT_LEN: usize = 16;
#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    #[must_use]
    pub fn new(salt: [u8; SALT_LEN]) -> Salt {
        Salt(salt)
    }
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Salt> {
        Some(Salt::new(hex_16_to_array(hex)?))
    }
    #[must_use]
    pub fn as_key(&self) -> Key {
        Key::new(self.0)
    }
}
impl AsRef<[u8]> for Salt {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
/// 64-bit Network ID derived from the NetKey with `k3`. Used by beacons and node identity.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
pub struct NetworkID(pub u64);
impl From<&NetKey> for NetworkID {
    fn from(k: &NetKey) -> Self {
        NetworkID(k3(k.key()))
    }
}
