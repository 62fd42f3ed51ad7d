//! 13 byte AES-CCM nonces. Every nonce shares the layout
//! `[type][flags][SEQ(3)][SRC(2)][DST or 0x0000 (2)][IVIndex(4)]`, all big endian.
use crate::address::{Address, UnicastAddress};
use crate::mesh::{IVIndex, SequenceNumber, CTL, TTL};

pub const NONCE_LEN: usize = 13;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
pub struct Nonce([u8; NONCE_LEN]);
impl Nonce {
    #[must_use]
    pub fn new(bytes: [u8; NONCE_LEN]) -> Nonce {
        Nonce(bytes)
    }
    #[must_use]
    pub fn nonce_type(&self) -> u8 {
        self.0[0]
    }
    fn build(
        nonce_type: NonceType,
        flags: u8,
        seq: SequenceNumber,
        src: UnicastAddress,
        dst: u16,
        iv_index: IVIndex,
    ) -> Nonce {
        let seq = seq.to_bytes_be();
        let src = src.to_bytes_be();
        let dst = dst.to_be_bytes();
        let iv = iv_index.to_bytes_be();
        Nonce([
            nonce_type.as_u8(),
            flags,
            seq[0],
            seq[1],
            seq[2],
            src[0],
            src[1],
            dst[0],
            dst[1],
            iv[0],
            iv[1],
            iv[2],
            iv[3],
        ])
    }
}
impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}
/// Nonce Types
/// 0x04--0xFF RFU
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum NonceType {
    Network = 0x00,
    Application = 0x01,
    Device = 0x02,
    Proxy = 0x03,
}
impl NonceType {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct NetworkNonceParts {
    pub ctl: CTL,
    pub ttl: TTL,
    pub seq: SequenceNumber,
    pub src: UnicastAddress,
    pub iv_index: IVIndex,
}
impl NetworkNonceParts {
    #[must_use]
    pub fn to_nonce(&self) -> Nonce {
        Nonce::build(
            NonceType::Network,
            self.ttl.with_flag(self.ctl.0),
            self.seq,
            self.src,
            0,
            self.iv_index,
        )
    }
}

/// Parts shared by the application and device nonces. They only differ by nonce type.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct UpperNonceParts {
    pub aszmic: bool,
    pub seq: SequenceNumber,
    pub src: UnicastAddress,
    pub dst: Address,
    pub iv_index: IVIndex,
}
impl UpperNonceParts {
    fn to_nonce(&self, nonce_type: NonceType) -> Nonce {
        Nonce::build(
            nonce_type,
            (self.aszmic as u8) << 7,
            self.seq,
            self.src,
            self.dst.value(),
            self.iv_index,
        )
    }
    #[must_use]
    pub fn app_nonce(&self) -> Nonce {
        self.to_nonce(NonceType::Application)
    }
    #[must_use]
    pub fn device_nonce(&self) -> Nonce {
        self.to_nonce(NonceType::Device)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ProxyNonceParts {
    pub seq: SequenceNumber,
    pub src: UnicastAddress,
    pub iv_index: IVIndex,
}
impl ProxyNonceParts {
    #[must_use]
    pub fn to_nonce(&self) -> Nonce {
        Nonce::build(NonceType::Proxy, 0x00, self.seq, self.src, 0, self.iv_index)
    }
}
