//! Network Layer. Everything here is big endian.
//!
//! | IVI(1) NID(7) | obfuscated CTL/TTL, SEQ(3), SRC(2) | encrypted DST(2), TransportPDU | NetMIC (4/8) |
use crate::address::{Address, UnicastAddress};
use crate::crypto::aes::{self, AESCipher, MicSize};
use crate::crypto::materials::NetworkKeys;
use crate::crypto::nonce::{NetworkNonceParts, Nonce, ProxyNonceParts};
use crate::mesh::{IVIndex, SequenceNumber, CTL, IVI, NID, TTL};
use core::convert::TryFrom;
use core::fmt::{Display, Formatter};

pub const OBFUSCATED_LEN: usize = 6;
pub const PRIVACY_RANDOM_LEN: usize = 7;
/// Max lower transport PDU length for access (CTL=0) messages.
pub const MAX_ACCESS_TRANSPORT_LEN: usize = 16;
/// Max lower transport PDU length for control (CTL=1) messages.
pub const MAX_CONTROL_TRANSPORT_LEN: usize = 12;
const MIN_PDU_LEN: usize = 1 + OBFUSCATED_LEN + 2 + 1 + 4;

/// Framing the bearer has to put around the bytes.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum PduType {
    Network,
    ProxyConfiguration,
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum NetworkError {
    TooShort,
    TransportTooLong(usize),
    NIDMismatch,
    /// No IV Index matches the PDU's IVI.
    IVIndexMismatch,
    InvalidSrc(u16),
    InvalidDst(u16),
    Authentication(aes::Error),
}
impl From<aes::Error> for NetworkError {
    fn from(e: aes::Error) -> Self {
        NetworkError::Authentication(e)
    }
}
impl Display for NetworkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            NetworkError::TooShort => f.write_str("network PDU too short"),
            NetworkError::TransportTooLong(l) => write!(f, "transport PDU too long ({})", l),
            NetworkError::NIDMismatch => f.write_str("NID mismatch"),
            NetworkError::IVIndexMismatch => f.write_str("no matching IV Index"),
            NetworkError::InvalidSrc(a) => write!(f, "invalid src {:#06x}", a),
            NetworkError::InvalidDst(a) => write!(f, "invalid dst {:#06x}", a),
            NetworkError::Authentication(e) => write!(f, "network {}", e),
        }
    }
}
impl std::error::Error for NetworkError {}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct Header {
    pub ivi: IVI,
    pub nid: NID,
    pub ctl: CTL,
    pub ttl: TTL,
    pub seq: SequenceNumber,
    pub src: UnicastAddress,
    pub dst: Address,
}
impl Header {
    #[must_use]
    pub fn mic_size(&self) -> MicSize {
        if self.ctl.0 {
            MicSize::Big
        } else {
            MicSize::Small
        }
    }
    fn nonce(&self, pdu_type: PduType, iv_index: IVIndex) -> Nonce {
        match pdu_type {
            PduType::Network => NetworkNonceParts {
                ctl: self.ctl,
                ttl: self.ttl,
                seq: self.seq,
                src: self.src,
                iv_index,
            }
            .to_nonce(),
            PduType::ProxyConfiguration => ProxyNonceParts {
                seq: self.seq,
                src: self.src,
                iv_index,
            }
            .to_nonce(),
        }
    }
    fn private_bytes(&self) -> [u8; OBFUSCATED_LEN] {
        let seq = self.seq.to_bytes_be();
        let src = self.src.to_bytes_be();
        [
            self.ttl.with_flag(self.ctl.0),
            seq[0],
            seq[1],
            seq[2],
            src[0],
            src[1],
        ]
    }
}

/// `PECB = e(PrivacyKey, 0x0000000000 || IV Index || Privacy Random)`.
fn pecb(keys: &NetworkKeys, iv_index: IVIndex, privacy_random: &[u8]) -> [u8; 16] {
    let mut block = [0_u8; 16];
    block[5..9].copy_from_slice(&iv_index.to_bytes_be());
    block[9..16].copy_from_slice(&privacy_random[..PRIVACY_RANDOM_LEN]);
    AESCipher::new(*keys.privacy_key().key()).ecb_encrypt_block(block)
}

/// A decrypted network PDU.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct NetworkPDU {
    pub header: Header,
    pub transport_pdu: Vec<u8>,
}
impl NetworkPDU {
    /// Encrypts and obfuscates into the bytes handed to the bearer.
    pub fn encrypt(
        &self,
        keys: &NetworkKeys,
        iv_index: IVIndex,
        pdu_type: PduType,
    ) -> Result<Vec<u8>, NetworkError> {
        let max = if self.header.ctl.0 {
            MAX_CONTROL_TRANSPORT_LEN
        } else {
            MAX_ACCESS_TRANSPORT_LEN
        };
        if self.transport_pdu.is_empty() || self.transport_pdu.len() > max {
            return Err(NetworkError::TransportTooLong(self.transport_pdu.len()));
        }
        let mut encrypted = Vec::with_capacity(2 + self.transport_pdu.len() + 8);
        encrypted.extend_from_slice(&self.header.dst.to_bytes_be());
        encrypted.extend_from_slice(&self.transport_pdu);
        let mic = AESCipher::new(*keys.encryption_key().key()).ccm_encrypt(
            &self.header.nonce(pdu_type, iv_index),
            b"",
            &mut encrypted[..],
            self.header.mic_size(),
        )?;
        mic.extend_be(&mut encrypted);

        let pecb = pecb(keys, iv_index, &encrypted[..PRIVACY_RANDOM_LEN]);
        let mut out = Vec::with_capacity(1 + OBFUSCATED_LEN + encrypted.len());
        out.push(keys.nid().with_flag(iv_index.ivi().0));
        out.extend(
            self.header
                .private_bytes()
                .iter()
                .zip(pecb.iter())
                .map(|(b, p)| b ^ p),
        );
        out.extend_from_slice(&encrypted);
        Ok(out)
    }
    /// Deobfuscates and decrypts `bytes`. `iv_index` is the current IV Index; the PDU's IVI picks
    /// it or the one before it.
    pub fn decrypt(
        bytes: &[u8],
        keys: &NetworkKeys,
        iv_index: IVIndex,
        pdu_type: PduType,
    ) -> Result<NetworkPDU, NetworkError> {
        if bytes.len() < MIN_PDU_LEN {
            return Err(NetworkError::TooShort);
        }
        let (nid, ivi) = NID::new_with_flag(bytes[0]);
        if nid != keys.nid() {
            return Err(NetworkError::NIDMismatch);
        }
        let iv_index = iv_index
            .matching_ivi(IVI(ivi))
            .ok_or(NetworkError::IVIndexMismatch)?;
        let encrypted = &bytes[1 + OBFUSCATED_LEN..];
        let pecb = pecb(keys, iv_index, &encrypted[..PRIVACY_RANDOM_LEN]);
        let mut private = [0_u8; OBFUSCATED_LEN];
        for (i, b) in private.iter_mut().enumerate() {
            *b = bytes[1 + i] ^ pecb[i];
        }
        let (ttl, ctl) = TTL::new_with_flag(private[0]);
        let seq = SequenceNumber::from_bytes_be(&private[1..4]).ok_or(NetworkError::TooShort)?;
        let src_value = u16::from_be_bytes([private[4], private[5]]);
        let src =
            UnicastAddress::try_from(src_value).map_err(|_| NetworkError::InvalidSrc(src_value))?;
        let mut header = Header {
            ivi: IVI(ivi),
            nid,
            ctl: CTL(ctl),
            ttl,
            seq,
            src,
            dst: Address::Unassigned,
        };
        let mic_len = header.mic_size().byte_size();
        if encrypted.len() < 2 + 1 + mic_len {
            return Err(NetworkError::TooShort);
        }
        let (payload, mic) = encrypted.split_at(encrypted.len() - mic_len);
        let mut payload = payload.to_vec();
        AESCipher::new(*keys.encryption_key().key()).ccm_decrypt(
            &header.nonce(pdu_type, iv_index),
            b"",
            &mut payload[..],
            mic,
        )?;
        header.dst = Address::from_bytes_be([payload[0], payload[1]]);
        match (pdu_type, header.dst) {
            (PduType::Network, Address::Unassigned) => {
                return Err(NetworkError::InvalidDst(0));
            }
            (PduType::ProxyConfiguration, dst) if dst != Address::Unassigned => {
                return Err(NetworkError::InvalidDst(dst.value()));
            }
            _ => (),
        }
        Ok(NetworkPDU {
            header,
            transport_pdu: payload[2..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hex_to_bytes;
    use crate::crypto::key::NetKey;

    fn sample_keys() -> NetworkKeys {
        NetKey::from_hex("7dd7364cd842ad18c17c2b820c84c3d6")
            .unwrap()
            .network_keys()
    }
    /// Mesh Profile sample data, message #1.
    fn message_1() -> NetworkPDU {
        NetworkPDU {
            header: Header {
                ivi: IVI(false),
                nid: NID::new(0x68),
                ctl: CTL(true),
                ttl: TTL::new(0),
                seq: SequenceNumber::new(1),
                src: UnicastAddress::new(0x1201),
                dst: Address::from(0xfffd),
            },
            transport_pdu: hex_to_bytes("034b50057e400000010000").unwrap(),
        }
    }

    #[test]
    fn test_message_1_encrypt() {
        let bytes = message_1()
            .encrypt(&sample_keys(), IVIndex(0x1234_5678), PduType::Network)
            .unwrap();
        assert_eq!(
            bytes,
            hex_to_bytes("68eca487516765b5e5bfdacbaf6cb7fb6bff871f035444ce83a670df").unwrap()
        );
    }
    #[test]
    fn test_message_1_decrypt() {
        let bytes =
            hex_to_bytes("68eca487516765b5e5bfdacbaf6cb7fb6bff871f035444ce83a670df").unwrap();
        let pdu = NetworkPDU::decrypt(
            &bytes,
            &sample_keys(),
            IVIndex(0x1234_5678),
            PduType::Network,
        )
        .unwrap();
        assert_eq!(pdu, message_1());
    }
    #[test]
    fn test_tampered_pdu_fails() {
        let mut bytes =
            hex_to_bytes("68eca487516765b5e5bfdacbaf6cb7fb6bff871f035444ce83a670df").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(
            NetworkPDU::decrypt(
                &bytes,
                &sample_keys(),
                IVIndex(0x1234_5678),
                PduType::Network
            ),
            Err(NetworkError::Authentication(aes::Error::AuthenticationFailure))
        );
        bytes[0] = 0x01;
        assert_eq!(
            NetworkPDU::decrypt(
                &bytes,
                &sample_keys(),
                IVIndex(0x1234_5678),
                PduType::Network
            ),
            Err(NetworkError::NIDMismatch)
        );
    }
    #[test]
    fn test_proxy_configuration_round_trip() {
        let pdu = NetworkPDU {
            header: Header {
                ivi: IVI(false),
                nid: NID::new(0x68),
                ctl: CTL(true),
                ttl: TTL::PROXY_CONFIGURATION,
                seq: SequenceNumber::new(0x10),
                src: UnicastAddress::new(0x0001),
                dst: Address::Unassigned,
            },
            transport_pdu: vec![0x00, 0x00],
        };
        let bytes = pdu
            .encrypt(&sample_keys(), IVIndex(0x1234_5678), PduType::ProxyConfiguration)
            .unwrap();
        let decoded = NetworkPDU::decrypt(
            &bytes,
            &sample_keys(),
            IVIndex(0x1234_5678),
            PduType::ProxyConfiguration,
        )
        .unwrap();
        assert_eq!(decoded, pdu);
        assert!(NetworkPDU::decrypt(
            &bytes,
            &sample_keys(),
            IVIndex(0x1234_5678),
            PduType::Network
        )
        .is_err());
    }
}
