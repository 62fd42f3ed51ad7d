//! A module for crypto AES functions. Essentially a wrapper around the 3rd party RustCrypto crates
//! (`aes`, `ccm`, `cmac`). This lets the rest of the library code to not have a hard dependence
//! on any 3rd party libs. Bluetooth Mesh uses 128-bit exclusively as its Key bit size.
use crate::crypto::key::Key;
use crate::crypto::nonce::Nonce;
use crate::crypto::{Salt, MIC};
use aead::consts::{U13, U4, U8};
use aead::generic_array::GenericArray;
use aead::{AeadInPlace, KeyInit};
use aes::cipher::BlockEncrypt;
use aes::Aes128;
use ccm::Ccm;
use cmac::{Cmac, Mac};
use core::fmt::{Display, Formatter};

pub const AES_BLOCK_LEN: usize = 16;
pub type AesBlock = [u8; AES_BLOCK_LEN];

type AesCcmBigMic = Ccm<Aes128, U8, U13>;
type AesCcmSmallMic = Ccm<Aes128, U4, U13>;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Error {
    /// The MIC didn't verify. Wrong key, nonce or tampered payload.
    AuthenticationFailure,
    /// MIC wasn't 4 or 8 bytes.
    InvalidMicSize,
}
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::AuthenticationFailure => f.write_str("MIC authentication failure"),
            Error::InvalidMicSize => f.write_str("MIC must be 4 or 8 bytes"),
        }
    }
}
impl std::error::Error for Error {}

#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Debug, Hash)]
pub enum MicSize {
    Big,
    Small,
}
impl MicSize {
    #[must_use]
    pub fn byte_size(self) -> usize {
        match self {
            MicSize::Big => MIC::big_size(),
            MicSize::Small => MIC::small_size(),
        }
    }
    #[must_use]
    pub fn is_big(self) -> bool {
        self == MicSize::Big
    }
    #[must_use]
    pub fn from_byte_size(size: usize) -> Option<MicSize> {
        match size {
            4 => Some(MicSize::Small),
            8 => Some(MicSize::Big),
            _ => None,
        }
    }
}

pub struct AESCipher(Key);
impl AESCipher {
    #[must_use]
    pub fn new(key: Key) -> AESCipher {
        AESCipher(key)
    }
    fn key_array(&self) -> &GenericArray<u8, aead::consts::U16> {
        GenericArray::from_slice(self.0.as_ref())
    }
    /// Encrypt a single 16 byte block (AES-ECB). Used for network header obfuscation.
    #[must_use]
    pub fn ecb_encrypt_block(&self, block: AesBlock) -> AesBlock {
        let cipher = Aes128::new(self.key_array());
        let mut b = GenericArray::clone_from_slice(&block[..]);
        cipher.encrypt_block(&mut b);
        let mut out = [0_u8; AES_BLOCK_LEN];
        out.copy_from_slice(b.as_slice());
        out
    }
    #[must_use]
    pub fn cmac(&self, m: &[u8]) -> Key {
        self.cmac_slice(&[m])
    }
    #[must_use]
    pub fn cmac_slice(&self, ms: &[&[u8]]) -> Key {
        let mut mac = <Cmac<Aes128> as Mac>::new(self.key_array());
        for m in ms {
            mac.update(m);
        }
        let code = mac.finalize().into_bytes();
        let mut out = [0_u8; AES_BLOCK_LEN];
        out.copy_from_slice(code.as_slice());
        Key::new(out)
    }
    /// AES-CCM encrypts `payload` in place and returns the detached MIC.
    pub fn ccm_encrypt(
        &self,
        nonce: &Nonce,
        associated_data: &[u8],
        payload: &mut [u8],
        mic_size: MicSize,
    ) -> Result<MIC, Error> {
        let nonce = GenericArray::from_slice(nonce.as_ref());
        let mic = match mic_size {
            MicSize::Big => {
                let tag = <AesCcmBigMic as KeyInit>::new(self.key_array())
                    .encrypt_in_place_detached(nonce, associated_data, payload)
                    .map_err(|_| Error::AuthenticationFailure)?;
                MIC::try_from_bytes_be(tag.as_slice())
            }
            MicSize::Small => {
                let tag = <AesCcmSmallMic as KeyInit>::new(self.key_array())
                    .encrypt_in_place_detached(nonce, associated_data, payload)
                    .map_err(|_| Error::AuthenticationFailure)?;
                MIC::try_from_bytes_be(tag.as_slice())
            }
        };
        mic.ok_or(Error::InvalidMicSize)
    }
    /// AES CCM decryption of the payload in place. To supply no associated data, pass it an empty
    /// slice (such as `b""`). The contents of `payload` are unspecified on error.
    pub fn ccm_decrypt(
        &self,
        nonce: &Nonce,
        associated_data: &[u8],
        payload: &mut [u8],
        mic: &[u8],
    ) -> Result<(), Error> {
        let nonce = GenericArray::from_slice(nonce.as_ref());
        match MicSize::from_byte_size(mic.len()).ok_or(Error::InvalidMicSize)? {
            MicSize::Big => <AesCcmBigMic as KeyInit>::new(self.key_array())
                .decrypt_in_place_detached(
                    nonce,
                    associated_data,
                    payload,
                    GenericArray::from_slice(mic),
                )
                .map_err(|_| Error::AuthenticationFailure),
            MicSize::Small => <AesCcmSmallMic as KeyInit>::new(self.key_array())
                .decrypt_in_place_detached(
                    nonce,
                    associated_data,
                    payload,
                    GenericArray::from_slice(mic),
                )
                .map_err(|_| Error::AuthenticationFailure),
        }
    }
}

impl From<Key> for AESCipher {
    fn from(k: Key) -> Self {
        Self::new(k)
    }
}
impl From<Salt> for AESCipher {
    fn from(s: Salt) -> Self {
        s.as_key().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::nonce::Nonce;

    fn nonce() -> Nonce {
        Nonce::new([
            0x01, 0x00, 0x00, 0x00, 0x07, 0x12, 0x01, 0xff, 0xff, 0x12, 0x34, 0x56, 0x78,
        ])
    }

    #[test]
    fn test_ccm_round_trip() {
        let cipher = AESCipher::new(Key::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap());
        let plain = *b"hello mesh";
        let mut buf = plain;
        let mic = cipher
            .ccm_encrypt(&nonce(), b"", &mut buf, MicSize::Small)
            .unwrap();
        assert_ne!(buf, plain);
        let mut mic_bytes = Vec::new();
        mic.extend_be(&mut mic_bytes);
        cipher
            .ccm_decrypt(&nonce(), b"", &mut buf, &mic_bytes)
            .unwrap();
        assert_eq!(buf, plain);
    }
    #[test]
    fn test_ccm_wrong_mic_size() {
        let cipher = AESCipher::new(Key::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap());
        let mut buf = [0_u8; 4];
        assert_eq!(
            cipher.ccm_decrypt(&nonce(), b"", &mut buf, &[0, 0, 0]),
            Err(Error::InvalidMicSize)
        );
    }
    #[test]
    fn test_ccm_wrong_key() {
        let cipher = AESCipher::new(Key::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap());
        let wrong = AESCipher::new(Key::from_hex("3216d1509884b533248541792b877f98").unwrap());
        let mut buf = *b"0123456789abcdef0123";
        let mic = cipher
            .ccm_encrypt(&nonce(), b"", &mut buf, MicSize::Big)
            .unwrap();
        let mut mic_bytes = Vec::new();
        mic.extend_be(&mut mic_bytes);
        assert_eq!(
            wrong.ccm_decrypt(&nonce(), b"", &mut buf, &mic_bytes),
            Err(Error::AuthenticationFailure)
        );
    }
}
