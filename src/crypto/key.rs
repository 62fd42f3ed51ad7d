//! Crypto Keys uses for Mesh Security.
use crate::crypto::k_funcs::{k2, k4};
use crate::crypto::materials::NetworkKeys;
use crate::crypto::{hex_16_to_array, NetworkID, Salt, AID, AKF};
use core::convert::{TryFrom, TryInto};
use core::fmt::{Error, Formatter, LowerHex, UpperHex};
use core::str::FromStr;

pub const KEY_LEN: usize = 16;

/// 128-bit AES Key.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
pub struct Key([u8; KEY_LEN]);
pub const ZERO_KEY: Key = Key([0_u8; KEY_LEN]);

impl Key {
    #[must_use]
    pub fn new(key_bytes: [u8; KEY_LEN]) -> Key {
        Key(key_bytes)
    }
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Key> {
        Some(Key::new(hex_16_to_array(hex)?))
    }
    #[must_use]
    pub fn as_salt(&self) -> Salt {
        Salt::new(self.0)
    }
    #[must_use]
    pub fn random() -> Key {
        Key(rand::random())
    }
}
impl TryFrom<&[u8]> for Key {
    type Error = core::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Key::new(value.try_into()?))
    }
}

impl AsRef<[u8]> for Key {
    #[must_use]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl UpperHex for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for &b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
impl LowerHex for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for &b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct KeyError(());
impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_hex(s).ok_or(KeyError(()))
    }
}
#[cfg(feature = "serde-1")]
impl serde::Serialize for Key {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:x}", self))
    }
}
#[cfg(feature = "serde-1")]
impl<'de> serde::Deserialize<'de> for Key {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let s = String::deserialize(deserializer)?;
        Key::from_hex(&s).ok_or_else(|| D::Error::custom("expected a 32 character hex key"))
    }
}

macro_rules! key_newtype {
    ( $( $(#[$meta:meta])* $name:ident ), * ) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Hash, Eq, PartialOrd, PartialEq, Ord)]
            #[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
            pub struct $name(Key);
            impl $name {
                #[must_use]
                pub fn new(key: Key) -> Self {
                    Self(key)
                }
                #[must_use]
                pub fn new_bytes(key_bytes: [u8; KEY_LEN]) -> Self {
                    Self::new(Key(key_bytes))
                }
                #[must_use]
                pub fn from_hex(hex: &str) -> Option<Self> {
                    Some(Self::new(Key::from_hex(hex)?))
                }
                #[must_use]
                pub const fn key(&self) -> &Key {
                    &self.0
                }
            }
            impl From<Key> for $name {
                fn from(k: Key) -> Self {
                    Self(k)
                }
            }
            impl AsRef<[u8]> for $name {
                fn as_ref(&self) -> &[u8] {
                    self.0.as_ref()
                }
            }
        )*
    };
}
key_newtype!(
    /// Network Key. Everything on the network layer is derived from it with `k2`.
    NetKey,
    /// Derived from the NetKey. Encrypts `DST || TransportPDU`.
    EncryptionKey,
    /// Derived from the NetKey. Obfuscates `CTL/TTL || SEQ || SRC`.
    PrivacyKey,
    /// Per node key handed out during provisioning. Secures Config messages.
    DevKey,
    /// Application Key. Secures model messages.
    AppKey
);

impl NetKey {
    #[must_use]
    pub fn network_keys(&self) -> NetworkKeys {
        let (nid, encryption, privacy) = k2(self.key(), b"\x00");
        NetworkKeys::new(nid, encryption, privacy)
    }
    #[must_use]
    pub fn network_id(&self) -> NetworkID {
        self.into()
    }
}
impl DevKey {
    #[must_use]
    pub const fn akf() -> AKF {
        AKF(false)
    }
}
impl AppKey {
    #[must_use]
    pub fn aid(&self) -> AID {
        k4(self)
    }
    #[must_use]
    pub const fn akf() -> AKF {
        AKF(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hex() {
        let k = Key::from_hex("0053e7e4d8b9440faf8415df4c56c0e1").unwrap();
        assert_eq!(format!("{:x}", k), "0053e7e4d8b9440faf8415df4c56c0e1");
        assert_eq!(format!("{:X}", k), "0053E7E4D8B9440FAF8415DF4C56C0E1");
        assert!(Key::from_hex("0053").is_none());
        assert!(Key::from_hex("zz53e7e4d8b9440faf8415df4c56c0e1").is_none());
    }
    #[test]
    fn test_sample_app_key_aid() {
        let app_key = AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap();
        assert_eq!(app_key.aid(), AID::new(0x26));
    }
}
