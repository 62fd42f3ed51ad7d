//! Upper Transport Layer. Encrypts/decrypts access payloads with an application or device key.
use crate::crypto::aes::{self, AESCipher, MicSize};
use crate::crypto::key::{AppKey, DevKey, Key};
use crate::crypto::nonce::{Nonce, UpperNonceParts};
use crate::crypto::{AID, AKF, MIC};
use crate::lower::{UNSEGMENTED_ACCESS_MAX_LEN, SZMIC};
use core::fmt::{Display, Formatter};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum UpperTransportError {
    Decryption(aes::Error),
    /// No bound application key has the received AID.
    UnknownApplicationKey(AID),
    /// The AID derived from the candidate key doesn't match the received AID.
    KeyIdentifierMismatch,
    /// AKF=0 but the peer's device key isn't known.
    MissingDeviceKey,
    Malformed,
}
impl From<aes::Error> for UpperTransportError {
    fn from(e: aes::Error) -> Self {
        UpperTransportError::Decryption(e)
    }
}
impl Display for UpperTransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            UpperTransportError::Decryption(e) => write!(f, "upper transport decryption: {}", e),
            UpperTransportError::UnknownApplicationKey(aid) => {
                write!(f, "no application key for {}", aid)
            }
            UpperTransportError::KeyIdentifierMismatch => f.write_str("application key AID mismatch"),
            UpperTransportError::MissingDeviceKey => f.write_str("missing device key"),
            UpperTransportError::Malformed => f.write_str("malformed upper transport PDU"),
        }
    }
}
impl std::error::Error for UpperTransportError {}

/// Key material an access message is secured with. Picks the nonce type and the AKF/AID bits.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum SecurityKey {
    Application(AppKey),
    Device(DevKey),
}
impl SecurityKey {
    #[must_use]
    pub fn akf(&self) -> AKF {
        match self {
            SecurityKey::Application(_) => AppKey::akf(),
            SecurityKey::Device(_) => DevKey::akf(),
        }
    }
    #[must_use]
    pub fn aid(&self) -> Option<AID> {
        match self {
            SecurityKey::Application(k) => Some(k.aid()),
            SecurityKey::Device(_) => None,
        }
    }
    fn key(&self) -> &Key {
        match self {
            SecurityKey::Application(k) => k.key(),
            SecurityKey::Device(k) => k.key(),
        }
    }
    fn nonce(&self, parts: &UpperNonceParts) -> Nonce {
        match self {
            SecurityKey::Application(_) => parts.app_nonce(),
            SecurityKey::Device(_) => parts.device_nonce(),
        }
    }
}

/// Picks the TransMIC size for an access PDU of `access_len` bytes. Anything that still fits an
/// unsegmented lower PDU with a 32 bit MIC always uses the 32 bit MIC.
#[must_use]
pub fn mic_size_for(access_len: usize, aszmic: SZMIC) -> MicSize {
    if access_len + MIC::small_size() <= UNSEGMENTED_ACCESS_MAX_LEN || !aszmic.0 {
        MicSize::Small
    } else {
        MicSize::Big
    }
}

/// Encrypted access payload followed by its TransMIC.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct UpperPDU {
    pub akf: AKF,
    pub aid: Option<AID>,
    pub szmic: SZMIC,
    pub payload: Vec<u8>,
}
impl UpperPDU {
    /// Encrypts `access_pdu`. `parts.aszmic` is the requested MIC size; the returned PDU's `szmic`
    /// is the one actually used (see [`mic_size_for`]).
    pub fn encrypt(
        access_pdu: &[u8],
        key: &SecurityKey,
        parts: UpperNonceParts,
    ) -> Result<UpperPDU, UpperTransportError> {
        let mic_size = mic_size_for(access_pdu.len(), SZMIC(parts.aszmic));
        let parts = UpperNonceParts {
            aszmic: mic_size.is_big(),
            ..parts
        };
        let mut payload = Vec::with_capacity(access_pdu.len() + mic_size.byte_size());
        payload.extend_from_slice(access_pdu);
        let mic = AESCipher::new(*key.key()).ccm_encrypt(
            &key.nonce(&parts),
            b"",
            &mut payload[..],
            mic_size,
        )?;
        mic.extend_be(&mut payload);
        Ok(UpperPDU {
            akf: key.akf(),
            aid: key.aid(),
            szmic: SZMIC(mic_size.is_big()),
            payload,
        })
    }
    #[must_use]
    pub fn mic_size(&self) -> MicSize {
        if self.szmic.0 {
            MicSize::Big
        } else {
            MicSize::Small
        }
    }
    /// Doesn't fit into a single unsegmented access PDU.
    #[must_use]
    pub fn is_segmented(&self) -> bool {
        self.payload.len() > UNSEGMENTED_ACCESS_MAX_LEN
    }
    pub fn trans_mic(&self) -> Result<MIC, UpperTransportError> {
        let split = self.split_point()?;
        MIC::try_from_bytes_be(&self.payload[split..]).ok_or(UpperTransportError::Malformed)
    }
    fn split_point(&self) -> Result<usize, UpperTransportError> {
        let mic_len = self.mic_size().byte_size();
        if self.payload.len() <= mic_len {
            Err(UpperTransportError::Malformed)
        } else {
            Ok(self.payload.len() - mic_len)
        }
    }
    /// Decrypts with exactly `key`. The AID isn't checked.
    pub fn decrypt(
        &self,
        key: &SecurityKey,
        parts: UpperNonceParts,
    ) -> Result<Vec<u8>, UpperTransportError> {
        let split = self.split_point()?;
        let parts = UpperNonceParts {
            aszmic: self.szmic.0,
            ..parts
        };
        let mut plain = self.payload[..split].to_vec();
        AESCipher::new(*key.key()).ccm_decrypt(
            &key.nonce(&parts),
            b"",
            &mut plain[..],
            &self.payload[split..],
        )?;
        Ok(plain)
    }
    /// Decrypts with an application key that was looked up by this PDU's AID. The AID is
    /// recomputed from `app_key` and must agree with the received one.
    pub fn decrypt_app(
        &self,
        app_key: &AppKey,
        parts: UpperNonceParts,
    ) -> Result<Vec<u8>, UpperTransportError> {
        let aid = self.aid.ok_or(UpperTransportError::Malformed)?;
        if app_key.aid() != aid {
            return Err(UpperTransportError::KeyIdentifierMismatch);
        }
        self.decrypt(&SecurityKey::Application(*app_key), parts)
    }
    /// Resolves the key by AKF and decrypts. With AKF=1 only the candidate application keys whose
    /// AID matches the received AID are tried.
    pub fn decrypt_with<'a>(
        &self,
        device_key: Option<&DevKey>,
        app_keys: impl IntoIterator<Item = &'a AppKey>,
        parts: UpperNonceParts,
    ) -> Result<(Vec<u8>, SecurityKey), UpperTransportError> {
        if !self.akf.0 {
            let key = SecurityKey::Device(*device_key.ok_or(UpperTransportError::MissingDeviceKey)?);
            return Ok((self.decrypt(&key, parts)?, key));
        }
        let aid = self.aid.ok_or(UpperTransportError::Malformed)?;
        let mut last_error = UpperTransportError::UnknownApplicationKey(aid);
        for app_key in app_keys.into_iter().filter(|k| k.aid() == aid) {
            match self.decrypt_app(app_key, parts) {
                Ok(plain) => return Ok((plain, SecurityKey::Application(*app_key))),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, UnicastAddress};
    use crate::mesh::{IVIndex, SequenceNumber};

    fn app_key() -> AppKey {
        AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap()
    }
    fn parts(aszmic: bool) -> UpperNonceParts {
        UpperNonceParts {
            aszmic,
            seq: SequenceNumber::new(0x3129AB),
            src: UnicastAddress::new(0x0003),
            dst: Address::from(0x1201),
            iv_index: IVIndex(0x1234_5678),
        }
    }

    #[test]
    fn test_short_access_forces_small_mic() {
        let access = [0x82, 0x02, 0x01, 0x00];
        let pdu = UpperPDU::encrypt(&access, &SecurityKey::Application(app_key()), parts(true))
            .unwrap();
        assert_eq!(pdu.szmic, SZMIC(false));
        assert_eq!(pdu.payload.len(), access.len() + 4);
        assert!(!pdu.is_segmented());
        assert_eq!(pdu.aid, Some(AID::new(0x26)));
        let (plain, key) = pdu
            .decrypt_with(None, [app_key()].iter(), parts(false))
            .unwrap();
        assert_eq!(plain, access);
        assert_eq!(key, SecurityKey::Application(app_key()));
    }
    #[test]
    fn test_long_access_uses_aszmic() {
        let access = [0xAB_u8; 20];
        let device_key = DevKey::from_hex("9d6dd0e96eb25dc19a40ed9914f8f03f").unwrap();
        let pdu = UpperPDU::encrypt(&access, &SecurityKey::Device(device_key), parts(true))
            .unwrap();
        assert_eq!(pdu.szmic, SZMIC(true));
        assert_eq!(pdu.payload.len(), 28);
        assert!(pdu.is_segmented());
        assert_eq!(
            pdu.decrypt_with(None, core::iter::empty(), parts(true)),
            Err(UpperTransportError::MissingDeviceKey)
        );
        let (plain, _) = pdu
            .decrypt_with(Some(&device_key), core::iter::empty(), parts(false))
            .unwrap();
        assert_eq!(&plain[..], &access[..]);
    }
    #[test]
    fn test_wrong_app_key_fails_authentication() {
        let access = [0x82, 0x02, 0x01, 0x07];
        let pdu = UpperPDU::encrypt(&access, &SecurityKey::Application(app_key()), parts(false))
            .unwrap();
        let wrong = AppKey::from_hex("3216d1509884b533248541792b877f98").unwrap();
        assert_eq!(
            pdu.decrypt(&SecurityKey::Application(wrong), parts(false)),
            Err(UpperTransportError::Decryption(aes::Error::AuthenticationFailure))
        );
    }
    #[test]
    fn test_aid_lookup_errors() {
        let access = [0x82, 0x01];
        let pdu = UpperPDU::encrypt(&access, &SecurityKey::Application(app_key()), parts(false))
            .unwrap();
        assert_eq!(
            pdu.decrypt_with(None, core::iter::empty(), parts(false)),
            Err(UpperTransportError::UnknownApplicationKey(AID::new(0x26)))
        );
        let wrong = AppKey::from_hex("3216d1509884b533248541792b877f98").unwrap();
        assert_eq!(
            pdu.decrypt_with(None, [wrong].iter(), parts(false)),
            Err(UpperTransportError::UnknownApplicationKey(AID::new(0x26)))
        );
        assert_eq!(
            pdu.decrypt_app(&wrong, parts(false)),
            Err(UpperTransportError::KeyIdentifierMismatch)
        );
    }
}
