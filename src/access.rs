//! Access Layer between Models and the rest of the stack (Transport, Network, etc). The most
//! surface layer of the stack. An access payload is `Opcode || Parameters`.
//!
//! | First Octet | Opcode Size | Notes                                  |
//! | ----------- | ----------- | -------------------------------------- |
//! | 0xxxxxxx    | 1           | (0x7F is RFU)                          |
//! | 10xxxxxx    | 2           | Big endian SIG opcode                  |
//! | 11xxxxxx    | 3           | 6 bit opcode then CompanyID (little)   |
use crate::mesh::{CompanyID, ModelID};
use core::convert::TryFrom;
use core::fmt::{Display, Formatter};

/// Largest amount of parameter bytes one access message may carry.
pub const MAX_PARAMETERS_LEN: usize = 379;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum SigOpcode {
    SingleOctet(u8),
    DoubleOctet(u16),
}
impl SigOpcode {
    #[must_use]
    pub fn byte_len(self) -> usize {
        match self {
            SigOpcode::SingleOctet(_) => 1,
            SigOpcode::DoubleOctet(_) => 2,
        }
    }
}
impl From<SigOpcode> for Opcode {
    fn from(opcode: SigOpcode) -> Self {
        Opcode::SIG(opcode)
    }
}
const VENDOR_OPCODE_MAX: u8 = (1u8 << 6) - 1;
/// 6 bit Vendor Opcode
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct VendorOpcode(u8);
impl VendorOpcode {
    /// # Panics
    /// Panics if `opcode` doesn't fit in 6 bits.
    #[must_use]
    pub fn new(opcode: u8) -> Self {
        assert!(opcode <= VENDOR_OPCODE_MAX, "vendor opcode is 6 bits");
        VendorOpcode(opcode)
    }
    #[must_use]
    pub const fn new_masked(opcode: u8) -> Self {
        VendorOpcode(opcode & VENDOR_OPCODE_MAX)
    }
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum AccessError {
    InvalidOpcode,
    /// Parameters longer than `MAX_PARAMETERS_LEN`.
    ParameterLength(usize),
}
impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            AccessError::InvalidOpcode => f.write_str("invalid or RFU opcode"),
            AccessError::ParameterLength(l) => write!(
                f,
                "{} parameter bytes exceeds the {} byte maximum",
                l, MAX_PARAMETERS_LEN
            ),
        }
    }
}
impl std::error::Error for AccessError {}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    SIG(SigOpcode),
    Vendor(VendorOpcode, CompanyID),
}
impl Opcode {
    #[must_use]
    pub const fn single(opcode: u8) -> Opcode {
        Opcode::SIG(SigOpcode::SingleOctet(opcode))
    }
    #[must_use]
    pub const fn double(opcode: u16) -> Opcode {
        Opcode::SIG(SigOpcode::DoubleOctet(opcode))
    }
    #[must_use]
    pub const fn vendor(opcode: u8, company_id: CompanyID) -> Opcode {
        Opcode::Vendor(VendorOpcode::new_masked(opcode), company_id)
    }
    /// Classifies a SIG opcode given as a plain number (`0x02`, `0x8202`).
    pub fn from_sig_value(value: u16) -> Result<Opcode, AccessError> {
        if value <= 0x7E {
            Ok(Opcode::single(value as u8))
        } else if value & 0xC000 == 0x8000 {
            Ok(Opcode::double(value))
        } else {
            Err(AccessError::InvalidOpcode)
        }
    }
    #[must_use]
    pub fn company_id(&self) -> Option<CompanyID> {
        match self {
            Opcode::Vendor(_, cid) => Some(*cid),
            _ => None,
        }
    }
    #[must_use]
    pub fn is_sig(&self) -> bool {
        self.company_id().is_none()
    }
    #[must_use]
    pub fn is_vendor(&self) -> bool {
        !self.is_sig()
    }
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            Opcode::SIG(o) => o.byte_len(),
            Opcode::Vendor(_, _) => 3,
        }
    }
    pub const fn max_byte_len() -> usize {
        3
    }
    /// Reads the opcode at the front of `bytes`. Trailing bytes (the parameters) are ignored.
    pub fn unpack_from(bytes: &[u8]) -> Result<Self, AccessError> {
        let first = *bytes.first().ok_or(AccessError::InvalidOpcode)?;
        if first == 0x7F {
            // This opcode is RFU
            Err(AccessError::InvalidOpcode)
        } else if first & 0x80 == 0 {
            Ok(Opcode::single(first))
        } else if first & 0xC0 == 0xC0 {
            if bytes.len() < 3 {
                return Err(AccessError::InvalidOpcode);
            }
            let company_id = CompanyID(u16::from_le_bytes([bytes[1], bytes[2]]));
            Ok(Opcode::vendor(first, company_id))
        } else {
            if bytes.len() < 2 {
                return Err(AccessError::InvalidOpcode);
            }
            Ok(Opcode::double(u16::from_be_bytes([first, bytes[1]])))
        }
    }
    /// Appends the encoded opcode to `buffer`.
    pub fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), AccessError> {
        match *self {
            Opcode::SIG(SigOpcode::SingleOctet(s)) => {
                if s & 0x80 != 0 || s == 0x7F {
                    return Err(AccessError::InvalidOpcode);
                }
                buffer.push(s);
            }
            Opcode::SIG(SigOpcode::DoubleOctet(d)) => {
                if d & 0xC000 != 0x8000 {
                    return Err(AccessError::InvalidOpcode);
                }
                buffer.extend_from_slice(&d.to_be_bytes());
            }
            Opcode::Vendor(opcode, company_id) => {
                buffer.push(opcode.0 | 0xC0);
                buffer.extend_from_slice(&company_id.to_bytes_le());
            }
        }
        Ok(())
    }
}
impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Opcode::SIG(SigOpcode::SingleOctet(o)) => write!(f, "{:#04x}", o),
            Opcode::SIG(SigOpcode::DoubleOctet(o)) => write!(f, "{:#06x}", o),
            Opcode::Vendor(o, cid) => write!(f, "{:#04x}/{}", o.0 | 0xC0, cid),
        }
    }
}

/// Unencrypted Access Layer payload. `Opcode || Parameters`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AccessPayload {
    opcode: Opcode,
    parameters: Vec<u8>,
}
impl AccessPayload {
    pub fn new(opcode: Opcode, parameters: &[u8]) -> Result<Self, AccessError> {
        if parameters.len() > MAX_PARAMETERS_LEN {
            return Err(AccessError::ParameterLength(parameters.len()));
        }
        Ok(AccessPayload {
            opcode,
            parameters: parameters.to_vec(),
        })
    }
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }
    #[must_use]
    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.opcode.byte_len() + self.parameters.len()
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, AccessError> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.opcode.pack_into(&mut out)?;
        out.extend_from_slice(&self.parameters);
        Ok(out)
    }
    pub fn unpack_from(bytes: &[u8]) -> Result<Self, AccessError> {
        let opcode = Opcode::unpack_from(bytes)?;
        AccessPayload::new(opcode, &bytes[opcode.byte_len()..])
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelIdentifier {
    model_id: ModelID,
    company_id: Option<CompanyID>,
}
impl ModelIdentifier {
    #[must_use]
    pub fn new_sig(sig_model_id: ModelID) -> ModelIdentifier {
        ModelIdentifier {
            model_id: sig_model_id,
            company_id: None,
        }
    }
    /// Creates a new vendor model from a `ModelID` and Bluetooth `CompanyID`
    #[must_use]
    pub fn new_vendor(model_id: ModelID, company_id: CompanyID) -> ModelIdentifier {
        ModelIdentifier {
            model_id,
            company_id: Some(company_id),
        }
    }
    #[must_use]
    pub fn byte_len(&self) -> usize {
        if self.is_vendor() {
            4
        } else {
            2
        }
    }
    #[must_use]
    pub fn model_id(&self) -> ModelID {
        self.model_id
    }
    #[must_use]
    pub fn company_id(&self) -> Option<CompanyID> {
        self.company_id
    }
    #[must_use]
    pub fn is_sig(&self) -> bool {
        self.company_id.is_none()
    }
    #[must_use]
    pub fn is_vendor(&self) -> bool {
        !self.is_sig()
    }
    /// Appends the little endian `[CompanyID] || ModelID` form used by Config messages.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        if let Some(company_id) = self.company_id {
            buf.extend_from_slice(&company_id.to_bytes_le());
        }
        buf.extend_from_slice(&self.model_id.0.to_le_bytes());
    }
    #[must_use]
    pub fn unpack_from(buf: &[u8]) -> Option<Self> {
        match buf.len() {
            2 => Some(Self::new_sig(ModelID(u16::from_le_bytes([buf[0], buf[1]])))),
            4 => Some(Self::new_vendor(
                ModelID(u16::from_le_bytes([buf[2], buf[3]])),
                CompanyID(u16::from_le_bytes([buf[0], buf[1]])),
            )),
            _ => None,
        }
    }
}
impl TryFrom<&[u8]> for ModelIdentifier {
    type Error = AccessError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::unpack_from(value).ok_or(AccessError::ParameterLength(value.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(opcode: Opcode) -> Opcode {
        let mut buf = Vec::new();
        opcode.pack_into(&mut buf).unwrap();
        assert_eq!(buf.len(), opcode.byte_len());
        Opcode::unpack_from(&buf).unwrap()
    }

    #[test]
    fn test_opcode_classes() {
        let single = Opcode::single(0x02);
        let double = Opcode::double(0x8202);
        let vendor = Opcode::vendor(0x15, CompanyID(0x000A));
        assert_eq!(round_trip(single), single);
        assert_eq!(round_trip(double), double);
        assert_eq!(round_trip(vendor), vendor);

        let mut buf = Vec::new();
        double.pack_into(&mut buf).unwrap();
        assert_eq!(buf, vec![0x82, 0x02]);
        buf.clear();
        vendor.pack_into(&mut buf).unwrap();
        assert_eq!(buf, vec![0xD5, 0x0A, 0x00]);
    }
    #[test]
    fn test_invalid_opcodes() {
        assert_eq!(Opcode::unpack_from(&[0x7F]), Err(AccessError::InvalidOpcode));
        assert_eq!(Opcode::unpack_from(&[]), Err(AccessError::InvalidOpcode));
        assert_eq!(Opcode::unpack_from(&[0x82]), Err(AccessError::InvalidOpcode));
        assert_eq!(Opcode::unpack_from(&[0xC1, 0x00]), Err(AccessError::InvalidOpcode));
        assert!(Opcode::single(0x80).pack_into(&mut Vec::new()).is_err());
        assert!(Opcode::double(0x0202).pack_into(&mut Vec::new()).is_err());
        assert_eq!(Opcode::from_sig_value(0x8204), Ok(Opcode::double(0x8204)));
        assert_eq!(Opcode::from_sig_value(0x5E), Ok(Opcode::single(0x5E)));
    }
    #[test]
    fn test_parameter_length() {
        let max = vec![0_u8; MAX_PARAMETERS_LEN];
        assert!(AccessPayload::new(Opcode::single(0x00), &max).is_ok());
        let too_long = vec![0_u8; MAX_PARAMETERS_LEN + 1];
        assert_eq!(
            AccessPayload::new(Opcode::single(0x00), &too_long),
            Err(AccessError::ParameterLength(MAX_PARAMETERS_LEN + 1))
        );
    }
    #[test]
    fn test_payload_unpack() {
        let payload = AccessPayload::unpack_from(&[0x82, 0x04, 0x01]).unwrap();
        assert_eq!(payload.opcode(), Opcode::double(0x8204));
        assert_eq!(payload.parameters(), &[0x01]);
        assert_eq!(payload.to_bytes().unwrap(), vec![0x82, 0x04, 0x01]);
    }
    #[test]
    fn test_model_identifier() {
        let vendor = ModelIdentifier::new_vendor(ModelID(0x0001), CompanyID(0x0059));
        let mut buf = Vec::new();
        vendor.pack_into(&mut buf);
        assert_eq!(buf, vec![0x59, 0x00, 0x01, 0x00]);
        assert_eq!(ModelIdentifier::unpack_from(&buf), Some(vendor));
    }
}
