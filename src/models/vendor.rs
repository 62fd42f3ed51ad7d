//! Vendor model messages. Opaque parameters behind a 3 octet opcode.
use crate::access::{Opcode, VendorOpcode, MAX_PARAMETERS_LEN};
use crate::mesh::CompanyID;
use crate::models::{MessagePackError, PackableMessage};

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct VendorMessage {
    pub opcode: VendorOpcode,
    pub company_id: CompanyID,
    pub parameters: Vec<u8>,
    pub acked: bool,
}
impl VendorMessage {
    #[must_use]
    pub fn new(opcode: u8, company_id: CompanyID, parameters: Vec<u8>, acked: bool) -> Self {
        Self {
            opcode: VendorOpcode::new_masked(opcode),
            company_id,
            parameters,
            acked,
        }
    }
}
impl PackableMessage for VendorMessage {
    fn opcode(&self) -> Opcode {
        Opcode::Vendor(self.opcode, self.company_id)
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        if self.parameters.len() > MAX_PARAMETERS_LEN {
            return Err(MessagePackError::BadLength);
        }
        buffer.extend_from_slice(&self.parameters);
        Ok(())
    }

    fn is_acked(&self) -> bool {
        self.acked
    }
}

/// Any inbound vendor opcode. The parameters are left for the application to interpret.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct VendorStatus {
    pub opcode: VendorOpcode,
    pub company_id: CompanyID,
    pub parameters: Vec<u8>,
}
impl VendorStatus {
    #[must_use]
    pub fn full_opcode(&self) -> Opcode {
        Opcode::Vendor(self.opcode, self.company_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatusMessage;

    #[test]
    fn test_vendor_message() {
        let msg = VendorMessage::new(0x01, CompanyID(0x0059), vec![0xAA, 0xBB], true);
        let mut access = Vec::new();
        msg.opcode().pack_into(&mut access).unwrap();
        access.extend(msg.parameters().unwrap());
        assert_eq!(access, vec![0xC1, 0x59, 0x00, 0xAA, 0xBB]);
        match StatusMessage::unpack_access(&access).unwrap() {
            StatusMessage::Vendor(status) => {
                assert_eq!(status.full_opcode(), msg.opcode());
                assert_eq!(status.parameters, vec![0xAA, 0xBB]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
