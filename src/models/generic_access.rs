//! Raw access messages built by the caller: any opcode, any key.
use crate::access::{Opcode, MAX_PARAMETERS_LEN};
use crate::mesh::{AppKeyIndex, TTL};
use crate::models::{MessageKey, MessagePackError};

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct GenericAccessMessage {
    pub opcode: Opcode,
    pub parameters: Vec<u8>,
    pub key: MessageKey,
    pub ttl: Option<TTL>,
    /// Status opcode to wait for. `None` sends the message unacknowledged.
    pub expected_status: Option<Opcode>,
    pub aszmic: bool,
}
impl GenericAccessMessage {
    pub fn new(
        opcode: Opcode,
        parameters: Vec<u8>,
        key: MessageKey,
    ) -> Result<Self, MessagePackError> {
        if parameters.len() > MAX_PARAMETERS_LEN {
            return Err(MessagePackError::BadLength);
        }
        if key == MessageKey::Network {
            return Err(MessagePackError::BadState);
        }
        Ok(Self {
            opcode,
            parameters,
            key,
            ttl: None,
            expected_status: None,
            aszmic: false,
        })
    }
    #[must_use]
    pub fn application(opcode: Opcode, parameters: Vec<u8>, app_key_index: AppKeyIndex) -> Self {
        Self {
            opcode,
            parameters,
            key: MessageKey::Application(app_key_index),
            ttl: None,
            expected_status: None,
            aszmic: false,
        }
    }
    #[must_use]
    pub fn expecting(mut self, status: Opcode) -> Self {
        self.expected_status = Some(status);
        self
    }
}
