//! Proxy Configuration messages. Sent network-encrypted only, with the proxy nonce, TTL 0 and an
//! unassigned destination. Parameters are big endian.
use crate::address::Address;
use crate::models::{MessagePackError, Reader};
use core::convert::TryFrom;

pub mod opcodes {
    pub const SET_FILTER_TYPE: u8 = 0x00;
    pub const ADD_ADDRESSES: u8 = 0x01;
    pub const REMOVE_ADDRESSES: u8 = 0x02;
    pub const FILTER_STATUS: u8 = 0x03;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterType {
    WhiteList = 0x00,
    BlackList = 0x01,
}
impl TryFrom<u8> for FilterType {
    type Error = MessagePackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(FilterType::WhiteList),
            0x01 => Ok(FilterType::BlackList),
            _ => Err(MessagePackError::BadBytes),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum ProxyConfigMessage {
    SetFilterType(FilterType),
    AddAddresses(Vec<Address>),
    RemoveAddresses(Vec<Address>),
}
impl ProxyConfigMessage {
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            ProxyConfigMessage::SetFilterType(_) => opcodes::SET_FILTER_TYPE,
            ProxyConfigMessage::AddAddresses(_) => opcodes::ADD_ADDRESSES,
            ProxyConfigMessage::RemoveAddresses(_) => opcodes::REMOVE_ADDRESSES,
        }
    }
    #[must_use]
    pub fn parameters(&self) -> Vec<u8> {
        match self {
            ProxyConfigMessage::SetFilterType(filter_type) => vec![*filter_type as u8],
            ProxyConfigMessage::AddAddresses(addresses)
            | ProxyConfigMessage::RemoveAddresses(addresses) => addresses
                .iter()
                .flat_map(|a| a.to_bytes_be().to_vec())
                .collect(),
        }
    }
    /// Every request is answered by a Filter Status.
    #[must_use]
    pub fn is_acked(&self) -> bool {
        true
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct FilterStatus {
    pub filter_type: FilterType,
    pub list_size: u16,
}
impl FilterStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let filter_type = FilterType::try_from(r.u8()?)?;
        let b = r.take(2)?;
        r.finish()?;
        Ok(FilterStatus {
            filter_type,
            list_size: u16::from_be_bytes([b[0], b[1]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_addresses_big_endian() {
        let msg = ProxyConfigMessage::AddAddresses(vec![Address::from(0x0102), Address::from(0xC003)]);
        assert_eq!(msg.opcode(), 0x01);
        assert_eq!(msg.parameters(), vec![0x01, 0x02, 0xC0, 0x03]);
    }
    #[test]
    fn test_filter_status() {
        assert_eq!(
            FilterStatus::unpack_from(&[0x01, 0x00, 0x02]).unwrap(),
            FilterStatus {
                filter_type: FilterType::BlackList,
                list_size: 2
            }
        );
        assert_eq!(
            FilterStatus::unpack_from(&[0x02, 0x00, 0x02]),
            Err(MessagePackError::BadBytes)
        );
    }
}
