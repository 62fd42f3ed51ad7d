//! Bluetooth Mesh Addresses. All address are 16-bit on the wire.
//!
//! | Bits (16)             | Type          |
//! | --------------------- | ------------- |
//! | 0b0000 0000 0000 0000 | Unassigned    |
//! | 0b0xxx xxxx xxxx xxxx | Unicast       |
//! | 0b10xx xxxx xxxx xxxx | Virtual       |
//! | 0b11xx xxxx xxxx xxxx | Group         |
//!
//! Endian depends on layer!!
//! Little: Access/Foundation
//! Big: Everything else
use core::convert::TryFrom;
use core::fmt::{Display, Error, Formatter};

const UNICAST_BIT: u16 = 0x8000;
const GROUP_BIT: u16 = 0xC000;
const VIRTUAL_BIT: u16 = 0x8000;
const VIRTUAL_MASK: u16 = 0xC000;

/// Element Unicast Address. Each Element has one Unicast assigned to it.
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct UnicastAddress(u16);

/// Group Address. Some Group Address are reserved.
///
/// | Values        | Group Name    |
/// | ------------- | ------------- |
/// | 0xFF00-0xFFFB | RFU           |
/// | 0xFFFC        | All Proxies   |
/// | 0xFFFD        | All Friends   |
/// | 0xFFFE        | All Relays    |
/// | 0xFFFF        | All Nodes     |
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct GroupAddress(u16);

/// 14 bit hash of a virtual label. Only the hash travels with the message.
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct VirtualAddressHash(u16);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct AddressError(pub u16);
impl Display for AddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "malformed address {:#06x}", self.0)
    }
}
impl std::error::Error for AddressError {}

impl UnicastAddress {
    /// # Panics
    /// Panics if `v` is not a unicast address (`0` or top bit set).
    #[must_use]
    pub fn new(v: u16) -> UnicastAddress {
        match Self::try_from(v) {
            Ok(u) => u,
            Err(_) => panic!("non unicast address '{:#06x}'", v),
        }
    }
    /// Clears the top bit. Doesn't reject `0`, so only use it on known good constants.
    #[must_use]
    pub const fn new_masked(v: u16) -> UnicastAddress {
        UnicastAddress(v & !UNICAST_BIT)
    }
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
    #[must_use]
    pub fn to_bytes_be(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
    #[must_use]
    pub fn to_bytes_le(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}
impl TryFrom<u16> for UnicastAddress {
    type Error = AddressError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value != 0 && value & UNICAST_BIT == 0 {
            Ok(UnicastAddress(value))
        } else {
            Err(AddressError(value))
        }
    }
}
impl GroupAddress {
    /// # Panics
    /// Panics if `group_address` isn't a valid group address.
    #[must_use]
    pub fn new(group_address: u16) -> Self {
        match Self::try_from(group_address) {
            Ok(g) => g,
            Err(_) => panic!("invalid group address given"),
        }
    }
    pub const fn all_proxies() -> GroupAddress {
        GroupAddress(0xFFFC)
    }
    pub const fn all_friends() -> GroupAddress {
        GroupAddress(0xFFFD)
    }
    pub const fn all_relays() -> GroupAddress {
        GroupAddress(0xFFFE)
    }
    pub const fn all_nodes() -> GroupAddress {
        GroupAddress(0xFFFF)
    }
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}
impl TryFrom<u16> for GroupAddress {
    type Error = AddressError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value & GROUP_BIT == GROUP_BIT {
            Ok(GroupAddress(value))
        } else {
            Err(AddressError(value))
        }
    }
}
impl VirtualAddressHash {
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}
impl TryFrom<u16> for VirtualAddressHash {
    type Error = AddressError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value & VIRTUAL_MASK == VIRTUAL_BIT {
            Ok(VirtualAddressHash(value))
        } else {
            Err(AddressError(value))
        }
    }
}

#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Address {
    Unassigned,
    Unicast(UnicastAddress),
    Group(GroupAddress),
    VirtualHash(VirtualAddressHash),
}
impl Address {
    #[must_use]
    pub fn value(self) -> u16 {
        match self {
            Address::Unassigned => 0,
            Address::Unicast(u) => u.0,
            Address::Group(g) => g.0,
            Address::VirtualHash(h) => h.0,
        }
    }
    #[must_use]
    pub fn is_unicast(self) -> bool {
        matches!(self, Address::Unicast(_))
    }
    #[must_use]
    pub fn is_assigned(self) -> bool {
        self != Address::Unassigned
    }
    #[must_use]
    pub fn unicast(self) -> Option<UnicastAddress> {
        match self {
            Address::Unicast(u) => Some(u),
            _ => None,
        }
    }
    #[must_use]
    pub fn to_bytes_be(self) -> [u8; 2] {
        self.value().to_be_bytes()
    }
    #[must_use]
    pub fn from_bytes_be(bytes: [u8; 2]) -> Address {
        u16::from_be_bytes(bytes).into()
    }
}
impl From<u16> for Address {
    fn from(v: u16) -> Self {
        if v == 0 {
            Address::Unassigned
        } else if v & UNICAST_BIT == 0 {
            Address::Unicast(UnicastAddress(v))
        } else if v & GROUP_BIT == GROUP_BIT {
            Address::Group(GroupAddress(v))
        } else {
            Address::VirtualHash(VirtualAddressHash(v))
        }
    }
}
impl From<UnicastAddress> for Address {
    fn from(u: UnicastAddress) -> Self {
        Address::Unicast(u)
    }
}
impl From<GroupAddress> for Address {
    fn from(g: GroupAddress) -> Self {
        Address::Group(g)
    }
}
impl TryFrom<Address> for UnicastAddress {
    type Error = AddressError;

    fn try_from(value: Address) -> Result<Self, Self::Error> {
        value.unicast().ok_or_else(|| AddressError(value.value()))
    }
}
impl Display for UnicastAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{:#06x}", self.0)
    }
}
impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{:#06x}", self.value())
    }
}
