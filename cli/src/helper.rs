use crate::CLIError;
use mesh_transport::address::{Address, UnicastAddress};
use mesh_transport::crypto::key::{AppKey, DevKey, NetKey};
use mesh_transport::mesh::{AppKeyIndex, IVIndex, SequenceNumber};
use mesh_transport::stack::provisioner::Provisioner;
use mesh_transport::stack::registry::{MeshNetwork, NodeRegistry, ProvisionedMeshNode};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt::{Error, Formatter};
use std::str::FromStr;

pub struct HexSlice<'a>(pub &'a [u8]);
impl<'a> std::fmt::LowerHex for HexSlice<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for &b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
pub fn is_hex_str(s: &str) -> bool {
    s.len() % 2 == 0 && s.chars().all(|c| c.is_digit(16))
}
pub fn is_hex_validator(input: String) -> Result<(), String> {
    if is_hex_str(&input) {
        Ok(())
    } else {
        Err(format!("'{}' is not a hex string", &input))
    }
}
pub fn is_128_bit_hex_str_validator(input: String) -> Result<(), String> {
    if input.len() == 32 && is_hex_str(&input) {
        Ok(())
    } else {
        Err(format!("'{}' is not a 128-bit hex string", &input))
    }
}
pub fn is_u16_validator(input: String) -> Result<(), String> {
    match u16::from_str(&input) {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("'{}' is not a 16-bit unsigned integer", &input)),
    }
}
/// Addresses are given in hex, with or without a `0x` prefix.
pub fn parse_address(input: &str) -> Option<u16> {
    u16::from_str_radix(input.trim_start_matches("0x"), 16).ok()
}
pub fn is_address_validator(input: String) -> Result<(), String> {
    match parse_address(&input) {
        Some(v) if v != 0 => Ok(()),
        _ => Err(format!("'{}' is not a mesh address", &input)),
    }
}
pub fn is_bool_validator(input: String) -> Result<(), String> {
    bool::from_str(&input)
        .ok()
        .map(|_| ())
        .ok_or(format!("'{}' is not a valid bool", &input))
}
pub fn hex_to_bytes(s: &str) -> Option<Vec<u8>> {
    if !is_hex_str(s) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
/// Reads a clap argument whose validator already ran.
pub fn address_arg(matches: &clap::ArgMatches, name: &str) -> Address {
    Address::from(
        matches
            .value_of(name)
            .and_then(parse_address)
            .expect("validated by clap"),
    )
}
pub fn load_file(path: &str, writeable: bool, create: bool) -> Result<std::fs::File, CLIError> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(writeable)
        .truncate(writeable)
        .create(create)
        .open(path)
        .map_err(|e| CLIError::IOError(path.to_owned(), e))
}

/// On disk description of the network this tool acts in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkFile {
    pub net_key: NetKey,
    pub iv_index: IVIndex,
    pub provisioner: ProvisionerEntry,
    #[serde(default)]
    pub app_keys: Vec<AppKeyEntry>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisionerEntry {
    pub name: String,
    pub address: u16,
    /// Next sequence number to use.
    pub sequence: u32,
}
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppKeyEntry {
    pub index: u16,
    pub key: AppKey,
}
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub address: u16,
    pub device_key: DevKey,
    #[serde(default = "one")]
    pub elements: u8,
}
fn one() -> u8 {
    1
}
pub fn unicast(address: u16) -> Result<UnicastAddress, CLIError> {
    UnicastAddress::try_from(address)
        .map_err(|e| CLIError::OtherMessage(format!("bad unicast address: {}", e)))
}
impl NetworkFile {
    pub fn to_network(&self) -> Result<MeshNetwork, CLIError> {
        if self.provisioner.sequence > mesh_transport::mesh::U24_MAX {
            return Err(CLIError::OtherMessage(
                "provisioner sequence number is out of range".to_owned(),
            ));
        }
        let mut network = MeshNetwork::new(self.net_key, self.iv_index);
        network.add_provisioner(Provisioner::new(
            &self.provisioner.name,
            unicast(self.provisioner.address)?,
            SequenceNumber::new(self.provisioner.sequence),
        ));
        for app_key in &self.app_keys {
            network.add_app_key(AppKeyIndex(app_key.index), app_key.key);
        }
        for node in &self.nodes {
            network.add_node(
                ProvisionedMeshNode::new(&node.name, unicast(node.address)?, node.device_key)
                    .with_element_count(node.elements)
                    .map_err(|e| {
                        CLIError::OtherMessage(format!("node '{}' elements: {}", node.name, e))
                    })?,
            );
        }
        Ok(network)
    }
    /// Copies the provisioner's sequence counter back so the next run doesn't reuse numbers.
    pub fn update_from(&mut self, network: &MeshNetwork) -> Result<(), CLIError> {
        let provisioner = network
            .provisioner(unicast(self.provisioner.address)?)
            .ok_or_else(|| CLIError::OtherMessage("provisioner vanished".to_owned()))?;
        self.provisioner.sequence = provisioner.sequence_number();
        Ok(())
    }
}
pub fn load_network_file(path: &str) -> Result<NetworkFile, CLIError> {
    serde_json::from_reader(load_file(path, false, false)?).map_err(CLIError::SerdeJSON)
}
pub fn write_network_file(path: &str, network: &NetworkFile) -> Result<(), CLIError> {
    serde_json::to_writer_pretty(load_file(path, true, true)?, network)
        .map_err(CLIError::SerdeJSON)
}
