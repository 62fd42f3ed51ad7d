//! Network state the transport reads keys and sequence numbers from.
//!
//! [`NodeRegistry`] and [`KeyStore`] are the seams to whatever persists the mesh network.
//! [`MeshNetwork`] is an in memory implementation of both.
use crate::access::ModelIdentifier;
use crate::address::{Address, AddressError, UnicastAddress};
use crate::crypto::key::{AppKey, DevKey, NetKey};
use crate::crypto::materials::{
    AppKeyMap, ApplicationSecurityMaterials, NetworkKeys, NetworkSecurityMaterials,
};
use crate::crypto::AID;
use crate::mesh::{AppKeyIndex, CompanyID, IVIndex, NetKeyIndex, SequenceNumber};
use crate::stack::provisioner::Provisioner;
use core::convert::TryFrom;
use std::collections::BTreeMap;

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Model {
    pub bound_app_keys: Vec<AppKeyIndex>,
    pub subscriptions: Vec<Address>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Element {
    pub address: UnicastAddress,
    pub location: u16,
    pub models: BTreeMap<ModelIdentifier, Model>,
}
impl Element {
    #[must_use]
    pub fn new(address: UnicastAddress, location: u16) -> Self {
        Self {
            address,
            location,
            models: BTreeMap::new(),
        }
    }
}

/// A node this provisioner configured.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ProvisionedMeshNode {
    pub name: String,
    pub unicast_address: UnicastAddress,
    pub device_key: DevKey,
    pub company_id: Option<CompanyID>,
    /// Elements by address. The primary element has `unicast_address`.
    pub elements: BTreeMap<UnicastAddress, Element>,
    /// Last SEQ received from this node.
    pub received_seq: Option<SequenceNumber>,
    /// Last SEQ we sent it an unacknowledged message with.
    pub sent_seq: Option<SequenceNumber>,
}
impl ProvisionedMeshNode {
    #[must_use]
    pub fn new(name: &str, unicast_address: UnicastAddress, device_key: DevKey) -> Self {
        let mut elements = BTreeMap::new();
        elements.insert(unicast_address, Element::new(unicast_address, 0));
        Self {
            name: name.to_owned(),
            unicast_address,
            device_key,
            company_id: None,
            elements,
            received_seq: None,
            sent_seq: None,
        }
    }
    /// Adds elements so the node spans `count` consecutive addresses. Fails if the last one
    /// falls outside the unicast range.
    pub fn with_element_count(mut self, count: u8) -> Result<Self, AddressError> {
        let first = self.unicast_address.value();
        let last = first.saturating_add(u16::from(count.max(1)) - 1);
        UnicastAddress::try_from(last)?;
        for value in first + 1..=last {
            let address = UnicastAddress::try_from(value)?;
            self.elements
                .entry(address)
                .or_insert_with(|| Element::new(address, 0));
        }
        Ok(self)
    }
    #[must_use]
    pub fn owns(&self, address: UnicastAddress) -> bool {
        self.elements.contains_key(&address)
    }
    pub fn bind_app_key(
        &mut self,
        element: UnicastAddress,
        model: ModelIdentifier,
        index: AppKeyIndex,
    ) -> bool {
        match self.elements.get_mut(&element) {
            Some(e) => {
                let bound = &mut e.models.entry(model).or_default().bound_app_keys;
                if !bound.contains(&index) {
                    bound.push(index);
                }
                true
            }
            None => false,
        }
    }
}

pub trait NodeRegistry {
    /// Node owning the element at `address`.
    fn provisioned_node(&self, address: UnicastAddress) -> Option<&ProvisionedMeshNode>;
    fn provisioned_node_mut(&mut self, address: UnicastAddress)
        -> Option<&mut ProvisionedMeshNode>;
    fn provisioner(&self, address: UnicastAddress) -> Option<&Provisioner>;

    fn record_received_seq(&mut self, src: UnicastAddress, seq: SequenceNumber) {
        if let Some(node) = self.provisioned_node_mut(src) {
            node.received_seq = Some(core::cmp::max(node.received_seq.unwrap_or(seq), seq));
        }
    }
    fn record_sent_seq(&mut self, dst: Address, seq: SequenceNumber) {
        if let Some(node) = dst.unicast().and_then(move |u| self.provisioned_node_mut(u)) {
            node.sent_seq = Some(seq);
        }
    }
}

pub trait KeyStore {
    fn network_keys(&self) -> &NetworkKeys;
    fn iv_index(&self) -> IVIndex;
    fn application_key(&self, index: AppKeyIndex) -> Option<AppKey>;
    /// Every application key with this AID. Several keys may share one.
    fn application_keys(&self, aid: AID) -> Vec<AppKey>;
}

#[derive(Debug)]
pub struct MeshNetwork {
    net: NetworkSecurityMaterials,
    iv_index: IVIndex,
    app_keys: AppKeyMap,
    nodes: BTreeMap<UnicastAddress, ProvisionedMeshNode>,
    provisioners: BTreeMap<UnicastAddress, Provisioner>,
}
impl MeshNetwork {
    #[must_use]
    pub fn new(net_key: NetKey, iv_index: IVIndex) -> Self {
        Self {
            net: NetworkSecurityMaterials::new(NetKeyIndex(0), net_key),
            iv_index,
            app_keys: AppKeyMap::new(),
            nodes: BTreeMap::new(),
            provisioners: BTreeMap::new(),
        }
    }
    #[must_use]
    pub fn net_key(&self) -> &NetKey {
        &self.net.net_key
    }
    pub fn set_iv_index(&mut self, iv_index: IVIndex) {
        self.iv_index = iv_index;
    }
    pub fn add_app_key(&mut self, index: AppKeyIndex, app_key: AppKey) {
        self.app_keys.insert(
            index,
            ApplicationSecurityMaterials::new(app_key, self.net.index),
        );
    }
    pub fn add_node(&mut self, node: ProvisionedMeshNode) -> Option<ProvisionedMeshNode> {
        self.nodes.insert(node.unicast_address, node)
    }
    pub fn remove_node(&mut self, address: UnicastAddress) -> Option<ProvisionedMeshNode> {
        self.nodes.remove(&address)
    }
    pub fn add_provisioner(&mut self, provisioner: Provisioner) {
        self.provisioners.insert(provisioner.address(), provisioner);
    }
    pub fn nodes(&self) -> impl Iterator<Item = &ProvisionedMeshNode> {
        self.nodes.values()
    }
    pub fn provisioners(&self) -> impl Iterator<Item = &Provisioner> {
        self.provisioners.values()
    }
}
impl NodeRegistry for MeshNetwork {
    fn provisioned_node(&self, address: UnicastAddress) -> Option<&ProvisionedMeshNode> {
        self.nodes
            .range(..=address)
            .next_back()
            .map(|(_, n)| n)
            .filter(|n| n.owns(address))
    }
    fn provisioned_node_mut(
        &mut self,
        address: UnicastAddress,
    ) -> Option<&mut ProvisionedMeshNode> {
        self.nodes
            .range_mut(..=address)
            .next_back()
            .map(|(_, n)| n)
            .filter(|n| n.owns(address))
    }
    fn provisioner(&self, address: UnicastAddress) -> Option<&Provisioner> {
        self.provisioners.get(&address)
    }
}
impl KeyStore for MeshNetwork {
    fn network_keys(&self) -> &NetworkKeys {
        &self.net.network_keys
    }
    fn iv_index(&self) -> IVIndex {
        self.iv_index
    }
    fn application_key(&self, index: AppKeyIndex) -> Option<AppKey> {
        self.app_keys.get(index).map(|m| m.app_key)
    }
    fn application_keys(&self, aid: AID) -> Vec<AppKey> {
        self.app_keys.matching_aid(aid).map(|m| m.app_key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> MeshNetwork {
        let mut network = MeshNetwork::new(
            NetKey::from_hex("7dd7364cd842ad18c17c2b820c84c3d6").unwrap(),
            IVIndex(0x1234_5678),
        );
        let dev_key = DevKey::from_hex("9d6dd0e96eb25dc19a40ed9914f8f03f").unwrap();
        network.add_node(
            ProvisionedMeshNode::new("light", UnicastAddress::new(0x0010), dev_key)
                .with_element_count(3)
                .unwrap(),
        );
        network.add_node(ProvisionedMeshNode::new(
            "switch",
            UnicastAddress::new(0x0020),
            dev_key,
        ));
        network
    }

    #[test]
    fn test_element_lookup() {
        let network = network();
        let node = network.provisioned_node(UnicastAddress::new(0x0012)).unwrap();
        assert_eq!(node.name, "light");
        assert!(network
            .provisioned_node(UnicastAddress::new(0x0013))
            .is_none());
        assert!(network
            .provisioned_node(UnicastAddress::new(0x000F))
            .is_none());
        assert_eq!(
            network
                .provisioned_node(UnicastAddress::new(0x0020))
                .unwrap()
                .name,
            "switch"
        );
    }
    #[test]
    fn test_element_count_stops_at_unicast_range() {
        let dev_key = DevKey::from_hex("9d6dd0e96eb25dc19a40ed9914f8f03f").unwrap();
        let node = ProvisionedMeshNode::new("edge", UnicastAddress::new(0x7FFE), dev_key)
            .with_element_count(2)
            .unwrap();
        assert!(node.owns(UnicastAddress::new(0x7FFF)));
        assert_eq!(node.elements.len(), 2);
        assert_eq!(
            ProvisionedMeshNode::new("edge", UnicastAddress::new(0x7FFF), dev_key)
                .with_element_count(2),
            Err(AddressError(0x8000))
        );
        let single = ProvisionedMeshNode::new("edge", UnicastAddress::new(0x7FFF), dev_key)
            .with_element_count(1)
            .unwrap();
        assert_eq!(single.elements.len(), 1);
    }
    #[test]
    fn test_record_received_seq_keeps_highest() {
        let mut network = network();
        let src = UnicastAddress::new(0x0011);
        network.record_received_seq(src, SequenceNumber::new(10));
        network.record_received_seq(src, SequenceNumber::new(4));
        assert_eq!(
            network.provisioned_node(src).unwrap().received_seq,
            Some(SequenceNumber::new(10))
        );
        network.record_sent_seq(Address::from(0x0020), SequenceNumber::new(7));
        assert_eq!(
            network
                .provisioned_node(UnicastAddress::new(0x0020))
                .unwrap()
                .sent_seq,
            Some(SequenceNumber::new(7))
        );
    }
    #[test]
    fn test_app_keys_by_aid() {
        let mut network = network();
        let key = AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap();
        network.add_app_key(AppKeyIndex(0), key);
        assert_eq!(network.application_key(AppKeyIndex(0)), Some(key));
        assert_eq!(network.application_keys(key.aid()), vec![key]);
        assert!(network.application_key(AppKeyIndex(1)).is_none());
    }
}
