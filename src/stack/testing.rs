//! Shared fixtures for the stack tests. Both sides use the Mesh Profile sample keys.
use crate::address::UnicastAddress;
use crate::crypto::key::{AppKey, DevKey, NetKey};
use crate::mesh::{AppKeyIndex, IVIndex, SequenceNumber};
use crate::stack::provisioner::Provisioner;
use crate::stack::registry::{MeshNetwork, NodeRegistry, ProvisionedMeshNode};
use slog::Logger;

pub const PROVISIONER: UnicastAddress = UnicastAddress::new_masked(0x0001);
pub const NODE: UnicastAddress = UnicastAddress::new_masked(0x0002);

pub fn logger() -> Logger {
    Logger::root(slog::Discard, o!())
}
pub fn net_key() -> NetKey {
    NetKey::from_hex("7dd7364cd842ad18c17c2b820c84c3d6").unwrap()
}
pub fn app_key() -> AppKey {
    AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap()
}
pub fn dev_key() -> DevKey {
    DevKey::from_hex("9d6dd0e96eb25dc19a40ed9914f8f03f").unwrap()
}
fn network(
    own: UnicastAddress,
    other: UnicastAddress,
    other_key: DevKey,
    seq: u32,
) -> MeshNetwork {
    let mut network = MeshNetwork::new(net_key(), IVIndex(0x1234_5678));
    network.add_app_key(AppKeyIndex(0), app_key());
    network.add_provisioner(Provisioner::new(
        "test",
        own,
        SequenceNumber::new(seq),
    ));
    network.add_node(ProvisionedMeshNode::new("other", other, other_key));
    network
}
/// `(local, peer)`. The local side provisions [`NODE`] from [`PROVISIONER`]. The peer side plays
/// the node: it owns the [`NODE`] address and knows the provisioner by the same device key.
pub fn networks() -> (MeshNetwork, MeshNetwork) {
    (
        network(PROVISIONER, NODE, dev_key(), 0x0100),
        network(NODE, PROVISIONER, dev_key(), 0x0800),
    )
}
pub fn peer_with_wrong_device_key() -> MeshNetwork {
    network(
        NODE,
        PROVISIONER,
        DevKey::from_hex("00112233445566778899aabbccddeeff").unwrap(),
        0x0800,
    )
}
/// Next sequence number the provisioner at [`PROVISIONER`] hands out.
pub fn provisioner_seq(network: &MeshNetwork) -> u32 {
    network
        .provisioner(PROVISIONER)
        .map_or(0, Provisioner::sequence_number)
}
