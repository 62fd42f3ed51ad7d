//! Message states. Every outgoing message type maps to exactly one state through a static opcode
//! table. The state decides whether a status is awaited and which one.
use crate::access::Opcode;
use crate::mesh::CompanyID;
use crate::models::proxy::{self, ProxyConfigMessage};
use crate::models::{
    blob, config, generic, lighting, scene, scheduler, time, MeshMessage, ModelMessage,
};
use crate::net::PduType;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum MessageState {
    /// Nothing in flight.
    NoOperation,
    /// Caller built opcode and parameters.
    GenericAccessMessage,

    CompositionDataGet,
    DefaultTtlGet,
    DefaultTtlSet,
    RelayGet,
    RelaySet,
    GattProxyGet,
    GattProxySet,
    NetworkTransmitGet,
    NetworkTransmitSet,
    AppKeyAdd,
    AppKeyUpdate,
    AppKeyDelete,
    ModelAppBind,
    ModelAppUnbind,
    ModelPublicationGet,
    ModelPublicationSet,
    ModelSubscriptionAdd,
    ModelSubscriptionDelete,
    NodeReset,

    GenericOnOffGet,
    GenericOnOffSet,
    GenericOnOffSetUnacknowledged,
    GenericLevelGet,
    GenericLevelSet,
    GenericLevelSetUnacknowledged,
    GenericDeltaSet,
    GenericDeltaSetUnacknowledged,
    GenericMoveSet,
    GenericMoveSetUnacknowledged,

    LightLightnessGet,
    LightLightnessSet,
    LightLightnessSetUnacknowledged,
    LightLightnessDefaultGet,
    LightLightnessDefaultSet,
    LightLightnessDefaultSetUnacknowledged,
    LightCtlGet,
    LightCtlSet,
    LightCtlSetUnacknowledged,
    LightCtlDefaultGet,
    LightCtlDefaultSet,
    LightCtlDefaultSetUnacknowledged,
    LightHslGet,
    LightHslSet,
    LightHslSetUnacknowledged,
    LightHslDefaultGet,
    LightHslDefaultSet,
    LightHslDefaultSetUnacknowledged,

    SceneGet,
    SceneRegisterGet,
    SceneRecall,
    SceneRecallUnacknowledged,
    SceneStore,
    SceneStoreUnacknowledged,
    SceneDelete,
    SceneDeleteUnacknowledged,

    TimeGet,
    TimeSet,
    TimeZoneGet,
    TimeZoneSet,
    TaiUtcDeltaGet,
    TaiUtcDeltaSet,
    SchedulerGet,
    SchedulerActionGet,

    BlobTransferGet,
    BlobTransferStart,
    BlobTransferCancel,
    BlobBlockStart,
    BlobBlockGet,
    BlobChunkTransfer,

    VendorModelAcknowledged,
    VendorModelUnacknowledged,

    ProxyConfigSetFilterType,
    ProxyConfigAddAddress,
    ProxyConfigRemoveAddress,
}

/// Inbound message that completes a request.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum ExpectedStatus {
    Opcode(Opcode),
    /// Vendor replies use opcodes private to the vendor. Any opcode of the company matches.
    Vendor(CompanyID),
    /// Proxy Filter Status.
    ProxyFilterStatus,
}
impl ExpectedStatus {
    #[must_use]
    pub fn matches(self, opcode: Opcode, pdu_type: PduType) -> bool {
        match (self, pdu_type) {
            (ExpectedStatus::ProxyFilterStatus, PduType::ProxyConfiguration) => {
                opcode == Opcode::single(proxy::opcodes::FILTER_STATUS)
            }
            (ExpectedStatus::Opcode(o), PduType::Network) => o == opcode,
            (ExpectedStatus::Vendor(cid), PduType::Network) => opcode.company_id() == Some(cid),
            _ => false,
        }
    }
}

use MessageState::*;
/// Outgoing opcode -> state and the status that answers it. `None` is an unacknowledged message.
#[rustfmt::skip]
const STATES: &[(Opcode, MessageState, Option<Opcode>)] = &[
    (config::opcodes::COMPOSITION_DATA_GET, CompositionDataGet, Some(config::opcodes::COMPOSITION_DATA_STATUS)),
    (config::opcodes::DEFAULT_TTL_GET, DefaultTtlGet, Some(config::opcodes::DEFAULT_TTL_STATUS)),
    (config::opcodes::DEFAULT_TTL_SET, DefaultTtlSet, Some(config::opcodes::DEFAULT_TTL_STATUS)),
    (config::opcodes::RELAY_GET, RelayGet, Some(config::opcodes::RELAY_STATUS)),
    (config::opcodes::RELAY_SET, RelaySet, Some(config::opcodes::RELAY_STATUS)),
    (config::opcodes::GATT_PROXY_GET, GattProxyGet, Some(config::opcodes::GATT_PROXY_STATUS)),
    (config::opcodes::GATT_PROXY_SET, GattProxySet, Some(config::opcodes::GATT_PROXY_STATUS)),
    (config::opcodes::NETWORK_TRANSMIT_GET, NetworkTransmitGet, Some(config::opcodes::NETWORK_TRANSMIT_STATUS)),
    (config::opcodes::NETWORK_TRANSMIT_SET, NetworkTransmitSet, Some(config::opcodes::NETWORK_TRANSMIT_STATUS)),
    (config::opcodes::APP_KEY_ADD, AppKeyAdd, Some(config::opcodes::APP_KEY_STATUS)),
    (config::opcodes::APP_KEY_UPDATE, AppKeyUpdate, Some(config::opcodes::APP_KEY_STATUS)),
    (config::opcodes::APP_KEY_DELETE, AppKeyDelete, Some(config::opcodes::APP_KEY_STATUS)),
    (config::opcodes::MODEL_APP_BIND, ModelAppBind, Some(config::opcodes::MODEL_APP_STATUS)),
    (config::opcodes::MODEL_APP_UNBIND, ModelAppUnbind, Some(config::opcodes::MODEL_APP_STATUS)),
    (config::opcodes::MODEL_PUBLICATION_GET, ModelPublicationGet, Some(config::opcodes::MODEL_PUBLICATION_STATUS)),
    (config::opcodes::MODEL_PUBLICATION_SET, ModelPublicationSet, Some(config::opcodes::MODEL_PUBLICATION_STATUS)),
    (config::opcodes::MODEL_SUBSCRIPTION_ADD, ModelSubscriptionAdd, Some(config::opcodes::MODEL_SUBSCRIPTION_STATUS)),
    (config::opcodes::MODEL_SUBSCRIPTION_DELETE, ModelSubscriptionDelete, Some(config::opcodes::MODEL_SUBSCRIPTION_STATUS)),
    (config::opcodes::NODE_RESET, NodeReset, Some(config::opcodes::NODE_RESET_STATUS)),

    (generic::opcodes::ON_OFF_GET, GenericOnOffGet, Some(generic::opcodes::ON_OFF_STATUS)),
    (generic::opcodes::ON_OFF_SET, GenericOnOffSet, Some(generic::opcodes::ON_OFF_STATUS)),
    (generic::opcodes::ON_OFF_SET_UNACKNOWLEDGED, GenericOnOffSetUnacknowledged, None),
    (generic::opcodes::LEVEL_GET, GenericLevelGet, Some(generic::opcodes::LEVEL_STATUS)),
    (generic::opcodes::LEVEL_SET, GenericLevelSet, Some(generic::opcodes::LEVEL_STATUS)),
    (generic::opcodes::LEVEL_SET_UNACKNOWLEDGED, GenericLevelSetUnacknowledged, None),
    (generic::opcodes::DELTA_SET, GenericDeltaSet, Some(generic::opcodes::LEVEL_STATUS)),
    (generic::opcodes::DELTA_SET_UNACKNOWLEDGED, GenericDeltaSetUnacknowledged, None),
    (generic::opcodes::MOVE_SET, GenericMoveSet, Some(generic::opcodes::LEVEL_STATUS)),
    (generic::opcodes::MOVE_SET_UNACKNOWLEDGED, GenericMoveSetUnacknowledged, None),

    (lighting::opcodes::LIGHTNESS_GET, LightLightnessGet, Some(lighting::opcodes::LIGHTNESS_STATUS)),
    (lighting::opcodes::LIGHTNESS_SET, LightLightnessSet, Some(lighting::opcodes::LIGHTNESS_STATUS)),
    (lighting::opcodes::LIGHTNESS_SET_UNACKNOWLEDGED, LightLightnessSetUnacknowledged, None),
    (lighting::opcodes::LIGHTNESS_DEFAULT_GET, LightLightnessDefaultGet, Some(lighting::opcodes::LIGHTNESS_DEFAULT_STATUS)),
    (lighting::opcodes::LIGHTNESS_DEFAULT_SET, LightLightnessDefaultSet, Some(lighting::opcodes::LIGHTNESS_DEFAULT_STATUS)),
    (lighting::opcodes::LIGHTNESS_DEFAULT_SET_UNACKNOWLEDGED, LightLightnessDefaultSetUnacknowledged, None),
    (lighting::opcodes::CTL_GET, LightCtlGet, Some(lighting::opcodes::CTL_STATUS)),
    (lighting::opcodes::CTL_SET, LightCtlSet, Some(lighting::opcodes::CTL_STATUS)),
    (lighting::opcodes::CTL_SET_UNACKNOWLEDGED, LightCtlSetUnacknowledged, None),
    (lighting::opcodes::CTL_DEFAULT_GET, LightCtlDefaultGet, Some(lighting::opcodes::CTL_DEFAULT_STATUS)),
    (lighting::opcodes::CTL_DEFAULT_SET, LightCtlDefaultSet, Some(lighting::opcodes::CTL_DEFAULT_STATUS)),
    (lighting::opcodes::CTL_DEFAULT_SET_UNACKNOWLEDGED, LightCtlDefaultSetUnacknowledged, None),
    (lighting::opcodes::HSL_GET, LightHslGet, Some(lighting::opcodes::HSL_STATUS)),
    (lighting::opcodes::HSL_SET, LightHslSet, Some(lighting::opcodes::HSL_STATUS)),
    (lighting::opcodes::HSL_SET_UNACKNOWLEDGED, LightHslSetUnacknowledged, None),
    (lighting::opcodes::HSL_DEFAULT_GET, LightHslDefaultGet, Some(lighting::opcodes::HSL_DEFAULT_STATUS)),
    (lighting::opcodes::HSL_DEFAULT_SET, LightHslDefaultSet, Some(lighting::opcodes::HSL_DEFAULT_STATUS)),
    (lighting::opcodes::HSL_DEFAULT_SET_UNACKNOWLEDGED, LightHslDefaultSetUnacknowledged, None),

    (scene::opcodes::SCENE_GET, SceneGet, Some(scene::opcodes::SCENE_STATUS)),
    (scene::opcodes::SCENE_REGISTER_GET, SceneRegisterGet, Some(scene::opcodes::SCENE_REGISTER_STATUS)),
    (scene::opcodes::SCENE_RECALL, SceneRecall, Some(scene::opcodes::SCENE_STATUS)),
    (scene::opcodes::SCENE_RECALL_UNACKNOWLEDGED, SceneRecallUnacknowledged, None),
    (scene::opcodes::SCENE_STORE, SceneStore, Some(scene::opcodes::SCENE_REGISTER_STATUS)),
    (scene::opcodes::SCENE_STORE_UNACKNOWLEDGED, SceneStoreUnacknowledged, None),
    (scene::opcodes::SCENE_DELETE, SceneDelete, Some(scene::opcodes::SCENE_REGISTER_STATUS)),
    (scene::opcodes::SCENE_DELETE_UNACKNOWLEDGED, SceneDeleteUnacknowledged, None),

    (time::opcodes::TIME_GET, TimeGet, Some(time::opcodes::TIME_STATUS)),
    (time::opcodes::TIME_SET, TimeSet, Some(time::opcodes::TIME_STATUS)),
    (time::opcodes::TIME_ZONE_GET, TimeZoneGet, Some(time::opcodes::TIME_ZONE_STATUS)),
    (time::opcodes::TIME_ZONE_SET, TimeZoneSet, Some(time::opcodes::TIME_ZONE_STATUS)),
    (time::opcodes::TAI_UTC_DELTA_GET, TaiUtcDeltaGet, Some(time::opcodes::TAI_UTC_DELTA_STATUS)),
    (time::opcodes::TAI_UTC_DELTA_SET, TaiUtcDeltaSet, Some(time::opcodes::TAI_UTC_DELTA_STATUS)),
    (scheduler::opcodes::SCHEDULER_GET, SchedulerGet, Some(scheduler::opcodes::SCHEDULER_STATUS)),
    (scheduler::opcodes::SCHEDULER_ACTION_GET, SchedulerActionGet, Some(scheduler::opcodes::SCHEDULER_ACTION_STATUS)),

    (blob::opcodes::BLOB_TRANSFER_GET, BlobTransferGet, Some(blob::opcodes::BLOB_TRANSFER_STATUS)),
    (blob::opcodes::BLOB_TRANSFER_START, BlobTransferStart, Some(blob::opcodes::BLOB_TRANSFER_STATUS)),
    (blob::opcodes::BLOB_TRANSFER_CANCEL, BlobTransferCancel, Some(blob::opcodes::BLOB_TRANSFER_STATUS)),
    (blob::opcodes::BLOB_BLOCK_START, BlobBlockStart, Some(blob::opcodes::BLOB_BLOCK_STATUS)),
    (blob::opcodes::BLOB_BLOCK_GET, BlobBlockGet, Some(blob::opcodes::BLOB_BLOCK_STATUS)),
    (blob::opcodes::BLOB_CHUNK_TRANSFER, BlobChunkTransfer, None),
];

fn lookup(opcode: Opcode) -> Option<(MessageState, Option<ExpectedStatus>)> {
    STATES
        .iter()
        .find(|(o, _, _)| *o == opcode)
        .map(|&(_, state, status)| (state, status.map(ExpectedStatus::Opcode)))
}

/// Picks the state for `message` and the status that completes it. `None` means no state exists
/// for this message.
#[must_use]
pub fn resolve(message: &MeshMessage) -> Option<(MessageState, Option<ExpectedStatus>)> {
    match message {
        MeshMessage::Generic {
            message: ModelMessage::Vendor(vendor),
            ..
        } => Some(if vendor.acked {
            (
                VendorModelAcknowledged,
                Some(ExpectedStatus::Vendor(vendor.company_id)),
            )
        } else {
            (VendorModelUnacknowledged, None)
        }),
        MeshMessage::Config { .. } | MeshMessage::Generic { .. } => lookup(message.opcode()),
        MeshMessage::ProxyConfig(proxy) => {
            let state = match proxy {
                ProxyConfigMessage::SetFilterType(_) => ProxyConfigSetFilterType,
                ProxyConfigMessage::AddAddresses(_) => ProxyConfigAddAddress,
                ProxyConfigMessage::RemoveAddresses(_) => ProxyConfigRemoveAddress,
            };
            Some((state, Some(ExpectedStatus::ProxyFilterStatus)))
        }
        MeshMessage::GenericAccess(m) => Some((
            GenericAccessMessage,
            m.expected_status.map(ExpectedStatus::Opcode),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::AppKeyIndex;
    use crate::models::generic::OnOffMessage;
    use crate::models::proxy::FilterType;
    use crate::models::vendor::VendorMessage;
    use std::collections::BTreeSet;

    #[test]
    fn test_table_has_no_duplicates() {
        let opcodes: BTreeSet<Opcode> = STATES.iter().map(|(o, _, _)| *o).collect();
        let states: BTreeSet<MessageState> = STATES.iter().map(|(_, s, _)| *s).collect();
        assert_eq!(opcodes.len(), STATES.len());
        assert_eq!(states.len(), STATES.len());
        assert!(!states.contains(&NoOperation));
    }
    #[test]
    fn test_acked_flag_agrees_with_table() {
        let get = MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::Get));
        assert_eq!(
            resolve(&get),
            Some((
                GenericOnOffGet,
                Some(ExpectedStatus::Opcode(generic::opcodes::ON_OFF_STATUS))
            ))
        );
        let unacked = MeshMessage::generic(
            AppKeyIndex(0),
            ModelMessage::OnOff(OnOffMessage::set_unacknowledged(true)),
        );
        assert!(!unacked.is_acked());
        assert_eq!(resolve(&unacked), Some((GenericOnOffSetUnacknowledged, None)));
    }
    #[test]
    fn test_proxy_and_config_opcodes_dont_collide() {
        let proxy = MeshMessage::ProxyConfig(ProxyConfigMessage::SetFilterType(FilterType::WhiteList));
        let (state, status) = resolve(&proxy).unwrap();
        assert_eq!(state, ProxyConfigSetFilterType);
        let status = status.unwrap();
        assert!(status.matches(Opcode::single(0x03), PduType::ProxyConfiguration));
        assert!(!status.matches(Opcode::single(0x03), PduType::Network));
    }
    #[test]
    fn test_vendor_status_matches_company() {
        let message = MeshMessage::generic(
            AppKeyIndex(0),
            ModelMessage::Vendor(VendorMessage::new(0x01, CompanyID(0x0059), vec![], true)),
        );
        let (state, status) = resolve(&message).unwrap();
        assert_eq!(state, VendorModelAcknowledged);
        let status = status.unwrap();
        assert!(status.matches(Opcode::vendor(0x02, CompanyID(0x0059)), PduType::Network));
        assert!(!status.matches(Opcode::vendor(0x02, CompanyID(0x0060)), PduType::Network));
    }
}
