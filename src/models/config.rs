//! Foundation Configuration messages. Always secured with the destination node's device key.
use crate::access::{ModelIdentifier, Opcode};
use crate::address::{Address, UnicastAddress};
use crate::crypto::key::AppKey;
use crate::mesh::{
    pack_key_indexes, unpack_key_indexes, AppKeyIndex, CompanyID, NetKeyIndex, KEY_INDEX_MAX, TTL,
};
use crate::models::{MessagePackError, PackableMessage, Reader};
use core::convert::{TryFrom, TryInto};

pub mod opcodes {
    use crate::access::Opcode;
    pub const COMPOSITION_DATA_GET: Opcode = Opcode::double(0x8008);
    pub const COMPOSITION_DATA_STATUS: Opcode = Opcode::single(0x02);
    pub const DEFAULT_TTL_GET: Opcode = Opcode::double(0x800C);
    pub const DEFAULT_TTL_SET: Opcode = Opcode::double(0x800D);
    pub const DEFAULT_TTL_STATUS: Opcode = Opcode::double(0x800E);
    pub const GATT_PROXY_GET: Opcode = Opcode::double(0x8012);
    pub const GATT_PROXY_SET: Opcode = Opcode::double(0x8013);
    pub const GATT_PROXY_STATUS: Opcode = Opcode::double(0x8014);
    pub const MODEL_PUBLICATION_GET: Opcode = Opcode::double(0x8018);
    pub const MODEL_PUBLICATION_SET: Opcode = Opcode::single(0x03);
    pub const MODEL_PUBLICATION_STATUS: Opcode = Opcode::double(0x8019);
    pub const MODEL_SUBSCRIPTION_ADD: Opcode = Opcode::double(0x801B);
    pub const MODEL_SUBSCRIPTION_DELETE: Opcode = Opcode::double(0x801C);
    pub const MODEL_SUBSCRIPTION_STATUS: Opcode = Opcode::double(0x801F);
    pub const NETWORK_TRANSMIT_GET: Opcode = Opcode::double(0x8023);
    pub const NETWORK_TRANSMIT_SET: Opcode = Opcode::double(0x8024);
    pub const NETWORK_TRANSMIT_STATUS: Opcode = Opcode::double(0x8025);
    pub const RELAY_GET: Opcode = Opcode::double(0x8026);
    pub const RELAY_SET: Opcode = Opcode::double(0x8027);
    pub const RELAY_STATUS: Opcode = Opcode::double(0x8028);
    pub const APP_KEY_ADD: Opcode = Opcode::single(0x00);
    pub const APP_KEY_UPDATE: Opcode = Opcode::single(0x01);
    pub const APP_KEY_DELETE: Opcode = Opcode::double(0x8000);
    pub const APP_KEY_STATUS: Opcode = Opcode::double(0x8003);
    pub const MODEL_APP_BIND: Opcode = Opcode::double(0x803D);
    pub const MODEL_APP_STATUS: Opcode = Opcode::double(0x803E);
    pub const MODEL_APP_UNBIND: Opcode = Opcode::double(0x803F);
    pub const NODE_RESET: Opcode = Opcode::double(0x8049);
    pub const NODE_RESET_STATUS: Opcode = Opcode::double(0x804A);
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum RelayState {
    Disabled = 0x00,
    Enabled = 0x01,
    NotSupported = 0x02,
}
impl TryFrom<u8> for RelayState {
    type Error = MessagePackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(RelayState::Disabled),
            0x01 => Ok(RelayState::Enabled),
            0x02 => Ok(RelayState::NotSupported),
            _ => Err(MessagePackError::BadBytes),
        }
    }
}
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum GATTProxyState {
    Disabled = 0x00,
    Enabled = 0x01,
    NotSupported = 0x02,
}
impl TryFrom<u8> for GATTProxyState {
    type Error = MessagePackError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(GATTProxyState::Disabled),
            0x01 => Ok(GATTProxyState::Enabled),
            0x02 => Ok(GATTProxyState::NotSupported),
            _ => Err(MessagePackError::BadBytes),
        }
    }
}

/// Transmit count (3 bits) and interval steps (5 bits), shared by Relay Retransmit, Network
/// Transmit and Publish Retransmit. The interval is `(steps + 1) * 10ms` (`50ms` for publication).
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct TransmitInterval {
    pub count: u8,
    pub steps: u8,
}
impl TransmitInterval {
    #[must_use]
    pub fn new(count: u8, steps: u8) -> Self {
        Self {
            count: count & 0x07,
            steps: steps & 0x1F,
        }
    }
}
impl From<TransmitInterval> for u8 {
    fn from(t: TransmitInterval) -> Self {
        (t.count & 0x07) | ((t.steps & 0x1F) << 3)
    }
}
impl From<u8> for TransmitInterval {
    fn from(b: u8) -> Self {
        TransmitInterval::new(b & 0x07, b >> 3)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Publication {
    pub element: UnicastAddress,
    pub address: Address,
    pub app_key_index: AppKeyIndex,
    pub credential: bool,
    /// `0xFF` means "use the node's Default TTL".
    pub ttl: u8,
    pub period: u8,
    pub retransmit: TransmitInterval,
    pub model: ModelIdentifier,
}
impl Publication {
    fn pack_into(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.element.to_bytes_le());
        buffer.extend_from_slice(&self.address.value().to_le_bytes());
        let index = (self.app_key_index.0 & KEY_INDEX_MAX) | (u16::from(self.credential) << 12);
        buffer.extend_from_slice(&index.to_le_bytes());
        buffer.push(self.ttl);
        buffer.push(self.period);
        buffer.push(self.retransmit.into());
        self.model.pack_into(buffer);
    }
    fn unpack_from(reader: &mut Reader<'_>) -> Result<Self, MessagePackError> {
        let element = read_element(reader)?;
        let address = Address::from(reader.u16()?);
        let index = reader.u16()?;
        let ttl = reader.u8()?;
        let period = reader.u8()?;
        let retransmit = reader.u8()?.into();
        let model = read_model(reader)?;
        Ok(Publication {
            element,
            address,
            app_key_index: AppKeyIndex(index & KEY_INDEX_MAX),
            credential: index & (1 << 12) != 0,
            ttl,
            period,
            retransmit,
            model,
        })
    }
}
fn read_element(reader: &mut Reader<'_>) -> Result<UnicastAddress, MessagePackError> {
    UnicastAddress::try_from(reader.u16()?).map_err(|_| MessagePackError::BadBytes)
}
fn read_model(reader: &mut Reader<'_>) -> Result<ModelIdentifier, MessagePackError> {
    ModelIdentifier::unpack_from(reader.rest()).ok_or(MessagePackError::BadLength)
}
fn read_key_indexes(reader: &mut Reader<'_>) -> Result<(NetKeyIndex, AppKeyIndex), MessagePackError> {
    let b = reader.take(3)?;
    Ok(unpack_key_indexes([b[0], b[1], b[2]]))
}

/// Outgoing configuration requests.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum ConfigMessage {
    CompositionDataGet {
        page: u8,
    },
    DefaultTTLGet,
    DefaultTTLSet(TTL),
    RelayGet,
    RelaySet {
        relay: RelayState,
        retransmit: TransmitInterval,
    },
    GATTProxyGet,
    GATTProxySet(GATTProxyState),
    NetworkTransmitGet,
    NetworkTransmitSet(TransmitInterval),
    AppKeyAdd {
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
        app_key: AppKey,
    },
    AppKeyUpdate {
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
        app_key: AppKey,
    },
    AppKeyDelete {
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
    },
    ModelAppBind {
        element: UnicastAddress,
        app_key_index: AppKeyIndex,
        model: ModelIdentifier,
    },
    ModelAppUnbind {
        element: UnicastAddress,
        app_key_index: AppKeyIndex,
        model: ModelIdentifier,
    },
    ModelPublicationGet {
        element: UnicastAddress,
        model: ModelIdentifier,
    },
    ModelPublicationSet(Publication),
    ModelSubscriptionAdd {
        element: UnicastAddress,
        address: Address,
        model: ModelIdentifier,
    },
    ModelSubscriptionDelete {
        element: UnicastAddress,
        address: Address,
        model: ModelIdentifier,
    },
    NodeReset,
}
impl PackableMessage for ConfigMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            ConfigMessage::CompositionDataGet { .. } => COMPOSITION_DATA_GET,
            ConfigMessage::DefaultTTLGet => DEFAULT_TTL_GET,
            ConfigMessage::DefaultTTLSet(_) => DEFAULT_TTL_SET,
            ConfigMessage::RelayGet => RELAY_GET,
            ConfigMessage::RelaySet { .. } => RELAY_SET,
            ConfigMessage::GATTProxyGet => GATT_PROXY_GET,
            ConfigMessage::GATTProxySet(_) => GATT_PROXY_SET,
            ConfigMessage::NetworkTransmitGet => NETWORK_TRANSMIT_GET,
            ConfigMessage::NetworkTransmitSet(_) => NETWORK_TRANSMIT_SET,
            ConfigMessage::AppKeyAdd { .. } => APP_KEY_ADD,
            ConfigMessage::AppKeyUpdate { .. } => APP_KEY_UPDATE,
            ConfigMessage::AppKeyDelete { .. } => APP_KEY_DELETE,
            ConfigMessage::ModelAppBind { .. } => MODEL_APP_BIND,
            ConfigMessage::ModelAppUnbind { .. } => MODEL_APP_UNBIND,
            ConfigMessage::ModelPublicationGet { .. } => MODEL_PUBLICATION_GET,
            ConfigMessage::ModelPublicationSet(_) => MODEL_PUBLICATION_SET,
            ConfigMessage::ModelSubscriptionAdd { .. } => MODEL_SUBSCRIPTION_ADD,
            ConfigMessage::ModelSubscriptionDelete { .. } => MODEL_SUBSCRIPTION_DELETE,
            ConfigMessage::NodeReset => NODE_RESET,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            ConfigMessage::CompositionDataGet { page } => buffer.push(*page),
            ConfigMessage::DefaultTTLGet
            | ConfigMessage::RelayGet
            | ConfigMessage::GATTProxyGet
            | ConfigMessage::NetworkTransmitGet
            | ConfigMessage::NodeReset => (),
            ConfigMessage::DefaultTTLSet(ttl) => {
                // TTL 1 is prohibited for Default TTL.
                if ttl.value() == 1 {
                    return Err(MessagePackError::BadState);
                }
                buffer.push(ttl.value())
            }
            ConfigMessage::RelaySet { relay, retransmit } => {
                buffer.push(*relay as u8);
                buffer.push((*retransmit).into());
            }
            ConfigMessage::GATTProxySet(state) => buffer.push(*state as u8),
            ConfigMessage::NetworkTransmitSet(transmit) => buffer.push((*transmit).into()),
            ConfigMessage::AppKeyAdd {
                net_key_index,
                app_key_index,
                app_key,
            }
            | ConfigMessage::AppKeyUpdate {
                net_key_index,
                app_key_index,
                app_key,
            } => {
                buffer.extend_from_slice(&pack_key_indexes(*net_key_index, *app_key_index));
                buffer.extend_from_slice(app_key.as_ref());
            }
            ConfigMessage::AppKeyDelete {
                net_key_index,
                app_key_index,
            } => buffer.extend_from_slice(&pack_key_indexes(*net_key_index, *app_key_index)),
            ConfigMessage::ModelAppBind {
                element,
                app_key_index,
                model,
            }
            | ConfigMessage::ModelAppUnbind {
                element,
                app_key_index,
                model,
            } => {
                buffer.extend_from_slice(&element.to_bytes_le());
                buffer.extend_from_slice(&app_key_index.0.to_le_bytes());
                model.pack_into(buffer);
            }
            ConfigMessage::ModelPublicationGet { element, model } => {
                buffer.extend_from_slice(&element.to_bytes_le());
                model.pack_into(buffer);
            }
            ConfigMessage::ModelPublicationSet(publication) => publication.pack_into(buffer),
            ConfigMessage::ModelSubscriptionAdd {
                element,
                address,
                model,
            }
            | ConfigMessage::ModelSubscriptionDelete {
                element,
                address,
                model,
            } => {
                buffer.extend_from_slice(&element.to_bytes_le());
                buffer.extend_from_slice(&address.value().to_le_bytes());
                model.pack_into(buffer);
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        true
    }
}

/// Composition Data page header. Element descriptions are kept raw.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CompositionData {
    pub page: u8,
    pub cid: CompanyID,
    pub pid: u16,
    pub vid: u16,
    pub crpl: u16,
    pub features: u16,
    pub elements: Vec<u8>,
}

/// Incoming configuration statuses.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum ConfigStatus {
    CompositionData(CompositionData),
    DefaultTTL(TTL),
    Relay {
        relay: RelayState,
        retransmit: TransmitInterval,
    },
    GATTProxy(GATTProxyState),
    NetworkTransmit(TransmitInterval),
    AppKey {
        status: u8,
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
    },
    ModelApp {
        status: u8,
        element: UnicastAddress,
        app_key_index: AppKeyIndex,
        model: ModelIdentifier,
    },
    ModelPublication {
        status: u8,
        publication: Publication,
    },
    ModelSubscription {
        status: u8,
        element: UnicastAddress,
        address: Address,
        model: ModelIdentifier,
    },
    NodeReset,
}
impl ConfigStatus {
    pub fn unpack(opcode: Opcode, parameters: &[u8]) -> Result<ConfigStatus, MessagePackError> {
        use opcodes::*;
        let mut r = Reader::new(parameters);
        let status = match opcode {
            COMPOSITION_DATA_STATUS => ConfigStatus::CompositionData(CompositionData {
                page: r.u8()?,
                cid: CompanyID(r.u16()?),
                pid: r.u16()?,
                vid: r.u16()?,
                crpl: r.u16()?,
                features: r.u16()?,
                elements: r.rest().to_vec(),
            }),
            DEFAULT_TTL_STATUS => ConfigStatus::DefaultTTL(
                r.u8()?
                    .try_into()
                    .map_err(|_| MessagePackError::BadBytes)?,
            ),
            RELAY_STATUS => ConfigStatus::Relay {
                relay: r.u8()?.try_into()?,
                retransmit: r.u8()?.into(),
            },
            GATT_PROXY_STATUS => ConfigStatus::GATTProxy(r.u8()?.try_into()?),
            NETWORK_TRANSMIT_STATUS => ConfigStatus::NetworkTransmit(r.u8()?.into()),
            APP_KEY_STATUS => {
                let status = r.u8()?;
                let (net_key_index, app_key_index) = read_key_indexes(&mut r)?;
                ConfigStatus::AppKey {
                    status,
                    net_key_index,
                    app_key_index,
                }
            }
            MODEL_APP_STATUS => ConfigStatus::ModelApp {
                status: r.u8()?,
                element: read_element(&mut r)?,
                app_key_index: AppKeyIndex(r.u16()? & KEY_INDEX_MAX),
                model: read_model(&mut r)?,
            },
            MODEL_PUBLICATION_STATUS => ConfigStatus::ModelPublication {
                status: r.u8()?,
                publication: Publication::unpack_from(&mut r)?,
            },
            MODEL_SUBSCRIPTION_STATUS => ConfigStatus::ModelSubscription {
                status: r.u8()?,
                element: read_element(&mut r)?,
                address: Address::from(r.u16()?),
                model: read_model(&mut r)?,
            },
            NODE_RESET_STATUS => ConfigStatus::NodeReset,
            _ => return Err(MessagePackError::BadState),
        };
        r.finish()?;
        Ok(status)
    }
    /// Foundation status code, for the statuses that carry one. `0x00` is success.
    #[must_use]
    pub fn status_code(&self) -> Option<u8> {
        match self {
            ConfigStatus::AppKey { status, .. }
            | ConfigStatus::ModelApp { status, .. }
            | ConfigStatus::ModelPublication { status, .. }
            | ConfigStatus::ModelSubscription { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ModelID;

    #[test]
    fn test_app_key_add() {
        let key = AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap();
        let msg = ConfigMessage::AppKeyAdd {
            net_key_index: NetKeyIndex(0x456),
            app_key_index: AppKeyIndex(0x123),
            app_key: key,
        };
        let params = msg.parameters().unwrap();
        assert_eq!(&params[..3], &[0x56, 0x34, 0x12]);
        assert_eq!(&params[3..], key.as_ref());
        assert_eq!(msg.opcode(), Opcode::single(0x00));
    }
    #[test]
    fn test_model_app_bind_vendor_model() {
        let msg = ConfigMessage::ModelAppBind {
            element: UnicastAddress::new(0x0102),
            app_key_index: AppKeyIndex(1),
            model: ModelIdentifier::new_vendor(ModelID(0x0001), CompanyID(0x00E0)),
        };
        assert_eq!(
            msg.parameters().unwrap(),
            vec![0x02, 0x01, 0x01, 0x00, 0xE0, 0x00, 0x01, 0x00]
        );
    }
    #[test]
    fn test_relay_status() {
        let status = ConfigStatus::unpack(opcodes::RELAY_STATUS, &[0x01, 0b0100_1010]).unwrap();
        assert_eq!(
            status,
            ConfigStatus::Relay {
                relay: RelayState::Enabled,
                retransmit: TransmitInterval::new(2, 9),
            }
        );
        assert_eq!(
            ConfigStatus::unpack(opcodes::RELAY_STATUS, &[0x03, 0x00]),
            Err(MessagePackError::BadBytes)
        );
    }
    #[test]
    fn test_publication_round_trip() {
        let publication = Publication {
            element: UnicastAddress::new(0x0003),
            address: Address::from(0xC000),
            app_key_index: AppKeyIndex(0x0ABC),
            credential: true,
            ttl: 0xFF,
            period: 0x29,
            retransmit: TransmitInterval::new(1, 3),
            model: ModelIdentifier::new_sig(ModelID(0x1000)),
        };
        let mut params = vec![0x00];
        params.extend(
            ConfigMessage::ModelPublicationSet(publication)
                .parameters()
                .unwrap(),
        );
        assert_eq!(
            ConfigStatus::unpack(opcodes::MODEL_PUBLICATION_STATUS, &params),
            Ok(ConfigStatus::ModelPublication {
                status: 0,
                publication
            })
        );
    }
    #[test]
    fn test_composition_data() {
        let params = [
            0x00, 0x59, 0x00, 0x01, 0x00, 0x02, 0x00, 0x0A, 0x00, 0x03, 0x00, 0xAA, 0xBB,
        ];
        match ConfigStatus::unpack(opcodes::COMPOSITION_DATA_STATUS, &params).unwrap() {
            ConfigStatus::CompositionData(c) => {
                assert_eq!(c.cid, CompanyID(0x0059));
                assert_eq!(c.crpl, 10);
                assert_eq!(c.features, 3);
                assert_eq!(c.elements, vec![0xAA, 0xBB]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    #[test]
    fn test_default_ttl_set_rejects_one() {
        assert_eq!(
            ConfigMessage::DefaultTTLSet(TTL::new(1)).parameters(),
            Err(MessagePackError::BadState)
        );
    }
}
