//! Collection of security materials (Keys, NID, AID, etc) used for encryption and decryption.
use crate::crypto::key::{AppKey, EncryptionKey, NetKey, PrivacyKey};
use crate::crypto::{NetworkID, AID};
use crate::mesh::{AppKeyIndex, NetKeyIndex, NID};
use std::collections::BTreeMap;

#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash, Debug)]
pub struct NetworkKeys {
    nid: NID,
    encryption: EncryptionKey,
    privacy: PrivacyKey,
}

impl NetworkKeys {
    #[must_use]
    pub fn new(nid: NID, encryption: EncryptionKey, privacy: PrivacyKey) -> Self {
        Self {
            nid,
            encryption,
            privacy,
        }
    }
    #[must_use]
    pub fn nid(&self) -> NID {
        self.nid
    }
    #[must_use]
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption
    }
    #[must_use]
    pub fn privacy_key(&self) -> &PrivacyKey {
        &self.privacy
    }
}
impl From<&NetKey> for NetworkKeys {
    fn from(k: &NetKey) -> Self {
        k.network_keys()
    }
}

/// Everything the network layer needs for one NetKey, derived once.
#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash, Debug)]
pub struct NetworkSecurityMaterials {
    pub index: NetKeyIndex,
    pub net_key: NetKey,
    pub network_keys: NetworkKeys,
    pub network_id: NetworkID,
}
impl NetworkSecurityMaterials {
    #[must_use]
    pub fn new(index: NetKeyIndex, net_key: NetKey) -> Self {
        Self {
            index,
            net_key,
            network_keys: net_key.network_keys(),
            network_id: net_key.network_id(),
        }
    }
}

#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash, Debug)]
pub struct ApplicationSecurityMaterials {
    pub app_key: AppKey,
    pub aid: AID,
    pub net_key_index: NetKeyIndex,
}
impl ApplicationSecurityMaterials {
    #[must_use]
    pub fn new(app_key: AppKey, net_key_index: NetKeyIndex) -> Self {
        Self {
            app_key,
            aid: app_key.aid(),
            net_key_index,
        }
    }
}

/// Application keys by index. Several keys may share one AID (it's only 6 bits) so lookups by
/// AID return every candidate.
#[derive(Clone, Debug, Default)]
pub struct AppKeyMap {
    map: BTreeMap<AppKeyIndex, ApplicationSecurityMaterials>,
}
impl AppKeyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(
        &mut self,
        index: AppKeyIndex,
        materials: ApplicationSecurityMaterials,
    ) -> Option<ApplicationSecurityMaterials> {
        self.map.insert(index, materials)
    }
    pub fn remove(&mut self, index: AppKeyIndex) -> Option<ApplicationSecurityMaterials> {
        self.map.remove(&index)
    }
    #[must_use]
    pub fn get(&self, index: AppKeyIndex) -> Option<&ApplicationSecurityMaterials> {
        self.map.get(&index)
    }
    pub fn matching_aid(&self, aid: AID) -> impl Iterator<Item = &ApplicationSecurityMaterials> {
        self.map.values().filter(move |m| m.aid == aid)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&AppKeyIndex, &ApplicationSecurityMaterials)> {
        self.map.iter()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_aid() {
        let mut keys = AppKeyMap::new();
        let sample = AppKey::from_hex("63964771734fbd76e3b40519d1d94a48").unwrap();
        let other = AppKey::from_hex("3216d1509884b533248541792b877f98").unwrap();
        keys.insert(
            AppKeyIndex(0),
            ApplicationSecurityMaterials::new(sample, NetKeyIndex(0)),
        );
        keys.insert(
            AppKeyIndex(1),
            ApplicationSecurityMaterials::new(other, NetKeyIndex(0)),
        );
        let found: Vec<_> = keys.matching_aid(AID::new(0x26)).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].app_key, sample);
        assert_eq!(keys.matching_aid(AID::new(0x01)).count(), 0);
    }
    #[test]
    fn test_sample_network_keys() {
        let materials = NetworkSecurityMaterials::new(
            NetKeyIndex(0),
            NetKey::from_hex("7dd7364cd842ad18c17c2b820c84c3d6").unwrap(),
        );
        assert_eq!(materials.network_keys.nid(), NID::new(0x68));
        assert_eq!(
            materials.network_keys.encryption_key(),
            &EncryptionKey::from_hex("0953fa93e7caac9638f58820220a398e").unwrap()
        );
        assert_eq!(
            materials.network_keys.privacy_key(),
            &PrivacyKey::from_hex("8b84eedec100067d670971dd2aa700cf").unwrap()
        );
    }
}
