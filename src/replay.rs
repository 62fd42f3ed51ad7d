//! Replay Cache based on a BTreeMap that keeps track of the last IV Index and seq per src address.
//! A PDU is only accepted if it's newer than everything seen before from the same source.
use crate::address::UnicastAddress;
use crate::mesh::{IVIndex, SequenceNumber};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

#[derive(Ord, PartialOrd, Eq, PartialEq, Copy, Clone, Hash, Debug)]
pub struct CacheEntry {
    pub iv_index: IVIndex,
    pub seq: SequenceNumber,
}
impl CacheEntry {
    /// `true` if `(iv_index, seq)` isn't newer than this entry.
    #[must_use]
    pub fn is_old(&self, iv_index: IVIndex, seq: SequenceNumber) -> bool {
        (iv_index, seq) <= (self.iv_index, self.seq)
    }
}
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Cache {
    map: BTreeMap<UnicastAddress, CacheEntry>,
}
impl Cache {
    #[must_use]
    pub fn new() -> Cache {
        Cache::default()
    }
    #[must_use]
    pub fn get_entry(&self, address: UnicastAddress) -> Option<&CacheEntry> {
        self.map.get(&address)
    }
    /// Returns `true` if the PDU is a replay. Otherwise records it as the newest PDU from `src` and
    /// returns `false`.
    pub fn replay_check(
        &mut self,
        src: UnicastAddress,
        iv_index: IVIndex,
        seq: SequenceNumber,
    ) -> bool {
        match self.map.entry(src) {
            Entry::Vacant(v) => {
                v.insert(CacheEntry { iv_index, seq });
                false
            }
            Entry::Occupied(mut o) => {
                if o.get().is_old(iv_index, seq) {
                    true
                } else {
                    o.insert(CacheEntry { iv_index, seq });
                    false
                }
            }
        }
    }
    /// Forgets entries from before `iv_index - 1`. Called after an IV Update.
    pub fn collect_garbage(&mut self, iv_index: IVIndex) {
        let oldest = iv_index.0.saturating_sub(1);
        self.map.retain(|_, e| e.iv_index.0 >= oldest);
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
    fn test_replay_check() {
        let mut cache = Cache::new();
        let src = UnicastAddress::new(0x0005);
        let iv = IVIndex(10);
        assert!(!cache.replay_check(src, iv, SequenceNumber::new(5)));
        assert!(cache.replay_check(src, iv, SequenceNumber::new(5)));
        assert!(cache.replay_check(src, iv, SequenceNumber::new(4)));
        assert!(!cache.replay_check(src, iv, SequenceNumber::new(6)));
        // New IV Index resets the sequence space.
        assert!(!cache.replay_check(src, IVIndex(11), SequenceNumber::new(0)));
        assert!(cache.replay_check(src, iv, SequenceNumber::new(100)));
        assert!(!cache.replay_check(UnicastAddress::new(0x0006), iv, SequenceNumber::new(0)));
    }
    #[test]
    fn test_collect_garbage() {
        let mut cache = Cache::new();
        cache.replay_check(UnicastAddress::new(1), IVIndex(1), SequenceNumber::new(1));
        cache.replay_check(UnicastAddress::new(2), IVIndex(3), SequenceNumber::new(1));
        cache.collect_garbage(IVIndex(4));
        assert_eq!(cache.len(), 1);
        assert!(cache.get_entry(UnicastAddress::new(1)).is_none());
    }
}
