//! Segmented message timers. The incomplete timer bounds how long a reassembly buffer may wait for
//! its missing segments. The acknowledgment timer bounds how long one of our own segmented
//! messages waits for a Segment Acknowledgment before its missing segments are resent.
//!
//! Each timer is a spawned tokio task. Expiries come back over a channel so the owner of the
//! handler decides what to do with them on its own task.
use crate::address::UnicastAddress;
use crate::lower::SeqZero;
use crate::reassembler::ReassemblyKey;
use core::time::Duration;
use slog::Logger;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One of our segmented messages waiting for acknowledgment.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct OutgoingSegmentsKey {
    pub dst: UnicastAddress,
    pub seq_zero: SeqZero,
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum TimerKey {
    Incomplete(ReassemblyKey),
    SegmentAck(OutgoingSegmentsKey),
}

/// A fired timer. `generation` tells a stale expiry (the timer was restarted or cancelled after it
/// fired) from a live one.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct Expiry {
    pub key: TimerKey,
    pub generation: u64,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct SegmentTimers {
    logger: Logger,
    sender: mpsc::UnboundedSender<Expiry>,
    timers: BTreeMap<TimerKey, Timer>,
    next_generation: u64,
}
impl SegmentTimers {
    /// Must be called from inside a tokio runtime since timers are spawned tasks.
    #[must_use]
    pub fn new(parent_logger: &Logger) -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                logger: parent_logger.new(o!("component" => "segment_timers")),
                sender,
                timers: BTreeMap::new(),
                next_generation: 0,
            },
            receiver,
        )
    }
    /// (Re)starts the timer for `key`.
    pub fn start(&mut self, key: TimerKey, timeout: Duration) {
        self.cancel(&key);
        let generation = self.next_generation;
        self.next_generation += 1;
        let sender = self.sender.clone();
        let logger = self.logger.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if sender.send(Expiry { key, generation }).is_err() {
                trace!(logger, "expiry dropped, session shut down"; "key" => ?key);
            }
        });
        trace!(self.logger, "timer started"; "key" => ?key, "generation" => generation);
        self.timers.insert(key, Timer { generation, handle });
    }
    pub fn start_incomplete(&mut self, key: ReassemblyKey, timeout: Duration) {
        self.start(TimerKey::Incomplete(key), timeout);
    }
    pub fn start_ack(&mut self, key: OutgoingSegmentsKey, timeout: Duration) {
        self.start(TimerKey::SegmentAck(key), timeout);
    }
    /// Returns `true` if a timer was running.
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
    /// Cancels every timer belonging to `peer`.
    pub fn cancel_peer(&mut self, peer: UnicastAddress) {
        let keys: Vec<TimerKey> = self
            .timers
            .keys()
            .filter(|k| match k {
                TimerKey::Incomplete(r) => r.src == peer,
                TimerKey::SegmentAck(o) => o.dst == peer,
            })
            .copied()
            .collect();
        for key in &keys {
            self.cancel(key);
        }
    }
    #[must_use]
    pub fn is_running(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
    /// Claims `expiry`. Returns `false` for a stale expiry, which must be ignored.
    pub fn take_expired(&mut self, expiry: &Expiry) -> bool {
        match self.timers.get(&expiry.key) {
            Some(timer) if timer.generation == expiry.generation => {
                self.timers.remove(&expiry.key);
                true
            }
            _ => {
                trace!(self.logger, "stale expiry"; "key" => ?expiry.key);
                false
            }
        }
    }
}
impl Drop for SegmentTimers {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::testing;

    fn key(seq_zero: u16) -> ReassemblyKey {
        ReassemblyKey {
            src: testing::NODE,
            seq_zero: SeqZero::new(seq_zero),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires() {
        let (mut timers, mut expiries) = SegmentTimers::new(&testing::logger());
        timers.start_incomplete(key(1), Duration::from_secs(10));
        let expiry = expiries.recv().await.unwrap();
        assert_eq!(expiry.key, TimerKey::Incomplete(key(1)));
        assert!(timers.take_expired(&expiry));
        assert!(timers.is_empty());
    }
    #[tokio::test(start_paused = true)]
    async fn test_restart_makes_old_expiry_stale() {
        let (mut timers, mut expiries) = SegmentTimers::new(&testing::logger());
        timers.start_incomplete(key(1), Duration::from_secs(1));
        let stale = Expiry {
            key: TimerKey::Incomplete(key(1)),
            generation: 0,
        };
        timers.start_incomplete(key(1), Duration::from_secs(10));
        assert!(!timers.take_expired(&stale));
        let expiry = expiries.recv().await.unwrap();
        assert_eq!(expiry.generation, 1);
        assert!(timers.take_expired(&expiry));
    }
    #[tokio::test(start_paused = true)]
    async fn test_cancel_peer() {
        let (mut timers, mut expiries) = SegmentTimers::new(&testing::logger());
        timers.start_incomplete(key(1), Duration::from_secs(10));
        timers.start_ack(
            OutgoingSegmentsKey {
                dst: testing::NODE,
                seq_zero: SeqZero::new(2),
            },
            Duration::from_secs(10),
        );
        timers.start_incomplete(
            ReassemblyKey {
                src: testing::PROVISIONER,
                seq_zero: SeqZero::new(1),
            },
            Duration::from_secs(10),
        );
        timers.cancel_peer(testing::NODE);
        assert_eq!(timers.len(), 1);
        tokio::time::advance(Duration::from_secs(11)).await;
        let expiry = expiries.recv().await.unwrap();
        assert_eq!(
            expiry.key,
            TimerKey::Incomplete(ReassemblyKey {
                src: testing::PROVISIONER,
                seq_zero: SeqZero::new(1),
            })
        );
        assert!(expiries.try_recv().is_err());
    }
}
