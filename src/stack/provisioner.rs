//! Local provisioner. Sole owner of the sequence number counter for its unicast address.
use crate::address::UnicastAddress;
use crate::mesh::{SequenceNumber, U24_MAX};
use crate::stack::SendError;
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct Provisioner {
    name: String,
    address: UnicastAddress,
    /// Next sequence number to hand out. `U24_MAX + 1` once exhausted.
    next: Mutex<u32>,
}
impl Provisioner {
    #[must_use]
    pub fn new(name: &str, address: UnicastAddress, next: SequenceNumber) -> Self {
        Self {
            name: name.to_owned(),
            address,
            next: Mutex::new(next.value()),
        }
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn address(&self) -> UnicastAddress {
        self.address
    }
    /// Allocates the next sequence number. Every call returns a bigger number than the last.
    pub fn next_seq(&self) -> Result<SequenceNumber, SendError> {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        if *next > U24_MAX {
            return Err(SendError::OutOfSeq);
        }
        let seq = SequenceNumber::new(*next);
        *next += 1;
        Ok(seq)
    }
    /// Sequence number the next call to `next_seq` returns.
    #[must_use]
    pub fn sequence_number(&self) -> u32 {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner)
    }
    /// Continues counting after `seq`. Never moves the counter backwards, so restoring an older
    /// saved value can't cause reuse.
    pub fn set_sequence_number(&self, seq: SequenceNumber) {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        *next = core::cmp::max(*next, seq.value() + 1);
    }
}
