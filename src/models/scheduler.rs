//! Scheduler model (client side: Get and Action Get).
use crate::access::Opcode;
use crate::models::{MessagePackError, PackableMessage, Reader};

pub mod opcodes {
    use crate::access::Opcode;
    pub const SCHEDULER_ACTION_GET: Opcode = Opcode::double(0x8248);
    pub const SCHEDULER_GET: Opcode = Opcode::double(0x8249);
    pub const SCHEDULER_STATUS: Opcode = Opcode::double(0x824A);
    pub const SCHEDULER_ACTION_STATUS: Opcode = Opcode::single(0x5F);
}

/// Schedule Register holds 16 entries.
pub const SCHEDULE_ENTRIES: u8 = 16;
const ENTRY_LEN: usize = 10;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SchedulerMessage {
    Get,
    ActionGet { index: u8 },
}
impl PackableMessage for SchedulerMessage {
    fn opcode(&self) -> Opcode {
        match self {
            SchedulerMessage::Get => opcodes::SCHEDULER_GET,
            SchedulerMessage::ActionGet { .. } => opcodes::SCHEDULER_ACTION_GET,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        if let SchedulerMessage::ActionGet { index } = self {
            if *index >= SCHEDULE_ENTRIES {
                return Err(MessagePackError::BadState);
            }
            buffer.push(*index);
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        true
    }
}

/// Bitfield of the defined entries in the Schedule Register. Bit n set means entry n is in use.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SchedulerStatus {
    pub schedules: u16,
}
impl SchedulerStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let schedules = r.u16()?;
        r.finish()?;
        Ok(SchedulerStatus { schedules })
    }
    pub fn defined(&self) -> impl Iterator<Item = u8> + '_ {
        (0..SCHEDULE_ENTRIES).filter(move |i| self.schedules & (1_u16 << *i) != 0)
    }
}

/// One Schedule Register entry. Packed LSB first into 80 bits.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct ScheduleEntry {
    pub index: u8,
    pub year: u8,
    pub month: u16,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub day_of_week: u8,
    pub action: u8,
    pub transition_time: u8,
    pub scene: u16,
}
/// (width in bits) of each field in packing order.
const FIELD_WIDTHS: [u32; 11] = [4, 7, 12, 5, 5, 6, 6, 7, 4, 8, 16];
impl ScheduleEntry {
    fn fields(&self) -> [u64; 11] {
        [
            self.index.into(),
            self.year.into(),
            self.month.into(),
            self.day.into(),
            self.hour.into(),
            self.minute.into(),
            self.second.into(),
            self.day_of_week.into(),
            self.action.into(),
            self.transition_time.into(),
            self.scene.into(),
        ]
    }
    #[must_use]
    pub fn pack(&self) -> [u8; ENTRY_LEN] {
        let mut v = 0_u128;
        let mut shift = 0_u32;
        for (value, width) in self.fields().iter().zip(FIELD_WIDTHS.iter()) {
            v |= u128::from(*value & ((1_u64 << *width) - 1)) << shift;
            shift += width;
        }
        let mut out = [0_u8; ENTRY_LEN];
        out.copy_from_slice(&v.to_le_bytes()[..ENTRY_LEN]);
        out
    }
    #[must_use]
    pub fn unpack(bytes: [u8; ENTRY_LEN]) -> Self {
        let mut full = [0_u8; 16];
        full[..ENTRY_LEN].copy_from_slice(&bytes);
        let v = u128::from_le_bytes(full);
        let mut f = [0_u64; 11];
        let mut shift = 0_u32;
        for (out, width) in f.iter_mut().zip(FIELD_WIDTHS.iter()) {
            *out = ((v >> shift) as u64) & ((1_u64 << *width) - 1);
            shift += width;
        }
        ScheduleEntry {
            index: f[0] as u8,
            year: f[1] as u8,
            month: f[2] as u16,
            day: f[3] as u8,
            hour: f[4] as u8,
            minute: f[5] as u8,
            second: f[6] as u8,
            day_of_week: f[7] as u8,
            action: f[8] as u8,
            transition_time: f[9] as u8,
            scene: f[10] as u16,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SchedulerActionStatus(pub ScheduleEntry);
impl SchedulerActionStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let mut bytes = [0_u8; ENTRY_LEN];
        bytes.copy_from_slice(r.take(ENTRY_LEN)?);
        r.finish()?;
        Ok(SchedulerActionStatus(ScheduleEntry::unpack(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_packing() {
        let entry = ScheduleEntry {
            index: 0x0F,
            year: 0x64,
            month: 0x0FFF,
            day: 0x1F,
            hour: 0x17,
            minute: 0x3C,
            second: 0x3D,
            day_of_week: 0x7F,
            action: 0x02,
            transition_time: 0x41,
            scene: 0xBEEF,
        };
        let bytes = entry.pack();
        // index in the low nibble, scene in the top 16 bits.
        assert_eq!(bytes[0] & 0x0F, 0x0F);
        assert_eq!(&bytes[8..], &[0xEF, 0xBE]);
        assert_eq!(ScheduleEntry::unpack(bytes), entry);
        assert_eq!(
            SchedulerActionStatus::unpack_from(&bytes).unwrap(),
            SchedulerActionStatus(entry)
        );
    }
    #[test]
    fn test_scheduler_status() {
        let status = SchedulerStatus::unpack_from(&[0x05, 0x80]).unwrap();
        assert_eq!(status.defined().collect::<Vec<_>>(), vec![0, 2, 15]);
        assert_eq!(
            SchedulerMessage::ActionGet { index: 16 }.parameters(),
            Err(MessagePackError::BadState)
        );
    }
}
