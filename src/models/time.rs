//! Time model. TAI seconds and TAI of change are 40 bit little endian values.
use crate::access::Opcode;
use crate::models::{push_u40, MessagePackError, PackableMessage, Reader};

pub mod opcodes {
    use crate::access::Opcode;
    pub const TIME_GET: Opcode = Opcode::double(0x8237);
    pub const TIME_SET: Opcode = Opcode::single(0x5C);
    pub const TIME_STATUS: Opcode = Opcode::single(0x5D);
    pub const TIME_ZONE_GET: Opcode = Opcode::double(0x823B);
    pub const TIME_ZONE_SET: Opcode = Opcode::double(0x823C);
    pub const TIME_ZONE_STATUS: Opcode = Opcode::double(0x823D);
    pub const TAI_UTC_DELTA_GET: Opcode = Opcode::double(0x823E);
    pub const TAI_UTC_DELTA_SET: Opcode = Opcode::double(0x823F);
    pub const TAI_UTC_DELTA_STATUS: Opcode = Opcode::double(0x8240);
}

const TAI_SECONDS_MAX: u64 = (1 << 40) - 1;
const TAI_UTC_DELTA_MAX: u16 = 0x7FFF;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct TimeState {
    pub tai_seconds: u64,
    pub subsecond: u8,
    pub uncertainty: u8,
    pub time_authority: bool,
    pub tai_utc_delta: u16,
    pub time_zone_offset: u8,
}
impl TimeState {
    /// A zero `tai_seconds` means the time is unknown and only the seconds are sent.
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.tai_seconds != 0
    }
    fn pack_into(&self, buffer: &mut Vec<u8>, full: bool) -> Result<(), MessagePackError> {
        if self.tai_seconds > TAI_SECONDS_MAX || self.tai_utc_delta > TAI_UTC_DELTA_MAX {
            return Err(MessagePackError::BadState);
        }
        push_u40(buffer, self.tai_seconds);
        if full || self.is_known() {
            buffer.push(self.subsecond);
            buffer.push(self.uncertainty);
            let flags = u16::from(self.time_authority) | (self.tai_utc_delta << 1);
            buffer.extend_from_slice(&flags.to_le_bytes());
            buffer.push(self.time_zone_offset);
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum TimeMessage {
    Get,
    Set(TimeState),
    ZoneGet,
    ZoneSet {
        new_offset: u8,
        tai_of_change: u64,
    },
    TaiUtcDeltaGet,
    TaiUtcDeltaSet {
        new_delta: u16,
        tai_of_change: u64,
    },
}
impl PackableMessage for TimeMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            TimeMessage::Get => TIME_GET,
            TimeMessage::Set(_) => TIME_SET,
            TimeMessage::ZoneGet => TIME_ZONE_GET,
            TimeMessage::ZoneSet { .. } => TIME_ZONE_SET,
            TimeMessage::TaiUtcDeltaGet => TAI_UTC_DELTA_GET,
            TimeMessage::TaiUtcDeltaSet { .. } => TAI_UTC_DELTA_SET,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            TimeMessage::Get | TimeMessage::ZoneGet | TimeMessage::TaiUtcDeltaGet => (),
            TimeMessage::Set(state) => state.pack_into(buffer, true)?,
            TimeMessage::ZoneSet {
                new_offset,
                tai_of_change,
            } => {
                if *tai_of_change > TAI_SECONDS_MAX {
                    return Err(MessagePackError::BadState);
                }
                buffer.push(*new_offset);
                push_u40(buffer, *tai_of_change);
            }
            TimeMessage::TaiUtcDeltaSet {
                new_delta,
                tai_of_change,
            } => {
                if *tai_of_change > TAI_SECONDS_MAX || *new_delta > TAI_UTC_DELTA_MAX {
                    return Err(MessagePackError::BadState);
                }
                buffer.extend_from_slice(&new_delta.to_le_bytes());
                push_u40(buffer, *tai_of_change);
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        true
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct TimeStatus(pub TimeState);
impl TimeStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let tai_seconds = r.u40()?;
        if r.is_empty() {
            return Ok(TimeStatus(TimeState {
                tai_seconds,
                ..TimeState::default()
            }));
        }
        let subsecond = r.u8()?;
        let uncertainty = r.u8()?;
        let flags = r.u16()?;
        let time_zone_offset = r.u8()?;
        r.finish()?;
        Ok(TimeStatus(TimeState {
            tai_seconds,
            subsecond,
            uncertainty,
            time_authority: flags & 1 != 0,
            tai_utc_delta: flags >> 1,
            time_zone_offset,
        }))
    }
}
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct TimeZoneStatus {
    pub current_offset: u8,
    pub new_offset: u8,
    pub tai_of_change: u64,
}
impl TimeZoneStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let status = TimeZoneStatus {
            current_offset: r.u8()?,
            new_offset: r.u8()?,
            tai_of_change: r.u40()?,
        };
        r.finish()?;
        Ok(status)
    }
}
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct TaiUtcDeltaStatus {
    pub current_delta: u16,
    pub new_delta: u16,
    pub tai_of_change: u64,
}
impl TaiUtcDeltaStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let status = TaiUtcDeltaStatus {
            current_delta: r.u16()? & TAI_UTC_DELTA_MAX,
            new_delta: r.u16()? & TAI_UTC_DELTA_MAX,
            tai_of_change: r.u40()?,
        };
        r.finish()?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_set_and_status() {
        let state = TimeState {
            tai_seconds: 0x01_0203_0405,
            subsecond: 0x10,
            uncertainty: 0x20,
            time_authority: true,
            tai_utc_delta: 0x0FF,
            time_zone_offset: 0x40,
        };
        let params = TimeMessage::Set(state).parameters().unwrap();
        assert_eq!(
            params,
            vec![0x05, 0x04, 0x03, 0x02, 0x01, 0x10, 0x20, 0xFF, 0x01, 0x40]
        );
        assert_eq!(TimeStatus::unpack_from(&params).unwrap(), TimeStatus(state));
    }
    #[test]
    fn test_unknown_time_status() {
        assert_eq!(
            TimeStatus::unpack_from(&[0, 0, 0, 0, 0]).unwrap(),
            TimeStatus(TimeState::default())
        );
        assert_eq!(
            TimeStatus::unpack_from(&[0, 0, 0, 0, 0, 1]),
            Err(MessagePackError::BadLength)
        );
    }
    #[test]
    fn test_zone_set() {
        let msg = TimeMessage::ZoneSet {
            new_offset: 0x48,
            tai_of_change: 0x10,
        };
        assert_eq!(msg.parameters().unwrap(), vec![0x48, 0x10, 0, 0, 0, 0]);
        assert_eq!(
            TimeZoneStatus::unpack_from(&[0x40, 0x48, 0x10, 0, 0, 0, 0]).unwrap(),
            TimeZoneStatus {
                current_offset: 0x40,
                new_offset: 0x48,
                tai_of_change: 0x10
            }
        );
    }
}
