//! Generic OnOff and Generic Level models.
use crate::access::Opcode;
use crate::models::{MessagePackError, PackableMessage, Reader, RemainingTime, Transition};

pub mod opcodes {
    use crate::access::Opcode;
    pub const ON_OFF_GET: Opcode = Opcode::double(0x8201);
    pub const ON_OFF_SET: Opcode = Opcode::double(0x8202);
    pub const ON_OFF_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x8203);
    pub const ON_OFF_STATUS: Opcode = Opcode::double(0x8204);
    pub const LEVEL_GET: Opcode = Opcode::double(0x8205);
    pub const LEVEL_SET: Opcode = Opcode::double(0x8206);
    pub const LEVEL_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x8207);
    pub const LEVEL_STATUS: Opcode = Opcode::double(0x8208);
    pub const DELTA_SET: Opcode = Opcode::double(0x8209);
    pub const DELTA_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x820A);
    pub const MOVE_SET: Opcode = Opcode::double(0x820B);
    pub const MOVE_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x820C);
}

pub(crate) fn pack_tid(tid: Option<u8>, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
    buffer.push(tid.ok_or(MessagePackError::BadState)?);
    Ok(())
}
/// Reads the optional `[target..., remaining]` tail of a status.
pub(crate) fn read_remaining(r: &mut Reader<'_>) -> Result<RemainingTime, MessagePackError> {
    Ok(RemainingTime::from(r.u8()?))
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OnOffMessage {
    Get,
    Set {
        on: bool,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
}
impl OnOffMessage {
    #[must_use]
    pub fn set(on: bool) -> Self {
        OnOffMessage::Set {
            on,
            tid: None,
            transition: None,
            acked: true,
        }
    }
    #[must_use]
    pub fn set_unacknowledged(on: bool) -> Self {
        OnOffMessage::Set {
            on,
            tid: None,
            transition: None,
            acked: false,
        }
    }
    #[must_use]
    pub fn with_transition(mut self, new_transition: Transition) -> Self {
        if let OnOffMessage::Set { transition, .. } = &mut self {
            *transition = Some(new_transition);
        }
        self
    }
    pub(crate) fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            OnOffMessage::Get => None,
            OnOffMessage::Set { tid, .. } => Some(tid),
        }
    }
}
impl PackableMessage for OnOffMessage {
    fn opcode(&self) -> Opcode {
        match self {
            OnOffMessage::Get => opcodes::ON_OFF_GET,
            OnOffMessage::Set { acked: true, .. } => opcodes::ON_OFF_SET,
            OnOffMessage::Set { acked: false, .. } => opcodes::ON_OFF_SET_UNACKNOWLEDGED,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        if let OnOffMessage::Set {
            on,
            tid,
            transition,
            ..
        } = self
        {
            buffer.push(u8::from(*on));
            pack_tid(*tid, buffer)?;
            Transition::pack_into(transition.as_ref(), buffer);
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        !matches!(self, OnOffMessage::Set { acked: false, .. })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct OnOffStatus {
    pub present: bool,
    pub target: Option<(bool, RemainingTime)>,
}
impl OnOffStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let present = read_on_off(&mut r)?;
        let target = if r.is_empty() {
            None
        } else {
            Some((read_on_off(&mut r)?, read_remaining(&mut r)?))
        };
        r.finish()?;
        Ok(OnOffStatus { present, target })
    }
}
fn read_on_off(r: &mut Reader<'_>) -> Result<bool, MessagePackError> {
    match r.u8()? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(MessagePackError::BadBytes),
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LevelMessage {
    Get,
    Set {
        level: i16,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
    Delta {
        delta: i32,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
    /// `delta` is the level change per transition step.
    Move {
        delta: i16,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
}
impl LevelMessage {
    #[must_use]
    pub fn set(level: i16, acked: bool) -> Self {
        LevelMessage::Set {
            level,
            tid: None,
            transition: None,
            acked,
        }
    }
    #[must_use]
    pub fn delta(delta: i32, acked: bool) -> Self {
        LevelMessage::Delta {
            delta,
            tid: None,
            transition: None,
            acked,
        }
    }
    #[must_use]
    pub fn move_level(delta: i16, transition: Transition, acked: bool) -> Self {
        LevelMessage::Move {
            delta,
            tid: None,
            transition: Some(transition),
            acked,
        }
    }
    pub(crate) fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            LevelMessage::Get => None,
            LevelMessage::Set { tid, .. }
            | LevelMessage::Delta { tid, .. }
            | LevelMessage::Move { tid, .. } => Some(tid),
        }
    }
}
impl PackableMessage for LevelMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            LevelMessage::Get => LEVEL_GET,
            LevelMessage::Set { acked: true, .. } => LEVEL_SET,
            LevelMessage::Set { acked: false, .. } => LEVEL_SET_UNACKNOWLEDGED,
            LevelMessage::Delta { acked: true, .. } => DELTA_SET,
            LevelMessage::Delta { acked: false, .. } => DELTA_SET_UNACKNOWLEDGED,
            LevelMessage::Move { acked: true, .. } => MOVE_SET,
            LevelMessage::Move { acked: false, .. } => MOVE_SET_UNACKNOWLEDGED,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        let (tid, transition) = match self {
            LevelMessage::Get => return Ok(()),
            LevelMessage::Set {
                level,
                tid,
                transition,
                ..
            } => {
                buffer.extend_from_slice(&level.to_le_bytes());
                (tid, transition)
            }
            LevelMessage::Delta {
                delta,
                tid,
                transition,
                ..
            } => {
                buffer.extend_from_slice(&delta.to_le_bytes());
                (tid, transition)
            }
            LevelMessage::Move {
                delta,
                tid,
                transition,
                ..
            } => {
                buffer.extend_from_slice(&delta.to_le_bytes());
                (tid, transition)
            }
        };
        pack_tid(*tid, buffer)?;
        Transition::pack_into(transition.as_ref(), buffer);
        Ok(())
    }

    fn is_acked(&self) -> bool {
        match self {
            LevelMessage::Get => true,
            LevelMessage::Set { acked, .. }
            | LevelMessage::Delta { acked, .. }
            | LevelMessage::Move { acked, .. } => *acked,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct LevelStatus {
    pub present: i16,
    pub target: Option<(i16, RemainingTime)>,
}
impl LevelStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let present = r.i16()?;
        let target = if r.is_empty() {
            None
        } else {
            Some((r.i16()?, read_remaining(&mut r)?))
        };
        r.finish()?;
        Ok(LevelStatus { present, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepResolution;

    #[test]
    fn test_on_off_set_with_transition() {
        let msg = OnOffMessage::set_unacknowledged(true)
            .with_transition(Transition::new(0x0A, StepResolution::Milliseconds100, 2));
        let mut msg = msg;
        *msg.tid_mut().unwrap() = Some(0x42);
        assert_eq!(msg.parameters().unwrap(), vec![0x01, 0x42, 0x0A, 0x02]);
        assert_eq!(msg.opcode(), opcodes::ON_OFF_SET_UNACKNOWLEDGED);
        assert!(!msg.is_acked());
        assert!(OnOffMessage::Get.is_acked());
    }
    #[test]
    fn test_on_off_status() {
        assert_eq!(
            OnOffStatus::unpack_from(&[0x00, 0x01, 0x4A]).unwrap(),
            OnOffStatus {
                present: false,
                target: Some((true, RemainingTime::from(0x4A)))
            }
        );
        assert_eq!(
            OnOffStatus::unpack_from(&[0x02]),
            Err(MessagePackError::BadBytes)
        );
        assert_eq!(
            OnOffStatus::unpack_from(&[0x00, 0x01]),
            Err(MessagePackError::BadLength)
        );
    }
    #[test]
    fn test_level_messages() {
        let mut delta = LevelMessage::delta(-2, true);
        *delta.tid_mut().unwrap() = Some(7);
        assert_eq!(delta.parameters().unwrap(), vec![0xFE, 0xFF, 0xFF, 0xFF, 7]);
        let mut set = LevelMessage::set(0x1234, false);
        *set.tid_mut().unwrap() = Some(1);
        assert_eq!(set.parameters().unwrap(), vec![0x34, 0x12, 1]);
        assert_eq!(set.opcode(), opcodes::LEVEL_SET_UNACKNOWLEDGED);
        assert_eq!(
            LevelStatus::unpack_from(&[0x00, 0x80]).unwrap(),
            LevelStatus {
                present: i16::MIN,
                target: None
            }
        );
    }
}
