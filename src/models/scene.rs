//! Scene model. Scene number `0x0000` is prohibited.
use crate::access::Opcode;
use crate::models::generic::{pack_tid, read_remaining};
use crate::models::{MessagePackError, PackableMessage, Reader, RemainingTime, Transition};

pub mod opcodes {
    use crate::access::Opcode;
    pub const SCENE_GET: Opcode = Opcode::double(0x8241);
    pub const SCENE_RECALL: Opcode = Opcode::double(0x8242);
    pub const SCENE_RECALL_UNACKNOWLEDGED: Opcode = Opcode::double(0x8243);
    pub const SCENE_STATUS: Opcode = Opcode::single(0x5E);
    pub const SCENE_REGISTER_GET: Opcode = Opcode::double(0x8244);
    pub const SCENE_REGISTER_STATUS: Opcode = Opcode::double(0x8245);
    pub const SCENE_STORE: Opcode = Opcode::double(0x8246);
    pub const SCENE_STORE_UNACKNOWLEDGED: Opcode = Opcode::double(0x8247);
    pub const SCENE_DELETE: Opcode = Opcode::double(0x829E);
    pub const SCENE_DELETE_UNACKNOWLEDGED: Opcode = Opcode::double(0x829F);
}

fn check_scene(scene: u16) -> Result<u16, MessagePackError> {
    if scene == 0 {
        Err(MessagePackError::BadState)
    } else {
        Ok(scene)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SceneMessage {
    Get,
    RegisterGet,
    Recall {
        scene: u16,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
    Store {
        scene: u16,
        acked: bool,
    },
    Delete {
        scene: u16,
        acked: bool,
    },
}
impl SceneMessage {
    #[must_use]
    pub fn recall(scene: u16, acked: bool) -> Self {
        SceneMessage::Recall {
            scene,
            tid: None,
            transition: None,
            acked,
        }
    }
    pub(crate) fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            SceneMessage::Recall { tid, .. } => Some(tid),
            _ => None,
        }
    }
}
impl PackableMessage for SceneMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            SceneMessage::Get => SCENE_GET,
            SceneMessage::RegisterGet => SCENE_REGISTER_GET,
            SceneMessage::Recall { acked: true, .. } => SCENE_RECALL,
            SceneMessage::Recall { acked: false, .. } => SCENE_RECALL_UNACKNOWLEDGED,
            SceneMessage::Store { acked: true, .. } => SCENE_STORE,
            SceneMessage::Store { acked: false, .. } => SCENE_STORE_UNACKNOWLEDGED,
            SceneMessage::Delete { acked: true, .. } => SCENE_DELETE,
            SceneMessage::Delete { acked: false, .. } => SCENE_DELETE_UNACKNOWLEDGED,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            SceneMessage::Get | SceneMessage::RegisterGet => (),
            SceneMessage::Recall {
                scene,
                tid,
                transition,
                ..
            } => {
                buffer.extend_from_slice(&check_scene(*scene)?.to_le_bytes());
                pack_tid(*tid, buffer)?;
                Transition::pack_into(transition.as_ref(), buffer);
            }
            SceneMessage::Store { scene, .. } | SceneMessage::Delete { scene, .. } => {
                buffer.extend_from_slice(&check_scene(*scene)?.to_le_bytes())
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        match self {
            SceneMessage::Get | SceneMessage::RegisterGet => true,
            SceneMessage::Recall { acked, .. }
            | SceneMessage::Store { acked, .. }
            | SceneMessage::Delete { acked, .. } => *acked,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SceneStatus {
    pub status: u8,
    pub current: u16,
    pub target: Option<(u16, RemainingTime)>,
}
impl SceneStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let status = r.u8()?;
        let current = r.u16()?;
        let target = if r.is_empty() {
            None
        } else {
            Some((r.u16()?, read_remaining(&mut r)?))
        };
        r.finish()?;
        Ok(SceneStatus {
            status,
            current,
            target,
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SceneRegisterStatus {
    pub status: u8,
    pub current: u16,
    pub scenes: Vec<u16>,
}
impl SceneRegisterStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let status = r.u8()?;
        let current = r.u16()?;
        if r.remaining() % 2 != 0 {
            return Err(MessagePackError::BadLength);
        }
        let mut scenes = Vec::with_capacity(r.remaining() / 2);
        while !r.is_empty() {
            scenes.push(r.u16()?);
        }
        Ok(SceneRegisterStatus {
            status,
            current,
            scenes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall() {
        let mut msg = SceneMessage::recall(0x0102, false);
        *msg.tid_mut().unwrap() = Some(3);
        assert_eq!(msg.parameters().unwrap(), vec![0x02, 0x01, 3]);
        assert_eq!(msg.opcode(), opcodes::SCENE_RECALL_UNACKNOWLEDGED);
        assert_eq!(
            SceneMessage::Store {
                scene: 0,
                acked: true
            }
            .parameters(),
            Err(MessagePackError::BadState)
        );
    }
    #[test]
    fn test_register_status() {
        let status = SceneRegisterStatus::unpack_from(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x00])
            .unwrap();
        assert_eq!(status.current, 1);
        assert_eq!(status.scenes, vec![1, 2]);
        assert_eq!(
            SceneRegisterStatus::unpack_from(&[0x00, 0x01, 0x00, 0x01]),
            Err(MessagePackError::BadLength)
        );
        assert_eq!(
            SceneStatus::unpack_from(&[0x02, 0x05, 0x00]).unwrap(),
            SceneStatus {
                status: 2,
                current: 5,
                target: None
            }
        );
    }
}
