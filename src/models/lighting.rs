//! Light Lightness, Light CTL and Light HSL models.
use crate::access::Opcode;
use crate::models::generic::{pack_tid, read_remaining};
use crate::models::{MessagePackError, PackableMessage, Reader, RemainingTime, Transition};

pub mod opcodes {
    use crate::access::Opcode;
    pub const LIGHTNESS_GET: Opcode = Opcode::double(0x824B);
    pub const LIGHTNESS_SET: Opcode = Opcode::double(0x824C);
    pub const LIGHTNESS_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x824D);
    pub const LIGHTNESS_STATUS: Opcode = Opcode::double(0x824E);
    pub const LIGHTNESS_DEFAULT_GET: Opcode = Opcode::double(0x8255);
    pub const LIGHTNESS_DEFAULT_STATUS: Opcode = Opcode::double(0x8256);
    pub const LIGHTNESS_DEFAULT_SET: Opcode = Opcode::double(0x8259);
    pub const LIGHTNESS_DEFAULT_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x825A);

    pub const CTL_GET: Opcode = Opcode::double(0x825D);
    pub const CTL_SET: Opcode = Opcode::double(0x825E);
    pub const CTL_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x825F);
    pub const CTL_STATUS: Opcode = Opcode::double(0x8260);
    pub const CTL_DEFAULT_GET: Opcode = Opcode::double(0x8267);
    pub const CTL_DEFAULT_STATUS: Opcode = Opcode::double(0x8268);
    pub const CTL_DEFAULT_SET: Opcode = Opcode::double(0x8269);
    pub const CTL_DEFAULT_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x826A);

    pub const HSL_GET: Opcode = Opcode::double(0x826D);
    pub const HSL_SET: Opcode = Opcode::double(0x8276);
    pub const HSL_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x8277);
    pub const HSL_STATUS: Opcode = Opcode::double(0x8278);
    pub const HSL_DEFAULT_GET: Opcode = Opcode::double(0x827B);
    pub const HSL_DEFAULT_STATUS: Opcode = Opcode::double(0x827C);
    pub const HSL_DEFAULT_SET: Opcode = Opcode::double(0x827F);
    pub const HSL_DEFAULT_SET_UNACKNOWLEDGED: Opcode = Opcode::double(0x8280);
}

/// Valid Light CTL Temperature range in Kelvin.
pub const TEMPERATURE_MIN: u16 = 0x0320;
pub const TEMPERATURE_MAX: u16 = 0x4E20;

fn check_temperature(temperature: u16) -> Result<(), MessagePackError> {
    if (TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temperature) {
        Ok(())
    } else {
        Err(MessagePackError::BadState)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LightnessMessage {
    Get,
    Set {
        lightness: u16,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
    DefaultGet,
    DefaultSet {
        lightness: u16,
        acked: bool,
    },
}
impl LightnessMessage {
    #[must_use]
    pub fn set(lightness: u16, acked: bool) -> Self {
        LightnessMessage::Set {
            lightness,
            tid: None,
            transition: None,
            acked,
        }
    }
    pub(crate) fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            LightnessMessage::Set { tid, .. } => Some(tid),
            _ => None,
        }
    }
}
impl PackableMessage for LightnessMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            LightnessMessage::Get => LIGHTNESS_GET,
            LightnessMessage::Set { acked: true, .. } => LIGHTNESS_SET,
            LightnessMessage::Set { acked: false, .. } => LIGHTNESS_SET_UNACKNOWLEDGED,
            LightnessMessage::DefaultGet => LIGHTNESS_DEFAULT_GET,
            LightnessMessage::DefaultSet { acked: true, .. } => LIGHTNESS_DEFAULT_SET,
            LightnessMessage::DefaultSet { acked: false, .. } => {
                LIGHTNESS_DEFAULT_SET_UNACKNOWLEDGED
            }
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            LightnessMessage::Get | LightnessMessage::DefaultGet => (),
            LightnessMessage::Set {
                lightness,
                tid,
                transition,
                ..
            } => {
                buffer.extend_from_slice(&lightness.to_le_bytes());
                pack_tid(*tid, buffer)?;
                Transition::pack_into(transition.as_ref(), buffer);
            }
            LightnessMessage::DefaultSet { lightness, .. } => {
                buffer.extend_from_slice(&lightness.to_le_bytes())
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        !matches!(
            self,
            LightnessMessage::Set { acked: false, .. }
                | LightnessMessage::DefaultSet { acked: false, .. }
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct LightnessStatus {
    pub present: u16,
    pub target: Option<(u16, RemainingTime)>,
}
impl LightnessStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let present = r.u16()?;
        let target = if r.is_empty() {
            None
        } else {
            Some((r.u16()?, read_remaining(&mut r)?))
        };
        r.finish()?;
        Ok(LightnessStatus { present, target })
    }
}
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct LightnessDefaultStatus {
    pub lightness: u16,
}
impl LightnessDefaultStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let lightness = r.u16()?;
        r.finish()?;
        Ok(LightnessDefaultStatus { lightness })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CtlMessage {
    Get,
    Set {
        lightness: u16,
        temperature: u16,
        delta_uv: i16,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
    DefaultGet,
    DefaultSet {
        lightness: u16,
        temperature: u16,
        delta_uv: i16,
        acked: bool,
    },
}
impl CtlMessage {
    #[must_use]
    pub fn set(lightness: u16, temperature: u16, delta_uv: i16, acked: bool) -> Self {
        CtlMessage::Set {
            lightness,
            temperature,
            delta_uv,
            tid: None,
            transition: None,
            acked,
        }
    }
    pub(crate) fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            CtlMessage::Set { tid, .. } => Some(tid),
            _ => None,
        }
    }
}
impl PackableMessage for CtlMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            CtlMessage::Get => CTL_GET,
            CtlMessage::Set { acked: true, .. } => CTL_SET,
            CtlMessage::Set { acked: false, .. } => CTL_SET_UNACKNOWLEDGED,
            CtlMessage::DefaultGet => CTL_DEFAULT_GET,
            CtlMessage::DefaultSet { acked: true, .. } => CTL_DEFAULT_SET,
            CtlMessage::DefaultSet { acked: false, .. } => CTL_DEFAULT_SET_UNACKNOWLEDGED,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            CtlMessage::Get | CtlMessage::DefaultGet => (),
            CtlMessage::Set {
                lightness,
                temperature,
                delta_uv,
                tid,
                transition,
                ..
            } => {
                check_temperature(*temperature)?;
                buffer.extend_from_slice(&lightness.to_le_bytes());
                buffer.extend_from_slice(&temperature.to_le_bytes());
                buffer.extend_from_slice(&delta_uv.to_le_bytes());
                pack_tid(*tid, buffer)?;
                Transition::pack_into(transition.as_ref(), buffer);
            }
            CtlMessage::DefaultSet {
                lightness,
                temperature,
                delta_uv,
                ..
            } => {
                check_temperature(*temperature)?;
                buffer.extend_from_slice(&lightness.to_le_bytes());
                buffer.extend_from_slice(&temperature.to_le_bytes());
                buffer.extend_from_slice(&delta_uv.to_le_bytes());
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        !matches!(
            self,
            CtlMessage::Set { acked: false, .. } | CtlMessage::DefaultSet { acked: false, .. }
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct CtlStatus {
    pub lightness: u16,
    pub temperature: u16,
    /// Target lightness, target temperature and remaining time.
    pub target: Option<(u16, u16, RemainingTime)>,
}
impl CtlStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let lightness = r.u16()?;
        let temperature = r.u16()?;
        let target = if r.is_empty() {
            None
        } else {
            Some((r.u16()?, r.u16()?, read_remaining(&mut r)?))
        };
        r.finish()?;
        Ok(CtlStatus {
            lightness,
            temperature,
            target,
        })
    }
}
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct CtlDefaultStatus {
    pub lightness: u16,
    pub temperature: u16,
    pub delta_uv: i16,
}
impl CtlDefaultStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let status = CtlDefaultStatus {
            lightness: r.u16()?,
            temperature: r.u16()?,
            delta_uv: r.i16()?,
        };
        r.finish()?;
        Ok(status)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum HslMessage {
    Get,
    Set {
        lightness: u16,
        hue: u16,
        saturation: u16,
        tid: Option<u8>,
        transition: Option<Transition>,
        acked: bool,
    },
    DefaultGet,
    DefaultSet {
        lightness: u16,
        hue: u16,
        saturation: u16,
        acked: bool,
    },
}
impl HslMessage {
    #[must_use]
    pub fn set(lightness: u16, hue: u16, saturation: u16, acked: bool) -> Self {
        HslMessage::Set {
            lightness,
            hue,
            saturation,
            tid: None,
            transition: None,
            acked,
        }
    }
    pub(crate) fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            HslMessage::Set { tid, .. } => Some(tid),
            _ => None,
        }
    }
}
impl PackableMessage for HslMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            HslMessage::Get => HSL_GET,
            HslMessage::Set { acked: true, .. } => HSL_SET,
            HslMessage::Set { acked: false, .. } => HSL_SET_UNACKNOWLEDGED,
            HslMessage::DefaultGet => HSL_DEFAULT_GET,
            HslMessage::DefaultSet { acked: true, .. } => HSL_DEFAULT_SET,
            HslMessage::DefaultSet { acked: false, .. } => HSL_DEFAULT_SET_UNACKNOWLEDGED,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            HslMessage::Get | HslMessage::DefaultGet => (),
            HslMessage::Set {
                lightness,
                hue,
                saturation,
                tid,
                transition,
                ..
            } => {
                buffer.extend_from_slice(&lightness.to_le_bytes());
                buffer.extend_from_slice(&hue.to_le_bytes());
                buffer.extend_from_slice(&saturation.to_le_bytes());
                pack_tid(*tid, buffer)?;
                Transition::pack_into(transition.as_ref(), buffer);
            }
            HslMessage::DefaultSet {
                lightness,
                hue,
                saturation,
                ..
            } => {
                buffer.extend_from_slice(&lightness.to_le_bytes());
                buffer.extend_from_slice(&hue.to_le_bytes());
                buffer.extend_from_slice(&saturation.to_le_bytes());
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        !matches!(
            self,
            HslMessage::Set { acked: false, .. } | HslMessage::DefaultSet { acked: false, .. }
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct HslStatus {
    pub lightness: u16,
    pub hue: u16,
    pub saturation: u16,
    pub remaining: Option<RemainingTime>,
}
impl HslStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let lightness = r.u16()?;
        let hue = r.u16()?;
        let saturation = r.u16()?;
        let remaining = if r.is_empty() {
            None
        } else {
            Some(read_remaining(&mut r)?)
        };
        r.finish()?;
        Ok(HslStatus {
            lightness,
            hue,
            saturation,
            remaining,
        })
    }
}
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct HslDefaultStatus {
    pub lightness: u16,
    pub hue: u16,
    pub saturation: u16,
}
impl HslDefaultStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let status = HslDefaultStatus {
            lightness: r.u16()?,
            hue: r.u16()?,
            saturation: r.u16()?,
        };
        r.finish()?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctl_set() {
        let mut msg = CtlMessage::set(0xFFFF, 0x0320, -1, true);
        *msg.tid_mut().unwrap() = Some(9);
        assert_eq!(
            msg.parameters().unwrap(),
            vec![0xFF, 0xFF, 0x20, 0x03, 0xFF, 0xFF, 9]
        );
        assert_eq!(
            CtlMessage::set(0, 0x0100, 0, true).parameters(),
            Err(MessagePackError::BadState)
        );
    }
    #[test]
    fn test_statuses() {
        assert_eq!(
            CtlStatus::unpack_from(&[0x01, 0x00, 0x20, 0x03]).unwrap(),
            CtlStatus {
                lightness: 1,
                temperature: 0x0320,
                target: None
            }
        );
        let hsl = HslStatus::unpack_from(&[1, 0, 2, 0, 3, 0, 0x41]).unwrap();
        assert_eq!((hsl.lightness, hsl.hue, hsl.saturation), (1, 2, 3));
        assert_eq!(hsl.remaining, Some(RemainingTime::from(0x41)));
        assert_eq!(
            LightnessStatus::unpack_from(&[0x00, 0x10, 0x00, 0x20, 0x00]).unwrap(),
            LightnessStatus {
                present: 0x1000,
                target: Some((0x2000, RemainingTime::from(0)))
            }
        );
        assert_eq!(
            LightnessDefaultStatus::unpack_from(&[0x00]),
            Err(MessagePackError::BadLength)
        );
    }
    #[test]
    fn test_hsl_default_set_unacked() {
        let msg = HslMessage::DefaultSet {
            lightness: 1,
            hue: 2,
            saturation: 3,
            acked: false,
        };
        assert!(!msg.is_acked());
        assert_eq!(msg.opcode(), opcodes::HSL_DEFAULT_SET_UNACKNOWLEDGED);
        assert_eq!(msg.parameters().unwrap(), vec![1, 0, 2, 0, 3, 0]);
    }
}
