//! Typed access messages. Requests know how to pack their parameters, statuses know how to parse
//! them back. Access parameters are little endian.
use crate::access::{AccessError, Opcode};
use crate::mesh::{AppKeyIndex, SequenceNumber, TTL};
use core::fmt::{Display, Formatter};

pub mod blob;
pub mod config;
pub mod generic;
pub mod generic_access;
pub mod lighting;
pub mod proxy;
pub mod scene;
pub mod scheduler;
pub mod time;
pub mod vendor;

pub use generic_access::GenericAccessMessage;
pub use proxy::ProxyConfigMessage;

/// Error when trying to pack a message into a byte buffer.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum MessagePackError {
    /// Byte Buffer too small to fit the whole message.
    SmallBuffer,
    /// Incoming Byte Buffer length doesn't make sense.
    BadLength,
    /// Incoming Byte Buffer creates an invalid message.
    BadBytes,
    /// Message can't be packed because the object is in a bad state.
    BadState,
    Access(AccessError),
}
impl From<AccessError> for MessagePackError {
    fn from(e: AccessError) -> Self {
        MessagePackError::Access(e)
    }
}
impl Display for MessagePackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            MessagePackError::SmallBuffer => f.write_str("buffer too small"),
            MessagePackError::BadLength => f.write_str("bad message length"),
            MessagePackError::BadBytes => f.write_str("invalid message bytes"),
            MessagePackError::BadState => f.write_str("message in a bad state"),
            MessagePackError::Access(e) => write!(f, "{}", e),
        }
    }
}
impl std::error::Error for MessagePackError {}

/// An Access Message that can be packed into a (little endian) byte buffer.
pub trait PackableMessage {
    fn opcode(&self) -> Opcode;
    /// Appends the parameters (without the opcode) to `buffer`.
    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError>;
    fn parameters(&self) -> Result<Vec<u8>, MessagePackError> {
        let mut out = Vec::new();
        self.pack_into(&mut out)?;
        Ok(out)
    }
    /// `false` for the `...Unacknowledged` flavour of a message.
    fn is_acked(&self) -> bool;
}

/// Little endian cursor over status parameters.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}
impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], MessagePackError> {
        if self.buf.len() < n {
            return Err(MessagePackError::BadLength);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }
    pub fn u8(&mut self) -> Result<u8, MessagePackError> {
        Ok(self.take(1)?[0])
    }
    pub fn u16(&mut self) -> Result<u16, MessagePackError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
    pub fn i16(&mut self) -> Result<i16, MessagePackError> {
        Ok(self.u16()? as i16)
    }
    pub fn u32(&mut self) -> Result<u32, MessagePackError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
    pub fn u40(&mut self) -> Result<u64, MessagePackError> {
        let b = self.take(5)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], 0, 0, 0]))
    }
    pub fn u64(&mut self) -> Result<u64, MessagePackError> {
        let b = self.take(8)?;
        let mut a = [0_u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_le_bytes(a))
    }
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }
    /// Fails if any bytes are left over.
    pub fn finish(&self) -> Result<(), MessagePackError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(MessagePackError::BadLength)
        }
    }
}
pub(crate) fn push_u40(buffer: &mut Vec<u8>, v: u64) {
    buffer.extend_from_slice(&v.to_le_bytes()[..5]);
}

/// 2-bit Step Resolution of a Generic Default Transition Time.
#[derive(Copy, Clone, Ord, PartialOrd, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum StepResolution {
    Milliseconds100 = 0b00,
    Second1 = 0b01,
    Second10 = 0b10,
    Minute10 = 0b11,
}
impl StepResolution {
    #[must_use]
    pub fn to_milliseconds(self) -> u32 {
        match self {
            StepResolution::Milliseconds100 => 100,
            StepResolution::Second1 => 1000,
            StepResolution::Second10 => 10 * 1000,
            StepResolution::Minute10 => 10 * 60 * 1000,
        }
    }
    #[must_use]
    pub fn from_masked_u8(v: u8) -> StepResolution {
        match v & 0b11 {
            0b00 => StepResolution::Milliseconds100,
            0b01 => StepResolution::Second1,
            0b10 => StepResolution::Second10,
            _ => StepResolution::Minute10,
        }
    }
}
const STEPS_MAX: u8 = 0x3F;

/// Optional transition of a set message: `[resolution<<6 | steps][delay]`. `delay` is in 5ms
/// steps.
#[derive(Copy, Clone, Ord, PartialOrd, Debug, Hash, Eq, PartialEq)]
pub struct Transition {
    pub steps: u8,
    pub resolution: StepResolution,
    pub delay: u8,
}
impl Transition {
    #[must_use]
    pub fn new(steps: u8, resolution: StepResolution, delay: u8) -> Self {
        Self {
            steps: steps & STEPS_MAX,
            resolution,
            delay,
        }
    }
    #[must_use]
    pub fn transition_time(&self) -> u8 {
        ((self.resolution as u8) << 6) | (self.steps & STEPS_MAX)
    }
    pub(crate) fn pack_into(transition: Option<&Transition>, buffer: &mut Vec<u8>) {
        if let Some(t) = transition {
            buffer.push(t.transition_time());
            buffer.push(t.delay);
        }
    }
}
/// Remaining Time field of status messages. Same encoding as a transition time.
#[derive(Copy, Clone, Ord, PartialOrd, Debug, Hash, Eq, PartialEq)]
pub struct RemainingTime {
    pub steps: u8,
    pub resolution: StepResolution,
}
impl From<u8> for RemainingTime {
    fn from(v: u8) -> Self {
        Self {
            steps: v & STEPS_MAX,
            resolution: StepResolution::from_masked_u8(v >> 6),
        }
    }
}

/// Transaction identifier of the set messages. Defaults to the low byte of the sequence number
/// last received from the target node.
#[must_use]
pub fn default_tid(received: SequenceNumber) -> u8 {
    (received.value() & 0xFF) as u8
}

/// Which key the upper transport layer encrypts a message with.
#[derive(Copy, Clone, Ord, PartialOrd, Debug, Hash, Eq, PartialEq)]
pub enum MessageKey {
    /// The device key of the destination node.
    Device,
    Application(AppKeyIndex),
    /// Proxy configuration messages are only network encrypted.
    Network,
}

/// Model (application key) messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ModelMessage {
    OnOff(generic::OnOffMessage),
    Level(generic::LevelMessage),
    Lightness(lighting::LightnessMessage),
    Ctl(lighting::CtlMessage),
    Hsl(lighting::HslMessage),
    Scene(scene::SceneMessage),
    Time(time::TimeMessage),
    Scheduler(scheduler::SchedulerMessage),
    Blob(blob::BlobMessage),
    Vendor(vendor::VendorMessage),
}
impl ModelMessage {
    fn as_packable(&self) -> &dyn PackableMessage {
        match self {
            ModelMessage::OnOff(m) => m,
            ModelMessage::Level(m) => m,
            ModelMessage::Lightness(m) => m,
            ModelMessage::Ctl(m) => m,
            ModelMessage::Hsl(m) => m,
            ModelMessage::Scene(m) => m,
            ModelMessage::Time(m) => m,
            ModelMessage::Scheduler(m) => m,
            ModelMessage::Blob(m) => m,
            ModelMessage::Vendor(m) => m,
        }
    }
    fn tid_mut(&mut self) -> Option<&mut Option<u8>> {
        match self {
            ModelMessage::OnOff(m) => m.tid_mut(),
            ModelMessage::Level(m) => m.tid_mut(),
            ModelMessage::Lightness(m) => m.tid_mut(),
            ModelMessage::Ctl(m) => m.tid_mut(),
            ModelMessage::Hsl(m) => m.tid_mut(),
            ModelMessage::Scene(m) => m.tid_mut(),
            _ => None,
        }
    }
}
impl PackableMessage for ModelMessage {
    fn opcode(&self) -> Opcode {
        self.as_packable().opcode()
    }
    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        self.as_packable().pack_into(buffer)
    }
    fn is_acked(&self) -> bool {
        self.as_packable().is_acked()
    }
}

/// Everything that can be sent with `MeshMessageHandler::send_mesh_message`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MeshMessage {
    /// Configuration messages. Always secured with the destination's device key.
    Config {
        message: config::ConfigMessage,
        ttl: Option<TTL>,
    },
    Generic {
        app_key_index: AppKeyIndex,
        message: ModelMessage,
        ttl: Option<TTL>,
        aszmic: bool,
    },
    ProxyConfig(ProxyConfigMessage),
    GenericAccess(GenericAccessMessage),
}
impl MeshMessage {
    #[must_use]
    pub fn config(message: config::ConfigMessage) -> Self {
        MeshMessage::Config { message, ttl: None }
    }
    #[must_use]
    pub fn generic(app_key_index: AppKeyIndex, message: ModelMessage) -> Self {
        MeshMessage::Generic {
            app_key_index,
            message,
            ttl: None,
            aszmic: false,
        }
    }
    /// Opcode on the wire. Proxy configuration opcodes are reported as single octet opcodes.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            MeshMessage::Config { message, .. } => message.opcode(),
            MeshMessage::Generic { message, .. } => message.opcode(),
            MeshMessage::ProxyConfig(m) => Opcode::single(m.opcode()),
            MeshMessage::GenericAccess(m) => m.opcode,
        }
    }
    pub fn parameters(&self) -> Result<Vec<u8>, MessagePackError> {
        match self {
            MeshMessage::Config { message, .. } => message.parameters(),
            MeshMessage::Generic { message, .. } => message.parameters(),
            MeshMessage::ProxyConfig(m) => Ok(m.parameters()),
            MeshMessage::GenericAccess(m) => Ok(m.parameters.clone()),
        }
    }
    #[must_use]
    pub fn key(&self) -> MessageKey {
        match self {
            MeshMessage::Config { .. } => MessageKey::Device,
            MeshMessage::Generic { app_key_index, .. } => MessageKey::Application(*app_key_index),
            MeshMessage::ProxyConfig(_) => MessageKey::Network,
            MeshMessage::GenericAccess(m) => m.key,
        }
    }
    #[must_use]
    pub fn ttl(&self) -> Option<TTL> {
        match self {
            MeshMessage::Config { ttl, .. } | MeshMessage::Generic { ttl, .. } => *ttl,
            MeshMessage::ProxyConfig(_) => Some(TTL::PROXY_CONFIGURATION),
            MeshMessage::GenericAccess(m) => m.ttl,
        }
    }
    #[must_use]
    pub fn aszmic(&self) -> bool {
        match self {
            MeshMessage::Generic { aszmic, .. } => *aszmic,
            MeshMessage::GenericAccess(m) => m.aszmic,
            _ => false,
        }
    }
    #[must_use]
    pub fn is_acked(&self) -> bool {
        match self {
            MeshMessage::Config { message, .. } => message.is_acked(),
            MeshMessage::Generic { message, .. } => message.is_acked(),
            MeshMessage::ProxyConfig(m) => m.is_acked(),
            MeshMessage::GenericAccess(m) => m.expected_status.is_some(),
        }
    }
    /// Fills in a missing TID with `tid`. Messages without a TID are untouched.
    pub fn fill_tid(&mut self, tid: u8) {
        if let MeshMessage::Generic { message, .. } = self {
            if let Some(slot) = message.tid_mut() {
                if slot.is_none() {
                    *slot = Some(tid);
                }
            }
        }
    }
}

/// Parsed inbound access message.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StatusMessage {
    Config(config::ConfigStatus),
    OnOff(generic::OnOffStatus),
    Level(generic::LevelStatus),
    Lightness(lighting::LightnessStatus),
    LightnessDefault(lighting::LightnessDefaultStatus),
    Ctl(lighting::CtlStatus),
    CtlDefault(lighting::CtlDefaultStatus),
    Hsl(lighting::HslStatus),
    HslDefault(lighting::HslDefaultStatus),
    Scene(scene::SceneStatus),
    SceneRegister(scene::SceneRegisterStatus),
    Time(time::TimeStatus),
    TimeZone(time::TimeZoneStatus),
    TaiUtcDelta(time::TaiUtcDeltaStatus),
    Scheduler(scheduler::SchedulerStatus),
    SchedulerAction(scheduler::SchedulerActionStatus),
    BlobTransfer(blob::BlobTransferStatus),
    BlobBlock(blob::BlobBlockStatus),
    Vendor(vendor::VendorStatus),
    ProxyFilter(proxy::FilterStatus),
    /// Opcode with no parser. Handed over as is.
    Raw {
        opcode: Opcode,
        parameters: Vec<u8>,
    },
}
type StatusParser = fn(&[u8]) -> Result<StatusMessage, MessagePackError>;

/// Opcode -> status parser.
const STATUS_PARSERS: &[(Opcode, StatusParser)] = &[
    (config::opcodes::COMPOSITION_DATA_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::COMPOSITION_DATA_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::DEFAULT_TTL_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::DEFAULT_TTL_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::RELAY_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::RELAY_STATUS, p).map(StatusMessage::Config)
    }),
    (config::opcodes::GATT_PROXY_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::GATT_PROXY_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::NETWORK_TRANSMIT_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::NETWORK_TRANSMIT_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::APP_KEY_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::APP_KEY_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::MODEL_APP_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::MODEL_APP_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::MODEL_PUBLICATION_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::MODEL_PUBLICATION_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::MODEL_SUBSCRIPTION_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::MODEL_SUBSCRIPTION_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (config::opcodes::NODE_RESET_STATUS, |p| {
        config::ConfigStatus::unpack(config::opcodes::NODE_RESET_STATUS, p)
            .map(StatusMessage::Config)
    }),
    (generic::opcodes::ON_OFF_STATUS, |p| {
        generic::OnOffStatus::unpack_from(p).map(StatusMessage::OnOff)
    }),
    (generic::opcodes::LEVEL_STATUS, |p| {
        generic::LevelStatus::unpack_from(p).map(StatusMessage::Level)
    }),
    (lighting::opcodes::LIGHTNESS_STATUS, |p| {
        lighting::LightnessStatus::unpack_from(p).map(StatusMessage::Lightness)
    }),
    (lighting::opcodes::LIGHTNESS_DEFAULT_STATUS, |p| {
        lighting::LightnessDefaultStatus::unpack_from(p).map(StatusMessage::LightnessDefault)
    }),
    (lighting::opcodes::CTL_STATUS, |p| {
        lighting::CtlStatus::unpack_from(p).map(StatusMessage::Ctl)
    }),
    (lighting::opcodes::CTL_DEFAULT_STATUS, |p| {
        lighting::CtlDefaultStatus::unpack_from(p).map(StatusMessage::CtlDefault)
    }),
    (lighting::opcodes::HSL_STATUS, |p| {
        lighting::HslStatus::unpack_from(p).map(StatusMessage::Hsl)
    }),
    (lighting::opcodes::HSL_DEFAULT_STATUS, |p| {
        lighting::HslDefaultStatus::unpack_from(p).map(StatusMessage::HslDefault)
    }),
    (scene::opcodes::SCENE_STATUS, |p| {
        scene::SceneStatus::unpack_from(p).map(StatusMessage::Scene)
    }),
    (scene::opcodes::SCENE_REGISTER_STATUS, |p| {
        scene::SceneRegisterStatus::unpack_from(p).map(StatusMessage::SceneRegister)
    }),
    (time::opcodes::TIME_STATUS, |p| {
        time::TimeStatus::unpack_from(p).map(StatusMessage::Time)
    }),
    (time::opcodes::TIME_ZONE_STATUS, |p| {
        time::TimeZoneStatus::unpack_from(p).map(StatusMessage::TimeZone)
    }),
    (time::opcodes::TAI_UTC_DELTA_STATUS, |p| {
        time::TaiUtcDeltaStatus::unpack_from(p).map(StatusMessage::TaiUtcDelta)
    }),
    (scheduler::opcodes::SCHEDULER_STATUS, |p| {
        scheduler::SchedulerStatus::unpack_from(p).map(StatusMessage::Scheduler)
    }),
    (scheduler::opcodes::SCHEDULER_ACTION_STATUS, |p| {
        scheduler::SchedulerActionStatus::unpack_from(p).map(StatusMessage::SchedulerAction)
    }),
    (blob::opcodes::BLOB_TRANSFER_STATUS, |p| {
        blob::BlobTransferStatus::unpack_from(p).map(StatusMessage::BlobTransfer)
    }),
    (blob::opcodes::BLOB_BLOCK_STATUS, |p| {
        blob::BlobBlockStatus::unpack_from(p).map(StatusMessage::BlobBlock)
    }),
];

impl StatusMessage {
    /// Parses an inbound access message. Vendor opcodes always parse (as `Vendor`), unknown SIG
    /// opcodes come back as `Raw`.
    pub fn unpack(opcode: Opcode, parameters: &[u8]) -> Result<StatusMessage, MessagePackError> {
        if let Opcode::Vendor(vendor_opcode, company_id) = opcode {
            return Ok(StatusMessage::Vendor(vendor::VendorStatus {
                opcode: vendor_opcode,
                company_id,
                parameters: parameters.to_vec(),
            }));
        }
        match STATUS_PARSERS.iter().find(|(o, _)| *o == opcode) {
            Some((_, parse)) => parse(parameters),
            None => Ok(StatusMessage::Raw {
                opcode,
                parameters: parameters.to_vec(),
            }),
        }
    }
    /// Parses a full access payload (`Opcode || Parameters`).
    pub fn unpack_access(access_pdu: &[u8]) -> Result<StatusMessage, MessagePackError> {
        let opcode = Opcode::unpack_from(access_pdu)?;
        Self::unpack(opcode, &access_pdu[opcode.byte_len()..])
    }
    #[must_use]
    pub fn has_parser(opcode: Opcode) -> bool {
        opcode.is_vendor() || STATUS_PARSERS.iter().any(|(o, _)| *o == opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_off_set_parameters_use_received_seq() {
        let mut message = MeshMessage::generic(
            AppKeyIndex(0),
            ModelMessage::OnOff(generic::OnOffMessage::set(true)),
        );
        message.fill_tid(default_tid(SequenceNumber::new(0x0102_03)));
        assert_eq!(message.parameters().unwrap(), vec![0x01, 0x03]);
        assert_eq!(message.opcode(), Opcode::double(0x8202));
        assert!(message.is_acked());
        assert_eq!(message.key(), MessageKey::Application(AppKeyIndex(0)));
    }
    #[test]
    fn test_missing_tid_is_bad_state() {
        let message = MeshMessage::generic(
            AppKeyIndex(0),
            ModelMessage::OnOff(generic::OnOffMessage::set(false)),
        );
        assert_eq!(message.parameters(), Err(MessagePackError::BadState));
    }
    #[test]
    fn test_status_table() {
        let status = StatusMessage::unpack_access(&[0x82, 0x04, 0x01]).unwrap();
        assert_eq!(
            status,
            StatusMessage::OnOff(generic::OnOffStatus {
                present: true,
                target: None,
            })
        );
        assert!(matches!(
            StatusMessage::unpack_access(&[0x82, 0x99]),
            Ok(StatusMessage::Raw { .. })
        ));
        assert_eq!(
            StatusMessage::unpack_access(&[0x82, 0x04]),
            Err(MessagePackError::BadLength)
        );
    }
    #[test]
    fn test_transition_encoding() {
        let t = Transition::new(5, StepResolution::Second1, 10);
        let mut out = Vec::new();
        Transition::pack_into(Some(&t), &mut out);
        assert_eq!(out, vec![0x45, 10]);
        assert_eq!(
            RemainingTime::from(0x45),
            RemainingTime {
                steps: 5,
                resolution: StepResolution::Second1
            }
        );
    }
}
