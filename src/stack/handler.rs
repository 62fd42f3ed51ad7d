//! Drives outgoing messages through their [`MessageState`] and matches incoming statuses to them.
//!
//! Any number of messages may be in flight at once. Each is tracked under a [`CorrelationId`]
//! until its status arrives, its peer stops answering or it's cancelled.
use crate::access::Opcode;
use crate::address::{Address, UnicastAddress};
use crate::control::SegmentAck;
use crate::lower::{BlockAck, SegN, SeqZero};
use crate::models::proxy::{self, FilterStatus};
use crate::models::{default_tid, MeshMessage, StatusMessage};
use crate::net::PduType;
use crate::reassembler::ReassemblyKey;
use crate::stack::bearer::Bearer;
use crate::stack::messages::{AccessMessage, ControlMessage, Message};
use crate::stack::registry::{KeyStore, NodeRegistry};
use crate::stack::segments::{Expiry, OutgoingSegmentsKey, SegmentTimers, TimerKey};
use crate::stack::state::{self, ExpectedStatus, MessageState};
use crate::stack::transport::{MeshTransport, ParsedPdu};
use crate::stack::{RecvError, SendError, TransportConfig};
use core::fmt::{Display, Formatter};
use slog::Logger;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum HandlerError {
    Send(SendError),
    Recv(RecvError),
    /// No state exists for the message. Nothing was sent.
    UnrecognizedMessage(Opcode),
}
impl From<SendError> for HandlerError {
    fn from(e: SendError) -> Self {
        HandlerError::Send(e)
    }
}
impl From<RecvError> for HandlerError {
    fn from(e: RecvError) -> Self {
        HandlerError::Recv(e)
    }
}
impl Display for HandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            HandlerError::Send(e) => write!(f, "send: {}", e),
            HandlerError::Recv(e) => write!(f, "recv: {}", e),
            HandlerError::UnrecognizedMessage(o) => write!(f, "no message state for opcode {}", o),
        }
    }
}
impl std::error::Error for HandlerError {}

/// Identifies one outstanding request.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct CorrelationId {
    pub src: UnicastAddress,
    pub dst: Address,
    pub opcode: Opcode,
    pub seq_zero: SeqZero,
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum Phase {
    /// Handed to the bearer, not written yet.
    AwaitingWrite,
    /// Written. Waiting for the status.
    AwaitingResponse,
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum TransactionFailure {
    /// The peer started a segmented reply and never finished it.
    IncompleteTimeout,
    Cancelled,
    /// The peer kept missing segments of our message.
    RetransmitLimit,
    /// The peer answered our segments with an empty BlockAck.
    Rejected,
}

/// Everything the handler reports. All methods default to doing nothing.
pub trait MeshStatusCallbacks {
    /// An unacknowledged message went out. It's done.
    fn on_mesh_message_sent(&mut self, _dst: Address, _message: &MeshMessage) {}
    /// The bearer wrote an acknowledged message. Its status is awaited now.
    fn on_mesh_message_processed(&mut self, _dst: Address, _message: &MeshMessage) {}
    /// A status arrived. `correlation` is the request it answers, `None` if unsolicited.
    fn on_mesh_message_received(
        &mut self,
        _src: UnicastAddress,
        _status: &StatusMessage,
        _correlation: Option<CorrelationId>,
    ) {
    }
    fn on_transaction_failed(
        &mut self,
        _dst: Address,
        _message: &MeshMessage,
        _failure: TransactionFailure,
    ) {
    }
    fn on_block_ack_transmitted(&mut self, _dst: UnicastAddress, _ack: &SegmentAck) {}
    fn on_block_ack_received(&mut self, _src: UnicastAddress, _ack: &SegmentAck) {}
}
impl MeshStatusCallbacks for () {}

/// [`MeshStatusCallbacks`] as values, for sending them across tasks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StatusEvent {
    Sent {
        dst: Address,
        message: MeshMessage,
    },
    Processed {
        dst: Address,
        message: MeshMessage,
    },
    Received {
        src: UnicastAddress,
        status: StatusMessage,
        correlation: Option<CorrelationId>,
    },
    Failed {
        dst: Address,
        message: MeshMessage,
        failure: TransactionFailure,
    },
    BlockAckTransmitted {
        dst: UnicastAddress,
        ack: SegmentAck,
    },
    BlockAckReceived {
        src: UnicastAddress,
        ack: SegmentAck,
    },
}
impl MeshStatusCallbacks for mpsc::UnboundedSender<StatusEvent> {
    fn on_mesh_message_sent(&mut self, dst: Address, message: &MeshMessage) {
        let _ = self.send(StatusEvent::Sent {
            dst,
            message: message.clone(),
        });
    }
    fn on_mesh_message_processed(&mut self, dst: Address, message: &MeshMessage) {
        let _ = self.send(StatusEvent::Processed {
            dst,
            message: message.clone(),
        });
    }
    fn on_mesh_message_received(
        &mut self,
        src: UnicastAddress,
        status: &StatusMessage,
        correlation: Option<CorrelationId>,
    ) {
        let _ = self.send(StatusEvent::Received {
            src,
            status: status.clone(),
            correlation,
        });
    }
    fn on_transaction_failed(
        &mut self,
        dst: Address,
        message: &MeshMessage,
        failure: TransactionFailure,
    ) {
        let _ = self.send(StatusEvent::Failed {
            dst,
            message: message.clone(),
            failure,
        });
    }
    fn on_block_ack_transmitted(&mut self, dst: UnicastAddress, ack: &SegmentAck) {
        let _ = self.send(StatusEvent::BlockAckTransmitted { dst, ack: *ack });
    }
    fn on_block_ack_received(&mut self, src: UnicastAddress, ack: &SegmentAck) {
        let _ = self.send(StatusEvent::BlockAckReceived { src, ack: *ack });
    }
}

/// What [`MeshMessageHandler::parse_notification`] did with a PDU.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notification {
    /// Segment buffered, more to come.
    Incomplete {
        key: ReassemblyKey,
        block_ack: BlockAck,
    },
    /// Segment we already had. Acked again.
    Duplicate { key: ReassemblyKey },
    /// Acknowledgment of our own segments.
    SegmentAck { src: UnicastAddress, ack: SegmentAck },
    Status {
        src: UnicastAddress,
        status: StatusMessage,
        correlation: Option<CorrelationId>,
    },
    /// A status for a request the bearer hasn't finished writing.
    Dropped {
        src: UnicastAddress,
        correlation: CorrelationId,
    },
    /// Transport control message other than an acknowledgment.
    Control(ControlMessage),
}

struct InFlight {
    state: MessageState,
    phase: Phase,
    message: MeshMessage,
    expected: Option<ExpectedStatus>,
    built: Message,
}

struct OutgoingSegments {
    message: AccessMessage,
    /// Union of every BlockAck received so far.
    acked: BlockAck,
    retransmits: u8,
    id: CorrelationId,
}
impl OutgoingSegments {
    fn seg_n(&self) -> SegN {
        SegN::new(self.message.network_pdus.len().saturating_sub(1) as u8)
    }
}

pub struct MeshMessageHandler<N, B, C> {
    logger: Logger,
    config: TransportConfig,
    transport: MeshTransport,
    network: N,
    bearer: B,
    callbacks: C,
    timers: SegmentTimers,
    in_flight: BTreeMap<CorrelationId, InFlight>,
    outgoing_segments: BTreeMap<OutgoingSegmentsKey, OutgoingSegments>,
    /// Requests a reassembly buffer may be the reply to, taken when its first segment arrived.
    awaiting_reassembly: BTreeMap<ReassemblyKey, Vec<CorrelationId>>,
}
impl<N, B, C> MeshMessageHandler<N, B, C>
where
    N: NodeRegistry + KeyStore,
    B: Bearer,
    C: MeshStatusCallbacks,
{
    /// Timer expiries arrive on the returned receiver and must be fed back through
    /// [`MeshMessageHandler::on_timer_expired`].
    pub fn new(
        parent_logger: &Logger,
        config: TransportConfig,
        network: N,
        bearer: B,
        callbacks: C,
    ) -> (Self, mpsc::UnboundedReceiver<Expiry>) {
        let logger = parent_logger.new(o!("component" => "handler"));
        let (timers, expiries) = SegmentTimers::new(&logger);
        (
            Self {
                transport: MeshTransport::new(&logger, config),
                logger,
                config,
                network,
                bearer,
                callbacks,
                timers,
                in_flight: BTreeMap::new(),
                outgoing_segments: BTreeMap::new(),
                awaiting_reassembly: BTreeMap::new(),
            },
            expiries,
        )
    }
    pub fn network(&self) -> &N {
        &self.network
    }
    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }
    pub fn bearer(&self) -> &B {
        &self.bearer
    }
    pub fn bearer_mut(&mut self) -> &mut B {
        &mut self.bearer
    }
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }
    pub fn transport(&self) -> &MeshTransport {
        &self.transport
    }
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
    /// Our segmented messages still waiting for their acknowledgment.
    pub fn pending_segmented_count(&self) -> usize {
        self.outgoing_segments.len()
    }
    /// Current state of `id`. `NoOperation` once it's done, failed or unknown.
    pub fn message_state(&self, id: &CorrelationId) -> MessageState {
        self.in_flight
            .get(id)
            .map_or(MessageState::NoOperation, |e| e.state)
    }
    pub fn phase(&self, id: &CorrelationId) -> Option<Phase> {
        self.in_flight.get(id).map(|e| e.phase)
    }

    /// Builds `message`, hands its PDUs to the bearer and starts tracking it.
    pub fn send_mesh_message(
        &mut self,
        src: UnicastAddress,
        dst: Address,
        mut message: MeshMessage,
    ) -> Result<CorrelationId, HandlerError> {
        let (state, expected) = state::resolve(&message).ok_or_else(|| {
            warn!(self.logger, "unrecognized message"; "opcode" => %message.opcode());
            HandlerError::UnrecognizedMessage(message.opcode())
        })?;
        message.fill_tid(self.tid_for(src, dst));
        let built = self
            .transport
            .create_message_for(&self.network, src, dst, &message)?;
        let id = CorrelationId {
            src,
            dst,
            opcode: message.opcode(),
            seq_zero: SeqZero::from(built.seq()),
        };
        for pdu in built.outgoing() {
            self.bearer.write(pdu).map_err(SendError::from)?;
        }
        debug!(self.logger, "message sent";
            "dst" => %dst, "state" => ?state, "seq" => built.seq().value());
        if let (Message::Access(access), Some(peer)) = (&built, dst.unicast()) {
            if access.is_segmented() {
                let key = OutgoingSegmentsKey {
                    dst: peer,
                    seq_zero: access.seq_zero(),
                };
                self.outgoing_segments.insert(
                    key,
                    OutgoingSegments {
                        message: access.clone(),
                        acked: BlockAck::default(),
                        retransmits: 0,
                        id,
                    },
                );
                self.timers.start_ack(key, self.config.ack_timeout);
            }
        }
        if expected.is_none() {
            self.network.record_sent_seq(dst, built.seq());
            self.callbacks.on_mesh_message_sent(dst, &message);
        } else {
            self.in_flight.insert(
                id,
                InFlight {
                    state,
                    phase: Phase::AwaitingWrite,
                    message,
                    expected,
                    built,
                },
            );
        }
        Ok(id)
    }
    /// TID for set messages. The low byte of the last SEQ received from the target, or of our
    /// own next SEQ if we never heard from it.
    fn tid_for(&self, src: UnicastAddress, dst: Address) -> u8 {
        let received = dst
            .unicast()
            .and_then(|u| self.network.provisioned_node(u))
            .and_then(|node| node.received_seq);
        match received {
            Some(seq) => default_tid(seq),
            None => self
                .network
                .provisioner(src)
                .map_or(0, |p| (p.sequence_number() & 0xFF) as u8),
        }
    }

    /// The bearer finished writing `pdu`. Acknowledged messages whose last PDU it was start
    /// waiting for their status.
    pub fn handle_write_callback(&mut self, pdu: &[u8]) {
        for (id, entry) in self.in_flight.iter_mut() {
            if entry.phase == Phase::AwaitingWrite && entry.built.ends_with(pdu) {
                entry.phase = Phase::AwaitingResponse;
                trace!(self.logger, "written"; "dst" => %id.dst, "state" => ?entry.state);
                self.callbacks
                    .on_mesh_message_processed(id.dst, &entry.message);
            }
        }
    }

    /// Runs one PDU from the bearer through the stack and settles whatever it completes.
    pub fn parse_notification(
        &mut self,
        pdu: &[u8],
        pdu_type: PduType,
    ) -> Result<Notification, HandlerError> {
        let parsed = self.transport.parse_pdu(&self.network, pdu, pdu_type);
        // A buffer is gone once it completed, even if what it held didn't decrypt.
        self.forget_finished_reassemblies();
        match parsed? {
            ParsedPdu::Incomplete {
                key, block_ack, ..
            } => {
                if !self.awaiting_reassembly.contains_key(&key) {
                    let candidates = self.reply_candidates(key.src);
                    self.awaiting_reassembly.insert(key, candidates);
                }
                self.timers
                    .start_incomplete(key, self.config.incomplete_timeout);
                Ok(Notification::Incomplete { key, block_ack })
            }
            ParsedPdu::Duplicate { key, ack, .. } => {
                if let Some(ack) = ack {
                    self.write_ack(&ack)?;
                }
                Ok(Notification::Duplicate { key })
            }
            ParsedPdu::Ack { src, ack } => {
                self.callbacks.on_block_ack_received(src, &ack);
                self.handle_segment_ack(src, ack)?;
                Ok(Notification::SegmentAck { src, ack })
            }
            ParsedPdu::Complete { message, ack, .. } => {
                if let Some(ack) = ack {
                    self.write_ack(&ack)?;
                }
                self.network.record_received_seq(message.src(), message.seq());
                self.deliver(message)
            }
        }
    }

    /// Requests to `src` already written and waiting for their status.
    fn reply_candidates(&self, src: UnicastAddress) -> Vec<CorrelationId> {
        self.in_flight
            .iter()
            .filter(|(id, e)| e.phase == Phase::AwaitingResponse && self.is_peer(id.dst, src))
            .map(|(id, _)| *id)
            .collect()
    }
    fn forget_finished_reassemblies(&mut self) {
        let transport = &self.transport;
        let finished: Vec<ReassemblyKey> = self
            .awaiting_reassembly
            .keys()
            .filter(|key| !transport.is_reassembling(key))
            .copied()
            .collect();
        for key in finished {
            self.awaiting_reassembly.remove(&key);
            self.timers.cancel(&TimerKey::Incomplete(key));
        }
    }

    fn write_ack(&mut self, ack: &ControlMessage) -> Result<(), HandlerError> {
        for pdu in Message::Control(ack.clone()).outgoing() {
            self.bearer.write(pdu).map_err(SendError::from)?;
        }
        if let (Some(dst), Ok(unpacked)) = (ack.dst.unicast(), SegmentAck::unpack(&ack.parameters))
        {
            self.callbacks.on_block_ack_transmitted(dst, &unpacked);
        }
        Ok(())
    }

    fn deliver(&mut self, message: Message) -> Result<Notification, HandlerError> {
        let (src, opcode, status) = match &message {
            Message::Access(m) => (
                m.src,
                m.opcode,
                StatusMessage::unpack(m.opcode, &m.parameters).map_err(RecvError::from)?,
            ),
            Message::Control(m) if m.pdu_type == PduType::ProxyConfiguration => {
                let opcode = Opcode::single(m.opcode);
                let status = if m.opcode == proxy::opcodes::FILTER_STATUS {
                    StatusMessage::ProxyFilter(
                        FilterStatus::unpack_from(&m.parameters).map_err(RecvError::from)?,
                    )
                } else {
                    StatusMessage::Raw {
                        opcode,
                        parameters: m.parameters.clone(),
                    }
                };
                (m.src, opcode, status)
            }
            Message::Control(m) => {
                debug!(self.logger, "control message"; "src" => %m.src, "opcode" => m.opcode);
                return Ok(Notification::Control(m.clone()));
            }
        };
        let pdu_type = message.pdu_type();
        let answered = self.correlate(src, opcode, pdu_type, Phase::AwaitingResponse);
        if let Some(id) = answered {
            self.in_flight.remove(&id);
            self.forget_segments(&id);
            debug!(self.logger, "status received"; "src" => %src, "opcode" => %opcode);
            self.callbacks
                .on_mesh_message_received(src, &status, Some(id));
            return Ok(Notification::Status {
                src,
                status,
                correlation: Some(id),
            });
        }
        if let Some(id) = self.correlate(src, opcode, pdu_type, Phase::AwaitingWrite) {
            debug!(self.logger, "status before write completed, dropped";
                "src" => %src, "opcode" => %opcode);
            return Ok(Notification::Dropped {
                src,
                correlation: id,
            });
        }
        debug!(self.logger, "unsolicited message"; "src" => %src, "opcode" => %opcode);
        self.callbacks.on_mesh_message_received(src, &status, None);
        Ok(Notification::Status {
            src,
            status,
            correlation: None,
        })
    }

    fn is_peer(&self, dst: Address, src: UnicastAddress) -> bool {
        match dst {
            Address::Unicast(d) => self
                .network
                .provisioned_node(d)
                .map_or(d == src, |node| node.owns(src)),
            Address::Group(_) | Address::VirtualHash(_) => true,
            Address::Unassigned => false,
        }
    }
    fn correlate(
        &self,
        src: UnicastAddress,
        opcode: Opcode,
        pdu_type: PduType,
        phase: Phase,
    ) -> Option<CorrelationId> {
        self.in_flight
            .iter()
            .filter(|(_, e)| e.phase == phase)
            .filter(|(_, e)| e.expected.map_or(false, |x| x.matches(opcode, pdu_type)))
            .find(|(id, _)| pdu_type == PduType::ProxyConfiguration || self.is_peer(id.dst, src))
            .map(|(id, _)| *id)
    }

    fn handle_segment_ack(
        &mut self,
        src: UnicastAddress,
        ack: SegmentAck,
    ) -> Result<(), HandlerError> {
        let key = OutgoingSegmentsKey {
            dst: src,
            seq_zero: ack.seq_zero,
        };
        let outgoing = match self.outgoing_segments.get_mut(&key) {
            Some(outgoing) => outgoing,
            None => {
                debug!(self.logger, "ack for unknown segments";
                    "src" => %src, "seq_zero" => ack.seq_zero.value());
                return Ok(());
            }
        };
        if ack.block_ack == BlockAck::default() {
            warn!(self.logger, "peer rejected segmented message"; "src" => %src);
            let id = outgoing.id;
            self.forget_segments(&id);
            self.fail(&id, TransactionFailure::Rejected);
            return Ok(());
        }
        outgoing.acked = BlockAck(outgoing.acked.0 | ack.block_ack.0);
        if outgoing.acked.all_acked(outgoing.seg_n()) {
            debug!(self.logger, "all segments acked"; "dst" => %src);
            self.outgoing_segments.remove(&key);
            self.timers.cancel(&TimerKey::SegmentAck(key));
            return Ok(());
        }
        self.retransmit(key)?;
        Ok(())
    }
    /// Resends every segment of `key` not acked yet. Gives up once the retransmit limit is hit.
    fn retransmit(&mut self, key: OutgoingSegmentsKey) -> Result<Option<CorrelationId>, HandlerError> {
        let outgoing = match self.outgoing_segments.get_mut(&key) {
            Some(outgoing) => outgoing,
            None => return Ok(None),
        };
        if outgoing.retransmits >= self.config.segment_retransmit_limit {
            warn!(self.logger, "retransmit limit reached"; "dst" => %key.dst);
            let id = outgoing.id;
            self.forget_segments(&id);
            self.fail(&id, TransactionFailure::RetransmitLimit);
            return Ok(Some(id));
        }
        outgoing.retransmits += 1;
        let missing: Vec<_> = outgoing.acked.missing(outgoing.seg_n()).collect();
        for seg_o in missing {
            let resend = self
                .transport
                .create_retransmit_mesh_message(&self.network, &outgoing.message, seg_o)?;
            for pdu in Message::Access(resend).outgoing() {
                self.bearer.write(pdu).map_err(SendError::from)?;
            }
        }
        self.timers.start_ack(key, self.config.ack_timeout);
        Ok(None)
    }
    fn forget_segments(&mut self, id: &CorrelationId) {
        let keys: Vec<OutgoingSegmentsKey> = self
            .outgoing_segments
            .iter()
            .filter(|(_, o)| o.id == *id)
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            self.outgoing_segments.remove(&key);
            self.timers.cancel(&TimerKey::SegmentAck(key));
        }
    }
    fn fail(&mut self, id: &CorrelationId, failure: TransactionFailure) {
        if let Some(entry) = self.in_flight.remove(id) {
            debug!(self.logger, "transaction failed";
                "dst" => %id.dst, "state" => ?entry.state, "failure" => ?failure);
            self.callbacks
                .on_transaction_failed(id.dst, &entry.message, failure);
        }
    }

    /// Handles a timer from the receiver returned by [`MeshMessageHandler::new`]. Returns the
    /// requests that were given up on.
    pub fn on_timer_expired(&mut self, expiry: Expiry) -> Result<Vec<CorrelationId>, HandlerError> {
        if !self.timers.take_expired(&expiry) {
            return Ok(Vec::new());
        }
        match expiry.key {
            TimerKey::Incomplete(key) => {
                self.transport.remove_reassembly(&key);
                warn!(self.logger, "incomplete timer expired";
                    "src" => %key.src, "seq_zero" => key.seq_zero.value());
                let in_flight = &self.in_flight;
                let failed: Vec<CorrelationId> = self
                    .awaiting_reassembly
                    .remove(&key)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|id| {
                        in_flight
                            .get(id)
                            .map_or(false, |e| e.phase == Phase::AwaitingResponse)
                    })
                    .collect();
                for id in &failed {
                    self.fail(id, TransactionFailure::IncompleteTimeout);
                }
                Ok(failed)
            }
            TimerKey::SegmentAck(key) => {
                debug!(self.logger, "segment ack timer expired"; "dst" => %key.dst);
                Ok(self.retransmit(key)?.into_iter().collect())
            }
        }
    }

    /// Stops tracking `id` and drops the reassembly buffers and timers of its peer.
    pub fn cancel(&mut self, id: &CorrelationId) -> bool {
        if !self.in_flight.contains_key(id) {
            return false;
        }
        self.forget_segments(id);
        if let Some(peer) = id.dst.unicast() {
            self.drop_peer_buffers(peer);
        }
        self.fail(id, TransactionFailure::Cancelled);
        true
    }
    /// Cancels everything in flight to `peer`.
    pub fn cancel_peer(&mut self, peer: UnicastAddress) -> Vec<CorrelationId> {
        let cancelled: Vec<CorrelationId> = self
            .in_flight
            .keys()
            .filter(|id| self.is_peer(id.dst, peer))
            .copied()
            .collect();
        for id in &cancelled {
            self.forget_segments(id);
            self.fail(id, TransactionFailure::Cancelled);
        }
        self.drop_peer_buffers(peer);
        cancelled
    }
    fn drop_peer_buffers(&mut self, peer: UnicastAddress) {
        let dropped = self.transport.remove_peer(peer);
        self.timers.cancel_peer(peer);
        self.awaiting_reassembly.retain(|k, _| k.src != peer);
        self.outgoing_segments.retain(|k, _| k.dst != peer);
        if !dropped.is_empty() {
            debug!(self.logger, "dropped reassembly buffers";
                "peer" => %peer, "count" => dropped.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::DevKey;
    use crate::mesh::{AppKeyIndex, SequenceNumber, TTL};
    use crate::models::config::{opcodes as config_opcodes, ConfigMessage};
    use crate::models::generic::{opcodes as generic_opcodes, OnOffMessage, OnOffStatus};
    use crate::models::generic_access::GenericAccessMessage;
    use crate::models::ModelMessage;
    use crate::stack::bearer::OutgoingPdu;
    use crate::stack::registry::MeshNetwork;
    use crate::stack::testing::{self, NODE, PROVISIONER};
    use crate::upper::SecurityKey;
    use core::time::Duration;

    type TestHandler =
        MeshMessageHandler<MeshNetwork, Vec<OutgoingPdu>, mpsc::UnboundedSender<StatusEvent>>;

    struct Harness {
        handler: TestHandler,
        expiries: mpsc::UnboundedReceiver<Expiry>,
        events: mpsc::UnboundedReceiver<StatusEvent>,
        peer: MeshNetwork,
        peer_transport: MeshTransport,
    }
    fn harness() -> Harness {
        let (local, peer) = testing::networks();
        let (sender, events) = mpsc::unbounded_channel();
        let (handler, expiries) = MeshMessageHandler::new(
            &testing::logger(),
            TransportConfig::default(),
            local,
            Vec::new(),
            sender,
        );
        Harness {
            handler,
            expiries,
            events,
            peer,
            peer_transport: MeshTransport::new(&testing::logger(), TransportConfig::default()),
        }
    }
    impl Harness {
        fn written(&mut self) -> Vec<Vec<u8>> {
            self.handler
                .bearer_mut()
                .drain(..)
                .map(|p| p.pdu)
                .collect()
        }
        /// Status from the node, encrypted the way the node would.
        fn node_status(&self, key: SecurityKey, opcode: Opcode, parameters: &[u8]) -> Vec<Vec<u8>> {
            self.peer_transport
                .create_mesh_message(
                    &self.peer,
                    NODE,
                    PROVISIONER.into(),
                    TTL::DEFAULT,
                    &key,
                    false,
                    opcode,
                    parameters,
                )
                .unwrap()
                .network_pdus
                .values()
                .map(|s| s.pdu.clone())
                .collect()
        }
        fn event(&mut self) -> StatusEvent {
            self.events.try_recv().unwrap()
        }
    }
    fn on_off_set() -> MeshMessage {
        MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::set(true)))
    }

    #[tokio::test]
    async fn test_on_off_set_round_trip() {
        let mut h = harness();
        h.handler
            .network_mut()
            .record_received_seq(NODE, SequenceNumber::new(0x0123));
        let id = h
            .handler
            .send_mesh_message(PROVISIONER, NODE.into(), on_off_set())
            .unwrap();
        assert_eq!(h.handler.message_state(&id), MessageState::GenericOnOffSet);
        assert_eq!(h.handler.phase(&id), Some(Phase::AwaitingWrite));
        let written = h.written();
        assert_eq!(written.len(), 1);
        match h
            .peer_transport
            .parse_pdu(&h.peer, &written[0], PduType::Network)
            .unwrap()
        {
            ParsedPdu::Complete {
                message: Message::Access(m),
                ..
            } => {
                assert_eq!(m.opcode, generic_opcodes::ON_OFF_SET);
                assert_eq!(m.parameters, vec![0x01, 0x23]);
            }
            other => panic!("unexpected {:?}", other),
        }

        h.handler.handle_write_callback(&written[0]);
        assert_eq!(h.handler.phase(&id), Some(Phase::AwaitingResponse));
        assert!(matches!(h.event(), StatusEvent::Processed { .. }));

        let status = h.node_status(
            SecurityKey::Application(testing::app_key()),
            generic_opcodes::ON_OFF_STATUS,
            &[0x01],
        );
        let notification = h
            .handler
            .parse_notification(&status[0], PduType::Network)
            .unwrap();
        let expected = StatusMessage::OnOff(OnOffStatus {
            present: true,
            target: None,
        });
        assert_eq!(
            notification,
            Notification::Status {
                src: NODE,
                status: expected.clone(),
                correlation: Some(id),
            }
        );
        assert_eq!(h.handler.message_state(&id), MessageState::NoOperation);
        assert_eq!(
            h.event(),
            StatusEvent::Received {
                src: NODE,
                status: expected,
                correlation: Some(id),
            }
        );
    }
    #[tokio::test]
    async fn test_status_before_write_is_dropped() {
        let mut h = harness();
        let id = h
            .handler
            .send_mesh_message(PROVISIONER, NODE.into(), on_off_set())
            .unwrap();
        let status = h.node_status(
            SecurityKey::Application(testing::app_key()),
            generic_opcodes::ON_OFF_STATUS,
            &[0x00],
        );
        assert_eq!(
            h.handler
                .parse_notification(&status[0], PduType::Network)
                .unwrap(),
            Notification::Dropped {
                src: NODE,
                correlation: id
            }
        );
        assert_eq!(h.handler.message_state(&id), MessageState::GenericOnOffSet);
    }
    #[tokio::test]
    async fn test_unacknowledged_goes_straight_to_no_operation() {
        let mut h = harness();
        let message = MeshMessage::generic(
            AppKeyIndex(0),
            ModelMessage::OnOff(OnOffMessage::set_unacknowledged(false)),
        );
        let id = h
            .handler
            .send_mesh_message(PROVISIONER, NODE.into(), message)
            .unwrap();
        assert_eq!(h.handler.message_state(&id), MessageState::NoOperation);
        assert_eq!(h.handler.in_flight_count(), 0);
        assert!(matches!(h.event(), StatusEvent::Sent { .. }));
        let node = h.handler.network().provisioned_node(NODE).unwrap();
        assert!(node.sent_seq.is_some());
    }
    #[tokio::test]
    async fn test_several_requests_in_flight() {
        let mut h = harness();
        let on_off = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::Get)),
            )
            .unwrap();
        let composition = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::config(ConfigMessage::CompositionDataGet { page: 0 }),
            )
            .unwrap();
        assert_ne!(on_off, composition);
        assert_eq!(h.handler.in_flight_count(), 2);
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }
        let status = h.node_status(
            SecurityKey::Application(testing::app_key()),
            generic_opcodes::ON_OFF_STATUS,
            &[0x00],
        );
        h.handler
            .parse_notification(&status[0], PduType::Network)
            .unwrap();
        assert_eq!(h.handler.message_state(&on_off), MessageState::NoOperation);
        assert_eq!(
            h.handler.message_state(&composition),
            MessageState::CompositionDataGet
        );
        assert!(h.handler.cancel(&composition));
        assert_eq!(
            h.handler.message_state(&composition),
            MessageState::NoOperation
        );
        assert!(!h.handler.cancel(&composition));
    }
    #[tokio::test(start_paused = true)]
    async fn test_incomplete_reply_times_out() {
        let mut h = harness();
        let id = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::config(ConfigMessage::CompositionDataGet { page: 0 }),
            )
            .unwrap();
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }
        let reply = h.node_status(
            SecurityKey::Device(testing::dev_key()),
            config_opcodes::COMPOSITION_DATA_STATUS,
            &[0x5A; 30],
        );
        assert_eq!(reply.len(), 3);
        let key = match h
            .handler
            .parse_notification(&reply[0], PduType::Network)
            .unwrap()
        {
            Notification::Incomplete { key, block_ack } => {
                assert_eq!(block_ack, BlockAck(0b1));
                key
            }
            other => panic!("unexpected {:?}", other),
        };
        assert!(h.handler.transport().is_reassembling(&key));

        tokio::time::advance(Duration::from_secs(11)).await;
        let expiry = h.expiries.recv().await.unwrap();
        assert_eq!(expiry.key, TimerKey::Incomplete(key));
        assert_eq!(h.handler.on_timer_expired(expiry).unwrap(), vec![id]);
        assert_eq!(h.handler.message_state(&id), MessageState::NoOperation);
        assert!(!h.handler.transport().is_reassembling(&key));
        assert_eq!(h.handler.transport().reassembly_count(), 0);
        // Processed first, then the failure.
        h.event();
        assert!(matches!(
            h.event(),
            StatusEvent::Failed {
                failure: TransactionFailure::IncompleteTimeout,
                ..
            }
        ));
    }
    #[tokio::test(start_paused = true)]
    async fn test_undecryptable_reply_stops_its_timer() {
        let mut h = harness();
        let composition = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::config(ConfigMessage::CompositionDataGet { page: 0 }),
            )
            .unwrap();
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }
        let wrong_key = DevKey::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let reply = h.node_status(
            SecurityKey::Device(wrong_key),
            config_opcodes::COMPOSITION_DATA_STATUS,
            &[0x5A; 30],
        );
        assert_eq!(reply.len(), 3);
        for pdu in &reply[..2] {
            assert!(matches!(
                h.handler.parse_notification(pdu, PduType::Network),
                Ok(Notification::Incomplete { .. })
            ));
        }
        assert!(h
            .handler
            .parse_notification(&reply[2], PduType::Network)
            .is_err());
        assert_eq!(h.handler.transport().reassembly_count(), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        let on_off = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::Get)),
            )
            .unwrap();
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }
        assert!(
            tokio::time::timeout(Duration::from_secs(30), h.expiries.recv())
                .await
                .is_err()
        );
        assert_eq!(h.handler.message_state(&on_off), MessageState::GenericOnOffGet);
        assert_eq!(
            h.handler.message_state(&composition),
            MessageState::CompositionDataGet
        );
    }
    #[tokio::test(start_paused = true)]
    async fn test_incomplete_timeout_spares_later_requests() {
        let mut h = harness();
        let composition = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::config(ConfigMessage::CompositionDataGet { page: 0 }),
            )
            .unwrap();
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }
        // Handed to the bearer but never written.
        let unwritten = h
            .handler
            .send_mesh_message(PROVISIONER, NODE.into(), on_off_set())
            .unwrap();
        h.written();
        let reply = h.node_status(
            SecurityKey::Device(testing::dev_key()),
            config_opcodes::COMPOSITION_DATA_STATUS,
            &[0x5A; 30],
        );
        h.handler
            .parse_notification(&reply[0], PduType::Network)
            .unwrap();

        let later = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::generic(AppKeyIndex(0), ModelMessage::OnOff(OnOffMessage::Get)),
            )
            .unwrap();
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }

        tokio::time::advance(Duration::from_secs(11)).await;
        let expiry = h.expiries.recv().await.unwrap();
        assert_eq!(h.handler.on_timer_expired(expiry).unwrap(), vec![composition]);
        assert_eq!(
            h.handler.message_state(&composition),
            MessageState::NoOperation
        );
        assert_eq!(h.handler.message_state(&unwritten), MessageState::GenericOnOffSet);
        assert_eq!(h.handler.message_state(&later), MessageState::GenericOnOffGet);
    }
    #[tokio::test]
    async fn test_segmented_reply_is_acked() {
        let mut h = harness();
        let id = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::config(ConfigMessage::CompositionDataGet { page: 0 }),
            )
            .unwrap();
        for pdu in h.written() {
            h.handler.handle_write_callback(&pdu);
        }
        let mut parameters = vec![0x00, 0x59, 0x00, 0x01, 0x00, 0x02, 0x00, 0x0A, 0x00, 0x03, 0x00];
        parameters.extend_from_slice(&[0x00; 12]);
        let reply = h.node_status(
            SecurityKey::Device(testing::dev_key()),
            config_opcodes::COMPOSITION_DATA_STATUS,
            &parameters,
        );
        assert!(reply.len() > 1);
        let mut last = None;
        for pdu in &reply {
            last = Some(h.handler.parse_notification(pdu, PduType::Network).unwrap());
        }
        match last.unwrap() {
            Notification::Status {
                src,
                correlation,
                ..
            } => {
                assert_eq!(src, NODE);
                assert_eq!(correlation, Some(id));
            }
            other => panic!("unexpected {:?}", other),
        }
        let written = h.written();
        assert_eq!(written.len(), 1);
        match h
            .peer_transport
            .parse_pdu(&h.peer, &written[0], PduType::Network)
            .unwrap()
        {
            ParsedPdu::Ack { src, ack } => {
                assert_eq!(src, PROVISIONER);
                assert!(ack.block_ack.all_acked(SegN::new(reply.len() as u8 - 1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    #[tokio::test]
    async fn test_partial_ack_resends_missing_segments() {
        let mut h = harness();
        let message = MeshMessage::GenericAccess(
            GenericAccessMessage::application(Opcode::double(0x8250), vec![0x11; 30], AppKeyIndex(0))
                .expecting(Opcode::double(0x8251)),
        );
        let id = h
            .handler
            .send_mesh_message(PROVISIONER, NODE.into(), message)
            .unwrap();
        let original = h.written();
        assert_eq!(original.len(), 3);
        assert_eq!(h.handler.pending_segmented_count(), 1);

        let ack = |h: &Harness, block_ack: u32| {
            h.peer_transport
                .create_segment_block_ack(
                    &h.peer,
                    NODE,
                    PROVISIONER,
                    id.seq_zero,
                    BlockAck(block_ack),
                    TTL::DEFAULT,
                )
                .unwrap()
                .network_pdus[&0]
                .pdu
                .clone()
        };
        let partial = ack(&h, 0b101);
        h.handler
            .parse_notification(&partial, PduType::Network)
            .unwrap();
        assert_eq!(h.written(), vec![original[1].clone()]);

        let full = ack(&h, 0b111);
        h.handler.parse_notification(&full, PduType::Network).unwrap();
        assert!(h.written().is_empty());
        assert_eq!(h.handler.pending_segmented_count(), 0);
        assert_eq!(h.handler.message_state(&id), MessageState::GenericAccessMessage);
    }
    #[tokio::test(start_paused = true)]
    async fn test_retransmit_limit() {
        let mut h = harness();
        let message = MeshMessage::GenericAccess(
            GenericAccessMessage::application(Opcode::double(0x8250), vec![0x22; 30], AppKeyIndex(0))
                .expecting(Opcode::double(0x8251)),
        );
        let id = h
            .handler
            .send_mesh_message(PROVISIONER, NODE.into(), message)
            .unwrap();
        h.written();
        let limit = TransportConfig::default().segment_retransmit_limit;
        for _ in 0..limit {
            let expiry = h.expiries.recv().await.unwrap();
            assert!(h.handler.on_timer_expired(expiry).unwrap().is_empty());
            assert_eq!(h.written().len(), 3);
        }
        let expiry = h.expiries.recv().await.unwrap();
        assert_eq!(h.handler.on_timer_expired(expiry).unwrap(), vec![id]);
        assert_eq!(h.handler.message_state(&id), MessageState::NoOperation);
        assert_eq!(h.handler.pending_segmented_count(), 0);
    }
    #[tokio::test]
    async fn test_cancel_peer_drops_buffers() {
        let mut h = harness();
        let id = h
            .handler
            .send_mesh_message(
                PROVISIONER,
                NODE.into(),
                MeshMessage::config(ConfigMessage::CompositionDataGet { page: 0 }),
            )
            .unwrap();
        let reply = h.node_status(
            SecurityKey::Device(testing::dev_key()),
            config_opcodes::COMPOSITION_DATA_STATUS,
            &[0x5A; 30],
        );
        h.handler
            .parse_notification(&reply[0], PduType::Network)
            .unwrap();
        assert_eq!(h.handler.transport().reassembly_count(), 1);
        assert_eq!(h.handler.cancel_peer(NODE), vec![id]);
        assert_eq!(h.handler.transport().reassembly_count(), 0);
        assert_eq!(h.handler.message_state(&id), MessageState::NoOperation);
    }
}
