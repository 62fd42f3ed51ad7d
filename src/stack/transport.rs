//! Transport façade. Runs outgoing messages down through Access, Upper, Lower and Network and
//! incoming PDUs back up.
use crate::access::{AccessPayload, Opcode, SigOpcode};
use crate::address::{Address, UnicastAddress};
use crate::control::{ControlOpcode, SegmentAck};
use crate::lower::{
    recover_sequence_number, BlockAck, LowerTransportError, SegO, SeqZero, PDU, SZMIC,
};
use crate::mesh::{CompanyID, IVIndex, SequenceNumber, CTL, TTL};
use crate::models::{MeshMessage, MessageKey};
use crate::net::{Header, NetworkError, NetworkPDU, PduType};
use crate::reassembler::{Context, ReassembleError, ReassembleOutcome, Reassembler, ReassemblyKey};
use crate::replay;
use crate::segmenter::{lower_access, SegmentKind, Segmenter};
use crate::stack::messages::{AccessMessage, ControlMessage, Message, NetworkSegment};
use crate::stack::registry::{KeyStore, NodeRegistry};
use crate::stack::{RecvError, SendError, TransportConfig};
use crate::upper::{SecurityKey, UpperPDU};
use crate::crypto::nonce::UpperNonceParts;
use slog::Logger;
use std::collections::BTreeMap;

/// What an incoming PDU turned into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedPdu {
    /// A whole message. `key` is set when it was reassembled from segments and `ack` holds the
    /// Segment Acknowledgment to send back, if one is owed.
    Complete {
        message: Message,
        key: Option<ReassemblyKey>,
        ack: Option<ControlMessage>,
    },
    /// A segment was buffered. `started` is set when it opened a new buffer.
    Incomplete {
        key: ReassemblyKey,
        block_ack: BlockAck,
        started: bool,
    },
    /// A segment we already had. The peer is retransmitting so it gets our current BlockAck again.
    Duplicate {
        key: ReassemblyKey,
        block_ack: BlockAck,
        ack: Option<ControlMessage>,
    },
    /// Segment Acknowledgment for one of our segmented messages.
    Ack { src: UnicastAddress, ack: SegmentAck },
}

pub struct MeshTransport {
    logger: Logger,
    config: TransportConfig,
    replay: replay::Cache,
    reassembler: Reassembler,
    /// Last reassembled SeqZero per source and the BlockAck it was acked with.
    completed: BTreeMap<UnicastAddress, (SeqZero, BlockAck)>,
}
impl MeshTransport {
    #[must_use]
    pub fn new(parent_logger: &Logger, config: TransportConfig) -> Self {
        Self {
            logger: parent_logger.new(o!("layer" => "transport")),
            config,
            replay: replay::Cache::new(),
            reassembler: Reassembler::new(),
            completed: BTreeMap::new(),
        }
    }
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
    #[must_use]
    pub fn replay_cache(&self) -> &replay::Cache {
        &self.replay
    }
    #[must_use]
    pub fn is_reassembling(&self, key: &ReassemblyKey) -> bool {
        self.reassembler.contains(key)
    }
    #[must_use]
    pub fn reassembly_count(&self) -> usize {
        self.reassembler.len()
    }
    /// Drops the reassembly buffer for `key`. Returns `false` if there was none.
    pub fn remove_reassembly(&mut self, key: &ReassemblyKey) -> bool {
        self.reassembler.remove(key).is_some()
    }
    /// Drops every reassembly buffer of `src`.
    pub fn remove_peer(&mut self, src: UnicastAddress) -> Vec<ReassemblyKey> {
        self.completed.remove(&src);
        self.reassembler.remove_src(src)
    }

    fn encrypt_lower<N: KeyStore>(
        network: &N,
        header: Header,
        iv_index: IVIndex,
        lower: &PDU,
        pdu_type: PduType,
    ) -> Result<Vec<u8>, SendError> {
        let pdu = NetworkPDU {
            header,
            transport_pdu: lower.to_bytes()?,
        };
        Ok(pdu.encrypt(network.network_keys(), iv_index, pdu_type)?)
    }
    fn header<N: KeyStore>(
        network: &N,
        iv_index: IVIndex,
        ctl: CTL,
        ttl: TTL,
        seq: SequenceNumber,
        src: UnicastAddress,
        dst: Address,
    ) -> Header {
        Header {
            ivi: iv_index.ivi(),
            nid: network.network_keys().nid(),
            ctl,
            ttl,
            seq,
            src,
            dst,
        }
    }

    /// Encrypts `opcode || parameters` with `key` and splits it into network PDUs. The first PDU
    /// carries SeqAuth, later segments each take a fresh sequence number.
    #[allow(clippy::too_many_arguments)]
    pub fn create_mesh_message<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        src: UnicastAddress,
        dst: Address,
        ttl: TTL,
        key: &SecurityKey,
        aszmic: bool,
        opcode: Opcode,
        parameters: &[u8],
    ) -> Result<AccessMessage, SendError> {
        let dst_ok = match key {
            SecurityKey::Device(_) => dst.is_unicast(),
            SecurityKey::Application(_) => dst.is_assigned(),
        };
        if !dst_ok {
            return Err(SendError::InvalidDestination(dst));
        }
        let access = AccessPayload::new(opcode, parameters)?.to_bytes()?;
        let provisioner = network
            .provisioner(src)
            .ok_or(SendError::UnknownProvisioner(src))?;
        let seq = provisioner.next_seq()?;
        let iv_index = network.iv_index();
        let upper = UpperPDU::encrypt(
            &access,
            key,
            UpperNonceParts {
                aszmic,
                seq,
                src,
                dst,
                iv_index,
            },
        )?;
        let lower_pdus = lower_access(&upper, SeqZero::from(seq))?;
        let mut network_pdus = BTreeMap::new();
        for (seg_o, lower) in lower_pdus.iter().enumerate() {
            let segment_seq = if seg_o == 0 {
                seq
            } else {
                provisioner.next_seq()?
            };
            let header = Self::header(network, iv_index, CTL(false), ttl, segment_seq, src, dst);
            let pdu = Self::encrypt_lower(network, header, iv_index, lower, PduType::Network)?;
            network_pdus.insert(
                seg_o as u8,
                NetworkSegment {
                    seq: segment_seq,
                    pdu,
                },
            );
        }
        debug!(self.logger, "created mesh message";
            "src" => %src, "dst" => %dst, "opcode" => %opcode, "seq" => seq.value(),
            "segments" => network_pdus.len());
        Ok(AccessMessage {
            src,
            dst,
            seq,
            iv_index,
            ttl,
            opcode,
            parameters: parameters.to_vec(),
            akf: upper.akf,
            aid: upper.aid,
            aszmic: upper.szmic,
            company_id: opcode.company_id(),
            upper_pdu: upper.payload,
            network_pdus,
        })
    }
    /// [`MeshTransport::create_mesh_message`] with a 3 octet vendor opcode.
    #[allow(clippy::too_many_arguments)]
    pub fn create_vendor_mesh_message<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        src: UnicastAddress,
        dst: Address,
        ttl: TTL,
        key: &SecurityKey,
        aszmic: bool,
        opcode: u8,
        company_id: CompanyID,
        parameters: &[u8],
    ) -> Result<AccessMessage, SendError> {
        self.create_mesh_message(
            network,
            src,
            dst,
            ttl,
            key,
            aszmic,
            Opcode::vendor(opcode, company_id),
            parameters,
        )
    }
    /// Proxy configuration message. Network encrypted only, with TTL 0 and no destination.
    pub fn create_proxy_configuration_message<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        src: UnicastAddress,
        opcode: u8,
        parameters: &[u8],
    ) -> Result<ControlMessage, SendError> {
        let provisioner = network
            .provisioner(src)
            .ok_or(SendError::UnknownProvisioner(src))?;
        let seq = provisioner.next_seq()?;
        let iv_index = network.iv_index();
        let header = Self::header(
            network,
            iv_index,
            CTL(true),
            TTL::PROXY_CONFIGURATION,
            seq,
            src,
            Address::Unassigned,
        );
        let mut transport_pdu = Vec::with_capacity(1 + parameters.len());
        transport_pdu.push(opcode);
        transport_pdu.extend_from_slice(parameters);
        let pdu = NetworkPDU {
            header,
            transport_pdu,
        }
        .encrypt(
            network.network_keys(),
            iv_index,
            PduType::ProxyConfiguration,
        )?;
        let mut network_pdus = BTreeMap::new();
        network_pdus.insert(0, NetworkSegment { seq, pdu });
        Ok(ControlMessage {
            src,
            dst: Address::Unassigned,
            seq,
            iv_index,
            ttl: TTL::PROXY_CONFIGURATION,
            opcode,
            parameters: parameters.to_vec(),
            pdu_type: PduType::ProxyConfiguration,
            network_pdus,
        })
    }
    /// Segment Acknowledgment from `src` telling `dst` which of its segments arrived.
    pub fn create_segment_block_ack<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        src: UnicastAddress,
        dst: UnicastAddress,
        seq_zero: SeqZero,
        block_ack: BlockAck,
        ttl: TTL,
    ) -> Result<ControlMessage, SendError> {
        let provisioner = network
            .provisioner(src)
            .ok_or(SendError::UnknownProvisioner(src))?;
        let seq = provisioner.next_seq()?;
        let iv_index = network.iv_index();
        let ack = SegmentAck::new(seq_zero, block_ack);
        let lower = PDU::UnsegmentedControl(ack.to_pdu());
        let header = Self::header(network, iv_index, CTL(true), ttl, seq, src, dst.into());
        let pdu = Self::encrypt_lower(network, header, iv_index, &lower, PduType::Network)?;
        let mut network_pdus = BTreeMap::new();
        network_pdus.insert(0, NetworkSegment { seq, pdu });
        Ok(ControlMessage {
            src,
            dst: dst.into(),
            seq,
            iv_index,
            ttl,
            opcode: ControlOpcode::Ack.into(),
            parameters: ack.pack().to_vec(),
            pdu_type: PduType::Network,
            network_pdus,
        })
    }
    /// Rebuilds segment `seg_o` of `message` for retransmission. The segment keeps the sequence
    /// number it was first sent with, so the bytes are identical to the original.
    pub fn create_retransmit_mesh_message<N: KeyStore>(
        &self,
        network: &N,
        message: &AccessMessage,
        seg_o: SegO,
    ) -> Result<AccessMessage, SendError> {
        let segment = message
            .network_pdus
            .get(&seg_o.value())
            .ok_or(LowerTransportError::InvalidSegmentOffset)?;
        let lower = if message.is_segmented() {
            Segmenter::new(
                SegmentKind::Access {
                    akf: message.akf,
                    aid: message.aid,
                    szmic: message.aszmic,
                },
                message.seq_zero(),
                message.upper_pdu.clone(),
            )?
            .segment(seg_o)
            .ok_or(LowerTransportError::InvalidSegmentOffset)?
        } else {
            let upper = UpperPDU {
                akf: message.akf,
                aid: message.aid,
                szmic: message.aszmic,
                payload: message.upper_pdu.clone(),
            };
            lower_access(&upper, message.seq_zero())?
                .into_iter()
                .next()
                .ok_or(LowerTransportError::TooShort)?
        };
        let header = Self::header(
            network,
            message.iv_index,
            CTL(false),
            message.ttl,
            segment.seq,
            message.src,
            message.dst,
        );
        let pdu = Self::encrypt_lower(network, header, message.iv_index, &lower, PduType::Network)?;
        debug!(self.logger, "retransmit segment";
            "dst" => %message.dst, "seg_o" => seg_o.value(), "seq" => segment.seq.value());
        let mut retransmit = message.clone();
        retransmit.network_pdus = BTreeMap::new();
        retransmit.network_pdus.insert(
            seg_o.value(),
            NetworkSegment {
                seq: segment.seq,
                pdu,
            },
        );
        Ok(retransmit)
    }
    /// Builds any [`MeshMessage`], picking the key its [`MessageKey`] names.
    pub fn create_message_for<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        src: UnicastAddress,
        dst: Address,
        message: &MeshMessage,
    ) -> Result<Message, SendError> {
        let opcode = message.opcode();
        let parameters = message.parameters()?;
        let ttl = message.ttl().unwrap_or(self.config.default_ttl);
        let key = match message.key() {
            MessageKey::Network => {
                let proxy_opcode = match opcode {
                    Opcode::SIG(SigOpcode::SingleOctet(o)) => o,
                    _ => return Err(crate::access::AccessError::InvalidOpcode.into()),
                };
                return self
                    .create_proxy_configuration_message(network, src, proxy_opcode, &parameters)
                    .map(Message::Control);
            }
            MessageKey::Device => {
                let node = dst
                    .unicast()
                    .and_then(|u| network.provisioned_node(u))
                    .ok_or(SendError::UnknownNode(dst))?;
                SecurityKey::Device(node.device_key)
            }
            MessageKey::Application(index) => SecurityKey::Application(
                network
                    .application_key(index)
                    .ok_or(SendError::InvalidAppKeyIndex(index))?,
            ),
        };
        self.create_mesh_message(
            network,
            src,
            dst,
            ttl,
            &key,
            message.aszmic(),
            opcode,
            &parameters,
        )
        .map(Message::Access)
    }

    /// Decrypts one PDU from the bearer and runs it up the stack.
    pub fn parse_pdu<N: NodeRegistry + KeyStore>(
        &mut self,
        network: &N,
        bytes: &[u8],
        pdu_type: PduType,
    ) -> Result<ParsedPdu, RecvError> {
        let current_iv = network.iv_index();
        let net = NetworkPDU::decrypt(bytes, network.network_keys(), current_iv, pdu_type)
            .map_err(|e| {
                debug!(self.logger, "network decrypt failed"; "error" => %e);
                e
            })?;
        let header = net.header;
        let iv_index = current_iv
            .matching_ivi(header.ivi)
            .ok_or(NetworkError::IVIndexMismatch)?;
        let replayed = self.replay.replay_check(header.src, iv_index, header.seq);
        if pdu_type == PduType::ProxyConfiguration {
            if replayed {
                debug!(self.logger, "replayed proxy PDU"; "src" => %header.src, "seq" => header.seq.value());
                return Err(RecvError::OldSeq);
            }
            let (&opcode, parameters) = net
                .transport_pdu
                .split_first()
                .ok_or(LowerTransportError::TooShort)?;
            return Ok(ParsedPdu::Complete {
                message: Message::Control(ControlMessage {
                    src: header.src,
                    dst: header.dst,
                    seq: header.seq,
                    iv_index,
                    ttl: header.ttl,
                    opcode,
                    parameters: parameters.to_vec(),
                    pdu_type,
                    network_pdus: BTreeMap::new(),
                }),
                key: None,
                ack: None,
            });
        }
        let lower = PDU::from_bytes(&net.transport_pdu, header.ctl)?;
        // Segments are deduplicated by the reassembler instead.
        if replayed && !lower.is_seg() {
            debug!(self.logger, "replayed PDU"; "src" => %header.src, "seq" => header.seq.value());
            return Err(RecvError::OldSeq);
        }
        match lower {
            PDU::UnsegmentedAccess(p) => {
                let upper = UpperPDU {
                    akf: p.akf,
                    aid: p.aid,
                    szmic: SZMIC(false),
                    payload: p.upper_pdu,
                };
                let message = self.open_access(network, &header, iv_index, header.seq, upper)?;
                Ok(ParsedPdu::Complete {
                    message: Message::Access(message),
                    key: None,
                    ack: None,
                })
            }
            PDU::UnsegmentedControl(p) => {
                if p.opcode == u8::from(ControlOpcode::Ack) {
                    let ack = SegmentAck::unpack(&p.parameters)?;
                    debug!(self.logger, "segment ack received";
                        "src" => %header.src, "seq_zero" => ack.seq_zero.value(),
                        "block_ack" => ack.block_ack.0);
                    return Ok(ParsedPdu::Ack {
                        src: header.src,
                        ack,
                    });
                }
                Ok(ParsedPdu::Complete {
                    message: Message::Control(ControlMessage {
                        src: header.src,
                        dst: header.dst,
                        seq: header.seq,
                        iv_index,
                        ttl: header.ttl,
                        opcode: p.opcode,
                        parameters: p.parameters,
                        pdu_type,
                        network_pdus: BTreeMap::new(),
                    }),
                    key: None,
                    ack: None,
                })
            }
            PDU::SegmentedAccess(_) | PDU::SegmentedControl(_) => {
                self.reassemble(network, &header, iv_index, &lower)
            }
        }
    }

    fn reassemble<N: NodeRegistry + KeyStore>(
        &mut self,
        network: &N,
        header: &Header,
        iv_index: IVIndex,
        lower: &PDU,
    ) -> Result<ParsedPdu, RecvError> {
        let segment = lower
            .segment_header()
            .ok_or(ReassembleError::NotSegmented)?;
        let key = ReassemblyKey {
            src: header.src,
            seq_zero: segment.seq_zero,
        };
        if let Some(&(seq_zero, block_ack)) = self.completed.get(&header.src) {
            if seq_zero == segment.seq_zero && !self.reassembler.contains(&key) {
                debug!(self.logger, "segment of a completed message";
                    "src" => %header.src, "seq_zero" => seq_zero.value());
                let ack = self.ack_for(network, header, seq_zero, block_ack);
                return Ok(ParsedPdu::Duplicate {
                    key,
                    block_ack,
                    ack,
                });
            }
        }
        match self.reassembler.insert(header.src, lower) {
            Err(ReassembleError::SegmentAlreadyInserted(seg_o)) => {
                let block_ack = self
                    .reassembler
                    .get(&key)
                    .map_or_else(BlockAck::default, Context::block_ack);
                debug!(self.logger, "duplicate segment";
                    "src" => %header.src, "seg_o" => seg_o.value());
                let ack = self.ack_for(network, header, key.seq_zero, block_ack);
                Ok(ParsedPdu::Duplicate {
                    key,
                    block_ack,
                    ack,
                })
            }
            Err(e) => Err(e.into()),
            Ok(ReassembleOutcome::Incomplete {
                key,
                block_ack,
                started,
            }) => Ok(ParsedPdu::Incomplete {
                key,
                block_ack,
                started,
            }),
            Ok(ReassembleOutcome::Complete {
                key,
                kind,
                block_ack,
                data,
                ..
            }) => {
                self.completed.insert(header.src, (key.seq_zero, block_ack));
                let ack = self.ack_for(network, header, key.seq_zero, block_ack);
                let seq_auth = recover_sequence_number(header.seq, key.seq_zero)
                    .ok_or(RecvError::InvalidSequence)?;
                let message = match kind {
                    SegmentKind::Access { akf, aid, szmic } => {
                        let upper = UpperPDU {
                            akf,
                            aid,
                            szmic,
                            payload: data,
                        };
                        Message::Access(self.open_access(
                            network, header, iv_index, seq_auth, upper,
                        )?)
                    }
                    SegmentKind::Control { opcode } => Message::Control(ControlMessage {
                        src: header.src,
                        dst: header.dst,
                        seq: seq_auth,
                        iv_index,
                        ttl: header.ttl,
                        opcode,
                        parameters: data,
                        pdu_type: PduType::Network,
                        network_pdus: BTreeMap::new(),
                    }),
                };
                Ok(ParsedPdu::Complete {
                    message,
                    key: Some(key),
                    ack,
                })
            }
        }
    }

    /// Ack for a segmented message from `header.src`. Only owed when it was sent to one of our
    /// provisioner addresses.
    fn ack_for<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        header: &Header,
        seq_zero: SeqZero,
        block_ack: BlockAck,
    ) -> Option<ControlMessage> {
        let dst = header.dst.unicast()?;
        network.provisioner(dst)?;
        let ttl = if header.ttl.value() == 0 {
            TTL::new(0)
        } else {
            self.config.default_ttl
        };
        self.create_segment_block_ack(network, dst, header.src, seq_zero, block_ack, ttl)
            .map_err(|e| {
                warn!(self.logger, "can't build segment ack"; "error" => %e);
            })
            .ok()
    }

    fn open_access<N: NodeRegistry + KeyStore>(
        &self,
        network: &N,
        header: &Header,
        iv_index: IVIndex,
        seq_auth: SequenceNumber,
        upper: UpperPDU,
    ) -> Result<AccessMessage, RecvError> {
        let parts = UpperNonceParts {
            aszmic: upper.szmic.0,
            seq: seq_auth,
            src: header.src,
            dst: header.dst,
            iv_index,
        };
        let device_key = network
            .provisioned_node(header.src)
            .map(|node| node.device_key);
        let app_keys = upper
            .aid
            .map(|aid| network.application_keys(aid))
            .unwrap_or_default();
        let (access, _) = upper
            .decrypt_with(device_key.as_ref(), app_keys.iter(), parts)
            .map_err(|e| {
                debug!(self.logger, "upper decrypt failed";
                    "src" => %header.src, "error" => %e);
                e
            })?;
        let payload = AccessPayload::unpack_from(&access)?;
        let opcode = payload.opcode();
        Ok(AccessMessage {
            src: header.src,
            dst: header.dst,
            seq: seq_auth,
            iv_index,
            ttl: header.ttl,
            opcode,
            parameters: payload.parameters().to_vec(),
            akf: upper.akf,
            aid: upper.aid,
            aszmic: upper.szmic,
            company_id: opcode.company_id(),
            upper_pdu: upper.payload,
            network_pdus: BTreeMap::new(),
        })
    }
}
