//! BLOB Transfer client messages.
use crate::access::Opcode;
use crate::models::{MessagePackError, PackableMessage, Reader};

pub mod opcodes {
    use crate::access::Opcode;
    pub const BLOB_TRANSFER_GET: Opcode = Opcode::double(0x8300);
    pub const BLOB_TRANSFER_START: Opcode = Opcode::double(0x8301);
    pub const BLOB_TRANSFER_CANCEL: Opcode = Opcode::double(0x8302);
    pub const BLOB_TRANSFER_STATUS: Opcode = Opcode::double(0x8303);
    pub const BLOB_BLOCK_START: Opcode = Opcode::double(0x8304);
    pub const BLOB_BLOCK_GET: Opcode = Opcode::double(0x8305);
    pub const BLOB_CHUNK_TRANSFER: Opcode = Opcode::single(0x7D);
    pub const BLOB_BLOCK_STATUS: Opcode = Opcode::single(0x7E);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferMode {
    None = 0b00,
    Push = 0b01,
    Pull = 0b10,
}
impl TransferMode {
    fn from_bits(bits: u8) -> Result<Self, MessagePackError> {
        match bits & 0b11 {
            0b00 => Ok(TransferMode::None),
            0b01 => Ok(TransferMode::Push),
            0b10 => Ok(TransferMode::Pull),
            _ => Err(MessagePackError::BadBytes),
        }
    }
}

/// Chunk payload limit for one Chunk Transfer (before segmentation).
pub const MAX_CHUNK_LEN: usize = 241;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum BlobMessage {
    TransferGet,
    TransferStart {
        mode: TransferMode,
        blob_id: u64,
        blob_size: u32,
        block_size_log: u8,
        mtu_size: u16,
    },
    TransferCancel {
        blob_id: u64,
    },
    BlockStart {
        block_number: u16,
        chunk_size: u16,
    },
    BlockGet,
    /// Chunks are never acknowledged individually. The next Block Get reports what's missing.
    ChunkTransfer {
        chunk_number: u16,
        data: Vec<u8>,
    },
}
impl PackableMessage for BlobMessage {
    fn opcode(&self) -> Opcode {
        use opcodes::*;
        match self {
            BlobMessage::TransferGet => BLOB_TRANSFER_GET,
            BlobMessage::TransferStart { .. } => BLOB_TRANSFER_START,
            BlobMessage::TransferCancel { .. } => BLOB_TRANSFER_CANCEL,
            BlobMessage::BlockStart { .. } => BLOB_BLOCK_START,
            BlobMessage::BlockGet => BLOB_BLOCK_GET,
            BlobMessage::ChunkTransfer { .. } => BLOB_CHUNK_TRANSFER,
        }
    }

    fn pack_into(&self, buffer: &mut Vec<u8>) -> Result<(), MessagePackError> {
        match self {
            BlobMessage::TransferGet | BlobMessage::BlockGet => (),
            BlobMessage::TransferStart {
                mode,
                blob_id,
                blob_size,
                block_size_log,
                mtu_size,
            } => {
                buffer.push((*mode as u8) << 6);
                buffer.extend_from_slice(&blob_id.to_le_bytes());
                buffer.extend_from_slice(&blob_size.to_le_bytes());
                buffer.push(*block_size_log);
                buffer.extend_from_slice(&mtu_size.to_le_bytes());
            }
            BlobMessage::TransferCancel { blob_id } => {
                buffer.extend_from_slice(&blob_id.to_le_bytes())
            }
            BlobMessage::BlockStart {
                block_number,
                chunk_size,
            } => {
                buffer.extend_from_slice(&block_number.to_le_bytes());
                buffer.extend_from_slice(&chunk_size.to_le_bytes());
            }
            BlobMessage::ChunkTransfer { chunk_number, data } => {
                if data.is_empty() || data.len() > MAX_CHUNK_LEN {
                    return Err(MessagePackError::BadState);
                }
                buffer.extend_from_slice(&chunk_number.to_le_bytes());
                buffer.extend_from_slice(data);
            }
        }
        Ok(())
    }

    fn is_acked(&self) -> bool {
        !matches!(self, BlobMessage::ChunkTransfer { .. })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct BlobTransferInfo {
    pub blob_id: u64,
    pub blob_size: u32,
    pub block_size_log: u8,
    pub mtu_size: u16,
}
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct BlobTransferStatus {
    pub status: u8,
    pub mode: TransferMode,
    pub phase: u8,
    pub info: Option<BlobTransferInfo>,
    /// Blocks Not Received bitfield, raw.
    pub blocks_not_received: Vec<u8>,
}
impl BlobTransferStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let b = r.u8()?;
        let status = b & 0x0F;
        let mode = TransferMode::from_bits(b >> 6)?;
        let phase = r.u8()?;
        let info = if r.is_empty() {
            None
        } else {
            Some(BlobTransferInfo {
                blob_id: r.u64()?,
                blob_size: r.u32()?,
                block_size_log: r.u8()?,
                mtu_size: r.u16()?,
            })
        };
        Ok(BlobTransferStatus {
            status,
            mode,
            phase,
            info,
            blocks_not_received: r.rest().to_vec(),
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct BlobBlockStatus {
    pub status: u8,
    /// 0: all chunks missing, 1: none missing, 2: bitfield, 3: encoded list.
    pub format: u8,
    pub block_number: u16,
    pub chunk_size: u16,
    pub missing_chunks: Vec<u8>,
}
impl BlobBlockStatus {
    pub fn unpack_from(parameters: &[u8]) -> Result<Self, MessagePackError> {
        let mut r = Reader::new(parameters);
        let b = r.u8()?;
        Ok(BlobBlockStatus {
            status: b >> 4,
            format: b & 0x03,
            block_number: r.u16()?,
            chunk_size: r.u16()?,
            missing_chunks: r.rest().to_vec(),
        })
    }
    /// Missing chunk numbers when `format` is the bitfield form.
    #[must_use]
    pub fn missing_from_bitfield(&self) -> Vec<u16> {
        if self.format != 2 {
            return Vec::new();
        }
        self.missing_chunks
            .iter()
            .enumerate()
            .flat_map(|(i, byte)| {
                (0..8_u16)
                    .filter(move |bit| byte & (1_u8 << *bit) != 0)
                    .map(move |bit| i as u16 * 8 + bit)
            })
            .collect()
    }
}
