//! CRC-framed append-only log.
//!
//! Every entry is written as one self-delimiting frame:
//!
//! ```text
//! | frame_len (4) | flags (1) | key (16) | body (N) | crc32 (4) |
//! ```
//!
//! `frame_len` counts the whole frame including itself and the CRC. The CRC
//! covers every byte before it. Both the record store and the manual review
//! ledger keep their state in a log of this shape.

use crate::error::{CoreError, CoreResult};
use fieldsync_storage::StorageBackend;

/// Frame type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Upsert of the keyed entry.
    Put,
    /// Removal of the keyed entry.
    Tombstone,
}

impl FrameKind {
    const fn as_byte(self) -> u8 {
        match self {
            FrameKind::Put => 0x00,
            FrameKind::Tombstone => 0x01,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(FrameKind::Put),
            0x01 => Some(FrameKind::Tombstone),
            _ => None,
        }
    }
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Put or tombstone.
    pub kind: FrameKind,
    /// Entry key (a record id).
    pub key: [u8; 16],
    /// Entry body; empty for tombstones.
    pub body: Vec<u8>,
}

impl Frame {
    /// len (4) + flags (1) + key (16)
    const HEADER_SIZE: usize = 21;
    const CRC_SIZE: usize = 4;
    /// Smallest valid frame.
    pub const MIN_SIZE: usize = Self::HEADER_SIZE + Self::CRC_SIZE;

    /// Creates a put frame.
    #[must_use]
    pub fn put(key: [u8; 16], body: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Put,
            key,
            body,
        }
    }

    /// Creates a tombstone frame.
    #[must_use]
    pub fn tombstone(key: [u8; 16]) -> Self {
        Self {
            kind: FrameKind::Tombstone,
            key,
            body: Vec::new(),
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        Self::MIN_SIZE + self.body.len()
    }

    /// Encodes the frame.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let frame_len = u32::try_from(self.encoded_len())
            .map_err(|_| CoreError::invalid_record("frame body too large"))?;
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&frame_len.to_le_bytes());
        buf.push(self.kind.as_byte());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.body);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes a complete frame. `offset` is only used for error reporting.
    pub fn decode(bytes: &[u8], offset: u64) -> CoreResult<Self> {
        if bytes.len() < Self::MIN_SIZE {
            return Err(CoreError::log_corruption(offset, "frame too short"));
        }

        let crc_at = bytes.len() - Self::CRC_SIZE;
        let stored = read_u32(&bytes[crc_at..]);
        let computed = compute_crc32(&bytes[..crc_at]);
        if stored != computed {
            return Err(CoreError::FrameChecksum {
                offset,
                stored,
                computed,
            });
        }

        let declared = read_u32(bytes) as usize;
        if declared != bytes.len() {
            return Err(CoreError::log_corruption(
                offset,
                format!("frame length {declared} does not match {}", bytes.len()),
            ));
        }

        let kind = FrameKind::from_byte(bytes[4]).ok_or_else(|| {
            CoreError::log_corruption(offset, format!("unknown frame flags {:#04x}", bytes[4]))
        })?;
        let mut key = [0u8; 16];
        key.copy_from_slice(&bytes[5..Self::HEADER_SIZE]);

        Ok(Self {
            kind,
            key,
            body: bytes[Self::HEADER_SIZE..crc_at].to_vec(),
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

/// CRC-32 (IEEE polynomial) over `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 == 0 {
                    crc >> 1
                } else {
                    (crc >> 1) ^ 0xEDB8_8320
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

/// Dead bytes a log carries before a write rewrites it on its own.
pub const COMPACT_MIN_DEAD_BYTES: u64 = 64 * 1024;

/// Whether a log of `total` bytes, `live` of them still reachable, should
/// be compacted after a write.
///
/// Dead bytes have to pass [`COMPACT_MIN_DEAD_BYTES`] and outweigh the live
/// ones, so each rewrite at least halves the log.
#[must_use]
pub fn needs_compaction(total: u64, live: u64) -> bool {
    let dead = total.saturating_sub(live);
    dead >= COMPACT_MIN_DEAD_BYTES && dead > live
}

/// A frame read during replay, with where it lives.
#[derive(Debug, Clone)]
pub struct LocatedFrame {
    /// Byte offset of the frame.
    pub offset: u64,
    /// The decoded frame.
    pub frame: Frame,
}

/// An append-only log of frames over a storage backend.
pub struct FrameLog {
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
}

impl FrameLog {
    /// Opens the log and replays every intact frame.
    ///
    /// An incomplete or CRC-damaged frame at the very end of the log is a
    /// write interrupted by a crash; it is truncated away. Damage anywhere
    /// else is reported as an error.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        sync_on_write: bool,
    ) -> CoreResult<(Self, Vec<LocatedFrame>)> {
        let size = backend.size()?;
        let mut frames = Vec::new();
        let mut offset = 0u64;

        while offset < size {
            let remaining = size - offset;
            if remaining < 4 {
                break;
            }
            let frame_len = u64::from(read_u32(&backend.read_at(offset, 4)?));
            if frame_len < Frame::MIN_SIZE as u64 {
                return Err(CoreError::log_corruption(
                    offset,
                    format!("frame length {frame_len} below minimum"),
                ));
            }
            if frame_len > remaining {
                break;
            }

            let len = usize::try_from(frame_len)
                .map_err(|_| CoreError::log_corruption(offset, "frame length overflow"))?;
            let bytes = backend.read_at(offset, len)?;
            match Frame::decode(&bytes, offset) {
                Ok(frame) => frames.push(LocatedFrame { offset, frame }),
                Err(CoreError::FrameChecksum { .. }) if offset + frame_len == size => break,
                Err(e) => return Err(e),
            }
            offset += frame_len;
        }

        if offset < size {
            tracing::warn!(
                offset,
                dropped = size - offset,
                "truncating torn frame at log tail"
            );
            backend.truncate(offset)?;
            backend.sync()?;
        }

        Ok((
            Self {
                backend,
                sync_on_write,
            },
            frames,
        ))
    }

    /// Appends a frame, returning its offset.
    pub fn append(&mut self, frame: &Frame) -> CoreResult<u64> {
        let bytes = frame.encode()?;
        let offset = self.backend.append(&bytes)?;
        self.backend.flush()?;
        if self.sync_on_write {
            self.backend.sync()?;
        }
        Ok(offset)
    }

    /// Reads back the frame at `offset`.
    pub fn read(&self, offset: u64) -> CoreResult<Frame> {
        let header = self.backend.read_at(offset, 4)?;
        let len = read_u32(&header) as usize;
        if len < Frame::MIN_SIZE {
            return Err(CoreError::log_corruption(offset, "frame too short"));
        }
        let bytes = self.backend.read_at(offset, len)?;
        Frame::decode(&bytes, offset)
    }

    /// Current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Replaces the log with `frames`, returning each frame's new offset.
    ///
    /// Callers pass the live frames in replay order; superseded puts and
    /// tombstones are simply left out.
    pub fn rewrite(&mut self, frames: &[Frame]) -> CoreResult<Vec<u64>> {
        let mut buf = Vec::with_capacity(frames.iter().map(Frame::encoded_len).sum());
        let mut offsets = Vec::with_capacity(frames.len());
        for frame in frames {
            offsets.push(buf.len() as u64);
            buf.extend_from_slice(&frame.encode()?);
        }
        self.backend.replace(&buf)?;
        Ok(offsets)
    }
}

impl std::fmt::Debug for FrameLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLog")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_storage::InMemoryBackend;

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn frame_encode_decode() {
        let frame = Frame::put([7; 16], b"body".to_vec());
        let bytes = frame.encode().unwrap();
        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(Frame::decode(&bytes, 0).unwrap(), frame);
    }

    #[test]
    fn flipped_bit_fails_crc() {
        let mut bytes = Frame::tombstone([1; 16]).encode().unwrap();
        bytes[6] ^= 0x40;
        assert!(matches!(
            Frame::decode(&bytes, 0),
            Err(CoreError::FrameChecksum { .. })
        ));
    }

    #[test]
    fn replay_returns_frames_in_order() {
        let backend = InMemoryBackend::new();
        let (mut log, frames) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        assert!(frames.is_empty());
        let a = log.append(&Frame::put([1; 16], vec![1])).unwrap();
        let b = log.append(&Frame::tombstone([1; 16])).unwrap();
        assert!(b > a);
        assert_eq!(log.read(a).unwrap().body, vec![1]);

        let (_, frames) = FrameLog::open(Box::new(backend), false).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].frame.kind, FrameKind::Tombstone);
        assert_eq!(frames[1].offset, b);
    }

    #[test]
    fn partial_tail_is_truncated() {
        let backend = InMemoryBackend::new();
        let (mut log, _) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        log.append(&Frame::put([1; 16], vec![1, 2, 3])).unwrap();
        let intact = backend.data().len();

        let torn = Frame::put([2; 16], vec![9; 32]).encode().unwrap();
        let mut writer = backend.clone();
        writer.append(&torn[..torn.len() / 2]).unwrap();

        let (_, frames) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(backend.data().len(), intact);
    }

    #[test]
    fn damaged_last_frame_is_truncated() {
        let backend = InMemoryBackend::new();
        let (mut log, _) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        log.append(&Frame::put([1; 16], vec![1])).unwrap();
        let second = log.append(&Frame::put([2; 16], vec![2])).unwrap();
        backend.poke(second as usize + 21, 0xFF);

        let (_, frames) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(backend.data().len() as u64, second);
    }

    #[test]
    fn rewrite_keeps_only_given_frames() {
        let backend = InMemoryBackend::new();
        let (mut log, _) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        for i in 0..10u8 {
            log.append(&Frame::put([1; 16], vec![i; 64])).unwrap();
        }
        log.append(&Frame::tombstone([2; 16])).unwrap();

        let live = [Frame::put([1; 16], vec![9; 64]), Frame::put([3; 16], vec![3])];
        let offsets = log.rewrite(&live).unwrap();
        assert_eq!(offsets, vec![0, live[0].encoded_len() as u64]);
        assert_eq!(log.read(offsets[1]).unwrap(), live[1]);
        assert_eq!(
            log.size().unwrap(),
            (live[0].encoded_len() + live[1].encoded_len()) as u64
        );

        let (_, frames) = FrameLog::open(Box::new(backend), false).unwrap();
        let replayed: Vec<_> = frames.into_iter().map(|f| f.frame).collect();
        assert_eq!(replayed, live.to_vec());
    }

    #[test]
    fn compaction_threshold() {
        assert!(!needs_compaction(0, 0));
        assert!(!needs_compaction(COMPACT_MIN_DEAD_BYTES - 1, 0));
        assert!(needs_compaction(COMPACT_MIN_DEAD_BYTES, 0));
        // dead bytes must also outweigh live ones
        let live = 2 * COMPACT_MIN_DEAD_BYTES;
        assert!(!needs_compaction(live + COMPACT_MIN_DEAD_BYTES, live));
        assert!(needs_compaction(live + live + 1, live));
    }

    #[test]
    fn damaged_middle_frame_is_an_error() {
        let backend = InMemoryBackend::new();
        let (mut log, _) = FrameLog::open(Box::new(backend.clone()), false).unwrap();
        let first = log.append(&Frame::put([1; 16], vec![1])).unwrap();
        log.append(&Frame::put([2; 16], vec![2])).unwrap();
        backend.poke(first as usize + 21, 0xFF);

        let err = FrameLog::open(Box::new(backend), false).unwrap_err();
        assert!(matches!(err, CoreError::FrameChecksum { offset: 0, .. }));
    }
}
