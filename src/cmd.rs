//! The 64-byte host `Command` message and the per-slot command-info sentinel.
//!
//! Field layout mirrors the byte-offset derivation in
//! `original_source/src/dpa/ldo_state_host_cmd.c` (`offsetof(struct ldo_cmd,
//! valid_count)`) and the struct size assertion in
//! `original_source/src/dpa/ldo_context.c`.

use crate::sizes::LOG_CMD_SIZE;

/// Size in bytes of a [`Command`] on the wire. Must equal `L2V(LOG_CMD_SIZE)`.
pub const COMMAND_SIZE: usize = 1 << LOG_CMD_SIZE;

const _: () = assert!(COMMAND_SIZE == 64, "Command must stay a 64-byte record");

/// Sentinel value the worker writes into a command-info slot once a
/// collective has fully completed. Distinct from any valid `valid_count` or
/// `cmp_count` value the host could observe, so polling code can
/// distinguish "not yet done" from "done".
pub const CMD_COMPLETED: u64 = u64::MAX;

/// One 64-byte host-filled command. All fields are in host (here, fixed
/// little-endian) byte order except `valid_count` and `trigger_threshold`,
/// which are big-endian — those two are the fields a Wait-on-Data WQE
/// compares directly against on the wire, so their endianness is pinned to
/// match [`crate::wqe::wod`]'s comparison values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    /// Monotone generation counter; big-endian on the wire.
    pub valid_count: u64,
    /// This worker's rank within the collective.
    pub my_rank: u32,
    /// Total number of ranks participating.
    pub nranks: u32,
    /// Message size in bytes exchanged per peer.
    pub msg_size: u32,
    /// Local virtual address of the send buffer.
    pub sendbuf: u64,
    /// Local key of the send buffer's memory region.
    pub sendbuf_lkey: u32,
    /// Remote virtual address of the receive buffer (same on every rank).
    pub recvbuf: u64,
    /// Remote key of the receive buffer's memory region.
    pub recvbuf_rkey: u32,
    /// Address of the host-side trigger counter this worker watches.
    pub trigger_loc: u64,
    /// Local key for `trigger_loc`.
    pub trigger_lkey: u32,
    /// Threshold the trigger counter must reach before launch; big-endian
    /// on the wire, matching the Wait-on-Data comparison value.
    pub trigger_threshold: u64,
}

impl Command {
    /// Pack into the 64-byte wire representation.
    pub fn pack(&self) -> [u8; COMMAND_SIZE] {
        let mut out = [0u8; COMMAND_SIZE];
        out[0..8].copy_from_slice(&self.valid_count.to_be_bytes());
        out[8..12].copy_from_slice(&self.my_rank.to_le_bytes());
        out[12..16].copy_from_slice(&self.nranks.to_le_bytes());
        out[16..20].copy_from_slice(&self.msg_size.to_le_bytes());
        out[20..28].copy_from_slice(&self.sendbuf.to_le_bytes());
        out[28..32].copy_from_slice(&self.sendbuf_lkey.to_le_bytes());
        out[32..40].copy_from_slice(&self.recvbuf.to_le_bytes());
        out[40..44].copy_from_slice(&self.recvbuf_rkey.to_le_bytes());
        out[44..52].copy_from_slice(&self.trigger_loc.to_le_bytes());
        out[52..56].copy_from_slice(&self.trigger_lkey.to_le_bytes());
        out[56..64].copy_from_slice(&self.trigger_threshold.to_be_bytes());
        out
    }

    /// Unpack from the 64-byte wire representation.
    pub fn unpack(bytes: &[u8; COMMAND_SIZE]) -> Self {
        Self {
            valid_count: u64::from_be_bytes(bytes[0..8].try_into().unwrap()),
            my_rank: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            nranks: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            msg_size: u32::from_le_bytes(bytes[16..20].try_into().unwrap()),
            sendbuf: u64::from_le_bytes(bytes[20..28].try_into().unwrap()),
            sendbuf_lkey: u32::from_le_bytes(bytes[28..32].try_into().unwrap()),
            recvbuf: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            recvbuf_rkey: u32::from_le_bytes(bytes[40..44].try_into().unwrap()),
            trigger_loc: u64::from_le_bytes(bytes[44..52].try_into().unwrap()),
            trigger_lkey: u32::from_le_bytes(bytes[52..56].try_into().unwrap()),
            trigger_threshold: u64::from_be_bytes(bytes[56..64].try_into().unwrap()),
        }
    }

    /// Byte offset of the `valid_count` field within a [`Command`] record,
    /// used by the host-command watcher to arm a Wait-on-Data WQE directly
    /// against this field instead of the whole record.
    pub const VALID_COUNT_OFFSET: usize = 0;

    /// Byte offset of the `trigger_threshold` field, used by the trigger
    /// watcher's Wait-on-Data WQE.
    pub const TRIGGER_THRESHOLD_OFFSET: usize = 56;
}
