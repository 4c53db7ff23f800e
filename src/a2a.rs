//! The all-to-all driver: per-peer WQE posting and send/remote completion
//! polling.
//!
//! Grounded in `ldo_dev_alltoall` / `ldo_dev_poll_until_a2a_comp` in
//! `original_source/src/dpa/ldo_state_trigger.c`, with per-peer WQE
//! formatting from `ldo_dev_format_a2a_wqes` in
//! `original_source/src/dpa/ldo_a2a_wqes.c`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cq::{zero_cqe_sentinel_word, CqEngine, Cqe64};
use crate::device::Device;
use crate::quota::PollQuota;
use crate::wqe::{format_rdma_atomic_comp, format_rdma_write_no_comp, SwqeBb};

/// One remote peer's network QP and the completion target our Fetch-and-Add
/// lands in on that peer.
pub struct NetPeer {
    /// This peer's rank in the collective.
    pub rank: u32,
    /// Destination QP number, or `None` if this slot is our own rank (the
    /// all-to-all driver skips self).
    pub qpn: Option<u32>,
    /// This peer's dedicated send-queue ring.
    pub sq_ring: Vec<SwqeBb>,
    /// `sq_ring.len() - 1`; `sq_ring.len()` must be a power of two.
    pub sq_mask: u32,
    /// Remote key of the peer's `remote_cmp_flag` region.
    pub remote_cmp_mkey: u32,
    /// Base remote address of the peer's `remote_cmp_flag` region (indexed
    /// by collective slot).
    pub remote_cmp_raddr: u64,
}

/// Per-worker network state: one ring per peer, plus the shared completion
/// queue all peer QPs report into.
pub struct NetWorkerDb {
    /// One entry per rank in the collective, including self.
    pub peers: Vec<NetPeer>,
    /// Shared completion queue for every peer QP.
    pub cq_ring: Vec<Cqe64>,
    /// `cq_ring.len() - 1`.
    pub cq_mask: u32,
}

/// Format and post the write + Fetch-and-Add pair for one peer, at producer
/// index `sq_pi` (write) and `sq_pi + 1` (atomic). Mirrors
/// `ldo_dev_format_a2a_wqes`.
#[allow(clippy::too_many_arguments)]
fn format_a2a_wqes_for_peer(
    peer: &mut NetPeer,
    myrank: u32,
    op_index: u32,
    sq_pi: u32,
    recvbuf_rkey: u32,
    recvbuf: u64,
    sendbuf_lkey: u32,
    sendbuf: u64,
    msg_size: u32,
    dump_fill_mkey: u32,
) {
    let qpn = peer.qpn.expect("format_a2a_wqes_for_peer called on self");

    // write to remote rank at myrank's slot of its recvbuf
    let data_raddr = recvbuf + (myrank as u64) * (msg_size as u64);
    // send using remote rank's slot of our own sendbuf
    let data_laddr = sendbuf + (peer.rank as u64) * (msg_size as u64);

    let bb = crate::wqe::ring_slot(&mut peer.sq_ring, sq_pi, peer.sq_mask);
    format_rdma_write_no_comp(bb, sq_pi, qpn, recvbuf_rkey, data_raddr, sendbuf_lkey, data_laddr, msg_size);

    let atomic_raddr = peer.remote_cmp_raddr + (op_index as u64) * 8;
    let bb = crate::wqe::ring_slot(&mut peer.sq_ring, sq_pi + 1, peer.sq_mask);
    format_rdma_atomic_comp(bb, sq_pi + 1, qpn, peer.remote_cmp_mkey, atomic_raddr, dump_fill_mkey);
}

/// Post one write + Fetch-and-Add pair to every peer but self, zero the
/// sentinel word of the CQE we expect to land last, and ring every
/// contacted peer's doorbell. Returns the number of peers contacted.
///
/// `g_op_sq_pi` is the collective-epoch producer index, shared across every
/// peer's SQ and advanced by exactly 2 per collective (not per peer).
#[allow(clippy::too_many_arguments)]
pub fn alltoall<D: Device>(
    device: &mut D,
    net: &mut NetWorkerDb,
    net_cq_idx: u32,
    g_op_sq_pi: &mut u32,
    myrank: u32,
    recvbuf_rkey: u32,
    recvbuf: u64,
    sendbuf_lkey: u32,
    sendbuf: u64,
    msg_size: u32,
    op_index: u32,
    dump_fill_mkey: u32,
) -> u32 {
    let sq_pi = *g_op_sq_pi;
    let mut contacted = 0u32;

    for peer in net.peers.iter_mut() {
        if peer.qpn.is_none() {
            continue;
        }
        format_a2a_wqes_for_peer(
            peer,
            myrank,
            op_index,
            sq_pi,
            recvbuf_rkey,
            recvbuf,
            sendbuf_lkey,
            sendbuf,
            msg_size,
            dump_fill_mkey,
        );
        contacted += 1;
    }

    *g_op_sq_pi = sq_pi.wrapping_add(2);

    let last_idx = (net_cq_idx.wrapping_add(contacted).wrapping_sub(1)) & net.cq_mask;
    zero_cqe_sentinel_word(&mut net.cq_ring[last_idx as usize]);

    device.memory_writeback();

    for peer in net.peers.iter() {
        if let Some(qpn) = peer.qpn {
            device.ring_sq_db(qpn, *g_op_sq_pi);
        }
    }

    contacted
}

/// Busy-poll until every contacted peer's send WQE has completed locally
/// and the remote completion flag for this collective slot has reached its
/// expected value, or the poll quota is exhausted.
///
/// Returns `true` if the collective is locally complete; `false` means the
/// caller must hang up (re-arm and yield).
pub fn poll_until_a2a_comp(
    cq: &mut CqEngine,
    cq_ring: &[Cqe64],
    remote_cmp_flag: &AtomicU64,
    expected_remote_atomic_count: u64,
    remote_ranks: u32,
    quota: &PollQuota,
) -> bool {
    let mut total_found = 0u32;

    while quota.has_time_remaining() {
        if cq.advance(cq_ring, None, false).is_some() {
            total_found += 1;
        }

        let remote_done = remote_cmp_flag.load(Ordering::SeqCst) == expected_remote_atomic_count;

        if total_found == remote_ranks && remote_done {
            return true;
        }
    }

    false
}
