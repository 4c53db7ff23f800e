//! Per-worker state: everything a single worker thread carries across
//! activation → progress loop → hangup, plus its handles onto the device
//! and its memory window.
//!
//! Grounded in `struct ldo_dev_worker` / `struct ldo_dev_net_worker_db` /
//! `struct ldo_dev_trig_worker_db`, referenced throughout
//! `original_source/src/dpa/ldo_worker.c` and `ldo_state_*.c`.

use std::sync::atomic::AtomicU64;

use crate::a2a::NetWorkerDb;
use crate::cmd::Command;
use crate::cq::{CqEngine, Cqe64};
use crate::device::Device;
use crate::wqe::SwqeBb;
use crate::window::MemoryWindow;

use super::WorkerState;

/// The dedicated "trigger" QP and CQ a worker uses for every Wait-on-Data
/// WQE: the host-command watcher, the trigger-threshold watcher, and the
/// two-chained a2a-completion watcher all post here.
pub struct TrigWorkerDb {
    /// QP number of the trigger QP.
    pub qpn: u32,
    /// CQ number of the trigger CQ (for arming).
    pub cqn: u32,
    /// Send-queue ring.
    pub sq_ring: Vec<SwqeBb>,
    /// `sq_ring.len() - 1`.
    pub sq_mask: u32,
    /// Completion-queue ring.
    pub cq_ring: Vec<Cqe64>,
    /// `cq_ring.len() - 1`.
    pub cq_mask: u32,
    /// Doorbell-record mirror of the CQ consumer index.
    pub cq_dbr: u32,
}

impl TrigWorkerDb {
    /// Create an empty trigger QP/CQ pair with the given ring depths
    /// (must be powers of two).
    pub fn new(qpn: u32, cqn: u32, sq_depth: usize, cq_depth: usize) -> Self {
        Self {
            qpn,
            cqn,
            sq_ring: vec![[0u8; 64]; sq_depth],
            sq_mask: sq_depth as u32 - 1,
            cq_ring: vec![[0u8; 64]; cq_depth],
            cq_mask: cq_depth as u32 - 1,
            cq_dbr: 0,
        }
    }
}

/// Everything one worker thread owns between invocations.
pub struct WorkerCtx<W: MemoryWindow, D: Device> {
    /// Most recently read host command.
    pub cmd: Command,
    /// Total collectives completed by this worker so far.
    pub cmp_count: u64,
    /// Next CMDQ slot this worker will service.
    pub cmd_index: u32,
    /// Current state-machine state.
    pub state: WorkerState,
    /// Collective-epoch send producer index, shared across every peer QP.
    pub g_op_sq_pi: u32,
    /// Trigger QP/CQ state.
    pub trig: TrigWorkerDb,
    /// This worker's trigger-QP send producer index.
    pub trig_sq_pi: u32,
    /// This worker's trigger-CQ consumer, owning `(idx, hw_owner_bit)`
    /// together.
    pub trig_cq: CqEngine,
    /// Network QP/CQ state (one ring per peer).
    pub net: NetWorkerDb,
    /// This worker's network-CQ consumer, owning `(idx, hw_owner_bit)`
    /// together.
    pub net_cq: CqEngine,
    /// `net_cq.idx()` as it stood right before this round's all-to-all was
    /// posted, i.e. the slot of the first CQE this round expects. Needed by
    /// the a2a-completion hangup hook to recompute which CQE is expected to
    /// land last, the same way `alltoall` did when it zeroed that CQE's
    /// sentinel word.
    pub net_round_start_cq_idx: u32,
    /// Per-concurrent-collective-slot completion counters that remote peers'
    /// Fetch-and-Adds land in. Indexed by `cmp_count & L2M(LOG_CONCURRENT_COLLS)`.
    pub remote_cmp_flags: Vec<AtomicU64>,
    /// Total number of workers sharing this worker's CMDQ.
    pub num_workers: u8,
    /// Number of distinct peers (excluding self) this worker exchanges data
    /// with.
    pub remote_ranks: u32,
    /// Mkey covering this worker's own `remote_cmp_flags` region, as seen by
    /// the device issuing Wait-on-Data WQEs against it.
    pub worker_mkey: u32,
    /// Mkey of the dump-fill region Fetch-and-Add results are discarded
    /// into.
    pub dump_fill_mkey: u32,
    /// Mkey of the host's circular command buffer.
    pub host_cmd_buf_mkey: u32,
    /// Mkey of the host's command-info region.
    pub host_cmd_info_mkey: u32,
    /// Base host address of the command-info region.
    pub host_cmd_info_addr: u64,
    /// Mkey of the host's completion region.
    pub host_cmp_mkey: u32,
    /// Host address of the completion region.
    pub host_cmp_addr: u64,
    /// This worker's memory-window handle.
    pub window: W,
    /// This worker's device (doorbell/arm/fence) handle.
    pub device: D,
}

impl<W: MemoryWindow, D: Device> WorkerCtx<W, D> {
    /// Host byte offset of this worker's next command in the circular
    /// command buffer.
    pub fn cmd_offset(&self) -> u64 {
        (self.cmd_index as u64) * (crate::cmd::COMMAND_SIZE as u64)
    }

    /// The collective slot (`op_index`) and how many times the concurrent
    /// slot space has wrapped, derived from `cmp_count`.
    pub fn op_index_and_wraps(&self) -> (u32, u32) {
        let mask = crate::sizes::l2m(crate::sizes::LOG_CONCURRENT_COLLS);
        (
            (self.cmp_count as u32) & mask,
            (self.cmp_count >> crate::sizes::LOG_CONCURRENT_COLLS) as u32,
        )
    }

    /// The `valid_count` this worker expects the *next* host command to
    /// carry, derived from how many commands it has already consumed.
    pub fn expected_valid_count(&self) -> u64 {
        (self.cmp_count >> crate::sizes::LOG_CMDQ_DEPTH) + 1
    }
}
