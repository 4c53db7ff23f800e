//! `WAIT_TRIGGER` state hooks.
//!
//! Grounded in `original_source/src/dpa/ldo_state_trigger.c`.

use crate::a2a::{alltoall, poll_until_a2a_comp};
use crate::device::Device;
use crate::quota::PollQuota;
use crate::window::MemoryWindow;
use crate::wqe::{ce, format_wod, WodOp, WodSeg};

use super::context::WorkerCtx;

/// Post the all-to-all WQEs, then poll until local sends and the remote
/// completion flag both land. Mirrors `ldo_dev_process_trigger`.
pub fn process_trigger<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    quota: &PollQuota,
    hangup: &mut bool,
) {
    let (op_index, op_wraps) = ctx.op_index_and_wraps();

    ctx.net_round_start_cq_idx = ctx.net_cq.idx();

    alltoall(
        &mut ctx.device,
        &mut ctx.net,
        ctx.net_cq.idx(),
        &mut ctx.g_op_sq_pi,
        ctx.cmd.my_rank,
        ctx.cmd.recvbuf_rkey,
        ctx.cmd.recvbuf,
        ctx.cmd.sendbuf_lkey,
        ctx.cmd.sendbuf,
        ctx.cmd.msg_size,
        op_index,
        ctx.dump_fill_mkey,
    );

    let expected_remote_atomic_count = ((op_wraps + 1) as u64) * ((ctx.cmd.nranks - 1) as u64);
    let flag = &ctx.remote_cmp_flags[op_index as usize];

    let done = poll_until_a2a_comp(
        &mut ctx.net_cq,
        &ctx.net.cq_ring,
        flag,
        expected_remote_atomic_count,
        ctx.remote_ranks,
        quota,
    );

    if !done {
        *hangup = true;
    }
}

/// Re-arm the trigger-threshold watcher (inverted "bigger" compare: wake
/// once the host counter is no longer smaller than the threshold). Mirrors
/// `ldo_dev_hangup_trigger`.
pub fn hangup_trigger<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    format_wod(
        &mut ctx.trig.sq_ring,
        &mut ctx.trig_sq_pi,
        ctx.trig.sq_mask,
        ctx.trig.qpn,
        WodSeg {
            op: WodOp::Bigger,
            inv: true,
            mkey: ctx.cmd.trigger_lkey,
            va: ctx.cmd.trigger_loc,
            data: ctx.cmd.trigger_threshold.swap_bytes(),
            dmask: u64::MAX,
        },
        ce::CQE_ALWAYS,
    );

    ctx.device.memory_writeback();
    ctx.device.ring_sq_db(ctx.trig.qpn, ctx.trig_sq_pi);
    ctx.device.arm_cq(ctx.trig_cq.idx(), ctx.trig.cqn);
}

/// Reap the trigger CQ (armed by the previous state's hangup). Mirrors
/// `ldo_dev_activation_trigger`.
pub fn activation_trigger<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    super::advance_trig_cq(ctx);
}
