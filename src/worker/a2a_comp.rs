//! `WAIT_A2A_COMP` state hooks.
//!
//! Grounded in `original_source/src/dpa/ldo_state_a2a_comp.c`.

use crate::cmd::Command;
use crate::coordinator::{complete_coll, Coordinator};
use crate::device::Device;
use crate::quota::PollQuota;
use crate::window::MemoryWindow;
use crate::wqe::{ce, format_wod, WodOp, WodSeg};

use super::context::WorkerCtx;

/// Busy-poll the host command buffer until `valid_count` reaches the next
/// expected generation. Mirrors `ldo_dev_poll_until_host_cmd`.
fn poll_until_host_cmd<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    quota: &PollQuota,
    hangup: &mut bool,
) -> Result<(), W::Error> {
    let offset = ctx.cmd_offset();
    let expected_valid_count = ctx.expected_valid_count();

    ctx.window.configure(ctx.host_cmd_buf_mkey)?;

    let mut found = false;
    while quota.has_time_remaining() {
        let bytes = ctx.window.raw_read_inv(offset, crate::cmd::COMMAND_SIZE)?;
        let array: [u8; crate::cmd::COMMAND_SIZE] = bytes.try_into().unwrap();
        ctx.cmd = Command::unpack(&array);
        if ctx.cmd.valid_count == expected_valid_count {
            found = true;
            break;
        }
    }

    if !found {
        *hangup = true;
    }
    Ok(())
}

/// Account for this collective's completion, publish the host sentinel if
/// this worker is the last finisher for its CMDQ slot, advance to the next
/// slot, then poll for the next host command. Mirrors
/// `ldo_dev_process_a2a_comp`.
pub fn process_a2a_comp<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    coordinator: &Coordinator,
    quota: &PollQuota,
    hangup: &mut bool,
) -> Result<(), W::Error> {
    let cmd_index = ctx.cmd_index;
    ctx.cmp_count += 1;
    let cmp_count = ctx.cmp_count;

    if coordinator.mark_finished(cmd_index as usize, ctx.num_workers) {
        complete_coll(
            &mut ctx.window,
            ctx.host_cmd_info_mkey,
            ctx.host_cmd_info_addr,
            cmd_index as u64,
            ctx.host_cmp_mkey,
            ctx.host_cmp_addr,
            cmp_count,
        )?;
    }

    let cmdq_mask = crate::sizes::l2m(crate::sizes::LOG_CMDQ_DEPTH);
    ctx.cmd_index = (cmd_index + 1) & cmdq_mask;

    poll_until_host_cmd(ctx, quota, hangup)
}

/// Re-arm the watcher(s) that will wake this worker once the remote side of
/// this collective has landed: a chained pair when this worker has peers (a
/// non-inverted equal on the remote completion-flag cell, followed by an
/// inverted equal on the high 32 bits of the last expected CQE's
/// opcode/qpn word, so either the flag or a fresh CQE wakes the thread), or
/// a single non-inverted watcher on the flag cell when this worker has no
/// peers. Mirrors `ldo_dev_hangup_a2a_comp`.
pub fn hangup_a2a_comp<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    let (coll_index, coll_wraps) = ctx.op_index_and_wraps();
    let remote_cmp_flag_addr = (coll_index as u64) * 8;
    let expected_remote_atomic_count = ((coll_wraps + 1) as u64) * ((ctx.cmd.nranks - 1) as u64);

    format_wod(
        &mut ctx.trig.sq_ring,
        &mut ctx.trig_sq_pi,
        ctx.trig.sq_mask,
        ctx.trig.qpn,
        WodSeg {
            op: WodOp::Equal,
            inv: false,
            mkey: ctx.worker_mkey,
            va: remote_cmp_flag_addr,
            data: expected_remote_atomic_count,
            dmask: u64::MAX,
        },
        if ctx.remote_ranks > 0 {
            ce::CQE_ON_FIRST_ERROR
        } else {
            ce::CQE_ALWAYS
        },
    );

    if ctx.remote_ranks > 0 {
        // Same slot `alltoall` zeroed before ringing doorbells this round:
        // the CQE expected to land last for this collective.
        let last_cqe_idx = (ctx
            .net_round_start_cq_idx
            .wrapping_add(ctx.remote_ranks)
            .wrapping_sub(1))
            & ctx.net.cq_mask;
        let cqe_word_addr = {
            let base = ctx.net.cq_ring.as_ptr() as u64;
            base + (last_cqe_idx as u64) * 64 + 56
        };

        format_wod(
            &mut ctx.trig.sq_ring,
            &mut ctx.trig_sq_pi,
            ctx.trig.sq_mask,
            ctx.trig.qpn,
            WodSeg {
                op: WodOp::Equal,
                inv: true,
                mkey: ctx.worker_mkey,
                va: cqe_word_addr,
                data: 0,
                dmask: 0xffff_ffff_0000_0000,
            },
            ce::CQE_ALWAYS,
        );
    }

    ctx.device.memory_writeback();
    ctx.device.ring_sq_db(ctx.trig.qpn, ctx.trig_sq_pi);
    ctx.device.arm_cq(ctx.trig_cq.idx(), ctx.trig.cqn);
}

/// Reap the trigger CQ (armed by the previous state's hangup). Mirrors
/// `ldo_dev_activation_a2a_comp`.
pub fn activation_a2a_comp<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    super::advance_trig_cq(ctx);
}
