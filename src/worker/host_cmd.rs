//! `WAIT_HOST_CMD` state hooks.
//!
//! Grounded in `original_source/src/dpa/ldo_state_host_cmd.c`.

use crate::cmd::Command;
use crate::device::Device;
use crate::quota::PollQuota;
use crate::window::MemoryWindow;
use crate::wqe::{ce, format_wod, WodOp, WodSeg};

use super::context::WorkerCtx;

/// Read this worker's next host command out of the circular command
/// buffer, with invalidate (the buffer wraps, so a stale cache line from a
/// prior read-through must not be reused). Mirrors
/// `ldo_dev_get_cmd_ptr` + `ldo_dev_read_host_cmd`.
pub fn read_host_cmd<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
) -> Result<(), W::Error> {
    let offset = ctx.cmd_offset();
    ctx.window.configure(ctx.host_cmd_buf_mkey)?;
    let bytes = ctx.window.raw_read_inv(offset, crate::cmd::COMMAND_SIZE)?;
    let array: [u8; crate::cmd::COMMAND_SIZE] = bytes.try_into().unwrap();
    ctx.cmd = Command::unpack(&array);
    Ok(())
}

/// Busy-poll the host-side trigger counter until it reaches this command's
/// threshold. Mirrors `ldo_dev_poll_until_trigger` /
/// `ldo_dev_process_host_cmd`.
pub fn process_host_cmd<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
    quota: &PollQuota,
    hangup: &mut bool,
) -> Result<(), W::Error> {
    ctx.window.configure(ctx.cmd.trigger_lkey)?;

    let mut found = false;
    while quota.has_time_remaining() {
        let bytes = ctx.window.raw_read_inv(0, 8)?;
        let trig_val = u64::from_be_bytes(bytes.try_into().unwrap());
        if trig_val >= ctx.cmd.trigger_threshold {
            found = true;
            break;
        }
    }

    if !found {
        *hangup = true;
    }
    Ok(())
}

/// Arm the Wait-on-Data WQE that will wake this worker once the host posts
/// the next command with the expected `valid_count`. Shared between the
/// priming call at worker setup and the hangup path. Mirrors
/// `ldo_dev_wait_host_cmd`.
pub fn wait_host_cmd<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    let expected_valid_count = ctx.expected_valid_count();
    let offset = ctx.cmd_offset() + Command::VALID_COUNT_OFFSET as u64;

    format_wod(
        &mut ctx.trig.sq_ring,
        &mut ctx.trig_sq_pi,
        ctx.trig.sq_mask,
        ctx.trig.qpn,
        WodSeg {
            op: WodOp::Equal,
            inv: false,
            mkey: ctx.host_cmd_buf_mkey,
            va: offset,
            // The compared field is itself big-endian on the wire; since
            // `WodSeg::pack` writes `data` without a further byte swap, a
            // swapped value here produces the correct big-endian bytes
            // (see the doc comment on `crate::wqe::wod::WodSeg`).
            data: expected_valid_count.swap_bytes(),
            dmask: u64::MAX,
        },
        ce::CQE_ALWAYS,
    );
}

/// Re-arm the host-command watcher, fence, ring the trigger doorbell, and
/// arm the trigger CQ. Mirrors `ldo_dev_hangup_host_cmd`.
pub fn hangup_host_cmd<W: MemoryWindow, D: Device>(ctx: &mut WorkerCtx<W, D>) {
    wait_host_cmd(ctx);
    ctx.device.memory_writeback();
    ctx.device.ring_sq_db(ctx.trig.qpn, ctx.trig_sq_pi);
    ctx.device.arm_cq(ctx.trig_cq.idx(), ctx.trig.cqn);
}

/// Reap the trigger CQ (the Wait-on-Data WQE completing is what woke this
/// thread) then read the freshly posted command. Mirrors
/// `ldo_dev_activation_host_cmd`.
pub fn activation_host_cmd<W: MemoryWindow, D: Device>(
    ctx: &mut WorkerCtx<W, D>,
) -> Result<(), W::Error> {
    super::advance_trig_cq(ctx);
    read_host_cmd(ctx)
}
