use super::{opcode, ds, CtrlSeg, SwqeBb, WodOp, OPC_MOD_WAIT_ON_DATA};

/// The 32-byte Wait-on-Data segment (two octowords), matching
/// `struct dpa_wqe_prm_wod_seg` in `original_source/src/dpa/ldo_dev.h`.
///
/// `op_inv`, `mkey`, and `va` are stored big-endian, as they address and
/// describe the comparison itself. `data` and `dmask` are written verbatim
/// (no byte-swap) in the original — `format_wod_wqe` assigns them without a
/// `cpu_to_be64` wrapper, because the hardware compares them byte-for-byte
/// against a target that is itself in the device's native layout. We fix
/// that native layout to little-endian, the DPA's actual target, so the
/// comparison is reproducible independent of the host running this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WodSeg {
    /// Comparison operation.
    pub op: WodOp,
    /// Invert the comparison result.
    pub inv: bool,
    /// Mkey of the memory region holding the compared word.
    pub mkey: u32,
    /// Virtual address of the compared word. Low 3 bits are zeroed (the
    /// fail-action sub-field, fixed to "retry").
    pub va: u64,
    /// Value to compare against.
    pub data: u64,
    /// Mask applied to the compared word before comparison.
    pub dmask: u64,
}

impl WodSeg {
    /// Pack into the 32-byte wire representation.
    pub fn pack(&self) -> [u8; 32] {
        let op_inv = ((self.inv as u32) << 4) | (self.op as u32 & 0xf);
        let va = self.va & 0xffff_ffff_ffff_fff8;

        let mut out = [0u8; 32];
        out[0..4].copy_from_slice(&op_inv.to_be_bytes());
        out[4..8].copy_from_slice(&self.mkey.to_be_bytes());
        out[8..16].copy_from_slice(&va.to_be_bytes());
        out[16..24].copy_from_slice(&self.data.to_le_bytes());
        out[24..32].copy_from_slice(&self.dmask.to_le_bytes());
        out
    }
}

/// Format a Wait-on-Data WQE into `ring[*sq_pi & mask]` and advance `*sq_pi`
/// by one. Mirrors `format_wod_wqe` in `original_source/src/dpa/ldo_wod.c`.
#[allow(clippy::too_many_arguments)]
pub fn format_wod(
    ring: &mut [SwqeBb],
    sq_pi: &mut u32,
    mask: u32,
    qpn: u32,
    seg: WodSeg,
    ce_policy: u32,
) {
    let bb = super::ring_slot(ring, *sq_pi, mask);

    let ctrl = CtrlSeg {
        opcode_mod: OPC_MOD_WAIT_ON_DATA as u8,
        wqe_index: *sq_pi as u16,
        opcode: opcode::WAIT as u8,
        qpn,
        ds: ds::WOD as u8,
        ce: ce_policy,
    };
    ctrl.write_into(bb);
    bb[16..48].copy_from_slice(&seg.pack());

    *sq_pi = sq_pi.wrapping_add(1);
}
