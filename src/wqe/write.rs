use super::{ce, ds, opcode, CtrlSeg, DataSeg, RdmaSeg, SwqeBb};

/// Format an RDMA Write WQE with completion suppressed (CE = on first
/// error only) into `bb`. Mirrors
/// `ldo_dev_format_rdma_write_no_comp` in
/// `original_source/src/dpa/ldo_a2a_wqes.c`.
///
/// Occupies 3 octowords (control, RDMA, local data): `sq_pi` is the WQE's
/// own producer index, used only for the control segment's index field —
/// callers are responsible for ring placement.
pub fn format_rdma_write_no_comp(
    bb: &mut SwqeBb,
    sq_pi: u32,
    qpn: u32,
    rkey: u32,
    raddr: u64,
    lkey: u32,
    laddr: u64,
    msg_size: u32,
) {
    let ctrl = CtrlSeg {
        opcode_mod: 0,
        wqe_index: sq_pi as u16,
        opcode: opcode::RDMA_WRITE as u8,
        qpn,
        ds: ds::RDMA_WRITE as u8,
        ce: ce::CQE_ON_FIRST_ERROR,
    };
    ctrl.write_into(bb);

    RdmaSeg { rkey, raddr }.write_into(bb, 16);

    DataSeg {
        byte_count: msg_size,
        lkey,
        addr: laddr,
    }
    .write_into(bb, 32);
}
