//! The x86-64 register catalog.
//!
//! Every register the debugger exposes is described by one [`RegisterInfo`]
//! row in a single static table: its name, DWARF number, width, byte offset
//! into the kernel's virtual `user` area, class, and value format. The
//! offsets are computed from the `libc` layout of `user`, so the table can
//! never drift from what `PTRACE_PEEKUSER` and friends actually address.
//!
//! Table order is declaration order, and matches the [`RegisterId`]
//! discriminants so that lookup by id is an index.

use std::sync::LazyLock;

use libc::{user, user_fpregs_struct, user_regs_struct};
use memoffset::offset_of;

use crate::error::{Error, Result};

/// Register classes, keyed to the kernel interface that writes them back.
///
/// General-purpose registers (and their sub-register views) commit through
/// `PTRACE_SETREGS`, floating-point state through `PTRACE_SETFPREGS`, and
/// debug registers through single-word `PTRACE_POKEUSER` requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterType {
    Gpr,
    SubGpr,
    Fpr,
    Dr,
}

/// How the raw bytes of a register should be interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterFormat {
    Uint,
    DoubleFloat,
    LongDouble,
    Vector,
}

/// Identifies one architectural register.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegisterId {
    // 64-bit general-purpose registers.
    Rax,
    Rdx,
    Rcx,
    Rbx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Eflags,
    Cs,
    Fs,
    Gs,
    Ss,
    Ds,
    Es,
    FsBase,
    GsBase,
    OrigRax,

    // 32-bit sub-registers.
    Eax,
    Edx,
    Ecx,
    Ebx,
    Esi,
    Edi,
    Ebp,
    Esp,
    R8d,
    R9d,
    R10d,
    R11d,
    R12d,
    R13d,
    R14d,
    R15d,

    // 16-bit sub-registers.
    Ax,
    Dx,
    Cx,
    Bx,
    Si,
    Di,
    Bp,
    Sp,
    R8w,
    R9w,
    R10w,
    R11w,
    R12w,
    R13w,
    R14w,
    R15w,

    // High and low 8-bit sub-registers.
    Ah,
    Dh,
    Ch,
    Bh,
    Al,
    Dl,
    Cl,
    Bl,
    Sil,
    Dil,
    Bpl,
    Spl,
    R8b,
    R9b,
    R10b,
    R11b,
    R12b,
    R13b,
    R14b,
    R15b,

    // x87 and SSE control/status words.
    Fcw,
    Fsw,
    Ftw,
    Fop,
    Frip,
    Frdp,
    Mxcsr,
    Mxcsrmask,

    // x87 stack registers.
    St0,
    St1,
    St2,
    St3,
    St4,
    St5,
    St6,
    St7,

    // MMX aliases of the x87 mantissa slots.
    Mm0,
    Mm1,
    Mm2,
    Mm3,
    Mm4,
    Mm5,
    Mm6,
    Mm7,

    // SSE registers.
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,

    // Debug registers.
    Dr0,
    Dr1,
    Dr2,
    Dr3,
    Dr4,
    Dr5,
    Dr6,
    Dr7,
}

/// Static description of one register.
#[derive(Clone, Copy, Debug)]
pub struct RegisterInfo {
    pub id: RegisterId,
    pub name: &'static str,
    /// DWARF register number per the System V x86-64 ABI; −1 when none.
    pub dwarf_id: i32,
    /// Width in bytes of the value the debugger reads or writes.
    pub size: usize,
    /// Byte offset into the kernel `user` area.
    pub offset: usize,
    pub ty: RegisterType,
    pub format: RegisterFormat,
}

pub(crate) const DEBUG_REGISTERS: [RegisterId; 8] = [
    RegisterId::Dr0,
    RegisterId::Dr1,
    RegisterId::Dr2,
    RegisterId::Dr3,
    RegisterId::Dr4,
    RegisterId::Dr5,
    RegisterId::Dr6,
    RegisterId::Dr7,
];

static REGISTER_INFOS: LazyLock<Vec<RegisterInfo>> = LazyLock::new(build_table);

/// All registers, in declaration order.
pub fn register_infos() -> &'static [RegisterInfo] {
    &REGISTER_INFOS
}

pub fn register_info_by_id(id: RegisterId) -> &'static RegisterInfo {
    let info = &register_infos()[id as usize];
    debug_assert_eq!(info.id, id);
    info
}

pub fn register_info_by_name(name: &str) -> Result<&'static RegisterInfo> {
    register_infos()
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| Error::UnknownRegister { name: name.to_owned() })
}

pub fn register_info_by_dwarf(dwarf_id: i32) -> Result<&'static RegisterInfo> {
    register_infos()
        .iter()
        .find(|info| info.dwarf_id == dwarf_id && dwarf_id >= 0)
        .ok_or(Error::UnknownDwarfRegister { dwarf_id })
}

fn build_table() -> Vec<RegisterInfo> {
    use RegisterFormat::*;
    use RegisterId::*;
    use RegisterType::*;

    let gpr_base = offset_of!(user, regs);
    let fpr_base = offset_of!(user, i387);
    let dr_base = offset_of!(user, u_debugreg);
    let st_base = fpr_base + offset_of!(user_fpregs_struct, st_space);
    let xmm_base = fpr_base + offset_of!(user_fpregs_struct, xmm_space);

    let info = |id, name, dwarf_id, size, offset, ty, format| RegisterInfo {
        id,
        name,
        dwarf_id,
        size,
        offset,
        ty,
        format,
    };

    let gpr = |id, name, dwarf_id, field| info(id, name, dwarf_id, 8, gpr_base + field, Gpr, Uint);
    let sub = |id, name, size, field| info(id, name, -1, size, gpr_base + field, SubGpr, Uint);
    let sub_high = |id, name, field| info(id, name, -1, 1, gpr_base + field + 1, SubGpr, Uint);
    let fpr = |id, name, dwarf_id, size, field| info(id, name, dwarf_id, size, fpr_base + field, Fpr, Uint);
    let st = |id, name, slot: usize| info(id, name, 33 + slot as i32, 10, st_base + slot * 16, Fpr, LongDouble);
    let mm = |id, name, slot: usize| info(id, name, 41 + slot as i32, 8, st_base + slot * 16, Fpr, Vector);
    let xmm = |id, name, slot: usize| info(id, name, 17 + slot as i32, 16, xmm_base + slot * 16, Fpr, Vector);
    let dr = |id, name, slot: usize| info(id, name, -1, 8, dr_base + slot * 8, Dr, Uint);

    vec![
        gpr(Rax, "rax", 0, offset_of!(user_regs_struct, rax)),
        gpr(Rdx, "rdx", 1, offset_of!(user_regs_struct, rdx)),
        gpr(Rcx, "rcx", 2, offset_of!(user_regs_struct, rcx)),
        gpr(Rbx, "rbx", 3, offset_of!(user_regs_struct, rbx)),
        gpr(Rsi, "rsi", 4, offset_of!(user_regs_struct, rsi)),
        gpr(Rdi, "rdi", 5, offset_of!(user_regs_struct, rdi)),
        gpr(Rbp, "rbp", 6, offset_of!(user_regs_struct, rbp)),
        gpr(Rsp, "rsp", 7, offset_of!(user_regs_struct, rsp)),
        gpr(R8, "r8", 8, offset_of!(user_regs_struct, r8)),
        gpr(R9, "r9", 9, offset_of!(user_regs_struct, r9)),
        gpr(R10, "r10", 10, offset_of!(user_regs_struct, r10)),
        gpr(R11, "r11", 11, offset_of!(user_regs_struct, r11)),
        gpr(R12, "r12", 12, offset_of!(user_regs_struct, r12)),
        gpr(R13, "r13", 13, offset_of!(user_regs_struct, r13)),
        gpr(R14, "r14", 14, offset_of!(user_regs_struct, r14)),
        gpr(R15, "r15", 15, offset_of!(user_regs_struct, r15)),
        gpr(Rip, "rip", 16, offset_of!(user_regs_struct, rip)),
        gpr(Eflags, "eflags", 49, offset_of!(user_regs_struct, eflags)),
        gpr(Cs, "cs", 51, offset_of!(user_regs_struct, cs)),
        gpr(Fs, "fs", 54, offset_of!(user_regs_struct, fs)),
        gpr(Gs, "gs", 55, offset_of!(user_regs_struct, gs)),
        gpr(Ss, "ss", 52, offset_of!(user_regs_struct, ss)),
        gpr(Ds, "ds", 53, offset_of!(user_regs_struct, ds)),
        gpr(Es, "es", 50, offset_of!(user_regs_struct, es)),
        gpr(FsBase, "fs_base", 58, offset_of!(user_regs_struct, fs_base)),
        gpr(GsBase, "gs_base", 59, offset_of!(user_regs_struct, gs_base)),
        gpr(OrigRax, "orig_rax", -1, offset_of!(user_regs_struct, orig_rax)),
        //
        sub(Eax, "eax", 4, offset_of!(user_regs_struct, rax)),
        sub(Edx, "edx", 4, offset_of!(user_regs_struct, rdx)),
        sub(Ecx, "ecx", 4, offset_of!(user_regs_struct, rcx)),
        sub(Ebx, "ebx", 4, offset_of!(user_regs_struct, rbx)),
        sub(Esi, "esi", 4, offset_of!(user_regs_struct, rsi)),
        sub(Edi, "edi", 4, offset_of!(user_regs_struct, rdi)),
        sub(Ebp, "ebp", 4, offset_of!(user_regs_struct, rbp)),
        sub(Esp, "esp", 4, offset_of!(user_regs_struct, rsp)),
        sub(R8d, "r8d", 4, offset_of!(user_regs_struct, r8)),
        sub(R9d, "r9d", 4, offset_of!(user_regs_struct, r9)),
        sub(R10d, "r10d", 4, offset_of!(user_regs_struct, r10)),
        sub(R11d, "r11d", 4, offset_of!(user_regs_struct, r11)),
        sub(R12d, "r12d", 4, offset_of!(user_regs_struct, r12)),
        sub(R13d, "r13d", 4, offset_of!(user_regs_struct, r13)),
        sub(R14d, "r14d", 4, offset_of!(user_regs_struct, r14)),
        sub(R15d, "r15d", 4, offset_of!(user_regs_struct, r15)),
        //
        sub(Ax, "ax", 2, offset_of!(user_regs_struct, rax)),
        sub(Dx, "dx", 2, offset_of!(user_regs_struct, rdx)),
        sub(Cx, "cx", 2, offset_of!(user_regs_struct, rcx)),
        sub(Bx, "bx", 2, offset_of!(user_regs_struct, rbx)),
        sub(Si, "si", 2, offset_of!(user_regs_struct, rsi)),
        sub(Di, "di", 2, offset_of!(user_regs_struct, rdi)),
        sub(Bp, "bp", 2, offset_of!(user_regs_struct, rbp)),
        sub(Sp, "sp", 2, offset_of!(user_regs_struct, rsp)),
        sub(R8w, "r8w", 2, offset_of!(user_regs_struct, r8)),
        sub(R9w, "r9w", 2, offset_of!(user_regs_struct, r9)),
        sub(R10w, "r10w", 2, offset_of!(user_regs_struct, r10)),
        sub(R11w, "r11w", 2, offset_of!(user_regs_struct, r11)),
        sub(R12w, "r12w", 2, offset_of!(user_regs_struct, r12)),
        sub(R13w, "r13w", 2, offset_of!(user_regs_struct, r13)),
        sub(R14w, "r14w", 2, offset_of!(user_regs_struct, r14)),
        sub(R15w, "r15w", 2, offset_of!(user_regs_struct, r15)),
        //
        sub_high(Ah, "ah", offset_of!(user_regs_struct, rax)),
        sub_high(Dh, "dh", offset_of!(user_regs_struct, rdx)),
        sub_high(Ch, "ch", offset_of!(user_regs_struct, rcx)),
        sub_high(Bh, "bh", offset_of!(user_regs_struct, rbx)),
        sub(Al, "al", 1, offset_of!(user_regs_struct, rax)),
        sub(Dl, "dl", 1, offset_of!(user_regs_struct, rdx)),
        sub(Cl, "cl", 1, offset_of!(user_regs_struct, rcx)),
        sub(Bl, "bl", 1, offset_of!(user_regs_struct, rbx)),
        sub(Sil, "sil", 1, offset_of!(user_regs_struct, rsi)),
        sub(Dil, "dil", 1, offset_of!(user_regs_struct, rdi)),
        sub(Bpl, "bpl", 1, offset_of!(user_regs_struct, rbp)),
        sub(Spl, "spl", 1, offset_of!(user_regs_struct, rsp)),
        sub(R8b, "r8b", 1, offset_of!(user_regs_struct, r8)),
        sub(R9b, "r9b", 1, offset_of!(user_regs_struct, r9)),
        sub(R10b, "r10b", 1, offset_of!(user_regs_struct, r10)),
        sub(R11b, "r11b", 1, offset_of!(user_regs_struct, r11)),
        sub(R12b, "r12b", 1, offset_of!(user_regs_struct, r12)),
        sub(R13b, "r13b", 1, offset_of!(user_regs_struct, r13)),
        sub(R14b, "r14b", 1, offset_of!(user_regs_struct, r14)),
        sub(R15b, "r15b", 1, offset_of!(user_regs_struct, r15)),
        //
        fpr(Fcw, "fcw", 65, 2, offset_of!(user_fpregs_struct, cwd)),
        fpr(Fsw, "fsw", 66, 2, offset_of!(user_fpregs_struct, swd)),
        fpr(Ftw, "ftw", -1, 2, offset_of!(user_fpregs_struct, ftw)),
        fpr(Fop, "fop", -1, 2, offset_of!(user_fpregs_struct, fop)),
        fpr(Frip, "frip", -1, 8, offset_of!(user_fpregs_struct, rip)),
        fpr(Frdp, "frdp", -1, 8, offset_of!(user_fpregs_struct, rdp)),
        fpr(Mxcsr, "mxcsr", 64, 4, offset_of!(user_fpregs_struct, mxcsr)),
        fpr(Mxcsrmask, "mxcsrmask", -1, 4, offset_of!(user_fpregs_struct, mxcr_mask)),
        //
        st(St0, "st0", 0),
        st(St1, "st1", 1),
        st(St2, "st2", 2),
        st(St3, "st3", 3),
        st(St4, "st4", 4),
        st(St5, "st5", 5),
        st(St6, "st6", 6),
        st(St7, "st7", 7),
        //
        mm(Mm0, "mm0", 0),
        mm(Mm1, "mm1", 1),
        mm(Mm2, "mm2", 2),
        mm(Mm3, "mm3", 3),
        mm(Mm4, "mm4", 4),
        mm(Mm5, "mm5", 5),
        mm(Mm6, "mm6", 6),
        mm(Mm7, "mm7", 7),
        //
        xmm(Xmm0, "xmm0", 0),
        xmm(Xmm1, "xmm1", 1),
        xmm(Xmm2, "xmm2", 2),
        xmm(Xmm3, "xmm3", 3),
        xmm(Xmm4, "xmm4", 4),
        xmm(Xmm5, "xmm5", 5),
        xmm(Xmm6, "xmm6", 6),
        xmm(Xmm7, "xmm7", 7),
        xmm(Xmm8, "xmm8", 8),
        xmm(Xmm9, "xmm9", 9),
        xmm(Xmm10, "xmm10", 10),
        xmm(Xmm11, "xmm11", 11),
        xmm(Xmm12, "xmm12", 12),
        xmm(Xmm13, "xmm13", 13),
        xmm(Xmm14, "xmm14", 14),
        xmm(Xmm15, "xmm15", 15),
        //
        dr(Dr0, "dr0", 0),
        dr(Dr1, "dr1", 1),
        dr(Dr2, "dr2", 2),
        dr(Dr3, "dr3", 3),
        dr(Dr4, "dr4", 4),
        dr(Dr5, "dr5", 5),
        dr(Dr6, "dr6", 6),
        dr(Dr7, "dr7", 7),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn table_order_matches_ids() {
        for (index, info) in register_infos().iter().enumerate() {
            assert_eq!(info.id as usize, index, "misplaced entry {}", info.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = register_infos().iter().map(|info| info.name).collect();
        assert_eq!(names.len(), register_infos().len());
    }

    #[test]
    fn offsets_stay_inside_the_user_area() {
        let end = std::mem::size_of::<user>();
        for info in register_infos() {
            assert!(info.offset + info.size <= end, "{} overruns user", info.name);
        }
    }

    #[test]
    fn sub_registers_alias_their_parent() {
        let rax = register_info_by_id(RegisterId::Rax);
        assert_eq!(register_info_by_id(RegisterId::Eax).offset, rax.offset);
        assert_eq!(register_info_by_id(RegisterId::Ax).offset, rax.offset);
        assert_eq!(register_info_by_id(RegisterId::Al).offset, rax.offset);
        assert_eq!(register_info_by_id(RegisterId::Ah).offset, rax.offset + 1);
    }

    #[test]
    fn mm_aliases_st_mantissa() {
        let st0 = register_info_by_id(RegisterId::St0);
        let mm0 = register_info_by_id(RegisterId::Mm0);
        assert_eq!(mm0.offset, st0.offset);
        assert_eq!(mm0.size, 8);
        assert_eq!(st0.size, 10);
    }

    #[test]
    fn debug_register_offsets_are_word_aligned_and_contiguous() {
        let dr0 = register_info_by_id(RegisterId::Dr0);
        assert_eq!(dr0.offset % 8, 0);
        for (slot, id) in DEBUG_REGISTERS.iter().enumerate() {
            assert_eq!(register_info_by_id(*id).offset, dr0.offset + slot * 8);
        }
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(register_info_by_name("rsi").unwrap().id, RegisterId::Rsi);
        assert_eq!(register_info_by_name("mxcsrmask").unwrap().id, RegisterId::Mxcsrmask);
        assert!(matches!(
            register_info_by_name("no_such_register"),
            Err(Error::UnknownRegister { .. })
        ));
    }

    #[test]
    fn lookup_by_dwarf() {
        assert_eq!(register_info_by_dwarf(0).unwrap().id, RegisterId::Rax);
        assert_eq!(register_info_by_dwarf(4).unwrap().id, RegisterId::Rsi);
        assert_eq!(register_info_by_dwarf(17).unwrap().id, RegisterId::Xmm0);
        // −1 marks "no DWARF number" and must never resolve.
        assert!(register_info_by_dwarf(-1).is_err());
    }
}
