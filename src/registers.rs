//! A typed view over a stopped tracee's register state.
//!
//! [`Registers`] mirrors the kernel's `user` area locally. Reads are pure
//! byte reinterpretation of the mirror; writes patch the mirror and then
//! commit through whichever kernel interface the register's class
//! requires. The mirror is refreshed by the owning process on every
//! transition to the stopped state, which is the only time its contents
//! are meaningful.

use libc::c_long;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::bits::{self, F80};
use crate::error::{Error, Result, ResultExt};
use crate::process;
use crate::x86::{register_info_by_id, RegisterFormat, RegisterId, RegisterInfo, RegisterType};

/// One register's worth of data, tagged with its interpretation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    F80(F80),
    Bytes8([u8; 8]),
    Bytes16([u8; 16]),
}

impl Value {
    pub fn byte_len(&self) -> usize {
        match self {
            Value::U8(_) | Value::I8(_) => 1,
            Value::U16(_) | Value::I16(_) => 2,
            Value::U32(_) | Value::I32(_) | Value::F32(_) => 4,
            Value::U64(_) | Value::I64(_) | Value::F64(_) | Value::Bytes8(_) => 8,
            Value::F80(_) => 10,
            Value::Bytes16(_) => 16,
        }
    }

    /// The value's native-endian byte image, zero-padded to 16 bytes.
    fn raw_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        match *self {
            Value::U8(v) => out[0] = v,
            Value::U16(v) => out[..2].copy_from_slice(&v.to_ne_bytes()),
            Value::U32(v) => out[..4].copy_from_slice(&v.to_ne_bytes()),
            Value::U64(v) => out[..8].copy_from_slice(&v.to_ne_bytes()),
            Value::I8(v) => out[0] = v as u8,
            Value::I16(v) => out[..2].copy_from_slice(&v.to_ne_bytes()),
            Value::I32(v) => out[..4].copy_from_slice(&v.to_ne_bytes()),
            Value::I64(v) => out[..8].copy_from_slice(&v.to_ne_bytes()),
            Value::F32(v) => out[..4].copy_from_slice(&v.to_ne_bytes()),
            Value::F64(v) => out[..8].copy_from_slice(&v.to_ne_bytes()),
            Value::F80(v) => out[..10].copy_from_slice(&v.to_bits()),
            Value::Bytes8(v) => out[..8].copy_from_slice(&v),
            Value::Bytes16(v) => out = v,
        }
        out
    }
}

macro_rules! value_conversions {
    ($($variant:ident => $ty:ty, $name:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = Error;

                fn try_from(value: Value) -> Result<$ty> {
                    match value {
                        Value::$variant(value) => Ok(value),
                        _ => Err(Error::ValueType { expected: $name }),
                    }
                }
            }
        )*
    };
}

value_conversions! {
    U8 => u8, "u8";
    U16 => u16, "u16";
    U32 => u32, "u32";
    U64 => u64, "u64";
    I8 => i8, "i8";
    I16 => i16, "i16";
    I32 => i32, "i32";
    I64 => i64, "i64";
    F32 => f32, "f32";
    F64 => f64, "f64";
    F80 => F80, "f80";
    Bytes8 => [u8; 8], "8-byte vector";
    Bytes16 => [u8; 16], "16-byte vector";
}

/// Local mirror of a tracee's user area.
#[derive(Debug)]
pub struct Registers {
    pid: Pid,
    user: libc::user,
}

impl Registers {
    pub(crate) fn new(pid: Pid) -> Self {
        // The mirror is meaningless until the first refresh on stop.
        let user = unsafe { std::mem::zeroed() };
        Self { pid, user }
    }

    /// Reads a register out of the local mirror. Never a syscall.
    pub fn read(&self, info: &RegisterInfo) -> Result<Value> {
        let bytes = &bits::struct_bytes(&self.user)[info.offset..];

        let value = match info.format {
            RegisterFormat::Uint => match info.size {
                1 => Value::U8(bytes[0]),
                2 => Value::U16(u16::from_ne_bytes(bits::array_from(bytes))),
                4 => Value::U32(u32::from_ne_bytes(bits::array_from(bytes))),
                8 => Value::U64(u64::from_ne_bytes(bits::array_from(bytes))),
                size => return Err(Error::UnexpectedRegisterSize { size }),
            },
            RegisterFormat::DoubleFloat => Value::F64(f64::from_ne_bytes(bits::array_from(bytes))),
            RegisterFormat::LongDouble => Value::F80(F80::from_bits(bits::array_from(bytes))),
            RegisterFormat::Vector => match info.size {
                8 => Value::Bytes8(bits::array_from(bytes)),
                16 => Value::Bytes16(bits::array_from(bytes)),
                size => return Err(Error::UnexpectedRegisterSize { size }),
            },
        };

        Ok(value)
    }

    /// Writes a register: patches the mirror, then commits to the kernel
    /// through the interface the register's class requires.
    pub fn write(&mut self, info: &RegisterInfo, value: Value) -> Result<()> {
        self.stage(info, value)?;

        match info.ty {
            // The kernel only takes the GPR block whole.
            RegisterType::Gpr | RegisterType::SubGpr => {
                ptrace::setregs(self.pid, self.user.regs)
                    .os_context("Could not write general purpose registers")
            }
            RegisterType::Fpr => process::set_fpregs(self.pid, &self.user.i387),
            // Debug registers are addressed individually; POKEUSER accepts
            // only aligned machine words.
            RegisterType::Dr => {
                let aligned = info.offset & !0b111;
                let word: [u8; 8] = bits::array_from(&bits::struct_bytes(&self.user)[aligned..]);
                let word = u64::from_ne_bytes(word);
                ptrace::write_user(self.pid, aligned as ptrace::AddressType, word as c_long)
                    .os_context("Could not write to user area")
            }
        }
    }

    /// Extracts the register as `T`, failing if its tag does not match.
    pub fn read_by_id_as<T>(&self, id: RegisterId) -> Result<T>
    where
        T: TryFrom<Value, Error = Error>,
    {
        T::try_from(self.read(register_info_by_id(id))?)
    }

    pub fn write_by_id(&mut self, id: RegisterId, value: impl Into<Value>) -> Result<()> {
        self.write(register_info_by_id(id), value.into())
    }

    /// Patches the mirror only, widening the value to the register's
    /// width. The caller is responsible for committing.
    fn stage(&mut self, info: &RegisterInfo, value: Value) -> Result<()> {
        let widened = widen(info, value)?;
        let bytes = bits::struct_bytes_mut(&mut self.user);
        bytes[info.offset..info.offset + info.size].copy_from_slice(&widened[..info.size]);
        Ok(())
    }

    pub(crate) fn set_gprs(&mut self, gprs: libc::user_regs_struct) {
        self.user.regs = gprs;
    }

    pub(crate) fn set_fprs(&mut self, fprs: libc::user_fpregs_struct) {
        self.user.i387 = fprs;
    }

    pub(crate) fn set_debug_register(&mut self, slot: usize, value: u64) {
        self.user.u_debugreg[slot] = value;
    }
}

/// Widens `value` to `info`'s width, following the register's format:
/// signed integers sign-extend into uint registers, doubles become 80-bit
/// extended floats for the x87 stack, and vector registers take any
/// value's raw bytes zero-padded. Anything else is a mismatch.
fn widen(info: &RegisterInfo, value: Value) -> Result<[u8; 16]> {
    let mismatch = || Error::ValueMismatch { name: info.name };

    if value.byte_len() > info.size {
        return Err(mismatch());
    }

    let mut out = [0u8; 16];
    match (info.format, value) {
        (RegisterFormat::Uint, Value::U8(_))
        | (RegisterFormat::Uint, Value::U16(_))
        | (RegisterFormat::Uint, Value::U32(_))
        | (RegisterFormat::Uint, Value::U64(_)) => out = value.raw_bytes(),
        (RegisterFormat::Uint, Value::I8(v)) => sign_extend(&mut out, v as i64),
        (RegisterFormat::Uint, Value::I16(v)) => sign_extend(&mut out, v as i64),
        (RegisterFormat::Uint, Value::I32(v)) => sign_extend(&mut out, v as i64),
        (RegisterFormat::Uint, Value::I64(v)) => sign_extend(&mut out, v),
        (RegisterFormat::DoubleFloat, Value::F32(v)) => {
            out[..8].copy_from_slice(&(v as f64).to_ne_bytes());
        }
        (RegisterFormat::DoubleFloat, Value::F64(_)) => out = value.raw_bytes(),
        (RegisterFormat::LongDouble, Value::F32(v)) => {
            out[..10].copy_from_slice(&F80::from_f64(v as f64).to_bits());
        }
        (RegisterFormat::LongDouble, Value::F64(v)) => {
            out[..10].copy_from_slice(&F80::from_f64(v).to_bits());
        }
        (RegisterFormat::LongDouble, Value::F80(_)) => out = value.raw_bytes(),
        (RegisterFormat::Vector, _) => out = value.raw_bytes(),
        _ => return Err(mismatch()),
    }

    Ok(out)
}

fn sign_extend(out: &mut [u8; 16], value: i64) {
    out[..8].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::x86::register_info_by_name;

    fn mirror() -> Registers {
        Registers::new(Pid::from_raw(0))
    }

    fn stage_by_name(regs: &mut Registers, name: &str, value: impl Into<Value>) {
        let info = register_info_by_name(name).unwrap();
        regs.stage(info, value.into()).unwrap();
    }

    #[test]
    fn gpr_round_trip() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "rsi", 0xcafe_cafeu64);
        assert_eq!(regs.read_by_id_as::<u64>(RegisterId::Rsi).unwrap(), 0xcafe_cafe);
    }

    #[test]
    fn sub_register_writes_leave_the_rest_of_the_block_alone() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "rax", 0x1122_3344_5566_7788u64);
        stage_by_name(&mut regs, "al", 0xffu8);
        assert_eq!(regs.read_by_id_as::<u64>(RegisterId::Rax).unwrap(), 0x1122_3344_5566_77ff);

        stage_by_name(&mut regs, "ah", 0xeeu8);
        assert_eq!(regs.read_by_id_as::<u64>(RegisterId::Rax).unwrap(), 0x1122_3344_5566_eeff);

        stage_by_name(&mut regs, "eax", 0xdead_beefu32);
        assert_eq!(regs.read_by_id_as::<u64>(RegisterId::Rax).unwrap(), 0x1122_3344_dead_beef);
    }

    #[test]
    fn signed_values_sign_extend() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "rsi", -1i32);
        assert_eq!(regs.read_by_id_as::<u64>(RegisterId::Rsi).unwrap(), u64::MAX);

        stage_by_name(&mut regs, "ax", -2i8);
        assert_eq!(regs.read_by_id_as::<u16>(RegisterId::Ax).unwrap(), 0xfffe);
    }

    #[test]
    fn long_double_takes_doubles() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "st0", 42.24f64);
        let read: F80 = regs.read_by_id_as(RegisterId::St0).unwrap();
        assert_eq!(read.to_f64(), 42.24);
    }

    #[test]
    fn vector_registers_take_raw_bytes() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "mm0", [1u8, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            regs.read_by_id_as::<[u8; 8]>(RegisterId::Mm0).unwrap(),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );

        // A double lands in the low lane of an xmm register.
        stage_by_name(&mut regs, "xmm0", 42.42f64);
        let lanes: [u8; 16] = regs.read_by_id_as(RegisterId::Xmm0).unwrap();
        assert_eq!(lanes[..8], 42.42f64.to_ne_bytes());
        assert_eq!(lanes[8..], [0u8; 8]);
    }

    #[test]
    fn mm_aliases_the_st_slot() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "mm0", 0xba5e_ba11u32);
        let st0: F80 = regs.read_by_id_as(RegisterId::St0).unwrap();
        assert_eq!(&st0.to_bits()[..4], &0xba5e_ba11u32.to_ne_bytes());
    }

    #[test]
    fn oversized_values_are_rejected() {
        let mut regs = mirror();
        let info = register_info_by_name("al").unwrap();
        assert!(matches!(
            regs.stage(info, Value::U64(1)),
            Err(Error::ValueMismatch { .. })
        ));
    }

    #[test]
    fn format_mismatches_are_rejected() {
        let mut regs = mirror();
        let rax = register_info_by_name("rax").unwrap();
        assert!(matches!(
            regs.stage(rax, Value::F64(1.0)),
            Err(Error::ValueMismatch { .. })
        ));

        let st0 = register_info_by_name("st0").unwrap();
        assert!(matches!(
            regs.stage(st0, Value::U32(1)),
            Err(Error::ValueMismatch { .. })
        ));
    }

    #[test]
    fn typed_reads_check_the_tag() {
        let regs = mirror();
        assert!(matches!(
            regs.read_by_id_as::<f64>(RegisterId::Rax),
            Err(Error::ValueType { expected: "f64" })
        ));
    }

    #[test]
    fn fsw_and_ftw_are_sixteen_bit() {
        let mut regs = mirror();
        stage_by_name(&mut regs, "fsw", 0b0011_1000_0000_0000u16);
        stage_by_name(&mut regs, "ftw", 0b0011_1111_1111_1111u16);
        assert_eq!(
            regs.read_by_id_as::<u16>(RegisterId::Fsw).unwrap(),
            0b0011_1000_0000_0000
        );
        assert_eq!(
            regs.read_by_id_as::<u16>(RegisterId::Ftw).unwrap(),
            0b0011_1111_1111_1111
        );
    }
}
