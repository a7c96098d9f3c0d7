//! End-to-end register round-trips against the `reg-write` test program,
//! which traps between reads so the debugger can plant values for it to
//! report over its stdout.
#![cfg(feature = "test-programs")]

use anyhow::Result;
use magpie::{Pipe, Process, RegisterId};
use ntest::timeout;

const REG_WRITE: &str = "test-programs/reg-write/target/release/reg-write";

#[test]
#[timeout(10000)]
fn written_registers_reach_the_tracee() -> Result<()> {
    // The pipe doubles as the tracee's stdout, so it must survive exec.
    let mut channel = Pipe::new(false)?;
    let mut process = Process::launch_with(REG_WRITE, true, channel.write_fd())?;
    channel.close_write();

    // First trap: the tracee is about to report rsi.
    process.resume()?;
    process.wait_on_signal()?;

    process
        .registers_mut()
        .write_by_id(RegisterId::Rsi, 0xcafe_cafeu64)?;

    process.resume()?;
    process.wait_on_signal()?;
    assert_eq!(String::from_utf8(channel.read()?)?, "0xcafecafe");

    process
        .registers_mut()
        .write_by_id(RegisterId::Mm0, 0xba5e_ba11u64)?;

    process.resume()?;
    process.wait_on_signal()?;
    assert_eq!(String::from_utf8(channel.read()?)?, "0xba5eba11");

    process.registers_mut().write_by_id(RegisterId::Xmm0, 42.42f64)?;

    process.resume()?;
    process.wait_on_signal()?;
    assert_eq!(String::from_utf8(channel.read()?)?, "42.42");

    process.registers_mut().write_by_id(RegisterId::St0, 42.24f64)?;
    // Point the x87 top-of-stack at slot seven so the staged value sits in
    // st0, and tag every slot as valid so the tracee's fstp will pop it.
    process
        .registers_mut()
        .write_by_id(RegisterId::Fsw, 0b0011_1000_0000_0000u16)?;
    process
        .registers_mut()
        .write_by_id(RegisterId::Ftw, 0b0011_1111_1111_1111u16)?;

    process.resume()?;
    process.wait_on_signal()?;
    assert_eq!(String::from_utf8(channel.read()?)?, "42.24");

    Ok(())
}
