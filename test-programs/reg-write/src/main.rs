//! Traps between register reads so a debugger can plant values for this
//! program to report. Each report goes to stdout unbuffered, with no
//! trailing newline, so the driving test sees exactly the formatted value.

use std::arch::asm;
use std::io::{self, Write};

use magpie::F80;

fn report(text: String) {
    print!("{text}");
    io::stdout().flush().expect("flush stdout");
}

fn main() {
    // The debugger writes rsi while we sit in the trap.
    let rsi: u64;
    unsafe { asm!("int3", out("rsi") rsi) };
    report(format!("{rsi:#x}"));

    let mm0: u64;
    unsafe { asm!("int3", "movq {}, mm0", "emms", out(reg) mm0) };
    report(format!("{mm0:#x}"));

    let xmm0: f64;
    unsafe { asm!("int3", out("xmm0") xmm0) };
    report(format!("{xmm0}"));

    // The debugger stages st0 plus fsw/ftw so this fstp pops its value.
    let mut st0 = [0u8; 10];
    unsafe { asm!("int3", "fstp tbyte ptr [{}]", in(reg) st0.as_mut_ptr()) };
    report(format!("{}", F80::from_bits(st0).to_f64()));
}
