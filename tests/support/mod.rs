use std::fs;

use magpie::Pid;
use nix::sys::signal::kill;

/// True while the kernel still has a record of `pid`.
pub fn process_exists(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

/// The status character from `/proc/<pid>/stat`: 'R' running, 'S'
/// sleeping, 't' tracing-stop, and so on.
pub fn process_status(pid: Pid) -> char {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).expect("tracee has a stat file");

    // The field follows the parenthesized command name, which may itself
    // contain parentheses, so search from the right.
    let field = stat.rfind(')').expect("malformed stat line") + 2;
    stat[field..].chars().next().expect("malformed stat line")
}
