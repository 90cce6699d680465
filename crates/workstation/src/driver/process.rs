// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use nix::sys::signal;
use nix::unistd::Pid;

/// Checks whether a process with the given PID is alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid_i32), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_is_not_meaningfully_alive_for_our_purposes() {
        // signal::kill(0, None) targets the caller's process group, which
        // always succeeds; callers must not rely on pid 0 here.
        assert!(is_process_alive(0));
    }
}
