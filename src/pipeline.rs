// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Pipeline Executor: builds a linear, shell-style pipeline of N stages
//! for one task, with optional input/output file redirection, and waits
//! for all stages to finish.
//!
//! This is a direct fork/pipe/dup2/exec translation (no `std::process`
//! involved, since interior stages need to share raw pipe descriptors
//! with each other rather than just with this process) of the reference
//! `execute_task` in the original implementation this crate's behavior
//! was distilled from, tightened to match spec.md §4.3's documented
//! fd-hygiene rules exactly rather than the reference's "close every
//! pipe fd a second time after the spawn loop" pass, which is a
//! double-close bug the spec's fd-hygiene section does not call for.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{access, close, dup2, execv, execvp, fork, pipe, AccessFlags, ForkResult, Pid};

use crate::graph::Task;

const UTIL_DIR: &str = "util";

/// Run every step of `task` as one pipeline. Returns `0` on success, or
/// the rightmost non-zero exit status observed (`-1` if none is
/// available, e.g. a stage was signalled or a fork failed mid-pipeline).
pub fn run(task: &Task) -> i32 {
    let steps = &task.steps;
    if steps.is_empty() {
        return 0;
    }
    let n = steps.len();

    let input_fd = match &task.input {
        Some(path) => match open(path.as_path(), OFlag::O_RDONLY, Mode::empty()) {
            Ok(fd) => Some(fd),
            Err(e) => {
                eprintln!("cook: cannot open input file '{}': {e}", path.display());
                return -1;
            }
        },
        None => None,
    };

    let output_fd = match &task.output {
        Some(path) => {
            let mode = Mode::from_bits_truncate(0o666);
            match open(path.as_path(), OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC, mode) {
                Ok(fd) => Some(fd),
                Err(e) => {
                    eprintln!("cook: cannot open output file '{}': {e}", path.display());
                    if let Some(fd) = input_fd {
                        let _ = close(fd);
                    }
                    return -1;
                }
            }
        }
        None => None,
    };

    let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(n.saturating_sub(1));
    for _ in 0..n.saturating_sub(1) {
        match pipe() {
            Ok(ends) => pipes.push(ends),
            Err(e) => {
                eprintln!("cook: pipe: {e}");
                for (r, w) in &pipes {
                    let _ = close(*r);
                    let _ = close(*w);
                }
                if let Some(fd) = input_fd {
                    let _ = close(fd);
                }
                if let Some(fd) = output_fd {
                    let _ = close(fd);
                }
                return -1;
            }
        }
    }

    let mut child_pids: Vec<Pid> = Vec::with_capacity(n);

    for (i, argv) in steps.iter().enumerate() {
        // Safety: this process is single-threaded.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => run_stage(argv, i, n, input_fd, output_fd, &pipes),
            Ok(ForkResult::Parent { child }) => {
                child_pids.push(child);
                // Close the parent's copy of the write end of pipe i as
                // soon as it's forked, so EOF propagates; close the read
                // end of pipe i-1 once stage i (its reader) exists.
                if i > 0 {
                    let _ = close(pipes[i - 1].0);
                }
                if i < n - 1 {
                    let _ = close(pipes[i].1);
                }
            }
            Err(e) => {
                eprintln!("cook: fork: {e}");
                for pid in &child_pids {
                    let _ = waitpid(*pid, None);
                }
                close_unclosed(i, &pipes);
                if let Some(fd) = input_fd {
                    let _ = close(fd);
                }
                if let Some(fd) = output_fd {
                    let _ = close(fd);
                }
                return -1;
            }
        }
    }

    if let Some(fd) = input_fd {
        let _ = close(fd);
    }
    if let Some(fd) = output_fd {
        let _ = close(fd);
    }

    let mut task_exit_status = 0;
    let mut task_failed = false;
    for pid in child_pids {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                if code != 0 {
                    task_failed = true;
                    task_exit_status = code;
                }
            }
            Ok(WaitStatus::Signaled(..)) => {
                task_failed = true;
            }
            Ok(_) | Err(_) => {
                task_failed = true;
            }
        }
    }

    if task_failed {
        if task_exit_status != 0 {
            task_exit_status
        } else {
            -1
        }
    } else {
        0
    }
}

/// Close whatever pipe ends the spawn loop hadn't reached yet when a
/// `fork` failed partway through, at stage `failed_at`.
fn close_unclosed(failed_at: usize, pipes: &[(RawFd, RawFd)]) {
    for (i, (r, w)) in pipes.iter().enumerate() {
        // Mirror the per-stage accounting in the main loop: pipe i's
        // write end is closed once stage i is forked, its read end once
        // stage i+1 is forked. Anything at or past the failed stage
        // never got that treatment.
        if i >= failed_at.saturating_sub(1) {
            let _ = close(*r);
        }
        if i >= failed_at {
            let _ = close(*w);
        }
    }
}

fn run_stage(argv: &[String], i: usize, n: usize, input_fd: Option<RawFd>, output_fd: Option<RawFd>, pipes: &[(RawFd, RawFd)]) -> ! {
    let result = (|| -> nix::Result<()> {
        if i == 0 {
            if let Some(fd) = input_fd {
                dup2(fd, libc_stdin())?;
            }
        } else {
            dup2(pipes[i - 1].0, libc_stdin())?;
        }

        if i == n - 1 {
            if let Some(fd) = output_fd {
                dup2(fd, libc_stdout())?;
            }
        } else {
            dup2(pipes[i].1, libc_stdout())?;
        }

        if let Some(fd) = input_fd {
            close(fd)?;
        }
        if let Some(fd) = output_fd {
            close(fd)?;
        }
        for (r, w) in pipes {
            close(*r)?;
            close(*w)?;
        }

        Ok(())
    })();

    if let Err(e) = result {
        eprintln!("cook: failed to set up pipeline stage: {e}");
        std::process::exit(1);
    }

    exec_step(argv)
}

fn libc_stdin() -> RawFd {
    0
}

fn libc_stdout() -> RawFd {
    1
}

fn exec_step(argv: &[String]) -> ! {
    let util_path = format!("{UTIL_DIR}/{}", argv[0]);

    let c_args: Vec<CString> = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()).unwrap_or_else(|_| CString::new("").unwrap()))
        .collect();

    if access(util_path.as_str(), AccessFlags::X_OK).is_ok() {
        if let Ok(path) = CString::new(util_path.clone()) {
            let _ = execv(&path, &c_args);
            eprintln!("cook: failed to execute '{util_path}': {}", std::io::Error::last_os_error());
            std::process::exit(1);
        }
    }

    let _ = execvp(&c_args[0], &c_args);
    eprintln!("cook: failed to execute '{}': {}", argv[0], std::io::Error::last_os_error());
    std::process::exit(1);
}
