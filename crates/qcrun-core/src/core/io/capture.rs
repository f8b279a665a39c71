//! Capture of text written directly to the process's standard output descriptor.
//!
//! In-process bindings to native libraries print straight to file descriptor 1,
//! bypassing any Rust-level writer. The only way to collect that text is to point the
//! descriptor at a pipe for the duration of the call. The descriptor is process-wide, so
//! every capture runs inside one global critical section.
//!
//! Captures are not reentrant: calling [`capture_stdout`] from inside the closure of
//! another capture deadlocks. Anything else the process prints to stdout while a
//! capture is active, from any thread, lands in the captured text.

use std::io;
use std::sync::{Mutex, PoisonError};

static STDOUT_REDIRECT: Mutex<()> = Mutex::new(());

/// Runs `f` with stdout redirected and returns its value alongside the captured text.
pub fn capture_stdout<T>(f: impl FnOnce() -> T) -> io::Result<(T, String)> {
    let _lock = STDOUT_REDIRECT
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    imp::capture(f)
}

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::thread;

    struct RedirectGuard {
        saved: OwnedFd,
    }

    impl Drop for RedirectGuard {
        fn drop(&mut self) {
            let _ = io::stdout().flush();
            // SAFETY: both descriptors are open for the lifetime of the guard.
            unsafe { libc::dup2(self.saved.as_raw_fd(), libc::STDOUT_FILENO) };
        }
    }

    fn check(rc: libc::c_int) -> io::Result<libc::c_int> {
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc)
        }
    }

    pub(super) fn capture<T>(f: impl FnOnce() -> T) -> io::Result<(T, String)> {
        io::stdout().flush()?;

        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors `pipe` writes.
        check(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        // SAFETY: `pipe` succeeded, so both descriptors are open and owned by us.
        let (read_end, write_end) =
            unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        // Drain concurrently so a chatty callee cannot fill the pipe and block.
        let drain = thread::spawn(move || -> io::Result<Vec<u8>> {
            let mut reader = read_end;
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(buf)
        });

        // SAFETY: duplicating stdout; the new descriptor is immediately owned.
        let saved = unsafe { OwnedFd::from_raw_fd(check(libc::dup(libc::STDOUT_FILENO))?) };
        // SAFETY: `write_end` is open; fd 1 is replaced atomically.
        check(unsafe { libc::dup2(write_end.as_raw_fd(), libc::STDOUT_FILENO) })?;
        drop(write_end);

        let guard = RedirectGuard { saved };
        let value = f();
        drop(guard);

        let bytes = drain
            .join()
            .map_err(|_| io::Error::other("stdout drain thread panicked"))??;
        Ok((value, String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io;

    pub(super) fn capture<T>(f: impl FnOnce() -> T) -> io::Result<(T, String)> {
        Ok((f(), String::new()))
    }
}
