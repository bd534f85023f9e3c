//! Capture of process stdout/stderr around a computation
//!
//! Output is redirected at the file-descriptor level into temporary files,
//! so it also catches text written by native libraries. The redirection is
//! process-wide, so captures on different threads are serialized. A capture
//! nested inside another on the same thread is allowed and restores the outer
//! redirection when it ends.

use crate::error::{CacheError, CacheResult};
use parking_lot::ReentrantMutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Held for as long as fds 1 and 2 point somewhere else
static CAPTURE_LOCK: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Text written to stdout and stderr while capturing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// Replay captured text on the real streams
    pub fn echo(&self) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(self.stdout.as_bytes());
        let _ = out.flush();
        let mut err = io::stderr().lock();
        let _ = err.write_all(self.stderr.as_bytes());
        let _ = err.flush();
    }
}

/// Run `f` with stdout and stderr redirected, returning its result and the text
///
/// The original streams are restored even if `f` panics.
pub fn capture<T>(f: impl FnOnce() -> T) -> CacheResult<(T, Captured)> {
    let mut out_file =
        tempfile::tempfile().map_err(|e| CacheError::io("creating stdout capture file", e))?;
    let mut err_file =
        tempfile::tempfile().map_err(|e| CacheError::io("creating stderr capture file", e))?;

    let result = {
        let _serial = CAPTURE_LOCK.lock();
        let _redirect = Redirect::start(&out_file, &err_file)?;
        f()
    };

    let captured = Captured {
        stdout: read_all(&mut out_file)?,
        stderr: read_all(&mut err_file)?,
    };
    Ok((result, captured))
}

fn read_all(file: &mut File) -> CacheResult<String> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut bytes))
        .map_err(|e| CacheError::io("reading captured output", e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(unix)]
struct Redirect {
    saved_stdout: libc::c_int,
    saved_stderr: libc::c_int,
}

#[cfg(unix)]
impl Redirect {
    fn start(out: &File, err: &File) -> CacheResult<Self> {
        use std::os::unix::io::AsRawFd;

        flush_std();
        // SAFETY: dup/dup2 only operate on descriptors owned by this process;
        // every duplicated descriptor is closed again in Drop.
        unsafe {
            let saved_stdout = libc::dup(libc::STDOUT_FILENO);
            if saved_stdout < 0 {
                return Err(CacheError::io("saving stdout", io::Error::last_os_error()));
            }
            let saved_stderr = libc::dup(libc::STDERR_FILENO);
            if saved_stderr < 0 {
                let e = io::Error::last_os_error();
                libc::close(saved_stdout);
                return Err(CacheError::io("saving stderr", e));
            }
            let redirect = Self {
                saved_stdout,
                saved_stderr,
            };
            if libc::dup2(out.as_raw_fd(), libc::STDOUT_FILENO) < 0
                || libc::dup2(err.as_raw_fd(), libc::STDERR_FILENO) < 0
            {
                return Err(CacheError::io(
                    "redirecting output",
                    io::Error::last_os_error(),
                ));
            }
            Ok(redirect)
        }
    }
}

#[cfg(unix)]
impl Drop for Redirect {
    fn drop(&mut self) {
        flush_std();
        // SAFETY: restores the descriptors saved in `start`.
        unsafe {
            libc::dup2(self.saved_stdout, libc::STDOUT_FILENO);
            libc::dup2(self.saved_stderr, libc::STDERR_FILENO);
            libc::close(self.saved_stdout);
            libc::close(self.saved_stderr);
        }
    }
}

// Output is not redirected on other platforms; captures come back empty.
#[cfg(not(unix))]
struct Redirect;

#[cfg(not(unix))]
impl Redirect {
    fn start(_out: &File, _err: &File) -> CacheResult<Self> {
        Ok(Self)
    }
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
