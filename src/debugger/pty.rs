use crate::debugger::error::Error;
use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
use nix::unistd::dup;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};

/// Pseudo terminal used as the I/O of a launched debuggee.
pub struct Pty {
    master: PtyMaster,
    slave: PathBuf,
}

impl Pty {
    pub fn open() -> Result<Self, Error> {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY)
            .map_err(|e| Error::Syscall("posix_openpt", e))?;
        grantpt(&master).map_err(|e| Error::Syscall("grantpt", e))?;
        unlockpt(&master).map_err(|e| Error::Syscall("unlockpt", e))?;
        let slave = ptsname_r(&master).map_err(|e| Error::Syscall("ptsname_r", e))?;
        Ok(Self {
            master,
            slave: PathBuf::from(slave),
        })
    }

    /// Path of the terminal side handed to the debuggee.
    pub fn slave_path(&self) -> &Path {
        &self.slave
    }

    /// Independent handle to the master side, reads return debuggee output.
    pub fn reader(&self) -> Result<File, Error> {
        let fd = dup(self.master.as_raw_fd()).map_err(|e| Error::Syscall("dup", e))?;
        // SAFETY: `fd` is a fresh descriptor owned by nobody else
        Ok(unsafe { File::from_raw_fd(fd) })
    }
}
