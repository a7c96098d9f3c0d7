//! A one-shot byte channel between a launching debugger and its
//! not-yet-exec'd child.
//!
//! The close-on-exec flag is what makes the launch protocol work: on a
//! successful `execve(2)` the kernel closes the child's write end, so the
//! parent's drain observes EOF with zero bytes. Any bytes at all mean the
//! child hit a pre-exec failure and wrote its last words here.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, BorrowedFd};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::error::{Error, Result, ResultExt};

pub struct Pipe {
    read: Option<File>,
    write: Option<File>,
}

impl Pipe {
    /// Creates a kernel pipe. When `close_on_exec` is set, both ends get
    /// `O_CLOEXEC` atomically at creation, with no fcntl race.
    pub fn new(close_on_exec: bool) -> Result<Self> {
        let flags = if close_on_exec { OFlag::O_CLOEXEC } else { OFlag::empty() };
        let (read, write) = pipe2(flags).os_context("Could not create pipe")?;

        Ok(Self {
            read: Some(File::from(read)),
            write: Some(File::from(write)),
        })
    }

    pub fn read_fd(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(|file| file.as_fd())
    }

    pub fn write_fd(&self) -> Option<BorrowedFd<'_>> {
        self.write.as_ref().map(|file| file.as_fd())
    }

    pub fn close_read(&mut self) {
        self.read = None;
    }

    pub fn close_write(&mut self) {
        self.write = None;
    }

    /// Blocks until something is readable, then drains everything
    /// currently buffered. Returns an empty vector at EOF.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        let file = self.read.as_mut().ok_or(Error::PipeClosed)?;

        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let count = file.read(&mut buf)?;
            data.extend_from_slice(&buf[..count]);
            if count < buf.len() {
                break;
            }
        }

        Ok(data)
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self.write.as_mut().ok_or(Error::PipeClosed)?;
        file.write_all(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn transports_bytes() {
        let mut pipe = Pipe::new(false).unwrap();
        pipe.write(b"last words").unwrap();
        pipe.close_write();

        assert_eq!(pipe.read().unwrap(), b"last words");
        // The writer is gone, so the next read sees EOF.
        assert_eq!(pipe.read().unwrap(), b"");
    }

    #[test]
    fn read_after_close_fails() {
        let mut pipe = Pipe::new(false).unwrap();
        pipe.close_read();
        assert!(matches!(pipe.read(), Err(Error::PipeClosed)));
        assert!(matches!(pipe.write(b"x"), Ok(())));
    }

    #[test]
    fn cloexec_flag_is_set_on_request() {
        let flag_of = |fd: BorrowedFd<'_>| unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };

        let pipe = Pipe::new(true).unwrap();
        assert_ne!(flag_of(pipe.read_fd().unwrap()) & libc::FD_CLOEXEC, 0);
        assert_ne!(flag_of(pipe.write_fd().unwrap()) & libc::FD_CLOEXEC, 0);

        let plain = Pipe::new(false).unwrap();
        assert_eq!(flag_of(plain.read_fd().unwrap()) & libc::FD_CLOEXEC, 0);
        assert_eq!(flag_of(plain.write_fd().unwrap()) & libc::FD_CLOEXEC, 0);
    }
}
