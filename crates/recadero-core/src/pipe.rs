//! Pipe plumbing for child process standard streams.
//!
//! Three unidirectional pipes per launch, created close-on-exec so no
//! concurrently spawned process can leak an end. The parent-retained ends
//! stay that way for their whole life; the child-facing ends become the
//! child's standard descriptors when the launch primitive installs them,
//! which is the one place they are meant to be inherited. Both sides are
//! [`OwnedFd`], so every end is released exactly once on every exit path.

use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::error::{CommandError, CommandResult};

/// The pipe ends the parent keeps for the duration of one launch.
#[derive(Debug)]
pub struct ParentEnds {
    /// Write end of the child's stdin pipe.
    pub stdin: OwnedFd,
    /// Read end of the child's stdout pipe.
    pub stdout: OwnedFd,
    /// Read end of the child's stderr pipe.
    pub stderr: OwnedFd,
}

/// The pipe ends destined for the spawned child's standard descriptors.
///
/// Consumed whole by [`DistroAdapter::launch`](crate::adapter::DistroAdapter::launch);
/// once the call returns, no copy of these descriptors remains on the
/// parent side, which is what makes end-of-stream on stdout and stderr
/// observable.
#[derive(Debug)]
pub struct ChildEnds {
    /// Read end of the child's stdin pipe.
    pub stdin: OwnedFd,
    /// Write end of the child's stdout pipe.
    pub stdout: OwnedFd,
    /// Write end of the child's stderr pipe.
    pub stderr: OwnedFd,
}

/// Creates the three standard-stream pipes for one launch.
///
/// # Errors
/// Returns [`CommandError::Setup`] if any pipe cannot be created;
/// descriptors created before the failure are released before the error
/// propagates.
pub fn create_stdio_pipes() -> CommandResult<(ParentEnds, ChildEnds)> {
    let (stdout_read, stdout_write) = stream_pipe()?;
    let (stderr_read, stderr_write) = stream_pipe()?;
    // stdin flows the other way: the parent keeps the write end.
    let (stdin_read, stdin_write) = stream_pipe()?;

    Ok((
        ParentEnds {
            stdin: stdin_write,
            stdout: stdout_read,
            stderr: stderr_read,
        },
        ChildEnds {
            stdin: stdin_read,
            stdout: stdout_write,
            stderr: stderr_write,
        },
    ))
}

fn stream_pipe() -> CommandResult<(OwnedFd, OwnedFd)> {
    pipe2(OFlag::O_CLOEXEC).map_err(|errno| CommandError::setup(std::io::Error::from(errno)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Write};

    #[cfg(target_os = "linux")]
    fn is_close_on_exec(fd: &OwnedFd) -> bool {
        use std::os::fd::AsRawFd;
        const O_CLOEXEC_BIT: u32 = 0o2000000;

        let info = std::fs::read_to_string(format!("/proc/self/fdinfo/{}", fd.as_raw_fd()))
            .unwrap();
        let flags = info
            .lines()
            .find_map(|line| line.strip_prefix("flags:"))
            .map(|value| u32::from_str_radix(value.trim(), 8).unwrap())
            .unwrap();
        flags & O_CLOEXEC_BIT != 0
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_every_end_is_created_close_on_exec() {
        let (parent, child) = create_stdio_pipes().unwrap();
        for fd in [
            &parent.stdin,
            &parent.stdout,
            &parent.stderr,
            &child.stdin,
            &child.stdout,
            &child.stderr,
        ] {
            assert!(is_close_on_exec(fd));
        }
    }

    #[test]
    fn test_data_flows_parent_to_child_stdin() {
        let (parent, child) = create_stdio_pipes().unwrap();
        let mut writer = File::from(parent.stdin);
        let mut reader = File::from(child.stdin);

        writer.write_all(b"ping").unwrap();
        drop(writer);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"ping");
    }

    #[test]
    fn test_dropping_child_end_signals_eof() {
        let (parent, child) = create_stdio_pipes().unwrap();
        let mut writer = File::from(child.stdout);
        writer.write_all(b"out").unwrap();
        drop(writer);
        drop(child.stdin);
        drop(child.stderr);

        let mut reader = File::from(parent.stdout);
        let mut received = Vec::new();
        reader.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"out");
    }

    #[test]
    fn test_spawned_child_sees_installed_ends() {
        let (parent, child) = create_stdio_pipes().unwrap();

        let mut command = std::process::Command::new("/bin/sh");
        command
            .arg("-c")
            .arg("cat")
            .stdin(std::process::Stdio::from(child.stdin))
            .stdout(std::process::Stdio::from(child.stdout))
            .stderr(std::process::Stdio::from(child.stderr));
        let mut spawned = command.spawn().unwrap();
        drop(command);

        let mut writer = File::from(parent.stdin);
        writer.write_all(b"through the child").unwrap();
        drop(writer);

        let mut received = Vec::new();
        File::from(parent.stdout).read_to_end(&mut received).unwrap();
        assert_eq!(received, b"through the child");
        assert!(spawned.wait().unwrap().success());
    }
}
