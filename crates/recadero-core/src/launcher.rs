//! Process launch and stream multiplexing.
//!
//! One [`CommandLauncher::run_command`] call owns one set of pipes and one
//! child process from launch to exit-code retrieval. The call is fully
//! synchronous: pipe setup, the native launch, all stream draining, and
//! the exit-code query happen on the calling thread. There is no
//! cancellation and no timeout; a child that never closes its stdout and
//! stderr blocks the caller.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::OwnedFd;
use std::sync::Arc;

use crate::adapter::DistroAdapter;
use crate::config::{DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::encoding::TextEncoding;
use crate::error::{CommandError, CommandResult};
use crate::pipe::{ParentEnds, create_stdio_pipes};
use crate::types::{CommandExit, LaunchRequest, RequestId, StreamKind};

/// Executes commands inside distributions and relays their standard
/// streams to the caller, byte for byte and in arrival order.
pub struct CommandLauncher {
    adapter: Arc<dyn DistroAdapter>,
    buffer_size: usize,
}

impl CommandLauncher {
    /// Creates a launcher over the given platform adapter.
    #[must_use]
    pub fn new(adapter: Arc<dyn DistroAdapter>) -> Self {
        Self {
            adapter,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Sets the chunk size for pipe I/O, clamped to the supported minimum.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        self
    }

    /// Returns the effective chunk size.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Runs one command inside one distribution, synchronously.
    ///
    /// If `stdin` is supplied it is copied into the child in fixed-size
    /// chunks and the child's stdin is closed when the source is
    /// exhausted. Output is delivered through `on_stdout` and `on_stderr`,
    /// one invocation per chunk read, in arrival order; chunks delivered
    /// before a later failure are not revoked. Stdout is drained to
    /// end-of-stream before stderr is read at all; a child that fills the
    /// stderr pipe buffer while stdout is still open will block.
    ///
    /// # Errors
    /// - [`CommandError::InvalidArgument`] for an empty distribution id or
    ///   a blank command line, before any resource is acquired.
    /// - [`CommandError::NotRegistered`] if the platform does not know the
    ///   distribution, before any pipe is created.
    /// - [`CommandError::Setup`], [`CommandError::Launch`],
    ///   [`CommandError::Io`], [`CommandError::ExitCodeQuery`] per phase.
    ///   Every pipe end and the process handle are released on every exit
    ///   path.
    pub fn run_command(
        &self,
        request: &LaunchRequest,
        stdin: Option<&mut dyn Read>,
        mut on_stdout: impl FnMut(&[u8]),
        mut on_stderr: impl FnMut(&[u8]),
    ) -> CommandResult<CommandExit> {
        let request_id = RequestId::new();
        let span = tracing::debug_span!(
            "run_command",
            request = %request_id,
            distribution = %request.distribution(),
        );
        let _entered = span.enter();

        if request.distribution().trim().is_empty() {
            return Err(CommandError::invalid_argument("distribution id is required"));
        }
        if request.command_line().trim().is_empty() {
            return Err(CommandError::invalid_argument("command line is required"));
        }
        if !self.adapter.is_registered(request.distribution()) {
            return Err(CommandError::not_registered(request.distribution()));
        }

        let (parent, child) = create_stdio_pipes()?;
        let ParentEnds {
            stdin: stdin_write,
            stdout: stdout_read,
            stderr: stderr_read,
        } = parent;

        // The launch consumes the child-facing ends; once it returns, the
        // parent holds no copy of them and end-of-stream on stdout/stderr
        // becomes observable.
        let mut handle = self
            .adapter
            .launch(
                request.distribution(),
                request.command_line(),
                request.uses_current_working_directory(),
                child.stdin,
                child.stdout,
                child.stderr,
            )
            .map_err(CommandError::launch)?;

        tracing::debug!("child launched");

        let mut stdin_hold = None;
        let stdin_bytes_written = match stdin {
            Some(source) => self.copy_stdin(source, stdin_write)?,
            None => {
                // No input: the write end stays open while the output
                // streams drain, matching the reference behavior.
                stdin_hold = Some(stdin_write);
                0
            }
        };

        let stdout_bytes = self.drain_pipe(stdout_read, StreamKind::Stdout, &mut on_stdout)?;
        let stderr_bytes = self.drain_pipe(stderr_read, StreamKind::Stderr, &mut on_stderr)?;

        // Close the unused stdin end before reaping, so a child still
        // waiting on input can exit.
        drop(stdin_hold);
        let exit_code = handle
            .exit_code()
            .map_err(|source| CommandError::ExitCodeQuery { source })?;
        drop(handle);

        tracing::debug!(
            exit_code,
            stdin_bytes_written,
            stdout_bytes,
            stderr_bytes,
            "command completed"
        );

        Ok(CommandExit {
            exit_code,
            stdin_bytes_written,
        })
    }

    /// Runs a command and delivers its output as decoded text.
    ///
    /// The encoding of each output stream is sniffed from that stream's
    /// first chunk and pinned for the rest of the stream; streams with no
    /// recognizable signature decode as BOM-less UTF-8.
    ///
    /// # Errors
    /// Same contract as [`run_command`](Self::run_command).
    pub fn run_command_text(
        &self,
        request: &LaunchRequest,
        stdin: Option<&mut dyn Read>,
        mut on_stdout: impl FnMut(&str),
        mut on_stderr: impl FnMut(&str),
    ) -> CommandResult<CommandExit> {
        let mut stdout_encoding: Option<TextEncoding> = None;
        let mut stderr_encoding: Option<TextEncoding> = None;

        self.run_command(
            request,
            stdin,
            |chunk| {
                let encoding =
                    *stdout_encoding.get_or_insert_with(|| TextEncoding::detect(chunk));
                on_stdout(&encoding.decode(chunk));
            },
            |chunk| {
                let encoding =
                    *stderr_encoding.get_or_insert_with(|| TextEncoding::detect(chunk));
                on_stderr(&encoding.decode(chunk));
            },
        )
    }

    /// Runs a command and collects its decoded stdout into a string.
    /// Stderr is discarded.
    ///
    /// # Errors
    /// Same contract as [`run_command`](Self::run_command).
    pub fn capture_stdout(
        &self,
        request: &LaunchRequest,
        stdin: Option<&mut dyn Read>,
    ) -> CommandResult<(CommandExit, String)> {
        let mut output = String::new();
        let exit = self.run_command_text(request, stdin, |text| output.push_str(text), |_| {})?;
        Ok((exit, output))
    }

    /// Copies the caller's stream into the child's stdin in fixed-size
    /// chunks, returning the total bytes actually written. Consumes the
    /// write end; the child sees end-of-file when this returns.
    fn copy_stdin(&self, source: &mut dyn Read, fd: OwnedFd) -> CommandResult<u64> {
        let mut sink = File::from(fd);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CommandError::io(StreamKind::Stdin, e)),
            };

            let mut offset = 0;
            while offset < read {
                match sink.write(&buffer[offset..read]) {
                    Ok(0) => {
                        return Err(CommandError::io(
                            StreamKind::Stdin,
                            std::io::Error::from(ErrorKind::WriteZero),
                        ));
                    }
                    Ok(written) => {
                        offset += written;
                        total += written as u64;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                        // The child closed its stdin early; stop quietly
                        // with the tally of what it accepted.
                        tracing::debug!(total, "child closed stdin before input was exhausted");
                        return Ok(total);
                    }
                    Err(e) => return Err(CommandError::io(StreamKind::Stdin, e)),
                }
            }
        }

        Ok(total)
    }

    /// Drains one output pipe to end-of-stream, invoking the callback once
    /// per chunk actually read. A zero-byte read is the end-of-stream
    /// signal, never an error.
    fn drain_pipe(
        &self,
        fd: OwnedFd,
        stream: StreamKind,
        on_chunk: &mut dyn FnMut(&[u8]),
    ) -> CommandResult<u64> {
        let mut source = File::from(fd);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    total += n as u64;
                    on_chunk(&buffer[..n]);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(CommandError::io(stream, e)),
            }
        }

        Ok(total)
    }
}
