//! Polymorphic parent/child I/O endpoints.
//!
//! A [`Channel`] is a handle to one unidirectional byte stream between the parent process and
//! one child: a tagged sum of four variants, each supporting three operations:
//! [`Channel::create`], [`Channel::std_endpoint`]/[`Channel::side_fd`] (the two concrete shapes
//! `child_endpoint` takes depending on whether the channel is one of the three standard streams
//! or a side channel), and [`Channel::open_parent`].

use anyhow::{Context, Result, bail};
use nix::fcntl::{FcntlArg, FdFlag};
use nix::unistd::pipe;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::process::{Child, Stdio};

/// A channel's bound `io` exists but does not expose a write operation (e.g. `stdout`/`stderr`
/// in their default, parent-reads configuration). Distinct from "not yet bound" so callers can
/// tell the two failure modes apart.
#[derive(Debug)]
pub struct NotWritable;

impl fmt::Display for NotWritable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel io has no write operation")
    }
}

impl std::error::Error for NotWritable {}

/// Which way data flows across one end of a [`Channel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// This side writes into the stream.
    Writes,
    /// This side reads from the stream.
    Reads,
}

/// How each side of a channel opens its end.
#[derive(Clone, Copy, Debug)]
pub struct Mode {
    pub parent: Direction,
    pub child: Direction,
}

impl Mode {
    /// `stdin`'s default: parent writes, child reads.
    #[must_use]
    pub const fn stdin_default() -> Self {
        Self {
            parent: Direction::Writes,
            child: Direction::Reads,
        }
    }

    /// `stdout`/`stderr`'s default: parent reads, child writes.
    #[must_use]
    pub const fn output_default() -> Self {
        Self {
            parent: Direction::Reads,
            child: Direction::Writes,
        }
    }

    /// A side channel's default: parent writes, child reads (same shape as stdin).
    #[must_use]
    pub const fn side_default() -> Self {
        Self::stdin_default()
    }
}

/// One of the three standard process streams, used by the [`Channel::InheritedStdio`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

/// The parent-side handle a [`Channel`] resolves to once the child is spawned.
///
/// Kept as a small enum, rather than collapsing everything into `std::fs::File`, because the
/// three inherited standard streams are distinct types in `std::process::Child` (only
/// `ChildStdin` is writable) and a Writer must be told at the type level that a channel bound to
/// `stdout`/`stderr` cannot be written to.
pub enum ChannelIo {
    Stdin(std::process::ChildStdin),
    Stdout(std::process::ChildStdout),
    Stderr(std::process::ChildStderr),
    File(File),
}

impl ChannelIo {
    /// Converts into a boxed writer, for channels the Coordinator's Writers write into.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is `stdout` or `stderr`, which are parent-reads in their
    /// default configuration and therefore not writable.
    pub fn into_writer(self) -> Result<Box<dyn Write + Send>> {
        match self {
            Self::Stdin(io) => Ok(Box::new(io)),
            Self::File(io) => Ok(Box::new(io)),
            Self::Stdout(_) | Self::Stderr(_) => Err(NotWritable.into()),
        }
    }
}

/// A value to keep alive in the parent until after the child is spawned, so its file descriptor
/// remains valid for the child to inherit.
///
/// `Borrowed` fds are owned by some other `Channel` field and must stay alive there; `Owned`
/// fds (from opening a [`Channel::Path`] for the child) are owned by this value directly.
pub enum InheritedFd {
    Borrowed(RawFd),
    Owned(File),
}

impl InheritedFd {
    #[must_use]
    pub fn raw(&self) -> RawFd {
        match self {
            Self::Borrowed(fd) => *fd,
            Self::Owned(file) => file.as_raw_fd(),
        }
    }
}

/// A handle to one unidirectional byte stream between the parent and one child.
pub enum Channel {
    /// A pipe the spawn primitive itself creates for one of {stdin, stdout, stderr}.
    InheritedStdio {
        stream: StdStream,
        io: Option<ChannelIo>,
    },
    /// A kernel pipe pair allocated up front; one end is inherited by the child, the other is
    /// kept (and the child's end closed) by the parent after spawn.
    AnonymousPipe {
        read_end: Option<OwnedFd>,
        write_end: Option<OwnedFd>,
        io: Option<ChannelIo>,
    },
    /// A pre-existing open stream; the child inherits the same underlying file description.
    Handle { fd: OwnedFd, io: Option<ChannelIo> },
    /// A filesystem location; `create()` truncates/creates it, spawn opens a child-side FD on
    /// it, and the parent opens an independent handle when it needs to write.
    Path {
        path: PathBuf,
        io: Option<ChannelIo>,
    },
}

impl Channel {
    #[must_use]
    pub fn inherited_stdio(stream: StdStream) -> Self {
        Self::InheritedStdio { stream, io: None }
    }

    #[must_use]
    pub fn anonymous_pipe() -> Self {
        Self::AnonymousPipe {
            read_end: None,
            write_end: None,
            io: None,
        }
    }

    #[must_use]
    pub fn handle(fd: OwnedFd) -> Self {
        Self::Handle { fd, io: None }
    }

    #[must_use]
    pub fn path(path: PathBuf) -> Self {
        Self::Path { path, io: None }
    }

    /// Substitutes `bind` into this channel's path, if it is a [`Channel::Path`].
    ///
    /// # Errors
    ///
    /// Returns an error if the path names a substitution key missing from `bind`.
    pub fn substitute_path(&mut self, bind: &std::collections::HashMap<String, String>) -> Result<()> {
        if let Self::Path { path, .. } = self {
            let formatted = crate::task::substitute(&path.to_string_lossy(), bind)?;
            *path = PathBuf::from(formatted);
        }
        Ok(())
    }

    /// Allocates any kernel/filesystem resources required before spawn.
    ///
    /// # Errors
    ///
    /// Returns an error if creating the underlying pipe or file fails.
    pub fn create(&mut self) -> Result<()> {
        match self {
            Self::InheritedStdio { .. } | Self::Handle { .. } => Ok(()),
            Self::AnonymousPipe {
                read_end,
                write_end,
                ..
            } => {
                let (r, w) = pipe().context("Error creating anonymous pipe")?;
                *read_end = Some(r);
                *write_end = Some(w);
                Ok(())
            }
            Self::Path { path, .. } => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).context(format!(
                            "Failed to create parent directories for channel path {}",
                            path.display()
                        ))?;
                    }
                }
                OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(path)
                    .context(format!("Failed to create channel path {}", path.display()))?;
                Ok(())
            }
        }
    }

    /// Builds the [`Stdio`] the spawn primitive must receive to wire this channel to the child,
    /// for use as one of the three standard streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel has not been [`Channel::create`]d yet (for anonymous
    /// pipes), or if opening a handle/path fails.
    pub fn std_endpoint(&mut self, child_mode: Direction) -> Result<Stdio> {
        match self {
            Self::InheritedStdio { .. } => Ok(Stdio::piped()),
            Self::AnonymousPipe {
                read_end,
                write_end,
                ..
            } => {
                let fd = match child_mode {
                    Direction::Reads => read_end.take(),
                    Direction::Writes => write_end.take(),
                }
                .context("Channel.create() must run before child_endpoint")?;
                Ok(Stdio::from(fd))
            }
            Self::Handle { fd, .. } => {
                let clone = fd.try_clone().context("Error duplicating handle fd")?;
                Ok(Stdio::from(clone))
            }
            Self::Path { path, .. } => {
                let file = open_for_direction(path, child_mode)
                    .context(format!("Error opening channel path {}", path.display()))?;
                Ok(Stdio::from(file))
            }
        }
    }

    /// Computes the child-side FD for a side channel and something to keep alive in the parent
    /// until spawn completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is [`Channel::InheritedStdio`] (only valid for the three
    /// standard streams) or if `create()` has not run yet.
    pub fn side_fd(&self, child_mode: Direction) -> Result<InheritedFd> {
        match self {
            Self::InheritedStdio { .. } => {
                bail!("InheritedStdio cannot be used as a side channel")
            }
            Self::AnonymousPipe {
                read_end,
                write_end,
                ..
            } => {
                let fd = match child_mode {
                    Direction::Reads => read_end.as_ref(),
                    Direction::Writes => write_end.as_ref(),
                }
                .context("Channel.create() must run before child_endpoint")?;
                Ok(InheritedFd::Borrowed(fd.as_raw_fd()))
            }
            Self::Handle { fd, .. } => Ok(InheritedFd::Borrowed(fd.as_raw_fd())),
            Self::Path { path, .. } => {
                let file = open_for_direction(path, child_mode)
                    .context(format!("Error opening channel path {}", path.display()))?;
                Ok(InheritedFd::Owned(file))
            }
        }
    }

    /// Binds `io` to the parent-side endpoint after the child has been spawned.
    ///
    /// `child` must be `Some` when this channel is one of the three standard streams and is an
    /// [`Channel::InheritedStdio`]; it is unused otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the inherited-stdio handle was already taken from `child`, or if
    /// opening the parent side of a handle/path/pipe fails.
    pub fn open_parent(&mut self, mode: Mode, child: Option<&mut Child>) -> Result<()> {
        match self {
            Self::InheritedStdio { stream, io } => {
                let child = child.context("InheritedStdio channel requires the spawned child")?;
                *io = Some(match stream {
                    StdStream::Stdin => ChannelIo::Stdin(
                        child.stdin.take().context("Error taking child stdin")?,
                    ),
                    StdStream::Stdout => ChannelIo::Stdout(
                        child.stdout.take().context("Error taking child stdout")?,
                    ),
                    StdStream::Stderr => ChannelIo::Stderr(
                        child.stderr.take().context("Error taking child stderr")?,
                    ),
                });
                Ok(())
            }
            Self::AnonymousPipe {
                read_end,
                write_end,
                io,
            } => {
                let (parent_end, other_end) = match mode.parent {
                    Direction::Reads => (read_end.take(), write_end.take()),
                    Direction::Writes => (write_end.take(), read_end.take()),
                };
                let parent_end = parent_end.context("Channel.create() must run before open_parent")?;
                // Close the child's end in the parent; the child holds its own copy from fork().
                drop(other_end);
                *io = Some(ChannelIo::File(File::from(parent_end)));
                Ok(())
            }
            Self::Handle { fd, io } => {
                let clone = fd.try_clone().context("Error duplicating handle fd")?;
                *io = Some(ChannelIo::File(File::from(clone)));
                Ok(())
            }
            Self::Path { path, io } => {
                let file = open_for_direction(path, mode.parent)
                    .context(format!("Error opening channel path {}", path.display()))?;
                *io = Some(ChannelIo::File(file));
                Ok(())
            }
        }
    }

    /// Takes the bound parent-side `io`, converting it into a boxed writer.
    ///
    /// # Errors
    ///
    /// Returns an error if `io` has not been bound yet, or is not writable.
    pub fn take_writer(&mut self) -> Result<Box<dyn Write + Send>> {
        let io = match self {
            Self::InheritedStdio { io, .. }
            | Self::AnonymousPipe { io, .. }
            | Self::Handle { io, .. }
            | Self::Path { io, .. } => io.take(),
        };
        io.context("channel io has not been bound; call open_parent() first")?
            .into_writer()
    }
}

fn open_for_direction(path: &PathBuf, direction: Direction) -> std::io::Result<File> {
    match direction {
        Direction::Reads => OpenOptions::new().read(true).open(path),
        Direction::Writes => OpenOptions::new().write(true).open(path),
    }
}

/// Clears `FD_CLOEXEC` on `fd` so it survives across `exec` into the child.
///
/// Pipes created via [`pipe`] are not close-on-exec by default, but handles opened through
/// `std::fs` always are, so this must run before spawn for [`Channel::Handle`]/[`Channel::Path`]
/// side channels.
///
/// # Errors
///
/// Returns an error if the `fcntl` call fails.
pub fn clear_cloexec(fd: &impl AsFd) -> Result<()> {
    nix::fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
        .context("Error clearing FD_CLOEXEC")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::FromRawFd;
    use tempfile::NamedTempFile;

    mod channel_io {
        use super::*;

        #[test]
        fn stdout_into_writer_is_not_writable() {
            let mut child = std::process::Command::new("/bin/cat")
                .stdout(Stdio::piped())
                .spawn()
                .unwrap();
            let stdout = child.stdout.take().unwrap();
            let err = ChannelIo::Stdout(stdout).into_writer().unwrap_err();
            assert!(err.downcast_ref::<NotWritable>().is_some());
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    mod anonymous_pipe {
        use super::*;

        #[test]
        fn create_then_open_round_trips_bytes() {
            let mut channel = Channel::anonymous_pipe();
            channel.create().unwrap();

            // Child reads, parent writes (the side-channel default).
            let child_fd = channel.side_fd(Direction::Reads).unwrap();
            assert!(child_fd.raw() >= 0);
            // Take our own copy of the "child" fd before open_parent closes its view of it.
            let child_fd_dup = nix::unistd::dup(child_fd.raw()).unwrap();

            channel.open_parent(Mode::side_default(), None).unwrap();
            let mut writer = channel.take_writer().unwrap();
            writer.write_all(b"hello").unwrap();
            writer.flush().unwrap();
            drop(writer);

            let mut file = unsafe { File::from_raw_fd(child_fd_dup) };
            let mut buf = [0; 5];
            file.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"hello");
        }
    }

    mod path_channel {
        use super::*;

        #[test]
        fn create_truncates_and_parent_can_write() {
            let temp = NamedTempFile::new().unwrap();
            std::fs::write(temp.path(), b"stale content").unwrap();

            let mut channel = Channel::path(temp.path().to_path_buf());
            channel.create().unwrap();
            assert_eq!(std::fs::read(temp.path()).unwrap(), b"");

            channel.open_parent(Mode::side_default(), None).unwrap();
            let mut writer = channel.take_writer().unwrap();
            writer.write_all(b"fresh").unwrap();
            writer.flush().unwrap();
            drop(writer);

            assert_eq!(std::fs::read(temp.path()).unwrap(), b"fresh");
        }

        #[test]
        fn substitute_path_formats_bind_key() {
            let mut channel = Channel::path(PathBuf::from("/tmp/{id}.out"));
            let mut bind = std::collections::HashMap::new();
            bind.insert("id".to_string(), "3".to_string());
            channel.substitute_path(&bind).unwrap();
            match channel {
                Channel::Path { path, .. } => assert_eq!(path, PathBuf::from("/tmp/3.out")),
                _ => unreachable!(),
            }
        }
    }
}
