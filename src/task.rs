//! A child process template, bound to one concrete `{bind_id}` value, and the machinery to
//! spawn it with its channels wired up.

use crate::channel::{Channel, InheritedFd, Mode, StdStream, clear_cloexec};
use crate::error::InvalidTemplate;
use crate::process::ChildGuard;
use anyhow::{Context, Result};
use nonempty::NonEmpty;
use std::collections::HashMap;
use std::os::fd::AsFd;
use std::process::Command;

/// How a task's argv is expressed before template substitution.
#[derive(Clone, Debug)]
pub enum Args {
    /// A single string, split with shell-style quoting rules at bind time.
    Shell(String),
    /// An explicit argument vector; each element is substituted independently.
    Argv(NonEmpty<String>),
}

/// The unbound description of one child process, shared by every bound [`Task`] the Coordinator
/// spawns from it.
#[derive(Clone, Debug)]
pub struct TaskTemplate {
    pub executable: String,
    pub args: Args,
    /// Side channels keyed by name; each becomes an environment variable naming its FD in the
    /// child. Stdin/stdout/stderr are configured separately via `stdin`/`stdout`/`stderr`.
    pub side_channels: HashMap<String, SideChannelSpec>,
}

/// Describes one side channel before it is instantiated into a live [`Channel`].
#[derive(Clone, Debug)]
pub enum SideChannelSpec {
    AnonymousPipe,
    Path(String),
}

/// One bound, about-to-spawn (or spawned) child process.
pub struct Task {
    pub executable: String,
    pub argv: Vec<String>,
    pub stdin: Channel,
    pub stdout: Channel,
    pub stderr: Channel,
    pub side_channels: HashMap<String, Channel>,
    pub child: Option<ChildGuard>,
}

/// Substitutes every `{key}` occurrence in `template` with `bind[key]`.
///
/// # Errors
///
/// Returns an error if `template` names a key absent from `bind`.
pub fn substitute(template: &str, bind: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            return Err(InvalidTemplate {
                template: template.to_string(),
                key: "<unterminated>".to_string(),
            }
            .into());
        };
        let close = open + close;
        out.push_str(&rest[..open]);
        let key = &rest[open + 1..close];
        let value = bind.get(key).ok_or_else(|| InvalidTemplate {
            template: template.to_string(),
            key: key.to_string(),
        })?;
        out.push_str(value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

impl TaskTemplate {
    /// Binds this template to one concrete value, substituting `bind` into the executable,
    /// every argument, and every path-based side channel.
    ///
    /// # Errors
    ///
    /// Returns an error if any template string references a key absent from `bind`.
    pub fn bind(&self, bind: &HashMap<String, String>) -> Result<Task> {
        let executable = substitute(&self.executable, bind)?;
        let argv = match &self.args {
            Args::Shell(s) => {
                let formatted = substitute(s, bind)?;
                shlex::split(&formatted)
                    .with_context(|| format!("Error splitting shell arguments {formatted:?}"))?
            }
            Args::Argv(items) => items
                .iter()
                .map(|item| substitute(item, bind))
                .collect::<Result<Vec<_>>>()?,
        };

        let mut side_channels = HashMap::with_capacity(self.side_channels.len());
        for (name, spec) in &self.side_channels {
            let channel = match spec {
                SideChannelSpec::AnonymousPipe => Channel::anonymous_pipe(),
                SideChannelSpec::Path(path) => {
                    let mut channel = Channel::path(path.clone().into());
                    channel.substitute_path(bind)?;
                    channel
                }
            };
            side_channels.insert(name.clone(), channel);
        }

        Ok(Task {
            executable,
            argv,
            stdin: Channel::inherited_stdio(StdStream::Stdin),
            stdout: Channel::inherited_stdio(StdStream::Stdout),
            stderr: Channel::inherited_stdio(StdStream::Stderr),
            side_channels,
            child: None,
        })
    }
}

impl Task {
    /// Replaces the default inherited-stdio stdin channel, e.g. with an anonymous pipe a Worker
    /// writes into directly instead of going through the common queue's single stdin.
    pub fn set_stdin(&mut self, channel: Channel) {
        self.stdin = channel;
    }

    /// Allocates kernel/filesystem resources for every channel this task owns.
    ///
    /// # Errors
    ///
    /// Returns an error if any channel's `create()` fails.
    pub fn create_channels(&mut self) -> Result<()> {
        self.stdin.create()?;
        self.stdout.create()?;
        self.stderr.create()?;
        for channel in self.side_channels.values_mut() {
            channel.create()?;
        }
        Ok(())
    }

    /// Spawns the child process, wiring every channel's child-side endpoint and binding every
    /// channel's parent-side `io`.
    ///
    /// `modes` may override the default [`Mode`] for any channel by name (`"stdin"`, `"stdout"`,
    /// `"stderr"`, or a side-channel name); channels absent from `modes` use their default.
    ///
    /// # Errors
    ///
    /// Returns an error if spawning the process fails, or if any channel's endpoint cannot be
    /// constructed.
    pub fn start(&mut self, modes: &HashMap<String, Mode>) -> Result<()> {
        let stdin_mode = modes.get("stdin").copied().unwrap_or_else(Mode::stdin_default);
        let stdout_mode = modes
            .get("stdout")
            .copied()
            .unwrap_or_else(Mode::output_default);
        let stderr_mode = modes
            .get("stderr")
            .copied()
            .unwrap_or_else(Mode::output_default);

        let mut command = Command::new(&self.executable);
        command.args(&self.argv);
        command.stdin(self.stdin.std_endpoint(stdin_mode.child)?);
        command.stdout(self.stdout.std_endpoint(stdout_mode.child)?);
        command.stderr(self.stderr.std_endpoint(stderr_mode.child)?);

        // Side channels: fds inherited across fork+exec by not being close-on-exec, with their
        // number communicated to the child via an environment variable of the channel's name.
        let mut keep_alive: Vec<InheritedFd> = Vec::with_capacity(self.side_channels.len());
        for (name, channel) in &self.side_channels {
            let mode = modes.get(name).copied().unwrap_or_else(Mode::side_default);
            let inherited = channel.side_fd(mode.child)?;
            clear_cloexec_for(&inherited)?;
            command.env(name, inherited.raw().to_string());
            keep_alive.push(inherited);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Error spawning process {:?}", self.executable))?;
        drop(keep_alive);

        self.stdin.open_parent(stdin_mode, Some(&mut child))?;
        self.stdout.open_parent(stdout_mode, Some(&mut child))?;
        self.stderr.open_parent(stderr_mode, Some(&mut child))?;
        for (name, channel) in &mut self.side_channels {
            let mode = modes.get(name).copied().unwrap_or_else(Mode::side_default);
            channel.open_parent(mode, None)?;
        }

        self.child = Some(ChildGuard { child });
        Ok(())
    }

    /// Takes the bound parent-side writer for `name`, which must be `"stdin"` or a side channel
    /// name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is unknown, or its channel's io is not writable/not yet bound.
    pub fn take_writer(&mut self, name: &str) -> Result<Box<dyn std::io::Write + Send>> {
        if name == "stdin" {
            return self.stdin.take_writer();
        }
        self.side_channels
            .get_mut(name)
            .with_context(|| format!("Unknown channel {name:?}"))?
            .take_writer()
    }

    /// Names every channel a Worker may write into: `"stdin"` plus every side channel.
    #[must_use]
    pub fn writable_channel_names(&self) -> Vec<String> {
        let mut names = vec!["stdin".to_string()];
        names.extend(self.side_channels.keys().cloned());
        names
    }
}

fn clear_cloexec_for(inherited: &InheritedFd) -> Result<()> {
    match inherited {
        InheritedFd::Borrowed(fd) => clear_cloexec_raw(*fd),
        InheritedFd::Owned(file) => clear_cloexec(&file.as_fd()),
    }
}

fn clear_cloexec_raw(fd: std::os::fd::RawFd) -> Result<()> {
    use std::os::fd::BorrowedFd;
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    clear_cloexec(&borrowed)
}
