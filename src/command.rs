//! External process capability.
//!
//! Every program this tool drives (`ssh`, `rsync`, `gcloud`, the browser) is
//! started through [`CommandRunner`], so the session logic can be exercised
//! against a fake without spawning anything.

use async_trait::async_trait;
use std::{fmt, io, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `sh -c <script>`; used where flags arrive as a single user string.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Result of executing a command with captured output
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, the way a shell would show them.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with stdout/stderr captured.
    async fn output(&self, command: &CommandLine) -> io::Result<CommandResult>;

    /// Run to completion with stdout/stderr on the terminal, optionally
    /// feeding `stdin` to the child. Returns the exit code.
    async fn run(&self, command: &CommandLine, stdin: Option<&str>) -> io::Result<i32>;

    /// Start without waiting. All three streams are inherited from the
    /// controlling terminal so interactive prompts reach the user.
    fn spawn(&self, command: &CommandLine) -> io::Result<Box<dyn ChildProcess>>;
}

/// A started child process.
#[async_trait]
pub trait ChildProcess: Send {
    async fn wait(&mut self) -> io::Result<i32>;

    fn start_kill(&mut self) -> io::Result<()>;
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    // Killed by a signal on unix.
    status.code().unwrap_or(-1)
}

/// Runs commands as real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, command: &CommandLine) -> io::Result<CommandResult> {
        log::debug!("exec (captured): {}", command);
        let output = command.to_command().stdin(Stdio::null()).output().await?;
        Ok(CommandResult {
            exit_code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run(&self, command: &CommandLine, stdin: Option<&str>) -> io::Result<i32> {
        log::debug!("exec: {}", command);
        let mut cmd = command.to_command();
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
            // Closing the pipe lets the remote shell see EOF.
            drop(pipe);
        }
        let status = child.wait().await?;
        Ok(exit_code(status))
    }

    fn spawn(&self, command: &CommandLine) -> io::Result<Box<dyn ChildProcess>> {
        log::debug!("spawn: {}", command);
        let child = command
            .to_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(Box::new(SystemChild(child)))
    }
}

struct SystemChild(tokio::process::Child);

#[async_trait]
impl ChildProcess for SystemChild {
    async fn wait(&mut self) -> io::Result<i32> {
        let status = self.0.wait().await?;
        Ok(exit_code(status))
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }
}
