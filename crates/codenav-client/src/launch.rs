//! Opaque launch descriptors for language-server child processes.

use std::path::PathBuf;
use std::process::{Command, Stdio};

/// How to start a language server.
///
/// Supplied by the caller and treated as-is: codenav never edits the argv,
/// never filters the environment, and never guesses a working directory.
#[derive(Debug, Clone)]
pub struct LaunchDescriptor {
    /// Full argv; `command[0]` is the executable.
    pub command: Vec<String>,
    /// Working directory for the child, normally the repository root.
    pub working_dir: PathBuf,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchDescriptor {
    /// Descriptor with the given argv and working directory and no
    /// environment overrides.
    pub fn new(command: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self { command, working_dir: working_dir.into(), env: Vec::new() }
    }

    /// Build the `Command` with piped stdio.
    pub(crate) fn to_command(&self) -> std::io::Result<Command> {
        let program = self.command.first().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty launch command")
        })?;
        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        let descriptor = LaunchDescriptor::new(Vec::new(), ".");
        assert!(descriptor.to_command().is_err());
    }

    #[test]
    fn argv_and_env_are_preserved() {
        let mut descriptor =
            LaunchDescriptor::new(vec!["server".into(), "--stdio".into()], "/tmp");
        descriptor.env.push(("RUST_LOG".into(), "debug".into()));
        let cmd = descriptor.to_command().unwrap();
        assert_eq!(cmd.get_program(), "server");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["--stdio"]);
    }
}
