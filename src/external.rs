//! External tool invocation. Every command is echoed to stdout before it
//! runs; with dry-run it is only echoed.

use std::fmt;
use std::process::{Output, Stdio};

use crate::error::VmmgrError;

/// A program plus its arguments, built up before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
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

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Whether any argument is exactly one of `flags` or `flag=value` for one of them.
    pub fn has_flag(&self, flags: &[&str]) -> bool {
        self.args.iter().any(|a| {
            flags.iter().any(|f| {
                a == f
                    || a
                        .strip_prefix(f)
                        .is_some_and(|rest| rest.starts_with('='))
            })
        })
    }

    fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for a in &self.args {
            write!(f, " {}", shell_quote(a))?;
        }
        Ok(())
    }
}

/// Quote `s` for a POSIX shell when it contains anything but safe characters.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ',' | '=' | ':' | '+' | '@' | '%')
        });
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Dispatches commands, or only prints them in dry-run mode.
#[derive(Debug, Clone, Copy)]
pub struct Runner {
    pub dry_run: bool,
}

impl Runner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Echo and run `cmd` with inherited stdio. A non-zero exit is an error.
    pub async fn run(&self, cmd: &ExternalCommand) -> Result<(), VmmgrError> {
        println!("{cmd}");
        if self.dry_run {
            return Ok(());
        }

        let status = cmd
            .to_tokio()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| VmmgrError::Io {
                context: format!("running {}", cmd.program()),
                source: e,
            })?;

        if !status.success() {
            return Err(VmmgrError::ExternalToolFailure {
                command: cmd.program().to_string(),
                status: status.to_string(),
            });
        }

        tracing::debug!(command = %cmd, "command finished");
        Ok(())
    }
}

/// Run `cmd` capturing stdout/stderr. Exit status is left to the caller.
pub async fn capture(cmd: &ExternalCommand) -> Result<Output, VmmgrError> {
    tracing::debug!(command = %cmd, "capturing output");
    cmd.to_tokio()
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| VmmgrError::Io {
            context: format!("running {}", cmd.program()),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_only_when_needed() {
        let cmd = ExternalCommand::new("virt-install")
            .args(["--name", "fedora-42-1"])
            .args(["--network", "bridge=virbr0"])
            .args(["--extra-args", "console=ttyS0 quiet"])
            .arg("it's");
        assert_eq!(
            cmd.to_string(),
            r"virt-install --name fedora-42-1 --network bridge=virbr0 --extra-args 'console=ttyS0 quiet' 'it'\''s'"
        );
    }

    #[test]
    fn empty_argument_is_quoted() {
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn has_flag_matches_plain_and_assignment_forms() {
        let cmd = ExternalCommand::new("virt-install").args(["--osinfo=fedora42"]);
        assert!(cmd.has_flag(&["--osinfo", "--os-variant"]));
        let cmd = ExternalCommand::new("virt-install").args(["--os-variant", "rhel9.4"]);
        assert!(cmd.has_flag(&["--osinfo", "--os-variant"]));
        let cmd = ExternalCommand::new("virt-install").args(["--osinfoX", "--name"]);
        assert!(!cmd.has_flag(&["--osinfo", "--os-variant"]));
    }

    #[tokio::test]
    async fn dry_run_does_not_execute() {
        let runner = Runner::new(true);
        let cmd = ExternalCommand::new("/nonexistent/tool").arg("x");
        runner.run(&cmd).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_external_tool_failure() {
        let runner = Runner::new(false);
        let cmd = ExternalCommand::new("false");
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, VmmgrError::ExternalToolFailure { .. }));
    }

    #[tokio::test]
    async fn capture_collects_stdout() {
        let out = capture(&ExternalCommand::new("echo").arg("hello")).await.unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }
}
