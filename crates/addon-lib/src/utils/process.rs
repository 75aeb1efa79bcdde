use crate::build::BuildError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Extension trait for spawning toolchain processes the same way on every
/// platform.
pub trait AddonCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

impl AddonCommandExt for Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Render a command line for logs and `print-*` commands
pub fn format_command(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{}\"", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_command(command: &[String]) -> Result<Command, BuildError> {
    let (program, args) = command.split_first().ok_or_else(|| BuildError::Spawn {
        program: String::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
    })?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Run `command` to completion with inherited stdio, or with all output
/// discarded when `silent` is set.
pub async fn run(command: &[String], cwd: Option<&Path>, silent: bool) -> Result<(), BuildError> {
    let mut cmd = build_command(command)?;
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if silent {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
    }

    log::info!("RUN {}", format_command(command));
    let status = cmd.status().await.map_err(|source| BuildError::Spawn {
        program: command[0].clone(),
        source,
    })?;

    if !status.success() {
        return Err(BuildError::ProcessFailed {
            command: format_command(command),
            status: describe(status),
            output: String::new(),
        });
    }
    Ok(())
}

/// Run `command` and return its stdout. On failure the error carries
/// whatever the process printed.
pub async fn capture(command: &[String]) -> Result<String, BuildError> {
    let mut cmd = build_command(command)?;
    cmd.suppress_console()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    log::debug!("Executing: {}", format_command(command));
    let output = cmd.output().await.map_err(|source| BuildError::Spawn {
        program: command[0].clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let shown = if stdout.trim().is_empty() { stderr.into_owned() } else { stdout };
        return Err(BuildError::ProcessFailed {
            command: format_command(command),
            status: describe(output.status),
            output: format!("\n{}", shown.trim_end()),
        });
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn quotes_arguments_with_spaces() {
        assert_eq!(
            format_command(&argv(&["cmake", "-G", "Unix Makefiles", ""])),
            "cmake -G \"Unix Makefiles\" \"\""
        );
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        assert!(matches!(run(&[], None, true).await, Err(BuildError::Spawn { .. })));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = capture(&argv(&["definitely-not-a-real-program-4711"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_reports_failures() {
        let out = capture(&argv(&["sh", "-c", "echo hello"])).await.unwrap();
        assert_eq!(out.trim(), "hello");

        let err = capture(&argv(&["sh", "-c", "echo broken >&2; exit 3"]))
            .await
            .unwrap_err();
        match err {
            BuildError::ProcessFailed { status, output, .. } => {
                assert_eq!(status, "exit code 3");
                assert!(output.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = run(&argv(&["sh", "-c", "exit 1"]), None, true).await.unwrap_err();
        assert!(matches!(err, BuildError::ProcessFailed { .. }));
    }
}
