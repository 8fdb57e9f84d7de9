//! Running external commands.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use super::ExecuteError;
use crate::util::path::relativize_command;

/// Run `cmd` through the shell, streaming its stdout to the process stdout.
///
/// The command line is echoed first, with absolute paths shortened against
/// the working directory.
pub async fn run_command(cmd: &str, shell: Option<&str>) -> Result<(), ExecuteError> {
  let mut out = tokio::io::stdout();
  run_command_to(cmd, shell, &mut out).await
}

/// Like [`run_command`], writing the echo and the child's stdout to `sink`.
pub async fn run_command_to<W>(cmd: &str, shell: Option<&str>, sink: &mut W) -> Result<(), ExecuteError>
where
  W: AsyncWrite + Unpin,
{
  let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
  let echo = relativize_command(cmd, &cwd);
  sink.write_all(format!("{echo}\n").as_bytes()).await?;
  sink.flush().await?;

  let (shell_cmd, shell_args) = get_shell(shell);
  debug!(shell = %shell_cmd, cmd = %cmd, "spawning process");

  let mut child = Command::new(&shell_cmd)
    .args(&shell_args)
    .arg(cmd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::inherit())
    .spawn()
    .map_err(|source| ExecuteError::Spawn {
      shell: shell_cmd.clone(),
      source,
    })?;

  if let Some(mut stdout) = child.stdout.take() {
    tokio::io::copy(&mut stdout, sink).await?;
    sink.flush().await?;
  }

  let status = child.wait().await?;
  if !status.success() {
    return Err(ExecuteError::CmdFailed {
      cmd: cmd.to_string(),
      code: status.code(),
    });
  }

  debug!(cmd = %cmd, "command finished");
  Ok(())
}

/// Shell program and the arguments that precede the command string.
///
/// Without an override this is `/bin/sh -c` on Unix and `cmd.exe /C` on
/// Windows. The user's `$SHELL` is not consulted.
pub fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C".to_string()])
  }
}
