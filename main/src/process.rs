use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::process::Command;

/// Runs `command`, feeding `script` to its standard input, and returns its standard output.
pub async fn eval(command: &str, args: &[&str], script: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let mut process = spawn(command, args, Stdio::piped())?;

    let mut stdin = process.stdin.take().ok_or(ProcessError::RedirectStdIo)?;
    stdin.write_all(script).await?;
    drop(stdin);

    collect_output(command, process).await
}

/// Runs `command` and returns its standard output.
pub async fn run(command: &str, args: &[&str]) -> Result<Vec<u8>, ProcessError> {
    let process = spawn(command, args, Stdio::null())?;
    collect_output(command, process).await
}

/// Checks whether `command` exists and exits successfully with `args`.
pub async fn probe(command: &str, args: &[&str]) -> bool {
    match run(command, args).await {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Probing command `{}` failed: {}", command, e);
            false
        }
    }
}

fn spawn(command: &str, args: &[&str], stdin: Stdio) -> Result<Child, ProcessError> {
    Command::new(command)
        .args(args)
        .env("NO_COLOR", "1")
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(ProcessError::Spawn)
}

async fn collect_output(command: &str, mut process: Child) -> Result<Vec<u8>, ProcessError> {
    let mut stdout = process.stdout.take().ok_or(ProcessError::RedirectStdIo)?;

    // Drain before waiting, a full pipe blocks the child.
    let mut output = Vec::default();
    stdout.read_to_end(&mut output).await?;

    let status = process.wait().await?;
    if !status.success() {
        return Err(ProcessError::ExternalCommand(command.into()));
    }
    Ok(output)
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to create a child process")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to communicate with a child process")]
    Io(#[from] std::io::Error),

    #[error("Failed to redirect standard I/O")]
    RedirectStdIo,

    #[error("External command `{0}` failed")]
    ExternalCommand(String),
}
