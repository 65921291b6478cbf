use tokio::process::Command;
use tracing::info;

/// Protected work for a config-file task: run `command` through `sh -c`.
/// A task without a command only logs that it fired.
pub async fn run_command(task: String, command: Option<String>) -> anyhow::Result<()> {
    let Some(command) = command else {
        info!("Task {} fired (no command configured)", task);
        return Ok(());
    };

    info!("Task {}: running `{}`", task, command);
    let status = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to spawn `{}`: {}", command, e))?;

    if !status.success() {
        anyhow::bail!("`{}` exited with {}", command, status);
    }
    Ok(())
}
