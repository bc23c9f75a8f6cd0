use anyhow::{Context, Result};
use fpsync::cockpit::Cockpit;
use fpsync::config::FpsyncConfigFile;
use fpsync::console::Console;
use std::path::Path;
use tracing::info;

/// Run a file of console commands, stopping at the first failing line
pub async fn handle_script(config: FpsyncConfigFile, script: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("Failed to read {:?}", script))?;

    let cockpit = Cockpit::from_config(&config).await?;
    let mut console = Console::new(&cockpit)?;
    info!("Running {} against {} instruments", script.display(), cockpit.managers().len());

    for (number, line) in contents.lines().enumerate() {
        let output = console
            .execute_line(line)
            .await
            .with_context(|| format!("{}:{}: {}", script.display(), number + 1, line.trim()))?;
        if !output.is_empty() {
            print!("{output}");
        }
    }

    Ok(())
}
