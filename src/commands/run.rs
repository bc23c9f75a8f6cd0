use anyhow::{Context, Result};
use fpsync::cockpit::Cockpit;
use fpsync::config::FpsyncConfigFile;
use fpsync::console::Console;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Interactive cockpit: reads console commands from stdin until EOF or Ctrl+C
pub async fn handle_run(config: FpsyncConfigFile) -> Result<()> {
    let cockpit = Cockpit::from_config(&config).await?;
    let mut console = Console::new(&cockpit)?;
    info!(
        "Cockpit ready with {} instruments, type 'help' for commands",
        cockpit.managers().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout
            .write_all(format!("{}> ", console.selected()).as_bytes())
            .await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for SIGINT signal")?;
                info!("Received SIGINT (Ctrl+C), shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match console.execute_line(&line).await {
            Ok(output) if output.is_empty() => {}
            Ok(output) => stdout.write_all(output.as_bytes()).await?,
            Err(e) => warn!("{:#}", e),
        }
    }

    Ok(())
}
