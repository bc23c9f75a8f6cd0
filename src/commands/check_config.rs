use anyhow::Result;
use fpsync::config::FpsyncConfigFile;
use fpsync::navdata::NavDatabase;
use std::path::Path;

/// Validate the config and navdata without starting any instrument
pub fn handle_check_config(config: &FpsyncConfigFile, path: &Path) -> Result<()> {
    NavDatabase::load(&config.navdata)?;

    println!("{}: ok", path.display());
    println!("  transport: {}", config.transport);
    if config.transport == fpsync::config::TransportKind::Nats {
        println!("  nats url:  {}", config.nats_url());
        println!(
            "  subject:   {}",
            fpsync::sync::sync_subject(config.subject_prefix.as_deref())
        );
    }
    println!("  navdata:   {}", config.navdata.display());
    for instrument in &config.instruments {
        println!(
            "  {:<8} {}",
            instrument.id,
            if instrument.master { "master" } else { "follower" }
        );
    }
    Ok(())
}
