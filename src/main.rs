//! Monitor Profile - durable profile state for a game-state monitor
//!
//! Main entry point for the command line tool.
//!
//! # Execution Flow
//!
//! 1. Resolve settings (optional config file argument, then `MONITOR_PROFILE_*` variables)
//! 2. Initialize logging → `<logging.dir>/<logging.prefix>.<date>`
//! 3. Open the configured store (file or memory)
//! 4. Load the profile, seeding defaults on first run or corruption
//! 5. Print the profile as YAML with secrets redacted
//!
//! # Usage
//!
//! ```text
//! monitor-profile [CONFIG_FILE]
//! ```

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use monitor_profile::{APP_NAME, AppConfig, LoadOutcome, ProfileManager, VERSION, logging};

fn main() -> Result<()> {
    let config_file = std::env::args().nth(1).map(Utf8PathBuf::from);
    let config = AppConfig::load(config_file.as_deref())
        .context("Failed to load application configuration")?;

    // Guard must outlive every log statement
    let _log_guard = logging::setup_logging(&config.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("monitor-profile")
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    tracing::info!(
        "Opening profile at {} ({:?} backend)",
        config.profile_path,
        config.backend
    );
    let profile = ProfileManager::with_store(config.open_store());

    match profile.load().await {
        LoadOutcome::Loaded => tracing::info!("Profile loaded"),
        LoadOutcome::Recovered { reason, healed } => tracing::info!(
            "Profile seeded with defaults (reason: {:?}, written: {})",
            reason,
            healed
        ),
    }

    let snapshot = profile.snapshot()?;
    let rendered = serde_yaml_ng::to_string(&snapshot.redacted())
        .context("Failed to render profile as YAML")?;
    print!("{}", rendered);

    profile.metrics().log_summary();
    Ok(())
}
