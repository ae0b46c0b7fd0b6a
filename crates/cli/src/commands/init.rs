//! `policygate init`: Write a default config and create the data directory.

use policygate_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("PolicyGate Setup");
    println!("==================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config file exists, leaving it untouched: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Wrote default config: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let layers_dir = config.storage.layers_dir();
    std::fs::create_dir_all(&layers_dir)?;
    println!("✅ Data directory: {}", config.storage.data_dir().display());

    println!("\nNext steps:");
    println!("  policygate ingest policy.txt --layer base_policy --version 2024-01-01 --status active");
    println!("  policygate retrieve --state <STATE> --sector <SECTOR>");

    Ok(())
}
