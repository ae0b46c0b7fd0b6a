//! `policygate status`: Show configuration and index status.

use policygate_config::AppConfig;
use policygate_core::{Layer, MetadataFilter};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let gate = super::runtime().await?;
    let config = gate.config();

    println!("PolicyGate Status");
    println!("=================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Data dir:     {}", config.storage.data_dir().display());
    println!("  Backend:      {}", config.storage.backend);
    println!("  Embedder:     {} ({} dims)", config.embedding.provider, config.embedding.dimensions);
    println!("  Chunking:     {} chars, {} overlap", config.chunking.size, config.chunking.overlap);
    println!("  k per layer:  {}", config.retrieval.k_per_layer);

    println!("\n  Chunks per layer:");
    for layer in Layer::ALL {
        let total = gate.store().count(layer, &MetadataFilter::new()).await?;
        let active = gate
            .store()
            .count(layer, &policygate_retrieval::scope::active_only())
            .await?;
        println!("    {:<14} {total:>5} ({active} active)", layer.as_str());
    }

    let latest = gate.registry().latest().await?;
    let active = latest.iter().filter(|r| r.is_active()).count();
    println!("\n  Policies:     {} ({active} active)", latest.len());

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("\n  ⚠️  No config file, run `policygate init` first");
    }
    if active == 0 {
        println!("  ⚠️  No active policy; case retrieval will be refused");
    }

    Ok(())
}
