//! `policygate ingest`: Chunk and index a policy document.

use policygate_core::{Layer, PolicyStatus};
use policygate_retrieval::IngestRequest;
use std::path::PathBuf;

pub struct IngestArgs {
    pub file: PathBuf,
    pub layer: String,
    pub state: String,
    pub sector: String,
    pub version: String,
    pub status: String,
    pub doc_name: Option<String>,
}

pub async fn run(args: IngestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let layer: Layer = args.layer.parse()?;
    let status: PolicyStatus = args.status.parse()?;
    let text = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("Failed to read {}: {e}", args.file.display()))?;
    let doc_name = args.doc_name.unwrap_or_else(|| {
        args.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.file.display().to_string())
    });

    let gate = super::runtime().await?;
    let report = gate
        .ingestor()?
        .ingest(IngestRequest {
            layer,
            state: args.state,
            sector: args.sector,
            version: args.version,
            status,
            doc_name,
            text,
        })
        .await?;

    println!("✅ Ingested {}", report.policy_id);
    println!("   Layer:   {}", report.layer);
    println!("   Status:  {}", report.status);
    println!("   Chunks:  {}", report.chunk_count);
    if report.status == PolicyStatus::Draft {
        println!("\n   Draft content is not retrievable until approved:");
        println!("   policygate approve '{}'", report.policy_id);
    }

    Ok(())
}
