//! `policygate policies`: List registered policy versions.

pub async fn run(all: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let gate = super::runtime().await?;
    let registry = gate.registry();
    let records = if all {
        registry.list().await?
    } else {
        registry.latest().await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No policies registered. Ingest one with `policygate ingest`.");
        return Ok(());
    }

    println!("{:<8} {:<60} {:<20} APPROVED BY", "STATUS", "POLICY ID", "DOCUMENT");
    for r in &records {
        println!(
            "{:<8} {:<60} {:<20} {}",
            r.status,
            r.policy_id,
            r.doc_name,
            r.approved_by.as_deref().unwrap_or("-")
        );
    }
    let active = records.iter().filter(|r| r.is_active()).count();
    println!("\n{} record(s), {active} active", records.len());

    Ok(())
}
