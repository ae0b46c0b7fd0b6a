//! `policygate retrieve`: Assemble the snippet bundle for a case.

use policygate_retrieval::CaseQuery;

pub struct RetrieveArgs {
    pub state: String,
    pub sector: String,
    pub query: Option<String>,
    pub k: Option<usize>,
    pub case_id: Option<String>,
    pub json: bool,
}

pub async fn run(args: RetrieveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let gate = super::runtime().await?;
    let retrieval = &gate.config().retrieval;

    let mut case = CaseQuery::new(
        args.state,
        args.sector,
        args.query.unwrap_or_else(|| retrieval.default_query.clone()),
        args.k.unwrap_or(retrieval.k_per_layer),
    );
    if let Some(id) = args.case_id {
        case = case.with_case_id(id);
    }

    let bundle = gate.orchestrator().run(&case).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    println!("Case: state={} sector={}", bundle.state, bundle.sector);
    println!("Query: {}\n", bundle.query);
    print!("{}", bundle.render_context());
    for layer in &bundle.degraded {
        println!("⚠️  {layer} could not be retrieved; its section is empty");
    }

    Ok(())
}
