use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use forensics_analysis::{detect_suspicious_patterns, query_fund_flow, FlowPath, TransferGraph};
use forensics_store::{
    format_eth, AddressProfile, KnowledgeGraph, KnowledgeStore, Pattern, Properties,
    SimilarAddress, Transaction,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct AppContext {
    snapshot: PathBuf,
}

#[derive(Parser, Debug)]
#[command(name = "chain-forensics")]
#[command(about = "Blockchain forensics knowledge store: fund flows and suspicious patterns")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Snapshot file loaded before and saved after each command.
    #[arg(
        long,
        global = true,
        env = "FORENSICS_SNAPSHOT",
        default_value = "data/knowledge.json"
    )]
    snapshot: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load transactions from a JSON file into the store.
    Ingest(IngestArgs),
    /// Attach enrichment properties to an address.
    Label(LabelArgs),
    /// Record a typed relation between two addresses.
    Relate(RelateArgs),
    /// Trace fund flows leaving an address.
    Trace(TraceArgs),
    /// Run splitting, merging and cyclic-transfer detection.
    Detect(DetectArgs),
    /// Show everything known about one address.
    Entity(EntityArgs),
    /// Show record counts of the snapshot.
    Status,
    /// Inspect a knowledge-graph export.
    Graph(GraphArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// JSON array of transactions with a `hash` key, or an object keyed by hash.
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args, Debug)]
struct LabelArgs {
    #[arg(long)]
    address: String,

    /// Property to set, as `key=value`. Values are parsed as JSON when possible.
    #[arg(long = "set", value_parser = parse_property, required = true)]
    properties: Vec<(String, Value)>,
}

#[derive(Args, Debug)]
struct RelateArgs {
    #[arg(long)]
    from: String,

    #[arg(long)]
    to: String,

    #[arg(long = "type")]
    relation_type: String,

    #[arg(long = "set", value_parser = parse_property)]
    properties: Vec<(String, Value)>,
}

#[derive(Args, Debug)]
struct TraceArgs {
    #[arg(long)]
    address: String,

    /// Maximum number of hops to follow.
    #[arg(long, default_value_t = forensics_analysis::DEFAULT_TRACE_DEPTH)]
    depth: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Args, Debug)]
struct EntityArgs {
    #[arg(long)]
    address: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Args, Debug)]
struct GraphArgs {
    /// Knowledge-graph export document.
    #[arg(long)]
    file: PathBuf,

    /// Show this address's profile and similar addresses instead of statistics.
    #[arg(long)]
    address: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        snapshot: cli.snapshot,
    };

    match cli.command {
        Commands::Ingest(args) => handle_ingest(&ctx, args),
        Commands::Label(args) => handle_label(&ctx, args),
        Commands::Relate(args) => handle_relate(&ctx, args),
        Commands::Trace(args) => handle_trace(&ctx, args),
        Commands::Detect(args) => handle_detect(&ctx, args),
        Commands::Entity(args) => handle_entity(&ctx, args),
        Commands::Status => handle_status(&ctx),
        Commands::Graph(args) => handle_graph(args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load the snapshot, or start empty if it does not exist yet.
fn open_store(ctx: &AppContext) -> Result<KnowledgeStore> {
    if !ctx.snapshot.exists() {
        info!(path = %ctx.snapshot.display(), "no snapshot yet, starting empty");
        return Ok(KnowledgeStore::new());
    }
    KnowledgeStore::try_load(&ctx.snapshot).wrap_err("failed to open knowledge store")
}

fn save_store(ctx: &AppContext, store: &KnowledgeStore) -> Result<()> {
    if let Some(parent) = ctx.snapshot.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    store
        .try_save(&ctx.snapshot)
        .wrap_err("failed to save knowledge store")
}

fn handle_ingest(ctx: &AppContext, args: IngestArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .wrap_err_with(|| format!("failed to read {}", args.file.display()))?;
    let document: Value = serde_json::from_str(&content)
        .wrap_err_with(|| format!("invalid JSON in {}", args.file.display()))?;
    let records = transaction_records(document)?;

    let mut store = open_store(ctx)?;

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} transactions")
            .wrap_err("failed to create progress style")?
            .progress_chars("#>-"),
    );

    let mut inserted = 0usize;
    let mut duplicates = 0usize;
    let mut skipped = 0usize;

    for (hash, record) in records {
        match serde_json::from_value::<Transaction>(record) {
            Ok(tx) => {
                if store.add_transaction(&hash, tx) {
                    inserted += 1;
                } else {
                    duplicates += 1;
                }
            }
            Err(e) => {
                warn!(tx_hash = %hash, "skipping malformed transaction: {e}");
                skipped += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    save_store(ctx, &store)?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Inserted", &inserted.to_string()]);
    table.add_row(vec!["Duplicates", &duplicates.to_string()]);
    table.add_row(vec!["Skipped (malformed)", &skipped.to_string()]);
    table.add_row(vec!["Total transactions", &store.transaction_count().to_string()]);
    table.add_row(vec!["Flagged patterns", &store.pattern_count().to_string()]);
    println!("\n{table}\n");

    info!(
        inserted,
        duplicates,
        skipped,
        snapshot = %ctx.snapshot.display(),
        "ingest command finished"
    );

    Ok(())
}

/// Split an ingest document into `(hash, transaction object)` pairs.
///
/// Accepts an array of objects each carrying a `hash` key, or an object
/// keyed by hash.
fn transaction_records(document: Value) -> Result<Vec<(String, Value)>> {
    match document {
        Value::Array(items) => {
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let Value::Object(mut object) = item else {
                    warn!(index, "skipping non-object entry");
                    continue;
                };
                match object.remove("hash") {
                    Some(Value::String(hash)) if !hash.is_empty() => {
                        records.push((hash, Value::Object(object)));
                    }
                    _ => warn!(index, "skipping entry without a hash"),
                }
            }
            Ok(records)
        }
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(hash, mut record)| {
                if let Value::Object(object) = &mut record {
                    object.remove("hash");
                }
                (hash, record)
            })
            .collect()),
        _ => Err(eyre!(
            "expected a JSON array of transactions or an object keyed by hash"
        )),
    }
}

fn handle_label(ctx: &AppContext, args: LabelArgs) -> Result<()> {
    let mut store = open_store(ctx)?;
    let properties: Properties = args.properties.into_iter().collect();
    let count = properties.len();

    store.add_entity(&args.address, properties);
    save_store(ctx, &store)?;

    println!("Labelled {} with {count} propert{}", args.address, plural_y(count));
    info!(address = %args.address, properties = count, "label command finished");
    Ok(())
}

fn handle_relate(ctx: &AppContext, args: RelateArgs) -> Result<()> {
    if args.relation_type.is_empty() {
        return Err(eyre!("--type must not be empty"));
    }

    let mut store = open_store(ctx)?;
    let properties: Properties = args.properties.into_iter().collect();

    store.add_relation(&args.from, &args.to, &args.relation_type, properties);
    save_store(ctx, &store)?;

    println!("Related {} -[{}]-> {}", args.from, args.relation_type, args.to);
    info!(
        from = %args.from,
        to = %args.to,
        relation_type = %args.relation_type,
        "relate command finished"
    );
    Ok(())
}

fn handle_trace(ctx: &AppContext, args: TraceArgs) -> Result<()> {
    let store = open_store(ctx)?;
    let paths = query_fund_flow(&store, &args.address, args.depth);

    match args.output {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&paths).wrap_err("failed to serialize paths to JSON")?;
            println!("{json}");
        }
        OutputFormat::Table => print_paths_table(&paths),
    }

    info!(
        address = %args.address,
        depth = args.depth,
        paths = paths.len(),
        "trace command finished"
    );
    Ok(())
}

fn print_paths_table(paths: &[FlowPath]) {
    if paths.is_empty() {
        println!("No fund flows found.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Path", "Hop", "Tx Hash", "From", "To", "Value", "Time"]);

    for (path_no, path) in paths.iter().enumerate() {
        for (hop_no, hop) in path.iter().enumerate() {
            table.add_row(vec![
                (path_no + 1).to_string(),
                (hop_no + 1).to_string(),
                truncate_hash(&hop.tx_hash),
                truncate_hash(&hop.from),
                truncate_hash(&hop.to),
                format_eth(hop.value),
                format_time(hop.timestamp),
            ]);
        }
    }

    println!("\n{table}\n");
}

fn handle_detect(ctx: &AppContext, args: DetectArgs) -> Result<()> {
    let store = open_store(ctx)?;
    let findings = detect_suspicious_patterns(&store);

    match args.output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&findings)
                .wrap_err("failed to serialize findings to JSON")?;
            println!("{json}");
        }
        OutputFormat::Table => print_patterns_table(&findings),
    }

    info!(
        transactions = store.transaction_count(),
        findings = findings.len(),
        "detect command finished"
    );
    Ok(())
}

fn print_patterns_table<'a>(patterns: impl IntoIterator<Item = &'a Pattern>) {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Type", "Subject", "Window", "Counterparties", "Txs", "Evidence"]);

    let mut rows = 0usize;
    for pattern in patterns {
        let (subject, window, counterparties) = match pattern {
            Pattern::LargeTransfer { from_address, value, timestamp, .. } => (
                from_address.as_deref().map_or_else(|| "-".to_string(), truncate_hash),
                format_time(*timestamp),
                format_eth(*value),
            ),
            Pattern::ContractCreation { creator, timestamp, .. } => (
                creator.as_deref().map_or_else(|| "-".to_string(), truncate_hash),
                format_time(*timestamp),
                "-".to_string(),
            ),
            Pattern::FundSplitting { from_address, window_start, recipient_count, .. } => (
                truncate_hash(from_address),
                format_time(*window_start),
                format!("{recipient_count} recipients"),
            ),
            Pattern::FundMerging { to_address, window_start, sender_count, .. } => (
                truncate_hash(to_address),
                format_time(*window_start),
                format!("{sender_count} senders"),
            ),
            Pattern::CyclicTransfer { addresses, .. } => (
                addresses
                    .iter()
                    .map(|a| truncate_hash(a))
                    .collect::<Vec<_>>()
                    .join(" → "),
                "-".to_string(),
                format!("{} addresses", addresses.len()),
            ),
        };

        let evidence = pattern.transactions();
        let mut shown: Vec<String> = evidence.iter().take(3).map(|h| truncate_hash(h)).collect();
        if evidence.len() > 3 {
            shown.push(format!("+{} more", evidence.len() - 3));
        }

        table.add_row(vec![
            pattern.as_str().to_string(),
            subject,
            window,
            counterparties,
            evidence.len().to_string(),
            shown.join(", "),
        ]);
        rows += 1;
    }

    if rows == 0 {
        println!("No suspicious patterns found.");
    } else {
        println!("\n{table}\n");
    }
}

fn handle_entity(ctx: &AppContext, args: EntityArgs) -> Result<()> {
    let store = open_store(ctx)?;
    let entity = store
        .get_entity(&args.address)
        .ok_or_else(|| eyre!("address {} is not in the knowledge store", args.address))?;
    let relations = store.get_relations(&args.address);
    let patterns = store.patterns_for(&args.address);
    let relation_count = relations.len();

    let graph = TransferGraph::from_store(&store);
    let (received, sent) = graph
        .node(&args.address)
        .map(|ix| graph.flow_totals(ix))
        .unwrap_or_default();

    match args.output {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct EntityView<'a> {
                address: &'a str,
                #[serde(flatten)]
                entity: &'a forensics_store::Entity,
                received_wei: String,
                sent_wei: String,
                relations: Vec<&'a forensics_store::Relation>,
                patterns: Vec<&'a Pattern>,
            }

            let view = EntityView {
                address: &args.address,
                entity,
                received_wei: received.to_string(),
                sent_wei: sent.to_string(),
                relations,
                patterns,
            };
            let json =
                serde_json::to_string_pretty(&view).wrap_err("failed to serialize entity to JSON")?;
            println!("{json}");
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec!["Address".to_string(), args.address.clone()]);
            table.add_row(vec!["Transactions".to_string(), entity.transactions.len().to_string()]);
            table.add_row(vec!["Received".to_string(), format_eth(received)]);
            table.add_row(vec!["Sent".to_string(), format_eth(sent)]);
            for (key, value) in &entity.properties {
                table.add_row(vec![key.clone(), display_value(value)]);
            }
            println!("\n{table}\n");

            if !relations.is_empty() {
                let mut rel_table = Table::new();
                rel_table.load_preset(UTF8_BORDERS_ONLY);
                rel_table.set_header(vec!["From", "Type", "To", "Data"]);
                for relation in &relations {
                    rel_table.add_row(vec![
                        truncate_hash(&relation.entity1),
                        relation.relation_type.clone(),
                        truncate_hash(&relation.entity2),
                        Value::Object(relation.data.clone()).to_string(),
                    ]);
                }
                println!("{rel_table}\n");
            }

            if !patterns.is_empty() {
                print_patterns_table(patterns.iter().copied());
            }
        }
    }

    info!(
        address = %args.address,
        relations = relation_count,
        "entity command finished"
    );
    Ok(())
}

fn handle_status(ctx: &AppContext) -> Result<()> {
    let store = open_store(ctx)?;
    let stats = store.stats();

    let size_str = match std::fs::metadata(&ctx.snapshot) {
        Ok(metadata) => format!("{} KB", metadata.len() / 1_000),
        Err(_) => "N/A (file not found)".to_string(),
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Snapshot Path".to_string(), ctx.snapshot.display().to_string()]);
    table.add_row(vec!["Snapshot Size".to_string(), size_str]);
    table.add_row(vec!["Transactions".to_string(), stats.transactions.to_string()]);
    table.add_row(vec!["Entities".to_string(), stats.entities.to_string()]);
    table.add_row(vec!["Patterns".to_string(), stats.patterns.to_string()]);
    table.add_row(vec!["Relations".to_string(), stats.relations.to_string()]);
    println!("\n{table}\n");

    info!(
        transactions = stats.transactions,
        entities = stats.entities,
        patterns = stats.patterns,
        relations = stats.relations,
        "status command completed"
    );
    Ok(())
}

fn handle_graph(args: GraphArgs) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .wrap_err_with(|| format!("failed to read {}", args.file.display()))?;

    let mut graph = KnowledgeGraph::default();
    let applied = graph
        .try_import_json(&content)
        .wrap_err_with(|| format!("failed to import {}", args.file.display()))?;

    match args.address {
        Some(address) => {
            let profile = graph.get_address_relationships(&address);
            let similar = graph.search_similar_addresses(&address);
            print_profile(&profile, &similar, args.output)?;
        }
        None => {
            let stats = graph.get_graph_statistics();
            match args.output {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&stats)
                        .wrap_err("failed to serialize statistics to JSON")?;
                    println!("{json}");
                }
                OutputFormat::Table => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_BORDERS_ONLY);
                    table.set_header(vec!["Metric", "Value"]);
                    table.add_row(vec!["Graph".to_string(), stats.name.clone()]);
                    table.add_row(vec!["Entities".to_string(), stats.total_entities.to_string()]);
                    table.add_row(vec![
                        "Relationships".to_string(),
                        stats.total_relationships.to_string(),
                    ]);
                    for (entity_type, count) in &stats.entity_types {
                        table.add_row(vec![format!("  {entity_type}"), count.to_string()]);
                    }
                    for (relation_type, count) in &stats.relationship_types {
                        table.add_row(vec![format!("  {relation_type}"), count.to_string()]);
                    }
                    println!("\n{table}\n");
                }
            }
        }
    }

    info!(file = %args.file.display(), applied, "graph command finished");
    Ok(())
}

fn print_profile(
    profile: &AddressProfile,
    similar: &[SimilarAddress],
    output: OutputFormat,
) -> Result<()> {
    if output == OutputFormat::Json {
        #[derive(Serialize)]
        struct ProfileView<'a> {
            #[serde(flatten)]
            profile: &'a AddressProfile,
            similar_addresses: &'a [SimilarAddress],
        }

        let json = serde_json::to_string_pretty(&ProfileView {
            profile,
            similar_addresses: similar,
        })
        .wrap_err("failed to serialize profile to JSON")?;
        println!("{json}");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Address".to_string(), profile.address.clone()]);
    for (key, value) in &profile.properties {
        table.add_row(vec![key.clone(), display_value(value)]);
    }
    table.add_row(vec!["Tokens".to_string(), profile.tokens.len().to_string()]);
    table.add_row(vec!["Sent".to_string(), profile.sent_transactions.len().to_string()]);
    table.add_row(vec![
        "Received".to_string(),
        profile.received_transactions.len().to_string(),
    ]);
    table.add_row(vec![
        "Deployed contracts".to_string(),
        profile.deployed_contracts.len().to_string(),
    ]);
    println!("\n{table}\n");

    if !similar.is_empty() {
        let mut sim_table = Table::new();
        sim_table.load_preset(UTF8_BORDERS_ONLY);
        sim_table.set_header(vec!["Similar Address", "Score", "Common Sent", "Common Received"]);
        for s in similar {
            sim_table.add_row(vec![
                truncate_hash(&s.address),
                s.similarity_score.to_string(),
                s.common_sent.to_string(),
                s.common_received.to_string(),
            ]);
        }
        println!("{sim_table}\n");
    }

    Ok(())
}

/// Parse a `key=value` property. The value is read as JSON when it parses,
/// otherwise kept as a plain string.
fn parse_property(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

fn plural_y(count: usize) -> &'static str {
    if count == 1 {
        "y"
    } else {
        "ies"
    }
}

/// Truncate a hex hash/address for compact table display.
fn truncate_hash(hash: &str) -> String {
    if hash.len() > 14 && hash.is_ascii() {
        format!("{}…{}", &hash[..8], &hash[hash.len() - 4..])
    } else {
        hash.to_string()
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .wrap_err_with(|| format!("failed to create data directory {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_values_parse_as_json_or_string() {
        assert_eq!(parse_property("risk=3").unwrap(), ("risk".into(), json!(3)));
        assert_eq!(
            parse_property("label=hot wallet").unwrap(),
            ("label".into(), json!("hot wallet"))
        );
        assert_eq!(parse_property("flag=true").unwrap(), ("flag".into(), json!(true)));
        assert_eq!(parse_property("eq=a=b").unwrap(), ("eq".into(), json!("a=b")));
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }

    #[test]
    fn records_from_array_and_map() {
        let array = json!([
            {"hash": "0x1", "from": "A", "to": "B", "value": 1},
            {"from": "A"},
            "junk"
        ]);
        let records = transaction_records(array).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "0x1");
        assert!(records[0].1.get("hash").is_none());

        let map = json!({"0x2": {"from": "A", "to": "C"}, "0x3": {"from": "B"}});
        let records = transaction_records(map).unwrap();
        let hashes: Vec<&str> = records.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(hashes, vec!["0x2", "0x3"]);

        assert!(transaction_records(json!(42)).is_err());
    }

    #[test]
    fn ingested_wide_integer_value_is_flagged() {
        let document: Value = serde_json::from_str(
            r#"[{"hash": "0xbig", "from": "A", "to": "B", "value": 150000000000000000000}]"#,
        )
        .unwrap();
        let mut store = KnowledgeStore::new();
        for (hash, record) in transaction_records(document).unwrap() {
            let tx: Transaction = serde_json::from_value(record).unwrap();
            assert!(store.add_transaction(&hash, tx));
        }
        assert!(store.get_pattern("large_transfer:0xbig").is_some());
    }

    #[test]
    fn truncates_long_hashes_only() {
        assert_eq!(truncate_hash("0xabc"), "0xabc");
        let long = format!("0x{:064x}", 0xdead_u64);
        assert_eq!(truncate_hash(&long), format!("{}…{}", &long[..8], "dead"));
    }

    #[test]
    fn times_render_as_rfc3339() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_time(u64::MAX), u64::MAX.to_string());
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext {
            snapshot: dir.path().join("nested/kb.json"),
        };
        let mut store = open_store(&ctx).unwrap();
        assert!(store.is_empty());

        store.add_entity("0xa", Properties::new());
        save_store(&ctx, &store).unwrap();
        assert_eq!(open_store(&ctx).unwrap(), store);
    }
}
