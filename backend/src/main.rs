//! txedit CLI - bulk-edit tx edge configuration through CSV
//!
//! # Exports
//!
//! ```bash
//! txedit export edge-config.json --kind sources -o sources.csv
//! txedit export-combined edge-config.json --last-key -o edge.csv
//! txedit report edge-config.json -o failover.csv
//! txedit convert records.ndjson -o records.csv --fields id,name,options.host
//! ```
//!
//! # Editing round-trip
//!
//! ```bash
//! txedit fetch ./configs                              # <edgeName>-config.json per online edge
//! txedit plan sources.csv --baseline edge-config.json # what an import would do
//! txedit import sources.csv --kind source --edge <id> # create/update through the core
//! txedit merge edge.csv edge-config.json -o merged.json
//! txedit serve                                        # HTTP API (port 3000)
//! ```

use clap::{Args, Parser, Subcommand};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use txedit::{
    connect_first, convert_file, export_combined, export_kind, failover_report, fetch_baseline,
    fetch_edge_configs, merge_file, parse_bytes, parse_file_auto, plan, prepare_parsed, scopes,
    execute_plan, BaselineIndex, ConfigDocument, ConvertOptions, CoreConfig, FlattenMode,
    PlanAction, PlanSummary, ReconciliationConfig, RecordKind, RowState,
};

#[derive(Parser)]
#[command(name = "txedit")]
#[command(about = "Bulk-edit tx edge streams, sources and outputs through CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one record kind of a config JSON as editable CSV
    Export {
        /// Edge config JSON
        input: PathBuf,

        /// streams, sources or outputs
        #[arg(short, long)]
        kind: RecordKind,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export streams with their sources and outputs, tagged with objectType
    ExportCombined {
        /// Edge config JSON
        input: PathBuf,

        /// One column per leaf name instead of dotted paths (for `merge`; `import` refuses it)
        #[arg(long)]
        last_key: bool,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Failover settings of every stream and source priorities
    Report {
        /// Edge config JSON
        input: PathBuf,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert any JSON array, object or NDJSON file to CSV
    Convert {
        /// Input JSON / NDJSON file
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Comma-separated field paths, e.g. `id,options.host,tags[0]`
        #[arg(short, long)]
        fields: Option<String>,

        /// Records sampled to infer headers
        #[arg(long, default_value = "1000")]
        infer_records: usize,

        /// CSV delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        /// Written for missing and null values
        #[arg(long, default_value = "")]
        null: String,

        /// Read the input as NDJSON whatever its extension
        #[arg(long)]
        ndjson: bool,
    },

    /// Apply an edited CSV onto a config JSON offline, by id
    Merge {
        /// Edited CSV
        csv: PathBuf,

        /// Config JSON to merge onto
        document: PathBuf,

        /// Merged JSON output
        #[arg(short, long)]
        output: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Show what an import would do, without contacting the core
    Plan {
        #[command(flatten)]
        batch: BatchArgs,

        /// Baseline: config JSON or previously exported CSV
        #[arg(short, long)]
        baseline: PathBuf,

        /// Print the full plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create and update records through the core
    Import {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        core: CoreArgs,

        /// Baseline: config JSON or exported CSV (default: live edge config)
        #[arg(short, long)]
        baseline: Option<PathBuf>,

        /// Append failures to this file
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Stop at the first failed row
        #[arg(long)]
        fail_fast: bool,

        /// Send rows without casting declared fields
        #[arg(long)]
        no_validate: bool,

        /// Failure messages kept in the summary
        #[arg(long, default_value = "10")]
        max_failures: usize,
    },

    /// Save the config of every online edge as <edgeName>-config.json
    Fetch {
        /// Output directory
        dir: PathBuf,

        #[command(flatten)]
        core: CoreArgs,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

/// Edited CSV and how to read it.
#[derive(Args)]
struct BatchArgs {
    /// Edited CSV
    input: PathBuf,

    /// Record kind for rows without objectType
    #[arg(short, long)]
    kind: Option<RecordKind>,

    /// Edge for rows with a blank mwedge
    #[arg(short, long)]
    edge: Option<String>,

    /// CSV delimiter (auto-detect if not specified)
    #[arg(short, long)]
    delimiter: Option<char>,
}

/// Core connection overrides; the environment fills the rest.
#[derive(Args)]
struct CoreArgs {
    /// Comma-separated core addresses (TXCORE_ADDRESSES)
    #[arg(long)]
    cores: Option<String>,

    /// API token (TXCORE_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Pause after every call, in milliseconds (TXCORE_CALL_DELAY_MS)
    #[arg(long)]
    call_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export {
            input,
            kind,
            delimiter,
            output,
        } => cmd_export(&input, kind, delimiter, output.as_deref()),

        Commands::ExportCombined {
            input,
            last_key,
            delimiter,
            output,
        } => cmd_export_combined(&input, last_key, delimiter, output.as_deref()),

        Commands::Report {
            input,
            delimiter,
            output,
        } => cmd_report(&input, delimiter, output.as_deref()),

        Commands::Convert {
            input,
            output,
            fields,
            infer_records,
            delimiter,
            null,
            ndjson,
        } => {
            let options = ConvertOptions {
                fields: fields.map(|f| f.split(',').map(|s| s.trim().to_string()).collect()),
                infer_records,
                delimiter,
                null_placeholder: null,
                ndjson,
            };
            cmd_convert(&input, &output, &options)
        }

        Commands::Merge {
            csv,
            document,
            output,
            delimiter,
        } => cmd_merge(&csv, &document, &output, delimiter),

        Commands::Plan {
            batch,
            baseline,
            json,
        } => cmd_plan(&batch, &baseline, json),

        Commands::Import {
            batch,
            core,
            baseline,
            log_file,
            fail_fast,
            no_validate,
            max_failures,
        } => {
            let config = ReconciliationConfig {
                validate: !no_validate,
                fail_fast,
                max_failure_messages: max_failures,
                log_file,
                ..ReconciliationConfig::default()
            };
            cmd_import(&batch, &core, baseline.as_deref(), config).await
        }

        Commands::Fetch { dir, core } => cmd_fetch(&dir, &core).await,

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_export(
    input: &Path,
    kind: RecordKind,
    delimiter: char,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Exporting {} from: {}", kind, input.display());

    let doc = ConfigDocument::load(input)?;
    let table = export_kind(&doc, kind);
    eprintln!("   Columns: {}", table.headers.len());
    eprintln!("✅ {} rows", table.rows.len());

    write_output(&table.to_csv_string(delimiter)?, output)
}

fn cmd_export_combined(
    input: &Path,
    last_key: bool,
    delimiter: char,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Exporting streams, sources and outputs from: {}", input.display());

    let doc = ConfigDocument::load(input)?;
    let mode = if last_key {
        FlattenMode::LastKey
    } else {
        FlattenMode::Dotted
    };
    let export = export_combined(&doc, mode);
    if !export.orphans.is_empty() {
        eprintln!("   ⚠️  {} rows reference an unknown stream", export.orphans.len());
    }
    eprintln!("✅ {} rows", export.table.rows.len());

    write_output(&export.table.to_csv_string(delimiter)?, output)
}

fn cmd_report(
    input: &Path,
    delimiter: char,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Failover report for: {}", input.display());

    let doc = ConfigDocument::load(input)?;
    let table = failover_report(&doc);
    eprintln!("✅ {} rows", table.rows.len());

    write_output(&table.to_csv_string(delimiter)?, output)
}

fn cmd_convert(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Converting: {}", input.display());

    let rows = convert_file(input, output, options)?;
    eprintln!("   Delimiter: '{}'", format_delimiter(options.delimiter));
    eprintln!("💾 {} rows written to: {}", rows, output.display());
    Ok(())
}

fn cmd_merge(
    csv: &Path,
    document: &Path,
    output: &Path,
    delimiter: Option<char>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Merging {} onto {}", csv.display(), document.display());

    let summary = merge_file(csv, document, output, delimiter)?;
    eprintln!("   Merged records: {}", summary.merged);
    if !summary.unmatched.is_empty() {
        eprintln!("   ⚠️  No record for ids: {}", summary.unmatched.join(", "));
    }
    eprintln!("💾 Output written to: {}", output.display());
    Ok(())
}

/// Read the edited CSV named by the batch arguments.
fn read_batch(batch: &BatchArgs) -> Result<txedit::ParseResult, Box<dyn std::error::Error>> {
    let bytes = fs::read(&batch.input)?;
    let parsed = parse_bytes(&bytes, batch.delimiter, None)?;

    eprintln!("📄 {}", batch.input.display());
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
    eprintln!("   Rows: {}", parsed.records.len());
    Ok(parsed)
}

/// Baseline from a config JSON, or from a CSV exported earlier.
fn load_baseline(path: &Path) -> Result<BaselineIndex, Box<dyn std::error::Error>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let baseline = if is_json {
        BaselineIndex::from_document(&ConfigDocument::load(path)?)
    } else {
        BaselineIndex::from_rows(&parse_file_auto(path)?.records)
    };
    eprintln!("   Baseline: {} records from {}", baseline.len(), path.display());
    Ok(baseline)
}

fn batch_config(batch: &BatchArgs, mut config: ReconciliationConfig) -> ReconciliationConfig {
    if let Some(edge) = &batch.edge {
        config.default_edge = Some(edge.clone());
    }
    config
}

fn cmd_plan(batch: &BatchArgs, baseline: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = read_batch(batch)?;
    let baseline = load_baseline(baseline)?;
    let config = batch_config(batch, ReconciliationConfig::default());

    let prepared = prepare_parsed(&parsed, batch.kind, &config)?;
    let entries = plan(prepared, &baseline);
    let summary = PlanSummary::of(&entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            let action = match entry.action {
                PlanAction::Create => "CREATE",
                PlanAction::Update => "UPDATE",
                PlanAction::Skip => "skip",
            };
            println!("{:>5}  {:<6}  {:<6}  {}", entry.row, action, entry.kind, entry.identity);
            for change in &entry.changes {
                println!(
                    "         {}: {} -> {}",
                    change.column,
                    change.before.as_deref().unwrap_or("<none>"),
                    change.after
                );
            }
            for warning in &entry.warnings {
                println!("         ⚠️  {}", warning);
            }
        }
    }

    eprintln!(
        "\n📊 Plan: {} create, {} update, {} skip",
        summary.create, summary.update, summary.skip
    );
    Ok(())
}

/// Core settings from the environment, with command-line overrides.
fn core_config(args: &CoreArgs) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    let config = CoreConfig::from_lookup(|var| match var {
        "TXCORE_ADDRESSES" => args.cores.clone().or_else(|| env::var(var).ok()),
        "TXCORE_TOKEN" => args.token.clone().or_else(|| env::var(var).ok()),
        "TXCORE_VERIFY_HTTPS" if args.insecure => Some("false".to_string()),
        "TXCORE_CALL_DELAY_MS" => args
            .call_delay_ms
            .map(|ms| ms.to_string())
            .or_else(|| env::var(var).ok()),
        _ => env::var(var).ok(),
    })?;
    Ok(config)
}

async fn cmd_import(
    batch: &BatchArgs,
    core: &CoreArgs,
    baseline: Option<&Path>,
    config: ReconciliationConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = read_batch(batch)?;
    let core = core_config(core)?;
    let mut config = batch_config(batch, config);
    config.call_delay_ms = core.call_delay_ms;

    // fatal row problems surface before any connection is made
    let prepared = prepare_parsed(&parsed, batch.kind, &config)?;

    let client = connect_first(&core).await?;
    let baseline = match baseline {
        Some(path) => load_baseline(path)?,
        None => fetch_baseline(&client, &scopes(&prepared)).await?,
    };

    let entries = plan(prepared, &baseline);
    let total = entries.len();
    let summary = execute_plan(&client, entries, &config, |outcome| {
        if outcome.state == RowState::Failed {
            eprintln!("   ❌ [{}/{}] {}", outcome.row, total, outcome.error.as_deref().unwrap_or(""));
        }
    })
    .await;

    eprintln!("\n📊 SUMMARY");
    eprintln!("   Created: {}", summary.created);
    eprintln!("   Updated: {}", summary.updated);
    eprintln!("   Skipped: {}", summary.skipped);
    eprintln!("   Failed:  {}", summary.failed);
    for failure in &summary.failures {
        eprintln!("     - {}", failure);
    }
    if summary.stopped_early {
        eprintln!("   ⚠️  Stopped at the first failure");
    }

    if !summary.is_success() {
        return Err(format!("{} rows failed", summary.failed).into());
    }
    eprintln!("\n✨ Done!");
    Ok(())
}

async fn cmd_fetch(dir: &Path, core: &CoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let core = core_config(core)?;
    let report = fetch_edge_configs(&core, dir).await?;

    eprintln!("\n📦 {} edge configs saved", report.saved.len());
    for (edge, address) in &report.edge_cores {
        eprintln!("   {} <- {}", edge, address);
    }
    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let core = match CoreConfig::from_env() {
        Ok(core) => Some(core),
        Err(e) => {
            eprintln!("⚠️  {} (imports disabled)", e);
            None
        }
    };
    txedit::server::start_server(port, core, ReconciliationConfig::default()).await
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
