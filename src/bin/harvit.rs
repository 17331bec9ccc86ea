//! harvit CLI - conform harvested values into typed records using a plan
//!
//! Harvested values are read as JSON (one object, or an array of objects)
//! from a file or stdin; records are written to stdout, logs to stderr.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use harvit::serialization::write_document;
use harvit::{
    telemetry, Cancellation, JsonArrayWriter, NdjsonWriter, Pipeline, Plan, ScriptFailurePolicy,
    ScriptLimits, ScriptTransformer, Settings, StaticHarvester,
};

#[derive(Parser)]
#[command(name = "harvit")]
#[command(version, about = "Conform harvested text into typed records", long_about = None)]
struct Cli {
    /// Verbose logging (also enabled by HARVIT_DEBUG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a plan
    Validate {
        /// Path to the plan file
        #[arg(short, long, default_value = "plan.yml")]
        plan: PathBuf,
    },

    /// Run harvested values through a plan's conform and transform stages
    Conform {
        /// Path to the plan file
        #[arg(short, long, default_value = "plan.yml")]
        plan: PathBuf,

        /// Harvested JSON file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Transform script (overrides the plan's `transformer`)
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Emit the sanitized mapping instead of the projected record
        #[arg(long)]
        sanitized: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Write one record per line for batch input
        #[arg(long, conflicts_with = "pretty")]
        ndjson: bool,

        /// Emit the untransformed record when the script fails
        #[arg(long)]
        keep_on_script_error: bool,
    },

    /// Print the record schema a plan projects to
    Schema {
        /// Path to the plan file
        #[arg(short, long, default_value = "plan.yml")]
        plan: PathBuf,
    },
}

struct ConformArgs {
    plan: PathBuf,
    input: PathBuf,
    script: Option<PathBuf>,
    sanitized: bool,
    pretty: bool,
    ndjson: bool,
    keep_on_script_error: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    settings.debug |= cli.debug;

    telemetry::init(&settings);

    let result = match cli.command {
        Commands::Validate { plan } => validate_plan(&plan),
        Commands::Conform {
            plan,
            input,
            script,
            sanitized,
            pretty,
            ndjson,
            keep_on_script_error,
        } => {
            let args = ConformArgs {
                plan,
                input,
                script,
                sanitized,
                pretty,
                ndjson,
                keep_on_script_error,
            };
            conform(args, settings.script_limits()).await
        }
        Commands::Schema { plan } => print_schema(&plan),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Load a plan; `Plan::load_from_file` also validates it.
fn load_plan(path: &Path) -> Result<Plan, String> {
    Plan::load_from_file(path).map_err(|e| format!("Failed to load plan: {}", e))
}

/// Validate a plan and print a summary
fn validate_plan(path: &Path) -> Result<(), String> {
    let plan = load_plan(path)?;

    println!("✓ {} is valid", path.display());
    println!("  source: {}", plan.source);
    println!("  harvester: {}", plan.harvester);
    if let Some(transformer) = &plan.transformer {
        println!("  transformer: {}", transformer.display());
    }
    println!("  fields ({}):", plan.fields.len());
    for field in &plan.fields {
        println!("    - {} ({}) -> {}", field.name, field.field_type, field.key());
    }

    Ok(())
}

/// Print the projected record description as JSON
fn print_schema(path: &Path) -> Result<(), String> {
    let plan = load_plan(path)?;
    let pipeline = Pipeline::new(&plan).map_err(|e| e.to_string())?;

    write_document(io::stdout().lock(), pipeline.schema(), true)
        .map_err(|e| format!("Failed to write schema: {}", e))
}

async fn conform(args: ConformArgs, limits: ScriptLimits) -> Result<(), String> {
    let plan = load_plan(&args.plan)?;

    let mut pipeline = Pipeline::new(&plan)
        .map_err(|e| e.to_string())?
        .with_projection(!args.sanitized);

    if args.keep_on_script_error {
        pipeline = pipeline.with_failure_policy(ScriptFailurePolicy::KeepRecord);
    }

    if let Some(script) = args.script.as_ref().or(plan.transformer.as_ref()) {
        let script = ScriptTransformer::from_file(script, limits)
            .map_err(|e| format!("Failed to load transform script: {}", e))?;
        pipeline = pipeline.with_script(script);
    }

    let harvester = if args.input == Path::new("-") {
        StaticHarvester::from_reader(io::stdin().lock())
    } else {
        StaticHarvester::from_file(&args.input)
    }
    .map_err(|e| format!("Failed to read harvested data: {}", e))?;

    let (handle, cancel) = Cancellation::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            handle.cancel();
        }
    });

    let batch = harvester.is_batch();
    let records = tokio::task::spawn_blocking(move || {
        pipeline.harvest_and_run(&harvester, &plan, &cancel)
    })
    .await
    .map_err(|e| format!("Pipeline task failed: {}", e))?
    .map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !batch {
        if let Some(record) = records.first() {
            write_document(&mut out, record, args.pretty)
                .map_err(|e| format!("Failed to write record: {}", e))?;
        }
        return Ok(());
    }

    if args.ndjson {
        let mut writer = NdjsonWriter::new(&mut out);
        writer
            .write_all(&records)
            .and_then(|_| writer.flush())
            .map_err(|e| format!("Failed to write records: {}", e))?;
    } else {
        let mut writer = JsonArrayWriter::with_pretty(&mut out, args.pretty)
            .map_err(|e| format!("Failed to write records: {}", e))?;
        for record in &records {
            writer
                .write(record)
                .map_err(|e| format!("Failed to write records: {}", e))?;
        }
        writer
            .finish()
            .map_err(|e| format!("Failed to write records: {}", e))?;
        writeln!(out).map_err(|e| format!("Failed to write records: {}", e))?;
    }

    Ok(())
}
