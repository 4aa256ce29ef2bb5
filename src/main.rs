//! histograph CLI: reconcile patches into a historical knowledge graph and
//! compute its network metrics.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use histograph::config::EngineConfig;
use histograph::engine::{EnrichOutcome, Engine};
use histograph::export::{self, ExportFormat};
use histograph::graph::ops::NodeUpdate;
use histograph::patch::{Conflict, GraphPatch, ReconcileReport, Resolution, Resolutions};

#[derive(Parser)]
#[command(name = "histograph", version, about = "Historical knowledge graph engine")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent storage (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Do not recompute metrics after a mutation.
    #[arg(long, global = true)]
    skip_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a data directory, seeding it when a seed patch is configured.
    Init,

    /// Reconcile a JSON graph patch into the graph.
    Apply {
        /// Path to the patch file.
        #[arg(long)]
        file: PathBuf,

        /// Conflict resolution, `ENTITY-FIELD=existing|proposed`. Repeatable.
        #[arg(long = "resolve", value_parser = parse_resolution)]
        resolutions: Vec<(String, Resolution)>,
    },

    /// List the conflicts a patch would raise, without applying it.
    Conflicts {
        #[arg(long)]
        file: PathBuf,
    },

    /// Merge one node into another.
    Merge {
        /// Node that survives.
        #[arg(long)]
        keep: String,
        /// Node absorbed and removed.
        #[arg(long)]
        drop: String,
    },

    /// Edit a node's content fields from a JSON object.
    Update {
        #[arg(long)]
        id: String,
        /// e.g. `{"label": "Roman Dmowski", "description": null}`
        #[arg(long)]
        json: String,
    },

    /// Remove a node and its edges.
    Remove {
        #[arg(long)]
        id: String,
    },

    /// Remove several nodes at once. Unknown ids are ignored.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Find node labels within an edit distance of a query.
    Similar {
        query: String,
        /// Defaults to a budget derived from the query length.
        #[arg(long)]
        max_distance: Option<usize>,
    },

    /// List near-duplicate node pairs.
    Duplicates,

    /// Recompute network metrics.
    Metrics {
        /// Clear the failure count after repeated metric failures.
        #[arg(long)]
        reset: bool,
    },

    /// Print the subgraph valid in a given year.
    Slice {
        #[arg(long)]
        year: i32,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Undo the last mutation.
    Undo,

    /// Redo the last undone mutation.
    Redo,

    /// Export the graph.
    Export {
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show engine info and status.
    Info,
}

fn parse_resolution(raw: &str) -> std::result::Result<(String, Resolution), String> {
    let (key, value) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected KEY=existing|proposed, got `{raw}`"))?;
    let resolution = value.parse::<Resolution>().map_err(|e| e.to_string())?;
    Ok((key.trim().to_string(), resolution))
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if config.data_dir.is_none() {
        config.data_dir = Some(PathBuf::from(".histograph"));
    }
    Ok(config)
}

fn read_patch(path: &Path) -> Result<GraphPatch> {
    let text = std::fs::read_to_string(path).into_diagnostic()?;
    Ok(GraphPatch::from_json_lenient(&text)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let data_dir = config.data_dir.clone().unwrap_or_default();
    let mut engine = Engine::new(config)?;

    let mutated = match cli.command {
        Commands::Init => {
            println!("Initialized histograph at {}", data_dir.display());
            println!("{}", engine.info());
            false
        }

        Commands::Apply { file, resolutions } => {
            let patch = read_patch(&file)?;
            let resolutions: Resolutions = resolutions.into_iter().collect();
            let outcome = engine.apply_patch_resolved(&patch, &resolutions)?;
            print_report(&outcome.report);
            if !outcome.conflicts.is_empty() {
                println!(
                    "{} conflict(s); unresolved ones kept the existing value:",
                    outcome.conflicts.len()
                );
                print_conflicts(&outcome.conflicts);
            }
            if !outcome.changed {
                println!("No changes.");
            }
            outcome.changed
        }

        Commands::Conflicts { file } => {
            let patch = read_patch(&file)?;
            let conflicts = engine.detect_conflicts(&patch);
            if conflicts.is_empty() {
                println!("No conflicts.");
            } else {
                print_conflicts(&conflicts);
            }
            false
        }

        Commands::Merge { keep, drop } => {
            engine.merge_nodes(&keep, &drop)?;
            println!("Merged \"{drop}\" into \"{keep}\".");
            true
        }

        Commands::Update { id, json } => {
            let update: NodeUpdate = serde_json::from_str(&json).into_diagnostic()?;
            let before = engine.graph().revision();
            let after = engine.update_node(&id, update)?.revision();
            if after == before {
                println!("No changes.");
            } else {
                println!("Updated \"{id}\".");
            }
            after != before
        }

        Commands::Remove { id } => {
            engine.remove_node(&id)?;
            println!("Removed \"{id}\".");
            true
        }

        Commands::Delete { ids } => {
            let removed = engine.bulk_delete(&ids[..])?;
            println!("Removed {removed} of {} node(s).", ids.len());
            removed > 0
        }

        Commands::Similar {
            query,
            max_distance,
        } => {
            let matches = engine.find_similar_labels(&query, max_distance);
            if matches.is_empty() {
                println!("No similar labels.");
            }
            for m in &matches {
                println!("  {} \"{}\" (distance {})", m.id, m.label, m.distance);
            }
            false
        }

        Commands::Duplicates => {
            let candidates = engine.duplicate_candidates();
            if candidates.is_empty() {
                println!("No duplicate candidates.");
            }
            for c in &candidates {
                println!(
                    "  \"{}\" ({}) ~ \"{}\" ({}) distance {} similarity {:.2}",
                    c.keep_label, c.keep, c.drop_label, c.drop, c.distance, c.similarity
                );
            }
            false
        }

        Commands::Metrics { reset } => {
            if reset {
                engine.reset_metrics();
            }
            report_enrichment(engine.recalculate_metrics().await?);
            false
        }

        Commands::Slice { year, format } => {
            let slice = engine.slice_at_year(year);
            print!("{}", export::render(&slice, format)?);
            false
        }

        Commands::Undo => {
            match engine.undo()? {
                Some(graph) => println!("Restored revision {}.", graph.revision()),
                None => println!("Nothing to undo."),
            }
            false
        }

        Commands::Redo => {
            match engine.redo()? {
                Some(graph) => println!("Restored revision {}.", graph.revision()),
                None => println!("Nothing to redo."),
            }
            false
        }

        Commands::Export { format, out } => {
            let graph = engine.graph();
            match out {
                Some(path) => {
                    export::write_file(&graph, format, &path)?;
                    println!("Wrote {} to {}", format.extension(), path.display());
                }
                None => print!("{}", export::render(&graph, format)?),
            }
            false
        }

        Commands::Info => {
            println!("{}", engine.info());
            if let Some(warning) = engine.status().last_warning {
                println!("  warning:      {warning}");
            }
            false
        }
    };

    if mutated && !cli.skip_metrics {
        report_enrichment(engine.recalculate_metrics().await?);
    }

    Ok(())
}

fn print_report(report: &ReconcileReport) {
    println!(
        "Nodes: {} created, {} updated, {} resolved by label",
        report.nodes_created, report.nodes_updated, report.nodes_resolved
    );
    println!(
        "Edges: {} added, {} dropped ({} duplicate, {} dangling, {} self-loop)",
        report.edges_added,
        report.edges_dropped(),
        report.duplicate_edges,
        report.dangling_edges,
        report.self_loops
    );
    for reason in &report.rejected {
        println!("  rejected: {reason}");
    }
    for dup in &report.possible_duplicates {
        println!(
            "  possible duplicate: \"{}\" ({}) ~ \"{}\" ({}), distance {}",
            dup.patch_label, dup.patch_id, dup.existing_label, dup.existing_id, dup.distance
        );
    }
}

fn print_conflicts(conflicts: &[Conflict]) {
    for conflict in conflicts {
        println!(
            "  {}  \"{}\" {}: {} -> {}",
            conflict.key(),
            conflict.entity_label,
            conflict.field,
            conflict.existing_value,
            conflict.proposed_value
        );
    }
}

fn report_enrichment(outcome: EnrichOutcome) {
    match outcome {
        EnrichOutcome::Enriched {
            failed_metrics,
            betweenness_exact,
            balance,
        } => {
            println!(
                "Metrics updated (balance {balance:.3}, betweenness {}).",
                if betweenness_exact { "exact" } else { "sampled" }
            );
            if !failed_metrics.is_empty() {
                println!("  fell back to defaults: {}", failed_metrics.join(", "));
            }
        }
        EnrichOutcome::Superseded => println!("Metrics superseded by a newer change."),
        EnrichOutcome::Failed { warning } => println!("Metrics not updated: {warning}"),
    }
}
