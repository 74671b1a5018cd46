// CLI binary: exiting on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use vibe_mapper::describe::{describe_entities, describe_event, describe_session};
use vibe_mapper::error::AppError;
use vibe_mapper::events;
use vibe_mapper::export::{to_xmap_string, write_xmap};
use vibe_mapper::layout;
use vibe_mapper::model::Entity;
use vibe_mapper::paths;
use vibe_mapper::phase::MappingPhase;
use vibe_mapper::scoring::explain_all;
use vibe_mapper::session::{prepare_session, CommandReport, MappingSession};
use vibe_mapper::settings::{self, settings_schema, MapperSettings};
use vibe_mapper::snapshot::{load_snapshot, save_snapshot, unix_now};
use vibe_mapper::util::{from_serde_str, serde_variant_names};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vibemapper-cli", about = "Map an xLights sequence onto your layout", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override (settings and saved session)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Stream session events to stderr as JSON lines
    #[arg(long, global = true)]
    events: bool,
}

/// Layouts a session is built from, plus where its progress is saved.
#[derive(Args)]
struct SessionArgs {
    /// The sequence vendor's xlights_rgbeffects.xml
    #[arg(long)]
    source: PathBuf,
    /// Your xlights_rgbeffects.xml
    #[arg(long)]
    dest: PathBuf,
    /// The .xsq whose effects are being mapped
    #[arg(long)]
    sequence: Option<PathBuf>,
    /// Session snapshot file (defaults to the config directory)
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List a layout's entities by type
    Classify {
        #[arg(long)]
        layout: PathBuf,
    },
    /// Score every source entity against every destination
    Score {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        dest: PathBuf,
        #[arg(long)]
        sequence: Option<PathBuf>,
        /// Show the factor breakdown for each pair
        #[arg(long)]
        explain: bool,
    },
    /// Auto-map a fresh session, save it, and optionally write an .xmap
    Map {
        #[command(flatten)]
        session: SessionArgs,
        /// Sequence label (defaults to the sequence file name)
        #[arg(long)]
        label: Option<String>,
        /// Write the mapping to this .xmap file, or into this directory
        #[arg(long)]
        out: Option<PathBuf>,
        /// Leave sources without effects out of the .xmap
        #[arg(long)]
        effects_only: bool,
    },
    /// Map a source onto a destination in the saved session
    Assign {
        #[command(flatten)]
        session: SessionArgs,
        from: String,
        to: String,
    },
    /// Remove a source's mapping in the saved session
    Unassign {
        #[command(flatten)]
        session: SessionArgs,
        from: String,
    },
    /// Mark a source as deliberately unmapped
    Skip {
        #[command(flatten)]
        session: SessionArgs,
        from: String,
    },
    /// Exchange the destinations of two sources
    Swap {
        #[command(flatten)]
        session: SessionArgs,
        a: String,
        b: String,
    },
    /// Jump the saved session to a phase
    Phase {
        #[command(flatten)]
        session: SessionArgs,
        /// individuals, spinners, finalize or review
        target: String,
    },
    /// Ranked destinations for one source
    Suggest {
        #[command(flatten)]
        session: SessionArgs,
        from: String,
    },
    /// Phase progress and coverage of the saved session
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Show current settings
    Settings {
        /// Print the JSON schema instead
        #[arg(long)]
        schema: bool,
    },
}

// ── Helpers ─────────────────────────────────────────────────────

fn fail(e: &AppError) -> ! {
    eprintln!("Error: {e}");
    process::exit(1);
}

fn print_output<T: Serialize>(message: &str, data: &T, raw_json: bool) {
    if raw_json {
        let json = serde_json::json!({
            "message": message,
            "result": data,
        });
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
    } else {
        println!("{message}");
    }
}

fn print_event(channel: &str, payload: &serde_json::Value) {
    eprintln!("{}", serde_json::json!({ "channel": channel, "payload": payload }));
}

fn stream_events(session: &mut MappingSession, enabled: bool) {
    if enabled {
        session.set_emitter(Box::new(|channel, payload| print_event(channel, &payload)));
    }
}

fn load_entities(layout_path: &Path, sequence: Option<&Path>) -> Result<Vec<Entity>, AppError> {
    let mut parsed = layout::load_layout(layout_path)?;
    if let Some(seq_path) = sequence {
        let effects = layout::load_sequence(seq_path)?;
        layout::apply_sequence(&mut parsed, &effects);
    }
    Ok(parsed.into_iter().map(Entity::from_parsed).collect())
}

fn snapshot_file(args: &SessionArgs, config_dir: &Path) -> PathBuf {
    args.snapshot
        .clone()
        .unwrap_or_else(|| paths::snapshot_path(config_dir))
}

fn label_for(args: &SessionArgs, label: Option<String>) -> String {
    label.unwrap_or_else(|| {
        args.sequence
            .as_deref()
            .or(Some(args.source.as_path()))
            .and_then(Path::file_stem)
            .map_or_else(|| "mapping".to_string(), |s| s.to_string_lossy().to_string())
    })
}

/// Rebuild the saved session against the current layout files.
fn open_session(args: &SessionArgs, config_dir: &Path, settings: MapperSettings) -> Result<MappingSession, AppError> {
    let sources = load_entities(&args.source, args.sequence.as_deref())?;
    let dests = load_entities(&args.dest, None)?;
    let snapshot = load_snapshot(&snapshot_file(args, config_dir), unix_now())?;
    Ok(MappingSession::from_snapshot(sources, dests, settings, &snapshot))
}

fn save_session(session: &MappingSession, args: &SessionArgs, config_dir: &Path) -> Result<(), AppError> {
    save_snapshot(&snapshot_file(args, config_dir), &session.to_snapshot(unix_now()))
}

/// Open the saved session, run one edit, save, and report.
fn edit_session<F>(args: &SessionArgs, config_dir: &Path, settings: MapperSettings, flags: &Flags, edit: F)
where
    F: FnOnce(&mut MappingSession) -> CommandReport,
{
    let mut session = open_session(args, config_dir, settings).unwrap_or_else(|e| fail(&e));
    stream_events(&mut session, flags.events);
    let report = edit(&mut session);
    save_session(&session, args, config_dir).unwrap_or_else(|e| fail(&e));
    let mut message = describe_event(&report.event);
    if let Some(bulk) = &report.bulk_suggestion {
        message.push_str(&format!(
            "\nSuggestion: map {} more {} → {}",
            bulk.pairs.len(),
            bulk.source_family,
            bulk.dest_family
        ));
    }
    print_output(&message, &report, flags.raw);
}

/// Output flags shared by every command.
#[derive(Clone, Copy)]
struct Flags {
    raw: bool,
    events: bool,
}

// ── Main ────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let raw = cli.json;
    let flags = Flags {
        raw,
        events: cli.events,
    };
    let config_dir = cli.config_dir.clone().unwrap_or_else(paths::default_config_dir);
    let settings = settings::load_settings(&config_dir).unwrap_or_default();

    match cli.command {
        Commands::Classify { layout: layout_path } => {
            let entities = load_entities(&layout_path, None).unwrap_or_else(|e| fail(&e));
            print_output(&describe_entities(&entities), &entities, raw);
        }
        Commands::Score {
            source,
            dest,
            sequence,
            explain,
        } => {
            let sources = load_entities(&source, sequence.as_deref()).unwrap_or_else(|e| fail(&e));
            let dests = load_entities(&dest, None).unwrap_or_else(|e| fail(&e));
            let rows = explain_all(&sources, &dests, settings.explain_floor);
            let lines: Vec<String> = rows
                .iter()
                .map(|b| {
                    let mut line = format!("{:.3}  {} → {}  [{:?}]", b.score, b.source, b.dest, b.confidence);
                    if explain {
                        line.push_str(&format!("  {}", b.reason));
                    }
                    line
                })
                .collect();
            print_output(&lines.join("\n"), &rows, raw);
        }
        Commands::Map {
            session: args,
            label,
            out,
            effects_only,
        } => {
            let sources = load_entities(&args.source, args.sequence.as_deref()).unwrap_or_else(|e| fail(&e));
            let dests = load_entities(&args.dest, None).unwrap_or_else(|e| fail(&e));
            let label = label_for(&args, label);
            let stream = flags.events;
            let mut session = prepare_session(label, sources, dests, settings, move |p| {
                if stream {
                    print_event(events::PROGRESS, &serde_json::to_value(&p).unwrap_or_default());
                } else {
                    tracing::debug!(operation = %p.operation, progress = p.progress, "scoring");
                }
            })
            .await
            .unwrap_or_else(|e| fail(&e));

            save_session(&session, &args, &config_dir).unwrap_or_else(|e| fail(&e));
            let export = session.export(effects_only);
            if let Some(out_path) = &out {
                let target = if out_path.is_dir() {
                    paths::xmap_path(out_path, session.label())
                } else {
                    out_path.clone()
                };
                write_xmap(&target, &export).unwrap_or_else(|e| fail(&e));
            }
            let mut message = describe_session(&mut session);
            if out.is_none() && !raw {
                message.push_str("\n\n");
                message.push_str(&to_xmap_string(&export));
            }
            print_output(&message, &export, raw);
        }
        Commands::Assign { session: args, from, to } => {
            edit_session(&args, &config_dir, settings, &flags, |s| s.assign(&from, &to));
        }
        Commands::Unassign { session: args, from } => {
            edit_session(&args, &config_dir, settings, &flags, |s| s.unassign(&from));
        }
        Commands::Skip { session: args, from } => {
            edit_session(&args, &config_dir, settings, &flags, |s| s.skip(&from));
        }
        Commands::Swap { session: args, a, b } => {
            edit_session(&args, &config_dir, settings, &flags, |s| s.swap(&a, &b));
        }
        Commands::Phase { session: args, target } => {
            let Some(phase) = from_serde_str::<MappingPhase>(&target) else {
                fail(&AppError::ValidationError {
                    message: format!(
                        "unknown phase '{target}', expected one of: {}",
                        serde_variant_names(&MappingPhase::ALL).join(", ")
                    ),
                });
            };
            let mut session = open_session(&args, &config_dir, settings).unwrap_or_else(|e| fail(&e));
            stream_events(&mut session, flags.events);
            let reached = session.jump_to(phase).unwrap_or_else(|e| fail(&e));
            save_session(&session, &args, &config_dir).unwrap_or_else(|e| fail(&e));
            print_output(&format!("Now in {reached}"), &session.phase_progress(), raw);
        }
        Commands::Suggest { session: args, from } => {
            let session = open_session(&args, &config_dir, settings).unwrap_or_else(|e| fail(&e));
            let list = session.suggestions(&from);
            let lines: Vec<String> = list
                .iter()
                .map(|m| {
                    let strong = if m.is_strong { " *" } else { "" };
                    let held = m
                        .taken_by
                        .as_deref()
                        .map(|h| format!(" (held by {h})"))
                        .unwrap_or_default();
                    format!("{:.3}  {}{strong}{held}", m.score, m.dest)
                })
                .collect();
            print_output(&lines.join("\n"), &list, raw);
        }
        Commands::Status { session: args } => {
            let mut session = open_session(&args, &config_dir, settings).unwrap_or_else(|e| fail(&e));
            let report = session.coverage_report();
            print_output(&describe_session(&mut session), &report, raw);
        }
        Commands::Settings { schema } => {
            if schema {
                let value = settings_schema();
                print_output(&serde_json::to_string_pretty(&value).unwrap_or_default(), &value, raw);
            } else {
                let text = serde_json::to_string_pretty(&settings).unwrap_or_default();
                print_output(&text, &settings, raw);
            }
        }
    }
}
