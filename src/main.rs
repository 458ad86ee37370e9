use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Select;
use dupecull::{
    DetectionPipeline, DetectorConfig, DiscoveryOptions, PipelineEvent, PipelinePhase,
    ResolutionController, DEFAULT_THRESHOLD,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dupecull", version, about = "Find and cull near-duplicate images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find and list duplicate groups without touching any file
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Cosine-similarity threshold for duplicates
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
        /// Glob patterns to exclude from the scan
        #[arg(long, value_name = "GLOB")]
        exclude: Vec<String>,
        /// Print groups as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve duplicate groups by keeping one image and deleting the rest
    Cull {
        /// Directory to cull
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Cosine-similarity threshold for duplicates
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
        /// Glob patterns to exclude from the scan
        #[arg(long, value_name = "GLOB")]
        exclude: Vec<String>,
        /// Resolve every group automatically, keeping the first image
        #[arg(long)]
        auto: bool,
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            threshold,
            exclude,
            json,
        } => scan(path, threshold, exclude, json).await,
        Commands::Cull {
            path,
            threshold,
            exclude,
            auto,
            dry_run,
        } => cull(path, threshold, exclude, auto, dry_run).await,
    }
}

fn start_pipeline(
    path: &PathBuf,
    threshold: f32,
    exclude: Vec<String>,
) -> Result<(
    Arc<DetectionPipeline>,
    tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
    tokio::task::JoinHandle<PipelinePhase>,
)> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    let config = DetectorConfig {
        threshold,
        discovery: DiscoveryOptions {
            exclude_patterns: exclude,
            ..Default::default()
        },
    };
    let pipeline = Arc::new(DetectionPipeline::new(config));

    // Ctrl-C requests cooperative cancellation; the worker still delivers its
    // terminal event.
    let canceller = pipeline.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancelling…");
            canceller.cancel();
        }
    });

    let (rx, handle) = pipeline.clone().spawn(path.clone());
    Ok((pipeline, rx, handle))
}

fn spinner() -> Result<ProgressBar> {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

async fn scan(path: PathBuf, threshold: f32, exclude: Vec<String>, json: bool) -> Result<()> {
    let (_pipeline, mut rx, handle) = start_pipeline(&path, threshold, exclude)?;
    let bar = spinner()?;

    let mut groups: Vec<Vec<PathBuf>> = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Status(text) => bar.set_message(text),
            PipelineEvent::DuplicateGroup(paths) => groups.push(paths),
            PipelineEvent::Done => break,
        }
    }
    let phase = handle.await.context("detection worker panicked")?;
    bar.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else if groups.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("Found {} duplicate group(s):", groups.len());
        for (i, group) in groups.iter().enumerate() {
            println!(" Group {}:", i + 1);
            for file in group {
                println!("   ▶ {}", file.display());
            }
        }
    }
    report_terminal_phase(phase);
    Ok(())
}

async fn cull(
    path: PathBuf,
    threshold: f32,
    exclude: Vec<String>,
    auto: bool,
    dry_run: bool,
) -> Result<()> {
    let (_pipeline, mut rx, handle) = start_pipeline(&path, threshold, exclude)?;
    let bar = spinner()?;

    // Dry runs never reach the controller's deletion path.
    let mut controller = ResolutionController::new(auto && !dry_run);

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Status(text) => bar.set_message(text),
            PipelineEvent::DuplicateGroup(paths) => {
                if dry_run {
                    bar.suspend(|| {
                        println!("\n✨ Group ({} images):", paths.len());
                        println!("   🏆 would keep   {}", paths[0].display());
                        for dup in &paths[1..] {
                            println!("   🗑️  would delete {}", dup.display());
                        }
                    });
                    continue;
                }

                let (id, outcome) = controller.on_group_discovered(paths.clone());
                if let Some(outcome) = outcome {
                    bar.suspend(|| {
                        println!(
                            "✨ Group {}: kept {}, deleted {} image(s)",
                            id + 1,
                            paths[0].display(),
                            outcome.deleted
                        );
                    });
                    continue;
                }

                bar.suspend(|| prompt_resolution(&mut controller, id, &paths))?;
            }
            PipelineEvent::Done => break,
        }
    }
    let phase = handle.await.context("detection worker panicked")?;
    bar.finish_and_clear();

    println!(
        "\n{} group(s) found, {} picture(s) deleted.",
        controller.groups_found(),
        controller.pictures_deleted()
    );
    report_terminal_phase(phase);
    Ok(())
}

/// Asks the operator what to do with one group: keep a specific image,
/// delete the whole group, or skip it.
fn prompt_resolution(
    controller: &mut ResolutionController,
    id: dupecull::GroupId,
    paths: &[PathBuf],
) -> Result<()> {
    let mut items: Vec<String> = paths
        .iter()
        .map(|p| format!("Keep {}", p.display()))
        .collect();
    items.push("Delete all".to_string());
    items.push("Skip group".to_string());

    let choice = Select::new()
        .with_prompt(format!("Group {} ({} images)", id + 1, paths.len()))
        .items(&items)
        .default(0)
        .interact()
        .context("selection aborted")?;

    if choice < paths.len() {
        let outcome = controller.resolve_keep_one(id, &paths[choice])?;
        println!(
            "   🏆 kept {}, deleted {} image(s){}",
            paths[choice].display(),
            outcome.deleted,
            if outcome.failed > 0 {
                format!(" ({} failed)", outcome.failed)
            } else {
                String::new()
            }
        );
    } else if choice == paths.len() {
        let outcome = controller.resolve_delete_all(id)?;
        println!("   🗑️  deleted all {} image(s)", outcome.deleted);
    } else {
        controller.skip(id)?;
        println!("   ⏭️  skipped");
    }
    Ok(())
}

fn report_terminal_phase(phase: PipelinePhase) {
    match phase {
        PipelinePhase::Cancelled => println!("Scan cancelled."),
        PipelinePhase::Failed => println!("Scan failed; partial results shown above."),
        _ => {}
    }
}
