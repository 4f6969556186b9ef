use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use structmerge::{
    InjectionPosition, InjectionSpec, MergeOptions, MergeResult, OutlineBackend, OutlineNode, Preference, Side,
    SmartMerger, StatementMatcher,
};
use structmerge_core::config::{MarkerConfig, Settings, SETTINGS_FILE};
use structmerge_core::logging::init_logging;

#[derive(Parser)]
#[command(
    name = "structmerge",
    about = "Merge a template into a destination document, keeping local edits"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .structmerge configuration directory
    #[arg(long, global = true, default_value = ".structmerge")]
    config_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a whole template into a destination
    Merge {
        template: PathBuf,
        destination: PathBuf,
        /// Write the merged document here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write a JSON report of every decision
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print a unified diff of destination vs. merged output
        #[arg(long)]
        diff: bool,
        /// Override the configured preference (template|destination)
        #[arg(long)]
        preference: Option<Side>,
        /// Append template content the destination lacks
        #[arg(long)]
        add_template_only: bool,
    },
    /// Apply a template at one injection point of the destination
    Partial {
        template: PathBuf,
        destination: PathBuf,
        /// Node type of the anchor statement (e.g. heading)
        #[arg(long)]
        anchor_type: String,
        /// Regex the anchor text must match
        #[arg(long)]
        anchor_text: Option<String>,
        /// replace|before|after|first_child|last_child
        #[arg(long)]
        position: InjectionPosition,
        /// Node type ending a replaced range
        #[arg(long)]
        boundary_type: Option<String>,
        /// Regex ending a replaced range
        #[arg(long)]
        boundary_text: Option<String>,
        /// Skip boundary candidates nested deeper than the anchor
        #[arg(long)]
        same_or_shallower: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        diff: bool,
    },
    /// Merge every file of a template directory into the same-named destination file
    Batch {
        template_dir: PathBuf,
        destination_dir: PathBuf,
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Run interactive setup wizard
    Setup,
}

fn settings_path(cli: &Cli) -> PathBuf {
    cli.config_dir.join(SETTINGS_FILE)
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let path = settings_path(cli);
    Settings::load_or_default(&path).with_context(|| format!("failed to load {}", path.display()))
}

fn log_dir(cli: &Cli, settings: &Settings) -> PathBuf {
    cli.config_dir.join(&settings.logging.dir)
}

fn build_merger(settings: &Settings, options: MergeOptions) -> anyhow::Result<SmartMerger<OutlineBackend>> {
    let backend = OutlineBackend::new(settings.marker_registry()?);
    Ok(SmartMerger::new(backend, options))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Setup => cmd_setup(&cli).await,
        Commands::Merge {
            template,
            destination,
            output,
            report,
            diff,
            preference,
            add_template_only,
        } => {
            let overrides = MergeOverrides {
                preference: *preference,
                add_template_only: *add_template_only,
            };
            let target = Target {
                destination,
                output: output.as_deref(),
                report: report.as_deref(),
                diff: *diff,
            };
            cmd_merge(&cli, template, overrides, target).await
        }
        Commands::Partial {
            template,
            destination,
            anchor_type,
            anchor_text,
            position,
            boundary_type,
            boundary_text,
            same_or_shallower,
            output,
            diff,
        } => {
            let spec = injection_spec(
                anchor_type,
                anchor_text.as_deref(),
                *position,
                boundary_type.as_deref(),
                boundary_text.as_deref(),
                *same_or_shallower,
            )?;
            let target = Target {
                destination,
                output: output.as_deref(),
                report: None,
                diff: *diff,
            };
            cmd_partial(&cli, template, spec, target).await
        }
        Commands::Batch {
            template_dir,
            destination_dir,
            dry_run,
        } => cmd_batch(&cli, template_dir, destination_dir, *dry_run).await,
    }
}

struct MergeOverrides {
    preference: Option<Side>,
    add_template_only: bool,
}

/// Where a merge result goes.
struct Target<'a> {
    destination: &'a Path,
    output: Option<&'a Path>,
    report: Option<&'a Path>,
    diff: bool,
}

fn injection_spec(
    anchor_type: &str,
    anchor_text: Option<&str>,
    position: InjectionPosition,
    boundary_type: Option<&str>,
    boundary_text: Option<&str>,
    same_or_shallower: bool,
) -> anyhow::Result<InjectionSpec<OutlineNode>> {
    let mut anchor = StatementMatcher::of_type(anchor_type);
    if let Some(pattern) = anchor_text {
        anchor = anchor.with_text(pattern)?;
    }
    let spec = InjectionSpec::new(anchor, position);
    if boundary_type.is_none() && boundary_text.is_none() {
        return Ok(spec);
    }
    let mut boundary = StatementMatcher::any();
    if let Some(node_type) = boundary_type {
        boundary = boundary.with_type(node_type);
    }
    if let Some(pattern) = boundary_text {
        boundary = boundary.with_text(pattern)?;
    }
    Ok(spec.with_boundary(boundary, same_or_shallower)?)
}

async fn read_source(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

async fn cmd_merge(cli: &Cli, template: &Path, overrides: MergeOverrides, target: Target<'_>) -> anyhow::Result<()> {
    let settings = load_settings(cli)?;
    let _guard = init_logging(&log_dir(cli, &settings), &settings.logging.filter)?;

    let mut options = settings.merge_options()?;
    if let Some(side) = overrides.preference {
        options.preference = Preference::Global(side);
    }
    if overrides.add_template_only {
        options.add_template_only_nodes = true;
    }
    let merger = build_merger(&settings, options)?;

    let template_src = read_source(template).await?;
    let destination_src = read_source(target.destination).await?;
    let result = merger.merge(&template_src, &destination_src)?;
    tracing::info!(
        template = %template.display(),
        destination = %target.destination.display(),
        changed = result.has_changes(),
        "merged"
    );
    emit(&result, &destination_src, &target).await
}

async fn cmd_partial(
    cli: &Cli,
    template: &Path,
    spec: InjectionSpec<OutlineNode>,
    target: Target<'_>,
) -> anyhow::Result<()> {
    let settings = load_settings(cli)?;
    let _guard = init_logging(&log_dir(cli, &settings), &settings.logging.filter)?;
    let merger = build_merger(&settings, settings.merge_options()?)?;

    let template_src = read_source(template).await?;
    let destination_src = read_source(target.destination).await?;
    let result = merger.merge_partial(&template_src, &destination_src, &spec)?;
    emit(&result, &destination_src, &target).await
}

async fn emit(result: &MergeResult, destination_src: &str, target: &Target<'_>) -> anyhow::Result<()> {
    if target.diff {
        print!("{}", render_diff(destination_src, result.content(), target.destination));
    }
    if let Some(report) = target.report {
        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(report, json)
            .await
            .with_context(|| format!("failed to write report {}", report.display()))?;
    }
    match target.output {
        Some(path) => {
            tokio::fs::write(path, result.content())
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None if !target.diff => print!("{}", result.content()),
        None => {}
    }

    let summary: Vec<String> = result
        .summary()
        .iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .collect();
    eprintln!("{} decisions: {}", result.decisions().len(), summary.join(", "));
    Ok(())
}

fn render_diff(before: &str, after: &str, path: &Path) -> String {
    let name = path.display().to_string();
    let diff = similar::TextDiff::from_lines(before, after);
    let mut unified = diff.unified_diff();
    unified
        .context_radius(3)
        .header(&format!("a/{name}"), &format!("b/{name}"));
    unified.to_string()
}

/// Regular files of `template_dir` that also exist in `destination_dir`.
fn pair_files(template_dir: &Path, destination_dir: &Path) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
    let mut pairs = Vec::new();
    for entry in std::fs::read_dir(template_dir)
        .with_context(|| format!("failed to read {}", template_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let destination = destination_dir.join(entry.file_name());
        if destination.is_file() {
            pairs.push((entry.path(), destination));
        } else {
            tracing::debug!(file = %entry.path().display(), "no destination counterpart, skipping");
        }
    }
    pairs.sort();
    Ok(pairs)
}

async fn cmd_batch(cli: &Cli, template_dir: &Path, destination_dir: &Path, dry_run: bool) -> anyhow::Result<()> {
    let settings = load_settings(cli)?;
    let _guard = init_logging(&log_dir(cli, &settings), &settings.logging.filter)?;
    let merger = Arc::new(build_merger(&settings, settings.merge_options()?)?);

    let pairs = pair_files(template_dir, destination_dir)?;
    tracing::info!(files = pairs.len(), dry_run, "starting batch merge");

    let mut handles = Vec::with_capacity(pairs.len());
    for (template, destination) in pairs {
        let merger = merger.clone();
        handles.push(tokio::task::spawn_blocking(move || -> anyhow::Result<(PathBuf, bool)> {
            let template_src = std::fs::read_to_string(&template)?;
            let destination_src = std::fs::read_to_string(&destination)?;
            let result = merger
                .merge(&template_src, &destination_src)
                .with_context(|| format!("failed to merge {}", destination.display()))?;
            if result.has_changes() && !dry_run {
                std::fs::write(&destination, result.content())?;
            }
            Ok((destination, result.has_changes()))
        }));
    }

    let mut failures = 0;
    for handle in handles {
        match handle.await? {
            Ok((path, true)) => println!("{} {}", if dry_run { "would update" } else { "updated" }, path.display()),
            Ok((path, false)) => println!("unchanged {}", path.display()),
            Err(e) => {
                failures += 1;
                tracing::error!(error = %format!("{e:#}"), "batch merge failed");
                eprintln!("error: {e:#}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} file(s) failed to merge");
    }
    Ok(())
}

async fn cmd_setup(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.config_dir)?;

    println!();
    println!("structmerge - Setup Wizard");
    println!("==========================");
    println!();

    let mut settings = load_settings(cli)?;

    let sides = vec!["destination", "template"];
    let side_idx = dialoguer::Select::new()
        .with_prompt("On conflict, keep which side?")
        .items(&sides)
        .default(0)
        .interact()?;
    settings.merge.preference = serde_json::Value::String(sides[side_idx].to_string());

    settings.merge.add_template_only_nodes = dialoguer::Confirm::new()
        .with_prompt("Append template content missing from the destination?")
        .default(settings.merge.add_template_only_nodes)
        .interact()?;

    settings.refiner.enabled = dialoguer::Confirm::new()
        .with_prompt("Pair similar (not identical) lines by fuzzy matching?")
        .default(settings.refiner.enabled)
        .interact()?;
    if settings.refiner.enabled {
        settings.refiner.threshold = dialoguer::Input::new()
            .with_prompt("Similarity threshold (0.0 - 1.0)")
            .default(settings.refiner.threshold)
            .validate_with(|value: &f64| {
                if (0.0..=1.0).contains(value) {
                    Ok(())
                } else {
                    Err("threshold must be within 0.0 and 1.0")
                }
            })
            .interact_text()?;
    }

    println!();
    while dialoguer::Confirm::new()
        .with_prompt("Add a freeze marker comment style?")
        .default(false)
        .interact()?
    {
        let name: String = dialoguer::Input::new().with_prompt("Style name").interact_text()?;
        let open: String = dialoguer::Input::new()
            .with_prompt("Comment opener (e.g. --)")
            .interact_text()?;
        let close: String = dialoguer::Input::new()
            .with_prompt("Comment closer (empty for line comments)")
            .allow_empty(true)
            .interact_text()?;
        settings.freeze.extra_markers.push(MarkerConfig {
            name,
            open,
            close: (!close.trim().is_empty()).then_some(close),
        });
    }

    // Reject anything the engine would refuse before writing it out.
    settings.merge_options()?;
    settings.marker_registry()?;

    let path = settings_path(cli);
    settings.save(&path)?;
    println!();
    println!("Configuration saved to {}", path.display());
    Ok(())
}
