use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rostercrop_core::{DetectionParams, Detector, EvaluatorConfig, RosterIndex, ScrfdDetector, ScrfdEyeDetector};
use std::io::Write;
use std::path::{Path, PathBuf};

mod batch;
mod config;
mod identity;

use batch::CropOptions;
use config::Config;

const RULE_WIDTH: usize = 60;

#[derive(Parser)]
#[command(name = "rostercrop", about = "Crop faces from photos and rename them from an employee roster")]
struct Cli {
    #[command(flatten)]
    dirs: DirArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `ROSTERCROP_*` directory settings.
#[derive(Args)]
struct DirArgs {
    #[arg(long, global = true)]
    photos_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    cropped_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    rename_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    roster: Option<PathBuf>,
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop the best face out of every photo
    Crop(CropArgs),
    /// List files in the cropped directory
    List,
    /// Show what each face crop would be renamed to
    Preview {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy face crops into the rename directory under roster names
    Rename {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show roster statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CropArgs {
    /// Minimum face area relative to the photo (0.0-1.0)
    #[arg(long)]
    min_area: Option<f64>,
    /// Report candidates with fewer eyes than --min-eyes (never rejects)
    #[arg(long)]
    verify_eyes: bool,
    /// Eye count reported against when --verify-eyes is set
    #[arg(long, default_value_t = 1)]
    min_eyes: u32,
    /// Save annotated copies into <cropped>/annotated
    #[arg(long)]
    annotate: bool,
    /// Disable eye scoring
    #[arg(long)]
    no_eyes: bool,
    #[arg(long, default_value_t = DetectionParams::FACE.scale_factor)]
    scale_factor: f32,
    #[arg(long, default_value_t = DetectionParams::FACE.min_neighbors)]
    min_neighbors: u32,
    /// Minimum face side in pixels
    #[arg(long, default_value_t = DetectionParams::FACE.min_size)]
    min_size: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = apply_overrides(Config::from_env(), cli.dirs);

    match cli.command {
        Commands::Crop(args) => run_crop(&config, args),
        Commands::List => run_list(&config),
        Commands::Preview { json } => run_preview(&config, json),
        Commands::Rename { yes } => run_rename(&config, yes),
        Commands::Stats { json } => run_stats(&config, json),
    }
}

fn apply_overrides(mut config: Config, dirs: DirArgs) -> Config {
    if let Some(dir) = dirs.photos_dir {
        config.photos_dir = dir;
    }
    if let Some(dir) = dirs.cropped_dir {
        config.cropped_dir = dir;
    }
    if let Some(dir) = dirs.rename_dir {
        config.rename_dir = dir;
    }
    if let Some(path) = dirs.roster {
        config.roster_path = path;
    }
    if let Some(dir) = dirs.model_dir {
        config.model_dir = dir;
    }
    config
}

fn require_dir(dir: &Path, what: &str) -> Result<()> {
    if !dir.is_dir() {
        bail!("{what} directory not found: {}", dir.display());
    }
    Ok(())
}

fn run_crop(config: &Config, args: CropArgs) -> Result<()> {
    require_dir(&config.photos_dir, "Photos")?;

    let model_path = config.scrfd_model_path();
    let mut faces = ScrfdDetector::load(&model_path).context("loading face detector")?;

    let mut eyes = if config.eyes_enabled && !args.no_eyes {
        match ScrfdEyeDetector::load(&model_path) {
            Ok(eyes) => {
                println!("Eye detection enabled for better accuracy");
                Some(eyes)
            }
            Err(e) => {
                tracing::warn!(error = %e, "eye detector unavailable");
                println!("Eye detector unavailable; using face detection only.");
                None
            }
        }
    } else {
        None
    };

    let options = CropOptions {
        evaluator: EvaluatorConfig {
            min_area_ratio: args.min_area.or(config.min_area_ratio),
            verify_eyes: args.verify_eyes,
            min_eyes: args.min_eyes,
            ..EvaluatorConfig::default()
        },
        face_params: DetectionParams {
            scale_factor: args.scale_factor,
            min_neighbors: args.min_neighbors,
            min_size: args.min_size,
        },
        annotated_dir: (args.annotate || config.annotate).then(|| config.annotated_dir()),
    };

    let summary = batch::crop_directory(
        &config.photos_dir,
        &config.cropped_dir,
        &mut faces,
        eyes.as_mut().map(|e| e as &mut dyn Detector),
        &options,
    )?;

    println!("{}", "-".repeat(40));
    println!("Processed images: {}", summary.images);
    println!("Total faces saved: {}", summary.faces);
    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    require_dir(&config.cropped_dir, "Cropped")?;

    println!("Files in {}:", config.cropped_dir.display());
    println!("{}", "-".repeat(50));

    let files = identity::list_files(&config.cropped_dir)?;
    if files.is_empty() {
        println!("No files found in cropped directory.");
        return Ok(());
    }
    for (i, file) in files.iter().enumerate() {
        println!("{:3}. {} ({:.1} KB)", i + 1, file.name, file.size as f64 / 1024.0);
    }

    println!("{}", "-".repeat(50));
    println!("Total files: {}", files.len());
    Ok(())
}

fn load_roster(config: &Config) -> RosterIndex {
    let index = RosterIndex::load(&config.roster_path);
    if index.is_empty() {
        println!("No employee data loaded; no files can be matched.");
    } else {
        println!("Loaded {} unique employees", index.stats().unique_employees);
    }
    index
}

fn run_preview(config: &Config, json: bool) -> Result<()> {
    require_dir(&config.cropped_dir, "Cropped")?;
    let index = if json {
        RosterIndex::load(&config.roster_path)
    } else {
        load_roster(config)
    };
    let plan = identity::plan_renames(&config.cropped_dir, &index)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("PREVIEW: Files that would be renamed");
    println!("{}", "=".repeat(RULE_WIDTH));
    for item in &plan.matched {
        println!("✓ {}", item.file_name);
        println!("  → {}", item.target_name);
        println!("  Employee: {} ({})", item.employee.full_name, item.employee.department);
        println!();
    }
    for name in &plan.unmatched {
        println!("? No match: {name}");
    }
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("Files that would be renamed: {}", plan.matched.len());
    println!("Unmatched files: {}", plan.unmatched.len());
    Ok(())
}

fn run_rename(config: &Config, yes: bool) -> Result<()> {
    require_dir(&config.cropped_dir, "Cropped")?;

    if !yes && !confirm("Are you sure you want to rename files? (y/N): ")? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let index = load_roster(config);
    println!("{}", "=".repeat(RULE_WIDTH));

    let plan = identity::plan_renames(&config.cropped_dir, &index)?;
    for name in &plan.unmatched {
        println!("? No match found for: {name}");
    }
    let report = identity::apply_renames(&plan, &config.rename_dir)?;

    println!("{}", "=".repeat(RULE_WIDTH));
    println!("Successfully copied: {} files", report.copied);
    if !report.collisions.is_empty() {
        println!("Skipped (target exists): {}", report.collisions.len());
    }
    if !report.failures.is_empty() {
        println!("Failed copies: {}", report.failures.len());
    }
    println!("Unmatched files: {}", plan.unmatched.len());
    if !plan.unmatched.is_empty() {
        println!("\nUnmatched files:");
        for name in &plan.unmatched {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn run_stats(config: &Config, json: bool) -> Result<()> {
    let index = RosterIndex::load(&config.roster_path);
    let stats = index.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if index.is_empty() {
        println!("No employee data loaded.");
        return Ok(());
    }
    println!("Total unique employees: {}", stats.unique_employees);
    println!("Total departments: {}", stats.departments.len());
    println!("\nDepartments:");
    for (department, count) in &stats.departments {
        println!("  - {department}: {count} employees");
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_crop_defaults_match_face_params() {
        let cli = Cli::parse_from(["rostercrop", "crop", "--annotate", "--min-area", "0.05"]);
        let Commands::Crop(args) = cli.command else {
            panic!("expected crop");
        };
        assert!(args.annotate);
        assert_eq!(args.min_area, Some(0.05));
        assert_eq!(args.scale_factor, 1.05);
        assert_eq!(args.min_neighbors, 8);
        assert_eq!(args.min_size, 50);
        assert_eq!(args.min_eyes, 1);
    }

    #[test]
    fn test_global_dir_overrides() {
        let cli = Cli::parse_from(["rostercrop", "preview", "--cropped-dir", "/tmp/crops", "--roster", "staff.txt"]);
        let config = apply_overrides(Config::from_env(), cli.dirs);
        assert_eq!(config.cropped_dir, PathBuf::from("/tmp/crops"));
        assert_eq!(config.roster_path, PathBuf::from("staff.txt"));
    }
}
