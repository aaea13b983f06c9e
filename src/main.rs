use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

mod aggregate;
mod cross;
mod input;
mod reference;
mod report;
mod types;

use aggregate::CompatibilityAnalyzer;
use input::ParentInput;
use reference::ReferenceTable;
use report::ReportGenerator;
use types::{CompatibilityReport, RiskTier};

/// Offspring pharmacogenomic compatibility analysis tool
#[derive(Parser, Debug)]
#[command(
    name = "pgx-compatibility",
    version,
    about = "Predict offspring pharmacogenomic risk from two parental genotypes",
    long_about = r#"
Runs a Mendelian (Punnett) cross per gene between two parental diplotypes,
resolves each possible offspring diplotype to a metabolizer phenotype and
risk tier via a CPIC-aligned reference table, and aggregates the results
into an overall compatibility report.

Parent inputs are JSON objects mapping gene symbols to diplotype strings,
e.g. {"CYP2C19": "*1/*2", "TPMT": "*1/*3A"}.
"#
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Parent A genotype file (JSON: gene -> "ALLELE1/ALLELE2")
    #[arg(short = 'a', long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    parent_a: Option<PathBuf>,

    /// Parent B genotype file (JSON: gene -> "ALLELE1/ALLELE2")
    #[arg(short = 'b', long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    parent_b: Option<PathBuf>,

    /// Genes to evaluate (default: every gene in the reference table)
    #[arg(short, long, value_name = "GENES", num_args = 1..)]
    genes: Vec<String>,

    /// Reference table TOML file (default: builtin CPIC-aligned table)
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    reference: Option<PathBuf>,

    /// Compute the joint offspring-profile probability table
    #[arg(short, long)]
    joint: bool,

    /// Probability floor: branches at or below it never drive the overall risk
    #[arg(long, default_value = "0.0")]
    probability_floor: f64,

    /// Interactive mode with prompts for all parameters
    #[arg(short, long, help = "Interactive mode with default values")]
    interactive: bool,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value = "0", help = "Number of threads (0 = auto)")]
    threads: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Output directory for reports
    #[arg(short, long, default_value = "./reports")]
    output: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions
    Completions { shell: Shell },
    /// List the genes in the loaded reference table
    Genes {
        /// Reference table TOML file (default: builtin)
        #[arg(long, value_name = "FILE")]
        reference: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Csv,
    Tsv,
    All,
}

impl From<OutputFormat> for report::ReportFormat {
    fn from(format: OutputFormat) -> report::ReportFormat {
        match format {
            OutputFormat::Json => report::ReportFormat::Json,
            OutputFormat::Csv => report::ReportFormat::Csv,
            OutputFormat::Tsv => report::ReportFormat::Tsv,
            OutputFormat::All => report::ReportFormat::All,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle shell completions
    if let Some(shell) = cli.completions {
        generate_completions(shell);
        return Ok(());
    }

    if let Some(Commands::Completions { shell }) = cli.command {
        generate_completions(shell);
        return Ok(());
    }

    if let Some(Commands::Genes { reference }) = &cli.command {
        list_genes(reference.as_deref())?;
        return Ok(());
    }

    // Initialize logging
    init_logging(cli.verbose);

    // Run interactive mode if requested
    let config = if cli.interactive {
        run_interactive_mode()?
    } else {
        AppConfig::from_cli(&cli)?
    };

    // Initialize thread pool
    init_thread_pool(config.threads)?;

    info!("Starting offspring compatibility analysis...");
    info!("Using {} threads", rayon::current_num_threads());

    run_analysis(config)?;

    Ok(())
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn list_genes(reference: Option<&std::path::Path>) -> Result<()> {
    let loaded;
    let table = match reference {
        Some(path) => {
            loaded = ReferenceTable::from_toml_path(path)?;
            &loaded
        }
        None => ReferenceTable::builtin(),
    };

    println!("{}", style("Reference Table Genes:").bold().cyan());
    println!();
    for symbol in table.gene_symbols() {
        let gene = table.gene(symbol)?;
        let alleles: Vec<&str> = gene.alleles().collect();
        println!(
            "  {} - {}",
            style(symbol).green().bold(),
            style(alleles.join(", ")).yellow()
        );
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("pgx_compatibility={}", level))
        .init();
}

fn init_thread_pool(threads: usize) -> Result<()> {
    let num_threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow::anyhow!("Failed to initialize thread pool: {}", e))?;

    Ok(())
}

fn run_interactive_mode() -> Result<AppConfig> {
    println!(
        "{}",
        style("╔══════════════════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║     Offspring Compatibility Analysis - Interactive Mode      ║")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("╚══════════════════════════════════════════════════════════════╝").cyan()
    );
    println!();

    let theme = ColorfulTheme::default();

    let parent_a: String = Input::with_theme(&theme)
        .with_prompt("Parent A genotype file (JSON)")
        .interact_text()?;

    let parent_b: String = Input::with_theme(&theme)
        .with_prompt("Parent B genotype file (JSON)")
        .interact_text()?;

    let genes_input: String = Input::with_theme(&theme)
        .with_prompt("Genes to evaluate (space-separated, empty = all reference genes)")
        .allow_empty(true)
        .interact_text()?;

    let genes: Vec<String> = genes_input
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let reference_input: String = Input::with_theme(&theme)
        .with_prompt("Reference table TOML file (empty = builtin)")
        .allow_empty(true)
        .interact_text()?;

    let reference = if reference_input.is_empty() {
        None
    } else {
        Some(PathBuf::from(reference_input))
    };

    let joint = Confirm::with_theme(&theme)
        .with_prompt("Compute joint offspring-profile probabilities?")
        .default(false)
        .interact()?;

    let probability_floor: f64 = Input::with_theme(&theme)
        .with_prompt("Probability floor for the overall risk tier")
        .default(0.0)
        .interact_text()?;

    let formats = vec!["JSON", "CSV", "TSV", "All formats"];
    let format_idx = Select::with_theme(&theme)
        .with_prompt("Select output format")
        .default(0)
        .items(&formats)
        .interact()?;

    let format = match format_idx {
        0 => OutputFormat::Json,
        1 => OutputFormat::Csv,
        2 => OutputFormat::Tsv,
        3 => OutputFormat::All,
        _ => OutputFormat::Json,
    };

    let output: String = Input::with_theme(&theme)
        .with_prompt("Output directory")
        .default("./reports".to_string())
        .interact_text()?;

    let threads: usize = Input::with_theme(&theme)
        .with_prompt("Number of threads (0 = auto-detect)")
        .default(0)
        .interact_text()?;

    Ok(AppConfig {
        parent_a: PathBuf::from(parent_a),
        parent_b: PathBuf::from(parent_b),
        genes,
        reference,
        joint,
        probability_floor,
        threads,
        format,
        output: PathBuf::from(output),
    })
}

fn run_analysis(config: AppConfig) -> Result<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );

    // Step 1: Load the reference table
    pb.set_message("Loading reference table...");
    let loaded;
    let table = match &config.reference {
        Some(path) => {
            loaded = ReferenceTable::from_toml_path(path)?;
            &loaded
        }
        None => ReferenceTable::builtin(),
    };
    pb.set_position(10);

    info!("Reference table covers {} genes", table.len());

    // Step 2: Parse parent inputs
    pb.set_message("Parsing parent A genotype...");
    let parent_a = ParentInput::from_path(&config.parent_a)?;
    pb.set_position(25);

    pb.set_message("Parsing parent B genotype...");
    let parent_b = ParentInput::from_path(&config.parent_b)?;
    pb.set_position(40);

    info!(
        "Parent A covers {} genes, parent B covers {} genes",
        parent_a.len(),
        parent_b.len()
    );

    // Step 3: Resolve the requested gene set
    let genes: BTreeSet<String> = if config.genes.is_empty() {
        table.gene_symbols().map(str::to_string).collect()
    } else {
        config.genes.iter().cloned().collect()
    };

    // Step 4: Aggregate per-gene crosses
    pb.set_message("Computing offspring risk profiles...");
    let analyzer = CompatibilityAnalyzer::new()
        .with_probability_floor(config.probability_floor)
        .with_joint_table(config.joint);
    let report = analyzer.aggregate(table, &parent_a, &parent_b, &genes)?;
    pb.set_position(80);

    for failed in &report.failed_genes {
        warn!("Gene {} failed: {}", failed.gene, failed.reason);
    }

    // Step 5: Write reports
    pb.set_message("Writing reports...");
    let generator = ReportGenerator::new(&config.output)?;
    let written = generator.generate(&report, config.format.into())?;
    pb.set_position(100);

    pb.finish_with_message("Analysis complete!");

    print_summary(&report);

    println!(
        "\n{} Reports saved to: {}",
        style("✓").green().bold(),
        style(config.output.display()).cyan()
    );
    for path in written {
        println!("  {}", style(path).dim());
    }

    Ok(())
}

fn print_summary(report: &CompatibilityReport) {
    let overall = match report.overall_risk {
        RiskTier::Normal => style("normal").green().bold(),
        RiskTier::Caution => style("caution").yellow().bold(),
        RiskTier::Warning => style("warning").color256(208).bold(),
        RiskTier::Danger => style("danger").red().bold(),
        RiskTier::Unknown => style("unknown").dim().bold(),
    };

    println!("\n{} {}", style("Overall risk:").bold(), overall);

    for outcome in &report.outcomes {
        println!(
            "\n  {} ({} x {})",
            style(&outcome.gene).cyan().bold(),
            outcome.parent_a,
            outcome.parent_b
        );
        for entry in &outcome.entries {
            println!(
                "    {:>5.1}%  {} - {} ({})",
                entry.probability * 100.0,
                entry.diplotype,
                entry.phenotype,
                entry.risk
            );
        }
    }

    if !report.skipped_genes.is_empty() {
        println!("\n  {}", style("Skipped genes:").bold());
        for skipped in &report.skipped_genes {
            println!("    {} (missing from {})", skipped.gene, skipped.missing_from);
        }
    }

    if !report.failed_genes.is_empty() {
        println!("\n  {}", style("Failed genes:").bold());
        for failed in &report.failed_genes {
            println!("    {} ({})", failed.gene, failed.reason);
        }
    }

    if !report.coverage_caveats.is_empty() {
        println!(
            "\n  {} {} diplotype(s) had no reference coverage",
            style("Note:").bold(),
            report.coverage_caveats.len()
        );
    }
}

#[derive(Debug)]
struct AppConfig {
    parent_a: PathBuf,
    parent_b: PathBuf,
    genes: Vec<String>,
    reference: Option<PathBuf>,
    joint: bool,
    probability_floor: f64,
    threads: usize,
    format: OutputFormat,
    output: PathBuf,
}

impl AppConfig {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let parent_a = cli
            .parent_a
            .clone()
            .context("--parent-a is required outside interactive mode")?;
        let parent_b = cli
            .parent_b
            .clone()
            .context("--parent-b is required outside interactive mode")?;

        Ok(Self {
            parent_a,
            parent_b,
            genes: cli.genes.clone(),
            reference: cli.reference.clone(),
            joint: cli.joint,
            probability_floor: cli.probability_floor,
            threads: cli.threads,
            format: cli.format,
            output: cli.output.clone(),
        })
    }
}
