//! ehtflow CLI Entry Point
//!
//! Generates a workflow document for one of the built-in EHT pipelines or
//! for a pipeline defined in YAML.
//!
//! # Usage
//!
//! ```bash
//! # Generate the DIFMAP workflow on stdout
//! ehtflow difmap --uvfits-dir data/uvfits --scripts-dir scripts
//!
//! # Write JSON to a file
//! ehtflow smili -u data/uvfits -s scripts --format json --output smili.json
//!
//! # Use a custom pipeline definition
//! ehtflow pipeline.yaml -u data/uvfits -s scripts
//!
//! # List built-in pipelines
//! ehtflow --list
//! ```

use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use colored::Colorize;
use log::{error, info};

use ehtflow::emit::{emit, EmitFormat, Metadata};
use ehtflow::pipeline::builtin::{builtin, builtins};
use ehtflow::pipeline::{GenerateOptions, GeneratedWorkflow, Pipeline};
use ehtflow::workflow::parser::load_pipeline;
use ehtflow::{APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    pipeline: Option<String>,
    uvfits_dir: Option<PathBuf>,
    scripts_dir: Option<PathBuf>,
    output: Option<PathBuf>,
    format: EmitFormat,
    verbose: bool,
    list: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: None,
            uvfits_dir: None,
            scripts_dir: None,
            output: None,
            format: EmitFormat::Yaml,
            verbose: false,
            list: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
///
/// Logs go to stderr so the document can be written to stdout.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| match record.level() {
            log::Level::Warn | log::Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    eprintln!();
    eprintln!("{} v{}", APP_NAME.bold(), VERSION);
    eprintln!("Workflow Graph Generator for EHT Imaging Pipelines");
    eprintln!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: ehtflow [OPTIONS] <PIPELINE>");
    println!();
    println!("Arguments:");
    println!("  <PIPELINE>              Built-in pipeline name or path to a pipeline YAML file");
    println!();
    println!("Options:");
    println!("  -u, --uvfits-dir DIR    Directory of input uvfits files (required)");
    println!("  -s, --scripts-dir DIR   Directory of processing scripts (required)");
    println!("  -o, --output FILE       Write the workflow to FILE instead of stdout");
    println!("  -f, --format FORMAT     Output format: yaml (default) or json");
    println!("  -l, --list              List built-in pipelines");
    println!("  -v, --verbose           Enable debug logging");
    println!("  -h, --help              Show this help message");
    println!("  -V, --version           Show version information");
    println!();
    println!("Examples:");
    println!("  ehtflow difmap -u data/uvfits -s scripts > workflow.yml");
    println!("  ehtflow smili -u data/uvfits -s scripts --format json -o workflow.json");
}

fn print_builtins() {
    println!("Built-in pipelines:");
    for entry in builtins() {
        println!("  {:<14} {}", entry.name.green(), entry.description);
    }
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    let value = |i: usize, flag: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("{} requires an argument", flag))
    };

    while i < args.len() {
        let arg = args[i].as_str();

        match arg {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--list" | "-l" => {
                config.list = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--uvfits-dir" | "-u" => {
                i += 1;
                config.uvfits_dir = Some(PathBuf::from(value(i, arg)?));
            }
            "--scripts-dir" | "-s" => {
                i += 1;
                config.scripts_dir = Some(PathBuf::from(value(i, arg)?));
            }
            "--output" | "-o" => {
                i += 1;
                config.output = Some(PathBuf::from(value(i, arg)?));
            }
            "--format" | "-f" => {
                i += 1;
                config.format = value(i, arg)?.parse()?;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.pipeline.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.pipeline = Some(arg.to_string());
            }
        }
        i += 1;
    }

    if !config.list {
        if config.pipeline.is_none() {
            return Err("a pipeline name or definition file is required".to_string());
        }
        if config.uvfits_dir.is_none() {
            return Err("--uvfits-dir is required".to_string());
        }
        if config.scripts_dir.is_none() {
            return Err("--scripts-dir is required".to_string());
        }
    }

    Ok(config)
}

/// Resolves the pipeline argument: an existing file is loaded, anything else
/// must name a built-in pipeline.
fn select_pipeline(name: &str) -> Result<Pipeline, Box<dyn std::error::Error>> {
    if Path::new(name).is_file() {
        return Ok(load_pipeline(name)?);
    }

    match builtin(name) {
        Some(pipeline) => {
            info!("Using built-in pipeline '{}'", name);
            Ok(pipeline.clone())
        }
        None => {
            let known: Vec<_> = builtins().iter().map(|b| b.name).collect();
            Err(format!(
                "'{}' is neither a pipeline file nor a built-in pipeline ({})",
                name,
                known.join(", ")
            )
            .into())
        }
    }
}

/// Prints a short summary of the generated workflow to stderr.
fn print_summary(workflow: &GeneratedWorkflow, destination: &str) {
    let graph = &workflow.graph;

    eprintln!();
    eprintln!("{} {}", "Workflow:".bold(), graph.name);
    for stage in &graph.stages {
        let count = graph.instances.iter().filter(|i| &i.stage == stage).count();
        eprintln!("  {:<28} {} jobs", stage, count);
    }
    eprintln!(
        "  {} jobs, {} dependencies, {} raw files",
        graph.len().to_string().green(),
        graph.edges.len().to_string().green(),
        graph.raw_artifacts().count()
    );
    eprintln!(
        "  {} entry jobs, {} exit jobs, {} transformations used",
        graph.root_instances().len(),
        graph.leaf_instances().len(),
        graph.used_templates().len()
    );
    eprintln!("  {} {}", "Written to".dimmed(), destination);
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    if config.list {
        print_builtins();
        return Ok(());
    }

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    let name = config.pipeline.unwrap_or_default();
    let pipeline = select_pipeline(&name)?;

    let options = GenerateOptions {
        uvfits_dir: config.uvfits_dir.unwrap_or_default(),
        scripts_dir: config.scripts_dir.unwrap_or_default(),
        work_dir: env::current_dir()?,
    };

    let workflow = pipeline.generate(&options).map_err(|e| {
        error!("Failed to generate workflow '{}': {}", pipeline.name, e);
        e
    })?;

    let created_by = env::var("USER").unwrap_or_else(|_| APP_NAME.to_string());
    let metadata = Metadata::new(created_by, Utc::now());

    let destination = match &config.output {
        Some(path) => {
            let file = File::create(path)?;
            emit(&workflow, &metadata, config.format, BufWriter::new(file))?;
            path.display().to_string()
        }
        None => {
            emit(&workflow, &metadata, config.format, io::stdout().lock())?;
            "stdout".to_string()
        }
    };

    print_summary(&workflow, &destination);
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
