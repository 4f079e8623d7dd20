pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rfqbrief_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "rfqbrief",
    about = "RFQ briefing CLI",
    long_about = "Build guarded RFQ briefings from extracted facts, validate briefing documents, and inspect templates and configuration.",
    after_help = "Examples:\n  rfqbrief brief --input rfq-1042.json --audit\n  rfqbrief validate --document brief.txt\n  rfqbrief template\n  rfqbrief config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default: rfqbrief.toml or config/rfqbrief.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the briefing pipeline on an input file and print the released report")]
    Brief {
        #[arg(long, help = "Briefing input JSON (rfq record, attachment and web facts)")]
        input: PathBuf,
        #[arg(long, help = "Report template TOML overriding the configured one")]
        template: Option<PathBuf>,
        #[arg(long, help = "Include the audit export in the output")]
        audit: bool,
    },
    #[command(about = "Check a rendered briefing document against the template's output contract")]
    Validate {
        #[arg(long, help = "Rendered briefing text")]
        document: PathBuf,
        #[arg(long, help = "Report template TOML overriding the configured one")]
        template: Option<PathBuf>,
    },
    #[command(about = "Describe the active report template")]
    Template {
        #[arg(long, help = "Report template TOML overriding the configured one")]
        template: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init_logging(&config);
    }

    let result = match cli.command {
        Command::Brief { input, template, audit } => {
            commands::brief::run(&commands::brief::BriefArgs { input, template, audit }, options)
        }
        Command::Validate { document, template } => {
            commands::validate::run(&document, template.as_deref(), options)
        }
        Command::Template { template } => commands::template::run(template.as_deref(), options),
        Command::Config => commands::config::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
