//! msgpass - Concurrent In-Process Mailboxes
//!
//! Main entry point for the msgpass demo CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use msgpass::config::{validate_config_result, MsgPassConfig};
use msgpass::demo::{self, Step};
use msgpass::mail::Postmaster;
use std::path::PathBuf;
use std::process;

/// msgpass - exercise the mailbox library from the command line
#[derive(Parser, Debug)]
#[command(name = "msgpass")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/msgpass/config.yaml)
    #[arg(short, long, env = "MSGPASS_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send three messages around and check every delivery
    Scenario,

    /// Make every kind of invalid call and check each is rejected
    BadInput,

    /// Run producers and consumers concurrently
    Stress {
        /// Producer threads (overrides config)
        #[arg(short, long)]
        producers: Option<usize>,

        /// Consumer threads (overrides config)
        #[arg(short, long)]
        consumers: Option<usize>,

        /// Messages per producer (overrides config)
        #[arg(short, long)]
        messages: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    if let Err(e) = msgpass::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Scenario => {
            let config = load_config(&cli)?;
            let postmaster = build_postmaster(&config)?;
            let steps = demo::run_scenario(&postmaster)?;
            print_steps(&steps, cli.json)?;
        }
        Commands::BadInput => {
            let config = load_config(&cli)?;
            let postmaster = build_postmaster(&config)?;
            let steps = demo::run_bad_input(&postmaster)?;
            print_steps(&steps, cli.json)?;
        }
        Commands::Stress {
            producers,
            consumers,
            messages,
        } => {
            let mut config = load_config(&cli)?;
            if let Some(producers) = *producers {
                config.stress.producers = producers;
            }
            if let Some(consumers) = *consumers {
                config.stress.consumers = consumers;
            }
            if let Some(messages) = *messages {
                config.stress.messages_per_producer = messages;
            }
            validate_config_result(&config)?;

            let postmaster = build_postmaster(&config)?;
            let report = demo::run_stress(&postmaster, &config.stress);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("created:              {}", report.created);
                println!("allocation failures:  {}", report.allocation_failures);
                println!("payload writes lost:  {}", report.payload_writes_rejected);
                println!("sent:                 {}", report.sent);
                println!("sends rejected:       {}", report.sends_rejected);
                println!("received:             {}", report.received);
                println!("payload reads raced:  {}", report.payload_reads_raced);
                println!("deleted:              {}", report.deleted);
                println!("stale receives:       {}", report.stale_receives);
                println!("live after:           {}", report.live_after);
                println!("pending after:        {}", report.pending_after);
            }

            if !report.is_clean() {
                anyhow::bail!("stress run saw stale receives, lost payload writes or leaked messages");
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = load_config(&cli)?;
                validate_config_result(&config)?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    print!("{}", serde_yaml::to_string(&config)?);
                }
            }
            ConfigCommands::Init { force } => {
                let path = cli.config.clone().unwrap_or_else(MsgPassConfig::default_path);
                if path.exists() && !*force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    );
                }
                MsgPassConfig::default().save(&path)?;
                println!("Wrote {}", path.display());
            }
        },
    }

    if cli.metrics {
        print!("{}", msgpass::metrics::encode_metrics()?);
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<MsgPassConfig> {
    MsgPassConfig::load_or_default(cli.config.as_deref()).context("loading configuration")
}

fn build_postmaster(config: &MsgPassConfig) -> anyhow::Result<Postmaster> {
    Postmaster::from_config(&config.mail).context("building postmaster")
}

fn print_steps(steps: &[Step], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(steps)?);
        return Ok(());
    }

    for step in steps {
        match step.handle {
            Some(handle) => println!("{:<20} {:<18} {}", step.call, step.status.as_str(), handle),
            None => println!("{:<20} {}", step.call, step.status.as_str()),
        }
    }
    Ok(())
}
