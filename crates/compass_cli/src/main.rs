mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use compass_core::ReportType;
use compass_core::config::{self, PartialConfig};
use compass_core::state::TaskCategory;
use miette::Result;
use tracing::info;

use crate::commands::vitals::VitalsInput;

#[derive(Parser)]
#[command(name = "compass-cli")]
#[command(about = "COMPASS health coach CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// COMPASS server base URL (overrides config)
    #[arg(long)]
    server: Option<String>,

    /// Directory for local health data (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the COMPASS server and Twilio status
    Status,
    /// Send an emergency SOS alert
    Sos {
        /// Skip the countdown
        #[arg(long)]
        now: bool,

        /// Where you are, sent with the alert
        #[arg(long)]
        location: Option<String>,
    },
    /// Send a health report
    Report {
        /// family or doctor
        report_type: ReportType,
    },
    /// Send a Twilio test message
    TestTwilio {
        /// Number to text, defaults to the first emergency contact
        number: Option<String>,
    },
    /// Daily task management
    Tasks {
        #[command(subcommand)]
        cmd: TaskCommands,
    },
    /// Vital signs
    Vitals {
        #[command(subcommand)]
        cmd: VitalsCommands,
    },
    /// Patient profile
    Profile {
        #[command(subcommand)]
        cmd: ProfileCommands,
    },
    /// Health score and progress
    Score,
    /// Recent activity log
    Events {
        /// Maximum number of events
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Reports saved while the server was unreachable
    Pending {
        #[command(subcommand)]
        cmd: PendingCommands,
    },
    /// Show or set the display theme
    Theme {
        /// New theme name
        name: Option<String>,
    },
    /// Export all health data as JSON
    Export {
        /// Destination file
        path: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Poll the server status until interrupted
    Watch,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List today's tasks
    List,
    /// Schedule a new task
    Add {
        name: String,
        /// medication, activity, vitals or other
        #[arg(long, default_value = "other")]
        category: TaskCategory,
        /// Time of day, e.g. 08:00 or 8:30 PM (defaults to now)
        #[arg(long)]
        time: Option<String>,
    },
    /// Mark a task as done
    Complete { id: u64 },
    /// Delete a task
    Remove { id: u64 },
}

#[derive(Subcommand)]
enum VitalsCommands {
    /// Show the latest readings
    Show,
    /// Record new readings
    Set {
        /// Heart rate, beats/min
        #[arg(long)]
        hr: Option<u32>,
        /// Blood pressure, e.g. 120/80
        #[arg(long)]
        bp: Option<String>,
        /// Blood glucose, mg/dL
        #[arg(long)]
        bg: Option<u32>,
        /// Oxygen saturation, %
        #[arg(long)]
        spo2: Option<u32>,
        /// Temperature, °F
        #[arg(long)]
        temperature: Option<f32>,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show profile and emergency contacts
    Show,
}

#[derive(Subcommand)]
enum PendingCommands {
    /// List reports waiting to be sent
    List,
    /// Try to send every waiting report
    Flush,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Save current configuration to file
    Save {
        /// Path to save configuration
        #[arg(default_value = "compass.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .rgb_colors(miette::RgbColors::Preferred)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();

    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if cli.debug {
        EnvFilter::new("compass_core=debug,compass_cli=debug,warn")
    } else {
        EnvFilter::new("compass_core=info,compass_cli=info,warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .compact()
        .init();

    let config = if let Some(config_path) = &cli.config {
        info!("Loading config from: {:?}", config_path);
        config::load_config(config_path).await?
    } else {
        info!("Loading config from standard locations");
        config::load_config_from_standard_locations().await?
    };

    // Apply CLI overrides
    let config = config::merge_configs(
        config,
        PartialConfig {
            base_url: cli.server.clone(),
            storage_path: cli.data_dir.clone(),
            ..Default::default()
        },
    );
    tracing::debug!("Using server {} and data in {:?}", config.server.base_url, config.storage.path);

    match &cli.command {
        Commands::Status => commands::status::show(&config).await?,
        Commands::Sos { now, location } => {
            commands::alerts::sos(&config, *now, location.clone()).await?
        }
        Commands::Report { report_type } => commands::alerts::report(&config, *report_type).await?,
        Commands::TestTwilio { number } => {
            commands::alerts::test_twilio(&config, number.clone()).await?
        }
        Commands::Tasks { cmd } => match cmd {
            TaskCommands::List => commands::tasks::list(&config).await?,
            TaskCommands::Add {
                name,
                category,
                time,
            } => commands::tasks::add(&config, name, *category, time.as_deref()).await?,
            TaskCommands::Complete { id } => commands::tasks::complete(&config, *id).await?,
            TaskCommands::Remove { id } => commands::tasks::remove(&config, *id).await?,
        },
        Commands::Vitals { cmd } => match cmd {
            VitalsCommands::Show => commands::vitals::show(&config).await?,
            VitalsCommands::Set {
                hr,
                bp,
                bg,
                spo2,
                temperature,
            } => {
                let input = VitalsInput {
                    hr: *hr,
                    bp: bp.clone(),
                    bg: *bg,
                    spo2: *spo2,
                    temperature: *temperature,
                };
                commands::vitals::set(&config, input).await?
            }
        },
        Commands::Profile { cmd } => match cmd {
            ProfileCommands::Show => commands::profile::show(&config).await?,
        },
        Commands::Score => commands::profile::score(&config).await?,
        Commands::Events { limit } => commands::events::list(&config, *limit).await?,
        Commands::Pending { cmd } => match cmd {
            PendingCommands::List => commands::pending::list(&config).await?,
            PendingCommands::Flush => commands::pending::flush(&config).await?,
        },
        Commands::Theme { name } => commands::theme::theme(&config, name.as_deref()).await?,
        Commands::Export { path } => commands::export::export(&config, path).await?,
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => commands::config::show(&config, cli.config.as_deref()).await?,
            ConfigCommands::Save { path } => commands::config::save(&config, path).await?,
        },
        Commands::Watch => commands::status::watch(&config).await?,
    }

    Ok(())
}
