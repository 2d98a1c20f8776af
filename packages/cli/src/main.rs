#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the ecosystem services map.
//!
//! With a subcommand it runs one step non-interactively (`download`,
//! `render`, `users`, `serve`). Without one it shows a menu and guides
//! the user through the same steps with prompts.
//!
//! Uses `indicatif-log-bridge` (via [`ecosystem_map_cli_utils::init_logger`])
//! so that log lines and the download bar never fight for the terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialoguer::Select;
use ecosystem_map_session::Session;
use ecosystem_map_session::config::AppConfig;

#[derive(Parser)]
#[command(name = "ecosystem_map", about = "Ecosystem services map tools")]
struct Cli {
    /// Config file (defaults to `$ECOSYSTEM_MAP_CONFIG` or `ecosystem_map.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the Mergin Maps project, replacing the local copy
    Download,
    /// Render the map for the downloaded data to a standalone HTML file
    Render {
        /// Only show this user's points (repeatable; default: all users)
        #[arg(long = "user")]
        users: Vec<String>,
        /// Output file
        #[arg(long, default_value = "ecosystem_map.html")]
        output: PathBuf,
        /// Also print the filtered rows
        #[arg(long)]
        show_data: bool,
    },
    /// List the usernames found in the downloaded data
    Users,
    /// Start the web server
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(long)]
        bind_addr: Option<String>,
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Top-level tool selection for interactive mode.
enum Tool {
    Download,
    Render,
    ShowData,
    Server,
}

impl Tool {
    const ALL: &[Self] = &[Self::Download, Self::Render, Self::ShowData, Self::Server];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Download => "Download MLA637 data",
            Self::Render => "Render map to file",
            Self::ShowData => "Show filtered data",
            Self::Server => "Start server",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = ecosystem_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_or_default(path)?,
        None => AppConfig::from_env()?,
    };

    let Some(command) = cli.command else {
        return interactive(config, &multi).await;
    };

    match command {
        Commands::Download => {
            let mut session = Session::with_default_backends(config);
            commands::download(&mut session, &multi).await?;
        }
        Commands::Render {
            users,
            output,
            show_data,
        } => {
            let mut session = Session::with_default_backends(config);
            commands::require_snapshot(&mut session)?;
            commands::render_to_file(&mut session, &users, &output, show_data).await?;
        }
        Commands::Users => {
            let mut session = Session::with_default_backends(config);
            commands::require_snapshot(&mut session)?;
            for user in session.known_users()? {
                println!("{user}");
            }
        }
        Commands::Serve { bind_addr, port } => {
            let mut config = config;
            if let Some(bind_addr) = bind_addr {
                config.server.bind_addr = bind_addr;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(ecosystem_map_server::run_server(config))
            })
            .await??;
        }
    }

    Ok(())
}

async fn interactive(
    config: AppConfig,
    multi: &ecosystem_map_cli_utils::MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Ecosystem Services Interactive Map");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Download => {
            let mut session = Session::with_default_backends(config);
            commands::download(&mut session, multi).await?;
        }
        Tool::Render => {
            let mut session = Session::with_default_backends(config);
            commands::interactive_render(&mut session, multi, false).await?;
        }
        Tool::ShowData => {
            let mut session = Session::with_default_backends(config);
            commands::interactive_render(&mut session, multi, true).await?;
        }
        Tool::Server => {
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new()
                    .block_on(ecosystem_map_server::interactive::run(config))
            })
            .await??;
        }
    }

    Ok(())
}
