use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

use match_admin_hotkeys::bind::{load_config_file, scan_file, BindApplier, CONFIG_FILE_NAME};
use match_admin_hotkeys::handlers::ActionDispatcher;
use match_admin_hotkeys::host::{Console, ConsoleHost, LocalGame, LocalMatch, PlayerId};
use match_admin_hotkeys::keybindings::parse_action_name;
use match_admin_hotkeys::session::{self, format_status};
use match_admin_hotkeys::{ReconcileError, ReconciliationController};

/// Get the default data directory path (~/.config/matchadminhotkeys/)
fn get_data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("matchadminhotkeys"))
}

#[derive(Parser, Debug)]
#[command(
    name = "mah",
    about = "Remap, persist and try out the match admin hotkeys"
)]
struct Args {
    /// Host data directory (binds and settings live in its cfg/ folder)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the saved key assignments
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assign keys and save, e.g. `mah set pause=Q reset=Z`
    Set {
        #[arg(value_name = "ACTION=KEY", required = true)]
        assignments: Vec<String>,
    },
    /// Restore and apply the default keys
    Reset,
    /// List keys in binds.cfg still bound to a hotkey action
    Scan {
        /// Also print the rebind command sequence
        #[arg(long)]
        commands: bool,
    },
    /// Press keys against a simulated in-game match
    Press {
        #[arg(value_name = "KEY", required = true)]
        keys: Vec<String>,
    },
    /// Interactive session reading commands from stdin
    Console,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => get_data_dir()?,
    };
    let host = Arc::new(
        ConsoleHost::open(&data_dir)
            .with_context(|| format!("Failed to open host data at {}", data_dir.display()))?,
    );

    // User-only access to the cfg directory on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let cfg_dir = data_dir.join("cfg");
        if let Err(e) = std::fs::set_permissions(&cfg_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %cfg_dir.display(),
                error = %e,
                "Failed to set cfg directory permissions to 0700"
            );
        }
    }

    let mut controller = ReconciliationController::load(host.clone());

    match args.command {
        Command::Status { json } => {
            let status = controller.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            println!("{}", format_status(&status));

            let cfg_path = host.cfg_dir().join(CONFIG_FILE_NAME);
            match load_config_file(&cfg_path) {
                Ok(parsed) if parsed.assignments == status.snapshot => {
                    println!("{}: in sync", CONFIG_FILE_NAME);
                }
                Ok(_) => println!("{}: differs from saved keys, run `mah set` or `mah reset`", CONFIG_FILE_NAME),
                Err(e) => {
                    tracing::debug!(error = %e, "Private config not loadable");
                    println!("{}: not written yet", CONFIG_FILE_NAME);
                }
            }
        }
        Command::Set { assignments } => {
            for assignment in &assignments {
                let (name, key) = assignment
                    .split_once('=')
                    .with_context(|| format!("Expected ACTION=KEY, got `{}`", assignment))?;
                let action = parse_action_name(name)
                    .with_context(|| format!("Unknown action `{}`", name))?;
                controller.edit(action, key);
            }
            match controller.save() {
                Ok(()) => println!("Keybinds saved"),
                Err(ReconcileError::NothingToSave) => println!("No changes"),
                Err(e) => return Err(e).context("Failed to save keybinds"),
            }
            println!("{}", format_status(&controller.status()));
        }
        Command::Reset => match controller.reset_to_defaults() {
            Ok(()) => println!("Defaults restored"),
            Err(ReconcileError::NothingToSave) => println!("Saved keybinds are already the defaults"),
            Err(e) => return Err(e).context("Failed to restore defaults"),
        },
        Command::Scan { commands } => {
            let phantoms = scan_file(&host.binds_path());
            if phantoms.is_empty() {
                println!("No keys in binds.cfg are bound to hotkey actions");
            }
            for key in &phantoms {
                let command = host.binding(key).unwrap_or_default();
                println!("{:<8} {}", key, command);
            }
            if commands {
                let applier = BindApplier::with_phantoms(phantoms);
                println!("{}", applier.build_bind_commands(controller.snapshot()));
            }
        }
        Command::Press { keys } => {
            let game = Arc::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(1)))));
            let dispatcher = Arc::new(ActionDispatcher::new(host.clone(), game.clone()));
            dispatcher.install(&host);

            for key in &keys {
                if !host.press(key)? {
                    println!("{} is not bound", key);
                }
            }
            if let Some(m) = game.local_match() {
                let (blue, orange) = m.scores();
                println!(
                    "blue {} - {} orange, paused: {}, rounds started: {}",
                    blue.unwrap_or_default(),
                    orange.unwrap_or_default(),
                    m.is_paused(),
                    m.rounds_started()
                );
            }
        }
        Command::Console => {
            let game = Arc::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(1)))));
            let dispatcher = Arc::new(ActionDispatcher::new(host.clone(), game.clone()));
            dispatcher.install(&host);

            let stdin = BufReader::new(tokio::io::stdin());
            session::run(&mut controller, host.clone(), stdin, tokio::io::stdout()).await?;
        }
    }

    Ok(())
}
