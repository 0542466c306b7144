//! Pushtype - Push-to-talk voice dictation for Linux
//!
//! Run with `pushtype` or `pushtype daemon` to start the daemon.
//! Use `pushtype setup` to create the config file and check dependencies.
//! Use `pushtype set-key` to store the Azure API key.

use clap::{Parser, Subcommand};
use pushtype::config::{self, Config, DEFAULT_CONFIG};
use pushtype::secret::{FileSecretStore, SecretStore};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pushtype")]
#[command(author, version, about = "Push-to-talk voice dictation for Linux")]
#[command(long_about = "
Pushtype is a push-to-talk voice dictation daemon for Wayland Linux systems.
Hold a hotkey combo while speaking; release it to transcribe through an
Azure OpenAI Whisper deployment and copy the text to the clipboard.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Run: pushtype setup (to create the config file)
  4. Edit ~/.config/pushtype/config.toml with your Azure endpoint
  5. Run: pushtype set-key (to store your API key)
  6. Run: pushtype (to start the daemon)

USAGE:
  Hold Ctrl+Alt+Space (default) while speaking, release to transcribe.
  Text lands on the clipboard, ready to paste.
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Override the hotkey combo (e.g., "F8", "Ctrl+Alt+Space")
    #[arg(long, value_name = "COMBO")]
    hotkey: Option<String>,

    /// Override the audio input device
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Show current configuration
    Config,

    /// Store the Azure API key (reads from stdin when not given)
    SetKey {
        /// The API key; prefer omitting this so it stays out of shell history
        key: Option<String>,
    },

    /// Create the config file and check dependencies
    Setup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("pushtype={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // First daemon run writes the commented template so the user has a
    // file to edit; other commands never touch it
    if matches!(cli.command, None | Some(Commands::Daemon)) {
        if let Some(path) = cli.config.clone().or_else(Config::default_path) {
            config::ensure_config_file(&path)?;
        }
    }

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides; the daemon keeps them so a reload does not
    // silently drop them
    let overrides = config::Overrides {
        hotkey: cli.hotkey.clone(),
        device: cli.device.clone(),
    };
    overrides.apply(&mut config);

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let secret_store = FileSecretStore::new()?;
            let mut daemon = pushtype::Daemon::new(
                config,
                cli.config.clone(),
                overrides,
                Box::new(secret_store),
            );
            daemon.run().await?;
        }

        Commands::Config => {
            show_config(&config)?;
        }

        Commands::SetKey { key } => {
            set_key(key)?;
        }

        Commands::Setup => {
            run_setup().await?;
        }
    }

    Ok(())
}

/// Store the Azure API key
fn set_key(key: Option<String>) -> anyhow::Result<()> {
    let key = match key {
        Some(key) => key,
        None => {
            print!("API key: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };

    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }

    let store = FileSecretStore::new()?;
    store.save_key(key)?;
    println!("API key saved to {:?}", store.path());
    Ok(())
}

/// Run the setup command
async fn run_setup() -> anyhow::Result<()> {
    println!("Pushtype Setup\n");
    println!("==============\n");

    println!("Creating directories...");
    Config::ensure_directories()?;
    println!(
        "  ✓ Config directory: {:?}",
        Config::config_dir().unwrap_or_default()
    );

    // Create default config file if it doesn't exist
    if let Some(config_path) = Config::default_path() {
        if !config_path.exists() {
            println!("\nCreating default config file...");
            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            println!("  ✓ Created: {:?}", config_path);
        } else {
            println!("\n  Config file exists: {:?}", config_path);
        }
    }

    let mut all_ok = true;

    // Check input group
    println!("\nChecking input group membership...");
    let groups_output = std::process::Command::new("groups").output()?;
    let groups_str = String::from_utf8_lossy(&groups_output.stdout);
    if groups_str.contains("input") {
        println!("  ✓ User is in 'input' group");
    } else {
        println!("  ✗ User is NOT in 'input' group");
        println!("    Run: sudo usermod -aG input $USER");
        println!("    Then log out and back in");
        all_ok = false;
    }

    // Check wl-copy
    println!("\nChecking wl-clipboard...");
    let wlcopy_check = tokio::process::Command::new("which")
        .arg("wl-copy")
        .output()
        .await?;
    if wlcopy_check.status.success() {
        println!("  ✓ wl-copy found");
    } else {
        println!("  ✗ wl-copy not found");
        println!("    Install wl-clipboard via your package manager");
        all_ok = false;
    }

    // Check notify-send
    println!("\nChecking notify-send...");
    let notify_check = tokio::process::Command::new("which")
        .arg("notify-send")
        .output()
        .await?;
    if notify_check.status.success() {
        println!("  ✓ notify-send found");
    } else {
        println!("  ✗ notify-send not found (error notifications won't appear)");
    }

    // Check API key
    println!("\nChecking API key...");
    let store = FileSecretStore::new()?;
    if store.load_key().is_some() {
        println!("  ✓ API key configured");
    } else {
        println!("  ✗ No API key found");
        println!("    Run: pushtype set-key");
        all_ok = false;
    }

    println!("\n---");
    if all_ok {
        println!("✓ All checks passed! Run 'pushtype' to start.");
    } else {
        println!("✗ Some checks failed. Please fix the issues above.");
    }

    Ok(())
}

/// Show current configuration
fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("hotkey = {:?}", config.hotkey);

    println!("\n[audio]");
    println!("  device = {:?}", config.audio.device);
    println!("  max_duration_secs = {}", config.audio.max_duration_secs);

    println!("\n[audio.feedback]");
    println!("  enabled = {}", config.audio.feedback.enabled);
    println!("  volume = {}", config.audio.feedback.volume);

    println!("\n[azure]");
    println!("  endpoint = {:?}", config.azure.endpoint);
    println!("  deployment = {:?}", config.azure.deployment);
    println!("  api_version = {:?}", config.azure.api_version);
    if let Some(ref language) = config.azure.language {
        println!("  language = {:?}", language);
    }

    if let Some(ref state_file) = config.state_file {
        println!("\nstate_file = {:?}", state_file);
        if let Some(resolved) = config.resolve_state_file() {
            println!("  (resolves to: {:?})", resolved);
        }
    }

    let store = FileSecretStore::new()?;
    println!(
        "\nAPI key: {}",
        if store.load_key().is_some() {
            "configured"
        } else {
            "not set (run 'pushtype set-key')"
        }
    );

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );

    Ok(())
}
