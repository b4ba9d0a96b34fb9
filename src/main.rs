use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use log::info;
use waweb_rust::{render_qr_ascii, Conn, ConnConfig, Session};

/// Command line client for WhatsApp Web sessions.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the JSON session file.
    #[arg(long, default_value = "./data/session.json")]
    state_file: PathBuf,

    /// Override the WebSocket endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the long client name shown on the phone.
    #[arg(long)]
    client_name: Option<String>,

    /// Choose a command to run.
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Link a new session by scanning a QR code.
    Login,
    /// Resume the stored session and save the refreshed tokens.
    Restore,
    /// Print the WhatsApp Web version the server expects.
    Version,
    /// Print the current configuration.
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = ConnConfig::default();
    if let Some(endpoint) = cli.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(name) = cli.client_name {
        let short = config.short_client_name.clone();
        let version = config.client_version.clone();
        config = config.with_client_name(name, short, version);
    }

    match cli.command {
        Commands::Login => {
            let conn = Conn::new(config);
            let session = conn
                .login(|qr| match render_qr_ascii(&qr.to_string()) {
                    Ok(code) => println!("Scan this code with your phone:\n{code}"),
                    Err(err) => println!("Could not render QR code ({err}), payload: {qr}"),
                })
                .await?;
            persist_session(&session, &cli.state_file)?;
            println!("Logged in as {}", session.wid);
            conn.disconnect().await?;
        }
        Commands::Restore => {
            let Some(stored) = load_session(&cli.state_file)? else {
                eprintln!("No session at {}. Run the login command first.", cli.state_file.display());
                return Ok(());
            };
            let conn = Conn::new(config);
            let session = conn.restore_with_session(stored).await?;
            persist_session(&session, &cli.state_file)?;
            if let Some(info) = conn.info() {
                println!("Restored session of {} ({})", info.pushname, session.wid);
            }
            conn.disconnect().await?;
        }
        Commands::Version => {
            let conn = Conn::new(config);
            let version = conn.check_server_version().await?;
            let version: Vec<String> = version.iter().map(u32::to_string).collect();
            println!("Server version: {}", version.join("."));
            conn.disconnect().await?;
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if let Some(session) = load_session(&cli.state_file)? {
                println!("Session: {session:?}");
            }
        }
    }

    Ok(())
}

fn load_session(path: &PathBuf) -> Result<Option<Session>, Box<dyn std::error::Error>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn persist_session(session: &Session, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, serde_json::to_string_pretty(session)?)?;
    info!("Session saved to {}", path.display());
    Ok(())
}
