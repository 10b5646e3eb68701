//! Command-line access to a ClipShelf history database
//!
//! Usage:
//!     clipshelf [--db <path>] <command>
//!
//! Set RUST_LOG (e.g. `RUST_LOG=clipshelf=debug`) for diagnostics.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clipshelf::{ClipboardItem, ClipboardStore, CopyMode, MemoryClipboard, SettingsPatch};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database
    #[arg(long, default_value = "clipshelf.sqlite")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every item in display order
    List,
    /// Add a text item
    Add { text: String },
    /// Add an image item from a file
    AddImage {
        path: PathBuf,
        /// MIME type of the file (guessed from its contents when omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Replace the content of a text item
    Edit { id: String, text: String },
    Pin { id: String },
    Unpin { id: String },
    Delete { id: String },
    /// Move an item to a zero-based position
    Move { id: String, position: usize },
    /// Delete every item
    Clear,
    /// Print aggregate counts as JSON
    Meta,
    /// Show or change settings
    Settings {
        #[arg(long)]
        enable_pin: Option<bool>,
        #[arg(long, value_enum)]
        copy_mode: Option<CopyModeArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CopyModeArg {
    SingleTap,
    DoubleTap,
}

impl From<CopyModeArg> for CopyMode {
    fn from(arg: CopyModeArg) -> Self {
        match arg {
            CopyModeArg::SingleTap => CopyMode::SingleTap,
            CopyModeArg::DoubleTap => CopyMode::DoubleTap,
        }
    }
}

fn print_item(item: &ClipboardItem) {
    let marker = if item.is_pinned() { "*" } else { " " };
    let preview = match item.text() {
        Some(text) => text.lines().next().unwrap_or_default().chars().take(60).collect::<String>(),
        None if item.is_degraded() => "<image: unreadable>".to_string(),
        None => match &item.blob {
            Some(blob) => format!("<image: {} bytes>", blob.bytes.len()),
            None => "<image>".to_string(),
        },
    };
    println!("{} {}  {}", marker, item.id(), preview);
}

fn mime_from_contents(bytes: &[u8]) -> Result<String> {
    let format = image::guess_format(bytes).context("Unrecognized image format, pass --mime")?;
    Ok(format.to_mime_type().to_string())
}

/// Mutations are only dropped while another one is running
fn ensure_ran(ran: bool) -> Result<()> {
    if !ran {
        bail!("Another operation is in progress");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = ClipboardStore::open(&args.db, Arc::new(MemoryClipboard::new()))
        .with_context(|| format!("Failed to open database at {}", args.db.display()))?;
    store.load().await.context("Failed to load items")?;
    let list = store.list();

    match args.command {
        Command::List => {
            for item in list.items().iter() {
                print_item(item);
            }
        }
        Command::Add { text } => match list.add_text(&text, false).await? {
            Some(item) => println!("{}", item.id()),
            None => bail!("Nothing added: text is empty"),
        },
        Command::AddImage { path, mime } => {
            let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let mime = match mime {
                Some(mime) => mime,
                None => mime_from_contents(&bytes)?,
            };
            let item = list
                .add_image(bytes, &mime, false)
                .await?
                .context("Another operation is in progress")?;
            println!("{}", item.id());
        }
        Command::Edit { id, text } => ensure_ran(list.update_text(&id, &text).await?)?,
        Command::Pin { id } => ensure_ran(store.set_pinned(&id, true).await?)?,
        Command::Unpin { id } => ensure_ran(store.set_pinned(&id, false).await?)?,
        Command::Delete { id } => ensure_ran(list.delete_item(&id).await?)?,
        Command::Move { id, position } => ensure_ran(list.move_item(&id, position).await?)?,
        Command::Clear => {
            let removed = list.clear_all().await?.context("Another operation is in progress")?;
            println!("Removed {} items", removed);
        }
        Command::Meta => {
            let meta = store.metadata().await?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        Command::Settings { enable_pin, copy_mode } => {
            let settings = if enable_pin.is_none() && copy_mode.is_none() {
                store.settings().await
            } else {
                store
                    .save_settings(SettingsPatch {
                        enable_pin,
                        copy_mode: copy_mode.map(CopyMode::from),
                    })
                    .await?
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
