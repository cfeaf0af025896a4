use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use note_review::config::Config;
use note_review::export::json::export_reviews_to_path;
use note_review::{Clock, Database, FixedClock, ReviewError, ReviewManager, SystemClock};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "note-review", about = "Spaced-repetition review for knowledge-base notes")]
struct Cli {
    /// SQLite database file (overrides NOTE_REVIEW_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Owner to act as (overrides NOTE_REVIEW_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Pretend today is this date (YYYY-MM-DD)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a plain-text note
    Note {
        title: String,
        text: String,
        #[arg(long)]
        source: Option<String>,
    },
    /// List notes
    Notes,
    /// Delete a note and its review state
    DeleteNote { note_id: String },
    /// Start reviewing a note
    Enable { note_id: String },
    /// Stop reviewing a note
    Disable { note_id: String },
    /// Grade a review from 0 (blackout) to 5 (perfect)
    Submit {
        note_id: String,
        #[arg(allow_negative_numbers = true)]
        quality: i64,
    },
    /// Reviews due by the end of today
    Due,
    /// Review state of one note
    Status { note_id: String },
    /// Review statistics
    Stats,
    /// All tracked notes
    All,
    /// Write all tracked notes to a JSON file
    Export { path: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().with_overrides(cli.db, cli.user);
    let owner = config.owner_id.as_str();

    let clock: Box<dyn Clock> = match cli.today {
        Some(day) => Box::new(
            FixedClock::at_noon(day).ok_or_else(|| format!("cannot pin the clock to {day}"))?,
        ),
        None => Box::new(SystemClock),
    };

    let db = Database::open(&config.db_path)?;
    let seeded = db.seed_sample_notes(owner, clock.now())?;
    if seeded > 0 {
        tracing::info!(seeded, owner, "Sample notes created");
    }

    let manager = ReviewManager::new(&db, &db, clock.as_ref());

    match cli.command {
        Command::Note {
            title,
            text,
            source,
        } => {
            let content = serde_json::json!({
                "type": "doc",
                "content": [{"type": "paragraph", "content": [{"type": "text", "text": text}]}]
            });
            print_json(&db.create_note(owner, &title, content, source.as_deref(), clock.now())?)?;
        }
        Command::Notes => print_json(&db.list_notes(owner)?)?,
        Command::DeleteNote { note_id } => {
            if !db.delete_note(&note_id, owner)? {
                return Err(ReviewError::NotFound(format!("note {note_id} not found")).into());
            }
            print_json(&serde_json::json!({ "message": "Note deleted" }))?;
        }
        Command::Enable { note_id } => print_json(&manager.enable_review(owner, &note_id)?)?,
        Command::Disable { note_id } => {
            manager.disable_review(owner, &note_id)?;
            print_json(&serde_json::json!({ "message": "Review disabled successfully" }))?;
        }
        Command::Submit { note_id, quality } => {
            print_json(&manager.submit_review(owner, &note_id, quality)?)?
        }
        Command::Due => print_json(&manager.get_due_today(owner)?)?,
        Command::Status { note_id } => print_json(&manager.get_review_status(owner, &note_id)?)?,
        Command::Stats => print_json(&manager.get_stats(owner)?)?,
        Command::All => print_json(&manager.get_all_reviews(owner)?)?,
        Command::Export { path } => {
            let entries = manager.get_all_reviews(owner)?;
            export_reviews_to_path(&entries, &path)?;
            println!("Exported {} reviews to '{}'", entries.len(), path.display());
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
