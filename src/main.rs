mod app;
mod logging;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use schedule_sync::config::Config;

#[derive(Parser, Debug)]
#[command(name = "schedule-sync")]
#[command(about = "Offline-first student schedule client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/schedule-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unavailable
  #[arg(long)]
  offline: bool,

  /// Also print debug logs to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show one week of the schedule
  Week {
    /// Any date inside the week (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Weeks to move from that date, may be negative
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset: i64,
    /// Reload even if the week is already stored
    #[arg(long)]
    refresh: bool,
  },
  /// List homework for the group
  Homework,
  AddHomework {
    #[arg(long)]
    lesson: String,
    #[arg(long)]
    text: String,
  },
  UpdateHomework {
    #[arg(long)]
    lesson: String,
    #[arg(long)]
    text: String,
  },
  DeleteHomework {
    #[arg(long)]
    lesson: String,
  },
  /// Show notification settings
  Settings,
  /// Replay writes queued while offline
  Flush,
  ClearCache {
    /// Only entries whose key starts with this, e.g. `schedule:`
    #[arg(long)]
    prefix: Option<String>,
  },
  /// Cache size and pending writes
  CacheInfo,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init(&logging::default_log_dir()?, args.verbose)?;

  let config = Config::load(args.config.as_deref())?;
  let app = app::App::new(config, args.offline)?;

  match args.command {
    Command::Week {
      date,
      offset,
      refresh,
    } => app.week(date, offset, refresh).await?,
    Command::Homework => app.homework().await?,
    Command::AddHomework { lesson, text } => app.add_homework(&lesson, &text).await?,
    Command::UpdateHomework { lesson, text } => app.update_homework(&lesson, &text).await?,
    Command::DeleteHomework { lesson } => app.delete_homework(&lesson).await?,
    Command::Settings => app.settings().await?,
    Command::Flush => app.flush().await?,
    Command::ClearCache { prefix } => app.clear_cache(prefix.as_deref()),
    Command::CacheInfo => app.cache_info(),
  }

  Ok(())
}
