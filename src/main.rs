use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result};
use std::path::PathBuf;
use todostore::{Clock, Config, Storage, Task, TaskFilter, TaskId, TaskListStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "Personal task list persisted to a local key-value slot")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to config file (default: .todostore.yml, then ~/.config/todostore/todostore.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the storage directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Override the slot name the list is stored under
    #[arg(short, long)]
    key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        /// Task text (surrounding whitespace is trimmed)
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// List tasks
    List {
        /// Only tasks not yet completed
        #[arg(long, conflicts_with = "completed")]
        active: bool,

        /// Only completed tasks
        #[arg(long)]
        completed: bool,
    },

    /// Mark a task complete, or incomplete if it already is
    Toggle { id: TaskId },

    /// Replace a task's text
    Edit {
        id: TaskId,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Delete a task
    Rm { id: TaskId },

    /// Delete every completed task
    ClearCompleted,

    /// Show task counts
    Stats,
}

fn setup_logging(verbose: bool) {
    // Logs go to stderr so task output on stdout stays clean
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(key) = cli.key {
        config.storage.key = key;
    }

    info!(
        "todostore config: backend={:?}, data_dir={}, key={}",
        config.storage.backend,
        config.storage.data_dir.display(),
        config.storage.key
    );

    let storage = config.storage.open().context("Failed to open storage")?;
    let mut store = TaskListStore::open_with_key(storage, todostore::SystemClock, &config.storage.key)?;

    match cli.command {
        Commands::Add { text } => cmd_add(&mut store, &text.join(" ")),
        Commands::List { active, completed } => {
            let filter = match (active, completed) {
                (true, _) => TaskFilter::Active,
                (_, true) => TaskFilter::Completed,
                _ => TaskFilter::All,
            };
            cmd_list(&store, filter);
            Ok(())
        }
        Commands::Toggle { id } => cmd_toggle(&mut store, id),
        Commands::Edit { id, text } => cmd_edit(&mut store, id, &text.join(" ")),
        Commands::Rm { id } => cmd_rm(&mut store, id),
        Commands::ClearCompleted => cmd_clear_completed(&mut store),
        Commands::Stats => {
            cmd_stats(&store);
            Ok(())
        }
    }
}

type CliStore = TaskListStore<Box<dyn Storage>>;

fn cmd_add(store: &mut CliStore, text: &str) -> Result<()> {
    match store.add(text)? {
        Some(id) => println!("Added task {}", id.to_string().cyan()),
        None => println!("Nothing to add: task text is empty"),
    }
    Ok(())
}

fn cmd_list(store: &CliStore, filter: TaskFilter) {
    for line in list_lines(store, filter) {
        println!("{}", line);
    }
}

fn list_lines<S: Storage, C: Clock>(store: &TaskListStore<S, C>, filter: TaskFilter) -> Vec<String> {
    let mut lines = vec![format!("{} tasks remaining", store.remaining_count()).bold().to_string()];

    if store.is_empty() {
        lines.push("Your task list is empty".dimmed().to_string());
        lines.push("Add some tasks to get started!".dimmed().to_string());
        return lines;
    }

    let before = lines.len();
    lines.extend(store.filtered(filter).map(render_task));
    if lines.len() == before {
        lines.push(format!("No {} tasks", filter).dimmed().to_string());
    }

    lines.push(format!("{} completed", store.completed_count()).dimmed().to_string());
    lines
}

fn render_task(task: &Task) -> String {
    let id = task.id.to_string().cyan();
    if task.completed {
        format!("[{}] {}  {}", "x".green(), id, task.text.strikethrough().dimmed())
    } else {
        format!("[ ] {}  {}", id, task.text)
    }
}

fn cmd_toggle(store: &mut CliStore, id: TaskId) -> Result<()> {
    if !store.toggle_complete(id)? {
        print_unknown(id);
        return Ok(());
    }
    if let Some(task) = store.get(id) {
        println!("{}", render_task(task));
    }
    Ok(())
}

fn cmd_edit(store: &mut CliStore, id: TaskId, text: &str) -> Result<()> {
    if !store.begin_edit(id) {
        print_unknown(id);
        return Ok(());
    }
    store.update_edit_draft(text);

    if store.commit_edit(id)? {
        if let Some(task) = store.get(id) {
            println!("{}", render_task(task));
        }
    } else {
        println!("Nothing to save: task text is empty, keeping previous text");
    }
    Ok(())
}

fn cmd_rm(store: &mut CliStore, id: TaskId) -> Result<()> {
    if store.delete(id)? {
        println!("Deleted task {}", id.to_string().cyan());
    } else {
        print_unknown(id);
    }
    Ok(())
}

fn cmd_clear_completed(store: &mut CliStore) -> Result<()> {
    let removed = store.clear_completed()?;
    println!("Cleared {} completed task{}", removed, if removed == 1 { "" } else { "s" });
    Ok(())
}

fn cmd_stats(store: &CliStore) {
    println!("Total:     {}", store.len());
    println!("Remaining: {}", store.remaining_count().to_string().yellow());
    println!("Completed: {}", store.completed_count().to_string().green());
}

fn print_unknown(id: TaskId) {
    eprintln!("{} no task with id {}", "warning:".yellow().bold(), id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use todostore::{ManualClock, MemoryStorage};

    fn store() -> TaskListStore<MemoryStorage, ManualClock> {
        colored::control::set_override(false);
        TaskListStore::open(MemoryStorage::new(), ManualClock::at_millis(1_700_000_000_000))
    }

    #[test]
    fn test_list_empty() {
        let lines = list_lines(&store(), TaskFilter::All);
        assert_eq!(
            lines,
            vec![
                "0 tasks remaining",
                "Your task list is empty",
                "Add some tasks to get started!"
            ]
        );
    }

    #[test]
    fn test_list_shows_completed_footer() {
        let mut store = store();
        let a = store.add("buy milk").unwrap().unwrap();
        store.add("walk dog").unwrap();
        store.toggle_complete(a).unwrap();

        let lines = list_lines(&store, TaskFilter::All);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "1 tasks remaining");
        assert!(lines[1].contains("buy milk"));
        assert!(lines[2].contains("walk dog"));
        assert_eq!(lines[3], "1 completed");
    }

    #[test]
    fn test_list_filter_with_no_matches() {
        let mut store = store();
        store.add("walk dog").unwrap();

        let lines = list_lines(&store, TaskFilter::Completed);
        assert_eq!(lines, vec!["1 tasks remaining", "No completed tasks", "0 completed"]);
    }
}
