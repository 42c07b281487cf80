//! punchlist CLI - todo tracking with MCP tooling and issue tracker sync.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use punchlist::{
    AddOptions, BulkFilter, Config, ExternalLink, Integration, McpServer, Priority, SearchFilter,
    Status, StdioTransport, Store, StoreQueryExt, SyncEngine, Todo, derive_title,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::{Cli, Command, SyncCommand};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("punchlist")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("punchlist.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn parse_priority(raw: Option<&str>) -> Result<Option<Priority>> {
    match raw {
        None => Ok(None),
        Some(raw) => Priority::parse(raw)
            .map(Some)
            .ok_or_else(|| eyre::eyre!("invalid priority: {} (expected low, medium, or high)", raw)),
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<Status>> {
    match raw {
        None => Ok(None),
        Some(raw) => Status::parse(raw)
            .map(Some)
            .ok_or_else(|| eyre::eyre!("invalid status: {} (expected todo, in_progress, or done)", raw)),
    }
}

fn format_status(status: Status) -> ColoredString {
    match status {
        Status::Todo => "todo".yellow(),
        Status::InProgress => "in_progress".blue(),
        Status::Done => "done".green(),
    }
}

fn format_priority(priority: Priority) -> ColoredString {
    match priority {
        Priority::High => "high".red(),
        Priority::Medium => "medium".yellow(),
        Priority::Low => "low".dimmed(),
    }
}

fn format_external_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_todo_line(todo: &Todo) {
    let tags = if todo.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", todo.tags)
    };
    let anchor = todo
        .file_path
        .as_ref()
        .map(|path| match todo.line_number {
            Some(line) => format!(" {}:{}", path, line),
            None => format!(" {}", path),
        })
        .unwrap_or_default();

    println!(
        "{} {} {} {}{}{}",
        format_status(todo.status),
        todo.id.to_string().cyan(),
        format_priority(todo.priority),
        todo.title,
        tags.dimmed(),
        anchor.dimmed()
    );
}

fn print_todo_detail(todo: &Todo) {
    println!("{}: {}", "ID".bold(), todo.id.to_string().cyan());
    println!("{}: {}", "Title".bold(), todo.title);
    println!("{}: {}", "Status".bold(), format_status(todo.status));
    println!("{}: {}", "Priority".bold(), format_priority(todo.priority));
    if !todo.tags.is_empty() {
        println!("{}: {}", "Tags".bold(), todo.tags);
    }
    if let Some(path) = &todo.file_path {
        match todo.line_number {
            Some(line) => println!("{}: {}:{}", "Source".bold(), path, line),
            None => println!("{}: {}", "Source".bold(), path),
        }
    }
    for link in ExternalLink::all(&todo.metadata) {
        let issue = format_external_id(&link.id);
        match &link.url {
            Some(url) => println!("{}: {} {} {}", "Linked".bold(), link.integration, issue.cyan(), url.dimmed()),
            None => println!("{}: {} {}", "Linked".bold(), link.integration, issue.cyan()),
        }
    }
    println!("{}: {}", "Created".bold(), todo.created_at);
    println!("{}: {}", "Updated".bold(), todo.updated_at);
    if let Some(completed_at) = &todo.completed_at {
        println!("{}: {}", "Completed".bold(), completed_at);
    }
    if !todo.metadata.is_empty() {
        println!("{}: {}", "Metadata".bold(), todo.metadata.to_json());
    }
    if todo.content != todo.title {
        println!("\n{}", todo.content);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let db_path = config.resolve_db_path(cli.db.as_deref());

    match cli.command {
        Command::Add {
            content,
            priority,
            tags,
            file,
            line,
        } => {
            let mut store = Store::open(&db_path).context("Failed to open store")?;
            let options = AddOptions {
                priority: parse_priority(priority.as_deref())?,
                tags,
                file_path: file.map(|p| p.display().to_string()),
                line_number: line,
                ..Default::default()
            };

            let id = store.add(&content, options).context("Failed to add todo")?;
            println!(
                "{} Added todo {}: {}",
                "✓".green(),
                id.to_string().cyan(),
                derive_title(&content)
            );
        }

        Command::List { status } => {
            let mut store = Store::open(&db_path).context("Failed to open store")?;
            let status_filter = parse_status(status.as_deref())?;

            let todos = store.get_all().context("Failed to list todos")?;
            let todos: Vec<Todo> = match status_filter {
                Some(status) => todos.into_iter().filter(|t| t.status == status).collect(),
                None => todos,
            };

            if todos.is_empty() {
                println!("{}", "No todos found".dimmed());
            } else {
                for todo in &todos {
                    print_todo_line(todo);
                }
            }
        }

        Command::Get { id } => {
            let store = Store::open(&db_path).context("Failed to open store")?;
            match store.get(id).context("Failed to get todo")? {
                Some(todo) => print_todo_detail(&todo),
                None => {
                    eprintln!("{} Todo not found: {}", "✗".red(), id);
                    std::process::exit(1);
                }
            }
        }

        Command::Search {
            query,
            priority,
            tag,
            path,
            done,
            open,
        } => {
            let store = Store::open(&db_path).context("Failed to open store")?;

            let mut filter = SearchFilter::new();
            if let Some(priority) = parse_priority(priority.as_deref())? {
                filter = filter.priority(priority);
            }
            if let Some(tag) = tag {
                filter = filter.tag(tag);
            }
            if let Some(path) = path {
                filter = filter.file_path(path);
            }
            if done {
                filter = filter.done(true);
            } else if open {
                filter = filter.done(false);
            }

            let todos = store.search(&query, &filter).context("Failed to search todos")?;
            if todos.is_empty() {
                println!("{}", "No matching todos".dimmed());
            } else {
                for todo in &todos {
                    print_todo_line(todo);
                }
            }
        }

        Command::Stats => {
            let store = Store::open(&db_path).context("Failed to open store")?;
            let stats = store.stats().context("Failed to compute stats")?;

            println!("{}: {}", "Total".bold(), stats.total);
            println!("{}: {}", "Active".bold(), stats.active);
            println!("{}: {}", "Completed".bold(), stats.completed);
            println!("{}: {:.1}%", "Completion rate".bold(), stats.completion_rate);
            println!(
                "{}: {} touched in the last 7 days",
                "Recent activity".bold(),
                stats.recent_activity
            );
        }

        Command::Done { id } => {
            let mut store = Store::open(&db_path).context("Failed to open store")?;
            match store.toggle_done(id).context("Failed to toggle todo")? {
                Some(true) => println!("{} Marked todo {} done", "✓".green(), id.to_string().cyan()),
                Some(false) => println!("{} Reopened todo {}", "→".blue(), id.to_string().cyan()),
                None => {
                    eprintln!("{} Todo not found: {}", "✗".red(), id);
                    std::process::exit(1);
                }
            }
        }

        Command::Delete { id } => {
            let mut store = Store::open(&db_path).context("Failed to open store")?;
            if store.delete(id).context("Failed to delete todo")? {
                println!("{} Deleted todo {}", "✓".green(), id.to_string().cyan());
            } else {
                eprintln!("{} Todo not found: {}", "✗".red(), id);
                std::process::exit(1);
            }
        }

        Command::Serve => {
            let store = Store::open(&db_path).context("Failed to open store")?;
            let mut server = McpServer::new(store);
            server.serve_stdio().context("Server error")?;
        }

        Command::Sync { command } => run_sync(command, &config, &db_path)?,
    }

    Ok(())
}

fn run_sync(command: SyncCommand, config: &Config, db_path: &Path) -> Result<()> {
    let mut store = Store::open(db_path).context("Failed to open store")?;

    match command {
        SyncCommand::Link { id, integration } => {
            let integration = Integration::parse(&integration)?;
            config.adapter_command(integration)?;

            let transport = StdioTransport::new(config.adapter_commands());
            let mut engine = SyncEngine::new(&mut store, transport).with_pacing(config.pacing());
            let issue = engine.create_external_issue(id, integration)?;

            println!(
                "{} Linked todo {} to {} issue {}",
                "✓".green(),
                id.to_string().cyan(),
                integration,
                format_external_id(&issue.id).cyan()
            );
            if let Some(url) = issue.url {
                println!("  {}", url.dimmed());
            }
        }

        SyncCommand::Status { id } => {
            let Some(todo) = store.get(id).context("Failed to get todo")? else {
                eprintln!("{} Todo not found: {}", "✗".red(), id);
                std::process::exit(1);
            };

            let transport = StdioTransport::new(config.adapter_commands());
            let mut engine = SyncEngine::new(&mut store, transport).with_pacing(config.pacing());
            let report = engine.sync_external_status(id, todo.status)?;

            if report.synced.is_empty() && report.errors.is_empty() {
                println!("{}", "Todo is not linked to any tracker".dimmed());
            }
            for integration in &report.synced {
                println!("{} Synced status to {}", "✓".green(), integration);
            }
            for (integration, error) in &report.errors {
                println!("{} {} sync failed: {}", "✗".red(), integration, error);
            }
        }

        SyncCommand::Bulk {
            integration,
            priority,
            status,
        } => {
            let integration = Integration::parse(&integration)?;
            config.adapter_command(integration)?;

            let filter = BulkFilter {
                priority: parse_priority(priority.as_deref())?,
                status: parse_status(status.as_deref())?,
            };

            let transport = StdioTransport::new(config.adapter_commands());
            let mut engine = SyncEngine::new(&mut store, transport).with_pacing(config.pacing());
            let report = engine.bulk_create_external_issues(integration, &filter)?;

            println!(
                "{} Created {} issue(s) on {}",
                "✓".green(),
                report.created.len(),
                integration
            );
            for (id, issue) in &report.created {
                println!(
                    "  {} {} {}",
                    id.to_string().cyan(),
                    "→".blue(),
                    format_external_id(&issue.id)
                );
            }
            for (id, error) in &report.errors {
                println!("{} Todo {} failed: {}", "✗".red(), id, error);
            }
        }

        SyncCommand::Import { integration, query } => {
            let integration = Integration::parse(&integration)?;
            config.adapter_command(integration)?;

            let transport = StdioTransport::new(config.adapter_commands());
            let mut engine = SyncEngine::new(&mut store, transport).with_pacing(config.pacing());
            let report = engine.import_external_issues(integration, &query)?;

            println!(
                "{} Imported {} issue(s) from {} ({} skipped)",
                "✓".green(),
                report.imported.len(),
                integration,
                report.skipped
            );
            for id in &report.imported {
                println!("  {} added", id.to_string().cyan());
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
