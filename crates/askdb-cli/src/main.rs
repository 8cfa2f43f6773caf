//! Thin terminal front end: reads library state and prints it.

use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt as _;

use askdb_client::prelude::*;
use askdb_client::{ResultSet, format_cell};

#[derive(Parser)]
#[command(name = "askdb", about = "Ask a database questions in plain English")]
struct Cli {
    /// Backend base URL (falls back to ASKDB_BASE_URL, then localhost).
    #[arg(long)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a natural-language question.
    Ask {
        question: String,
        /// Use the one-shot POST fallback instead of streaming.
        #[arg(long)]
        no_stream: bool,
        /// Print result rows as JSON instead of a table.
        #[arg(long)]
        raw: bool,
    },
    /// Run a SQL query directly.
    Sql {
        query: String,
        #[arg(long)]
        raw: bool,
    },
    /// Print the database schema.
    Schema,
    /// List tables.
    Tables,
    /// Describe one table.
    Describe { table: String },
    /// Print sample rows from a table.
    Sample {
        table: String,
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },
    /// Check backend reachability.
    Health {
        /// Keep probing on the configured interval until interrupted.
        #[arg(long)]
        watch: bool,
    },
    /// Interactive question loop.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.base_url {
        Some(url) => ClientConfig::new(url),
        None => ClientConfig::from_env(),
    };

    match cli.command {
        Command::Ask {
            question,
            no_stream,
            raw,
        } => run_ask(config, &question, no_stream, raw).await,
        Command::Sql { query, raw } => run_sql(config, &query, raw).await,
        Command::Schema => {
            let schema = Client::new(config)?.schema().await?;
            println!("{schema}");
            Ok(())
        }
        Command::Tables => {
            for table in Client::new(config)?.tables().await? {
                println!("{table}");
            }
            Ok(())
        }
        Command::Describe { table } => run_describe(config, &table).await,
        Command::Sample { table, limit } => {
            let reply = Client::new(config)?.sample(&table, Some(limit)).await?;
            let mut view = ResultsView::new();
            view.set_dataset(Some(reply.data));
            print_results(&view);
            Ok(())
        }
        Command::Health { watch } => run_health(config, watch).await,
        Command::Repl => run_repl(config).await,
    }
}

async fn run_ask(
    config: ClientConfig,
    question: &str,
    no_stream: bool,
    raw: bool,
) -> anyhow::Result<()> {
    let session = ChatSession::new(config)?;
    let mut view = ResultsView::new();
    if raw {
        view.set_mode(ViewMode::Raw);
    }

    if no_stream {
        let message = session.ask(question).await?;
        println!("{}", message.display_text());
        print_message_trailer(&message, &mut view);
        return Ok(());
    }

    let mut stream = session.submit(question)?;
    while let Some(event) = stream.next_event().await {
        if let StreamEvent::Token { text } = event {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
    }
    println!();
    let message = stream.finish().await;
    if let Some(error) = &message.error_text {
        println!("error: {error}");
    }
    print_message_trailer(&message, &mut view);
    Ok(())
}

async fn run_sql(config: ClientConfig, query: &str, raw: bool) -> anyhow::Result<()> {
    let client = Client::new(config)?;
    let mut view = ResultsView::new();
    if raw {
        view.set_mode(ViewMode::Raw);
    }
    match client.run_sql(query).await {
        Ok(reply) => {
            view.set_dataset(Some(reply.data));
            print_results(&view);
        }
        Err(err) => println!("error: {err}"),
    }
    Ok(())
}

async fn run_describe(config: ClientConfig, table: &str) -> anyhow::Result<()> {
    let detail = Client::new(config)?.describe_table(table).await?;
    println!("{}", detail.table);
    for column in &detail.columns {
        let nullable = if column.is_nullable == "YES" {
            "null"
        } else {
            "not null"
        };
        match &column.column_default {
            Some(default) => println!(
                "  {} {} {nullable} default {default}",
                column.column_name, column.data_type
            ),
            None => println!("  {} {} {nullable}", column.column_name, column.data_type),
        }
    }
    if let Some(count) = detail.row_count {
        println!("{count} rows");
    }
    Ok(())
}

async fn run_health(config: ClientConfig, watch: bool) -> anyhow::Result<()> {
    let client = Client::new(config.clone())?;
    if !watch {
        match client.health().await {
            Ok(message) => println!("reachable: {message}"),
            Err(err) => println!("unreachable: {err}"),
        }
        return Ok(());
    }

    let poller = HealthPoller::spawn(Arc::new(client), config.health_period);
    let mut rx = poller.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = rx.borrow_and_update().clone();
                let marker = if status.reachable { "ok" } else { "down" };
                println!("{marker}: {}", status.message);
            }
        }
    }
    poller.shutdown();
    Ok(())
}

async fn run_repl(config: ClientConfig) -> anyhow::Result<()> {
    let session = ChatSession::new(config)?;
    let mut view = ResultsView::new();
    println!("askdb repl: question per line; :sql <query>, :mode, :quit");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt();
            continue;
        }
        if line == ":quit" || line == ":q" {
            break;
        }
        if line == ":mode" {
            let next = match view.mode() {
                ViewMode::Table => ViewMode::Raw,
                ViewMode::Raw => ViewMode::Table,
            };
            view.set_mode(next);
            println!(
                "mode: {}",
                match next {
                    ViewMode::Table => "table",
                    ViewMode::Raw => "raw",
                }
            );
        } else if let Some(sql) = line.strip_prefix(":sql ") {
            match session.client().run_sql(sql).await {
                Ok(reply) => {
                    view.set_dataset(Some(reply.data));
                    print_results(&view);
                }
                Err(err) => println!("error: {err}"),
            }
        } else {
            match session.submit(line) {
                Ok(mut stream) => {
                    while let Some(event) = stream.next_event().await {
                        if let StreamEvent::Token { text } = event {
                            print!("{text}");
                            std::io::stdout().flush().ok();
                        }
                    }
                    println!();
                    let message = stream.finish().await;
                    if let Some(error) = &message.error_text {
                        println!("error: {error}");
                    }
                    print_message_trailer(&message, &mut view);
                }
                Err(ClientError::Busy) => {
                    println!("still working on the previous question");
                }
                Err(err) => println!("error: {err}"),
            }
        }
        prompt();
    }
    Ok(())
}

fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

/// SQL and result rows shown after the answer text, whichever path
/// produced the message.
fn print_message_trailer(message: &ChatMessage, view: &mut ResultsView) {
    if let Some(sql) = &message.sql {
        println!("sql: {sql}");
    }
    view.set_dataset(message.rows.clone());
    print_results(view);
}

fn print_results(view: &ResultsView) {
    let (dataset, mode) = view.current();
    // Empty state: nothing to show, footer suppressed.
    let Some(dataset) = dataset else {
        return;
    };
    match mode {
        ViewMode::Raw => println!(
            "{}",
            serde_json::to_string_pretty(dataset.rows()).unwrap_or_default()
        ),
        ViewMode::Table => print_table(dataset),
    }
    let count = dataset.row_count();
    println!("{count} row{}", if count == 1 { "" } else { "s" });
}

fn print_table(dataset: &ResultSet) {
    let columns = dataset.columns();
    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    let rendered: Vec<Vec<String>> = dataset
        .rows()
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = format_cell(row.get(column));
                    widths[i] = widths[i].max(cell.chars().count());
                    cell
                })
                .collect()
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column:<width$}", width = widths[i]))
        .collect();
    println!("{}", header.join("  "));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rendered {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect();
        println!("{}", cells.join("  "));
    }
}
