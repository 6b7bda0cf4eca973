use anyhow::{bail, Context, Result};
use chatline::client::{ConversationClient, Draft};
use chatline::config::Config;
use std::env;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "chatline.toml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatline=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().collect();
    let _bin = args.remove(0);
    if args.is_empty() {
        print_usage();
        return Ok(());
    }

    match args[0].as_str() {
        "run" => run_widget(&args[1..]).await,
        "send" => run_send(&args[1..]).await,
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

async fn run_widget(args: &[String]) -> Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut server: Option<String> = None;
    let mut storage_dir: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let value = args.get(i + 1).context("--config requires a value")?;
                config_path = Some(PathBuf::from(value));
                i += 2;
            }
            "--server" => {
                let value = args.get(i + 1).context("--server requires a value")?;
                server = Some(value.to_string());
                i += 2;
            }
            "--storage-dir" => {
                let value = args.get(i + 1).context("--storage-dir requires a value")?;
                storage_dir = Some(PathBuf::from(value));
                i += 2;
            }
            "--help" | "-h" => {
                print_run_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown run argument: {other}"));
            }
        }
    }

    let config = resolve_config(config_path, server, storage_dir)?;
    let mut client = ConversationClient::start(&config).await?;
    info!("session ready, visitor {}", client.visitor_id());

    let mut last_view = client.render();
    print_lines(&last_view);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            maybe_line = lines.next_line() => {
                let line = match maybe_line.context("failed to read stdin")? {
                    Some(line) => line,
                    None => break,
                };
                if !handle_line(&mut client, &line, &mut last_view).await? {
                    break;
                }
            }
            maybe_tick = client.ticks().recv() => {
                if maybe_tick.is_some() {
                    client.refresh().await;
                    let view = client.render();
                    if view != last_view {
                        print_lines(&view);
                        last_view = view;
                    }
                }
            }
        }
    }

    client.stop_polling();
    Ok(())
}

/// Dispatches one line of input. Returns false when the session should end.
async fn handle_line(
    client: &mut ConversationClient,
    line: &str,
    last_view: &mut Vec<String>,
) -> Result<bool> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(true);
    }
    if trimmed == "/quit" {
        return Ok(false);
    }

    let mut notice = None;
    if trimmed == "/open" {
        client.open();
    } else if trimmed == "/close" {
        client.close();
    } else if let Some(rest) = trimmed.strip_prefix("/attach") {
        let path = rest.trim();
        if path.is_empty() {
            eprintln!("usage: /attach <path>");
            return Ok(true);
        }
        match client.send(Draft::attachment(path)).await {
            Ok(n) => notice = n,
            Err(err) => {
                eprintln!("send error: {err:#}");
                return Ok(true);
            }
        }
    } else if trimmed.starts_with('/') {
        eprintln!("unknown command: {trimmed} (try /open, /close, /attach <path>, /quit)");
        return Ok(true);
    } else {
        match client.send(Draft::text(trimmed)).await {
            Ok(n) => notice = n,
            Err(err) => {
                eprintln!("send error: {err:#}");
                return Ok(true);
            }
        }
    }

    *last_view = client.render();
    print_lines(last_view);
    if let Some(notice) = notice {
        println!("{notice}");
    }
    Ok(true)
}

async fn run_send(args: &[String]) -> Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut server: Option<String> = None;
    let mut storage_dir: Option<PathBuf> = None;
    let mut message: Option<String> = None;
    let mut attachment: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let value = args.get(i + 1).context("--config requires a value")?;
                config_path = Some(PathBuf::from(value));
                i += 2;
            }
            "--server" => {
                let value = args.get(i + 1).context("--server requires a value")?;
                server = Some(value.to_string());
                i += 2;
            }
            "--storage-dir" => {
                let value = args.get(i + 1).context("--storage-dir requires a value")?;
                storage_dir = Some(PathBuf::from(value));
                i += 2;
            }
            "--message" => {
                let value = args.get(i + 1).context("--message requires a value")?;
                message = Some(value.to_string());
                i += 2;
            }
            "--attach" => {
                let value = args.get(i + 1).context("--attach requires a value")?;
                attachment = Some(PathBuf::from(value));
                i += 2;
            }
            "--help" | "-h" => {
                print_send_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown send argument: {other}"));
            }
        }
    }

    if message.is_none() && attachment.is_none() {
        print_send_usage();
        bail!("send requires --message or --attach");
    }

    let config = resolve_config(config_path, server, storage_dir)?;
    let mut client = ConversationClient::start(&config).await?;
    client.open();
    let notice = client.send(Draft { text: message, attachment }).await?;
    print_lines(&client.render());
    if let Some(notice) = notice {
        println!("{notice}");
    }
    client.stop_polling();
    Ok(())
}

fn resolve_config(
    config_path: Option<PathBuf>,
    server: Option<String>,
    storage_dir: Option<PathBuf>,
) -> Result<Config> {
    let mut config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    if let Some(url) = server {
        config.server.url = url;
    }
    if let Some(dir) = storage_dir {
        config.storage.dir = dir;
    }
    config.validate()?;
    Ok(config)
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn print_usage() {
    eprintln!(
        "chatline usage:\n  chatline run [options]\n  chatline send [options] (--message <text> | --attach <path>)"
    );
}

fn print_run_usage() {
    eprintln!(
        "chatline run options:\n  --config <path>\n  --server <url>\n  --storage-dir <path>\n\nsession commands:\n  /open, /close, /attach <path>, /quit\n  any other line is sent as a message"
    );
}

fn print_send_usage() {
    eprintln!(
        "chatline send options:\n  --config <path>\n  --server <url>\n  --storage-dir <path>\n  --message <text>\n  --attach <path>"
    );
}
