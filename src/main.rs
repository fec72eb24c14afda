use std::io::{self, BufRead, Write};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use devhub::bridge::PluginHost;
use devhub::config::{AppConfig, data_dir};
use devhub::plugin::Context;

#[derive(Debug, Parser)]
#[command(name = "devhub", version, about = "Discover and launch devhub plugins")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every discovered plugin as JSON.
    List {
        /// Rescan even if the cached listing is still fresh.
        #[arg(long)]
        reload: bool,
    },
    /// Launch a plugin.
    Launch {
        plugin_id: String,
        /// Context entry as key=value, e.g. -c projectPath=/src/app
        #[arg(short = 'c', long = "context", value_parser = parse_context_entry)]
        context: Vec<(String, String)>,
    },
    /// Answer JSON requests read from stdin, one per line.
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    // Initialize logging to file (never stdout)
    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "devhub.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    tracing::info!("devhub starting");

    let host = PluginHost::from_config(&config);
    match cli.command {
        Command::List { reload } => {
            let plugins = if reload {
                host.reload_plugins()
            } else {
                host.list_plugins()
            };
            println!("{}", serde_json::to_string_pretty(&plugins)?);
        }
        Command::Launch { plugin_id, context } => {
            let context: Context = context.into_iter().collect();
            let plan = host.launch_plugin(&plugin_id, &context)?;
            println!("launched {} ({})", plan.plugin_id, plan.executable.display());
        }
        Command::Serve => serve(&host)?,
    }

    Ok(())
}

fn serve(host: &PluginHost) -> Result<()> {
    let mut stdout = io::stdout().lock();

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = host.handle_line(&line);
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }

    tracing::info!("stdin closed, devhub exiting");
    Ok(())
}

fn parse_context_entry(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty context key in `{raw}`"));
    }

    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn context_entries_split_on_first_equals() {
        assert_eq!(
            parse_context_entry("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_context_entry("novalue").is_err());
        assert!(parse_context_entry("=x").is_err());
    }

    #[test]
    fn launch_collects_repeated_context_flags() {
        let cli = Cli::try_parse_from([
            "devhub", "launch", "git-tool", "-c", "projectPath=/src", "--context", "branch=main",
        ])
        .unwrap();
        match cli.command {
            Command::Launch { plugin_id, context } => {
                assert_eq!(plugin_id, "git-tool");
                assert_eq!(context.len(), 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
