use std::io;

use airlog_store::RecordQuery;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use cli::{Cli, Commands, ConfigAction};
use commands::{Context, DecodeArgs, ListArgs, SimulateArgs};
use config::{Config, resolve_device};
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "airlog", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        // A broken file must not block locating or replacing it
        Err(e) if matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path | ConfigAction::Init { .. }
            }
        ) =>
        {
            tracing::warn!("{:#}", e);
            Config::default()
        }
        Err(e) => return Err(e),
    };
    if !matches!(cli.command, Commands::Config { .. }) {
        config.ensure_valid()?;
    }

    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| config.storage.resolved_path());
    tracing::debug!("Using store {}", store_path.display());

    let mut ctx = Context {
        config,
        config_path,
        store_path,
        output: cli.output.clone(),
        opts: FormatOptions::new(cli.no_color).with_compact(cli.compact),
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Import {
            input,
            device,
            show_issues,
        } => {
            let device = resolve_device(device.device, &ctx.config);
            commands::cmd_import(input, device, show_issues, &ctx)
        }
        Commands::Export {
            destination,
            device,
            range,
        } => {
            let (since, until) = util::parse_range(range.since.as_deref(), range.until.as_deref())?;
            let query = RecordQuery {
                device: resolve_device(device.device, &ctx.config),
                since,
                until,
                ..RecordQuery::default()
            };
            commands::cmd_export(destination, query, &ctx)
        }
        Commands::List {
            device,
            range,
            limit,
            offset,
            newest,
            format,
            no_header,
        } => {
            let (since, until) = util::parse_range(range.since.as_deref(), range.until.as_deref())?;
            let query = RecordQuery {
                device: resolve_device(device.device, &ctx.config),
                since,
                until,
                limit,
                offset,
                newest_first: newest,
            };
            ctx.opts = ctx.opts.with_no_header(no_header);
            commands::cmd_list(ListArgs { query, format }, &ctx)
        }
        Commands::Delete {
            device,
            all_devices,
            since,
            until,
        } => {
            let (since, until) = util::parse_range(Some(since.as_str()), Some(until.as_str()))?;
            let (Some(since), Some(until)) = (since, until) else {
                anyhow::bail!("Both --since and --until are required");
            };
            let device = if all_devices {
                None
            } else {
                resolve_device(device.device, &ctx.config)
            };
            commands::cmd_delete(device, since, until, &ctx)
        }
        Commands::RemoveDevice { device } => commands::cmd_remove_device(device.into(), &ctx),
        Commands::Purge { yes } => commands::cmd_purge(yes, &ctx),
        Commands::Stats { device, format } => {
            let device = resolve_device(device.device, &ctx.config);
            commands::cmd_stats(device, format, &ctx)
        }
        Commands::Devices => commands::cmd_devices(&ctx),
        Commands::Decode {
            kind,
            hex,
            interval,
            start,
            format,
        } => commands::cmd_decode(
            DecodeArgs {
                kind,
                hex,
                interval,
                start,
                format,
            },
            &ctx,
        ),
        Commands::Simulate {
            device,
            records,
            interval,
            chunk_size,
            drop_after,
            wide_entries,
        } => {
            let args = SimulateArgs {
                device: resolve_device(device.device, &ctx.config),
                records,
                interval,
                chunk_size,
                drop_after,
                wide_entries,
            };
            commands::cmd_simulate(args, &ctx).await
        }
        Commands::Config { action } => commands::cmd_config(action, &ctx),
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }
}
