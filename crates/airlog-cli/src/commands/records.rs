//! Import, export, list, stats and devices commands.

use std::path::PathBuf;

use airlog_store::{RecordQuery, codec};
use airlog_types::DeviceId;
use anyhow::{Context as _, Result, bail};

use super::Context;
use crate::cli::OutputFormat;
use crate::format::{
    format_import_report, format_records_csv, format_records_json, format_records_text,
    format_stats_text,
};
use crate::style;
use crate::util::{read_input, write_output};

/// Execute the import command.
pub fn cmd_import(
    input: Option<PathBuf>,
    device: Option<DeviceId>,
    show_issues: bool,
    ctx: &Context,
) -> Result<()> {
    let text = read_input(input.as_deref())?;
    let mut store = ctx.open_store()?;
    let report = store.import_text(&text, device.as_ref());

    if !ctx.quiet || show_issues {
        write_output(
            ctx.output.as_ref(),
            &format_import_report(&report, show_issues, &ctx.opts),
        )?;
    }
    Ok(())
}

/// Execute the export command.
pub fn cmd_export(
    destination: Option<PathBuf>,
    query: RecordQuery,
    ctx: &Context,
) -> Result<()> {
    let store = ctx.open_store()?;
    let records = store.query(&query);

    match destination {
        Some(path) => {
            codec::export(&records, &path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            ctx.status(&style::format_success(
                &format!("Exported {} records to {}", records.len(), path.display()),
                ctx.opts.no_color,
            ));
        }
        None => {
            let text = codec::to_canonical_string(&records)?;
            write_output(ctx.output.as_ref(), &text)?;
        }
    }
    Ok(())
}

/// Arguments for the list command.
pub struct ListArgs {
    pub query: RecordQuery,
    pub format: OutputFormat,
}

/// Execute the list command.
pub fn cmd_list(args: ListArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let records = store.query(&args.query);

    let formatted = match args.format {
        OutputFormat::Text => format_records_text(&records, &ctx.opts),
        OutputFormat::Json => format_records_json(&records, &ctx.opts)?,
        OutputFormat::Csv => format_records_csv(&records, &ctx.opts)?,
    };
    write_output(ctx.output.as_ref(), &formatted)
}

/// Execute the stats command.
pub fn cmd_stats(device: Option<DeviceId>, format: OutputFormat, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let stats = store.stats(device.as_ref());

    let formatted = match format {
        OutputFormat::Text => {
            let scope = device
                .as_ref()
                .map_or_else(|| "all devices".to_string(), |d| d.to_string());
            format_stats_text(stats.as_ref(), &scope, &ctx.opts)
        }
        OutputFormat::Json => ctx.opts.as_json(&stats)?,
        OutputFormat::Csv => bail!("CSV output is not available for stats; use text or json"),
    };
    write_output(ctx.output.as_ref(), &formatted)
}

/// Execute the devices command.
pub fn cmd_devices(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let mut output = format!("Store: {}\n", store.path().display());
    output.push_str(&format!("Records: {}\n\n", store.len()));

    let devices: Vec<&DeviceId> = store.devices().collect();
    if devices.is_empty() {
        output.push_str("No devices. Import with --device to attribute records.\n");
    } else {
        output.push_str("Devices:\n");
        for device in devices {
            output.push_str(&format!(
                "  {} ({} records)\n",
                device,
                store.records_for(device).len()
            ));
        }
    }

    let logs = store.sync_logs()?;
    if !logs.is_empty() {
        output.push_str("\nSync logs:\n");
        for log in logs {
            output.push_str(&format!("  {}\n", log.display()));
        }
    }

    write_output(ctx.output.as_ref(), &output)
}
