//! Delete, remove-device and purge commands.

use airlog_types::DeviceId;
use anyhow::{Context as _, Result, bail};
use time::OffsetDateTime;

use super::Context;
use crate::style;

/// Execute the delete command.
pub fn cmd_delete(
    device: Option<DeviceId>,
    since: OffsetDateTime,
    until: OffsetDateTime,
    ctx: &Context,
) -> Result<()> {
    let mut store = ctx.open_store()?;
    let removed = store
        .delete_records(since..=until, device.as_ref())
        .context("Failed to delete records")?;

    let scope = device.map_or_else(|| "all devices".to_string(), |d| d.to_string());
    ctx.status(&style::format_success(
        &format!("Deleted {} records from {}", removed, scope),
        ctx.opts.no_color,
    ));
    Ok(())
}

/// Execute the remove-device command.
pub fn cmd_remove_device(device: DeviceId, ctx: &Context) -> Result<()> {
    let mut store = ctx.open_store()?;
    if !store.devices().any(|d| *d == device) {
        ctx.status(&style::format_warning(
            &format!("No records attributed to {}", device),
            ctx.opts.no_color,
        ));
        return Ok(());
    }

    let removed = store.remove_all(&device);
    ctx.status(&style::format_success(
        &format!("Removed {} ({} records left the store)", device, removed),
        ctx.opts.no_color,
    ));
    Ok(())
}

/// Execute the purge command.
pub fn cmd_purge(yes: bool, ctx: &Context) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to delete every record in {} without --yes",
            ctx.store_path.display()
        );
    }

    let mut store = ctx.open_store()?;
    let count = store.len();
    store
        .delete_all_records()
        .context("Failed to delete store files")?;
    ctx.status(&style::format_success(
        &format!("Purged {} records", count),
        ctx.opts.no_color,
    ));
    Ok(())
}
