//! Config command - inspect and initialize the configuration file.

use anyhow::{Context as _, Result, bail};

use super::Context;
use crate::cli::ConfigAction;
use crate::config::Config;
use crate::style;
use crate::util::write_output;

/// Execute the config command.
pub fn cmd_config(action: ConfigAction, ctx: &Context) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let mut content =
                toml::to_string_pretty(&ctx.config).context("Failed to serialize config")?;
            content.push_str(&format!(
                "\n# effective store path: {}\n",
                ctx.store_path.display()
            ));
            write_output(ctx.output.as_ref(), &content)
        }
        ConfigAction::Path => write_output(
            ctx.output.as_ref(),
            &format!("{}\n", ctx.config_path.display()),
        ),
        ConfigAction::Init { force } => {
            if ctx.config_path.exists() && !force {
                bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    ctx.config_path.display()
                );
            }
            Config::default().save(&ctx.config_path)?;
            ctx.status(&style::format_success(
                &format!("Wrote default config to {}", ctx.config_path.display()),
                ctx.opts.no_color,
            ));
            Ok(())
        }
        ConfigAction::Validate => {
            ctx.config.ensure_valid()?;
            ctx.status(&style::format_success(
                &format!("{} is valid", ctx.config_path.display()),
                ctx.opts.no_color,
            ));
            Ok(())
        }
    }
}
