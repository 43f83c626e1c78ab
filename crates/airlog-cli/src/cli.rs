//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable device argument
#[derive(Debug, Clone, Default, Args)]
pub struct DeviceArgs {
    /// Device id records are attributed to, or use AIRLOG_DEVICE env var
    #[arg(short, long, env = "AIRLOG_DEVICE")]
    pub device: Option<String>,
}

/// Reusable time range arguments
#[derive(Debug, Clone, Default, Args)]
pub struct RangeArgs {
    /// Start of range (RFC3339, YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS], UTC)
    #[arg(long)]
    pub since: Option<String>,

    /// End of range, inclusive (same formats as --since)
    #[arg(long)]
    pub until: Option<String>,
}

#[derive(Parser)]
#[command(name = "airlog")]
#[command(author, version, about = "Collect, reconcile and export CO2 monitor telemetry", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "AIRLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Record store file, overriding the configured path
    #[arg(long, global = true, env = "AIRLOG_STORE")]
    pub store: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a CSV file (canonical or vendor app export) into the store
    Import {
        /// CSV file to import; reads stdin when omitted or "-"
        input: Option<PathBuf>,

        #[command(flatten)]
        device: DeviceArgs,

        /// Print every rejected row
        #[arg(long)]
        show_issues: bool,
    },

    /// Export stored records as canonical CSV
    Export {
        /// Destination file, written atomically; prints to stdout when omitted
        destination: Option<PathBuf>,

        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// List stored records
    List {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        range: RangeArgs,

        /// Maximum number of records
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Skip this many records
        #[arg(long)]
        offset: Option<usize>,

        /// Newest records first
        #[arg(long)]
        newest: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Omit header row in CSV output (useful for appending)
        #[arg(long)]
        no_header: bool,
    },

    /// Delete records in a time range
    Delete {
        #[command(flatten)]
        device: DeviceArgs,

        /// Delete from every partition, ignoring the default device
        #[arg(long, conflicts_with = "device")]
        all_devices: bool,

        /// Start of range (inclusive)
        #[arg(long)]
        since: String,

        /// End of range (inclusive)
        #[arg(long)]
        until: String,
    },

    /// Drop every record attributed to a device
    RemoveDevice {
        /// Device id
        device: String,
    },

    /// Delete all records, the store file and sync logs
    Purge {
        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },

    /// Show summary statistics
    Stats {
        #[command(flatten)]
        device: DeviceArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List devices and sync logs in the store
    Devices,

    /// Decode a raw payload given as hex
    Decode {
        /// Payload kind
        #[arg(value_enum)]
        kind: PayloadKind,

        /// Hex bytes (spaces, colons and a 0x prefix are ignored)
        hex: String,

        /// Sampling interval in seconds for history chunks
        #[arg(long, default_value = "300")]
        interval: u32,

        /// Timestamp of the first chunk entry (defaults to now)
        #[arg(long)]
        start: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a sync session against a simulated sensor and store the result
    Simulate {
        #[command(flatten)]
        device: DeviceArgs,

        /// Records held by the simulated sensor
        #[arg(short = 'n', long, default_value = "48")]
        records: u16,

        /// Sampling interval in seconds reported by the sensor
        #[arg(long, default_value = "300")]
        interval: u16,

        /// Entries per history chunk
        #[arg(long, default_value = "10")]
        chunk_size: usize,

        /// Stop streaming after this many chunks
        #[arg(long)]
        drop_after: Option<usize>,

        /// Stream 8-byte entries (humidity in hundredths)
        #[arg(long)]
        wide_entries: bool,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Raw payload kinds accepted by `decode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    /// Current reading frame (7, 11-12 or 13+ bytes)
    Current,
    /// History chunk with its 4-byte header
    Chunk,
    /// Bare history entries without a header
    Entries,
}

/// Configuration subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check the configuration file for errors
    Validate,
}
