use clap::Parser;
use std::path::PathBuf;

/// Download URLs and re-upload them to cloud storage
#[derive(Parser, Debug)]
#[command(name = "transit")]
#[command(version)]
#[command(about = "Download files in the background and upload them to Google Drive", long_about = None)]
pub struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,

    /// Only download; skip the upload stage
    #[arg(long)]
    pub no_upload: bool,

    /// Keep local files after the pipeline succeeds
    #[arg(long)]
    pub keep: bool,
}
