use clap::Parser;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/llm_refine";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Refine Endpoint Args ---
    /// URL of the refine endpoint that turns a prompt into a display-ready reply
    #[arg(long, env = "REFINE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Optional request timeout in seconds. Unset means wait for the endpoint indefinitely.
    #[arg(long, env = "REFINE_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    // --- Rendering Args ---
    /// Directory where received chart images are written as PNG files.
    /// When unset, charts are only reported by size.
    #[arg(long, env = "CHART_DIR")]
    pub chart_dir: Option<String>,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
