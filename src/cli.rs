use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML
    #[arg(long, default_value = "drift.toml")]
    pub config: String,

    /// Random seed (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Performance length in seconds (overrides config)
    #[arg(long)]
    pub duration: Option<f32>,

    /// Driver tick in milliseconds (overrides config)
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Follow the wall clock instead of rendering as fast as possible
    #[arg(long, default_value_t = false)]
    pub realtime: bool,

    /// Write the synth command stream as JSON lines ("-" for stdout)
    #[arg(long)]
    pub json: Option<String>,
}
