use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "zapd",
    about = "Token-triggered automation daemon: scan a token, run its ZapScript",
    long_about = None,
    version,
)]
pub struct Args {
    /// HTTP control port [default: 7497]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to TOML config file (overrides default search: ./zapd.toml, ~/.config/zapd/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bind the control API to localhost only (127.0.0.1)
    #[arg(long)]
    pub localhost: bool,

    /// Directory for history, mapping files and downloaded media
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Send ZapScript to a running daemon and exit
    #[arg(long, value_name = "SCRIPT", conflicts_with = "reload")]
    pub run: Option<String>,

    /// Ask a running daemon to reload its mapping rules and exit
    #[arg(long)]
    pub reload: bool,
}
