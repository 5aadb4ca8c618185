//! # reducer
//!
//! Acquires a compute backend, runs one reduction dispatch over the values
//! given on the command line and prints the partial results. Logs default to
//! `info`; set `RUST_LOG` to override, e.g. `RUST_LOG=compute=debug`.

mod app;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(app::log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();
    let args = app::Args::parse();
    app::run(&args)
}
