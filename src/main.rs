/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Command line front end of dioptas-rs

use clap::Parser;
use dioptas_rs::cli::{commands, Cli};

fn main() -> anyhow::Result<()> {
    // RUST_LOG=info shows per-file progress
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    commands::run(cli.command)
}
