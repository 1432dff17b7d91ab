//! CLI entry point for hint-conditioned GAN training and inference

use clap::Parser;
use hintgan::io::cli::Cli;

fn main() -> hintgan::Result<()> {
    Cli::parse().execute()
}
