use clap::Parser;
use tidyrun::cli::{Cli, EXIT_USAGE, Output};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    let code = match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            Output::new(false, quiet).error(&format!("{e:#}"));
            EXIT_USAGE
        }
    };
    std::process::exit(code);
}
