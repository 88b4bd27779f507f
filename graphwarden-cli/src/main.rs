use clap::Parser;
use colored::Colorize;

use graphwarden_cli::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match graphwarden_cli::run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            e.exit_code()
        }
    };
    std::process::exit(code);
}
