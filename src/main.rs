//! dbquery - ask a SQL database questions in plain language.

use dbquery::cli::Cli;
use dbquery::{app, logging};
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = app::run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}
