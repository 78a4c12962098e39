use clap::Parser;
use runpack::cli::{run, Cli};
use runpack_core::error::PipelineError;

#[tokio::main]
async fn main() {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing for the CLI.
    tracing_subscriber::fmt::init();
    tracing::info!("runpack startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(()) => tracing::info!("runpack completed successfully"),
        Err(e) => {
            tracing::error!(error = %e, "runpack exited with error");
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}
