mod cli;
mod infra;
mod routes;
mod score;
mod server;

use hcc_raf::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
