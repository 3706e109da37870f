//! Apply the server's SQL migrations.

use zentro_server::store::postgres::run_migrations;

/// Run all pending migrations.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    run_migrations(&pool).await?;
    tracing::info!("migrations applied");
    Ok(())
}
