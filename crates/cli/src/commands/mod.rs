//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;

/// Connect to the database named by `ZENTRO_DATABASE_URL`.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    let url = std::env::var("ZENTRO_DATABASE_URL")
        .map_err(|_| "ZENTRO_DATABASE_URL is not set")?;
    let pool = zentro_server::store::postgres::create_pool(&SecretString::from(url)).await?;
    Ok(pool)
}
