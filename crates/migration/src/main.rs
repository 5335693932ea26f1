use config::{Config, Environment, File};
use sea_orm_migration::prelude::*;
use std::env;

/// Resolve `DATABASE_URL` the same way the relay does: `config.yaml` first,
/// then `DATABASE_URL` from the environment.
fn database_url_from_config() -> Option<String> {
    Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()
        .ok()?
        .get_string("database_url")
        .ok()
}

#[tokio::main]
async fn main() {
    if env::var("DATABASE_URL").is_err() {
        match database_url_from_config() {
            Some(url) if url.starts_with("memory:") => {
                eprintln!("database_url selects the in-memory store; nothing to migrate");
                return;
            }
            Some(url) => env::set_var("DATABASE_URL", url),
            None => eprintln!("no database_url in config.yaml; pass -u or set DATABASE_URL"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
