//! Create a login in the Postgres credential store.
//!
//! Usage: create-user USERNAME [--email EMAIL] [--cost N]
//!   The password is read from stdin.

use std::io::BufRead;

use anyhow::Context;
use clap::Parser;
use planner_auth::db::{self, PgCredentialStore};

#[derive(Parser)]
#[command(name = "create-user", about = "Create a user in the credential store")]
struct Args {
    /// Login name (the token subject)
    username: String,

    /// Optional contact email
    #[arg(long)]
    email: Option<String>,

    /// bcrypt cost factor; keep it equal to BCRYPT_COST of the running service
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    cost: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

    let mut password = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut password)
        .context("Failed to read password from stdin")?;
    let password = password.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }

    let cost = args.cost;
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;

    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    PgCredentialStore::new(pool)
        .insert(&args.username, args.email.as_deref(), &hash)
        .await
        .with_context(|| format!("Failed to create user {}", args.username))?;

    tracing::info!("Created user {}", args.username);
    Ok(())
}
