//! Print a bcrypt hash suitable for the `users.hashed_password` column.
//!
//! Usage: hash-password [PASSWORD] [--cost N]
//!   PASSWORD : read from stdin when omitted (keeps it out of shell history)

use std::io::BufRead;

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(name = "hash-password", about = "Hash a password with bcrypt")]
struct Args {
    /// Password to hash (read from stdin if omitted)
    password: Option<String>,

    /// bcrypt cost factor; keep it equal to BCRYPT_COST of the running service
    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    cost: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let password = match args.password {
        Some(p) => p,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }

    println!("{}", bcrypt::hash(password, args.cost)?);
    Ok(())
}
