//! CLI command implementations.

pub mod ancestry;
pub mod twentythree;

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::Args;
use kinharvest_core::Credentials;

/// Arguments shared by every portal command.
#[derive(Args)]
pub struct VendorArgs {
    /// Account username; prompted when omitted.
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Account password; prompted when omitted.
    #[arg(long, short = 'p')]
    pub password: Option<String>,

    /// Request timeout and retry delay in seconds.
    #[arg(long, short = 't', default_value = "60")]
    pub timeout: u64,

    /// Output file prefix; defaults to an account identifier.
    #[arg(long, short = 'o')]
    pub out: Option<String>,

    /// Also download the extended per-match data.
    #[arg(long, short = 'x')]
    pub extended: bool,

    /// Parallel request limit for batched downloads.
    #[arg(long, default_value = "8")]
    pub parallelism: usize,
}

impl VendorArgs {
    /// Resolves credentials, prompting on the terminal for anything not
    /// given on the command line.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = match &self.username {
            Some(username) => username.clone(),
            None => prompt("Enter username: ")?,
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt("Enter password: ")?,
        };
        Ok(Credentials::new(username, password))
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    std::io::stderr().flush().context("flushing prompt")?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading credential from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
