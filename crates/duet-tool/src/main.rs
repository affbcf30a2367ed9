//! Duet operator tool.
//!
//! Stands in for the out-of-band parties of a duet deployment: the
//! certificate authority, the escrow agent, and whoever has to look inside a
//! stored state document.
//!
//! # Usage
//!
//! ```bash
//! # Authority and escrow keys
//! duet-tool authority-keygen --secret-out authority.key
//! duet-tool escrow-keygen --secret-out escrow.key
//!
//! # New client identity with a signed certificate
//! duet-tool identity --username alice --authority-secret authority.key \
//!     --state-out alice.state --certificate-out alice.cert --password secret
//!
//! # Recover an escrowed message
//! duet-tool unescrow --escrow-secret escrow.key --message message.bin
//!
//! # Look inside a sealed state document
//! duet-tool inspect --state alice.state --password secret
//! ```

mod commands;
mod error;

use std::{io, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{commands::IdentityOptions, error::ToolError};

/// Duet operator tool
#[derive(Parser, Debug)]
#[command(name = "duet-tool")]
#[command(about = "Key, certificate and state utilities for duet")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a certificate authority key
    AuthorityKeygen {
        /// Where to write the secret key
        #[arg(long)]
        secret_out: PathBuf,
    },

    /// Generate an escrow agent key
    EscrowKeygen {
        /// Where to write the secret key
        #[arg(long)]
        secret_out: PathBuf,
    },

    /// Create a client identity and its signed certificate
    Identity {
        /// Username to certify
        #[arg(long)]
        username: String,

        /// Authority secret key file
        #[arg(long)]
        authority_secret: PathBuf,

        /// Where to write the client state document
        #[arg(long)]
        state_out: PathBuf,

        /// Where to write the signed certificate
        #[arg(long)]
        certificate_out: PathBuf,

        /// Seal the state document under this password
        #[arg(long)]
        password: Option<String>,
    },

    /// Certify an existing identity public key
    Issue {
        /// Authority secret key file
        #[arg(long)]
        authority_secret: PathBuf,

        /// Username to certify
        #[arg(long)]
        username: String,

        /// Identity public key (hex, SEC1)
        #[arg(long)]
        public_key: String,

        /// Where to write the signed certificate
        #[arg(long)]
        certificate_out: PathBuf,
    },

    /// Recover and decrypt an escrowed message
    Unescrow {
        /// Escrow secret key file
        #[arg(long)]
        escrow_secret: PathBuf,

        /// Encoded wire message
        #[arg(long)]
        message: PathBuf,
    },

    /// Summarize a state document without printing secrets
    Inspect {
        /// State document
        #[arg(long)]
        state: PathBuf,

        /// Password of a sealed state document
        #[arg(long)]
        password: Option<String>,
    },
}

fn run(command: Command) -> Result<(), ToolError> {
    let mut out = io::stdout().lock();

    match command {
        Command::AuthorityKeygen { secret_out } => commands::authority_keygen(&secret_out, &mut out),
        Command::EscrowKeygen { secret_out } => commands::escrow_keygen(&secret_out, &mut out),
        Command::Identity { username, authority_secret, state_out, certificate_out, password } => {
            let options = IdentityOptions {
                username: &username,
                authority_secret: &authority_secret,
                state_out: &state_out,
                certificate_out: &certificate_out,
                password: password.as_deref(),
            };
            commands::identity(&options, &mut out)
        },
        Command::Issue { authority_secret, username, public_key, certificate_out } => {
            commands::issue(&authority_secret, &username, &public_key, &certificate_out, &mut out)
        },
        Command::Unescrow { escrow_secret, message } => {
            commands::unescrow(&escrow_secret, &message, &mut out)
        },
        Command::Inspect { state, password } => {
            commands::inspect(&state, password.as_deref(), &mut out)
        },
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        },
    }
}
