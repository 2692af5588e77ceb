use clap::Parser;
use clap::Subcommand;
use kubeassist_core::provider_auth::TokenStatus;
use serde_json::json;
use tracing::warn;

use crate::session::Session;

#[derive(Debug, Parser)]
pub struct AuthCli {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in to GitHub in the browser and store the credential.
    Login,
    /// Remove the stored GitHub credential.
    Logout,
    /// Show whether a credential is stored and whether it can fetch a Copilot token.
    Status(AuthStatusArgs),
}

#[derive(Debug, Parser)]
pub struct AuthStatusArgs {
    /// Exchange the stored credential for a Copilot token to verify it.
    #[arg(long = "check")]
    pub check: bool,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

impl AuthCli {
    pub async fn run(self, session: &Session) -> anyhow::Result<()> {
        let credentials = session.credentials();
        match self.command {
            AuthCommand::Login => {
                credentials.login().await?;
                println!("Signed in to GitHub. Copilot tokens are fetched on first use.");
            }
            AuthCommand::Logout => {
                credentials.logout().await?;
                println!("Signed out.");
            }
            AuthCommand::Status(args) => {
                let stored = credentials.has_stored_credential();
                let error = if args.check && stored {
                    credentials.ensure_token().await.err().map(|err| {
                        warn!(%err, "credential check failed");
                        err.to_string()
                    })
                } else {
                    None
                };
                print_status(stored, credentials.status(), error, args.json)?;
            }
        }
        Ok(())
    }
}

fn print_status(
    stored: bool,
    status: TokenStatus,
    error: Option<String>,
    as_json: bool,
) -> anyhow::Result<()> {
    let (token, expires_at) = match status {
        TokenStatus::NoToken => ("none", None),
        TokenStatus::Valid { expires_at } => ("valid", Some(expires_at)),
        TokenStatus::Refreshing => ("refreshing", None),
        TokenStatus::Invalid => ("invalid", None),
    };

    if as_json {
        let value = json!({
            "credential_stored": stored,
            "token": token,
            "expires_at": expires_at.map(|at| at.to_rfc3339()),
            "error": error,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if stored {
        println!("GitHub credential: stored");
    } else {
        println!("GitHub credential: not signed in (run `kubeassist auth login` or set GITHUB_TOKEN)");
    }
    match expires_at {
        Some(at) => println!("Copilot token:     valid until {}", at.to_rfc3339()),
        None => println!("Copilot token:     {token}"),
    }
    if let Some(error) = error {
        println!("Error:             {error}");
    }
    Ok(())
}
