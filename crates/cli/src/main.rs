//! Rural Grow CLI - operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Make a user an admin
//! rg-cli roles grant -u <USER_ID> -r admin
//!
//! # Show the role a user's sessions resolve to
//! rg-cli roles show -u <USER_ID>
//!
//! # Remove all roles of a user
//! rg-cli roles revoke -u <USER_ID>
//!
//! # List every assignment
//! rg-cli roles list
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use rural_grow_core::{Role, UserId};

mod commands;

#[derive(Parser)]
#[command(name = "rg-cli")]
#[command(author, version, about = "Rural Grow CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user roles
    Roles {
        #[command(subcommand)]
        action: RolesAction,
    },
}

#[derive(Subcommand)]
enum RolesAction {
    /// Replace the role of a user
    Grant {
        /// User id
        #[arg(short, long)]
        user: UserId,

        /// Role (`admin`, `farmer`, `seller`)
        #[arg(short, long)]
        role: Role,
    },
    /// Remove every role of a user
    Revoke {
        /// User id
        #[arg(short, long)]
        user: UserId,
    },
    /// Show the role a user resolves to
    Show {
        /// User id
        #[arg(short, long)]
        user: UserId,
    },
    /// List every role assignment
    List,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::roles::RolesError> {
    match cli.command {
        Commands::Roles { action } => {
            let roles = commands::roles::connect()?;
            match action {
                RolesAction::Grant { user, role } => {
                    commands::roles::grant(&roles, user, role).await?;
                }
                RolesAction::Revoke { user } => commands::roles::revoke(&roles, user).await?,
                RolesAction::Show { user } => {
                    commands::roles::show(&roles, user).await?;
                }
                RolesAction::List => {
                    commands::roles::list(&roles).await?;
                }
            }
        }
    }
    Ok(())
}
