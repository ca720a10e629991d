//! Posit Publisher credentials CLI
//!
//! Inspect and manage the credentials Publisher stores in the OS keyring
//! or in `~/.connect-credentials`.

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use publisher_credentials::{
    BackendKind, CloudEnvironment, CreateCredentialDetails, Credential, CredentialsConfig,
    CredentialsFactory, CredentialsService, MigrationState, ServerType,
};

/// Posit Publisher credential store
#[derive(Parser, Debug)]
#[command(name = "publisher-credentials")]
#[command(version)]
#[command(about = "Manage Posit Publisher server credentials")]
struct Cli {
    /// Storage backend (auto, keyring, file)
    #[arg(long, global = true, env = "PUBLISHER_CREDENTIALS_BACKEND")]
    backend: Option<BackendKind>,

    /// Credentials file used by the file backend
    #[arg(long, global = true, env = "PUBLISHER_CREDENTIALS_FILE")]
    file: Option<PathBuf>,

    /// Print secrets instead of redacting them
    #[arg(long, global = true)]
    show_secrets: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored credentials
    List,
    /// Show one credential
    Get { guid: String },
    /// Store a new credential
    Add(AddArgs),
    /// Remove a credential
    Delete { guid: String },
    /// Remove every stored credential, even unreadable ones
    Reset,
    /// Show or change the default server
    Default {
        #[command(subcommand)]
        action: Option<DefaultAction>,
    },
    /// Show which backend is in use
    Backend,
}

#[derive(Subcommand, Debug)]
enum DefaultAction {
    Show,
    Set { guid: String },
    Clear,
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long)]
    name: String,

    /// Server URL; Connect Cloud credentials default to their environment's URL
    #[arg(long, default_value = "")]
    url: String,

    /// connect, connect_cloud or snowflake; inferred from the URL when omitted
    #[arg(long)]
    server_type: Option<ServerType>,

    #[arg(long, env = "CONNECT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long)]
    token: Option<String>,

    #[arg(long)]
    private_key: Option<String>,

    #[arg(long)]
    snowflake_connection: Option<String>,

    #[arg(long)]
    account_id: Option<String>,

    #[arg(long)]
    account_name: Option<String>,

    #[arg(long)]
    refresh_token: Option<String>,

    #[arg(long)]
    access_token: Option<String>,

    #[arg(long, default_value = "production")]
    cloud_environment: CloudEnvironment,

    /// Replace a credential with the same name instead of failing
    #[arg(long)]
    force: bool,
}

impl AddArgs {
    fn into_details(self) -> CreateCredentialDetails {
        let server_type = self
            .server_type
            .unwrap_or_else(|| ServerType::from_url(&self.url));

        let mut details = CreateCredentialDetails::default();
        details.name = self.name;
        details.url = self.url;
        details.server_type = server_type;
        details.api_key = self.api_key.unwrap_or_default();
        details.token = self.token.unwrap_or_default();
        details.private_key = self.private_key.unwrap_or_default();
        details.snowflake_connection = self.snowflake_connection.unwrap_or_default();
        details.account_id = self.account_id.unwrap_or_default();
        details.account_name = self.account_name.unwrap_or_default();
        details.refresh_token = self.refresh_token.unwrap_or_default();
        details.access_token = self.access_token.unwrap_or_default();
        details.cloud_environment = self.cloud_environment;
        details
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn shown(credential: Credential, show_secrets: bool) -> Credential {
    if show_secrets {
        credential
    } else {
        credential.redacted()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = CredentialsConfig::default();
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(file) = cli.file {
        config.file_path = Some(file);
    }
    let factory = CredentialsFactory::new(config);

    if let Command::Reset = cli.command {
        let outcome = factory.reset()?;
        if let Some(e) = &outcome.backup_error {
            eprintln!("Warning: {}", e);
        }
        return print_json(&serde_json::json!({ "backupFile": outcome.backup_file_display() }));
    }

    let opened = factory.open()?;
    match &opened.migration {
        MigrationState::Migrated { count } => info!("Migrated {} legacy credentials", count),
        MigrationState::Failed { reason } => eprintln!("Warning: legacy migration failed: {}", reason),
        _ => {}
    }
    let service = opened.service;

    match cli.command {
        Command::List => {
            let credentials: Vec<Credential> = service
                .list()?
                .into_iter()
                .map(|c| shown(c, cli.show_secrets))
                .collect();
            print_json(&credentials)
        }
        Command::Get { guid } => print_json(&shown(service.get(&guid)?, cli.show_secrets)),
        Command::Add(args) => {
            let force = args.force;
            let details = args.into_details();
            let credential = if force {
                service.force_set(details)?
            } else {
                service.set(details)?
            };
            print_json(&shown(credential, cli.show_secrets))
        }
        Command::Delete { guid } => {
            service.delete(&guid)?;
            print_json(&serde_json::json!({ "deleted": guid }))
        }
        Command::Default { action } => match action.unwrap_or(DefaultAction::Show) {
            DefaultAction::Show => {
                let current = service
                    .default_server()?
                    .map(|c| shown(c, cli.show_secrets));
                print_json(&current)
            }
            DefaultAction::Set { guid } => {
                service.set_default_server(&guid)?;
                print_json(&serde_json::json!({ "defaultServer": guid }))
            }
            DefaultAction::Clear => {
                service.clear_default_server()?;
                print_json(&serde_json::json!({ "defaultServer": null }))
            }
        },
        Command::Backend => print_json(&serde_json::json!({
            "backend": service.backend_name(),
            "configured": factory.config().backend,
        })),
        Command::Reset => Ok(()),
    }
}
