use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use inbox_sync::{
    KeyringTokens, NotificationSession, Settings, StaticTokens, SyncError, TokenProvider,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "inbox-sync", about = "Follow a notification inbox in real time")]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Overrides `base_url` from the settings file.
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token. Falls back to the OS keychain when omitted.
    #[arg(long)]
    token: Option<String>,

    /// Organization scope sent with the stream connection.
    #[arg(long)]
    org_id: Option<String>,

    /// Store the given token in the OS keychain before connecting.
    #[arg(long, requires = "token")]
    save_token: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inbox_sync=info")),
        )
        .init();

    if let Err(error) = run(Cli::parse()).await {
        error!(%error, "inbox-sync failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> inbox_sync::Result<()> {
    let mut settings = Settings::load(&cli.settings)?;
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    if cli.org_id.is_some() {
        settings.org_id = cli.org_id.clone();
    }
    let settings = settings.normalized()?;

    let tokens: Arc<dyn TokenProvider> = match cli.token {
        Some(token) if cli.save_token => {
            let org_id = cli.org_id;
            let keyring = open_keychain(move |keyring| {
                keyring.store_token(&token)?;
                if let Some(org_id) = org_id.as_deref() {
                    keyring.store_org_id(org_id)?;
                }
                Ok(())
            })
            .await?;
            info!("token saved to keychain");
            Arc::new(keyring)
        }
        Some(token) => Arc::new(StaticTokens::new(token, cli.org_id)),
        None => Arc::new(open_keychain(|_| Ok(())).await?),
    };

    let session = NotificationSession::connect(&settings, tokens)?;
    session.start()?;

    let mut inbox = session.subscribe();
    let mut connection = session.connection().subscribe_state();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = inbox.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = inbox.borrow_and_update().clone();
                info!(
                    total = view.notifications.len(),
                    unread = view.unread_count,
                    newest = view.notifications.first().map(|n| n.title.as_str()).unwrap_or("-"),
                    "inbox updated"
                );
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connection.borrow_and_update();
                info!(%state, "connection state changed");
            }
        }
    }

    session.stop().await;
    Ok(())
}

/// Keychain access blocks, so it runs off the async workers.
async fn open_keychain<F>(prepare: F) -> inbox_sync::Result<KeyringTokens>
where
    F: FnOnce(&KeyringTokens) -> inbox_sync::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let keyring = KeyringTokens::new()?;
        prepare(&keyring)?;
        Ok(keyring)
    })
    .await
    .map_err(|error| SyncError::Keyring(format!("keychain task failed: {error}")))?
}
