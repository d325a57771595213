use crate::{
    api,
    auth::{Argon2Hasher, Auth, CredentialStore, MemoryStore, PgStore, SessionManager},
    cli::globals::GlobalArgs,
};
use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub store: StoreKind,
    pub dsn: Option<String>,
    pub db_max_connections: u32,
    pub jwt_expires_in: i64,
    pub jwt_refresh_expires_in: i64,
    pub globals: GlobalArgs,
}

/// Hide the password part of a DSN before it reaches the logs.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}

fn log_startup_args(args: &Args) {
    debug!(
        port = args.port,
        store = ?args.store,
        dsn = args.dsn.as_deref().map(redact_dsn),
        db_max_connections = args.db_max_connections,
        jwt_expires_in = args.jwt_expires_in,
        jwt_refresh_expires_in = args.jwt_refresh_expires_in,
        password_pepper = args.globals.password_pepper.is_some(),
        "Startup configuration"
    );
}

async fn connect_store(args: &Args) -> Result<Arc<dyn CredentialStore>> {
    match args.store {
        StoreKind::Postgres => {
            let dsn = args
                .dsn
                .as_deref()
                .context("missing required argument: --dsn")?;

            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(args.db_max_connections)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;

            let store = PgStore::new(pool);
            store.migrate().await.context("Failed to apply schema")?;
            info!("Connected to postgres credential store");
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            warn!("Using in-memory credential store, all sessions are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the store is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let jwt = args
        .globals
        .jwt_config(args.jwt_expires_in, args.jwt_refresh_expires_in);
    jwt.validate()
        .map_err(|err| anyhow!("invalid JWT configuration: {err}"))?;

    let store = connect_store(&args).await?;

    let pepper = args.globals.password_pepper.clone();
    let hasher = tokio::task::spawn_blocking(move || Argon2Hasher::new(pepper))
        .await
        .context("password hasher setup task failed")?
        .context("Failed to initialize password hasher")?;

    let manager = SessionManager::new(store, Arc::new(hasher));
    let auth = Arc::new(Auth::new(manager, jwt));

    api::serve(args.port, auth).await
}
