//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{
    server::{Args, StoreKind},
    Action,
};
use crate::cli::commands::{self, jwt};
use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let store: StoreKind = matches
        .get_one::<String>(commands::ARG_STORE)
        .map_or("postgres", String::as_str)
        .parse()?;
    let dsn = matches.get_one::<String>(commands::ARG_DSN).cloned();
    if store == StoreKind::Postgres && dsn.is_none() {
        anyhow::bail!("missing required argument: --{}", commands::ARG_DSN);
    }
    let db_max_connections = matches
        .get_one::<u32>(commands::ARG_DB_MAX_CONNECTIONS)
        .copied()
        .context("missing --db-max-connections")?;

    let jwt_opts = jwt::Options::parse(matches)?;
    let mut globals = GlobalArgs::new(jwt_opts.secret, jwt_opts.refresh_secret);
    if let Some(pepper) = jwt_opts.password_pepper {
        globals.set_pepper(pepper);
    }

    Ok(Action::Server(Args {
        port,
        store,
        dsn,
        db_max_connections,
        jwt_expires_in: jwt_opts.expires_in,
        jwt_refresh_expires_in: jwt_opts.refresh_expires_in,
        globals,
    }))
}
