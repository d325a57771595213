use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::config::{DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_REFRESH_SECRET: &str = "jwt-refresh-secret";
pub const ARG_JWT_EXPIRES_IN: &str = "jwt-expires-in";
pub const ARG_JWT_REFRESH_EXPIRES_IN: &str = "jwt-refresh-expires-in";
pub const ARG_PASSWORD_PEPPER: &str = "password-pepper";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub refresh_secret: SecretString,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub password_pepper: Option<SecretString>,
}

impl Options {
    /// Parse token signing arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_secret = |id: &str| -> anyhow::Result<SecretString> {
            matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone()))
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            secret: read_secret(ARG_JWT_SECRET)?,
            refresh_secret: read_secret(ARG_JWT_REFRESH_SECRET)?,
            expires_in: matches
                .get_one::<i64>(ARG_JWT_EXPIRES_IN)
                .copied()
                .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_expires_in: matches
                .get_one::<i64>(ARG_JWT_REFRESH_EXPIRES_IN)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS),
            password_pepper: matches
                .get_one::<String>(ARG_PASSWORD_PEPPER)
                .filter(|v| !v.is_empty())
                .map(|v| SecretString::from(v.clone())),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret for access tokens (at least 32 bytes)")
                .env("TOKENWARD_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_REFRESH_SECRET)
                .long(ARG_JWT_REFRESH_SECRET)
                .help("HMAC secret for refresh tokens, must differ from --jwt-secret")
                .env("TOKENWARD_JWT_REFRESH_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_EXPIRES_IN)
                .long(ARG_JWT_EXPIRES_IN)
                .help("Access token lifetime in seconds")
                .env("TOKENWARD_JWT_EXPIRES_IN")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_JWT_REFRESH_EXPIRES_IN)
                .long(ARG_JWT_REFRESH_EXPIRES_IN)
                .help("Refresh token lifetime in seconds")
                .env("TOKENWARD_JWT_REFRESH_EXPIRES_IN")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PASSWORD_PEPPER)
                .long(ARG_PASSWORD_PEPPER)
                .help("Server-side pepper mixed into password digests")
                .env("TOKENWARD_PASSWORD_PEPPER")
                .hide_env_values(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::ExposeSecret;

    const VARS: [&str; 5] = [
        "TOKENWARD_JWT_SECRET",
        "TOKENWARD_JWT_REFRESH_SECRET",
        "TOKENWARD_JWT_EXPIRES_IN",
        "TOKENWARD_JWT_REFRESH_EXPIRES_IN",
        "TOKENWARD_PASSWORD_PEPPER",
    ];

    fn command() -> Command {
        with_args(Command::new("tokenward"))
    }

    #[test]
    fn defaults() -> Result<()> {
        temp_env::with_vars_unset(VARS, || -> Result<()> {
            let matches = command().try_get_matches_from(vec![
                "tokenward",
                "--jwt-secret",
                "a",
                "--jwt-refresh-secret",
                "b",
            ])?;
            let options = Options::parse(&matches)?;
            assert_eq!(options.expires_in, 900);
            assert_eq!(options.refresh_expires_in, 1_209_600);
            assert!(options.password_pepper.is_none());
            Ok(())
        })
    }

    #[test]
    fn from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("TOKENWARD_JWT_SECRET", Some("access")),
                ("TOKENWARD_JWT_REFRESH_SECRET", Some("refresh")),
                ("TOKENWARD_JWT_EXPIRES_IN", Some("60")),
                ("TOKENWARD_JWT_REFRESH_EXPIRES_IN", Some("3600")),
                ("TOKENWARD_PASSWORD_PEPPER", Some("pepper")),
            ],
            || -> Result<()> {
                let matches = command().try_get_matches_from(vec!["tokenward"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.secret.expose_secret(), "access");
                assert_eq!(options.refresh_secret.expose_secret(), "refresh");
                assert_eq!(options.expires_in, 60);
                assert_eq!(options.refresh_expires_in, 3600);
                assert_eq!(
                    options.password_pepper.as_ref().map(|pepper| pepper.expose_secret()),
                    Some("pepper")
                );
                Ok(())
            },
        )
    }

    #[test]
    fn secrets_are_required() {
        temp_env::with_vars_unset(VARS, || {
            assert!(command().try_get_matches_from(vec!["tokenward"]).is_err());
        });
    }

    #[test]
    fn rejects_non_positive_lifetime() {
        temp_env::with_vars_unset(VARS, || {
            let result = command().try_get_matches_from(vec![
                "tokenward",
                "--jwt-secret",
                "a",
                "--jwt-refresh-secret",
                "b",
                "--jwt-expires-in",
                "0",
            ]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn empty_secret_fails_parse() -> Result<()> {
        temp_env::with_vars_unset(VARS, || -> Result<()> {
            let matches = command().try_get_matches_from(vec![
                "tokenward",
                "--jwt-secret",
                " ",
                "--jwt-refresh-secret",
                "b",
            ])?;
            assert!(Options::parse(&matches).is_err());
            Ok(())
        })
    }
}
