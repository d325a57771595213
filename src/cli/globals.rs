use secrecy::SecretString;

use crate::auth::JwtConfig;

/// Runtime secrets handed from the CLI to the server.
#[derive(Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
    pub jwt_refresh_secret: SecretString,
    pub password_pepper: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString, jwt_refresh_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            jwt_refresh_secret,
            password_pepper: None,
        }
    }

    pub fn set_pepper(&mut self, pepper: SecretString) {
        self.password_pepper = Some(pepper);
    }

    #[must_use]
    pub fn jwt_config(&self, expires_in: i64, refresh_expires_in: i64) -> JwtConfig {
        JwtConfig::new(self.jwt_secret.clone(), self.jwt_refresh_secret.clone())
            .with_expires_in(expires_in)
            .with_refresh_expires_in(refresh_expires_in)
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("jwt_secret", &"***")
            .field("jwt_refresh_secret", &"***")
            .field(
                "password_pepper",
                &self.password_pepper.as_ref().map(|_| "***"),
            )
            .finish()
    }
}
