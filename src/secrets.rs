use std::path::Path;

use eyre::Context;
use secrecy::SecretString;

/// Secrets used by this application.
pub struct Secrets {
    /// `admin` user's password hash using `bcrypt`, for access to the logs.
    pub admin_password_hash: Option<SecretString>,
}

impl Secrets {
    /// Load secrets from environment variables, falling back to files in `secrets_dir`.
    pub async fn initialize(secrets_dir: &Path) -> eyre::Result<Self> {
        Ok(Self {
            admin_password_hash: initialize_admin_password_hash(
                std::env::var("ADMIN_PASSWORD_HASH"),
                secrets_dir,
            )
            .await?,
        })
    }
}

async fn initialize_admin_password_hash(
    env_hash: Result<String, std::env::VarError>,
    secrets_dir: &Path,
) -> eyre::Result<Option<SecretString>> {
    Ok(match env_hash {
        Ok(hash) => {
            tracing::debug!("Reading admin password hash from ADMIN_PASSWORD_HASH environment variable.");
            Some(SecretString::new(hash.trim().to_owned()))
        }
        Err(std::env::VarError::NotPresent) => {
            let secret_path = secrets_dir.join("admin_password_hash");
            tracing::debug!("Reading admin password hash from file {:?}", &secret_path);

            if secret_path.exists() {
                let hash = tokio::fs::read_to_string(&secret_path)
                    .await
                    .wrap_err_with(|| {
                        format!("Error reading admin password hash from file {:?}", secret_path)
                    })?;
                Some(SecretString::new(hash.trim().to_owned()))
            } else {
                None
            }
        }
        Err(unexpected) => {
            return Err(eyre::Error::from(unexpected))
                .wrap_err("Error attempting to read ADMIN_PASSWORD_HASH environment variable")
        }
    })
}
