use serde::Deserialize;
use std::path::Path;

use super::client::ServiceError;

/// Service-account credentials for the PDF Services API
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    client_credentials: Option<ClientCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct ClientCredentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read the credential file downloaded from the developer console.
    ///
    /// Both the nested `client_credentials` layout and flat
    /// `client_id`/`client_secret` keys are accepted.
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text).map_err(|e| match e {
            ServiceError::Credentials(message) => {
                ServiceError::Credentials(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, ServiceError> {
        let file: CredentialsFile = serde_json::from_str(text)
            .map_err(|e| ServiceError::Credentials(e.to_string()))?;

        let (client_id, client_secret) = match file.client_credentials {
            Some(c) => (c.client_id, c.client_secret),
            None => match (file.client_id, file.client_secret) {
                (Some(id), Some(secret)) => (id, secret),
                _ => return Err(ServiceError::Credentials("missing client_id/client_secret".into())),
            },
        };

        if client_id.is_empty() || client_secret.is_empty() {
            return Err(ServiceError::Credentials(
                "client_id and client_secret must not be empty".into(),
            ));
        }

        Ok(Self::new(client_id, client_secret))
    }
}
