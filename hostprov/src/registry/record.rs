//! Host record stored in the registry

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Credentials and provisioning history for one registered host
#[derive(Debug, Serialize, Deserialize)]
pub struct HostRecord {
    /// Login used to run the provisioning script
    pub root_username: String,

    /// Password for `root_username`
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub root_password: SecretString,

    /// Usernames provisioned on this host, oldest first
    #[serde(default)]
    pub accounts: Vec<String>,
}

impl HostRecord {
    /// Create a record with no provisioned accounts
    pub fn new(root_username: impl Into<String>, root_password: SecretString) -> Self {
        Self {
            root_username: root_username.into(),
            root_password,
            accounts: Vec::new(),
        }
    }
}

impl Clone for HostRecord {
    fn clone(&self) -> Self {
        Self {
            root_username: self.root_username.clone(),
            root_password: SecretString::from(self.root_password.expose_secret().to_owned()),
            accounts: self.accounts.clone(),
        }
    }
}

// The registry file is the credential store, so the password is written in
// the clear there and nowhere else.
fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}
