use crate::security::Credentials;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("Could not access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid security material: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'{0}' is not a profile document")]
    NotAProfile(PathBuf),
}

/// Where the security material of a client lives between runs.
///
/// The client loads the credentials once, updates them in memory and saves them after every
/// successful registration or token request.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials, CredentialStoreError>;

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialStoreError>;
}

/// Keeps the credentials in the `parameters.security` object of a profile file.
///
/// Saving rewrites the whole document, leaving every other key as it was. The new document is
/// written to a temporary file next to the profile and renamed over it, so the profile is never
/// left half written.
#[derive(Debug)]
pub struct ProfileFileStore {
    path: PathBuf,
}

impl ProfileFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.path.file_name().unwrap_or_default());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn read_document(&self) -> Result<Value, CredentialStoreError> {
        let content = fs::read_to_string(&self.path).map_err(|source| CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl CredentialStore for ProfileFileStore {
    fn load(&self) -> Result<Credentials, CredentialStoreError> {
        let document = self.read_document()?;
        match document.pointer("/parameters/security") {
            Some(security) => Ok(Credentials::deserialize(security)?),
            None => Ok(Credentials::default()),
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialStoreError> {
        let mut document = self.read_document()?;
        let parameters = document
            .as_object_mut()
            .and_then(|root| {
                root.entry("parameters")
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
            })
            .ok_or_else(|| CredentialStoreError::NotAProfile(self.path.clone()))?;
        parameters.insert("security".to_owned(), serde_json::to_value(credentials)?);

        let content = serde_json::to_string_pretty(&document)?;
        let temp_path = self.temp_path();
        write_then_rename(&temp_path, &self.path, content.as_bytes()).map_err(|source| {
            // Best effort, the temporary file may not exist.
            let _removed = fs::remove_file(&temp_path);
            CredentialStoreError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }
}

fn write_then_rename(temp_path: &Path, path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

/// Keeps the credentials in memory only. Used when the profile was not loaded from a file.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Credentials, CredentialStoreError> {
        Ok(self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialStoreError> {
        credentials.clone_into(
            &mut self
                .credentials
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env::temp_dir;

    fn temp_profile(name: &str, content: &Value) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = temp_dir().join(format!("sepa-store-{}-{name}.json", std::process::id()));
        fs::write(&path, serde_json::to_string(content)?)?;
        Ok(path)
    }

    #[test]
    fn profile_file_keeps_other_keys() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_profile(
            "keeps",
            &json!({
                "parameters": {"host": "localhost", "ports": {"http": 8000}},
                "namespaces": {"schema": "http://schema.org/"}
            }),
        )?;
        let store = ProfileFileStore::new(&path);
        assert_eq!(store.load()?, Credentials::default());

        let mut credentials = Credentials::default();
        credentials.set_client("id", "secret");
        store.save(&credentials)?;

        let document: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(
            document,
            json!({
                "parameters": {
                    "host": "localhost",
                    "ports": {"http": 8000},
                    "security": {"client_id": "id", "client_secret": "secret"}
                },
                "namespaces": {"schema": "http://schema.org/"}
            })
        );
        assert_eq!(store.load()?, credentials);
        fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn save_replaces_the_file() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_profile("replace", &json!({"parameters": {"host": "localhost"}}))?;
        let store = ProfileFileStore::new(&path);
        let temp_path = store.temp_path();
        assert_eq!(temp_path.parent(), path.parent());
        assert_ne!(temp_path, path);

        let mut credentials = Credentials::default();
        credentials.set_client("id", "secret");
        store.save(&credentials)?;
        credentials.set_client("id", "other-secret");
        store.save(&credentials)?;

        assert!(!temp_path.exists());
        assert_eq!(store.load()?, credentials);
        fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let store = ProfileFileStore::new(temp_dir().join("sepa-store-does-not-exist.json"));
        assert!(matches!(store.load(), Err(CredentialStoreError::Io { .. })));
    }

    #[test]
    fn non_object_document_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_profile("array", &json!([1, 2]))?;
        let store = ProfileFileStore::new(&path);
        assert!(matches!(
            store.save(&Credentials::default()),
            Err(CredentialStoreError::NotAProfile(_))
        ));
        fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn memory_store() -> Result<(), CredentialStoreError> {
        let store = MemoryCredentialStore::default();
        let mut credentials = Credentials::default();
        credentials.set_client("id", "secret");
        store.save(&credentials)?;
        assert_eq!(store.load()?, credentials);
        Ok(())
    }
}
