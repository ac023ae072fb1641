//! Profile & credential store (§4.6): isolates configuration, cache, and
//! version history per profile, and keeps the API token sealed at rest.

mod config;
mod seal;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use config::Config;

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub name: String,
    pub display_name: String,
    pub created: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ProfilesIndex {
    active: Option<String>,
    profiles: Vec<ProfileMeta>,
}

pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: PathBuf) -> Self {
        ProfileStore { root }
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("profiles.json")
    }

    fn profile_dir(&self, name: &str) -> PathBuf {
        self.root.join("profiles").join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("config.json")
    }

    fn salt_path(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("salt")
    }

    pub fn cache_dir(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("cache")
    }

    pub fn versions_dir(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("versions")
    }

    pub fn queue_history_path(&self, name: &str) -> PathBuf {
        self.profile_dir(name).join("queue_history.json")
    }

    async fn read_index(&self) -> Result<ProfilesIndex, StorageError> {
        match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProfilesIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_index(&self, index: &ProfilesIndex) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        atomic_write_json(&self.index_path(), index).await
    }

    pub async fn list(&self) -> Result<Vec<ProfileMeta>, StorageError> {
        Ok(self.read_index().await?.profiles)
    }

    pub async fn active(&self) -> Result<Option<String>, StorageError> {
        Ok(self.read_index().await?.active)
    }

    /// Creates a profile directory and registers it. The first profile
    /// ever created becomes active automatically.
    pub async fn create(&self, name: &str, display: &str) -> Result<(), StorageError> {
        let mut index = self.read_index().await?;
        if index.profiles.iter().any(|p| p.name == name) {
            return Err(StorageError::Other(format!("profile {name} already exists")));
        }

        tokio::fs::create_dir_all(self.cache_dir(name)).await?;
        tokio::fs::create_dir_all(self.versions_dir(name)).await?;
        atomic_write_json(&self.config_path(name), &Config::default()).await?;
        tokio::fs::write(self.salt_path(name), seal::new_salt()).await?;

        index.profiles.push(ProfileMeta {
            name: name.to_string(),
            display_name: display.to_string(),
            created: Utc::now(),
            last_used: None,
        });
        if index.active.is_none() {
            index.active = Some(name.to_string());
        }
        self.write_index(&index).await
    }

    pub async fn rename(&self, name: &str, new_display: &str) -> Result<(), StorageError> {
        let mut index = self.read_index().await?;
        let entry = index
            .profiles
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| StorageError::Other(format!("no such profile: {name}")))?;
        entry.display_name = new_display.to_string();
        self.write_index(&index).await
    }

    /// Updates `active` and `last_used`; the caller is responsible for
    /// reinitialising every per-profile subsystem (cache, queue, version
    /// store) against the new profile's directories.
    pub async fn switch(&self, name: &str) -> Result<(), StorageError> {
        let mut index = self.read_index().await?;
        let entry = index
            .profiles
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| StorageError::Other(format!("no such profile: {name}")))?;
        entry.last_used = Some(Utc::now());
        index.active = Some(name.to_string());
        self.write_index(&index).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        if name == DEFAULT_PROFILE {
            return Err(StorageError::Other("cannot delete the default profile".to_string()));
        }
        let mut index = self.read_index().await?;
        if index.active.as_deref() == Some(name) {
            return Err(StorageError::Other("cannot delete the active profile".to_string()));
        }
        index.profiles.retain(|p| p.name != name);
        self.write_index(&index).await?;
        match tokio::fs::remove_dir_all(self.profile_dir(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// If a legacy single-profile `config.json` sits at the root (a
    /// pre-profile installation), moves it into `profiles/default/` and
    /// writes fresh root metadata. A no-op if no legacy file exists or a
    /// `default` profile is already registered.
    pub async fn migrate_legacy(&self) -> Result<bool, StorageError> {
        let legacy_path = self.root.join("config.json");
        let bytes = match tokio::fs::read(&legacy_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let index = self.read_index().await?;
        if index.profiles.iter().any(|p| p.name == DEFAULT_PROFILE) {
            return Ok(false);
        }

        let config: Config = serde_json::from_slice(&bytes)?;
        tokio::fs::create_dir_all(self.cache_dir(DEFAULT_PROFILE)).await?;
        tokio::fs::create_dir_all(self.versions_dir(DEFAULT_PROFILE)).await?;
        atomic_write_json(&self.config_path(DEFAULT_PROFILE), &config).await?;
        tokio::fs::write(self.salt_path(DEFAULT_PROFILE), seal::new_salt()).await?;
        tokio::fs::remove_file(&legacy_path).await?;

        let mut index = index;
        index.profiles.push(ProfileMeta {
            name: DEFAULT_PROFILE.to_string(),
            display_name: "Default".to_string(),
            created: Utc::now(),
            last_used: None,
        });
        index.active.get_or_insert_with(|| DEFAULT_PROFILE.to_string());
        self.write_index(&index).await?;
        Ok(true)
    }

    pub async fn load_config(&self, name: &str) -> Result<Config, StorageError> {
        let bytes = tokio::fs::read(self.config_path(name)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn save_config(&self, name: &str, config: &Config) -> Result<(), StorageError> {
        atomic_write_json(&self.config_path(name), config).await
    }

    async fn salt(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        Ok(tokio::fs::read(self.salt_path(name)).await?)
    }

    /// Seals `token` under `password` and stores it in
    /// `config.sealed_token`. Does not persist `config`; call
    /// `save_config` afterwards.
    pub async fn seal_token(
        &self,
        name: &str,
        config: &mut Config,
        token: &str,
        password: &str,
    ) -> Result<(), StorageError> {
        let salt = self.salt(name).await?;
        config.sealed_token = Some(seal::seal(password, &salt, token)?);
        Ok(())
    }

    /// Decrypts `config.sealed_token` under `password`. Returns `None` if
    /// the profile has no token set yet; fails if `password` is wrong.
    pub async fn unseal_token(&self, name: &str, config: &Config, password: &str) -> Result<Option<String>, StorageError> {
        let Some(sealed) = &config.sealed_token else {
            return Ok(None);
        };
        let salt = self.salt(name).await?;
        Ok(Some(seal::unseal(password, &salt, sealed)?))
    }
}

async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_first_profile_becomes_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().to_path_buf());
        store.create(DEFAULT_PROFILE, "Default").await.unwrap();
        assert_eq!(store.active().await.unwrap(), Some(DEFAULT_PROFILE.to_string()));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_rejects_default_and_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().to_path_buf());
        store.create(DEFAULT_PROFILE, "Default").await.unwrap();
        store.create("work", "Work").await.unwrap();

        assert!(store.delete(DEFAULT_PROFILE).await.is_err(), "default profile is never deletable");

        store.switch("work").await.unwrap();
        assert!(store.delete("work").await.is_err(), "the active profile cannot delete itself");
        assert!(store.delete(DEFAULT_PROFILE).await.is_err(), "default profile is never deletable, even inactive");

        store.switch(DEFAULT_PROFILE).await.unwrap();
        assert!(store.delete("work").await.is_ok(), "non-default, inactive profile can be deleted");
    }

    #[tokio::test]
    async fn token_seal_round_trips_through_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().to_path_buf());
        store.create(DEFAULT_PROFILE, "Default").await.unwrap();

        let mut config = store.load_config(DEFAULT_PROFILE).await.unwrap();
        store.seal_token(DEFAULT_PROFILE, &mut config, "abc123", "hunter2").await.unwrap();
        store.save_config(DEFAULT_PROFILE, &config).await.unwrap();

        let reloaded = store.load_config(DEFAULT_PROFILE).await.unwrap();
        let token = store.unseal_token(DEFAULT_PROFILE, &reloaded, "hunter2").await.unwrap();
        assert_eq!(token.as_deref(), Some("abc123"));

        assert!(store.unseal_token(DEFAULT_PROFILE, &reloaded, "wrong").await.is_err());
    }

    #[tokio::test]
    async fn migrate_legacy_moves_root_config_into_default_profile() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("config.json"), serde_json::to_vec(&Config::default()).unwrap())
            .await
            .unwrap();

        let store = ProfileStore::new(dir.path().to_path_buf());
        let migrated = store.migrate_legacy().await.unwrap();
        assert!(migrated);
        assert!(!dir.path().join("config.json").exists());
        assert_eq!(store.active().await.unwrap(), Some(DEFAULT_PROFILE.to_string()));
    }
}
