use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared::types::{EndpointKey, WatchKey};

/// The persisted configuration root. Read once at startup and rewritten in
/// full after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Role ids allowed to manage the monitor. Enforced by the chat front end.
    #[serde(default)]
    pub admin_roles: BTreeSet<u64>,

    #[serde(default)]
    pub servers: IndexMap<EndpointKey, ServerConfig>,

    /// Watch groups: display handle to the endpoints it shows
    #[serde(default)]
    pub active_messages: IndexMap<WatchKey, Vec<EndpointKey>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,

    /// Lower-case ISO 3166-1 alpha-2 code
    pub country: String,

    /// Free-form key/value lines shown under the server, in insertion order
    #[serde(default)]
    pub notes: IndexMap<String, String>,
}

/// Destination for full-document rewrites.
pub trait Persist: Send {
    fn persist(&mut self, document: &ConfigDocument) -> Result<()>;
}

/// Persists the document as TOML at a fixed path.
pub struct TomlFile {
    path: PathBuf,
}

impl TomlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the document, writing and returning the defaults if the file does
    /// not exist yet.
    pub fn load_or_init(&mut self) -> Result<ConfigDocument> {
        if !self.path.exists() {
            tracing::info!("No config document at {}, writing defaults", self.path.display());
            let document = ConfigDocument::default();
            self.persist(&document)?;
            return Ok(document);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config document: {}", self.path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config document: {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persist for TomlFile {
    fn persist(&mut self, document: &ConfigDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = toml::to_string_pretty(document)
            .context("Failed to serialize config document")?;

        // Write then rename so a crash never leaves a truncated document behind
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigDocument {
        let key: EndpointKey = "1.2.3.4:27015".parse().unwrap();
        let mut notes = IndexMap::new();
        notes.insert("Website".to_string(), "example.org".to_string());
        notes.insert("Discord".to_string(), "invite/abc".to_string());
        notes.insert("Admin".to_string(), "someone".to_string());

        let mut document = ConfigDocument::default();
        document.admin_roles.insert(42);
        document.servers.insert(
            key,
            ServerConfig {
                name: "Arena".to_string(),
                country: "se".to_string(),
                notes,
            },
        );
        document
            .active_messages
            .insert(WatchKey::new(100, 200), vec![key]);
        document
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut file = TomlFile::new(&path);

        let document = file.load_or_init().unwrap();

        assert_eq!(document, ConfigDocument::default());
        assert!(path.exists(), "defaults should be written on first start");
    }

    #[test]
    fn test_rewrite_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = TomlFile::new(&path);
        let document = sample();

        file.persist(&document).unwrap();
        let reloaded = TomlFile::new(&path).load_or_init().unwrap();

        assert_eq!(reloaded, document);
        let keys: Vec<_> = reloaded.servers.values().next().unwrap().notes.keys().cloned().collect();
        assert_eq!(keys, vec!["Website", "Discord", "Admin"], "note order must survive a reload");
    }

    #[test]
    fn test_document_uses_string_keys() {
        let text = toml::to_string_pretty(&sample()).unwrap();
        assert!(text.contains("\"1.2.3.4:27015\""));
        assert!(text.contains("\"100:200\""));
    }

    #[test]
    fn test_unparseable_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "servers = 3").unwrap();

        assert!(TomlFile::new(&path).load_or_init().is_err());
    }
}
