//! The `Provider` trait: one source of plugin records, merged by [`super::manager::PluginManager`].
//!
//! Three providers share this interface — builtin (compiled in), linked (a local
//! directory registered via `link`), and user (installed via the package manager) —
//! differing only in where `init` looks and what `ProviderKind` it reports.
//! `dyn`-safety (the manager holds a `Vec<Box<dyn Provider>>`) is what pulls in
//! `async-trait` here, the same crate a `clawde-io-apps`-style daemon uses for its own
//! trait-object async interfaces.

use crate::plugins::model::{CommandRecord, PluginRecord, ProviderKind, TopicRecord};
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A source of plugin records.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Which kind of provider this is, used for merge precedence.
    fn kind(&self) -> ProviderKind;

    /// Load this provider's plugin records. Called once per [`super::manager::PluginManager::init`].
    async fn load(&self) -> Result<Vec<PluginRecord>>;
}

/// Plugins compiled into the binary. Has no filesystem footprint to scan; its records
/// are supplied at construction.
pub struct BuiltinProvider {
    records: Vec<PluginRecord>,
}

impl BuiltinProvider {
    /// Build a provider from a fixed, compiled-in set of records.
    #[must_use]
    pub fn new(records: Vec<PluginRecord>) -> Self {
        Self { records }
    }

    /// The provider shipped with this binary: a single `kiln` plugin exposing the
    /// built-in topics (`update`, `plugins`, `help`) and their commands.
    #[must_use]
    pub fn default_records(bin_root: PathBuf) -> Vec<PluginRecord> {
        fn command(id: &str, description: &str, hidden: bool, aliases: &[&str]) -> CommandRecord {
            CommandRecord {
                id: id.to_string(),
                topic: CommandRecord::topic_of(id),
                description: Some(description.to_string()),
                hidden,
                aliases: aliases.iter().map(|a| (*a).to_string()).collect::<BTreeSet<_>>(),
            }
        }

        vec![PluginRecord {
            kind: ProviderKind::Builtin,
            name: "kiln".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            path: bin_root,
            topics: vec![
                TopicRecord {
                    name: "update".to_string(),
                    description: Some("Check for and apply updates".to_string()),
                    hidden: false,
                    commands: ["update"].into_iter().map(str::to_string).collect(),
                },
                TopicRecord {
                    name: "plugins".to_string(),
                    description: Some("Manage installed plugins".to_string()),
                    hidden: false,
                    commands: [
                        "plugins:install",
                        "plugins:update",
                        "plugins:uninstall",
                        "plugins:link",
                    ]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                },
            ],
            commands: vec![
                command("update", "Check for and apply updates", false, &[]),
                command("plugins", "List installed plugins", false, &[]),
                command("plugins:install", "Install a plugin package", false, &[]),
                command("plugins:update", "Upgrade installed plugins", false, &[]),
                command(
                    "plugins:uninstall",
                    "Remove an installed plugin",
                    false,
                    &["plugins:unlink", "unlink"],
                ),
                command("plugins:link", "Register a local plugin directory", false, &[]),
                command("version", "Print the current version", false, &[]),
                command("help", "Show command and topic help", false, &[]),
                command("debug:errlog", "Print the internal error log", true, &[]),
            ],
        }]
    }
}

#[async_trait::async_trait]
impl Provider for BuiltinProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Builtin
    }

    async fn load(&self) -> Result<Vec<PluginRecord>> {
        Ok(self.records.clone())
    }
}

/// One or more local directories registered via `plugins:link`, read from a small
/// on-disk list rather than the package manager's dependency tree.
pub struct LinkedProvider {
    links: Vec<PathBuf>,
}

impl LinkedProvider {
    /// Build a provider over an explicit set of linked plugin directories.
    #[must_use]
    pub fn new(links: Vec<PathBuf>) -> Self {
        Self { links }
    }
}

#[async_trait::async_trait]
impl Provider for LinkedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Linked
    }

    async fn load(&self) -> Result<Vec<PluginRecord>> {
        let mut records = Vec::with_capacity(self.links.len());
        for path in &self.links {
            if let Some(record) = crate::plugins::manager::probe_plugin_dir(path, ProviderKind::Linked).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Plugins installed via the package manager into `userPluginsDir`.
pub struct UserProvider {
    plugins_dir: PathBuf,
}

impl UserProvider {
    /// Build a provider scanning `plugins_dir` for installed packages.
    #[must_use]
    pub fn new(plugins_dir: PathBuf) -> Self {
        Self { plugins_dir }
    }
}

#[async_trait::async_trait]
impl Provider for UserProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::User
    }

    async fn load(&self) -> Result<Vec<PluginRecord>> {
        let node_modules = self.plugins_dir.join("node_modules");
        let Ok(mut entries) = tokio::fs::read_dir(&node_modules).await else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if let Some(record) = crate::plugins::manager::probe_plugin_dir(&path, ProviderKind::User).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_provider_returns_fixed_records() {
        let records = BuiltinProvider::default_records(PathBuf::from("/bin"));
        let provider = BuiltinProvider::new(records.clone());
        let loaded = provider.load().await.unwrap();
        assert_eq!(loaded.len(), records.len());
        assert_eq!(provider.kind(), ProviderKind::Builtin);
    }

    #[tokio::test]
    async fn linked_provider_skips_directories_without_a_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = LinkedProvider::new(vec![dir.path().to_path_buf()]);
        let records = provider.load().await.unwrap();
        assert!(records.is_empty());
    }
}
