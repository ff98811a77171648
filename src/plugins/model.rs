//! Shared record types for the plugin catalog: topics, commands, and the provider
//! records and on-disk manifest cache that back lookup without loading plugin code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// A topic groups commands sharing a colon-separated prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicRecord {
    /// The topic's name, e.g. `"plugins"` for commands under `plugins:*`.
    pub name: String,
    /// One-line description shown in help listings.
    #[serde(default)]
    pub description: Option<String>,
    /// Excluded from the default help listing unless `--all` is passed.
    #[serde(default)]
    pub hidden: bool,
    /// Command IDs directly under this topic.
    #[serde(default)]
    pub commands: BTreeSet<String>,
}

impl TopicRecord {
    /// Merge `other` into `self`: union commands, prefer `other`'s description/hidden
    /// flag when present (later-provider-wins precedence).
    pub fn merge(mut self, other: &TopicRecord) -> Self {
        self.commands.extend(other.commands.iter().cloned());
        if other.description.is_some() {
            self.description = other.description.clone();
        }
        self.hidden = other.hidden;
        self
    }
}

/// A single runnable command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Colon-separated path, e.g. `"plugins:install"`. Uniquely identifies the command.
    pub id: String,
    /// Prefix up to the last colon; empty for root commands.
    pub topic: String,
    /// One-line description shown in help listings.
    #[serde(default)]
    pub description: Option<String>,
    /// Excluded from listings (still runnable directly) unless `--all` is passed.
    #[serde(default)]
    pub hidden: bool,
    /// Alternate IDs that resolve to this command via `unalias`.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl CommandRecord {
    /// Derive `topic` from `id`: everything before the last colon, or empty.
    #[must_use]
    pub fn topic_of(id: &str) -> String {
        id.rfind(':').map_or_else(String::new, |i| id[..i].to_string())
    }
}

/// Which kind of provider contributed a [`PluginRecord`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Compiled into the binary.
    Builtin,
    /// A local directory registered via `link`, not installed through the package manager.
    Linked,
    /// Installed into the user plugins tree via the package manager.
    User,
}

impl ProviderKind {
    /// Merge precedence: higher wins a command-ID collision. User beats linked beats builtin.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            ProviderKind::Builtin => 0,
            ProviderKind::Linked => 1,
            ProviderKind::User => 2,
        }
    }
}

/// One provider's contribution to the merged catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Which provider type contributed this record.
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Plugin package name.
    pub name: String,
    /// Plugin package version string (not necessarily semver — external packages).
    pub version: String,
    /// Filesystem path the plugin was loaded from.
    pub path: PathBuf,
    /// Topics this plugin declares.
    #[serde(default)]
    pub topics: Vec<TopicRecord>,
    /// Commands this plugin declares, each carrying its own description, visibility,
    /// and aliases rather than a bare ID.
    #[serde(default)]
    pub commands: Vec<CommandRecord>,
}

/// On-disk cache entry for one installed plugin, keyed by plugin name in
/// [`PluginManifest`]. Lets dispatch resolve commands without loading plugin code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginManifestEntry {
    /// The installed package version at cache time.
    pub version: String,
    /// Topic names declared by this plugin.
    #[serde(default)]
    pub topics: Vec<TopicRecord>,
    /// Command IDs declared by this plugin.
    #[serde(default)]
    pub command_ids: Vec<String>,
    /// Resolved path to the plugin's entry module.
    pub node_path: PathBuf,
}

/// The on-disk cache mapping plugin name to its last-known metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name -> cached metadata.
    #[serde(default)]
    pub plugins: HashMap<String, PluginManifestEntry>,
}

impl PluginManifest {
    /// Load from `path`, returning an empty manifest if the file is absent or
    /// unparseable (a corrupt cache should never be fatal — it's rebuilt on next init).
    pub async fn load(path: &std::path::Path) -> Self {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Best-effort write-back; failures are swallowed, matching the tolerant
    /// cache-write behavior in `upgrade::version_check`.
    pub async fn save(&self, path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Ok(json) = serde_json::to_vec_pretty(self) {
            let _ = tokio::fs::write(path, json).await;
        }
    }

    /// Drop the cached entry for `name`, forcing the next init to re-derive it.
    pub fn invalidate(&mut self, name: &str) {
        self.plugins.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_of_derives_prefix_up_to_last_colon() {
        assert_eq!(CommandRecord::topic_of("plugins:install"), "plugins");
        assert_eq!(CommandRecord::topic_of("help"), "");
        assert_eq!(CommandRecord::topic_of("a:b:c"), "a:b");
    }

    #[test]
    fn provider_precedence_orders_user_over_linked_over_builtin() {
        assert!(ProviderKind::User.precedence() > ProviderKind::Linked.precedence());
        assert!(ProviderKind::Linked.precedence() > ProviderKind::Builtin.precedence());
    }

    #[test]
    fn topic_merge_unions_commands_and_prefers_latter_description() {
        let mut base_commands = BTreeSet::new();
        base_commands.insert("plugins:install".to_string());
        let base = TopicRecord {
            name: "plugins".to_string(),
            description: Some("old".to_string()),
            hidden: false,
            commands: base_commands,
        };

        let mut other_commands = BTreeSet::new();
        other_commands.insert("plugins:remove".to_string());
        let other = TopicRecord {
            name: "plugins".to_string(),
            description: Some("new".to_string()),
            hidden: true,
            commands: other_commands,
        };

        let merged = base.merge(&other);
        assert_eq!(merged.description, Some("new".to_string()));
        assert!(merged.hidden);
        assert_eq!(merged.commands.len(), 2);
    }
}
