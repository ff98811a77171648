//! Merges one or more [`Provider`]s into a single command/topic catalog and resolves
//! lookups and user plugin lifecycle operations against it.
//!
//! Grounded on `resolver::worktree_manager::WorktreeManager`'s
//! `create_worktrees_for_resolved_versions` for the `futures::future::join_all`
//! concurrent-fan-out-then-merge shape, generalized from worktree creation to provider
//! initialization.

use crate::config::Config;
use crate::core::KilnError;
use crate::lock;
use crate::paths;
use crate::plugins::model::{
    CommandRecord, PluginManifest, PluginManifestEntry, PluginRecord, ProviderKind, TopicRecord,
};
use crate::plugins::package_manager::PackageManager;
use crate::plugins::provider::Provider;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// On-disk sidecar manifest a plugin package declares at its root, read without
/// executing any plugin code.
#[derive(Debug, Deserialize)]
struct PluginSidecar {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    topics: Vec<TopicRecord>,
    #[serde(default)]
    commands: Vec<CommandRecord>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

/// Read `dir/kiln-plugin.json` if present and build a [`PluginRecord`] from it.
/// Returns `Ok(None)` for any directory that isn't a plugin (no sidecar file) rather
/// than treating that as an error — scans tolerate stray directories.
pub(crate) async fn probe_plugin_dir(dir: &Path, kind: ProviderKind) -> Result<Option<PluginRecord>> {
    let sidecar_path = dir.join("kiln-plugin.json");
    let bytes = match tokio::fs::read(&sidecar_path).await {
        Ok(bytes) => bytes,
        Err(_) => return Ok(None),
    };

    let sidecar: PluginSidecar = serde_json::from_slice(&bytes).map_err(|e| {
        anyhow::Error::new(KilnError::InvalidPlugin {
            name: dir.display().to_string(),
            reason: e.to_string(),
        })
    })?;

    Ok(Some(PluginRecord {
        kind,
        name: sidecar.name,
        version: sidecar.version,
        path: dir.to_path_buf(),
        topics: sidecar.topics,
        commands: sidecar.commands,
    }))
}

struct Catalog {
    topics: HashMap<String, TopicRecord>,
    /// command id -> (owning record's index into `records`, the command's own record)
    commands: HashMap<String, (usize, CommandRecord)>,
    records: Vec<PluginRecord>,
}

impl Catalog {
    fn empty() -> Self {
        Self {
            topics: HashMap::new(),
            commands: HashMap::new(),
            records: Vec::new(),
        }
    }

    fn merge_records(&mut self, mut records: Vec<PluginRecord>) {
        records.sort_by_key(|r| r.kind.precedence());

        for record in records {
            let idx = self.records.len();
            for topic in &record.topics {
                self.topics
                    .entry(topic.name.clone())
                    .and_modify(|existing| *existing = existing.clone().merge(topic))
                    .or_insert_with(|| topic.clone());
            }

            for command in &record.commands {
                if let Some((existing_idx, _)) = self.commands.get(&command.id) {
                    let existing_kind = self.records[*existing_idx].kind;
                    if record.kind.precedence() < existing_kind.precedence() {
                        continue;
                    }
                }
                self.commands.insert(command.id.clone(), (idx, command.clone()));
            }

            self.records.push(record);
        }

        self.synthesize_missing_topics();
    }

    fn synthesize_missing_topics(&mut self) {
        let implied: BTreeSet<String> = self
            .commands
            .keys()
            .map(|id| CommandRecord::topic_of(id))
            .filter(|topic| !topic.is_empty())
            .collect();

        let mut synthesized = BTreeSet::new();
        for topic in implied {
            self.topics.entry(topic.clone()).or_insert_with(|| {
                synthesized.insert(topic.clone());
                TopicRecord {
                    name: topic,
                    description: None,
                    hidden: false,
                    commands: BTreeSet::new(),
                }
            });
        }

        for id in self.commands.keys() {
            let topic_name = CommandRecord::topic_of(id);
            if topic_name.is_empty() {
                continue;
            }
            if let Some(topic) = self.topics.get_mut(&topic_name) {
                topic.commands.insert(id.clone());
            }
        }

        // A topic synthesized purely to group commands (no provider declared it
        // directly) is hidden when every command under it is hidden — e.g. `debug`
        // for the lone hidden `debug:errlog` command.
        for topic_name in &synthesized {
            let all_hidden = self.topics.get(topic_name).is_some_and(|topic| {
                !topic.commands.is_empty()
                    && topic.commands.iter().all(|id| self.commands.get(id).is_some_and(|(_, c)| c.hidden))
            });
            if all_hidden {
                if let Some(topic) = self.topics.get_mut(topic_name) {
                    topic.hidden = true;
                }
            }
        }
    }

    fn command_record(&self, id: &str) -> Option<CommandRecord> {
        self.commands.get(id).map(|(_, record)| record.clone())
    }
}

/// Merges builtin, linked, and user providers into one lookup surface and drives the
/// user-plugin lifecycle operations.
pub struct PluginManager<PM: PackageManager> {
    config: Config,
    providers: Vec<Box<dyn Provider>>,
    package_manager: PM,
    initialized: AtomicBool,
    catalog: Mutex<Catalog>,
    manifest: Mutex<PluginManifest>,
}

impl<PM: PackageManager> PluginManager<PM> {
    /// Build a manager over `providers`, not yet initialized.
    #[must_use]
    pub fn new(config: Config, providers: Vec<Box<dyn Provider>>, package_manager: PM) -> Self {
        Self {
            config,
            providers,
            package_manager,
            initialized: AtomicBool::new(false),
            catalog: Mutex::new(Catalog::empty()),
            manifest: Mutex::new(PluginManifest::default()),
        }
    }

    /// Load the on-disk manifest cache, fan out to every provider concurrently, then
    /// merge. Idempotent: a second call is a no-op.
    pub async fn init(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let manifest_path = paths::user_plugins_manifest(&self.config);
        *self.manifest.lock().unwrap_or_else(|e| e.into_inner()) =
            PluginManifest::load(&manifest_path).await;

        let futures = self.providers.iter().map(|provider| provider.load());
        let results = futures::future::join_all(futures).await;

        let mut all_records = Vec::new();
        for result in results {
            match result {
                Ok(records) => all_records.extend(records),
                Err(e) => warn!("provider init failed: {}", e),
            }
        }

        self.catalog.lock().unwrap_or_else(|e| e.into_inner()).merge_records(all_records);
        Ok(())
    }

    fn unalias<'a>(&self, id: &'a str) -> std::borrow::Cow<'a, str> {
        for (canonical, aliases) in &self.config.aliases {
            if aliases.iter().any(|a| a == id) {
                return std::borrow::Cow::Owned(canonical.clone());
            }
        }
        std::borrow::Cow::Borrowed(id)
    }

    /// Resolve `id` (after alias resolution) to a [`CommandRecord`], if any provider
    /// declares it.
    #[must_use]
    pub fn find_command(&self, id: &str) -> Option<CommandRecord> {
        let canonical = self.unalias(id);
        self.catalog.lock().unwrap_or_else(|e| e.into_inner()).command_record(&canonical)
    }

    /// Look up a topic by exact name.
    #[must_use]
    pub fn find_topic(&self, name: &str) -> Option<TopicRecord> {
        self.catalog.lock().unwrap_or_else(|e| e.into_inner()).topics.get(name).cloned()
    }

    /// Commands whose topic is exactly `name`. Hidden commands are excluded unless
    /// `include_hidden` (the `--all` flag) is set.
    #[must_use]
    pub fn commands_for_topic(&self, name: &str, include_hidden: bool) -> Vec<CommandRecord> {
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        catalog
            .commands
            .keys()
            .filter(|id| CommandRecord::topic_of(id) == name)
            .filter_map(|id| catalog.command_record(id))
            .filter(|cmd| include_hidden || !cmd.hidden)
            .collect()
    }

    /// Commands with no colon in their ID. Hidden commands are excluded unless
    /// `include_hidden` (the `--all` flag) is set.
    #[must_use]
    pub fn list_root_commands(&self, include_hidden: bool) -> Vec<CommandRecord> {
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        catalog
            .commands
            .keys()
            .filter(|id| !id.contains(':'))
            .filter_map(|id| catalog.command_record(id))
            .filter(|cmd| include_hidden || !cmd.hidden)
            .collect()
    }

    /// Top-level topic names, sorted lexicographically. Hidden topics are excluded
    /// unless `include_hidden` (the `--all` flag) is set.
    #[must_use]
    pub fn list_root_topics(&self, include_hidden: bool) -> Vec<TopicRecord> {
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        let mut topics: Vec<TopicRecord> = catalog
            .topics
            .values()
            .filter(|t| (include_hidden || !t.hidden) && !t.name.contains(':'))
            .cloned()
            .collect();
        topics.sort_by(|a, b| a.name.cmp(&b.name));
        topics
    }

    /// Install `name` via the package manager, writer-locking the user plugins tree.
    pub async fn install(&self, name: &str, tag: Option<&str>) -> Result<()> {
        let lock_path = paths::plugins_lock_file(&self.config);
        let guard = lock::writer_acquire(&lock_path).await?;

        let plugins_dir = paths::user_plugins_dir(&self.config);
        ensure_package_json(&plugins_dir).await?;

        let package_json_path = paths::user_plugins_package_json(&self.config);
        let original = tokio::fs::read_to_string(&package_json_path).await.unwrap_or_default();

        let spec = format!("{}@{}", name, tag.unwrap_or("latest"));
        if let Err(e) = add_dependency(&package_json_path, name, &spec).await {
            guard.release();
            return Err(e);
        }

        if let Err(e) = self.package_manager.install(&plugins_dir).await {
            // Revert the manifest edit; a failed install must not leave a dangling
            // dependency entry behind.
            let _ = tokio::fs::write(&package_json_path, original).await;
            guard.release();
            return Err(e);
        }

        let installed_dir = plugins_dir.join("node_modules").join(name);
        if probe_plugin_dir(&installed_dir, ProviderKind::User).await?.is_none() {
            let _ = tokio::fs::write(&package_json_path, original).await;
            guard.release();
            return Err(anyhow::Error::new(KilnError::InvalidPlugin {
                name: name.to_string(),
                reason: "installed package has no kiln-plugin.json manifest".to_string(),
            }));
        }

        self.manifest.lock().unwrap_or_else(|e| e.into_inner()).invalidate(name);
        self.manifest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .save(&paths::user_plugins_manifest(&self.config))
            .await;

        guard.release();
        Ok(())
    }

    /// Upgrade every installed user plugin.
    pub async fn update(&self) -> Result<()> {
        let lock_path = paths::plugins_lock_file(&self.config);
        let guard = lock::writer_acquire(&lock_path).await?;
        let plugins_dir = paths::user_plugins_dir(&self.config);
        let result = self.package_manager.upgrade(&plugins_dir).await;
        guard.release();
        result
    }

    /// Remove an installed user plugin.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let lock_path = paths::plugins_lock_file(&self.config);
        let guard = lock::writer_acquire(&lock_path).await?;
        let plugins_dir = paths::user_plugins_dir(&self.config);
        let result = self.package_manager.remove(&plugins_dir, name).await;
        if result.is_ok() {
            self.manifest.lock().unwrap_or_else(|e| e.into_inner()).invalidate(name);
        }
        guard.release();
        result
    }
}

async fn ensure_package_json(plugins_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(plugins_dir)
        .await
        .with_context(|| format!("failed to create {}", plugins_dir.display()))?;

    let package_json = plugins_dir.join("package.json");
    if !package_json.exists() {
        tokio::fs::write(&package_json, br#"{"private":true,"dependencies":{}}"#)
            .await
            .context("failed to write package.json")?;
    }

    let yarnrc = plugins_dir.join(".yarnrc");
    if !yarnrc.exists() {
        tokio::fs::write(&yarnrc, b"--install.ignore-scripts true\n")
            .await
            .context("failed to write .yarnrc")?;
    }

    Ok(())
}

async fn add_dependency(package_json_path: &Path, name: &str, spec: &str) -> Result<()> {
    let bytes = tokio::fs::read(package_json_path).await.context("failed to read package.json")?;
    let mut value: serde_json::Value =
        serde_json::from_slice(&bytes).context("failed to parse package.json")?;

    value
        .as_object_mut()
        .context("package.json root is not an object")?
        .entry("dependencies")
        .or_insert_with(|| serde_json::json!({}))
        .as_object_mut()
        .context("package.json dependencies is not an object")?
        .insert(name.to_string(), serde_json::Value::String(spec.to_string()));

    let updated = serde_json::to_vec_pretty(&value).context("failed to serialize package.json")?;
    tokio::fs::write(package_json_path, updated).await.context("failed to write package.json")
}

/// Record a local directory as a linked plugin path.
pub async fn link(config: &Config, target: &Path) -> Result<PathBuf> {
    let links_file = paths::user_plugins_dir(config).join("links.json");
    tokio::fs::create_dir_all(links_file.parent().unwrap()).await.ok();

    let mut links: Vec<PathBuf> = match tokio::fs::read(&links_file).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    let canonical = target.canonicalize().with_context(|| format!("no such directory: {}", target.display()))?;
    if !links.contains(&canonical) {
        links.push(canonical.clone());
    }

    let json = serde_json::to_vec_pretty(&links).context("failed to serialize linked plugin list")?;
    tokio::fs::write(&links_file, json).await.context("failed to write linked plugin list")?;

    Ok(canonical)
}

/// Load the persisted list of linked plugin directories.
pub async fn load_links(config: &Config) -> Vec<PathBuf> {
    let links_file = paths::user_plugins_dir(config).join("links.json");
    match tokio::fs::read(&links_file).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::package_manager::FakePackageManager;
    use crate::plugins::provider::BuiltinProvider;

    fn manager_with_builtin() -> PluginManager<FakePackageManager> {
        let config = Config::for_test();
        let records = BuiltinProvider::default_records(PathBuf::from("/bin"));
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(BuiltinProvider::new(records))];
        PluginManager::new(config, providers, FakePackageManager::default())
    }

    #[tokio::test]
    async fn find_command_resolves_builtin_commands() {
        let manager = manager_with_builtin();
        manager.init().await.unwrap();
        assert!(manager.find_command("update").is_some());
        assert!(manager.find_command("plugins:install").is_some());
        assert!(manager.find_command("nope:nope").is_none());
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let manager = manager_with_builtin();
        manager.init().await.unwrap();
        let first_len = manager.list_root_commands(true).len();
        manager.init().await.unwrap();
        assert_eq!(manager.list_root_commands(true).len(), first_len);
    }

    #[tokio::test]
    async fn synthesized_topics_include_commands_with_no_declared_topic() {
        let config = Config::for_test();
        let mut record = BuiltinProvider::default_records(PathBuf::from("/bin")).remove(0);
        record.commands.push(CommandRecord {
            id: "orphan:sub".to_string(),
            topic: CommandRecord::topic_of("orphan:sub"),
            description: None,
            hidden: false,
            aliases: BTreeSet::new(),
        });
        let providers: Vec<Box<dyn Provider>> = vec![Box::new(BuiltinProvider::new(vec![record]))];
        let manager = PluginManager::new(config, providers, FakePackageManager::default());
        manager.init().await.unwrap();

        let topic = manager.find_topic("orphan").expect("synthesized topic");
        assert!(topic.commands.contains("orphan:sub"));
    }

    #[tokio::test]
    async fn list_root_commands_excludes_namespaced_ids() {
        let manager = manager_with_builtin();
        manager.init().await.unwrap();
        let roots = manager.list_root_commands(true);
        assert!(roots.iter().any(|c| c.id == "update"));
        assert!(!roots.iter().any(|c| c.id.contains(':')));
    }

    proptest::proptest! {
        #[test]
        fn unalias_is_idempotent(id in "[a-zA-Z0-9:_-]{0,24}") {
            let mut config = Config::for_test();
            config.aliases.insert(
                "plugins:uninstall".to_string(),
                vec!["unlink".to_string(), "plugins:unlink".to_string()],
            );
            let records = BuiltinProvider::default_records(PathBuf::from("/bin"));
            let providers: Vec<Box<dyn Provider>> = vec![Box::new(BuiltinProvider::new(records))];
            let manager = PluginManager::new(config, providers, FakePackageManager::default());

            let once = manager.unalias(&id).into_owned();
            let twice = manager.unalias(&once).into_owned();
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
