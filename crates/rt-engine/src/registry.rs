//! The Handler Registry: filesystem discovery of handler
//! manifests, plus a runtime registration API pairing a manifest's named
//! projector/command with the actual trait object implementing it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::RegistryError;
use crate::handler::{Command, Projector};

/// One handler's declaration, as read from `<base>/<name>/manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerManifest {
    /// The handler's own name; also the default single entry of `types`.
    pub name: String,
    /// Event types this handler's projector accepts. Defaults to `[name]`
    /// when absent from the manifest.
    #[serde(default)]
    pub types: Vec<String>,
    /// Command name -> optional module path / config string.
    #[serde(default)]
    pub commands: HashMap<String, Option<String>>,
    /// A command name (must exist in `commands`) invoked once per tick.
    #[serde(default)]
    pub job: Option<String>,
    /// Module name backing this handler's projector, if it has one.
    #[serde(default)]
    pub projector: Option<String>,
}

impl HandlerManifest {
    fn effective_types(&self) -> Vec<String> {
        if self.types.is_empty() {
            vec![self.name.clone()]
        } else {
            self.types.clone()
        }
    }
}

/// List handler directories beneath `base_path`.
pub fn discover_handlers(base_path: &Path) -> Result<Vec<String>, RegistryError> {
    let entries = fs::read_dir(base_path).map_err(|e| RegistryError::BasePathUnreadable {
        path: base_path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RegistryError::BasePathUnreadable {
            path: base_path.display().to_string(),
            reason: e.to_string(),
        })?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Read and parse `<base>/<name>/manifest.json`. Returns `Ok(None)` if the handler directory has no
/// manifest at all.
pub fn load_config(base_path: &Path, name: &str) -> Result<Option<HandlerManifest>, RegistryError> {
    let manifest_path = base_path.join(name).join("manifest.json");
    if !manifest_path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&manifest_path).map_err(|e| RegistryError::MalformedManifest {
        handler: name.to_string(),
        reason: e.to_string(),
    })?;
    let manifest: HandlerManifest =
        serde_json::from_str(&raw).map_err(|e| RegistryError::MalformedManifest {
            handler: name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Some(manifest))
}

/// Build the event-type -> handler-name map.
/// Fails with [`RegistryError::HandlerConflict`] if two handlers declare the
/// same type.
pub fn build_type_map(
    manifests: &[HandlerManifest],
) -> Result<HashMap<String, String>, RegistryError> {
    let mut map = HashMap::new();
    for manifest in manifests {
        for event_type in manifest.effective_types() {
            if let Some(existing) = map.insert(event_type.clone(), manifest.name.clone()) {
                if existing != manifest.name {
                    return Err(RegistryError::HandlerConflict {
                        event_type,
                        first: existing,
                        second: manifest.name.clone(),
                    });
                }
            }
        }
    }
    Ok(map)
}

/// The assembled registry: every discovered manifest plus the type map
/// derived from them. Immutable once built; rebuild to pick up filesystem
/// changes.
#[derive(Debug, Clone)]
pub struct Registry {
    manifests: HashMap<String, HandlerManifest>,
    type_map: HashMap<String, String>,
}

impl Registry {
    /// Discover every handler beneath `base_path`, load its manifest, and
    /// build the type map, failing fast on the first conflict.
    pub fn load(base_path: &Path) -> Result<Self, RegistryError> {
        let names = discover_handlers(base_path)?;
        let mut manifests = HashMap::new();
        for name in names {
            if let Some(manifest) = load_config(base_path, &name)? {
                manifests.insert(name, manifest);
            }
        }
        let ordered: Vec<HandlerManifest> = manifests.values().cloned().collect();
        let type_map = build_type_map(&ordered)?;
        Ok(Self {
            manifests,
            type_map,
        })
    }

    /// An empty registry, useful for tests that register handlers purely at
    /// runtime without a handler directory on disk.
    pub fn empty() -> Self {
        Self {
            manifests: HashMap::new(),
            type_map: HashMap::new(),
        }
    }

    /// Build a registry directly from already-loaded manifests, skipping
    /// filesystem discovery. Used by callers (and tests) that construct
    /// manifests in-process rather than reading `manifest.json` files.
    pub fn from_manifests(manifests: Vec<HandlerManifest>) -> Result<Self, RegistryError> {
        let type_map = build_type_map(&manifests)?;
        let manifests = manifests.into_iter().map(|m| (m.name.clone(), m)).collect();
        Ok(Self {
            manifests,
            type_map,
        })
    }

    /// The handler name responsible for `event_type`, if any.
    pub fn handler_for_type(&self, event_type: &str) -> Option<&str> {
        self.type_map.get(event_type).map(String::as_str)
    }

    /// `name`'s manifest, if it was discovered.
    pub fn manifest(&self, name: &str) -> Option<&HandlerManifest> {
        self.manifests.get(name)
    }

    /// The module path registered for `(handler, command)`.
    pub fn resolve_command(&self, handler: &str, command: &str) -> Option<Option<&str>> {
        self.manifests
            .get(handler)
            .and_then(|m| m.commands.get(command))
            .map(|path| path.as_deref())
    }

    /// Every handler name whose manifest declares a `job`, in lexicographic
    /// order.
    pub fn job_handlers(&self) -> Vec<(String, String)> {
        let mut jobs: Vec<(String, String)> = self
            .manifests
            .values()
            .filter_map(|m| m.job.clone().map(|job| (m.name.clone(), job)))
            .collect();
        jobs.sort_by(|a, b| a.0.cmp(&b.0));
        jobs
    }
}

// ---- runtime registration ----

type ProjectorTable = HashMap<String, Arc<dyn Projector>>;
type CommandTable = HashMap<(String, String), Arc<dyn Command>>;

static PROJECTORS: Lazy<RwLock<ProjectorTable>> = Lazy::new(|| RwLock::new(HashMap::new()));
static COMMANDS: Lazy<RwLock<CommandTable>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Bind a projector implementation to a handler name.
pub async fn register_projector(handler: impl Into<String>, projector: Arc<dyn Projector>) {
    PROJECTORS.write().await.insert(handler.into(), projector);
}

/// Bind a command implementation to a `(handler, command)` pair.
pub async fn register_command(
    handler: impl Into<String>,
    command: impl Into<String>,
    implementation: Arc<dyn Command>,
) {
    COMMANDS
        .write()
        .await
        .insert((handler.into(), command.into()), implementation);
}

/// Look up the projector bound to `handler`, if any.
pub async fn projector_for(handler: &str) -> Option<Arc<dyn Projector>> {
    PROJECTORS.read().await.get(handler).cloned()
}

/// Look up the command bound to `(handler, command)`, if any.
pub async fn command_for(handler: &str, command: &str) -> Option<Arc<dyn Command>> {
    COMMANDS
        .read()
        .await
        .get(&(handler.to_string(), command.to_string()))
        .cloned()
}

/// Remove every registered projector and command. Test-only: the tables are
/// process-global, so tests that register fixtures must clean up after
/// themselves to avoid bleeding into unrelated tests.
#[cfg(test)]
pub async fn clear_runtime_registrations() {
    PROJECTORS.write().await.clear();
    COMMANDS.write().await.clear();
}
