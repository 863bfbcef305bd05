//! The Cluster-Profile Registry. Profiles live on disk under a directory per
//! profile (`{root}/{name}/{name}` holds the credential blob; sibling files
//! hold certificates), mirroring spec's persistent-state layout; the
//! in-memory `RwLock<HashMap>` mirrors every other singleton registry in this
//! crate (same shape as `podmanager::POD_MANAGER_CACHE` in the teacher).

use error::*;
use lazy_static::lazy_static;
use result::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("a cluster profile named '{name}' already exists")]
#[code(Status::Conflict)]
pub struct DuplicateProfile {
    pub name: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("no cluster profile named '{name}' exists")]
#[code(Status::NotFound)]
pub struct ProfileNotFound {
    pub name: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("no certificate named '{cert_name}' on profile '{name}'")]
#[code(Status::NotFound)]
pub struct CertificateNotFound {
    pub name: String,
    pub cert_name: String,
}

#[derive(Error, ChronosError, HttpCode, Kind, Debug)]
#[error("failed to write cluster profile state to disk at '{path}'")]
#[code(Status::InternalServerError)]
pub struct DiskError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone, serde::Serialize, Kind)]
pub struct ClusterProfile {
    pub name: String,
    #[serde(skip)]
    pub config_blob: Vec<u8>,
    pub certificates: BTreeMap<String, Vec<u8>>,
    pub active: bool,
}

struct Registry {
    profiles: HashMap<String, ClusterProfile>,
    active: Option<String>,
    root: PathBuf,
    current_context_path: PathBuf,
}

lazy_static! {
    static ref REGISTRY: RwLock<Registry> = RwLock::new(Registry {
        profiles: HashMap::new(),
        active: None,
        root: PathBuf::from("/var/lib/chronos/clusters"),
        current_context_path: PathBuf::from("/var/lib/chronos/current-context"),
    });
}

/// Points the registry at the configured storage roots. Must run before any
/// other operation, same contract as `config::load`/`registry::init`.
pub async fn init(root: PathBuf, current_context_path: PathBuf) {
    let mut registry = REGISTRY.write().await;
    registry.root = root;
    registry.current_context_path = current_context_path;
    registry.profiles.clear();
    registry.active = None;
}

pub async fn add(name: String, config_blob: Vec<u8>) -> Result<()> {
    let mut registry = REGISTRY.write().await;
    if registry.profiles.contains_key(&name) {
        return Err(DuplicateProfile { name }.into());
    }
    let dir = registry.root.join(&name);
    tokio::fs::create_dir_all(&dir).await.map_err(|source| DiskError {
        path: dir.display().to_string(),
        source,
    })?;
    let blob_path = dir.join(&name);
    tokio::fs::write(&blob_path, &config_blob)
        .await
        .map_err(|source| DiskError {
            path: blob_path.display().to_string(),
            source,
        })?;
    registry.profiles.insert(
        name.clone(),
        ClusterProfile {
            name,
            config_blob,
            certificates: BTreeMap::new(),
            active: false,
        },
    );
    Ok(())
}

pub async fn add_certificate(name: &str, cert_name: String, blob: Vec<u8>) -> Result<()> {
    let mut registry = REGISTRY.write().await;
    let dir = registry.root.join(name);
    let cert_path = dir.join(&cert_name);
    tokio::fs::write(&cert_path, &blob).await.map_err(|source| DiskError {
        path: cert_path.display().to_string(),
        source,
    })?;
    let profile = registry
        .profiles
        .get_mut(name)
        .ok_or_else(|| ProfileNotFound { name: name.to_string() })?;
    profile.certificates.insert(cert_name, blob);
    Ok(())
}

pub async fn delete_certificate(name: &str, cert_name: &str) -> Result<()> {
    let mut registry = REGISTRY.write().await;
    let dir = registry.root.join(name);
    let cert_path = dir.join(cert_name);
    let _ = tokio::fs::remove_file(&cert_path).await;
    let profile = registry
        .profiles
        .get_mut(name)
        .ok_or_else(|| ProfileNotFound { name: name.to_string() })?;
    profile
        .certificates
        .remove(cert_name)
        .ok_or_else(|| CertificateNotFound {
            name: name.to_string(),
            cert_name: cert_name.to_string(),
        })?;
    Ok(())
}

/// Deletes a profile outright. Truncates the current-context file if it was
/// the active profile.
pub async fn delete(name: &str) -> Result<()> {
    let mut registry = REGISTRY.write().await;
    let dir = registry.root.join(name);
    let _ = tokio::fs::remove_dir_all(&dir).await;
    let was_active = registry.active.as_deref() == Some(name);
    registry
        .profiles
        .remove(name)
        .ok_or_else(|| ProfileNotFound { name: name.to_string() })?;
    if was_active {
        registry.active = None;
        let path = registry.current_context_path.clone();
        tokio::fs::write(&path, b"").await.map_err(|source| DiskError {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}

/// Copies `name`'s config blob to the current-context path, flips its active
/// bit, and clears any previously active profile.
pub async fn activate(name: &str) -> Result<()> {
    let mut registry = REGISTRY.write().await;
    let blob = registry
        .profiles
        .get(name)
        .ok_or_else(|| ProfileNotFound { name: name.to_string() })?
        .config_blob
        .clone();
    let path = registry.current_context_path.clone();
    tokio::fs::write(&path, &blob).await.map_err(|source| DiskError {
        path: path.display().to_string(),
        source,
    })?;
    if let Some(previous) = registry.active.take() {
        if let Some(profile) = registry.profiles.get_mut(&previous) {
            profile.active = false;
        }
    }
    registry.active = Some(name.to_string());
    registry
        .profiles
        .get_mut(name)
        .expect("checked Some above")
        .active = true;
    Ok(())
}

pub async fn list() -> Vec<ClusterProfile> {
    REGISTRY.read().await.profiles.values().cloned().collect()
}

pub async fn active() -> Option<ClusterProfile> {
    let registry = REGISTRY.read().await;
    registry.active.as_ref().and_then(|name| registry.profiles.get(name)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_paths::fixture;

    mod tempfile_paths {
        use std::path::PathBuf;

        /// A throwaway directory under the process's temp dir, unique per test
        /// invocation via the monotonic process id plus a static counter.
        pub fn fixture(label: &str) -> PathBuf {
            static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
            let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::env::temp_dir().join(format!("chronos-test-{}-{}-{}", std::process::id(), label, n))
        }
    }

    async fn fresh_registry(label: &str) {
        let root = fixture(label);
        let current_context = root.join("current-context");
        init(root, current_context).await;
    }

    // The registry is a process-wide singleton (mirroring every other
    // singleton in this crate), so these scenarios run as one sequential
    // test rather than parallel #[tokio::test]s that would race on it.
    #[tokio::test]
    async fn cluster_profile_lifecycle() {
        fresh_registry("lifecycle").await;

        add("P".to_string(), b"A".to_vec()).await.unwrap();
        assert!(add("P".to_string(), b"A".to_vec()).await.is_err());
        add("Q".to_string(), b"B".to_vec()).await.unwrap();

        activate("P").await.unwrap();
        activate("Q").await.unwrap();

        let profiles: HashMap<String, ClusterProfile> =
            list().await.into_iter().map(|p| (p.name.clone(), p)).collect();
        assert!(!profiles["P"].active);
        assert!(profiles["Q"].active);
        assert_eq!(active().await.unwrap().name, "Q");

        let current = REGISTRY.read().await.current_context_path.clone();
        let bytes = tokio::fs::read(&current).await.unwrap();
        assert_eq!(bytes, b"B");

        activate("P").await.unwrap();
        delete("P").await.unwrap();
        assert!(active().await.is_none());
        let bytes = tokio::fs::read(&current).await.unwrap();
        assert!(bytes.is_empty());
    }
}
