//! Build results
//!
//! One build call covers a whole batch of hosts. The first pipeline that
//! needs an artifact starts it; every other pipeline of the batch waits on the
//! same once-cell and shares the outcome, success or failure.

use crate::collaborators::Builder;
use crate::error::{DeployError, Result};
use drover_registry::{KeyedStore, StoreIdSequence};
use drover_types::Host;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const CLOSURE_KEY_PREFIX: &str = "closure:";

/// Cache key for a host's built closure
pub fn closure_key(host: &str) -> String {
    format!("{}{}", CLOSURE_KEY_PREFIX, host)
}

/// Per-host build results, written once per host
#[derive(Debug)]
pub struct ArtifactCache {
    store: KeyedStore<PathBuf>,
}

impl ArtifactCache {
    pub fn new(ids: &mut StoreIdSequence) -> Self {
        Self {
            store: KeyedStore::new(ids.next_name()),
        }
    }

    pub fn get(&self, host: &str) -> Option<PathBuf> {
        self.store.get(&closure_key(host)).ok()
    }

    pub fn record(&self, host: &str, path: PathBuf) {
        self.store.update(closure_key(host), path);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Resolve `root/<host name>` to the closure it links to
pub async fn resolve_artifact(root: &Path, host: &Host) -> Result<PathBuf> {
    let link = root.join(&host.name);
    tokio::fs::canonicalize(&link)
        .await
        .map_err(|e| DeployError::LinkResolution {
            host: host.name.clone(),
            path: link,
            reason: e.to_string(),
        })
}

/// The hosts built together by one builder call
#[derive(Debug)]
pub struct BuildBatch {
    hosts: Vec<Host>,
    outcome: OnceCell<Result<PathBuf>>,
}

impl BuildBatch {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts,
            outcome: OnceCell::new(),
        }
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn is_built(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(_)))
    }

    /// Run the batch build once and return its result root.
    ///
    /// Concurrent callers wait for the first one; all see the same outcome.
    pub async fn ensure_built(&self, builder: &dyn Builder, cache: &ArtifactCache) -> Result<PathBuf> {
        self.outcome
            .get_or_init(|| self.build(builder, cache))
            .await
            .clone()
    }

    async fn build(&self, builder: &dyn Builder, cache: &ArtifactCache) -> Result<PathBuf> {
        let names: Vec<&str> = self.hosts().iter().map(|h| h.name.as_str()).collect();
        info!(hosts = ?names, "building batch");

        let root = builder.build(self.hosts()).await.map_err(|e| {
            warn!(error = %e, hosts = names.len(), "batch build failed");
            if e.is_batch_failure() || matches!(e, DeployError::Cancelled) {
                e
            } else {
                DeployError::Build(e.to_string())
            }
        })?;

        for host in self.hosts() {
            let path = resolve_artifact(&root, host).await?;
            debug!(host = %host.name, path = %path.display(), "artifact resolved");
            cache.record(&host.name, path);
        }

        Ok(root)
    }

    /// The host's artifact, building the batch first if needed
    pub async fn artifact_for(
        &self,
        host: &Host,
        builder: &dyn Builder,
        cache: &ArtifactCache,
    ) -> Result<PathBuf> {
        if let Some(path) = cache.get(&host.name) {
            return Ok(path);
        }
        self.ensure_built(builder, cache).await?;
        cache
            .get(&host.name)
            .ok_or_else(|| DeployError::MissingArtifact(host.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Lays out `<root>/<name> -> <store>/<name>-system` like a real build
    struct LinkFarm {
        dir: tempfile::TempDir,
        calls: AtomicUsize,
        fail: bool,
    }

    impl LinkFarm {
        fn new(fail: bool) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Builder for LinkFarm {
        async fn build(&self, hosts: &[Host]) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(DeployError::Build("evaluation error".to_string()));
            }
            let store = self.dir.path().join("store");
            let root = self.dir.path().join("result");
            std::fs::create_dir_all(&store).unwrap();
            std::fs::create_dir_all(&root).unwrap();
            for host in hosts {
                let target = store.join(format!("{}-system", host.name));
                std::fs::create_dir_all(&target).unwrap();
                std::os::unix::fs::symlink(&target, root.join(&host.name)).unwrap();
            }
            Ok(root)
        }
    }

    #[test]
    fn test_closure_key() {
        assert_eq!(closure_key("web1"), "closure:web1");
    }

    #[tokio::test]
    async fn test_batch_built_once_for_concurrent_readers() {
        let builder = Arc::new(LinkFarm::new(false));
        let cache = Arc::new(ArtifactCache::new(&mut StoreIdSequence::default()));
        let batch = Arc::new(BuildBatch::new(vec![Host::new("web1"), Host::new("web2")]));

        let mut handles = Vec::new();
        for name in ["web1", "web2", "web1"] {
            let (builder, cache, batch) = (builder.clone(), cache.clone(), batch.clone());
            handles.push(tokio::spawn(async move {
                batch
                    .artifact_for(&Host::new(name), builder.as_ref(), &cache)
                    .await
            }));
        }

        for handle in handles {
            let path = handle.await.unwrap().unwrap();
            assert!(path.ends_with("web1-system") || path.ends_with("web2-system"));
        }
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 2);
        assert!(batch.is_built());
    }

    #[tokio::test]
    async fn test_build_failure_shared_by_batch() {
        let builder = LinkFarm::new(true);
        let cache = ArtifactCache::new(&mut StoreIdSequence::default());
        let batch = BuildBatch::new(vec![Host::new("web1"), Host::new("web2")]);

        for name in ["web1", "web2"] {
            let err = batch
                .artifact_for(&Host::new(name), &builder, &cache)
                .await
                .unwrap_err();
            assert!(matches!(err, DeployError::Build(_)));
        }
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
    }

    struct Refuses(DeployError);

    #[async_trait]
    impl Builder for Refuses {
        async fn build(&self, _hosts: &[Host]) -> Result<PathBuf> {
            Err(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_batch_errors_keep_their_kind() {
        let hosts = vec![Host::new("web1")];

        let builder = Refuses(DeployError::Evaluation("infinite recursion".to_string()));
        let batch = BuildBatch::new(hosts.clone());
        let err = batch
            .ensure_built(&builder, &ArtifactCache::new(&mut StoreIdSequence::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Evaluation(_)));

        let builder = Refuses(DeployError::Connectivity {
            host: "builder".to_string(),
            reason: "connection refused".to_string(),
        });
        let batch = BuildBatch::new(hosts);
        let err = batch
            .ensure_built(&builder, &ArtifactCache::new(&mut StoreIdSequence::default()))
            .await
            .unwrap_err();
        assert!(err.is_batch_failure());
        assert!(matches!(err, DeployError::Build(reason) if reason.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_host_outside_batch_is_missing_artifact() {
        let builder = LinkFarm::new(false);
        let cache = ArtifactCache::new(&mut StoreIdSequence::default());
        let batch = BuildBatch::new(vec![Host::new("web1")]);

        let err = batch
            .artifact_for(&Host::new("db1"), &builder, &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingArtifact(name) if name == "db1"));
    }

    #[tokio::test]
    async fn test_dangling_link_is_link_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_artifact(dir.path(), &Host::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::LinkResolution { .. }));
    }
}
