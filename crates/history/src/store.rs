//! Backend selection for the history log.
//!
//! The remote service is used while it answers. The first transport failure
//! moves the store to the local backend for the rest of its lifetime; there
//! is no retry and no promotion back.

use crate::{is_trusted_endpoint, ClientIdentity, KeyValueStore, LocalBackend, RemoteBackend};
use ruledraw_core::{
    BackendStatus, HistoryError, HistoryLog, HistoryRecord, HistoryStats, RuleEntry, UndoOutcome,
};
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Remote,
    Fallback,
}

/// How a configured endpoint should be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteTrust {
    /// Trust loopback and private-network hosts only.
    #[default]
    Auto,
    Always,
    Never,
}

impl From<Option<bool>> for RemoteTrust {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Self::Auto,
            Some(true) => Self::Always,
            Some(false) => Self::Never,
        }
    }
}

pub struct HistoryStore<K: KeyValueStore> {
    remote: Option<RemoteBackend>,
    local: LocalBackend<K>,
    mode: BackendMode,
    status: Option<BackendStatus>,
}

impl<K: KeyValueStore> HistoryStore<K> {
    pub fn local_only(local: LocalBackend<K>) -> Self {
        Self {
            remote: None,
            local,
            mode: BackendMode::Fallback,
            status: None,
        }
    }

    pub fn with_remote(remote: RemoteBackend, local: LocalBackend<K>) -> Self {
        Self {
            remote: Some(remote),
            local,
            mode: BackendMode::Remote,
            status: None,
        }
    }

    /// Builds a store for `kv`, attaching the remote service only when an
    /// endpoint is given and trusted.
    pub fn open(mut kv: K, api_base: Option<&str>, trust: RemoteTrust) -> Self {
        let client = ClientIdentity::load_or_create(&mut kv);
        let local = LocalBackend::new(kv, client.clone());
        let Some(base) = api_base.map(str::trim).filter(|base| !base.is_empty()) else {
            return Self::local_only(local);
        };
        let url = match Url::parse(base) {
            Ok(url) => url,
            Err(err) => {
                warn!(base, error = %err, "invalid history endpoint, using local storage");
                return Self::local_only(local);
            }
        };
        let trusted = match trust {
            RemoteTrust::Always => true,
            RemoteTrust::Never => false,
            RemoteTrust::Auto => is_trusted_endpoint(&url),
        };
        if !trusted {
            info!(base, "history endpoint not trusted, using local storage");
            return Self::local_only(local);
        }
        match RemoteBackend::new(url, client) {
            Ok(remote) => Self::with_remote(remote, local),
            Err(err) => {
                warn!(error = %err, "history client unavailable, using local storage");
                Self::local_only(local)
            }
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn client(&self) -> &ClientIdentity {
        self.local.client()
    }

    pub fn local(&self) -> &LocalBackend<K> {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut LocalBackend<K> {
        &mut self.local
    }

    fn report(&mut self, status: BackendStatus) {
        if self.status != Some(status) {
            info!(%status, "history backend status");
            self.status = Some(status);
        }
    }

    fn dispatch<T>(
        &mut self,
        op: &'static str,
        remote: impl FnOnce(&RemoteBackend) -> Result<T, HistoryError>,
        local: impl FnOnce(&mut LocalBackend<K>) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        if self.mode == BackendMode::Remote {
            if let Some(backend) = self.remote.as_ref() {
                match remote(backend) {
                    Err(HistoryError::Unavailable(reason)) => {
                        warn!(op, %reason, "history service unavailable, switching to local storage");
                        self.mode = BackendMode::Fallback;
                    }
                    result => {
                        self.report(BackendStatus::Connected);
                        return result;
                    }
                }
            }
        }
        self.report(BackendStatus::LocalFallback);
        local(&mut self.local)
    }
}

impl<K: KeyValueStore> HistoryLog for HistoryStore<K> {
    fn add(&mut self, entry: &RuleEntry) -> Result<HistoryRecord, HistoryError> {
        self.dispatch("add", |remote| remote.add(entry), |local| local.add(entry))
    }

    fn list(&mut self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.dispatch(
            "list",
            |remote| remote.list(limit),
            |local| Ok(local.list(limit)),
        )
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<String>, HistoryError> {
        self.dispatch(
            "recent",
            |remote| remote.recent(limit),
            |local| Ok(local.recent(limit)),
        )
    }

    fn undo(&mut self, ids: &[i64]) -> Result<UndoOutcome, HistoryError> {
        self.dispatch("undo", |remote| remote.undo(ids), |local| local.undo(ids))
    }

    fn stats(&mut self) -> Result<HistoryStats, HistoryError> {
        self.dispatch("stats", |remote| remote.stats(), |local| Ok(local.stats()))
    }

    fn status(&self) -> Option<BackendStatus> {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryKv, CLIENT_ID_KEY};

    #[test]
    fn no_endpoint_is_local_only() {
        let store = HistoryStore::open(MemoryKv::new(), None, RemoteTrust::Auto);
        assert_eq!(store.mode(), BackendMode::Fallback);
        assert_eq!(store.status(), None);
    }

    #[test]
    fn untrusted_endpoint_is_ignored() {
        let store = HistoryStore::open(
            MemoryKv::new(),
            Some("https://history.example.com"),
            RemoteTrust::Auto,
        );
        assert_eq!(store.mode(), BackendMode::Fallback);
        let forced = HistoryStore::open(
            MemoryKv::new(),
            Some("https://history.example.com"),
            RemoteTrust::Always,
        );
        assert_eq!(forced.mode(), BackendMode::Remote);
        let refused = HistoryStore::open(
            MemoryKv::new(),
            Some("http://127.0.0.1:8502"),
            RemoteTrust::Never,
        );
        assert_eq!(refused.mode(), BackendMode::Fallback);
    }

    #[test]
    fn invalid_endpoint_is_local_only() {
        let store = HistoryStore::open(MemoryKv::new(), Some("not a url"), RemoteTrust::Always);
        assert_eq!(store.mode(), BackendMode::Fallback);
    }

    #[test]
    fn open_persists_client_identity() {
        let store = HistoryStore::open(MemoryKv::new(), None, RemoteTrust::Auto);
        let stored = store.local().kv().get(CLIENT_ID_KEY);
        assert_eq!(stored.as_deref(), Some(store.client().as_str()));
    }

    #[test]
    fn local_operations_report_fallback() {
        let mut store = HistoryStore::open(MemoryKv::new(), None, RemoteTrust::Auto);
        let record = store
            .add(&RuleEntry::new("R1", "A", "x"))
            .expect("add");
        assert_eq!(store.status(), Some(BackendStatus::LocalFallback));
        assert_eq!(store.recent(10).expect("recent"), vec!["R1"]);
        assert_eq!(store.list(10).expect("list"), vec![record]);
    }
}
