use crate::{ClientIdentity, KeyValueStore, CLIENT_ID_KEY};
use chrono::{DateTime, Utc};
use ruledraw_core::{
    compute_stats, HistoryError, HistoryRecord, HistoryStats, RuleEntry, UndoOutcome,
};
use tracing::{debug, warn};

/// Best-effort history kept in a key-value store under client-scoped keys.
pub struct LocalBackend<K: KeyValueStore> {
    kv: K,
    client: ClientIdentity,
    history_key: String,
    id_key: String,
    clock: fn() -> DateTime<Utc>,
}

impl<K: KeyValueStore> LocalBackend<K> {
    pub fn new(kv: K, client: ClientIdentity) -> Self {
        let history_key = format!("vp_history_{client}");
        let id_key = format!("vp_history_id_{client}");
        Self {
            kv,
            client,
            history_key,
            id_key,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client(&self) -> &ClientIdentity {
        &self.client
    }

    pub fn history_key(&self) -> &str {
        &self.history_key
    }

    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }

    /// Records in stored (insertion) order. Unparsable state reads as empty.
    pub fn records(&self) -> Vec<HistoryRecord> {
        let Some(raw) = self.kv.get(&self.history_key) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(key = %self.history_key, error = %err, "local history is malformed, treating as empty");
                Vec::new()
            }
        }
    }

    fn save(&mut self, records: &[HistoryRecord]) -> Result<(), HistoryError> {
        let body =
            serde_json::to_string(records).map_err(|err| HistoryError::Storage(err.to_string()))?;
        self.kv.set(&self.history_key, &body)?;
        self.keep_identity();
        Ok(())
    }

    // A store that lost its contents mid-session must not strand the history
    // keys under an identity the next start cannot find.
    fn keep_identity(&mut self) {
        if self.kv.get(CLIENT_ID_KEY).as_deref() == Some(self.client.as_str()) {
            return;
        }
        warn!(client = %self.client, "client identity missing from store, writing it back");
        if let Err(err) = self.kv.set(CLIENT_ID_KEY, self.client.as_str()) {
            warn!(error = %err, "client identity not persisted");
        }
    }

    // Never below the newest stored id, so a lost or reset counter cannot
    // hand out an id twice.
    fn next_id(&mut self, records: &[HistoryRecord]) -> i64 {
        let counter = self
            .kv
            .get(&self.id_key)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|id| *id >= 1)
            .unwrap_or(1);
        let floor = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let id = counter.max(floor);
        if let Err(err) = self.kv.set(&self.id_key, &(id + 1).to_string()) {
            warn!(error = %err, "id counter not persisted");
        }
        id
    }

    fn newest_first(&self) -> Vec<HistoryRecord> {
        let mut records = self.records();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        records
    }

    pub fn add(&mut self, entry: &RuleEntry) -> Result<HistoryRecord, HistoryError> {
        if entry.id.is_empty() || entry.content.is_empty() {
            return Err(HistoryError::MissingFields);
        }
        let mut records = self.records();
        let id = self.next_id(&records);
        let record = HistoryRecord::from_entry(id, entry, (self.clock)(), self.client.as_str());
        records.push(record.clone());
        self.save(&records)?;
        debug!(id, rule = %entry.id, "local history add");
        Ok(record)
    }

    pub fn list(&self, limit: usize) -> Vec<HistoryRecord> {
        self.newest_first().into_iter().take(limit).collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<String> {
        self.newest_first()
            .into_iter()
            .take(limit)
            .map(|record| record.rule_id)
            .filter(|rule_id| !rule_id.is_empty())
            .collect()
    }

    pub fn stats(&self) -> HistoryStats {
        compute_stats(&self.records(), (self.clock)().date_naive())
    }

    pub fn undo(&mut self, ids: &[i64]) -> Result<UndoOutcome, HistoryError> {
        let mut records = self.records();
        if !ids.is_empty() {
            let before = records.len();
            records.retain(|record| !ids.contains(&record.id));
            let count = before - records.len();
            self.save(&records)?;
            return Ok(UndoOutcome::Deleted { count });
        }
        let newest = records
            .iter()
            .max_by_key(|record| record.id)
            .cloned()
            .ok_or(HistoryError::NoRecord)?;
        records.retain(|record| record.id != newest.id);
        self.save(&records)?;
        Ok(UndoOutcome::Removed(newest))
    }
}
