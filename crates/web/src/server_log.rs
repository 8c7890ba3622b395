use chrono::{DateTime, NaiveDate, Utc};
use ruledraw_core::{compute_stats, HistoryRecord, HistoryStats, RuleEntry};

/// Records kept per client; older ones are dropped on add.
pub const MAX_RECORDS_PER_CLIENT: usize = 1000;

/// Draw history for every client the service has seen. Memory only.
#[derive(Debug)]
pub struct ServerLog {
    records: Vec<HistoryRecord>,
    next_id: i64,
    per_client: usize,
}

impl Default for ServerLog {
    fn default() -> Self {
        Self::with_per_client_cap(MAX_RECORDS_PER_CLIENT)
    }
}

impl ServerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_per_client_cap(per_client: usize) -> Self {
        Self {
            records: Vec::new(),
            next_id: 0,
            per_client: per_client.max(1),
        }
    }

    pub fn per_client_cap(&self) -> usize {
        self.per_client
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn newest_first<'a>(&'a self, client_id: &'a str) -> impl Iterator<Item = &'a HistoryRecord> + 'a {
        self.records
            .iter()
            .rev()
            .filter(move |record| record.client_id == client_id)
    }

    pub fn add(&mut self, client_id: &str, entry: &RuleEntry, at: DateTime<Utc>) -> HistoryRecord {
        self.next_id += 1;
        let record = HistoryRecord::from_entry(self.next_id, entry, at, client_id);
        self.records.push(record.clone());
        self.trim_client(client_id);
        record
    }

    // Records are appended in id order, so the first matches are the oldest.
    fn trim_client(&mut self, client_id: &str) {
        let owned = self
            .records
            .iter()
            .filter(|record| record.client_id == client_id)
            .count();
        let mut excess = owned.saturating_sub(self.per_client);
        if excess == 0 {
            return;
        }
        self.records.retain(|record| {
            if excess > 0 && record.client_id == client_id {
                excess -= 1;
                return false;
            }
            true
        });
    }

    pub fn list(&self, client_id: &str, limit: usize) -> Vec<HistoryRecord> {
        self.newest_first(client_id).take(limit).cloned().collect()
    }

    pub fn recent(&self, client_id: &str, limit: usize) -> Vec<String> {
        self.newest_first(client_id)
            .take(limit)
            .filter(|record| !record.rule_id.is_empty())
            .map(|record| record.rule_id.clone())
            .collect()
    }

    pub fn stats(&self, client_id: &str, today: NaiveDate) -> HistoryStats {
        let own: Vec<HistoryRecord> = self
            .records
            .iter()
            .filter(|record| record.client_id == client_id)
            .cloned()
            .collect();
        compute_stats(&own, today)
    }

    /// Deletes the listed ids that belong to `client_id`.
    pub fn delete_ids(&mut self, client_id: &str, ids: &[i64]) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| record.client_id != client_id || !ids.contains(&record.id));
        before - self.records.len()
    }

    pub fn delete_newest(&mut self, client_id: &str) -> Option<HistoryRecord> {
        let index = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.client_id == client_id)
            .max_by_key(|(_, record)| record.id)
            .map(|(index, _)| index)?;
        Some(self.records.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("time")
    }

    #[test]
    fn clients_are_isolated() {
        let mut log = ServerLog::new();
        log.add("a", &RuleEntry::new("TAC-01", "one", "tactical"), at());
        log.add("b", &RuleEntry::new("TAC-02", "two", "tactical"), at());
        log.add("a", &RuleEntry::new("SOC-01", "three", "social"), at());

        assert_eq!(log.recent("a", 10), vec!["SOC-01", "TAC-01"]);
        assert_eq!(log.list("b", 10).len(), 1);
        assert_eq!(log.delete_ids("b", &[1, 3]), 0);
        assert_eq!(log.delete_newest("a").map(|r| r.id), Some(3));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn oldest_records_beyond_the_cap_are_dropped() {
        let mut log = ServerLog::with_per_client_cap(2);
        log.add("a", &RuleEntry::new("TAC-01", "one", "tactical"), at());
        log.add("b", &RuleEntry::new("SOC-01", "two", "social"), at());
        log.add("a", &RuleEntry::new("TAC-02", "three", "tactical"), at());
        log.add("a", &RuleEntry::new("TAC-03", "four", "tactical"), at());

        let ids: Vec<i64> = log.list("a", 10).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 3]);
        assert_eq!(log.recent("b", 10), vec!["SOC-01"]);
        assert_eq!(log.len(), 3);
        assert_eq!(ServerLog::new().per_client_cap(), MAX_RECORDS_PER_CLIENT);
    }

    #[test]
    fn ids_keep_increasing_after_delete() {
        let mut log = ServerLog::new();
        log.add("a", &RuleEntry::new("TAC-01", "one", "tactical"), at());
        log.delete_newest("a");
        let next = log.add("a", &RuleEntry::new("TAC-01", "one", "tactical"), at());
        assert_eq!(next.id, 2);
        assert!(log.delete_newest("z").is_none());
    }
}
