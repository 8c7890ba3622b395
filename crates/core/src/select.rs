use crate::{RngState, RuleEntry};
use std::collections::HashSet;

/// Random picks over a filtered pool with a soft preference against
/// recently drawn rule ids.
#[derive(Debug, Clone)]
pub struct DrawSelector {
    rng: RngState,
}

impl DrawSelector {
    pub fn new(rng: RngState) -> Self {
        Self { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(RngState::from_seed(seed))
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn pick_one<'a>(
        &mut self,
        pool: &'a [RuleEntry],
        recent_ids: &[String],
    ) -> Option<&'a RuleEntry> {
        if pool.is_empty() {
            return None;
        }
        let fresh = not_recent(pool, recent_ids);
        if fresh.is_empty() {
            return Some(&pool[self.rng.index(pool.len())]);
        }
        Some(fresh[self.rng.index(fresh.len())])
    }

    pub fn pick_two<'a>(
        &mut self,
        pool: &'a [RuleEntry],
        recent_ids: &[String],
    ) -> Option<(&'a RuleEntry, &'a RuleEntry)> {
        if pool.len() < 2 {
            return None;
        }
        let fresh = not_recent(pool, recent_ids);
        let candidates: Vec<&'a RuleEntry> = if fresh.len() >= 2 {
            fresh
        } else {
            pool.iter().collect()
        };
        self.shuffled_pair(candidates)
            .or_else(|| self.offset_pair(pool))
    }

    fn shuffled_pair<'a>(
        &mut self,
        mut candidates: Vec<&'a RuleEntry>,
    ) -> Option<(&'a RuleEntry, &'a RuleEntry)> {
        self.rng.shuffle(&mut candidates);
        match candidates.as_slice() {
            [first, second, ..] => Some((*first, *second)),
            _ => None,
        }
    }

    // Second index is drawn from n-1 slots and shifted past the first, so it
    // is distinct but not perfectly uniform over pairs.
    fn offset_pair<'a>(&mut self, pool: &'a [RuleEntry]) -> Option<(&'a RuleEntry, &'a RuleEntry)> {
        if pool.len() < 2 {
            return None;
        }
        let first = self.rng.index(pool.len());
        let mut second = self.rng.index(pool.len() - 1);
        if second >= first {
            second += 1;
        }
        Some((&pool[first], &pool[second]))
    }
}

fn not_recent<'a>(pool: &'a [RuleEntry], recent_ids: &[String]) -> Vec<&'a RuleEntry> {
    let recent: HashSet<&str> = recent_ids.iter().map(String::as_str).collect();
    pool.iter()
        .filter(|entry| !recent.contains(entry.id.as_str()))
        .collect()
}
