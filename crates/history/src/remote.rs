use crate::wire::{
    AddRequest, AddResponse, ListResponse, RecentResponse, StatsResponse, UndoRequest,
    UndoResponse, ADD_PATH, LIST_PATH, RECENT_PATH, STATS_PATH, UNDO_PATH,
};
use crate::ClientIdentity;
use ruledraw_core::{HistoryError, HistoryRecord, HistoryStats, RuleEntry, UndoOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::{Host, Url};

/// Whether an endpoint is on this machine or the local network.
pub fn is_trusted_endpoint(base: &Url) -> bool {
    match base.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Blocking client for the history service. Transport default timeouts only.
pub struct RemoteBackend {
    http: reqwest::blocking::Client,
    base: Url,
    client: ClientIdentity,
}

fn unavailable(err: impl std::fmt::Display) -> HistoryError {
    HistoryError::Unavailable(err.to_string())
}

impl RemoteBackend {
    pub fn new(base: Url, client: ClientIdentity) -> Result<Self, HistoryError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("ruledraw/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(unavailable)?;
        Ok(Self { http, base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path)
    }

    fn get<T: DeserializeOwned>(&self, path: &str, limit: Option<usize>) -> Result<T, HistoryError> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(2);
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        query.push(("client_id", self.client.as_str().to_string()));
        let resp = self
            .http
            .get(self.endpoint(path))
            .query(&query)
            .send()
            .map_err(unavailable)?;
        decode(resp)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, HistoryError> {
        let resp = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .map_err(unavailable)?;
        decode(resp)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let resp: ListResponse = self.get(LIST_PATH, Some(limit))?;
        if !resp.ok {
            return Err(rejected(resp.error));
        }
        Ok(resp.items)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<String>, HistoryError> {
        let resp: RecentResponse = self.get(RECENT_PATH, Some(limit))?;
        if !resp.ok {
            return Err(rejected(resp.error));
        }
        Ok(resp.ids)
    }

    pub fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let resp: StatsResponse = self.get(STATS_PATH, None)?;
        if !resp.ok {
            return Err(rejected(None));
        }
        Ok(resp.stats)
    }

    pub fn add(&self, entry: &RuleEntry) -> Result<HistoryRecord, HistoryError> {
        let body = AddRequest {
            id: entry.id.clone(),
            content: entry.content.clone(),
            category: entry.category.clone(),
            client_id: self.client.as_str().to_string(),
        };
        let resp: AddResponse = self.post(ADD_PATH, &body)?;
        if !resp.ok {
            return Err(rejected(resp.error));
        }
        resp.item.ok_or(HistoryError::AmbiguousWrite)
    }

    pub fn undo(&self, ids: &[i64]) -> Result<UndoOutcome, HistoryError> {
        let body = UndoRequest {
            ids: (!ids.is_empty()).then(|| ids.to_vec()),
            client_id: self.client.as_str().to_string(),
        };
        let resp: UndoResponse = self.post(UNDO_PATH, &body)?;
        if !resp.ok {
            return Err(HistoryError::NoRecord);
        }
        match (resp.item, resp.deleted_count) {
            (Some(item), _) => Ok(UndoOutcome::Removed(item)),
            (None, Some(count)) => Ok(UndoOutcome::Deleted { count }),
            (None, None) => Ok(UndoOutcome::Deleted { count: 0 }),
        }
    }
}

fn rejected(message: Option<String>) -> HistoryError {
    HistoryError::Rejected(message.unwrap_or_else(|| "request failed".to_string()))
}

fn decode<T: DeserializeOwned>(resp: reqwest::blocking::Response) -> Result<T, HistoryError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(HistoryError::Unavailable(format!("HTTP {}", status.as_u16())));
    }
    resp.json::<T>().map_err(unavailable)
}
