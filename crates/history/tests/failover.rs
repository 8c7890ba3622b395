use httpmock::prelude::*;
use ruledraw_core::{
    BackendStatus, DrawOutcome, DrawSelector, DrawSession, HistoryLog, HistoryRecord,
    HistoryStats, Notice, Presenter, RuleCatalog, RuleEntry,
};
use ruledraw_history::wire::{ADD_PATH, LIST_PATH, RECENT_PATH, STATS_PATH};
use ruledraw_history::{BackendMode, HistoryStore, MemoryKv, RemoteTrust};
use serde_json::json;
use std::cell::RefCell;

#[derive(Default)]
struct StatusLog {
    statuses: RefCell<Vec<BackendStatus>>,
}

impl Presenter for StatusLog {
    fn reveal_selection(&self, _label: &str, _text: &str) {}
    fn show_current(&self, _current: Option<&HistoryRecord>) {}
    fn render_panels(&self, _items: &[HistoryRecord], _stats: &HistoryStats) {}
    fn render_rules(&self, _category: &str, _rules: &[RuleEntry]) {}
    fn notify_status(&self, status: BackendStatus) {
        self.statuses.borrow_mut().push(status);
    }
    fn notify_error(&self, _notice: Notice) {}
    fn notify_success(&self, _notice: Notice) {}
}

fn catalog() -> RuleCatalog {
    RuleCatalog::new(vec![
        RuleEntry::new("TAC-01", "Rush one site", "tactical"),
        RuleEntry::new("TAC-02", "No utility", "tactical"),
        RuleEntry::new("SOC-01", "Callouts in rhyme", "social"),
    ])
}

#[test]
fn unreachable_remote_fails_over_once() {
    // Port 1 on loopback: trusted, but nothing listens there.
    let store = HistoryStore::open(MemoryKv::new(), Some("http://127.0.0.1:1"), RemoteTrust::Auto);
    assert_eq!(store.mode(), BackendMode::Remote);

    let session = DrawSession::new(catalog(), store, StatusLog::default(), DrawSelector::seeded(8));
    for _ in 0..3 {
        assert!(matches!(session.draw_one(), Ok(DrawOutcome::Drawn(_))));
    }
    assert_eq!(
        *session.presenter().statuses.borrow(),
        vec![BackendStatus::LocalFallback]
    );
    assert_eq!(session.undo_tokens(), vec![3]);
}

#[test]
fn failed_remote_is_never_retried() {
    let server = MockServer::start();
    let recent = server.mock(|when, then| {
        when.method(GET).path(RECENT_PATH);
        then.status(503);
    });
    let add = server.mock(|when, then| {
        when.method(POST).path(ADD_PATH);
        then.status(200).json_body(json!({"ok": true, "item": null}));
    });

    let mut store = HistoryStore::open(MemoryKv::new(), Some(&server.base_url()), RemoteTrust::Auto);
    assert!(store.recent(10).expect("falls back").is_empty());
    assert_eq!(store.mode(), BackendMode::Fallback);

    let record = store
        .add(&RuleEntry::new("TAC-01", "Rush one site", "tactical"))
        .expect("local add");
    assert_eq!(record.id, 1);
    store.recent(10).expect("local recent");

    recent.assert_hits(1);
    add.assert_hits(0);
    assert_eq!(store.status(), Some(BackendStatus::LocalFallback));
}

#[test]
fn healthy_remote_reports_connected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(RECENT_PATH);
        then.status(200).json_body(json!({"ok": true, "ids": ["TAC-01"]}));
    });
    server.mock(|when, then| {
        when.method(POST).path(ADD_PATH);
        then.status(200).json_body(json!({
            "ok": true,
            "item": {
                "id": 41,
                "rule_id": "TAC-02",
                "content": "No utility",
                "category": "tactical",
                "timestamp": "2026-04-02T09:30:00.000Z"
            }
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path(LIST_PATH);
        then.status(200).json_body(json!({"ok": true, "items": []}));
    });
    server.mock(|when, then| {
        when.method(GET).path(STATS_PATH);
        then.status(200).json_body(json!({
            "ok": true,
            "today_count": 1,
            "by_category": {"tactical": 1},
            "top_category": "tactical",
            "top_pct": 100
        }));
    });

    let store = HistoryStore::open(MemoryKv::new(), Some(&server.base_url()), RemoteTrust::Auto);
    let session = DrawSession::new(catalog(), store, StatusLog::default(), DrawSelector::seeded(3));
    session.set_category("tactical");
    let DrawOutcome::Drawn(report) = session.draw_one().expect("draw") else {
        panic!("expected a draw");
    };
    assert_eq!(report.picks[0].id, "TAC-02");
    assert_eq!(report.record_ids, vec![41]);
    assert_eq!(
        *session.presenter().statuses.borrow(),
        vec![BackendStatus::Connected]
    );
}

#[test]
fn ambiguous_remote_add_is_recovered_from_list() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(RECENT_PATH);
        then.status(200).json_body(json!({"ok": true, "ids": []}));
    });
    server.mock(|when, then| {
        when.method(POST).path(ADD_PATH);
        then.status(200).json_body(json!({"ok": true}));
    });
    server.mock(|when, then| {
        when.method(GET).path(LIST_PATH).query_param("limit", "1");
        then.status(200).json_body(json!({"ok": true, "items": [{
            "id": 12,
            "rule_id": "SOC-01",
            "content": "Callouts in rhyme",
            "category": "social",
            "timestamp": "2026-04-02T09:30:00.000Z"
        }]}));
    });
    server.mock(|when, then| {
        when.method(GET).path(LIST_PATH).query_param("limit", "20");
        then.status(200).json_body(json!({"ok": true, "items": []}));
    });
    server.mock(|when, then| {
        when.method(GET).path(STATS_PATH);
        then.status(200).json_body(json!({
            "ok": true,
            "today_count": 0,
            "by_category": {},
            "top_category": null,
            "top_pct": 0
        }));
    });

    let store = HistoryStore::open(MemoryKv::new(), Some(&server.base_url()), RemoteTrust::Auto);
    let session = DrawSession::new(catalog(), store, StatusLog::default(), DrawSelector::seeded(5));
    session.set_category("social");
    session.draw_one().expect("draw");
    assert_eq!(session.undo_tokens(), vec![12]);
}
