//! One user-initiated draw from selection to recorded history, plus undo of
//! the draw that came immediately before it.
//!
//! All methods take `&self`: the session is driven from a single thread and
//! a presenter may call back into it while a reveal is running. The
//! `drawing` flag rejects such nested draws instead of interleaving them.

use crate::{
    BackendStatus, DrawSelector, HistoryError, HistoryLog, HistoryRecord, HistoryStats,
    RuleCatalog, RuleEntry, UndoOutcome, ALL_CATEGORIES,
};
use std::cell::{Cell, RefCell};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// User-facing conditions reported through the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoRules { category: String },
    NotEnoughRules { category: String },
    DrawRecorded,
    DoubleDrawRecorded,
    DrawFailed,
    NothingToUndo,
    UndoDone,
    UndoFailed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRules { category } => write!(f, "no rules in category {category}"),
            Self::NotEnoughRules { category } => {
                write!(f, "category {category} has fewer than two rules")
            }
            Self::DrawRecorded => write!(f, "draw recorded"),
            Self::DoubleDrawRecorded => write!(f, "double draw recorded"),
            Self::DrawFailed => write!(f, "draw failed, please retry"),
            Self::NothingToUndo => write!(f, "nothing from the last draw to undo"),
            Self::UndoDone => write!(f, "last draw undone"),
            Self::UndoFailed => write!(f, "undo failed, please retry"),
        }
    }
}

/// Presentation collaborator. Rendering, animation and toasts live behind it.
pub trait Presenter {
    /// Returns once the reveal has finished.
    fn reveal_selection(&self, label: &str, text: &str);
    /// Re-renders the result area; `None` shows the idle placeholder.
    fn show_current(&self, current: Option<&HistoryRecord>);
    fn render_panels(&self, items: &[HistoryRecord], stats: &HistoryStats);
    fn render_rules(&self, category: &str, rules: &[RuleEntry]);
    fn notify_status(&self, status: BackendStatus);
    fn notify_error(&self, notice: Notice);
    fn notify_success(&self, notice: Notice);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub recent_window: usize,
    pub list_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recent_window: 10,
            list_limit: 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no rules in category {category}")]
    NoRules { category: String },
    #[error("category {category} has {available} rule(s), two are needed")]
    NotEnoughRules { category: String, available: usize },
    #[error("recording the draw failed ({} committed): {source}", committed.len())]
    Record {
        committed: Vec<i64>,
        #[source]
        source: HistoryError,
    },
    #[error("nothing from the last draw to undo")]
    NothingToUndo,
    #[error("undo failed: {0}")]
    Undo(#[source] HistoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawReport {
    pub picks: Vec<RuleEntry>,
    pub record_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Another draw was still running.
    NotStarted,
    Drawn(DrawReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoReport {
    NotStarted,
    Undone {
        outcome: UndoOutcome,
        current: Option<HistoryRecord>,
    },
}

struct DrawGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DrawGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for DrawGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

pub struct DrawSession<H: HistoryLog, P: Presenter> {
    catalog: RuleCatalog,
    history: RefCell<H>,
    presenter: P,
    selector: RefCell<DrawSelector>,
    config: SessionConfig,
    drawing: Cell<bool>,
    last_record_ids: RefCell<Vec<i64>>,
    active_category: RefCell<String>,
    reported_status: Cell<Option<BackendStatus>>,
}

impl<H: HistoryLog, P: Presenter> DrawSession<H, P> {
    pub fn new(catalog: RuleCatalog, history: H, presenter: P, selector: DrawSelector) -> Self {
        Self::with_config(catalog, history, presenter, selector, SessionConfig::default())
    }

    pub fn with_config(
        catalog: RuleCatalog,
        history: H,
        presenter: P,
        selector: DrawSelector,
        config: SessionConfig,
    ) -> Self {
        Self {
            catalog,
            history: RefCell::new(history),
            presenter,
            selector: RefCell::new(selector),
            config,
            drawing: Cell::new(false),
            last_record_ids: RefCell::new(Vec::new()),
            active_category: RefCell::new(ALL_CATEGORIES.to_string()),
            reported_status: Cell::new(None),
        }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing.get()
    }

    pub fn undo_tokens(&self) -> Vec<i64> {
        self.last_record_ids.borrow().clone()
    }

    pub fn active_category(&self) -> String {
        self.active_category.borrow().clone()
    }

    pub fn set_category(&self, category: &str) {
        *self.active_category.borrow_mut() = category.to_string();
    }

    pub fn draw_pool(&self) -> Vec<RuleEntry> {
        self.catalog.filter(&self.active_category.borrow())
    }

    pub fn render_list(&self) {
        let category = self.active_category();
        let pool = self.draw_pool();
        self.presenter.render_rules(&category, &pool);
    }

    /// Runs `op` against the history log and forwards backend changes.
    fn with_history<T>(&self, op: impl FnOnce(&mut H) -> T) -> T {
        let (result, status) = {
            let mut history = self.history.borrow_mut();
            let result = op(&mut history);
            (result, history.status())
        };
        if status.is_some() && status != self.reported_status.get() {
            self.reported_status.set(status);
            if let Some(status) = status {
                self.presenter.notify_status(status);
            }
        }
        result
    }

    fn recent_ids(&self) -> Vec<String> {
        let window = self.config.recent_window;
        match self.with_history(|history| history.recent(window)) {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "recent window unavailable, drawing without dedup");
                Vec::new()
            }
        }
    }

    pub fn draw_one(&self) -> Result<DrawOutcome, SessionError> {
        let Some(_guard) = DrawGuard::acquire(&self.drawing) else {
            debug!("draw already in progress");
            return Ok(DrawOutcome::NotStarted);
        };
        let category = self.active_category();
        let pool = self.draw_pool();
        if pool.is_empty() {
            self.presenter.notify_error(Notice::NoRules {
                category: category.clone(),
            });
            return Err(SessionError::NoRules { category });
        }

        let recent = self.recent_ids();
        let pick = match self.selector.borrow_mut().pick_one(&pool, &recent) {
            Some(entry) => entry.clone(),
            None => {
                self.presenter.notify_error(Notice::NoRules {
                    category: category.clone(),
                });
                return Err(SessionError::NoRules { category });
            }
        };

        let label = format!("Protocol: {} // {}", pick.category.to_uppercase(), pick.id);
        self.presenter.reveal_selection(&label, &pick.content);

        let picks = vec![pick];
        self.record_picks(&picks, Notice::DrawRecorded)
    }

    pub fn draw_two(&self) -> Result<DrawOutcome, SessionError> {
        let Some(_guard) = DrawGuard::acquire(&self.drawing) else {
            debug!("draw already in progress");
            return Ok(DrawOutcome::NotStarted);
        };
        let category = self.active_category();
        let pool = self.draw_pool();
        if pool.len() < 2 {
            self.presenter.notify_error(Notice::NotEnoughRules {
                category: category.clone(),
            });
            return Err(SessionError::NotEnoughRules {
                category,
                available: pool.len(),
            });
        }

        let recent = self.recent_ids();
        let pair = self
            .selector
            .borrow_mut()
            .pick_two(&pool, &recent)
            .map(|(a, b)| (a.clone(), b.clone()));
        let Some((first, second)) = pair else {
            self.presenter.notify_error(Notice::NotEnoughRules {
                category: category.clone(),
            });
            return Err(SessionError::NotEnoughRules {
                category,
                available: pool.len(),
            });
        };

        let label = format!(
            "Protocol: {} // {} + {}",
            first.category.to_uppercase(),
            first.id,
            second.id
        );
        let text = format!("{} + {}", first.content, second.content);
        self.presenter.reveal_selection(&label, &text);

        let picks = vec![first, second];
        self.record_picks(&picks, Notice::DoubleDrawRecorded)
    }

    /// Adds each pick in order and captures undo tokens. An add that was
    /// accepted without returning its record is followed by a read of the
    /// newest record, which can pick up another writer's record under
    /// concurrent use. Any other add error wrote nothing and stops the draw.
    fn record_picks(&self, picks: &[RuleEntry], success: Notice) -> Result<DrawOutcome, SessionError> {
        let mut tokens: Vec<i64> = Vec::with_capacity(picks.len());
        let mut failure: Option<HistoryError> = None;
        for pick in picks {
            match self.with_history(|history| history.add(pick)) {
                Ok(record) => tokens.push(record.id),
                Err(HistoryError::AmbiguousWrite) => {
                    warn!(rule = %pick.id, "add unconfirmed, reading back newest record");
                    if let Some(id) = self.newest_record_id() {
                        if !tokens.contains(&id) {
                            tokens.push(id);
                        }
                    }
                }
                Err(err) => {
                    warn!(rule = %pick.id, error = %err, "add failed");
                    failure = Some(err);
                    break;
                }
            }
        }

        *self.last_record_ids.borrow_mut() = tokens.clone();
        self.refresh_panels();

        if let Some(source) = failure {
            self.presenter.notify_error(Notice::DrawFailed);
            return Err(SessionError::Record {
                committed: tokens,
                source,
            });
        }
        self.presenter.notify_success(success);
        Ok(DrawOutcome::Drawn(DrawReport {
            picks: picks.to_vec(),
            record_ids: tokens,
        }))
    }

    fn newest_record(&self) -> Option<HistoryRecord> {
        match self.with_history(|history| history.list(1)) {
            Ok(items) => items.into_iter().next(),
            Err(err) => {
                warn!(error = %err, "could not read newest record");
                None
            }
        }
    }

    fn newest_record_id(&self) -> Option<i64> {
        self.newest_record().map(|record| record.id)
    }

    pub fn refresh_panels(&self) {
        let limit = self.config.list_limit;
        let items = match self.with_history(|history| history.list(limit)) {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "history list refresh failed");
                return;
            }
        };
        let stats = match self.with_history(|history| history.stats()) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "history stats refresh failed");
                return;
            }
        };
        self.presenter.render_panels(&items, &stats);
    }

    pub fn undo_last(&self) -> Result<UndoReport, SessionError> {
        let Some(_guard) = DrawGuard::acquire(&self.drawing) else {
            return Ok(UndoReport::NotStarted);
        };
        let tokens = self.undo_tokens();
        if tokens.is_empty() {
            self.presenter.notify_error(Notice::NothingToUndo);
            return Err(SessionError::NothingToUndo);
        }

        let outcome = match self.with_history(|history| history.undo(&tokens)) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, ids = ?tokens, "undo failed");
                self.presenter.notify_error(Notice::UndoFailed);
                return Err(SessionError::Undo(err));
            }
        };

        self.last_record_ids.borrow_mut().clear();
        self.refresh_panels();
        let current = self.newest_record();
        self.presenter.show_current(current.as_ref());
        self.presenter.notify_success(Notice::UndoDone);
        Ok(UndoReport::Undone { outcome, current })
    }
}
