use chrono::{DateTime, Utc};
use ruledraw_core::{
    BackendStatus, HistoryRecord, HistoryStats, Notice, Presenter, RuleEntry, ALL_CATEGORIES,
};
use ruledraw_data::normalize_locale;
use std::cell::{RefCell, RefMut};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLocale {
    EnUs,
    ZhCn,
}

impl UiLocale {
    pub fn code(self) -> &'static str {
        match self {
            Self::EnUs => "en_US",
            Self::ZhCn => "zh_CN",
        }
    }

    pub fn from_opt(value: Option<&str>) -> Self {
        if normalize_locale(value) == "zh_CN" {
            Self::ZhCn
        } else {
            Self::EnUs
        }
    }

    pub fn text<'a>(self, en: &'a str, zh: &'a str) -> &'a str {
        if matches!(self, Self::ZhCn) {
            zh
        } else {
            en
        }
    }
}

pub fn category_label(locale: UiLocale, category: &str) -> String {
    let label = match category {
        ALL_CATEGORIES => locale.text("All", "全部"),
        "tactical" => locale.text("Tactical", "战术"),
        "weaponry" => locale.text("Weaponry", "器械"),
        "social" => locale.text("Social", "社交"),
        "contract" => locale.text("Contract", "契约"),
        other => other,
    };
    label.to_string()
}

/// Relative age of an RFC 3339 timestamp. Unparsable input is echoed back.
pub fn format_time_ago(locale: UiLocale, timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(at) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let mins = (now - at.with_timezone(&Utc)).num_minutes();
    if mins < 1 {
        return locale.text("just now", "刚刚").to_string();
    }
    if mins < 60 {
        return match locale {
            UiLocale::EnUs => format!("{mins} min ago"),
            UiLocale::ZhCn => format!("{mins}分钟前"),
        };
    }
    let hours = mins / 60;
    if hours < 24 {
        return match locale {
            UiLocale::EnUs => format!("{hours} h ago"),
            UiLocale::ZhCn => format!("{hours}小时前"),
        };
    }
    let days = hours / 24;
    match locale {
        UiLocale::EnUs => format!("{days} d ago"),
        UiLocale::ZhCn => format!("{days}天前"),
    }
}

pub fn notice_text(locale: UiLocale, notice: &Notice) -> String {
    match (locale, notice) {
        (UiLocale::EnUs, notice) => notice.to_string(),
        (UiLocale::ZhCn, Notice::NoRules { category }) => {
            format!("分类「{}」下没有规则", category_label(locale, category))
        }
        (UiLocale::ZhCn, Notice::NotEnoughRules { category }) => {
            format!("分类「{}」规则不足两条", category_label(locale, category))
        }
        (UiLocale::ZhCn, Notice::DrawRecorded) => "已记录抽取".to_string(),
        (UiLocale::ZhCn, Notice::DoubleDrawRecorded) => "已记录双抽".to_string(),
        (UiLocale::ZhCn, Notice::DrawFailed) => "记录失败，请重试".to_string(),
        (UiLocale::ZhCn, Notice::NothingToUndo) => "没有可撤销的抽取".to_string(),
        (UiLocale::ZhCn, Notice::UndoDone) => "已撤销上一次抽取".to_string(),
        (UiLocale::ZhCn, Notice::UndoFailed) => "撤销失败，请重试".to_string(),
    }
}

fn status_text(locale: UiLocale, status: BackendStatus) -> &'static str {
    match status {
        BackendStatus::Connected => locale.text("connected to remote", "已连接远程"),
        BackendStatus::LocalFallback => locale.text("using local fallback", "使用本地存储"),
    }
}

/// Line-oriented presenter. Panel data is kept so `history` and `stats`
/// can print it on demand.
pub struct TerminalPresenter<W: Write> {
    locale: UiLocale,
    out: RefCell<W>,
    panels: RefCell<(Vec<HistoryRecord>, HistoryStats)>,
    clock: fn() -> DateTime<Utc>,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(locale: UiLocale, out: W) -> Self {
        Self {
            locale,
            out: RefCell::new(out),
            panels: RefCell::new((Vec::new(), HistoryStats::default())),
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn locale(&self) -> UiLocale {
        self.locale
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    pub fn out(&self) -> RefMut<'_, W> {
        self.out.borrow_mut()
    }

    pub fn line(&self, text: &str) {
        let _ = writeln!(self.out.borrow_mut(), "{text}");
    }

    pub fn prompt(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }

    pub fn print_history(&self) {
        let locale = self.locale;
        let panels = self.panels.borrow();
        if panels.0.is_empty() {
            self.line(locale.text("No draws yet.", "暂无抽取记录。"));
            return;
        }
        let now = (self.clock)();
        for record in &panels.0 {
            self.line(&format!(
                "  #{:<4} {:<8} {:<10} {}  ({})",
                record.id,
                record.rule_id,
                category_label(locale, &record.category),
                record.content,
                format_time_ago(locale, &record.timestamp, now)
            ));
        }
    }

    pub fn print_stats(&self) {
        let locale = self.locale;
        let panels = self.panels.borrow();
        let stats = &panels.1;
        self.line(&format!(
            "{}: {}",
            locale.text("Draws today", "今日抽取"),
            stats.today_count
        ));
        match &stats.top_category {
            Some(top) => self.line(&format!(
                "{}: {} ({}%)",
                locale.text("Top category", "最多分类"),
                category_label(locale, top),
                stats.top_pct
            )),
            None => self.line(&format!("{}: -", locale.text("Top category", "最多分类"))),
        }
        for (category, count) in &stats.by_category {
            self.line(&format!("  {:<10} {count}", category_label(locale, category)));
        }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn reveal_selection(&self, label: &str, text: &str) {
        self.line("");
        self.line(&format!(">> {label}"));
        self.line(&format!("   {text}"));
        self.line("");
    }

    fn show_current(&self, current: Option<&HistoryRecord>) {
        let locale = self.locale;
        match current {
            Some(record) => self.line(&format!(
                "{}: [{}] {} {}",
                locale.text("Current", "当前"),
                category_label(locale, &record.category),
                record.rule_id,
                record.content
            )),
            None => self.line(locale.text(
                "Waiting for a draw.",
                "等待抽取。",
            )),
        }
    }

    fn render_panels(&self, items: &[HistoryRecord], stats: &HistoryStats) {
        *self.panels.borrow_mut() = (items.to_vec(), stats.clone());
    }

    fn render_rules(&self, category: &str, rules: &[RuleEntry]) {
        let locale = self.locale;
        self.line(&format!(
            "{} ({}): {}",
            locale.text("Rules", "规则"),
            category_label(locale, category),
            rules.len()
        ));
        for rule in rules {
            self.line(&format!("  {:<8} {}", rule.id, rule.content));
        }
    }

    fn notify_status(&self, status: BackendStatus) {
        self.line(&format!("[{}]", status_text(self.locale, status)));
    }

    fn notify_error(&self, notice: Notice) {
        self.line(&format!("! {}", notice_text(self.locale, &notice)));
    }

    fn notify_success(&self, notice: Notice) {
        self.line(&format!("+ {}", notice_text(self.locale, &notice)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().expect("time")
    }

    fn output(presenter: TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).expect("utf8")
    }

    #[test]
    fn time_ago_buckets() {
        let en = UiLocale::EnUs;
        assert_eq!(format_time_ago(en, "2026-03-10T11:59:30.000Z", noon()), "just now");
        assert_eq!(format_time_ago(en, "2026-03-10T11:15:00.000Z", noon()), "45 min ago");
        assert_eq!(format_time_ago(en, "2026-03-10T09:00:00.000Z", noon()), "3 h ago");
        assert_eq!(format_time_ago(en, "2026-03-07T12:00:00.000Z", noon()), "3 d ago");
        assert_eq!(
            format_time_ago(UiLocale::ZhCn, "2026-03-10T11:15:00.000Z", noon()),
            "45分钟前"
        );
        assert_eq!(format_time_ago(en, "yesterday", noon()), "yesterday");
    }

    #[test]
    fn labels_follow_locale() {
        assert_eq!(category_label(UiLocale::ZhCn, "weaponry"), "器械");
        assert_eq!(category_label(UiLocale::EnUs, "all"), "All");
        assert_eq!(category_label(UiLocale::EnUs, "custom"), "custom");
        assert_eq!(UiLocale::from_opt(Some("zh-CN")), UiLocale::ZhCn);
        assert_eq!(UiLocale::from_opt(None).code(), "en_US");
    }

    #[test]
    fn notices_and_status_are_printed() {
        let presenter = TerminalPresenter::new(UiLocale::ZhCn, Vec::new());
        presenter.notify_status(BackendStatus::LocalFallback);
        presenter.notify_error(Notice::NoRules {
            category: "social".to_string(),
        });
        presenter.notify_success(Notice::UndoDone);
        let text = output(presenter);
        assert!(text.contains("[使用本地存储]"));
        assert!(text.contains("分类「社交」下没有规则"));
        assert!(text.contains("+ 已撤销上一次抽取"));
    }

    #[test]
    fn panels_are_printed_on_demand() {
        let presenter = TerminalPresenter::new(UiLocale::EnUs, Vec::new()).with_clock(noon);
        let record = HistoryRecord {
            id: 4,
            rule_id: "TAC-01".to_string(),
            content: "Rush one site".to_string(),
            category: "tactical".to_string(),
            timestamp: "2026-03-10T11:50:00.000Z".to_string(),
            client_id: String::new(),
        };
        let stats = HistoryStats {
            today_count: 1,
            by_category: BTreeMap::from([("tactical".to_string(), 1)]),
            top_category: Some("tactical".to_string()),
            top_pct: 100,
        };
        presenter.render_panels(&[record], &stats);
        presenter.print_history();
        presenter.print_stats();
        let text = output(presenter);
        assert!(text.contains("TAC-01"));
        assert!(text.contains("(10 min ago)"));
        assert!(text.contains("Top category: Tactical (100%)"));
    }

    #[test]
    fn idle_placeholder_when_nothing_current() {
        let presenter = TerminalPresenter::new(UiLocale::EnUs, Vec::new());
        presenter.show_current(None);
        assert_eq!(output(presenter), "Waiting for a draw.\n");
    }
}
