mod presenter;

use anyhow::Context;
use presenter::{category_label, TerminalPresenter, UiLocale};
use ruledraw_core::{
    DrawSelector, DrawSession, HistoryLog, RngState, SessionConfig, ALL_CATEGORIES,
};
use ruledraw_data::{
    apply_env_overrides, default_state_path, load_app_config, load_rules, validate_rules_file,
    AppConfig,
};
use ruledraw_history::{FileKv, HistoryStore, KeyValueStore, MemoryKv, RemoteTrust};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "ruledraw.json";

#[derive(Debug, Clone, Default, PartialEq)]
struct CliOptions {
    config: Option<PathBuf>,
    rules: Option<PathBuf>,
    state: Option<PathBuf>,
    api: Option<String>,
    trust_remote: bool,
    local: bool,
    seed: Option<u64>,
    locale: Option<String>,
    validate: Option<PathBuf>,
    help: bool,
}

fn parse_cli_options(args: &[String]) -> CliOptions {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        let value = args.get(idx + 1).cloned();
        let mut consumed = true;
        match args[idx].as_str() {
            "--config" => options.config = value.map(PathBuf::from),
            "--rules" => options.rules = value.map(PathBuf::from),
            "--state" => options.state = value.map(PathBuf::from),
            "--api" => options.api = value,
            "--lang" | "-l" => options.locale = value,
            "--validate" => options.validate = value.map(PathBuf::from),
            "--seed" => options.seed = value.and_then(|v| v.parse::<u64>().ok()),
            "--trust-remote" => {
                options.trust_remote = true;
                consumed = false;
            }
            "--local" => {
                options.local = true;
                consumed = false;
            }
            "--help" | "-h" => {
                options.help = true;
                consumed = false;
            }
            _ => consumed = false,
        }
        idx += if consumed { 2 } else { 1 };
    }
    options
}

/// Config file, then environment, then command-line flags.
fn resolve_config(options: &CliOptions) -> anyhow::Result<AppConfig> {
    let path = options
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = load_app_config(&path)?;
    apply_env_overrides(&mut config);
    if let Some(rules) = &options.rules {
        config.rules_path = rules.clone();
    }
    if let Some(state) = &options.state {
        config.state_path = Some(state.clone());
    }
    if let Some(api) = &options.api {
        config.api_base = Some(api.clone());
    }
    if options.trust_remote {
        config.trust_remote = Some(true);
    }
    if options.local {
        config.api_base = None;
    }
    if let Some(locale) = &options.locale {
        config.locale = Some(locale.clone());
    }
    Ok(config)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = parse_cli_options(&args);
    match run(&options) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the process should exit non-zero without an error message.
fn run(options: &CliOptions) -> anyhow::Result<bool> {
    if let Some(path) = &options.validate {
        return validate(path);
    }
    let config = resolve_config(options)?;
    let locale = UiLocale::from_opt(config.locale.as_deref());
    if options.help {
        print_help(locale, &mut io::stdout());
        return Ok(true);
    }

    let catalog = load_rules(&config.rules_path)
        .with_context(|| format!("rules from {}", config.rules_path.display()))?;
    let selector = match options.seed {
        Some(seed) => DrawSelector::seeded(seed),
        None => DrawSelector::new(RngState::from_entropy()),
    };
    let session_config = SessionConfig {
        recent_window: config.recent_window,
        list_limit: config.list_limit,
    };
    let trust = RemoteTrust::from(config.trust_remote);
    let api_base = config.api_base.as_deref();

    match config.state_path.clone().or_else(default_state_path) {
        Some(path) => {
            debug!(path = %path.display(), "history state file");
            let store = HistoryStore::open(FileKv::new(path), api_base, trust);
            start_session(catalog, store, selector, session_config, locale)?;
        }
        None => {
            warn!("no state path available, history is kept in memory only");
            let store = HistoryStore::open(MemoryKv::new(), api_base, trust);
            start_session(catalog, store, selector, session_config, locale)?;
        }
    }
    Ok(true)
}

fn validate(path: &Path) -> anyhow::Result<bool> {
    let report = validate_rules_file(path)?;
    println!("{}", report.render());
    Ok(report.is_valid())
}

fn start_session<K: KeyValueStore>(
    catalog: ruledraw_core::RuleCatalog,
    store: HistoryStore<K>,
    selector: DrawSelector,
    config: SessionConfig,
    locale: UiLocale,
) -> anyhow::Result<()> {
    let presenter = TerminalPresenter::new(locale, io::stdout());
    let session = DrawSession::with_config(catalog, store, presenter, selector, config);
    let stdin = io::stdin();
    run_repl(&session, stdin.lock()).context("terminal session")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn run_repl<H: HistoryLog, W: Write>(
    session: &DrawSession<H, TerminalPresenter<W>>,
    mut input: impl BufRead,
) -> io::Result<()> {
    let presenter = session.presenter();
    let locale = presenter.locale();
    presenter.line(&format!(
        "{}: {}  {}: {}",
        locale.text("locale", "语言"),
        locale.code(),
        locale.text("rules", "规则"),
        session.catalog().len()
    ));
    session.refresh_panels();
    presenter.line(locale.text(
        "Type 'help' for commands.",
        "输入 help 查看命令。",
    ));

    let mut line = String::new();
    loop {
        presenter.prompt(&format!(
            "[{}] > ",
            category_label(locale, &session.active_category())
        ));
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        if execute_command(session, line.trim()) == Flow::Quit {
            break;
        }
    }
    Ok(())
}

fn execute_command<H: HistoryLog, W: Write>(
    session: &DrawSession<H, TerminalPresenter<W>>,
    input: &str,
) -> Flow {
    let presenter = session.presenter();
    let locale = presenter.locale();
    let mut parts = input.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Flow::Continue;
    };
    let arg = parts.next();
    match cmd {
        "draw" | "d" => {
            if let Err(err) = session.draw_one() {
                debug!(error = %err, "draw did not complete");
            }
        }
        "draw2" | "dd" => {
            if let Err(err) = session.draw_two() {
                debug!(error = %err, "double draw did not complete");
            }
        }
        "undo" | "u" => {
            if let Err(err) = session.undo_last() {
                debug!(error = %err, "undo did not complete");
            }
        }
        "cat" | "c" => select_category(session, arg),
        "rules" | "ls" => session.render_list(),
        "history" | "h" => {
            session.refresh_panels();
            presenter.print_history();
        }
        "stats" | "s" => {
            session.refresh_panels();
            presenter.print_stats();
        }
        "help" | "?" => print_help(locale, &mut *presenter.out()),
        "quit" | "q" | "exit" => return Flow::Quit,
        other => presenter.line(&format!(
            "{}: {other}",
            locale.text("unknown command", "未知命令")
        )),
    }
    Flow::Continue
}

fn select_category<H: HistoryLog, W: Write>(
    session: &DrawSession<H, TerminalPresenter<W>>,
    name: Option<&str>,
) {
    let presenter = session.presenter();
    let locale = presenter.locale();
    let mut known = vec![ALL_CATEGORIES];
    known.extend(session.catalog().categories());
    let Some(name) = name else {
        let listed: Vec<String> = known
            .iter()
            .map(|category| format!("{category} ({})", category_label(locale, category)))
            .collect();
        presenter.line(&format!(
            "{}: {}",
            locale.text("categories", "分类"),
            listed.join(", ")
        ));
        return;
    };
    if !known.contains(&name) {
        presenter.line(&format!(
            "{}: {name}",
            locale.text("unknown category", "未知分类")
        ));
        return;
    }
    session.set_category(name);
    session.render_list();
}

fn print_help(locale: UiLocale, out: &mut impl Write) {
    let rows = [
        ("draw|d", locale.text("draw one rule", "抽取一条规则")),
        ("draw2|dd", locale.text("draw two rules at once", "同时抽取两条规则")),
        ("undo|u", locale.text("undo the last draw", "撤销上一次抽取")),
        ("cat|c <name>", locale.text("switch category (no name lists them)", "切换分类（不带参数时列出分类）")),
        ("rules|ls", locale.text("list rules in the current category", "列出当前分类的规则")),
        ("history|h", locale.text("show recent draws", "显示最近抽取")),
        ("stats|s", locale.text("show today's statistics", "显示今日统计")),
        ("help|?", locale.text("show help", "显示帮助")),
        ("quit|q|exit", locale.text("exit", "退出")),
    ];
    let _ = writeln!(out, "{}", locale.text("Commands:", "命令："));
    for (command, text) in rows {
        let _ = writeln!(out, "  {command:<16} {text}");
    }
}
