use std::cell::Cell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueHint};
use uuid::Uuid;

use crate::commands::{
    dispatch, list_backups_impl, load_state_impl, refresh_impl, shutdown_impl,
    update_settings_impl, CommandCtx, CommandResult,
};
use crate::dates::parse_date_key;
use crate::events::{TaskRef, UiEvent, ViewPayload};
use crate::projection::{DisplayDate, DisplayTask};
use crate::storage::StorageError;

#[derive(Parser, Debug)]
#[command(name = "daylist", author, version, about = "Date-organised todo list")]
struct Cli {
    /// Directory holding tasks.json, settings.json, backups and logs
    #[arg(long, global = true, value_hint = ValueHint::DirPath, default_value = ".")]
    data_dir: PathBuf,

    /// Date to act on (yyyy-MM-dd or dd.MM.yyyy); defaults to today
    #[arg(short, long, global = true, value_parser = parse_date_arg)]
    date: Option<NaiveDate>,

    /// Print views as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    verb: Option<Verb>,
}

#[derive(Subcommand, Debug)]
enum Verb {
    /// Show every date that has tasks
    Dates,
    /// Show the tasks of the selected date
    List,
    /// Add a task to the selected date
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Add a task to today or a future date
    Plan {
        #[arg(long = "on", value_parser = parse_date_arg)]
        on: NaiveDate,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    Remove(TargetArgs),
    /// Flip the completion flag
    Toggle(TargetArgs),
    Complete(TargetArgs),
    Reopen(TargetArgs),
    /// Raise the priority by the configured step
    Promote(TargetArgs),
    /// List backup snapshots
    Backups,
    /// Show or change settings
    Config(ConfigArgs),
    /// Interactive session that keeps a selected date
    Shell,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Display row (1-based) or task id
    #[arg(required_unless_present_any = ["text", "index"])]
    target: Option<String>,

    /// First task whose text matches exactly
    #[arg(long, conflicts_with_all = ["target", "index"])]
    text: Option<String>,

    /// 0-based position in storage order
    #[arg(long, conflicts_with = "target")]
    index: Option<usize>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long)]
    data_file: Option<String>,
    #[arg(long)]
    promote_step: Option<i64>,
    #[arg(long)]
    always_show_today: Option<bool>,
    #[arg(long)]
    backup_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Render {
    Dates,
    Tasks,
    Full,
}

struct CliCtx {
    data_dir: PathBuf,
    json: bool,
    render: Cell<Render>,
}

impl CommandCtx for CliCtx {
    fn data_dir(&self) -> Result<PathBuf, StorageError> {
        Ok(self.data_dir.clone())
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn emit_view_updated(&self, payload: &ViewPayload) {
        if self.json {
            match serde_json::to_string_pretty(payload) {
                Ok(text) => println!("{text}"),
                Err(error) => log::error!("failed to encode view: {error}"),
            }
            return;
        }
        print!("{}", render_view(payload, self.render.get()));
    }
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date_key(raw)
        .map(|(date, _)| date)
        .ok_or_else(|| format!("invalid date {raw:?}, expected yyyy-MM-dd or dd.MM.yyyy"))
}

fn parse_task_ref(raw: &str) -> Result<TaskRef, String> {
    let raw = raw.trim();
    if let Ok(row) = raw.parse::<usize>() {
        return Ok(TaskRef::Row(row));
    }
    Uuid::parse_str(raw)
        .map(TaskRef::Id)
        .map_err(|_| format!("{raw:?} is neither a row number nor a task id"))
}

fn target_ref(args: TargetArgs) -> Result<TaskRef, String> {
    if let Some(text) = args.text {
        return Ok(TaskRef::Text(text));
    }
    if let Some(index) = args.index {
        return Ok(TaskRef::Index(index));
    }
    match args.target {
        Some(raw) => parse_task_ref(&raw),
        None => Err("missing task reference".to_string()),
    }
}

fn render_date(date: &DisplayDate) -> String {
    let mut line = format!("  {} ({})", date.label, date.task_count);
    if date.is_today {
        line.push_str(" today");
    }
    if date.selected {
        line.push_str(" <");
    }
    line
}

fn render_task(task: &DisplayTask) -> String {
    let mark = if task.completed { "x" } else { " " };
    let mut line = format!("  {:>3}. [{mark}] {}", task.row, task.text);
    if task.priority != 0 {
        line.push_str(&format!("  (priority {})", task.priority));
    }
    line
}

fn render_view(payload: &ViewPayload, render: Render) -> String {
    let mut out = String::new();
    if render != Render::Tasks {
        out.push_str("Dates:\n");
        for date in &payload.dates {
            out.push_str(&render_date(date));
            out.push('\n');
        }
    }
    if render != Render::Dates {
        match payload.selected {
            None => out.push_str("No date selected.\n"),
            Some(date) if payload.tasks.is_empty() => {
                out.push_str(&format!("No tasks for {date}.\n"));
            }
            Some(date) => {
                out.push_str(&format!("Tasks for {date}:\n"));
                for task in &payload.tasks {
                    out.push_str(&render_task(task));
                    out.push('\n');
                }
            }
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum ShellAction {
    Event(UiEvent),
    Show,
    Help,
    Quit,
}

const SHELL_HELP: &str = "\
commands:
  select DATE | today | clear     change the selected date
  show                            print dates and tasks
  add TEXT                        add a task to the selected date
  plan DATE TEXT                  add a task to a future date
  remove REF | toggle REF         REF is a row number or a task id
  done REF | undo REF | promote REF
  help | quit";

fn parse_shell_line(
    line: &str,
    selected: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<ShellAction, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let selected_date = || selected.ok_or_else(|| "no date selected".to_string());

    let event = match verb {
        "" | "show" | "list" => return Ok(ShellAction::Show),
        "help" | "?" => return Ok(ShellAction::Help),
        "quit" | "exit" => return Ok(ShellAction::Quit),
        "today" => UiEvent::SelectDate(today),
        "clear" => UiEvent::ClearSelection,
        "select" => UiEvent::SelectDate(parse_date_arg(rest)?),
        "add" => {
            if rest.is_empty() {
                return Err("usage: add TEXT".to_string());
            }
            UiEvent::AddTask {
                text: rest.to_string(),
                date: selected_date()?,
            }
        }
        "plan" => {
            let (raw_date, text) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: plan DATE TEXT".to_string())?;
            UiEvent::PlanTask {
                text: text.trim().to_string(),
                date: parse_date_arg(raw_date)?,
            }
        }
        "remove" | "rm" => UiEvent::RemoveTask {
            date: selected_date()?,
            task: parse_task_ref(rest)?,
        },
        "toggle" => UiEvent::ToggleComplete {
            date: selected_date()?,
            task: parse_task_ref(rest)?,
        },
        "done" | "undo" => UiEvent::SetCompleted {
            date: selected_date()?,
            task: parse_task_ref(rest)?,
            completed: verb == "done",
        },
        "promote" | "up" => UiEvent::Promote {
            date: selected_date()?,
            task: parse_task_ref(rest)?,
        },
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(ShellAction::Event(event))
}

fn report<T>(result: &CommandResult<T>) -> bool {
    if let Some(error) = &result.error {
        eprintln!("error: {error}");
    }
    result.ok
}

fn run_shell(ctx: &CliCtx, state: &mut crate::state::AppState) -> io::Result<bool> {
    ctx.render.set(Render::Full);
    refresh_impl(ctx, state);
    let stdin = io::stdin();
    let mut all_ok = true;
    loop {
        print!("daylist> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match parse_shell_line(&line, state.selected_date(), ctx.today()) {
            Ok(ShellAction::Quit) => break,
            Ok(ShellAction::Help) => println!("{SHELL_HELP}"),
            Ok(ShellAction::Show) => {
                refresh_impl(ctx, state);
            }
            Ok(ShellAction::Event(event)) => {
                all_ok &= report(&dispatch(ctx, state, event));
            }
            Err(message) => eprintln!("error: {message}"),
        }
    }
    Ok(all_ok)
}

fn run_config(ctx: &CliCtx, state: &mut crate::state::AppState, args: ConfigArgs) -> bool {
    let mut settings = state.settings().clone();
    let mut changed = false;
    if let Some(data_file) = args.data_file {
        settings.data_file = data_file;
        changed = true;
    }
    if let Some(step) = args.promote_step {
        settings.promote_step = step;
        changed = true;
    }
    if let Some(show) = args.always_show_today {
        settings.always_show_today = show;
        changed = true;
    }
    if let Some(limit) = args.backup_limit {
        settings.backup_limit = limit;
        changed = true;
    }
    if changed {
        let result = update_settings_impl(ctx, state, settings);
        if !report(&result) {
            return false;
        }
    }
    match serde_json::to_string_pretty(state.settings()) {
        Ok(text) => println!("{text}"),
        Err(error) => log::error!("failed to encode settings: {error}"),
    }
    true
}

fn run_backups(ctx: &CliCtx, state: &crate::state::AppState) -> bool {
    let result = list_backups_impl(ctx, state);
    if let Some(entries) = &result.data {
        if entries.is_empty() {
            println!("No backups.");
        }
        for entry in entries {
            println!("  {}", entry.name);
        }
    }
    report(&result)
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match crate::logging::init_logging(&cli.data_dir) {
        Ok(handle) => Some(handle),
        Err(error) => {
            eprintln!("warning: file logging disabled: {error}");
            None
        }
    };

    let ctx = CliCtx {
        data_dir: cli.data_dir.clone(),
        json: cli.json,
        render: Cell::new(Render::Tasks),
    };
    let mut state = load_state_impl(&ctx);
    if let Some(date) = cli.date {
        state.select_date(Some(date));
    }
    let date = state.selected_date().unwrap_or_else(|| ctx.today());

    let event = |verb: fn(NaiveDate, TaskRef) -> UiEvent, args: TargetArgs| {
        target_ref(args).map(|task| verb(date, task))
    };

    let ok = match cli.verb.unwrap_or(Verb::List) {
        Verb::Dates => {
            ctx.render.set(Render::Dates);
            report(&refresh_impl(&ctx, &state))
        }
        Verb::List => report(&refresh_impl(&ctx, &state)),
        Verb::Add { text } => report(&dispatch(
            &ctx,
            &mut state,
            UiEvent::AddTask {
                text: text.join(" "),
                date,
            },
        )),
        Verb::Plan { on, text } => report(&dispatch(
            &ctx,
            &mut state,
            UiEvent::PlanTask {
                text: text.join(" "),
                date: on,
            },
        )),
        Verb::Remove(args) => run_event(&ctx, &mut state, event(remove_event, args)),
        Verb::Toggle(args) => run_event(&ctx, &mut state, event(toggle_event, args)),
        Verb::Complete(args) => run_event(&ctx, &mut state, event(complete_event, args)),
        Verb::Reopen(args) => run_event(&ctx, &mut state, event(reopen_event, args)),
        Verb::Promote(args) => run_event(&ctx, &mut state, event(promote_event, args)),
        Verb::Backups => run_backups(&ctx, &state),
        Verb::Config(args) => run_config(&ctx, &mut state, args),
        Verb::Shell => match run_shell(&ctx, &mut state) {
            Ok(all_ok) => all_ok,
            Err(error) => {
                eprintln!("error: {error}");
                false
            }
        },
    };

    let saved = report(&shutdown_impl(&ctx, &mut state));
    if ok && saved {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_event(ctx: &CliCtx, state: &mut crate::state::AppState, event: Result<UiEvent, String>) -> bool {
    match event {
        Ok(event) => report(&dispatch(ctx, state, event)),
        Err(message) => {
            eprintln!("error: {message}");
            false
        }
    }
}

fn remove_event(date: NaiveDate, task: TaskRef) -> UiEvent {
    UiEvent::RemoveTask { date, task }
}

fn toggle_event(date: NaiveDate, task: TaskRef) -> UiEvent {
    UiEvent::ToggleComplete { date, task }
}

fn complete_event(date: NaiveDate, task: TaskRef) -> UiEvent {
    UiEvent::SetCompleted {
        date,
        task,
        completed: true,
    }
}

fn reopen_event(date: NaiveDate, task: TaskRef) -> UiEvent {
    UiEvent::SetCompleted {
        date,
        task,
        completed: false,
    }
}

fn promote_event(date: NaiveDate, task: TaskRef) -> UiEvent {
    UiEvent::Promote { date, task }
}
