mod app;
mod cli;
mod db;
mod entities;
mod error;
mod lifecycle;
mod model;
mod util;

use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::cli::{
    ChapterAdd, ChapterCommand, ChapterList, ChapterUpdate, Cli, Command, PauseArgs, QuestAdd,
    QuestCommand, QuestList, QuestUpdate, ResumeArgs, ReviewArgs, SeasonAdd, SeasonCommand,
    SeasonList, SeasonUpdate, StatusArgs, TaskAdd, TaskCommand, TaskDone, TaskList, TaskRemove,
};
use crate::entities::{chapter, quest, season, task};
use crate::error::AppError;
use crate::lifecycle::calendar::parse_timestamp;
use crate::lifecycle::progress::{aggregate_season_progress, chapter_progress_ratio};
use crate::lifecycle::status::{derive_chapter_status, derive_quest_status, derive_season_status};
use crate::lifecycle::watcher::{ReviewSink, ReviewTarget, ReviewWatcher};
use crate::model::{
    ChapterChanges, ChapterInput, EntityKind, QuestChanges, QuestInput, QuestQuery, SeasonChanges,
    SeasonInput, StatusView, StoredStatus, TaskInput,
};
use crate::util::{
    format_chapter_detail, format_quest_detail, format_ratio, format_season_detail,
};

const HOME_ENV: &str = "QUESTLINE_HOME";
const LOG_ENV: &str = "QUESTLINE_LOG";
const DEFAULT_HOME_DIR: &str = ".questline";

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), AppError> {
    let Cli { home, now, command } = Cli::parse();
    let home = resolve_home(home)?;
    let now = resolve_now(now.as_deref())?;

    let db_path = db::resolve_db_path(&home);
    db::ensure_parent_dir(&db_path)?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let db = db::connect(&db_path).await?;
    db::ensure_schema(&db).await?;
    let app = App::new(db);

    // One command is one page session: seed the watcher, mutate, observe again.
    let mutates = command_mutates(&command);
    let mut watcher = ReviewWatcher::new();
    if mutates {
        watcher.observe(&app.snapshot().await?, &now, &mut PromptPrinter);
    }

    match command {
        Command::Season(command) => handle_season(&app, command, &now).await?,
        Command::Chapter(command) => handle_chapter(&app, command, &now).await?,
        Command::Quest(command) => handle_quest(&app, command, &now).await?,
        Command::Task(command) => handle_task(&app, command, &now).await?,
        Command::Status(args) => handle_status(&app, args, &now).await?,
    }

    if mutates {
        watcher.observe(&app.snapshot().await?, &now, &mut PromptPrinter);
    }
    // The printed prompt is dismissed when the session ends.
    if let Some(key) = watcher.open_prompt() {
        debug!(kind = %key.kind, id = key.id, "review prompt dismissed");
        watcher.prompt_closed();
    }
    Ok(())
}

fn command_mutates(command: &Command) -> bool {
    match command {
        Command::Season(command) => {
            !matches!(command, SeasonCommand::List(_) | SeasonCommand::Show(_))
        }
        Command::Chapter(command) => {
            !matches!(command, ChapterCommand::List(_) | ChapterCommand::Show(_))
        }
        Command::Quest(command) => {
            !matches!(command, QuestCommand::List(_) | QuestCommand::Show(_))
        }
        Command::Task(command) => !matches!(command, TaskCommand::List(_)),
        Command::Status(_) => false,
    }
}

fn resolve_home(flag: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(home) = flag {
        return Ok(home);
    }
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    if let Some(home) = std::env::var_os("HOME").filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home).join(DEFAULT_HOME_DIR));
    }
    Err(AppError::InvalidInput(format!(
        "unable to resolve data directory; set {HOME_ENV} or pass --home"
    )))
}

fn resolve_now(flag: Option<&str>) -> Result<DateTime<Local>, AppError> {
    let Some(value) = flag else {
        return Ok(Local::now());
    };
    parse_timestamp(value.trim()).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "--now '{value}' is not RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD"
        ))
    })
}

/// Empty input means "no date".
fn date_arg(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Some(None)` clears the stored date.
fn date_change(value: Option<String>) -> Option<Option<String>> {
    value.map(|value| Some(value.trim().to_string()).filter(|value| !value.is_empty()))
}

struct PromptPrinter;

impl ReviewSink for PromptPrinter {
    fn on_entity_needs_review(&mut self, kind: EntityKind, target: ReviewTarget<'_>) {
        let id = target.key().id;
        println!("{} ID: {id} ({}) is complete.", kind.label(), target.title());
        println!(
            "Record a review with: questline {kind} review {id} \"<review>\" --satisfaction <1-5>"
        );
    }
}

async fn handle_season(
    app: &App,
    command: SeasonCommand,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    match command {
        SeasonCommand::Add(args) => handle_season_add(app, args, now).await,
        SeasonCommand::List(args) => handle_season_list(app, args, now).await,
        SeasonCommand::Show(args) => {
            let snapshot = app.snapshot().await?;
            let season = snapshot
                .seasons
                .iter()
                .chain(&snapshot.history)
                .find(|season| season.id == args.id)
                .ok_or_else(|| AppError::NotFound(format!("season id {}", args.id)))?;
            println!(
                "{}",
                format_season_detail(
                    season,
                    &snapshot.chapters,
                    &snapshot.quests,
                    &snapshot.tasks,
                    now
                )
            );
            Ok(())
        }
        SeasonCommand::Update(args) => handle_season_update(app, args, now).await,
        SeasonCommand::Pause(args) => handle_pause(app, EntityKind::Season, args, now).await,
        SeasonCommand::Resume(args) => handle_resume(app, EntityKind::Season, args, now).await,
        SeasonCommand::Review(args) => handle_review(app, EntityKind::Season, args, now).await,
        SeasonCommand::Archive(args) => {
            let season = app.archive_season(args.id, now).await?;
            println!("Archived season ID: {}: {}", season.id, season.title);
            Ok(())
        }
    }
}

async fn handle_season_add(
    app: &App,
    args: SeasonAdd,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let season = app
        .add_season(
            SeasonInput {
                title: args.title,
                description: args.description.filter(|text| !text.trim().is_empty()),
                start_date: date_arg(args.start),
                end_date: date_arg(args.end),
            },
            now,
        )
        .await?;
    println!("Created season ID: {}: {}", season.id, season.title);
    print_season_status(app, &season, now).await
}

async fn handle_season_list(
    app: &App,
    args: SeasonList,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let seasons = app.list_seasons(args.all).await?;
    if seasons.is_empty() {
        println!("No seasons found.");
        return Ok(());
    }
    println!(
        "{:<4} {:<18} {:<5} {:<10} {:<10} {}",
        "ID", "STATUS", "PROG", "START", "END", "TITLE"
    );
    for season in &seasons {
        let quests = app.quests_for_season(season.id).await?;
        let status = if season.status == StoredStatus::Archived.as_str() {
            "archived".to_string()
        } else {
            derive_season_status(season, &quests, now).to_string()
        };
        println!(
            "{:<4} {:<18} {:<5} {:<10} {:<10} {}",
            season.id,
            status,
            format!("{}%", aggregate_season_progress(season, &quests)),
            season.start_date.as_deref().unwrap_or("-"),
            season.end_date.as_deref().unwrap_or("-"),
            season.title
        );
    }
    Ok(())
}

async fn handle_season_update(
    app: &App,
    args: SeasonUpdate,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let season = app
        .update_season(
            args.id,
            SeasonChanges {
                title: args.title,
                description: args.description,
                start_date: date_change(args.start),
                end_date: date_change(args.end),
                status: args.status.map(Into::into),
            },
            now,
        )
        .await?;
    println!("Updated season ID: {}: {}", season.id, season.title);
    print_season_status(app, &season, now).await
}

async fn print_season_status(
    app: &App,
    season: &season::Model,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let quests = app.quests_for_season(season.id).await?;
    println!("Status: {}", derive_season_status(season, &quests, now));
    Ok(())
}

async fn handle_chapter(
    app: &App,
    command: ChapterCommand,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    match command {
        ChapterCommand::Add(args) => handle_chapter_add(app, args, now).await,
        ChapterCommand::List(args) => handle_chapter_list(app, args, now).await,
        ChapterCommand::Show(args) => {
            let chapter = app.get_chapter(args.id).await?;
            let quests = chapter_quests(app, chapter.id, now).await?;
            println!("{}", format_chapter_detail(&chapter, &quests, now));
            Ok(())
        }
        ChapterCommand::Update(args) => handle_chapter_update(app, args, now).await,
        ChapterCommand::Pause(args) => handle_pause(app, EntityKind::Chapter, args, now).await,
        ChapterCommand::Resume(args) => handle_resume(app, EntityKind::Chapter, args, now).await,
        ChapterCommand::Review(args) => handle_review(app, EntityKind::Chapter, args, now).await,
        ChapterCommand::Remove(args) => {
            app.remove_chapter(args.id).await?;
            println!("Removed chapter ID: {}", args.id);
            Ok(())
        }
    }
}

async fn chapter_quests(
    app: &App,
    chapter_id: i64,
    now: &DateTime<Local>,
) -> Result<Vec<quest::Model>, AppError> {
    let query = QuestQuery {
        chapter_id: Some(chapter_id),
        ..Default::default()
    };
    app.list_quests(&query, now).await
}

async fn handle_chapter_add(
    app: &App,
    args: ChapterAdd,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let chapter = app
        .add_chapter(
            ChapterInput {
                season_id: args.season_id,
                title: args.title,
                unlock_time: date_arg(args.unlock),
                deadline: date_arg(args.deadline),
                progress: args.progress,
            },
            now,
        )
        .await?;
    println!("Created chapter ID: {}: {}", chapter.id, chapter.title);
    print_chapter_status(&chapter, now);
    Ok(())
}

async fn handle_chapter_list(
    app: &App,
    args: ChapterList,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let chapters = app.list_chapters(args.season).await?;
    if chapters.is_empty() {
        println!("No chapters found.");
        return Ok(());
    }
    println!(
        "{:<4} {:<6} {:<18} {:<8} {:<10} {}",
        "ID", "SEASON", "STATUS", "QUESTS", "DEADLINE", "TITLE"
    );
    for chapter in &chapters {
        let linked = chapter_quests(app, chapter.id, now).await?;
        println!(
            "{:<4} {:<6} {:<18} {:<8} {:<10} {}",
            chapter.id,
            chapter.season_id,
            derive_chapter_status(chapter, now),
            format_ratio(chapter_progress_ratio(chapter, linked.len())),
            chapter.deadline.as_deref().unwrap_or("-"),
            chapter.title
        );
    }
    Ok(())
}

async fn handle_chapter_update(
    app: &App,
    args: ChapterUpdate,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let chapter = app
        .update_chapter(
            args.id,
            ChapterChanges {
                title: args.title,
                unlock_time: date_change(args.unlock),
                deadline: date_change(args.deadline),
                progress: args.progress,
                status: args.status.map(Into::into),
            },
            now,
        )
        .await?;
    println!("Updated chapter ID: {}: {}", chapter.id, chapter.title);
    print_chapter_status(&chapter, now);
    Ok(())
}

fn print_chapter_status(chapter: &chapter::Model, now: &DateTime<Local>) {
    println!(
        "Status: {} ({}%)",
        derive_chapter_status(chapter, now),
        chapter.progress
    );
}

async fn handle_quest(
    app: &App,
    command: QuestCommand,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    match command {
        QuestCommand::Add(args) => handle_quest_add(app, args, now).await,
        QuestCommand::List(args) => handle_quest_list(app, args, now).await,
        QuestCommand::Show(args) => {
            let quest = app.get_quest(args.id).await?;
            let tasks = app.list_tasks(Some(quest.id), None).await?;
            println!("{}", format_quest_detail(&quest, &tasks, now));
            Ok(())
        }
        QuestCommand::Update(args) => handle_quest_update(app, args, now).await,
        QuestCommand::Pause(args) => handle_pause(app, EntityKind::Quest, args, now).await,
        QuestCommand::Resume(args) => handle_resume(app, EntityKind::Quest, args, now).await,
        QuestCommand::Review(args) => handle_review(app, EntityKind::Quest, args, now).await,
        QuestCommand::Remove(args) => {
            app.remove_quest(args.id, now).await?;
            println!("Removed quest ID: {}", args.id);
            Ok(())
        }
    }
}

async fn handle_quest_add(
    app: &App,
    args: QuestAdd,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let quest = app
        .add_quest(
            QuestInput {
                title: args.title,
                season_id: args.season,
                chapter_id: args.chapter,
                unlock_time: date_arg(args.unlock),
                deadline: date_arg(args.deadline),
                progress: args.progress,
            },
            now,
        )
        .await?;
    println!("Created quest ID: {}: {}", quest.id, quest.title);
    print_quest_status(&quest, now);
    Ok(())
}

async fn handle_quest_list(
    app: &App,
    args: QuestList,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let query = QuestQuery {
        season_id: args.season,
        chapter_id: args.chapter,
        status: args.status.map(Into::into),
    };
    let quests = app.list_quests(&query, now).await?;
    if quests.is_empty() {
        println!("No quests found.");
        return Ok(());
    }
    println!(
        "{:<4} {:<18} {:<5} {:<7} {:<10} {}",
        "ID", "STATUS", "PROG", "CHAPTER", "DEADLINE", "TITLE"
    );
    for quest in &quests {
        println!(
            "{:<4} {:<18} {:<5} {:<7} {:<10} {}",
            quest.id,
            derive_quest_status(quest, now),
            format!("{}%", quest.progress),
            quest
                .chapter_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            quest.deadline.as_deref().unwrap_or("-"),
            quest.title
        );
    }
    Ok(())
}

async fn handle_quest_update(
    app: &App,
    args: QuestUpdate,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let season_id = if args.no_season {
        Some(None)
    } else {
        args.season.map(Some)
    };
    let chapter_id = if args.no_chapter {
        Some(None)
    } else {
        args.chapter.map(Some)
    };
    let quest = app
        .update_quest(
            args.id,
            QuestChanges {
                title: args.title,
                season_id,
                chapter_id,
                unlock_time: date_change(args.unlock),
                deadline: date_change(args.deadline),
                progress: args.progress,
                status: args.status.map(Into::into),
            },
            now,
        )
        .await?;
    println!("Updated quest ID: {}: {}", quest.id, quest.title);
    print_quest_status(&quest, now);
    Ok(())
}

fn print_quest_status(quest: &quest::Model, now: &DateTime<Local>) {
    println!(
        "Status: {} ({}%)",
        derive_quest_status(quest, now),
        quest.progress
    );
}

async fn handle_pause(
    app: &App,
    kind: EntityKind,
    args: PauseArgs,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    app.pause(kind, args.id, &args.reason, now).await?;
    println!("Paused {kind} ID: {}", args.id);
    Ok(())
}

async fn handle_resume(
    app: &App,
    kind: EntityKind,
    args: ResumeArgs,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    app.resume(kind, args.id, args.restore, now).await?;
    println!("Resumed {kind} ID: {}", args.id);
    Ok(())
}

async fn handle_review(
    app: &App,
    kind: EntityKind,
    args: ReviewArgs,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    app.submit_review(kind, args.id, &args.review, args.satisfaction, now)
        .await?;
    println!("Recorded review for {kind} ID: {}", args.id);
    Ok(())
}

async fn handle_task(
    app: &App,
    command: TaskCommand,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    match command {
        TaskCommand::Add(args) => handle_task_add(app, args, now).await,
        TaskCommand::List(args) => handle_task_list(app, args).await,
        TaskCommand::Done(args) => handle_task_done(app, args, now).await,
        TaskCommand::Remove(args) => handle_task_remove(app, args).await,
    }
}

async fn handle_task_add(app: &App, args: TaskAdd, now: &DateTime<Local>) -> Result<(), AppError> {
    let task = app
        .add_task(
            TaskInput {
                title: args.title,
                quest_id: args.quest,
                season_id: args.season,
            },
            now,
        )
        .await?;
    println!("Created task ID: {}: {}", task.id, task.title);
    Ok(())
}

async fn handle_task_list(app: &App, args: TaskList) -> Result<(), AppError> {
    let tasks = app.list_tasks(args.quest, args.season).await?;
    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    print_task_list(&tasks);
    Ok(())
}

async fn handle_task_done(
    app: &App,
    args: TaskDone,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let done = !args.undo;
    for id in args.ids {
        let task = app.set_task_done(id, done, now).await?;
        let label = if task.done { "done" } else { "not done" };
        println!("Task ID: {} marked {label}.", task.id);
    }
    Ok(())
}

async fn handle_task_remove(app: &App, args: TaskRemove) -> Result<(), AppError> {
    for id in args.ids {
        app.remove_task(id).await?;
        println!("Removed task ID: {id}");
    }
    Ok(())
}

async fn handle_status(
    app: &App,
    args: StatusArgs,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let views = app.status_views(now).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    if views.is_empty() {
        println!("Nothing tracked yet.");
        return Ok(());
    }
    print_status_views(&views);
    Ok(())
}

fn print_status_views(views: &[StatusView]) {
    println!(
        "{:<8} {:<4} {:<18} {:<10} {:<8} {}",
        "KIND", "ID", "STATUS", "STORED", "PROG", "TITLE"
    );
    for view in views {
        let progress = match view.ratio {
            Some(ratio) => format_ratio(ratio),
            None => format!("{}%", view.progress),
        };
        println!(
            "{:<8} {:<4} {:<18} {:<10} {:<8} {}",
            view.kind.as_str(),
            view.id,
            view.display_status.as_str(),
            view.stored_status,
            progress,
            view.title
        );
    }
}

fn print_task_list(tasks: &[task::Model]) {
    println!("{:<4} {:<5} {:<6} {:<6} {}", "ID", "DONE", "QUEST", "SEASON", "TITLE");
    let id_or_dash = |id: Option<i64>| {
        id.map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    for task in tasks {
        println!(
            "{:<4} {:<5} {:<6} {:<6} {}",
            task.id,
            if task.done { "x" } else { "" },
            id_or_dash(task.quest_id),
            id_or_dash(task.season_id),
            task.title
        );
    }
}
