use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::{DisplayStatus, StorableStatus};

#[derive(Parser, Debug)]
#[command(
    name = "questline",
    version,
    about = "Track seasons, chapters and quests with SQLite"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Data directory (defaults to $QUESTLINE_HOME, then ~/.questline)"
    )]
    pub home: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "TIMESTAMP",
        help = "Evaluate as of this time: RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD"
    )]
    pub now: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Season(SeasonCommand),
    #[command(subcommand)]
    Chapter(ChapterCommand),
    #[command(subcommand)]
    Quest(QuestCommand),
    #[command(subcommand)]
    Task(TaskCommand),
    Status(StatusArgs),
}

#[derive(Subcommand, Debug)]
pub enum SeasonCommand {
    Add(SeasonAdd),
    List(SeasonList),
    Show(ShowArgs),
    Update(SeasonUpdate),
    Pause(PauseArgs),
    Resume(ResumeArgs),
    Review(ReviewArgs),
    Archive(ShowArgs),
}

#[derive(Subcommand, Debug)]
pub enum ChapterCommand {
    Add(ChapterAdd),
    List(ChapterList),
    Show(ShowArgs),
    Update(ChapterUpdate),
    Pause(PauseArgs),
    Resume(ResumeArgs),
    Review(ReviewArgs),
    Remove(ShowArgs),
}

#[derive(Subcommand, Debug)]
pub enum QuestCommand {
    Add(QuestAdd),
    List(QuestList),
    Show(ShowArgs),
    Update(QuestUpdate),
    Pause(PauseArgs),
    Resume(ResumeArgs),
    Review(ReviewArgs),
    Remove(ShowArgs),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add(TaskAdd),
    List(TaskList),
    Done(TaskDone),
    Remove(TaskRemove),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct PauseArgs {
    pub id: i64,
    #[arg(long, default_value = "")]
    pub reason: String,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    pub id: i64,
    #[arg(long, help = "Reset progress to the value captured when pausing")]
    pub restore: bool,
}

#[derive(Args, Debug)]
pub struct ReviewArgs {
    pub id: i64,
    pub review: String,
    #[arg(long, short, value_name = "1-5")]
    pub satisfaction: i32,
}

#[derive(Args, Debug)]
pub struct SeasonAdd {
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: Option<String>,
}

#[derive(Args, Debug)]
pub struct SeasonList {
    #[arg(long, help = "Include archived seasons")]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct SeasonUpdate {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Start date; empty clears it")]
    pub start: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD", help = "End date; empty clears it")]
    pub end: Option<String>,
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
}

#[derive(Args, Debug)]
pub struct ChapterAdd {
    pub season_id: i64,
    pub title: String,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub unlock: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub deadline: Option<String>,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..=100))]
    pub progress: i32,
}

#[derive(Args, Debug)]
pub struct ChapterList {
    #[arg(long, value_name = "ID")]
    pub season: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ChapterUpdate {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Unlock date; empty clears it")]
    pub unlock: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Deadline; empty clears it")]
    pub deadline: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..=100))]
    pub progress: Option<i32>,
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
}

#[derive(Args, Debug)]
pub struct QuestAdd {
    pub title: String,
    #[arg(long, value_name = "ID")]
    pub season: Option<i64>,
    #[arg(long, value_name = "ID")]
    pub chapter: Option<i64>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub unlock: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub deadline: Option<String>,
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..=100))]
    pub progress: i32,
}

#[derive(Args, Debug)]
pub struct QuestList {
    #[arg(long, value_name = "ID")]
    pub season: Option<i64>,
    #[arg(long, value_name = "ID")]
    pub chapter: Option<i64>,
    #[arg(long, value_enum, help = "Filter by displayed status")]
    pub status: Option<DisplayStatusArg>,
}

#[derive(Args, Debug)]
pub struct QuestUpdate {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, value_name = "ID", conflicts_with = "no_season")]
    pub season: Option<i64>,
    #[arg(long, help = "Detach from its season")]
    pub no_season: bool,
    #[arg(long, value_name = "ID", conflicts_with = "no_chapter")]
    pub chapter: Option<i64>,
    #[arg(long, help = "Detach from its chapter")]
    pub no_chapter: bool,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Unlock date; empty clears it")]
    pub unlock: Option<String>,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Deadline; empty clears it")]
    pub deadline: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..=100))]
    pub progress: Option<i32>,
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
}

#[derive(Args, Debug)]
pub struct TaskAdd {
    pub title: String,
    #[arg(long, value_name = "ID")]
    pub quest: Option<i64>,
    #[arg(long, value_name = "ID")]
    pub season: Option<i64>,
}

#[derive(Args, Debug)]
pub struct TaskList {
    #[arg(long, value_name = "ID")]
    pub quest: Option<i64>,
    #[arg(long, value_name = "ID")]
    pub season: Option<i64>,
}

#[derive(Args, Debug)]
pub struct TaskDone {
    #[arg(value_name = "ID", num_args = 1..)]
    pub ids: Vec<i64>,
    #[arg(long, help = "Mark as not done")]
    pub undo: bool,
}

#[derive(Args, Debug)]
pub struct TaskRemove {
    #[arg(value_name = "ID", num_args = 1..)]
    pub ids: Vec<i64>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StatusArg {
    Active,
    Paused,
    Completed,
    Locked,
}

impl From<StatusArg> for StorableStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Active => Self::Active,
            StatusArg::Paused => Self::Paused,
            StatusArg::Completed => Self::Completed,
            StatusArg::Locked => Self::Locked,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DisplayStatusArg {
    Locked,
    Active,
    Paused,
    Completed,
    OverdueUnfinished,
    OverdueCompleted,
}

impl From<DisplayStatusArg> for DisplayStatus {
    fn from(value: DisplayStatusArg) -> Self {
        match value {
            DisplayStatusArg::Locked => Self::Locked,
            DisplayStatusArg::Active => Self::Active,
            DisplayStatusArg::Paused => Self::Paused,
            DisplayStatusArg::Completed => Self::Completed,
            DisplayStatusArg::OverdueUnfinished => Self::OverdueUnfinished,
            DisplayStatusArg::OverdueCompleted => Self::OverdueCompleted,
        }
    }
}
