use chrono::{DateTime, Local, Utc};

use crate::app::MAX_SATISFACTION;
use crate::entities::{chapter, quest, season, task};
use crate::lifecycle::pause::PauseInfo;
use crate::lifecycle::progress::{
    aggregate_season_progress, chapter_progress_ratio, linked_quest_count,
};
use crate::lifecycle::status::{derive_chapter_status, derive_quest_status, derive_season_status};
use crate::model::{DisplayStatus, ProgressRatio};

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_ratio(ratio: ProgressRatio) -> String {
    format!("{}/{}", ratio.numerator, ratio.denominator)
}

fn push_dates(
    output: &mut String,
    labels: (&str, &str),
    unlock: &Option<String>,
    deadline: &Option<String>,
    status: DisplayStatus,
) {
    if let Some(unlock) = unlock.as_deref() {
        output.push_str(&format!("{}: {unlock}\n", labels.0));
    }
    if let Some(deadline) = deadline.as_deref() {
        let passed = if status.is_overdue() { " (passed)" } else { "" };
        output.push_str(&format!("{}: {deadline}{passed}\n", labels.1));
    }
}

fn push_lifecycle(
    output: &mut String,
    completed_at: &Option<String>,
    pause: Option<PauseInfo>,
    review: &Option<String>,
    satisfaction: Option<i32>,
) {
    if let Some(completed_at) = completed_at.as_deref() {
        output.push_str(&format!("Completed: {completed_at}\n"));
    }
    if let Some(pause) = pause {
        output.push_str(&format!(
            "Paused: {} (progress {}%)\n",
            pause.paused_at, pause.progress_snapshot
        ));
        if !pause.reason.is_empty() {
            output.push_str(&format!("Pause Reason: {}\n", pause.reason));
        }
    }
    if has_text(review) {
        output.push_str(&format!("Review: {}\n", review.as_deref().unwrap_or("")));
    }
    if let Some(score) = satisfaction {
        output.push_str(&format!("Satisfaction: {score}/{MAX_SATISFACTION}\n"));
    }
}

fn push_tasks(output: &mut String, tasks: &[&task::Model]) {
    if tasks.is_empty() {
        return;
    }
    output.push_str("\nTasks:\n");
    for task in tasks {
        let mark = if task.done { "x" } else { " " };
        output.push_str(&format!("- [{mark}] {} (task id {})\n", task.title, task.id));
    }
}

pub fn format_season_detail(
    season: &season::Model,
    chapters: &[chapter::Model],
    quests: &[quest::Model],
    tasks: &[task::Model],
    now: &DateTime<Local>,
) -> String {
    let mut output = String::new();
    output.push_str(&format!("Season ID: {}\n", season.id));
    output.push_str(&format!("Title: {}\n", season.title));
    if has_text(&season.description) {
        output.push_str(&format!(
            "Description: {}\n",
            season.description.as_deref().unwrap_or("")
        ));
    }
    let status = derive_season_status(season, quests, now);
    output.push_str(&format!("Status: {status} (stored {})\n", season.status));
    output.push_str(&format!(
        "Progress: {}%\n",
        aggregate_season_progress(season, quests)
    ));
    push_dates(
        &mut output,
        ("Start", "End"),
        &season.start_date,
        &season.end_date,
        status,
    );
    push_lifecycle(
        &mut output,
        &season.completed_at,
        PauseInfo::from_columns(
            season.pause_reason.as_deref(),
            season.paused_at.as_deref(),
            season.pause_progress,
        ),
        &season.review,
        season.review_satisfaction,
    );
    if let Some(archived_at) = season.archived_at {
        output.push_str(&format!("Archived: {}\n", format_datetime(archived_at)));
    }
    output.push_str(&format!("Created: {}\n", format_datetime(season.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(season.updated_at)));

    let season_chapters: Vec<&chapter::Model> = chapters
        .iter()
        .filter(|chapter| chapter.season_id == season.id)
        .collect();
    output.push('\n');
    if season_chapters.is_empty() {
        output.push_str("Chapters: (none)\n");
    } else {
        output.push_str("Chapters:\n");
        for chapter in season_chapters {
            let ratio = chapter_progress_ratio(chapter, linked_quest_count(chapter.id, quests));
            output.push_str(&format!(
                "- [{}] {} (chapter id {}, {})\n",
                derive_chapter_status(chapter, now),
                chapter.title,
                chapter.id,
                format_ratio(ratio)
            ));
        }
    }

    let season_quests: Vec<&quest::Model> = quests
        .iter()
        .filter(|quest| quest.season_id == Some(season.id))
        .collect();
    if season_quests.is_empty() {
        output.push_str("Quests: (none)\n");
    } else {
        output.push_str("Quests:\n");
        for quest in season_quests {
            output.push_str(&format!(
                "- [{}] {} (quest id {}, {}%)\n",
                derive_quest_status(quest, now),
                quest.title,
                quest.id,
                quest.progress
            ));
        }
    }
    let season_tasks: Vec<&task::Model> = tasks
        .iter()
        .filter(|task| task.season_id == Some(season.id))
        .collect();
    push_tasks(&mut output, &season_tasks);
    output.trim_end().to_string()
}

pub fn format_chapter_detail(
    chapter: &chapter::Model,
    quests: &[quest::Model],
    now: &DateTime<Local>,
) -> String {
    let linked: Vec<&quest::Model> = quests
        .iter()
        .filter(|quest| quest.chapter_id == Some(chapter.id))
        .collect();
    let ratio = chapter_progress_ratio(chapter, linked.len());

    let mut output = String::new();
    output.push_str(&format!("Chapter ID: {}\n", chapter.id));
    output.push_str(&format!("Season ID: {}\n", chapter.season_id));
    output.push_str(&format!("Title: {}\n", chapter.title));
    let status = derive_chapter_status(chapter, now);
    output.push_str(&format!("Status: {status} (stored {})\n", chapter.status));
    output.push_str(&format!(
        "Progress: {}% ({})\n",
        chapter.progress,
        format_ratio(ratio)
    ));
    push_dates(
        &mut output,
        ("Unlock", "Deadline"),
        &chapter.unlock_time,
        &chapter.deadline,
        status,
    );
    push_lifecycle(
        &mut output,
        &chapter.completed_at,
        PauseInfo::from_columns(
            chapter.pause_reason.as_deref(),
            chapter.paused_at.as_deref(),
            chapter.pause_progress,
        ),
        &chapter.review,
        chapter.review_satisfaction,
    );
    output.push_str(&format!("Created: {}\n", format_datetime(chapter.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(chapter.updated_at)));
    output.push('\n');
    if linked.is_empty() {
        output.push_str("Quests: (none)");
        return output;
    }
    output.push_str("Quests:\n");
    for quest in linked {
        output.push_str(&format!(
            "- [{}] {} (quest id {}, {}%)\n",
            derive_quest_status(quest, now),
            quest.title,
            quest.id,
            quest.progress
        ));
    }
    output.trim_end().to_string()
}

pub fn format_quest_detail(
    quest: &quest::Model,
    tasks: &[task::Model],
    now: &DateTime<Local>,
) -> String {
    let mut output = String::new();
    output.push_str(&format!("Quest ID: {}\n", quest.id));
    if let Some(season_id) = quest.season_id {
        output.push_str(&format!("Season ID: {season_id}\n"));
    }
    if let Some(chapter_id) = quest.chapter_id {
        output.push_str(&format!("Chapter ID: {chapter_id}\n"));
    }
    output.push_str(&format!("Title: {}\n", quest.title));
    let status = derive_quest_status(quest, now);
    output.push_str(&format!("Status: {status} (stored {})\n", quest.status));
    output.push_str(&format!("Progress: {}%\n", quest.progress));
    push_dates(
        &mut output,
        ("Unlock", "Deadline"),
        &quest.unlock_time,
        &quest.deadline,
        status,
    );
    push_lifecycle(
        &mut output,
        &quest.completed_at,
        PauseInfo::from_columns(
            quest.pause_reason.as_deref(),
            quest.paused_at.as_deref(),
            quest.pause_progress,
        ),
        &quest.review,
        quest.review_satisfaction,
    );
    output.push_str(&format!("Created: {}\n", format_datetime(quest.created_at)));
    output.push_str(&format!("Updated: {}\n", format_datetime(quest.updated_at)));
    let quest_tasks: Vec<&task::Model> = tasks
        .iter()
        .filter(|task| task.quest_id == Some(quest.id))
        .collect();
    push_tasks(&mut output, &quest_tasks);
    output.trim_end().to_string()
}
