use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

const MARCH_1: &str = "2025-03-01T12:00:00";
const MARCH_10: &str = "2025-03-10T12:00:00";

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_questline"))
}

fn run_at(home: &Path, now: &str, args: &[&str]) -> Output {
    Command::new(bin_path())
        .arg("--home")
        .arg(home)
        .arg("--now")
        .arg(now)
        .args(args)
        .env_remove("QUESTLINE_HOME")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("run command")
}

fn output_stdout(output: Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("stdout utf8")
}

fn output_stderr(output: Output) -> String {
    assert!(!output.status.success(), "command unexpectedly succeeded");
    String::from_utf8(output.stderr).expect("stderr utf8")
}

fn parse_created_id(stdout: &str, kind: &str) -> i64 {
    let prefix = format!("Created {kind} ID: ");
    let line = stdout
        .lines()
        .find(|line| line.starts_with(&prefix))
        .expect("created line");
    let rest = line.strip_prefix(&prefix).expect("created prefix");
    let id_str = rest.split(':').next().expect("created id");
    id_str.trim().parse().expect("created id parse")
}

fn create(home: &Path, now: &str, kind: &str, args: &[&str]) -> i64 {
    let mut full = vec![kind, "add"];
    full.extend_from_slice(args);
    let stdout = output_stdout(run_at(home, now, &full));
    parse_created_id(&stdout, kind)
}

fn status_json(home: &Path, now: &str) -> Vec<Value> {
    let stdout = output_stdout(run_at(home, now, &["status", "--json"]));
    let value: Value = serde_json::from_str(&stdout).expect("status json");
    value.as_array().expect("status array").clone()
}

fn find_view<'a>(views: &'a [Value], kind: &str, id: i64) -> &'a Value {
    views
        .iter()
        .find(|view| view["kind"] == kind && view["id"] == id)
        .expect("status row")
}

#[test]
fn completing_a_quest_prompts_for_review_once() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["Write draft"]);
    let id = quest_id.to_string();

    let stdout = output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "update", &id, "--progress", "100"],
    ));
    assert!(stdout.contains("Status: completed (100%)"));
    assert!(stdout.contains(&format!("Quest ID: {quest_id} (Write draft) is complete.")));
    assert!(stdout.contains(&format!("questline quest review {quest_id}")));

    let stdout = output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "update", &id, "--title", "Write final draft"],
    ));
    assert!(!stdout.contains("is complete."));
}

#[test]
fn overdue_is_displayed_but_never_stored() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["File taxes", "--deadline", "2025-03-05"]);

    output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "update", &quest_id.to_string(), "--progress", "40"],
    ));

    let views = status_json(home, MARCH_10);
    let view = find_view(&views, "quest", quest_id);
    assert_eq!(view["display_status"], "overdue_unfinished");
    assert_eq!(view["stored_status"], "active");
    assert_eq!(view["progress"], 40);

    let stdout = output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "list", "--status", "overdue-unfinished"],
    ));
    assert!(stdout.contains("File taxes"));
}

#[test]
fn late_completion_shows_overdue_completed() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["Report", "--deadline", "2025-03-05"]);

    let stdout = output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "update", &quest_id.to_string(), "--progress", "100"],
    ));
    assert!(stdout.contains("Status: overdue_completed"));
    assert!(stdout.contains("is complete."));

    let views = status_json(home, MARCH_10);
    let view = find_view(&views, "quest", quest_id);
    assert_eq!(view["stored_status"], "completed");
}

#[test]
fn chapter_ratio_counts_linked_quests() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let season_id = create(home, MARCH_1, "season", &["Spring"]);
    let season = season_id.to_string();
    let chapter_id = create(
        home,
        MARCH_1,
        "chapter",
        &[&season, "Foundations", "--progress", "50"],
    );
    let chapter = chapter_id.to_string();
    for title in ["One", "Two", "Three", "Four"] {
        create(home, MARCH_1, "quest", &[title, "--chapter", &chapter]);
    }

    let views = status_json(home, MARCH_1);
    let view = find_view(&views, "chapter", chapter_id);
    assert_eq!(view["ratio"]["numerator"], 2);
    assert_eq!(view["ratio"]["denominator"], 4);
    assert_eq!(view["parent_id"], season_id);

    let stdout = output_stdout(run_at(home, MARCH_1, &["chapter", "show", &chapter]));
    assert!(stdout.contains("Progress: 50% (2/4)"));
}

#[test]
fn season_completion_prompt_wins_over_its_quest() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let season_id = create(home, MARCH_1, "season", &["Sprint"]);
    let season = season_id.to_string();
    let quest_id = create(home, MARCH_1, "quest", &["Only quest", "--season", &season]);

    let stdout = output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "update", &quest_id.to_string(), "--progress", "100"],
    ));
    assert!(stdout.contains(&format!("Season ID: {season_id} (Sprint) is complete.")));
    assert!(!stdout.contains("Quest ID:"));

    let views = status_json(home, MARCH_10);
    let view = find_view(&views, "season", season_id);
    assert_eq!(view["display_status"], "completed");
    assert_eq!(view["progress"], 100);
}

#[test]
fn pause_and_resume_restore_progress() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["Garden", "--progress", "20"]);
    let id = quest_id.to_string();

    let stdout = output_stdout(run_at(
        home,
        MARCH_1,
        &["quest", "pause", &id, "--reason", "winter"],
    ));
    assert!(stdout.contains(&format!("Paused quest ID: {quest_id}")));

    output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "update", &id, "--progress", "70"],
    ));
    let stdout = output_stdout(run_at(home, MARCH_10, &["quest", "show", &id]));
    assert!(stdout.contains("Status: paused (stored paused)"));
    assert!(stdout.contains("Pause Reason: winter"));
    assert!(stdout.contains("(progress 20%)"));

    output_stdout(run_at(home, MARCH_10, &["quest", "resume", &id, "--restore"]));
    let stdout = output_stdout(run_at(home, MARCH_10, &["quest", "show", &id]));
    assert!(stdout.contains("Status: active (stored active)"));
    assert!(stdout.contains("Progress: 20%"));
    assert!(!stdout.contains("Pause Reason"));

    let stderr = output_stderr(run_at(home, MARCH_10, &["quest", "resume", &id]));
    assert!(stderr.contains("is not paused"));
}

#[test]
fn review_is_recorded_for_completed_quest() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["Read book", "--progress", "100"]);
    let id = quest_id.to_string();

    let stdout = output_stdout(run_at(
        home,
        MARCH_10,
        &["quest", "review", &id, "Worth it", "--satisfaction", "4"],
    ));
    assert!(stdout.contains(&format!("Recorded review for quest ID: {quest_id}")));

    let stdout = output_stdout(run_at(home, MARCH_10, &["quest", "show", &id]));
    assert!(stdout.contains("Review: Worth it"));
    assert!(stdout.contains("Satisfaction: 4/5"));

    let stderr = output_stderr(run_at(
        home,
        MARCH_10,
        &["quest", "review", &id, "Again", "--satisfaction", "9"],
    ));
    assert!(stderr.contains("satisfaction"));
}

#[test]
fn locked_quest_refuses_progress_until_unlocked() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let stdout = output_stdout(run_at(
        home,
        MARCH_1,
        &["quest", "add", "Later", "--unlock", "2025-03-05"],
    ));
    assert!(stdout.contains("Status: locked"));
    let id = parse_created_id(&stdout, "quest").to_string();

    let stderr = output_stderr(run_at(
        home,
        MARCH_1,
        &["quest", "update", &id, "--progress", "10"],
    ));
    assert!(stderr.contains("locked"));

    let stdout = output_stdout(run_at(
        home,
        "2025-03-05",
        &["quest", "update", &id, "--progress", "10"],
    ));
    assert!(stdout.contains("Status: active (10%)"));
}

#[test]
fn invalid_input_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();

    let stderr = output_stderr(run_at(
        home,
        MARCH_1,
        &["quest", "add", "Bad", "--deadline", "2025-3-5"],
    ));
    assert!(stderr.contains("YYYY-MM-DD"));

    let stderr = output_stderr(run_at(
        home,
        MARCH_1,
        &["quest", "add", "Too much", "--progress", "150"],
    ));
    assert!(stderr.contains("150"));

    let stderr = output_stderr(run_at(home, "yesterday", &["status"]));
    assert!(stderr.contains("--now"));

    let stderr = output_stderr(run_at(home, MARCH_1, &["quest", "show", "99"]));
    assert!(stderr.contains("Not found: quest id 99"));
}

#[test]
fn empty_date_clears_deadline() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["Tidy", "--deadline", "2025-03-05"]);
    let id = quest_id.to_string();

    output_stdout(run_at(home, MARCH_10, &["quest", "update", &id, "--deadline", ""]));
    let stdout = output_stdout(run_at(home, MARCH_10, &["quest", "show", &id]));
    assert!(!stdout.contains("Deadline:"));
    assert!(stdout.contains("Status: active"));
}

#[test]
fn archived_season_moves_to_history() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let season_id = create(home, MARCH_1, "season", &["Winter"]);
    let season = season_id.to_string();

    output_stdout(run_at(home, MARCH_10, &["season", "archive", &season]));
    let stdout = output_stdout(run_at(home, MARCH_10, &["season", "list"]));
    assert!(stdout.contains("No seasons found."));
    let stdout = output_stdout(run_at(home, MARCH_10, &["season", "list", "--all"]));
    assert!(stdout.contains("archived"));
    assert!(stdout.contains("Winter"));
    let stdout = output_stdout(run_at(home, MARCH_10, &["season", "show", &season]));
    assert!(stdout.contains("Title: Winter"));
    assert!(stdout.contains("Archived: "));

    let stderr = output_stderr(run_at(
        home,
        MARCH_10,
        &["chapter", "add", &season, "Too late"],
    ));
    assert!(stderr.contains("archived"));
}

#[test]
fn removing_chapter_keeps_its_quests() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let season_id = create(home, MARCH_1, "season", &["Spring"]);
    let chapter_id = create(home, MARCH_1, "chapter", &[&season_id.to_string(), "Act I"]);
    let chapter = chapter_id.to_string();
    create(home, MARCH_1, "quest", &["Orphan", "--chapter", &chapter]);

    output_stdout(run_at(home, MARCH_1, &["chapter", "remove", &chapter]));
    let stdout = output_stdout(run_at(home, MARCH_1, &["quest", "list"]));
    assert!(stdout.contains("Orphan"));
    let views = status_json(home, MARCH_1);
    assert_eq!(views.len(), 2);
}

#[test]
fn tasks_attach_to_quests() {
    let dir = TempDir::new().expect("temp dir");
    let home = dir.path();
    let quest_id = create(home, MARCH_1, "quest", &["Move house"]);
    let quest = quest_id.to_string();
    let task_id = create(home, MARCH_1, "task", &["Book van", "--quest", &quest]);

    let stdout = output_stdout(run_at(home, MARCH_1, &["task", "done", &task_id.to_string()]));
    assert!(stdout.contains(&format!("Task ID: {task_id} marked done.")));

    let stdout = output_stdout(run_at(home, MARCH_1, &["quest", "show", &quest]));
    assert!(stdout.contains(&format!("- [x] Book van (task id {task_id})")));

    output_stdout(run_at(home, MARCH_1, &["task", "remove", &task_id.to_string()]));
    let stdout = output_stdout(run_at(home, MARCH_1, &["task", "list"]));
    assert!(stdout.contains("No tasks found."));
}

#[test]
fn data_dir_comes_from_environment() {
    let dir = TempDir::new().expect("temp dir");
    let output = Command::new(bin_path())
        .args(["--now", MARCH_1, "season", "add", "Env"])
        .env("QUESTLINE_HOME", dir.path())
        .output()
        .expect("run command");
    let stdout = output_stdout(output);
    assert_eq!(parse_created_id(&stdout, "season"), 1);
    assert!(dir.path().join("questline.db").exists());
}
