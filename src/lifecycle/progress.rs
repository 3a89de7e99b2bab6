//! Progress read models.
//!
//! Quest and chapter progress is set by hand. Season progress and the chapter
//! progress bar are recomputed from the full quest list on every call, since
//! quest links change independently of their parents.

use crate::entities::{chapter, quest, season};
use crate::model::ProgressRatio;

/// Scale used for the chapter bar when no quests are linked.
pub const PERCENT_SCALE: u32 = 100;

fn clamp_percent(value: i32) -> u32 {
    value.clamp(0, 100) as u32
}

/// Rounds `numerator / denominator` half away from zero for non-negative input.
fn round_div(numerator: u64, denominator: u64) -> u64 {
    (2 * numerator + denominator) / (2 * denominator)
}

pub fn linked_quests<'a>(season_id: i64, quests: &'a [quest::Model]) -> Vec<&'a quest::Model> {
    quests
        .iter()
        .filter(|quest| quest.season_id == Some(season_id))
        .collect()
}

pub fn linked_quest_count(chapter_id: i64, quests: &[quest::Model]) -> usize {
    quests
        .iter()
        .filter(|quest| quest.chapter_id == Some(chapter_id))
        .count()
}

/// Mean progress of the quests linked to `season`, rounded to the nearest
/// integer. A season without quests is at 0.
pub fn aggregate_season_progress(season: &season::Model, quests: &[quest::Model]) -> i32 {
    let linked = linked_quests(season.id, quests);
    if linked.is_empty() {
        return 0;
    }
    let total: u64 = linked
        .iter()
        .map(|quest| u64::from(clamp_percent(quest.progress)))
        .sum();
    round_div(total, linked.len() as u64) as i32
}

/// The chapter progress bar.
///
/// With `N` linked quests the stored percentage is shown as the number of
/// quests it implies out of `N`; with none it is shown against
/// [`PERCENT_SCALE`].
pub fn chapter_progress_ratio(
    chapter: &chapter::Model,
    linked_quest_count: usize,
) -> ProgressRatio {
    let percent = clamp_percent(chapter.progress);
    if linked_quest_count == 0 {
        return ProgressRatio {
            numerator: percent,
            denominator: PERCENT_SCALE,
        };
    }
    let count = linked_quest_count as u64;
    ProgressRatio {
        numerator: round_div(u64::from(percent) * count, 100) as u32,
        denominator: linked_quest_count as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::fixtures;

    fn quests(season_id: i64, progress: &[i32]) -> Vec<quest::Model> {
        progress
            .iter()
            .enumerate()
            .map(|(idx, value)| fixtures::quest(idx as i64 + 1, Some(season_id), *value))
            .collect()
    }

    #[test]
    fn season_progress_is_mean_of_linked_quests() {
        let season = fixtures::season(1);
        assert_eq!(aggregate_season_progress(&season, &quests(1, &[20, 60, 100])), 60);
    }

    #[test]
    fn season_progress_rounds_half_up() {
        let season = fixtures::season(1);
        assert_eq!(aggregate_season_progress(&season, &quests(1, &[0, 1])), 1);
        assert_eq!(aggregate_season_progress(&season, &quests(1, &[10, 10, 11])), 10);
        assert_eq!(aggregate_season_progress(&season, &quests(1, &[33, 34])), 34);
    }

    #[test]
    fn season_without_linked_quests_is_zero() {
        let season = fixtures::season(1);
        assert_eq!(aggregate_season_progress(&season, &[]), 0);
        assert_eq!(aggregate_season_progress(&season, &quests(2, &[100, 100])), 0);

        let mut orphans = quests(1, &[80]);
        orphans[0].season_id = None;
        assert_eq!(aggregate_season_progress(&season, &orphans), 0);
    }

    #[test]
    fn season_progress_stays_within_bounds() {
        let season = fixtures::season(1);
        for values in [&[-40, 250][..], &[100; 7][..], &[0; 3][..], &[101, 99][..]] {
            let progress = aggregate_season_progress(&season, &quests(1, values));
            assert!((0..=100).contains(&progress), "{values:?} -> {progress}");
        }
    }

    #[test]
    fn chapter_ratio_scales_percentage_to_linked_quests() {
        let mut chapter = fixtures::chapter(1, 1);
        chapter.progress = 50;
        assert_eq!(
            chapter_progress_ratio(&chapter, 3),
            ProgressRatio {
                numerator: 2,
                denominator: 3
            }
        );
        chapter.progress = 33;
        assert_eq!(chapter_progress_ratio(&chapter, 3).numerator, 1);
        chapter.progress = 100;
        assert_eq!(chapter_progress_ratio(&chapter, 4).numerator, 4);
    }

    #[test]
    fn chapter_ratio_without_quests_uses_percent_scale() {
        let mut chapter = fixtures::chapter(1, 1);
        chapter.progress = 35;
        assert_eq!(
            chapter_progress_ratio(&chapter, 0),
            ProgressRatio {
                numerator: 35,
                denominator: PERCENT_SCALE
            }
        );
    }

    #[test]
    fn linked_quest_count_matches_chapter_id() {
        let mut all = quests(1, &[0, 0, 0]);
        all[0].chapter_id = Some(7);
        all[2].chapter_id = Some(7);
        assert_eq!(linked_quest_count(7, &all), 2);
        assert_eq!(linked_quest_count(8, &all), 0);
    }
}
