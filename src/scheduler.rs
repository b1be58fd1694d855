use std::collections::HashSet;

use anyhow::Context;
use chrono::{Days, NaiveDate};
use log::{error, info};
use serde::Serialize;

use crate::date_range::DateRange;
use crate::progress::{ProgressState, ProgressStore};

/// Splits `[Jan 1 start_year, Dec 31 end_year]` into contiguous chunks of at
/// most `max_days` days, in ascending order.
pub fn partition(start_year: i32, end_year: i32, max_days: u32) -> anyhow::Result<Vec<DateRange>> {
    anyhow::ensure!(max_days > 0, "max days per chunk must be positive");
    anyhow::ensure!(
        start_year <= end_year,
        "start year {start_year} is after end year {end_year}"
    );
    let first = NaiveDate::from_ymd_opt(start_year, 1, 1)
        .with_context(|| format!("year {start_year} is out of range"))?;
    let last = NaiveDate::from_ymd_opt(end_year, 12, 31)
        .with_context(|| format!("year {end_year} is out of range"))?;

    let mut chunks = vec![];
    let mut current = first;
    loop {
        let chunk_end = current
            .checked_add_days(Days::new(u64::from(max_days) - 1))
            .map_or(last, |end| end.min(last));
        chunks.push(DateRange::new(current, chunk_end)?);
        match chunk_end.succ_opt() {
            Some(next) if next <= last => current = next,
            _ => break,
        }
    }
    Ok(chunks)
}

/// Chunks not yet completed, in partition order, followed by the failed
/// ranges queued for a whole-range retry. Nothing is yielded twice.
pub fn remaining(all_chunks: &[DateRange], progress: &ProgressState) -> Vec<DateRange> {
    let failed: HashSet<&DateRange> = progress.failed.iter().collect();
    let mut work: Vec<DateRange> = all_chunks
        .iter()
        .filter(|range| !progress.is_completed(range) && !failed.contains(range))
        .copied()
        .collect();
    work.extend(
        progress
            .failed
            .iter()
            .filter(|range| !progress.is_completed(range))
            .copied(),
    );
    work
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub total_ranges: usize,
    pub completed: usize,
    pub failed: usize,
    pub remaining: usize,
    pub completion_percentage: f64,
    pub date_span: String,
    pub max_days_per_range: u32,
}

/// The configured span plus its durable progress.
pub struct RangeScheduler {
    start_year: i32,
    end_year: i32,
    max_days: u32,
    store: ProgressStore,
}

impl RangeScheduler {
    pub fn new(start_year: i32, end_year: i32, max_days: u32, store: ProgressStore) -> Self {
        Self {
            start_year,
            end_year,
            max_days,
            store,
        }
    }

    pub fn all_ranges(&self) -> anyhow::Result<Vec<DateRange>> {
        partition(self.start_year, self.end_year, self.max_days)
    }

    /// Loads progress and returns it together with the work still to do.
    pub fn plan(&self) -> anyhow::Result<(ProgressState, Vec<DateRange>)> {
        let progress = self.store.load();
        let work = remaining(&self.all_ranges()?, &progress);
        Ok((progress, work))
    }

    pub fn summary(&self) -> anyhow::Result<ProgressSummary> {
        let all = self.all_ranges()?;
        let progress = self.store.load();
        let in_span: HashSet<&DateRange> = all.iter().collect();
        let completed = progress
            .completed
            .iter()
            .filter(|r| in_span.contains(r))
            .count();
        let total = all.len();
        Ok(ProgressSummary {
            total_ranges: total,
            completed,
            failed: progress.failed.len(),
            remaining: remaining(&all, &progress).len(),
            completion_percentage: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            date_span: format!("{} to {}", self.start_year, self.end_year),
            max_days_per_range: self.max_days,
        })
    }

    pub fn reset(&self) -> anyhow::Result<()> {
        self.store.reset()
    }

    pub fn checkpointer(&self, progress: ProgressState, every: usize) -> Checkpointer {
        Checkpointer {
            store: self.store.clone(),
            progress,
            every: every.max(1),
            since_save: 0,
        }
    }
}

/// Records range outcomes and persists them every `every` ranges, so a
/// crash loses at most that many ranges of finished work.
pub struct Checkpointer {
    store: ProgressStore,
    progress: ProgressState,
    every: usize,
    since_save: usize,
}

impl Checkpointer {
    pub fn record_completed(&mut self, range: DateRange) {
        self.progress.mark_completed(range);
        self.tick();
    }

    pub fn record_failed(&mut self, range: DateRange) {
        self.progress.mark_failed(range);
        self.tick();
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    fn tick(&mut self) {
        self.since_save += 1;
        if self.since_save >= self.every {
            self.save();
        }
    }

    fn save(&mut self) {
        match self.store.save(&self.progress) {
            Ok(()) => {
                info!(
                    "Checkpoint saved: {} completed, {} failed",
                    self.progress.completed.len(),
                    self.progress.failed.len()
                );
                self.since_save = 0;
            }
            Err(e) => error!("Failed to save progress checkpoint: {e:#}"),
        }
    }

    /// Unconditional final save, on normal completion and on interrupt.
    pub fn finish(self) -> anyhow::Result<ProgressState> {
        self.store.save(&self.progress)?;
        Ok(self.progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(chunks: &[DateRange], start_year: i32, end_year: i32, max_days: u32) {
        assert_eq!(
            chunks.first().unwrap().start(),
            NaiveDate::from_ymd_opt(start_year, 1, 1).unwrap()
        );
        assert_eq!(
            chunks.last().unwrap().end(),
            NaiveDate::from_ymd_opt(end_year, 12, 31).unwrap()
        );
        for chunk in chunks {
            assert!(chunk.days() >= 1 && chunk.days() <= i64::from(max_days));
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end().succ_opt().unwrap(), pair[1].start());
        }
        let covered: i64 = chunks.iter().map(DateRange::days).sum();
        let span = (NaiveDate::from_ymd_opt(end_year, 12, 31).unwrap()
            - NaiveDate::from_ymd_opt(start_year, 1, 1).unwrap())
        .num_days()
            + 1;
        assert_eq!(covered, span);
    }

    #[test]
    fn partitions_cover_span_exactly_once() {
        for &(start, end, days) in &[
            (2020, 2021, 30),
            (2004, 2024, 30),
            (2019, 2020, 1),
            (2000, 2003, 7),
            (2021, 2022, 365),
            (2021, 2022, 1000),
        ] {
            let chunks = partition(start, end, days).unwrap();
            assert_exact_cover(&chunks, start, end, days);
        }
    }

    #[test]
    fn leap_year_span_has_expected_chunk_count() {
        // 2020 + 2021 = 731 days -> 24 full chunks and one of 11 days.
        let chunks = partition(2020, 2021, 30).unwrap();
        assert_eq!(chunks.len(), 25);
        assert_eq!(chunks.last().unwrap().days(), 11);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(partition(2021, 2020, 30).is_err());
        assert!(partition(2020, 2021, 0).is_err());
    }

    #[test]
    fn remaining_is_idempotent() {
        let all = partition(2020, 2021, 30).unwrap();
        let mut progress = ProgressState::default();
        progress.mark_completed(all[0]);
        progress.mark_failed(all[3]);
        assert_eq!(remaining(&all, &progress), remaining(&all, &progress));
    }

    #[test]
    fn remaining_skips_completed_and_replays_failed_last() {
        let all = partition(2020, 2021, 30).unwrap();
        let mut progress = ProgressState::default();
        for range in &all[..5] {
            progress.mark_completed(*range);
        }
        progress.mark_failed(all[7]);

        let work = remaining(&all, &progress);
        assert_eq!(work.len(), all.len() - 5);
        assert_eq!(work[0], all[5]);
        assert_eq!(work[1], all[6]);
        assert_eq!(work[2], all[8]);
        assert_eq!(*work.last().unwrap(), all[7]);
        let fresh: Vec<_> = work[..work.len() - 1].to_vec();
        let mut sorted = fresh.clone();
        sorted.sort();
        assert_eq!(fresh, sorted);
    }

    #[test]
    fn failed_range_outside_span_is_still_retried_whole() {
        let all = partition(2021, 2021, 30).unwrap();
        let foreign = DateRange::new(
            NaiveDate::from_ymd_opt(2015, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2015, 4, 20).unwrap(),
        )
        .unwrap();
        let mut progress = ProgressState::default();
        progress.mark_failed(foreign);
        let work = remaining(&all, &progress);
        assert_eq!(work.len(), all.len() + 1);
        assert_eq!(*work.last().unwrap(), foreign);
    }

    #[test]
    fn checkpointer_saves_every_n_and_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let scheduler = RangeScheduler::new(2020, 2020, 30, store.clone());
        let (progress, work) = scheduler.plan().unwrap();
        let mut checkpointer = scheduler.checkpointer(progress, 2);

        checkpointer.record_completed(work[0]);
        assert!(!store.path().exists());
        checkpointer.record_failed(work[1]);
        assert_eq!(store.load().completed.len(), 1);
        checkpointer.record_completed(work[2]);
        assert_eq!(store.load().completed.len(), 1);

        let final_state = checkpointer.finish().unwrap();
        assert_eq!(store.load(), final_state);
        assert_eq!(final_state.completed.len(), 2);

        let (_, resumed) = scheduler.plan().unwrap();
        assert_eq!(resumed.len(), work.len() - 2);
        assert_eq!(*resumed.last().unwrap(), work[1]);
    }

    #[test]
    fn summary_reports_percentage() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let scheduler = RangeScheduler::new(2020, 2020, 183, store.clone());
        let all = scheduler.all_ranges().unwrap();
        assert_eq!(all.len(), 2);
        let mut state = ProgressState::default();
        state.mark_completed(all[0]);
        store.save(&state).unwrap();

        let summary = scheduler.summary().unwrap();
        assert_eq!(summary.total_ranges, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.remaining, 1);
        assert!((summary.completion_percentage - 50.0).abs() < f64::EPSILON);
    }
}
