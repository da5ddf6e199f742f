//! Summary figures and the timeline ordering shown alongside a constellation.

use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;

use crate::model::{Memory, Mood};

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStats<'a> {
    pub total: usize,
    /// Counts in [`Mood::ALL`] order, zero entries included
    pub mood_counts: [(Mood, usize); 3],
    /// Most frequent mood; ties go to the mood seen first in the collection
    pub dominant_mood: Option<Mood>,
    /// Memories per `YYYY-MM`, oldest month first
    pub by_month: BTreeMap<String, usize>,
    pub most_active_month: Option<(String, usize)>,
    pub first: Option<&'a Memory>,
    pub last: Option<&'a Memory>,
    /// Days from first to last memory, a started day counting as one
    pub days_spanned: i64,
}

impl<'a> MemoryStats<'a> {
    pub fn compute(memories: &'a [Memory]) -> Self {
        let mut mood_counts = Mood::ALL.map(|m| (m, 0usize));
        let mut by_month: BTreeMap<String, usize> = BTreeMap::new();

        let mut seen: Vec<Mood> = Vec::with_capacity(Mood::ALL.len());

        for memory in memories {
            mood_counts[memory.mood.index()].1 += 1;
            if !seen.contains(&memory.mood) {
                seen.push(memory.mood);
            }
            *by_month.entry(month_key(&memory.created_at)).or_default() += 1;
        }

        let dominant_mood = seen
            .into_iter()
            .fold(None::<(Mood, usize)>, |best, mood| {
                let count = mood_counts[mood.index()].1;
                match best {
                    Some((_, best_count)) if best_count >= count => best,
                    _ => Some((mood, count)),
                }
            })
            .map(|(mood, _)| mood);

        let most_active_month = by_month
            .iter()
            .fold(None::<(&String, usize)>, |best, (month, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((month, count)),
            })
            .map(|(month, count)| (month.clone(), count));

        let first = memories.iter().min_by_key(|m| m.created_at);
        let last = memories.iter().max_by_key(|m| m.created_at);
        let days_spanned = match (first, last) {
            (Some(f), Some(l)) => {
                let millis = (l.created_at - f.created_at).num_milliseconds();
                (millis + MILLIS_PER_DAY - 1).div_euclid(MILLIS_PER_DAY)
            }
            _ => 0,
        };

        Self {
            total: memories.len(),
            mood_counts,
            dominant_mood,
            by_month,
            most_active_month,
            first,
            last,
            days_spanned,
        }
    }

    pub fn count(&self, mood: Mood) -> usize {
        self.mood_counts[mood.index()].1
    }

    /// Share of `mood` in percent; 0 for an empty collection.
    pub fn percentage(&self, mood: Mood) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(mood) as f64 * 100.0 / self.total as f64
    }
}

fn month_key(at: &DateTime<Utc>) -> String {
    format!("{}-{:02}", at.year(), at.month())
}

/// Memories newest first.
pub fn timeline(memories: &[Memory]) -> Vec<&Memory> {
    let mut sorted: Vec<&Memory> = memories.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}
