use crate::model::{Memory, Pattern};

use super::clusters;
use super::patterns::connections_for;

/// An edge between two stars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connection<'a> {
    pub from: &'a Memory,
    pub to: &'a Memory,
}

/// Memories ordered by creation time, oldest first.
///
/// Pattern indices are only meaningful against one of these: resolving a
/// pattern against any other ordering connects the wrong stars.
#[derive(Debug, Clone)]
pub struct SortedSnapshot<'a> {
    memories: Vec<&'a Memory>,
}

impl<'a> SortedSnapshot<'a> {
    pub fn new<I>(memories: I) -> Self
    where
        I: IntoIterator<Item = &'a Memory>,
    {
        let mut memories: Vec<&Memory> = memories.into_iter().collect();
        // Stable: equal timestamps keep their input order
        memories.sort_by_key(|m| m.created_at);
        Self { memories }
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Memory> {
        self.memories.get(index).copied()
    }

    pub fn memories(&self) -> &[&'a Memory] {
        &self.memories
    }

    /// Consecutive pairs in creation order, optionally closed back to the
    /// first star once there are at least three.
    pub fn chain(&self, close_loop: bool) -> Vec<Connection<'a>> {
        let mut out: Vec<Connection<'a>> = self
            .memories
            .windows(2)
            .map(|w| Connection { from: w[0], to: w[1] })
            .collect();

        if close_loop && self.memories.len() >= 3 {
            if let (Some(&last), Some(&first)) = (self.memories.last(), self.memories.first()) {
                out.push(Connection { from: last, to: first });
            }
        }
        out
    }

    /// Apply index pairs, skipping any that fall outside the snapshot.
    pub fn apply(&self, pairs: &[(usize, usize)]) -> Vec<Connection<'a>> {
        pairs
            .iter()
            .filter_map(|&(a, b)| {
                Some(Connection {
                    from: self.get(a)?,
                    to: self.get(b)?,
                })
            })
            .collect()
    }

    fn connect(&self, pattern: Pattern, options: ResolveOptions) -> Vec<Connection<'a>> {
        match pattern {
            Pattern::Auto => self.chain(options.close_loops),
            other => self.apply(connections_for(other)),
        }
    }
}

/// Knobs on top of the pattern and grouping choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Close `auto` chains of three or more stars into a loop.
    pub close_loops: bool,
}

/// Edges to draw for `memories` under `pattern`.
///
/// With `group_by_mood` each mood cluster is connected independently (in
/// mood order); otherwise the whole collection forms one snapshot. Duplicate
/// and self-loop edges from the pattern tables are passed through as-is.
pub fn resolve<'a, I>(pattern: Pattern, memories: I, group_by_mood: bool) -> Vec<Connection<'a>>
where
    I: IntoIterator<Item = &'a Memory>,
{
    resolve_with(pattern, memories, group_by_mood, ResolveOptions::default())
}

pub fn resolve_with<'a, I>(
    pattern: Pattern,
    memories: I,
    group_by_mood: bool,
    options: ResolveOptions,
) -> Vec<Connection<'a>>
where
    I: IntoIterator<Item = &'a Memory>,
{
    if group_by_mood {
        clusters::group_by_mood(memories)
            .into_iter()
            .flat_map(|cluster| SortedSnapshot::new(cluster.memories).connect(pattern, options))
            .collect()
    } else {
        SortedSnapshot::new(memories).connect(pattern, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstellationId, MemoryId, Mood, Point};
    use chrono::{Duration, TimeZone, Utc};

    fn memory(id: &str, mood: Mood, minute: i64) -> Memory {
        Memory {
            id: MemoryId::from(id),
            title: id.to_string(),
            image_url: String::new(),
            mood,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minute),
            position: Point::new(minute as f64 * 10.0, 0.0),
            constellation_id: ConstellationId::from("c"),
        }
    }

    fn ids(connections: &[Connection<'_>]) -> Vec<(String, String)> {
        connections
            .iter()
            .map(|c| (c.from.id.to_string(), c.to.id.to_string()))
            .collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn test_auto_ungrouped_is_single_path_in_time_order() {
        // Inserted out of order on purpose
        let memories = vec![
            memory("m3", Mood::Happy, 3),
            memory("m1", Mood::Happy, 1),
            memory("m4", Mood::Calm, 4),
            memory("m2", Mood::Nostalgic, 2),
        ];

        let connections = resolve(Pattern::Auto, &memories, false);
        assert_eq!(connections.len(), memories.len() - 1);
        assert_eq!(
            ids(&connections),
            vec![pair("m1", "m2"), pair("m2", "m3"), pair("m3", "m4")]
        );
    }

    #[test]
    fn test_trip_scenario() {
        let memories = vec![
            memory("m1", Mood::Happy, 1),
            memory("m2", Mood::Calm, 2),
            memory("m3", Mood::Happy, 3),
        ];

        assert_eq!(
            ids(&resolve(Pattern::Auto, &memories, false)),
            vec![pair("m1", "m2"), pair("m2", "m3")]
        );
        assert_eq!(
            ids(&resolve(Pattern::Auto, &memories, true)),
            vec![pair("m1", "m3")]
        );
    }

    #[test]
    fn test_small_collections_have_no_edges() {
        assert!(resolve(Pattern::Auto, &Vec::<Memory>::new(), false).is_empty());
        let one = vec![memory("solo", Mood::Calm, 0)];
        assert!(resolve(Pattern::Auto, &one, true).is_empty());
        assert!(resolve(Pattern::Orion, &one, false).is_empty());
    }

    #[test]
    fn test_pattern_pairs_stay_in_range() {
        let memories: Vec<Memory> = (0..5)
            .map(|i| memory(&format!("m{}", i), Mood::ALL[i as usize % 3], i))
            .collect();

        for pattern in Pattern::ALL {
            for grouped in [false, true] {
                for c in resolve(pattern, &memories, grouped) {
                    assert!(memories.iter().any(|m| std::ptr::eq(m, c.from)));
                    assert!(memories.iter().any(|m| std::ptr::eq(m, c.to)));
                }
            }
        }
    }

    #[test]
    fn test_pattern_skips_out_of_range_pairs_and_keeps_order() {
        let memories: Vec<Memory> = (0..4)
            .map(|i| memory(&format!("m{}", i), Mood::Happy, i))
            .collect();

        // Taurus: (0,1) (1,2) (2,3) (3,4) (2,5) (5,6); only the first three fit
        assert_eq!(
            ids(&resolve(Pattern::Taurus, &memories, false)),
            vec![pair("m0", "m1"), pair("m1", "m2"), pair("m2", "m3")]
        );
    }

    #[test]
    fn test_cyclic_pattern_keeps_closing_edge() {
        let memories: Vec<Memory> = (0..4)
            .map(|i| memory(&format!("m{}", i), Mood::Calm, i))
            .collect();

        let libra = ids(&resolve(Pattern::Libra, &memories, false));
        assert_eq!(libra.last(), Some(&pair("m3", "m0")));
    }

    #[test]
    fn test_close_loops_is_opt_in() {
        let memories: Vec<Memory> = (0..3)
            .map(|i| memory(&format!("m{}", i), Mood::Happy, i))
            .collect();

        assert_eq!(resolve(Pattern::Auto, &memories, true).len(), 2);

        let closed = resolve_with(
            Pattern::Auto,
            &memories,
            true,
            ResolveOptions { close_loops: true },
        );
        assert_eq!(
            ids(&closed),
            vec![pair("m0", "m1"), pair("m1", "m2"), pair("m2", "m0")]
        );

        let two = &memories[..2];
        let closed_two = resolve_with(Pattern::Auto, two, false, ResolveOptions { close_loops: true });
        assert_eq!(closed_two.len(), 1);
    }

    #[test]
    fn test_grouped_patterns_restart_indices_per_cluster() {
        let memories = vec![
            memory("h0", Mood::Happy, 0),
            memory("c0", Mood::Calm, 1),
            memory("h1", Mood::Happy, 2),
            memory("c1", Mood::Calm, 3),
        ];

        assert_eq!(
            ids(&resolve(Pattern::Aries, &memories, true)),
            vec![pair("h0", "h1"), pair("c0", "c1")]
        );
    }
}
