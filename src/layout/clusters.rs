use crate::model::{Memory, Mood, Point};

/// Memories sharing a mood, with the mean of their positions.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCluster<'a> {
    pub mood: Mood,
    pub memories: Vec<&'a Memory>,
    pub centroid: Point,
}

/// Partition `memories` by mood.
///
/// Clusters come out in [`Mood::ALL`] order, empty moods are omitted, and
/// members keep their input order.
pub fn group_by_mood<'a, I>(memories: I) -> Vec<MemoryCluster<'a>>
where
    I: IntoIterator<Item = &'a Memory>,
{
    let mut buckets: [Vec<&'a Memory>; 3] = Default::default();
    for memory in memories {
        buckets[memory.mood.index()].push(memory);
    }

    Mood::ALL
        .into_iter()
        .zip(buckets)
        .filter(|(_, members)| !members.is_empty())
        .map(|(mood, members)| {
            let centroid = centroid(&members);
            MemoryCluster {
                mood,
                memories: members,
                centroid,
            }
        })
        .collect()
}

fn centroid(members: &[&Memory]) -> Point {
    let n = members.len() as f64;
    let (sx, sy) = members
        .iter()
        .fold((0.0, 0.0), |(sx, sy), m| (sx + m.position.x, sy + m.position.y));
    Point::new(sx / n, sy / n)
}
