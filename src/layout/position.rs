use rand::Rng;

use crate::config::{LayoutConfig, ViewportConfig};
use crate::model::Point;

/// Outcome of a placement run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub point: Point,
    /// Samples drawn, in `1..=max_attempts`
    pub attempts: u32,
    /// Whether `point` clears every existing position by `min_distance`
    pub separated: bool,
}

/// Pick a spot for a new star among `existing` ones.
///
/// Best-effort rejection sampling: candidates are drawn uniformly inside the
/// viewport inset by `padding` until one lies at least `min_distance` from
/// every existing point, or `max_attempts` samples have been drawn. The last
/// candidate is returned either way.
pub fn allocate<R: Rng + ?Sized>(
    existing: &[Point],
    viewport: &ViewportConfig,
    layout: &LayoutConfig,
    rng: &mut R,
) -> Point {
    place(existing, viewport, layout, rng).point
}

/// Same as [`allocate`] but reports how the placement went.
pub fn place<R: Rng + ?Sized>(
    existing: &[Point],
    viewport: &ViewportConfig,
    layout: &LayoutConfig,
    rng: &mut R,
) -> Placement {
    let max_attempts = layout.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        let candidate = Point::new(
            sample_axis(viewport.width, layout.padding, rng),
            sample_axis(viewport.height, layout.padding, rng),
        );
        attempts += 1;

        let separated = existing
            .iter()
            .all(|p| p.distance(&candidate) >= layout.min_distance);

        if separated || attempts >= max_attempts {
            if !separated {
                tracing::debug!(
                    attempts,
                    existing = existing.len(),
                    "Placement budget exhausted, accepting crowded position"
                );
            }
            return Placement {
                point: candidate,
                attempts,
                separated,
            };
        }
    }
}

/// Uniform coordinate in `[padding, extent - padding)`; collapses to the
/// center when the extent cannot fit the padding on both sides.
fn sample_axis<R: Rng + ?Sized>(extent: f64, padding: f64, rng: &mut R) -> f64 {
    let span = extent - padding * 2.0;
    if span <= 0.0 {
        return extent / 2.0;
    }
    padding + rng.gen::<f64>() * span
}
