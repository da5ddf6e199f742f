use crate::model::Pattern;

/// Index pairs for a pattern.
///
/// Indices address positions in a creation-time-sorted snapshot of the
/// memories being connected (see [`super::SortedSnapshot`]), never memory ids.
/// [`Pattern::Auto`] has no table; the resolver chains memories in order.
pub fn connections_for(pattern: Pattern) -> &'static [(usize, usize)] {
    match pattern {
        Pattern::Auto => &[],
        Pattern::Capricorn => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7), (3, 8), (8, 9)],
        Pattern::Aries => &[(0, 1), (1, 2), (2, 3)],
        Pattern::Taurus => &[(0, 1), (1, 2), (2, 3), (3, 4), (2, 5), (5, 6)],
        Pattern::Gemini => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (2, 6), (6, 7)],
        Pattern::Cancer => &[(0, 1), (1, 2), (2, 3), (3, 4), (2, 5)],
        Pattern::Leo => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 0), (3, 7), (7, 8)],
        Pattern::Virgo => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (3, 7), (7, 8), (8, 9)],
        Pattern::Libra => &[(0, 1), (1, 2), (2, 3), (3, 0), (1, 4), (4, 5)],
        Pattern::Scorpio => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7), (7, 8), (8, 9)],
        Pattern::Sagittarius => &[(0, 1), (1, 2), (2, 3), (3, 4), (2, 5), (5, 6), (6, 7), (5, 8)],
        Pattern::Aquarius => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7)],
        Pattern::Pisces => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0), (2, 5), (5, 6), (6, 7), (7, 8), (8, 5)],
        Pattern::Orion => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0), (2, 5), (5, 6), (2, 7), (7, 8)],
        Pattern::UrsaMajor => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 3)],
        Pattern::UrsaMinor => &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6)],
    }
}

/// Number of stars needed to draw every edge of `pattern`.
pub fn stars_required(pattern: Pattern) -> usize {
    connections_for(pattern)
        .iter()
        .map(|&(a, b)| a.max(b) + 1)
        .max()
        .unwrap_or(0)
}
