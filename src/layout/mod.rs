//! Star layout: where memories sit and which of them are joined by lines.
//!
//! Everything here is a pure function of its inputs. Positions are assigned
//! once by [`position::allocate`] when a memory is committed; clusters and
//! connections are recomputed on every call.

pub mod clusters;
pub mod connections;
pub mod patterns;
pub mod position;

pub use clusters::{group_by_mood, MemoryCluster};
pub use connections::{resolve, resolve_with, Connection, ResolveOptions, SortedSnapshot};
pub use patterns::{connections_for, stars_required};
pub use position::{allocate, place, Placement};
