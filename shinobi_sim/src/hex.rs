// Axial hex coordinates and route finding over the world map.
//
// The world is a small hex map around the home village at the origin. Hexes
// use axial `(q, r)` coordinates (cube `s = -q - r` implied). An `Axial`
// persists as the string `"q,r"` so it can key JSON objects.
//
// Route finding sits behind the `RouteFinder` trait; the core only needs
// "a path or nothing" when a unit sets out to explore. `AStarRouteFinder` is
// the default: A* with the hex distance heuristic (admissible on a uniform
// cost grid) over a `BinaryHeap` min-heap, same reversed-ordering pattern as
// the timer queue.
//
// **Critical constraint: determinism.** Heap ties break on coordinates and
// bookkeeping lives in `BTreeMap`s, so equal-cost routes come out the same
// every run.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Axial {
    pub q: i32,
    pub r: i32,
}

/// World hexes are keyed by their coordinate.
pub type HexId = Axial;

/// The six axial neighbor offsets, clockwise from east.
pub const DIRECTIONS: [Axial; 6] = [
    Axial::new(1, 0),
    Axial::new(1, -1),
    Axial::new(0, -1),
    Axial::new(-1, 0),
    Axial::new(-1, 1),
    Axial::new(0, 1),
];

impl Axial {
    pub const ORIGIN: Axial = Axial::new(0, 0);

    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    pub fn s(self) -> i32 {
        -self.q - self.r
    }

    pub fn offset(self, other: Axial) -> Axial {
        Axial::new(self.q + other.q, self.r + other.r)
    }

    pub fn neighbors(self) -> [Axial; 6] {
        DIRECTIONS.map(|d| self.offset(d))
    }

    /// Number of steps between two hexes.
    pub fn distance(self, other: Axial) -> u32 {
        let dq = (self.q - other.q).unsigned_abs();
        let dr = (self.r - other.r).unsigned_abs();
        let ds = (self.s() - other.s()).unsigned_abs();
        dq.max(dr).max(ds)
    }

    /// Parse `"q,r"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (q, r) = s.split_once(',')?;
        Some(Self::new(q.trim().parse().ok()?, r.trim().parse().ok()?))
    }
}

impl fmt::Display for Axial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.q, self.r)
    }
}

impl Serialize for Axial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Axial {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Axial::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid hex coordinate"))
    }
}

/// Every hex within `radius` of `center`: the center first, then ring by
/// ring outward.
pub fn spiral(center: Axial, radius: u32) -> Vec<Axial> {
    let mut out = vec![center];
    for k in 1..=radius as i32 {
        // Start k steps out along direction 4, then walk each side of the ring.
        let mut hex = center.offset(Axial::new(DIRECTIONS[4].q * k, DIRECTIONS[4].r * k));
        for dir in DIRECTIONS {
            for _ in 0..k {
                out.push(hex);
                hex = hex.offset(dir);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Route finding
// ---------------------------------------------------------------------------

/// Finds walkable routes across the hex map.
pub trait RouteFinder {
    /// Hexes from `from` to `to`, both inclusive. Empty if `to` cannot be
    /// reached or either end is impassable.
    fn route(&self, from: Axial, to: Axial, passable: &dyn Fn(Axial) -> bool) -> Vec<Axial>;
}

/// A* over unit-cost hex steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct AStarRouteFinder;

struct OpenEntry {
    hex: Axial,
    f_score: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score == other.f_score && self.hex == other.hex
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.hex.cmp(&self.hex))
    }
}

impl RouteFinder for AStarRouteFinder {
    fn route(&self, from: Axial, to: Axial, passable: &dyn Fn(Axial) -> bool) -> Vec<Axial> {
        if !passable(from) || !passable(to) {
            return Vec::new();
        }
        if from == to {
            return vec![from];
        }

        let mut g_score: BTreeMap<Axial, u32> = BTreeMap::new();
        let mut came_from: BTreeMap<Axial, Axial> = BTreeMap::new();
        let mut open = BinaryHeap::new();
        g_score.insert(from, 0);
        open.push(OpenEntry {
            hex: from,
            f_score: from.distance(to),
        });

        while let Some(OpenEntry { hex, f_score }) = open.pop() {
            let g = g_score.get(&hex).copied().unwrap_or(u32::MAX);
            // Stale heap entry superseded by a cheaper one.
            if f_score > g.saturating_add(hex.distance(to)) {
                continue;
            }
            if hex == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(&prev) = came_from.get(&cursor) {
                    path.push(prev);
                    cursor = prev;
                }
                path.reverse();
                return path;
            }
            for next in hex.neighbors() {
                if !passable(next) {
                    continue;
                }
                let tentative = g + 1;
                if tentative < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                    g_score.insert(next, tentative);
                    came_from.insert(next, hex);
                    open.push(OpenEntry {
                        hex: next,
                        f_score: tentative + next.distance(to),
                    });
                }
            }
        }
        Vec::new()
    }
}
