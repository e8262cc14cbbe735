//! Proximity trigger evaluator.
//!
//! Every frame the local avatar's ground-plane position is compared against
//! a fixed registry of anchors. Signals are level-triggered: they are
//! recomputed from scratch each frame and carry no memory of the last one.

use world_shared::math::Vec3;

/// Memory marker ids run 1..=8.
pub type MarkerId = u32;
/// Seat ids run 0..=2.
pub type SeatId = u32;

/// Memory marker whose message closes the tour.
pub const FINAL_MARKER: MarkerId = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    MemoryMarker(MarkerId),
    CookingStation,
    Climbable,
    Seat(SeatId),
}

/// A point of interest with an activation radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub kind: AnchorKind,
    /// Ground-plane position; `y` is ignored.
    pub position: Vec3,
    pub radius: f32,
}

impl Anchor {
    pub const fn new(kind: AnchorKind, x: f32, z: f32, radius: f32) -> Self {
        Anchor {
            kind,
            position: Vec3::new(x, 0.0, z),
            radius,
        }
    }

    /// Strictly inside the activation radius.
    pub fn contains(&self, p: Vec3) -> bool {
        self.position.horizontal_distance(p) < self.radius
    }
}

pub const MARKER_RADIUS: f32 = 3.0;
pub const COOKING_RADIUS: f32 = 4.0;
pub const CLIMBABLE_RADIUS: f32 = 5.0;
pub const SEAT_RADIUS: f32 = 3.0;

/// Where entering the climbable structure puts you.
pub const CLIMB_PLATFORM: Vec3 = Vec3::new(40.0, 10.0, 20.0);

/// The park.
pub const DEFAULT_ANCHORS: [Anchor; 13] = [
    Anchor::new(AnchorKind::MemoryMarker(1), -10.0, -10.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(2), 10.0, -8.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(3), -12.0, 8.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(4), 12.0, 5.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(5), 0.0, -18.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(6), 15.0, 15.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(7), -15.0, 12.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::MemoryMarker(FINAL_MARKER), 0.0, 0.0, MARKER_RADIUS),
    Anchor::new(AnchorKind::CookingStation, -6.0, 29.0, COOKING_RADIUS),
    Anchor::new(AnchorKind::Climbable, 40.0, 20.0, CLIMBABLE_RADIUS),
    Anchor::new(AnchorKind::Seat(0), 10.0, 10.0, SEAT_RADIUS),
    Anchor::new(AnchorKind::Seat(1), -15.0, 15.0, SEAT_RADIUS),
    Anchor::new(AnchorKind::Seat(2), 0.0, -28.0, SEAT_RADIUS),
];

/// Signals for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProximitySignals {
    pub memory: Option<MarkerId>,
    pub near_cooking: bool,
    pub near_climbable: bool,
    pub seat: Option<SeatId>,
}

impl ProximitySignals {
    pub fn near_seat(&self) -> bool {
        self.seat.is_some()
    }
}

/// Static anchor registry.
#[derive(Debug, Clone)]
pub struct ProximityEvaluator {
    anchors: Vec<Anchor>,
}

impl Default for ProximityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_ANCHORS.to_vec())
    }
}

impl ProximityEvaluator {
    pub fn new(anchors: Vec<Anchor>) -> Self {
        Self { anchors }
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Evaluates all anchors against `p`. Nearest wins within a category;
    /// ties go to the anchor listed first.
    pub fn evaluate(&self, p: Vec3) -> ProximitySignals {
        let mut signals = ProximitySignals::default();
        let mut best_marker = f32::INFINITY;
        let mut best_seat = f32::INFINITY;

        for anchor in self.anchors.iter().filter(|a| a.contains(p)) {
            let d = anchor.position.horizontal_distance(p);
            match anchor.kind {
                AnchorKind::MemoryMarker(id) if d < best_marker => {
                    best_marker = d;
                    signals.memory = Some(id);
                }
                AnchorKind::Seat(id) if d < best_seat => {
                    best_seat = d;
                    signals.seat = Some(id);
                }
                AnchorKind::CookingStation => signals.near_cooking = true,
                AnchorKind::Climbable => signals.near_climbable = true,
                _ => {}
            }
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_from_everything_is_quiet() {
        let eval = ProximityEvaluator::default();
        assert_eq!(eval.evaluate(Vec3::new(60.0, 0.0, -60.0)), ProximitySignals::default());
    }

    #[test]
    fn origin_is_the_final_marker() {
        let eval = ProximityEvaluator::default();
        let s = eval.evaluate(Vec3::new(0.5, 0.0, -0.5));
        assert_eq!(s.memory, Some(FINAL_MARKER));
        assert!(!s.near_seat());
    }

    #[test]
    fn radius_boundary_is_exclusive() {
        let eval = ProximityEvaluator::default();
        assert!(eval.evaluate(Vec3::new(-6.0, 0.0, 29.0 - 3.99)).near_cooking);
        assert!(!eval.evaluate(Vec3::new(-6.0, 0.0, 29.0 - 4.0)).near_cooking);
    }

    #[test]
    fn height_is_ignored() {
        let eval = ProximityEvaluator::default();
        let s = eval.evaluate(CLIMB_PLATFORM);
        assert!(s.near_climbable);
    }

    #[test]
    fn nearest_overlapping_anchor_wins() {
        let eval = ProximityEvaluator::new(vec![
            Anchor::new(AnchorKind::Seat(0), 0.0, 0.0, 3.0),
            Anchor::new(AnchorKind::Seat(1), 2.0, 0.0, 3.0),
        ]);
        assert_eq!(eval.evaluate(Vec3::new(1.5, 0.0, 0.0)).seat, Some(1));
        assert_eq!(eval.evaluate(Vec3::new(0.5, 0.0, 0.0)).seat, Some(0));
        assert_eq!(eval.evaluate(Vec3::new(1.0, 0.0, 0.0)).seat, Some(0));
    }

    #[test]
    fn signals_are_recomputed_each_call() {
        let eval = ProximityEvaluator::default();
        let at_seat = Vec3::new(10.0, 0.0, 10.0);
        assert_eq!(eval.evaluate(at_seat).seat, Some(0));
        assert_eq!(eval.evaluate(at_seat).seat, Some(0));
        assert_eq!(eval.evaluate(Vec3::ZERO).seat, None);
    }
}
