//! Step patterns and loop windows
//!
//! A pattern is a sparse map from sequencer step to a normalized clip
//! position. The loop window confines which steps the sequencer visits for a
//! clip; pattern entries outside the window are kept but never fire.

use std::collections::BTreeMap;

use crate::types::SEQ_STEPS;

/// Step range `[start, start + length)` on the 64-step grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopWindow {
    start: u32,
    length: u32,
}

impl LoopWindow {
    /// Create a window, clamped onto the grid
    ///
    /// `length` is at least 1 and the window never extends past the last step.
    pub fn new(start: u32, length: u32) -> Self {
        let start = start.min(SEQ_STEPS - 1);
        let length = length.clamp(1, SEQ_STEPS - start);
        Self { start, length }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn contains(&self, step: u32) -> bool {
        step >= self.start && step < self.start + self.length
    }

    /// Advance a clip's step pointer by one global step
    ///
    /// `clipStep = start + ((clipStep + 1 - start) mod length)`. A fresh
    /// pointer lands on `start`; a pointer left outside the window by a window
    /// edit wraps back into it.
    pub fn advance(&self, pointer: Option<u32>) -> u32 {
        match pointer {
            None => self.start,
            Some(p) => {
                let start = self.start as i64;
                let offset = (p as i64 + 1 - start).rem_euclid(self.length as i64);
                (start + offset) as u32
            }
        }
    }
}

impl Default for LoopWindow {
    fn default() -> Self {
        Self {
            start: 0,
            length: SEQ_STEPS,
        }
    }
}

/// Sparse `step -> normalized position` map for one clip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepPattern {
    points: BTreeMap<u32, f64>,
}

impl StepPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry at `step`. Positions are clamped to [0, 1].
    ///
    /// Returns false (and changes nothing) for steps off the grid or NaN positions.
    pub fn set(&mut self, step: u32, position: f64) -> bool {
        if step >= SEQ_STEPS || position.is_nan() {
            return false;
        }
        self.points.insert(step, position.clamp(0.0, 1.0));
        true
    }

    pub fn remove(&mut self, step: u32) -> Option<f64> {
        self.points.remove(&step)
    }

    pub fn get(&self, step: u32) -> Option<f64> {
        self.points.get(&step).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Entries in step order
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.points.iter().map(|(&s, &p)| (s, p))
    }

    /// Snap every entry to the nearest multiple of `grid`
    ///
    /// When two entries land on the same step the later one wins. Entries that
    /// would round past the end of the grid snap down instead.
    pub fn quantize(&mut self, grid: u32) {
        if grid <= 1 {
            return;
        }
        let last_slot = (SEQ_STEPS - 1) / grid * grid;
        let mut snapped = BTreeMap::new();
        for (&step, &pos) in &self.points {
            let target = ((step + grid / 2) / grid * grid).min(last_slot);
            snapped.insert(target, pos);
        }
        self.points = snapped;
    }
}

impl FromIterator<(u32, f64)> for StepPattern {
    fn from_iter<I: IntoIterator<Item = (u32, f64)>>(iter: I) -> Self {
        let mut pattern = StepPattern::new();
        for (step, pos) in iter {
            pattern.set(step, pos);
        }
        pattern
    }
}
