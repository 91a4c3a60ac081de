//! Tick placement for time rulers and gridlines.
//!
//! Steps come from a canonical ladder (2, 5 or 10 times a power of ten
//! nanoseconds) so that labels land on round values at every zoom level.
//! Each step carries a fixed sub-pattern of major, medium and minor ticks.

use crate::time::{DurationNs, TimeNs, TimeSpan};

/// Aim for roughly one major step per this many pixels.
pub const DESIRED_PX_PER_STEP: f32 = 80.0;

/// Returns the gridline step for `range` units.
///
/// The result is 1, 2 or 5 times a power of ten, chosen so the number of
/// steps across `range` lands as close as possible to `desired_steps`.
pub fn grid_step_size(range: f64, desired_steps: f64) -> f64 {
    let desired_step_size = range / desired_steps;
    let zeros = desired_step_size.log10().floor();
    let initial_step_size = 10f64.powf(zeros);

    let dist_to_desired =
        |candidate: f64| (range / candidate - desired_steps).abs();

    // initial <= desired step <= 10 * initial, so the candidates are 1, 2,
    // 5 and 10 times the initial size.
    let mut best = initial_step_size;
    let mut best_distance = dist_to_desired(initial_step_size);
    for multiplier in [2.0, 5.0, 10.0] {
        let candidate = multiplier * initial_step_size;
        let distance = dist_to_desired(candidate);
        if distance < best_distance {
            best_distance = distance;
            best = candidate;
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Major,
    Medium,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub kind: TickKind,
    pub time: TimeNs,
}

use TickKind::{Major, Medium, Minor};

// One entry per sub-tick within a major step: `|.`, `|....`, `|....:....`.
const PATTERN_2: &[TickKind] = &[Major, Minor];
const PATTERN_5: &[TickKind] = &[Major, Minor, Minor, Minor, Minor];
const PATTERN_10: &[TickKind] = &[
    Major, Minor, Minor, Minor, Minor, Medium, Minor, Minor, Minor, Minor,
];

/// Smallest ladder step of at least `min_step`, with its sub-pattern.
fn step_for(min_step: DurationNs) -> (DurationNs, &'static [TickKind]) {
    let mut pow = 1i64;
    loop {
        for (multiplier, pattern) in
            [(2i64, PATTERN_2), (5i64, PATTERN_5), (10i64, PATTERN_10)]
        {
            let candidate = multiplier.saturating_mul(pow);
            if candidate >= min_step {
                return (candidate, pattern);
            }
        }
        pow = pow.saturating_mul(10);
    }
}

/// A lazy, restartable sequence of ticks covering exactly one span.
///
/// Tick positions are aligned to `offset` rather than to absolute zero, so
/// a trace rebased onto a display origin keeps round labels. The yielded
/// times are absolute.
#[derive(Debug, Clone)]
pub struct TickGenerator {
    span: TimeSpan,
    offset: TimeNs,
    step: DurationNs,
    pattern: &'static [TickKind],
}

impl TickGenerator {
    pub fn new(span: TimeSpan, max_major_ticks: usize, offset: TimeNs) -> TickGenerator {
        let max_major = max_major_ticks.max(1) as i64;
        let min_step = (span.duration() / max_major).max(1);
        let (step, pattern) = step_for(min_step);
        TickGenerator {
            span,
            offset,
            step,
            pattern,
        }
    }

    /// Distance between consecutive major ticks.
    pub fn step(&self) -> DurationNs {
        self.step
    }

    /// Distance between consecutive ticks of any kind.
    pub fn spacing(&self) -> DurationNs {
        self.step / self.pattern.len() as i64
    }

    pub fn iter(&self) -> TickIter {
        let spacing = self.spacing();
        let domain_start = self.span.start().raw() - self.offset.raw();
        // First lattice index at or after the span start.
        let mut index = domain_start.div_euclid(spacing);
        if index * spacing < domain_start {
            index += 1;
        }
        TickIter {
            pattern: self.pattern,
            spacing,
            offset_raw: self.offset.raw(),
            end_raw: self.span.end().raw(),
            index,
        }
    }
}

impl<'a> IntoIterator for &'a TickGenerator {
    type Item = Tick;
    type IntoIter = TickIter;

    fn into_iter(self) -> TickIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct TickIter {
    pattern: &'static [TickKind],
    spacing: DurationNs,
    offset_raw: i64,
    end_raw: i64,
    index: i64,
}

impl Iterator for TickIter {
    type Item = Tick;

    fn next(&mut self) -> Option<Tick> {
        let time_raw = self.index * self.spacing + self.offset_raw;
        if time_raw >= self.end_raw {
            return None;
        }
        let kind = self.pattern[self.index.rem_euclid(self.pattern.len() as i64) as usize];
        self.index += 1;
        Some(Tick {
            kind,
            time: TimeNs::from_raw(time_raw),
        })
    }
}

/// Format a label for `relative_ns`, choosing the unit from the step
/// magnitude so all labels on one ruler share a unit.
pub fn format_time_label(relative_ns: f64, step_ns: f64) -> String {
    if step_ns >= 1_000_000_000.0 {
        format!("{:.2} s", relative_ns / 1_000_000_000.0)
    } else if step_ns >= 1_000_000.0 {
        format!("{:.2} ms", relative_ns / 1_000_000.0)
    } else if step_ns >= 1_000.0 {
        format!("{:.2} µs", relative_ns / 1_000.0)
    } else {
        format!("{relative_ns:.0} ns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: i64) -> TimeNs {
        TimeNs::from_raw(raw)
    }

    #[test]
    fn grid_step_picks_the_nearest_ladder_entry() {
        // 2345 units over ~10 steps: candidates 100/200/500/1000 give
        // 23.5/11.7/4.7/2.3 steps, and 200 is the closest to 10.
        assert_eq!(grid_step_size(2345.0, 10.0), 200.0);
        assert_eq!(grid_step_size(1000.0, 10.0), 100.0);
        assert_eq!(grid_step_size(10.0, 10.0), 1.0);
    }

    #[test]
    fn ladder_steps_are_2_5_10() {
        assert_eq!(step_for(1), (2, PATTERN_2));
        assert_eq!(step_for(3), (5, PATTERN_5));
        assert_eq!(step_for(7), (10, PATTERN_10));
        assert_eq!(step_for(11), (20, PATTERN_2));
        assert_eq!(step_for(900), (1_000, PATTERN_10));
    }

    #[test]
    fn ticks_are_strictly_increasing_and_inside_the_span() {
        let span = TimeSpan::new(t(0), t(10_000));
        let generator = TickGenerator::new(span, 10, TimeNs::ZERO);
        let ticks: Vec<Tick> = generator.iter().collect();

        assert!(!ticks.is_empty());
        for pair in ticks.windows(2) {
            assert!(pair[0].time < pair[1].time);
        }
        assert!(ticks.iter().all(|tick| span.contains(tick.time)));
    }

    #[test]
    fn majors_fall_on_step_boundaries() {
        let span = TimeSpan::new(t(0), t(10_000));
        let generator = TickGenerator::new(span, 10, TimeNs::ZERO);
        assert_eq!(generator.step(), 1_000);

        for tick in &generator {
            if tick.time.raw() % generator.step() == 0 {
                assert_eq!(tick.kind, TickKind::Major);
            } else {
                assert_ne!(tick.kind, TickKind::Major);
            }
        }
    }

    #[test]
    fn pattern_10_has_a_medium_midpoint() {
        let span = TimeSpan::new(t(0), t(1_000));
        let generator = TickGenerator::new(span, 1, TimeNs::ZERO);
        assert_eq!(generator.step(), 1_000);

        let ticks: Vec<Tick> = generator.iter().collect();
        assert_eq!(ticks.len(), 10);
        assert_eq!(ticks[0].kind, TickKind::Major);
        assert_eq!(ticks[5].kind, TickKind::Medium);
        assert_eq!(ticks[1].kind, TickKind::Minor);
    }

    #[test]
    fn offset_rebases_the_lattice() {
        let offset = t(250);
        let span = TimeSpan::new(t(250), t(1_250));
        let generator = TickGenerator::new(span, 1, offset);
        let first = generator.iter().next().unwrap();

        // The first tick sits on the domain origin, not on absolute zero.
        assert_eq!(first.time, t(250));
        assert_eq!(first.kind, TickKind::Major);
    }

    #[test]
    fn generator_restarts_cleanly() {
        let span = TimeSpan::new(t(0), t(5_000));
        let generator = TickGenerator::new(span, 5, TimeNs::ZERO);
        let a: Vec<Tick> = generator.iter().collect();
        let b: Vec<Tick> = generator.iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn labels_follow_the_step_unit() {
        assert_eq!(format_time_label(1_500_000_000.0, 1_000_000_000.0), "1.50 s");
        assert_eq!(format_time_label(2_500_000.0, 1_000_000.0), "2.50 ms");
        assert_eq!(format_time_label(1_500.0, 1_000.0), "1.50 µs");
        assert_eq!(format_time_label(42.0, 10.0), "42 ns");
    }
}
