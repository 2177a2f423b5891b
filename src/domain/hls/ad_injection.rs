//! Serve-time ad-break injection into variant playlists.
//!
//! The stored playlist is never modified. Each request plans its own
//! insertion points: a pre-roll at 0, then breaks spaced by a random choice
//! from [`AD_INTERVALS`] for as long as they land at least
//! [`END_GUARD_SECS`] before the end. A break is emitted in front of the
//! first segment that starts at or after its planned point, unless that
//! lands closer than [`MIN_BREAK_SPACING_SECS`] to the previous break.

use super::extinf_duration;
use crate::domain::ad_slot::AdSlot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Candidate spacing between two ad breaks, in seconds.
pub const AD_INTERVALS: [u32; 4] = [300, 600, 1200, 1800];
/// Playlists this short or shorter are served unchanged.
pub const MIN_INJECTABLE_SECS: f64 = 10.0;
pub const END_GUARD_SECS: f64 = 30.0;
/// Smallest distance between two emitted breaks, whatever the segment lengths.
pub const MIN_BREAK_SPACING_SECS: f64 = AD_INTERVALS[0] as f64;
/// Cue-out duration when the slot does not declare one.
pub const DEFAULT_AD_SECS: u32 = 30;

const EPSILON: f64 = 1e-6;

/// Source of randomness for interval and slot selection.
pub trait AdRandom {
    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Thread-local RNG; what the streaming endpoint uses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl AdRandom for ThreadRandom {
    fn pick(&mut self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// Deterministic source for callers that need reproducible schedules.
#[derive(Debug, Clone)]
pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl AdRandom for SeededRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.0.random_range(0..len)
    }
}

/// Planned break offsets in seconds for a playlist of `total` seconds.
pub fn plan_insertion_points(total: f64, rng: &mut dyn AdRandom) -> Vec<f64> {
    let mut points = vec![0.0];
    let mut at = 0.0;
    loop {
        at += AD_INTERVALS[rng.pick(AD_INTERVALS.len())] as f64;
        if at > total - END_GUARD_SECS {
            break;
        }
        points.push(at);
    }
    points
}

/// Returns `content` with cue-out markers for the servable slots in `slots`.
pub fn inject_ad_markers(content: &str, slots: &[AdSlot], rng: &mut dyn AdRandom) -> String {
    let servable: Vec<&AdSlot> = slots.iter().filter(|slot| slot.is_servable()).collect();
    let total: f64 = content.split('\n').filter_map(extinf_duration).sum();

    if total <= MIN_INJECTABLE_SECS || servable.is_empty() {
        return content.to_string();
    }

    let points = plan_insertion_points(total, rng);
    let latest_break = total - END_GUARD_SECS;
    let mut next_point = 0;
    let mut last_break: Option<f64> = None;
    let mut elapsed = 0.0;
    let mut out: Vec<String> = Vec::new();

    for line in content.split('\n') {
        if let Some(duration) = extinf_duration(line) {
            if next_point < points.len() && elapsed + EPSILON >= points[next_point] {
                while next_point < points.len() && elapsed + EPSILON >= points[next_point] {
                    next_point += 1;
                }
                let spaced = last_break
                    .map_or(true, |last| elapsed - last + EPSILON >= MIN_BREAK_SPACING_SECS);
                if spaced && (elapsed <= EPSILON || elapsed <= latest_break) {
                    let slot = servable[rng.pick(servable.len())];
                    push_cue(&mut out, slot);
                    last_break = Some(elapsed);
                }
            }
            elapsed += duration;
        }
        out.push(line.to_string());
    }

    out.join("\n")
}

fn push_cue(out: &mut Vec<String>, slot: &AdSlot) {
    let duration = slot.display_duration().unwrap_or(DEFAULT_AD_SECS);
    out.push(format!("#EXT-X-CUE-OUT:DURATION={}", duration));
    out.push(format!("#EXT-X-ASSET:CAID={}", slot.asset_id()));
    out.push(format!("#EXT-X-AD-URL:{}", slot.media_url()));
    if let Some(click) = slot.click_url() {
        out.push(format!("#EXT-X-AD-CLICK:{}", click));
    }
    out.push(format!("#EXT-X-AD-TYPE:{}", slot.media_kind().as_str()));
}
