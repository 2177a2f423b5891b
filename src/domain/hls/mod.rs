//! HLS manifests: writing, proxy rewriting and ad-marker injection.

pub mod ad_injection;
pub mod playlist;
pub mod rewrite;

pub use ad_injection::{inject_ad_markers, plan_insertion_points, AdRandom, ThreadRandom};
pub use playlist::{MasterPlaylist, MediaPlaylist, MediaSegment};
pub use rewrite::rewrite_to_proxy;

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Duration of an `#EXTINF:<seconds>,<title>` line, if it is one.
pub fn extinf_duration(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("#EXTINF:")?;
    let value = rest.split(',').next()?.trim();
    value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}
