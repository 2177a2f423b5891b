use super::extinf_duration;
use crate::domain::preset::VariantDescriptor;
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegment {
    pub duration: f64,
    pub uri: String,
}

/// Variant (media) playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<MediaSegment>,
    pub end_list: bool,
}

impl MediaPlaylist {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: true,
        }
    }

    pub fn add_segment(&mut self, duration: f64, uri: String) {
        self.segments.push(MediaSegment { duration, uri });
    }

    /// Reads the segment list of a variant playlist. Unknown tags are ignored.
    pub fn parse(content: &str) -> Self {
        let mut playlist = MediaPlaylist::new(0);
        playlist.end_list = false;
        let mut pending: Option<f64> = None;

        for line in content.lines().map(str::trim) {
            if line.is_empty() {
                continue;
            }
            if let Some(duration) = extinf_duration(line) {
                pending = Some(duration);
            } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = value.trim().parse().unwrap_or(0);
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = value.trim().parse().unwrap_or(0);
            } else if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
                playlist.version = value.trim().parse().unwrap_or(playlist.version);
            } else if line == "#EXT-X-ENDLIST" {
                playlist.end_list = true;
            } else if !line.starts_with('#') {
                if let Some(duration) = pending.take() {
                    playlist.add_segment(duration, line.to_string());
                }
            }
        }
        playlist
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        let _ = writeln!(out, "#EXT-X-VERSION:{}", self.version);
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);
        for segment in &self.segments {
            // Using {:.6} for reasonable precision on float duration
            let _ = writeln!(out, "#EXTINF:{:.6},", segment.duration);
            out.push_str(&segment.uri);
            out.push('\n');
        }
        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }
}

/// Master playlist listing one entry per encoded variant.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlaylist {
    pub version: u8,
    pub variants: Vec<VariantDescriptor>,
}

impl MasterPlaylist {
    /// Variants are ordered by descending bandwidth so players see the best
    /// rendition first.
    pub fn new(mut variants: Vec<VariantDescriptor>) -> Self {
        variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
        Self { version: 3, variants }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        let _ = writeln!(out, "#EXT-X-VERSION:{}\n", self.version);
        for variant in &self.variants {
            let _ = writeln!(
                out,
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
                variant.bandwidth, variant.resolution
            );
            let _ = writeln!(out, "{}\n", variant.playlist);
        }
        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path).await?;
        file.write_all(self.render().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
