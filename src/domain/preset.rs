use serde::{Deserialize, Serialize};

/// One rung of the adaptive bitrate ladder. Rates are in kbit/s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityPreset {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
    pub maxrate_kbps: u32,
    pub bufsize_kbps: u32,
}

impl QualityPreset {
    fn rung(name: &str, width: u32, height: u32, video_kbps: u32, audio_kbps: u32, maxrate_kbps: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            video_kbps,
            audio_kbps,
            maxrate_kbps,
            // 1.5x the target bitrate
            bufsize_kbps: video_kbps * 3 / 2,
        }
    }

    /// The fixed ladder, highest quality first.
    pub fn ladder() -> Vec<QualityPreset> {
        vec![
            Self::rung("1080p", 1920, 1080, 5000, 192, 5350),
            Self::rung("720p", 1280, 720, 2800, 128, 2996),
            Self::rung("480p", 854, 480, 1400, 128, 1498),
            Self::rung("360p", 640, 360, 800, 96, 856),
        ]
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Nominal bandwidth in bits/s: video + audio bitrate.
    pub fn bandwidth(&self) -> u64 {
        (self.video_kbps as u64 + self.audio_kbps as u64) * 1000
    }

    /// Playlist path relative to the HLS root, e.g. `720p/720p.m3u8`.
    pub fn playlist_path(&self) -> String {
        format!("{}/{}.m3u8", self.name, self.name)
    }

    pub fn segment_pattern(&self) -> String {
        format!("{}_%03d.ts", self.name)
    }
}

/// A successfully encoded variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    pub name: String,
    pub resolution: String,
    pub bandwidth: u64,
    /// Relative to the HLS root.
    pub playlist: String,
}

impl VariantDescriptor {
    pub fn from_preset(preset: &QualityPreset) -> Self {
        Self {
            name: preset.name.clone(),
            resolution: preset.resolution(),
            bandwidth: preset.bandwidth(),
            playlist: preset.playlist_path(),
        }
    }
}
