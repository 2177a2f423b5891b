//! Ad slots consulted at manifest-serve time.
//!
//! A slot either references a published [`Ad`] from the advertising catalog or
//! owns its media outright. The two shapes are separate constructors of
//! [`SlotContent`], so a slot with neither cannot be represented.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Published ad owned by the external advertising catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub id: i64,
    pub name: String,
    pub media_kind: MediaKind,
    pub media_url: String,
    pub click_url: Option<String>,
    /// Seconds.
    pub duration: Option<u32>,
    pub is_published: bool,
}

/// Media owned by the slot itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedMedia {
    pub media_kind: MediaKind,
    pub media_url: String,
    pub redirect_url: Option<String>,
    /// Seconds the ad stays on screen.
    pub display_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SlotContent {
    Linked(Ad),
    SelfContained(OwnedMedia),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSlot {
    pub id: i64,
    pub content: SlotContent,
    /// Offset into playback where the slot window opens, in seconds.
    pub start_time: u32,
    pub end_time: u32,
    pub is_active: bool,
}

impl AdSlot {
    pub fn linked(id: i64, ad: Ad) -> Self {
        Self {
            id,
            content: SlotContent::Linked(ad),
            start_time: 0,
            end_time: 0,
            is_active: true,
        }
    }

    pub fn self_contained(id: i64, media: OwnedMedia) -> Self {
        Self {
            id,
            content: SlotContent::SelfContained(media),
            start_time: 0,
            end_time: 0,
            is_active: true,
        }
    }

    pub fn with_window(mut self, start_time: u32, end_time: u32) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Active, and when linked, the referenced ad is published.
    pub fn is_servable(&self) -> bool {
        self.is_active
            && match &self.content {
                SlotContent::Linked(ad) => ad.is_published,
                SlotContent::SelfContained(_) => true,
            }
    }

    pub fn asset_id(&self) -> String {
        match &self.content {
            SlotContent::Linked(ad) => format!("ad-{}", ad.id),
            SlotContent::SelfContained(_) => format!("slot-{}", self.id),
        }
    }

    pub fn media_url(&self) -> &str {
        match &self.content {
            SlotContent::Linked(ad) => &ad.media_url,
            SlotContent::SelfContained(media) => &media.media_url,
        }
    }

    pub fn click_url(&self) -> Option<&str> {
        match &self.content {
            SlotContent::Linked(ad) => ad.click_url.as_deref(),
            SlotContent::SelfContained(media) => media.redirect_url.as_deref(),
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match &self.content {
            SlotContent::Linked(ad) => ad.media_kind,
            SlotContent::SelfContained(media) => media.media_kind,
        }
    }

    pub fn display_duration(&self) -> Option<u32> {
        match &self.content {
            SlotContent::Linked(ad) => ad.duration,
            SlotContent::SelfContained(media) => Some(media.display_duration),
        }
    }
}
