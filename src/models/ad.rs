//! Ad descriptors and the AdSource payload mapping.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

const VIDEO_KEYS: [&str; 4] = ["videoSrc", "video", "video_url", "videoUrl"];
const IMAGE_KEYS: [&str; 4] = ["imageSrc", "image", "image_url", "imageUrl"];
const POSTER_KEYS: [&str; 2] = ["videoPoster", "poster"];
const LINK_KEYS: [&str; 3] = ["buttonLink", "linkHref", "link"];

/// Kind of media an ad displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Normalized ad record, immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdDescriptor {
    /// Stable identity for analytics and recency tracking
    pub id: String,
    pub media_kind: MediaKind,
    pub media_url: String,
    /// Video poster frame
    pub poster_url: Option<String>,
    /// Still image shipped alongside a video
    pub image_url: Option<String>,
    /// Click destination
    pub link_url: Option<String>,
    /// Alt text
    pub title: Option<String>,
    /// Relative selection weight, never negative
    pub weight: f64,
    pub duration_seconds: Option<f64>,
    pub loop_media: bool,
}

impl AdDescriptor {
    /// Map one payload object into a descriptor.
    ///
    /// Returns `None` when the object carries neither a video nor an image.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let video = first_str(obj, &VIDEO_KEYS);
        let image = first_str(obj, &IMAGE_KEYS);
        let meta = obj.get("meta").and_then(Value::as_object);

        let (media_kind, media_url) = match (&video, &image) {
            (Some(v), _) => (MediaKind::Video, v.clone()),
            (None, Some(i)) => (MediaKind::Image, i.clone()),
            (None, None) => return None,
        };

        let id = meta
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| image.clone())
            .or_else(|| video.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let weight = meta
            .and_then(|m| m.get("weight"))
            .and_then(Value::as_f64)
            .map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 })
            .unwrap_or(1.0);

        let duration_seconds = meta
            .and_then(|m| m.get("duration"))
            .and_then(Value::as_f64)
            .filter(|d| d.is_finite() && *d > 0.0);

        let loop_media = meta
            .and_then(|m| m.get("loop"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let poster_url = match media_kind {
            MediaKind::Video => first_str(obj, &POSTER_KEYS),
            MediaKind::Image => None,
        };
        let image_url = match media_kind {
            MediaKind::Video => image,
            MediaKind::Image => None,
        };

        Some(Self {
            id,
            media_kind,
            media_url,
            poster_url,
            image_url,
            link_url: first_str(obj, &LINK_KEYS),
            title: first_str(obj, &["title"]),
            weight,
            duration_seconds,
            loop_media,
        })
    }

    pub fn is_video(&self) -> bool {
        self.media_kind == MediaKind::Video
    }

    /// Whether the mounted video element should loop.
    ///
    /// A video without its own duration loops until the slot rotates.
    pub fn video_loops(&self) -> bool {
        self.loop_media || self.duration_seconds.is_none()
    }

    /// Delay until the slot's next tick after this ad is applied.
    pub fn next_delay(&self, default_interval: Duration, min_display: Duration) -> Duration {
        match self.duration_seconds {
            Some(secs) if !self.loop_media => seconds_to_millis(secs).max(min_display),
            _ => default_interval,
        }
    }

    /// How long the progress indicator takes to fill.
    pub fn display_interval(&self, default_interval: Duration, min_display: Duration) -> Duration {
        self.duration_seconds
            .map(seconds_to_millis)
            .unwrap_or(default_interval)
            .max(min_display)
    }
}

/// Map an AdSource response body into candidates.
///
/// Accepts an object, an array, or either wrapped in `{ "ad": ... }`.
/// Entries without media are skipped; the payload is malformed only when
/// nothing usable remains.
pub fn parse_payload(body: &Value) -> Result<Vec<AdDescriptor>, FetchError> {
    let inner = match body.get("ad") {
        Some(ad) if !ad.is_null() => ad,
        _ => body,
    };

    let ads: Vec<AdDescriptor> = match inner {
        Value::Array(items) => items.iter().filter_map(AdDescriptor::from_value).collect(),
        Value::Object(_) => AdDescriptor::from_value(inner).into_iter().collect(),
        Value::Null => return Err(FetchError::malformed("empty ad payload")),
        other => {
            return Err(FetchError::malformed(format!(
                "expected object or array, got {}",
                json_kind(other)
            )));
        }
    };

    if ads.is_empty() {
        return Err(FetchError::malformed("no ad with image or video source"));
    }
    Ok(ads)
}

fn first_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn seconds_to_millis(secs: f64) -> Duration {
    Duration::from_millis((secs * 1000.0).floor() as u64)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DEFAULT: Duration = Duration::from_millis(30_000);
    const MIN: Duration = Duration::from_millis(3_000);

    #[test]
    fn maps_video_fields_and_meta() {
        let ad = AdDescriptor::from_value(&json!({
            "video_url": "https://cdn.example.com/a.mp4",
            "poster": "https://cdn.example.com/a.jpg",
            "imageUrl": "https://cdn.example.com/a-still.jpg",
            "buttonLink": "https://shop.example.com/deal",
            "title": "Deal",
            "meta": { "name": "summer-sale", "weight": 3, "duration": 12.5, "loop": false }
        }))
        .unwrap();

        assert_eq!(ad.id, "summer-sale");
        assert_eq!(ad.media_kind, MediaKind::Video);
        assert_eq!(ad.media_url, "https://cdn.example.com/a.mp4");
        assert_eq!(ad.poster_url.as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(ad.image_url.as_deref(), Some("https://cdn.example.com/a-still.jpg"));
        assert_eq!(ad.link_url.as_deref(), Some("https://shop.example.com/deal"));
        assert_eq!(ad.weight, 3.0);
        assert_eq!(ad.duration_seconds, Some(12.5));
        assert!(!ad.loop_media);
    }

    #[test]
    fn id_falls_back_to_media_url() {
        let ad = AdDescriptor::from_value(&json!({ "image": "/img/banner.png" })).unwrap();
        assert_eq!(ad.id, "/img/banner.png");
        assert_eq!(ad.media_kind, MediaKind::Image);
        assert_eq!(ad.weight, 1.0);
    }

    #[test]
    fn negative_weight_is_clamped() {
        let ad = AdDescriptor::from_value(&json!({
            "imageSrc": "/a.png",
            "meta": { "weight": -4 }
        }))
        .unwrap();
        assert_eq!(ad.weight, 0.0);
    }

    #[test]
    fn missing_media_is_rejected() {
        assert!(AdDescriptor::from_value(&json!({ "title": "nothing" })).is_none());
        assert!(matches!(
            parse_payload(&json!({ "meta": { "name": "x" } })),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(parse_payload(&json!("hello")), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn unwraps_envelope_and_arrays() {
        let ads = parse_payload(&json!({
            "ad": [
                { "imageSrc": "/a.png", "meta": { "name": "a" } },
                { "title": "no media" },
                { "videoSrc": "/b.mp4", "meta": { "name": "b" } }
            ]
        }))
        .unwrap();
        let ids: Vec<_> = ads.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn duration_drives_next_delay_when_not_looping() {
        let ad = AdDescriptor::from_value(&json!({
            "imageSrc": "/a.png",
            "meta": { "duration": 10, "loop": false }
        }))
        .unwrap();
        assert_eq!(ad.next_delay(DEFAULT, MIN), Duration::from_millis(10_000));
    }

    #[test]
    fn looping_ad_uses_default_interval() {
        let ad = AdDescriptor::from_value(&json!({
            "videoSrc": "/a.mp4",
            "meta": { "duration": 10, "loop": true }
        }))
        .unwrap();
        assert_eq!(ad.next_delay(DEFAULT, MIN), DEFAULT);
        assert!(ad.video_loops());
    }

    #[test]
    fn short_duration_is_floored_to_minimum() {
        let ad = AdDescriptor::from_value(&json!({
            "imageSrc": "/a.png",
            "meta": { "duration": 1 }
        }))
        .unwrap();
        assert_eq!(ad.next_delay(DEFAULT, MIN), MIN);
        assert_eq!(ad.display_interval(DEFAULT, MIN), MIN);
    }

    #[test]
    fn video_without_duration_loops() {
        let ad = AdDescriptor::from_value(&json!({ "videoSrc": "/a.mp4" })).unwrap();
        assert!(!ad.loop_media);
        assert!(ad.video_loops());
        assert_eq!(ad.next_delay(DEFAULT, MIN), DEFAULT);
    }
}
