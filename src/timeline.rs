//! Read-only view of the host's timeline.
//!
//! The host owns and edits tracks; the engine only asks which light cue is
//! active at a given time. Field names follow the host's camelCase JSON.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::types::Brightness;

/// Kind of a timeline track. Only `Light` tracks drive lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrackKind {
    Media,
    Text,
    Audio,
    Light,
}

/// Kind of a timeline element.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Media,
    Text,
    Light,
    #[default]
    #[serde(other)]
    Other,
}

/// One clip on a track. Light clips carry `color`, `brightness` and
/// `light_id`.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineElement {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ElementKind,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub trim_start: f64,
    #[serde(default)]
    pub trim_end: f64,
    #[serde(default)]
    pub hidden: bool,
    pub color: Option<String>,
    pub brightness: Option<Brightness>,
    pub light_id: Option<String>,
}

/// The light-specific part of a light element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightCue<'a> {
    pub light_id: &'a str,
    pub color: &'a str,
    pub brightness: Brightness,
}

impl TimelineElement {
    /// A light clip spanning `[start_time, start_time + duration)`.
    pub fn light(
        id: &str,
        light_id: &str,
        color: &str,
        brightness: u8,
        start_time: f64,
        duration: f64,
    ) -> Self {
        TimelineElement {
            id: id.to_string(),
            name: String::new(),
            kind: ElementKind::Light,
            start_time,
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
            hidden: false,
            color: Some(color.to_string()),
            brightness: Some(Brightness::saturating(u16::from(brightness))),
            light_id: Some(light_id.to_string()),
        }
    }

    /// Visible end of the clip once trims are applied.
    pub fn end_time(&self) -> f64 {
        self.start_time + (self.duration - self.trim_start - self.trim_end)
    }

    /// Half-open containment: the start is inclusive, the end exclusive.
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// The cue of a light element. Light elements without a target light are
    /// ignored; a missing color maps to an empty string and a missing
    /// brightness to full brightness.
    pub fn light_cue(&self) -> Option<LightCue<'_>> {
        if self.kind != ElementKind::Light {
            return None;
        }
        Some(LightCue {
            light_id: self.light_id.as_deref()?,
            color: self.color.as_deref().unwrap_or(""),
            brightness: self.brightness.unwrap_or_default(),
        })
    }
}

/// A timeline track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    #[serde(default)]
    pub elements: Vec<TimelineElement>,
    #[serde(default)]
    pub muted: bool,
}

impl Track {
    pub fn new(id: &str, kind: TrackKind, elements: Vec<TimelineElement>) -> Self {
        Track {
            id: id.to_string(),
            name: String::new(),
            kind,
            elements,
            muted: false,
        }
    }

    pub fn is_light(&self) -> bool {
        self.kind == TrackKind::Light
    }

    /// The first element whose span contains `time`.
    pub fn active_element(&self, time: f64) -> Option<&TimelineElement> {
        self.elements.iter().find(|e| e.is_active_at(time))
    }
}
