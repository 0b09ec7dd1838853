//! Student state: the loose caller-supplied profile and its canonical form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest and highest mastery levels.
pub const MASTERY_MIN: u8 = 1;
pub const MASTERY_MAX: u8 = 10;

/// How the tutor should present material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachingStyle {
    #[default]
    Direct,
    Socratic,
    Visual,
    FlippedClassroom,
}

impl TeachingStyle {
    /// Parse a caller string, tolerating case and separator differences.
    /// Returns `None` for anything outside the known set.
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "direct" => Some(Self::Direct),
            "socratic" => Some(Self::Socratic),
            "visual" => Some(Self::Visual),
            "flipped_classroom" | "flipped" => Some(Self::FlippedClassroom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Socratic => "socratic",
            Self::Visual => "visual",
            Self::FlippedClassroom => "flipped_classroom",
        }
    }
}

impl fmt::Display for TeachingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The student's current emotional state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    #[default]
    Focused,
    Anxious,
    Confused,
    Tired,
}

impl EmotionalState {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "focused" | "motivated" => Some(Self::Focused),
            "anxious" | "worried" => Some(Self::Anxious),
            "confused" | "lost" => Some(Self::Confused),
            "tired" | "exhausted" => Some(Self::Tired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Focused => "focused",
            Self::Anxious => "anxious",
            Self::Confused => "confused",
            Self::Tired => "tired",
        }
    }

    /// States in which material should be eased.
    pub fn needs_support(&self) -> bool {
        matches!(self, Self::Anxious | Self::Confused | Self::Tired)
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's student profile, as sent. Every field is optional and
/// scalar fields accept loose types (a mastery level may arrive as `"7"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub learning_style_summary: Option<String>,
    #[serde(default)]
    pub emotional_state_summary: Option<String>,
    #[serde(default)]
    pub mastery_level_summary: Option<String>,
    #[serde(default)]
    pub teaching_style: Option<String>,
    #[serde(default)]
    pub emotional_state: Option<String>,
    #[serde(default)]
    pub mastery_level: Option<serde_json::Value>,
}

/// Canonical personalization context, built once per request and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationContext {
    pub teaching_style: TeachingStyle,
    pub emotional_state: EmotionalState,
    /// Always within `MASTERY_MIN..=MASTERY_MAX`.
    pub mastery_level: u8,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub learning_style_summary: String,
    #[serde(default)]
    pub emotional_state_summary: String,
    #[serde(default)]
    pub mastery_level_summary: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for PersonalizationContext {
    fn default() -> Self {
        Self {
            teaching_style: TeachingStyle::Direct,
            emotional_state: EmotionalState::Focused,
            mastery_level: 5,
            grade_level: None,
            learning_style_summary: String::new(),
            emotional_state_summary: String::new(),
            mastery_level_summary: String::new(),
            user_id: None,
            name: None,
        }
    }
}

/// Lowercase and fold spaces and dashes to underscores.
pub(crate) fn normalize_token(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
