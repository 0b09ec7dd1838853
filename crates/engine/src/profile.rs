//! Profile normalizer: loose caller profile to [`PersonalizationContext`].
//!
//! Never fails. Unknown styles and states fall back to `direct` and
//! `focused`; an out-of-range mastery level is clamped. Both produce a
//! warning. Scalars the caller left out are inferred from the free-text
//! summaries.

use serde::Serialize;
use tracing::warn;
use tutorlink_core::personalization::{
    EmotionalState, PersonalizationContext, StudentProfile, TeachingStyle, MASTERY_MAX, MASTERY_MIN,
};

const DEFAULT_MASTERY: u8 = 5;

/// The normalized context and anything that had to be adjusted.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedProfile {
    pub context: PersonalizationContext,
    pub warnings: Vec<String>,
}

pub fn normalize(raw: &StudentProfile) -> NormalizedProfile {
    let mut warnings = Vec::new();
    let learning = raw.learning_style_summary.clone().unwrap_or_default();
    let emotional = raw.emotional_state_summary.clone().unwrap_or_default();
    let mastery_summary = raw.mastery_level_summary.clone().unwrap_or_default();

    let teaching_style = match raw.teaching_style.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => TeachingStyle::parse(s).unwrap_or_else(|| {
            warnings.push(format!("unknown teaching style '{s}', using direct"));
            TeachingStyle::Direct
        }),
        None => infer_teaching_style(&learning),
    };

    let emotional_state = match raw.emotional_state.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => EmotionalState::parse(s).unwrap_or_else(|| {
            warnings.push(format!("unknown emotional state '{s}', using focused"));
            EmotionalState::Focused
        }),
        None => infer_emotional_state(&emotional),
    };

    let explicit_mastery = raw.mastery_level.as_ref().and_then(|v| {
        let parsed = mastery_from_json(v);
        if parsed.is_none() && !v.is_null() {
            warnings.push(format!("unreadable mastery level {v}, inferring from summary"));
        }
        parsed
    });
    let raw_mastery = explicit_mastery
        .or_else(|| infer_mastery(&mastery_summary))
        .unwrap_or(DEFAULT_MASTERY as i64);
    let mastery_level = clamp_mastery(raw_mastery, &mut warnings);

    for w in &warnings {
        warn!(user_id = raw.user_id.as_deref().unwrap_or("-"), "{w}");
    }

    NormalizedProfile {
        context: PersonalizationContext {
            teaching_style,
            emotional_state,
            mastery_level,
            grade_level: raw.grade_level.clone(),
            learning_style_summary: learning,
            emotional_state_summary: emotional,
            mastery_level_summary: mastery_summary,
            user_id: raw.user_id.clone(),
            name: raw.name.clone(),
        },
        warnings,
    }
}

fn clamp_mastery(level: i64, warnings: &mut Vec<String>) -> u8 {
    let clamped = level.clamp(MASTERY_MIN as i64, MASTERY_MAX as i64);
    if clamped != level {
        warnings.push(format!("mastery level {level} clamped to {clamped}"));
    }
    clamped as u8
}

fn mastery_from_json(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64),
        _ => None,
    }
}

fn infer_teaching_style(summary: &str) -> TeachingStyle {
    let s = summary.to_lowercase();
    if ["visual", "image", "diagram"].iter().any(|k| s.contains(k)) {
        TeachingStyle::Visual
    } else if ["question", "discussion", "socratic"].iter().any(|k| s.contains(k)) {
        TeachingStyle::Socratic
    } else if ["application", "practice", "hands-on"].iter().any(|k| s.contains(k)) {
        TeachingStyle::FlippedClassroom
    } else {
        TeachingStyle::Direct
    }
}

fn infer_emotional_state(summary: &str) -> EmotionalState {
    let s = summary.to_lowercase();
    if s.contains("anxious") || s.contains("worried") {
        EmotionalState::Anxious
    } else if s.contains("confused") || s.contains("lost") {
        EmotionalState::Confused
    } else if s.contains("tired") || s.contains("exhausted") {
        EmotionalState::Tired
    } else {
        EmotionalState::Focused
    }
}

/// "Level 7 ..." first, then keyword tiers.
fn infer_mastery(summary: &str) -> Option<i64> {
    let lower = summary.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    for pair in words.windows(2) {
        if pair[0] == "level"
            && let Ok(n) = pair[1].parse::<i64>()
        {
            return Some(n);
        }
    }

    words.iter().find_map(|w| match *w {
        "foundation" | "foundational" | "beginner" => Some(1),
        "building" => Some(4),
        "good" => Some(6),
        "proficient" => Some(7),
        "advanced" => Some(9),
        "master" | "mastered" | "expert" => Some(10),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_teaching_style_degrades_to_direct() {
        let raw = StudentProfile {
            teaching_style: Some("quantum".into()),
            ..Default::default()
        };
        let out = normalize(&raw);
        assert_eq!(out.context.teaching_style, TeachingStyle::Direct);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn mastery_is_clamped_with_warning() {
        let raw = StudentProfile {
            mastery_level: Some(json!(14)),
            ..Default::default()
        };
        let out = normalize(&raw);
        assert_eq!(out.context.mastery_level, 10);
        assert!(out.warnings[0].contains("clamped"));

        let low = normalize(&StudentProfile {
            mastery_level: Some(json!(-2)),
            ..Default::default()
        });
        assert_eq!(low.context.mastery_level, 1);
    }

    #[test]
    fn mastery_accepts_strings() {
        let out = normalize(&StudentProfile {
            mastery_level: Some(json!("6")),
            ..Default::default()
        });
        assert_eq!(out.context.mastery_level, 6);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn empty_profile_uses_neutral_defaults() {
        let out = normalize(&StudentProfile::default());
        assert_eq!(out.context.teaching_style, TeachingStyle::Direct);
        assert_eq!(out.context.emotional_state, EmotionalState::Focused);
        assert_eq!(out.context.mastery_level, 5);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn scalars_inferred_from_summaries() {
        let raw = StudentProfile {
            learning_style_summary: Some("Learns best with diagrams and visual aids".into()),
            emotional_state_summary: Some("Seems worried about the upcoming exam".into()),
            mastery_level_summary: Some("Level 7 - proficient with the basics".into()),
            ..Default::default()
        };
        let ctx = normalize(&raw).context;
        assert_eq!(ctx.teaching_style, TeachingStyle::Visual);
        assert_eq!(ctx.emotional_state, EmotionalState::Anxious);
        assert_eq!(ctx.mastery_level, 7);
    }

    #[test]
    fn mastery_keywords() {
        assert_eq!(infer_mastery("Building foundational knowledge"), Some(4));
        assert_eq!(infer_mastery("Has mastered the material"), Some(10));
        assert_eq!(infer_mastery("no signal here"), None);
    }

    #[test]
    fn explicit_values_win_over_summaries() {
        let raw = StudentProfile {
            teaching_style: Some("socratic".into()),
            learning_style_summary: Some("visual learner".into()),
            mastery_level: Some(json!(3)),
            mastery_level_summary: Some("Level 9".into()),
            ..Default::default()
        };
        let ctx = normalize(&raw).context;
        assert_eq!(ctx.teaching_style, TeachingStyle::Socratic);
        assert_eq!(ctx.mastery_level, 3);
    }
}
