use serde::{Deserialize, Serialize};
use crate::error::PlanError;
use crate::SelectionResult;

/// One secondary clip laid over the primary footage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insertion {
    pub clip_ref: String,
    /// Seconds from the start of the primary clip (inclusive)
    pub start_offset_seconds: f64,
    pub duration_seconds: f64,
}

impl Insertion {
    pub fn end_seconds(&self) -> f64 {
        self.start_offset_seconds + self.duration_seconds
    }
}

/// Input for the renderer: the primary clip plus timed insertions.
///
/// Timing values are checked on the way in; a bad value is an error, never
/// clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPlan")]
pub struct CompositionPlan {
    pub primary: String,
    insertions: Vec<Insertion>,
}

/// Unchecked wire form; deserialized plans are rebuilt through `push`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    primary: String,
    #[serde(default)]
    insertions: Vec<Insertion>,
}

impl TryFrom<RawPlan> for CompositionPlan {
    type Error = PlanError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        let mut plan = Self::new(raw.primary)?;
        for insertion in raw.insertions {
            plan.push(insertion.clip_ref, insertion.start_offset_seconds, insertion.duration_seconds)?;
        }
        Ok(plan)
    }
}

impl CompositionPlan {
    pub fn new(primary: impl Into<String>) -> Result<Self, PlanError> {
        let primary = primary.into();
        if primary.trim().is_empty() {
            return Err(PlanError::EmptyClipRef);
        }
        Ok(Self { primary, insertions: Vec::new() })
    }

    pub fn push(&mut self, clip_ref: impl Into<String>, start_offset_seconds: f64, duration_seconds: f64) -> Result<(), PlanError> {
        let clip_ref = clip_ref.into();
        if clip_ref.trim().is_empty() {
            return Err(PlanError::EmptyClipRef);
        }
        if !start_offset_seconds.is_finite() || !duration_seconds.is_finite() {
            return Err(PlanError::NonFinite(clip_ref));
        }
        if start_offset_seconds < 0.0 {
            return Err(PlanError::NegativeOffset { clip_ref, offset: start_offset_seconds });
        }
        if duration_seconds <= 0.0 {
            return Err(PlanError::NonPositiveDuration { clip_ref, duration: duration_seconds });
        }

        self.insertions.push(Insertion {
            clip_ref,
            start_offset_seconds,
            duration_seconds,
        });
        Ok(())
    }

    /// Lays the selected clips out one after another starting at `start`,
    /// each lasting `duration` with `gap` seconds between them.
    pub fn from_selections(
        primary: impl Into<String>,
        selections: &[SelectionResult],
        start: f64,
        duration: f64,
        gap: f64,
    ) -> Result<Self, PlanError> {
        let mut plan = Self::new(primary)?;
        let mut offset = start;
        for selection in selections {
            plan.push(selection.clip_key.clone(), offset, duration)?;
            offset += duration + gap;
        }
        Ok(plan)
    }

    pub fn insertions(&self) -> &[Insertion] {
        &self.insertions
    }

    /// End of the last insertion, 0 when there are none.
    pub fn end_seconds(&self) -> f64 {
        self.insertions
            .iter()
            .map(Insertion::end_seconds)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(key: &str) -> SelectionResult {
        SelectionResult {
            clip_key: key.into(),
            matched_tags: vec!["coding".into()],
            score: 1.0,
            precision: 1.0,
            usage_count_at_selection: 0,
        }
    }

    #[test]
    fn test_push_rejects_negative_offset() {
        let mut plan = CompositionPlan::new("a_roll.mp4").unwrap();
        let err = plan.push("b1.mp4", -1.0, 5.0).unwrap_err();
        assert!(matches!(err, PlanError::NegativeOffset { .. }));
        assert!(plan.insertions().is_empty());
    }

    #[test]
    fn test_push_rejects_bad_duration() {
        let mut plan = CompositionPlan::new("a_roll.mp4").unwrap();
        assert!(matches!(plan.push("b1.mp4", 1.0, 0.0), Err(PlanError::NonPositiveDuration { .. })));
        assert!(matches!(plan.push("b1.mp4", 1.0, -3.0), Err(PlanError::NonPositiveDuration { .. })));
        assert_eq!(plan.push("b1.mp4", f64::NAN, 1.0), Err(PlanError::NonFinite("b1.mp4".into())));
        assert_eq!(plan.push(" ", 1.0, 1.0), Err(PlanError::EmptyClipRef));
    }

    #[test]
    fn test_from_selections_layout() {
        let picks = vec![selection("b1.mp4"), selection("b2.mp4")];
        let plan = CompositionPlan::from_selections("a_roll.mp4", &picks, 7.0, 5.0, 1.0).unwrap();

        assert_eq!(plan.insertions().len(), 2);
        assert_eq!(plan.insertions()[0].start_offset_seconds, 7.0);
        assert_eq!(plan.insertions()[1].start_offset_seconds, 13.0);
        assert_eq!(plan.end_seconds(), 18.0);
    }

    #[test]
    fn test_from_selections_fails_loudly() {
        let picks = vec![selection("b1.mp4")];
        assert!(CompositionPlan::from_selections("a_roll.mp4", &picks, -2.0, 5.0, 0.0).is_err());
        assert!(CompositionPlan::new("").is_err());
    }

    #[test]
    fn test_deserialize_validates_timings() {
        let ok = r#"{"primary":"a_roll.mp4","insertions":[{"clipRef":"b1.mp4","startOffsetSeconds":2.0,"durationSeconds":3.0}]}"#;
        let plan: CompositionPlan = serde_json::from_str(ok).unwrap();
        assert_eq!(plan.end_seconds(), 5.0);

        let negative = r#"{"primary":"a_roll.mp4","insertions":[{"clipRef":"b1.mp4","startOffsetSeconds":-1.0,"durationSeconds":3.0}]}"#;
        let err = serde_json::from_str::<CompositionPlan>(negative).unwrap_err();
        assert!(err.to_string().contains("b1.mp4"), "{}", err);

        let zero = r#"{"primary":"a_roll.mp4","insertions":[{"clipRef":"b1.mp4","startOffsetSeconds":1.0,"durationSeconds":0}]}"#;
        assert!(serde_json::from_str::<CompositionPlan>(zero).is_err());
        assert!(serde_json::from_str::<CompositionPlan>(r#"{"primary":""}"#).is_err());
    }
}
