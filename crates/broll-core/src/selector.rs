use broll_common::config::SelectorConfig;
use broll_common::{Clip, SelectionResult, TagSet};
use std::collections::{HashMap, HashSet};
use crate::usage::{bump, UsageTracker};

/// Score breakdown for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipScore {
    pub matched_tags: Vec<String>,
    /// Sum of matched confidences minus mismatch penalties, plus the multi-match bonus
    pub base: f64,
    /// `base` after the precision and usage adjustments
    pub score: f64,
    pub precision: f64,
}

/// Picks the clip whose tags best fit a `TagSet`.
///
/// Scoring, per candidate:
/// 1. each clip tag adds its confidence if requested, else subtracts `mismatch_penalty`
/// 2. more than one match adds `min(matches * match_bonus, bonus_cap)`
/// 3. precision (matches / clip tags) below the low or mid threshold scales the score down
/// 4. a clip already used `u` times in the session is scaled by
///    `max(1 - u * usage_penalty_rate, usage_floor)`
///
/// Adjustments always push the score down, also when it is negative.
#[derive(Debug, Clone, Default)]
pub struct ClipSelector {
    config: SelectorConfig,
}

impl ClipSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// `None` when the clip has no tags or shares none with `tags`.
    pub fn score_clip(&self, tags: &TagSet, clip: &Clip, usage_count: u32) -> Option<ClipScore> {
        let clip_tags = clip.distinct_tags();
        if clip_tags.is_empty() {
            return None;
        }

        let mut base = 0.0;
        let mut matched_tags = Vec::new();
        for tag in &clip_tags {
            match tags.confidence(tag) {
                Some(confidence) => {
                    base += confidence;
                    matched_tags.push(tag.to_string());
                }
                None => base -= self.config.mismatch_penalty,
            }
        }

        let matched = matched_tags.len();
        if matched == 0 {
            return None;
        }
        if matched > 1 {
            base += (matched as f64 * self.config.match_bonus).min(self.config.bonus_cap);
        }

        let precision = matched as f64 / clip_tags.len() as f64;
        let mut score = base;
        if precision < self.config.low_precision_threshold {
            score = dampen(score, self.config.low_precision_factor);
        } else if precision < self.config.mid_precision_threshold {
            score = dampen(score, self.config.mid_precision_factor);
        }

        score = dampen(score, self.usage_factor(usage_count));

        Some(ClipScore { matched_tags, base, score, precision })
    }

    /// Multiplier for a clip used `usage_count` times; 1.0 when unused.
    pub fn usage_factor(&self, usage_count: u32) -> f64 {
        if usage_count == 0 {
            return 1.0;
        }
        (1.0 - usage_count as f64 * self.config.usage_penalty_rate).max(self.config.usage_floor)
    }

    /// Best candidate not in `exclude` with at least `min_overlap` matching
    /// tags. The winner's usage count is incremented before returning.
    ///
    /// Ties keep the earlier candidate, so `candidates` must come in a
    /// stable order.
    pub fn select_best(
        &self,
        tags: &TagSet,
        candidates: &[Clip],
        usage: &UsageTracker,
        exclude: &[String],
        min_overlap: usize,
    ) -> Option<SelectionResult> {
        let excluded: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        let mut counts = usage.lock();
        self.select_locked(tags, candidates, &mut counts, &excluded, min_overlap)
    }

    /// Up to `count` distinct clips, chosen one after another so each pick
    /// sees the usage bump of the previous one. Stops at the first miss.
    pub fn select_sequence(
        &self,
        tags: &TagSet,
        candidates: &[Clip],
        usage: &UsageTracker,
        count: usize,
        min_overlap: usize,
    ) -> Vec<SelectionResult> {
        let mut results: Vec<SelectionResult> = Vec::with_capacity(count);
        let mut excluded: HashSet<&str> = HashSet::new();
        let mut counts = usage.lock();

        while results.len() < count {
            let Some(result) = self.select_locked(tags, candidates, &mut counts, &excluded, min_overlap) else {
                break;
            };
            if let Some(clip) = candidates.iter().find(|c| c.key == result.clip_key) {
                excluded.insert(clip.key.as_str());
            }
            results.push(result);
        }
        results
    }

    fn select_locked(
        &self,
        tags: &TagSet,
        candidates: &[Clip],
        counts: &mut HashMap<String, u32>,
        excluded: &HashSet<&str>,
        min_overlap: usize,
    ) -> Option<SelectionResult> {
        if tags.is_empty() {
            return None;
        }
        let min_overlap = min_overlap.max(1);

        let mut best: Option<(&Clip, ClipScore, u32)> = None;
        for clip in candidates {
            if excluded.contains(clip.key.as_str()) {
                continue;
            }
            let used = counts.get(&clip.key).copied().unwrap_or(0);
            let Some(scored) = self.score_clip(tags, clip, used) else {
                continue;
            };
            if scored.matched_tags.len() < min_overlap {
                continue;
            }
            let better = match &best {
                Some((_, current, _)) => scored.score > current.score,
                None => true,
            };
            if better {
                best = Some((clip, scored, used));
            }
        }

        let (clip, scored, used) = best?;
        bump(counts, &clip.key);
        tracing::info!(
            "Selected clip {} (score={:.3}, precision={:.2}, matched={:?}, prior_uses={})",
            clip.key, scored.score, scored.precision, scored.matched_tags, used
        );

        Some(SelectionResult {
            clip_key: clip.key.clone(),
            matched_tags: scored.matched_tags,
            score: scored.score,
            precision: scored.precision,
            usage_count_at_selection: used,
        })
    }
}

/// Scales a score towards worse: multiplies positives, divides negatives.
fn dampen(score: f64, factor: f64) -> f64 {
    if score >= 0.0 {
        score * factor
    } else {
        score / factor
    }
}
