use anyhow::Result;
use broll_common::config::{BucketerConfig, SelectorConfig};
use broll_core::{Clip, ClipSelector, CompositionPlan, ScoredTag, TagBucketer, UsageTracker};

/// Runs bucketing, selection and plan layout on canned classifier scores,
/// no LLM or metadata files needed.
fn main() -> Result<()> {
    let scored = vec![
        ScoredTag::new("coding", 0.92),
        ScoredTag::new("productivity", 0.81),
        ScoredTag::new("office_desk", 0.66),
        ScoredTag::new("office_interior", 0.63),
        ScoredTag::new("technology", 0.58),
        ScoredTag::new("ai", 0.3),
    ];

    let tags = TagBucketer::new(BucketerConfig::default()).bucket(&scored);
    println!("Tag set:");
    for tag in tags.iter() {
        println!("  {:<16} {:.2}", tag.id, tag.confidence);
    }

    let clips = vec![
        Clip::new("clips/home_office.mov", ["coding", "productivity", "home", "lifestyle"]),
        Clip::new("clips/typing_closeup.mov", ["coding", "productivity"]),
        Clip::new("clips/open_plan.mov", ["office_desk", "people", "business"]),
        Clip::new("clips/forest_walk.mov", ["nature", "calm"]),
    ];

    let selector = ClipSelector::new(SelectorConfig::default());
    let usage = UsageTracker::new();

    println!("\nRepeated single picks in one session:");
    for _ in 0..4 {
        if let Some(pick) = selector.select_best(&tags, &clips, &usage, &[], 1) {
            println!(
                "  {:<26} score={:.3} precision={:.2} prior_uses={}",
                pick.clip_key, pick.score, pick.precision, pick.usage_count_at_selection
            );
        }
    }

    usage.reset_all();
    let sequence = selector.select_sequence(&tags, &clips, &usage, 3, 1);
    let plan = CompositionPlan::from_selections("primary/talking_head.mp4", &sequence, 2.0, 3.5, 1.0)?;

    println!("\nPlan over {}:", plan.primary);
    for insertion in plan.insertions() {
        println!(
            "  {:>5.1}s  +{:.1}s  {}",
            insertion.start_offset_seconds, insertion.duration_seconds, insertion.clip_ref
        );
    }
    println!("  ends at {:.1}s", plan.end_seconds());
    Ok(())
}
