//! Keyword heuristics applied to a description when a task is first created.

use crate::TaskPriority;

const HIGH_PRIORITY_KEYWORDS: &[&str] = &["spill", "broken", "dirty", "stain", "mess", "urgent"];
const MEDIUM_PRIORITY_KEYWORDS: &[&str] = &["organize", "clean", "wipe", "vacuum"];

const QUICK_TASK_KEYWORDS: &[&str] = &["pick up", "put away", "close", "turn off"];
const MEDIUM_TASK_KEYWORDS: &[&str] = &["wipe", "clean", "organize", "fold"];
const LONG_TASK_KEYWORDS: &[&str] = &["vacuum", "mop", "deep clean", "scrub"];

const QUICK_TASK_MINUTES: u32 = 2;
const MEDIUM_TASK_MINUTES: u32 = 5;
const LONG_TASK_MINUTES: u32 = 15;
const DEFAULT_TASK_MINUTES: u32 = 3;

pub fn classify_priority(description: &str) -> TaskPriority {
    let lowered = description.to_lowercase();
    if contains_any(&lowered, HIGH_PRIORITY_KEYWORDS) {
        TaskPriority::High
    } else if contains_any(&lowered, MEDIUM_PRIORITY_KEYWORDS) {
        TaskPriority::Medium
    } else {
        TaskPriority::Low
    }
}

/// Quick chores are checked before long ones so "pick up and vacuum" stays
/// quick; long chores are checked before medium so "deep clean" beats "clean".
pub fn estimate_duration_minutes(description: &str) -> u32 {
    let lowered = description.to_lowercase();
    if contains_any(&lowered, QUICK_TASK_KEYWORDS) {
        QUICK_TASK_MINUTES
    } else if contains_any(&lowered, LONG_TASK_KEYWORDS) {
        LONG_TASK_MINUTES
    } else if contains_any(&lowered, MEDIUM_TASK_KEYWORDS) {
        MEDIUM_TASK_MINUTES
    } else {
        DEFAULT_TASK_MINUTES
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}
