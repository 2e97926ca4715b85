use crate::config::ForecastPolicy;
use crate::models::{CycleRecord, FlowCategory};

/// Predict the next period's flow from recent records (newest first).
///
/// Looks at the `flow_window` most recent records that carry a category,
/// counts each category once per record and gives the newest
/// `flow_recency_count` of them an extra `flow_recency_bonus`. `None` means no
/// flow data exists; it is not a default category.
///
/// Ties go to the category that appears first in newest-first order.
pub fn predict(records: &[CycleRecord], policy: &ForecastPolicy) -> Option<FlowCategory> {
    let recent: Vec<FlowCategory> = records
        .iter()
        .filter_map(|r| r.flow)
        .take(policy.flow_window)
        .collect();

    // (category, tally) in order of first appearance
    let mut tallies: Vec<(FlowCategory, f64)> = Vec::with_capacity(FlowCategory::ALL.len());
    for (i, category) in recent.iter().enumerate() {
        let bonus = if i < policy.flow_recency_count {
            policy.flow_recency_bonus
        } else {
            0.0
        };
        match tallies.iter_mut().find(|(c, _)| c == category) {
            Some((_, tally)) => *tally += 1.0 + bonus,
            None => tallies.push((*category, 1.0 + bonus)),
        }
    }

    tallies
        .into_iter()
        .fold(None, |best: Option<(FlowCategory, f64)>, (category, tally)| match best {
            Some((_, best_tally)) if best_tally >= tally => best,
            _ => Some((category, tally)),
        })
        .map(|(category, _)| category)
}
