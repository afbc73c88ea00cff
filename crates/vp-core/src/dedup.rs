//! Duplicate folding for batch conversion.
//!
//! Calendars that copy one job into each assignee's agenda produce several
//! confirmations for the same work. They share a date, a summary and a start
//! time, and fold into one group that converts to a single intervention.

use std::collections::HashMap;

use tracing::debug;

use crate::confirmation::Confirmation;

/// Confirmations describing one real-world job.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupGroup {
    /// The first confirmation seen for the group; its fields win.
    pub confirmation: Confirmation,
    /// Source ids of every member, in input order, without repeats.
    pub source_ids: Vec<String>,
}

/// Folds confirmations keyed by `(date, original_summary, start_time)`.
///
/// Groups come out in the order their first member appeared.
pub fn deduplicate(confirmations: Vec<Confirmation>) -> Vec<DedupGroup> {
    let total = confirmations.len();
    let mut groups: Vec<DedupGroup> = Vec::new();
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();

    for confirmation in confirmations {
        let key = (
            confirmation.date.trim().to_string(),
            confirmation.original_summary.trim().to_string(),
            confirmation.start_time.trim().to_string(),
        );
        let source_id = confirmation.source_id.trim().to_string();
        if let Some(&position) = index.get(&key) {
            let group = &mut groups[position];
            if !group.source_ids.contains(&source_id) {
                group.source_ids.push(source_id);
            }
        } else {
            index.insert(key, groups.len());
            groups.push(DedupGroup {
                confirmation,
                source_ids: vec![source_id],
            });
        }
    }

    if groups.len() < total {
        debug!(
            merged = total - groups.len(),
            groups = groups.len(),
            "folded duplicate confirmations"
        );
    }
    groups
}
