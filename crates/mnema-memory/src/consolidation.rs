// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory consolidation suggestions.
//!
//! Scans a scope's memories for groups sharing a tag, written close
//! together in time, and mutually similar. Suggestions are advisory only;
//! nothing is merged or deleted without an explicit apply step.

use std::collections::{BTreeMap, HashSet};

use chrono::Duration;
use mnema_config::ConsolidationConfig;

use crate::similarity::cosine_similarity;
use crate::types::{ConsolidationSuggestion, ConsolidationType, MemoryRecord};

/// Merge is only proposed when the combined content stays short enough to
/// read as one memory; longer groups get a summarize proposal instead.
const MERGE_CONTENT_LIMIT: usize = 500;

/// Thresholds controlling when a group of memories becomes a suggestion.
#[derive(Debug, Clone)]
pub struct ConsolidationCriteria {
    pub min_memories: usize,
    pub max_time_span: Duration,
    pub similarity_threshold: f32,
    pub max_suggestions: usize,
}

impl ConsolidationCriteria {
    pub fn from_config(config: &ConsolidationConfig) -> Self {
        Self {
            min_memories: config.min_memories.max(2),
            max_time_span: Duration::days(config.max_time_span_days as i64),
            similarity_threshold: config.similarity_threshold as f32,
            max_suggestions: config.max_suggestions,
        }
    }
}

impl Default for ConsolidationCriteria {
    fn default() -> Self {
        Self::from_config(&ConsolidationConfig::default())
    }
}

/// Propose consolidations over one scope's memories.
///
/// Groups are keyed by shared tag; within a group, the densest run of
/// records inside the time span is checked for mutual similarity. Output
/// is deterministic for a given input: groups are visited in tag order
/// and suggestions are ranked by confidence.
pub fn suggest_consolidations(
    records: &[MemoryRecord],
    criteria: &ConsolidationCriteria,
) -> Vec<ConsolidationSuggestion> {
    // BTreeMap keeps tag iteration order stable.
    let mut by_tag: BTreeMap<&str, Vec<&MemoryRecord>> = BTreeMap::new();
    for record in records {
        for tag in &record.tags {
            by_tag.entry(tag.as_str()).or_default().push(record);
        }
    }

    let mut suggestions: Vec<ConsolidationSuggestion> = Vec::new();
    let mut seen_groups: HashSet<Vec<String>> = HashSet::new();

    for (tag, mut group) in by_tag {
        if group.len() < criteria.min_memories {
            continue;
        }
        group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let Some(run) = densest_run(&group, criteria.max_time_span) else {
            continue;
        };
        if run.len() < criteria.min_memories {
            continue;
        }

        let Some(confidence) = mutual_similarity(&run, criteria.similarity_threshold) else {
            continue;
        };

        let mut ids: Vec<String> = run.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        if !seen_groups.insert(ids.clone()) {
            continue;
        }

        let same_type = run.iter().all(|r| r.memory_type == run[0].memory_type);
        let total_len: usize = run.iter().map(|r| r.content.len()).sum();
        let kind = if same_type && total_len <= MERGE_CONTENT_LIMIT {
            ConsolidationType::Merge
        } else {
            ConsolidationType::Summarize
        };

        let span_days = (run[run.len() - 1].created_at - run[0].created_at).num_days();
        suggestions.push(ConsolidationSuggestion {
            memory_ids: ids,
            kind,
            reason: format!(
                "{} memories tagged `{tag}` within {span_days} day(s), all pairwise similar",
                run.len()
            ),
            confidence: confidence as f64,
            suggested_title: format!("{tag} ({} memories)", run.len()),
        });
    }

    suggestions.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.memory_ids.cmp(&b.memory_ids))
    });
    suggestions.truncate(criteria.max_suggestions);
    suggestions
}

/// Longest run of consecutive (time-ordered) records whose age spread fits
/// in `max_span`. Ties go to the most recent run.
fn densest_run<'a>(
    sorted: &[&'a MemoryRecord],
    max_span: Duration,
) -> Option<Vec<&'a MemoryRecord>> {
    let mut best: Option<(usize, usize)> = None;
    let mut start = 0;
    for end in 0..sorted.len() {
        while sorted[end].created_at - sorted[start].created_at > max_span {
            start += 1;
        }
        let len = end - start + 1;
        if best.map(|(s, e)| e - s + 1).unwrap_or(0) <= len {
            best = Some((start, end));
        }
    }
    best.map(|(s, e)| sorted[s..=e].to_vec())
}

/// Mean pairwise cosine similarity if every pair clears the threshold,
/// otherwise None. Dimension mismatches fail the group.
fn mutual_similarity(run: &[&MemoryRecord], threshold: f32) -> Option<f32> {
    let mut total = 0.0_f32;
    let mut pairs = 0usize;
    for i in 0..run.len() {
        for j in (i + 1)..run.len() {
            if run[i].embedding.len() != run[j].embedding.len() {
                return None;
            }
            let sim = cosine_similarity(&run[i].embedding, &run[j].embedding);
            if sim < threshold {
                return None;
            }
            total += sim;
            pairs += 1;
        }
    }
    if pairs == 0 {
        return None;
    }
    Some(total / pairs as f32)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::testing::make_record;
    use crate::types::{MemoryScope, MemoryType};

    fn tagged_record(
        id: &str,
        tag: &str,
        embedding: Vec<f32>,
        age_hours: i64,
    ) -> MemoryRecord {
        let mut record = make_record(id, MemoryScope::user("alice"), "note", embedding);
        record.tags = vec![tag.to_string()];
        record.created_at = Utc::now() - Duration::hours(age_hours);
        record
    }

    #[test]
    fn similar_recent_group_yields_suggestion() {
        let records: Vec<MemoryRecord> = (0..6)
            .map(|i| {
                tagged_record(
                    &format!("m{i}"),
                    "coffee",
                    vec![1.0, 0.05 * i as f32, 0.0],
                    i * 8,
                )
            })
            .collect();

        let suggestions = suggest_consolidations(&records, &ConsolidationCriteria::default());
        assert_eq!(suggestions.len(), 1);
        let suggestion = &suggestions[0];
        assert_eq!(suggestion.memory_ids.len(), 6);
        assert_eq!(suggestion.kind, ConsolidationType::Merge);
        assert!(suggestion.confidence > 0.7);
        assert!(suggestion.reason.contains("coffee"));
    }

    #[test]
    fn too_few_memories_yield_nothing() {
        let records: Vec<MemoryRecord> = (0..3)
            .map(|i| tagged_record(&format!("m{i}"), "coffee", vec![1.0, 0.0], i))
            .collect();
        let suggestions = suggest_consolidations(&records, &ConsolidationCriteria::default());
        assert!(suggestions.is_empty());
    }

    #[test]
    fn dissimilar_group_yields_nothing() {
        let records = vec![
            tagged_record("m0", "misc", vec![1.0, 0.0, 0.0], 0),
            tagged_record("m1", "misc", vec![0.0, 1.0, 0.0], 1),
            tagged_record("m2", "misc", vec![0.0, 0.0, 1.0], 2),
            tagged_record("m3", "misc", vec![1.0, 1.0, 0.0], 3),
            tagged_record("m4", "misc", vec![0.0, 1.0, 1.0], 4),
        ];
        let suggestions = suggest_consolidations(&records, &ConsolidationCriteria::default());
        assert!(suggestions.is_empty());
    }

    #[test]
    fn wide_time_span_shrinks_to_densest_run() {
        // Five old records far in the past plus five recent ones. Only the
        // recent run fits the window.
        let mut records = Vec::new();
        for i in 0..5 {
            records.push(tagged_record(
                &format!("old{i}"),
                "coffee",
                vec![1.0, 0.0],
                24 * 30 + i,
            ));
        }
        for i in 0..5 {
            records.push(tagged_record(&format!("new{i}"), "coffee", vec![1.0, 0.0], i));
        }

        let suggestions = suggest_consolidations(&records, &ConsolidationCriteria::default());
        assert_eq!(suggestions.len(), 1);
        assert!(
            suggestions[0]
                .memory_ids
                .iter()
                .all(|id| id.starts_with("new"))
        );
    }

    #[test]
    fn mixed_types_or_long_content_become_summarize() {
        let mut records: Vec<MemoryRecord> = (0..5)
            .map(|i| tagged_record(&format!("m{i}"), "notes", vec![1.0, 0.0], i))
            .collect();
        records[0].memory_type = MemoryType::Fact;
        records[1].memory_type = MemoryType::Preference;

        let suggestions = suggest_consolidations(&records, &ConsolidationCriteria::default());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, ConsolidationType::Summarize);
    }

    #[test]
    fn suggestions_are_capped() {
        let mut records = Vec::new();
        for tag in ["a", "b", "c", "d", "e"] {
            for i in 0..5 {
                records.push(tagged_record(&format!("{tag}{i}"), tag, vec![1.0, 0.0], i));
            }
        }
        let criteria = ConsolidationCriteria::default();
        let suggestions = suggest_consolidations(&records, &criteria);
        assert_eq!(suggestions.len(), criteria.max_suggestions);
    }

    #[test]
    fn output_is_deterministic() {
        let records: Vec<MemoryRecord> = (0..6)
            .map(|i| tagged_record(&format!("m{i}"), "coffee", vec![1.0, 0.0], i))
            .collect();
        let criteria = ConsolidationCriteria::default();
        let first = suggest_consolidations(&records, &criteria);
        let second = suggest_consolidations(&records, &criteria);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].memory_ids, second[0].memory_ids);
    }
}
