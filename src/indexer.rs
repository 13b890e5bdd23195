/// Derived read-only views over page records: grouping, ordering, search
use crate::normalize::origin_of;
use crate::page_data::{PageRecord, Status};
use std::collections::BTreeMap;

/// Group records by origin. Keys that do not parse as urls are skipped.
pub fn group_by_origin(records: Vec<PageRecord>) -> BTreeMap<String, Vec<PageRecord>> {
    records
        .into_iter()
        .filter_map(|record| origin_of(&record.key).map(|origin| (origin, record)))
        .fold(BTreeMap::new(), |mut groups, (origin, record)| {
            groups.entry(origin).or_insert_with(Vec::new).push(record);
            groups
        })
}

pub fn group_by_status(records: Vec<PageRecord>) -> BTreeMap<Status, Vec<PageRecord>> {
    records.into_iter().fold(BTreeMap::new(), |mut groups, record| {
        groups.entry(record.status()).or_insert_with(Vec::new).push(record);
        groups
    })
}

/// Open work first, finished pages last.
fn status_rank(status: Status) -> i8 {
    match status {
        Status::Started => 2,
        Status::Todo => 1,
        Status::Done => -1,
        _ => 0,
    }
}

/// Sort by status rank, then by url. Stable.
pub fn sort_by_status(records: &mut [PageRecord]) {
    records.sort_by(|a, b| {
        status_rank(b.status())
            .cmp(&status_rank(a.status()))
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Keep records whose title or url contains any of the whitespace-separated terms.
///
/// Matching is case-insensitive; an empty search keeps everything.
pub fn filter_pages(records: &[PageRecord], search: &str) -> Vec<PageRecord> {
    let terms: Vec<String> = search.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|record| {
            let url = record.key.to_lowercase();
            let title = record
                .properties
                .title
                .as_deref()
                .unwrap_or_default()
                .to_lowercase();
            terms
                .iter()
                .any(|term| url.contains(term.as_str()) || title.contains(term.as_str()))
        })
        .cloned()
        .collect()
}

/// Per-origin progress line: `origin (done/total)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginSummary {
    pub origin: String,
    pub done: usize,
    pub total: usize,
}

pub fn origin_summaries(groups: &BTreeMap<String, Vec<PageRecord>>) -> Vec<OriginSummary> {
    groups
        .iter()
        .map(|(origin, records)| OriginSummary {
            origin: origin.clone(),
            done: records.iter().filter(|r| r.status() == Status::Done).count(),
            total: records.len(),
        })
        .collect()
}
