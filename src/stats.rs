use chrono::{DateTime, Datelike, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// How many entries the language and topic tables keep.
pub const TOP_N: usize = 5;

/// One repository owned by the analyzed account, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub name: String,
    pub primary_language: Option<String>,
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub is_fork: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of<T: Datelike>(date: &T) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Statistics derived from one fetch+aggregate pass.
///
/// Both frequency tables are ordered by descending count with ties kept in
/// the order the key was first seen. `monthly_activity` is sparse: a month
/// only appears if at least one repository was created in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub subject_username: String,
    pub analysis_year: i32,
    pub language_counts: Vec<(String, u64)>,
    pub topic_counts: Vec<(String, u64)>,
    pub monthly_activity: Vec<(YearMonth, u64)>,
}

impl AnalysisResult {
    pub fn total_new_repositories(&self) -> u64 {
        self.monthly_activity.iter().map(|(_, n)| n).sum()
    }
}

/// Build the three statistics tables from a complete record set.
///
/// Forks are dropped before anything is counted.
pub fn aggregate(
    subject_username: &str,
    records: &[RepositoryRecord],
    reference_year: i32,
) -> AnalysisResult {
    let originals: Vec<&RepositoryRecord> = records.iter().filter(|r| !r.is_fork).collect();

    let language_counts = top_counts(
        originals.iter().filter_map(|r| r.primary_language.as_deref()),
        TOP_N,
    );
    let topic_counts = top_counts(
        originals.iter().flat_map(|r| r.topics.iter().map(String::as_str)),
        TOP_N,
    );

    let mut months: BTreeMap<YearMonth, u64> = BTreeMap::new();
    for r in originals
        .iter()
        .filter(|r| r.created_at.year() == reference_year)
    {
        *months.entry(YearMonth::of(&r.created_at)).or_insert(0) += 1;
    }

    AnalysisResult {
        subject_username: subject_username.to_string(),
        analysis_year: reference_year,
        language_counts,
        topic_counts,
        monthly_activity: months.into_iter().collect(),
    }
}

/// Count occurrences and keep the `limit` most frequent.
///
/// Equal counts keep first-seen order (`sort_by` is stable).
fn top_counts<'a>(items: impl Iterator<Item = &'a str>, limit: usize) -> Vec<(String, u64)> {
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut counts: Vec<(&'a str, u64)> = Vec::new();

    for item in items {
        match index.get(item) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(item, counts.len());
                counts.push((item, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(k, n)| (k.to_string(), n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn record(
        language: Option<&str>,
        topics: &[&str],
        created: (i32, u32, u32),
        is_fork: bool,
    ) -> RepositoryRecord {
        RepositoryRecord {
            name: format!("repo-{}-{}-{}", created.0, created.1, created.2),
            primary_language: language.map(str::to_string),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            created_at: Utc
                .with_ymd_and_hms(created.0, created.1, created.2, 12, 0, 0)
                .unwrap(),
            is_fork,
        }
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth { year, month }
    }

    fn owned(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
        pairs.iter().map(|(k, n)| (k.to_string(), *n)).collect()
    }

    #[test]
    fn mixed_profile_scenario() {
        let records = vec![
            record(Some("Go"), &["cli"], (2024, 1, 10), false),
            record(Some("Go"), &[], (2024, 1, 20), false),
            record(Some("Rust"), &["cli", "systems"], (2023, 5, 1), false),
            record(Some("Python"), &["cli"], (2024, 2, 3), true),
        ];

        let result = aggregate("octocat", &records, 2024);

        assert_eq!(result.language_counts, owned(&[("Go", 2), ("Rust", 1)]));
        assert_eq!(result.topic_counts, owned(&[("cli", 2), ("systems", 1)]));
        assert_eq!(result.monthly_activity, vec![(ym(2024, 1), 2)]);
        assert_eq!(result.subject_username, "octocat");
        assert_eq!(result.analysis_year, 2024);
    }

    #[test]
    fn empty_input_gives_empty_tables() {
        let result = aggregate("nobody", &[], 2024);
        assert!(result.language_counts.is_empty());
        assert!(result.topic_counts.is_empty());
        assert!(result.monthly_activity.is_empty());
        assert_eq!(result.total_new_repositories(), 0);
    }

    #[test]
    fn forks_only_contribute_nothing() {
        let records = vec![
            record(Some("C"), &["kernel"], (2024, 3, 1), true),
            record(Some("C"), &["kernel"], (2024, 3, 2), true),
        ];
        let result = aggregate("forker", &records, 2024);
        assert!(result.language_counts.is_empty());
        assert!(result.topic_counts.is_empty());
        assert!(result.monthly_activity.is_empty());
    }

    #[test]
    fn missing_language_is_not_a_category() {
        let records = vec![
            record(None, &[], (2022, 1, 1), false),
            record(None, &["docs"], (2022, 1, 1), false),
        ];
        let result = aggregate("u", &records, 2024);
        assert!(result.language_counts.is_empty());
        assert_eq!(result.topic_counts, owned(&[("docs", 1)]));
    }

    #[test]
    fn truncates_to_top_five_with_first_seen_ties() {
        let langs = ["A", "B", "C", "D", "E", "F", "G"];
        let mut records: Vec<_> = langs
            .iter()
            .map(|l| record(Some(*l), &[], (2020, 1, 1), false))
            .collect();
        // F takes the lead, everyone else stays tied at one.
        records.push(record(Some("F"), &[], (2020, 1, 1), false));

        let result = aggregate("u", &records, 2024);
        assert_eq!(
            result.language_counts,
            owned(&[("F", 2), ("A", 1), ("B", 1), ("C", 1), ("D", 1)])
        );
    }

    #[test]
    fn topic_truncation_keeps_first_seen_ties() {
        let records = vec![
            record(None, &["zeta", "alpha", "mid"], (2021, 1, 1), false),
            record(None, &["beta", "gamma", "delta"], (2021, 1, 1), false),
            record(None, &["omega", "mid"], (2021, 1, 1), false),
        ];
        let result = aggregate("u", &records, 2024);
        assert_eq!(
            result.topic_counts,
            owned(&[("mid", 2), ("zeta", 1), ("alpha", 1), ("beta", 1), ("gamma", 1)])
        );
    }

    #[test]
    fn repeated_topics_count_per_tag() {
        let records = vec![
            record(None, &["web", "api", "web"], (2021, 6, 1), false),
            record(None, &["api"], (2021, 6, 1), false),
        ];
        let result = aggregate("u", &records, 2024);
        assert_eq!(result.topic_counts, owned(&[("web", 2), ("api", 2)]));
    }

    #[test]
    fn monthly_activity_is_sparse_and_ordered() {
        let records = vec![
            record(None, &[], (2024, 11, 5), false),
            record(None, &[], (2024, 2, 5), false),
            record(None, &[], (2024, 2, 28), false),
            record(None, &[], (2023, 12, 31), false),
            record(None, &[], (2025, 1, 1), false),
        ];
        let result = aggregate("u", &records, 2024);
        assert_eq!(
            result.monthly_activity,
            vec![(ym(2024, 2), 2), (ym(2024, 11), 1)]
        );
        assert_eq!(result.total_new_repositories(), 3);
    }

    #[test]
    fn aggregate_is_repeatable() {
        let records = vec![
            record(Some("Go"), &["x", "y"], (2024, 4, 1), false),
            record(Some("Zig"), &["y"], (2024, 5, 1), false),
        ];
        assert_eq!(
            aggregate("u", &records, 2024),
            aggregate("u", &records, 2024)
        );
    }

    #[test]
    fn year_month_formats_with_padding() {
        assert_eq!(ym(2024, 3).to_string(), "2024-03");
    }
}
