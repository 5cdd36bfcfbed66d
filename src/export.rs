use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::stats::AnalysisResult;
use crate::svg::{self, Theme};

pub fn default_prefix(username: &str) -> String {
    format!("github_analysis_{username}")
}

/// Write both charts and both tables under `dir`, returning the paths in
/// the order they were written.
pub fn export_report(
    result: &AnalysisResult,
    dir: &Path,
    prefix: &str,
    theme: Theme,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let overview_svg = dir.join(format!("{prefix}_overview.svg"));
    let activity_svg = dir.join(format!("{prefix}_activity.svg"));
    let overview_csv = dir.join(format!("{prefix}_overview.csv"));
    let activity_csv = dir.join(format!("{prefix}_activity.csv"));

    write_file(&overview_svg, svg::overview_svg(result, theme).as_bytes())?;
    write_file(&activity_svg, svg::activity_svg(result, theme).as_bytes())?;

    let mut buf = Vec::new();
    write_overview_csv(result, &mut buf)?;
    write_file(&overview_csv, &buf)?;

    buf.clear();
    write_activity_csv(result, &mut buf)?;
    write_file(&activity_csv, &buf)?;

    let written = vec![overview_svg, activity_svg, overview_csv, activity_csv];
    info!(files = written.len(), dir = %dir.display(), "report exported");
    Ok(written)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// `language,count[,topic,topic_count]`, one ranked entry per row.
///
/// The topic columns only exist when there are topics. When one table is
/// shorter, its cells in the trailing rows are left empty.
pub fn write_overview_csv<W: Write>(result: &AnalysisResult, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    let with_topics = !result.topic_counts.is_empty();

    if with_topics {
        wtr.write_record(["language", "count", "topic", "topic_count"])?;
    } else {
        wtr.write_record(["language", "count"])?;
    }

    let rows = result
        .language_counts
        .len()
        .max(if with_topics { result.topic_counts.len() } else { 0 });

    for i in 0..rows {
        let mut record: Vec<String> = Vec::with_capacity(4);
        match result.language_counts.get(i) {
            Some((lang, n)) => record.extend([lang.clone(), n.to_string()]),
            None => record.extend([String::new(), String::new()]),
        }
        if with_topics {
            match result.topic_counts.get(i) {
                Some((topic, n)) => record.extend([topic.clone(), n.to_string()]),
                None => record.extend([String::new(), String::new()]),
            }
        }
        wtr.write_record(&record)?;
    }

    wtr.flush().context("Failed to flush overview table")?;
    Ok(())
}

/// `month,new_repositories` with months as `YYYY-MM`. Header only when the
/// year had no new repositories.
pub fn write_activity_csv<W: Write>(result: &AnalysisResult, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(["month", "new_repositories"])?;
    for (month, n) in &result.monthly_activity {
        wtr.write_record([month.to_string(), n.to_string()])?;
    }
    wtr.flush().context("Failed to flush activity table")?;
    Ok(())
}
