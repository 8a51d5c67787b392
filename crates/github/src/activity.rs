use std::fmt::Write;

use sentinel_core::{models::RepoId, util::format_date};
use time::OffsetDateTime;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str { self.sha.get(..7).unwrap_or(&self.sha) }

    pub fn subject(&self) -> &str { self.message.lines().next().unwrap_or_default().trim() }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
}

/// Repository activity within a time window.
#[derive(Debug, Clone)]
pub struct Activity {
    pub repo: RepoId,
    pub since: OffsetDateTime,
    pub until: OffsetDateTime,
    pub commits: Vec<CommitSummary>,
    pub issues_closed: Vec<IssueSummary>,
    pub pulls_merged: Vec<IssueSummary>,
}

impl Activity {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# Progress for {} ({} to {})\n",
            self.repo,
            format_date(self.since),
            format_date(self.until)
        );

        out.push_str("## Commits\n");
        if self.commits.is_empty() {
            out.push_str("- None\n");
        }
        for commit in &self.commits {
            let _ = writeln!(out, "- {} ({})", commit.subject(), commit.short_sha());
        }

        out.push_str("\n## Issues Closed\n");
        write_issues(&mut out, &self.issues_closed);

        out.push_str("\n## Pull Requests Merged\n");
        write_issues(&mut out, &self.pulls_merged);
        out
    }
}

fn write_issues(out: &mut String, issues: &[IssueSummary]) {
    if issues.is_empty() {
        out.push_str("- None\n");
    }
    for issue in issues {
        let _ = writeln!(out, "- {} #{}", issue.title.trim(), issue.number);
    }
}
