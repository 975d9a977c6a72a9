//! Line-oriented markup used by the report webhook.
//!
//! Reports are plain text where a `#`/`##`/`###` prefix marks a heading of
//! decreasing weight, a blank line is vertical spacing, and everything else
//! is body text. Rendering fidelity matters: line text passes through
//! unmodified apart from the stripped prefix.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBlock {
    Heading1(String),
    Heading2(String),
    Heading3(String),
    Spacer,
    Paragraph(String),
}

pub fn parse_report(report: &str) -> Vec<ReportBlock> {
    report.split('\n').map(parse_line).collect()
}

fn parse_line(line: &str) -> ReportBlock {
    // Deepest prefix first: "# " would otherwise shadow "## " and "### ".
    if let Some(text) = line.strip_prefix("### ") {
        return ReportBlock::Heading3(text.to_string());
    }
    if let Some(text) = line.strip_prefix("## ") {
        return ReportBlock::Heading2(text.to_string());
    }
    if let Some(text) = line.strip_prefix("# ") {
        return ReportBlock::Heading1(text.to_string());
    }
    if line.trim().is_empty() {
        return ReportBlock::Spacer;
    }
    ReportBlock::Paragraph(line.to_string())
}
