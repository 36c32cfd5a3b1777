//! Dated history section of the memory document.
//!
//! The document is parsed into the text before the history heading, the dated
//! `### YYYY-MM-DD` sections under it, and whatever follows the next level-2
//! heading. Entries are appended into the section for their date and only the
//! most recent [`MAX_HISTORY_SECTIONS`] dates are kept.

use chrono::NaiveDateTime;

pub const HISTORY_HEADING: &str = "## 历史记录";
pub const MAX_HISTORY_SECTIONS: usize = 3;

const USER_SUMMARY_CHARS: usize = 60;
const ASSISTANT_SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
struct DatedSection {
    date: String,
    entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDocument {
    preamble: String,
    intro: Vec<String>,
    sections: Vec<DatedSection>,
    trailer: String,
}

fn is_level2_heading(line: &str) -> bool {
    line.starts_with("## ")
}

impl MemoryDocument {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let Some(heading_idx) = lines.iter().position(|l| l.trim() == HISTORY_HEADING) else {
            return Self {
                preamble: text.trim_end().to_string(),
                intro: Vec::new(),
                sections: Vec::new(),
                trailer: String::new(),
            };
        };

        let body_end = lines[heading_idx + 1..]
            .iter()
            .position(|l| is_level2_heading(l.trim_start()))
            .map(|offset| heading_idx + 1 + offset)
            .unwrap_or(lines.len());

        let mut intro = Vec::new();
        let mut sections: Vec<DatedSection> = Vec::new();
        for line in &lines[heading_idx + 1..body_end] {
            let trimmed = line.trim_end();
            if let Some(date) = trimmed.strip_prefix("### ") {
                sections.push(DatedSection {
                    date: date.trim().to_string(),
                    entries: Vec::new(),
                });
            } else if trimmed.trim().is_empty() {
                continue;
            } else if let Some(section) = sections.last_mut() {
                section.entries.push(trimmed.to_string());
            } else {
                intro.push(trimmed.to_string());
            }
        }

        Self {
            preamble: lines[..heading_idx].join("\n").trim_end().to_string(),
            intro,
            sections,
            trailer: lines[body_end..].join("\n").trim_end().to_string(),
        }
    }

    /// Dates of the kept sections, oldest first.
    pub fn history_dates(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.date.as_str()).collect()
    }

    pub fn entries_for(&self, date: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|s| s.date == date)
            .map(|s| s.entries.as_slice())
    }

    /// Append `entry` under `date`, creating the section if needed, then drop
    /// the oldest sections beyond the retention limit.
    pub fn append_entry(&mut self, date: &str, entry: &str) {
        match self.sections.iter_mut().find(|s| s.date == date) {
            Some(section) => section.entries.push(entry.to_string()),
            None => self.sections.push(DatedSection {
                date: date.to_string(),
                entries: vec![entry.to_string()],
            }),
        }

        // ISO dates sort chronologically; stable for non-date headings.
        self.sections.sort_by(|a, b| a.date.cmp(&b.date));
        if self.sections.len() > MAX_HISTORY_SECTIONS {
            let excess = self.sections.len() - MAX_HISTORY_SECTIONS;
            self.sections.drain(..excess);
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.preamble.is_empty() {
            out.push_str(&self.preamble);
            out.push_str("\n\n");
        }
        out.push_str(HISTORY_HEADING);
        out.push('\n');
        for line in &self.intro {
            out.push_str(line);
            out.push('\n');
        }
        for section in &self.sections {
            out.push_str("\n### ");
            out.push_str(&section.date);
            out.push('\n');
            for entry in &section.entries {
                out.push_str(entry);
                out.push('\n');
            }
        }
        if !self.trailer.is_empty() {
            out.push('\n');
            out.push_str(&self.trailer);
            out.push('\n');
        }
        out
    }
}

fn summarize(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// One history line for an exchange.
pub fn format_entry(user_text: &str, assistant_text: &str, at: NaiveDateTime) -> String {
    format!(
        "- {} 用户：{} ｜ 助手：{}",
        at.format("%H:%M"),
        summarize(user_text, USER_SUMMARY_CHARS),
        summarize(assistant_text, ASSISTANT_SUMMARY_CHARS)
    )
}

/// Apply one exchange to a memory document and return the new document.
pub fn append_exchange(
    document: &str,
    user_text: &str,
    assistant_text: &str,
    at: NaiveDateTime,
) -> String {
    let mut doc = MemoryDocument::parse(document);
    let date = at.format("%Y-%m-%d").to_string();
    doc.append_entry(&date, &format_entry(user_text, assistant_text, at));
    doc.render()
}
