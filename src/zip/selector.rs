//! Entry selection rules shared by extraction and deletion.

use regex::{Regex, RegexBuilder};

use crate::error::{Result, ZipError};

use super::header::EntryHeader;

/// Inclusive range of central-directory indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(index: usize) -> Self {
        Self::new(index, index)
    }

    /// Parse `"0-2,5,7-"` style lists. An open end runs to the last entry.
    ///
    /// The result is sorted by start; overlapping or reversed ranges are
    /// rejected.
    pub fn parse_list(list: &str) -> Result<Vec<IndexRange>> {
        let mut ranges = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_index(start, part)?;
                    let end = if end.trim().is_empty() {
                        usize::MAX
                    } else {
                        parse_index(end, part)?
                    };
                    IndexRange::new(start, end)
                }
                None => IndexRange::single(parse_index(part, part)?),
            };
            ranges.push(range);
        }
        Self::normalize(ranges)
    }

    /// Sort by start and check ranges are well-formed and disjoint.
    pub fn normalize(mut ranges: Vec<IndexRange>) -> Result<Vec<IndexRange>> {
        if ranges.iter().any(|r| r.start > r.end) {
            return Err(ZipError::parameter("index range ends before it starts"));
        }
        ranges.sort_by_key(|r| r.start);
        if ranges.windows(2).any(|w| w[1].start <= w[0].end) {
            return Err(ZipError::parameter("overlapping index ranges"));
        }
        Ok(ranges)
    }
}

fn parse_index(text: &str, part: &str) -> Result<usize> {
    text.trim()
        .parse()
        .map_err(|_| ZipError::parameter(format!("invalid index range '{part}'")))
}

/// Compile a `by_preg` pattern.
///
/// Accepts a raw pattern or the `/pattern/flags` delimited form, where the
/// flags are any of `imsxu`.
pub fn compile_preg(pattern: &str) -> Result<Regex> {
    let (body, flags) = delimited(pattern).unwrap_or((pattern, ""));
    let mut builder = RegexBuilder::new(body);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => builder.unicode(true),
        };
    }
    builder
        .build()
        .map_err(|e| ZipError::parameter(format!("invalid regex '{pattern}': {e}")))
}

fn delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let close = rest.rfind('/')?;
    let flags = &rest[close + 1..];
    flags
        .chars()
        .all(|c| "imsxu".contains(c))
        .then(|| (&rest[..close], flags))
}

/// One resolved selection mode.
#[derive(Debug, Clone)]
pub enum Rule {
    ByName(Vec<String>),
    ByIndex(Vec<IndexRange>),
    ByPreg(Regex),
    All,
}

/// The selection options a caller may combine.
///
/// Only one of them is honoured per call, by the priority
/// name > preg > index > all.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub by_name: Option<Vec<String>>,
    pub by_preg: Option<String>,
    pub by_index: Option<Vec<IndexRange>>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_name<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            by_name: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn by_preg(pattern: impl Into<String>) -> Self {
        Self {
            by_preg: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn by_index(ranges: Vec<IndexRange>) -> Self {
        Self {
            by_index: Some(ranges),
            ..Self::default()
        }
    }

    /// Resolve into the single rule that applies. Empty lists and empty
    /// patterns count as absent.
    pub fn rule(&self) -> Result<Rule> {
        if let Some(names) = self.by_name.as_ref().filter(|n| !n.is_empty()) {
            return Ok(Rule::ByName(names.clone()));
        }
        if let Some(pattern) = self.by_preg.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Rule::ByPreg(compile_preg(pattern)?));
        }
        if let Some(ranges) = self.by_index.as_ref().filter(|r| !r.is_empty()) {
            return Ok(Rule::ByIndex(IndexRange::normalize(ranges.clone())?));
        }
        Ok(Rule::All)
    }
}

/// Evaluates a rule against entries visited in ascending index order.
pub struct Selector<'a> {
    rule: &'a Rule,
    /// First index range that can still match.
    j_start: usize,
}

impl<'a> Selector<'a> {
    pub fn new(rule: &'a Rule) -> Self {
        Self { rule, j_start: 0 }
    }

    pub fn matches(&mut self, entry: &EntryHeader) -> bool {
        match self.rule {
            Rule::All => true,
            Rule::ByName(names) => names.iter().any(|name| name_matches(entry, name)),
            Rule::ByPreg(re) => re.is_match(&entry.stored_filename),
            Rule::ByIndex(ranges) => {
                let Some(i) = entry.index else {
                    return false;
                };
                let mut selected = false;
                let mut j = self.j_start;
                while j < ranges.len() && !selected {
                    let range = ranges[j];
                    if range.start > i {
                        break;
                    }
                    if i <= range.end {
                        selected = true;
                    }
                    if i >= range.end {
                        self.j_start = j + 1;
                    }
                    j += 1;
                }
                selected
            }
        }
    }
}

fn name_matches(entry: &EntryHeader, name: &str) -> bool {
    let stored = entry.stored_filename.as_str();
    if name.ends_with('/') {
        stored.starts_with(name) || (entry.is_folder() && format!("{stored}/") == name)
    } else {
        stored == name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::ATTR_DIRECTORY;

    fn entry(index: usize, name: &str) -> EntryHeader {
        EntryHeader {
            stored_filename: name.to_string(),
            external: if name.ends_with('/') { ATTR_DIRECTORY } else { 0 },
            index: Some(index),
            ..Default::default()
        }
    }

    fn select(rule: &Rule, names: &[&str]) -> Vec<String> {
        let mut selector = Selector::new(rule);
        names
            .iter()
            .enumerate()
            .map(|(i, n)| entry(i, n))
            .filter(|e| selector.matches(e))
            .map(|e| e.stored_filename)
            .collect()
    }

    #[test]
    fn directory_rule_matches_prefix() {
        let rule = Rule::ByName(vec!["docs/".into()]);
        let picked = select(&rule, &["docs/", "docs/a.txt", "docs/sub/b.txt", "docsx/c.txt", "a.txt"]);
        assert_eq!(picked, vec!["docs/", "docs/a.txt", "docs/sub/b.txt"]);
    }

    #[test]
    fn directory_rule_matches_folder_stored_without_slash() {
        let rule = Rule::ByName(vec!["old/".into()]);
        let mut folder = entry(0, "old");
        folder.external = ATTR_DIRECTORY;
        assert!(Selector::new(&rule).matches(&folder));
        assert!(!Selector::new(&rule).matches(&entry(0, "old")));
    }

    #[test]
    fn file_rule_is_exact() {
        let rule = Rule::ByName(vec!["a.txt".into()]);
        assert_eq!(select(&rule, &["a.txt", "b/a.txt", "a.txt.bak"]), vec!["a.txt"]);
    }

    #[test]
    fn index_ranges_advance_cursor() {
        let rule = Rule::ByIndex(IndexRange::parse_list("1-2,4,6-").unwrap());
        let names = ["e0", "e1", "e2", "e3", "e4", "e5", "e6", "e7"];
        assert_eq!(select(&rule, &names), vec!["e1", "e2", "e4", "e6", "e7"]);

        let mut selector = Selector::new(&rule);
        for i in 0..5 {
            selector.matches(&entry(i, "x"));
        }
        assert_eq!(selector.j_start, 2);
    }

    #[test]
    fn index_list_parsing() {
        assert_eq!(
            IndexRange::parse_list("5, 0-2").unwrap(),
            vec![IndexRange::new(0, 2), IndexRange::single(5)]
        );
        assert!(matches!(IndexRange::parse_list("0-3,2-4"), Err(ZipError::Parameter(_))));
        assert!(matches!(IndexRange::parse_list("3-1"), Err(ZipError::Parameter(_))));
        assert!(matches!(IndexRange::parse_list("a"), Err(ZipError::Parameter(_))));
    }

    #[test]
    fn preg_with_delimiters_and_flags() {
        let rule = Selection::by_preg(r"/\.LOG$/i").rule().unwrap();
        assert_eq!(select(&rule, &["a.txt", "b.log", "c.Log"]), vec!["b.log", "c.Log"]);

        let raw = Selection::by_preg(r"^dir/").rule().unwrap();
        assert_eq!(select(&raw, &["dir/a", "x/dir/b"]), vec!["dir/a"]);

        assert!(matches!(Selection::by_preg("(").rule(), Err(ZipError::Parameter(_))));
    }

    #[test]
    fn name_takes_precedence_over_preg_and_index() {
        let selection = Selection {
            by_name: Some(vec!["a.txt".into()]),
            by_preg: Some(r"/\.log$/".into()),
            by_index: Some(vec![IndexRange::single(1)]),
        };
        let rule = selection.rule().unwrap();
        assert_eq!(select(&rule, &["a.txt", "b.log"]), vec!["a.txt"]);

        let selection = Selection {
            by_name: Some(Vec::new()),
            by_preg: Some(r"/\.log$/".into()),
            by_index: Some(vec![IndexRange::single(0)]),
        };
        let rule = selection.rule().unwrap();
        assert_eq!(select(&rule, &["a.txt", "b.log"]), vec!["b.log"]);
    }

    #[test]
    fn slash_prefixed_raw_pattern_is_not_delimited() {
        let rule = Selection::by_preg("/docs/readme").rule().unwrap();
        assert!(matches!(rule, Rule::ByPreg(ref re) if re.as_str() == "/docs/readme"));
    }

    #[test]
    fn empty_selection_is_all() {
        assert!(matches!(Selection::all().rule().unwrap(), Rule::All));
    }
}
