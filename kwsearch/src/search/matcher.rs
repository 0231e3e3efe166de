/// Whole-token keyword matcher.
///
/// A line matches when one of its whitespace-delimited tokens equals the
/// keyword exactly. Only the first such token is reported; later occurrences
/// on the same line are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatcher {
    keyword: String,
}

impl KeywordMatcher {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }

    /// Byte range of the first token equal to the keyword
    pub fn find_first(&self, line: &str) -> Option<(usize, usize)> {
        if self.keyword.is_empty() {
            return None;
        }
        tokens(line).find(|&(start, end)| &line[start..end] == self.keyword)
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.find_first(line).is_some()
    }
}

/// Byte ranges of the whitespace-separated tokens of `line`
fn tokens(line: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut start = None;
    line.char_indices()
        .chain(std::iter::once((line.len(), ' ')))
        .filter_map(move |(i, c)| match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                start = None;
                Some((s, i))
            }
            (false, None) => {
                start = Some(i);
                None
            }
            _ => None,
        })
}
