//! Offset-to-position translation for rendered diagnostics.
//!
//! Spans carry byte offsets only; the renderer resolves them against the
//! source text lazily, so nothing line-related is stored on the nodes.

/// A resolved 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: usize,
    pub col: usize,
}

/// Borrowing view over a source string that answers "which line is this
/// offset on" and "what does that line say".
pub struct SourceMap<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    pub fn new(source: &'a str) -> SourceMap<'a> {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        SourceMap {
            source,
            line_starts,
        }
    }

    /// Resolve a byte offset. Offsets past the end clamp to the last line.
    pub fn locate(&self, offset: usize) -> LineCol {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        LineCol {
            line: line + 1,
            col: offset.saturating_sub(self.line_starts[line]) + 1,
        }
    }

    /// Text of a 1-based line, without its terminator. Out-of-range lines
    /// come back empty.
    pub fn line(&self, line: usize) -> &'a str {
        let Some(&start) = line.checked_sub(1).and_then(|i| self.line_starts.get(i)) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.source.len());
        self.source[start..end].trim_end_matches(['\n', '\r'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_offsets_across_lines() {
        let src = "var total = 0\nfor (var i = 0; i < 3; i = i + 1) {\n}";
        let map = SourceMap::new(src);
        assert_eq!(map.locate(0), LineCol { line: 1, col: 1 });
        assert_eq!(map.locate(4), LineCol { line: 1, col: 5 });
        assert_eq!(map.locate(14), LineCol { line: 2, col: 1 });
        assert_eq!(map.locate(19), LineCol { line: 2, col: 6 });
    }

    #[test]
    fn newline_belongs_to_the_line_it_ends() {
        let map = SourceMap::new("ab\ncd");
        assert_eq!(map.locate(2), LineCol { line: 1, col: 3 });
        assert_eq!(map.locate(3), LineCol { line: 2, col: 1 });
    }

    #[test]
    fn offset_past_the_end_clamps() {
        let map = SourceMap::new("var x = 1");
        assert_eq!(map.locate(500).line, 1);
    }

    #[test]
    fn line_strips_terminators_including_crlf() {
        let src = "var a = 1\r\nvar b = 2\r\n";
        let map = SourceMap::new(src);
        assert_eq!(map.line(1), "var a = 1");
        assert_eq!(map.line(2), "var b = 2");
        assert_eq!(map.line(3), "");
    }

    #[test]
    fn line_out_of_range_is_empty() {
        let map = SourceMap::new("only");
        assert_eq!(map.line(0), "");
        assert_eq!(map.line(1), "only");
        assert_eq!(map.line(7), "");
    }

    #[test]
    fn empty_source_still_has_a_first_line() {
        let map = SourceMap::new("");
        assert_eq!(map.locate(0), LineCol { line: 1, col: 1 });
        assert_eq!(map.line(1), "");
    }
}
