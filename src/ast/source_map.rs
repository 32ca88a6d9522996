use super::Loc;

/// Maps between byte offsets and line/column positions within source text.
#[derive(Debug, Clone)]
pub struct SourceMap {
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceMap { line_starts }
    }

    /// Returns (line, col), both 1-based.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let col = offset.saturating_sub(self.line_starts[line]);
        (line + 1, col + 1)
    }

    /// Byte offset of a 1-based line/column, `None` when the line does not exist.
    pub fn offset(&self, line: u32, column: u32) -> Option<usize> {
        if line == 0 || column == 0 {
            return None;
        }
        let start = *self.line_starts.get(line as usize - 1)?;
        Some(start + column as usize - 1)
    }

    /// The text a location covers, `None` for unknown or out-of-range locations.
    pub fn slice<'a>(&self, source: &'a str, loc: Loc) -> Option<&'a str> {
        if loc.is_unknown() {
            return None;
        }
        let start = self.offset(loc.line, loc.column)?;
        let end = self.offset(loc.end_line, loc.end_column)?;
        if start >= end {
            return None;
        }
        source.get(start..end)
    }

    /// Returns the full text of the given 1-based line number.
    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        if line == 0 || line > self.line_starts.len() {
            return "";
        }
        let start = self.line_starts[line - 1];
        let end = if line < self.line_starts.len() {
            self.line_starts[line]
        } else {
            source.len()
        };
        let text = &source[start..end];
        text.trim_end_matches('\n').trim_end_matches('\r')
    }
}
