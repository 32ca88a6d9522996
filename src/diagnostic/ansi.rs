use crate::ast::SourceMap;
use super::Diagnostic;

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        // "error[JSMM-R006]: message"
        let code = d.code.map(|c| format!("[{c}]")).unwrap_or_default();
        out.push_str(&format!("{}: {}\n", self.bold_red(&format!("error{code}")), self.bold(&d.message)));

        let primary = d.labels.first().filter(|l| !l.loc.is_unknown());
        if let Some(label) = primary {
            let (line, col) = (label.loc.line, label.loc.column);
            out.push_str(&format!("  {} {}:{}\n", self.cyan("-->"), line, col));

            if let Some(source) = &d.source {
                let map = SourceMap::new(source);
                let line_text = map.line_text(source, line as usize);

                let gutter = line.to_string().len();
                let pipe = self.cyan("|");
                let pad = " ".repeat(gutter);

                out.push_str(&format!("{pad} {pipe}\n"));

                let line_num = self.cyan(&format!("{line:>gutter$}"));
                out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

                // Carets run to the end of the range, or of the line when the
                // range spans several lines.
                let start = col.saturating_sub(1) as usize;
                let end = if label.loc.end_line == line {
                    label.loc.end_column.saturating_sub(1) as usize
                } else {
                    line_text.chars().count()
                };
                let carets = self.bold_red(&"^".repeat(end.saturating_sub(start).max(1)));
                let indent = " ".repeat(start);
                if label.message.is_empty() {
                    out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
                } else {
                    out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n", self.bold_red(&label.message)));
                }

                out.push_str(&format!("{pad} {pipe}\n"));
            }
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }

        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", self.dim("="), suggestion));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Loc;

    const SOURCE: &str = "var a = [1, 2];\nvar b = a[5];";

    fn make_diag() -> Diagnostic {
        Diagnostic::error("Array a has no index 5")
            .with_code("JSMM-R008")
            .with_loc(Loc::new(2, 9, 2, 13), "IndexError")
            .with_source(SOURCE)
            .with_note("arrays start at index 0")
            .with_suggestion("check the array length first")
    }

    #[test]
    fn render_contains_error_label_and_code() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag());
        assert!(out.starts_with("error[JSMM-R008]: Array a has no index 5"), "got:\n{out}");
    }

    #[test]
    fn render_contains_location_and_source_line() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag());
        assert!(out.contains("--> 2:9"), "missing location in:\n{out}");
        assert!(out.contains("var b = a[5];"), "missing source line in:\n{out}");
        assert!(!out.contains("var a = [1, 2];"), "wrong line in:\n{out}");
    }

    #[test]
    fn caret_length_matches_range() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag());
        assert!(out.contains("        ^^^^ IndexError"), "expected 4 carets under a[5] in:\n{out}");
    }

    #[test]
    fn render_contains_note_and_suggestion() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&make_diag());
        assert!(out.contains("note: arrays start at index 0"), "missing note in:\n{out}");
        assert!(out.contains("suggestion: check the array length first"), "missing suggestion in:\n{out}");
    }

    #[test]
    fn location_without_source_has_no_snippet() {
        let r = AnsiRenderer { use_color: false };
        let d = Diagnostic::error("x is undefined").with_loc(Loc::line(3), "UndefinedValueError");
        let out = r.render(&d);
        assert!(out.contains("--> 3:1"));
        assert!(!out.contains('|'));
    }

    #[test]
    fn render_no_location_still_works() {
        let r = AnsiRenderer { use_color: false };
        let out = r.render(&Diagnostic::error("something bad"));
        assert_eq!(out, "error: something bad\n");
    }

    #[test]
    fn color_toggles_ansi_codes() {
        let d = make_diag();
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b["));
        assert!(!AnsiRenderer { use_color: false }.render(&d).contains("\x1b["));
    }

    #[test]
    fn multiline_range_underlines_to_end_of_line() {
        let r = AnsiRenderer { use_color: false };
        let d = Diagnostic::error("bad").with_loc(Loc::new(1, 5, 2, 4), "").with_source(SOURCE);
        let out = r.render(&d);
        assert!(out.contains(&format!("    {}", "^".repeat(11))), "got:\n{out}");
    }
}
