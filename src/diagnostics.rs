//! Diagnostic sink shared by every compilation phase.
//!
//! Each phase records warnings and errors here instead of aborting with its
//! own error type. A diagnostic is always bound to a [`Span`] and to the
//! stage that produced it. Once the sink holds at least one error, the
//! driver does not enter the next phase.

use colored::Colorize;

use crate::lexer::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// The phase a diagnostic originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Lexical,
    Syntax,
    Type,
    Internal,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Lexical => f.write_str("lexical error"),
            Stage::Syntax => f.write_str("syntax error"),
            Stage::Type => f.write_str("type error"),
            Stage::Internal => f.write_str("internal error"),
        }
    }
}

/// Marker propagated through `?` after a diagnostic has been recorded.
///
/// Carries no payload on purpose: the message already lives in the sink,
/// and a phase never recovers once it has produced an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stop;

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    pub span: Span,
}

struct SourceFile {
    name: String,
    contents: String,
}

/// Accumulates diagnostics for a single compilation context, together with
/// the source files they point into.
#[derive(Default)]
pub struct DiagnosticSink {
    files: Vec<SourceFile>,
    diagnostics: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source file and returns the file id used in [`Span`]s.
    pub fn add_file(&mut self, name: impl ToString, contents: impl ToString) -> usize {
        self.files.push(SourceFile {
            name: name.to_string(),
            contents: contents.to_string(),
        });
        self.files.len() - 1
    }

    pub fn error(&mut self, stage: Stage, span: Span, message: impl ToString) -> Stop {
        self.errors += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            stage,
            message: message.to_string(),
            span,
        });
        Stop
    }

    pub fn warning(&mut self, stage: Stage, span: Span, message: impl ToString) {
        self.warnings += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            stage,
            message: message.to_string(),
            span,
        });
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors != 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Renders a diagnostic with the offending source line, in the style of
    /// the surrounding tooling: file:line:col header, the line itself with
    /// the span in red, and a caret line carrying the message.
    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let Diagnostic {
            severity,
            stage,
            message,
            span,
        } = diagnostic;

        let label = match severity {
            Severity::Warning => format!("warning ({stage})").yellow().bold(),
            Severity::Error => format!("{stage}").red().bold(),
        };

        let Some(file) = self.files.get(span.file) else {
            return format!("{label}: {message}");
        };

        let header = format!(
            "{label}: {message}\n  --> {}:{}:{}",
            file.name,
            span.line + 1,
            span.start + 1
        );

        let Some(line) = file.contents.lines().nth(span.line) else {
            return header;
        };

        let gutter = format!("{}", span.line + 1);
        let pad = " ".repeat(gutter.len());
        let (before, rest) = line.split_at(span.start.min(line.len()));
        let len = (span.end.max(span.start + 1) - span.start).min(rest.len()).max(1);
        let (marked, after) = rest.split_at(len.min(rest.len()));
        let squiggle = format!("{}{}", " ".repeat(span.start), "^".repeat(len.max(1)));

        format!(
            "{header}\n{pad} |\n{gutter} |{before}{}{after}\n{pad} |{}",
            marked.red(),
            squiggle.red()
        )
    }

    /// Prints every recorded diagnostic of the given minimum severity.
    pub fn print(&self, minimum: Severity) {
        for diagnostic in &self.diagnostics {
            if diagnostic.severity >= minimum {
                eprintln!("{}", self.render(diagnostic));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_severity() {
        let mut sink = DiagnosticSink::new();
        let file = sink.add_file("test.la", "var x = 1;");

        sink.warning(Stage::Type, Span::new(file, 0, 4, 5), "suspicious");
        let _ = sink.error(Stage::Type, Span::new(file, 0, 8, 9), "broken");
        let _ = sink.error(Stage::Syntax, Span::new(file, 0, 0, 3), "also broken");

        assert_eq!(sink.warning_count(), 1);
        assert_eq!(sink.error_count(), 2);
        assert!(sink.has_errors());
    }

    #[test]
    fn test_render_points_at_span() {
        let mut sink = DiagnosticSink::new();
        let file = sink.add_file("demo.la", "var x = null;\n");
        let _ = sink.error(Stage::Type, Span::new(file, 0, 8, 12), "bad initializer");

        let rendered = sink.render(&sink.diagnostics()[0]);
        assert!(rendered.contains("demo.la:1:9"));
        assert!(rendered.contains("bad initializer"));
    }
}
