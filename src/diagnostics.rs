//! Shared diagnostic sink for the generation pass.
//!
//! Configuration problems and advisory findings accumulate here instead of
//! aborting mid-pass, so a single run surfaces as many problems as possible.
//! The sink is owned by the surrounding grammar context and passed by mutable
//! reference into the generation pass; rendering the collected entries is the
//! caller's concern.

/// Severity of a collected diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Advisory finding; generation proceeds.
    Warning,
    /// Fatal configuration error; the pass completes, but table consumption
    /// is refused afterwards.
    Error,
}

/// A single collected finding, keyed by the source construct it concerns.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Label or name of the construct the finding is attached to.
    pub construct: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", kind, self.construct, self.message)
    }
}

/// Ordered collection of diagnostics from one generation run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { entries: Vec::new() }
    }

    pub fn add_warning(&mut self, construct: impl Into<String>, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            construct: construct.into(),
            message: message.into(),
        });
    }

    pub fn add_error(&mut self, construct: impl Into<String>, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            construct: construct.into(),
            message: message.into(),
        });
    }

    /// Whether any fatal error was collected. Outbound table consumption
    /// checks this before handing data to code generation.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    /// All entries in collection order.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }
}
