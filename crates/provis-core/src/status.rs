//! Status tree reported by the planner and the engine.
//!
//! Every step that can degrade gracefully (excluding a unit, dropping a root,
//! undoing an action) records a [`Status`] instead of returning an error. The
//! statuses compose into a tree whose dominant severity is the maximum over
//! all of its nodes.

use std::fmt;

use crate::error::ProvisionError;

/// Severity of a status, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Error,
    Cancel,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine readable reason attached to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Unsatisfiable,
    Contradiction,
    Timeout,
    SolverIo,
    ActionFailure,
    UndoFailure,
    LockContention,
    RepositoryUnavailable,
    ProfileOutOfSync,
    Canceled,
    /// A unit was pinned out of every solution
    UnitExcluded,
    /// A root was removed from the request before slicing
    RootDropped,
    /// A unit was pinned into every solution
    UnitIncluded,
}

impl StatusCode {
    fn for_error(err: &ProvisionError) -> Option<Self> {
        match err {
            ProvisionError::Unsatisfiable => Some(StatusCode::Unsatisfiable),
            ProvisionError::Contradiction => Some(StatusCode::Contradiction),
            ProvisionError::Timeout { .. } => Some(StatusCode::Timeout),
            ProvisionError::SolverIo(_) => Some(StatusCode::SolverIo),
            ProvisionError::ActionFailure { .. } => Some(StatusCode::ActionFailure),
            ProvisionError::LockContention { .. } => Some(StatusCode::LockContention),
            ProvisionError::RepositoryUnavailable { .. } => Some(StatusCode::RepositoryUnavailable),
            ProvisionError::ProfileOutOfSync { .. } => Some(StatusCode::ProfileOutOfSync),
            ProvisionError::Canceled => Some(StatusCode::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    severity: Severity,
    code: Option<StatusCode>,
    message: String,
    children: Vec<Status>,
}

impl Status {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            children: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Severity::Ok, "")
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn cancel() -> Self {
        Self::new(Severity::Cancel, "Operation canceled").with_code(StatusCode::Canceled)
    }

    /// Status describing a fatal error
    pub fn from_error(err: &ProvisionError) -> Self {
        let severity = match err {
            ProvisionError::Canceled => Severity::Cancel,
            _ => Severity::Error,
        };
        Self {
            severity,
            code: StatusCode::for_error(err),
            message: err.to_string(),
            children: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: StatusCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Status>) -> Self {
        self.children.extend(children);
        self
    }

    /// Append a child status
    pub fn add(&mut self, child: Status) {
        self.children.push(child);
    }

    /// Merge another status into this one.
    ///
    /// An empty OK status carries no information and is dropped; a
    /// container without message of its own is flattened.
    pub fn merge(&mut self, other: Status) {
        if other.severity == Severity::Ok && other.children.is_empty() && other.message.is_empty() {
            return;
        }
        if other.message.is_empty() && other.code.is_none() {
            self.children.extend(other.children);
            if other.severity > Severity::Ok {
                self.severity = self.severity.max(other.severity);
            }
        } else {
            self.children.push(other);
        }
    }

    /// Dominant severity: the maximum over this node and all of its children
    pub fn severity(&self) -> Severity {
        self.children
            .iter()
            .map(Status::severity)
            .fold(self.severity, Severity::max)
    }

    pub fn is_ok(&self) -> bool {
        self.severity() == Severity::Ok
    }

    /// True for Error and Cancel
    pub fn is_error(&self) -> bool {
        self.severity() >= Severity::Error
    }

    pub fn code(&self) -> Option<StatusCode> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn children(&self) -> &[Status] {
        &self.children
    }

    /// Search this tree for a status with the given code
    pub fn find_code(&self, code: StatusCode) -> Option<&Status> {
        if self.code == Some(code) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_code(code))
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if !self.message.is_empty() {
            writeln!(f, "{:indent$}[{}] {}", "", self.severity(), self.message, indent = depth * 2)?;
        }
        let next = if self.message.is_empty() { depth } else { depth + 1 };
        for child in &self.children {
            child.fmt_indented(f, next)?;
        }
        Ok(())
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() && self.children.is_empty() {
            return write!(f, "[{}]", self.severity());
        }
        self.fmt_indented(f, 0)
    }
}
