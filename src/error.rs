//! Error types shared by every filter in this crate.

use std::fmt;
use std::io;

/// The kind of failure a filter operation produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A builder parameter was out of range (zero capacity, an `fpp` outside
    /// `(0.0, 1.0)`, an unsupported counter width, a timeout too large for
    /// the compact timestamp domain, ...).
    InvalidArgument,
    /// A size computation overflowed before any allocation was attempted.
    ///
    /// Real allocator exhaustion aborts the process in safe Rust rather than
    /// returning an error; this variant instead covers the checked-arithmetic
    /// overflow paths during capacity sizing, which is the only allocation
    /// failure this crate can meaningfully report.
    OutOfMemory,
    /// A `save`/`load` call failed at the filesystem layer.
    Io,
    /// Persisted bytes failed the header, magic, or size check on load.
    InvalidFile,
}

impl ErrorKind {
    /// Convert this error kind instance into a static str.
    pub const fn into_static(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::OutOfMemory => "OutOfMemory",
            ErrorKind::Io => "Io",
            ErrorKind::InvalidFile => "InvalidFile",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// The error type returned by every fallible operation in this crate.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Creates a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::default(),
            source: None,
        }
    }

    /// Attaches additional context to the error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Attaches a source error.
    ///
    /// # Panics
    ///
    /// Panics if the source has already been set.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(src.into());
        self
    }

    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error's message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

// Convenience constructors used throughout the crate.
impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub(crate) fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfMemory, msg)
    }

    pub(crate) fn invalid_file(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFile, msg)
    }

    pub(crate) fn io(source: io::Error, doing: &'static str) -> Self {
        Self::new(ErrorKind::Io, format!("failed to {doing}")).set_source(source)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source:#}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}
