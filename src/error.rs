//! Error taxonomy for XForm parsing and case block synthesis.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XFormError>;

/// Semantic category of a [`XFormError::Case`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseErrorKind {
    MissingName,
    NoCaseType,
    InvalidRelationship,
    /// A `<case>` block already exists at the target path.
    DuplicateCaseBlock,
    /// `<create>` or `<close>` added twice to the same case block.
    DuplicateBlock,
    MissingSessionVar,
    UnsupportedAction,
    RelatedCaseOfNewCase,
    RequiresCase,
}

impl fmt::Display for CaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseErrorKind::MissingName => "missing name",
            CaseErrorKind::NoCaseType => "no case type",
            CaseErrorKind::InvalidRelationship => "invalid relationship",
            CaseErrorKind::DuplicateCaseBlock => "duplicate case block",
            CaseErrorKind::DuplicateBlock => "duplicate block",
            CaseErrorKind::MissingSessionVar => "missing session variable",
            CaseErrorKind::UnsupportedAction => "unsupported action",
            CaseErrorKind::RelatedCaseOfNewCase => "related case of new case",
            CaseErrorKind::RequiresCase => "requires case",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XFormError {
    #[error("Error parsing XML: {0}")]
    Parse(String),

    #[error("XML contains entity references: {0}")]
    DangerousContent(String),

    #[error("Can't find {0}")]
    MissingNode(&'static str),

    #[error("Case error ({kind}): {message}")]
    Case { kind: CaseErrorKind, message: String },

    #[error("Bind '{0}' not found")]
    BindNotFound(String),

    #[error("{0}")]
    Form(String),

    #[error("Duplicate itext id '{id}' in translation '{lang}'")]
    DuplicateItext { lang: String, id: String },

    #[error("{0}")]
    Language(String),

    #[error("Form validation failed: {0}")]
    Validation(String),
}

impl XFormError {
    pub fn case(kind: CaseErrorKind, message: impl Into<String>) -> Self {
        XFormError::Case {
            kind,
            message: message.into(),
        }
    }

    /// Case error category, if this is a case error.
    pub fn case_kind(&self) -> Option<CaseErrorKind> {
        match self {
            XFormError::Case { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
