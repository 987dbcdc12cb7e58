use thiserror::Error;

use crate::arena::ArenaError;
use crate::edit::RewriteError;
use crate::java::ParseError;

/// Failures of the generation stage.
///
/// Everything except [`ExtractClassError::Unsupported`] means the approved plan and the
/// parsed class disagree, which is a defect rather than a property of the input.
#[derive(Debug, Error)]
pub enum ExtractClassError {
    #[error("member `{member}` not found in class `{class}`")]
    MemberNotFound { class: String, member: String },
    #[error("`{0}` is a constructor; constructors cannot be extracted")]
    ConstructorNotExtractable(String),
    #[error("method `{0}` has no body to move")]
    MissingBody(String),
    #[error("unsupported construct at line {line}: {reason}")]
    Unsupported { line: usize, reason: String },
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("generated {which} does not parse: {error}")]
    GeneratedSourceInvalid {
        which: &'static str,
        #[source]
        error: ParseError,
    },
}

impl ExtractClassError {
    /// Whether this failure is a property of the input rather than a defect.
    pub fn is_unsupported_input(&self) -> bool {
        matches!(self, ExtractClassError::Unsupported { .. })
    }
}
