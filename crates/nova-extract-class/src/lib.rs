//! Extract Class refactoring for Java sources.
//!
//! Given a class and a candidate set of fields and methods, the engine
//! - validates the set against the class's dependency facts and repairs it when it can
//!   (transitively required private methods, statically referenced static fields),
//! - copies the approved members into a new class, synthesizing accessors for moved fields,
//! - rewrites the original class to delegate to the new one.
//!
//! The engine is synchronous, performs no I/O and keeps no state between calls; see
//! [`ClassExtractor::extract`].

mod analysis;
mod arena;
mod config;
mod edit;
mod engine;
mod error;
mod fields;
mod format;
mod java;
mod methods;
mod model;
mod resolve;
mod rewrite;
mod signature;
mod validate;

pub use analysis::analyze_dependencies;
pub use arena::{clone_subtree, ArenaError, NodeId, SyntaxArena, SyntaxNode};
pub use config::{
    init_tracing, json_schema, ConfigError, ExtractClassConfig, IndentStyle, LoggingConfig,
};
pub use edit::{Piece, Rewrite, RewriteError, RewriteSet, TextRange};
pub use engine::{extract_class, ClassExtractor, ExtractClassRequest, GeneratedArtifact};
pub use error::ExtractClassError;
pub use fields::{ExtractedField, FieldAccessors, FieldExtractor, IncrementHelpers};
pub use java::{parse_java, ParseError, ParsedSource};
pub use methods::{ExtractedMethod, MethodExtractor};
pub use model::{
    CandidateSet, DependencyFacts, FieldDecl, MethodDecl, Modifiers, NestedType, NestedTypeKind,
    Parameter, SourceClass, Visibility, ARITHMETIC_PRIMITIVES,
};
pub use rewrite::{find_cross_instance_refs, MovedField, OriginalRewriter};
pub use signature::{
    canonical_signature, normalize_signature, signature_name, signatures_match, SignatureSet,
};
pub use validate::{
    CandidateValidator, ExtractionPlan, IssueKind, Severity, ValidationIssue,
    DEFAULT_MAX_REPAIR_ITERATIONS,
};
