//! Candidate validation and auto-repair.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::identifiers;
use crate::model::{CandidateSet, DependencyFacts, MethodDecl, SourceClass, Visibility};
use crate::signature::SignatureSet;

/// Default bound on auto-repair passes.
pub const DEFAULT_MAX_REPAIR_ITERATIONS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    BlockedAbstractCall,
    BlockedInnerTypeRef,
    BlockedCrossInstanceFieldRef,
    RepairCapExceeded,
    AutoIncludedPrivateMethod,
    AutoIncludedStaticField,
    RemainingInstanceFieldAccess,
    UnqualifiableCallBack,
    InitializerReferencesRemainingMember,
    PrivateStaticFieldAccess,
}

impl IssueKind {
    pub fn severity(self) -> Severity {
        match self {
            IssueKind::BlockedAbstractCall
            | IssueKind::BlockedInnerTypeRef
            | IssueKind::BlockedCrossInstanceFieldRef
            | IssueKind::RepairCapExceeded => Severity::Blocking,
            IssueKind::AutoIncludedPrivateMethod
            | IssueKind::AutoIncludedStaticField
            | IssueKind::RemainingInstanceFieldAccess
            | IssueKind::UnqualifiableCallBack
            | IssueKind::InitializerReferencesRemainingMember
            | IssueKind::PrivateStaticFieldAccess => Severity::Informational,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Blocking,
    Informational,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    /// The member (field name or method signature) the issue is about.
    pub member: String,
    pub description: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, member: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            member: member.into(),
            description: description.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.member, self.description)
    }
}

/// The validator's decision for one candidate set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExtractionPlan {
    Rejected {
        issues: Vec<ValidationIssue>,
    },
    #[serde(rename_all = "camelCase")]
    Approved {
        final_field_names: Vec<String>,
        final_method_signatures: Vec<String>,
        /// Informational issues only.
        issues: Vec<ValidationIssue>,
    },
}

impl ExtractionPlan {
    pub fn is_approved(&self) -> bool {
        matches!(self, ExtractionPlan::Approved { .. })
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ExtractionPlan::Rejected { issues } | ExtractionPlan::Approved { issues, .. } => issues,
        }
    }
}

/// Checks a candidate set against a class's dependency facts and repairs it when possible.
pub struct CandidateValidator<'a> {
    class: &'a SourceClass,
    facts: &'a DependencyFacts,
    max_iterations: usize,
}

impl<'a> CandidateValidator<'a> {
    pub fn new(class: &'a SourceClass, facts: &'a DependencyFacts) -> Self {
        Self {
            class,
            facts,
            max_iterations: DEFAULT_MAX_REPAIR_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn validate(&self, candidate: &CandidateSet) -> ExtractionPlan {
        let mut issues = Vec::new();

        // Input spellings are kept verbatim so the result is a literal superset of the input.
        let mut final_methods: Vec<String> = Vec::new();
        let mut method_set = SignatureSet::new();
        for signature in &candidate.method_signatures {
            if !final_methods.contains(signature) {
                final_methods.push(signature.clone());
            }
            method_set.insert(signature);
        }
        let mut final_fields: Vec<String> = Vec::new();
        for name in &candidate.field_names {
            if !final_fields.contains(name) {
                final_fields.push(name.clone());
            }
        }

        let settled = self.include_private_callees(&mut final_methods, &mut method_set, &mut issues);
        if !settled {
            issues.push(ValidationIssue::new(
                IssueKind::RepairCapExceeded,
                candidate.new_class_name.clone(),
                format!(
                    "auto-repair did not settle within {} iterations",
                    self.max_iterations
                ),
            ));
        }

        let methods = self.resolve(&final_methods);
        self.check_abstract_calls(&methods, &method_set, &mut issues);
        self.check_inner_types(&methods, &final_fields, &mut issues);

        if settled {
            self.include_static_fields(&methods, &mut final_fields, &mut issues);
            self.report_remaining_access(&methods, &method_set, &final_fields, &mut issues);
        }

        if issues.iter().any(ValidationIssue::is_blocking) {
            let issues: Vec<ValidationIssue> =
                issues.into_iter().filter(ValidationIssue::is_blocking).collect();
            tracing::warn!(
                target: "nova.extract_class",
                new_class = %candidate.new_class_name,
                issues = issues.len(),
                "candidate set rejected"
            );
            return ExtractionPlan::Rejected { issues };
        }

        tracing::debug!(
            target: "nova.extract_class",
            new_class = %candidate.new_class_name,
            fields = final_fields.len(),
            methods = final_methods.len(),
            "candidate set approved"
        );
        ExtractionPlan::Approved {
            final_field_names: final_fields,
            final_method_signatures: final_methods,
            issues,
        }
    }

    /// Requested methods that exist, deduplicated by declaration.
    fn resolve(&self, signatures: &[String]) -> Vec<&'a MethodDecl> {
        let mut out: Vec<&'a MethodDecl> = Vec::new();
        for signature in signatures {
            if let Some(method) = self.class.find_method(signature) {
                if !out.iter().any(|m| m.range == method.range) {
                    out.push(method);
                }
            }
        }
        out
    }

    /// Runs the private-callee fixpoint; returns whether it settled within the cap.
    fn include_private_callees(
        &self,
        final_methods: &mut Vec<String>,
        method_set: &mut SignatureSet,
        issues: &mut Vec<ValidationIssue>,
    ) -> bool {
        for iteration in 0..self.max_iterations {
            let mut added: Vec<(String, String)> = Vec::new();
            for method in self.resolve(final_methods) {
                for callee in self.facts.calls_of(method) {
                    for target in self.class.methods_named(callee) {
                        if !target.is_private()
                            || method_set.contains(&target.signature)
                            || added.iter().any(|(sig, _)| *sig == target.signature)
                        {
                            continue;
                        }
                        added.push((target.signature.clone(), method.signature.clone()));
                    }
                }
            }

            if added.is_empty() {
                return true;
            }
            for (signature, caller) in added {
                tracing::debug!(
                    target: "nova.extract_class",
                    iteration,
                    method = %signature,
                    caller = %caller,
                    "auto-included private method"
                );
                issues.push(ValidationIssue::new(
                    IssueKind::AutoIncludedPrivateMethod,
                    signature.clone(),
                    format!("private method called by {caller} moves with it"),
                ));
                method_set.insert(&signature);
                final_methods.push(signature);
            }
        }
        false
    }

    fn check_abstract_calls(
        &self,
        methods: &[&MethodDecl],
        method_set: &SignatureSet,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for method in methods {
            if method.is_abstract() {
                issues.push(ValidationIssue::new(
                    IssueKind::BlockedAbstractCall,
                    method.signature.clone(),
                    "abstract method has no implementation to move",
                ));
            }
            for callee in self.facts.calls_of(method) {
                for target in self.class.methods_named(callee) {
                    if target.is_abstract() && !method_set.contains(&target.signature) {
                        issues.push(ValidationIssue::new(
                            IssueKind::BlockedAbstractCall,
                            method.signature.clone(),
                            format!(
                                "calls abstract method {} which the new class cannot implement",
                                target.signature
                            ),
                        ));
                    }
                }
            }
        }
    }

    fn check_inner_types(
        &self,
        methods: &[&MethodDecl],
        fields: &[String],
        issues: &mut Vec<ValidationIssue>,
    ) {
        for method in methods {
            for ty in self.facts.type_references_of(method) {
                if self.class.is_private_nested_type(ty) {
                    issues.push(ValidationIssue::new(
                        IssueKind::BlockedInnerTypeRef,
                        method.signature.clone(),
                        format!("references private nested type {ty}"),
                    ));
                }
            }
        }
        for name in fields {
            let Some(field) = self.class.field(name) else {
                continue;
            };
            for ty in identifiers(&field.ty) {
                if self.class.is_private_nested_type(ty) {
                    issues.push(ValidationIssue::new(
                        IssueKind::BlockedInnerTypeRef,
                        name.clone(),
                        format!("declared type mentions private nested type {ty}"),
                    ));
                }
            }
        }
    }

    fn include_static_fields(
        &self,
        methods: &[&MethodDecl],
        fields: &mut Vec<String>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        for method in methods {
            for name in self.facts.field_accesses_of(method) {
                let Some(field) = self.class.field(name) else {
                    continue;
                };
                if !field.is_static() || fields.contains(name) {
                    continue;
                }
                tracing::debug!(
                    target: "nova.extract_class",
                    field = %name,
                    method = %method.signature,
                    "auto-included static field"
                );
                issues.push(ValidationIssue::new(
                    IssueKind::AutoIncludedStaticField,
                    name.clone(),
                    format!("static field read by {} moves with it", method.signature),
                ));
                fields.push(name.clone());
            }
        }
    }

    fn report_remaining_access(
        &self,
        methods: &[&MethodDecl],
        method_set: &SignatureSet,
        fields: &[String],
        issues: &mut Vec<ValidationIssue>,
    ) {
        let moved_field = |name: &str| fields.iter().any(|f| f == name);
        let moved_name = |name: &str| methods.iter().any(|m| m.name == name);

        for method in methods {
            for name in self.facts.field_accesses_of(method) {
                let Some(field) = self.class.field(name) else {
                    continue;
                };
                if !field.is_static() && !moved_field(name) {
                    issues.push(ValidationIssue::new(
                        IssueKind::RemainingInstanceFieldAccess,
                        method.signature.clone(),
                        format!("accesses instance field {name}, which stays behind"),
                    ));
                }
            }
            // Overloads left behind count even when a same-named one moves.
            for callee in self.facts.calls_of(method) {
                let unreachable = self
                    .class
                    .methods_named(callee)
                    .filter(|target| !method_set.contains(&target.signature))
                    .any(|target| !target.is_static() || target.is_private());
                if unreachable {
                    issues.push(ValidationIssue::new(
                        IssueKind::UnqualifiableCallBack,
                        method.signature.clone(),
                        format!(
                            "calls {callee}, which stays behind and is not reachable as {}.{callee}",
                            self.class.name
                        ),
                    ));
                }
            }
        }

        for name in fields {
            let Some(field) = self.class.field(name) else {
                continue;
            };
            if let Some(initializer) = &field.initializer {
                let mentioned: Vec<&str> = identifiers(initializer)
                    .filter(|ident| {
                        (self.class.field(ident).is_some() && !moved_field(ident))
                            || (self.class.methods_named(ident).next().is_some()
                                && !moved_name(ident))
                    })
                    .collect();
                for ident in mentioned {
                    issues.push(ValidationIssue::new(
                        IssueKind::InitializerReferencesRemainingMember,
                        name.clone(),
                        format!("initializer mentions {ident}, which stays behind; copied verbatim"),
                    ));
                }
            }

            if field.is_static() && field.modifiers.visibility == Visibility::Private {
                let still_used = self
                    .class
                    .methods
                    .iter()
                    .filter(|m| !m.is_constructor && !method_set.contains(&m.signature))
                    .any(|m| self.facts.field_accesses_of(m).contains(name));
                if still_used {
                    issues.push(ValidationIssue::new(
                        IssueKind::PrivateStaticFieldAccess,
                        name.clone(),
                        "private static field is still used by the remaining class",
                    ));
                }
            }
        }
    }
}
