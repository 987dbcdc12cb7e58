//! Dependency facts computed from the parsed class when the caller supplies none.

use std::collections::BTreeSet;

use crate::java::{node_text, visit_nodes, ParsedSource};
use crate::model::DependencyFacts;
use crate::resolve::NameResolver;

/// Compute per-method call, field-access and type-reference sets for the primary class.
///
/// Keys are canonical signatures. Constructors are skipped; they are never extractable.
pub fn analyze_dependencies(parsed: &ParsedSource<'_>) -> DependencyFacts {
    let class = parsed.class();
    let resolver = NameResolver::new(parsed.source(), class);
    let mut facts = DependencyFacts::default();

    for method in class.methods.iter().filter(|m| !m.is_constructor) {
        let Some(node) = parsed.member_node(method.range) else {
            continue;
        };

        let mut calls = BTreeSet::new();
        let mut fields = BTreeSet::new();
        let mut types = BTreeSet::new();
        visit_nodes(node, &mut |node| {
            if let Some(callee) = resolver.member_call(node) {
                calls.insert(callee.to_string());
            }
            if node.kind() == "type_identifier" {
                types.insert(node_text(parsed.source(), node).to_string());
            }
            if let Some(reference) = resolver.field_reference(node) {
                fields.insert(reference.field.name.clone());
            }
        });

        facts.method_calls.insert(method.signature.clone(), calls);
        facts.field_accesses.insert(method.signature.clone(), fields);
        facts.type_references.insert(method.signature.clone(), types);
    }

    tracing::debug!(
        target: "nova.extract_class",
        methods = facts.method_calls.len(),
        "computed dependency facts"
    );
    facts
}
