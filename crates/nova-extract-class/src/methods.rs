//! Copies moved methods into the new class and qualifies calls back into the original.

use tree_sitter::Node;

use crate::arena::{clone_subtree, NodeId, SyntaxArena};
use crate::edit::TextRange;
use crate::error::ExtractClassError;
use crate::format::{dedent_block, leading_indent};
use crate::java::{range_of, visit_nodes, ParsedSource};
use crate::model::MethodDecl;
use crate::resolve::{argument_count, NameResolver, RefForm};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedMethod {
    pub signature: String,
    /// The full declaration, dedented to column zero.
    pub source: String,
}

pub struct MethodExtractor<'p, 's> {
    parsed: &'p ParsedSource<'s>,
    new_class: &'p str,
    moved_methods: &'p [&'p MethodDecl],
    moved_fields: &'p [String],
}

/// One edit to apply on the copied declaration, located by the origin of a token.
enum TokenEdit {
    Replace {
        origin: TextRange,
        kind: &'static str,
        text: String,
    },
    Remove {
        origin: TextRange,
        kind: &'static str,
    },
}

impl<'p, 's> MethodExtractor<'p, 's> {
    pub fn new(
        parsed: &'p ParsedSource<'s>,
        new_class: &'p str,
        moved_methods: &'p [&'p MethodDecl],
        moved_fields: &'p [String],
    ) -> Self {
        Self {
            parsed,
            new_class,
            moved_methods,
            moved_fields,
        }
    }

    pub fn extract(&self) -> Result<Vec<ExtractedMethod>, ExtractClassError> {
        let extracted = self
            .moved_methods
            .iter()
            .map(|method| self.extract_one(method))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            target: "nova.extract_class",
            methods = extracted.len(),
            "extracted methods"
        );
        Ok(extracted)
    }

    fn extract_one(&self, method: &MethodDecl) -> Result<ExtractedMethod, ExtractClassError> {
        let source = self.parsed.source();
        let node = self
            .parsed
            .member_node(method.range)
            .ok_or_else(|| ExtractClassError::MemberNotFound {
                class: self.parsed.class().name.clone(),
                member: method.signature.clone(),
            })?;

        let mut original = SyntaxArena::new();
        let root = original.lower(source, node);
        let mut copy_arena = SyntaxArena::new();
        let copy = clone_subtree(&original, root, &mut copy_arena)?;

        for edit in self.token_edits(method, node)? {
            apply_token_edit(&mut copy_arena, copy, edit)?;
        }

        let rendered = copy_arena.render(copy)?;
        let indent = leading_indent(source, method.range.start).unwrap_or_default();
        Ok(ExtractedMethod {
            signature: method.signature.clone(),
            source: dedent_block(&format!("{indent}{rendered}")),
        })
    }

    fn token_edits(
        &self,
        method: &MethodDecl,
        node: Node<'_>,
    ) -> Result<Vec<TokenEdit>, ExtractClassError> {
        let class = self.parsed.class();
        let resolver = NameResolver::new(self.parsed.source(), class);
        let mut edits = Vec::new();
        let mut failure = None;

        if method.is_private() {
            if let Some(modifiers) = crate::java::modifier_node(node) {
                let mut cursor = modifiers.walk();
                for token in modifiers.children(&mut cursor) {
                    if token.kind() == "private" {
                        edits.push(TokenEdit::Remove {
                            origin: range_of(token),
                            kind: "private",
                        });
                    }
                }
            }
        }

        visit_nodes(node, &mut |candidate| {
            if let Some(callee) = resolver.member_call(candidate) {
                match self.calls_back(callee, candidate, node, &resolver) {
                    Ok(true) => {
                        if let Some(edit) = self.qualify_call(candidate, callee) {
                            edits.push(edit);
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        failure.get_or_insert(err);
                    }
                }
                return;
            }

            // `Original.F` / `Original.this.f` for members that now live in the new class.
            let Some(reference) = resolver.field_reference(candidate) else {
                return;
            };
            if !self.moved_fields.contains(&reference.field.name) {
                return;
            }
            let qualifier = match reference.form {
                RefForm::ClassQualified => candidate.child_by_field_name("object"),
                RefForm::This => candidate
                    .child_by_field_name("object")
                    .filter(|object| object.kind() == "field_access")
                    .and_then(|object| object.child_by_field_name("object")),
                RefForm::Bare => None,
            };
            if let Some(qualifier) = qualifier.filter(|q| q.kind() == "identifier") {
                edits.push(TokenEdit::Replace {
                    origin: range_of(qualifier),
                    kind: "identifier",
                    text: self.new_class.to_string(),
                });
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(edits),
        }
    }

    /// Whether a call to `callee` from inside a moved method targets a member that stays in
    /// the original class.
    ///
    /// Overloads are told apart by argument count. When the applicable overloads are split
    /// between both classes, the call is only qualified if every one of them is static (the
    /// moved ones leave static stubs behind); otherwise it cannot be resolved here.
    fn calls_back(
        &self,
        callee: &str,
        call: Node<'_>,
        method_node: Node<'_>,
        resolver: &NameResolver<'_>,
    ) -> Result<bool, ExtractClassError> {
        let call_range = range_of(call);
        if resolver
            .shadowing_bodies(method_node, callee)
            .into_iter()
            .any(|body| body.contains_range(call_range))
        {
            return Ok(false);
        }

        let arity = argument_count(call);
        let applicable: Vec<&MethodDecl> = self
            .parsed
            .class()
            .methods_named(callee)
            .filter(|method| method.accepts_arity(arity))
            .collect();
        let moved = applicable
            .iter()
            .filter(|method| self.moved_methods.iter().any(|m| m.range == method.range))
            .count();
        if moved == applicable.len() {
            return Ok(false);
        }
        if moved == 0 || applicable.iter().all(|method| method.is_static()) {
            return Ok(true);
        }
        Err(ExtractClassError::Unsupported {
            line: call.start_position().row + 1,
            reason: format!(
                "call to `{callee}` may target either a moved or a remaining overload"
            ),
        })
    }

    fn qualify_call(&self, call: Node<'_>, callee: &str) -> Option<TokenEdit> {
        let class_name = &self.parsed.class().name;
        match call.child_by_field_name("object") {
            Some(this) => Some(TokenEdit::Replace {
                origin: range_of(this),
                kind: "this",
                text: class_name.clone(),
            }),
            None => {
                let name = call.child_by_field_name("name")?;
                Some(TokenEdit::Replace {
                    origin: range_of(name),
                    kind: "identifier",
                    text: format!("{class_name}.{callee}"),
                })
            }
        }
    }
}

fn apply_token_edit(
    arena: &mut SyntaxArena,
    root: NodeId,
    edit: TokenEdit,
) -> Result<(), ExtractClassError> {
    match edit {
        TokenEdit::Replace { origin, kind, text } => {
            if let Some(token) = arena.find_by_origin(root, origin, kind) {
                arena.set_text(token, text)?;
            }
        }
        TokenEdit::Remove { origin, kind } => {
            if let Some(token) = arena.find_by_origin(root, origin, kind) {
                arena.remove(token)?;
            }
        }
    }
    Ok(())
}
