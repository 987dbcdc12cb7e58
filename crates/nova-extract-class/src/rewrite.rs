//! Rewrites the original class to delegate to the extracted one.
//!
//! Every edit is collected as a [`Rewrite`] during one read-only pass over the tree and the
//! whole set is applied at the end.

use std::collections::{BTreeMap, HashSet};

use tree_sitter::Node;

use crate::edit::{Piece, Rewrite, RewriteSet, TextRange};
use crate::error::ExtractClassError;
use crate::fields::FieldAccessors;
use crate::format::{leading_indent, line_end_inclusive, line_start, rest_of_line_is_blank};
use crate::java::{
    field_name_in_parent, is_comment, named_children, node_text, range_of, visit_nodes,
    ParsedSource,
};
use crate::model::{FieldDecl, MethodDecl};
use crate::resolve::{raw_type_name, FieldRef, NameResolver};
use crate::validate::{IssueKind, ValidationIssue};

/// A field moving to the new class, as the rewriter sees it.
#[derive(Clone, Debug)]
pub struct MovedField<'a> {
    pub decl: &'a FieldDecl,
    /// `None` for static fields.
    pub accessors: Option<&'a FieldAccessors>,
}

pub struct OriginalRewriter<'p, 's> {
    parsed: &'p ParsedSource<'s>,
    new_class: &'p str,
    helper: Option<&'p str>,
    methods: &'p [&'p MethodDecl],
    fields: BTreeMap<&'p str, MovedField<'p>>,
    indent_unit: &'p str,
}

impl<'p, 's> OriginalRewriter<'p, 's> {
    pub fn new(
        parsed: &'p ParsedSource<'s>,
        new_class: &'p str,
        helper: Option<&'p str>,
        methods: &'p [&'p MethodDecl],
        fields: &[MovedField<'p>],
        indent_unit: &'p str,
    ) -> Self {
        Self {
            parsed,
            new_class,
            helper,
            methods,
            fields: fields
                .iter()
                .map(|field| (field.decl.name.as_str(), field.clone()))
                .collect(),
            indent_unit,
        }
    }

    /// Collects the full rewrite set for the original source.
    pub fn collect(&self) -> Result<RewriteSet, ExtractClassError> {
        let mut rewrites = RewriteSet::new();
        let mut skipped: Vec<TextRange> = Vec::new();

        for method in self.methods {
            let (range, stub) = self.delegating_stub(method)?;
            rewrites.push(Rewrite::replace(range, stub));
            skipped.push(range);
        }

        let (removals, removed) = self.field_removals()?;
        skipped.extend(removed);
        for removal in removals {
            rewrites.push(removal);
        }

        if let Some(helper) = self.helper {
            let body = self.parsed.class().body_range;
            rewrites.push(Rewrite::insert(
                body.start + 1,
                format!(
                    "\n{}private {} {helper} = new {}();\n",
                    self.member_indent(),
                    self.new_class,
                    self.new_class
                ),
            ));
        }

        let body = self
            .parsed
            .class_body_node()
            .ok_or_else(|| self.class_not_found())?;
        let resolver = NameResolver::new(self.parsed.source(), self.parsed.class());
        let mut scan = ReferenceScan {
            rewriter: self,
            resolver: &resolver,
            skipped: &skipped,
            handled: HashSet::new(),
            rewrites: &mut rewrites,
        };
        scan.visit(body)?;

        tracing::debug!(
            target: "nova.extract_class",
            rewrites = rewrites.len(),
            "collected original-class rewrites"
        );
        Ok(rewrites)
    }

    /// Rewrites the original source.
    pub fn rewrite(&self) -> Result<String, ExtractClassError> {
        let rewrites = self.collect()?;
        Ok(rewrites.apply(self.parsed.source())?)
    }

    fn class_not_found(&self) -> ExtractClassError {
        ExtractClassError::MemberNotFound {
            class: self.parsed.class().name.clone(),
            member: "class body".to_string(),
        }
    }

    /// Indentation of the class's members.
    fn member_indent(&self) -> String {
        let source = self.parsed.source();
        let class = self.parsed.class();
        let first_member = class
            .fields
            .iter()
            .map(|field| field.declaration_range.start)
            .chain(class.methods.iter().map(|method| method.range.start))
            .min();
        if let Some(indent) = first_member.and_then(|offset| leading_indent(source, offset)) {
            return indent.to_string();
        }
        let class_indent = leading_indent(source, class.range.start).unwrap_or_default();
        format!("{class_indent}{}", self.indent_unit)
    }

    fn delegating_stub(&self, method: &MethodDecl) -> Result<(TextRange, String), ExtractClassError> {
        let body = method
            .body_range
            .ok_or_else(|| ExtractClassError::MissingBody(method.signature.clone()))?;
        let target = if method.is_static() {
            self.new_class
        } else {
            self.helper.ok_or_else(|| ExtractClassError::MemberNotFound {
                class: self.parsed.class().name.clone(),
                member: "helper field".to_string(),
            })?
        };

        let args: Vec<&str> = method.params.iter().map(|param| param.name.as_str()).collect();
        let call = format!("{target}.{}({});", method.name, args.join(", "));
        let statement = if method.is_void() {
            call
        } else {
            format!("return {call}")
        };

        let member_indent = leading_indent(self.parsed.source(), method.range.start)
            .map(str::to_string)
            .unwrap_or_else(|| self.member_indent());
        Ok((
            body,
            format!(
                "{{\n{member_indent}{}{statement}\n{member_indent}}}",
                self.indent_unit
            ),
        ))
    }

    /// Rewrites deleting moved declarations, and the ranges that no longer exist afterwards.
    fn field_removals(&self) -> Result<(Vec<Rewrite>, Vec<TextRange>), ExtractClassError> {
        let class = self.parsed.class();
        let mut groups: BTreeMap<usize, Vec<&FieldDecl>> = BTreeMap::new();
        for field in self.fields.values() {
            groups.entry(field.decl.group).or_default().push(field.decl);
        }

        let mut out = Vec::new();
        let mut removed = Vec::new();
        let mut whole: Vec<Removal> = Vec::new();
        for (group, moved) in groups {
            let all: Vec<&FieldDecl> = class.field_group(group).collect();
            let kept: Vec<&FieldDecl> = all
                .iter()
                .copied()
                .filter(|field| !moved.iter().any(|m| m.name == field.name))
                .collect();
            let (Some(first), Some(last)) = (all.first(), all.last()) else {
                continue;
            };

            if kept.is_empty() {
                whole.push(self.declaration_removal(first)?);
                continue;
            }
            removed.extend(moved.iter().map(|field| field.declarator_range));

            // Keep the declaration, rebuilt from the surviving declarators.
            let mut pieces = Vec::new();
            for (idx, field) in kept.iter().enumerate() {
                if idx > 0 {
                    pieces.push(Piece::Text(", ".to_string()));
                }
                pieces.push(Piece::Source(field.declarator_range));
            }
            out.push(Rewrite::template(
                TextRange::new(first.declarator_range.start, last.declarator_range.end),
                pieces,
            ));
        }

        for removal in merge_adjacent(whole) {
            let range = if removal.whole_lines {
                self.absorb_blank_line(removal.range)
            } else {
                removal.range
            };
            removed.push(range);
            out.push(Rewrite::delete(range));
        }
        Ok((out, removed))
    }

    /// The declaration, its attached leading comments and, when they stand on lines of their
    /// own, those lines.
    fn declaration_removal(&self, field: &FieldDecl) -> Result<Removal, ExtractClassError> {
        let source = self.parsed.source();
        let node = self
            .parsed
            .member_node(field.declaration_range)
            .ok_or_else(|| ExtractClassError::MemberNotFound {
                class: self.parsed.class().name.clone(),
                member: field.name.clone(),
            })?;

        let mut start = node.start_byte();
        let mut current = node;
        while let Some(prev) = current.prev_sibling() {
            let gap = &source[prev.end_byte()..current.start_byte()];
            if !is_comment(prev) || gap.matches('\n').count() > 1 || !gap.trim().is_empty() {
                break;
            }
            if leading_indent(source, prev.start_byte()).is_none() {
                break;
            }
            start = prev.start_byte();
            current = prev;
        }

        let end = node.end_byte();
        if leading_indent(source, start).is_some() && rest_of_line_is_blank(source, end) {
            return Ok(Removal {
                range: TextRange::new(line_start(source, start), line_end_inclusive(source, end)),
                whole_lines: true,
            });
        }
        Ok(Removal {
            range: TextRange::new(start, end),
            whole_lines: false,
        })
    }

    /// Extends a whole-line removal over the following blank line when the removed lines open
    /// the body or follow a blank line, so no double blank line is left behind.
    fn absorb_blank_line(&self, range: TextRange) -> TextRange {
        let source = self.parsed.source();
        let end = range.end;
        let next_line_end = line_end_inclusive(source, end);
        let next_is_blank = end < source.len() && source[end..next_line_end].trim().is_empty();
        let prev_is_open = range.start == 0 || {
            let prev_start = line_start(source, range.start - 1);
            let prev_line = source[prev_start..range.start].trim();
            prev_line.is_empty() || prev_line.ends_with('{')
        };
        if next_is_blank && prev_is_open {
            TextRange::new(range.start, next_line_end)
        } else {
            range
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Removal {
    range: TextRange,
    whole_lines: bool,
}

/// Joins whole-line removals that touch, so consecutive deleted declarations are treated as
/// one block.
fn merge_adjacent(mut removals: Vec<Removal>) -> Vec<Removal> {
    removals.sort_by_key(|removal| removal.range.start);
    let mut merged: Vec<Removal> = Vec::with_capacity(removals.len());
    for removal in removals {
        match merged.last_mut() {
            Some(prev)
                if prev.whole_lines
                    && removal.whole_lines
                    && prev.range.end == removal.range.start =>
            {
                prev.range = TextRange::new(prev.range.start, removal.range.end);
            }
            _ => merged.push(removal),
        }
    }
    merged
}

struct ReferenceScan<'r> {
    rewriter: &'r OriginalRewriter<'r, 'r>,
    resolver: &'r NameResolver<'r>,
    skipped: &'r [TextRange],
    handled: HashSet<usize>,
    rewrites: &'r mut RewriteSet,
}

impl<'r> ReferenceScan<'r> {
    fn visit(&mut self, node: Node<'_>) -> Result<(), ExtractClassError> {
        let range = range_of(node);
        if self.skipped.iter().any(|skip| skip.contains_range(range)) {
            return Ok(());
        }

        match node.kind() {
            "assignment_expression" => self.assignment(node)?,
            "update_expression" => self.update(node)?,
            _ => {}
        }
        if !self.handled.contains(&node.id()) {
            if let Some(reference) = self.moved_reference(node) {
                self.read(reference)?;
            }
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        for child in children {
            self.visit(child)?;
        }
        Ok(())
    }

    fn moved_reference<'t>(&self, node: Node<'t>) -> Option<(FieldRef<'r, 't>, MovedField<'r>)> {
        let reference = self.resolver.field_reference(node)?;
        let moved = self.rewriter.fields.get(reference.field.name.as_str())?;
        Some((reference, moved.clone()))
    }

    fn source(&self) -> &'r str {
        self.rewriter.parsed.source()
    }

    fn helper(&self) -> Result<&'r str, ExtractClassError> {
        self.rewriter
            .helper
            .ok_or_else(|| ExtractClassError::MemberNotFound {
                class: self.rewriter.parsed.class().name.clone(),
                member: "helper field".to_string(),
            })
    }

    fn static_reference(&self, field: &FieldDecl) -> String {
        format!("{}.{}", self.rewriter.new_class, field.name)
    }

    fn read(
        &mut self,
        (reference, moved): (FieldRef<'_, '_>, MovedField<'_>),
    ) -> Result<(), ExtractClassError> {
        let text = match moved.accessors {
            None => self.static_reference(moved.decl),
            Some(accessors) => format!("{}.{}()", self.helper()?, accessors.getter),
        };
        self.handled.insert(reference.node.id());
        self.rewrites.push(Rewrite::replace(range_of(reference.node), text));
        Ok(())
    }

    fn assignment(&mut self, node: Node<'_>) -> Result<(), ExtractClassError> {
        let Some(left) = node.child_by_field_name("left") else {
            return Ok(());
        };
        let Some((reference, moved)) = self.moved_reference(peel_parens(left)) else {
            return Ok(());
        };
        let Some(accessors) = moved.accessors else {
            // Static fields keep their operators; the read rewrite requalifies them.
            return Ok(());
        };
        self.handled.insert(reference.node.id());

        let name = &moved.decl.name;
        let line = node.start_position().row + 1;
        if !is_statement_context(node, self.source()) {
            return Err(ExtractClassError::Unsupported {
                line,
                reason: format!("assignment to moved field `{name}` is used as a value"),
            });
        }
        let setter = accessors.setter.as_deref().ok_or_else(|| ExtractClassError::Unsupported {
            line,
            reason: format!("assignment to final field `{name}`"),
        })?;
        let (Some(operator), Some(right)) = (
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return Ok(());
        };
        let helper = self.helper()?;
        let operator = node_text(self.source(), operator);

        let pieces = if operator == "=" {
            vec![
                Piece::Text(format!("{helper}.{setter}(")),
                Piece::Source(range_of(right)),
                Piece::Text(")".to_string()),
            ]
        } else {
            let binary = operator.trim_end_matches('=');
            let cast = needs_narrowing_cast(&moved.decl.ty, binary, right, self.source());
            let mut pieces = vec![Piece::Text(format!("{helper}.{setter}("))];
            if cast {
                pieces.push(Piece::Text(format!("({}) (", moved.decl.ty)));
            }
            pieces.push(Piece::Text(format!("{helper}.{}() {binary} ", accessors.getter)));
            if is_primary_expression(right) {
                pieces.push(Piece::Source(range_of(right)));
            } else {
                pieces.push(Piece::Text("(".to_string()));
                pieces.push(Piece::Source(range_of(right)));
                pieces.push(Piece::Text(")".to_string()));
            }
            if cast {
                pieces.push(Piece::Text(")".to_string()));
            }
            pieces.push(Piece::Text(")".to_string()));
            pieces
        };
        self.rewrites.push(Rewrite::template(range_of(node), pieces));
        Ok(())
    }

    fn update(&mut self, node: Node<'_>) -> Result<(), ExtractClassError> {
        let Some(operand) = named_children(node).into_iter().next() else {
            return Ok(());
        };
        let Some((reference, moved)) = self.moved_reference(peel_parens(operand)) else {
            return Ok(());
        };
        let Some(accessors) = moved.accessors else {
            return Ok(());
        };
        self.handled.insert(reference.node.id());

        let prefix = node.child(0).map(|first| !first.is_named()).unwrap_or(false);
        let increment = node_text(self.source(), node).contains("++");
        let helper = self.helper()?;
        let name = &moved.decl.name;

        if let Some(helpers) = &accessors.increments {
            let method = match (increment, prefix) {
                (true, true) => &helpers.increment,
                (true, false) => &helpers.post_increment,
                (false, true) => &helpers.decrement,
                (false, false) => &helpers.post_decrement,
            };
            self.rewrites
                .push(Rewrite::replace(range_of(node), format!("{helper}.{method}()")));
            return Ok(());
        }

        let line = node.start_position().row + 1;
        let Some(setter) = accessors.setter.as_deref() else {
            return Err(ExtractClassError::Unsupported {
                line,
                reason: format!("update of final field `{name}`"),
            });
        };
        if !is_statement_context(node, self.source()) {
            return Err(ExtractClassError::Unsupported {
                line,
                reason: format!(
                    "`{}` on moved field `{name}` is used as a value and `{name}` has no increment helpers",
                    if increment { "++" } else { "--" }
                ),
            });
        }
        let op = if increment { '+' } else { '-' };
        self.rewrites.push(Rewrite::replace(
            range_of(node),
            format!("{helper}.{setter}({helper}.{}() {op} 1)", accessors.getter),
        ));
        Ok(())
    }
}

/// Whether the value of `node` is discarded.
fn is_statement_context(node: Node<'_>, source: &str) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "expression_statement" => true,
        "for_statement" => matches!(field_name_in_parent(node), Some("update") | Some("init")),
        "lambda_expression" => {
            field_name_in_parent(node) == Some("body") && lambda_returns_void(parent, source)
        }
        _ => false,
    }
}

/// Functional interfaces from `java.util.function` and `java.lang` whose method returns `void`.
const VOID_FUNCTIONAL_TYPES: &[&str] = &[
    "Runnable",
    "Consumer",
    "BiConsumer",
    "IntConsumer",
    "LongConsumer",
    "DoubleConsumer",
    "ObjIntConsumer",
    "ObjLongConsumer",
    "ObjDoubleConsumer",
];

/// JDK methods whose functional argument is a consumer.
const CONSUMER_METHODS: &[&str] = &["forEach", "forEachOrdered", "forEachRemaining", "ifPresent", "peek"];

/// Whether the target type of `lambda` is known to return `void`, so an expression body's
/// value is discarded.
fn lambda_returns_void(lambda: Node<'_>, source: &str) -> bool {
    let Some(parent) = lambda.parent() else {
        return false;
    };
    match parent.kind() {
        "variable_declarator" => parent
            .parent()
            .and_then(|decl| decl.child_by_field_name("type"))
            .map(|ty| VOID_FUNCTIONAL_TYPES.contains(&raw_type_name(node_text(source, ty))))
            .unwrap_or(false),
        "argument_list" => parent
            .parent()
            .filter(|call| call.kind() == "method_invocation")
            .and_then(|call| call.child_by_field_name("name"))
            .map(|name| CONSUMER_METHODS.contains(&node_text(source, name)))
            .unwrap_or(false),
        _ => false,
    }
}

/// `((x))` -> `x`.
fn peel_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().find(|child| !is_comment(*child)) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

fn is_primary_expression(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "identifier"
            | "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal"
            | "decimal_floating_point_literal"
            | "hex_floating_point_literal"
            | "true"
            | "false"
            | "character_literal"
            | "string_literal"
            | "null_literal"
            | "this"
            | "field_access"
            | "method_invocation"
            | "array_access"
            | "parenthesized_expression"
            | "object_creation_expression"
            | "class_literal"
    )
}

/// `E1 op= E2` means `E1 = (T) ((E1) op (E2))`; the cast is left out only when it provably
/// changes nothing.
fn needs_narrowing_cast(ty: &str, operator: &str, right: Node<'_>, source: &str) -> bool {
    let primitive = matches!(
        ty,
        "byte" | "short" | "char" | "int" | "long" | "float" | "double" | "boolean"
    );
    if !primitive || matches!(ty, "double" | "boolean") {
        return false;
    }
    if matches!(operator, "<<" | ">>" | ">>>") && matches!(ty, "int" | "long") {
        return false;
    }
    let integer_literal = matches!(
        right.kind(),
        "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal"
    );
    if integer_literal {
        let long_literal = node_text(source, right).ends_with(['l', 'L']);
        return match ty {
            "int" => long_literal,
            "long" | "float" => false,
            _ => true,
        };
    }
    true
}

/// Accesses of moved instance fields through another instance of the original class
/// (`other.count`), which delegation cannot express.
pub fn find_cross_instance_refs(
    parsed: &ParsedSource<'_>,
    moved_instance_fields: &[&str],
) -> Vec<ValidationIssue> {
    let source = parsed.source();
    let resolver = NameResolver::new(source, parsed.class());
    let mut issues = Vec::new();
    let Some(body) = parsed.class_body_node() else {
        return issues;
    };
    visit_nodes(body, &mut |node| {
        if node.kind() != "field_access" {
            return;
        }
        let (Some(object), Some(field)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("field"),
        ) else {
            return;
        };
        let name = node_text(source, field);
        if moved_instance_fields.contains(&name) && resolver.is_other_instance(object) {
            issues.push(ValidationIssue::new(
                IssueKind::BlockedCrossInstanceFieldRef,
                name.to_string(),
                format!(
                    "`{}` at line {} reads the field through another instance",
                    node_text(source, node),
                    node.start_position().row + 1
                ),
            ));
        }
    });
    issues
}
