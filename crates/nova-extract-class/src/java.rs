//! `tree-sitter-java` parsing and the [`SourceClass`] builder.

use std::cell::RefCell;

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

use crate::edit::TextRange;
use crate::model::{
    FieldDecl, MethodDecl, Modifiers, NestedType, NestedTypeKind, Parameter, SourceClass,
    Visibility,
};
use crate::signature::{canonical_signature, collapse_type};

thread_local! {
    static JAVA_PARSER: RefCell<Result<Parser, String>> = RefCell::new({
        let mut parser = Parser::new();
        match parser.set_language(tree_sitter_java::language()) {
            Ok(()) => Ok(parser),
            Err(_) => Err("tree-sitter-java language load failed".to_string()),
        }
    });
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0}")]
    Parser(String),
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
    #[error("no class declaration found")]
    NoClass,
}

/// Parse Java source text with `tree-sitter-java`.
///
/// Any ERROR or MISSING node makes the source unparseable for our purposes: rewriting a
/// tree the parser had to guess at would produce output nobody asked for.
pub fn parse_java(source: &str) -> Result<Tree, ParseError> {
    let tree = JAVA_PARSER.with(|parser_cell| {
        let mut parser = parser_cell
            .try_borrow_mut()
            .map_err(|_| ParseError::Parser("tree-sitter parser is already in use".to_string()))?;
        let parser = match parser.as_mut() {
            Ok(parser) => parser,
            Err(err) => return Err(ParseError::Parser(err.clone())),
        };

        parser.parse(source, None).ok_or_else(|| {
            ParseError::Parser("tree-sitter failed to produce a syntax tree".to_string())
        })
    })?;

    if let Some(error) = first_error(tree.root_node()) {
        let point = error.start_position();
        return Err(ParseError::Syntax {
            line: point.row + 1,
            column: point.column + 1,
        });
    }
    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// A parsed compilation unit together with the model of its primary class.
pub struct ParsedSource<'s> {
    source: &'s str,
    tree: Tree,
    class: SourceClass,
}

impl<'s> ParsedSource<'s> {
    /// Parses `source` and models its primary class: the top-level class named
    /// `preferred_class` when there is one, otherwise the first top-level class.
    pub fn parse(source: &'s str, preferred_class: Option<&str>) -> Result<Self, ParseError> {
        let tree = parse_java(source)?;
        let root = tree.root_node();

        let classes: Vec<Node<'_>> = named_children(root)
            .into_iter()
            .filter(|node| node.kind() == "class_declaration")
            .collect();
        let class_node = preferred_class
            .and_then(|wanted| {
                classes.iter().copied().find(|node| {
                    node.child_by_field_name("name")
                        .map(|name| node_text(source, name) == wanted)
                        .unwrap_or(false)
                })
            })
            .or_else(|| classes.first().copied())
            .ok_or(ParseError::NoClass)?;

        let class = build_class(root, class_node, source);
        Ok(Self {
            source,
            tree,
            class,
        })
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn class(&self) -> &SourceClass {
        &self.class
    }

    pub(crate) fn class_node(&self) -> Option<Node<'_>> {
        named_children(self.tree.root_node())
            .into_iter()
            .find(|node| node.kind() == "class_declaration" && range_of(*node) == self.class.range)
    }

    pub(crate) fn class_body_node(&self) -> Option<Node<'_>> {
        self.class_node()?.child_by_field_name("body")
    }

    /// The declaration node of a member whose range is `range`.
    pub(crate) fn member_node(&self, range: TextRange) -> Option<Node<'_>> {
        named_children(self.class_body_node()?)
            .into_iter()
            .find(|node| range_of(*node) == range)
    }
}

/// Return the byte slice for `node` within `source`.
pub(crate) fn node_text<'a>(source: &'a str, node: Node<'_>) -> &'a str {
    &source[node.byte_range()]
}

pub(crate) fn range_of(node: Node<'_>) -> TextRange {
    TextRange::new(node.start_byte(), node.end_byte())
}

pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Find the first named child with the given kind.
pub(crate) fn find_named_child<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    named_children(node)
        .into_iter()
        .find(|child| child.kind() == kind)
}

/// Best-effort helper to fetch a node's `modifiers`, which is not a field in every grammar
/// revision.
pub(crate) fn modifier_node(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("modifiers")
        .or_else(|| find_named_child(node, "modifiers"))
}

/// The field name under which `node` hangs off its parent.
pub(crate) fn field_name_in_parent(node: Node<'_>) -> Option<&'static str> {
    let parent = node.parent()?;
    let mut cursor = parent.walk();
    if !cursor.goto_first_child() {
        return None;
    }
    loop {
        if cursor.node() == node {
            return cursor.field_name();
        }
        if !cursor.goto_next_sibling() {
            return None;
        }
    }
}

/// Visit a node and all its descendants in pre-order.
pub(crate) fn visit_nodes<'a, F: FnMut(Node<'a>)>(node: Node<'a>, f: &mut F) {
    f(node);
    if node.child_count() == 0 {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit_nodes(child, f);
    }
}

pub(crate) fn is_comment(node: Node<'_>) -> bool {
    matches!(node.kind(), "comment" | "line_comment" | "block_comment")
}

fn build_class(root: Node<'_>, class_node: Node<'_>, source: &str) -> SourceClass {
    let name = class_node
        .child_by_field_name("name")
        .map(|node| node_text(source, node).to_string())
        .unwrap_or_default();

    let mut package = None;
    let mut imports = Vec::new();
    for item in named_children(root) {
        match item.kind() {
            "package_declaration" => {
                package = named_children(item)
                    .into_iter()
                    .find(|child| matches!(child.kind(), "scoped_identifier" | "identifier"))
                    .map(|child| node_text(source, child).to_string());
            }
            "import_declaration" => imports.push(node_text(source, item).to_string()),
            _ => {}
        }
    }

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut nested_types = Vec::new();
    let body = class_node.child_by_field_name("body");
    if let Some(body) = body {
        for (group, member) in named_children(body).into_iter().enumerate() {
            match member.kind() {
                "field_declaration" => fields.extend(build_fields(member, source, group)),
                "method_declaration" => methods.push(build_method(member, source, false)),
                "constructor_declaration" => methods.push(build_method(member, source, true)),
                kind => {
                    if let Some(kind) = nested_type_kind(kind) {
                        let modifiers = parse_modifiers(modifier_node(member), source);
                        if let Some(name) = member.child_by_field_name("name") {
                            nested_types.push(NestedType {
                                name: node_text(source, name).to_string(),
                                kind,
                                visibility: modifiers.visibility,
                            });
                        }
                    }
                }
            }
        }
    }

    SourceClass {
        name,
        package,
        imports,
        modifiers: parse_modifiers(modifier_node(class_node), source),
        fields,
        methods,
        nested_types,
        range: range_of(class_node),
        body_range: body.map(range_of).unwrap_or_else(|| range_of(class_node)),
    }
}

fn nested_type_kind(kind: &str) -> Option<NestedTypeKind> {
    match kind {
        "class_declaration" => Some(NestedTypeKind::Class),
        "interface_declaration" => Some(NestedTypeKind::Interface),
        "enum_declaration" => Some(NestedTypeKind::Enum),
        "record_declaration" => Some(NestedTypeKind::Record),
        "annotation_type_declaration" => Some(NestedTypeKind::Annotation),
        _ => None,
    }
}

pub(crate) fn parse_modifiers(node: Option<Node<'_>>, source: &str) -> Modifiers {
    let mut modifiers = Modifiers::default();
    let Some(node) = node else {
        return modifiers;
    };
    modifiers.text = node_text(source, node).to_string();

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.is_named() {
            if child.kind().ends_with("annotation") {
                modifiers
                    .annotations
                    .push(node_text(source, child).to_string());
            }
            continue;
        }
        match child.kind() {
            "public" => modifiers.visibility = Visibility::Public,
            "protected" => modifiers.visibility = Visibility::Protected,
            "private" => modifiers.visibility = Visibility::Private,
            keyword => {
                match keyword {
                    "static" => modifiers.is_static = true,
                    "final" => modifiers.is_final = true,
                    "abstract" => modifiers.is_abstract = true,
                    _ => {}
                }
                modifiers.keywords.push(keyword.to_string());
            }
        }
    }
    modifiers
}

fn dimension_count(node: Option<Node<'_>>, source: &str) -> usize {
    node.map(|node| node_text(source, node).matches('[').count())
        .unwrap_or(0)
}

fn build_fields(member: Node<'_>, source: &str, group: usize) -> Vec<FieldDecl> {
    let modifiers = parse_modifiers(modifier_node(member), source);
    let base_ty = member
        .child_by_field_name("type")
        .map(|node| collapse_type(node_text(source, node)))
        .unwrap_or_default();

    named_children(member)
        .into_iter()
        .filter(|child| child.kind() == "variable_declarator")
        .filter_map(|declarator| {
            let name = declarator.child_by_field_name("name")?;
            let dims = declarator
                .child_by_field_name("dimensions")
                .or_else(|| find_named_child(declarator, "dimensions"));
            let value = declarator.child_by_field_name("value");
            Some(FieldDecl {
                name: node_text(source, name).to_string(),
                ty: format!("{}{}", base_ty, "[]".repeat(dimension_count(dims, source))),
                modifiers: modifiers.clone(),
                initializer: value.map(|value| node_text(source, value).to_string()),
                declaration_range: range_of(member),
                declarator_range: range_of(declarator),
                group,
            })
        })
        .collect()
}

fn build_params(node: Option<Node<'_>>, source: &str) -> Vec<Parameter> {
    let Some(node) = node else {
        return Vec::new();
    };
    named_children(node)
        .into_iter()
        .filter_map(|param| match param.kind() {
            "formal_parameter" => {
                let ty = param.child_by_field_name("type")?;
                let name = param.child_by_field_name("name")?;
                let dims = param
                    .child_by_field_name("dimensions")
                    .or_else(|| find_named_child(param, "dimensions"));
                Some(Parameter {
                    ty: format!(
                        "{}{}",
                        collapse_type(node_text(source, ty)),
                        "[]".repeat(dimension_count(dims, source))
                    ),
                    name: node_text(source, name).to_string(),
                    variadic: false,
                })
            }
            "spread_parameter" => {
                let children = named_children(param);
                let ty = children
                    .iter()
                    .find(|child| !matches!(child.kind(), "modifiers" | "variable_declarator"))?;
                let declarator = children
                    .iter()
                    .find(|child| child.kind() == "variable_declarator")?;
                let name = declarator.child_by_field_name("name")?;
                Some(Parameter {
                    ty: collapse_type(node_text(source, *ty)),
                    name: node_text(source, name).to_string(),
                    variadic: true,
                })
            }
            _ => None,
        })
        .collect()
}

fn build_method(member: Node<'_>, source: &str, is_constructor: bool) -> MethodDecl {
    let name = member
        .child_by_field_name("name")
        .map(|node| node_text(source, node).to_string())
        .unwrap_or_default();
    let params = build_params(member.child_by_field_name("parameters"), source);
    let return_type = if is_constructor {
        String::new()
    } else {
        member
            .child_by_field_name("type")
            .map(|node| collapse_type(node_text(source, node)))
            .unwrap_or_else(|| "void".to_string())
    };

    let rendered_params: Vec<String> = params
        .iter()
        .map(|param| {
            if param.variadic {
                format!("{}...", param.ty)
            } else {
                param.ty.clone()
            }
        })
        .collect();
    let signature = canonical_signature(&format!("{}({})", name, rendered_params.join(",")));

    MethodDecl {
        name,
        signature,
        params,
        return_type,
        modifiers: parse_modifiers(modifier_node(member), source),
        is_constructor,
        range: range_of(member),
        body_range: member.child_by_field_name("body").map(range_of),
    }
}
