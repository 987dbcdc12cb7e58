//! Compile-time name resolution inside the primary class.
//!
//! A bare identifier refers to a field of the class unless something closer declares the
//! same name: a local variable declared earlier in an enclosing block, a method/lambda
//! parameter, a `for`/catch/resource variable, an `instanceof` pattern variable, or a field
//! of a nested class body that sits between the identifier and the primary class.

use tree_sitter::Node;

use crate::edit::TextRange;
use crate::java::{field_name_in_parent, is_comment, named_children, node_text, range_of};
use crate::model::{FieldDecl, SourceClass};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefForm {
    /// `count`
    Bare,
    /// `this.count` or `Original.this.count`
    This,
    /// `Original.COUNT`
    ClassQualified,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldRef<'a, 't> {
    pub field: &'a FieldDecl,
    pub node: Node<'t>,
    pub form: RefForm,
}

/// What the receiver of a field access is known to be.
enum Receiver {
    /// `this`, `super`, `Outer.this` or a type name.
    NotAnInstance,
    /// Statically typed as written.
    Typed(String),
    Unknown,
}

/// A declaration that shadows (or names) something in scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LocalBinding {
    /// Declared type as written; `None` for inferred lambda parameters.
    pub ty: Option<String>,
}

pub(crate) struct NameResolver<'a> {
    source: &'a str,
    class: &'a SourceClass,
}

impl<'a> NameResolver<'a> {
    pub fn new(source: &'a str, class: &'a SourceClass) -> Self {
        Self { source, class }
    }

    pub fn class(&self) -> &'a SourceClass {
        self.class
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(self.source, node)
    }

    fn is_primary_body(&self, node: Node<'_>) -> bool {
        node.kind() == "class_body" && range_of(node) == self.class.body_range
    }

    /// Whether `this` at `node` denotes an instance of the primary class.
    pub fn in_primary_instance(&self, node: Node<'_>) -> bool {
        let mut current = node.parent();
        while let Some(parent) = current {
            if self.is_primary_body(parent) {
                return true;
            }
            if matches!(
                parent.kind(),
                "class_body" | "enum_body" | "interface_body" | "annotation_type_body"
            ) {
                return false;
            }
            current = parent.parent();
        }
        false
    }

    /// Classifies `node` as a reference to a field of the primary class.
    pub fn field_reference<'t>(&self, node: Node<'t>) -> Option<FieldRef<'a, 't>> {
        match node.kind() {
            "identifier" => {
                let field = self.class.field(self.text(node))?;
                if !is_expression_identifier(node) {
                    return None;
                }
                // Case labels name constants; enum labels never resolve to fields.
                if node.parent().is_some_and(|parent| parent.kind() == "switch_label")
                    && !field.is_static()
                {
                    return None;
                }
                if self.local_binding(node, &field.name).is_some() {
                    return None;
                }
                Some(FieldRef {
                    field,
                    node,
                    form: RefForm::Bare,
                })
            }
            "field_access" => {
                let object = node.child_by_field_name("object")?;
                let name = node.child_by_field_name("field")?;
                if name.kind() != "identifier" {
                    return None;
                }
                let field = self.class.field(self.text(name))?;
                let form = match object.kind() {
                    "this" if self.in_primary_instance(node) => RefForm::This,
                    "identifier"
                        if self.text(object) == self.class.name
                            && field.is_static()
                            && self.local_binding(object, &self.class.name).is_none() =>
                    {
                        RefForm::ClassQualified
                    }
                    "field_access" => {
                        let outer = object.child_by_field_name("object")?;
                        let this = object.child_by_field_name("field")?;
                        if this.kind() == "this" && self.text(outer) == self.class.name {
                            RefForm::This
                        } else {
                            return None;
                        }
                    }
                    _ => return None,
                };
                Some(FieldRef { field, node, form })
            }
            _ => None,
        }
    }

    /// The callee name of a `method_invocation` that targets the primary class itself: no
    /// receiver, or an explicit `this` receiver.
    pub fn member_call(&self, invocation: Node<'_>) -> Option<&'a str> {
        if invocation.kind() != "method_invocation" {
            return None;
        }
        let name = invocation.child_by_field_name("name")?;
        match invocation.child_by_field_name("object") {
            None => Some(self.text(name)),
            Some(object) if object.kind() == "this" && self.in_primary_instance(invocation) => {
                Some(self.text(name))
            }
            Some(_) => None,
        }
    }

    /// Whether `object` (the receiver of a field access) may be another instance of the
    /// primary class. Receivers whose type cannot be determined count as such.
    pub fn is_other_instance(&self, object: Node<'_>) -> bool {
        match self.receiver(object) {
            Receiver::NotAnInstance => false,
            Receiver::Typed(ty) => ty.trim() == "var" || raw_type_name(&ty) == self.class.name,
            Receiver::Unknown => true,
        }
    }

    fn receiver(&self, object: Node<'_>) -> Receiver {
        match object.kind() {
            "this" | "super" => Receiver::NotAnInstance,
            "identifier" => {
                let name = self.text(object);
                match self.local_binding(object, name) {
                    Some(LocalBinding { ty: Some(ty) }) => Receiver::Typed(ty),
                    Some(LocalBinding { ty: None }) => Receiver::Unknown,
                    None => match self.class.field(name) {
                        Some(field) => Receiver::Typed(field.ty.clone()),
                        // A type name or a member of an enclosing class.
                        None => Receiver::NotAnInstance,
                    },
                }
            }
            "parenthesized_expression" => named_children(object)
                .first()
                .map(|inner| self.receiver(*inner))
                .unwrap_or(Receiver::Unknown),
            "object_creation_expression" | "cast_expression" => object
                .child_by_field_name("type")
                .map(|ty| Receiver::Typed(self.text(ty).to_string()))
                .unwrap_or(Receiver::Unknown),
            "field_access" => {
                // `Outer.this`
                if object
                    .child_by_field_name("field")
                    .is_some_and(|field| field.kind() == "this")
                {
                    return Receiver::NotAnInstance;
                }
                match self.field_reference(object) {
                    Some(reference) => Receiver::Typed(reference.field.ty.clone()),
                    None => Receiver::Unknown,
                }
            }
            "method_invocation" => {
                let Some(callee) = self.member_call(object) else {
                    return Receiver::Unknown;
                };
                let arity = argument_count(object);
                let returns: Vec<&str> = self
                    .class
                    .methods_named(callee)
                    .filter(|method| method.accepts_arity(arity))
                    .map(|method| method.return_type.as_str())
                    .collect();
                match returns.as_slice() {
                    [] => Receiver::Unknown,
                    [only] => Receiver::Typed(only.to_string()),
                    _ if returns.iter().any(|ty| raw_type_name(ty) == self.class.name) => {
                        Receiver::Typed(self.class.name.clone())
                    }
                    [first, ..] => Receiver::Typed(first.to_string()),
                }
            }
            "array_access" => match object
                .child_by_field_name("array")
                .map(|array| self.receiver(array))
            {
                Some(Receiver::Typed(ty)) => element_type(&ty)
                    .map(Receiver::Typed)
                    .unwrap_or(Receiver::Unknown),
                _ => Receiver::Unknown,
            },
            _ => Receiver::Unknown,
        }
    }

    /// The nearest declaration of `name` visible at `node` that is not a field of the primary
    /// class.
    pub fn local_binding(&self, node: Node<'_>, name: &str) -> Option<LocalBinding> {
        let offset = node.start_byte();
        let mut child = node;
        while let Some(parent) = child.parent() {
            if self.is_primary_body(parent) {
                return None;
            }
            let found = match parent.kind() {
                "block" | "constructor_body" => self.block_local(parent, name, offset),
                "switch_block_statement_group" => self
                    .block_local(parent, name, offset)
                    .or_else(|| self.case_pattern_binding(parent, name)),
                "switch_rule" => self.case_pattern_binding(parent, name),
                "switch_block" => named_children(parent)
                    .into_iter()
                    .filter(|group| group.start_byte() < offset)
                    .find_map(|group| self.block_local(group, name, offset)),
                "method_declaration" | "constructor_declaration" => parent
                    .child_by_field_name("parameters")
                    .and_then(|params| self.parameter_binding(params, name)),
                "lambda_expression" => parent
                    .child_by_field_name("parameters")
                    .and_then(|params| self.lambda_binding(params, name)),
                "for_statement" => named_children(parent)
                    .into_iter()
                    .filter(|init| init.kind() == "local_variable_declaration")
                    .find_map(|decl| self.declaration_binding(decl, name)),
                "enhanced_for_statement" => parent
                    .child_by_field_name("name")
                    .filter(|var| self.text(*var) == name)
                    .map(|_| LocalBinding {
                        ty: parent
                            .child_by_field_name("type")
                            .map(|ty| self.text(ty).to_string()),
                    }),
                "catch_clause" => named_children(parent)
                    .into_iter()
                    .find(|param| param.kind() == "catch_formal_parameter")
                    .and_then(|param| {
                        let var = param.child_by_field_name("name")?;
                        (self.text(var) == name).then(|| LocalBinding {
                            ty: named_children(param)
                                .into_iter()
                                .find(|ty| ty.kind() == "catch_type")
                                .map(|ty| self.text(ty).to_string()),
                        })
                    }),
                "try_with_resources_statement" => parent
                    .child_by_field_name("resources")
                    .and_then(|resources| {
                        named_children(resources)
                            .into_iter()
                            .filter(|resource| resource.start_byte() < offset)
                            .find_map(|resource| {
                                let var = resource.child_by_field_name("name")?;
                                (self.text(var) == name).then(|| LocalBinding {
                                    ty: resource
                                        .child_by_field_name("type")
                                        .map(|ty| self.text(ty).to_string()),
                                })
                            })
                    }),
                "class_body" | "enum_body" | "interface_body" => named_children(parent)
                    .into_iter()
                    .filter(|member| {
                        matches!(member.kind(), "field_declaration" | "constant_declaration")
                    })
                    .find_map(|decl| self.declaration_binding(decl, name)),
                _ => None,
            };
            let found = found.or_else(|| {
                if is_pattern_scope(parent) {
                    self.pattern_binding(parent, node, name)
                } else {
                    None
                }
            });
            if found.is_some() {
                return found;
            }
            child = parent;
        }
        None
    }

    fn block_local(&self, block: Node<'_>, name: &str, offset: usize) -> Option<LocalBinding> {
        named_children(block)
            .into_iter()
            .filter(|stmt| stmt.start_byte() < offset)
            .filter(|stmt| stmt.kind() == "local_variable_declaration")
            .find_map(|decl| self.declaration_binding(decl, name))
    }

    fn declaration_binding(&self, decl: Node<'_>, name: &str) -> Option<LocalBinding> {
        let ty = decl.child_by_field_name("type").map(|ty| self.text(ty));
        named_children(decl)
            .into_iter()
            .filter(|declarator| declarator.kind() == "variable_declarator")
            .find_map(|declarator| {
                let var = declarator.child_by_field_name("name")?;
                (self.text(var) == name).then(|| LocalBinding {
                    ty: ty.map(str::to_string),
                })
            })
    }

    fn parameter_binding(&self, params: Node<'_>, name: &str) -> Option<LocalBinding> {
        named_children(params).into_iter().find_map(|param| {
            let (var, ty) = match param.kind() {
                "formal_parameter" => (
                    param.child_by_field_name("name")?,
                    param.child_by_field_name("type"),
                ),
                "spread_parameter" => {
                    let children = named_children(param);
                    let declarator = children
                        .iter()
                        .find(|child| child.kind() == "variable_declarator")?;
                    let ty = children
                        .iter()
                        .find(|child| !matches!(child.kind(), "modifiers" | "variable_declarator"))
                        .copied();
                    (declarator.child_by_field_name("name")?, ty)
                }
                _ => return None,
            };
            (self.text(var) == name).then(|| LocalBinding {
                ty: ty.map(|ty| self.text(ty).to_string()),
            })
        })
    }

    fn lambda_binding(&self, params: Node<'_>, name: &str) -> Option<LocalBinding> {
        match params.kind() {
            "identifier" => (self.text(params) == name).then_some(LocalBinding { ty: None }),
            "inferred_parameters" => named_children(params)
                .into_iter()
                .any(|param| self.text(param) == name)
                .then_some(LocalBinding { ty: None }),
            _ => self.parameter_binding(params, name),
        }
    }

    /// An `instanceof` pattern variable called `name` declared inside `scope` whose scope
    /// covers `site`.
    fn pattern_binding(&self, scope: Node<'_>, site: Node<'_>, name: &str) -> Option<LocalBinding> {
        let mut found = None;
        crate::java::visit_nodes(scope, &mut |candidate| {
            if found.is_some() || candidate.kind() != "instanceof_expression" {
                return;
            }
            let Some((var, ty)) = self.pattern_variable(candidate) else {
                return;
            };
            if self.text(var) == name && pattern_in_scope(candidate, site) {
                found = Some(LocalBinding { ty });
            }
        });
        found
    }

    /// A `case T name` pattern variable of a switch group or rule.
    fn case_pattern_binding(&self, case: Node<'_>, name: &str) -> Option<LocalBinding> {
        named_children(case)
            .into_iter()
            .filter(|label| label.kind() == "switch_label")
            .flat_map(named_children)
            .filter(|pattern| pattern.kind() == "pattern")
            .flat_map(named_children)
            .filter(|pattern| pattern.kind() == "type_pattern")
            .find_map(|pattern| {
                let children = named_children(pattern);
                let var = children.last()?;
                (self.text(*var) == name).then(|| LocalBinding {
                    ty: children.first().map(|ty| self.text(*ty).to_string()),
                })
            })
    }

    fn pattern_variable<'t>(&self, instanceof: Node<'t>) -> Option<(Node<'t>, Option<String>)> {
        let var = instanceof.child_by_field_name("name")?;
        let ty = instanceof
            .child_by_field_name("right")
            .map(|ty| self.text(ty).to_string());
        Some((var, ty))
    }

    /// Byte ranges of nested/anonymous class bodies inside `root` that declare a method called
    /// `name`; calls inside them resolve to that method rather than the primary class.
    pub fn shadowing_bodies(&self, root: Node<'_>, name: &str) -> Vec<TextRange> {
        let mut out = Vec::new();
        crate::java::visit_nodes(root, &mut |node| {
            if node.kind() != "class_body" || self.is_primary_body(node) {
                return;
            }
            let declares = named_children(node).into_iter().any(|member| {
                member.kind() == "method_declaration"
                    && member
                        .child_by_field_name("name")
                        .map(|n| self.text(n) == name)
                        .unwrap_or(false)
            });
            if declares {
                out.push(range_of(node));
            }
        });
        out
    }
}

/// `java.util.List<String>` -> `List`.
pub(crate) fn raw_type_name(ty: &str) -> &str {
    let ty = ty.trim();
    let ty = ty.split('<').next().unwrap_or(ty).trim();
    ty.rsplit('.').next().unwrap_or(ty).trim()
}

/// `Counter[]` -> `Counter`; `None` when `ty` is not an array type.
fn element_type(ty: &str) -> Option<String> {
    let ty = ty.trim();
    let element = ty
        .strip_suffix("...")
        .or_else(|| ty.strip_suffix(']')?.trim_end().strip_suffix('['))?;
    Some(element.trim_end().to_string())
}

/// Number of arguments of a `method_invocation`.
pub(crate) fn argument_count(invocation: Node<'_>) -> usize {
    invocation
        .child_by_field_name("arguments")
        .map(|args| {
            named_children(args)
                .into_iter()
                .filter(|arg| !is_comment(*arg))
                .count()
        })
        .unwrap_or(0)
}

/// Nodes at which `instanceof` pattern variables are looked up.
fn is_pattern_scope(node: Node<'_>) -> bool {
    match node.kind() {
        "method_declaration" | "constructor_declaration" | "lambda_expression"
        | "static_initializer" => true,
        "block" => node.parent().is_some_and(|parent| parent.kind() == "class_body"),
        _ => false,
    }
}

fn covers(node: Option<Node<'_>>, site: TextRange) -> bool {
    node.is_some_and(|node| range_of(node).contains_range(site))
}

/// Whether the pattern variable introduced by `instanceof` is in scope at `site`.
///
/// Follows the flow-scoping rules for the common shapes: the rest of the condition, the
/// branch taken when the test succeeds, and the rest of the block after
/// `if (!(x instanceof T v)) { ... }`. Anywhere else the variable is taken to be in scope for
/// the rest of its statement.
fn pattern_in_scope(instanceof: Node<'_>, site: Node<'_>) -> bool {
    if site.start_byte() < instanceof.end_byte() {
        return false;
    }
    let site_range = range_of(site);
    let mut negated = false;
    let mut current = instanceof;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "unary_expression" => {
                if parent.child(0).is_some_and(|op| op.kind() == "!") {
                    negated = !negated;
                }
            }
            "if_statement" | "while_statement" | "ternary_expression"
                if field_name_in_parent(current) == Some("condition") =>
            {
                if covers(Some(current), site_range) {
                    return true;
                }
                if !negated {
                    let taken = if parent.kind() == "while_statement" {
                        "body"
                    } else {
                        "consequence"
                    };
                    return covers(parent.child_by_field_name(taken), site_range);
                }
                if covers(parent.child_by_field_name("alternative"), site_range) {
                    return true;
                }
                return parent.kind() != "ternary_expression"
                    && site.start_byte() >= parent.end_byte()
                    && covers(parent.parent(), site_range);
            }
            "expression_statement"
            | "return_statement"
            | "local_variable_declaration"
            | "yield_statement"
            | "throw_statement"
            | "assert_statement"
            | "do_statement"
            | "for_statement"
            | "enhanced_for_statement"
            | "if_statement"
            | "while_statement"
            | "lambda_expression"
            | "block"
            | "field_declaration" => return covers(Some(parent), site_range),
            _ => {}
        }
        current = parent;
    }
    false
}

/// Whether an `identifier` node stands in expression position (a name that could refer to a
/// variable), as opposed to a declaration name, label, member name after a dot, etc.
pub(crate) fn is_expression_identifier(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let field = field_name_in_parent(node);
    match (parent.kind(), field) {
        ("method_reference", _) => parent.named_child(0) == Some(node),
        ("variable_declarator", Some("name"))
        | ("formal_parameter", Some("name"))
        | ("catch_formal_parameter", Some("name"))
        | ("method_declaration", Some("name"))
        | ("constructor_declaration", Some("name"))
        | ("method_invocation", Some("name"))
        | ("field_access", Some("field"))
        | ("enhanced_for_statement", Some("name"))
        | ("resource", Some("name"))
        | ("lambda_expression", Some("parameters"))
        | ("element_value_pair", Some("key"))
        | ("annotation", Some("name"))
        | ("marker_annotation", Some("name"))
        | ("enum_constant", Some("name"))
        | ("instanceof_expression", Some("name"))
        | ("type_pattern", _)
        | ("record_pattern", _)
        | ("record_pattern_component", _)
        | ("class_declaration", _)
        | ("interface_declaration", _)
        | ("enum_declaration", _)
        | ("record_declaration", _)
        | ("annotation_type_declaration", _)
        | ("inferred_parameters", _)
        | ("labeled_statement", _)
        | ("break_statement", _)
        | ("continue_statement", _)
        | ("scoped_identifier", _)
        | ("import_declaration", _)
        | ("package_declaration", _) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::java::{visit_nodes, ParsedSource};

    const SOURCE: &str = r#"class Counter {
    private int count;
    private static int TOTAL;

    void bump(int step) {
        count += step;
        this.count++;
        Counter.TOTAL++;
        int count = 3;
        count--;
        Runnable r = () -> { int x = count; };
        Object o = new Object() {
            int count;
            void touch() { count = 1; }
        };
    }

    void copy(Counter other) {
        count = other.count;
        for (int count : new int[] {1}) { use(count); }
    }
}
"#;

    fn references(parsed: &ParsedSource<'_>) -> Vec<(usize, RefForm)> {
        let resolver = NameResolver::new(parsed.source(), parsed.class());
        let mut out = Vec::new();
        visit_nodes(parsed.tree().root_node(), &mut |node| {
            if let Some(found) = resolver.field_reference(node) {
                let line = node.start_position().row + 1;
                out.push((line, found.form));
            }
        });
        out
    }

    #[test]
    fn resolves_bare_this_and_class_qualified_references() {
        let parsed = ParsedSource::parse(SOURCE, None).unwrap();
        assert_eq!(
            references(&parsed),
            vec![
                (6, RefForm::Bare),
                (7, RefForm::This),
                (8, RefForm::ClassQualified),
                (19, RefForm::Bare),
            ]
        );
    }

    #[test]
    fn detects_receivers_typed_as_the_class() {
        let parsed = ParsedSource::parse(SOURCE, None).unwrap();
        let resolver = NameResolver::new(parsed.source(), parsed.class());
        let mut hits = Vec::new();
        visit_nodes(parsed.tree().root_node(), &mut |node| {
            if node.kind() == "field_access" {
                if let Some(object) = node.child_by_field_name("object") {
                    if resolver.is_other_instance(object) {
                        hits.push(node_text(parsed.source(), node).to_string());
                    }
                }
            }
        });
        assert_eq!(hits, vec!["other.count".to_string()]);
    }

    fn other_instance_receivers(source: &str) -> Vec<String> {
        let parsed = ParsedSource::parse(source, None).unwrap();
        let resolver = NameResolver::new(parsed.source(), parsed.class());
        let mut hits = Vec::new();
        visit_nodes(parsed.tree().root_node(), &mut |node| {
            if node.kind() == "field_access" {
                if let Some(object) = node.child_by_field_name("object") {
                    if resolver.is_other_instance(object) {
                        hits.push(node_text(parsed.source(), node).to_string());
                    }
                }
            }
        });
        hits
    }

    #[test]
    fn receivers_of_unknown_or_matching_type_count_as_other_instances() {
        let source = r#"class Cell {
    private int value;
    private Cell next;
    private Point origin;

    Cell peer() { return next; }
    Point corner() { return origin; }

    void scan(Cell[] all, java.util.List<Cell> list, Point p) {
        use(peer().value);
        use(all[0].value);
        use(this.next.value);
        use(list.get(0).value);
        use(corner().x);
        use(p.x);
        use(this.origin.x);
        use(Cell.this.value);
    }
}
"#;
        assert_eq!(
            other_instance_receivers(source),
            vec![
                "peer().value".to_string(),
                "all[0].value".to_string(),
                "this.next.value".to_string(),
                "list.get(0).value".to_string(),
            ]
        );
    }

    #[test]
    fn instanceof_patterns_shadow_fields_where_they_are_in_scope() {
        let source = r#"class Slot {
    private int count;

    int f(Object o) {
        if (o instanceof Integer count) {
            return count;
        }
        return count;
    }

    int g(Object o) {
        if (!(o instanceof Integer count)) {
            return count;
        }
        return count;
    }

    int h(Object o) {
        return o instanceof Integer count && count > 0 ? count : 0;
    }
}
"#;
        let parsed = ParsedSource::parse(source, None).unwrap();
        let lines: Vec<usize> = references(&parsed)
            .into_iter()
            .map(|(line, _)| line)
            .collect();
        // Line 8: after the positive test. Line 13: the failing branch of the negated test.
        assert_eq!(lines, vec![8, 13]);
    }

    #[test]
    fn case_labels_resolve_to_static_constants() {
        let source = r#"class Gate {
    static final int LIMIT = 3;

    String label(int x) {
        switch (x) {
            case LIMIT:
                return "max";
            default:
                return "";
        }
    }
}
"#;
        let parsed = ParsedSource::parse(source, None).unwrap();
        assert_eq!(references(&parsed), vec![(6, RefForm::Bare)]);
    }

    #[test]
    fn raw_type_names_drop_packages_and_arguments() {
        assert_eq!(raw_type_name("java.util.List<String>"), "List");
        assert_eq!(raw_type_name("Counter"), "Counter");
    }
}
