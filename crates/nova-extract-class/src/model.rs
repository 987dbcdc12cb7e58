//! The structural model of a class, as seen by the validator and the generators.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::edit::TextRange;
use crate::signature::{canonical_signature, signatures_match};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Public,
    Protected,
    #[default]
    PackagePrivate,
    Private,
}

impl Visibility {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Visibility::Public => Some("public"),
            Visibility::Protected => Some("protected"),
            Visibility::PackagePrivate => None,
            Visibility::Private => Some("private"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    /// Annotation source texts, in order.
    #[serde(default)]
    pub annotations: Vec<String>,
    /// Keyword modifiers other than visibility, in source order (`static`, `final`, ...).
    #[serde(default)]
    pub keywords: Vec<String>,
    /// The full modifier list as written, annotations included.
    #[serde(default)]
    pub text: String,
}

/// Primitive types that support `++`/`--` and arithmetic compound assignment.
pub const ARITHMETIC_PRIMITIVES: &[&str] =
    &["byte", "short", "char", "int", "long", "float", "double"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDecl {
    pub name: String,
    /// Declared type, with any C-style declarator dimensions folded in.
    pub ty: String,
    pub modifiers: Modifiers,
    pub initializer: Option<String>,
    /// The whole declaration statement, shared by co-declared variables.
    pub declaration_range: TextRange,
    pub declarator_range: TextRange,
    /// Index of the declaration statement within the class; co-declared variables share it.
    pub group: usize,
}

impl FieldDecl {
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.is_final
    }

    pub fn is_arithmetic(&self) -> bool {
        ARITHMETIC_PRIMITIVES.contains(&self.ty.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub ty: String,
    pub name: String,
    pub variadic: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDecl {
    pub name: String,
    /// Canonical signature, see [`crate::signature::canonical_signature`].
    pub signature: String,
    pub params: Vec<Parameter>,
    /// `void` for void methods; empty for constructors.
    pub return_type: String,
    pub modifiers: Modifiers,
    pub is_constructor: bool,
    pub range: TextRange,
    /// The `{ ... }` block, absent for abstract and native methods.
    pub body_range: Option<TextRange>,
}

impl MethodDecl {
    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.is_abstract
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.visibility == Visibility::Private
    }

    pub fn is_void(&self) -> bool {
        self.return_type == "void"
    }

    /// Whether a call with `count` arguments can select this method.
    pub fn accepts_arity(&self, count: usize) -> bool {
        match self.params.last() {
            Some(last) if last.variadic => count + 1 >= self.params.len(),
            _ => count == self.params.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NestedTypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedType {
    pub name: String,
    pub kind: NestedTypeKind,
    pub visibility: Visibility,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceClass {
    pub name: String,
    pub package: Option<String>,
    /// Import declarations as written (`import java.util.List;`).
    pub imports: Vec<String>,
    pub modifiers: Modifiers,
    pub fields: Vec<FieldDecl>,
    /// Methods and constructors in declaration order.
    pub methods: Vec<MethodDecl>,
    pub nested_types: Vec<NestedType>,
    pub range: TextRange,
    /// The `{ ... }` class body, braces included.
    pub body_range: TextRange,
}

impl SourceClass {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Finds a method (never a constructor) by signature.
    ///
    /// An exact canonical match wins over a normalized one so overloads that only differ by
    /// array-vs-bare parameters stay distinguishable.
    pub fn find_method(&self, signature: &str) -> Option<&MethodDecl> {
        let canonical = canonical_signature(signature);
        let mut methods = self.methods.iter().filter(|m| !m.is_constructor);
        methods
            .clone()
            .find(|m| m.signature == canonical)
            .or_else(|| methods.find(|m| signatures_match(&m.signature, signature)))
    }

    pub fn find_constructor(&self, signature: &str) -> Option<&MethodDecl> {
        self.methods
            .iter()
            .filter(|m| m.is_constructor)
            .find(|m| signatures_match(&m.signature, signature))
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDecl> + 'a {
        self.methods
            .iter()
            .filter(move |m| !m.is_constructor && m.name == name)
    }

    pub fn nested_type(&self, name: &str) -> Option<&NestedType> {
        self.nested_types.iter().find(|ty| ty.name == name)
    }

    pub fn is_private_nested_type(&self, name: &str) -> bool {
        self.nested_type(name)
            .map(|ty| ty.visibility == Visibility::Private)
            .unwrap_or(false)
    }

    /// Fields declared in the same statement as `field`, itself included.
    pub fn field_group(&self, group: usize) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(move |field| field.group == group)
    }
}

/// Per-method dependency facts: what each method calls, touches and mentions.
///
/// Keys are method signatures in any spelling accepted by
/// [`crate::signature::normalize_signature`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyFacts {
    #[serde(default)]
    pub method_calls: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub field_accesses: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub type_references: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyFacts {
    pub fn calls_of(&self, method: &MethodDecl) -> &BTreeSet<String> {
        lookup(&self.method_calls, method)
    }

    pub fn field_accesses_of(&self, method: &MethodDecl) -> &BTreeSet<String> {
        lookup(&self.field_accesses, method)
    }

    pub fn type_references_of(&self, method: &MethodDecl) -> &BTreeSet<String> {
        lookup(&self.type_references, method)
    }
}

fn lookup<'a>(
    map: &'a BTreeMap<String, BTreeSet<String>>,
    method: &MethodDecl,
) -> &'a BTreeSet<String> {
    static EMPTY: BTreeSet<String> = BTreeSet::new();

    if let Some(found) = map.get(&method.signature) {
        return found;
    }
    map.iter()
        .find(|(key, _)| canonical_signature(key) == method.signature)
        .or_else(|| {
            map.iter()
                .find(|(key, _)| signatures_match(key, &method.signature))
        })
        .map(|(_, value)| value)
        .unwrap_or(&EMPTY)
}

/// The externally proposed members to move.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSet {
    pub new_class_name: String,
    #[serde(default)]
    pub field_names: Vec<String>,
    #[serde(default)]
    pub method_signatures: Vec<String>,
}
