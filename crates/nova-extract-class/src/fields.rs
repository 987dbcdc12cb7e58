//! Field declarations for the new class and their synthesized accessors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::format::capitalize;
use crate::model::{FieldDecl, MethodDecl};
use crate::signature::canonical_signature;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementHelpers {
    pub increment: String,
    pub post_increment: String,
    pub decrement: String,
    pub post_decrement: String,
}

/// Accessor method names the remaining class talks to a moved instance field through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAccessors {
    pub getter: String,
    /// Absent for `final` fields with an initializer.
    pub setter: Option<String>,
    /// Present for non-final fields of an arithmetic primitive type.
    pub increments: Option<IncrementHelpers>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedField {
    pub name: String,
    pub is_static: bool,
    /// The declaration as it appears in the new class, without indentation.
    pub declaration: String,
    /// `None` for static fields, which are referenced directly.
    pub accessors: Option<FieldAccessors>,
    /// Synthesized accessor methods, without indentation.
    pub members: Vec<String>,
}

/// Copies approved field declarations and synthesizes their accessors.
pub struct FieldExtractor<'a> {
    source: &'a str,
    moved_methods: &'a [&'a MethodDecl],
    indent: &'a str,
}

impl<'a> FieldExtractor<'a> {
    /// `moved_methods` are the methods moving to the new class; accessors must not clash with
    /// them.
    pub fn new(source: &'a str, moved_methods: &'a [&'a MethodDecl], indent: &'a str) -> Self {
        Self {
            source,
            moved_methods,
            indent,
        }
    }

    pub fn extract(&self, fields: &[&FieldDecl]) -> Vec<ExtractedField> {
        let mut taken: BTreeSet<String> = BTreeSet::new();
        let extracted: Vec<ExtractedField> = fields
            .iter()
            .map(|field| {
                if field.is_static() {
                    self.extract_static(field)
                } else {
                    self.extract_instance(field, &mut taken)
                }
            })
            .collect();

        tracing::debug!(
            target: "nova.extract_class",
            fields = extracted.len(),
            "extracted fields"
        );
        extracted
    }

    fn extract_static(&self, field: &FieldDecl) -> ExtractedField {
        let modifiers = field.modifiers.text.split_whitespace().collect::<Vec<_>>().join(" ");
        ExtractedField {
            name: field.name.clone(),
            is_static: true,
            declaration: declaration(&modifiers, field),
            accessors: None,
            members: Vec::new(),
        }
    }

    fn extract_instance(&self, field: &FieldDecl, taken: &mut BTreeSet<String>) -> ExtractedField {
        // A blank final is assigned by the original constructors, through the setter now.
        let keeps_final = field.is_final() && field.initializer.is_some();

        let mut modifiers: Vec<&str> = field.modifiers.annotations.iter().map(String::as_str).collect();
        modifiers.push("private");
        modifiers.extend(
            field
                .modifiers
                .keywords
                .iter()
                .map(String::as_str)
                .filter(|keyword| *keyword != "final" || keeps_final),
        );

        let name = &field.name;
        let ty = &field.ty;
        let suffix = capitalize(name);
        let mut members = Vec::new();

        let (getter, reused) = self.accessor_name(format!("get{suffix}"), &[], taken, |method| {
            self.is_trivial_getter(method, name)
        });
        if !reused {
            members.push(self.method(&format!("public {ty} {getter}()"), &format!("return {name};")));
        }

        let setter = (!keeps_final).then(|| {
            let (setter, reused) =
                self.accessor_name(format!("set{suffix}"), &[ty.as_str()], taken, |method| {
                    self.is_trivial_setter(method, name)
                });
            if !reused {
                members.push(self.method(
                    &format!("public void {setter}({ty} {name})"),
                    &format!("this.{name} = {name};"),
                ));
            }
            setter
        });

        let increments = (!field.is_final() && field.is_arithmetic()).then(|| {
            let mut helper = |prefix: &str, body: String| {
                let (helper, _) =
                    self.accessor_name(format!("{prefix}{suffix}"), &[], taken, |_| false);
                members.push(self.method(&format!("public {ty} {helper}()"), &body));
                helper
            };
            IncrementHelpers {
                increment: helper("increment", format!("return ++{name};")),
                post_increment: helper("postIncrement", format!("return {name}++;")),
                decrement: helper("decrement", format!("return --{name};")),
                post_decrement: helper("postDecrement", format!("return {name}--;")),
            }
        });

        ExtractedField {
            name: name.clone(),
            is_static: false,
            declaration: declaration(&modifiers.join(" "), field),
            accessors: Some(FieldAccessors {
                getter,
                setter,
                increments,
            }),
            members,
        }
    }

    /// Picks the accessor name for `base(params)`.
    ///
    /// A moved method with that exact signature is reused when `reusable` accepts it;
    /// otherwise the accessor gets a `Field` suffix, then numbers.
    fn accessor_name(
        &self,
        base: String,
        params: &[&str],
        taken: &mut BTreeSet<String>,
        reusable: impl Fn(&MethodDecl) -> bool,
    ) -> (String, bool) {
        let signature_of = |name: &str| canonical_signature(&format!("{name}({})", params.join(",")));
        let clashes = |name: &str, taken: &BTreeSet<String>| {
            taken.contains(name)
                || self
                    .moved_methods
                    .iter()
                    .any(|method| method.signature == signature_of(name))
        };

        if let Some(existing) = self
            .moved_methods
            .iter()
            .find(|method| method.signature == signature_of(&base))
        {
            if reusable(existing) && !taken.contains(&base) {
                taken.insert(base.clone());
                return (base, true);
            }
        }

        let mut name = base.clone();
        let mut counter = 1usize;
        while clashes(&name, taken) {
            name = if counter == 1 {
                format!("{base}Field")
            } else {
                format!("{base}Field{counter}")
            };
            counter += 1;
        }
        taken.insert(name.clone());
        (name, false)
    }

    fn compact_body(&self, method: &MethodDecl) -> Option<String> {
        let body = method.body_range?;
        let text = self.source.get(body.start..body.end)?;
        let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?;
        Some(inner.chars().filter(|c| !c.is_whitespace()).collect())
    }

    fn is_trivial_getter(&self, method: &MethodDecl, field: &str) -> bool {
        if method.is_static() {
            return false;
        }
        self.compact_body(method)
            .map(|body| body == format!("return{field};") || body == format!("returnthis.{field};"))
            .unwrap_or(false)
    }

    fn is_trivial_setter(&self, method: &MethodDecl, field: &str) -> bool {
        let [param] = method.params.as_slice() else {
            return false;
        };
        if method.is_static() || !method.is_void() {
            return false;
        }
        let value = &param.name;
        self.compact_body(method)
            .map(|body| {
                body == format!("this.{field}={value};")
                    || (value != field && body == format!("{field}={value};"))
            })
            .unwrap_or(false)
    }

    fn method(&self, header: &str, statement: &str) -> String {
        format!("{header} {{\n{}{statement}\n}}", self.indent)
    }
}

fn declaration(modifiers: &str, field: &FieldDecl) -> String {
    let mut out = String::new();
    if !modifiers.is_empty() {
        out.push_str(modifiers);
        out.push(' ');
    }
    out.push_str(&field.ty);
    out.push(' ');
    out.push_str(&field.name);
    if let Some(initializer) = &field.initializer {
        out.push_str(" = ");
        out.push_str(initializer);
    }
    out.push(';');
    out
}
