//! The request/response entry point: validate, generate and rewrite in one call.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::analyze_dependencies;
use crate::config::ExtractClassConfig;
use crate::error::ExtractClassError;
use crate::fields::{ExtractedField, FieldExtractor};
use crate::format::{decapitalize, identifiers, indent_block};
use crate::java::{parse_java, ParseError, ParsedSource};
use crate::methods::{ExtractedMethod, MethodExtractor};
use crate::model::{
    CandidateSet, DependencyFacts, FieldDecl, MethodDecl, SourceClass, Visibility,
};
use crate::rewrite::{find_cross_instance_refs, MovedField, OriginalRewriter};
use crate::validate::{CandidateValidator, ExtractionPlan, ValidationIssue};

/// An extraction request as produced by the clustering collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractClassRequest {
    pub new_class_name: String,
    pub source_file_path: PathBuf,
    #[serde(default)]
    pub method_signatures: Vec<String>,
    #[serde(default)]
    pub field_names: Vec<String>,
}

impl ExtractClassRequest {
    pub fn candidate(&self) -> CandidateSet {
        CandidateSet {
            new_class_name: self.new_class_name.clone(),
            field_names: self.field_names.clone(),
            method_signatures: self.method_signatures.clone(),
        }
    }

    fn class_hint(&self) -> Option<&str> {
        self.source_file_path.file_stem().and_then(|stem| stem.to_str())
    }
}

/// The engine's answer to one request. Either both sources are present or neither is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_class_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_original_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_class_path: Option<PathBuf>,
    /// Structured issues: blocking ones on failure, informational ones on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
}

impl GeneratedArtifact {
    pub fn failure(message: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            success: false,
            message: message.into(),
            new_class_source: None,
            modified_original_source: None,
            new_class_path: None,
            issues,
        }
    }
}

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null", "var", "yield", "record", "_",
];

fn is_java_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !JAVA_KEYWORDS.contains(&name)
}

#[derive(Clone, Debug, Default)]
pub struct ClassExtractor {
    config: ExtractClassConfig,
}

impl ClassExtractor {
    pub fn new(config: ExtractClassConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractClassConfig {
        &self.config
    }

    /// Runs the validator only.
    ///
    /// `facts` are computed from the source when not supplied.
    pub fn plan(
        &self,
        request: &ExtractClassRequest,
        source: &str,
        facts: Option<&DependencyFacts>,
    ) -> Result<ExtractionPlan, ParseError> {
        let parsed = ParsedSource::parse(source, request.class_hint())?;
        let computed;
        let facts = match facts {
            Some(facts) => facts,
            None => {
                computed = analyze_dependencies(&parsed);
                &computed
            }
        };
        Ok(self.validator(parsed.class(), facts).validate(&request.candidate()))
    }

    fn validator<'a>(
        &self,
        class: &'a SourceClass,
        facts: &'a DependencyFacts,
    ) -> CandidateValidator<'a> {
        CandidateValidator::new(class, facts).with_max_iterations(self.config.max_repair_iterations)
    }

    /// Validates the request and, when approved, produces both sources.
    ///
    /// Rejections, parse failures and unsupported constructs come back as a failed artifact.
    /// `Err` means the approved plan and the parsed class disagree.
    pub fn extract(
        &self,
        request: &ExtractClassRequest,
        source: &str,
        facts: Option<&DependencyFacts>,
    ) -> Result<GeneratedArtifact, ExtractClassError> {
        match self.extract_inner(request, source, facts) {
            Err(err) if err.is_unsupported_input() => {
                tracing::warn!(
                    target: "nova.extract_class",
                    new_class = %request.new_class_name,
                    error = %err,
                    "extract class hit an unsupported construct"
                );
                Ok(GeneratedArtifact::failure(err.to_string(), Vec::new()))
            }
            Err(err) => {
                tracing::error!(
                    target: "nova.extract_class",
                    new_class = %request.new_class_name,
                    error = %err,
                    "extract class failed"
                );
                Err(err)
            }
            Ok(artifact) => Ok(artifact),
        }
    }

    fn extract_inner(
        &self,
        request: &ExtractClassRequest,
        source: &str,
        facts: Option<&DependencyFacts>,
    ) -> Result<GeneratedArtifact, ExtractClassError> {
        let new_class = request.new_class_name.as_str();
        if !is_java_identifier(new_class) {
            return Ok(GeneratedArtifact::failure(
                format!("`{new_class}` is not a valid class name"),
                Vec::new(),
            ));
        }

        let parsed = match ParsedSource::parse(source, request.class_hint()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(
                    target: "nova.extract_class",
                    path = %request.source_file_path.display(),
                    error = %err,
                    "source does not parse"
                );
                return Ok(GeneratedArtifact::failure(
                    format!(
                        "failed to parse {}: {err}",
                        request.source_file_path.display()
                    ),
                    Vec::new(),
                ));
            }
        };
        let class = parsed.class();
        tracing::debug!(
            target: "nova.extract_class",
            class = %class.name,
            fields = class.fields.len(),
            methods = class.methods.len(),
            "parsed source"
        );

        if new_class == class.name || class.nested_type(new_class).is_some() {
            return Ok(GeneratedArtifact::failure(
                format!("`{new_class}` clashes with a type declared in {}", class.name),
                Vec::new(),
            ));
        }

        let computed;
        let facts = match facts {
            Some(facts) => facts,
            None => {
                computed = analyze_dependencies(&parsed);
                &computed
            }
        };

        let (field_names, method_signatures, plan_issues) =
            match self.validator(class, facts).validate(&request.candidate()) {
                ExtractionPlan::Rejected { issues } => {
                    return Ok(rejection(&class.name, issues));
                }
                ExtractionPlan::Approved {
                    final_field_names,
                    final_method_signatures,
                    issues,
                } => (final_field_names, final_method_signatures, issues),
            };

        let fields = resolve_fields(class, &field_names)?;
        let methods = resolve_methods(class, &method_signatures)?;

        let moved_instance_fields: Vec<&str> = fields
            .iter()
            .filter(|field| !field.is_static())
            .map(|field| field.name.as_str())
            .collect();
        let cross_instance = find_cross_instance_refs(&parsed, &moved_instance_fields);
        if !cross_instance.is_empty() {
            return Ok(rejection(&class.name, cross_instance));
        }

        let needs_helper = methods.iter().any(|method| !method.is_static())
            || fields.iter().any(|field| !field.is_static());
        let helper = needs_helper.then(|| self.helper_name(&parsed, new_class));

        let indent = self.config.indent_unit();
        let extracted_fields = FieldExtractor::new(source, &methods, &indent).extract(&fields);
        let moved_field_names: Vec<String> = fields.iter().map(|field| field.name.clone()).collect();
        let extracted_methods =
            MethodExtractor::new(&parsed, new_class, &methods, &moved_field_names).extract()?;

        let moved_fields: Vec<MovedField<'_>> = fields
            .iter()
            .zip(&extracted_fields)
            .map(|(decl, extracted)| MovedField {
                decl,
                accessors: extracted.accessors.as_ref(),
            })
            .collect();
        let modified_original = OriginalRewriter::new(
            &parsed,
            new_class,
            helper.as_deref(),
            &methods,
            &moved_fields,
            &indent,
        )
        .rewrite()?;
        tracing::debug!(
            target: "nova.extract_class",
            class = %class.name,
            helper = helper.as_deref().unwrap_or("<none>"),
            "rewrote original class"
        );

        let new_class_source =
            render_new_class(class, new_class, &extracted_fields, &extracted_methods, &indent);

        parse_java(&new_class_source).map_err(|error| ExtractClassError::GeneratedSourceInvalid {
            which: "new class",
            error,
        })?;
        parse_java(&modified_original).map_err(|error| {
            ExtractClassError::GeneratedSourceInvalid {
                which: "original class",
                error,
            }
        })?;

        let new_class_path = self.new_class_path(&request.source_file_path, new_class);
        Ok(GeneratedArtifact {
            success: true,
            message: format!(
                "extracted {} field(s) and {} method(s) from {} into {new_class}",
                fields.len(),
                methods.len(),
                class.name
            ),
            new_class_source: Some(new_class_source),
            modified_original_source: Some(modified_original),
            new_class_path: Some(new_class_path),
            issues: plan_issues,
        })
    }

    fn helper_name(&self, parsed: &ParsedSource<'_>, new_class: &str) -> String {
        let class = parsed.class();
        let base = self
            .config
            .helper_field_name
            .clone()
            .unwrap_or_else(|| decapitalize(new_class));
        let class_text = parsed
            .source()
            .get(class.range.start..class.range.end)
            .unwrap_or_default();
        let taken: BTreeSet<&str> = identifiers(class_text)
            .chain(class.fields.iter().map(|field| field.name.as_str()))
            .collect();

        let mut name = base.clone();
        let mut counter = 2usize;
        while taken.contains(name.as_str()) || !is_java_identifier(&name) {
            name = format!("{base}{counter}");
            counter += 1;
        }
        name
    }

    fn new_class_path(&self, original: &Path, new_class: &str) -> PathBuf {
        let extension = self
            .config
            .file_extension
            .clone()
            .or_else(|| {
                original
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "java".to_string());
        let file_name = format!("{new_class}.{extension}");
        match original.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}

/// Runs [`ClassExtractor::extract`] with the default configuration.
pub fn extract_class(
    request: &ExtractClassRequest,
    source: &str,
    facts: Option<&DependencyFacts>,
) -> Result<GeneratedArtifact, ExtractClassError> {
    ClassExtractor::default().extract(request, source, facts)
}

fn rejection(class: &str, issues: Vec<ValidationIssue>) -> GeneratedArtifact {
    let details: Vec<String> = issues.iter().map(ToString::to_string).collect();
    GeneratedArtifact::failure(
        format!("cannot extract from {class}: {}", details.join("; ")),
        issues,
    )
}

fn resolve_fields<'a>(
    class: &'a SourceClass,
    names: &[String],
) -> Result<Vec<&'a FieldDecl>, ExtractClassError> {
    let mut fields = Vec::new();
    for name in names {
        let field = class
            .field(name)
            .ok_or_else(|| ExtractClassError::MemberNotFound {
                class: class.name.clone(),
                member: name.clone(),
            })?;
        fields.push(field);
    }
    fields.sort_by_key(|field| field.declarator_range.start);
    Ok(fields)
}

fn resolve_methods<'a>(
    class: &'a SourceClass,
    signatures: &[String],
) -> Result<Vec<&'a MethodDecl>, ExtractClassError> {
    let mut methods: Vec<&'a MethodDecl> = Vec::new();
    for signature in signatures {
        let Some(method) = class.find_method(signature) else {
            if class.find_constructor(signature).is_some() {
                return Err(ExtractClassError::ConstructorNotExtractable(signature.clone()));
            }
            return Err(ExtractClassError::MemberNotFound {
                class: class.name.clone(),
                member: signature.clone(),
            });
        };
        if !methods.iter().any(|m| m.range == method.range) {
            methods.push(method);
        }
    }
    methods.sort_by_key(|method| method.range.start);
    Ok(methods)
}

fn render_new_class(
    original: &SourceClass,
    new_class: &str,
    fields: &[ExtractedField],
    methods: &[ExtractedMethod],
    indent: &str,
) -> String {
    let mut out = String::new();
    if let Some(package) = &original.package {
        out.push_str(&format!("package {package};\n\n"));
    }
    if !original.imports.is_empty() {
        out.push_str(&original.imports.join("\n"));
        out.push_str("\n\n");
    }

    let mut blocks: Vec<String> = Vec::new();
    if !fields.is_empty() {
        let declarations: Vec<&str> = fields.iter().map(|f| f.declaration.as_str()).collect();
        blocks.push(declarations.join("\n"));
    }
    blocks.extend(fields.iter().flat_map(|field| field.members.iter().cloned()));
    blocks.extend(methods.iter().map(|method| method.source.clone()));

    let visibility = if original.modifiers.visibility == Visibility::Public {
        "public "
    } else {
        ""
    };
    out.push_str(&format!("{visibility}class {new_class} {{\n"));
    let body: Vec<String> = blocks
        .iter()
        .map(|block| indent_block(block, indent))
        .collect();
    if !body.is_empty() {
        out.push_str(&body.join("\n\n"));
        out.push('\n');
    }
    out.push_str("}\n");
    out
}
