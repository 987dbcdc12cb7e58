use std::collections::{BTreeMap, BTreeSet};

use nova_extract_class::{
    analyze_dependencies, CandidateSet, CandidateValidator, DependencyFacts, ExtractionPlan,
    IssueKind, ParsedSource, ValidationIssue,
};
use pretty_assertions::assert_eq;

fn candidate(methods: &[&str], fields: &[&str]) -> CandidateSet {
    CandidateSet {
        new_class_name: "Extracted".to_string(),
        field_names: fields.iter().map(|f| f.to_string()).collect(),
        method_signatures: methods.iter().map(|m| m.to_string()).collect(),
    }
}

fn plan(source: &str, methods: &[&str], fields: &[&str]) -> ExtractionPlan {
    let parsed = ParsedSource::parse(source, None).unwrap();
    let facts = analyze_dependencies(&parsed);
    CandidateValidator::new(parsed.class(), &facts).validate(&candidate(methods, fields))
}

fn kinds(issues: &[ValidationIssue]) -> Vec<IssueKind> {
    issues.iter().map(|issue| issue.kind).collect()
}

fn issues_of(issues: &[ValidationIssue], kind: IssueKind) -> Vec<String> {
    issues
        .iter()
        .filter(|issue| issue.kind == kind)
        .map(|issue| issue.member.clone())
        .collect()
}

const REPORT: &str = r#"public class Report {
    private int rows;

    public String render() {
        return header() + body();
    }

    private String header() {
        return title();
    }

    private String title() {
        return "Report";
    }

    private String body() {
        return "" + rows;
    }

    public int size() {
        return rows;
    }
}
"#;

#[test]
fn private_callees_are_included_transitively() {
    let ExtractionPlan::Approved {
        final_field_names,
        final_method_signatures,
        issues,
    } = plan(REPORT, &["render()"], &["rows"])
    else {
        panic!("expected an approved plan");
    };

    assert_eq!(final_field_names, vec!["rows".to_string()]);
    assert_eq!(
        final_method_signatures,
        vec![
            "render()".to_string(),
            "body()".to_string(),
            "header()".to_string(),
            "title()".to_string(),
        ]
    );
    assert_eq!(
        issues_of(&issues, IssueKind::AutoIncludedPrivateMethod),
        vec!["body()", "header()", "title()"]
    );
    assert!(issues.iter().all(|issue| !issue.is_blocking()));
}

#[test]
fn a_low_repair_cap_rejects_instead_of_looping() {
    let parsed = ParsedSource::parse(REPORT, None).unwrap();
    let facts = analyze_dependencies(&parsed);

    let rejected = CandidateValidator::new(parsed.class(), &facts)
        .with_max_iterations(2)
        .validate(&candidate(&["render()"], &["rows"]));
    let ExtractionPlan::Rejected { issues } = rejected else {
        panic!("expected a rejection");
    };
    assert_eq!(kinds(&issues), vec![IssueKind::RepairCapExceeded]);

    // Two inclusion passes plus the pass that adds nothing.
    let approved = CandidateValidator::new(parsed.class(), &facts)
        .with_max_iterations(3)
        .validate(&candidate(&["render()"], &["rows"]));
    assert!(approved.is_approved());
}

#[test]
fn reporting_cycles_still_terminate() {
    let source = r#"class Loop {
    void start() { ping(); }
    private void ping() { pong(); }
    private void pong() { ping(); }
}
"#;
    let ExtractionPlan::Approved {
        final_method_signatures,
        ..
    } = plan(source, &["start()"], &[])
    else {
        panic!("expected an approved plan");
    };
    assert_eq!(final_method_signatures, vec!["start()", "ping()", "pong()"]);
}

const SHAPE: &str = r#"public abstract class Shape {
    protected double scale = 1;

    public abstract double area();

    public String describe() {
        return "area " + area();
    }

    public double scaled() {
        return scale * area();
    }
}
"#;

#[test]
fn calls_to_abstract_methods_are_rejected() {
    let ExtractionPlan::Rejected { issues } = plan(SHAPE, &["describe()"], &[]) else {
        panic!("expected a rejection");
    };
    assert_eq!(kinds(&issues), vec![IssueKind::BlockedAbstractCall]);
    assert_eq!(issues[0].member, "describe()");
    assert!(issues[0].description.contains("area()"), "{}", issues[0]);
}

#[test]
fn abstract_methods_themselves_cannot_move() {
    let ExtractionPlan::Rejected { issues } = plan(SHAPE, &["area()"], &[]) else {
        panic!("expected a rejection");
    };
    assert_eq!(issues_of(&issues, IssueKind::BlockedAbstractCall), vec!["area()"]);
}

#[test]
fn rejections_carry_only_blocking_issues() {
    let source = r#"abstract class Mixed {
    abstract void hook();
    void run() { helper(); hook(); }
    private void helper() {}
}
"#;
    let ExtractionPlan::Rejected { issues } = plan(source, &["run()"], &[]) else {
        panic!("expected a rejection");
    };
    assert!(issues.iter().all(ValidationIssue::is_blocking));
    assert_eq!(kinds(&issues), vec![IssueKind::BlockedAbstractCall]);
}

const INVOICE: &str = r#"public class Invoice {
    private static final double TAX_RATE = 0.21;
    static int issued;
    private double net;

    public double tax(double amount) {
        return amount * TAX_RATE;
    }

    public double total() {
        return net + tax(net);
    }
}
"#;

#[test]
fn static_fields_read_by_moved_methods_are_included() {
    let ExtractionPlan::Approved {
        final_field_names,
        final_method_signatures,
        issues,
    } = plan(INVOICE, &["tax(double)"], &[])
    else {
        panic!("expected an approved plan");
    };
    assert_eq!(final_field_names, vec!["TAX_RATE".to_string()]);
    assert_eq!(final_method_signatures, vec!["tax(double)".to_string()]);
    assert_eq!(issues_of(&issues, IssueKind::AutoIncludedStaticField), vec!["TAX_RATE"]);
}

#[test]
fn instance_fields_are_never_auto_included() {
    let ExtractionPlan::Approved {
        final_field_names,
        issues,
        ..
    } = plan(INVOICE, &["total()", "tax(double)"], &[])
    else {
        panic!("expected an approved plan");
    };
    assert!(!final_field_names.contains(&"net".to_string()));
    assert_eq!(
        issues_of(&issues, IssueKind::RemainingInstanceFieldAccess),
        vec!["total()"]
    );
}

const PARSER: &str = r#"public class Parser {
    private static class Token {
        String text;
    }

    public static class Result {}

    private Token current;
    private Result last;

    Token next() {
        return current;
    }

    Result finish() {
        return last;
    }
}
"#;

#[test]
fn private_nested_types_block_extraction() {
    let ExtractionPlan::Rejected { issues } = plan(PARSER, &["next()"], &["current"]) else {
        panic!("expected a rejection");
    };
    assert_eq!(
        issues_of(&issues, IssueKind::BlockedInnerTypeRef),
        vec!["next()", "current"]
    );
}

#[test]
fn public_nested_types_do_not_block_extraction() {
    assert!(plan(PARSER, &["finish()"], &["last"]).is_approved());
}

#[test]
fn supplied_facts_are_matched_by_normalized_signature() {
    let parsed = ParsedSource::parse(INVOICE, None).unwrap();
    let facts = DependencyFacts {
        field_accesses: BTreeMap::from([(
            "tax(double amount)".to_string(),
            BTreeSet::from(["TAX_RATE".to_string()]),
        )]),
        ..DependencyFacts::default()
    };
    let ExtractionPlan::Approved {
        final_field_names, ..
    } = CandidateValidator::new(parsed.class(), &facts)
        .validate(&candidate(&["tax(double amount)"], &[]))
    else {
        panic!("expected an approved plan");
    };
    assert_eq!(final_field_names, vec!["TAX_RATE".to_string()]);
}

#[test]
fn plans_serialize_with_a_status_tag() {
    let plan = plan(SHAPE, &["describe()"], &[]);
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["status"], "rejected");
    assert_eq!(json["issues"][0]["kind"], "BlockedAbstractCall");
    assert_eq!(json["issues"][0]["severity"], "blocking");
}
