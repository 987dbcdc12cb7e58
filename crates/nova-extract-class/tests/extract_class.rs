use std::path::PathBuf;

use nova_extract_class::{
    extract_class, ClassExtractor, ExtractClassConfig, ExtractClassRequest, GeneratedArtifact,
    IndentStyle, IssueKind, ParsedSource,
};
use pretty_assertions::assert_eq;
use regex::Regex;

fn request(path: &str, new_class: &str, methods: &[&str], fields: &[&str]) -> ExtractClassRequest {
    ExtractClassRequest {
        new_class_name: new_class.to_string(),
        source_file_path: PathBuf::from(path),
        method_signatures: methods.iter().map(|m| m.to_string()).collect(),
        field_names: fields.iter().map(|f| f.to_string()).collect(),
    }
}

fn extract_ok(source: &str, request: &ExtractClassRequest) -> (String, String) {
    let artifact = extract_class(request, source, None).unwrap();
    assert!(artifact.success, "{}", artifact.message);
    (
        artifact.new_class_source.unwrap(),
        artifact.modified_original_source.unwrap(),
    )
}

fn extract_failure(source: &str, request: &ExtractClassRequest) -> GeneratedArtifact {
    let artifact = extract_class(request, source, None).unwrap();
    assert!(!artifact.success, "unexpected success: {}", artifact.message);
    assert!(artifact.new_class_source.is_none());
    assert!(artifact.modified_original_source.is_none());
    assert!(artifact.new_class_path.is_none());
    artifact
}

/// Body text of `method` (the first declaration whose header contains it).
fn method_body<'a>(source: &'a str, header: &str) -> &'a str {
    let start = source.find(header).unwrap();
    let open = start + source[start..].find('{').unwrap();
    let mut depth = 0usize;
    for (idx, c) in source[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &source[open + 1..open + idx];
                }
            }
            _ => {}
        }
    }
    panic!("unbalanced braces after {header}");
}

const ACCOUNT: &str = r#"package bank;

import java.util.List;

public class Account {
    private String owner;
    private double balance;

    public Account(String owner) {
        this.owner = owner;
    }

    public void deposit(double amount) {
        balance += amount;
    }

    public void withdraw(double amount) {
        if (amount > balance) {
            throw new IllegalArgumentException("insufficient funds");
        }
        balance -= amount;
    }

    public double getBalance() {
        return balance;
    }

    public String describe() {
        return owner + ": " + balance;
    }
}
"#;

#[test]
fn balance_moves_into_a_ledger() {
    let request = request(
        "src/bank/Account.java",
        "Ledger",
        &["deposit(double)", "withdraw(double)", "getBalance()"],
        &["balance"],
    );
    let artifact = extract_class(&request, ACCOUNT, None).unwrap();
    assert!(artifact.success, "{}", artifact.message);
    assert_eq!(
        artifact.new_class_path,
        Some(PathBuf::from("src/bank/Ledger.java"))
    );

    assert_eq!(
        artifact.new_class_source.as_deref().unwrap(),
        r#"package bank;

import java.util.List;

public class Ledger {
    private double balance;

    public void setBalance(double balance) {
        this.balance = balance;
    }

    public double incrementBalance() {
        return ++balance;
    }

    public double postIncrementBalance() {
        return balance++;
    }

    public double decrementBalance() {
        return --balance;
    }

    public double postDecrementBalance() {
        return balance--;
    }

    public void deposit(double amount) {
        balance += amount;
    }

    public void withdraw(double amount) {
        if (amount > balance) {
            throw new IllegalArgumentException("insufficient funds");
        }
        balance -= amount;
    }

    public double getBalance() {
        return balance;
    }
}
"#
    );

    assert_eq!(
        artifact.modified_original_source.as_deref().unwrap(),
        r#"package bank;

import java.util.List;

public class Account {
    private Ledger ledger = new Ledger();

    private String owner;

    public Account(String owner) {
        this.owner = owner;
    }

    public void deposit(double amount) {
        ledger.deposit(amount);
    }

    public void withdraw(double amount) {
        ledger.withdraw(amount);
    }

    public double getBalance() {
        return ledger.getBalance();
    }

    public String describe() {
        return owner + ": " + ledger.getBalance();
    }
}
"#
    );
}

#[test]
fn delegating_stubs_forward_every_parameter_in_order() {
    let source = r#"public class Mailer {
    private String host = "localhost";

    public boolean send(String to, String subject, int retries) {
        return retries > 0 && to != null && subject != null;
    }

    public static String format(String template, Object... args) {
        return String.format(template, args);
    }

    public void log(String line) {
        System.out.println(line);
    }
}
"#;
    let request = request(
        "Mailer.java",
        "Transport",
        &["send(String,String,int)", "format(String,Object...)", "log(String)"],
        &[],
    );
    let (_, original) = extract_ok(source, &request);

    let parsed = ParsedSource::parse(&original, Some("Mailer")).unwrap();
    for method in &parsed.class().methods {
        let body = method.body_range.unwrap();
        let statements: Vec<&str> = original[body.start + 1..body.end - 1]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        assert_eq!(statements.len(), 1, "{}: {statements:?}", method.signature);
    }

    assert_eq!(
        method_body(&original, "boolean send(").trim(),
        "return transport.send(to, subject, retries);"
    );
    assert_eq!(
        method_body(&original, "String format(").trim(),
        "return Transport.format(template, args);"
    );
    assert_eq!(
        method_body(&original, "void log(").trim(),
        "transport.log(line);"
    );
    assert!(original.contains("    private Transport transport = new Transport();\n"));
    assert!(original.contains("private String host = \"localhost\";"));
}

const COUNTER: &str = r#"public class Counter {
    private int count;
    private String label = "c";

    public void tick() {
        count++;
    }

    public int next() {
        int n = count++;
        return n;
    }

    public int peek() {
        return ++count;
    }

    public void rewind() {
        count--;
        --this.count;
    }

    public void reset() {
        count = 0;
    }

    public String show() {
        return label + count;
    }
}
"#;

#[test]
fn increments_keep_their_value_semantics() {
    let request = request("Counter.java", "Tally", &[], &["count"]);
    let (new_class, original) = extract_ok(COUNTER, &request);

    assert_eq!(method_body(&original, "void tick(").trim(), "tally.postIncrementCount();");
    assert_eq!(
        method_body(&original, "int next(").trim(),
        "int n = tally.postIncrementCount();\n        return n;"
    );
    assert_eq!(method_body(&original, "int peek(").trim(), "return tally.incrementCount();");
    assert_eq!(
        method_body(&original, "void rewind(").trim(),
        "tally.postDecrementCount();\n        tally.decrementCount();"
    );
    assert_eq!(method_body(&original, "void reset(").trim(), "tally.setCount(0);");
    assert_eq!(
        method_body(&original, "String show(").trim(),
        "return label + tally.getCount();"
    );

    // `n` receives the value from before the increment.
    assert_eq!(
        method_body(&new_class, "int postIncrementCount(").trim(),
        "return count++;"
    );
}

#[test]
fn no_raw_reference_to_a_moved_field_survives() {
    let request = request("Counter.java", "Tally", &[], &["count"]);
    let (_, original) = extract_ok(COUNTER, &request);
    let raw = Regex::new(r"\bcount\b").unwrap();
    assert!(!raw.is_match(&original), "{original}");
}

#[test]
fn compound_assignments_expand_with_the_implicit_cast() {
    let source = r#"class Stats {
    private short total;
    private long big;
    private int bits;
    private double mean;
    private int hits;

    void update(int x, long y) {
        total *= 2 + x;
        big += 1;
        bits <<= 2;
        mean /= x;
        hits += y;
        hits -= 3;
    }
}
"#;
    let request = request(
        "Stats.java",
        "Accumulator",
        &[],
        &["total", "big", "bits", "mean", "hits"],
    );
    let (_, original) = extract_ok(source, &request);
    assert_eq!(
        method_body(&original, "void update(").trim(),
        "accumulator.setTotal((short) (accumulator.getTotal() * (2 + x)));
        accumulator.setBig(accumulator.getBig() + 1);
        accumulator.setBits(accumulator.getBits() << 2);
        accumulator.setMean(accumulator.getMean() / x);
        accumulator.setHits((int) (accumulator.getHits() + y));
        accumulator.setHits(accumulator.getHits() - 3);"
    );
}

#[test]
fn only_moved_declarators_leave_a_shared_declaration() {
    let source = r#"class Grid {
    private int width = 1, height = 2, depth;

    int area() {
        return width * height;
    }
}
"#;
    let request = request("Grid.java", "Extent", &[], &["height"]);
    let (new_class, original) = extract_ok(source, &request);
    assert!(original.contains("    private int width = 1, depth;\n"), "{original}");
    assert!(original.contains("return width * extent.getHeight();"), "{original}");
    assert!(new_class.contains("    private int height = 2;\n"), "{new_class}");
}

#[test]
fn static_fields_are_requalified_in_the_remaining_class() {
    let source = r#"class Pricing {
    static final double RATE = 0.2;
    private static int calls = 0;

    static double tax(double net) {
        calls++;
        return net * RATE;
    }

    double gross(double net) {
        return net + RATE + Pricing.RATE + this.RATE;
    }
}
"#;
    let request = request("Pricing.java", "Rates", &["tax(double)"], &[]);
    let artifact = extract_class(&request, source, None).unwrap();
    assert!(artifact.success, "{}", artifact.message);
    assert_eq!(
        artifact
            .issues
            .iter()
            .filter(|issue| issue.kind == IssueKind::AutoIncludedStaticField)
            .map(|issue| issue.member.as_str())
            .collect::<Vec<_>>(),
        vec!["RATE", "calls"]
    );

    let new_class = artifact.new_class_source.unwrap();
    let original = artifact.modified_original_source.unwrap();
    assert_eq!(
        new_class,
        r#"class Rates {
    static final double RATE = 0.2;
    private static int calls = 0;

    static double tax(double net) {
        calls++;
        return net * RATE;
    }
}
"#
    );
    assert_eq!(
        original,
        r#"class Pricing {
    static double tax(double net) {
        return Rates.tax(net);
    }

    double gross(double net) {
        return net + Rates.RATE + Rates.RATE + Rates.RATE;
    }
}
"#
    );
}

#[test]
fn moved_methods_call_back_into_the_original_class() {
    let source = r#"public class Orders {
    private int placed;

    public void place(String id) {
        audit(id);
        this.placed++;
    }

    static void audit(String id) {}
}
"#;
    let request = request("Orders.java", "Placement", &["place(String)"], &["placed"]);
    let (new_class, original) = extract_ok(source, &request);
    assert_eq!(
        method_body(&new_class, "void place(").trim(),
        "Orders.audit(id);\n        this.placed++;"
    );
    assert_eq!(method_body(&original, "void place(").trim(), "placement.place(id);");
}

#[test]
fn removed_fields_take_their_comments_along() {
    let source = r#"class Cache {
    /** Entries kept. */
    private int size;
    // upper bound
    private int limit = 10;

    boolean full() {
        return size >= limit;
    }
}
"#;
    let request = request("Cache.java", "Bounds", &[], &["limit"]);
    let (new_class, original) = extract_ok(source, &request);
    assert_eq!(
        original,
        r#"class Cache {
    private Bounds bounds = new Bounds();

    /** Entries kept. */
    private int size;

    boolean full() {
        return size >= bounds.getLimit();
    }
}
"#
    );
    assert!(new_class.contains("    private int limit = 10;\n"), "{new_class}");
}

#[test]
fn locals_that_shadow_a_moved_field_are_left_alone() {
    let source = r#"class Sensor {
    private int level;

    int read(int level) {
        return level * 2;
    }

    int current() {
        int level = 3;
        return level + this.level;
    }

    java.util.function.IntUnaryOperator op() {
        return level -> level + 1;
    }
}
"#;
    let request = request("Sensor.java", "Gauge", &[], &["level"]);
    let (_, original) = extract_ok(source, &request);
    assert_eq!(method_body(&original, "int read(").trim(), "return level * 2;");
    assert_eq!(
        method_body(&original, "int current(").trim(),
        "int level = 3;\n        return level + gauge.getLevel();"
    );
    assert_eq!(
        method_body(&original, "IntUnaryOperator op(").trim(),
        "return level -> level + 1;"
    );
}

#[test]
fn cross_instance_references_are_rejected() {
    let source = r#"class Node {
    private int weight;

    int combined(Node other) {
        return weight + other.weight;
    }
}
"#;
    let request = request("Node.java", "Weight", &[], &["weight"]);
    let artifact = extract_failure(source, &request);
    assert_eq!(artifact.issues.len(), 1);
    assert_eq!(artifact.issues[0].kind, IssueKind::BlockedCrossInstanceFieldRef);
    assert_eq!(artifact.issues[0].member, "weight");
}

#[test]
fn rejected_candidates_produce_no_sources() {
    let source = r#"abstract class Job {
    abstract void execute();

    void run() {
        execute();
    }
}
"#;
    let request = request("Job.java", "Runner", &["run()"], &[]);
    let artifact = extract_failure(source, &request);
    assert_eq!(artifact.issues[0].kind, IssueKind::BlockedAbstractCall);
    assert!(artifact.message.contains("BlockedAbstractCall"), "{}", artifact.message);
}

#[test]
fn unparsable_sources_fail_without_output() {
    let request = request("Broken.java", "Part", &[], &[]);
    let artifact = extract_failure("class Broken { void f( { }", &request);
    assert!(artifact.message.contains("failed to parse"), "{}", artifact.message);
}

#[test]
fn assignments_used_as_values_are_unsupported() {
    let source = r#"class Meter {
    private int value;

    int bump() {
        int seen = (value = 3);
        return seen;
    }
}
"#;
    let request = request("Meter.java", "Reading", &[], &["value"]);
    let artifact = extract_failure(source, &request);
    assert!(artifact.message.contains("used as a value"), "{}", artifact.message);
}

#[test]
fn boxed_increments_fall_back_to_the_setter() {
    let source = r#"class Visits {
    private Integer total = 0;

    void hit() {
        total++;
    }

    int hitAndGet() {
        return total++;
    }
}
"#;
    let request = request("Visits.java", "Counter", &[], &["total"]);
    let artifact = extract_failure(source, &request);
    assert!(artifact.message.contains("no increment helpers"), "{}", artifact.message);

    let source = source.replace("        return total++;", "        total++;\n        return total;");
    let (_, original) = extract_ok(&source, &request);
    assert_eq!(
        method_body(&original, "void hit(").trim(),
        "counter.setTotal(counter.getTotal() + 1);"
    );
}

#[test]
fn invalid_or_clashing_class_names_are_refused() {
    for name in ["class", "9Lives", "Account"] {
        let request = request("Account.java", name, &["getBalance()"], &["balance"]);
        let artifact = extract_failure(ACCOUNT, &request);
        assert!(!artifact.message.is_empty());
    }
}

#[test]
fn config_controls_helper_name_and_indentation() {
    let extractor = ClassExtractor::new(ExtractClassConfig {
        helper_field_name: Some("store".to_string()),
        indent_style: IndentStyle::Tabs,
        ..ExtractClassConfig::default()
    });
    let request = request(
        "Account.java",
        "Ledger",
        &["deposit(double)", "withdraw(double)", "getBalance()"],
        &["balance"],
    );
    let artifact = extractor.extract(&request, ACCOUNT, None).unwrap();
    assert!(artifact.success, "{}", artifact.message);

    let new_class = artifact.new_class_source.unwrap();
    assert!(new_class.contains("\n\tprivate double balance;\n"), "{new_class}");
    assert!(new_class.contains("\n\tpublic void setBalance(double balance) {\n\t\tthis.balance = balance;\n\t}\n"));

    let original = artifact.modified_original_source.unwrap();
    assert!(original.contains("    private Ledger store = new Ledger();\n"), "{original}");
    assert!(original.contains("return owner + \": \" + store.getBalance();"));
}

#[test]
fn artifacts_serialize_in_camel_case() {
    let request = request("Account.java", "Ledger", &["getBalance()"], &["balance"]);
    let artifact = extract_class(&request, ACCOUNT, None).unwrap();
    let json = serde_json::to_value(&artifact).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["newClassSource"].is_string());
    assert!(json["modifiedOriginalSource"].is_string());
    assert_eq!(json["newClassPath"], "Ledger.java");
}

#[test]
fn receivers_of_the_same_class_are_rejected_whatever_their_shape() {
    for receiver in ["peer().count", "all[0].count", "this.other.count"] {
        let source = format!(
            r#"class Counter {{
    private int count;
    private Counter other;

    Counter peer() {{
        return this;
    }}

    int sum(Counter[] all) {{
        return count + {receiver};
    }}
}}
"#
        );
        let request = request("Counter.java", "Tally", &[], &["count"]);
        let artifact = extract_failure(&source, &request);
        assert!(
            artifact
                .issues
                .iter()
                .any(|issue| issue.kind == IssueKind::BlockedCrossInstanceFieldRef),
            "{receiver}: {:?}",
            artifact.issues
        );
    }
}

#[test]
fn moved_constants_in_case_labels_are_qualified() {
    let source = r#"class Dial {
    static final int LIMIT = 3;

    static int cap() {
        return LIMIT;
    }

    String label(int x) {
        switch (x) {
            case LIMIT:
                return "max";
            default:
                return "low";
        }
    }
}
"#;
    let request = request("Dial.java", "Limits", &["cap()"], &[]);
    let (new_class, original) = extract_ok(source, &request);
    assert!(new_class.contains("    static final int LIMIT = 3;\n"), "{new_class}");
    assert!(original.contains("            case Limits.LIMIT:\n"), "{original}");
    assert!(!Regex::new(r"case LIMIT\b").unwrap().is_match(&original), "{original}");
}

#[test]
fn instanceof_bindings_shadow_a_moved_field_only_in_scope() {
    let source = r#"class Bag {
    private int count;

    int pick(Object o) {
        if (o instanceof Integer count) {
            return count;
        }
        return count;
    }
}
"#;
    let request = request("Bag.java", "Tally", &[], &["count"]);
    let (_, original) = extract_ok(source, &request);
    assert_eq!(
        method_body(&original, "int pick(").trim(),
        "if (o instanceof Integer count) {\n            return count;\n        }\n        return tally.getCount();"
    );
}

#[test]
fn parenthesized_increments_use_the_increment_helpers() {
    let source = r#"class Clicker {
    private int count;

    void click() {
        (count)++;
    }

    int undo() {
        int n = (count)--;
        return n;
    }
}
"#;
    let request = request("Clicker.java", "Tally", &[], &["count"]);
    let (_, original) = extract_ok(source, &request);
    assert_eq!(method_body(&original, "void click(").trim(), "tally.postIncrementCount();");
    assert_eq!(
        method_body(&original, "int undo(").trim(),
        "int n = tally.postDecrementCount();\n        return n;"
    );
}

#[test]
fn calls_split_between_moved_and_remaining_overloads_are_unsupported() {
    let source = r#"class Printer {
    void log(String s) {
        System.out.println(s);
        log(s.length());
    }

    static void log(int n) {}
}
"#;
    let request = request("Printer.java", "Journal", &["log(String)"], &[]);
    let artifact = extract_failure(source, &request);
    assert!(artifact.message.contains("overload"), "{}", artifact.message);

    let source = source.replace("    void log(String s)", "    static void log(String s)");
    let (new_class, _) = extract_ok(&source, &request);
    assert_eq!(
        method_body(&new_class, "void log(String s)").trim(),
        "System.out.println(s);\n        Printer.log(s.length());"
    );
}

#[test]
fn lambda_bodies_are_statements_only_for_void_targets() {
    let source = r#"class Score {
    private int count;

    void later() {
        Runnable r = () -> count += 2;
        r.run();
    }
}
"#;
    let request = request("Score.java", "Tally", &[], &["count"]);
    let (_, original) = extract_ok(source, &request);
    assert!(
        original.contains("Runnable r = () -> tally.setCount(tally.getCount() + 2);"),
        "{original}"
    );

    let source = source
        .replace("Runnable r", "java.util.function.IntSupplier r")
        .replace("r.run();", "r.getAsInt();");
    let artifact = extract_failure(&source, &request);
    assert!(artifact.message.contains("used as a value"), "{}", artifact.message);
}
