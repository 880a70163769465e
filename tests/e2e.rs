//! End-to-end scenarios compiling Lash source to Bash text.

fn compile_ok(src: &str) -> String {
    let result = lash_core::compile(src, "test.lash");
    assert!(
        result.bash.is_some(),
        "expected successful compile, got diagnostics: {:?}",
        result.diagnostics
    );
    assert!(result.unsupported.is_empty(), "unexpected unsupported features: {:?}", result.unsupported);
    result.bash.unwrap()
}

#[test]
fn interpolated_strings_and_array_length() {
    let src = r#"
let name = "Rob"
let greeting = $"Hi {name}"
let items = ["a", "b", "c"]
let count = #items
echo "$greeting"
echo "$count"
"#;
    let bash = compile_ok(src);
    assert!(bash.contains("name=\"Rob\""));
    assert!(bash.contains("greeting=\"Hi ${name}\""));
    assert!(bash.contains("items=(\"a\" \"b\" \"c\")"));
    assert!(bash.contains("count=\"${#items[@]}\""));
    assert!(bash.contains("echo \"$greeting\""));
    assert!(bash.contains("echo \"$count\""));
}

#[test]
fn global_mutation_across_function_calls() {
    let src = r#"
global let counter = 0
fn bump()
    global counter = counter + 1
end
bump()
bump()
echo "$counter"
"#;
    let bash = compile_ok(src);
    assert!(bash.contains("counter=0"));
    assert!(bash.contains("bump() {"));
    assert!(bash.contains("counter=$(( counter + 1 ))"));
    assert_eq!(bash.matches("bump").count(), 3, "declaration + two calls");
    assert!(bash.contains("echo \"$counter\""));
}

#[test]
fn enum_member_access_lowers_to_joined_string() {
    let src = r#"
enum AccountType
    Checking
    Savings
end
let selected = AccountType::Checking
echo "$selected"
"#;
    let bash = compile_ok(src);
    assert!(!bash.contains("enum"), "enum declarations emit no Bash");
    assert!(bash.contains("selected=\"AccountTypeChecking\""));
    assert!(bash.contains("echo \"$selected\""));
}

#[test]
fn const_reassignment_is_a_fatal_diagnostic_with_no_emitted_bash() {
    let src = "const x = 1\nx = 2\n";
    let result = lash_core::compile(src, "test.lash");
    assert!(result.bash.is_none());
    let codes: Vec<&str> = result.diagnostics.iter().map(|d| d.code).collect();
    assert!(codes.contains(&"E110"), "expected E110, got {codes:?}");
}

#[test]
fn switch_lowers_to_case_with_glob_patterns() {
    let src = r#"
switch "win-11"
    case "win-*": echo match
    case "linux-*": echo no
end
"#;
    let bash = compile_ok(src);
    assert!(bash.contains("case \"win-11\" in"));
    assert!(bash.contains("\"win-*\")"));
    assert!(bash.contains("echo match"));
    assert!(bash.contains("\"linux-*\")"));
    assert!(bash.contains("echo no"));
    assert!(bash.contains("esac"));
}

#[test]
fn background_subshell_and_wait_round_trip_exactly_once() {
    let src = r#"
let pid = 0
let status = 0
subshell into pid
    sh "sleep 0.05"
end &
wait pid into status
echo "$status"
"#;
    let bash = compile_ok(src);
    assert_eq!(bash.matches(") &").count(), 1);
    assert_eq!(bash.matches("pid=$!").count(), 1);
    assert_eq!(bash.matches("wait \"${pid}\"").count(), 1);
    assert!(bash.contains("status=$?"));
    assert!(bash.contains("sleep 0.05"));
    assert!(bash.contains("echo \"$status\""));
    assert!(!bash.contains("__lash_jobs"));
}
