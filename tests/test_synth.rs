use mutfleet::synth::{MutatorKind, normalize_mutator_id, synthesize};

const GREGOR: &str = "org.pitest.mutationtest.engine.gregor.mutators";

fn id(name: &str) -> String {
    format!("{GREGOR}.{name}")
}

#[test]
fn negated_conditional_by_free_form_name() {
    assert_eq!(
        synthesize("if (a == b)", "negated conditional", "negated conditional"),
        "if (a != b)"
    );
}

#[test]
fn ids_normalize_into_the_closed_set() {
    assert_eq!(normalize_mutator_id(&id("ConditionalsBoundaryMutator")), "conditionalsboundary");
    assert_eq!(
        normalize_mutator_id(&id("RemoveConditionalMutator_EQUAL_ELSE")),
        "removeconditional"
    );
    assert_eq!(normalize_mutator_id("negated conditional"), "negatedconditional");

    assert_eq!(MutatorKind::from_id(&id("MathMutator")), MutatorKind::Math);
    assert_eq!(MutatorKind::from_id(&id("returns.NullReturnValsMutator")), MutatorKind::ReturnValue);
    assert_eq!(MutatorKind::from_id("VOID_METHOD_CALLS"), MutatorKind::RemovedCall);
    assert_eq!(MutatorKind::from_id("INVERT_NEGS"), MutatorKind::InvertNegatives);
    assert_eq!(MutatorKind::from_id(&id("experimental.NakedReceiverMutator")), MutatorKind::Unknown);
}

#[test]
fn boundary_swaps_first_relational_operator() {
    let out = synthesize(
        "if (count < limit && x > 0)",
        &id("ConditionalsBoundaryMutator"),
        "changed conditional boundary",
    );
    assert_eq!(out, "if (count <= limit && x > 0)");
}

#[test]
fn negation_cross_maps_boundaries() {
    let kind = id("NegateConditionalsMutator");
    assert_eq!(synthesize("while (i >= n)", &kind, "negated conditional"), "while (i < n)");
    assert_eq!(synthesize("return a != b;", &kind, "negated conditional"), "return a == b;");
}

#[test]
fn generic_brackets_are_not_comparisons() {
    let out = synthesize(
        "List<String> xs = a < b ? left : right;",
        &id("NegateConditionalsMutator"),
        "negated conditional",
    );
    assert_eq!(out, "List<String> xs = a >= b ? left : right;");
}

#[test]
fn capitalized_operands_are_still_comparisons() {
    let kind = id("ConditionalsBoundaryMutator");
    assert_eq!(synthesize("if (SIZE < LIMIT)", &kind, "changed conditional boundary"), "if (SIZE <= LIMIT)");
    assert_eq!(
        synthesize("Map<String, List<Integer>> m = A < B ? x : y;", &kind, "changed conditional boundary"),
        "Map<String, List<Integer>> m = A <= B ? x : y;"
    );
}

#[test]
fn operators_inside_strings_are_ignored() {
    let out = synthesize(
        r#"log("a < b", x < y);"#,
        &id("ConditionalsBoundaryMutator"),
        "changed conditional boundary",
    );
    assert_eq!(out, r#"log("a < b", x <= y);"#);
}

#[test]
fn removed_call_becomes_marker() {
    let out = synthesize(
        "helper.log(message);",
        &id("VoidMethodCallMutator"),
        "removed call to com/acme/Helper::log",
    );
    assert_eq!(out, "/* removed call to log */");
}

#[test]
fn removed_call_picks_the_named_call() {
    let out = synthesize(
        "if (ready) { audit(); notify(user); }",
        &id("VoidMethodCallMutator"),
        "removed call to com/acme/Bus::notify",
    );
    assert_eq!(out, "if (ready) { audit(); /* removed call to notify */ }");
}

#[test]
fn removed_conditional_uses_described_literal() {
    let kind = id("RemoveConditionalMutator_EQUAL_IF");
    assert_eq!(
        synthesize("if (a == b)", &kind, "removed conditional - replaced equality check with true"),
        "if (true)"
    );
    assert_eq!(
        synthesize(
            "boolean ok = x > limit;",
            &id("RemoveConditionalMutator_ORDER_ELSE"),
            "removed conditional - replaced comparison check with false"
        ),
        "boolean ok = false;"
    );
}

#[test]
fn math_direction_comes_from_description() {
    let kind = id("MathMutator");
    assert_eq!(
        synthesize("total = total - 5;", &kind, "Replaced integer subtraction with addition"),
        "total = total + 5;"
    );
    assert_eq!(
        synthesize("int r = a * b + c;", &kind, "Replaced integer addition with subtraction"),
        "int r = a * b - c;"
    );
}

#[test]
fn math_falls_back_to_canonical_inverse_and_skips_unary_minus() {
    let out = synthesize("x = -y * 2;", &id("MathMutator"), "Replaced something odd");
    assert_eq!(out, "x = -y / 2;");
}

#[test]
fn return_values_follow_description() {
    let null = id("returns.NullReturnValsMutator");
    assert_eq!(
        synthesize("return cache.get(key);", &null, "replaced return value with null for com/acme/Repo::find"),
        "return null;"
    );
    assert_eq!(
        synthesize(
            "return items.size() > 0;",
            &id("returns.BooleanFalseReturnValsMutator"),
            "replaced boolean return with false for com/acme/Cart::isTrueish"
        ),
        "return false;"
    );
    assert_eq!(
        synthesize(
            "return base * qty;",
            &id("returns.PrimitiveReturnsMutator"),
            "replaced int return with 0 for com/acme/Pricer::price"
        ),
        "return 0;"
    );
    assert_eq!(
        synthesize(
            "return name.trim();",
            &id("returns.EmptyObjectReturnValsMutator"),
            r#"replaced return value with "" for com/acme/User::display"#
        ),
        r#"return "";"#
    );
}

#[test]
fn constructor_call_becomes_null() {
    let kind = id("ConstructorCallMutator");
    assert_eq!(
        synthesize("Cart cart = new Cart(items);", &kind, "removed call to com/acme/Cart::<init>"),
        "Cart cart = null;"
    );
    assert_eq!(
        synthesize("List<String> xs = new ArrayList<>();", &kind, "removed call to java/util/ArrayList::<init>"),
        "List<String> xs = null;"
    );
}

#[test]
fn inline_constant_substitution() {
    let kind = id("InlineConstantMutator");
    assert_eq!(synthesize("int limit = 100;", &kind, "Substituted 100 with 101"), "int limit = 101;");
    assert_eq!(synthesize("long x = 1L;", &kind, "Substituted 1 with 0"), "long x = 0;");
    assert_eq!(synthesize("x = -1;", &kind, "Substituted -1 with 0"), "x = 0;");
}

#[test]
fn increments_and_negatives() {
    assert_eq!(synthesize("i++;", &id("IncrementsMutator"), "Changed increment from 1 to -1"), "i--;");
    assert_eq!(synthesize("sum += step;", "INCREMENTS", "Changed increment"), "sum -= step;");
    assert_eq!(
        synthesize("return -value;", &id("InvertNegsMutator"), "removed negation"),
        "return value;"
    );
}

#[test]
fn unknown_kind_annotates_original() {
    assert_eq!(
        synthesize("doWork();", "com.example.CustomMutator", "did something */ odd"),
        "doWork(); /* did something * / odd */"
    );
}

#[test]
fn inapplicable_kind_degrades_to_annotation() {
    let out = synthesize("x = y;", &id("NegateConditionalsMutator"), "negated conditional");
    assert_eq!(out, "x = y; /* negated conditional */");

    let out = synthesize("int x = compute();", &id("VoidMethodCallMutator"), "removed call to A::compute");
    assert_eq!(out, "int x = compute(); /* removed call to A::compute */");
}

#[test]
fn empty_statement_still_renders() {
    assert_eq!(synthesize("", "whatever", "note"), "/* note */");
}
