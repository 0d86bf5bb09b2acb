use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorKind {
    ConditionalsBoundary,
    NegateConditionals,
    RemovedCall,
    RemoveConditional,
    Math,
    ReturnValue,
    ConstructorCall,
    InlineConstant,
    Increments,
    InvertNegatives,
    Unknown,
}

const ALIASES: &[(&str, MutatorKind)] = &[
    ("conditionalsboundary", MutatorKind::ConditionalsBoundary),
    ("conditionalboundary", MutatorKind::ConditionalsBoundary),
    ("boundaryconditional", MutatorKind::ConditionalsBoundary),
    ("boundary", MutatorKind::ConditionalsBoundary),
    ("negateconditionals", MutatorKind::NegateConditionals),
    ("negateconditional", MutatorKind::NegateConditionals),
    ("negatedconditional", MutatorKind::NegateConditionals),
    ("negatedconditionals", MutatorKind::NegateConditionals),
    ("voidmethodcall", MutatorKind::RemovedCall),
    ("nonvoidmethodcall", MutatorKind::RemovedCall),
    ("voidmethodcalls", MutatorKind::RemovedCall),
    ("nonvoidmethodcalls", MutatorKind::RemovedCall),
    ("methodcall", MutatorKind::RemovedCall),
    ("removedcall", MutatorKind::RemovedCall),
    ("removecall", MutatorKind::RemovedCall),
    ("removeconditional", MutatorKind::RemoveConditional),
    ("removedconditional", MutatorKind::RemoveConditional),
    ("removeconditionals", MutatorKind::RemoveConditional),
    ("math", MutatorKind::Math),
    ("mathoperator", MutatorKind::Math),
    ("arithmetic", MutatorKind::Math),
    ("returnvals", MutatorKind::ReturnValue),
    ("returnvalue", MutatorKind::ReturnValue),
    ("nullreturnvals", MutatorKind::ReturnValue),
    ("emptyobjectreturnvals", MutatorKind::ReturnValue),
    ("primitivereturns", MutatorKind::ReturnValue),
    ("booleantruereturnvals", MutatorKind::ReturnValue),
    ("booleanfalsereturnvals", MutatorKind::ReturnValue),
    ("emptyreturns", MutatorKind::ReturnValue),
    ("falsereturns", MutatorKind::ReturnValue),
    ("truereturns", MutatorKind::ReturnValue),
    ("nullreturns", MutatorKind::ReturnValue),
    ("constructorcall", MutatorKind::ConstructorCall),
    ("constructorcalls", MutatorKind::ConstructorCall),
    ("inlineconstant", MutatorKind::InlineConstant),
    ("inlineconstants", MutatorKind::InlineConstant),
    ("inlineconsts", MutatorKind::InlineConstant),
    ("increments", MutatorKind::Increments),
    ("increment", MutatorKind::Increments),
    ("invertnegs", MutatorKind::InvertNegatives),
    ("invertnegatives", MutatorKind::InvertNegatives),
];

impl MutatorKind {
    /// Resolve a fully qualified mutator id or a free-form category name.
    pub fn from_id(id: &str) -> Self {
        let normalized = normalize_mutator_id(id);
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, kind)| *kind)
            .unwrap_or(MutatorKind::Unknown)
    }

    fn apply(self, statement: &str, description: &str) -> Option<String> {
        let tokens = tokenize(statement);
        match self {
            MutatorKind::ConditionalsBoundary => swap_first(statement, &tokens, BOUNDARY, true),
            MutatorKind::NegateConditionals => swap_first(statement, &tokens, NEGATE, true),
            MutatorKind::RemovedCall => remove_call(statement, &tokens, description),
            MutatorKind::RemoveConditional => remove_conditional(statement, &tokens, description),
            MutatorKind::Math => swap_math(statement, &tokens, description),
            MutatorKind::ReturnValue => replace_return(statement, &tokens, description),
            MutatorKind::ConstructorCall => replace_constructor(statement, &tokens),
            MutatorKind::InlineConstant => replace_constant(statement, &tokens, description),
            MutatorKind::Increments => swap_first(statement, &tokens, INCREMENTS, false),
            MutatorKind::InvertNegatives => drop_unary_minus(statement, &tokens),
            MutatorKind::Unknown => None,
        }
    }
}

/// `org.pitest...RemoveConditionalMutator_EQUAL_ELSE` -> `removeconditional`,
/// `negated conditional` -> `negatedconditional`.
pub fn normalize_mutator_id(id: &str) -> String {
    let segment = id.trim().rsplit('.').next().unwrap_or(id);
    let segment = match segment.find("Mutator") {
        Some(idx) => &segment[..idx + "Mutator".len()],
        None => segment,
    };
    let flat: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    flat.strip_suffix("mutator").map(str::to_string).unwrap_or(flat)
}

/// Best-effort, display-only rendering of `original` after the mutation.
/// Falls back to the original with the description appended as a comment.
pub fn synthesize(original: &str, mutator: &str, description: &str) -> String {
    let kind = MutatorKind::from_id(mutator);
    match kind.apply(original, description) {
        Some(mutated) if mutated != original => mutated,
        _ => annotate(original, description),
    }
}

fn annotate(original: &str, description: &str) -> String {
    let note = description.replace("*/", "* /");
    if original.trim().is_empty() {
        format!("/* {note} */")
    } else {
        format!("{original} /* {note} */")
    }
}

const BOUNDARY: &[(&str, &str)] = &[("<", "<="), ("<=", "<"), (">", ">="), (">=", ">")];

const NEGATE: &[(&str, &str)] = &[
    ("==", "!="),
    ("!=", "=="),
    ("<", ">="),
    ("<=", ">"),
    (">", "<="),
    (">=", "<"),
];

const INCREMENTS: &[(&str, &str)] = &[("++", "--"), ("--", "++"), ("+=", "-="), ("-=", "+=")];

const MATH_INVERSE: &[(&str, &str)] = &[
    ("+", "-"),
    ("-", "+"),
    ("*", "/"),
    ("/", "*"),
    ("%", "*"),
    ("&", "|"),
    ("|", "&"),
    ("^", "&"),
    ("<<", ">>"),
    (">>", "<<"),
    (">>>", "<<"),
];

const MATH_WORDS: &[(&str, &str)] = &[
    ("addition", "+"),
    ("subtraction", "-"),
    ("multiplication", "*"),
    ("division", "/"),
    ("modulus", "%"),
    ("and", "&"),
    ("or", "|"),
    ("xor", "^"),
    ("shift left", "<<"),
    ("unsigned shift right", ">>>"),
    ("shift right", ">>"),
];

const OPERATORS: &[&str] = &[
    ">>>=", "<<=", ">>=", ">>>", "->", "::", "++", "--", "&&", "||", "==", "!=", "<=", ">=", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "+", "-", "*", "/", "%", "<", ">", "=",
    "!", "&", "|", "^", "~", "?", ":", ";", ",", ".", "@",
];

const NON_VALUE_WORDS: &[&str] = &["return", "case", "throw", "new", "yield", "assert", "else", "do"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokKind {
    Word,
    Number,
    Literal,
    Op,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Tok<'a> {
    kind: TokKind,
    text: &'a str,
    start: usize,
    end: usize,
    /// `<` / `>` used as type-argument brackets rather than comparisons.
    generic: bool,
}

impl Tok<'_> {
    fn is_value_end(&self) -> bool {
        match self.kind {
            TokKind::Number | TokKind::Literal => true,
            TokKind::Word => !NON_VALUE_WORDS.contains(&self.text),
            TokKind::Close => matches!(self.text, ")" | "]"),
            _ => false,
        }
    }
}

fn tokenize(src: &str) -> Vec<Tok<'_>> {
    let bytes = src.as_bytes();
    let mut toks: Vec<Tok<'_>> = Vec::new();
    let mut generic_depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if src[i..].starts_with("//") {
            i = src[i..].find('\n').map(|n| i + n).unwrap_or(bytes.len());
            continue;
        }
        if src[i..].starts_with("/*") {
            i = src[i + 2..].find("*/").map(|n| i + 2 + n + 2).unwrap_or(bytes.len());
            continue;
        }

        let start = i;
        let kind = if c == b'"' || c == b'\'' {
            i = skip_literal(src, i);
            TokKind::Literal
        } else if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') {
                i += 1;
            }
            TokKind::Number
        } else if c.is_ascii_alphabetic() || c == b'_' || c == b'$' || !c.is_ascii() {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$' || !bytes[i].is_ascii())
            {
                i += 1;
            }
            TokKind::Word
        } else if matches!(c, b'(' | b'[' | b'{') {
            i += 1;
            TokKind::Open
        } else if matches!(c, b')' | b']' | b'}') {
            i += 1;
            TokKind::Close
        } else {
            let op = OPERATORS.iter().find(|op| src[i..].starts_with(**op));
            i += op.map(|op| op.len()).unwrap_or(1);
            TokKind::Op
        };
        // Multi-byte chars end on a char boundary because the word loop eats them whole.
        let text = &src[start..i];

        let mut generic = false;
        if kind == TokKind::Op {
            match text {
                "<" => {
                    let prev_is_type = toks
                        .last()
                        .is_some_and(|t| t.kind == TokKind::Word && t.text.starts_with(|ch: char| ch.is_ascii_uppercase()));
                    let next = src[i..].trim_start();
                    let next_is_type = next.starts_with(|ch: char| ch.is_ascii_uppercase() || ch == '?' || ch == '>');
                    if prev_is_type && next_is_type && closes_as_type_args(&src[i..]) {
                        generic = true;
                        generic_depth += 1;
                    }
                }
                ">" if generic_depth > 0 => {
                    generic = true;
                    generic_depth -= 1;
                }
                ">>" if generic_depth > 0 => {
                    generic = true;
                    generic_depth = generic_depth.saturating_sub(2);
                }
                _ => {}
            }
        }
        toks.push(Tok { kind, text, start, end: i, generic });
    }
    toks
}

/// Whether the text after a `<` reaches its matching `>` through nothing but
/// type-argument characters. `SIZE < LIMIT)` does not.
fn closes_as_type_args(rest: &str) -> bool {
    let mut depth = 1usize;
    for ch in rest.chars() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return true;
                }
            }
            c if c.is_alphanumeric() || c.is_whitespace() || "_$.,?[]".contains(c) => {}
            _ => return false,
        }
    }
    false
}

fn skip_literal(src: &str, start: usize) -> usize {
    let bytes = src.as_bytes();
    if src[start..].starts_with("\"\"\"") {
        return src[start + 3..]
            .find("\"\"\"")
            .map(|n| start + 3 + n + 3)
            .unwrap_or(bytes.len());
    }
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn splice(src: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(src.len() + replacement.len());
    out.push_str(&src[..start]);
    out.push_str(replacement);
    out.push_str(&src[end..]);
    out
}

fn lookup<'t>(table: &'t [(&str, &str)], key: &str) -> Option<&'t str> {
    table.iter().find(|(from, _)| *from == key).map(|(_, to)| *to)
}

/// Replace the first operator found in `table`.
fn swap_first(src: &str, toks: &[Tok<'_>], table: &[(&str, &str)], binary_only: bool) -> Option<String> {
    toks.iter().enumerate().find_map(|(idx, t)| {
        if t.kind != TokKind::Op || t.generic {
            return None;
        }
        let to = lookup(table, t.text)?;
        if binary_only && !(idx > 0 && toks[idx - 1].is_value_end()) {
            return None;
        }
        Some(splice(src, t.start, t.end, to))
    })
}

fn is_binary_at(toks: &[Tok<'_>], idx: usize) -> bool {
    idx > 0 && toks[idx - 1].is_value_end() && !toks[idx].generic
}

fn swap_math(src: &str, toks: &[Tok<'_>], description: &str) -> Option<String> {
    let lower = description.to_ascii_lowercase();
    if let Some((from, to)) = math_direction(&lower) {
        let hit = toks
            .iter()
            .enumerate()
            .find(|(idx, t)| t.kind == TokKind::Op && t.text == from && is_binary_at(toks, *idx));
        if let Some((_, t)) = hit {
            return Some(splice(src, t.start, t.end, to));
        }
    }
    toks.iter().enumerate().find_map(|(idx, t)| {
        if t.kind != TokKind::Op || !is_binary_at(toks, idx) {
            return None;
        }
        let to = lookup(MATH_INVERSE, t.text)?;
        Some(splice(src, t.start, t.end, to))
    })
}

/// "Replaced integer addition with subtraction" -> ("+", "-").
fn math_direction(lower: &str) -> Option<(&'static str, &'static str)> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"replaced\s+(?:\w+\s+)?(.+?)\s+with\s+(.+?)\s*$").ok())
        .as_ref()?;
    let caps = re.captures(lower)?;
    let word_op = |phrase: &str| {
        MATH_WORDS
            .iter()
            .find(|(word, _)| phrase.trim() == *word || phrase.trim().ends_with(&format!(" {word}")))
            .map(|(_, op)| *op)
    };
    Some((word_op(caps.get(1)?.as_str())?, word_op(caps.get(2)?.as_str())?))
}

fn matching_close(toks: &[Tok<'_>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, t) in toks.iter().enumerate().skip(open) {
        match t.kind {
            TokKind::Open => depth += 1,
            TokKind::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn called_method(description: &str) -> Option<&str> {
    let after = description.split("::").nth(1)?;
    let name = after
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .next()?;
    (!name.is_empty()).then_some(name)
}

const NOT_CALLS: &[&str] = &["if", "while", "for", "switch", "catch", "synchronized", "return", "super", "this"];

fn remove_call(src: &str, toks: &[Tok<'_>], description: &str) -> Option<String> {
    let wanted = called_method(description);
    let statement_calls: Vec<(usize, usize, &str)> = toks
        .windows(2)
        .enumerate()
        .filter(|(idx, w)| {
            w[0].kind == TokKind::Word
                && w[1].text == "("
                && !NOT_CALLS.contains(&w[0].text)
                && !(*idx > 0 && toks[idx - 1].text == "new")
        })
        .filter_map(|(idx, w)| {
            let close = matching_close(toks, idx + 1)?;
            let semi = toks.get(close + 1).filter(|t| t.text == ";")?;
            let mut start = idx;
            while start >= 2 && toks[start - 1].text == "." && toks[start - 2].kind == TokKind::Word {
                start -= 2;
            }
            // Only calls standing as their own statement; `x = f();` is not removable text.
            if start > 0 && !matches!(toks[start - 1].text, ";" | "{" | "}" | ")" | "else" | "->") {
                return None;
            }
            Some((toks[start].start, semi.end, w[0].text))
        })
        .collect();

    let (start, end, name) = wanted
        .and_then(|w| statement_calls.iter().find(|(_, _, n)| *n == w))
        .or_else(|| statement_calls.first())
        .copied()?;
    Some(splice(src, start, end, &format!("/* removed call to {name} */")))
}

fn remove_conditional(src: &str, toks: &[Tok<'_>], description: &str) -> Option<String> {
    let lower = description.to_ascii_lowercase();
    let literal = if lower.contains("with false") { "false" } else { "true" };

    let op_idx = toks.iter().enumerate().position(|(idx, t)| {
        t.kind == TokKind::Op
            && !t.generic
            && (lookup(NEGATE, t.text).is_some() || t.text == "&&" || t.text == "||")
            && is_binary_at(toks, idx)
    })?;

    // Innermost parenthesised group around the comparison.
    let mut depth = 0i32;
    let mut open = None;
    for idx in (0..op_idx).rev() {
        match toks[idx].kind {
            TokKind::Close => depth += 1,
            TokKind::Open if depth == 0 => {
                open = Some(idx);
                break;
            }
            TokKind::Open => depth -= 1,
            _ => {}
        }
    }
    let (first, last) = match open {
        Some(open) if toks[open].text == "(" => (open + 1, matching_close(toks, open)?.checked_sub(1)?),
        _ => {
            let first = (0..op_idx)
                .rev()
                .find(|&idx| toks[idx].text == "=" || toks[idx].text == "return")
                .map(|idx| idx + 1)
                .unwrap_or(0);
            let last = (op_idx..toks.len())
                .find(|&idx| toks[idx].text == ";")
                .map(|idx| idx - 1)
                .unwrap_or(toks.len() - 1);
            (first, last)
        }
    };
    if first > last {
        return None;
    }
    Some(splice(src, toks[first].start, toks[last].end, literal))
}

fn return_literal(description: &str) -> &'static str {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let lower = description.to_ascii_lowercase();
    let target = PATTERN
        .get_or_init(|| Regex::new(r"with\s+(.+?)(?:\s+for\s+|$)").ok())
        .as_ref()
        .and_then(|re| re.captures(&lower))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| lower.clone());

    if target.contains("null") {
        "null"
    } else if target.contains("\"\"") || target.contains("empty string") {
        "\"\""
    } else if target.contains("emptylist") {
        "Collections.emptyList()"
    } else if target.contains("optional.empty") {
        "Optional.empty()"
    } else if target.contains("true") {
        "true"
    } else if target.contains("false") {
        "false"
    } else if target == "0" || target.starts_with("0 ") || target.contains("zero") {
        "0"
    } else {
        "null"
    }
}

fn replace_return(src: &str, toks: &[Tok<'_>], description: &str) -> Option<String> {
    let ret = toks.iter().position(|t| t.kind == TokKind::Word && t.text == "return")?;
    let first = ret + 1;
    let end = (first..toks.len()).find(|&idx| toks[idx].text == ";").unwrap_or(toks.len());
    if first >= end {
        return None;
    }
    Some(splice(src, toks[first].start, toks[end - 1].end, return_literal(description)))
}

fn replace_constructor(src: &str, toks: &[Tok<'_>]) -> Option<String> {
    let new_idx = toks.iter().position(|t| t.kind == TokKind::Word && t.text == "new")?;
    let open = (new_idx + 1..toks.len())
        .take_while(|&idx| !matches!(toks[idx].text, ";" | "[" | "{"))
        .find(|&idx| toks[idx].text == "(")?;
    let close = matching_close(toks, open)?;
    Some(splice(src, toks[new_idx].start, toks[close].end, "null"))
}

/// "Substituted 1 with 0" / "Replaced 1 with 0".
fn replace_constant(src: &str, toks: &[Tok<'_>], description: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)(?:substituted|replaced)\s+(?:constant\s+value\s+of\s+)?(\S+)\s+with\s+(\S+)").ok()
        })
        .as_ref()?;
    let caps = re.captures(description)?;
    let from = caps.get(1)?.as_str();
    let to = caps.get(2)?.as_str();
    let bare = |s: &str| s.trim_end_matches(['l', 'L', 'f', 'F', 'd', 'D']).to_string();

    let hit = toks.iter().enumerate().find(|(idx, t)| {
        let value = matches!(t.kind, TokKind::Number | TokKind::Word | TokKind::Literal);
        if !value {
            return false;
        }
        if t.text == from || (t.kind == TokKind::Number && bare(t.text) == bare(from)) {
            return true;
        }
        // `-1` arrives as a unary minus followed by the number.
        from.strip_prefix('-').is_some_and(|abs| {
            t.text == abs && *idx > 0 && toks[idx - 1].text == "-" && !is_binary_at(toks, idx - 1)
        })
    });
    let (idx, t) = hit?;
    let start = if from.starts_with('-') && t.text != from { toks[idx - 1].start } else { t.start };
    Some(splice(src, start, t.end, to))
}

fn drop_unary_minus(src: &str, toks: &[Tok<'_>]) -> Option<String> {
    let idx = toks
        .iter()
        .enumerate()
        .position(|(idx, t)| t.kind == TokKind::Op && t.text == "-" && !is_binary_at(toks, idx))?;
    Some(splice(src, toks[idx].start, toks[idx].end, ""))
}
