//! Structural parser for signature transform functions.
//!
//! Works on script text only. Nothing here executes code, so it is safe to run
//! against untrusted input and its result can be cached by script hash.

use super::scan::{block_body, compact, matching_brace, split_top_level};
use super::transform::{OpKind, Operation, Transform};
use crate::error::CipherError;
use crate::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Declaration shapes, highest priority first
static DECLARATION_SHAPES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"function\s+(?P<name>[A-Za-z0-9$_]+)\s*\(\s*(?P<param>[A-Za-z0-9$_]+)\s*\)\s*\{",
        r"(?P<name>[A-Za-z0-9$_]+)\s*=\s*function\s*\(\s*(?P<param>[A-Za-z0-9$_]+)\s*\)\s*\{",
        r"(?P<name>[A-Za-z0-9$_]+)\s*:\s*function\s*\(\s*(?P<param>[A-Za-z0-9$_]+)\s*\)\s*\{",
        r"(?P<name>[A-Za-z0-9$_]+)\s*=\s*\(\s*(?P<param>[A-Za-z0-9$_]+)\s*\)\s*=>\s*\{",
        r"(?P<name>[A-Za-z0-9$_]+)\s*=\s*(?P<param>[A-Za-z0-9$_]+)\s*=>\s*\{",
        r"function\s*\(\s*(?P<param>[A-Za-z0-9$_]+)\s*\)\s*\{",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid declaration regex"))
    .collect()
});

/// Object literal members: `name:function(..){`, `name:(..)=>{` or `name(..){`
static MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(?P<func>[A-Za-z0-9$_]+)\s*:\s*function\s*\([^)]*\)|(?P<arrow>[A-Za-z0-9$_]+)\s*:\s*\([^)]*\)\s*=>|(?P<short>[A-Za-z0-9$_]+)\s*\([^)]*\))\s*\{",
    )
    .expect("valid member regex")
});

static SPLICE_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"splice\(\s*0\s*,\s*(\d+)\s*\)").expect("valid splice regex")
});

const KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch", "function", "return"];

/// A function that splits its parameter into characters and joins it back
#[derive(Debug, Clone)]
pub struct TransformFunction {
    pub name: Option<String>,
    pub param: String,
    pub body: String,
}

impl TransformFunction {
    /// Statements between the leading split and the trailing join
    pub fn inner_statements(&self) -> Vec<&str> {
        let statements = split_top_level(&self.body, b';');
        if statements.len() < 2 {
            return Vec::new();
        }
        statements[1..statements.len() - 1].to_vec()
    }
}

/// A helper object literal whose methods perform the array operations
#[derive(Debug, Clone)]
pub struct HelperObject {
    pub name: String,
    /// The literal including its braces
    pub literal: String,
    pub methods: Vec<HelperMethod>,
}

#[derive(Debug, Clone)]
pub struct HelperMethod {
    pub name: String,
    pub body: String,
    pub kind: Option<OpKind>,
}

impl HelperObject {
    pub fn kind_of(&self, method: &str) -> Option<OpKind> {
        self.methods
            .iter()
            .find(|m| m.name == method)
            .and_then(|m| m.kind)
    }
}

/// Result of a successful structural parse
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub transform: Transform,
    pub function_name: Option<String>,
    /// At least one slice offset came from the back-fill scan
    pub backfilled: bool,
}

/// Parse the signature transform out of `script`.
///
/// Returns `NotFound` when no function has the split/join shape and
/// `Unresolved` when one does but its operations cannot all be determined.
pub fn parse(script: &str) -> Result<ParseOutcome> {
    let mut best: Option<CipherError> = None;

    for function in find_transform_functions(script) {
        match parse_function(script, &function) {
            Ok(outcome) => {
                debug!(
                    function = function.name.as_deref().unwrap_or("<anonymous>"),
                    transform = %outcome.transform,
                    backfilled = outcome.backfilled,
                    "structural parse succeeded"
                );
                return Ok(outcome);
            }
            Err(err) => {
                debug!(
                    function = function.name.as_deref().unwrap_or("<anonymous>"),
                    error = %err,
                    "candidate rejected"
                );
                let upgrade = matches!(
                    (&best, &err),
                    (None, _) | (Some(CipherError::NotFound(_)), CipherError::Unresolved(_))
                );
                if upgrade {
                    best = Some(err);
                }
            }
        }
    }

    Err(best.unwrap_or_else(|| CipherError::NotFound("no split/join transform function".into())))
}

/// Name of the first named transform function, for calling it directly
pub fn locate_function_name(script: &str) -> Option<String> {
    find_transform_functions(script)
        .into_iter()
        .find_map(|function| function.name)
}

/// Every split/join function in `script`, in declaration-shape priority order
pub fn find_transform_functions(script: &str) -> Vec<TransformFunction> {
    let mut seen = Vec::new();
    let mut functions = Vec::new();

    for shape in DECLARATION_SHAPES.iter() {
        for caps in shape.captures_iter(script) {
            let (Some(whole), Some(param)) = (caps.get(0), caps.name("param")) else {
                continue;
            };
            let open = whole.end() - 1;
            if seen.contains(&open) {
                continue;
            }
            let param = param.as_str();
            if !opens_with_split(&script[open + 1..], param) {
                continue;
            }
            let Some(body) = block_body(script, open) else {
                continue;
            };
            if !closes_with_join(body, param) {
                continue;
            }
            seen.push(open);
            functions.push(TransformFunction {
                name: caps.name("name").map(|m| m.as_str().to_string()),
                param: param.to_string(),
                body: body.to_string(),
            });
        }
    }

    functions
}

/// Locate and decompose the helper object the function calls into
pub fn find_helper(script: &str, function: &TransformFunction) -> Result<HelperObject> {
    let name = helper_name(function)?
        .ok_or_else(|| CipherError::NotFound("transform function makes no helper call".into()))?;

    let definition = Regex::new(&format!(
        r"(?:^|[^A-Za-z0-9$_.]){}\s*=\s*\{{",
        regex::escape(&name)
    ))?;
    let found = definition
        .find(script)
        .ok_or_else(|| CipherError::NotFound(format!("helper object {} is not defined", name)))?;
    let open = found.end() - 1;
    let close = matching_brace(script, open)
        .ok_or_else(|| CipherError::NotFound(format!("helper object {} is unterminated", name)))?;

    let literal = &script[open..=close];
    Ok(HelperObject {
        methods: helper_methods(&literal[1..literal.len() - 1]),
        literal: literal.to_string(),
        name,
    })
}

fn parse_function(script: &str, function: &TransformFunction) -> Result<ParseOutcome> {
    if let Some(transform) = direct_shortcut(function)? {
        return Ok(ParseOutcome {
            transform,
            function_name: function.name.clone(),
            backfilled: false,
        });
    }

    let helper = find_helper(script, function)?;
    let mut steps = replay_statements(function, &helper)?;

    let mut backfilled = false;
    let pending_slice = steps
        .iter()
        .any(|(kind, arg)| *kind == OpKind::SliceFrom && arg.is_none());
    if pending_slice {
        if let Some(offset) = backfill_offset(function, &helper, &steps) {
            for (kind, arg) in steps.iter_mut() {
                if *kind == OpKind::SliceFrom && arg.is_none() {
                    *arg = Some(offset);
                }
            }
            backfilled = true;
        }
    }

    let mut operations = Vec::with_capacity(steps.len());
    for (kind, arg) in steps {
        let operation = match (kind.takes_arg(), arg) {
            (false, _) => Operation::Reverse,
            (true, Some(n)) => kind.with_arg(n),
            (true, None) => {
                return Err(CipherError::Unresolved(format!(
                    "argument of {:?} step is not a literal",
                    kind
                )))
            }
        };
        operations.push(operation);
    }

    Ok(ParseOutcome {
        transform: Transform::new(operations),
        function_name: function.name.clone(),
        backfilled,
    })
}

/// Array calls made directly on the parameter
struct DirectCalls {
    reverse: String,
    splice: Regex,
    slice: Regex,
}

impl DirectCalls {
    fn new(param: &str) -> Result<Self> {
        let p = regex::escape(param);
        Ok(Self {
            reverse: format!("{}.reverse()", param),
            splice: Regex::new(&format!(r"^{p}\.splice\(0,(\d+)\)$"))?,
            slice: Regex::new(&format!(r"^{p}={p}\.slice\((\d+)\)$"))?,
        })
    }

    /// Operation for one whitespace-free expression
    fn operation(&self, expression: &str) -> Option<Operation> {
        if expression == self.reverse {
            Some(Operation::Reverse)
        } else {
            literal_capture(&self.splice, expression)
                .or_else(|| literal_capture(&self.slice, expression))
                .map(Operation::SliceFrom)
        }
    }
}

/// A body made only of direct array calls on the parameter
fn direct_shortcut(function: &TransformFunction) -> Result<Option<Transform>> {
    let direct = DirectCalls::new(&function.param)?;

    let mut operations = Vec::new();
    for statement in function.inner_statements() {
        for expression in split_top_level(statement, b',') {
            match direct.operation(&compact(expression)) {
                Some(operation) => operations.push(operation),
                None => return Ok(None),
            }
        }
    }

    Ok((!operations.is_empty()).then(|| Transform::new(operations)))
}

/// Ordered `(kind, literal argument)` steps of a helper-object body.
///
/// Every expression must be a helper call, a direct array call, or leave the
/// parameter alone; anything else touching it makes the parse `Unresolved`.
fn replay_statements(
    function: &TransformFunction,
    helper: &HelperObject,
) -> Result<Vec<(OpKind, Option<usize>)>> {
    let p = regex::escape(&function.param);
    let call = Regex::new(&format!(
        r"^{}\.([A-Za-z0-9$_]+)\({p}(?:,([^()]*))?\)$",
        regex::escape(&helper.name)
    ))?;
    let mentions = Regex::new(&format!(r"(?:^|[^A-Za-z0-9$_.]){p}(?:[^A-Za-z0-9$_]|$)"))?;
    let direct = DirectCalls::new(&function.param)?;

    let mut steps = Vec::new();
    let mut helper_calls = 0;
    for statement in function.inner_statements() {
        for expression in split_top_level(statement, b',') {
            let compacted = compact(expression);
            if let Some(caps) = call.captures(&compacted) {
                let method = &caps[1];
                let kind = helper.kind_of(method).ok_or_else(|| {
                    CipherError::Unresolved(format!(
                        "helper method {}.{} is unclassified",
                        helper.name, method
                    ))
                })?;
                let arg = caps.get(2).and_then(|m| m.as_str().parse().ok());
                steps.push((kind, arg));
                helper_calls += 1;
            } else if let Some(operation) = direct.operation(&compacted) {
                let arg = match operation {
                    Operation::Reverse => None,
                    Operation::SliceFrom(n) | Operation::SwapWithIndex(n) => Some(n),
                };
                steps.push((operation.kind(), arg));
            } else if mentions.is_match(expression) {
                return Err(CipherError::Unresolved(format!(
                    "statement `{}` changes {} outside helper {}",
                    expression, function.param, helper.name
                )));
            }
        }
    }

    if helper_calls == 0 {
        return Err(CipherError::NotFound(format!(
            "no calls into helper {}",
            helper.name
        )));
    }
    Ok(steps)
}

fn literal_capture(re: &Regex, text: &str) -> Option<usize> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Object name of the first `OBJ.method(param, ...)` call
fn helper_name(function: &TransformFunction) -> Result<Option<String>> {
    let call = Regex::new(&format!(
        r"([A-Za-z0-9$_]+)\.[A-Za-z0-9$_]+\(\s*{}\s*[,)]",
        regex::escape(&function.param)
    ))?;
    let name = call
        .captures_iter(&function.body)
        .map(|caps| caps[1].to_string())
        .find(|object| *object != function.param);
    Ok(name)
}

fn helper_methods(members: &str) -> Vec<HelperMethod> {
    let mut methods = Vec::new();
    let mut pos = 0;

    while let Some(caps) = MEMBER.captures_at(members, pos) {
        let Some(whole) = caps.get(0) else { break };
        let open = whole.end() - 1;
        let Some(close) = matching_brace(members, open) else {
            break;
        };
        pos = close + 1;

        let Some(name) = caps
            .name("func")
            .or_else(|| caps.name("arrow"))
            .or_else(|| caps.name("short"))
        else {
            continue;
        };
        if KEYWORDS.contains(&name.as_str()) {
            continue;
        }
        let body = &members[open + 1..close];
        methods.push(HelperMethod {
            name: name.as_str().to_string(),
            body: body.to_string(),
            kind: OpKind::classify(body),
        });
    }

    methods
}

/// Best-effort offset for slice steps whose call site had no literal.
///
/// Sources in order: another slice call with a literal, a literal
/// `splice(0,N)` in the function body, one in the helper's slice method.
fn backfill_offset(
    function: &TransformFunction,
    helper: &HelperObject,
    steps: &[(OpKind, Option<usize>)],
) -> Option<usize> {
    let from_call = steps
        .iter()
        .find_map(|(kind, arg)| (*kind == OpKind::SliceFrom).then_some(*arg).flatten());
    let offset = from_call
        .or_else(|| literal_capture(&SPLICE_LITERAL, &function.body))
        .or_else(|| {
            helper
                .methods
                .iter()
                .filter(|m| m.kind == Some(OpKind::SliceFrom))
                .find_map(|m| literal_capture(&SPLICE_LITERAL, &m.body))
        })?;
    debug!(offset, backfilled = true, "back-filled slice offset");
    Some(offset)
}

fn opens_with_split(rest: &str, param: &str) -> bool {
    let head: String = rest
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(param.len() * 2 + 12)
        .collect();
    head.starts_with(&format!("{param}={param}.split(\"\")"))
        || head.starts_with(&format!("{param}={param}.split('')"))
}

fn closes_with_join(body: &str, param: &str) -> bool {
    let Some(last) = split_top_level(body, b';').last().map(|s| compact(s)) else {
        return false;
    };
    last == format!("return{param}.join(\"\")") || last == format!("return{param}.join('')")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::cipher::fixtures::{expected_for, FIXTURE, INPUT};

    #[test]
    fn test_fixture_input_length() {
        assert_eq!(INPUT.chars().count(), 97);
    }

    #[test]
    fn test_parse_helper_object_fixture() {
        let outcome = parse(FIXTURE).unwrap();
        assert_eq!(
            outcome.transform.operations(),
            &[
                Operation::Reverse,
                Operation::SliceFrom(26),
                Operation::Reverse
            ]
        );
        assert_eq!(outcome.function_name.as_deref(), Some("X"));
        assert!(!outcome.backfilled);

        let output = outcome.transform.apply(INPUT);
        assert_eq!(output, expected_for(INPUT));
        assert_eq!(output, &INPUT[..INPUT.len() - 26]);
    }

    #[test]
    fn test_parse_direct_shortcut() {
        let script = r#"var Zq=function(a){a=a.split("");a.reverse();a.splice(0,26);a.reverse();return a.join("")};"#;
        let outcome = parse(script).unwrap();
        assert_eq!(
            outcome.transform.to_string(),
            "reverse -> slice_from(26) -> reverse"
        );
        assert_eq!(outcome.function_name.as_deref(), Some("Zq"));
        assert_eq!(outcome.transform.apply(INPUT), expected_for(INPUT));
    }

    #[test]
    fn test_parse_object_method_and_shorthand_helper() {
        let script = r#"var obj={dec:function(s){s=s.split('');Hh.rv(s,0);Hh.sw(s,40);Hh.cut(s,3);return s.join('')}};
var Hh={rv(a){a.reverse()},sw:(a,b)=>{var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c},cut:function(a,b){a.splice(0,b)}};"#;
        let outcome = parse(script).unwrap();
        assert_eq!(
            outcome.transform.operations(),
            &[
                Operation::Reverse,
                Operation::SwapWithIndex(40),
                Operation::SliceFrom(3)
            ]
        );
        assert_eq!(outcome.function_name.as_deref(), Some("dec"));
    }

    #[test]
    fn test_parse_backfills_slice_offset_from_body() {
        let script = r#"function X(a){a=a.split("");var n=26,t=function(c){c.splice(0,26)};B.x9(a,n);B.B0(a,1);return a.join("")};var B={B0:function(a){a.reverse()},x9:function(a,b){a.splice(0,b)}};"#;
        let outcome = parse(script).unwrap();
        assert!(outcome.backfilled);
        assert_eq!(
            outcome.transform.operations(),
            &[Operation::SliceFrom(26), Operation::Reverse]
        );
    }

    #[test]
    fn test_parse_backfills_slice_offset_from_other_call() {
        let script = r#"function X(a){a=a.split("");B.x9(a,n);B.B0(a,1);B.x9(a,2);return a.join("")};var B={B0:function(a){a.reverse()},x9:function(a,b){a.splice(0,b)}};"#;
        let outcome = parse(script).unwrap();
        assert!(outcome.backfilled);
        assert_eq!(
            outcome.transform.to_string(),
            "slice_from(2) -> reverse -> slice_from(2)"
        );
    }

    #[test]
    fn test_parse_backfills_slice_offset_from_helper_method() {
        let script = r#"function X(a){a=a.split("");B.x9(a,k);B.B0(a,1);return a.join("")};var B={B0:function(a){a.reverse()},x9:function(a,b){a.splice(0,4)}};"#;
        let outcome = parse(script).unwrap();
        assert!(outcome.backfilled);
        assert_eq!(
            outcome.transform.operations(),
            &[Operation::SliceFrom(4), Operation::Reverse]
        );
    }

    #[test]
    fn test_parse_arrow_declarations() {
        let parenthesized = r#"var Zq=(a)=>{a=a.split("");a.reverse();a.splice(0,3);return a.join("")};"#;
        let outcome = parse(parenthesized).unwrap();
        assert_eq!(outcome.transform.to_string(), "reverse -> slice_from(3)");
        assert_eq!(outcome.function_name.as_deref(), Some("Zq"));

        let bare = r#"var Wd=a=>{a=a.split("");B.B0(a,1);B.x9(a,5);return a.join("")};var B={B0:function(a){a.reverse()},x9:function(a,b){a.splice(0,b)}};"#;
        let outcome = parse(bare).unwrap();
        assert_eq!(outcome.transform.to_string(), "reverse -> slice_from(5)");
        assert_eq!(outcome.function_name.as_deref(), Some("Wd"));
    }

    #[test]
    fn test_parse_mixes_direct_calls_with_helper_calls() {
        let script = r#"function X(a){a=a.split("");a.reverse();B.x9(a,3);return a.join("")};var B={x9:function(a,b){a.splice(0,b)}};"#;
        let outcome = parse(script).unwrap();
        assert_eq!(outcome.transform.to_string(), "reverse -> slice_from(3)");
    }

    #[test]
    fn test_parse_unknown_statement_on_param_is_unresolved() {
        let script = r#"function X(a){a=a.split("");a.push("x");B.x9(a,3);return a.join("")};var B={x9:function(a,b){a.splice(0,b)}};"#;
        let err = parse(script).unwrap_err();
        assert!(matches!(err, CipherError::Unresolved(_)));

        let guarded = r#"function X(a){a=a.split("");if(a.length)B.x9(a,3);B.x9(a,1);return a.join("")};var B={x9:function(a,b){a.splice(0,b)}};"#;
        assert!(matches!(
            parse(guarded).unwrap_err(),
            CipherError::Unresolved(_)
        ));
    }

    #[test]
    fn test_parse_unresolved_swap_argument() {
        let script = r#"function X(a){a=a.split("");B.yG(a,k);return a.join("")};var B={yG:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}};"#;
        let err = parse(script).unwrap_err();
        assert!(matches!(err, CipherError::Unresolved(_)));
    }

    #[test]
    fn test_parse_unclassified_method_is_unresolved() {
        let script = r#"function X(a){a=a.split("");B.B0(a,1);B.zz(a,2);return a.join("")};var B={B0:function(a){a.reverse()},zz:function(a,b){a.push(b)}};"#;
        let err = parse(script).unwrap_err();
        assert!(matches!(err, CipherError::Unresolved(_)));
    }

    #[test]
    fn test_parse_skips_quotes_in_regex_literals() {
        let script = r#"function X(a){a=a.split("");var r=/["}]/;B.B0(a,1);B.x9(a,2);return a.join("")};var B={B0:function(a){a.reverse()},x9:function(a,b){a.splice(0,b)}};"#;
        let outcome = parse(script).unwrap();
        assert_eq!(outcome.transform.to_string(), "reverse -> slice_from(2)");
    }

    #[test]
    fn test_parse_not_found() {
        let err = parse("var a=function(b){return b+1};").unwrap_err();
        assert!(matches!(err, CipherError::NotFound(_)));
    }

    #[test]
    fn test_locate_function_name() {
        assert_eq!(locate_function_name(FIXTURE).as_deref(), Some("X"));
        assert_eq!(locate_function_name("var q=2;"), None);
    }

    #[test]
    fn test_find_helper_classifies_methods() {
        let function = find_transform_functions(FIXTURE).remove(0);
        let helper = find_helper(FIXTURE, &function).unwrap();
        assert_eq!(helper.name, "B");
        assert!(helper.literal.starts_with('{') && helper.literal.ends_with('}'));
        assert_eq!(helper.kind_of("B0"), Some(OpKind::Reverse));
        assert_eq!(helper.kind_of("x9"), Some(OpKind::SliceFrom));
        assert_eq!(helper.kind_of("yG"), Some(OpKind::SwapWithIndex));
        assert_eq!(helper.kind_of("nope"), None);
    }
}
