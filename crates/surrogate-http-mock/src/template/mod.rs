//! Response body/header templating.
//!
//! A small interpreter over `{{ … }}` expressions evaluated against the
//! request: dotted variable access (`request.method`, `request.query.<n>`,
//! …), value-producing helpers (see [`helpers`]), and `#if`/`#unless`
//! conditional blocks with an optional `{{else}}` branch.
//!
//! Two inputs are hard validation errors: a conditional block with no
//! condition argument, and a block that is never closed. Everything else
//! degrades — unknown helpers, bad arguments, and missing variables render
//! as empty output.
//!
//! # Triple-brace ambiguity
//!
//! In a template like `{"num":{{randomInt 1 100}}}` the closing `}}}` is
//! indistinguishable from an unescaped-output block close to a naive
//! scanner. [`render`] pre-scans the template, shields the literal trailing
//! brace behind a private-use sentinel before parsing, and restores it
//! verbatim in the output.

pub mod helpers;

use crate::context::RequestContext;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Sentinel protecting a literal `}` that directly follows an expression
/// close. Private-use codepoint, never expected in real templates.
const CLOSE_BRACE_SENTINEL: char = '\u{f8ff}';

/// Error types for template validation.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("block helper '{0}' requires a condition argument")]
    MissingBlockArgument(String),
    #[error("block helper '{0}' is never closed")]
    UnclosedBlock(String),
}

/// Structured request view the interpreter resolves variables against.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    root: Value,
}

impl TemplateContext {
    /// Build the context tree for one request.
    pub fn from_request(ctx: &RequestContext, path_params: &HashMap<String, String>) -> Self {
        let root = json!({
            "request": {
                "method": ctx.method,
                "path": ctx.path,
                "body": ctx.body.clone().unwrap_or_default(),
                "headers": ctx.headers,
                "query": ctx.query,
                "pathParams": path_params,
            }
        });
        Self { root }
    }

    /// Walk a dotted path into the context tree. Map keys fall back to a
    /// case-insensitive scan so header names resolve naturally.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for part in path.split('.') {
            if part.is_empty() {
                return None;
            }
            current = match current {
                Value::Object(map) => map.get(part).or_else(|| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(part))
                        .map(|(_, v)| v)
                })?,
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i))?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Render a template against a request context.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let shielded = shield_literal_close_braces(template);
    let mut pos = 0;
    let (rendered, _) = render_section(&shielded, &mut pos, ctx, None)?;
    Ok(rendered.replace(CLOSE_BRACE_SENTINEL, "}"))
}

/// Does a string contain template syntax at all? Cheap pre-check for
/// callers that want to skip rendering entirely.
pub fn has_template_syntax(s: &str) -> bool {
    s.contains("{{")
}

// ============================================================================
// Pre-scan
// ============================================================================

/// Shield every literal `}` that directly follows an expression close so
/// the parser never confuses it with a triple-brace close. Restored by
/// [`render`] after evaluation.
fn shield_literal_close_braces(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len() + 8);
    let mut pos = 0;

    while let Some(found) = input[pos..].find("{{") {
        let open = pos + found;
        out.push_str(&input[pos..open]);

        if input[open..].starts_with("{{{") {
            match input[open + 3..].find("}}}") {
                Some(found_close) => {
                    let end = open + 3 + found_close + 3;
                    out.push_str(&input[open..end]);
                    pos = end;
                }
                None => {
                    out.push_str(&input[open..]);
                    return out;
                }
            }
        } else {
            match input[open + 2..].find("}}") {
                Some(found_close) => {
                    let end = open + 2 + found_close + 2;
                    out.push_str(&input[open..end]);
                    pos = end;
                    if bytes.get(pos) == Some(&b'}') {
                        out.push(CLOSE_BRACE_SENTINEL);
                        pos += 1;
                    }
                }
                None => {
                    out.push_str(&input[open..]);
                    return out;
                }
            }
        }
    }
    out.push_str(&input[pos..]);
    out
}

// ============================================================================
// Interpreter
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum SectionEnd {
    Eof,
    Else,
    Close,
}

/// Render until end of input or until the enclosing block's `{{else}}` /
/// `{{/name}}` tag. `pos` is left after the consumed tag.
fn render_section(
    input: &str,
    pos: &mut usize,
    ctx: &TemplateContext,
    enclosing: Option<&str>,
) -> Result<(String, SectionEnd), TemplateError> {
    let mut out = String::new();

    loop {
        let Some(found) = input[*pos..].find("{{") else {
            out.push_str(&input[*pos..]);
            *pos = input.len();
            return match enclosing {
                Some(name) => Err(TemplateError::UnclosedBlock(name.to_string())),
                None => Ok((out, SectionEnd::Eof)),
            };
        };
        let open = *pos + found;
        out.push_str(&input[*pos..open]);

        if input[open..].starts_with("{{{") {
            // Unescaped-output form; evaluation is identical, only the
            // delimiters differ.
            let Some(found_close) = input[open + 3..].find("}}}") else {
                out.push_str(&input[open..]);
                *pos = input.len();
                return match enclosing {
                    Some(name) => Err(TemplateError::UnclosedBlock(name.to_string())),
                    None => Ok((out, SectionEnd::Eof)),
                };
            };
            let inner = &input[open + 3..open + 3 + found_close];
            out.push_str(&eval_expression(inner.trim(), ctx));
            *pos = open + 3 + found_close + 3;
            continue;
        }

        let Some(found_close) = input[open + 2..].find("}}") else {
            out.push_str(&input[open..]);
            *pos = input.len();
            return match enclosing {
                Some(name) => Err(TemplateError::UnclosedBlock(name.to_string())),
                None => Ok((out, SectionEnd::Eof)),
            };
        };
        let inner = input[open + 2..open + 2 + found_close].trim();
        *pos = open + 2 + found_close + 2;

        if let Some(block) = inner.strip_prefix('#') {
            out.push_str(&render_block(input, pos, ctx, block)?);
        } else if inner == "else" {
            if enclosing.is_some() {
                return Ok((out, SectionEnd::Else));
            }
            // Stray else outside any block: drop it.
        } else if inner.starts_with('/') {
            if enclosing.is_some() {
                return Ok((out, SectionEnd::Close));
            }
            // Stray close tag outside any block: drop it.
        } else {
            out.push_str(&eval_expression(inner, ctx));
        }
    }
}

/// Parse and evaluate a `{{#name arg}} … {{/name}}` block whose opening tag
/// was just consumed.
fn render_block(
    input: &str,
    pos: &mut usize,
    ctx: &TemplateContext,
    header: &str,
) -> Result<String, TemplateError> {
    let name = header.split_whitespace().next().unwrap_or("");
    let condition = header[name.len()..].trim();

    let conditional = matches!(name, "if" | "unless");
    if conditional && condition.is_empty() {
        return Err(TemplateError::MissingBlockArgument(name.to_string()));
    }

    let (then_branch, end) = render_section(input, pos, ctx, Some(name))?;
    let else_branch = if end == SectionEnd::Else {
        let (rendered, _) = render_section(input, pos, ctx, Some(name))?;
        rendered
    } else {
        String::new()
    };

    if !conditional {
        // Unknown structural helper: consume the block, render nothing.
        return Ok(String::new());
    }

    let holds = is_truthy(&resolve_condition(condition, ctx));
    let wanted = if name == "if" { holds } else { !holds };
    Ok(if wanted { then_branch } else { else_branch })
}

fn resolve_condition(condition: &str, ctx: &TemplateContext) -> String {
    match split_args(condition).into_iter().next() {
        Some(arg) => resolve_arg(&arg, ctx),
        None => String::new(),
    }
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "false" && value != "0"
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone)]
struct Arg {
    value: String,
    quoted: bool,
}

/// Split an expression into arguments. Double quotes group words and are
/// stripped; `\"` escapes a quote inside a quoted argument.
fn split_args(input: &str) -> Vec<Arg> {
    let mut args = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut value = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    c => value.push(c),
                }
            }
            args.push(Arg {
                value,
                quoted: true,
            });
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
            args.push(Arg {
                value,
                quoted: false,
            });
        }
    }
    args
}

/// An unquoted argument is a variable reference when it points into the
/// request tree, otherwise it is taken literally. Missing variables resolve
/// to empty.
fn resolve_arg(arg: &Arg, ctx: &TemplateContext) -> String {
    if arg.quoted {
        return arg.value.clone();
    }
    if arg.value == "request" || arg.value.starts_with("request.") {
        return ctx
            .lookup(&arg.value)
            .map(value_to_display)
            .unwrap_or_default();
    }
    arg.value.clone()
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Evaluate one `{{ … }}` expression. Unknown helpers and malformed
/// arguments render as empty output.
fn eval_expression(inner: &str, ctx: &TemplateContext) -> String {
    let args = split_args(inner);
    let Some(head) = args.first() else {
        return String::new();
    };
    if head.quoted {
        return head.value.clone();
    }

    match head.value.as_str() {
        "uuid" => helpers::uuid(),
        "now" => helpers::now(args.get(1).map(|a| resolve_arg(a, ctx)).as_deref()),
        "jsonPath" => match (args.get(1), args.get(2)) {
            (Some(source), Some(path)) => {
                helpers::json_path(&resolve_arg(source, ctx), &resolve_arg(path, ctx))
            }
            _ => String::new(),
        },
        "randomInt" => match (args.get(1), args.get(2)) {
            (Some(low), Some(high)) => {
                helpers::random_int(&resolve_arg(low, ctx), &resolve_arg(high, ctx))
            }
            _ => String::new(),
        },
        "math" => match (args.get(1), args.get(2), args.get(3)) {
            (Some(lhs), Some(op), Some(rhs)) => helpers::math(
                &resolve_arg(lhs, ctx),
                &resolve_arg(op, ctx),
                &resolve_arg(rhs, ctx),
            ),
            _ => String::new(),
        },
        op @ ("eq" | "ne" | "gt" | "lt") => match (args.get(1), args.get(2)) {
            (Some(lhs), Some(rhs)) => {
                helpers::compare(op, &resolve_arg(lhs, ctx), &resolve_arg(rhs, ctx))
            }
            _ => String::new(),
        },
        "json" => args
            .get(1)
            .filter(|a| !a.quoted)
            .and_then(|a| ctx.lookup(&a.value))
            .map(|v| serde_json::to_string(v).unwrap_or_default())
            .unwrap_or_default(),
        _ if args.len() == 1 => ctx
            .lookup(&head.value)
            .map(value_to_display)
            .unwrap_or_default(),
        _ => String::new(),
    }
}
