//! Kernel declaration scanner.
//!
//! A declaration starts on a line whose first token is [`KERNEL_MARKER`] and may span
//! several lines. Lines are accumulated while counting `(` against `)`; the declaration
//! is complete once at least one `(` has been seen and the count is back to zero.
//!
//! ```c
//! KERNLINK_KERNEL void add_forward_kernel(const int n,
//!                                         IN a, IN b,
//!                                         OUT out) { ... }
//! ```
//!
//! Only the head and the first parenthesized list are interpreted. Everything else,
//! including kernel bodies, is left to the native compiler.

use std::collections::HashSet;
use std::str::FromStr;

use kernlink_dtype::{ParamType, ReturnType};
use snafu::OptionExt;

use crate::error::{MalformedDeclarationSnafu, MissingSuffixSnafu, Result, UnsupportedTypeSnafu};
use crate::{KERNEL_MARKER, KERNEL_SUFFIX, KernelDeclaration, Parameter, ScanOutput};

/// Qualifiers dropped from types before they are matched against the supported set.
const TYPE_QUALIFIERS: &[&str] = &["const"];

/// Qualifiers allowed ahead of the return type.
const HEAD_QUALIFIERS: &[&str] = &["const", "static", "inline"];

/// Scan native source text for kernel declarations.
pub fn scan(source: &str) -> Result<ScanOutput> {
    let mut out = ScanOutput::default();
    let mut seen = HashSet::new();
    let mut pending: Option<PendingDeclaration> = None;

    for (idx, line) in source.lines().enumerate() {
        if pending.is_none() && !is_marker_line(line) {
            out.passthrough.push_str(line);
            out.passthrough.push('\n');
            continue;
        }

        let decl = pending.get_or_insert_with(|| PendingDeclaration::new(idx + 1));
        decl.push(line)?;

        if decl.is_complete()
            && let Some(done) = pending.take()
        {
            let parsed = parse_declaration(&done.text, done.start)?;
            if !seen.insert(parsed.name.clone()) {
                return MalformedDeclarationSnafu {
                    line: parsed.line,
                    reason: format!("kernel `{}` is declared more than once", parsed.kernel_name),
                }
                .fail();
            }
            tracing::debug!(
                kernel.name = %parsed.kernel_name,
                kernel.line = parsed.line,
                signature = %parsed.signature(),
                "scanned kernel declaration"
            );
            out.declarations.push(parsed);
        }
    }

    if let Some(open) = pending {
        let reason = if open.opened {
            format!("unterminated declaration, {} unmatched `(` at end of input", open.depth)
        } else {
            "declaration has no parameter list".to_string()
        };
        return MalformedDeclarationSnafu { line: open.start, reason }.fail();
    }

    Ok(out)
}

/// True when the first token of `line` is the declaration marker.
fn is_marker_line(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(KERNEL_MARKER)
        .is_some_and(|rest| !rest.starts_with(|c: char| c == '_' || c.is_ascii_alphanumeric()))
}

/// Declaration text collected so far.
struct PendingDeclaration {
    start: usize,
    text: String,
    depth: i64,
    opened: bool,
}

impl PendingDeclaration {
    fn new(start: usize) -> Self {
        Self { start, text: String::new(), depth: 0, opened: false }
    }

    fn push(&mut self, line: &str) -> Result<()> {
        for c in line.chars() {
            match c {
                '(' => {
                    self.depth += 1;
                    self.opened = true;
                }
                ')' => self.depth -= 1,
                _ => {}
            }
            if self.depth < 0 {
                return MalformedDeclarationSnafu { line: self.start, reason: "unbalanced `)`" }.fail();
            }
        }
        self.text.push_str(line);
        self.text.push('\n');
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.opened && self.depth == 0
    }
}

fn parse_declaration(text: &str, line: usize) -> Result<KernelDeclaration> {
    let body = text.trim_start().strip_prefix(KERNEL_MARKER).unwrap_or(text);
    let malformed = |reason: &str| MalformedDeclarationSnafu { line, reason }.build();

    let open = body.find('(').ok_or_else(|| malformed("missing parameter list"))?;
    let close = matching_paren(body, open)
        .context(MalformedDeclarationSnafu { line, reason: "unterminated parameter list" })?;

    let mut head: Vec<&str> = body[..open].split_whitespace().collect();
    let kernel_name = head.pop().ok_or_else(|| malformed("missing kernel name"))?;
    if !is_identifier(kernel_name) {
        return Err(malformed(&format!("invalid kernel name `{kernel_name}`")));
    }

    let name = kernel_name
        .strip_suffix(KERNEL_SUFFIX)
        .filter(|n| !n.is_empty())
        .context(MissingSuffixSnafu { line, name: kernel_name, suffix: KERNEL_SUFFIX })?;

    let return_type = parse_return_type(&head, line)?;
    let parameters = parse_parameter_list(&body[open + 1..close], line)?;
    if parameters.is_empty() {
        return Err(malformed(&format!(
            "kernel `{kernel_name}` declares no parameters; the first parameter sizes the dispatch"
        )));
    }

    Ok(KernelDeclaration {
        name: name.to_string(),
        kernel_name: kernel_name.to_string(),
        parameters,
        return_type,
        line,
    })
}

/// Byte index of the `)` matching the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_return_type(head: &[&str], line: usize) -> Result<ReturnType> {
    let tokens: Vec<&str> = head.iter().copied().filter(|t| !HEAD_QUALIFIERS.contains(t)).collect();
    if tokens.is_empty() {
        return Ok(ReturnType::Void);
    }
    let ty = tokens.join(" ");
    ReturnType::from_str(&ty).ok().context(UnsupportedTypeSnafu { line, ty })
}

fn parse_parameter_list(list: &str, line: usize) -> Result<Vec<Parameter>> {
    let trimmed = list.trim();
    if trimmed.is_empty() || trimmed == "void" {
        return Ok(Vec::new());
    }
    split_top_level(list).into_iter().map(|entry| parse_parameter(entry, line)).collect()
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(list: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                entries.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&list[start..]);
    entries
}

fn parse_parameter(entry: &str, line: usize) -> Result<Parameter> {
    let mut tokens: Vec<&str> = entry.split_whitespace().collect();
    let name = tokens.pop().context(MalformedDeclarationSnafu { line, reason: "empty parameter" })?;

    let ty_tokens: Vec<&str> = tokens.into_iter().filter(|t| !TYPE_QUALIFIERS.contains(t)).collect();
    if ty_tokens.is_empty() {
        return MalformedDeclarationSnafu { line, reason: format!("parameter `{name}` has no type") }.fail();
    }

    let ty = ty_tokens.join(" ");
    let ty = ParamType::from_str(&ty).ok().context(UnsupportedTypeSnafu { line, ty })?;

    if !is_identifier(name) {
        return MalformedDeclarationSnafu { line, reason: format!("invalid parameter name `{name}`") }.fail();
    }

    Ok(Parameter::new(ty, name))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
