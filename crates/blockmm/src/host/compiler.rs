//! Structural front end for OpenCL C kernels run on the host.
//!
//! The host device does not generate code from the source; it executes the
//! blocked kernel natively. It checks what a real OpenCL compiler would
//! reject (comment and bracket structure, the `BLOCK_SIZE` constant, the
//! entry point and its parameter count, the element type) and then requires
//! the entry point to be token-for-token the shipped kernel of that element
//! type, since no other body can be executed faithfully.

use std::fmt::Write as _;

use blockmm_types::Precision;

use crate::device::KernelDialect;
use crate::kernel_source::{block_size_define_value, KernelSource};

/// Parameters of the `matmult` entry point.
const ENTRY_PARAMS: usize = 10;

/// A kernel the host device accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProgram {
    pub entry: String,
    pub precision: Precision,
    pub block_size: usize,
}

#[derive(Debug)]
struct Diagnostic {
    line: usize,
    col: usize,
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    line: usize,
    col: usize,
}

/// Compile `source`. On failure returns the build log, one
/// `kernel:LINE:COL: error: MESSAGE` line per diagnostic.
pub fn compile(source: &str, entry: &str, supports_double: bool) -> Result<HostProgram, String> {
    let mut diags = Vec::new();
    let code = blank_comments(source, &mut diags);
    let tokens = tokenize(&code);

    check_brackets(&tokens, &mut diags);
    let block_size = find_block_size(&code, &mut diags);
    let precision = find_entry(&tokens, entry, &mut diags).and_then(|(tok, params)| {
        if params.len() != ENTRY_PARAMS {
            diags.push(Diagnostic {
                line: tok.line,
                col: tok.col,
                message: format!(
                    "kernel '{}' takes {} parameters, found {}",
                    entry,
                    ENTRY_PARAMS,
                    params.len()
                ),
            });
        }
        element_type(tok, params.first().map(Vec::as_slice).unwrap_or(&[]), &mut diags)
    });

    if let Some(Precision::Double) = precision {
        if !supports_double {
            diags.push(Diagnostic {
                line: 1,
                col: 1,
                message: "double precision is not supported by this device".to_string(),
            });
        } else if !code.contains("cl_khr_fp64") {
            diags.push(Diagnostic {
                line: 1,
                col: 1,
                message: "use of type 'double' requires cl_khr_fp64 to be enabled".to_string(),
            });
        }
    }

    if let (true, Some(precision)) = (diags.is_empty(), precision) {
        check_matches_builtin(&tokens, entry, precision, &mut diags);
    }

    match (diags.is_empty(), block_size, precision) {
        (true, Some(block_size), Some(precision)) => Ok(HostProgram {
            entry: entry.to_string(),
            precision,
            block_size,
        }),
        _ => Err(render_log(&mut diags)),
    }
}

fn render_log(diags: &mut [Diagnostic]) -> String {
    diags.sort_by_key(|d| (d.line, d.col));
    let mut log = String::new();
    for d in diags.iter() {
        let _ = writeln!(log, "kernel:{}:{}: error: {}", d.line, d.col, d.message);
    }
    let _ = write!(log, "{} error(s) generated.", diags.len());
    log
}

/// Replace comment bytes with spaces, keeping newlines so positions survive.
fn blank_comments(source: &str, diags: &mut Vec<Diagnostic>) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let (mut line, mut col) = (1, 1);

    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                out.push(' ');
                i += 1;
                col += 1;
            }
            continue;
        }
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let (start_line, start_col) = (line, col);
            out.push_str("  ");
            i += 2;
            col += 2;
            let mut closed = false;
            while i < bytes.len() {
                if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    out.push_str("  ");
                    i += 2;
                    col += 2;
                    closed = true;
                    break;
                }
                if bytes[i] == b'\n' {
                    out.push('\n');
                    line += 1;
                    col = 1;
                } else {
                    out.push(' ');
                    col += 1;
                }
                i += 1;
            }
            if !closed {
                diags.push(Diagnostic {
                    line: start_line,
                    col: start_col,
                    message: "unterminated /* comment".to_string(),
                });
            }
            continue;
        }

        // copy one full char
        let ch_len = source[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&source[i..i + ch_len]);
        if bytes[i] == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
        i += ch_len;
    }
    out
}

fn tokenize(code: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut col = 1;
    let mut chars = code.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let (tok_line, tok_col) = (line, col);
        if ch == '\n' {
            line += 1;
            col = 1;
            continue;
        }
        col += 1;
        if ch.is_whitespace() {
            continue;
        }

        let kind = if ch.is_ascii_alphabetic() || ch == '_' {
            TokenKind::Ident
        } else if ch.is_ascii_digit() {
            TokenKind::Number
        } else {
            tokens.push(Token {
                kind: TokenKind::Punct(ch),
                text: &code[start..start + ch.len_utf8()],
                line: tok_line,
                col: tok_col,
            });
            continue;
        };

        let mut end = start + ch.len_utf8();
        while let Some(&(idx, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' || (kind == TokenKind::Number && next == '.') {
                end = idx + next.len_utf8();
                col += 1;
                chars.next();
            } else {
                break;
            }
        }
        tokens.push(Token {
            kind,
            text: &code[start..end],
            line: tok_line,
            col: tok_col,
        });
    }
    tokens
}

fn check_brackets(tokens: &[Token<'_>], diags: &mut Vec<Diagnostic>) {
    let mut stack: Vec<Token<'_>> = Vec::new();
    for tok in tokens {
        let TokenKind::Punct(ch) = tok.kind else {
            continue;
        };
        match ch {
            '(' | '[' | '{' => stack.push(*tok),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some(open) if open.kind == TokenKind::Punct(expected) => {}
                    Some(open) => {
                        diags.push(Diagnostic {
                            line: tok.line,
                            col: tok.col,
                            message: format!(
                                "'{}' does not match '{}' opened at {}:{}",
                                ch, open.text, open.line, open.col
                            ),
                        });
                        return;
                    }
                    None => {
                        diags.push(Diagnostic {
                            line: tok.line,
                            col: tok.col,
                            message: format!("extraneous closing '{}'", ch),
                        });
                        return;
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.last() {
        diags.push(Diagnostic {
            line: open.line,
            col: open.col,
            message: format!("unterminated '{}'", open.text),
        });
    }
}

fn find_block_size(code: &str, diags: &mut Vec<Diagnostic>) -> Option<usize> {
    for (idx, line) in code.lines().enumerate() {
        let Some(value) = block_size_define_value(line) else {
            continue;
        };
        return match value.parse::<usize>() {
            Ok(size) if size > 0 => Some(size),
            _ => {
                diags.push(Diagnostic {
                    line: idx + 1,
                    col: 1,
                    message: format!("BLOCK_SIZE must be a positive integer constant, found '{}'", value),
                });
                None
            }
        };
    }
    diags.push(Diagnostic {
        line: 1,
        col: 1,
        message: "use of undeclared identifier 'BLOCK_SIZE'".to_string(),
    });
    None
}

type Params<'a> = Vec<Vec<Token<'a>>>;

/// Index of the `__kernel` token that starts `[__]kernel void <entry>(`.
fn entry_position(tokens: &[Token<'_>], entry: &str) -> Option<usize> {
    tokens.windows(4).position(|w| {
        matches!(w[0].text, "__kernel" | "kernel")
            && w[1].text == "void"
            && w[2].text == entry
            && w[3].kind == TokenKind::Punct('(')
    })
}

/// Locate `[__]kernel void <entry>(...)` and split its parameter list.
fn find_entry<'a>(
    tokens: &[Token<'a>],
    entry: &str,
    diags: &mut Vec<Diagnostic>,
) -> Option<(Token<'a>, Params<'a>)> {
    let Some(pos) = entry_position(tokens, entry) else {
        diags.push(Diagnostic {
            line: 1,
            col: 1,
            message: format!("no kernel named '{}'", entry),
        });
        return None;
    };

    let name = tokens[pos + 2];
    let mut params: Params<'a> = vec![Vec::new()];
    let mut depth = 0usize;
    for tok in &tokens[pos + 4..] {
        match tok.kind {
            TokenKind::Punct('(') => depth += 1,
            TokenKind::Punct(')') if depth == 0 => {
                if params.len() == 1 && params[0].is_empty() {
                    params.clear();
                }
                return Some((name, params));
            }
            TokenKind::Punct(')') => depth -= 1,
            TokenKind::Punct(',') if depth == 0 => {
                params.push(Vec::new());
                continue;
            }
            _ => {}
        }
        if let Some(last) = params.last_mut() {
            last.push(*tok);
        }
    }
    // bracket check already reported the unterminated list
    None
}

/// Tokens from the entry's opening parenthesis through the closing brace
/// of its body. Brackets must already be balanced.
fn entry_span<'t, 'a>(tokens: &'t [Token<'a>], entry: &str) -> Option<&'t [Token<'a>]> {
    let start = entry_position(tokens, entry)? + 3;
    let mut depth = 0usize;
    let mut in_body = false;
    for (offset, tok) in tokens[start..].iter().enumerate() {
        match tok.kind {
            TokenKind::Punct('{') => {
                in_body = true;
                depth += 1;
            }
            TokenKind::Punct('(') => depth += 1,
            TokenKind::Punct(')' | '}') => {
                depth = depth.saturating_sub(1);
                if in_body && depth == 0 {
                    return Some(&tokens[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn check_matches_builtin(
    tokens: &[Token<'_>],
    entry: &str,
    precision: Precision,
    diags: &mut Vec<Diagnostic>,
) {
    let builtin = KernelSource::builtin(KernelDialect::OpenClC, precision);
    let builtin_code = blank_comments(builtin.text(), &mut Vec::new());
    let builtin_tokens = tokenize(&builtin_code);
    let (Some(found), Some(expected)) = (
        entry_span(tokens, entry),
        entry_span(&builtin_tokens, entry),
    ) else {
        return;
    };

    let differs = found
        .iter()
        .zip(expected)
        .position(|(f, e)| f.text != e.text)
        .or_else(|| (found.len() != expected.len()).then(|| found.len().min(expected.len())));
    if let Some(index) = differs {
        let at = found.get(index).or(found.last());
        let (line, col) = at.map_or((1, 1), |t| (t.line, t.col));
        diags.push(Diagnostic {
            line,
            col,
            message: format!(
                "kernel '{}' differs from the built-in {}; the host device only executes the built-in kernel",
                entry,
                builtin.origin()
            ),
        });
    }
}

fn element_type(
    entry: Token<'_>,
    output_param: &[Token<'_>],
    diags: &mut Vec<Diagnostic>,
) -> Option<Precision> {
    for tok in output_param {
        match tok.text {
            "float" => return Some(Precision::Single),
            "double" => return Some(Precision::Double),
            _ => {}
        }
    }
    diags.push(Diagnostic {
        line: entry.line,
        col: entry.col,
        message: "output buffer must be '__global float*' or '__global double*'".to_string(),
    });
    None
}
