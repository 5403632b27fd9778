//! Program compiler seam
//!
//! The session manager never inspects programs; it hands source text and the
//! workspace's [`EvalContext`] to a [`Compiler`] and ships whatever bytes
//! `assemble` returns. [`SourceTextCompiler`] is the built-in implementation:
//! it checks bracket and string structure and packs the source into a framed
//! payload that device runtimes accept.

use rexec_core::{EvalContext, EvalError, SourceLocation, SourcePosition};

/// Magic prefix of an assembled program
pub const PROGRAM_MAGIC: &[u8; 4] = b"RXEC";

/// Payload format version
pub const PROGRAM_FORMAT_VERSION: u8 = 1;

/// Output of a successful compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub chapter: u8,
    pub variant: String,
    pub source: String,
}

/// Turns source text into device bytes.
///
/// `compile` returns `None` on failure and pushes the reasons into
/// `context.errors`.
#[cfg_attr(test, mockall::automock)]
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str, context: &mut EvalContext) -> Option<CompiledProgram>;

    fn assemble(&self, program: &CompiledProgram) -> Vec<u8>;
}

/// Structural checker and framer for plain source text
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceTextCompiler;

impl SourceTextCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for SourceTextCompiler {
    fn compile(&self, source: &str, context: &mut EvalContext) -> Option<CompiledProgram> {
        context.clear_errors();
        for error in check_structure(source) {
            context.push_error(error);
        }
        if context.has_errors() {
            return None;
        }
        Some(CompiledProgram {
            chapter: context.chapter,
            variant: context.variant.clone(),
            source: source.to_string(),
        })
    }

    /// Layout: magic, version, chapter, variant length (u8), variant,
    /// source length (u32 LE), source.
    fn assemble(&self, program: &CompiledProgram) -> Vec<u8> {
        let variant = truncate_to(program.variant.as_bytes(), u8::MAX as usize);
        let source = program.source.as_bytes();

        let mut bytes = Vec::with_capacity(4 + 3 + variant.len() + 4 + source.len());
        bytes.extend_from_slice(PROGRAM_MAGIC);
        bytes.push(PROGRAM_FORMAT_VERSION);
        bytes.push(program.chapter);
        bytes.push(variant.len() as u8);
        bytes.extend_from_slice(variant);
        bytes.extend_from_slice(&(source.len() as u32).to_le_bytes());
        bytes.extend_from_slice(source);
        bytes
    }
}

fn truncate_to(bytes: &[u8], max: usize) -> &[u8] {
    &bytes[..bytes.len().min(max)]
}

// ─────────────────────────────────────────────────────────────────
// Structure check
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    LineComment,
    BlockComment,
    Str(char),
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Find unbalanced brackets, unterminated strings and unterminated block
/// comments. Positions are 1-based lines and 0-based columns.
fn check_structure(source: &str) -> Vec<EvalError> {
    let mut errors = Vec::new();
    let mut open: Vec<(char, SourcePosition)> = Vec::new();
    let mut state = Scan::Code;
    let mut token_start = SourcePosition::default();

    let mut line = 1u32;
    let mut column = 0u32;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        let here = SourcePosition { line, column };

        match state {
            Scan::Code => match c {
                '/' if chars.peek() == Some(&'/') => state = Scan::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    column += 1;
                    token_start = here;
                    state = Scan::BlockComment;
                }
                '"' | '\'' | '`' => {
                    token_start = here;
                    state = Scan::Str(c);
                }
                '(' | '[' | '{' => open.push((c, here)),
                ')' | ']' | '}' => match open.pop() {
                    Some((o, _)) if closing_for(o) == c => {}
                    Some((o, at)) => {
                        errors.push(EvalError::new(
                            format!("Expected '{}' but found '{}'", closing_for(o), c),
                            SourceLocation { start: at, end: here },
                        ));
                        return errors;
                    }
                    None => {
                        errors.push(EvalError::new(
                            format!("Unexpected '{c}'"),
                            SourceLocation {
                                start: here,
                                end: here,
                            },
                        ));
                        return errors;
                    }
                },
                _ => {}
            },
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    column += 1;
                    state = Scan::Code;
                }
            }
            Scan::Str(quote) => {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        if escaped == '\n' {
                            line += 1;
                            column = 0;
                            continue;
                        }
                        column += 1;
                    }
                } else if c == quote {
                    state = Scan::Code;
                } else if c == '\n' && quote != '`' {
                    errors.push(EvalError::new(
                        "Unterminated string literal",
                        SourceLocation {
                            start: token_start,
                            end: here,
                        },
                    ));
                    return errors;
                }
            }
        }

        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }
    }

    let end = SourcePosition { line, column };
    match state {
        Scan::Str(_) => errors.push(EvalError::new(
            "Unterminated string literal",
            SourceLocation {
                start: token_start,
                end,
            },
        )),
        Scan::BlockComment => errors.push(EvalError::new(
            "Unterminated comment",
            SourceLocation {
                start: token_start,
                end,
            },
        )),
        Scan::Code | Scan::LineComment => {}
    }

    if let Some((o, at)) = open.pop() {
        errors.push(EvalError::new(
            format!("Unexpected end of input, expected '{}'", closing_for(o)),
            SourceLocation { start: at, end },
        ));
    }

    errors
}
