//! Front-end checks for OpenCL C source on the reference backend.
//!
//! This is not a compiler. It strips comments, checks that delimiters
//! balance, validates build options and discovers `__kernel` entry points
//! with their parameter names and body tokens, which is everything the host
//! emulation needs to decide whether a program "builds", what it exports and
//! what each kernel computes. Diagnostics use
//! the clang-style `<program source>:LINE:COL: error: ...` layout so a
//! failed build log reads like one from a real driver.

use crate::error::codes;

const SOURCE_NAME: &str = "<program source>";

/// A `__kernel` function found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSignature {
    pub name: String,
    pub params: Vec<String>,
    pub line: usize,
    /// Tokens between the body braces; empty for a prototype.
    pub body: Vec<String>,
}

/// Successful build: exported kernels plus any warnings.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    pub kernels: Vec<KernelSignature>,
    pub log: String,
}

impl CompiledProgram {
    pub fn kernel(&self, name: &str) -> Option<&KernelSignature> {
        self.kernels.iter().find(|k| k.name == name)
    }
}

/// Failed build: status code and the complete log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub code: i32,
    pub log: String,
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    line: usize,
    col: usize,
}

/// Check `options` and `source`, returning the exported kernels.
pub fn compile(source: &str, options: &str) -> Result<CompiledProgram, BuildFailure> {
    check_options(options)?;

    let cleaned = strip_comments(source).map_err(|d| failure(vec![d]))?;
    check_delimiters(&cleaned).map_err(|d| failure(vec![d]))?;

    let tokens = tokenize(&cleaned);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let kernels = find_kernels(&tokens, &mut errors);

    if !errors.is_empty() {
        return Err(failure(errors));
    }
    if kernels.is_empty() {
        warnings.push(format!("{SOURCE_NAME}: warning: program defines no kernel functions"));
    }
    Ok(CompiledProgram { kernels, log: warnings.join("\n") })
}

fn failure(diagnostics: Vec<String>) -> BuildFailure {
    let n = diagnostics.len();
    let plural = if n == 1 { "" } else { "s" };
    let mut log = diagnostics.join("\n");
    log.push_str(&format!("\n{n} error{plural} generated."));
    BuildFailure { code: codes::BUILD_PROGRAM_FAILURE, log }
}

fn check_options(options: &str) -> Result<(), BuildFailure> {
    let mut tokens = options.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            // Options whose value may be a separate token.
            "-D" | "-I" => {
                if tokens.next().is_none() {
                    return Err(BuildFailure {
                        code: codes::INVALID_BUILD_OPTIONS,
                        log: format!("error: missing argument to '{token}'"),
                    });
                }
            }
            t if t.starts_with('-') && t.len() > 1 => {}
            t => {
                return Err(BuildFailure {
                    code: codes::INVALID_BUILD_OPTIONS,
                    log: format!("error: invalid build option '{t}'"),
                });
            }
        }
    }
    Ok(())
}

/// Replace comments and string/char literals with spaces, keeping newlines
/// so line and column numbers stay meaningful.
fn strip_comments(source: &str) -> Result<String, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let (mut line, mut col) = (1usize, 1usize);

    let advance = |c: char, line: &mut usize, col: &mut usize| {
        if c == '\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match (c, next) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    advance(chars[i], &mut line, &mut col);
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                let (start_line, start_col) = (line, col);
                out.push_str("  ");
                col += 2;
                i += 2;
                loop {
                    if i >= chars.len() {
                        return Err(format!(
                            "{SOURCE_NAME}:{start_line}:{start_col}: error: unterminated /* comment"
                        ));
                    }
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        out.push_str("  ");
                        col += 2;
                        i += 2;
                        break;
                    }
                    out.push(if chars[i] == '\n' { '\n' } else { ' ' });
                    advance(chars[i], &mut line, &mut col);
                    i += 1;
                }
            }
            ('"', _) | ('\'', _) => {
                let quote = c;
                let (start_line, start_col) = (line, col);
                out.push(' ');
                col += 1;
                i += 1;
                loop {
                    match chars.get(i).copied() {
                        None | Some('\n') => {
                            return Err(format!(
                                "{SOURCE_NAME}:{start_line}:{start_col}: error: missing terminating {quote} character"
                            ));
                        }
                        Some('\\') if chars.get(i + 1).is_some_and(|&n| n != '\n') => {
                            out.push_str("  ");
                            col += 2;
                            i += 2;
                        }
                        Some(ch) if ch == quote => {
                            out.push(' ');
                            col += 1;
                            i += 1;
                            break;
                        }
                        Some(_) => {
                            out.push(' ');
                            col += 1;
                            i += 1;
                        }
                    }
                }
            }
            _ => {
                out.push(c);
                advance(c, &mut line, &mut col);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn check_delimiters(cleaned: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize, usize)> = Vec::new();
    for (line_idx, text) in cleaned.lines().enumerate() {
        for (col_idx, c) in text.chars().enumerate() {
            let (line, col) = (line_idx + 1, col_idx + 1);
            match c {
                '(' | '{' | '[' => stack.push((c, line, col)),
                ')' | '}' | ']' => {
                    let open = match c {
                        ')' => '(',
                        '}' => '{',
                        _ => '[',
                    };
                    match stack.pop() {
                        Some((o, _, _)) if o == open => {}
                        Some((o, ol, oc)) => {
                            return Err(format!(
                                "{SOURCE_NAME}:{line}:{col}: error: expected '{}' to match '{o}' at {ol}:{oc}",
                                closing(o)
                            ));
                        }
                        None => {
                            return Err(format!(
                                "{SOURCE_NAME}:{line}:{col}: error: extraneous closing '{c}'"
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((o, ol, oc)) => Err(format!(
            "{SOURCE_NAME}:{ol}:{oc}: error: expected '{}' at end of input",
            closing(o)
        )),
        None => Ok(()),
    }
}

fn closing(open: char) -> char {
    match open {
        '(' => ')',
        '{' => '}',
        _ => ']',
    }
}

fn tokenize(cleaned: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (line_idx, text) in cleaned.lines().enumerate() {
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            let start = i;
            let starts_number = c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()));
            if starts_number {
                i = scan_number(&chars, i);
            } else if c.is_ascii_alphanumeric() || c == '_' {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
            } else {
                i += 1;
            }
            tokens.push(Token {
                text: chars[start..i].iter().collect(),
                line: line_idx + 1,
                col: start + 1,
            });
        }
    }
    tokens
}

/// End of the numeric literal starting at `i`: digits, one fraction, an
/// optional exponent and an optional `f`/`F` suffix.
fn scan_number(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut k = i + 1;
        if matches!(chars.get(k), Some('+' | '-')) {
            k += 1;
        }
        if chars.get(k).is_some_and(|c| c.is_ascii_digit()) {
            i = k;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    if matches!(chars.get(i), Some('f' | 'F')) {
        i += 1;
    }
    i
}

/// `__kernel` always qualifies; bare `kernel` only in front of a return type
/// or attribute, so it stays usable as an identifier.
fn is_kernel_qualifier(tokens: &[Token], i: usize) -> bool {
    match tokens[i].text.as_str() {
        "__kernel" => true,
        "kernel" => tokens
            .get(i + 1)
            .is_some_and(|next| next.text == "void" || next.text == "__attribute__"),
        _ => false,
    }
}

fn find_kernels(tokens: &[Token], errors: &mut Vec<String>) -> Vec<KernelSignature> {
    let mut kernels = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if !is_kernel_qualifier(tokens, i) {
            i += 1;
            continue;
        }
        let mut j = skip_attributes(tokens, i + 1);
        let (Some(ret), Some(name), Some(paren)) = (tokens.get(j), tokens.get(j + 1), tokens.get(j + 2))
        else {
            errors.push(format!(
                "{SOURCE_NAME}:{}:{}: error: expected kernel function declaration",
                tokens[i].line, tokens[i].col
            ));
            break;
        };
        if paren.text != "(" {
            errors.push(format!(
                "{SOURCE_NAME}:{}:{}: error: expected '(' after kernel name",
                paren.line, paren.col
            ));
            i = j + 1;
            continue;
        }
        if ret.text != "void" {
            errors.push(format!(
                "{SOURCE_NAME}:{}:{}: error: kernel function '{}' must have void return type",
                ret.line, ret.col, name.text
            ));
        }
        if kernels.iter().any(|k: &KernelSignature| k.name == name.text) {
            errors.push(format!(
                "{SOURCE_NAME}:{}:{}: error: redefinition of '{}'",
                name.line, name.col, name.text
            ));
        }

        j += 3;
        let (params, end) = parse_params(tokens, j);
        let (body, end) = collect_body(tokens, end);
        kernels.push(KernelSignature { name: name.text.clone(), params, line: name.line, body });
        i = end;
    }
    kernels
}

fn skip_attributes(tokens: &[Token], mut j: usize) -> usize {
    while tokens.get(j).is_some_and(|t| t.text == "__attribute__") {
        j += 1;
        let mut depth = 0usize;
        while let Some(t) = tokens.get(j) {
            j += 1;
            match t.text.as_str() {
                "(" => depth += 1,
                ")" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    j
}

/// Parameter names from just after `(` up to the matching `)`.
fn parse_params(tokens: &[Token], start: usize) -> (Vec<String>, usize) {
    let mut params = Vec::new();
    let mut current: Option<String> = None;
    let mut seen_any = false;
    let mut depth = 0usize;
    let mut j = start;
    while let Some(t) = tokens.get(j) {
        j += 1;
        match t.text.as_str() {
            "(" | "[" => depth += 1,
            ")" if depth == 0 => break,
            ")" | "]" => depth = depth.saturating_sub(1),
            "," if depth == 0 => {
                params.extend(current.take());
                seen_any = false;
            }
            text if is_identifier(text) => {
                seen_any = true;
                current = Some(text.to_string());
            }
            _ => {}
        }
    }
    if seen_any {
        params.extend(current);
    }
    // `f(void)` declares no parameters.
    if params.len() == 1 && params[0] == "void" {
        params.clear();
    }
    (params, j)
}

/// Tokens inside the `{ ... }` starting at `start`, and the index after the
/// closing brace. Delimiters are already known to balance.
fn collect_body(tokens: &[Token], start: usize) -> (Vec<String>, usize) {
    if tokens.get(start).map(|t| t.text.as_str()) != Some("{") {
        return (Vec::new(), start);
    }
    let mut body = Vec::new();
    let mut depth = 0usize;
    let mut j = start + 1;
    while let Some(t) = tokens.get(j) {
        j += 1;
        match t.text.as_str() {
            "{" => depth += 1,
            "}" if depth == 0 => break,
            "}" => depth -= 1,
            _ => {}
        }
        body.push(t.text.clone());
    }
    (body, j)
}

fn is_identifier(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}
