//! Host execution of element-wise kernel bodies.
//!
//! A kernel the reference backend can run takes an input and an output
//! buffer and writes one element per work-item:
//!
//! ```c
//! size_t idx = get_global_id(0);
//! float x = input[idx];          // optional float locals
//! output[idx] = x * x + 1.0f;    // exactly one store
//! ```
//!
//! The body is lowered to an [`Expr`] tree and evaluated in `f32` once per
//! global index, so the result follows the source rather than a built-in
//! implementation. Anything outside this shape is reported as unsupported.

use super::compiler::KernelSignature;
use std::fmt;

/// Arithmetic over the work-item's input element.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f32),
    /// `input[idx]`
    Input,
    /// Value of the `n`th float local.
    Local(usize),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl Expr {
    fn eval(&self, x: f32, locals: &[f32]) -> f32 {
        match self {
            Self::Const(c) => *c,
            Self::Input => x,
            Self::Local(n) => locals[*n],
            Self::Neg(e) => -e.eval(x, locals),
            Self::Binary(op, a, b) => {
                let (a, b) = (a.eval(x, locals), b.eval(x, locals));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                }
            }
        }
    }
}

/// Why a kernel body cannot run on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsupported(pub String);

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kernel lowered for host execution.
#[derive(Debug, Clone, PartialEq)]
pub struct HostKernel {
    pub name: String,
    /// Initialisers of the float locals, in declaration order.
    locals: Vec<Expr>,
    store: Expr,
}

impl HostKernel {
    /// Lower `signature`'s body.
    pub fn lower(signature: &KernelSignature) -> Result<Self, Unsupported> {
        let [input, output] = signature.params.as_slice() else {
            return Err(Unsupported(format!(
                "kernel '{}' takes {} parameters, expected an input and an output buffer",
                signature.name,
                signature.params.len()
            )));
        };
        if signature.body.is_empty() {
            return Err(Unsupported(format!("kernel '{}' has no body", signature.name)));
        }
        let mut lowering = Lowering {
            tokens: &signature.body,
            pos: 0,
            input,
            output,
            index_vars: Vec::new(),
            local_names: Vec::new(),
            locals: Vec::new(),
            store: None,
        };
        lowering.body()?;
        let store = lowering.store.ok_or_else(|| {
            Unsupported(format!("kernel '{}' never writes {output}[idx]", signature.name))
        })?;
        Ok(Self { name: signature.name.clone(), locals: lowering.locals, store })
    }

    /// Run work-item `idx`.
    pub fn run(&self, idx: usize, input: &[f32], output: &mut [f32]) {
        let x = input[idx];
        let mut values = Vec::with_capacity(self.locals.len());
        for init in &self.locals {
            let v = init.eval(x, &values);
            values.push(v);
        }
        output[idx] = self.store.eval(x, &values);
    }
}

const INDEX_TYPES: &[&str] = &["size_t", "int", "uint", "long", "ulong", "unsigned"];

struct Lowering<'a> {
    tokens: &'a [String],
    pos: usize,
    input: &'a str,
    output: &'a str,
    index_vars: Vec<String>,
    local_names: Vec<String>,
    locals: Vec<Expr>,
    store: Option<Expr>,
}

impl<'a> Lowering<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<&'a str> {
        let t = self.tokens.get(self.pos).map(String::as_str);
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: &str) -> Result<(), Unsupported> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(Unsupported(format!("expected '{want}', found '{t}'"))),
            None => Err(Unsupported(format!("expected '{want}' before end of kernel"))),
        }
    }

    fn ident(&mut self) -> Result<String, Unsupported> {
        match self.next() {
            Some(t) if t.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') => Ok(t.to_string()),
            Some(t) => Err(Unsupported(format!("expected a name, found '{t}'"))),
            None => Err(Unsupported("expected a name before end of kernel".into())),
        }
    }

    fn body(&mut self) -> Result<(), Unsupported> {
        while let Some(t) = self.peek() {
            match t {
                ";" => self.pos += 1,
                "const" => self.pos += 1,
                "float" => self.float_local()?,
                t if INDEX_TYPES.contains(&t) => self.index_decl()?,
                t if t == self.output => self.store()?,
                other => {
                    return Err(Unsupported(format!("unsupported statement starting at '{other}'")));
                }
            }
        }
        Ok(())
    }

    fn index_decl(&mut self) -> Result<(), Unsupported> {
        while self.peek().is_some_and(|t| INDEX_TYPES.contains(&t) || t == "const") {
            self.pos += 1;
        }
        let name = self.ident()?;
        self.expect("=")?;
        self.global_id()?;
        self.expect(";")?;
        self.index_vars.push(name);
        Ok(())
    }

    fn global_id(&mut self) -> Result<(), Unsupported> {
        self.expect("get_global_id")?;
        self.expect("(")?;
        self.expect("0")?;
        self.expect(")")
    }

    fn float_local(&mut self) -> Result<(), Unsupported> {
        self.expect("float")?;
        let name = self.ident()?;
        self.expect("=")?;
        let init = self.expr()?;
        self.expect(";")?;
        self.local_names.push(name);
        self.locals.push(init);
        Ok(())
    }

    fn store(&mut self) -> Result<(), Unsupported> {
        if self.store.is_some() {
            return Err(Unsupported(format!("{} is written more than once", self.output)));
        }
        self.pos += 1;
        self.subscript()?;
        self.expect("=")?;
        let value = self.expr()?;
        self.expect(";")?;
        self.store = Some(value);
        Ok(())
    }

    /// `[idx]` or `[get_global_id(0)]`.
    fn subscript(&mut self) -> Result<(), Unsupported> {
        self.expect("[")?;
        if self.peek() == Some("get_global_id") {
            self.global_id()?;
        } else {
            let name = self.ident()?;
            if !self.index_vars.contains(&name) {
                return Err(Unsupported(format!("subscript '{name}' is not the global id")));
            }
        }
        self.expect("]")
    }

    fn expr(&mut self) -> Result<Expr, Unsupported> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek().and_then(|t| match t {
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Sub),
            _ => None,
        }) {
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.term()?));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, Unsupported> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek().and_then(|t| match t {
            "*" => Some(BinOp::Mul),
            "/" => Some(BinOp::Div),
            _ => None,
        }) {
            self.pos += 1;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, Unsupported> {
        match self.peek() {
            Some("-") => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some("+") => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, Unsupported> {
        let Some(token) = self.next().map(str::to_string) else {
            return Err(Unsupported("expression ends early".into()));
        };
        if token == "(" {
            let inner = self.expr()?;
            self.expect(")")?;
            return Ok(inner);
        }
        if token == self.input {
            self.subscript()?;
            return Ok(Expr::Input);
        }
        if let Some(n) = self.local_names.iter().position(|l| *l == token) {
            return Ok(Expr::Local(n));
        }
        if let Some(value) = parse_float(&token) {
            return Ok(Expr::Const(value));
        }
        Err(Unsupported(format!("unsupported operand '{token}'")))
    }
}

fn parse_float(token: &str) -> Option<f32> {
    if !token.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    token.trim_end_matches(['f', 'F']).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::reference::compiler::compile;

    const SQUARE: &str = include_str!("../../../resources/kernel.cl");

    fn lower(src: &str) -> Result<HostKernel, Unsupported> {
        let program = compile(src, "").unwrap();
        HostKernel::lower(&program.kernels[0])
    }

    fn apply(kernel: &HostKernel, input: &[f32]) -> Vec<f32> {
        let mut output = vec![f32::NAN; input.len()];
        for idx in 0..input.len() {
            kernel.run(idx, input, &mut output);
        }
        output
    }

    #[test]
    fn bundled_square_squares() {
        let k = lower(SQUARE).unwrap();
        assert_eq!(k.name, "square");
        assert_eq!(apply(&k, &[0.0, 3.0, 1023.0]), vec![0.0, 9.0, 1_046_529.0]);
    }

    #[test]
    fn body_decides_the_result() {
        let k = lower(
            "__kernel void square(__global const float* in, __global float* out) {\n\
             int i = get_global_id(0);\n out[i] = in[i] + 1.0f;\n}",
        )
        .unwrap();
        assert_eq!(apply(&k, &[3.0]), vec![4.0]);
    }

    #[test]
    fn precedence_parentheses_and_locals() {
        let k = lower(
            "__kernel void f(__global const float* a, __global float* b) {\n\
             const size_t g = get_global_id(0);\n\
             float x = a[g];\n float y = -(x - 1.0f) / 2;\n\
             b[g] = x + y * 4.0f;\n}",
        )
        .unwrap();
        // x = 5: y = -2, result = 5 + -8
        assert_eq!(apply(&k, &[5.0]), vec![-3.0]);
    }

    #[test]
    fn direct_global_id_subscripts() {
        let k = lower(
            "__kernel void f(__global const float* a, __global float* b) {\n\
             b[get_global_id(0)] = a[get_global_id(0)] * 2.0f;\n}",
        )
        .unwrap();
        assert_eq!(apply(&k, &[1.5]), vec![3.0]);
    }

    #[test]
    fn missing_store_is_unsupported() {
        let err = lower("__kernel void f(__global const float* a, __global float* b) { }").unwrap_err();
        assert!(err.0.contains("no body") || err.0.contains("never writes"), "{err}");
    }

    #[test]
    fn foreign_subscript_is_unsupported() {
        let err = lower(
            "__kernel void f(__global const float* a, __global float* b) {\n\
             size_t i = get_global_id(0);\n b[i] = a[0];\n}",
        )
        .unwrap_err();
        assert!(err.0.contains("'0'"), "{err}");
    }

    #[test]
    fn function_calls_are_unsupported() {
        let err = lower(
            "__kernel void f(__global const float* a, __global float* b) {\n\
             size_t i = get_global_id(0);\n b[i] = sqrt(a[i]);\n}",
        )
        .unwrap_err();
        assert!(err.0.contains("sqrt"), "{err}");
    }

    #[test]
    fn double_store_is_unsupported() {
        let err = lower(
            "__kernel void f(__global const float* a, __global float* b) {\n\
             size_t i = get_global_id(0);\n b[i] = a[i];\n b[i] = 0.0f;\n}",
        )
        .unwrap_err();
        assert!(err.0.contains("more than once"), "{err}");
    }

    #[test]
    fn wrong_arity_is_unsupported() {
        let err = lower("__kernel void square(__global float* a) { }").unwrap_err();
        assert!(err.0.contains("1 parameters"), "{err}");
    }
}
