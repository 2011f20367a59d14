use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{BinOp, Node, Program};
use crate::builtins::Builtins;
use crate::cycle::Engine;
use crate::types::{Exception, ExceptionKind};
use crate::value::{Value, BUILTIN_CLASSES};

/// Deepest method/class nesting before `SystemStackError`.
pub const MAX_DEPTH: usize = 128;

/// Longest string `String#*` may build, in bytes.
pub const MAX_STRING_BYTES: usize = 1 << 26;

// ========== Runtime structures ==========

/// One activation: the top level, a method body or a class body.
struct Frame {
    locals: HashMap<String, Value>,
    self_value: Value,
    /// Class that receives `def`s in this frame; `None` defines top-level methods.
    def_target: Option<String>,
}

impl Frame {
    fn new(self_value: Value, def_target: Option<String>) -> Self {
        Frame {
            locals: HashMap::new(),
            self_value,
            def_target,
        }
    }
}

#[derive(Clone)]
struct MethodDef {
    params: Vec<String>,
    body: Rc<Vec<Node>>,
}

/// Non-local exits unwinding through `eval`.
enum Flow {
    Raise(Exception),
    Return(Value),
    Break(Value),
    Next,
}

impl From<Exception> for Flow {
    fn from(exception: Exception) -> Self {
        Flow::Raise(exception)
    }
}

type EvalResult = Result<Value, Flow>;

fn error(kind: ExceptionKind, message: impl Into<String>) -> Flow {
    Flow::Raise(Exception::new(kind, message))
}

/// Tree-walking interpreter whose top-level scope persists across `execute` calls.
pub struct Interpreter<W: Write = io::Stdout> {
    out: W,
    /// `frames[0]` is the top level.
    frames: Vec<Frame>,
    /// Methods defined at the top level, callable without a receiver.
    functions: HashMap<String, MethodDef>,
    /// User-defined methods, by class name. Builtin classes can be reopened.
    classes: HashMap<String, HashMap<String, MethodDef>>,
    exception: Option<Exception>,
    builtins: Builtins,
    next_id: u64,
}

impl<W: Write> Interpreter<W> {
    pub fn new(out: W) -> Self {
        Interpreter {
            out,
            frames: vec![Frame::new(Value::Main, None)],
            functions: HashMap::new(),
            classes: HashMap::new(),
            exception: None,
            builtins: Builtins::new(),
            next_id: 1,
        }
    }

    /// Everything written so far.
    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Value of a top-level local variable.
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.frames[0].locals.get(name)
    }

    /// Top-level locals, top-level methods and user classes.
    pub fn defined_names(&self) -> impl Iterator<Item = String> + '_ {
        self.frames[0]
            .locals
            .keys()
            .chain(self.functions.keys())
            .chain(self.classes.keys())
            .cloned()
    }

    fn frame(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn current_self(&self) -> Value {
        self.frames
            .last()
            .map_or(Value::Main, |frame| frame.self_value.clone())
    }

    // ========== Statements ==========

    fn eval_body(&mut self, body: &[Node]) -> EvalResult {
        let mut last = Value::Nil;
        for node in body {
            last = self.eval(node)?;
        }
        Ok(last)
    }

    fn eval(&mut self, node: &Node) -> EvalResult {
        match node {
            Node::Int(n) => Ok(Value::Int(*n)),
            Node::Str(s) => Ok(Value::Str(s.clone())),
            Node::Regex(source) => Ok(Value::Regex(source.clone())),
            Node::Nil => Ok(Value::Nil),
            Node::True => Ok(Value::Bool(true)),
            Node::False => Ok(Value::Bool(false)),
            Node::SelfRef => Ok(self.current_self()),
            Node::Ident(name) => {
                if let Some(value) = self.frame().locals.get(name) {
                    return Ok(value.clone());
                }
                self.call_function(name, Vec::new(), true)
            }
            Node::Const(name) => self.constant(name),
            Node::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.frame().locals.insert(name.clone(), value.clone());
                Ok(value)
            }
            Node::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Ok(binary_op(*op, lhs, rhs)?)
            }
            Node::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() {
                    self.eval(rhs)
                } else {
                    Ok(lhs)
                }
            }
            Node::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.truthy() {
                    Ok(lhs)
                } else {
                    self.eval(rhs)
                }
            }
            Node::Not(expr) => Ok(Value::Bool(!self.eval(expr)?.truthy())),
            Node::Neg(expr) => match self.eval(expr)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| error(ExceptionKind::RuntimeError, "integer overflow")),
                other => Err(undefined_method("-@", &other)),
            },
            Node::Call { recv, name, args } => {
                let recv = match recv {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                match recv {
                    Some(recv) => self.call_method(recv, name, values),
                    None => self.call_function(name, values, false),
                }
            }
            Node::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval_body(then_body)
                } else {
                    self.eval_body(else_body)
                }
            }
            Node::While { cond, body, negate } => {
                while self.eval(cond)?.truthy() != *negate {
                    match self.eval_body(body) {
                        Ok(_) | Err(Flow::Next) => {}
                        Err(Flow::Break(value)) => return Ok(value),
                        Err(other) => return Err(other),
                    }
                }
                Ok(Value::Nil)
            }
            Node::Def { name, params, body } => {
                let method = MethodDef {
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                };
                match self.frame().def_target.clone() {
                    Some(class) => {
                        debug!(class = %class, method = %name, "define method");
                        self.classes
                            .entry(class)
                            .or_default()
                            .insert(name.clone(), method);
                    }
                    None => {
                        debug!(method = %name, "define function");
                        self.functions.insert(name.clone(), method);
                    }
                }
                Ok(Value::Symbol(name.clone()))
            }
            Node::Class { name, body } => {
                self.classes.entry(name.clone()).or_default();
                let frame = Frame::new(Value::Class(name.clone()), Some(name.clone()));
                self.with_frame(frame, |interp| interp.eval_body(body))
            }
            Node::Return(expr) => Err(Flow::Return(self.eval_opt(expr.as_deref())?)),
            Node::Break(expr) => Err(Flow::Break(self.eval_opt(expr.as_deref())?)),
            Node::Next(expr) => {
                self.eval_opt(expr.as_deref())?;
                Err(Flow::Next)
            }
        }
    }

    fn eval_opt(&mut self, expr: Option<&Node>) -> EvalResult {
        match expr {
            Some(node) => self.eval(node),
            None => Ok(Value::Nil),
        }
    }

    fn constant(&self, name: &str) -> EvalResult {
        if self.classes.contains_key(name) || BUILTIN_CLASSES.contains(&name) {
            Ok(Value::Class(name.to_string()))
        } else {
            Err(error(
                ExceptionKind::NameError,
                format!("uninitialized constant {}", name),
            ))
        }
    }

    /// Run `f` inside `frame`, popping it again however `f` exits.
    fn with_frame(&mut self, frame: Frame, f: impl FnOnce(&mut Self) -> EvalResult) -> EvalResult {
        if self.frames.len() >= MAX_DEPTH {
            return Err(error(ExceptionKind::SystemStackError, "stack level too deep"));
        }
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }

    // ========== Calls ==========

    /// A call with no explicit receiver.
    ///
    /// `bare` is set for a lone identifier that is not a known local.
    fn call_function(&mut self, name: &str, args: Vec<Value>, bare: bool) -> EvalResult {
        let receiver = self.current_self();
        if let Some(method) = self.user_method(&receiver, name) {
            return self.invoke(receiver, name, method, args);
        }
        if let Some(method) = self.functions.get(name).cloned() {
            return self.invoke(receiver, name, method, args);
        }
        if let Some(builtin) = self.builtins.kernel(name).copied() {
            trace!(function = name, "kernel call");
            return Ok((builtin.func)(&mut self.out, &receiver, &args)?);
        }
        if let Some(builtin) = self.builtins.method(&receiver, name).copied() {
            return Ok((builtin.func)(&mut self.out, &receiver, &args)?);
        }
        if bare {
            Err(error(
                ExceptionKind::NameError,
                format!(
                    "undefined local variable or method '{}' for {}",
                    name,
                    receiver.inspect()
                ),
            ))
        } else {
            Err(undefined_method(name, &receiver))
        }
    }

    /// A call with an explicit receiver. Top-level functions are private and not found here.
    fn call_method(&mut self, recv: Value, name: &str, args: Vec<Value>) -> EvalResult {
        if name == "new" {
            if let Value::Class(class) = &recv {
                if self.classes.contains_key(class) || class == "Object" {
                    return self.instantiate(class.clone(), args);
                }
            }
        }
        if let Some(method) = self.user_method(&recv, name) {
            return self.invoke(recv, name, method, args);
        }
        match self.builtins.method(&recv, name).copied() {
            Some(builtin) => {
                trace!(class = recv.class_name(), method = name, "builtin call");
                Ok((builtin.func)(&mut self.out, &recv, &args)?)
            }
            None => Err(undefined_method(name, &recv)),
        }
    }

    fn user_method(&self, recv: &Value, name: &str) -> Option<MethodDef> {
        self.classes
            .get(recv.class_name())
            .and_then(|methods| methods.get(name))
            .cloned()
    }

    fn instantiate(&mut self, class: String, args: Vec<Value>) -> EvalResult {
        let object = Value::Object {
            class,
            id: self.next_id,
        };
        self.next_id += 1;
        match self.user_method(&object, "initialize") {
            Some(init) => {
                self.invoke(object.clone(), "initialize", init, args)?;
            }
            None if !args.is_empty() => {
                return Err(error(
                    ExceptionKind::ArgumentError,
                    format!("wrong number of arguments (given {}, expected 0)", args.len()),
                ));
            }
            None => {}
        }
        Ok(object)
    }

    fn invoke(&mut self, recv: Value, name: &str, method: MethodDef, args: Vec<Value>) -> EvalResult {
        if args.len() != method.params.len() {
            return Err(error(
                ExceptionKind::ArgumentError,
                format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    method.params.len()
                ),
            ));
        }
        trace!(method = name, depth = self.frames.len(), "invoke");

        let def_target = match &recv {
            Value::Main => None,
            other => Some(other.class_name().to_string()),
        };
        let mut frame = Frame::new(recv, def_target);
        frame.locals = method.params.iter().cloned().zip(args).collect();

        let body = method.body;
        match self.with_frame(frame, |interp| interp.eval_body(&body)) {
            Err(Flow::Return(value)) => Ok(value),
            Err(Flow::Break(_)) => Err(error(ExceptionKind::LocalJumpError, "break from proc-closure")),
            Err(Flow::Next) => Err(error(ExceptionKind::LocalJumpError, "unexpected next")),
            other => other,
        }
    }
}

fn undefined_method(name: &str, recv: &Value) -> Flow {
    error(
        ExceptionKind::NoMethodError,
        format!("undefined method '{}' for {}", name, recv.inspect()),
    )
}

// ========== Operators ==========

fn binary_op(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, Exception> {
    match (op, &lhs, &rhs) {
        (BinOp::Eq, _, _) => Ok(Value::Bool(lhs == rhs)),
        (BinOp::NotEq, _, _) => Ok(Value::Bool(lhs != rhs)),
        (_, Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (BinOp::Add | BinOp::Shl, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinOp::Mul, Value::Str(s), Value::Int(n)) => repeat_str(s, *n),
        (BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq, Value::Str(a), Value::Str(b)) => {
            Ok(Value::Bool(compare(op, a.cmp(b))))
        }
        (BinOp::Add | BinOp::Shl, Value::Str(_), other) => Err(Exception::new(
            ExceptionKind::TypeError,
            format!("no implicit conversion of {} into String", type_label(other)),
        )),
        (BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq, Value::Int(_) | Value::Str(_), other) => {
            Err(Exception::new(
                ExceptionKind::ArgumentError,
                format!("comparison of {} with {} failed", lhs.class_name(), type_label(other)),
            ))
        }
        (_, Value::Int(_), other) => Err(Exception::new(
            ExceptionKind::TypeError,
            format!("{} can't be coerced into Integer", type_label(other)),
        )),
        _ => Err(Exception::new(
            ExceptionKind::NoMethodError,
            format!("undefined method '{}' for {}", op.as_str(), lhs.inspect()),
        )),
    }
}

fn repeat_str(s: &str, times: i64) -> Result<Value, Exception> {
    if times < 0 {
        return Err(Exception::new(ExceptionKind::ArgumentError, "negative argument"));
    }
    let count = usize::try_from(times).ok();
    match count.and_then(|c| s.len().checked_mul(c).map(|bytes| (c, bytes))) {
        Some((c, bytes)) if bytes <= MAX_STRING_BYTES => Ok(Value::Str(s.repeat(c))),
        _ => Err(Exception::new(ExceptionKind::ArgumentError, "argument too big")),
    }
}

/// Class name, except `nil` which reads as itself.
fn type_label(value: &Value) -> &str {
    match value {
        Value::Nil => "nil",
        other => other.class_name(),
    }
}

fn compare(op: BinOp, ordering: std::cmp::Ordering) -> bool {
    match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::LtEq => ordering.is_le(),
        _ => ordering.is_ge(),
    }
}

/// Integer arithmetic with floored division and modulo.
fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, Exception> {
    let overflow = || Exception::new(ExceptionKind::RuntimeError, "integer overflow");
    let zero_division = || Exception::new(ExceptionKind::ZeroDivisionError, "divided by 0");
    let n = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && (a < 0) != (b < 0) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && (r < 0) != (b < 0) {
                r + b
            } else {
                r
            }
        }
        BinOp::Shl => {
            if b < 0 {
                a >> b.unsigned_abs().min(63)
            } else if b < 63 {
                a.checked_mul(1 << b).ok_or_else(overflow)?
            } else if a == 0 {
                0
            } else {
                return Err(overflow());
            }
        }
        BinOp::Lt => return Ok(Value::Bool(a < b)),
        BinOp::Gt => return Ok(Value::Bool(a > b)),
        BinOp::LtEq => return Ok(Value::Bool(a <= b)),
        BinOp::GtEq => return Ok(Value::Bool(a >= b)),
        BinOp::Eq => return Ok(Value::Bool(a == b)),
        BinOp::NotEq => return Ok(Value::Bool(a != b)),
    };
    Ok(Value::Int(n))
}

// ========== Engine ==========

impl<W: Write> Engine for Interpreter<W> {
    type Tree = Program;
    type Value = Value;

    fn execute(&mut self, tree: &Program) -> Value {
        self.exception = None;
        self.frames.truncate(1);
        match self.eval_body(tree) {
            Ok(value) | Err(Flow::Return(value)) => value,
            Err(Flow::Raise(exception)) => {
                debug!(kind = %exception.kind, "uncaught exception");
                self.exception = Some(exception);
                Value::Nil
            }
            Err(Flow::Break(_)) => {
                self.exception = Some(Exception::new(
                    ExceptionKind::LocalJumpError,
                    "break from proc-closure",
                ));
                Value::Nil
            }
            Err(Flow::Next) => {
                self.exception = Some(Exception::new(ExceptionKind::LocalJumpError, "unexpected next"));
                Value::Nil
            }
        }
    }

    fn raise(&mut self, exception: Exception) {
        self.exception = Some(exception);
    }

    fn pending_exception(&self) -> Option<&Exception> {
        self.exception.as_ref()
    }

    fn clear_exception(&mut self) -> Option<Exception> {
        self.exception.take()
    }

    fn inspect(&self, value: &Value) -> String {
        value.inspect()
    }

    fn stdout(&mut self) -> &mut dyn Write {
        &mut self.out
    }
}
