use std::fmt;

/// Runtime values of the interpreter.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Regex(String),
    Symbol(String),
    /// A class object, by name.
    Class(String),
    /// An instance of a user-defined class.
    Object { class: String, id: u64 },
    /// The top-level `self`.
    Main,
}

impl Value {
    /// Everything except `nil` and `false` is true.
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Name of the value's class.
    pub fn class_name(&self) -> &str {
        match self {
            Value::Nil => "NilClass",
            Value::Bool(true) => "TrueClass",
            Value::Bool(false) => "FalseClass",
            Value::Int(_) => "Integer",
            Value::Str(_) => "String",
            Value::Regex(_) => "Regexp",
            Value::Symbol(_) => "Symbol",
            Value::Class(_) => "Class",
            Value::Object { class, .. } => class.as_str(),
            Value::Main => "Object",
        }
    }

    /// The `inspect` representation.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Str(s) => inspect_str(s),
            Value::Regex(source) => format!("/{}/", source),
            Value::Symbol(name) => format!(":{}", name),
            Value::Object { class, .. } => format!("#<{}>", class),
            other => other.to_string(),
        }
    }
}

/// Classes that exist before any user code runs.
pub const BUILTIN_CLASSES: &[&str] = &[
    "Object",
    "NilClass",
    "TrueClass",
    "FalseClass",
    "Integer",
    "String",
    "Regexp",
    "Symbol",
    "Class",
];

/// `to_s` semantics: strings print raw, `nil` prints nothing.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::Regex(source) => write!(f, "(?-mix:{})", source),
            Value::Symbol(name) => f.write_str(name),
            Value::Class(name) => f.write_str(name),
            Value::Object { class, .. } => write!(f, "#<{}>", class),
            Value::Main => f.write_str("main"),
        }
    }
}

fn inspect_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x1b' => out.push_str("\\e"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
