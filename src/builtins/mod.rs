pub mod io;
pub mod object;

use std::collections::HashMap;
use std::io::Write;

use crate::types::{Exception, ExceptionKind};
use crate::value::Value;

/// A native method: output sink, receiver, arguments.
pub type BuiltinFn = fn(&mut dyn Write, &Value, &[Value]) -> Result<Value, Exception>;

/// A native method with its doc string.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub func: BuiltinFn,
    pub doc: &'static str,
}

/// Method tables of the built-in classes.
pub struct Builtins {
    /// Receiverless functions (`puts`, `p`, ...).
    kernel: HashMap<&'static str, Builtin>,
    /// Methods every value answers to.
    object: HashMap<&'static str, Builtin>,
    by_class: HashMap<&'static str, HashMap<&'static str, Builtin>>,
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl Builtins {
    pub fn new() -> Self {
        let mut table = Builtins {
            kernel: HashMap::new(),
            object: HashMap::new(),
            by_class: HashMap::new(),
        };
        register_builtins(&mut table);
        table
    }

    pub fn kernel(&self, name: &str) -> Option<&Builtin> {
        self.kernel.get(name)
    }

    /// Look up `name` on the receiver's class, then on every object.
    pub fn method(&self, recv: &Value, name: &str) -> Option<&Builtin> {
        self.by_class
            .get(recv.class_name())
            .and_then(|methods| methods.get(name))
            .or_else(|| self.object.get(name))
    }

    /// Doc string for a method of `class` (or `Kernel`), for introspection.
    pub fn doc(&self, class: &str, name: &str) -> Option<&'static str> {
        let builtin = match class {
            "Kernel" => self.kernel.get(name),
            "Object" => self.object.get(name),
            other => self.by_class.get(other).and_then(|m| m.get(name)),
        };
        builtin.map(|b| b.doc)
    }
}

/// Register all builtin methods into the tables.
pub fn register_builtins(table: &mut Builtins) {
    fn reg(
        map: &mut HashMap<&'static str, Builtin>,
        name: &'static str,
        func: BuiltinFn,
        doc: &'static str,
    ) {
        map.insert(name, Builtin { func, doc });
    }

    // Kernel
    let kernel = &mut table.kernel;
    reg(kernel, "puts", io::puts, "puts(*args) -> nil  Print each argument on its own line");
    reg(kernel, "print", io::print, "print(*args) -> nil  Print arguments without newlines");
    reg(kernel, "raise", object::raise, "raise(message) -> !  Raise a RuntimeError");
    reg(kernel, "p", io::p, "p(*args) -> obj  Print the inspect form of each argument");

    // Object
    let objects = &mut table.object;
    reg(objects, "to_s", object::to_s, "to_s -> String  String form");
    reg(objects, "inspect", object::inspect, "inspect -> String  Debugging form");
    reg(objects, "class", object::class, "class -> Class  Class of the receiver");
    reg(objects, "nil?", object::is_nil, "nil? -> bool  Whether the receiver is nil");
    reg(objects, "is_a?", object::is_a, "is_a?(klass) -> bool  Whether the receiver is a klass");
    reg(objects, "frozen?", object::is_frozen, "frozen? -> bool  Immediate values are frozen");

    // Integer
    let integer = table.by_class.entry("Integer").or_default();
    reg(integer, "abs", object::int_abs, "abs -> Integer  Absolute value");
    reg(integer, "succ", object::int_succ, "succ -> Integer  Next integer");
    reg(integer, "pred", object::int_pred, "pred -> Integer  Previous integer");
    reg(integer, "zero?", object::int_is_zero, "zero? -> bool  Whether the receiver is 0");
    reg(integer, "even?", object::int_is_even, "even? -> bool  Whether the receiver is even");
    reg(integer, "odd?", object::int_is_odd, "odd? -> bool  Whether the receiver is odd");
    reg(integer, "to_i", object::identity, "to_i -> Integer  The receiver");

    // String
    let string = table.by_class.entry("String").or_default();
    reg(string, "length", object::str_length, "length -> Integer  Number of characters");
    reg(string, "size", object::str_length, "size -> Integer  Number of characters");
    reg(string, "upcase", object::str_upcase, "upcase -> String  Uppercased copy");
    reg(string, "downcase", object::str_downcase, "downcase -> String  Lowercased copy");
    reg(string, "reverse", object::str_reverse, "reverse -> String  Characters in reverse order");
    reg(string, "strip", object::str_strip, "strip -> String  Copy without surrounding whitespace");
    reg(string, "empty?", object::str_is_empty, "empty? -> bool  Whether the string has no characters");
    reg(string, "include?", object::str_include, "include?(other) -> bool  Whether other is a substring");
    reg(string, "to_i", object::str_to_i, "to_i -> Integer  Leading integer, or 0");
    reg(string, "to_sym", object::str_to_sym, "to_sym -> Symbol  Symbol with this name");

    // Regexp
    let regexp = table.by_class.entry("Regexp").or_default();
    reg(regexp, "source", object::regexp_source, "source -> String  Pattern text");

    // Class
    let class = table.by_class.entry("Class").or_default();
    reg(class, "name", object::class_name, "name -> String  Name of the class");
}

/// Fail unless exactly `expected` arguments were passed.
pub fn check_arity(args: &[Value], expected: usize) -> Result<(), Exception> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Exception::new(
            ExceptionKind::ArgumentError,
            format!(
                "wrong number of arguments (given {}, expected {})",
                args.len(),
                expected
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_table_before_object_table() {
        let table = Builtins::new();
        let mut out = Vec::new();
        let to_i = table.method(&Value::Str("42abc".into()), "to_i").unwrap();
        assert_eq!((to_i.func)(&mut out, &Value::Str("42abc".into()), &[]), Ok(Value::Int(42)));
    }

    #[test]
    fn test_object_methods_apply_everywhere() {
        let table = Builtins::new();
        assert!(table.method(&Value::Nil, "inspect").is_some());
        assert!(table.method(&Value::Int(1), "upcase").is_none());
    }

    #[test]
    fn test_docs() {
        let table = Builtins::new();
        assert!(table.doc("Kernel", "puts").unwrap().starts_with("puts"));
        assert!(table.doc("String", "length").is_some());
        assert!(table.doc("String", "nope").is_none());
    }
}
