use std::io::Write;

use super::check_arity;
use crate::types::{Exception, ExceptionKind};
use crate::value::Value;

fn type_error(message: impl Into<String>) -> Exception {
    Exception::new(ExceptionKind::TypeError, message)
}

fn receiver_int(recv: &Value) -> Result<i64, Exception> {
    match recv {
        Value::Int(n) => Ok(*n),
        other => Err(type_error(format!("{} is not an Integer", other.class_name()))),
    }
}

fn receiver_str(recv: &Value) -> Result<&str, Exception> {
    match recv {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!("{} is not a String", other.class_name()))),
    }
}

fn overflow() -> Exception {
    Exception::new(ExceptionKind::RuntimeError, "integer overflow")
}

// Kernel

/// `raise(message)` Raise a RuntimeError.
pub fn raise(_out: &mut dyn Write, _recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    match args {
        [] => Err(Exception::new(ExceptionKind::RuntimeError, "unhandled exception")),
        [Value::Str(message)] => Err(Exception::new(ExceptionKind::RuntimeError, message.clone())),
        [_] => Err(type_error("exception class/object expected")),
        _ => Err(Exception::new(
            ExceptionKind::ArgumentError,
            format!("wrong number of arguments (given {}, expected 0..1)", args.len()),
        )),
    }
}

// Object

pub fn to_s(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Str(recv.to_string()))
}

pub fn inspect(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Str(recv.inspect()))
}

pub fn class(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Class(recv.class_name().to_string()))
}

pub fn is_nil(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Bool(matches!(recv, Value::Nil)))
}

/// Only the direct class and `Object` match; user classes have no superclass chain.
pub fn is_a(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 1)?;
    match &args[0] {
        Value::Class(name) => Ok(Value::Bool(name == recv.class_name() || name == "Object")),
        _ => Err(type_error("class or module required")),
    }
}

pub fn is_frozen(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Bool(matches!(
        recv,
        Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Symbol(_)
    )))
}

pub fn identity(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(recv.clone())
}

// Integer

pub fn int_abs(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    let n = receiver_int(recv)?;
    n.checked_abs().map(Value::Int).ok_or_else(overflow)
}

pub fn int_succ(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    let n = receiver_int(recv)?;
    n.checked_add(1).map(Value::Int).ok_or_else(overflow)
}

pub fn int_pred(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    let n = receiver_int(recv)?;
    n.checked_sub(1).map(Value::Int).ok_or_else(overflow)
}

pub fn int_is_zero(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Bool(receiver_int(recv)? == 0))
}

pub fn int_is_even(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Bool(receiver_int(recv)? % 2 == 0))
}

pub fn int_is_odd(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Bool(receiver_int(recv)? % 2 != 0))
}

// String

pub fn str_length(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Int(receiver_str(recv)?.chars().count() as i64))
}

pub fn str_upcase(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Str(receiver_str(recv)?.to_uppercase()))
}

pub fn str_downcase(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Str(receiver_str(recv)?.to_lowercase()))
}

pub fn str_reverse(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Str(receiver_str(recv)?.chars().rev().collect()))
}

pub fn str_strip(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Str(receiver_str(recv)?.trim().to_string()))
}

pub fn str_is_empty(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Bool(receiver_str(recv)?.is_empty()))
}

pub fn str_include(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 1)?;
    let haystack = receiver_str(recv)?;
    match &args[0] {
        Value::Str(needle) => Ok(Value::Bool(haystack.contains(needle.as_str()))),
        other => Err(type_error(format!(
            "no implicit conversion of {} into String",
            other.class_name()
        ))),
    }
}

/// Leading optional sign and digits; anything unparsable is 0.
pub fn str_to_i(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    let s = receiver_str(recv)?.trim_start();
    let sign_len = usize::from(s.starts_with(['-', '+']));
    let digits = s[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| i + sign_len);
    Ok(Value::Int(s[..digits].parse().unwrap_or(0)))
}

pub fn str_to_sym(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    Ok(Value::Symbol(receiver_str(recv)?.to_string()))
}

// Regexp

pub fn regexp_source(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    match recv {
        Value::Regex(source) => Ok(Value::Str(source.clone())),
        other => Err(type_error(format!("{} is not a Regexp", other.class_name()))),
    }
}

// Class

pub fn class_name(_out: &mut dyn Write, recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    check_arity(args, 0)?;
    match recv {
        Value::Class(name) => Ok(Value::Str(name.clone())),
        other => Err(type_error(format!("{} is not a Class", other.class_name()))),
    }
}
