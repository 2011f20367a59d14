use std::io::Write;

use crate::types::{Exception, ExceptionKind};
use crate::value::Value;

fn io_error(err: std::io::Error) -> Exception {
    Exception::new(ExceptionKind::IOError, err.to_string())
}

/// `puts(*args)` Print each argument followed by a newline unless it already ends with one.
pub fn puts(out: &mut dyn Write, _recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    if args.is_empty() {
        writeln!(out).map_err(io_error)?;
        return Ok(Value::Nil);
    }
    for arg in args {
        let text = arg.to_string();
        if text.ends_with('\n') {
            write!(out, "{}", text).map_err(io_error)?;
        } else {
            writeln!(out, "{}", text).map_err(io_error)?;
        }
    }
    Ok(Value::Nil)
}

/// `print(*args)` Print arguments back to back.
pub fn print(out: &mut dyn Write, _recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    for arg in args {
        write!(out, "{}", arg).map_err(io_error)?;
    }
    Ok(Value::Nil)
}

/// `p(*args)` Print the inspect form of each argument on its own line.
pub fn p(out: &mut dyn Write, _recv: &Value, args: &[Value]) -> Result<Value, Exception> {
    for arg in args {
        writeln!(out, "{}", arg.inspect()).map_err(io_error)?;
    }
    Ok(args.last().cloned().unwrap_or(Value::Nil))
}
