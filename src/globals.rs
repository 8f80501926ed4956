// ABOUTME: Default sandbox table: core, math, string, table, and json builtins

use crate::error::{
    EvalError, ARITY_AT_LEAST_ONE, ARITY_ONE, ARITY_ONE_OR_TWO, ARITY_TWO, ARITY_TWO_OR_THREE,
};
use crate::value::{Table, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// JSON encoding refuses tables nested deeper than this, which also guards
/// against reference cycles.
const MAX_JSON_DEPTH: usize = 128;

/// Builds the default sandbox: the snapshot of host bindings used when the
/// caller does not supply one.
pub fn default_globals() -> Rc<RefCell<Table>> {
    let mut globals = Table::new();

    globals.set_str("print", Value::Builtin(builtin_print));
    globals.set_str("type", Value::Builtin(builtin_type));
    globals.set_str("tostring", Value::Builtin(builtin_tostring));
    globals.set_str("tonumber", Value::Builtin(builtin_tonumber));
    globals.set_str("assert", Value::Builtin(builtin_assert));
    globals.set_str("error", Value::Builtin(builtin_error));

    globals.set_str("math", math_table());
    globals.set_str("string", string_table());
    globals.set_str("table", table_table());
    globals.set_str("json", json_table());

    Rc::new(RefCell::new(globals))
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arg(args: &[Value], position: usize) -> Value {
    args.get(position - 1).cloned().unwrap_or(Value::Nil)
}

fn number_arg(function: &str, args: &[Value], position: usize) -> Result<f64, EvalError> {
    match arg(args, position) {
        Value::Number(n) => Ok(n),
        other => Err(EvalError::type_error(function, "number", &other, position)),
    }
}

fn string_arg(function: &str, args: &[Value], position: usize) -> Result<String, EvalError> {
    match arg(args, position) {
        Value::Str(s) => Ok(s),
        other => Err(EvalError::type_error(function, "string", &other, position)),
    }
}

fn table_arg(
    function: &str,
    args: &[Value],
    position: usize,
) -> Result<Rc<RefCell<Table>>, EvalError> {
    match arg(args, position) {
        Value::Table(t) => Ok(t),
        other => Err(EvalError::type_error(function, "table", &other, position)),
    }
}

// ============================================================================
// Core functions
// ============================================================================

fn builtin_print(args: &[Value]) -> Result<Value, EvalError> {
    let parts: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    println!("{}", parts.join("\t"));
    Ok(Value::Nil)
}

fn builtin_type(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::arity_error("type", ARITY_ONE, args.len()));
    }
    Ok(Value::Str(args[0].type_name().to_string()))
}

fn builtin_tostring(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::arity_error("tostring", ARITY_ONE, args.len()));
    }
    Ok(Value::Str(args[0].to_string()))
}

fn builtin_tonumber(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::arity_error("tonumber", ARITY_ONE, args.len()));
    }
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Str(s) => match s.trim().parse::<f64>() {
            Ok(n) => Ok(Value::Number(n)),
            Err(_) => Ok(Value::Nil),
        },
        _ => Ok(Value::Nil),
    }
}

fn builtin_assert(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(EvalError::arity_error("assert", ARITY_AT_LEAST_ONE, 0));
    }
    if args[0].is_truthy() {
        return Ok(args[0].clone());
    }
    let message = match args.get(1) {
        Some(v) => v.to_string(),
        None => "assertion failed!".to_string(),
    };
    Err(EvalError::runtime_error("assert", message))
}

fn builtin_error(args: &[Value]) -> Result<Value, EvalError> {
    let message = match args.first() {
        Some(v) => v.to_string(),
        None => "nil".to_string(),
    };
    Err(EvalError::runtime_error("error", message))
}

// ============================================================================
// math
// ============================================================================

fn math_table() -> Value {
    let mut t = Table::new();
    t.set_str("pi", Value::Number(std::f64::consts::PI));
    t.set_str("huge", Value::Number(f64::INFINITY));
    t.set_str("abs", Value::Builtin(math_abs));
    t.set_str("ceil", Value::Builtin(math_ceil));
    t.set_str("floor", Value::Builtin(math_floor));
    t.set_str("sqrt", Value::Builtin(math_sqrt));
    t.set_str("max", Value::Builtin(math_max));
    t.set_str("min", Value::Builtin(math_min));
    t.set_str("fmod", Value::Builtin(math_fmod));
    Value::table(t)
}

fn math_abs(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Number(number_arg("math.abs", args, 1)?.abs()))
}

fn math_ceil(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Number(number_arg("math.ceil", args, 1)?.ceil()))
}

fn math_floor(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Number(number_arg("math.floor", args, 1)?.floor()))
}

fn math_sqrt(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Number(number_arg("math.sqrt", args, 1)?.sqrt()))
}

fn math_max(args: &[Value]) -> Result<Value, EvalError> {
    fold_numbers("math.max", args, f64::max)
}

fn math_min(args: &[Value]) -> Result<Value, EvalError> {
    fold_numbers("math.min", args, f64::min)
}

fn fold_numbers(
    function: &str,
    args: &[Value],
    pick: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(EvalError::arity_error(function, ARITY_AT_LEAST_ONE, 0));
    }
    let mut best = number_arg(function, args, 1)?;
    for position in 2..=args.len() {
        best = pick(best, number_arg(function, args, position)?);
    }
    Ok(Value::Number(best))
}

fn math_fmod(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity_error("math.fmod", ARITY_TWO, args.len()));
    }
    let a = number_arg("math.fmod", args, 1)?;
    let b = number_arg("math.fmod", args, 2)?;
    Ok(Value::Number(a % b))
}

// ============================================================================
// string
// ============================================================================

fn string_table() -> Value {
    let mut t = Table::new();
    t.set_str("len", Value::Builtin(string_len));
    t.set_str("sub", Value::Builtin(string_sub));
    t.set_str("upper", Value::Builtin(string_upper));
    t.set_str("lower", Value::Builtin(string_lower));
    t.set_str("rep", Value::Builtin(string_rep));
    t.set_str("reverse", Value::Builtin(string_reverse));
    Value::table(t)
}

fn string_len(args: &[Value]) -> Result<Value, EvalError> {
    let s = string_arg("string.len", args, 1)?;
    Ok(Value::Number(s.chars().count() as f64))
}

/// 1-based substring with Lua-style negative indices counting from the end.
fn string_sub(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(EvalError::arity_error("string.sub", ARITY_TWO_OR_THREE, args.len()));
    }
    let s = string_arg("string.sub", args, 1)?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;

    let i = number_arg("string.sub", args, 2)? as i64;
    let j = if args.len() == 3 {
        number_arg("string.sub", args, 3)? as i64
    } else {
        -1
    };

    let from = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
    let to = if j < 0 { len + j + 1 } else { j.min(len) };

    if from > to {
        return Ok(Value::Str(String::new()));
    }
    let slice: String = chars[(from - 1) as usize..to as usize].iter().collect();
    Ok(Value::Str(slice))
}

fn string_upper(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Str(string_arg("string.upper", args, 1)?.to_uppercase()))
}

fn string_lower(args: &[Value]) -> Result<Value, EvalError> {
    Ok(Value::Str(string_arg("string.lower", args, 1)?.to_lowercase()))
}

fn string_rep(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 2 {
        return Err(EvalError::arity_error("string.rep", ARITY_TWO, args.len()));
    }
    let s = string_arg("string.rep", args, 1)?;
    let n = number_arg("string.rep", args, 2)?;
    if n <= 0.0 {
        return Ok(Value::Str(String::new()));
    }
    Ok(Value::Str(s.repeat(n as usize)))
}

fn string_reverse(args: &[Value]) -> Result<Value, EvalError> {
    let s = string_arg("string.reverse", args, 1)?;
    Ok(Value::Str(s.chars().rev().collect()))
}

// ============================================================================
// table
// ============================================================================

fn table_table() -> Value {
    let mut t = Table::new();
    t.set_str("insert", Value::Builtin(table_insert));
    t.set_str("remove", Value::Builtin(table_remove));
    t.set_str("concat", Value::Builtin(table_concat));
    Value::table(t)
}

/// `table.insert(t, value)` appends; `table.insert(t, pos, value)` shifts
/// later entries up by one.
fn table_insert(args: &[Value]) -> Result<Value, EvalError> {
    let t = table_arg("table.insert", args, 1)?;
    match args.len() {
        2 => {
            let len = t.borrow().len();
            t.borrow_mut().set_index(len + 1, args[1].clone());
            Ok(Value::Nil)
        }
        3 => {
            let pos = number_arg("table.insert", args, 2)?;
            let len = t.borrow().len();
            if pos.fract() != 0.0 || pos < 1.0 || pos as usize > len + 1 {
                return Err(EvalError::runtime_error("table.insert", "position out of bounds"));
            }
            let pos = pos as usize;
            let mut table = t.borrow_mut();
            let mut i = len;
            while i >= pos {
                let moved = table.get_index(i);
                table.set_index(i + 1, moved);
                if i == 1 {
                    break;
                }
                i -= 1;
            }
            table.set_index(pos, args[2].clone());
            Ok(Value::Nil)
        }
        n => Err(EvalError::arity_error("table.insert", ARITY_TWO_OR_THREE, n)),
    }
}

/// Removes and returns the entry at `pos` (default: the last), shifting
/// later entries down by one.
fn table_remove(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() || args.len() > 2 {
        return Err(EvalError::arity_error("table.remove", ARITY_ONE_OR_TWO, args.len()));
    }
    let t = table_arg("table.remove", args, 1)?;
    let len = t.borrow().len();
    let pos = if args.len() == 2 {
        let pos = number_arg("table.remove", args, 2)?;
        if pos.fract() != 0.0 || pos < 1.0 || pos as usize > len {
            return Err(EvalError::runtime_error("table.remove", "position out of bounds"));
        }
        pos as usize
    } else {
        if len == 0 {
            return Ok(Value::Nil);
        }
        len
    };

    let mut table = t.borrow_mut();
    let removed = table.get_index(pos);
    for i in pos..len {
        let moved = table.get_index(i + 1);
        table.set_index(i, moved);
    }
    table.set_index(len, Value::Nil);
    Ok(removed)
}

fn table_concat(args: &[Value]) -> Result<Value, EvalError> {
    if args.is_empty() || args.len() > 2 {
        return Err(EvalError::arity_error("table.concat", ARITY_ONE_OR_TWO, args.len()));
    }
    let t = table_arg("table.concat", args, 1)?;
    let sep = if args.len() == 2 {
        string_arg("table.concat", args, 2)?
    } else {
        String::new()
    };

    let table = t.borrow();
    let mut parts = Vec::with_capacity(table.len());
    for i in 1..=table.len() {
        match table.get_index(i) {
            Value::Str(s) => parts.push(s),
            Value::Number(n) => parts.push(Value::Number(n).to_string()),
            other => {
                return Err(EvalError::runtime_error(
                    "table.concat",
                    format!("invalid value ({}) at index {}", other.type_name(), i),
                ))
            }
        }
    }
    Ok(Value::Str(parts.join(&sep)))
}

// ============================================================================
// json
// ============================================================================
//
// Type mapping:
// - table with consecutive 1..n integer keys <-> JSON array
// - any other table <-> JSON object (keys stringified)
// - number <-> JSON number, string <-> JSON string
// - boolean <-> JSON boolean, nil <-> JSON null

fn json_table() -> Value {
    let mut t = Table::new();
    t.set_str("encode", Value::Builtin(json_encode));
    t.set_str("decode", Value::Builtin(json_decode));
    t.set_str("pretty", Value::Builtin(json_pretty));
    Value::table(t)
}

fn json_encode(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::arity_error("json.encode", ARITY_ONE, args.len()));
    }
    let json = value_to_json("json.encode", &args[0], 0)?;
    let text = serde_json::to_string(&json)
        .map_err(|e| EvalError::runtime_error("json.encode", e.to_string()))?;
    Ok(Value::Str(text))
}

fn json_pretty(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::arity_error("json.pretty", ARITY_ONE, args.len()));
    }
    let json = value_to_json("json.pretty", &args[0], 0)?;
    let text = serde_json::to_string_pretty(&json)
        .map_err(|e| EvalError::runtime_error("json.pretty", e.to_string()))?;
    Ok(Value::Str(text))
}

fn json_decode(args: &[Value]) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::arity_error("json.decode", ARITY_ONE, args.len()));
    }
    let text = string_arg("json.decode", args, 1)?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| EvalError::runtime_error("json.decode", e.to_string()))?;
    Ok(json_to_value(&json))
}

fn value_to_json(
    function: &str,
    value: &Value,
    depth: usize,
) -> Result<serde_json::Value, EvalError> {
    if depth > MAX_JSON_DEPTH {
        return Err(EvalError::runtime_error(function, "table nested too deeply"));
    }
    match value {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => json_number(function, *n),
        Value::Str(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Table(t) => {
            let table = t.borrow();
            if is_array(&table) {
                let mut items = Vec::with_capacity(table.len());
                for i in 1..=table.len() {
                    items.push(value_to_json(function, &table.get_index(i), depth + 1)?);
                }
                Ok(serde_json::Value::Array(items))
            } else {
                let mut object = serde_json::Map::new();
                for (key, entry) in table.iter() {
                    let name = match key.as_str() {
                        Some(s) => s.to_string(),
                        None => match key.to_value() {
                            Value::Number(n) => Value::Number(n).to_string(),
                            Value::Bool(b) => b.to_string(),
                            other => {
                                return Err(EvalError::runtime_error(
                                    function,
                                    format!("cannot convert {} key to JSON", other.type_name()),
                                ))
                            }
                        },
                    };
                    object.insert(name, value_to_json(function, entry, depth + 1)?);
                }
                Ok(serde_json::Value::Object(object))
            }
        }
        other => Err(EvalError::runtime_error(
            function,
            format!("cannot convert {} to JSON", other.type_name()),
        )),
    }
}

/// Whole numbers encode as JSON integers so round-trips read naturally.
fn json_number(function: &str, n: f64) -> Result<serde_json::Value, EvalError> {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9e15 {
        return Ok(serde_json::Value::Number(serde_json::Number::from(n as i64)));
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .ok_or_else(|| {
            EvalError::runtime_error(function, format!("cannot convert number {} to JSON", n))
        })
}

/// A table encodes as a JSON array when its keys are exactly 1..n.
fn is_array(table: &Table) -> bool {
    if table.is_empty() {
        return false;
    }
    (1..=table.len()).all(|i| !matches!(table.get_index(i), Value::Nil))
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => {
            let mut table = Table::new();
            for (i, item) in items.iter().enumerate() {
                table.set_index(i + 1, json_to_value(item));
            }
            Value::table(table)
        }
        serde_json::Value::Object(object) => {
            let mut table = Table::new();
            for (key, item) in object {
                table.set_str(key, json_to_value(item));
            }
            Value::table(table)
        }
    }
}
