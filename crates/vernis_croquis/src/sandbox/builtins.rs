//! Methods of the built-in values the interpreter understands.

use super::interpreter::{check_length, Interpreter};
use super::value::{format_number, Value, MAX_STRING_LENGTH};
use super::SandboxError;

impl<'p, 'a> Interpreter<'p, 'a> {
    /// `Object.*` and `Array.*` functions.
    pub(super) fn call_static(
        &mut self,
        namespace: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        let first = args.first().cloned().unwrap_or(Value::Undefined);
        match (namespace, method) {
            ("Object", "keys") => Ok(Value::array(
                first.keys().into_iter().map(Value::string).collect(),
            )),
            ("Object", "values") => Ok(Value::array(
                first.keys().iter().map(|key| first.get(key)).collect(),
            )),
            ("Object", "assign") => {
                for source in args.iter().skip(1) {
                    for key in source.keys() {
                        first.set(&key, source.get(&key))?;
                    }
                }
                Ok(first)
            }
            ("Object", "freeze") => Ok(first),
            ("Array", "isArray") => Ok(Value::Bool(matches!(first, Value::Array(_)))),
            _ => Err(not_a_function(namespace, method)),
        }
    }

    /// Call a method of an array, string, function or primitive receiver.
    pub(super) fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        match &receiver {
            Value::Array(_) => self.array_method(&receiver, method, args),
            Value::String(s) => self.string_method(s, method, args),
            Value::Function(function) => match method {
                "call" => self.invoke(function.id, args.into_iter().skip(1).collect()),
                "apply" => {
                    let list = match args.get(1) {
                        Some(list) if !list.is_nullish() => self.iterate(list.clone())?,
                        _ => Vec::new(),
                    };
                    self.invoke(function.id, list)
                }
                "toString" => Ok(Value::string(function.source())),
                _ => Err(not_a_function("function", method)),
            },
            Value::Number(n) => match method {
                "toString" => Ok(Value::string(format_number(*n))),
                "toFixed" => {
                    let digits = arg_number(&args, 0, 0.0);
                    if !(0.0..=100.0).contains(&digits) {
                        return Err(SandboxError::Range(
                            "toFixed() digits argument must be between 0 and 100".to_string(),
                        ));
                    }
                    Ok(Value::string(format!("{:.*}", digits as usize, n)))
                }
                _ => Err(not_a_function("number", method)),
            },
            Value::Object(_) => match method {
                "hasOwnProperty" => {
                    let key = args.first().map(Value::to_js_string).unwrap_or_default();
                    Ok(Value::Bool(receiver.keys().contains(&key)))
                }
                "toString" => Ok(Value::string(receiver.to_js_string())),
                _ => Err(not_a_function("object", method)),
            },
            other => match method {
                "toString" => Ok(Value::string(other.to_js_string())),
                _ => Err(not_a_function(other.type_name(), method)),
            },
        }
    }

    fn array_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        let Value::Array(items) = receiver else {
            return Err(not_a_function(receiver.type_name(), method));
        };

        match method {
            "push" => {
                let mut list = items.borrow_mut();
                self.grow(&mut list, args)?;
                Ok(Value::Number(list.len() as f64))
            }
            "unshift" => {
                let mut list = items.borrow_mut();
                let mut front = args;
                let rest = std::mem::take(&mut *list);
                self.grow(&mut front, rest)?;
                *list = front;
                Ok(Value::Number(list.len() as f64))
            }
            "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut list = items.borrow_mut();
                if list.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(list.remove(0))
                }
            }
            "reverse" => {
                items.borrow_mut().reverse();
                Ok(receiver.clone())
            }
            "concat" => {
                let mut out = items.borrow().clone();
                for arg in args {
                    let extra = match arg {
                        Value::Array(inner) => inner.borrow().clone(),
                        other => vec![other],
                    };
                    self.grow(&mut out, extra)?;
                }
                Ok(Value::array(out))
            }
            "slice" => {
                let list = items.borrow();
                let (start, end) = slice_bounds(&args, list.len());
                Ok(Value::array(list[start..end.max(start)].to_vec()))
            }
            "join" => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(sep) => sep.to_js_string(),
                };
                let list = items.borrow().clone();
                let mut out = String::new();
                for (index, item) in list.iter().enumerate() {
                    if index > 0 {
                        out.push_str(&separator);
                    }
                    if !item.is_nullish() {
                        out.push_str(&item.to_js_string());
                    }
                    check_length(&out)?;
                }
                self.check_string(&out)?;
                Ok(Value::string(out))
            }
            "indexOf" | "includes" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                let position = items.borrow().iter().position(|item| item.strict_equals(&needle));
                Ok(match method {
                    "includes" => Value::Bool(position.is_some()),
                    _ => Value::Number(position.map_or(-1.0, |i| i as f64)),
                })
            }
            "toString" => Ok(Value::string(receiver.to_js_string())),
            "map" | "filter" | "forEach" | "some" | "every" | "find" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                let list = items.borrow().clone();
                let mut out = Vec::new();
                for (index, item) in list.into_iter().enumerate() {
                    let result = self.callback(
                        &callback,
                        vec![item.clone(), Value::Number(index as f64), receiver.clone()],
                    )?;
                    match method {
                        "map" => out.push(result),
                        "filter" if result.is_truthy() => out.push(item),
                        "some" if result.is_truthy() => return Ok(Value::Bool(true)),
                        "every" if !result.is_truthy() => return Ok(Value::Bool(false)),
                        "find" if result.is_truthy() => return Ok(item),
                        _ => {}
                    }
                }
                Ok(match method {
                    "map" | "filter" => Value::array(out),
                    "some" => Value::Bool(false),
                    "every" => Value::Bool(true),
                    _ => Value::Undefined,
                })
            }
            "reduce" => {
                let callback = args.first().cloned().unwrap_or(Value::Undefined);
                let mut list = items.borrow().clone().into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match list.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(SandboxError::Type(
                                "Reduce of empty array with no initial value".to_string(),
                            ))
                        }
                    },
                };
                for (index, item) in list {
                    acc = self.callback(
                        &callback,
                        vec![acc, item, Value::Number(index as f64), receiver.clone()],
                    )?;
                }
                Ok(acc)
            }
            _ => Err(not_a_function("array", method)),
        }
    }

    fn string_method(
        &mut self,
        s: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        let text_arg = |index: usize| match args.get(index) {
            Some(value) => value.to_js_string(),
            None => "undefined".to_string(),
        };

        match method {
            "toString" | "valueOf" => Ok(Value::string(s)),
            "toUpperCase" => Ok(Value::string(s.to_uppercase())),
            "toLowerCase" => Ok(Value::string(s.to_lowercase())),
            "trim" => Ok(Value::string(s.trim())),
            "charAt" => {
                let index = arg_number(&args, 0, 0.0);
                let ch = if index >= 0.0 {
                    s.chars().nth(index as usize)
                } else {
                    None
                };
                Ok(Value::string(ch.map(String::from).unwrap_or_default()))
            }
            "indexOf" => {
                let needle = text_arg(0);
                Ok(Value::Number(
                    s.find(&needle)
                        .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
                ))
            }
            "includes" => Ok(Value::Bool(s.contains(&text_arg(0)))),
            "startsWith" => Ok(Value::Bool(s.starts_with(&text_arg(0)))),
            "endsWith" => Ok(Value::Bool(s.ends_with(&text_arg(0)))),
            "slice" | "substring" => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = slice_bounds(&args, chars.len());
                Ok(Value::string(
                    chars[start..end.max(start)].iter().collect::<String>(),
                ))
            }
            "split" => {
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::string(s)],
                    Some(sep) => {
                        let sep = sep.to_js_string();
                        if sep.is_empty() {
                            s.chars().map(|c| Value::string(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::string).collect()
                        }
                    }
                };
                let mut out = Vec::new();
                self.grow(&mut out, parts)?;
                Ok(Value::array(out))
            }
            "concat" => {
                let mut out = s.to_string();
                for arg in &args {
                    out.push_str(&arg.to_js_string());
                    check_length(&out)?;
                }
                self.check_string(&out)?;
                Ok(Value::string(out))
            }
            "repeat" => {
                let count = arg_number(&args, 0, 0.0);
                if count < 0.0 || !count.is_finite() {
                    return Err(SandboxError::Range(format!(
                        "Invalid count value: {}",
                        format_number(count)
                    )));
                }
                if (s.len() as f64) * count.trunc() > MAX_STRING_LENGTH as f64 {
                    return Err(SandboxError::Range("Invalid string length".to_string()));
                }
                let out = s.repeat(count as usize);
                self.check_string(&out)?;
                Ok(Value::string(out))
            }
            "replace" => {
                let pattern = text_arg(0);
                let Some(byte) = s.find(&pattern) else {
                    return Ok(Value::string(s));
                };
                let replacement = match args.get(1) {
                    Some(callback @ Value::Function(_)) => {
                        let offset = s[..byte].chars().count() as f64;
                        self.callback(
                            callback,
                            vec![
                                Value::string(pattern.as_str()),
                                Value::Number(offset),
                                Value::string(s),
                            ],
                        )?
                        .to_js_string()
                    }
                    _ => text_arg(1),
                };
                let mut out = String::with_capacity(s.len() + replacement.len());
                out.push_str(&s[..byte]);
                out.push_str(&replacement);
                out.push_str(&s[byte + pattern.len()..]);
                self.check_string(&out)?;
                Ok(Value::string(out))
            }
            _ => Err(not_a_function("string", method)),
        }
    }

    fn callback(&mut self, callback: &Value, args: Vec<Value>) -> Result<Value, SandboxError> {
        match callback {
            Value::Function(function) => self.invoke(function.id, args),
            other => Err(SandboxError::Type(format!(
                "{} is not a function",
                other.to_js_string()
            ))),
        }
    }
}

fn not_a_function(receiver: &str, method: &str) -> SandboxError {
    SandboxError::Type(format!("{}.{} is not a function", receiver, method))
}

fn arg_number(args: &[Value], index: usize, default: f64) -> f64 {
    match args.get(index) {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() {
                default
            } else {
                n.trunc()
            }
        }
    }
}

/// Resolve `slice(start, end)` arguments against a length.
fn slice_bounds(args: &[Value], len: usize) -> (usize, usize) {
    let resolve = |n: f64| -> usize {
        if n < 0.0 {
            (len as f64 + n).max(0.0) as usize
        } else {
            n.min(len as f64) as usize
        }
    };
    let start = resolve(arg_number(args, 0, 0.0));
    let end = resolve(arg_number(args, 1, len as f64));
    (start, end)
}

#[cfg(test)]
mod tests {
    use crate::sandbox::{evaluate_exports, SandboxError};

    #[test]
    fn test_string_methods() {
        let meta = evaluate_exports(
            r#"
            var name = "  Widgets/Main.JS ";
            var clean = name.trim().toLowerCase();
            exports.include = clean.split("/");
            exports.include.push(clean.replace(".js", ".min.js"), clean.slice(-3), "ab".repeat(2));
            exports.required.push(String(clean.startsWith("widgets")), String(clean.indexOf("/")));
            "#,
        )
        .unwrap();
        assert_eq!(
            meta.include,
            vec!["widgets", "main.js", "widgets/main.min.js", ".js", "abab"]
        );
        assert_eq!(meta.required, vec!["true", "7"]);
    }

    #[test]
    fn test_array_methods() {
        let meta = evaluate_exports(
            r#"
            var list = ["c", "b", "a"];
            list.reverse();
            list.unshift("z");
            list.shift();
            exports.include = list.slice(0, 2);
            exports.required.push(list.join("+"), String(list.indexOf("b")), String(list.includes("q")));
            exports.required.push(String([1, 2, 3].reduce((sum, n) => sum + n, 0)));
            exports.required.push(String(["x"].some(x => x === "x")), String([].every(x => false)));
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["a", "b"]);
        assert_eq!(meta.required, vec!["a+b+c", "1", "false", "6", "true", "true"]);
    }

    #[test]
    fn test_object_builtins() {
        let meta = evaluate_exports(
            r#"
            var paths = Object.assign({}, { a: "a.js" }, { b: "b.js" });
            exports.include = Object.values(paths);
            exports.required = Object.keys(paths);
            if (!Array.isArray(exports.include)) throw new Error("not an array");
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["a.js", "b.js"]);
        assert_eq!(meta.required, vec!["a", "b"]);
    }

    #[test]
    fn test_call_and_apply() {
        let meta = evaluate_exports(
            r#"
            function add(a, b) { exports.include.push(a + b); }
            add.call(null, "x", ".js");
            add.apply(null, ["y", ".js"]);
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["x.js", "y.js"]);
    }

    #[test]
    fn test_repeat_past_string_limit() {
        let err = evaluate_exports("'abc'.repeat(1e9);").unwrap_err();
        assert!(matches!(err, SandboxError::Range(_)), "{err:?}");
    }

    #[test]
    fn test_unknown_method() {
        let err = evaluate_exports("[].flatMap(x => x);").unwrap_err();
        assert_eq!(
            err,
            SandboxError::Type("array.flatMap is not a function".to_string())
        );
    }
}
