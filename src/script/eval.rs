use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use super::ast::*;
use super::Scope;
use crate::error::ExecutionError;
use crate::template::Bindings;
use crate::value::Value;

/// Upper bound on a string built by `*`.
const MAX_STRING_LEN: usize = 1 << 24;

/// Runs one program once. A fresh evaluator is made for every render.
pub struct Evaluator<'a> {
    // Innermost last; the first scope holds the program's top-level names.
    scopes: Vec<HashMap<String, Value>>,
    bindings: &'a Bindings,
    parent: &'a Scope,
    modules: &'a HashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(bindings: &'a Bindings, parent: &'a Scope, modules: &'a HashMap<String, Value>) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            bindings,
            parent,
            modules,
        }
    }

    fn get_var(&self, name: &str) -> Result<Value, ExecutionError> {
        for scope in self.scopes.iter().rev() {
            if let Some(val) = scope.get(name) {
                return Ok(val.clone());
            }
        }
        self.bindings
            .get(name)
            .or_else(|| self.parent.global(name))
            .cloned()
            .ok_or_else(|| ExecutionError::UnboundReference(name.to_string()))
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn set_local(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    // Updates the nearest declaration, or declares at the top level.
    fn assign(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.iter_mut().rev().find(|s| s.contains_key(&name)) {
            scope.insert(name, value);
        } else if let Some(top) = self.scopes.first_mut() {
            top.insert(name, value);
        }
    }

    pub fn run(&mut self, body: &[Stmt], out: &mut String) -> Result<(), ExecutionError> {
        for stmt in body {
            self.exec(stmt, out)?;
        }
        Ok(())
    }

    fn run_block(&mut self, body: &[Stmt], out: &mut String) -> Result<(), ExecutionError> {
        self.push_scope();
        let result = self.run(body, out);
        self.pop_scope();
        result
    }

    fn exec(&mut self, stmt: &Stmt, out: &mut String) -> Result<(), ExecutionError> {
        match stmt {
            Stmt::Import(import) => {
                let dotted = import.dotted();
                let module = self
                    .modules
                    .get(&dotted)
                    .cloned()
                    .ok_or(ExecutionError::UnboundReference(dotted))?;
                self.set_local(import.alias.clone(), module);
            }
            Stmt::Def(name, init) => {
                let value = match init {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Null,
                };
                self.set_local(name.clone(), value);
            }
            Stmt::Assign(name, expr) => {
                let value = self.eval_expr(expr)?;
                self.assign(name.clone(), value);
            }
            Stmt::Out(exprs) => {
                for expr in exprs {
                    let val = self.eval_expr(expr)?;
                    let _ = write!(out, "{}", val);
                }
            }
            Stmt::If { cases, else_body } => {
                let mut matched = false;
                for (cond, body) in cases {
                    if self.eval_expr(cond)?.is_truthy() {
                        self.run_block(body, out)?;
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    if let Some(body) = else_body {
                        self.run_block(body, out)?;
                    }
                }
            }
            Stmt::For {
                target,
                iterable,
                body,
            } => {
                let items = match self.eval_expr(iterable)? {
                    Value::List(items) => items,
                    Value::Map(map) => map
                        .into_iter()
                        .map(|(key, value)| {
                            let entry: BTreeMap<String, Value> =
                                [("key".to_string(), Value::String(key)), ("value".to_string(), value)]
                                    .into_iter()
                                    .collect();
                            Value::Map(entry)
                        })
                        .collect(),
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    Value::Null => Vec::new(), // nothing to iterate
                    other => {
                        return Err(ExecutionError::Type(format!(
                            "cannot iterate over {}",
                            other.type_name()
                        )))
                    }
                };
                for item in items {
                    self.push_scope();
                    self.set_local(target.clone(), item);
                    let result = self.run(body, out);
                    self.pop_scope();
                    result?;
                }
            }
            Stmt::Expr(expr) => {
                self.eval_expr(expr)?;
            }
        }
        Ok(())
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>, ExecutionError> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    fn eval_expr(&self, expr: &Expr) -> Result<Value, ExecutionError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::IntLit(i) => Ok(Value::Int(*i)),
            Expr::FloatLit(x) => Ok(Value::Float(*x)),
            Expr::StringLit(s) => Ok(Value::String(s.clone())),
            Expr::Interpolated(parts) => {
                let mut s = String::new();
                for part in parts {
                    match part {
                        StrPart::Lit(text) => s.push_str(text),
                        StrPart::Expr(expr) => {
                            let _ = write!(s, "{}", self.eval_expr(expr)?);
                        }
                    }
                }
                Ok(Value::String(s))
            }
            Expr::List(items) => Ok(Value::List(self.eval_args(items)?)),
            Expr::Var(name) => self.get_var(name),
            Expr::Attribute(obj, attr) => match self.eval_expr(obj)? {
                // A missing key reads as null.
                Value::Map(m) => Ok(m.get(attr).cloned().unwrap_or_default()),
                other => Err(ExecutionError::MissingProperty {
                    target: other.type_name().to_string(),
                    property: attr.clone(),
                }),
            },
            Expr::Index(obj, idx) => index(self.eval_expr(obj)?, self.eval_expr(idx)?),
            Expr::Method(obj, name, args) => {
                let target = self.eval_expr(obj)?;
                call_method(target, name, self.eval_args(args)?)
            }
            Expr::Call(name, args) => {
                let function = self
                    .parent
                    .function(name)
                    .ok_or_else(|| ExecutionError::UnknownFunction(name.clone()))?;
                let args = self.eval_args(args)?;
                function(&args).map_err(ExecutionError::Fault)
            }
            Expr::Unary(op, operand) => {
                let val = self.eval_expr(operand)?;
                match (op, val) {
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| ExecutionError::Fault("integer overflow".to_string())),
                    (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
                    (UnaryOp::Neg, v) => Err(ExecutionError::Type(format!("cannot negate {}", v.type_name()))),
                }
            }
            Expr::BinOp(curr_lhs, op, curr_rhs) => {
                let l = self.eval_expr(curr_lhs)?;
                // Short-circuit before touching the right-hand side.
                match op {
                    BinOp::And if !l.is_truthy() => return Ok(Value::Bool(false)),
                    BinOp::Or if l.is_truthy() => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let r = self.eval_expr(curr_rhs)?;
                binary(*op, l, r)
            }
        }
    }
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Or => "||",
        BinOp::And => "&&",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
    }
}

fn type_error(op: BinOp, l: &Value, r: &Value) -> ExecutionError {
    ExecutionError::Type(format!(
        "cannot apply `{}` to {} and {}",
        symbol(op),
        l.type_name(),
        r.type_name()
    ))
}

fn binary(op: BinOp, l: Value, r: Value) -> Result<Value, ExecutionError> {
    use std::cmp::Ordering;

    match op {
        BinOp::And | BinOp::Or => Ok(Value::Bool(r.is_truthy())),
        BinOp::Eq => Ok(Value::Bool(l.loose_eq(&r))),
        BinOp::Ne => Ok(Value::Bool(!l.loose_eq(&r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = l.compare(&r).ok_or_else(|| type_error(op, &l, &r))?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinOp::Add => match (l, r) {
            (Value::String(s1), r) => Ok(Value::String(format!("{}{}", s1, r))),
            (l, Value::String(s2)) => Ok(Value::String(format!("{}{}", l, s2))),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::List(mut a), r) => {
                a.push(r);
                Ok(Value::List(a))
            }
            (l, r) => arithmetic(op, &l, &r),
        },
        BinOp::Mul => match (&l, &r) {
            (Value::String(s), Value::Int(n)) if *n >= 0 => {
                let count = usize::try_from(*n).unwrap_or(usize::MAX);
                match s.len().checked_mul(count) {
                    Some(0) => Ok(Value::String(String::new())),
                    Some(len) if len <= MAX_STRING_LEN => Ok(Value::String(s.repeat(count))),
                    _ => Err(ExecutionError::Fault("string too large".to_string())),
                }
            }
            _ => arithmetic(op, &l, &r),
        },
        BinOp::Sub | BinOp::Div | BinOp::Rem => arithmetic(op, &l, &r),
    }
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, ExecutionError> {
    let overflow = || ExecutionError::Fault("integer overflow".to_string());
    let by_zero = || ExecutionError::Fault("division by zero".to_string());

    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let (a, b) = (*a, *b);
        return match op {
            BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            BinOp::Div if b == 0 => Err(by_zero()),
            // Integer division stays integral only when exact.
            BinOp::Div => match a.checked_rem(b) {
                Some(0) => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
                Some(_) => Ok(Value::Float(a as f64 / b as f64)),
                None => Err(overflow()),
            },
            BinOp::Rem if b == 0 => Err(by_zero()),
            BinOp::Rem => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
            _ => Err(type_error(op, l, r)),
        };
    }

    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(type_error(op, l, r));
    };
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div => Ok(Value::Float(a / b)),
        BinOp::Rem => Ok(Value::Float(a % b)),
        _ => Err(type_error(op, l, r)),
    }
}

fn index(target: Value, idx: Value) -> Result<Value, ExecutionError> {
    match (target, idx) {
        (Value::Map(m), Value::String(key)) => Ok(m.get(&key).cloned().unwrap_or_default()),
        (Value::List(items), Value::Int(i)) => {
            // Negative indices count from the end; out of range reads as null.
            let len = items.len() as i64;
            let i = if i < 0 { len + i } else { i };
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default())
        }
        (Value::String(s), Value::Int(i)) => Ok(usize::try_from(i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default()),
        (target, idx) => Err(ExecutionError::Type(format!(
            "cannot index {} with {}",
            target.type_name(),
            idx.type_name()
        ))),
    }
}

fn size(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn call_method(target: Value, name: &str, args: Vec<Value>) -> Result<Value, ExecutionError> {
    match (name, &target, args.as_slice()) {
        ("size", Value::String(s), []) => Ok(size(s.chars().count())),
        ("size", Value::List(items), []) => Ok(size(items.len())),
        ("size", Value::Map(map), []) => Ok(size(map.len())),
        ("isEmpty", Value::String(s), []) => Ok(Value::Bool(s.is_empty())),
        ("isEmpty", Value::List(items), []) => Ok(Value::Bool(items.is_empty())),
        ("isEmpty", Value::Map(map), []) => Ok(Value::Bool(map.is_empty())),
        ("toUpperCase", Value::String(s), []) => Ok(Value::String(s.to_uppercase())),
        ("toLowerCase", Value::String(s), []) => Ok(Value::String(s.to_lowercase())),
        ("trim", Value::String(s), []) => Ok(Value::String(s.trim().to_string())),
        ("toString", v, []) => Ok(Value::String(v.to_string())),
        ("contains", Value::String(s), [Value::String(needle)]) => Ok(Value::Bool(s.contains(needle.as_str()))),
        ("contains", Value::List(items), [needle]) => Ok(Value::Bool(items.iter().any(|i| i.loose_eq(needle)))),
        ("contains", Value::Map(map), [Value::String(key)]) => Ok(Value::Bool(map.contains_key(key))),
        ("join", Value::List(items), []) => Ok(Value::String(join(items, ""))),
        ("join", Value::List(items), [sep]) => Ok(Value::String(join(items, &sep.to_string()))),
        _ => Err(ExecutionError::UnknownFunction(format!(
            "{}.{}",
            target.type_name(),
            name
        ))),
    }
}

fn join(items: &[Value], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::{parse_expression, parse_program};
    use serde_json::json;

    fn bindings(value: serde_json::Value) -> Bindings {
        crate::template::bindings(&value).expect("bindings")
    }

    fn render(source: &str, context: serde_json::Value) -> Result<String, ExecutionError> {
        let body = parse_program(source).expect("parse");
        let bindings = bindings(context);
        let scope = Scope::new();
        let modules = HashMap::new();
        let mut out = String::new();
        Evaluator::new(&bindings, &scope, &modules).run(&body, &mut out)?;
        Ok(out)
    }

    fn eval(source: &str) -> Result<Value, ExecutionError> {
        let expr = parse_expression(source, 1).expect("parse");
        let (bindings, scope, modules) = (Bindings::new(), Scope::new(), HashMap::new());
        Evaluator::new(&bindings, &scope, &modules).eval_expr(&expr)
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(eval("1 + 2 * 3"), Ok(Value::Int(7)));
        assert_eq!(eval("7 / 2"), Ok(Value::Float(3.5)));
        assert_eq!(eval("6 / 2"), Ok(Value::Int(3)));
        assert_eq!(eval("7 % 4"), Ok(Value::Int(3)));
        assert_eq!(eval("1.5 + 1"), Ok(Value::Float(2.5)));
        assert_eq!(eval("-3 < 2 && 2 <= 2.0"), Ok(Value::Bool(true)));
        assert_eq!(eval("'a' + 1"), Ok(Value::from("a1")));
        assert_eq!(eval("'ab' * 2"), Ok(Value::from("abab")));
        assert_eq!(eval("[1] + [2] + 3"), Ok(Value::from(vec![1i64, 2, 3])));
        assert_eq!(eval("1 / 0"), Err(ExecutionError::Fault("division by zero".into())));
        assert!(matches!(eval("'a' - 1"), Err(ExecutionError::Type(_))));
    }

    #[test]
    fn oversized_string_repeat_is_a_fault() {
        let too_large = Err(ExecutionError::Fault("string too large".into()));
        assert_eq!(eval("'ab' * 9223372036854775807"), too_large);
        assert_eq!(eval("'ab' * 16777216"), too_large);
        assert_eq!(eval("'' * 9223372036854775807"), Ok(Value::from("")));
        assert_eq!(eval("'ab' * 0"), Ok(Value::from("")));
    }

    #[test]
    fn logic_short_circuits() {
        assert_eq!(eval("false && missing"), Ok(Value::Bool(false)));
        assert_eq!(eval("true || missing"), Ok(Value::Bool(true)));
        assert_eq!(
            eval("true && missing"),
            Err(ExecutionError::UnboundReference("missing".into()))
        );
    }

    #[test]
    fn methods() {
        assert_eq!(eval("'abc'.size()"), Ok(Value::Int(3)));
        assert_eq!(eval("' Hi '.trim().toUpperCase()"), Ok(Value::from("HI")));
        assert_eq!(eval("[1, 2, 3].join(', ')"), Ok(Value::from("1, 2, 3")));
        assert_eq!(eval("[1, 2].contains(2.0)"), Ok(Value::Bool(true)));
        assert_eq!(eval("[].isEmpty()"), Ok(Value::Bool(true)));
        assert_eq!(
            eval("1.frobnicate()"),
            Err(ExecutionError::UnknownFunction("int.frobnicate".into()))
        );
    }

    #[test]
    fn property_and_index_access() {
        let out = render(
            "out << user.name << user.missing << '|' << tags[-1] << tags[9] << user['name']",
            json!({"user": {"name": "Ada"}, "tags": ["a", "b"]}),
        );
        assert_eq!(out, Ok("Ada|bAda".to_string()));

        assert_eq!(
            render("out << user.name.first", json!({"user": {"name": "Ada"}})),
            Err(ExecutionError::MissingProperty {
                target: "string".into(),
                property: "first".into()
            })
        );
    }

    #[test]
    fn unbound_names_are_errors() {
        assert_eq!(
            render("out << who", json!({})),
            Err(ExecutionError::UnboundReference("who".into()))
        );
    }

    #[test]
    fn null_renders_empty() {
        assert_eq!(render("out << '[' << x << ']'", json!({"x": null})), Ok("[]".to_string()));
    }

    #[test]
    fn loops_and_conditionals() {
        let source = "for (item in items) {\n if (item.n > 1) { out << item.name } else { out << '-' }\n}";
        let out = render(
            source,
            json!({"items": [{"name": "a", "n": 1}, {"name": "b", "n": 2}]}),
        );
        assert_eq!(out, Ok("-b".to_string()));

        assert_eq!(
            render("for (e in m) { out << e.key << '=' << e.value << ';' }", json!({"m": {"a": 1, "b": 2}})),
            Ok("a=1;b=2;".to_string())
        );
        assert_eq!(render("for (x in nothing) { out << x }", json!({"nothing": null})), Ok(String::new()));
    }

    #[test]
    fn assignment_reaches_enclosing_declaration() {
        let source = "def total = 0\nfor (n in [1, 2, 3]) { total = total + n; def tmp = n }\nout << total";
        assert_eq!(render(source, json!({})), Ok("6".to_string()));

        // Block-local declarations vanish with the block.
        assert_eq!(
            render("if (true) { def inner = 1 }\nout << inner", json!({})),
            Err(ExecutionError::UnboundReference("inner".into()))
        );
    }

    #[test]
    fn locals_shadow_bindings() {
        assert_eq!(render("out << x; x = 2; out << x", json!({"x": 1})), Ok("12".to_string()));
    }

    #[test]
    fn interpolation() {
        assert_eq!(
            render(r#"def n = 2; out << "${n} x $who.name = ${ n * 2 }""#, json!({"who": {"name": "w"}})),
            Ok("2 x w = 4".to_string())
        );
    }
}
