//! Tree-walking evaluation of parsed scripts.

use std::collections::BTreeMap;

use evalserve_core::{Bindings, OutputCapture, ScriptError, Value};

use crate::{
    builtins,
    ops::{self, Shape},
    parser::{Expr, Stmt, Target, UnaryOp},
};

/// Recursion guard for evaluation.
const MAX_EVAL_DEPTH: usize = 1000;

/// Evaluates expressions and runs statements, sending prints to a capture.
pub struct Interpreter<'a> {
    capture: &'a mut OutputCapture,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(capture: &'a mut OutputCapture) -> Self {
        Self { capture, depth: 0 }
    }

    /// Run statements in order. Effects of statements that completed before
    /// a failure remain in `scope`.
    ///
    /// # Errors
    /// Returns the first error raised.
    pub fn run(&mut self, program: &[Stmt], scope: &mut Bindings) -> Result<(), ScriptError> {
        for stmt in program {
            self.exec(stmt, scope)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt, scope: &mut Bindings) -> Result<(), ScriptError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            Stmt::Assign(targets, expr) => {
                let value = self.eval(expr, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            Stmt::AugAssign(Target::Name(name), op, expr) => {
                let current = lookup_root(name, scope)?;
                let rhs = self.eval(expr, scope)?;
                scope.set(name.clone(), ops::binary(*op, current, rhs)?);
            }
            Stmt::AugAssign(Target::Index(base, index), op, expr) => {
                let place = self.place(base, index, scope)?;
                let current = place.read(scope)?;
                let rhs = self.eval(expr, scope)?;
                place.write(ops::binary(*op, current, rhs)?, scope)?;
            }
            Stmt::Del(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            Stmt::Pass => {}
        }
        Ok(())
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &mut Bindings) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                scope.set(name.clone(), value);
                Ok(())
            }
            Target::Index(base, index) => self.place(base, index, scope)?.write(value, scope),
        }
    }

    fn delete(&mut self, target: &Target, scope: &mut Bindings) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => scope
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| ScriptError::Name(name.clone())),
            Target::Index(base, index) => {
                let Place { root, keys, key } = self.place(base, index, scope)?;
                let mut container = lookup_root(&root, scope)?;
                ops::del_index(walk(&mut container, &keys)?, &key)?;
                scope.set(root, container);
                Ok(())
            }
        }
    }

    /// Evaluate the name and keys of `base[index]` once.
    fn place(&mut self, base: &Expr, index: &Expr, scope: &Bindings) -> Result<Place, ScriptError> {
        let (root, keys) = self.resolve_path(base, scope)?;
        let key = self.eval(index, scope)?;
        Ok(Place { root, keys, key })
    }

    /// Split `a[i][j]` into the root name and the evaluated keys, outermost first.
    fn resolve_path(&mut self, base: &Expr, scope: &Bindings) -> Result<(String, Vec<Value>), ScriptError> {
        let mut indexes = Vec::new();
        let mut current = base;
        let root = loop {
            match current {
                Expr::Name(name) => break name.clone(),
                Expr::Index(inner, index) => {
                    indexes.push(index.as_ref());
                    current = inner.as_ref();
                }
                _ => {
                    return Err(ScriptError::Syntax(
                        "cannot assign to expression".to_string(),
                    ));
                }
            }
        };

        let mut keys = Vec::with_capacity(indexes.len());
        for index in indexes.into_iter().rev() {
            keys.push(self.eval(index, scope)?);
        }
        Ok((root, keys))
    }

    /// Evaluate an expression against read-only bindings.
    ///
    /// # Errors
    /// Returns the error raised during evaluation.
    pub fn eval(&mut self, expr: &Expr, scope: &Bindings) -> Result<Value, ScriptError> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(ScriptError::Limit(
                "maximum recursion depth exceeded".to_string(),
            ));
        }
        self.depth += 1;
        let result = self.eval_inner(expr, scope);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr, scope: &Bindings) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => scope
                .get(name)
                .cloned()
                .or_else(|| builtins::lookup(name))
                .ok_or_else(|| ScriptError::Name(name.clone())),
            Expr::List(items) => {
                let mut list = Vec::with_capacity(items.len());
                let mut contents = Shape::default();
                for item in items {
                    let value = self.eval(item, scope)?;
                    contents = contents.and(Shape::of(&value));
                    contents.nested().check()?;
                    list.push(value);
                }
                Ok(Value::List(list))
            }
            Expr::Dict(entries) => {
                let mut map = BTreeMap::new();
                let mut contents = Shape::default();
                for (key, value) in entries {
                    let key = ops::dict_key(self.eval(key, scope)?)?;
                    let value = self.eval(value, scope)?;
                    contents = contents.and(Shape::of(&value)).and(Shape {
                        size: key.len(),
                        depth: 0,
                    });
                    contents.nested().check()?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!ops::truthy(&value))),
                    UnaryOp::Neg => ops::negate(&value),
                    UnaryOp::Pos => ops::positive(&value),
                }
            }
            Expr::Binary(first, rest) => {
                let mut acc = self.eval(first, scope)?;
                for (op, operand) in rest {
                    let rhs = self.eval(operand, scope)?;
                    acc = ops::binary(*op, acc, rhs)?;
                }
                Ok(acc)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first, scope)?;
                for (op, operand) in rest {
                    let right = self.eval(operand, scope)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(operands) => self.short_circuit(operands, false, scope),
            Expr::Or(operands) => self.short_circuit(operands, true, scope),
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if ops::truthy(&self.eval(cond, scope)?) {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let callee = self.eval(callee, scope)?;
                let Value::Opaque(function) = &callee else {
                    return Err(not_callable(&callee));
                };
                if !function.is_builtin() {
                    return Err(not_callable(&callee));
                }
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut evaluated = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    evaluated.push((name.clone(), self.eval(value, scope)?));
                }
                builtins::call(function.name(), args, evaluated, self.capture)
            }
            Expr::Index(base, index) => {
                let base = self.eval(base, scope)?;
                let index = self.eval(index, scope)?;
                ops::index(&base, &index)
            }
            Expr::Slice { base, start, stop } => {
                let base = self.eval(base, scope)?;
                let start = start.as_ref().map(|e| self.eval(e, scope)).transpose()?;
                let stop = stop.as_ref().map(|e| self.eval(e, scope)).transpose()?;
                ops::slice(&base, start.as_ref(), stop.as_ref())
            }
        }
    }

    /// `and` stops at the first falsy operand, `or` at the first truthy one.
    /// The deciding operand is the result.
    fn short_circuit(&mut self, operands: &[Expr], stop_when: bool, scope: &Bindings) -> Result<Value, ScriptError> {
        let mut last = Value::Null;
        for operand in operands {
            last = self.eval(operand, scope)?;
            if ops::truthy(&last) == stop_when {
                break;
            }
        }
        Ok(last)
    }
}

fn not_callable(value: &Value) -> ScriptError {
    ScriptError::Type(format!(
        "'{}' object is not callable",
        value.type_name()
    ))
}

fn lookup_root(name: &str, scope: &Bindings) -> Result<Value, ScriptError> {
    scope
        .get(name)
        .cloned()
        .ok_or_else(|| ScriptError::Name(name.to_string()))
}

fn walk<'v>(container: &'v mut Value, keys: &[Value]) -> Result<&'v mut Value, ScriptError> {
    let mut slot = container;
    for key in keys {
        slot = ops::index_mut(slot, key)?;
    }
    Ok(slot)
}

/// An indexed assignment target: `root[keys..][key]`.
struct Place {
    root: String,
    keys: Vec<Value>,
    key: Value,
}

impl Place {
    fn read(&self, scope: &Bindings) -> Result<Value, ScriptError> {
        let mut current = lookup_root(&self.root, scope)?;
        for key in &self.keys {
            current = ops::index(&current, key)?;
        }
        ops::index(&current, &self.key)
    }

    /// Store `value`. The root is left untouched if the result would be too
    /// deep or too large.
    fn write(self, value: Value, scope: &mut Bindings) -> Result<(), ScriptError> {
        let mut container = lookup_root(&self.root, scope)?;
        ops::set_index(walk(&mut container, &self.keys)?, self.key, value)?;
        Shape::of(&container).check()?;
        scope.set(self.root, container);
        Ok(())
    }
}
