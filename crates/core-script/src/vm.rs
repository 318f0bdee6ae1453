//! Stack VM executing compiled Gza chunks.
//!
//! Resource discipline: a wall-clock deadline is checked between opcode
//! batches, and every allocation point (concat results, array/table
//! creation and growth, call frames) is charged to the [`TrackedAlloc`]
//! before the allocation happens. Host builtins receive an explicit
//! [`HostContext`]; a builtin signals failure by scheduling a pending fault
//! on that context, which the VM observes after the call returns and
//! propagates as [`ScriptError::HostFault`].

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::trace;

use crate::alloc::{FRAME_COST, SLOT_COST, TrackedAlloc};
use crate::chunk::Op;
use crate::value::{Builtin, Function, StrRef, Value};
use crate::{Result, ScriptError};

/// Call-depth ceiling; recursion past this is treated as a resource fault.
pub const MAX_FRAMES: usize = 1024;

/// Context handle threaded through every builtin invocation.
///
/// There is deliberately no global or thread-local "active host": the
/// association between a running script and its host travels through the
/// call convention, so reentrant plugin → builtin → plugin chains and error
/// unwinds cannot observe a stale pairing.
pub trait HostContext {
    /// True when a builtin has scheduled a pending host error.
    fn has_fault(&self) -> bool {
        false
    }
    /// Rendering of the pending fault for the VM-side error value.
    fn fault_message(&self) -> Option<String> {
        None
    }
    /// Downcast hook for concrete hosts.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Context for pure scripts (tests, expression evaluation).
pub struct NullHost;

impl HostContext for NullHost {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Frame {
    function: Rc<Function>,
    ip: usize,
    base: usize,
}

pub struct Vm {
    globals: IndexMap<String, Value>,
    alloc: TrackedAlloc,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(alloc: TrackedAlloc) -> Self {
        Self {
            globals: IndexMap::new(),
            alloc,
            stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn alloc(&self) -> &TrackedAlloc {
        &self.alloc
    }

    pub fn define_builtin(
        &mut self,
        name: &'static str,
        func: fn(&mut dyn HostContext, &[Value]) -> Value,
    ) {
        self.globals
            .insert(name.to_string(), Value::Builtin(Rc::new(Builtin { name, func })));
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Execute a compiled top-level script.
    pub fn run_script(
        &mut self,
        script: Rc<Function>,
        ctx: &mut dyn HostContext,
        deadline: Option<Instant>,
    ) -> Result<Value> {
        self.stack.clear();
        self.frames.clear();
        self.alloc.charge(FRAME_COST)?;
        self.frames.push(Frame {
            function: script,
            ip: 0,
            base: 0,
        });
        self.finish(ctx, deadline)
    }

    /// Call a named global function with `args`.
    pub fn call_by_name(
        &mut self,
        name: &str,
        args: &[Value],
        ctx: &mut dyn HostContext,
        deadline: Option<Instant>,
    ) -> Result<Value> {
        let callee = self
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::UndefinedName(name.to_string()))?;
        self.stack.clear();
        self.frames.clear();
        match callee {
            Value::Function(function) => {
                if function.arity as usize != args.len() {
                    return Err(ScriptError::Type(format!(
                        "'{}' expects {} arguments, got {}",
                        name,
                        function.arity,
                        args.len()
                    )));
                }
                self.stack.push(Value::Function(Rc::clone(&function)));
                self.stack.extend(args.iter().cloned());
                self.alloc.charge(FRAME_COST)?;
                self.frames.push(Frame {
                    function,
                    ip: 0,
                    base: 1,
                });
                self.finish(ctx, deadline)
            }
            Value::Builtin(b) => {
                let result = (b.func)(ctx, args);
                if ctx.has_fault() {
                    return Err(ScriptError::HostFault(
                        ctx.fault_message().unwrap_or_else(|| b.name.to_string()),
                    ));
                }
                Ok(result)
            }
            other => Err(ScriptError::NotAFunction(describe(&other))),
        }
    }

    /// Run to completion and settle frame charges: on success the final
    /// `Return` leaves one charged frame; on failure every frame still on
    /// the call stack is outstanding. Either way the accounting ends
    /// balanced so a failed run does not strand budget.
    fn finish(&mut self, ctx: &mut dyn HostContext, deadline: Option<Instant>) -> Result<Value> {
        let out = self.execute(ctx, deadline);
        let outstanding = self.frames.len().max(1);
        self.alloc.release(FRAME_COST * outstanding);
        self.frames.clear();
        out
    }

    fn execute(&mut self, ctx: &mut dyn HostContext, deadline: Option<Instant>) -> Result<Value> {
        let mut ops_run: u64 = 0;
        loop {
            ops_run += 1;
            if ops_run & 0x3F == 0
                && let Some(limit) = deadline
                && Instant::now() > limit
            {
                trace!(target: "script.vm", ops = ops_run, "deadline_exceeded");
                return Err(ScriptError::ExecutionTimeout);
            }

            let (op, base) = {
                let frame = self.frames.last_mut().expect("active frame");
                let op = frame.function.chunk.code[frame.ip];
                frame.ip += 1;
                (op, frame.base)
            };

            match op {
                Op::Constant(idx) => {
                    let value = self.current_constant(idx);
                    self.stack.push(value);
                }
                Op::Nil => self.stack.push(Value::Nil),
                Op::True => self.stack.push(Value::Bool(true)),
                Op::False => self.stack.push(Value::Bool(false)),
                Op::Pop => {
                    self.pop();
                }
                Op::DefineGlobal(idx) => {
                    let name = self.constant_name(idx);
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                Op::GetGlobal(idx) => {
                    let name = self.constant_name(idx);
                    let value = self
                        .globals
                        .get(&name)
                        .cloned()
                        .ok_or(ScriptError::UndefinedName(name))?;
                    self.stack.push(value);
                }
                Op::SetGlobal(idx) => {
                    let name = self.constant_name(idx);
                    if !self.globals.contains_key(&name) {
                        return Err(ScriptError::UndefinedName(name));
                    }
                    let value = self.peek().clone();
                    self.globals.insert(name, value);
                }
                Op::GetLocal(slot) => {
                    let value = self.stack[base + slot as usize].clone();
                    self.stack.push(value);
                }
                Op::SetLocal(slot) => {
                    let value = self.peek().clone();
                    self.stack[base + slot as usize] = value;
                }
                Op::Add => self.binary_num("add", |a, b| Ok(a + b))?,
                Op::Sub => self.binary_num("subtract", |a, b| Ok(a - b))?,
                Op::Mul => self.binary_num("multiply", |a, b| Ok(a * b))?,
                Op::Div => self.binary_num("divide", |a, b| {
                    if b == 0.0 {
                        Err(ScriptError::Type("division by zero".to_string()))
                    } else {
                        Ok(a / b)
                    }
                })?,
                // Truncated remainder, matching Rust's `%` on f64.
                Op::Rem => self.binary_num("take remainder of", |a, b| {
                    if b == 0.0 {
                        Err(ScriptError::Type("modulo by zero".to_string()))
                    } else {
                        Ok(a % b)
                    }
                })?,
                Op::Concat => {
                    let b = self.pop();
                    let a = self.pop();
                    let left = concat_operand(&a)?;
                    let right = concat_operand(&b)?;
                    self.alloc.charge(left.len() + right.len())?;
                    let mut joined = Vec::with_capacity(left.len() + right.len());
                    joined.extend_from_slice(&left);
                    joined.extend_from_slice(&right);
                    self.stack.push(Value::str_from_owned(joined));
                }
                Op::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a.equals(&b)));
                }
                Op::NotEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(!a.equals(&b)));
                }
                Op::Less => self.binary_cmp(|a, b| a < b)?,
                Op::LessEqual => self.binary_cmp(|a, b| a <= b)?,
                Op::Greater => self.binary_cmp(|a, b| a > b)?,
                Op::GreaterEqual => self.binary_cmp(|a, b| a >= b)?,
                Op::Not => {
                    let v = self.pop();
                    self.stack.push(Value::Bool(!v.is_truthy()));
                }
                Op::Negate => {
                    let v = self.pop();
                    let n = v.as_num().ok_or_else(|| {
                        ScriptError::Type(format!("cannot negate {}", v.type_name()))
                    })?;
                    self.stack.push(Value::Num(-n));
                }
                Op::Jump(target) => {
                    self.frames.last_mut().expect("active frame").ip = target as usize;
                }
                Op::JumpIfFalse(target) => {
                    if !self.peek().is_truthy() {
                        self.frames.last_mut().expect("active frame").ip = target as usize;
                    }
                }
                Op::JumpIfTrue(target) => {
                    if self.peek().is_truthy() {
                        self.frames.last_mut().expect("active frame").ip = target as usize;
                    }
                }
                Op::Call(argc) => self.call_value(argc as usize, ctx)?,
                Op::Return => {
                    let result = self.pop();
                    let finished = self.frames.pop().expect("active frame");
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.alloc.release(FRAME_COST);
                    // Drop locals plus the callee slot under them.
                    self.stack.truncate(finished.base - 1);
                    self.stack.push(result);
                }
                Op::MakeArray(count) => {
                    let count = count as usize;
                    self.alloc.charge(32 + count * SLOT_COST)?;
                    let elems = self.stack.split_off(self.stack.len() - count);
                    self.stack
                        .push(Value::Array(Rc::new(RefCell::new(elems))));
                }
                Op::MakeTable(count) => {
                    let count = count as usize;
                    let mut entries = self.stack.split_off(self.stack.len() - count * 2);
                    let mut table: IndexMap<StrRef, Value> = IndexMap::with_capacity(count);
                    let mut charge = 64usize;
                    for pair in entries.chunks_exact_mut(2) {
                        let key = match &pair[0] {
                            Value::Str(s) => Rc::clone(s),
                            other => {
                                return Err(ScriptError::Type(format!(
                                    "table key must be a string, got {}",
                                    other.type_name()
                                )));
                            }
                        };
                        charge += key.len() + 2 * SLOT_COST;
                        table.insert(key, std::mem::take(&mut pair[1]));
                    }
                    self.alloc.charge(charge)?;
                    self.stack
                        .push(Value::Table(Rc::new(RefCell::new(table))));
                }
                Op::IndexGet => {
                    let key = self.pop();
                    let target = self.pop();
                    let value = index_get(&target, &key)?;
                    self.stack.push(value);
                }
                Op::IndexSet => {
                    let value = self.pop();
                    let key = self.pop();
                    let target = self.pop();
                    self.index_set(&target, key, value.clone())?;
                    // Assignment is an expression; its value stays available.
                    self.stack.push(value);
                }
            }
        }
    }

    fn call_value(&mut self, argc: usize, ctx: &mut dyn HostContext) -> Result<()> {
        let callee_idx = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_idx].clone();
        match callee {
            Value::Function(function) => {
                if function.arity as usize != argc {
                    return Err(ScriptError::Type(format!(
                        "'{}' expects {} arguments, got {}",
                        function.name, function.arity, argc
                    )));
                }
                if self.frames.len() >= MAX_FRAMES {
                    return Err(ScriptError::MemoryLimitExceeded);
                }
                self.alloc.charge(FRAME_COST)?;
                self.frames.push(Frame {
                    function,
                    ip: 0,
                    base: self.stack.len() - argc,
                });
                Ok(())
            }
            Value::Builtin(builtin) => {
                let args_start = self.stack.len() - argc;
                let result = {
                    let args = &self.stack[args_start..];
                    (builtin.func)(ctx, args)
                };
                if ctx.has_fault() {
                    return Err(ScriptError::HostFault(
                        ctx.fault_message()
                            .unwrap_or_else(|| builtin.name.to_string()),
                    ));
                }
                self.stack.truncate(callee_idx);
                self.stack.push(result);
                Ok(())
            }
            other => Err(ScriptError::NotAFunction(describe(&other))),
        }
    }

    fn binary_num(
        &mut self,
        verb: &str,
        f: impl Fn(f64, f64) -> Result<f64>,
    ) -> Result<()> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_num(), b.as_num()) {
            (Some(x), Some(y)) => {
                self.stack.push(Value::Num(f(x, y)?));
                Ok(())
            }
            _ => Err(ScriptError::Type(format!(
                "cannot {verb} {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn binary_cmp(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<()> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_num(), b.as_num()) {
            (Some(x), Some(y)) => {
                self.stack.push(Value::Bool(f(x, y)));
                Ok(())
            }
            _ => Err(ScriptError::Type(format!(
                "cannot compare {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn index_set(&mut self, target: &Value, key: Value, value: Value) -> Result<()> {
        match target {
            Value::Array(array) => {
                let idx = array_index(&key)?;
                let mut elems = array.borrow_mut();
                if idx < elems.len() {
                    elems[idx] = value;
                    Ok(())
                } else if idx == elems.len() {
                    self.alloc.charge(SLOT_COST)?;
                    elems.push(value);
                    Ok(())
                } else {
                    Err(ScriptError::Type(format!(
                        "array index {idx} out of range (len {})",
                        elems.len()
                    )))
                }
            }
            Value::Table(table) => {
                let key = match key {
                    Value::Str(s) => s,
                    other => {
                        return Err(ScriptError::Type(format!(
                            "table key must be a string, got {}",
                            other.type_name()
                        )));
                    }
                };
                let mut map = table.borrow_mut();
                if !map.contains_key(&key) {
                    self.alloc.charge(key.len() + 2 * SLOT_COST)?;
                }
                map.insert(key, value);
                Ok(())
            }
            other => Err(ScriptError::Type(format!(
                "cannot index {}",
                other.type_name()
            ))),
        }
    }

    fn current_constant(&self, idx: u16) -> Value {
        let frame = self.frames.last().expect("active frame");
        frame.function.chunk.constants[idx as usize].clone()
    }

    fn constant_name(&self, idx: u16) -> String {
        match self.current_constant(idx) {
            Value::Str(s) => String::from_utf8_lossy(&s).into_owned(),
            other => unreachable!("name constant is not a string: {other:?}"),
        }
    }

    // Compiled chunks keep the stack balanced, so underflow here is a
    // compiler bug, not a script error.
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    fn peek(&self) -> &Value {
        self.stack.last().expect("value stack underflow")
    }
}

fn describe(value: &Value) -> String {
    String::from_utf8_lossy(&value.display_bytes()).into_owned()
}

fn concat_operand(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Str(_) | Value::Num(_) => Ok(value.display_bytes()),
        other => Err(ScriptError::Type(format!(
            "cannot concatenate {}",
            other.type_name()
        ))),
    }
}

fn array_index(key: &Value) -> Result<usize> {
    match key {
        Value::Num(n) if n.fract() == 0.0 && *n >= 0.0 => Ok(*n as usize),
        other => Err(ScriptError::Type(format!(
            "array index must be a non-negative integer, got {}",
            describe(other)
        ))),
    }
}

fn index_get(target: &Value, key: &Value) -> Result<Value> {
    match target {
        Value::Array(array) => {
            let idx = array_index(key)?;
            Ok(array.borrow().get(idx).cloned().unwrap_or(Value::Nil))
        }
        Value::Table(table) => match key {
            Value::Str(s) => Ok(table.borrow().get(s).cloned().unwrap_or(Value::Nil)),
            other => Err(ScriptError::Type(format!(
                "table key must be a string, got {}",
                other.type_name()
            ))),
        },
        other => Err(ScriptError::Type(format!(
            "cannot index {}",
            other.type_name()
        ))),
    }
}
