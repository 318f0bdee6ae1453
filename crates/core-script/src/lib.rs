//! Gza scripting language: lexer, bytecode compiler, and stack VM.
//!
//! Scripts compile to a [`chunk::Chunk`] of enum opcodes executed by
//! [`vm::Vm`]. The VM is synchronous and cooperative: it checks a wall-clock
//! deadline between opcode batches and charges every allocation point
//! (string concatenation, array/table growth, call frames) against a
//! [`alloc::TrackedAlloc`] byte budget. Host integration happens through
//! builtin functions that receive an explicit [`HostContext`]; there is no
//! global or thread-local host state.

use thiserror::Error;

pub mod alloc;
pub mod chunk;
pub mod compiler;
pub mod lexer;
pub mod value;
pub mod vm;

pub use alloc::TrackedAlloc;
pub use chunk::{Chunk, Op};
pub use compiler::compile;
pub use value::{Builtin, Function, StrRef, Value};
pub use vm::{HostContext, NullHost, Vm};

/// Script compilation and execution failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Syntax error with 1-based source position.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },
    /// Operand or argument type mismatch, including division by zero.
    #[error("type error: {0}")]
    Type(String),
    /// Read of a global that was never defined.
    #[error("undefined name '{0}'")]
    UndefinedName(String),
    /// Call of a value that is neither a script function nor a builtin.
    #[error("'{0}' is not a function")]
    NotAFunction(String),
    /// Tracked allocator refused an allocation past the byte budget.
    #[error("memory limit exceeded")]
    MemoryLimitExceeded,
    /// Cooperative wall-clock deadline fired between opcodes.
    #[error("execution timed out")]
    ExecutionTimeout,
    /// A builtin scheduled a pending host error; the host holds the detail.
    #[error("host fault: {0}")]
    HostFault(String),
}

pub type Result<T> = std::result::Result<T, ScriptError>;
