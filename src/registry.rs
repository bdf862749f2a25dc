//! # Command Registry & Invoker
//!
//! The registry is the ordered list of host commands a session can `Call`
//! by index. Invocation is deliberately runtime-typed: a command takes
//! `&[Value]` and returns `Result<Vec<Value>, VmError>`, so registering a
//! command never requires generic glue code on the embedder's side, and a
//! declared/actual argument type mismatch surfaces the same way a host
//! panic does — caught at the invoke boundary and turned into a `Host`
//! error, never a crashed session.
//!
//! This is Option (a) from the invoker design: erase host callables to a
//! boxed `Fn`, let each command check its own argument shapes. It mirrors
//! how the reference Go implementation resolves this with `reflect.Value`
//! and `defer recover()` — the boxed closure plus `catch_unwind` is the
//! idiomatic Rust shape of the same contract.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::context::SessionContext;
use crate::error::VmError;
use crate::value::{CommandDescriptor, Type, Value};

/// A host command's implementation.
///
/// `needs_context` (§4.4 point 1) is encoded as the choice of variant, not
/// a separate flag: a [`HostFn::Plain`] command never sees the session's
/// [`SessionContext`], and a [`HostFn::Contextual`] command always does —
/// `Registry::invoke` matches on this to decide whether to prepend `ctx`
/// before calling in, rather than passing it to every command and trusting
/// the closure to ignore it.
pub enum HostFn {
    Plain(Box<dyn Fn(&[Value]) -> Result<Vec<Value>, VmError> + Send + Sync>),
    Contextual(Box<dyn Fn(&SessionContext, &[Value]) -> Result<Vec<Value>, VmError> + Send + Sync>),
}

/// One entry in the registry: its wire-visible descriptor plus the host
/// closure `Call` dispatches to.
pub struct Command {
    pub descriptor: CommandDescriptor,
    pub func: HostFn,
}

impl Command {
    /// Number of values `Call` must pop off the stack before invoking this
    /// command (this is `arglen` in §4.4/§4.5 of the protocol).
    pub fn arity(&self) -> usize {
        self.descriptor.argument_types.len()
    }

    /// Whether this command's invocation is prepended with the session's
    /// `SessionContext` (§4.4 point 1).
    pub fn needs_context(&self) -> bool {
        matches!(self.func, HostFn::Contextual(_))
    }
}

/// The ordered, read-only-after-construction list of commands a session can
/// invoke. Shared by reference across all sessions on a server.
pub struct Registry {
    commands: Vec<Command>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            commands: Vec::new(),
        }
    }

    /// Register a command. Its `id` is assigned as the next index and its
    /// `Call` opcode operand; this mirrors the reference implementation,
    /// where a command's wire `id` is its position in `Commands`.
    pub fn register(&mut self, name: impl Into<String>, argument_types: Vec<Type>, func: HostFn) {
        let id = self.commands.len() as i64;
        self.commands.push(Command {
            descriptor: CommandDescriptor {
                id,
                name: name.into(),
                argument_types,
            },
            func,
        });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, index: i64) -> Option<&Command> {
        if index < 0 {
            return None;
        }
        self.commands.get(index as usize)
    }

    /// The `Command_Array` value `ListCommands` pushes.
    pub fn as_command_array(&self) -> Value {
        Value::CommandArray(
            self.commands
                .iter()
                .map(|c| c.descriptor.clone())
                .collect(),
        )
    }

    /// Invoke the command at `index` with `args` (already popped off the
    /// stack in §4.4's order), returning its push-order results.
    ///
    /// Prepends `ctx` to the call only when the command is
    /// [`HostFn::Contextual`] (§4.4 point 1) — a `Plain` command's closure
    /// never receives it.
    ///
    /// A panic raised inside the command's closure — a host bug, or a
    /// declared/actual argument type mismatch the command didn't check
    /// itself — is caught here and converted to [`VmError::Host`], the
    /// same way the reference `dynamicInvoke`'s `recover()` converts a Go
    /// panic.
    pub fn invoke(
        &self,
        index: i64,
        ctx: &SessionContext,
        args: &[Value],
    ) -> Result<Vec<Value>, VmError> {
        let cmd = self
            .get(index)
            .ok_or_else(|| VmError::no_such_opcode(index))?;

        let result = catch_unwind(AssertUnwindSafe(|| match &cmd.func {
            HostFn::Plain(f) => f(args),
            HostFn::Contextual(f) => f(ctx, args),
        }));
        match result {
            Ok(inner) => inner,
            Err(panic) => {
                let msg = panic_message(&panic);
                Err(VmError::Host(msg))
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "host command panicked".to_string()
    }
}
