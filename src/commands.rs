//! # Demo Command Registry
//!
//! The three commands the reference implementation's own test suite is
//! built around: integer `+`/`-`, and a context-aware string `..`
//! (concatenation) that demonstrates `needs_context`. An embedding
//! application registers its own commands the same way; these exist so the
//! binary has something to serve out of the box and so the golden
//! end-to-end scenarios have a concrete registry to run against.

use crate::context::SessionContext;
use crate::error::VmError;
use crate::registry::{HostFn, Registry};
use crate::value::{Type, Value};

/// Build the demo registry: `0 +`, `1 -`, `2 ..`.
pub fn demo_registry() -> Registry {
    let mut registry = Registry::new();

    registry.register(
        "+",
        vec![Type::I64, Type::I64],
        HostFn::Plain(Box::new(|args| {
            let a = args[0].as_i64()?;
            let b = args[1].as_i64()?;
            Ok(vec![Value::I64(a + b)])
        })),
    );

    registry.register(
        "-",
        vec![Type::I64, Type::I64],
        HostFn::Plain(Box::new(|args| {
            let a = args[0].as_i64()?;
            let b = args[1].as_i64()?;
            Ok(vec![Value::I64(a - b)])
        })),
    );

    registry.register(
        "..",
        vec![Type::String, Type::String],
        HostFn::Contextual(Box::new(concat)),
    );

    registry
}

/// `Concat(context, a, b) string { return a + b }` in the reference test
/// suite. A `needs_context` command still receives its stack-derived
/// arguments in the same pop order as any other command; the context is a
/// separate, prepended parameter, not a stack value.
fn concat(_ctx: &SessionContext, args: &[Value]) -> Result<Vec<Value>, VmError> {
    let a = args[0].as_str()?;
    let b = args[1].as_str()?;
    Ok(vec![Value::Str(format!("{}{}", a, b))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_three_commands_in_order() {
        let registry = demo_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(0).unwrap().descriptor.name, "+");
        assert_eq!(registry.get(1).unwrap().descriptor.name, "-");
        assert_eq!(registry.get(2).unwrap().descriptor.name, "..");
    }

    #[test]
    fn only_concat_is_flagged_as_needing_context() {
        let registry = demo_registry();
        assert!(!registry.get(0).unwrap().needs_context());
        assert!(!registry.get(1).unwrap().needs_context());
        assert!(registry.get(2).unwrap().needs_context());
    }

    #[test]
    fn concat_joins_in_arg_order() {
        let ctx = SessionContext::new();
        let result = concat(
            &ctx,
            &[Value::Str("123".to_string()), Value::Str("456".to_string())],
        )
        .unwrap();
        assert_eq!(result, vec![Value::Str("123456".to_string())]);
    }
}
