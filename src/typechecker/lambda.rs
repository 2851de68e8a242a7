//! Lambda checking and capture finalization.
//!
//! A lambda body runs in a fresh scope; whenever a name resolves to a
//! level strictly between the global scope and the lambda's own scope,
//! the `Id` check records it as an implicit parameter (see
//! `expression.rs`). Afterwards the lambda's function-pointer type is
//! rebuilt with the captured types prepended to the explicit parameters.

use crate::parser::ast::Lambda;
use crate::typechecker::types::{FunctionType, Type};

use super::returns::block_returns;
use super::{resolve_type, Check, Context, LambdaFrame, TypeResult};

impl Check for Lambda {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let mut explicit_types = vec![];
        for parameter in &self.parameters {
            explicit_types.push(resolve_type(ctx, &parameter.type_name)?);
        }
        let return_type = resolve_type(ctx, &self.return_type)?;

        ctx.scope.push_scope();
        ctx.lambda_frames.push(LambdaFrame {
            entry_level: ctx.scope.level(),
            implicit: vec![],
        });
        ctx.return_types.push(return_type.clone());

        let mut result = Ok(());
        for (parameter, ty) in self.parameters.iter().zip(&explicit_types) {
            if !ctx.scope.define(&parameter.name, ty.clone()) {
                result = Err(ctx.error(
                    parameter.span,
                    format!("Parameter '{}' is already defined", parameter.name),
                ));
                break;
            }
        }
        if result.is_ok() {
            result = self.body.check(ctx);
        }
        if result.is_ok() && return_type != Type::Void && !block_returns(&self.body) {
            result = Err(ctx.error(self.span, "Missing return statement in lambda"));
        }

        ctx.return_types.pop();
        let frame = ctx.lambda_frames.pop().expect("lambda frame was pushed");
        ctx.scope.pop_scope();
        result?;

        let implicit = frame.implicit;
        let mut params: Vec<Type> = implicit.iter().map(|(_, ty)| ty.clone()).collect();
        let implicit_names: Vec<String> = implicit.iter().map(|(name, _)| name.clone()).collect();
        let implicit_param_count = implicit.len() as u32;
        params.extend(explicit_types);

        let function = FunctionType {
            name: String::new(),
            params,
            return_type: Box::new(return_type),
            has_varargs: false,
            varargs: None,
            is_intrinsic: false,
            is_generic: false,
            generic_names: vec![],
            implicit_names,
            implicit_param_count,
        };

        *self.implicit.borrow_mut() = implicit;
        let ty = Type::Function(Box::new(function));
        self.ty.set(ty.clone());
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::{Expression, Statement};
    use crate::typechecker::test_support::{check_errors, check_source};
    use crate::typechecker::types::Type;

    fn lambda_of(source: &str) -> (u32, Vec<String>) {
        let (unit, sink) = check_source(source);
        let unit = unit.unwrap_or_else(|| {
            panic!(
                "check failed: {:?}",
                sink.diagnostics()
                    .iter()
                    .map(|d| d.message.clone())
                    .collect::<Vec<_>>()
            )
        });
        for statement in &unit.statements {
            let Statement::Function(function) = statement else {
                continue;
            };
            for inner in &function.body.statements {
                let Statement::Field(field) = inner else {
                    continue;
                };
                let Some(Expression::Lambda(lambda)) = &field.value else {
                    continue;
                };
                let Type::Function(ty) = lambda.ty.get() else {
                    panic!("lambda has no function type");
                };
                return (
                    ty.implicit_param_count,
                    ty.implicit_names.clone(),
                );
            }
        }
        panic!("no lambda found");
    }

    #[test]
    fn test_lambda_without_captures() {
        let (count, names) = lambda_of(
            "fun main() int64 {
                var f = fun (x int64) -> int64 { return x; };
                return 0;
            }",
        );
        assert_eq!(count, 0);
        assert!(names.is_empty());
    }

    #[test]
    fn test_lambda_captures_enclosing_local() {
        let (count, names) = lambda_of(
            "fun main() int64 {
                var y = 10;
                var f = fun (x int64) -> int64 { return x + y; };
                return 0;
            }",
        );
        assert_eq!(count, 1);
        assert_eq!(names, vec!["y".to_string()]);
    }

    #[test]
    fn test_lambda_does_not_capture_globals() {
        let (count, _) = lambda_of(
            "var g = 10;
            fun main() int64 {
                var f = fun (x int64) -> int64 { return x + g; };
                return 0;
            }",
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn test_returning_capturing_lambda_is_rejected() {
        let errors = check_errors(
            "fun make() (int64) -> int64 {
                var y = 1;
                return fun (x int64) -> int64 { return x + y; };
            }",
        );
        assert!(
            errors.iter().any(|e| e.contains("captures")),
            "{errors:?}"
        );
    }
}
