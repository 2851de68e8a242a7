//! Call checking: direct calls, calls through function pointers and
//! returned functions, lambda calls, and generic instantiation.

use std::collections::HashMap;

use crate::lexer::Span;
use crate::parser::ast::{Call, Expression, FunctionDeclaration};
use crate::typechecker::types::{FunctionType, Type};

use super::generics::unify;
use super::{coerce, resolve_type, Check, Context, TypeResult};

impl Check for Call {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        // A plain name may refer to a generic function, which never lives
        // in the value scope; everything else is an ordinary callee
        // expression whose type must be callable.
        if let Expression::Id(id) = &*self.callee {
            if ctx.scope.lookup(&id.name).is_none()
                && ctx.generic_functions.contains_key(&id.name)
            {
                return self.check_generic(ctx);
            }
            if !self.generic_arguments.is_empty() {
                return Err(ctx.error(
                    self.span,
                    format!("Function '{}' takes no generic arguments", id.name),
                ));
            }
        }

        let callee_type = self.callee.check(ctx)?;
        let function = callable(ctx, &callee_type, self.callee.span())?;
        let return_type = check_arguments(ctx, &function, &self.arguments, self.span)?;
        self.ty.set(return_type.clone());
        Ok(return_type)
    }
}

/// Extracts the function signature of a callee type; calling through a
/// function pointer dereferences implicitly.
fn callable(ctx: &mut Context<'_>, ty: &Type, span: Span) -> TypeResult<FunctionType> {
    match ty {
        Type::Function(function) => Ok((**function).clone()),
        Type::Pointer(base) => match &**base {
            Type::Function(function) => Ok((**function).clone()),
            _ => Err(ctx.error(span, format!("'{ty}' is not callable"))),
        },
        _ => Err(ctx.error(span, format!("'{ty}' is not callable"))),
    }
}

/// Checks call-site arguments against the callee's explicit parameters
/// (captured implicit parameters are prepended by the emitter, never
/// written by the caller). Returns the call's type.
pub(crate) fn check_arguments(
    ctx: &mut Context<'_>,
    function: &FunctionType,
    arguments: &[Expression],
    span: Span,
) -> TypeResult<Type> {
    let expected = function.explicit_params();

    if function.has_varargs {
        if arguments.len() < expected.len() {
            return Err(ctx.error(
                span,
                format!(
                    "Call takes at least {} arguments, got {}",
                    expected.len(),
                    arguments.len()
                ),
            ));
        }
    } else if arguments.len() != expected.len() {
        return Err(ctx.error(
            span,
            format!(
                "Call takes {} arguments, got {}",
                expected.len(),
                arguments.len()
            ),
        ));
    }

    for (argument, parameter) in arguments.iter().zip(expected) {
        argument.check(ctx)?;
        if let Expression::Lambda(lambda) = argument {
            if !lambda.implicit.borrow().is_empty() {
                return Err(ctx.error(
                    argument.span(),
                    "A lambda in argument position can not capture",
                ));
            }
        }
        coerce(ctx, argument, parameter)?;
    }

    for argument in &arguments[expected.len()..] {
        argument.check(ctx)?;
        match &function.varargs {
            Some(vararg_type) => {
                coerce(ctx, argument, vararg_type)?;
            }
            None => {
                // Unconstrained varargs still need a concrete type.
                match argument.ty() {
                    Type::Null => argument.type_slot().set(Type::pointer_to(Type::Void)),
                    Type::None => {
                        return Err(ctx.error(
                            argument.span(),
                            "Varargs argument needs a concrete type",
                        ));
                    }
                    _ => {}
                }
            }
        }
    }

    Ok((*function.return_type).clone())
}

impl Call {
    /// Instantiates a generic function for this call site: generic
    /// arguments are taken explicitly or inferred by unification, the
    /// concrete signature is interned under the mangled instance name,
    /// and the instance body is queued for checking at global scope.
    fn check_generic(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let Expression::Id(id) = &*self.callee else {
            unreachable!("generic calls go through a plain name");
        };
        let declaration = ctx
            .generic_functions
            .get(&id.name)
            .cloned()
            .expect("caller verified the generic exists");
        let generic_names = declaration.prototype.generic_parameters.clone();

        for argument in &self.arguments {
            argument.check(ctx)?;
        }

        let mut bindings: HashMap<String, Type> = HashMap::new();
        if !self.generic_arguments.is_empty() {
            if self.generic_arguments.len() != generic_names.len() {
                return Err(ctx.error(
                    self.span,
                    format!(
                        "Function '{}' takes {} generic arguments, got {}",
                        id.name,
                        generic_names.len(),
                        self.generic_arguments.len()
                    ),
                ));
            }
            for (name, argument) in generic_names.iter().zip(&self.generic_arguments) {
                let ty = resolve_type(ctx, argument)?;
                bindings.insert(name.clone(), ty);
            }
        } else {
            let parameter_types = self.generic_parameter_types(&declaration, ctx)?;
            if self.arguments.len() != parameter_types.len() {
                return Err(ctx.error(
                    self.span,
                    format!(
                        "Call takes {} arguments, got {}",
                        parameter_types.len(),
                        self.arguments.len()
                    ),
                ));
            }
            for (parameter, argument) in parameter_types.iter().zip(&self.arguments) {
                unify(ctx, parameter, &argument.ty(), &mut bindings, argument.span())?;
            }
        }

        for name in &generic_names {
            if !bindings.contains_key(name) {
                return Err(ctx.error(self.span, "Can't resolve generic type from argument"));
            }
        }

        let mangled = format!(
            "{}{}",
            id.name,
            generic_names
                .iter()
                .map(|name| bindings[name].mangle())
                .collect::<String>()
        );

        let function = self.instantiate(&declaration, &bindings, &mangled, ctx)?;
        let return_type = check_arguments(ctx, &function, &self.arguments, self.span)?;

        *self.resolved_name.borrow_mut() = Some(mangled);
        id.ty.set(Type::Function(Box::new(function)));
        self.ty.set(return_type.clone());
        Ok(return_type)
    }

    /// Parameter types of the generic prototype with its generic names
    /// bound to [`Type::GenericParameter`] placeholders, ready for
    /// unification.
    fn generic_parameter_types(
        &self,
        declaration: &FunctionDeclaration,
        ctx: &mut Context<'_>,
    ) -> TypeResult<Vec<Type>> {
        ctx.scope.push_scope();
        for name in &declaration.prototype.generic_parameters {
            ctx.scope
                .define(name, Type::GenericParameter(name.clone()));
        }
        let mut parameter_types = vec![];
        let mut failure = None;
        for parameter in &declaration.prototype.parameters {
            match resolve_type(ctx, &parameter.type_name) {
                Ok(ty) => parameter_types.push(ty),
                Err(stop) => {
                    failure = Some(stop);
                    break;
                }
            }
        }
        ctx.scope.pop_scope();
        match failure {
            Some(stop) => Err(stop),
            None => Ok(parameter_types),
        }
    }

    /// Resolves the concrete signature of an instance and queues its body
    /// for checking (once per mangled name).
    fn instantiate(
        &self,
        declaration: &FunctionDeclaration,
        bindings: &HashMap<String, Type>,
        mangled: &str,
        ctx: &mut Context<'_>,
    ) -> TypeResult<FunctionType> {
        if let Some(Type::Function(function)) = ctx.scope.lookup(mangled).cloned() {
            return Ok(*function);
        }

        let mut instance = declaration.clone();
        instance.prototype.name = mangled.to_string();
        instance.prototype.generic_parameters = vec![];

        ctx.scope.push_scope();
        for (name, ty) in bindings {
            ctx.scope.define(name, ty.clone());
        }
        let mut params = vec![];
        let mut failure = None;
        for parameter in &instance.prototype.parameters {
            match resolve_type(ctx, &parameter.type_name) {
                Ok(ty) => params.push(ty),
                Err(stop) => {
                    failure = Some(stop);
                    break;
                }
            }
        }
        let return_type = match failure {
            Some(_) => Type::Void,
            None => match resolve_type(ctx, &instance.prototype.return_type) {
                Ok(ty) => ty,
                Err(stop) => {
                    failure = Some(stop);
                    Type::Void
                }
            },
        };
        ctx.scope.pop_scope();
        if let Some(stop) = failure {
            return Err(stop);
        }

        let function = FunctionType::plain(mangled, params, return_type);
        let ty = Type::Function(Box::new(function.clone()));
        instance.prototype.ty.set(ty.clone());
        ctx.scope.replace_global(mangled, ty);
        ctx.monomorphized_functions.insert(mangled.to_string());
        ctx.pending_instances.push((instance, bindings.clone()));

        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::Statement;
    use crate::typechecker::test_support::{check_errors, check_source};

    #[test]
    fn test_generic_identity_is_monomorphized() {
        let (unit, sink) = check_source(
            "fun id<T>(x T) T { return x; }
            fun main() int64 { return id<int64>(42); }",
        );
        let unit = unit.unwrap_or_else(|| {
            panic!(
                "{:?}",
                sink.diagnostics()
                    .iter()
                    .map(|d| d.message.clone())
                    .collect::<Vec<_>>()
            )
        });

        let instance = unit.statements.iter().any(|statement| {
            matches!(statement, Statement::Function(f) if f.prototype.name == "idi64")
        });
        assert!(instance, "expected an 'idi64' instance to be appended");
    }

    #[test]
    fn test_generic_inference_from_arguments() {
        let (unit, _) = check_source(
            "fun id<T>(x T) T { return x; }
            fun main() int64 { return id(42); }",
        );
        assert!(unit.is_some());
    }

    #[test]
    fn test_equal_instantiations_share_one_instance() {
        let (unit, _) = check_source(
            "fun id<T>(x T) T { return x; }
            fun main() int64 {
                var a = id<int64>(1);
                var b = id<int64>(2);
                return a + b;
            }",
        );
        let unit = unit.expect("check should succeed");
        let count = unit
            .statements
            .iter()
            .filter(|statement| {
                matches!(statement, Statement::Function(f) if f.prototype.name == "idi64")
            })
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_null_argument_can_not_infer() {
        let errors = check_errors(
            "fun id<T>(x T) T { return x; }
            fun main() int64 { id(null); return 0; }",
        );
        assert!(
            errors
                .iter()
                .any(|e| e.contains("Can't resolve generic type from argument")),
            "{errors:?}"
        );
    }

    #[test]
    fn test_wrong_arity_is_reported() {
        let errors = check_errors(
            "fun f(x int64) int64 { return x; }
            fun main() int64 { return f(1, 2); }",
        );
        assert!(errors.iter().any(|e| e.contains("arguments")), "{errors:?}");
    }

    #[test]
    fn test_call_through_function_pointer_field() {
        let (unit, sink) = check_source(
            "struct S { f *((int64) -> int64); }
            fun inc(x int64) int64 { return x + 1; }
            fun main() int64 { var s = S { &inc }; return s.f(41); }",
        );
        assert!(
            unit.is_some(),
            "{:?}",
            sink.diagnostics()
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
        );
    }
}
