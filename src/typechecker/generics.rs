//! Generic type machinery: struct monomorphization and the unification
//! used for generic function argument inference.
//!
//! Substitution always goes through an explicit binding map (generic name
//! to concrete type); there is no ambient map. Monomorphized structs
//! intern in the global scope under their mangled names, which keeps
//! instance names deterministic.

use std::collections::HashMap;

use crate::lexer::Span;

use super::types::{StructType, Type};
use super::{resolve_type, Context, TypeResult};

/// Whether a type still mentions an unbound generic parameter.
pub(crate) fn contains_generic(ty: &Type) -> bool {
    match ty {
        Type::GenericParameter(_) => true,
        Type::Pointer(base) => contains_generic(base),
        Type::StaticArray { element, .. } | Type::StaticVector { element, .. } => {
            contains_generic(element)
        }
        Type::Function(function) => {
            function.params.iter().any(contains_generic) || contains_generic(&function.return_type)
        }
        Type::Tuple { field_types, .. } => field_types.iter().any(contains_generic),
        Type::GenericStruct { parameters, .. } => parameters.iter().any(contains_generic),
        _ => false,
    }
}

/// Resolves `Name<T1, T2>` to a concrete instance. The concrete struct is
/// interned in the global scope under its mangled name; equal parameter
/// sequences always yield the same name. While the arguments still
/// contain generic parameters (inside a generic prototype), only a
/// skeleton is produced for later unification.
pub(crate) fn resolve_generic_struct(
    ctx: &mut Context<'_>,
    name: &str,
    parameters: Vec<Type>,
    span: Span,
) -> TypeResult<Type> {
    let Some(declaration) = ctx.generic_structs.get(name).cloned() else {
        return Err(ctx.error(span, format!("Undefined generic struct '{name}'")));
    };

    if declaration.generic_parameters.len() != parameters.len() {
        return Err(ctx.error(
            span,
            format!(
                "Struct '{name}' takes {} generic parameters, got {}",
                declaration.generic_parameters.len(),
                parameters.len()
            ),
        ));
    }

    if parameters.iter().any(contains_generic) {
        let skeleton = StructType {
            name: name.to_string(),
            field_names: vec![],
            field_types: vec![],
            generic_parameters: declaration.generic_parameters.clone(),
            generic_parameter_types: vec![],
            is_packed: declaration.is_packed,
            is_generic: true,
            is_extern: declaration.is_extern,
        };
        return Ok(Type::GenericStruct {
            base: Box::new(skeleton),
            parameters,
        });
    }

    let mangled = Type::monomorphized_struct_name(name, &parameters);
    if let Some(Type::Struct(interned)) = ctx.scope.lookup(&mangled).cloned() {
        let mut base = (*interned).clone();
        base.name = name.to_string();
        return Ok(Type::GenericStruct {
            base: Box::new(base),
            parameters,
        });
    }

    // Intern a stub first so self-referential fields terminate.
    let stub = StructType {
        name: mangled.clone(),
        field_names: vec![],
        field_types: vec![],
        generic_parameters: declaration.generic_parameters.clone(),
        generic_parameter_types: parameters.clone(),
        is_packed: declaration.is_packed,
        is_generic: false,
        is_extern: declaration.is_extern,
    };
    ctx.scope
        .replace_global(&mangled, Type::Struct(Box::new(stub)));

    // Field types resolve with the struct's own generic parameters bound.
    ctx.scope.push_scope();
    for (generic_name, parameter) in declaration.generic_parameters.iter().zip(&parameters) {
        ctx.scope.define(generic_name, parameter.clone());
    }
    let mut field_names = vec![];
    let mut field_types = vec![];
    let mut failure = None;
    for (field_name, field_type) in &declaration.fields {
        match resolve_type(ctx, field_type) {
            Ok(ty) => {
                field_names.push(field_name.clone());
                field_types.push(ty);
            }
            Err(stop) => {
                failure = Some(stop);
                break;
            }
        }
    }
    ctx.scope.pop_scope();
    if let Some(stop) = failure {
        return Err(stop);
    }

    let concrete = StructType {
        name: mangled.clone(),
        field_names,
        field_types,
        generic_parameters: declaration.generic_parameters.clone(),
        generic_parameter_types: parameters.clone(),
        is_packed: declaration.is_packed,
        is_generic: false,
        is_extern: declaration.is_extern,
    };
    ctx.scope
        .replace_global(&mangled, Type::Struct(Box::new(concrete.clone())));

    let mut base = concrete;
    base.name = name.to_string();
    Ok(Type::GenericStruct {
        base: Box::new(base),
        parameters,
    })
}

/// Unifies a prototype parameter type against a call-site argument type,
/// binding generic names as they are encountered. Null and void arguments
/// carry no usable type information and are rejected.
pub(crate) fn unify(
    ctx: &mut Context<'_>,
    param: &Type,
    arg: &Type,
    bindings: &mut HashMap<String, Type>,
    span: Span,
) -> TypeResult<()> {
    match (param, arg) {
        (Type::GenericParameter(name), _) => {
            if matches!(arg, Type::Null | Type::Void) {
                return Err(ctx.error(span, "Can't resolve generic type from argument"));
            }
            if let Some(existing) = bindings.get(name) {
                if existing != arg {
                    return Err(ctx.error(
                        span,
                        format!(
                            "Generic parameter '{name}' bound to both '{existing}' and '{arg}'"
                        ),
                    ));
                }
                return Ok(());
            }
            bindings.insert(name.clone(), arg.clone());
            Ok(())
        }
        (Type::Pointer(p), Type::Pointer(a)) => unify(ctx, p, a, bindings, span),
        (
            Type::StaticArray {
                element: pe,
                size: ps,
            },
            Type::StaticArray {
                element: ae,
                size: aw,
            },
        ) if ps == aw => unify(ctx, pe, ae, bindings, span),
        (Type::Function(p), Type::Function(a)) if p.params.len() == a.params.len() => {
            for (pp, ap) in p.params.iter().zip(&a.params) {
                unify(ctx, pp, ap, bindings, span)?;
            }
            unify(ctx, &p.return_type, &a.return_type, bindings, span)
        }
        (
            Type::Tuple {
                field_types: pf, ..
            },
            Type::Tuple {
                field_types: af, ..
            },
        ) if pf.len() == af.len() => {
            for (pp, ap) in pf.iter().zip(af) {
                unify(ctx, pp, ap, bindings, span)?;
            }
            Ok(())
        }
        (
            Type::GenericStruct {
                base: pb,
                parameters: pp,
            },
            Type::GenericStruct {
                base: ab,
                parameters: ap,
            },
        ) if pb.name == ab.name && pp.len() == ap.len() => {
            for (p, a) in pp.iter().zip(ap) {
                unify(ctx, p, a, bindings, span)?;
            }
            Ok(())
        }
        _ if param == arg => Ok(()),
        _ => Err(ctx.error(span, "Can't resolve generic type from argument")),
    }
}
