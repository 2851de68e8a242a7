//! The type resolver: a single post-order walk over the parsed unit.
//!
//! The checker fills every expression's value-type slot, monomorphizes
//! generic functions and structs, resolves operator overloads through the
//! mangling scheme, infers lambda captures from scope levels, and verifies
//! switch completeness and missing returns. Declarations of structs, enums
//! and function prototypes are registered in a shallow pre-pass so bodies
//! can reference them regardless of order.

pub mod scope;
pub mod types;

mod call;
mod expression;
mod generics;
mod lambda;
mod returns;
mod statement;

pub use returns::always_returns;

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{DiagnosticSink, Stage, Stop};
use crate::lexer::Span;
use crate::parser::ast::{
    CompilationUnit, Expression, FunctionDeclaration, NumberValue, Statement, StructDeclaration,
    TypeName,
};

use scope::ScopedMap;
use types::{FunctionType, NumberKind, Type};

pub type TypeResult<T> = Result<T, Stop>;

/// Per-lambda capture bookkeeping. `entry_level` is the scope level of the
/// lambda's own parameter scope; names resolved strictly between the
/// global scope and that level are captures.
pub(crate) struct LambdaFrame {
    pub entry_level: usize,
    pub implicit: Vec<(String, Type)>,
}

/// Everything the resolver owns while walking one unit.
pub struct Context<'a> {
    pub sink: &'a mut DiagnosticSink,
    pub scope: ScopedMap<Type>,
    pub(crate) generic_functions: HashMap<String, FunctionDeclaration>,
    pub(crate) generic_structs: HashMap<String, StructDeclaration>,
    pub(crate) return_types: Vec<Type>,
    pub(crate) lambda_frames: Vec<LambdaFrame>,
    pub(crate) loop_depth: usize,
    pub(crate) monomorphized: Vec<Statement>,
    pub(crate) monomorphized_functions: HashSet<String>,
    /// Instances whose bodies still need checking, processed at global
    /// scope once the main walk is done (an instance can enqueue more).
    pub(crate) pending_instances: Vec<(FunctionDeclaration, HashMap<String, Type>)>,
}

impl<'a> Context<'a> {
    pub fn new(sink: &'a mut DiagnosticSink) -> Self {
        Context {
            sink,
            scope: ScopedMap::new(),
            generic_functions: HashMap::new(),
            generic_structs: HashMap::new(),
            return_types: vec![],
            lambda_frames: vec![],
            loop_depth: 0,
            monomorphized: vec![],
            monomorphized_functions: HashSet::new(),
            pending_instances: vec![],
        }
    }

    pub(crate) fn error(&mut self, span: Span, message: impl ToString) -> Stop {
        self.sink.error(Stage::Type, span, message)
    }

    pub(crate) fn warning(&mut self, span: Span, message: impl ToString) {
        self.sink.warning(Stage::Type, span, message);
    }
}

pub(crate) trait Check {
    type Output;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Self::Output>;
}

/// Entry point of the check phase.
pub struct TypeChecker<'a> {
    ctx: Context<'a>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(sink: &'a mut DiagnosticSink) -> Self {
        TypeChecker {
            ctx: Context::new(sink),
        }
    }

    /// Checks the unit in place. Monomorphized generic functions are
    /// appended to the unit's statements so the emitter treats them like
    /// any other declaration.
    pub fn check(mut self, unit: &mut CompilationUnit) -> TypeResult<()> {
        statement::shallow_check(&unit.statements, &mut self.ctx)?;

        for statement in &unit.statements {
            statement.check(&mut self.ctx)?;
        }

        // Monomorphized bodies are checked at global scope; checking one
        // may enqueue further instances.
        while let Some((instance, bindings)) = self.ctx.pending_instances.pop() {
            self.ctx.scope.push_scope();
            for (name, ty) in &bindings {
                self.ctx.scope.define(name, ty.clone());
            }
            let result = instance.check(&mut self.ctx);
            self.ctx.scope.pop_scope();
            result?;
            self.ctx.monomorphized.push(Statement::Function(instance));
        }

        unit.statements.append(&mut self.ctx.monomorphized);
        Ok(())
    }
}

/// Resolves a written type against the current scope.
pub(crate) fn resolve_type(ctx: &mut Context<'_>, type_name: &TypeName) -> TypeResult<Type> {
    match type_name {
        TypeName::Named { name, span } => resolve_named_type(ctx, name, *span),
        TypeName::Pointer { base, .. } => {
            Ok(Type::pointer_to(resolve_type(ctx, base)?))
        }
        TypeName::Array {
            size,
            element,
            ..
        } => Ok(Type::StaticArray {
            element: Box::new(resolve_type(ctx, element)?),
            size: *size,
        }),
        TypeName::Vector {
            size,
            element,
            span,
        } => {
            let element = resolve_type(ctx, element)?;
            let valid = matches!(element, Type::Number(kind) if kind.is_unsigned() || kind.is_float());
            if !valid {
                return Err(ctx.error(
                    *span,
                    format!("Vector element must be an unsigned integer or float, got '{element}'"),
                ));
            }
            Ok(Type::StaticVector {
                element: Box::new(element),
                size: *size,
            })
        }
        TypeName::Function {
            params,
            return_type,
            ..
        } => {
            let mut parameter_types = vec![];
            for param in params {
                parameter_types.push(resolve_type(ctx, param)?);
            }
            let return_type = resolve_type(ctx, return_type)?;
            Ok(Type::Function(Box::new(FunctionType::plain(
                "",
                parameter_types,
                return_type,
            ))))
        }
        TypeName::Generic {
            name,
            arguments,
            span,
        } => {
            let mut parameters = vec![];
            for argument in arguments {
                parameters.push(resolve_type(ctx, argument)?);
            }
            generics::resolve_generic_struct(ctx, name, parameters, *span)
        }
    }
}

fn resolve_named_type(ctx: &mut Context<'_>, name: &str, span: Span) -> TypeResult<Type> {
    let builtin = match name {
        "void" => Some(Type::Void),
        "bool" => Some(Type::Number(NumberKind::I1)),
        "char" | "int8" => Some(Type::Number(NumberKind::I8)),
        "int16" => Some(Type::Number(NumberKind::I16)),
        "int32" => Some(Type::Number(NumberKind::I32)),
        "int64" => Some(Type::Number(NumberKind::I64)),
        "uint8" => Some(Type::Number(NumberKind::U8)),
        "uint16" => Some(Type::Number(NumberKind::U16)),
        "uint32" => Some(Type::Number(NumberKind::U32)),
        "uint64" => Some(Type::Number(NumberKind::U64)),
        "float32" => Some(Type::Number(NumberKind::F32)),
        "float64" => Some(Type::Number(NumberKind::F64)),
        other => NumberKind::from_suffix(other).map(Type::Number),
    };
    if let Some(ty) = builtin {
        return Ok(ty);
    }

    match ctx.scope.lookup(name) {
        // A named enum in type position is the type of its values.
        Some(Type::Enum(e)) => Ok(Type::EnumElement {
            enum_name: e.name.clone(),
            element: e.element,
        }),
        Some(ty) => Ok(ty.clone()),
        None => Err(ctx.error(span, format!("Undefined type '{name}'"))),
    }
}

/// Matches an already-checked expression against an expected type,
/// applying the literal relaxations: unsuffixed numeric literals retarget
/// to the expected kind (with a range check, floats bounded by ±max),
/// `null` adopts a pointer type, `undefined` adopts anything, and an empty
/// array literal inherits the expected element type. Aggregate literals
/// recurse element-wise.
pub(crate) fn coerce(
    ctx: &mut Context<'_>,
    expression: &Expression,
    expected: &Type,
) -> TypeResult<Type> {
    let actual = expression.ty();
    if actual == *expected {
        return Ok(actual);
    }

    match expression {
        Expression::Null(null) => {
            if let Type::Pointer(_) = expected {
                null.ty.set(expected.clone());
                return Ok(expected.clone());
            }
        }
        Expression::Undefined(undef) => {
            undef.ty.set(expected.clone());
            return Ok(expected.clone());
        }
        Expression::Number(num) if !num.suffixed => {
            if let Type::Number(kind) = expected {
                match num.value {
                    NumberValue::Integer(value) => {
                        if kind.is_float() {
                            num.ty.set(expected.clone());
                            return Ok(expected.clone());
                        }
                        if !kind.fits_integer(value) {
                            return Err(ctx.error(
                                num.span,
                                format!("Literal {value} does not fit into '{expected}'"),
                            ));
                        }
                        num.ty.set(expected.clone());
                        return Ok(expected.clone());
                    }
                    NumberValue::Floating(value) => {
                        if kind.is_float() {
                            if !kind.fits_float(value) {
                                return Err(ctx.error(
                                    num.span,
                                    format!("Literal {value} does not fit into '{expected}'"),
                                ));
                            }
                            num.ty.set(expected.clone());
                            return Ok(expected.clone());
                        }
                    }
                }
            }
        }
        Expression::Infinity(infinity) => {
            if matches!(expected, Type::Number(kind) if kind.is_float()) {
                infinity.ty.set(expected.clone());
                return Ok(expected.clone());
            }
        }
        Expression::PrefixUnary(_) => {
            if retargets(expression, expected) {
                return Ok(expected.clone());
            }
        }
        Expression::Array(array) => {
            if let Type::StaticArray { element, size } = expected {
                if array.elements.is_empty() || array.elements.len() == *size as usize {
                    for element_expression in &array.elements {
                        coerce(ctx, element_expression, element)?;
                    }
                    array.ty.set(expected.clone());
                    return Ok(expected.clone());
                }
            }
        }
        Expression::Vector(vector) => {
            if let Type::StaticVector { element, size } = expected {
                if vector.elements.len() == *size as usize {
                    for element_expression in &vector.elements {
                        coerce(ctx, element_expression, element)?;
                    }
                    vector.ty.set(expected.clone());
                    return Ok(expected.clone());
                }
            }
        }
        Expression::Tuple(tuple) => {
            if let Type::Tuple { field_types, .. } = expected {
                if tuple.elements.len() == field_types.len() {
                    for (element, field) in tuple.elements.iter().zip(field_types) {
                        coerce(ctx, element, field)?;
                    }
                    tuple.ty.set(expected.clone());
                    return Ok(expected.clone());
                }
            }
        }
        _ => {}
    }

    Err(ctx.error(
        expression.span(),
        format!("Expected type '{expected}' but got '{actual}'"),
    ))
}

/// Non-reporting variant of the numeric literal relaxation: returns
/// whether `expression` could be (and now has been) retargeted to
/// `expected`. Used where two operands meet and either side may adapt.
pub(crate) fn retargets(expression: &Expression, expected: &Type) -> bool {
    let Type::Number(kind) = expected else {
        return false;
    };
    match expression {
        Expression::Number(num) if !num.suffixed => match num.value {
            NumberValue::Integer(value) => {
                if kind.is_float() || kind.fits_integer(value) {
                    num.ty.set(expected.clone());
                    true
                } else {
                    false
                }
            }
            NumberValue::Floating(value) => {
                if kind.is_float() && kind.fits_float(value) {
                    num.ty.set(expected.clone());
                    true
                } else {
                    false
                }
            }
        },
        Expression::Infinity(infinity) if kind.is_float() => {
            infinity.ty.set(expected.clone());
            true
        }
        // A negated literal retargets as a unit; never into an unsigned
        // kind.
        Expression::PrefixUnary(unary)
            if unary.op == crate::lexer::TokenKind::Minus
                && matches!(&*unary.operand, Expression::Number(num) if !num.suffixed) =>
        {
            if kind.is_unsigned() {
                return false;
            }
            if retargets(&unary.operand, expected) {
                unary.ty.set(expected.clone());
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

/// Name an operator overload resolves to: `_operator_<op>` followed by the
/// mangled operand types, with a `_prefix`/`_postfix` marker for the unary
/// forms.
pub(crate) fn operator_overload_name(
    op: crate::lexer::TokenKind,
    fixity: crate::parser::ast::Fixity,
    operands: &[Type],
) -> String {
    use crate::parser::ast::Fixity;

    let mut name = String::new();
    match fixity {
        Fixity::Prefix => name.push_str("_prefix"),
        Fixity::Postfix => name.push_str("_postfix"),
        Fixity::Infix => {}
    }
    name.push_str("_operator_");
    name.push_str(op.operator_str());
    for operand in operands {
        name.push_str(&operand.mangle());
    }
    name
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    /// Lex + parse + check; returns the checked unit and the sink.
    pub fn check_source(source: &str) -> (Option<CompilationUnit>, DiagnosticSink) {
        let mut sink = DiagnosticSink::new();
        let file = sink.add_file("test.la", source);
        let tokens = Lexer::new(source, file).lex();
        let unit = Parser::new(tokens, &mut sink).parse();
        let Ok(mut unit) = unit else {
            return (None, sink);
        };
        let result = TypeChecker::new(&mut sink).check(&mut unit);
        match result {
            Ok(()) => (Some(unit), sink),
            Err(_) => (None, sink),
        }
    }

    /// Convenience for tests expecting a failed check.
    pub fn check_errors(source: &str) -> Vec<String> {
        let (_, sink) = check_source(source);
        sink.diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }
}
