//! Expression lowering.
//!
//! Numeric operator selection follows the operand's number kind: signed,
//! unsigned and float instructions are picked per kind, comparisons use
//! the matching predicate family. Strings (`*i8`) compare through
//! `strcmp`; other pointers compare by address. Overloaded operators and
//! calls lower to plain function calls; lambdas are lifted into
//! module-level functions whose leading parameters are their captures.

use inkwell::values::{
    BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue,
};
use inkwell::{FloatPredicate, IntPredicate};

use crate::lexer::TokenKind;
use crate::parser::ast::*;
use crate::typechecker::types::{NumberKind, Type};

use super::{Binding, CodeGen, CodegenContext, DeferredCall};

impl<'ctx> CodeGen<'ctx> for Expression {
    type ReturnValue = Option<BasicValueEnum<'ctx>>;

    fn codegen(&self, ctx: &CodegenContext<'ctx>) -> Option<BasicValueEnum<'ctx>> {
        match self {
            Expression::Number(num) => Some(emit_number(ctx, num)),
            Expression::Bool(value) => Some(
                ctx.context
                    .bool_type()
                    .const_int(value.value as u64, false)
                    .into(),
            ),
            Expression::Character(value) => Some(
                ctx.context
                    .i8_type()
                    .const_int(value.value as u64, false)
                    .into(),
            ),
            Expression::String(string) => Some(ctx.intern_string(&string.value).into()),
            Expression::Null(null) => Some(emit_null(ctx, &null.ty.get())),
            Expression::Undefined(undef) => {
                Some(undef_value(ctx.llvm_type(&undef.ty.get())))
            }
            Expression::Infinity(infinity) => {
                let value = match infinity.ty.get().number_kind() {
                    Some(NumberKind::F32) => {
                        ctx.context.f32_type().const_float(f64::INFINITY)
                    }
                    _ => ctx.context.f64_type().const_float(f64::INFINITY),
                };
                Some(value.into())
            }
            Expression::EnumAccess(access) => {
                let discriminant = access
                    .discriminant
                    .get()
                    .expect("enum access was resolved");
                let Type::EnumElement { element, .. } = access.ty.get() else {
                    panic!("enum access has enum element type");
                };
                Some(
                    ctx.number_type(element)
                        .into_int_type()
                        .const_int(discriminant as u64, false)
                        .into(),
                )
            }
            Expression::Id(id) => Some(emit_id(ctx, id)),
            Expression::Assign(assign) => {
                emit_assign(ctx, assign);
                None
            }
            Expression::Binary(operation) => Some(emit_binary(ctx, operation)),
            Expression::Bitwise(operation) => Some(emit_binary(ctx, operation)),
            Expression::Comparison(operation) => Some(emit_comparison(ctx, operation)),
            Expression::Logical(operation) => Some(emit_logical(ctx, operation)),
            Expression::PrefixUnary(operation) => Some(emit_prefix(ctx, operation)),
            Expression::PostfixUnary(operation) => Some(emit_postfix(ctx, operation)),
            Expression::Call(call) => emit_call(ctx, call),
            Expression::Dot(dot) => Some(emit_dot(ctx, dot)),
            Expression::Index(index) => Some(emit_index(ctx, index)),
            Expression::Cast(cast) => Some(emit_cast(ctx, cast)),
            Expression::TypeSize(query) => {
                let ty = ctx.llvm_type(&query.target_ty.get());
                Some(size_of_type(ty).into())
            }
            Expression::TypeAlign(query) => {
                let ty = ctx.llvm_type(&query.target_ty.get());
                Some(align_of_type(ty).into())
            }
            Expression::ValueSize(value_size) => {
                let ty = ctx.llvm_type(&value_size.value.ty());
                Some(size_of_type(ty).into())
            }
            Expression::Array(array) => Some(emit_array_literal(ctx, array)),
            Expression::Vector(vector) => Some(emit_vector_literal(ctx, vector)),
            Expression::Tuple(tuple) => Some(emit_aggregate(
                ctx,
                &tuple.ty.get(),
                &tuple.elements,
            )),
            Expression::Init(init) => Some(emit_aggregate(ctx, &init.ty.get(), &init.arguments)),
            Expression::Lambda(lambda) => Some(emit_lambda(ctx, lambda)),
            Expression::If(if_expression) => Some(emit_if_expression(ctx, if_expression)),
            Expression::Switch(switch) => Some(emit_switch_expression(ctx, switch)),
        }
    }
}

fn undef_value(ty: inkwell::types::BasicTypeEnum<'_>) -> BasicValueEnum<'_> {
    match ty {
        inkwell::types::BasicTypeEnum::IntType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::FloatType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::PointerType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::StructType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
        inkwell::types::BasicTypeEnum::VectorType(t) => t.get_undef().into(),
        other => panic!("{other:?} has no undef"),
    }
}

pub(crate) fn size_of_type(ty: inkwell::types::BasicTypeEnum<'_>) -> IntValue<'_> {
    // Scalar types are always sized; aggregates answer with an Option.
    let size = match ty {
        inkwell::types::BasicTypeEnum::IntType(t) => Some(t.size_of()),
        inkwell::types::BasicTypeEnum::FloatType(t) => Some(t.size_of()),
        inkwell::types::BasicTypeEnum::PointerType(t) => Some(t.size_of()),
        inkwell::types::BasicTypeEnum::StructType(t) => t.size_of(),
        inkwell::types::BasicTypeEnum::ArrayType(t) => t.size_of(),
        inkwell::types::BasicTypeEnum::VectorType(t) => t.size_of(),
        other => panic!("{other:?} has no size"),
    };
    size.expect("sized type")
}

pub(crate) fn align_of_type(ty: inkwell::types::BasicTypeEnum<'_>) -> IntValue<'_> {
    match ty {
        inkwell::types::BasicTypeEnum::IntType(t) => t.get_alignment(),
        inkwell::types::BasicTypeEnum::FloatType(t) => t.get_alignment(),
        inkwell::types::BasicTypeEnum::PointerType(t) => t.get_alignment(),
        inkwell::types::BasicTypeEnum::StructType(t) => t.get_alignment(),
        inkwell::types::BasicTypeEnum::ArrayType(t) => t.get_alignment(),
        inkwell::types::BasicTypeEnum::VectorType(t) => t.get_alignment(),
        other => panic!("{other:?} has no alignment"),
    }
}

fn emit_number<'ctx>(ctx: &CodegenContext<'ctx>, num: &Num) -> BasicValueEnum<'ctx> {
    let Type::Number(kind) = num.ty.get() else {
        panic!("number literal was not resolved");
    };
    match (num.value, kind.is_float()) {
        (NumberValue::Integer(value), false) => ctx
            .number_type(kind)
            .into_int_type()
            .const_int(value, kind.is_signed())
            .into(),
        (NumberValue::Integer(value), true) => ctx
            .number_type(kind)
            .into_float_type()
            .const_float(value as f64)
            .into(),
        (NumberValue::Floating(value), true) => ctx
            .number_type(kind)
            .into_float_type()
            .const_float(value)
            .into(),
        (NumberValue::Floating(_), false) => panic!("float literal with integer kind"),
    }
}

fn emit_null<'ctx>(ctx: &CodegenContext<'ctx>, _ty: &Type) -> BasicValueEnum<'ctx> {
    ctx.ptr_type().const_null().into()
}

fn emit_id<'ctx>(ctx: &CodegenContext<'ctx>, id: &Id) -> BasicValueEnum<'ctx> {
    match ctx.lookup(&id.name) {
        Binding::Variable { ptr, ty } => ctx
            .builder
            .build_load(ctx.llvm_type(&ty), ptr, &id.name)
            .unwrap(),
        Binding::Function { value, .. } => {
            value.as_global_value().as_pointer_value().into()
        }
        Binding::Value { value, .. } => value,
    }
}

// ----------------------------------------------------------------------
// Addresses

/// Address of an assignable expression, when it has one.
pub(crate) fn try_emit_address<'ctx>(
    expression: &Expression,
    ctx: &CodegenContext<'ctx>,
) -> Option<(PointerValue<'ctx>, Type)> {
    match expression {
        Expression::Id(id) => match ctx.lookup(&id.name) {
            Binding::Variable { ptr, ty } => Some((ptr, ty)),
            _ => None,
        },
        Expression::Dot(dot) => {
            dot.field_index.get()?;
            let object_type = dot.object.ty();
            let (struct_ptr, struct_type) = match &object_type {
                Type::Pointer(base) => {
                    let ptr = dot
                        .object
                        .codegen(ctx)
                        .expect("pointer value")
                        .into_pointer_value();
                    (ptr, (**base).clone())
                }
                _ => try_emit_address(&dot.object, ctx)?,
            };
            let index = dot.field_index.get().expect("field index was resolved");
            let field_ptr = ctx
                .builder
                .build_struct_gep(
                    ctx.llvm_type(&struct_type),
                    struct_ptr,
                    index,
                    &dot.member,
                )
                .unwrap();
            Some((field_ptr, dot.ty.get()))
        }
        Expression::Index(index_expression) => {
            let object_type = index_expression.object.ty();
            let index = index_expression
                .index
                .codegen(ctx)
                .expect("index value")
                .into_int_value();
            match &object_type {
                Type::StaticArray { .. } => {
                    let (array_ptr, _) = try_emit_address(&index_expression.object, ctx)?;
                    let zero = ctx.context.i64_type().const_zero();
                    let element_ptr = unsafe {
                        ctx.builder
                            .build_in_bounds_gep(
                                ctx.llvm_type(&object_type),
                                array_ptr,
                                &[zero, index],
                                "elem_ptr",
                            )
                            .unwrap()
                    };
                    Some((element_ptr, index_expression.ty.get()))
                }
                Type::Pointer(base) => {
                    let ptr = index_expression
                        .object
                        .codegen(ctx)
                        .expect("pointer value")
                        .into_pointer_value();
                    let element_ptr = unsafe {
                        ctx.builder
                            .build_in_bounds_gep(ctx.llvm_type(base), ptr, &[index], "elem_ptr")
                            .unwrap()
                    };
                    Some((element_ptr, index_expression.ty.get()))
                }
                _ => None,
            }
        }
        Expression::PrefixUnary(unary) if unary.op == TokenKind::Star => {
            let ptr = unary
                .operand
                .codegen(ctx)
                .expect("pointer value")
                .into_pointer_value();
            Some((ptr, unary.ty.get()))
        }
        _ => None,
    }
}

fn emit_address<'ctx>(
    expression: &Expression,
    ctx: &CodegenContext<'ctx>,
) -> (PointerValue<'ctx>, Type) {
    try_emit_address(expression, ctx)
        .unwrap_or_else(|| panic!("expression at {:?} is not addressable", expression.span()))
}

fn emit_assign<'ctx>(ctx: &CodegenContext<'ctx>, assign: &Assign) {
    // Vector elements have no address; they go through insertelement.
    if let Expression::Index(index_expression) = &*assign.target {
        if matches!(index_expression.object.ty(), Type::StaticVector { .. }) {
            let (vector_ptr, vector_type) = emit_address(&index_expression.object, ctx);
            let vector = ctx
                .builder
                .build_load(ctx.llvm_type(&vector_type), vector_ptr, "vec")
                .unwrap()
                .into_vector_value();
            let index = index_expression
                .index
                .codegen(ctx)
                .expect("index value")
                .into_int_value();
            let value = assign.value.codegen(ctx).expect("assigned value");
            let updated = ctx
                .builder
                .build_insert_element(vector, value, index, "vec_set")
                .unwrap();
            ctx.builder.build_store(vector_ptr, updated).unwrap();
            return;
        }
    }

    let (ptr, _) = emit_address(&assign.target, ctx);
    let value = assign.value.codegen(ctx).expect("assigned value");
    ctx.builder.build_store(ptr, value).unwrap();
}

// ----------------------------------------------------------------------
// Operators

fn operand_kind(operation: &BinaryOperation) -> Option<NumberKind> {
    match operation.left.ty() {
        Type::Number(kind) => Some(kind),
        Type::StaticVector { element, .. } => element.number_kind(),
        _ => None,
    }
}

fn emit_overload_call<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    operands: &[BasicValueEnum<'ctx>],
) -> BasicValueEnum<'ctx> {
    let Binding::Function { value, .. } = ctx.lookup(name) else {
        panic!("operator overload '{name}' was not declared");
    };
    let args: Vec<BasicMetadataValueEnum<'ctx>> =
        operands.iter().map(|v| (*v).into()).collect();
    ctx.builder
        .build_call(value, &args, "")
        .unwrap()
        .try_as_basic_value()
        .left()
        .expect("operator overloads return a value")
}

fn emit_binary<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operation: &BinaryOperation,
) -> BasicValueEnum<'ctx> {
    let left = operation.left.codegen(ctx).expect("left operand");
    let right = operation.right.codegen(ctx).expect("right operand");

    if let Some(name) = operation.overload.borrow().clone() {
        return emit_overload_call(ctx, &name, &[left, right]);
    }

    let kind = operand_kind(operation).expect("numeric operands");
    // Scalars and vectors share the generic math builders; only the value
    // unwrapping differs.
    if matches!(operation.left.ty(), Type::StaticVector { .. }) {
        let l = left.into_vector_value();
        let r = right.into_vector_value();
        if kind.is_float() {
            emit_float_arith(ctx, operation.op, l, r)
        } else {
            emit_int_arith(ctx, operation.op, kind, l, r)
        }
    } else if kind.is_float() {
        emit_float_arith(ctx, operation.op, left.into_float_value(), right.into_float_value())
    } else {
        emit_int_arith(
            ctx,
            operation.op,
            kind,
            left.into_int_value(),
            right.into_int_value(),
        )
    }
}

fn emit_float_arith<'ctx, V: inkwell::values::FloatMathValue<'ctx>>(
    ctx: &CodegenContext<'ctx>,
    op: TokenKind,
    l: V,
    r: V,
) -> BasicValueEnum<'ctx> {
    let b = &ctx.builder;
    let value = match op {
        TokenKind::Plus => b.build_float_add(l, r, "").unwrap(),
        TokenKind::Minus => b.build_float_sub(l, r, "").unwrap(),
        TokenKind::Star => b.build_float_mul(l, r, "").unwrap(),
        TokenKind::Slash => b.build_float_div(l, r, "").unwrap(),
        TokenKind::Percent => b.build_float_rem(l, r, "").unwrap(),
        other => panic!("'{}' is not a float operator", other.operator_str()),
    };
    value.as_basic_value_enum()
}

fn emit_int_arith<'ctx, V: inkwell::values::IntMathValue<'ctx>>(
    ctx: &CodegenContext<'ctx>,
    op: TokenKind,
    kind: NumberKind,
    l: V,
    r: V,
) -> BasicValueEnum<'ctx> {
    let b = &ctx.builder;
    let value = match op {
        TokenKind::Plus => b.build_int_add(l, r, "").unwrap(),
        TokenKind::Minus => b.build_int_sub(l, r, "").unwrap(),
        TokenKind::Star => b.build_int_mul(l, r, "").unwrap(),
        TokenKind::Slash if kind.is_signed() => b.build_int_signed_div(l, r, "").unwrap(),
        TokenKind::Slash => b.build_int_unsigned_div(l, r, "").unwrap(),
        TokenKind::Percent if kind.is_signed() => b.build_int_signed_rem(l, r, "").unwrap(),
        TokenKind::Percent => b.build_int_unsigned_rem(l, r, "").unwrap(),
        TokenKind::Ampersand => b.build_and(l, r, "").unwrap(),
        TokenKind::Pipe => b.build_or(l, r, "").unwrap(),
        TokenKind::Caret => b.build_xor(l, r, "").unwrap(),
        TokenKind::LeftShift => b.build_left_shift(l, r, "").unwrap(),
        TokenKind::RightShift => b.build_right_shift(l, r, kind.is_signed(), "").unwrap(),
        other => panic!("'{}' is not an integer operator", other.operator_str()),
    };
    value.as_basic_value_enum()
}

fn int_predicate(op: TokenKind, signed: bool) -> IntPredicate {
    match (op, signed) {
        (TokenKind::EqualEqual, _) => IntPredicate::EQ,
        (TokenKind::BangEqual, _) => IntPredicate::NE,
        (TokenKind::Less, true) => IntPredicate::SLT,
        (TokenKind::Less, false) => IntPredicate::ULT,
        (TokenKind::LessEqual, true) => IntPredicate::SLE,
        (TokenKind::LessEqual, false) => IntPredicate::ULE,
        (TokenKind::Greater, true) => IntPredicate::SGT,
        (TokenKind::Greater, false) => IntPredicate::UGT,
        (TokenKind::GreaterEqual, true) => IntPredicate::SGE,
        (TokenKind::GreaterEqual, false) => IntPredicate::UGE,
        (other, _) => panic!("'{}' is not a comparison", other.operator_str()),
    }
}

fn float_predicate(op: TokenKind) -> FloatPredicate {
    match op {
        TokenKind::EqualEqual => FloatPredicate::OEQ,
        TokenKind::BangEqual => FloatPredicate::ONE,
        TokenKind::Less => FloatPredicate::OLT,
        TokenKind::LessEqual => FloatPredicate::OLE,
        TokenKind::Greater => FloatPredicate::OGT,
        TokenKind::GreaterEqual => FloatPredicate::OGE,
        other => panic!("'{}' is not a comparison", other.operator_str()),
    }
}

fn emit_comparison<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operation: &BinaryOperation,
) -> BasicValueEnum<'ctx> {
    let left_type = operation.left.ty();
    let right_type = operation.right.ty();

    let left = operation.left.codegen(ctx).expect("left operand");
    let right = operation.right.codegen(ctx).expect("right operand");

    if let Some(name) = operation.overload.borrow().clone() {
        return emit_overload_call(ctx, &name, &[left, right]);
    }

    // Strings compare by content.
    if left_type.is_string() && right_type.is_string() {
        let strcmp = ctx.libc_function("strcmp");
        let compared = ctx
            .builder
            .build_call(strcmp, &[left.into(), right.into()], "strcmp")
            .unwrap()
            .try_as_basic_value()
            .left()
            .expect("strcmp returns a value")
            .into_int_value();
        let zero = ctx.context.i32_type().const_zero();
        return ctx
            .builder
            .build_int_compare(int_predicate(operation.op, true), compared, zero, "")
            .unwrap()
            .into();
    }

    if left_type.is_pointer() || right_type.is_pointer() {
        return ctx
            .builder
            .build_int_compare(
                int_predicate(operation.op, false),
                left.into_pointer_value(),
                right.into_pointer_value(),
                "",
            )
            .unwrap()
            .into();
    }

    match left_type {
        Type::Number(kind) | Type::EnumElement { element: kind, .. } if !kind.is_float() => ctx
            .builder
            .build_int_compare(
                int_predicate(operation.op, kind.is_signed()),
                left.into_int_value(),
                right.into_int_value(),
                "",
            )
            .unwrap()
            .into(),
        Type::Number(_) => ctx
            .builder
            .build_float_compare(
                float_predicate(operation.op),
                left.into_float_value(),
                right.into_float_value(),
                "",
            )
            .unwrap()
            .into(),
        other => panic!("can not compare values of type '{other}'"),
    }
}

fn emit_logical<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operation: &BinaryOperation,
) -> BasicValueEnum<'ctx> {
    let left = operation.left.codegen(ctx).expect("left operand");
    let right = operation.right.codegen(ctx).expect("right operand");

    if let Some(name) = operation.overload.borrow().clone() {
        return emit_overload_call(ctx, &name, &[left, right]);
    }

    let l = left.into_int_value();
    let r = right.into_int_value();
    match operation.op {
        TokenKind::AmpersandAmpersand => ctx.builder.build_and(l, r, "").unwrap().into(),
        TokenKind::PipePipe => ctx.builder.build_or(l, r, "").unwrap().into(),
        other => panic!("'{}' is not a logical operator", other.operator_str()),
    }
}

fn emit_prefix<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operation: &UnaryOperation,
) -> BasicValueEnum<'ctx> {
    match operation.op {
        TokenKind::Ampersand => {
            // Address of a function is the function itself.
            if let Expression::Id(id) = &*operation.operand {
                if let Binding::Function { value, .. } = ctx.lookup(&id.name) {
                    return value.as_global_value().as_pointer_value().into();
                }
            }
            match try_emit_address(&operation.operand, ctx) {
                Some((ptr, _)) => ptr.into(),
                None => {
                    // Temporaries are spilled so their address exists.
                    let value = operation.operand.codegen(ctx).expect("operand value");
                    let slot = ctx
                        .builder
                        .build_alloca(value.get_type(), "addr_tmp")
                        .unwrap();
                    ctx.builder.build_store(slot, value).unwrap();
                    slot.into()
                }
            }
        }
        TokenKind::Star => {
            let (ptr, ty) = (
                operation
                    .operand
                    .codegen(ctx)
                    .expect("pointer value")
                    .into_pointer_value(),
                operation.ty.get(),
            );
            ctx.builder
                .build_load(ctx.llvm_type(&ty), ptr, "deref")
                .unwrap()
        }
        TokenKind::PlusPlus | TokenKind::MinusMinus => {
            let (_, new_value) = emit_step(ctx, operation);
            new_value
        }
        _ => {
            let operand = operation.operand.codegen(ctx).expect("operand value");
            if let Some(name) = operation.overload.borrow().clone() {
                return emit_overload_call(ctx, &name, &[operand]);
            }
            match operation.op {
                TokenKind::Minus => match operand {
                    BasicValueEnum::FloatValue(f) => {
                        ctx.builder.build_float_neg(f, "").unwrap().into()
                    }
                    BasicValueEnum::IntValue(i) => {
                        ctx.builder.build_int_neg(i, "").unwrap().into()
                    }
                    other => panic!("can not negate {other:?}"),
                },
                TokenKind::Bang => {
                    let int = operand.into_int_value();
                    ctx.builder
                        .build_int_compare(
                            IntPredicate::EQ,
                            int,
                            int.get_type().const_zero(),
                            "not",
                        )
                        .unwrap()
                        .into()
                }
                TokenKind::Tilde => {
                    let int = operand.into_int_value();
                    ctx.builder.build_not(int, "").unwrap().into()
                }
                other => panic!("'{}' is not a prefix operator", other.operator_str()),
            }
        }
    }
}

fn emit_postfix<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operation: &UnaryOperation,
) -> BasicValueEnum<'ctx> {
    if operation.overload.borrow().is_some() {
        let operand = operation.operand.codegen(ctx).expect("operand value");
        let name = operation.overload.borrow().clone().unwrap();
        return emit_overload_call(ctx, &name, &[operand]);
    }
    let (old_value, _) = emit_step(ctx, operation);
    old_value
}

/// Shared `++`/`--` lowering: load, add or subtract one, store back.
/// Returns (old, new) so prefix and postfix pick their result.
fn emit_step<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operation: &UnaryOperation,
) -> (BasicValueEnum<'ctx>, BasicValueEnum<'ctx>) {
    let (ptr, ty) = emit_address(&operation.operand, ctx);
    let kind = ty.number_kind().expect("increment over a number");
    let llvm_ty = ctx.llvm_type(&ty);
    let old_value = ctx.builder.build_load(llvm_ty, ptr, "step").unwrap();

    let increment = operation.op == TokenKind::PlusPlus;
    let new_value: BasicValueEnum<'ctx> = if kind.is_float() {
        let one = llvm_ty.into_float_type().const_float(1.0);
        let old = old_value.into_float_value();
        if increment {
            ctx.builder.build_float_add(old, one, "").unwrap().into()
        } else {
            ctx.builder.build_float_sub(old, one, "").unwrap().into()
        }
    } else {
        let one = llvm_ty.into_int_type().const_int(1, false);
        let old = old_value.into_int_value();
        if increment {
            ctx.builder.build_int_add(old, one, "").unwrap().into()
        } else {
            ctx.builder.build_int_sub(old, one, "").unwrap().into()
        }
    };
    ctx.builder.build_store(ptr, new_value).unwrap();
    (old_value, new_value)
}

// ----------------------------------------------------------------------
// Member access / indexing

fn emit_dot<'ctx>(ctx: &CodegenContext<'ctx>, dot: &Dot) -> BasicValueEnum<'ctx> {
    let object_type = dot.object.ty();

    // `.count` of strings, arrays and vectors.
    if dot.field_index.get().is_none() {
        return match &object_type {
            Type::StaticArray { size, .. } | Type::StaticVector { size, .. } => ctx
                .context
                .i64_type()
                .const_int(*size as u64, false)
                .into(),
            ty if ty.is_string() => {
                if let Expression::String(literal) = &*dot.object {
                    return ctx
                        .context
                        .i64_type()
                        .const_int(literal.value.len() as u64, false)
                        .into();
                }
                let ptr = dot
                    .object
                    .codegen(ctx)
                    .expect("string value")
                    .into_pointer_value();
                let strlen = ctx.libc_function("strlen");
                ctx.builder
                    .build_call(strlen, &[ptr.into()], "count")
                    .unwrap()
                    .try_as_basic_value()
                    .left()
                    .expect("strlen returns a value")
            }
            other => panic!("'{other}' has no synthesized members"),
        };
    }

    // Struct, generic struct and tuple fields: through the address when
    // there is one, by extraction otherwise.
    if let Some((ptr, ty)) = try_emit_address(&Expression::Dot(dot.clone()), ctx) {
        return ctx
            .builder
            .build_load(ctx.llvm_type(&ty), ptr, &dot.member)
            .unwrap();
    }
    let aggregate = dot
        .object
        .codegen(ctx)
        .expect("aggregate value")
        .into_struct_value();
    ctx.builder
        .build_extract_value(
            aggregate,
            dot.field_index.get().expect("field index was resolved"),
            &dot.member,
        )
        .unwrap()
}

fn emit_index<'ctx>(ctx: &CodegenContext<'ctx>, index: &Index) -> BasicValueEnum<'ctx> {
    let object_type = index.object.ty();

    if matches!(object_type, Type::StaticVector { .. }) {
        let vector = index
            .object
            .codegen(ctx)
            .expect("vector value")
            .into_vector_value();
        let index_value = index
            .index
            .codegen(ctx)
            .expect("index value")
            .into_int_value();
        return ctx
            .builder
            .build_extract_element(vector, index_value, "elem")
            .unwrap();
    }

    if let Some((ptr, ty)) = try_emit_address(&Expression::Index(index.clone()), ctx) {
        return ctx
            .builder
            .build_load(ctx.llvm_type(&ty), ptr, "elem")
            .unwrap();
    }

    // An rvalue array (e.g. a literal) is spilled first.
    let value = index.object.codegen(ctx).expect("array value");
    let slot = ctx
        .builder
        .build_alloca(value.get_type(), "idx_tmp")
        .unwrap();
    ctx.builder.build_store(slot, value).unwrap();
    let index_value = index
        .index
        .codegen(ctx)
        .expect("index value")
        .into_int_value();
    let zero = ctx.context.i64_type().const_zero();
    let element_ptr = unsafe {
        ctx.builder
            .build_in_bounds_gep(value.get_type(), slot, &[zero, index_value], "elem_ptr")
            .unwrap()
    };
    ctx.builder
        .build_load(ctx.llvm_type(&index.ty.get()), element_ptr, "elem")
        .unwrap()
}

// ----------------------------------------------------------------------
// Casts

fn emit_cast<'ctx>(ctx: &CodegenContext<'ctx>, cast: &Cast) -> BasicValueEnum<'ctx> {
    let from = cast.value.ty();
    let to = cast.ty.get();

    // Array decay: the cast value is the address of the first element.
    if let (Type::StaticArray { .. }, Type::Pointer(_)) = (&from, &to) {
        let (ptr, array_type) = match try_emit_address(&cast.value, ctx) {
            Some(found) => found,
            None => {
                let value = cast.value.codegen(ctx).expect("array value");
                let slot = ctx
                    .builder
                    .build_alloca(value.get_type(), "decay_tmp")
                    .unwrap();
                ctx.builder.build_store(slot, value).unwrap();
                (slot, from.clone())
            }
        };
        let zero = ctx.context.i64_type().const_zero();
        let first = unsafe {
            ctx.builder
                .build_in_bounds_gep(
                    ctx.llvm_type(&array_type),
                    ptr,
                    &[zero, zero],
                    "decay",
                )
                .unwrap()
        };
        return first.into();
    }

    let value = cast.value.codegen(ctx).expect("cast value");

    match (&from, &to) {
        (Type::Number(from_kind), Type::Number(to_kind)) => {
            emit_numeric_cast(ctx, value, *from_kind, *to_kind)
        }
        (Type::Pointer(_) | Type::Null, Type::Pointer(_)) => value,
        // Casting a value through `*void` spills it; loading it back is
        // the inverse.
        (_, Type::Pointer(_)) => {
            let slot = ctx
                .builder
                .build_alloca(value.get_type(), "cast_tmp")
                .unwrap();
            ctx.builder.build_store(slot, value).unwrap();
            slot.into()
        }
        (Type::Pointer(_), _) => ctx
            .builder
            .build_load(ctx.llvm_type(&to), value.into_pointer_value(), "cast")
            .unwrap(),
        (from, to) => panic!("unsupported cast from '{from}' to '{to}'"),
    }
}

pub(crate) fn emit_numeric_cast<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    from: NumberKind,
    to: NumberKind,
) -> BasicValueEnum<'ctx> {
    let target = ctx.number_type(to);
    match (from.is_float(), to.is_float()) {
        (false, false) => {
            // i1 widens by zero extension so `true` casts to 1.
            let sign_extend = from.is_signed() && from != NumberKind::I1;
            ctx.builder
                .build_int_cast_sign_flag(
                    value.into_int_value(),
                    target.into_int_type(),
                    sign_extend,
                    "cast",
                )
                .unwrap()
                .into()
        }
        (false, true) => {
            if from.is_signed() && from != NumberKind::I1 {
                ctx.builder
                    .build_signed_int_to_float(
                        value.into_int_value(),
                        target.into_float_type(),
                        "cast",
                    )
                    .unwrap()
                    .into()
            } else {
                ctx.builder
                    .build_unsigned_int_to_float(
                        value.into_int_value(),
                        target.into_float_type(),
                        "cast",
                    )
                    .unwrap()
                    .into()
            }
        }
        (true, false) => {
            if to.is_signed() {
                ctx.builder
                    .build_float_to_signed_int(
                        value.into_float_value(),
                        target.into_int_type(),
                        "cast",
                    )
                    .unwrap()
                    .into()
            } else {
                ctx.builder
                    .build_float_to_unsigned_int(
                        value.into_float_value(),
                        target.into_int_type(),
                        "cast",
                    )
                    .unwrap()
                    .into()
            }
        }
        (true, true) => ctx
            .builder
            .build_float_cast(value.into_float_value(), target.into_float_type(), "cast")
            .unwrap()
            .into(),
    }
}

// ----------------------------------------------------------------------
// Aggregates

fn emit_array_literal<'ctx>(
    ctx: &CodegenContext<'ctx>,
    array: &ArrayLiteral,
) -> BasicValueEnum<'ctx> {
    let ty = array.ty.get();
    let llvm_ty = ctx.llvm_type(&ty).into_array_type();
    let mut aggregate = llvm_ty.get_undef();
    for (index, element) in array.elements.iter().enumerate() {
        let value = element.codegen(ctx).expect("array element");
        aggregate = ctx
            .builder
            .build_insert_value(aggregate, value, index as u32, "")
            .unwrap()
            .into_array_value();
    }
    aggregate.into()
}

fn emit_vector_literal<'ctx>(
    ctx: &CodegenContext<'ctx>,
    vector: &VectorLiteral,
) -> BasicValueEnum<'ctx> {
    let ty = vector.ty.get();
    let llvm_ty = ctx.llvm_type(&ty).into_vector_type();
    let mut aggregate = llvm_ty.get_undef();
    let i32_type = ctx.context.i32_type();
    for (index, element) in vector.elements.iter().enumerate() {
        let value = element.codegen(ctx).expect("vector element");
        aggregate = ctx
            .builder
            .build_insert_element(
                aggregate,
                value,
                i32_type.const_int(index as u64, false),
                "",
            )
            .unwrap();
    }
    aggregate.into()
}

/// Tuples and struct literals build up by insertvalue over an undef.
fn emit_aggregate<'ctx>(
    ctx: &CodegenContext<'ctx>,
    ty: &Type,
    values: &[Expression],
) -> BasicValueEnum<'ctx> {
    let llvm_ty = ctx.llvm_type(ty).into_struct_type();
    let mut aggregate = llvm_ty.get_undef();
    for (index, value_expression) in values.iter().enumerate() {
        let value = value_expression.codegen(ctx).expect("field value");
        aggregate = ctx
            .builder
            .build_insert_value(aggregate, value, index as u32, "")
            .unwrap()
            .into_struct_value();
    }
    aggregate.into()
}

// ----------------------------------------------------------------------
// Lambdas

/// Lifts a lambda into a module-level function `(captures..., params...)`
/// and yields its pointer. The surrounding function's emission state is
/// parked while the lambda body is built.
fn emit_lambda<'ctx>(ctx: &CodegenContext<'ctx>, lambda: &Lambda) -> BasicValueEnum<'ctx> {
    let Type::Function(function_type) = lambda.ty.get() else {
        panic!("lambda was not resolved");
    };

    let index = ctx.lambda_counter.get();
    ctx.lambda_counter.set(index + 1);
    let name = format!("_lambda_{index}");
    let function = ctx
        .module
        .add_function(&name, ctx.fn_type(&function_type), None);

    let implicit = lambda.implicit.borrow();
    let mut parameter_names: Vec<&str> =
        implicit.iter().map(|(name, _)| name.as_str()).collect();
    parameter_names.extend(lambda.parameters.iter().map(|p| p.name.as_str()));

    let saved_block = ctx.builder.get_insert_block();
    let saved_state = ctx.swap_function_state(vec![], vec![], vec![]);

    ctx.emit_function_body(
        function,
        &function_type.params,
        &parameter_names,
        &lambda.body,
        &function_type.return_type,
    );

    ctx.swap_function_state(saved_state.0, saved_state.1, saved_state.2);
    if let Some(block) = saved_block {
        ctx.builder.position_at_end(block);
    }

    function.as_global_value().as_pointer_value().into()
}

// ----------------------------------------------------------------------
// Calls

enum CallTarget<'ctx> {
    Direct(FunctionValue<'ctx>),
    Indirect(PointerValue<'ctx>),
}

/// Resolves the callee and materializes the full argument list: loaded
/// implicit captures first, then the written arguments, with `f32`
/// varargs promoted to `f64`.
fn resolve_call<'ctx>(
    ctx: &CodegenContext<'ctx>,
    call: &Call,
) -> (
    crate::typechecker::types::FunctionType,
    CallTarget<'ctx>,
    Vec<BasicMetadataValueEnum<'ctx>>,
) {
    let (function_type, target) = if let Some(mangled) = call.resolved_name.borrow().clone() {
        let Type::Function(function_type) = call.callee.ty() else {
            panic!("resolved call has a function type");
        };
        let function = ctx
            .module
            .get_function(&mangled)
            .unwrap_or_else(|| panic!("monomorphized instance '{mangled}' was declared"));
        (*function_type, CallTarget::Direct(function))
    } else {
        match &*call.callee {
            Expression::Id(id) => match ctx.lookup(&id.name) {
                Binding::Function { value, ty } => (ty, CallTarget::Direct(value)),
                Binding::Variable { ptr, ty } => {
                    let function_type = callee_function_type(&ty);
                    let loaded = ctx
                        .builder
                        .build_load(ctx.ptr_type(), ptr, &id.name)
                        .unwrap()
                        .into_pointer_value();
                    (function_type, CallTarget::Indirect(loaded))
                }
                Binding::Value { value, ty } => (
                    callee_function_type(&ty),
                    CallTarget::Indirect(value.into_pointer_value()),
                ),
            },
            callee => {
                let function_type = callee_function_type(&callee.ty());
                let value = callee
                    .codegen(ctx)
                    .expect("callee value")
                    .into_pointer_value();
                (function_type, CallTarget::Indirect(value))
            }
        }
    };

    let mut args: Vec<BasicMetadataValueEnum<'ctx>> = vec![];

    // Captured names load from the caller's scope and prepend.
    for name in &function_type.implicit_names {
        let value = match ctx.lookup(name) {
            Binding::Variable { ptr, ty } => ctx
                .builder
                .build_load(ctx.llvm_type(&ty), ptr, name)
                .unwrap(),
            Binding::Value { value, .. } => value,
            Binding::Function { value, .. } => {
                value.as_global_value().as_pointer_value().into()
            }
        };
        args.push(value.into());
    }

    let fixed = function_type.explicit_params().len();
    for (index, argument) in call.arguments.iter().enumerate() {
        let value = argument.codegen(ctx).expect("argument value");
        // C varargs promotion for the variadic tail.
        let value = if index >= fixed && value.is_float_value() {
            let float = value.into_float_value();
            if float.get_type() == ctx.context.f32_type() {
                ctx.builder
                    .build_float_cast(float, ctx.context.f64_type(), "promote")
                    .unwrap()
                    .into()
            } else {
                value
            }
        } else {
            value
        };
        args.push(value.into());
    }

    (function_type, target, args)
}

fn callee_function_type(ty: &Type) -> crate::typechecker::types::FunctionType {
    match ty {
        Type::Function(function_type) => (**function_type).clone(),
        Type::Pointer(base) => match &**base {
            Type::Function(function_type) => (**function_type).clone(),
            other => panic!("'{other}' is not callable"),
        },
        other => panic!("'{other}' is not callable"),
    }
}

fn emit_call<'ctx>(ctx: &CodegenContext<'ctx>, call: &Call) -> Option<BasicValueEnum<'ctx>> {
    let (function_type, target, args) = resolve_call(ctx, call);

    let call_site = match target {
        CallTarget::Direct(function) => ctx.builder.build_call(function, &args, "").unwrap(),
        CallTarget::Indirect(ptr) => ctx
            .builder
            .build_indirect_call(ctx.fn_type(&function_type), ptr, &args, "")
            .unwrap(),
    };
    call_site.try_as_basic_value().left()
}

/// Captures everything a deferred call needs at the `defer` site: the
/// resolved callee and the already-evaluated argument values.
pub(crate) fn capture_deferred_call<'ctx>(
    call: &Call,
    ctx: &CodegenContext<'ctx>,
) -> DeferredCall<'ctx> {
    let (function_type, target, args) = resolve_call(ctx, call);
    match target {
        CallTarget::Direct(function) => DeferredCall::Direct { function, args },
        CallTarget::Indirect(ptr) => DeferredCall::Indirect {
            fn_type: ctx.fn_type(&function_type),
            ptr,
            args,
        },
    }
}

// ----------------------------------------------------------------------
// Value-position control flow

fn emit_if_expression<'ctx>(
    ctx: &CodegenContext<'ctx>,
    if_expression: &IfExpression,
) -> BasicValueEnum<'ctx> {
    let result_type = ctx.llvm_type(&if_expression.ty.get());
    let merge = ctx.append_block("ifval_end");
    let mut incoming: Vec<(BasicValueEnum<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> = vec![];

    for (condition, value) in &if_expression.branches {
        let condition_value = super::statement::to_condition(ctx, condition);
        let then_block = ctx.append_block("ifval_then");
        let next_block = ctx.append_block("ifval_next");
        ctx.builder
            .build_conditional_branch(condition_value, then_block, next_block)
            .unwrap();

        ctx.builder.position_at_end(then_block);
        let branch_value = value.codegen(ctx).expect("branch value");
        incoming.push((branch_value, ctx.builder.get_insert_block().unwrap()));
        ctx.builder.build_unconditional_branch(merge).unwrap();

        ctx.builder.position_at_end(next_block);
    }

    let else_value = if_expression
        .else_branch
        .codegen(ctx)
        .expect("else value");
    incoming.push((else_value, ctx.builder.get_insert_block().unwrap()));
    ctx.builder.build_unconditional_branch(merge).unwrap();

    ctx.builder.position_at_end(merge);
    let phi = ctx.builder.build_phi(result_type, "ifval").unwrap();
    for (value, block) in &incoming {
        phi.add_incoming(&[(value, *block)]);
    }
    phi.as_basic_value()
}

fn emit_switch_expression<'ctx>(
    ctx: &CodegenContext<'ctx>,
    switch: &SwitchExpression,
) -> BasicValueEnum<'ctx> {
    let result_type = ctx.llvm_type(&switch.ty.get());
    let argument = switch
        .argument
        .codegen(ctx)
        .expect("switch argument")
        .into_int_value();
    let merge = ctx.append_block("swval_end");
    let mut incoming: Vec<(BasicValueEnum<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> = vec![];

    for (values, result) in &switch.cases {
        let body_block = ctx.append_block("swval_body");
        let next = ctx.append_block("swval_next");
        for (index, value) in values.iter().enumerate() {
            let case_value = value
                .codegen(ctx)
                .expect("case value")
                .into_int_value();
            let matches = ctx
                .builder
                .build_int_compare(IntPredicate::EQ, argument, case_value, "swval_cmp")
                .unwrap();
            if index + 1 < values.len() {
                let or_else = ctx.append_block("swval_or");
                ctx.builder
                    .build_conditional_branch(matches, body_block, or_else)
                    .unwrap();
                ctx.builder.position_at_end(or_else);
            } else {
                ctx.builder
                    .build_conditional_branch(matches, body_block, next)
                    .unwrap();
            }
        }

        ctx.builder.position_at_end(body_block);
        let case_result = result.codegen(ctx).expect("case result");
        incoming.push((case_result, ctx.builder.get_insert_block().unwrap()));
        ctx.builder.build_unconditional_branch(merge).unwrap();

        ctx.builder.position_at_end(next);
    }

    match &switch.else_branch {
        Some(else_branch) => {
            let else_value = else_branch.codegen(ctx).expect("else value");
            incoming.push((else_value, ctx.builder.get_insert_block().unwrap()));
            ctx.builder.build_unconditional_branch(merge).unwrap();
        }
        None => {
            // Checking proved full enum coverage; the fall-through block
            // can not be reached.
            ctx.builder.build_unreachable().unwrap();
        }
    }

    ctx.builder.position_at_end(merge);
    let phi = ctx.builder.build_phi(result_type, "swval").unwrap();
    for (value, block) in &incoming {
        phi.add_incoming(&[(value, *block)]);
    }
    phi.as_basic_value()
}
