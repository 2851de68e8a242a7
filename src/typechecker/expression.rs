//! Expression checking: literals, operator families with overload
//! resolution, member access, casts and the value forms of `if`/`switch`.

use crate::lexer::TokenKind;
use crate::parser::ast::*;
use crate::typechecker::types::{NumberKind, StructType, Type};

use super::{coerce, operator_overload_name, resolve_type, retargets, Check, Context, TypeResult};

impl Check for Expression {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        match self {
            Expression::If(e) => e.check(ctx),
            Expression::Switch(e) => e.check(ctx),
            Expression::Tuple(e) => e.check(ctx),
            Expression::Assign(e) => e.check(ctx),
            Expression::Binary(e) => check_binary(e, Family::Arithmetic, ctx),
            Expression::Bitwise(e) => check_binary(e, Family::Bitwise, ctx),
            Expression::Comparison(e) => check_binary(e, Family::Comparison, ctx),
            Expression::Logical(e) => check_binary(e, Family::Logical, ctx),
            Expression::PrefixUnary(e) => check_prefix(e, ctx),
            Expression::PostfixUnary(e) => check_postfix(e, ctx),
            Expression::Call(e) => e.check(ctx),
            Expression::Init(e) => e.check(ctx),
            Expression::Lambda(e) => e.check(ctx),
            Expression::Dot(e) => e.check(ctx),
            Expression::Cast(e) => e.check(ctx),
            Expression::TypeSize(e) | Expression::TypeAlign(e) => {
                let target = resolve_type(ctx, &e.target)?;
                e.target_ty.set(target);
                Ok(e.ty.get())
            }
            Expression::ValueSize(e) => {
                e.value.check(ctx)?;
                Ok(e.ty.get())
            }
            Expression::Index(e) => e.check(ctx),
            Expression::EnumAccess(e) => e.check(ctx),
            Expression::Array(e) => e.check(ctx),
            Expression::Vector(e) => e.check(ctx),
            Expression::String(e) => Ok(e.ty.get()),
            Expression::Id(e) => e.check(ctx),
            Expression::Number(e) => {
                if e.ty.is_unresolved() {
                    let kind = match e.value {
                        NumberValue::Integer(_) => NumberKind::I64,
                        NumberValue::Floating(_) => NumberKind::F64,
                    };
                    e.ty.set(Type::Number(kind));
                }
                Ok(e.ty.get())
            }
            Expression::Character(e) => Ok(e.ty.get()),
            Expression::Bool(e) => Ok(e.ty.get()),
            Expression::Null(e) => Ok(e.ty.get()),
            // `undefined` has no type of its own; a typed context adopts it.
            Expression::Undefined(e) => Ok(e.ty.get()),
            Expression::Infinity(e) => {
                if e.ty.is_unresolved() {
                    e.ty.set(Type::Number(NumberKind::F64));
                }
                Ok(e.ty.get())
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Family {
    Arithmetic,
    Bitwise,
    Comparison,
    Logical,
}

/// Merges the operand types of a binary operation when both are numbers of
/// one kind, retargeting an unsuffixed literal side if necessary.
fn merge_numeric(e: &BinaryOperation, left: &Type, right: &Type) -> Option<Type> {
    if left == right && left.is_number() {
        return Some(left.clone());
    }
    if left.is_number() && retargets(&e.right, left) {
        return Some(left.clone());
    }
    if right.is_number() && retargets(&e.left, right) {
        return Some(right.clone());
    }
    None
}

fn check_binary(e: &BinaryOperation, family: Family, ctx: &mut Context<'_>) -> TypeResult<Type> {
    let left = e.left.check(ctx)?;
    let right = e.right.check(ctx)?;
    let merged = merge_numeric(e, &left, &right);

    let result = match family {
        Family::Arithmetic => {
            if let Some(ty) = merged {
                Some(ty)
            } else if left == right && matches!(left, Type::StaticVector { .. }) {
                Some(left.clone())
            } else {
                None
            }
        }
        Family::Bitwise => {
            let integral = |t: &Type| {
                t.is_integer()
                    || matches!(t, Type::StaticVector { element, .. } if element.is_integer())
            };
            let ty = match merged {
                Some(ty) if ty.is_integer() => Some(ty),
                Some(_) => None,
                None if left == right && integral(&left) => Some(left.clone()),
                None => None,
            };
            if let Some(ty) = &ty {
                if matches!(e.op, TokenKind::LeftShift | TokenKind::RightShift) {
                    check_shift_amount(e, ty, ctx)?;
                }
            }
            ty
        }
        Family::Comparison => check_comparison_operands(e, &left, &right, merged),
        Family::Logical => match merged {
            Some(Type::Number(NumberKind::I1)) => Some(Type::Number(NumberKind::I1)),
            _ => None,
        },
    };

    if let Some(ty) = result {
        e.ty.set(ty.clone());
        return Ok(ty);
    }

    // Fall back to an operator overload over the mangled operand types.
    let left = e.left.ty();
    let right = e.right.ty();
    let name = operator_overload_name(e.op, Fixity::Infix, &[left.clone(), right.clone()]);
    match ctx.scope.lookup(&name).cloned() {
        Some(Type::Function(function)) => {
            *e.overload.borrow_mut() = Some(name);
            let ty = (*function.return_type).clone();
            e.ty.set(ty.clone());
            Ok(ty)
        }
        _ => Err(ctx.error(
            e.span,
            format!(
                "Operator '{}' is not defined for types '{left}' and '{right}'",
                e.op.operator_str()
            ),
        )),
    }
}

/// A literal shift amount must be smaller than the bit width of the
/// shifted operand (and not negative).
fn check_shift_amount(e: &BinaryOperation, ty: &Type, ctx: &mut Context<'_>) -> TypeResult<()> {
    let width = match ty {
        Type::Number(kind) => kind.bit_width() as u64,
        _ => return Ok(()),
    };
    match &*e.right {
        Expression::Number(num) => {
            if let NumberValue::Integer(value) = num.value {
                if value >= width {
                    return Err(ctx.error(
                        num.span,
                        format!("Shift amount {value} does not fit a {width}-bit operand"),
                    ));
                }
            }
            Ok(())
        }
        Expression::PrefixUnary(unary)
            if unary.op == TokenKind::Minus
                && matches!(*unary.operand, Expression::Number(_)) =>
        {
            Err(ctx.error(unary.span, "Shift amount must not be negative"))
        }
        _ => Ok(()),
    }
}

fn check_comparison_operands(
    e: &BinaryOperation,
    left: &Type,
    right: &Type,
    merged: Option<Type>,
) -> Option<Type> {
    let i1 = Type::Number(NumberKind::I1);
    if merged.is_some() {
        return Some(i1);
    }

    let equality = matches!(e.op, TokenKind::EqualEqual | TokenKind::BangEqual);

    // Strings compare by content (all six operators); other pointers only
    // by address equality.
    if left.is_string() && right.is_string() {
        return Some(i1);
    }
    if left.is_pointer() && right.is_pointer() && left == right && equality {
        return Some(i1);
    }

    // A null side adopts the pointer type of the other operand.
    if equality {
        if left.is_pointer() && matches!(*e.right, Expression::Null(_)) {
            e.right.type_slot().set(left.clone());
            return Some(i1);
        }
        if right.is_pointer() && matches!(*e.left, Expression::Null(_)) {
            e.left.type_slot().set(right.clone());
            return Some(i1);
        }
        if let (
            Type::EnumElement { enum_name: l, .. },
            Type::EnumElement { enum_name: r, .. },
        ) = (left, right)
        {
            if l == r {
                return Some(i1);
            }
        }
    }

    None
}

fn is_lvalue(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Id(_) | Expression::Index(_) | Expression::Dot(_)
    ) || matches!(expression, Expression::PrefixUnary(unary) if unary.op == TokenKind::Star)
}

fn check_prefix(e: &UnaryOperation, ctx: &mut Context<'_>) -> TypeResult<Type> {
    let operand = e.operand.check(ctx)?;

    let direct = match e.op {
        TokenKind::Star => match &operand {
            Type::Pointer(base) => Some((**base).clone()),
            _ => {
                return Err(ctx.error(
                    e.span,
                    format!("Can't dereference a value of type '{operand}'"),
                ))
            }
        },
        TokenKind::Ampersand => {
            if let Type::Function(function) = &operand {
                if function.is_intrinsic {
                    return Err(ctx.error(
                        e.span,
                        "Can't take the address of an intrinsic function",
                    ));
                }
            }
            Some(Type::pointer_to(operand.clone()))
        }
        TokenKind::Minus if operand.is_number() => Some(operand.clone()),
        TokenKind::Bang if operand.is_number() => Some(Type::Number(NumberKind::I1)),
        TokenKind::Tilde if operand.is_integer() => Some(operand.clone()),
        TokenKind::PlusPlus | TokenKind::MinusMinus if operand.is_number() => {
            if !is_lvalue(&e.operand) {
                return Err(ctx.error(e.span, "Increment target must be assignable"));
            }
            Some(operand.clone())
        }
        _ => None,
    };

    if let Some(ty) = direct {
        e.ty.set(ty.clone());
        return Ok(ty);
    }

    resolve_unary_overload(e, Fixity::Prefix, operand, ctx)
}

fn check_postfix(e: &UnaryOperation, ctx: &mut Context<'_>) -> TypeResult<Type> {
    let operand = e.operand.check(ctx)?;

    if operand.is_number() {
        if !is_lvalue(&e.operand) {
            return Err(ctx.error(e.span, "Increment target must be assignable"));
        }
        e.ty.set(operand.clone());
        return Ok(operand);
    }

    resolve_unary_overload(e, Fixity::Postfix, operand, ctx)
}

fn resolve_unary_overload(
    e: &UnaryOperation,
    fixity: Fixity,
    operand: Type,
    ctx: &mut Context<'_>,
) -> TypeResult<Type> {
    let name = operator_overload_name(e.op, fixity, std::slice::from_ref(&operand));
    match ctx.scope.lookup(&name).cloned() {
        Some(Type::Function(function)) => {
            *e.overload.borrow_mut() = Some(name);
            let ty = (*function.return_type).clone();
            e.ty.set(ty.clone());
            Ok(ty)
        }
        _ => Err(ctx.error(
            e.span,
            format!(
                "Operator '{}' is not defined for type '{operand}'",
                e.op.operator_str()
            ),
        )),
    }
}

impl Check for Assign {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        if !is_lvalue(&self.target) {
            return Err(ctx.error(self.target.span(), "Invalid assignment target"));
        }
        let target = self.target.check(ctx)?;
        self.value.check(ctx)?;
        if matches!(*self.value, Expression::Null(_)) && !target.is_pointer() {
            return Err(ctx.error(
                self.value.span(),
                "Can't assign null to a non pointer value",
            ));
        }
        coerce(ctx, &self.value, &target)?;
        self.ty.set(Type::Void);
        Ok(Type::Void)
    }
}

impl Check for Dot {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let object = self.object.check(ctx)?;

        // Pointers to aggregates dereference implicitly.
        let target = match &object {
            Type::Pointer(base) if !object.is_string() => (**base).clone(),
            other => other.clone(),
        };

        let ty = match &target {
            Type::Struct(s) => {
                // The table entry is authoritative; embedded copies of
                // self-referential structs may be stubs.
                let layout: StructType = match ctx.scope.lookup(&s.name) {
                    Some(Type::Struct(full)) => (**full).clone(),
                    _ => (**s).clone(),
                };
                self.resolve_field(&layout, ctx)?
            }
            Type::GenericStruct { base, .. } => self.resolve_field(base, ctx)?,
            Type::Tuple { field_types, .. } => {
                let Ok(index) = self.member.parse::<usize>() else {
                    return Err(ctx.error(
                        self.member_span,
                        "Tuple fields are accessed by numeric index",
                    ));
                };
                let Some(field) = field_types.get(index) else {
                    return Err(ctx.error(
                        self.member_span,
                        format!("Tuple has no field {index}"),
                    ));
                };
                self.field_index.set(Some(index as u32));
                field.clone()
            }
            ty if ty.is_string() && self.member == "count" => Type::Number(NumberKind::I64),
            Type::StaticArray { .. } | Type::StaticVector { .. } if self.member == "count" => {
                Type::Number(NumberKind::I64)
            }
            other => {
                return Err(ctx.error(
                    self.member_span,
                    format!("Type '{other}' has no member '{}'", self.member),
                ));
            }
        };

        self.ty.set(ty.clone());
        Ok(ty)
    }
}

impl Dot {
    fn resolve_field(&self, layout: &StructType, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let Some(index) = layout.field_index(&self.member) else {
            return Err(ctx.error(
                self.member_span,
                format!("Struct '{}' has no field '{}'", layout.name, self.member),
            ));
        };
        self.field_index.set(Some(index as u32));
        Ok(layout.field_types[index].clone())
    }
}

impl Check for Index {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let object = self.object.check(ctx)?;
        let element = match &object {
            Type::StaticArray { element, .. } | Type::StaticVector { element, .. } => {
                (**element).clone()
            }
            Type::Pointer(base) => (**base).clone(),
            other => {
                return Err(ctx.error(
                    self.span,
                    format!("Can't index into a value of type '{other}'"),
                ));
            }
        };

        let index = self.index.check(ctx)?;
        if !index.is_integer() {
            return Err(ctx.error(
                self.index.span(),
                format!("Index must be an integer, got '{index}'"),
            ));
        }

        self.ty.set(element.clone());
        Ok(element)
    }
}

impl Check for Cast {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let value = self.value.check(ctx)?;
        let target = resolve_type(ctx, &self.target)?;

        if value == target {
            ctx.warning(self.span, format!("Cast to the same type '{target}'"));
        } else if !value.is_castable_to(&target) {
            return Err(ctx.error(
                self.span,
                format!("Can't cast a value of type '{value}' to '{target}'"),
            ));
        }

        self.ty.set(target.clone());
        Ok(target)
    }
}

impl Check for EnumAccess {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let Some(Type::Enum(enum_type)) = ctx.scope.lookup(&self.enum_name).cloned() else {
            return Err(ctx.error(
                self.span,
                format!("Undefined enum '{}'", self.enum_name),
            ));
        };
        let Some(discriminant) = enum_type.discriminant(&self.member) else {
            return Err(ctx.error(
                self.span,
                format!("'{}' has no member '{}'", self.enum_name, self.member),
            ));
        };
        self.discriminant.set(Some(discriminant));
        let ty = Type::EnumElement {
            enum_name: enum_type.name.clone(),
            element: enum_type.element,
        };
        self.ty.set(ty.clone());
        Ok(ty)
    }
}

/// Whether an expression is a literal that could still retarget to
/// another number kind.
fn is_open_literal(expression: &Expression) -> bool {
    match expression {
        Expression::Number(num) => !num.suffixed,
        Expression::Infinity(_) => true,
        Expression::PrefixUnary(unary) => {
            unary.op == TokenKind::Minus && is_open_literal(&unary.operand)
        }
        _ => false,
    }
}

/// Checks all elements of a homogeneous literal and settles them on a
/// common type: the first element with a fixed type anchors the rest.
fn common_element_type(
    ctx: &mut Context<'_>,
    elements: &[Expression],
) -> TypeResult<Type> {
    for element in elements {
        element.check(ctx)?;
    }
    let anchor = elements
        .iter()
        .find(|element| !is_open_literal(element))
        .unwrap_or(&elements[0])
        .ty();
    for element in elements {
        coerce(ctx, element, &anchor)?;
    }
    Ok(anchor)
}

impl Check for ArrayLiteral {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        if self.elements.is_empty() {
            // The element type comes from the context (parameter or
            // annotation); a bare empty literal stays untyped and is
            // rejected where it can not be adopted.
            return Ok(self.ty.get());
        }

        let element_type = common_element_type(ctx, &self.elements)?;
        let ty = Type::StaticArray {
            element: Box::new(element_type),
            size: self.elements.len() as u32,
        };
        self.ty.set(ty.clone());
        Ok(ty)
    }
}

impl Check for VectorLiteral {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        if self.elements.is_empty() {
            return Err(ctx.error(self.span, "Vector literals can not be empty"));
        }

        let element_type = common_element_type(ctx, &self.elements)?;
        let valid =
            matches!(&element_type, Type::Number(kind) if kind.is_unsigned() || kind.is_float());
        if !valid {
            return Err(ctx.error(
                self.span,
                format!("Vector element must be an unsigned integer or float, got '{element_type}'"),
            ));
        }

        let ty = Type::StaticVector {
            element: Box::new(element_type),
            size: self.elements.len() as u32,
        };
        self.ty.set(ty.clone());
        Ok(ty)
    }
}

impl Check for TupleExpression {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let mut field_types = vec![];
        for element in &self.elements {
            field_types.push(element.check(ctx)?);
        }
        let ty = Type::tuple(field_types);
        self.ty.set(ty.clone());
        Ok(ty)
    }
}

impl Check for Init {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let ty = resolve_type(ctx, &self.type_name)?;
        let layout = match &ty {
            Type::Struct(s) => (**s).clone(),
            Type::GenericStruct { base, .. } => (**base).clone(),
            other => {
                return Err(ctx.error(
                    self.span,
                    format!("'{other}' is not a struct and can not be initialized here"),
                ));
            }
        };

        if self.arguments.len() != layout.field_types.len() {
            return Err(ctx.error(
                self.span,
                format!(
                    "Struct '{}' has {} fields, got {} values",
                    layout.name,
                    layout.field_types.len(),
                    self.arguments.len()
                ),
            ));
        }

        for (argument, field_type) in self.arguments.iter().zip(&layout.field_types) {
            argument.check(ctx)?;
            coerce(ctx, argument, field_type)?;
        }

        self.ty.set(ty.clone());
        Ok(ty)
    }
}

impl Check for Id {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let found = ctx
            .scope
            .lookup_with_level(&self.name)
            .map(|(ty, level)| (ty.clone(), level));

        let Some((ty, level)) = found else {
            if ctx.generic_functions.contains_key(&self.name) {
                return Err(ctx.error(
                    self.span,
                    format!("Generic function '{}' can only be called", self.name),
                ));
            }
            return Err(ctx.error(self.span, format!("Undefined name '{}'", self.name)));
        };

        // Inside a lambda body, a name defined between the global scope
        // and the lambda's own scope is a capture: it becomes an implicit
        // parameter and a local definition of the lambda.
        if let Some(frame) = ctx.lambda_frames.last_mut() {
            if level > 0 && level < frame.entry_level {
                if !frame.implicit.iter().any(|(name, _)| name == &self.name) {
                    frame.implicit.push((self.name.clone(), ty.clone()));
                }
                ctx.scope.define(&self.name, ty.clone());
            }
        }

        self.ty.set(ty.clone());
        Ok(ty)
    }
}

impl Check for IfExpression {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let mut result: Option<Type> = None;
        for (condition, value) in &self.branches {
            let condition_type = condition.check(ctx)?;
            if !condition_type.is_number() {
                return Err(ctx.error(
                    condition.span(),
                    format!("Condition must be a number type, got '{condition_type}'"),
                ));
            }
            let value_type = value.check(ctx)?;
            match &result {
                None => result = Some(value_type),
                Some(expected) => {
                    coerce(ctx, value, expected)?;
                }
            }
        }

        let expected = result.expect("if expression has at least one branch");
        self.else_branch.check(ctx)?;
        coerce(ctx, &self.else_branch, &expected)?;

        self.ty.set(expected.clone());
        Ok(expected)
    }
}

impl Check for SwitchExpression {
    type Output = Type;

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<Type> {
        let argument_type = self.argument.check(ctx)?;

        let enum_type = match &argument_type {
            Type::Number(kind) if kind.is_integer() => None,
            Type::EnumElement { enum_name, .. } => match ctx.scope.lookup(enum_name).cloned() {
                Some(Type::Enum(enum_type)) => Some(enum_type),
                _ => {
                    return Err(ctx.error(self.span, format!("Undefined enum '{enum_name}'")));
                }
            },
            other => {
                return Err(ctx.error(
                    self.argument.span(),
                    format!("Switch argument must be an integer or enum, got '{other}'"),
                ));
            }
        };

        let mut covered = vec![];
        let mut result: Option<Type> = None;
        for (values, value) in &self.cases {
            for case_value in values {
                case_value.check(ctx)?;
                if let Some(enum_type) = &enum_type {
                    let Expression::EnumAccess(access) = case_value else {
                        return Err(ctx.error(
                            case_value.span(),
                            "Enum switch cases take enum members",
                        ));
                    };
                    if let Some(discriminant) = enum_type.discriminant(&access.member) {
                        if !covered.contains(&discriminant) {
                            covered.push(discriminant);
                        }
                    }
                }
                coerce(ctx, case_value, &argument_type)?;
            }
            let value_type = value.check(ctx)?;
            match &result {
                None => result = Some(value_type),
                Some(expected) => {
                    coerce(ctx, value, expected)?;
                }
            }
        }

        if self.else_branch.is_none() {
            let complete = enum_type
                .as_ref()
                .map(|e| covered.len() == e.values.len())
                .unwrap_or(false);
            if !complete {
                return Err(ctx.error(self.span, "Switch is incomplete and must has else branch"));
            }
        }

        let Some(expected) = result else {
            return Err(ctx.error(self.span, "Switch expression needs at least one case"));
        };
        if let Some(else_branch) = &self.else_branch {
            else_branch.check(ctx)?;
            coerce(ctx, else_branch, &expected)?;
        }

        self.ty.set(expected.clone());
        Ok(expected)
    }
}
