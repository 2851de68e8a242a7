//! Constant folding for module-scope initializers.
//!
//! Global initializers were verified constant during checking. Numeric
//! operations are evaluated here and materialized as LLVM constants; the
//! folding surface stays narrow: numeric and compare operations,
//! pointer-null checks, string pointers, aggregate literals, and
//! constant `if`/`switch`/index selection.

use inkwell::types::BasicTypeEnum;
use inkwell::values::BasicValueEnum;

use crate::lexer::TokenKind;
use crate::parser::ast::*;
use crate::typechecker::types::Type;

use super::CodegenContext;

/// A numeric value during folding. Integers fold in `i128` so `u64` and
/// negated values both fit before the final truncation to their width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum NumConst {
    Int(i128),
    Float(f64),
}

impl NumConst {
    fn as_bool(self) -> bool {
        match self {
            NumConst::Int(value) => value != 0,
            NumConst::Float(value) => value != 0.0,
        }
    }
}

impl<'ctx> CodegenContext<'ctx> {
    /// Folds a constant expression into an LLVM constant value.
    pub(crate) fn fold_constant(&self, expression: &Expression) -> BasicValueEnum<'ctx> {
        match expression {
            Expression::String(string) => self.intern_string(&string.value).into(),
            Expression::Null(_) => self.ptr_type().const_null().into(),
            Expression::Undefined(undef) => {
                let ty = self.llvm_type(&undef.ty.get());
                match ty {
                    BasicTypeEnum::IntType(t) => t.get_undef().into(),
                    BasicTypeEnum::FloatType(t) => t.get_undef().into(),
                    BasicTypeEnum::PointerType(t) => t.get_undef().into(),
                    BasicTypeEnum::StructType(t) => t.get_undef().into(),
                    BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
                    BasicTypeEnum::VectorType(t) => t.get_undef().into(),
                    other => panic!("{other:?} has no undef"),
                }
            }
            Expression::Array(array) => {
                let Type::StaticArray { element, .. } = array.ty.get() else {
                    panic!("array literal was not resolved");
                };
                let values: Vec<BasicValueEnum<'ctx>> = array
                    .elements
                    .iter()
                    .map(|element| self.fold_constant(element))
                    .collect();
                const_array(self.llvm_type(&element), &values)
            }
            Expression::Vector(vector) => {
                let values: Vec<BasicValueEnum<'ctx>> = vector
                    .elements
                    .iter()
                    .map(|element| self.fold_constant(element))
                    .collect();
                inkwell::types::VectorType::const_vector(&values).into()
            }
            Expression::Tuple(tuple) => {
                self.fold_struct_like(&tuple.ty.get(), &tuple.elements)
            }
            Expression::Init(init) => self.fold_struct_like(&init.ty.get(), &init.arguments),
            Expression::If(if_expression) => {
                for (condition, value) in &if_expression.branches {
                    if self.eval_number(condition).as_bool() {
                        return self.fold_constant(value);
                    }
                }
                self.fold_constant(&if_expression.else_branch)
            }
            Expression::Switch(switch) => {
                let argument = self.eval_number(&switch.argument);
                for (values, result) in &switch.cases {
                    for value in values {
                        if self.eval_number(value) == argument {
                            return self.fold_constant(result);
                        }
                    }
                }
                match &switch.else_branch {
                    Some(else_branch) => self.fold_constant(else_branch),
                    None => panic!("constant switch selected no case"),
                }
            }
            Expression::Index(index) => {
                let NumConst::Int(position) = self.eval_number(&index.index) else {
                    panic!("constant index is an integer");
                };
                match &*index.object {
                    Expression::Array(array) => {
                        self.fold_constant(&array.elements[position as usize])
                    }
                    other => panic!("can not fold indexing into {other:?}"),
                }
            }
            // Everything numeric evaluates and materializes by its kind.
            _ => self.materialize(expression),
        }
    }

    fn fold_struct_like(&self, ty: &Type, values: &[Expression]) -> BasicValueEnum<'ctx> {
        let struct_type = self.llvm_type(ty).into_struct_type();
        let fields: Vec<BasicValueEnum<'ctx>> = values
            .iter()
            .map(|value| self.fold_constant(value))
            .collect();
        struct_type.const_named_struct(&fields).into()
    }

    fn materialize(&self, expression: &Expression) -> BasicValueEnum<'ctx> {
        let value = self.eval_number(expression);
        let ty = expression.ty();
        let Some(kind) = ty.number_kind().or_else(|| match &ty {
            Type::EnumElement { element, .. } => Some(*element),
            _ => None,
        }) else {
            panic!("'{ty}' is not a foldable type");
        };

        match (value, kind.is_float()) {
            (NumConst::Int(int), false) => self
                .number_type(kind)
                .into_int_type()
                .const_int(int as u64, kind.is_signed())
                .into(),
            (NumConst::Int(int), true) => self
                .number_type(kind)
                .into_float_type()
                .const_float(int as f64)
                .into(),
            (NumConst::Float(float), true) => self
                .number_type(kind)
                .into_float_type()
                .const_float(float)
                .into(),
            (NumConst::Float(_), false) => panic!("float constant with integer kind"),
        }
    }

    /// Evaluates a numeric constant expression. Folding twice yields the
    /// same value: everything in here is pure.
    pub(crate) fn eval_number(&self, expression: &Expression) -> NumConst {
        match expression {
            Expression::Number(num) => match num.value {
                NumberValue::Integer(value) => match num.ty.get().number_kind() {
                    Some(kind) if kind.is_float() => NumConst::Float(value as f64),
                    _ => NumConst::Int(value as i128),
                },
                NumberValue::Floating(value) => NumConst::Float(value),
            },
            Expression::Bool(value) => NumConst::Int(value.value as i128),
            Expression::Character(value) => NumConst::Int(value.value as i128),
            Expression::Infinity(_) => NumConst::Float(f64::INFINITY),
            Expression::EnumAccess(access) => NumConst::Int(
                access.discriminant.get().expect("enum access was resolved") as i128,
            ),
            Expression::Dot(dot) => match &*dot.object {
                Expression::String(literal) if dot.member == "count" => {
                    NumConst::Int(literal.value.len() as i128)
                }
                other => panic!("can not fold member access on {other:?}"),
            },
            Expression::PrefixUnary(unary) => {
                let operand = self.eval_number(&unary.operand);
                match (unary.op, operand) {
                    (TokenKind::Minus, NumConst::Int(value)) => NumConst::Int(-value),
                    (TokenKind::Minus, NumConst::Float(value)) => NumConst::Float(-value),
                    (TokenKind::Bang, value) => NumConst::Int(!value.as_bool() as i128),
                    (TokenKind::Tilde, NumConst::Int(value)) => NumConst::Int(!value),
                    (op, value) => {
                        panic!("can not fold '{}' over {value:?}", op.operator_str())
                    }
                }
            }
            Expression::Binary(operation) | Expression::Bitwise(operation) => {
                self.eval_binary(operation)
            }
            Expression::Comparison(operation) => {
                let left = self.eval_number(&operation.left);
                let right = self.eval_number(&operation.right);
                let result = match (left, right) {
                    (NumConst::Int(l), NumConst::Int(r)) => match operation.op {
                        TokenKind::EqualEqual => l == r,
                        TokenKind::BangEqual => l != r,
                        TokenKind::Less => l < r,
                        TokenKind::LessEqual => l <= r,
                        TokenKind::Greater => l > r,
                        TokenKind::GreaterEqual => l >= r,
                        op => panic!("'{}' is not a comparison", op.operator_str()),
                    },
                    (l, r) => {
                        let (l, r) = (as_float(l), as_float(r));
                        match operation.op {
                            TokenKind::EqualEqual => l == r,
                            TokenKind::BangEqual => l != r,
                            TokenKind::Less => l < r,
                            TokenKind::LessEqual => l <= r,
                            TokenKind::Greater => l > r,
                            TokenKind::GreaterEqual => l >= r,
                            op => panic!("'{}' is not a comparison", op.operator_str()),
                        }
                    }
                };
                NumConst::Int(result as i128)
            }
            Expression::Logical(operation) => {
                let left = self.eval_number(&operation.left).as_bool();
                let right = self.eval_number(&operation.right).as_bool();
                let result = match operation.op {
                    TokenKind::AmpersandAmpersand => left && right,
                    TokenKind::PipePipe => left || right,
                    op => panic!("'{}' is not a logical operator", op.operator_str()),
                };
                NumConst::Int(result as i128)
            }
            Expression::Cast(cast) => {
                let value = self.eval_number(&cast.value);
                match (value, cast.ty.get().number_kind()) {
                    (NumConst::Int(int), Some(kind)) if kind.is_float() => {
                        NumConst::Float(int as f64)
                    }
                    (NumConst::Float(float), Some(kind)) if !kind.is_float() => {
                        NumConst::Int(float as i128)
                    }
                    (value, _) => value,
                }
            }
            Expression::If(if_expression) => {
                for (condition, value) in &if_expression.branches {
                    if self.eval_number(condition).as_bool() {
                        return self.eval_number(value);
                    }
                }
                self.eval_number(&if_expression.else_branch)
            }
            other => panic!("can not fold {other:?} into a number"),
        }
    }

    fn eval_binary(&self, operation: &BinaryOperation) -> NumConst {
        let left = self.eval_number(&operation.left);
        let right = self.eval_number(&operation.right);

        match (left, right) {
            (NumConst::Int(l), NumConst::Int(r)) => {
                let value = match operation.op {
                    TokenKind::Plus => l.wrapping_add(r),
                    TokenKind::Minus => l.wrapping_sub(r),
                    TokenKind::Star => l.wrapping_mul(r),
                    TokenKind::Slash if r != 0 => l / r,
                    TokenKind::Percent if r != 0 => l % r,
                    TokenKind::Slash | TokenKind::Percent => 0,
                    TokenKind::Ampersand => l & r,
                    TokenKind::Pipe => l | r,
                    TokenKind::Caret => l ^ r,
                    TokenKind::LeftShift => l.wrapping_shl(r as u32),
                    TokenKind::RightShift => l.wrapping_shr(r as u32),
                    op => panic!("'{}' is not foldable", op.operator_str()),
                };
                NumConst::Int(value)
            }
            (l, r) => {
                let (l, r) = (as_float(l), as_float(r));
                let value = match operation.op {
                    TokenKind::Plus => l + r,
                    TokenKind::Minus => l - r,
                    TokenKind::Star => l * r,
                    TokenKind::Slash => l / r,
                    TokenKind::Percent => l % r,
                    op => panic!("'{}' is not foldable over floats", op.operator_str()),
                };
                NumConst::Float(value)
            }
        }
    }
}

fn as_float(value: NumConst) -> f64 {
    match value {
        NumConst::Int(int) => int as f64,
        NumConst::Float(float) => float,
    }
}

/// Constant array over a concrete element type.
fn const_array<'ctx>(
    element: BasicTypeEnum<'ctx>,
    values: &[BasicValueEnum<'ctx>],
) -> BasicValueEnum<'ctx> {
    match element {
        BasicTypeEnum::IntType(t) => {
            let values: Vec<_> = values.iter().map(|v| v.into_int_value()).collect();
            t.const_array(&values).into()
        }
        BasicTypeEnum::FloatType(t) => {
            let values: Vec<_> = values.iter().map(|v| v.into_float_value()).collect();
            t.const_array(&values).into()
        }
        BasicTypeEnum::PointerType(t) => {
            let values: Vec<_> = values.iter().map(|v| v.into_pointer_value()).collect();
            t.const_array(&values).into()
        }
        BasicTypeEnum::StructType(t) => {
            let values: Vec<_> = values.iter().map(|v| v.into_struct_value()).collect();
            t.const_array(&values).into()
        }
        BasicTypeEnum::ArrayType(t) => {
            let values: Vec<_> = values.iter().map(|v| v.into_array_value()).collect();
            t.const_array(&values).into()
        }
        BasicTypeEnum::VectorType(t) => {
            let values: Vec<_> = values.iter().map(|v| v.into_vector_value()).collect();
            t.const_array(&values).into()
        }
        other => panic!("{other:?} can not form a constant array"),
    }
}
