use std::cell::{Cell, RefCell};

use serde::Serialize;

use crate::lexer::{Span, TokenKind};
use crate::typechecker::types::Type;

use super::{Block, Parameter, TypeName, TypeSlot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expression {
    If(IfExpression),
    Switch(SwitchExpression),
    Tuple(TupleExpression),
    Assign(Assign),
    Binary(BinaryOperation),
    Bitwise(BinaryOperation),
    Comparison(BinaryOperation),
    Logical(BinaryOperation),
    PrefixUnary(UnaryOperation),
    PostfixUnary(UnaryOperation),
    Call(Call),
    Init(Init),
    Lambda(Lambda),
    Dot(Dot),
    Cast(Cast),
    TypeSize(TypeQuery),
    TypeAlign(TypeQuery),
    ValueSize(ValueSize),
    Index(Index),
    EnumAccess(EnumAccess),
    Array(ArrayLiteral),
    Vector(VectorLiteral),
    String(AstString),
    Id(Id),
    Number(Num),
    Character(Character),
    Bool(Bool),
    Null(Null),
    Undefined(Undefined),
    Infinity(Infinity),
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::If(e) => e.span,
            Expression::Switch(e) => e.span,
            Expression::Tuple(e) => e.span,
            Expression::Assign(e) => e.span,
            Expression::Binary(e)
            | Expression::Bitwise(e)
            | Expression::Comparison(e)
            | Expression::Logical(e) => e.span,
            Expression::PrefixUnary(e) | Expression::PostfixUnary(e) => e.span,
            Expression::Call(e) => e.span,
            Expression::Init(e) => e.span,
            Expression::Lambda(e) => e.span,
            Expression::Dot(e) => e.span,
            Expression::Cast(e) => e.span,
            Expression::TypeSize(e) | Expression::TypeAlign(e) => e.span,
            Expression::ValueSize(e) => e.span,
            Expression::Index(e) => e.span,
            Expression::EnumAccess(e) => e.span,
            Expression::Array(e) => e.span,
            Expression::Vector(e) => e.span,
            Expression::String(e) => e.span,
            Expression::Id(e) => e.span,
            Expression::Number(e) => e.span,
            Expression::Character(e) => e.span,
            Expression::Bool(e) => e.span,
            Expression::Null(e) => e.span,
            Expression::Undefined(e) => e.span,
            Expression::Infinity(e) => e.span,
        }
    }

    /// The mutable value-type slot of this node.
    pub fn type_slot(&self) -> &TypeSlot {
        match self {
            Expression::If(e) => &e.ty,
            Expression::Switch(e) => &e.ty,
            Expression::Tuple(e) => &e.ty,
            Expression::Assign(e) => &e.ty,
            Expression::Binary(e)
            | Expression::Bitwise(e)
            | Expression::Comparison(e)
            | Expression::Logical(e) => &e.ty,
            Expression::PrefixUnary(e) | Expression::PostfixUnary(e) => &e.ty,
            Expression::Call(e) => &e.ty,
            Expression::Init(e) => &e.ty,
            Expression::Lambda(e) => &e.ty,
            Expression::Dot(e) => &e.ty,
            Expression::Cast(e) => &e.ty,
            Expression::TypeSize(e) | Expression::TypeAlign(e) => &e.ty,
            Expression::ValueSize(e) => &e.ty,
            Expression::Index(e) => &e.ty,
            Expression::EnumAccess(e) => &e.ty,
            Expression::Array(e) => &e.ty,
            Expression::Vector(e) => &e.ty,
            Expression::String(e) => &e.ty,
            Expression::Id(e) => &e.ty,
            Expression::Number(e) => &e.ty,
            Expression::Character(e) => &e.ty,
            Expression::Bool(e) => &e.ty,
            Expression::Null(e) => &e.ty,
            Expression::Undefined(e) => &e.ty,
            Expression::Infinity(e) => &e.ty,
        }
    }

    pub fn ty(&self) -> Type {
        self.type_slot().get()
    }

    /// Whether the expression can be folded to a constant at module scope.
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Number(_)
            | Expression::Character(_)
            | Expression::Bool(_)
            | Expression::Null(_)
            | Expression::Undefined(_)
            | Expression::Infinity(_)
            | Expression::String(_)
            | Expression::EnumAccess(_)
            | Expression::TypeSize(_)
            | Expression::TypeAlign(_)
            | Expression::ValueSize(_) => true,
            Expression::Array(e) => e.elements.iter().all(Expression::is_constant),
            Expression::Vector(e) => e.elements.iter().all(Expression::is_constant),
            Expression::Tuple(e) => e.elements.iter().all(Expression::is_constant),
            Expression::Init(e) => e.arguments.iter().all(Expression::is_constant),
            Expression::Binary(e)
            | Expression::Bitwise(e)
            | Expression::Comparison(e)
            | Expression::Logical(e) => {
                e.overload.borrow().is_none() && e.left.is_constant() && e.right.is_constant()
            }
            Expression::PrefixUnary(e) => {
                e.overload.borrow().is_none()
                    && matches!(e.op, TokenKind::Minus | TokenKind::Bang | TokenKind::Tilde)
                    && e.operand.is_constant()
            }
            Expression::Cast(e) => e.value.is_constant(),
            Expression::Index(e) => e.object.is_constant() && e.index.is_constant(),
            Expression::If(e) => {
                e.branches
                    .iter()
                    .all(|(cond, value)| cond.is_constant() && value.is_constant())
                    && e.else_branch.is_constant()
            }
            Expression::Switch(e) => {
                e.argument.is_constant()
                    && e.cases
                        .iter()
                        .all(|(values, value)| {
                            values.iter().all(Expression::is_constant) && value.is_constant()
                        })
                    && e.else_branch.as_ref().map_or(true, |v| v.is_constant())
            }
            // `"literal".count` folds; any other access does not.
            Expression::Dot(e) => {
                e.member == "count" && matches!(*e.object, Expression::String(_))
            }
            _ => false,
        }
    }
}

/// `if c { a } else { b }` in value position; every branch yields a value
/// and an else branch is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfExpression {
    pub branches: Vec<(Expression, Expression)>,
    pub else_branch: Box<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// `switch x { case a -> v ... }` in value position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchExpression {
    pub argument: Box<Expression>,
    pub cases: Vec<(Vec<Expression>, Expression)>,
    pub else_branch: Option<Box<Expression>>,
    /// Token kind the parser used to compare argument and case values.
    pub op: TokenKind,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TupleExpression {
    pub elements: Vec<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// Assignment; the target must be a name, an index, a member access or a
/// pointer dereference (validated by the resolver). Compound assignments
/// are desugared by the parser before this node is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assign {
    pub target: Box<Expression>,
    pub value: Box<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// Shared payload of the binary operator families (arithmetic, bitwise,
/// comparison, logical). `overload` is the mangled name of the operator
/// function resolved for non-numeric operands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryOperation {
    pub op: TokenKind,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub overload: RefCell<Option<String>>,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnaryOperation {
    pub op: TokenKind,
    pub operand: Box<Expression>,
    pub overload: RefCell<Option<String>>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// A call. `resolved_name` is filled by the resolver when the target is
/// not simply the callee's own name: monomorphized generic instances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub callee: Box<Expression>,
    pub generic_arguments: Vec<TypeName>,
    pub arguments: Vec<Expression>,
    pub resolved_name: RefCell<Option<String>>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// Struct literal `Name { a, b }` with positional field values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Init {
    pub type_name: TypeName,
    pub arguments: Vec<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// `fun (x int64) -> int64 { ... }` in value position. The resolver fills
/// `implicit` with the captured outer names and re-derives the
/// function-pointer type in the slot with those captures prepended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lambda {
    pub parameters: Vec<Parameter>,
    pub return_type: TypeName,
    pub body: Block,
    pub implicit: RefCell<Vec<(String, Type)>>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// Member access `value.member`; also `.count` on strings, arrays and
/// vectors, and numeric accessors on tuples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dot {
    pub object: Box<Expression>,
    pub member: String,
    pub member_span: Span,
    pub field_index: Cell<Option<u32>>,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cast {
    pub target: TypeName,
    pub value: Box<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// `type_size<T>` / `type_align<T>`. The queried type is resolved into
/// `target_ty` for the emitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeQuery {
    pub target: TypeName,
    pub target_ty: TypeSlot,
    pub span: Span,
    pub ty: TypeSlot,
}

/// `value_size(expr)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSize {
    pub value: Box<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Index {
    pub object: Box<Expression>,
    pub index: Box<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// `Enum::Member`; the resolver records the member's discriminant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumAccess {
    pub enum_name: String,
    pub member: String,
    pub discriminant: Cell<Option<u32>>,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayLiteral {
    pub elements: Vec<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorLiteral {
    pub elements: Vec<Expression>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// String literal; `value` holds the translated bytes (escapes applied),
/// which are also the interning key during emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AstString {
    pub value: Vec<u8>,
    pub span: Span,
    pub ty: TypeSlot,
}

/// A name in expression position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Id {
    pub name: String,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum NumberValue {
    Integer(u64),
    Floating(f64),
}

/// Numeric literal. Suffixed literals get their kind in the slot at parse
/// time; unsuffixed ones default to `i64`/`f64` and may be retargeted by
/// the expected type during checking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Num {
    pub value: NumberValue,
    pub suffixed: bool,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Character {
    pub value: u8,
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bool {
    pub value: bool,
    pub span: Span,
    pub ty: TypeSlot,
}

/// `null`; the slot is retargeted to the matching pointer type when the
/// literal meets one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Null {
    pub span: Span,
    pub ty: TypeSlot,
}

/// `---`: an explicitly uninitialized value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Undefined {
    pub span: Span,
    pub ty: TypeSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Infinity {
    pub span: Span,
    pub ty: TypeSlot,
}
