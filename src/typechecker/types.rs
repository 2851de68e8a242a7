use std::fmt::Display;

use serde::Serialize;

/// Width and interpretation of a numeric type. The name of each variant is
/// also its literal suffix and its mangled form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NumberKind {
    I1,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumberKind {
    pub fn from_suffix(suffix: &str) -> Option<NumberKind> {
        Some(match suffix {
            "i1" => NumberKind::I1,
            "i8" => NumberKind::I8,
            "i16" => NumberKind::I16,
            "i32" => NumberKind::I32,
            "i64" => NumberKind::I64,
            "u8" => NumberKind::U8,
            "u16" => NumberKind::U16,
            "u32" => NumberKind::U32,
            "u64" => NumberKind::U64,
            "f32" => NumberKind::F32,
            "f64" => NumberKind::F64,
            _ => return None,
        })
    }

    pub fn mangle(&self) -> &'static str {
        match self {
            NumberKind::I1 => "i1",
            NumberKind::I8 => "i8",
            NumberKind::I16 => "i16",
            NumberKind::I32 => "i32",
            NumberKind::I64 => "i64",
            NumberKind::U8 => "u8",
            NumberKind::U16 => "u16",
            NumberKind::U32 => "u32",
            NumberKind::U64 => "u64",
            NumberKind::F32 => "f32",
            NumberKind::F64 => "f64",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, NumberKind::F32 | NumberKind::F64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            NumberKind::I1 | NumberKind::I8 | NumberKind::I16 | NumberKind::I32 | NumberKind::I64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        !self.is_signed() && !self.is_float()
    }

    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    pub fn bit_width(&self) -> u32 {
        match self {
            NumberKind::I1 => 1,
            NumberKind::I8 | NumberKind::U8 => 8,
            NumberKind::I16 | NumberKind::U16 => 16,
            NumberKind::I32 | NumberKind::U32 | NumberKind::F32 => 32,
            NumberKind::I64 | NumberKind::U64 | NumberKind::F64 => 64,
        }
    }

    /// Whether `value` (a raw literal magnitude) is representable. Floats
    /// are bounded by ±MAX of the kind.
    pub fn fits_integer(&self, value: u64) -> bool {
        match self {
            NumberKind::I1 => value <= 1,
            NumberKind::I8 => value <= i8::MAX as u64,
            NumberKind::I16 => value <= i16::MAX as u64,
            NumberKind::I32 => value <= i32::MAX as u64,
            NumberKind::I64 => value <= i64::MAX as u64,
            NumberKind::U8 => value <= u8::MAX as u64,
            NumberKind::U16 => value <= u16::MAX as u64,
            NumberKind::U32 => value <= u32::MAX as u64,
            NumberKind::U64 => true,
            NumberKind::F32 | NumberKind::F64 => true,
        }
    }

    pub fn fits_float(&self, value: f64) -> bool {
        match self {
            NumberKind::F32 => value.abs() <= f32::MAX as f64,
            NumberKind::F64 => value.abs() <= f64::MAX,
            _ => false,
        }
    }
}

/// Function signature. Carries everything call checking and emission need:
/// parameter and return types, the varargs tail (`None` payload means the
/// unconstrained `Any`), generic parameter names for unresolved generics,
/// and the implicit (captured) leading parameters of lifted lambdas.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionType {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Box<Type>,
    pub has_varargs: bool,
    pub varargs: Option<Box<Type>>,
    pub is_intrinsic: bool,
    pub is_generic: bool,
    pub generic_names: Vec<String>,
    /// Names of the implicit parameters, parallel to the leading
    /// `implicit_param_count` entries of `params`. Call sites load these
    /// from the enclosing scope and prepend them to the argument list.
    pub implicit_names: Vec<String>,
    pub implicit_param_count: u32,
}

impl FunctionType {
    pub fn plain(name: impl ToString, params: Vec<Type>, return_type: Type) -> Self {
        FunctionType {
            name: name.to_string(),
            params,
            return_type: Box::new(return_type),
            has_varargs: false,
            varargs: None,
            is_intrinsic: false,
            is_generic: false,
            generic_names: vec![],
            implicit_names: vec![],
            implicit_param_count: 0,
        }
    }

    /// The user-written parameters, without the implicit capture prefix.
    pub fn explicit_params(&self) -> &[Type] {
        &self.params[self.implicit_param_count as usize..]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructType {
    pub name: String,
    pub field_names: Vec<String>,
    pub field_types: Vec<Type>,
    pub generic_parameters: Vec<String>,
    pub generic_parameter_types: Vec<Type>,
    pub is_packed: bool,
    pub is_generic: bool,
    pub is_extern: bool,
}

impl StructType {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }
}

/// Enumeration over an integer element type. Values keep declaration order;
/// discriminants are assigned 0..n.
#[derive(Debug, Clone, Serialize)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<(String, u32)>,
    pub element: NumberKind,
}

impl EnumType {
    pub fn discriminant(&self, member: &str) -> Option<u32> {
        self.values
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| *value)
    }
}

/// Semantic type of every expression and declaration. Nominal types
/// (structs, tuples, enums) compare by name; structural types recurse.
#[derive(Debug, Clone, Serialize)]
pub enum Type {
    /// Placeholder installed by the parser and replaced during checking.
    None,
    Void,
    /// The type of a `null` literal before it is matched against a pointer.
    Null,
    Number(NumberKind),
    Pointer(Box<Type>),
    StaticArray {
        element: Box<Type>,
        size: u32,
    },
    /// SIMD vector; the element must be an unsigned integer or float kind.
    StaticVector {
        element: Box<Type>,
        size: u32,
    },
    Function(Box<FunctionType>),
    Struct(Box<StructType>),
    Tuple {
        name: String,
        field_types: Vec<Type>,
    },
    Enum(Box<EnumType>),
    EnumElement {
        enum_name: String,
        element: NumberKind,
    },
    GenericParameter(String),
    GenericStruct {
        base: Box<StructType>,
        parameters: Vec<Type>,
    },
}

impl Default for Type {
    fn default() -> Self {
        Type::None
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::None, Type::None)
            | (Type::Void, Type::Void)
            | (Type::Null, Type::Null) => true,
            (Type::Number(l), Type::Number(r)) => l == r,
            (Type::Pointer(l), Type::Pointer(r)) => l == r,
            (
                Type::StaticArray {
                    element: le,
                    size: ls,
                },
                Type::StaticArray {
                    element: re,
                    size: rs,
                },
            )
            | (
                Type::StaticVector {
                    element: le,
                    size: ls,
                },
                Type::StaticVector {
                    element: re,
                    size: rs,
                },
            ) => ls == rs && le == re,
            (Type::Function(l), Type::Function(r)) => {
                l.params.len() == r.params.len()
                    && l.params == r.params
                    && l.return_type == r.return_type
            }
            (Type::Struct(l), Type::Struct(r)) => l.name == r.name,
            (Type::Tuple { name: l, .. }, Type::Tuple { name: r, .. }) => l == r,
            (Type::Enum(l), Type::Enum(r)) => l.name == r.name,
            (Type::EnumElement { enum_name: l, .. }, Type::EnumElement { enum_name: r, .. }) => {
                l == r
            }
            (Type::GenericParameter(l), Type::GenericParameter(r)) => l == r,
            (
                Type::GenericStruct {
                    base: lb,
                    parameters: lp,
                },
                Type::GenericStruct {
                    base: rb,
                    parameters: rp,
                },
            ) => lb.name == rb.name && lp == rp,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Type {
    pub fn pointer_to(base: Type) -> Type {
        Type::Pointer(Box::new(base))
    }

    pub fn number_kind(&self) -> Option<NumberKind> {
        match self {
            Type::Number(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Type::Number(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Number(kind) if kind.is_integer())
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    /// Pointer to `i8`, the representation of string data.
    pub fn is_string(&self) -> bool {
        matches!(self, Type::Pointer(base) if **base == Type::Number(NumberKind::I8))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Type::None)
    }

    /// Whether a `cast<T>(..)` between the two types is legal. Numeric
    /// casts, casts through `*void`, and array decay to a pointer of the
    /// same element are allowed; `void`, `none`, enums and functions never
    /// cast on either side.
    pub fn is_castable_to(&self, target: &Type) -> bool {
        let forbidden = |t: &Type| {
            matches!(
                t,
                Type::Void
                    | Type::None
                    | Type::Null
                    | Type::Enum(_)
                    | Type::EnumElement { .. }
                    | Type::Function(_)
            )
        };
        if forbidden(self) || forbidden(target) {
            return false;
        }
        if self == target {
            return true;
        }
        if self.is_number() && target.is_number() {
            return true;
        }

        let void_pointer = |t: &Type| matches!(t, Type::Pointer(base) if **base == Type::Void);
        if void_pointer(self) || void_pointer(target) {
            return true;
        }

        if let (Type::StaticArray { element, .. }, Type::Pointer(base)) = (self, target) {
            return element == base;
        }

        false
    }

    /// Deterministic name encoding used for operator overloads, tuple
    /// names and monomorphized generic structs.
    pub fn mangle(&self) -> String {
        match self {
            Type::None => "none".into(),
            Type::Void => "void".into(),
            Type::Null => "null".into(),
            Type::Number(kind) => kind.mangle().into(),
            Type::Pointer(base) => format!("p{}", base.mangle()),
            Type::StaticArray { element, size } => format!("_a{size}{}", element.mangle()),
            Type::StaticVector { element, size } => format!("_v{size}{}", element.mangle()),
            Type::Function(function) => {
                let params: String = function.params.iter().map(Type::mangle).collect();
                format!("_f{params}_r{}", function.return_type.mangle())
            }
            Type::Struct(s) => s.name.clone(),
            Type::Tuple { name, .. } => name.clone(),
            Type::Enum(e) => e.name.clone(),
            Type::EnumElement { enum_name, .. } => enum_name.clone(),
            Type::GenericParameter(name) => name.clone(),
            Type::GenericStruct { base, parameters } => {
                let params: String = parameters.iter().map(Type::mangle).collect();
                format!("{}{params}", base.name)
            }
        }
    }

    /// Inverse of [`Type::mangle`] for the structural subset (numbers,
    /// pointers, static arrays and vectors). Nominal types need the type
    /// table and are not reconstructed here.
    pub fn unmangle(mangled: &str) -> Option<Type> {
        let (ty, rest) = Self::unmangle_prefix(mangled)?;
        rest.is_empty().then_some(ty)
    }

    fn unmangle_prefix(input: &str) -> Option<(Type, &str)> {
        for kind in [
            NumberKind::I16,
            NumberKind::I32,
            NumberKind::I64,
            NumberKind::U16,
            NumberKind::U32,
            NumberKind::U64,
            NumberKind::F32,
            NumberKind::F64,
            NumberKind::I1,
            NumberKind::I8,
            NumberKind::U8,
        ] {
            if let Some(rest) = input.strip_prefix(kind.mangle()) {
                return Some((Type::Number(kind), rest));
            }
        }
        if let Some(rest) = input.strip_prefix('p') {
            let (base, rest) = Self::unmangle_prefix(rest)?;
            return Some((Type::pointer_to(base), rest));
        }
        for (marker, vector) in [("_a", false), ("_v", true)] {
            if let Some(rest) = input.strip_prefix(marker) {
                let digits = rest.chars().take_while(char::is_ascii_digit).count();
                if digits == 0 {
                    return None;
                }
                let size: u32 = rest[..digits].parse().ok()?;
                let (element, rest) = Self::unmangle_prefix(&rest[digits..])?;
                let element = Box::new(element);
                let ty = if vector {
                    Type::StaticVector { element, size }
                } else {
                    Type::StaticArray { element, size }
                };
                return Some((ty, rest));
            }
        }
        None
    }

    /// Name of the monomorphized instance of a generic struct.
    pub fn monomorphized_struct_name(base: &str, parameters: &[Type]) -> String {
        let params: String = parameters.iter().map(Type::mangle).collect();
        format!("{base}{params}")
    }

    /// Name of a tuple type, derived from its field types.
    pub fn tuple_name(field_types: &[Type]) -> String {
        let fields: String = field_types.iter().map(Type::mangle).collect();
        format!("_tuple_{fields}")
    }

    pub fn tuple(field_types: Vec<Type>) -> Type {
        Type::Tuple {
            name: Type::tuple_name(&field_types),
            field_types,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::None => write!(f, "none"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Number(kind) => write!(f, "{}", kind.mangle()),
            Type::Pointer(base) => write!(f, "*{base}"),
            Type::StaticArray { element, size } => write!(f, "[{size}]{element}"),
            Type::StaticVector { element, size } => write!(f, "<{size}>{element}"),
            Type::Function(function) => {
                let params = function
                    .params
                    .iter()
                    .map(|p| format!("{p}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({params}) -> {}", function.return_type)
            }
            Type::Struct(s) => write!(f, "{}", s.name),
            Type::Tuple { field_types, .. } => {
                let fields = field_types
                    .iter()
                    .map(|t| format!("{t}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({fields})")
            }
            Type::Enum(e) => write!(f, "{}", e.name),
            Type::EnumElement { enum_name, .. } => write!(f, "{enum_name}"),
            Type::GenericParameter(name) => write!(f, "{name}"),
            Type::GenericStruct { base, parameters } => {
                let params = parameters
                    .iter()
                    .map(|p| format!("{p}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}<{params}>", base.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i64_t() -> Type {
        Type::Number(NumberKind::I64)
    }

    fn named_struct(name: &str) -> Type {
        Type::Struct(Box::new(StructType {
            name: name.into(),
            field_names: vec!["x".into()],
            field_types: vec![i64_t()],
            generic_parameters: vec![],
            generic_parameter_types: vec![],
            is_packed: false,
            is_generic: false,
            is_extern: false,
        }))
    }

    #[test]
    fn test_number_equality_is_kind_equality() {
        assert_eq!(i64_t(), Type::Number(NumberKind::I64));
        assert_ne!(i64_t(), Type::Number(NumberKind::U64));
    }

    #[test]
    fn test_pointer_equality_recurses() {
        assert_eq!(Type::pointer_to(i64_t()), Type::pointer_to(i64_t()));
        assert_ne!(
            Type::pointer_to(i64_t()),
            Type::pointer_to(Type::Number(NumberKind::I32))
        );
    }

    #[test]
    fn test_struct_equality_is_by_name() {
        let a = named_struct("Point");
        let b = Type::Struct(Box::new(StructType {
            name: "Point".into(),
            field_names: vec![],
            field_types: vec![],
            generic_parameters: vec![],
            generic_parameter_types: vec![],
            is_packed: true,
            is_generic: false,
            is_extern: false,
        }));
        assert_eq!(a, b);
        assert_ne!(a, named_struct("Other"));
    }

    #[test]
    fn test_function_equality_checks_arity_params_return() {
        let f = Type::Function(Box::new(FunctionType::plain("f", vec![i64_t()], i64_t())));
        let g = Type::Function(Box::new(FunctionType::plain("g", vec![i64_t()], i64_t())));
        let h = Type::Function(Box::new(FunctionType::plain("h", vec![], i64_t())));
        assert_eq!(f, g);
        assert_ne!(f, h);
    }

    #[test]
    fn test_castability() {
        let void_ptr = Type::pointer_to(Type::Void);
        let array = Type::StaticArray {
            element: Box::new(i64_t()),
            size: 4,
        };

        assert!(i64_t().is_castable_to(&Type::Number(NumberKind::F32)));
        assert!(named_struct("S").is_castable_to(&void_ptr));
        assert!(void_ptr.is_castable_to(&named_struct("S")));
        assert!(array.is_castable_to(&Type::pointer_to(i64_t())));
        assert!(!array.is_castable_to(&Type::pointer_to(Type::Number(NumberKind::I8))));
        assert!(!i64_t().is_castable_to(&Type::Void));
        assert!(!Type::Function(Box::new(FunctionType::plain("f", vec![], Type::Void)))
            .is_castable_to(&void_ptr));
    }

    #[test]
    fn test_mangle_round_trip() {
        let types = [
            i64_t(),
            Type::Number(NumberKind::U8),
            Type::Number(NumberKind::F32),
            Type::pointer_to(Type::pointer_to(Type::Number(NumberKind::I8))),
            Type::StaticArray {
                element: Box::new(Type::Number(NumberKind::U32)),
                size: 16,
            },
            Type::StaticVector {
                element: Box::new(Type::Number(NumberKind::F32)),
                size: 4,
            },
        ];

        for ty in types {
            assert_eq!(Type::unmangle(&ty.mangle()), Some(ty.clone()), "{ty}");
        }
    }

    #[test]
    fn test_monomorphized_names_are_deterministic() {
        let a = Type::monomorphized_struct_name("List", &[i64_t(), Type::pointer_to(i64_t())]);
        let b = Type::monomorphized_struct_name("List", &[i64_t(), Type::pointer_to(i64_t())]);
        assert_eq!(a, b);
        assert_eq!(a, "Listi64pi64");
    }

    #[test]
    fn test_tuple_name_from_fields() {
        let tuple = Type::tuple(vec![i64_t(), Type::Number(NumberKind::F64)]);
        assert_eq!(tuple.mangle(), "_tuple_i64f64");
    }
}
