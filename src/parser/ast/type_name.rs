use serde::Serialize;

use crate::lexer::Span;

/// A type as written in source, before resolution against the type table.
/// `*T`, `[N]T`, `<N>T`, `(T, U) -> R` and `Name<T, U>` compose freely.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeName {
    Named {
        name: String,
        span: Span,
    },
    Pointer {
        base: Box<TypeName>,
        span: Span,
    },
    Array {
        size: u32,
        element: Box<TypeName>,
        span: Span,
    },
    Vector {
        size: u32,
        element: Box<TypeName>,
        span: Span,
    },
    Function {
        params: Vec<TypeName>,
        return_type: Box<TypeName>,
        span: Span,
    },
    Generic {
        name: String,
        arguments: Vec<TypeName>,
        span: Span,
    },
}

impl TypeName {
    pub fn named(name: impl ToString, span: Span) -> Self {
        TypeName::Named {
            name: name.to_string(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TypeName::Named { span, .. }
            | TypeName::Pointer { span, .. }
            | TypeName::Array { span, .. }
            | TypeName::Vector { span, .. }
            | TypeName::Function { span, .. }
            | TypeName::Generic { span, .. } => *span,
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Named { name, .. } => write!(f, "{name}"),
            TypeName::Pointer { base, .. } => write!(f, "*{base}"),
            TypeName::Array { size, element, .. } => write!(f, "[{size}]{element}"),
            TypeName::Vector { size, element, .. } => write!(f, "<{size}>{element}"),
            TypeName::Function {
                params,
                return_type,
                ..
            } => {
                let params = params
                    .iter()
                    .map(|p| format!("{p}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({params}) -> {return_type}")
            }
            TypeName::Generic {
                name, arguments, ..
            } => {
                let arguments = arguments
                    .iter()
                    .map(|a| format!("{a}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{name}<{arguments}>")
            }
        }
    }
}

/// A function or lambda parameter: `name Type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub type_name: TypeName,
    pub span: Span,
}
