//! The La syntax tree.
//!
//! The parser builds this tree and installs a best-effort type in every
//! expression's [`TypeSlot`]; the resolver refines the slots in place and
//! the emitter reads them. Annotation slots that only the resolver fills
//! (field indices, lambda captures, resolved callee names) use
//! `Cell`/`RefCell` so both later phases can share the tree by reference.

mod expression;
mod statement;
mod type_name;

pub use expression::*;
pub use statement::*;
pub use type_name::*;

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::typechecker::types::Type;

/// Shared mutable `value_type` slot of an expression. Starts as
/// [`Type::None`] and is authoritatively filled during type checking.
#[derive(Debug, Default)]
pub struct TypeSlot(Rc<RefCell<Type>>);

/// Cloning a tree node must yield independent slots (monomorphization
/// clones a generic declaration once per instantiation), so the clone is
/// deep rather than a shared `Rc` handle.
impl Clone for TypeSlot {
    fn clone(&self) -> Self {
        TypeSlot(Rc::new(RefCell::new(self.0.borrow().clone())))
    }
}

impl TypeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(ty: Type) -> Self {
        TypeSlot(Rc::new(RefCell::new(ty)))
    }

    pub fn get(&self) -> Type {
        self.0.borrow().clone()
    }

    pub fn set(&self, ty: Type) {
        *self.0.borrow_mut() = ty;
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(&*self.0.borrow(), Type::None)
    }
}

impl PartialEq for TypeSlot {
    fn eq(&self, other: &Self) -> bool {
        *self.0.borrow() == *other.0.borrow()
    }
}

impl Serialize for TypeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.borrow().serialize(serializer)
    }
}

/// One parsed source file: the ordered sequence of its top-level
/// statements. The unit owns every tree node; later phases refine
/// annotations but never remove nodes. Monomorphization appends the
/// generated declarations here so the emitter sees them like any other
/// function.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationUnit {
    pub statements: Vec<Statement>,
}
