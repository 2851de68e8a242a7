//! LLVM code generation for checked La units.
//!
//! A third pass over the resolved tree that emits into an inkwell module.
//! The context owns the scoped name → value table (mirroring the
//! resolver's scope lifecycle), the defer stack, break/continue targets,
//! and the interning pools for strings and struct layouts. Code generation
//! assumes a successfully checked tree; violated invariants are
//! programming errors and panic.
//!
//! Emission runs in three passes so bodies can reference everything:
//! function declarations first, then global variables and constants
//! (folded to LLVM constants), then function bodies.

mod constant;
mod expression;
mod statement;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{
    BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType as LlvmFunctionType,
    StructType as LlvmStructType,
};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FunctionValue, PointerValue,
};
use inkwell::AddressSpace;

use crate::diagnostics::{DiagnosticSink, Stage, Stop};
use crate::lexer::Span;
use crate::parser::ast::{CompilationUnit, Statement};
use crate::typechecker::scope::ScopedMap;
use crate::typechecker::types::{FunctionType, NumberKind, Type};

/// What a name stands for during emission.
#[derive(Clone)]
pub enum Binding<'ctx> {
    /// A stack slot or global: the pointer plus the pointee type.
    Variable { ptr: PointerValue<'ctx>, ty: Type },
    /// A declared function.
    Function {
        value: FunctionValue<'ctx>,
        ty: FunctionType,
    },
    /// An immutable value (constants).
    Value { value: BasicValueEnum<'ctx>, ty: Type },
}

/// A call captured at its `defer` site: callee resolution and argument
/// values are frozen there, only the call instruction is emitted later.
#[derive(Clone)]
pub enum DeferredCall<'ctx> {
    Direct {
        function: FunctionValue<'ctx>,
        args: Vec<BasicMetadataValueEnum<'ctx>>,
    },
    Indirect {
        fn_type: LlvmFunctionType<'ctx>,
        ptr: PointerValue<'ctx>,
        args: Vec<BasicMetadataValueEnum<'ctx>>,
    },
}

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,

    /// name -> binding, with the same scope lifecycle the resolver used.
    pub scope: RefCell<ScopedMap<Binding<'ctx>>>,

    /// Stack of per-scope deferred calls of the current function.
    defers: RefCell<Vec<Vec<DeferredCall<'ctx>>>>,

    /// Innermost-last branch targets for `break`/`continue`.
    break_targets: RefCell<Vec<BasicBlock<'ctx>>>,
    continue_targets: RefCell<Vec<BasicBlock<'ctx>>>,

    /// Interned string literals, keyed by their bytes.
    strings: RefCell<HashMap<Vec<u8>, PointerValue<'ctx>>>,

    /// Interned struct layouts, keyed by (mangled) struct name.
    struct_types: RefCell<HashMap<String, LlvmStructType<'ctx>>>,

    lambda_counter: Cell<usize>,
    current_function: Cell<Option<FunctionValue<'ctx>>>,
}

/// Emits a checked unit into a fresh module. The only reportable failure
/// is a verifier rejection; everything else in here treats a broken tree
/// as a bug and panics.
pub fn emit<'ctx>(
    context: &'ctx Context,
    unit: &CompilationUnit,
    module_name: &str,
    sink: &mut DiagnosticSink,
) -> Result<Module<'ctx>, Stop> {
    let codegen = CodegenContext::new(context, module_name);

    codegen.declare_functions(unit);
    codegen.emit_globals(unit);
    for statement in &unit.statements {
        match statement {
            Statement::Function(function) if !function.prototype.is_generic() => {
                codegen.emit_function(function)
            }
            Statement::OperatorFunction(operator) => codegen.emit_operator_function(operator),
            _ => {}
        }
    }

    if let Err(message) = codegen.module.verify() {
        return Err(sink.error(
            Stage::Internal,
            Span::default(),
            format!("Module verification failed: {}", message.to_string()),
        ));
    }
    Ok(codegen.module)
}

impl<'ctx> CodegenContext<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        CodegenContext {
            context,
            module: context.create_module(module_name),
            builder: context.create_builder(),
            scope: RefCell::new(ScopedMap::new()),
            defers: RefCell::new(vec![]),
            break_targets: RefCell::new(vec![]),
            continue_targets: RefCell::new(vec![]),
            strings: RefCell::new(HashMap::new()),
            struct_types: RefCell::new(HashMap::new()),
            lambda_counter: Cell::new(0),
            current_function: Cell::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Scope plumbing

    pub fn enter_scope(&self) {
        self.scope.borrow_mut().push_scope();
    }

    pub fn exit_scope(&self) {
        self.scope.borrow_mut().pop_scope();
    }

    pub fn define(&self, name: impl ToString, binding: Binding<'ctx>) {
        self.scope.borrow_mut().define(name, binding);
    }

    pub fn lookup(&self, name: &str) -> Binding<'ctx> {
        self.scope
            .borrow()
            .lookup(name)
            .cloned()
            .unwrap_or_else(|| panic!("expected '{name}' to be defined during emission"))
    }

    // ------------------------------------------------------------------
    // Defer stack

    pub fn push_defer_scope(&self) {
        self.defers.borrow_mut().push(vec![]);
    }

    /// Pops the innermost defer scope and, when `emit` is set (the block
    /// did not end in a terminator of its own), emits its calls in
    /// reverse insertion order.
    pub fn pop_defer_scope(&self, emit: bool) {
        let calls = self.defers.borrow_mut().pop().expect("defer scope");
        if emit {
            for call in calls.iter().rev() {
                self.emit_deferred(call);
            }
        }
    }

    pub fn record_deferred(&self, call: DeferredCall<'ctx>) {
        self.defers
            .borrow_mut()
            .last_mut()
            .expect("defer scope")
            .push(call);
    }

    /// `return` unwinds every open scope of the current function:
    /// innermost scope first, each scope's calls in reverse order.
    pub fn emit_all_deferred(&self) {
        let scopes = self.defers.borrow().clone();
        for scope in scopes.iter().rev() {
            for call in scope.iter().rev() {
                self.emit_deferred(call);
            }
        }
    }

    fn emit_deferred(&self, call: &DeferredCall<'ctx>) {
        match call {
            DeferredCall::Direct { function, args } => {
                self.builder.build_call(*function, args, "").unwrap();
            }
            DeferredCall::Indirect { fn_type, ptr, args } => {
                self.builder
                    .build_indirect_call(*fn_type, *ptr, args, "")
                    .unwrap();
            }
        }
    }

    /// Swaps out the whole per-function emission state (defer stack and
    /// loop targets) while a lambda body is emitted mid-function.
    pub fn swap_function_state(
        &self,
        defers: Vec<Vec<DeferredCall<'ctx>>>,
        breaks: Vec<BasicBlock<'ctx>>,
        continues: Vec<BasicBlock<'ctx>>,
    ) -> (
        Vec<Vec<DeferredCall<'ctx>>>,
        Vec<BasicBlock<'ctx>>,
        Vec<BasicBlock<'ctx>>,
    ) {
        (
            std::mem::replace(&mut *self.defers.borrow_mut(), defers),
            std::mem::replace(&mut *self.break_targets.borrow_mut(), breaks),
            std::mem::replace(&mut *self.continue_targets.borrow_mut(), continues),
        )
    }

    // ------------------------------------------------------------------
    // Loop targets

    pub fn push_loop_targets(&self, break_to: BasicBlock<'ctx>, continue_to: BasicBlock<'ctx>) {
        self.break_targets.borrow_mut().push(break_to);
        self.continue_targets.borrow_mut().push(continue_to);
    }

    pub fn pop_loop_targets(&self) {
        self.break_targets.borrow_mut().pop();
        self.continue_targets.borrow_mut().pop();
    }

    /// Target for an N-deep `break`/`continue`.
    pub fn loop_target(&self, times: u32, continue_target: bool) -> BasicBlock<'ctx> {
        let targets = if continue_target {
            self.continue_targets.borrow()
        } else {
            self.break_targets.borrow()
        };
        targets[targets.len() - times as usize]
    }

    // ------------------------------------------------------------------
    // Current function / blocks

    pub fn current_function(&self) -> FunctionValue<'ctx> {
        self.current_function
            .get()
            .expect("emission outside of a function")
    }

    pub fn set_current_function(&self, function: Option<FunctionValue<'ctx>>) {
        self.current_function.set(function);
    }

    pub fn append_block(&self, name: &str) -> BasicBlock<'ctx> {
        self.context.append_basic_block(self.current_function(), name)
    }

    /// Whether the block currently built into already has a terminator.
    pub fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|block| block.get_terminator())
            .is_some()
    }

    // ------------------------------------------------------------------
    // Types

    pub fn ptr_type(&self) -> inkwell::types::PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    pub fn number_type(&self, kind: NumberKind) -> BasicTypeEnum<'ctx> {
        match kind {
            NumberKind::I1 => self.context.bool_type().into(),
            NumberKind::I8 | NumberKind::U8 => self.context.i8_type().into(),
            NumberKind::I16 | NumberKind::U16 => self.context.i16_type().into(),
            NumberKind::I32 | NumberKind::U32 => self.context.i32_type().into(),
            NumberKind::I64 | NumberKind::U64 => self.context.i64_type().into(),
            NumberKind::F32 => self.context.f32_type().into(),
            NumberKind::F64 => self.context.f64_type().into(),
        }
    }

    /// Converts a semantic type into its LLVM representation. Struct and
    /// tuple layouts are interned by name; a monomorphized generic struct
    /// interns under its mangled concrete name.
    pub fn llvm_type(&self, ty: &Type) -> BasicTypeEnum<'ctx> {
        match ty {
            Type::Number(kind) => self.number_type(*kind),
            Type::Pointer(_) | Type::Null => self.ptr_type().into(),
            // Function values are function pointers.
            Type::Function(_) => self.ptr_type().into(),
            Type::StaticArray { element, size } => {
                let element = self.llvm_type(element);
                element.array_type(*size).into()
            }
            Type::StaticVector { element, size } => match self.llvm_type(element) {
                BasicTypeEnum::IntType(t) => t.vec_type(*size).into(),
                BasicTypeEnum::FloatType(t) => t.vec_type(*size).into(),
                other => panic!("{other:?} is not a vector element type"),
            },
            Type::Struct(s) => self
                .struct_layout(&s.name, &s.field_types)
                .into(),
            Type::GenericStruct { base, parameters } => {
                let name = Type::monomorphized_struct_name(&base.name, parameters);
                self.struct_layout(&name, &base.field_types).into()
            }
            Type::Tuple { name, field_types } => self.struct_layout(name, field_types).into(),
            Type::Enum(e) => self.number_type(e.element),
            Type::EnumElement { element, .. } => self.number_type(*element),
            Type::Void | Type::None | Type::GenericParameter(_) => {
                panic!("'{ty}' is not a value type")
            }
        }
    }

    fn struct_layout(&self, name: &str, field_types: &[Type]) -> LlvmStructType<'ctx> {
        if let Some(existing) = self.struct_types.borrow().get(name) {
            return *existing;
        }
        // Intern the opaque type first so self-referential layouts
        // (through pointers) terminate.
        let opaque = self.context.opaque_struct_type(name);
        self.struct_types
            .borrow_mut()
            .insert(name.to_string(), opaque);
        let fields: Vec<BasicTypeEnum<'ctx>> =
            field_types.iter().map(|t| self.llvm_type(t)).collect();
        opaque.set_body(&fields, false);
        opaque
    }

    /// LLVM signature for a semantic function type (full parameter list,
    /// implicit captures included).
    pub fn fn_type(&self, function: &FunctionType) -> LlvmFunctionType<'ctx> {
        let params: Vec<BasicMetadataTypeEnum<'ctx>> = function
            .params
            .iter()
            .map(|p| self.llvm_type(p).into())
            .collect();
        match &*function.return_type {
            Type::Void => self.context.void_type().fn_type(&params, function.has_varargs),
            ty => self.llvm_type(ty).fn_type(&params, function.has_varargs),
        }
    }

    // ------------------------------------------------------------------
    // Interning

    /// Returns the interned global holding the given string bytes
    /// (NUL-terminated). Equal literals share one global.
    pub fn intern_string(&self, bytes: &[u8]) -> PointerValue<'ctx> {
        if let Some(existing) = self.strings.borrow().get(bytes) {
            return *existing;
        }
        let initializer = self.context.const_string(bytes, true);
        let index = self.strings.borrow().len();
        let global = self.module.add_global(
            initializer.get_type(),
            Some(AddressSpace::default()),
            &format!("_str_{index}"),
        );
        global.set_initializer(&initializer);
        global.set_constant(true);
        let ptr = global.as_pointer_value();
        self.strings.borrow_mut().insert(bytes.to_vec(), ptr);
        ptr
    }

    // ------------------------------------------------------------------
    // libc helpers

    /// `strlen`/`strcmp` back the string operations; declared on first
    /// use.
    pub fn libc_function(&self, name: &str) -> FunctionValue<'ctx> {
        if let Some(existing) = self.module.get_function(name) {
            return existing;
        }
        let ptr = self.ptr_type();
        let fn_type = match name {
            "strlen" => self.context.i64_type().fn_type(&[ptr.into()], false),
            "strcmp" => self
                .context
                .i32_type()
                .fn_type(&[ptr.into(), ptr.into()], false),
            other => panic!("unknown runtime helper '{other}'"),
        };
        self.module.add_function(name, fn_type, None)
    }
}

/// Core trait for IR generation; implemented by every tree node that can
/// lower itself. Statements emit for effect, expressions may produce a
/// value (`None` for void calls).
pub trait CodeGen<'ctx> {
    type ReturnValue;

    fn codegen(&self, ctx: &CodegenContext<'ctx>) -> Self::ReturnValue;
}
