//! Statement lowering: declarations, control flow, loops, defer and
//! return unwinding.

use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{AddressSpace, IntPredicate};

use crate::parser::ast::*;
use crate::typechecker::types::{NumberKind, Type};

use super::{Binding, CodeGen, CodegenContext};

impl<'ctx> CodegenContext<'ctx> {
    /// First pass: add every function of the unit to the module so bodies
    /// can reference each other in any order. Intrinsic prototypes are
    /// declared under their native name.
    pub(crate) fn declare_functions(&self, unit: &CompilationUnit) {
        for statement in &unit.statements {
            match statement {
                Statement::Prototype(prototype) => {
                    self.declare_prototype(prototype, &prototype.name);
                }
                Statement::Intrinsic(intrinsic) => {
                    self.declare_prototype(&intrinsic.prototype, &intrinsic.native_name);
                }
                // Generic templates are never emitted, only their
                // monomorphized instances (appended to the unit).
                Statement::Function(function) if !function.prototype.is_generic() => {
                    self.declare_prototype(&function.prototype, &function.prototype.name);
                }
                Statement::OperatorFunction(operator) => {
                    let Type::Function(ty) = operator.ty.get() else {
                        panic!("operator function was not resolved");
                    };
                    let name = operator.mangled_name.borrow().clone();
                    let value = self.module.add_function(&name, self.fn_type(&ty), None);
                    self.define(&name, Binding::Function { value, ty: *ty });
                }
                _ => {}
            }
        }
    }

    fn declare_prototype(&self, prototype: &FunctionPrototype, llvm_name: &str) {
        let Type::Function(ty) = prototype.ty.get() else {
            panic!("function '{}' was not resolved", prototype.name);
        };
        let value = match self.module.get_function(llvm_name) {
            Some(existing) => existing,
            None => self.module.add_function(llvm_name, self.fn_type(&ty), None),
        };
        self.define(&prototype.name, Binding::Function { value, ty: *ty });
    }

    /// Second pass: global variables and constants. Initializers were
    /// verified to be compile-time constants and are folded to LLVM
    /// constants here.
    pub(crate) fn emit_globals(&self, unit: &CompilationUnit) {
        for statement in &unit.statements {
            match statement {
                Statement::Field(field) if field.global => {
                    let ty = field.ty.get();
                    let llvm_ty = self.llvm_type(&ty);
                    let global =
                        self.module
                            .add_global(llvm_ty, Some(AddressSpace::default()), &field.name);
                    let initializer: BasicValueEnum<'ctx> = match &field.value {
                        Some(Expression::Undefined(_)) | None => self.zero_value(&ty),
                        Some(value) => self.fold_constant(value),
                    };
                    global.set_initializer(&initializer);
                    self.define(
                        &field.name,
                        Binding::Variable {
                            ptr: global.as_pointer_value(),
                            ty,
                        },
                    );
                }
                Statement::Const(constant) => {
                    let value = self.fold_constant(&constant.value);
                    self.define(
                        &constant.name,
                        Binding::Value {
                            value,
                            ty: constant.ty.get(),
                        },
                    );
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Function bodies

    pub(crate) fn emit_function(&self, function: &FunctionDeclaration) {
        let Type::Function(ty) = function.prototype.ty.get() else {
            panic!("function '{}' was not resolved", function.prototype.name);
        };
        let value = self
            .module
            .get_function(&function.prototype.name)
            .expect("function was declared");

        let parameter_names: Vec<&str> = function
            .prototype
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        self.emit_function_body(value, &ty.params, &parameter_names, &function.body, &ty.return_type);
    }

    pub(crate) fn emit_operator_function(&self, operator: &OperatorFunctionDeclaration) {
        let Type::Function(ty) = operator.ty.get() else {
            panic!("operator function was not resolved");
        };
        let name = operator.mangled_name.borrow().clone();
        let value = self.module.get_function(&name).expect("operator declared");

        let parameter_names: Vec<&str> =
            operator.parameters.iter().map(|p| p.name.as_str()).collect();
        self.emit_function_body(value, &ty.params, &parameter_names, &operator.body, &ty.return_type);
    }

    /// Shared body emission: entry block, parameter slots, statements and
    /// the implicit trailing terminator. Non-void functions whose body
    /// does not end in a return get `unreachable` (checking proved every
    /// path returns).
    pub(crate) fn emit_function_body(
        &self,
        value: FunctionValue<'ctx>,
        parameter_types: &[Type],
        parameter_names: &[&str],
        body: &Block,
        return_type: &Type,
    ) {
        let previous_function = self.current_function.get();
        self.set_current_function(Some(value));

        let entry = self.context.append_basic_block(value, "entry");
        self.builder.position_at_end(entry);

        self.enter_scope();
        self.push_defer_scope();

        for (index, (name, ty)) in parameter_names.iter().zip(parameter_types).enumerate() {
            let slot = self
                .builder
                .build_alloca(self.llvm_type(ty), name)
                .unwrap();
            let argument = value
                .get_nth_param(index as u32)
                .expect("parameter count matches");
            self.builder.build_store(slot, argument).unwrap();
            self.define(
                *name,
                Binding::Variable {
                    ptr: slot,
                    ty: ty.clone(),
                },
            );
        }

        // Body locals live one scope below the parameters, as during
        // checking, so a local may shadow a parameter.
        self.enter_scope();
        for statement in &body.statements {
            statement.codegen(self);
            if self.block_terminated() {
                break;
            }
        }

        if !self.block_terminated() {
            // Remaining defers run on the implicit exit of void functions.
            if *return_type == Type::Void {
                self.emit_all_deferred();
                self.builder.build_return(None).unwrap();
            } else {
                self.builder.build_unreachable().unwrap();
            }
        }

        self.exit_scope();
        self.pop_defer_scope(false);
        self.exit_scope();
        self.set_current_function(previous_function);
    }

    /// Zero value of a type, used for uninitialized globals and
    /// `var x : T;` declarations.
    pub(crate) fn zero_value(&self, ty: &Type) -> BasicValueEnum<'ctx> {
        let llvm_ty = self.llvm_type(ty);
        match llvm_ty {
            inkwell::types::BasicTypeEnum::IntType(t) => t.const_zero().into(),
            inkwell::types::BasicTypeEnum::FloatType(t) => t.const_zero().into(),
            inkwell::types::BasicTypeEnum::PointerType(t) => t.const_null().into(),
            inkwell::types::BasicTypeEnum::StructType(t) => t.const_zero().into(),
            inkwell::types::BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
            inkwell::types::BasicTypeEnum::VectorType(t) => t.const_zero().into(),
            other => panic!("{other:?} has no zero value"),
        }
    }
}

impl<'ctx> CodeGen<'ctx> for Statement {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        match self {
            Statement::Block(block) => block.codegen(ctx),
            Statement::Const(constant) => {
                let Some(value) = constant.value.codegen(ctx) else {
                    panic!("constant initializer has no value");
                };
                ctx.define(
                    &constant.name,
                    Binding::Value {
                        value,
                        ty: constant.ty.get(),
                    },
                );
            }
            Statement::Field(field) => field.codegen(ctx),
            Statement::Destructuring(destructuring) => destructuring.codegen(ctx),
            Statement::If(if_statement) => if_statement.codegen(ctx),
            Statement::Switch(switch) => switch.codegen(ctx),
            Statement::ForRange(for_range) => for_range.codegen(ctx),
            Statement::ForEach(for_each) => for_each.codegen(ctx),
            Statement::ForEver(for_ever) => for_ever.codegen(ctx),
            Statement::While(while_loop) => while_loop.codegen(ctx),
            Statement::Return(return_statement) => return_statement.codegen(ctx),
            Statement::Defer(defer) => defer.codegen(ctx),
            Statement::Break(break_statement) => {
                let target = ctx.loop_target(break_statement.times, false);
                ctx.builder.build_unconditional_branch(target).unwrap();
            }
            Statement::Continue(continue_statement) => {
                let target = ctx.loop_target(continue_statement.times, true);
                ctx.builder.build_unconditional_branch(target).unwrap();
            }
            Statement::Expression(statement) => {
                statement.expression.codegen(ctx);
            }
            // Declarations were handled by the declare/global passes; type
            // declarations carry no code.
            Statement::Prototype(_)
            | Statement::Intrinsic(_)
            | Statement::Function(_)
            | Statement::OperatorFunction(_)
            | Statement::Struct(_)
            | Statement::Enum(_) => {}
        }
    }
}

impl<'ctx> CodeGen<'ctx> for Block {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        ctx.enter_scope();
        ctx.push_defer_scope();
        for statement in &self.statements {
            statement.codegen(ctx);
            if ctx.block_terminated() {
                break;
            }
        }
        // A block that ended in return/break/continue already has its
        // terminator; only a normal fall-through runs this scope's defers.
        ctx.pop_defer_scope(!ctx.block_terminated());
        ctx.exit_scope();
    }
}

impl<'ctx> CodeGen<'ctx> for FieldDeclaration {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let ty = self.ty.get();
        let slot = ctx
            .builder
            .build_alloca(ctx.llvm_type(&ty), &self.name)
            .unwrap();

        match &self.value {
            // `= ---` allocates without storing.
            Some(Expression::Undefined(_)) => {}
            Some(value) => {
                let value = value
                    .codegen(ctx)
                    .expect("initializer produces a value");
                ctx.builder.build_store(slot, value).unwrap();
            }
            None => {
                ctx.builder
                    .build_store(slot, ctx.zero_value(&ty))
                    .unwrap();
            }
        }

        ctx.define(&self.name, Binding::Variable { ptr: slot, ty });
    }
}

impl<'ctx> CodeGen<'ctx> for DestructuringDeclaration {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let tuple = self
            .value
            .codegen(ctx)
            .expect("tuple value")
            .into_struct_value();
        let Type::Tuple { field_types, .. } = self.value.ty() else {
            panic!("destructuring a non-tuple");
        };

        for (index, ((name, _), field_type)) in
            self.names.iter().zip(&field_types).enumerate()
        {
            if name == "_" {
                continue;
            }
            let field = ctx
                .builder
                .build_extract_value(tuple, index as u32, name)
                .unwrap();
            let slot = ctx
                .builder
                .build_alloca(ctx.llvm_type(field_type), name)
                .unwrap();
            ctx.builder.build_store(slot, field).unwrap();
            ctx.define(
                name,
                Binding::Variable {
                    ptr: slot,
                    ty: field_type.clone(),
                },
            );
        }
    }
}

impl<'ctx> CodeGen<'ctx> for IfStatement {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let merge = ctx.append_block("if_end");

        for (condition, body) in &self.branches {
            let condition_value = to_condition(ctx, condition);
            let then_block = ctx.append_block("if_then");
            let next_block = ctx.append_block("if_next");
            ctx.builder
                .build_conditional_branch(condition_value, then_block, next_block)
                .unwrap();

            ctx.builder.position_at_end(then_block);
            body.codegen(ctx);
            if !ctx.block_terminated() {
                ctx.builder.build_unconditional_branch(merge).unwrap();
            }
            ctx.builder.position_at_end(next_block);
        }

        if let Some(else_branch) = &self.else_branch {
            else_branch.codegen(ctx);
        }
        if !ctx.block_terminated() {
            ctx.builder.build_unconditional_branch(merge).unwrap();
        }
        ctx.builder.position_at_end(merge);
    }
}

impl<'ctx> CodeGen<'ctx> for SwitchStatement {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let argument = self
            .argument
            .codegen(ctx)
            .expect("switch argument")
            .into_int_value();
        let merge = ctx.append_block("switch_end");

        for case in &self.cases {
            let body_block = ctx.append_block("case_body");
            // One comparison per case value; any match enters the body.
            let next = ctx.append_block("case_next");
            for (index, value) in case.values.iter().enumerate() {
                let case_value = value
                    .codegen(ctx)
                    .expect("case value")
                    .into_int_value();
                let matches = ctx
                    .builder
                    .build_int_compare(IntPredicate::EQ, argument, case_value, "case_cmp")
                    .unwrap();
                if index + 1 < case.values.len() {
                    let or_else = ctx.append_block("case_or");
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
            case.body.codegen(ctx);
            if !ctx.block_terminated() {
                ctx.builder.build_unconditional_branch(merge).unwrap();
            }
            // The following case (or the else branch) continues from the
            // fall-through block.
            ctx.builder.position_at_end(next);
        }

        if let Some(else_branch) = &self.else_branch {
            else_branch.codegen(ctx);
        }
        if !ctx.block_terminated() {
            ctx.builder.build_unconditional_branch(merge).unwrap();
        }
        ctx.builder.position_at_end(merge);
    }
}

impl<'ctx> CodeGen<'ctx> for WhileLoop {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let header = ctx.append_block("while_cond");
        let body_block = ctx.append_block("while_body");
        let after = ctx.append_block("while_end");

        ctx.builder.build_unconditional_branch(header).unwrap();
        ctx.builder.position_at_end(header);
        let condition = to_condition(ctx, &self.condition);
        ctx.builder
            .build_conditional_branch(condition, body_block, after)
            .unwrap();

        ctx.builder.position_at_end(body_block);
        ctx.push_loop_targets(after, header);
        self.body.codegen(ctx);
        ctx.pop_loop_targets();
        if !ctx.block_terminated() {
            ctx.builder.build_unconditional_branch(header).unwrap();
        }

        ctx.builder.position_at_end(after);
    }
}

impl<'ctx> CodeGen<'ctx> for ForEver {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let body_block = ctx.append_block("loop_body");
        let after = ctx.append_block("loop_end");

        ctx.builder.build_unconditional_branch(body_block).unwrap();
        ctx.builder.position_at_end(body_block);
        ctx.push_loop_targets(after, body_block);
        self.body.codegen(ctx);
        ctx.pop_loop_targets();
        if !ctx.block_terminated() {
            ctx.builder.build_unconditional_branch(body_block).unwrap();
        }

        ctx.builder.position_at_end(after);
    }
}

impl<'ctx> CodeGen<'ctx> for ForRange {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let ty = self.start.ty();
        let Some(kind) = ty.number_kind() else {
            panic!("range bounds are numbers");
        };
        let llvm_ty = ctx.llvm_type(&ty);

        let start = self.start.codegen(ctx).expect("range start");
        let end = self.end.codegen(ctx).expect("range end");
        let step = self
            .step
            .as_ref()
            .map(|step| step.codegen(ctx).expect("range step"));

        let slot = ctx.builder.build_alloca(llvm_ty, &self.variable).unwrap();
        ctx.builder.build_store(slot, start).unwrap();

        let header = ctx.append_block("for_cond");
        let body_block = ctx.append_block("for_body");
        let advance = ctx.append_block("for_step");
        let after = ctx.append_block("for_end");

        ctx.builder.build_unconditional_branch(header).unwrap();
        ctx.builder.position_at_end(header);
        let current = ctx.builder.build_load(llvm_ty, slot, &self.variable).unwrap();
        let in_range = if kind.is_float() {
            ctx.builder
                .build_float_compare(
                    inkwell::FloatPredicate::OLT,
                    current.into_float_value(),
                    end.into_float_value(),
                    "for_cmp",
                )
                .unwrap()
        } else {
            let predicate = if kind.is_signed() {
                IntPredicate::SLT
            } else {
                IntPredicate::ULT
            };
            ctx.builder
                .build_int_compare(
                    predicate,
                    current.into_int_value(),
                    end.into_int_value(),
                    "for_cmp",
                )
                .unwrap()
        };
        ctx.builder
            .build_conditional_branch(in_range, body_block, after)
            .unwrap();

        ctx.builder.position_at_end(body_block);
        ctx.enter_scope();
        ctx.scope.borrow_mut().define(
            &self.variable,
            Binding::Variable {
                ptr: slot,
                ty: ty.clone(),
            },
        );
        ctx.push_loop_targets(after, advance);
        self.body.codegen(ctx);
        ctx.pop_loop_targets();
        ctx.exit_scope();
        if !ctx.block_terminated() {
            ctx.builder.build_unconditional_branch(advance).unwrap();
        }

        ctx.builder.position_at_end(advance);
        let current = ctx.builder.build_load(llvm_ty, slot, &self.variable).unwrap();
        let next: BasicValueEnum<'ctx> = if kind.is_float() {
            let step = step
                .map(BasicValueEnum::into_float_value)
                .unwrap_or_else(|| llvm_ty.into_float_type().const_float(1.0));
            ctx.builder
                .build_float_add(current.into_float_value(), step, "for_next")
                .unwrap()
                .into()
        } else {
            let step = step
                .map(BasicValueEnum::into_int_value)
                .unwrap_or_else(|| llvm_ty.into_int_type().const_int(1, false));
            ctx.builder
                .build_int_add(current.into_int_value(), step, "for_next")
                .unwrap()
                .into()
        };
        ctx.builder.build_store(slot, next).unwrap();
        ctx.builder.build_unconditional_branch(header).unwrap();

        ctx.builder.position_at_end(after);
    }
}

impl<'ctx> CodeGen<'ctx> for ForEach {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let collection_type = self.collection.ty();
        let i64_type = ctx.context.i64_type();

        // Materialize the collection once; arrays iterate through a
        // pointer to their storage, strings through strlen.
        let (base_ptr, length, element_type): (PointerValue<'ctx>, IntValue<'ctx>, Type) =
            match &collection_type {
                Type::StaticArray { element, size }
                | Type::StaticVector { element, size } => {
                    let ptr = self.collection_address(ctx, &collection_type);
                    (ptr, i64_type.const_int(*size as u64, false), (**element).clone())
                }
                ty if ty.is_string() => {
                    let ptr = self
                        .collection
                        .codegen(ctx)
                        .expect("string value")
                        .into_pointer_value();
                    let strlen = ctx.libc_function("strlen");
                    let length = ctx
                        .builder
                        .build_call(strlen, &[ptr.into()], "len")
                        .unwrap()
                        .try_as_basic_value()
                        .left()
                        .expect("strlen returns a value")
                        .into_int_value();
                    (ptr, length, Type::Number(NumberKind::I8))
                }
                other => panic!("can not iterate over '{other}'"),
            };

        let index_slot = ctx.builder.build_alloca(i64_type, "for_idx").unwrap();
        ctx.builder
            .build_store(index_slot, i64_type.const_zero())
            .unwrap();

        let header = ctx.append_block("each_cond");
        let body_block = ctx.append_block("each_body");
        let advance = ctx.append_block("each_step");
        let after = ctx.append_block("each_end");

        ctx.builder.build_unconditional_branch(header).unwrap();
        ctx.builder.position_at_end(header);
        let index = ctx
            .builder
            .build_load(i64_type, index_slot, "idx")
            .unwrap()
            .into_int_value();
        let in_range = ctx
            .builder
            .build_int_compare(IntPredicate::ULT, index, length, "each_cmp")
            .unwrap();
        ctx.builder
            .build_conditional_branch(in_range, body_block, after)
            .unwrap();

        ctx.builder.position_at_end(body_block);
        ctx.enter_scope();

        let element_llvm = ctx.llvm_type(&element_type);
        let element_ptr = match &collection_type {
            Type::StaticArray { .. } => {
                let array_type = ctx.llvm_type(&collection_type);
                unsafe {
                    ctx.builder
                        .build_in_bounds_gep(
                            array_type,
                            base_ptr,
                            &[i64_type.const_zero(), index],
                            "elem_ptr",
                        )
                        .unwrap()
                }
            }
            _ => unsafe {
                ctx.builder
                    .build_in_bounds_gep(element_llvm, base_ptr, &[index], "elem_ptr")
                    .unwrap()
            },
        };

        if self.element != "_" {
            let element_value = ctx
                .builder
                .build_load(element_llvm, element_ptr, &self.element)
                .unwrap();
            let slot = ctx
                .builder
                .build_alloca(element_llvm, &self.element)
                .unwrap();
            ctx.builder.build_store(slot, element_value).unwrap();
            ctx.define(
                &self.element,
                Binding::Variable {
                    ptr: slot,
                    ty: element_type.clone(),
                },
            );
        }
        if let Some(index_name) = &self.index {
            if index_name != "_" {
                ctx.define(
                    index_name,
                    Binding::Variable {
                        ptr: index_slot,
                        ty: Type::Number(NumberKind::I64),
                    },
                );
            }
        }

        ctx.push_loop_targets(after, advance);
        self.body.codegen(ctx);
        ctx.pop_loop_targets();
        ctx.exit_scope();
        if !ctx.block_terminated() {
            ctx.builder.build_unconditional_branch(advance).unwrap();
        }

        ctx.builder.position_at_end(advance);
        let index = ctx
            .builder
            .build_load(i64_type, index_slot, "idx")
            .unwrap()
            .into_int_value();
        let next = ctx
            .builder
            .build_int_add(index, i64_type.const_int(1, false), "idx_next")
            .unwrap();
        ctx.builder.build_store(index_slot, next).unwrap();
        ctx.builder.build_unconditional_branch(header).unwrap();

        ctx.builder.position_at_end(after);
    }
}

impl ForEach {
    /// Address of the iterated aggregate: in-place for addressable
    /// collections, a temporary otherwise.
    fn collection_address<'ctx>(
        &self,
        ctx: &CodegenContext<'ctx>,
        collection_type: &Type,
    ) -> PointerValue<'ctx> {
        if let Some((ptr, _)) = super::expression::try_emit_address(&self.collection, ctx) {
            return ptr;
        }
        let value = self.collection.codegen(ctx).expect("collection value");
        let slot = ctx
            .builder
            .build_alloca(ctx.llvm_type(collection_type), "each_tmp")
            .unwrap();
        ctx.builder.build_store(slot, value).unwrap();
        slot
    }
}

impl<'ctx> CodeGen<'ctx> for ReturnStatement {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let value = self
            .value
            .as_ref()
            .map(|value| value.codegen(ctx).expect("return value"));

        // Unwind every open defer scope of the function before leaving.
        ctx.emit_all_deferred();

        match value {
            Some(value) => ctx.builder.build_return(Some(&value)).unwrap(),
            None => ctx.builder.build_return(None).unwrap(),
        };
    }
}

impl<'ctx> CodeGen<'ctx> for DeferStatement {
    type ReturnValue = ();

    fn codegen(&self, ctx: &CodegenContext<'ctx>) {
        let Expression::Call(call) = &self.call else {
            panic!("defer takes a call expression");
        };
        let deferred = super::expression::capture_deferred_call(call, ctx);
        ctx.record_deferred(deferred);
    }
}

/// Lowers a condition to `i1`: an `i1` passes through, any other number
/// compares against zero.
pub(crate) fn to_condition<'ctx>(
    ctx: &CodegenContext<'ctx>,
    condition: &Expression,
) -> IntValue<'ctx> {
    let value = condition.codegen(ctx).expect("condition value");
    match value {
        BasicValueEnum::IntValue(int) => {
            if int.get_type().get_bit_width() == 1 {
                int
            } else {
                ctx.builder
                    .build_int_compare(
                        IntPredicate::NE,
                        int,
                        int.get_type().const_zero(),
                        "tobool",
                    )
                    .unwrap()
            }
        }
        BasicValueEnum::FloatValue(float) => ctx
            .builder
            .build_float_compare(
                inkwell::FloatPredicate::ONE,
                float,
                float.get_type().const_zero(),
                "tobool",
            )
            .unwrap(),
        other => panic!("{other:?} is not a condition"),
    }
}
