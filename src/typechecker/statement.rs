//! Statement checking, including the shallow declaration pre-pass.

use crate::parser::ast::*;
use crate::typechecker::types::{EnumType, FunctionType, NumberKind, StructType, Type};

use super::returns::block_returns;
use super::{coerce, operator_overload_name, resolve_type, retargets, Check, Context, TypeResult};

/// Registers every top-level declaration before bodies are checked:
/// struct stubs first, then enums, then struct fields (so mutually
/// recursive structs resolve), then function prototypes.
pub(crate) fn shallow_check(statements: &[Statement], ctx: &mut Context<'_>) -> TypeResult<()> {
    for statement in statements {
        if let Statement::Struct(declaration) = statement {
            if !declaration.generic_parameters.is_empty() {
                ctx.generic_structs
                    .insert(declaration.name.clone(), declaration.clone());
                continue;
            }
            let stub = StructType {
                name: declaration.name.clone(),
                field_names: vec![],
                field_types: vec![],
                generic_parameters: vec![],
                generic_parameter_types: vec![],
                is_packed: declaration.is_packed,
                is_generic: false,
                is_extern: declaration.is_extern,
            };
            if !ctx.scope.define(&declaration.name, Type::Struct(Box::new(stub))) {
                return Err(ctx.error(
                    declaration.name_span,
                    format!("Type '{}' is already defined", declaration.name),
                ));
            }
        }
    }

    for statement in statements {
        if let Statement::Enum(declaration) = statement {
            declare_enum(declaration, ctx)?;
        }
    }

    for statement in statements {
        if let Statement::Struct(declaration) = statement {
            if declaration.generic_parameters.is_empty() {
                fill_struct_fields(declaration, ctx)?;
            }
        }
    }

    for statement in statements {
        match statement {
            Statement::Prototype(prototype) => {
                if prototype.is_generic() {
                    return Err(ctx.error(
                        prototype.name_span,
                        "Generic functions need a body to specialize",
                    ));
                }
                declare_function(prototype, false, ctx)?;
            }
            Statement::Intrinsic(intrinsic) => {
                declare_function(&intrinsic.prototype, true, ctx)?;
            }
            Statement::Function(function) => {
                if function.prototype.is_generic() {
                    let name = function.prototype.name.clone();
                    if ctx.generic_functions.insert(name.clone(), function.clone()).is_some() {
                        return Err(ctx.error(
                            function.prototype.name_span,
                            format!("Generic function '{name}' is already defined"),
                        ));
                    }
                } else {
                    declare_function(&function.prototype, false, ctx)?;
                }
            }
            Statement::OperatorFunction(operator) => {
                declare_operator_function(operator, ctx)?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn declare_enum(declaration: &EnumDeclaration, ctx: &mut Context<'_>) -> TypeResult<()> {
    let element = resolve_type(ctx, &declaration.element)?;
    let Some(kind) = element.number_kind().filter(NumberKind::is_integer) else {
        return Err(ctx.error(
            declaration.element.span(),
            format!("Enum element type must be an integer, got '{element}'"),
        ));
    };
    if kind == NumberKind::I1 && declaration.members.len() > 2 {
        return Err(ctx.error(
            declaration.name_span,
            "A bool-typed enum can hold at most two members",
        ));
    }

    let mut values = vec![];
    for (index, (member, span)) in declaration.members.iter().enumerate() {
        if values.iter().any(|(existing, _)| existing == member) {
            return Err(ctx.error(
                *span,
                format!("Enum member '{member}' is already defined"),
            ));
        }
        values.push((member.clone(), index as u32));
    }

    let enum_type = EnumType {
        name: declaration.name.clone(),
        values,
        element: kind,
    };
    if !ctx
        .scope
        .define(&declaration.name, Type::Enum(Box::new(enum_type)))
    {
        return Err(ctx.error(
            declaration.name_span,
            format!("Type '{}' is already defined", declaration.name),
        ));
    }
    Ok(())
}

fn fill_struct_fields(declaration: &StructDeclaration, ctx: &mut Context<'_>) -> TypeResult<()> {
    let mut field_names = vec![];
    let mut field_types = vec![];
    for (name, type_name) in &declaration.fields {
        if field_names.contains(name) {
            return Err(ctx.error(
                type_name.span(),
                format!("Field '{name}' is already defined"),
            ));
        }
        field_names.push(name.clone());
        field_types.push(resolve_type(ctx, type_name)?);
    }

    let filled = StructType {
        name: declaration.name.clone(),
        field_names,
        field_types,
        generic_parameters: vec![],
        generic_parameter_types: vec![],
        is_packed: declaration.is_packed,
        is_generic: false,
        is_extern: declaration.is_extern,
    };
    ctx.scope
        .replace_global(&declaration.name, Type::Struct(Box::new(filled)));
    Ok(())
}

/// Resolves a prototype's signature into a [`FunctionType`], stores it in
/// the prototype's slot and defines the name.
pub(crate) fn declare_function(
    prototype: &FunctionPrototype,
    is_intrinsic: bool,
    ctx: &mut Context<'_>,
) -> TypeResult<Type> {
    let mut params = vec![];
    for parameter in &prototype.parameters {
        params.push(resolve_type(ctx, &parameter.type_name)?);
    }
    let return_type = resolve_type(ctx, &prototype.return_type)?;

    let (has_varargs, varargs) = match &prototype.varargs {
        VarargsSpec::None => (false, None),
        VarargsSpec::Any => (true, None),
        VarargsSpec::Typed(type_name) => (true, Some(Box::new(resolve_type(ctx, type_name)?))),
    };

    let function = FunctionType {
        name: prototype.name.clone(),
        params,
        return_type: Box::new(return_type),
        has_varargs,
        varargs,
        is_intrinsic,
        is_generic: false,
        generic_names: vec![],
        implicit_names: vec![],
        implicit_param_count: 0,
    };
    let ty = Type::Function(Box::new(function));
    prototype.ty.set(ty.clone());

    if !ctx.scope.define(&prototype.name, ty.clone()) {
        return Err(ctx.error(
            prototype.name_span,
            format!("Function '{}' is already defined", prototype.name),
        ));
    }
    Ok(ty)
}

fn declare_operator_function(
    operator: &OperatorFunctionDeclaration,
    ctx: &mut Context<'_>,
) -> TypeResult<()> {
    let expected_arity = match operator.fixity {
        Fixity::Infix => 2,
        Fixity::Prefix | Fixity::Postfix => 1,
    };
    if operator.parameters.len() != expected_arity {
        return Err(ctx.error(
            operator.span,
            format!(
                "Operator '{}' takes {expected_arity} parameters, got {}",
                operator.op.operator_str(),
                operator.parameters.len()
            ),
        ));
    }

    let mut params = vec![];
    for parameter in &operator.parameters {
        params.push(resolve_type(ctx, &parameter.type_name)?);
    }

    // Overloading is reserved for user types; built-in numeric and enum
    // operands keep their built-in meaning.
    let primitive =
        |t: &Type| matches!(t, Type::Number(_) | Type::EnumElement { .. });
    if params.iter().all(primitive) {
        return Err(ctx.error(
            operator.span,
            "Operator overloads need at least one non-primitive parameter",
        ));
    }

    let return_type = resolve_type(ctx, &operator.return_type)?;
    let name = operator_overload_name(operator.op, operator.fixity, &params);
    let function = FunctionType::plain(&name, params, return_type);
    let ty = Type::Function(Box::new(function));
    operator.ty.set(ty.clone());
    *operator.mangled_name.borrow_mut() = name.clone();

    if !ctx.scope.define(&name, ty) {
        return Err(ctx.error(
            operator.span,
            format!(
                "Operator '{}' is already overloaded for these operand types",
                operator.op.operator_str()
            ),
        ));
    }
    Ok(())
}

impl Check for Statement {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        match self {
            Statement::Block(block) => block.check(ctx),
            Statement::Const(declaration) => declaration.check(ctx),
            Statement::Field(declaration) => declaration.check(ctx),
            Statement::Destructuring(declaration) => declaration.check(ctx),
            // Prototypes were declared by the shallow pass; one with an
            // unresolved slot was written inside a function body.
            Statement::Prototype(prototype) => {
                if prototype.ty.is_unresolved() {
                    return Err(ctx.error(
                        prototype.name_span,
                        "Function declarations are only allowed at module scope",
                    ));
                }
                Ok(())
            }
            Statement::Intrinsic(intrinsic) => {
                if intrinsic.prototype.ty.is_unresolved() {
                    return Err(ctx.error(
                        intrinsic.prototype.name_span,
                        "Function declarations are only allowed at module scope",
                    ));
                }
                Ok(())
            }
            Statement::Function(function) => function.check(ctx),
            Statement::OperatorFunction(operator) => operator.check(ctx),
            // Struct and enum declarations are fully handled by the
            // shallow pass; one it never saw was nested.
            Statement::Struct(declaration) => {
                let known = ctx.scope.lookup(&declaration.name).is_some()
                    || ctx.generic_structs.contains_key(&declaration.name);
                if !known {
                    return Err(ctx.error(
                        declaration.name_span,
                        "Type declarations are only allowed at module scope",
                    ));
                }
                Ok(())
            }
            Statement::Enum(declaration) => {
                if ctx.scope.lookup(&declaration.name).is_none() {
                    return Err(ctx.error(
                        declaration.name_span,
                        "Type declarations are only allowed at module scope",
                    ));
                }
                Ok(())
            }
            Statement::If(if_statement) => if_statement.check(ctx),
            Statement::Switch(switch) => switch.check(ctx),
            Statement::ForRange(for_range) => for_range.check(ctx),
            Statement::ForEach(for_each) => for_each.check(ctx),
            Statement::ForEver(for_ever) => for_ever.check(ctx),
            Statement::While(while_loop) => while_loop.check(ctx),
            Statement::Return(return_statement) => return_statement.check(ctx),
            Statement::Defer(defer) => defer.check(ctx),
            Statement::Break(break_statement) => {
                check_loop_exit(ctx, break_statement.times, break_statement.explicit, break_statement.span, "break")
            }
            Statement::Continue(continue_statement) => check_loop_exit(
                ctx,
                continue_statement.times,
                continue_statement.explicit,
                continue_statement.span,
                "continue",
            ),
            Statement::Expression(statement) => {
                statement.expression.check(ctx)?;
                Ok(())
            }
        }
    }
}

impl Check for Block {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        ctx.scope.push_scope();
        let mut result = Ok(());
        for statement in &self.statements {
            result = statement.check(ctx);
            if result.is_err() {
                break;
            }
        }
        ctx.scope.pop_scope();
        result
    }
}

impl Check for ConstDeclaration {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let ty = self.value.check(ctx)?;
        if ctx.scope.level() == 0 && !self.value.is_constant() {
            return Err(ctx.error(
                self.span,
                format!(
                    "Initializer of global constant '{}' must be a compile-time constant",
                    self.name
                ),
            ));
        }
        self.ty.set(ty.clone());
        if !ctx.scope.define(&self.name, ty) {
            return Err(ctx.error(
                self.name_span,
                format!("'{}' is already defined in this scope", self.name),
            ));
        }
        Ok(())
    }
}

impl Check for FieldDeclaration {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let annotated = match &self.type_name {
            Some(type_name) => Some(resolve_type(ctx, type_name)?),
            None => None,
        };

        if let Some(value) = &self.value {
            value.check(ctx)?;
            if self.global && !value.is_constant() {
                return Err(ctx.error(
                    value.span(),
                    format!(
                        "Initializer of global variable '{}' must be a compile-time constant",
                        self.name
                    ),
                ));
            }
        }

        let ty = match (&annotated, &self.value) {
            (Some(expected), Some(value)) => {
                if matches!(value, Expression::Null(_)) && !expected.is_pointer() {
                    return Err(ctx.error(
                        value.span(),
                        "Can't declare non pointer variable with null value",
                    ));
                }
                coerce(ctx, value, expected)?
            }
            (Some(expected), None) => expected.clone(),
            (None, Some(value)) => match value.ty() {
                Type::None => {
                    return Err(ctx.error(
                        self.span,
                        format!("Please add a type to variable '{}'", self.name),
                    ))
                }
                Type::Null => {
                    return Err(ctx.error(
                        value.span(),
                        "Can't declare non pointer variable with null value",
                    ))
                }
                ty => ty,
            },
            (None, None) => {
                return Err(ctx.error(
                    self.span,
                    format!("Please add a type to variable '{}'", self.name),
                ))
            }
        };

        self.ty.set(ty.clone());
        if !ctx.scope.define(&self.name, ty) {
            return Err(ctx.error(
                self.name_span,
                format!("'{}' is already defined in this scope", self.name),
            ));
        }
        Ok(())
    }
}

impl Check for DestructuringDeclaration {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        if ctx.scope.level() == 0 {
            return Err(ctx.error(
                self.span,
                "Destructuring declarations are only allowed inside functions",
            ));
        }

        let ty = self.value.check(ctx)?;
        let Type::Tuple { field_types, .. } = &ty else {
            return Err(ctx.error(
                self.value.span(),
                format!("Destructuring needs a tuple value, got '{ty}'"),
            ));
        };
        if field_types.len() != self.names.len() {
            return Err(ctx.error(
                self.span,
                format!(
                    "Destructuring {} names from a tuple with {} fields",
                    self.names.len(),
                    field_types.len()
                ),
            ));
        }

        for ((name, span), field_type) in self.names.iter().zip(field_types) {
            if name == "_" {
                continue;
            }
            if !ctx.scope.define(name, field_type.clone()) {
                return Err(ctx.error(
                    *span,
                    format!("'{name}' is already defined in this scope"),
                ));
            }
        }
        Ok(())
    }
}

impl Check for FunctionDeclaration {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        if self.prototype.is_generic() {
            // Stored by the shallow pass; instances are checked per call.
            if !ctx.generic_functions.contains_key(&self.prototype.name) {
                return Err(ctx.error(
                    self.prototype.name_span,
                    "Function declarations are only allowed at module scope",
                ));
            }
            return Ok(());
        }
        if self.prototype.ty.is_unresolved() {
            return Err(ctx.error(
                self.prototype.name_span,
                "Function declarations are only allowed at module scope",
            ));
        }

        let Type::Function(function) = self.prototype.ty.get() else {
            return Ok(());
        };

        check_function_body(
            ctx,
            &self.prototype.parameters,
            &function.params,
            (*function.return_type).clone(),
            &self.body,
        )?;

        if *function.return_type != Type::Void && !block_returns(&self.body) {
            return Err(ctx.error(
                self.prototype.name_span,
                format!(
                    "Missing return statement in function '{}'",
                    self.prototype.name
                ),
            ));
        }
        Ok(())
    }
}

impl Check for OperatorFunctionDeclaration {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let Type::Function(function) = self.ty.get() else {
            return Err(ctx.error(
                self.span,
                "Operator declarations are only allowed at module scope",
            ));
        };

        check_function_body(
            ctx,
            &self.parameters,
            &function.params,
            (*function.return_type).clone(),
            &self.body,
        )?;

        if *function.return_type != Type::Void && !block_returns(&self.body) {
            return Err(ctx.error(
                self.span,
                format!(
                    "Missing return statement in operator '{}'",
                    self.op.operator_str()
                ),
            ));
        }
        Ok(())
    }
}

/// Shared body checking: a fresh scope with the parameters defined and the
/// return type pushed for nested `return` statements.
pub(crate) fn check_function_body(
    ctx: &mut Context<'_>,
    parameters: &[Parameter],
    parameter_types: &[Type],
    return_type: Type,
    body: &Block,
) -> TypeResult<()> {
    ctx.return_types.push(return_type);
    ctx.scope.push_scope();
    let mut result = Ok(());
    for (parameter, ty) in parameters.iter().zip(parameter_types) {
        if !ctx.scope.define(&parameter.name, ty.clone()) {
            result = Err(ctx.error(
                parameter.span,
                format!("Parameter '{}' is already defined", parameter.name),
            ));
            break;
        }
    }
    if result.is_ok() {
        result = body.check(ctx);
    }
    ctx.scope.pop_scope();
    ctx.return_types.pop();
    result
}

impl Check for IfStatement {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        for (condition, body) in &self.branches {
            let ty = condition.check(ctx)?;
            if !ty.is_number() {
                return Err(ctx.error(
                    condition.span(),
                    format!("Condition must be a number type, got '{ty}'"),
                ));
            }
            body.check(ctx)?;
        }
        if let Some(else_branch) = &self.else_branch {
            else_branch.check(ctx)?;
        }
        Ok(())
    }
}

impl Check for SwitchStatement {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let argument_type = self.argument.check(ctx)?;

        match &argument_type {
            Type::Number(kind) if kind.is_integer() => {
                let mut seen = vec![];
                for case in &self.cases {
                    for value in &case.values {
                        value.check(ctx)?;
                        coerce(ctx, value, &argument_type)?;
                        if let Expression::Number(num) = value {
                            let key = format!("{:?}", num.value);
                            if seen.contains(&key) {
                                return Err(ctx.error(
                                    value.span(),
                                    "Duplicate case value in switch",
                                ));
                            }
                            seen.push(key);
                        }
                    }
                    case.body.check(ctx)?;
                }
            }
            Type::EnumElement { enum_name, .. } => {
                let Some(Type::Enum(enum_type)) = ctx.scope.lookup(enum_name).cloned() else {
                    return Err(ctx.error(self.span, format!("Undefined enum '{enum_name}'")));
                };
                let mut covered = vec![];
                for case in &self.cases {
                    for value in &case.values {
                        let value_type = value.check(ctx)?;
                        if value_type != argument_type {
                            return Err(ctx.error(
                                value.span(),
                                format!(
                                    "Case value type '{value_type}' does not match '{argument_type}'"
                                ),
                            ));
                        }
                        let Expression::EnumAccess(access) = value else {
                            return Err(ctx.error(
                                value.span(),
                                "Enum switch cases take enum members",
                            ));
                        };
                        let Some(discriminant) = enum_type.discriminant(&access.member) else {
                            return Err(ctx.error(
                                access.span,
                                format!("'{}' has no member '{}'", enum_name, access.member),
                            ));
                        };
                        if covered.contains(&discriminant) {
                            return Err(ctx.error(value.span(), "Duplicate case value in switch"));
                        }
                        covered.push(discriminant);
                    }
                    case.body.check(ctx)?;
                }
                if self.should_perform_complete_check
                    && covered.len() != enum_type.values.len()
                {
                    return Err(ctx.error(
                        self.span,
                        "Switch is incomplete and must has else branch",
                    ));
                }
            }
            other => {
                return Err(ctx.error(
                    self.argument.span(),
                    format!("Switch argument must be an integer or enum, got '{other}'"),
                ));
            }
        }

        if let Some(else_branch) = &self.else_branch {
            else_branch.check(ctx)?;
        }
        Ok(())
    }
}

impl Check for ForRange {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let start = self.start.check(ctx)?;
        let end = self.end.check(ctx)?;

        let ty = if start == end {
            start
        } else if retargets(&self.end, &start) {
            start
        } else if retargets(&self.start, &end) {
            end
        } else {
            return Err(ctx.error(
                self.span,
                format!("Range bounds must have equal number kinds, got '{start}' and '{end}'"),
            ));
        };
        if !ty.is_number() {
            return Err(ctx.error(
                self.start.span(),
                format!("Range bounds must be numbers, got '{ty}'"),
            ));
        }

        if let Some(step) = &self.step {
            step.check(ctx)?;
            coerce(ctx, step, &ty)?;
        }

        ctx.scope.push_scope();
        ctx.scope.define(&self.variable, ty);
        ctx.loop_depth += 1;
        let result = self.body.check(ctx);
        ctx.loop_depth -= 1;
        ctx.scope.pop_scope();
        result
    }
}

impl Check for ForEach {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let collection = self.collection.check(ctx)?;
        let element_type = match &collection {
            Type::StaticArray { element, .. } | Type::StaticVector { element, .. } => {
                (**element).clone()
            }
            ty if ty.is_string() => Type::Number(NumberKind::I8),
            other => {
                return Err(ctx.error(
                    self.collection.span(),
                    format!("Can't iterate over a value of type '{other}'"),
                ));
            }
        };

        ctx.scope.push_scope();
        if self.element != "_" {
            ctx.scope.define(&self.element, element_type);
        }
        if let Some(index) = &self.index {
            if index != "_" {
                ctx.scope.define(index, Type::Number(NumberKind::I64));
            }
        }
        ctx.loop_depth += 1;
        let result = self.body.check(ctx);
        ctx.loop_depth -= 1;
        ctx.scope.pop_scope();
        result
    }
}

impl Check for ForEver {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        ctx.loop_depth += 1;
        let result = self.body.check(ctx);
        ctx.loop_depth -= 1;
        result
    }
}

impl Check for WhileLoop {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let ty = self.condition.check(ctx)?;
        if !ty.is_number() {
            return Err(ctx.error(
                self.condition.span(),
                format!("Condition must be a number type, got '{ty}'"),
            ));
        }
        ctx.loop_depth += 1;
        let result = self.body.check(ctx);
        ctx.loop_depth -= 1;
        result
    }
}

impl Check for ReturnStatement {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        let Some(expected) = ctx.return_types.last().cloned() else {
            return Err(ctx.error(self.span, "'return' outside of a function"));
        };

        match &self.value {
            None => {
                if expected != Type::Void {
                    return Err(ctx.error(
                        self.span,
                        format!("Function returns '{expected}' but no value was given"),
                    ));
                }
            }
            Some(value) => {
                if expected == Type::Void {
                    return Err(ctx.error(
                        value.span(),
                        "Can't return a value from a void function",
                    ));
                }
                value.check(ctx)?;
                if let Expression::Lambda(lambda) = value {
                    if !lambda.implicit.borrow().is_empty() {
                        return Err(ctx.error(
                            value.span(),
                            "Can't return a lambda that captures from a non-global scope",
                        ));
                    }
                }
                coerce(ctx, value, &expected)?;
            }
        }
        Ok(())
    }
}

impl Check for DeferStatement {
    type Output = ();

    fn check(&self, ctx: &mut Context<'_>) -> TypeResult<()> {
        if !matches!(self.call, Expression::Call(_)) {
            return Err(ctx.error(self.span, "Defer only accepts call expressions"));
        }
        self.call.check(ctx)?;
        Ok(())
    }
}

fn check_loop_exit(
    ctx: &mut Context<'_>,
    times: u32,
    explicit: bool,
    span: crate::lexer::Span,
    what: &str,
) -> TypeResult<()> {
    if ctx.loop_depth == 0 {
        return Err(ctx.error(span, format!("'{what}' outside of a loop")));
    }
    if times as usize > ctx.loop_depth {
        return Err(ctx.error(
            span,
            format!(
                "'{what} {times}' exceeds the enclosing loop depth of {}",
                ctx.loop_depth
            ),
        ));
    }
    if explicit && times == 1 {
        ctx.warning(span, format!("'{what} 1' is the same as plain '{what}'"));
    }
    Ok(())
}
