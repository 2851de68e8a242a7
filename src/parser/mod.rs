//! Recursive-descent parser for La.
//!
//! Statements are parsed by dedicated methods; expressions use a Pratt
//! binding-power loop. The parser builds the [`ast`] tree and installs a
//! best-effort type in every expression slot (literals get their built-in
//! types, everything else starts unresolved). Syntax errors are hard
//! stops: the error is recorded in the sink and the current unit is
//! abandoned without recovery.
//!
//! Because the lexer emits a bare `>>` as two `>` tokens (to keep nested
//! generic argument lists closable), the binary operator loop reassembles
//! two *adjacent* `>` tokens into a right-shift.

pub mod ast;

use crate::diagnostics::{DiagnosticSink, Stage, Stop};
use crate::lexer::{self, Span, Token, TokenKind};
use crate::typechecker::types::{NumberKind, Type};

use ast::*;

pub type ParseResult<T> = Result<T, Stop>;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    sink: &'a mut DiagnosticSink,
    /// Depth of nested braces; zero means module scope.
    depth: usize,
    /// Struct literals are suspended while parsing `if`/`while`/`switch`
    /// and `for` headers, where `name {` starts the body instead.
    struct_literals: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, sink: &'a mut DiagnosticSink) -> Self {
        Parser {
            tokens,
            index: 0,
            sink,
            depth: 0,
            struct_literals: true,
        }
    }

    pub fn parse(mut self) -> ParseResult<CompilationUnit> {
        let mut statements = vec![];
        while !self.at(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(CompilationUnit { statements })
    }

    // ------------------------------------------------------------------
    // Token plumbing

    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.index + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn error(&mut self, span: Span, message: impl ToString) -> Stop {
        self.sink.error(Stage::Syntax, span, message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.at(kind) {
            return Ok(self.advance());
        }
        let token = self.current().clone();
        Err(self.error(
            token.span,
            format!("Expected {what}, found '{}'", token.lexeme),
        ))
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<Token> {
        self.expect(TokenKind::Identifier, what)
    }

    /// Two `>` tokens that touch each other form a right-shift.
    fn at_right_shift(&self) -> bool {
        if !self.at(TokenKind::Greater) || self.peek_kind(1) != TokenKind::Greater {
            return false;
        }
        let first = self.current().span;
        let second = self.tokens[self.index + 1].span;
        first.line == second.line && first.end == second.start
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.kind() {
            TokenKind::At => self.parse_attributed(),
            TokenKind::Fun => self.parse_function(false, None),
            TokenKind::Operator => self.parse_operator_function(),
            TokenKind::Struct => self.parse_struct(false, false),
            TokenKind::Enum => self.parse_enum(),
            TokenKind::Const => self.parse_const(),
            TokenKind::Var => self.parse_var(),
            TokenKind::If => self.parse_if(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::For => self.parse_for(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Defer => self.parse_defer(),
            TokenKind::Break | TokenKind::Continue => self.parse_break_continue(),
            TokenKind::LeftBrace => Ok(Statement::Block(self.parse_block()?)),
            TokenKind::Load | TokenKind::Import => {
                let token = self.advance();
                Err(self.error(
                    token.span,
                    format!("'{}' is recognized but module loading is not supported", token.lexeme),
                ))
            }
            TokenKind::Invalid => {
                let token = self.advance();
                Err(self.sink.error(Stage::Lexical, token.span, token.lexeme))
            }
            _ => {
                let expression = self.parse_expression()?;
                let span = expression.span();
                self.expect(TokenKind::Semicolon, "';' after expression")?;
                Ok(Statement::Expression(ExpressionStatement { expression, span }))
            }
        }
    }

    /// `@extern`, `@intrinsic("name")` and `@packed` prefixes, followed by
    /// the function or struct they decorate.
    fn parse_attributed(&mut self) -> ParseResult<Statement> {
        let mut is_extern = false;
        let mut is_packed = false;
        let mut intrinsic: Option<String> = None;

        while self.at(TokenKind::At) {
            let at = self.advance();
            let name = self.expect_identifier("attribute name")?;
            match name.lexeme.as_str() {
                "extern" => is_extern = true,
                "packed" => is_packed = true,
                "intrinsic" => {
                    self.expect(TokenKind::LeftParen, "'(' after '@intrinsic'")?;
                    let native = self.expect(TokenKind::String, "intrinsic name string")?;
                    self.expect(TokenKind::RightParen, "')' after intrinsic name")?;
                    let bytes = lexer::string_contents(&native.lexeme);
                    intrinsic = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                other => {
                    return Err(self.error(
                        at.span.merge(&name.span),
                        format!("Unknown attribute '@{other}'"),
                    ))
                }
            }
        }

        match self.kind() {
            TokenKind::Fun => self.parse_function(is_extern, intrinsic),
            TokenKind::Struct => self.parse_struct(is_packed, is_extern),
            _ => {
                let span = self.span();
                Err(self.error(span, "Attributes must precede a function or struct"))
            }
        }
    }

    /// Parses a `fun` signature and either a prototype (`;`) or a full
    /// declaration (`{ body }`).
    fn parse_function(
        &mut self,
        is_extern: bool,
        intrinsic: Option<String>,
    ) -> ParseResult<Statement> {
        let fun = self.expect(TokenKind::Fun, "'fun'")?;
        let name = self.expect_identifier("function name")?;

        let mut generic_parameters = vec![];
        if self.eat(TokenKind::Less) {
            loop {
                let parameter = self.expect_identifier("generic parameter name")?;
                generic_parameters.push(parameter.lexeme);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Greater, "'>' after generic parameters")?;
        }

        let (parameters, varargs) = self.parse_parameter_list()?;

        let return_type = if self.at(TokenKind::LeftBrace) || self.at(TokenKind::Semicolon) {
            TypeName::named("void", name.span)
        } else {
            self.expect_type_name()?
        };

        let prototype = FunctionPrototype {
            name: name.lexeme,
            name_span: name.span,
            generic_parameters,
            parameters,
            return_type,
            varargs,
            is_extern,
            span: fun.span.merge(&name.span),
            ty: TypeSlot::new(),
        };

        if let Some(native_name) = intrinsic {
            let span = prototype.span;
            self.expect(TokenKind::Semicolon, "';' after intrinsic prototype")?;
            return Ok(Statement::Intrinsic(IntrinsicPrototype {
                prototype,
                native_name,
                span,
            }));
        }

        if self.eat(TokenKind::Semicolon) {
            return Ok(Statement::Prototype(prototype));
        }

        let body = self.parse_block()?;
        let span = prototype.span;
        Ok(Statement::Function(FunctionDeclaration {
            prototype,
            body,
            span,
        }))
    }

    fn parse_parameter_list(&mut self) -> ParseResult<(Vec<Parameter>, VarargsSpec)> {
        self.expect(TokenKind::LeftParen, "'(' before parameters")?;
        let mut parameters = vec![];
        let mut varargs = VarargsSpec::None;

        while !self.at(TokenKind::RightParen) {
            if self.eat(TokenKind::Varargs) {
                let type_name = self.expect_type_name()?;
                varargs = match &type_name {
                    TypeName::Named { name, .. } if name == "Any" => VarargsSpec::Any,
                    _ => VarargsSpec::Typed(type_name),
                };
                break;
            }
            let name = self.expect_identifier("parameter name")?;
            let type_name = self.expect_type_name()?;
            parameters.push(Parameter {
                name: name.lexeme,
                span: name.span.merge(&type_name.span()),
                type_name,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')' after parameters")?;
        Ok((parameters, varargs))
    }

    /// `operator <op> [prefix|postfix] (params) Ret { body }`.
    fn parse_operator_function(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Operator, "'operator'")?;

        let op = if self.at_right_shift() {
            self.advance();
            self.advance();
            TokenKind::RightShift
        } else {
            let token = self.advance();
            match token.kind {
                TokenKind::Plus
                | TokenKind::PlusPlus
                | TokenKind::Minus
                | TokenKind::MinusMinus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Ampersand
                | TokenKind::AmpersandAmpersand
                | TokenKind::Pipe
                | TokenKind::PipePipe
                | TokenKind::Caret
                | TokenKind::Tilde
                | TokenKind::Bang
                | TokenKind::BangEqual
                | TokenKind::EqualEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual
                | TokenKind::LeftShift => token.kind,
                _ => {
                    return Err(self.error(
                        token.span,
                        format!("'{}' is not an overloadable operator", token.lexeme),
                    ))
                }
            }
        };

        let mut fixity = None;
        if self.at(TokenKind::Identifier) {
            match self.current().lexeme.as_str() {
                "prefix" => {
                    self.advance();
                    fixity = Some(Fixity::Prefix);
                }
                "postfix" => {
                    self.advance();
                    fixity = Some(Fixity::Postfix);
                }
                _ => {}
            }
        }

        let (parameters, varargs) = self.parse_parameter_list()?;
        if !matches!(varargs, VarargsSpec::None) {
            return Err(self.error(keyword.span, "Operator functions can not take varargs"));
        }

        let fixity = fixity.unwrap_or(if parameters.len() == 1 {
            Fixity::Prefix
        } else {
            Fixity::Infix
        });

        let return_type = if self.at(TokenKind::LeftBrace) {
            TypeName::named("void", keyword.span)
        } else {
            self.expect_type_name()?
        };
        let body = self.parse_block()?;

        Ok(Statement::OperatorFunction(OperatorFunctionDeclaration {
            op,
            fixity,
            parameters,
            return_type,
            body,
            mangled_name: RefCellString::default(),
            span: keyword.span,
            ty: TypeSlot::new(),
        }))
    }

    fn parse_struct(&mut self, is_packed: bool, is_extern: bool) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Struct, "'struct'")?;
        let name = self.expect_identifier("struct name")?;

        let mut generic_parameters = vec![];
        if self.eat(TokenKind::Less) {
            loop {
                let parameter = self.expect_identifier("generic parameter name")?;
                generic_parameters.push(parameter.lexeme);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Greater, "'>' after generic parameters")?;
        }

        self.expect(TokenKind::LeftBrace, "'{' before struct fields")?;
        let mut fields = vec![];
        while !self.at(TokenKind::RightBrace) {
            let field = self.expect_identifier("field name")?;
            let type_name = self.expect_type_name()?;
            self.expect(TokenKind::Semicolon, "';' after field")?;
            fields.push((field.lexeme, type_name));
        }
        self.expect(TokenKind::RightBrace, "'}' after struct fields")?;

        Ok(Statement::Struct(StructDeclaration {
            name: name.lexeme,
            name_span: name.span,
            generic_parameters,
            fields,
            is_packed,
            is_extern,
            span: keyword.span.merge(&name.span),
        }))
    }

    fn parse_enum(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Enum, "'enum'")?;
        let name = self.expect_identifier("enum name")?;

        let element = if self.eat(TokenKind::Colon) {
            self.expect_type_name()?
        } else {
            TypeName::named("int32", name.span)
        };

        self.expect(TokenKind::LeftBrace, "'{' before enum members")?;
        let mut members = vec![];
        while !self.at(TokenKind::RightBrace) {
            let member = self.expect_identifier("enum member")?;
            members.push((member.lexeme, member.span));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}' after enum members")?;

        Ok(Statement::Enum(EnumDeclaration {
            name: name.lexeme,
            name_span: name.span,
            element,
            members,
            span: keyword.span.merge(&name.span),
        }))
    }

    fn parse_const(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Const, "'const'")?;
        let name = self.expect_identifier("constant name")?;
        self.expect(TokenKind::Equal, "'=' after constant name")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after constant")?;

        Ok(Statement::Const(ConstDeclaration {
            name: name.lexeme,
            name_span: name.span,
            value,
            span: keyword.span.merge(&name.span),
            ty: TypeSlot::new(),
        }))
    }

    fn parse_var(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Var, "'var'")?;

        if self.at(TokenKind::LeftParen) {
            return self.parse_destructuring(keyword);
        }

        let name = self.expect_identifier("variable name")?;

        let type_name = if self.eat(TokenKind::Colon) {
            Some(self.expect_type_name()?)
        } else {
            None
        };

        let value = if self.eat(TokenKind::Equal) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "';' after declaration")?;

        if type_name.is_none() && value.is_none() {
            return Err(self.error(
                keyword.span.merge(&name.span),
                format!("Variable '{}' needs a type or a value", name.lexeme),
            ));
        }

        Ok(Statement::Field(FieldDeclaration {
            name: name.lexeme,
            name_span: name.span,
            explicit_type: type_name.is_some(),
            type_name,
            value,
            global: self.depth == 0,
            span: keyword.span.merge(&name.span),
            ty: TypeSlot::new(),
        }))
    }

    fn parse_destructuring(&mut self, keyword: Token) -> ParseResult<Statement> {
        self.expect(TokenKind::LeftParen, "'(' before destructuring names")?;
        let mut names = vec![];
        loop {
            let name = self.expect_identifier("destructuring name")?;
            names.push((name.lexeme, name.span));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')' after destructuring names")?;
        self.expect(TokenKind::Equal, "'=' after destructuring names")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after declaration")?;

        if self.depth == 0 {
            return Err(self.error(
                keyword.span,
                "Destructuring declarations are only allowed inside functions",
            ));
        }

        Ok(Statement::Destructuring(DestructuringDeclaration {
            names,
            value,
            span: keyword.span,
        }))
    }

    fn parse_header_expression(&mut self) -> ParseResult<Expression> {
        let previous = self.struct_literals;
        self.struct_literals = false;
        let result = self.parse_expression();
        self.struct_literals = previous;
        result
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::If, "'if'")?;
        let mut branches = vec![];
        let mut else_branch = None;

        let condition = self.parse_header_expression()?;
        branches.push((condition, self.parse_block()?));

        while self.eat(TokenKind::Else) {
            if self.eat(TokenKind::If) {
                let condition = self.parse_header_expression()?;
                branches.push((condition, self.parse_block()?));
            } else {
                else_branch = Some(self.parse_block()?);
                break;
            }
        }

        Ok(Statement::If(IfStatement {
            branches,
            else_branch,
            span: keyword.span,
        }))
    }

    fn parse_switch(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Switch, "'switch'")?;
        let argument = self.parse_header_expression()?;
        self.expect(TokenKind::LeftBrace, "'{' after switch argument")?;

        let mut cases = vec![];
        let mut else_branch = None;

        loop {
            if self.at(TokenKind::RightBrace) {
                break;
            }
            if self.eat(TokenKind::Else) {
                self.expect(TokenKind::Arrow, "'->' after 'else'")?;
                else_branch = Some(self.parse_case_body()?);
                continue;
            }
            let case = self.expect_case_keyword()?;
            let mut values = vec![self.parse_expression()?];
            while self.eat(TokenKind::Comma) {
                values.push(self.parse_expression()?);
            }
            self.expect(TokenKind::Arrow, "'->' after case values")?;
            let body = self.parse_case_body()?;
            cases.push(SwitchCase {
                values,
                span: case.span,
                body,
            });
        }
        self.expect(TokenKind::RightBrace, "'}' after switch cases")?;

        let has_default = else_branch.is_some();
        Ok(Statement::Switch(SwitchStatement {
            argument,
            cases,
            else_branch,
            op: TokenKind::EqualEqual,
            has_default,
            should_perform_complete_check: !has_default,
            span: keyword.span,
        }))
    }

    fn expect_case_keyword(&mut self) -> ParseResult<Token> {
        if self.at(TokenKind::Identifier) && self.current().lexeme == "case" {
            return Ok(self.advance());
        }
        let span = self.span();
        Err(self.error(span, "Expected 'case' or 'else' in switch body"))
    }

    /// A case body is either a block or a single statement, normalized to
    /// a block.
    fn parse_case_body(&mut self) -> ParseResult<Block> {
        if self.at(TokenKind::LeftBrace) {
            return self.parse_block();
        }
        self.depth += 1;
        let statement = self.parse_statement();
        self.depth -= 1;
        let statement = statement?;
        let span = statement.span();
        Ok(Block {
            statements: vec![statement],
            span,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::For, "'for'")?;

        if self.at(TokenKind::LeftBrace) {
            let body = self.parse_block()?;
            return Ok(Statement::ForEver(ForEver {
                body,
                span: keyword.span,
            }));
        }

        let element = self.expect_identifier("loop variable")?;
        let mut index = None;
        if self.eat(TokenKind::Comma) {
            let name = self.expect_identifier("index variable")?;
            index = Some(name.lexeme);
        }

        let in_token = self.expect_identifier("'in'")?;
        if in_token.lexeme != "in" {
            return Err(self.error(in_token.span, "Expected 'in' after loop variable"));
        }

        let first = self.parse_header_expression()?;

        if self.eat(TokenKind::DotDot) {
            if index.is_some() {
                return Err(self.error(keyword.span, "Range loops take a single variable"));
            }
            let end = self.parse_header_expression()?;
            let step = if self.eat(TokenKind::Colon) {
                Some(self.parse_header_expression()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            return Ok(Statement::ForRange(ForRange {
                variable: element.lexeme,
                variable_span: element.span,
                start: first,
                end,
                step,
                body,
                span: keyword.span,
            }));
        }

        let body = self.parse_block()?;
        Ok(Statement::ForEach(ForEach {
            element: element.lexeme,
            element_span: element.span,
            index,
            collection: first,
            body,
            span: keyword.span,
        }))
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::While, "'while'")?;
        let condition = self.parse_header_expression()?;
        let body = self.parse_block()?;
        Ok(Statement::While(WhileLoop {
            condition,
            body,
            span: keyword.span,
        }))
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Return, "'return'")?;
        let value = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after return")?;
        Ok(Statement::Return(ReturnStatement {
            value,
            span: keyword.span,
        }))
    }

    fn parse_defer(&mut self) -> ParseResult<Statement> {
        let keyword = self.expect(TokenKind::Defer, "'defer'")?;
        let call = self.parse_expression()?;
        self.expect(TokenKind::Semicolon, "';' after defer")?;
        Ok(Statement::Defer(DeferStatement {
            call,
            span: keyword.span,
        }))
    }

    fn parse_break_continue(&mut self) -> ParseResult<Statement> {
        let keyword = self.advance();
        let mut times = 1u32;
        let mut explicit = false;
        if self.at(TokenKind::Int) {
            let token = self.advance();
            times = lexer::integer_value(&token.lexeme) as u32;
            explicit = true;
            if times == 0 {
                return Err(self.error(token.span, "Loop depth must be a positive literal"));
            }
        }
        self.expect(TokenKind::Semicolon, "';' after statement")?;

        Ok(match keyword.kind {
            TokenKind::Break => Statement::Break(BreakStatement {
                times,
                explicit,
                span: keyword.span,
            }),
            _ => Statement::Continue(ContinueStatement {
                times,
                explicit,
                span: keyword.span,
            }),
        })
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let open = self.expect(TokenKind::LeftBrace, "'{'")?;
        self.depth += 1;
        let mut statements = vec![];
        while !self.at(TokenKind::RightBrace) && !self.at(TokenKind::Eof) {
            match self.parse_statement() {
                Ok(statement) => statements.push(statement),
                Err(stop) => {
                    self.depth -= 1;
                    return Err(stop);
                }
            }
        }
        self.depth -= 1;
        let close = self.expect(TokenKind::RightBrace, "'}' closing block")?;
        Ok(Block {
            statements,
            span: open.span.merge(&close.span),
        })
    }

    // ------------------------------------------------------------------
    // Types

    fn expect_type_name(&mut self) -> ParseResult<TypeName> {
        let span = self.span();
        match self.parse_type_name_opt() {
            Some(type_name) => Ok(type_name),
            None => {
                let lexeme = self.current().lexeme.clone();
                Err(self.error(span, format!("Expected a type, found '{lexeme}'")))
            }
        }
    }

    /// Silent type parser; restores the cursor on failure so callers can
    /// speculate (generic call arguments vs. comparison chains).
    fn parse_type_name_opt(&mut self) -> Option<TypeName> {
        let start = self.index;
        match self.parse_type_name_inner() {
            Some(type_name) => Some(type_name),
            None => {
                self.index = start;
                None
            }
        }
    }

    fn parse_type_name_inner(&mut self) -> Option<TypeName> {
        let span = self.span();
        match self.kind() {
            TokenKind::Star => {
                self.advance();
                let base = self.parse_type_name_inner()?;
                Some(TypeName::Pointer {
                    span: span.merge(&base.span()),
                    base: Box::new(base),
                })
            }
            TokenKind::LeftBracket => {
                self.advance();
                let size = self.parse_type_size()?;
                if !self.eat(TokenKind::RightBracket) {
                    return None;
                }
                let element = self.parse_type_name_inner()?;
                Some(TypeName::Array {
                    size,
                    span: span.merge(&element.span()),
                    element: Box::new(element),
                })
            }
            TokenKind::Less => {
                self.advance();
                let size = self.parse_type_size()?;
                if !self.eat(TokenKind::Greater) {
                    return None;
                }
                let element = self.parse_type_name_inner()?;
                Some(TypeName::Vector {
                    size,
                    span: span.merge(&element.span()),
                    element: Box::new(element),
                })
            }
            TokenKind::LeftParen => {
                self.advance();
                let mut params = vec![];
                if !self.at(TokenKind::RightParen) {
                    loop {
                        params.push(self.parse_type_name_inner()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                if !self.eat(TokenKind::RightParen) {
                    return None;
                }
                if self.eat(TokenKind::Arrow) {
                    let return_type = self.parse_type_name_inner()?;
                    return Some(TypeName::Function {
                        params,
                        span: span.merge(&return_type.span()),
                        return_type: Box::new(return_type),
                    });
                }
                // `(T)` groups a single type; anything else needed a `->`.
                if params.len() == 1 {
                    return params.into_iter().next();
                }
                None
            }
            TokenKind::Identifier => {
                let name = self.advance();
                if self.eat(TokenKind::Less) {
                    let mut arguments = vec![];
                    loop {
                        arguments.push(self.parse_type_name_inner()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    if !self.eat(TokenKind::Greater) {
                        return None;
                    }
                    return Some(TypeName::Generic {
                        name: name.lexeme,
                        arguments,
                        span: name.span,
                    });
                }
                Some(TypeName::named(name.lexeme, name.span))
            }
            _ => None,
        }
    }

    fn parse_type_size(&mut self) -> Option<u32> {
        if !self.at(TokenKind::Int) {
            return None;
        }
        let token = self.advance();
        Some(lexer::integer_value(&token.lexeme) as u32)
    }

    // ------------------------------------------------------------------
    // Expressions (Pratt)

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        let left = self.parse_binary(0)?;

        if self.kind().is_assignment() {
            let op = self.advance();
            let value = self.parse_expression()?;
            let span = left.span().merge(&value.span());

            // Compound assignments desugar to `target = target <op> value`.
            let value = match op.kind.compound_operator() {
                Some(binary_op) => {
                    let payload = BinaryOperation {
                        op: binary_op,
                        left: Box::new(left.clone()),
                        right: Box::new(value),
                        overload: RefCellOverload::default(),
                        span,
                        ty: TypeSlot::new(),
                    };
                    match binary_op {
                        TokenKind::Ampersand
                        | TokenKind::Pipe
                        | TokenKind::Caret
                        | TokenKind::LeftShift
                        | TokenKind::RightShift => Expression::Bitwise(payload),
                        _ => Expression::Binary(payload),
                    }
                }
                None => value,
            };

            return Ok(Expression::Assign(Assign {
                target: Box::new(left),
                value: Box::new(value),
                span,
                ty: TypeSlot::new(),
            }));
        }

        Ok(left)
    }

    /// Binding power of the binary operator at the cursor; `None` when the
    /// next token does not continue a binary expression.
    fn binary_power(&self) -> Option<(TokenKind, u8)> {
        if self.at_right_shift() {
            return Some((TokenKind::RightShift, 5));
        }
        let power = match self.kind() {
            TokenKind::PipePipe => 1,
            TokenKind::AmpersandAmpersand => 2,
            TokenKind::Ampersand | TokenKind::Pipe | TokenKind::Caret => 3,
            TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => 4,
            TokenKind::LeftShift => 5,
            TokenKind::Plus | TokenKind::Minus => 6,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 7,
            _ => return None,
        };
        Some((self.kind(), power))
    }

    fn parse_binary(&mut self, min_power: u8) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        while let Some((op, power)) = self.binary_power() {
            if power < min_power {
                break;
            }
            if op == TokenKind::RightShift {
                self.advance();
            }
            self.advance();

            let right = self.parse_binary(power + 1)?;
            let span = left.span().merge(&right.span());
            let payload = BinaryOperation {
                op,
                left: Box::new(left),
                right: Box::new(right),
                overload: RefCellOverload::default(),
                span,
                ty: TypeSlot::new(),
            };

            left = match op {
                TokenKind::PipePipe | TokenKind::AmpersandAmpersand => Expression::Logical(payload),
                TokenKind::Ampersand
                | TokenKind::Pipe
                | TokenKind::Caret
                | TokenKind::LeftShift
                | TokenKind::RightShift => Expression::Bitwise(payload),
                TokenKind::EqualEqual
                | TokenKind::BangEqual
                | TokenKind::Less
                | TokenKind::LessEqual
                | TokenKind::Greater
                | TokenKind::GreaterEqual => Expression::Comparison(payload),
                _ => Expression::Binary(payload),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        match self.kind() {
            TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::PlusPlus
            | TokenKind::MinusMinus
            | TokenKind::Star
            | TokenKind::Ampersand => {
                let op = self.advance();
                let operand = self.parse_unary()?;
                let span = op.span.merge(&operand.span());
                Ok(Expression::PrefixUnary(UnaryOperation {
                    op: op.kind,
                    operand: Box::new(operand),
                    overload: RefCellOverload::default(),
                    span,
                    ty: TypeSlot::new(),
                }))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary()?;

        loop {
            match self.kind() {
                TokenKind::LeftParen => {
                    expression = self.parse_call(expression, vec![])?;
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let close = self.expect(TokenKind::RightBracket, "']' after index")?;
                    let span = expression.span().merge(&close.span);
                    expression = Expression::Index(Index {
                        object: Box::new(expression),
                        index: Box::new(index),
                        span,
                        ty: TypeSlot::new(),
                    });
                }
                TokenKind::Dot => {
                    self.advance();
                    let member = if self.at(TokenKind::Int) {
                        self.advance()
                    } else {
                        self.expect_identifier("member name")?
                    };
                    let span = expression.span().merge(&member.span);
                    expression = Expression::Dot(Dot {
                        object: Box::new(expression),
                        member: member.lexeme,
                        member_span: member.span,
                        field_index: std::cell::Cell::new(None),
                        span,
                        ty: TypeSlot::new(),
                    });
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = self.advance();
                    let span = expression.span().merge(&op.span);
                    expression = Expression::PostfixUnary(UnaryOperation {
                        op: op.kind,
                        operand: Box::new(expression),
                        overload: RefCellOverload::default(),
                        span,
                        ty: TypeSlot::new(),
                    });
                }
                _ => break,
            }
        }

        Ok(expression)
    }

    fn parse_call(
        &mut self,
        callee: Expression,
        generic_arguments: Vec<TypeName>,
    ) -> ParseResult<Expression> {
        self.expect(TokenKind::LeftParen, "'(' before arguments")?;
        let previous = self.struct_literals;
        self.struct_literals = true;

        let mut arguments = vec![];
        let result = (|| -> ParseResult<Span> {
            while !self.at(TokenKind::RightParen) {
                arguments.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let close = self.expect(TokenKind::RightParen, "')' after arguments")?;
            Ok(close.span)
        })();
        self.struct_literals = previous;
        let close = result?;

        let span = callee.span().merge(&close);
        Ok(Expression::Call(Call {
            callee: Box::new(callee),
            generic_arguments,
            arguments,
            resolved_name: RefCellOverload::default(),
            span,
            ty: TypeSlot::new(),
        }))
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let span = self.span();
        match self.kind() {
            TokenKind::Int => {
                let token = self.advance();
                Ok(Expression::Number(Num {
                    value: NumberValue::Integer(lexer::integer_value(&token.lexeme)),
                    suffixed: false,
                    span: token.span,
                    ty: TypeSlot::new(),
                }))
            }
            TokenKind::Float => {
                let token = self.advance();
                Ok(Expression::Number(Num {
                    value: NumberValue::Floating(lexer::float_value(&token.lexeme)),
                    suffixed: false,
                    span: token.span,
                    ty: TypeSlot::new(),
                }))
            }
            TokenKind::Number(kind) => {
                let token = self.advance();
                let value = if kind.is_float() {
                    NumberValue::Floating(lexer::float_value(&token.lexeme))
                } else {
                    NumberValue::Integer(lexer::integer_value(&token.lexeme))
                };
                Ok(Expression::Number(Num {
                    value,
                    suffixed: true,
                    span: token.span,
                    ty: TypeSlot::of(Type::Number(kind)),
                }))
            }
            TokenKind::String => {
                let token = self.advance();
                Ok(Expression::String(AstString {
                    value: lexer::string_contents(&token.lexeme),
                    span: token.span,
                    ty: TypeSlot::of(Type::pointer_to(Type::Number(NumberKind::I8))),
                }))
            }
            TokenKind::Character => {
                let token = self.advance();
                Ok(Expression::Character(Character {
                    value: lexer::character_value(&token.lexeme),
                    span: token.span,
                    ty: TypeSlot::of(Type::Number(NumberKind::I8)),
                }))
            }
            TokenKind::True | TokenKind::False => {
                let token = self.advance();
                Ok(Expression::Bool(Bool {
                    value: token.kind == TokenKind::True,
                    span: token.span,
                    ty: TypeSlot::of(Type::Number(NumberKind::I1)),
                }))
            }
            TokenKind::Null => {
                let token = self.advance();
                Ok(Expression::Null(Null {
                    span: token.span,
                    ty: TypeSlot::of(Type::Null),
                }))
            }
            TokenKind::Undefined => {
                let token = self.advance();
                Ok(Expression::Undefined(Undefined {
                    span: token.span,
                    ty: TypeSlot::new(),
                }))
            }
            TokenKind::LeftParen => self.parse_paren_or_tuple(),
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::Less => self.parse_vector_literal(),
            TokenKind::Cast => self.parse_cast(),
            TokenKind::TypeSize | TokenKind::TypeAlign => self.parse_type_query(),
            TokenKind::ValueSize => self.parse_value_size(),
            TokenKind::Fun => self.parse_lambda(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Switch => self.parse_switch_expression(),
            TokenKind::Identifier => self.parse_identifier_expression(),
            TokenKind::Invalid => {
                let token = self.advance();
                Err(self.sink.error(Stage::Lexical, token.span, token.lexeme))
            }
            _ => {
                let lexeme = self.current().lexeme.clone();
                Err(self.error(span, format!("Expected an expression, found '{lexeme}'")))
            }
        }
    }

    fn parse_paren_or_tuple(&mut self) -> ParseResult<Expression> {
        let open = self.expect(TokenKind::LeftParen, "'('")?;
        let previous = self.struct_literals;
        self.struct_literals = true;

        let result = (|| -> ParseResult<Expression> {
            let first = self.parse_expression()?;
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RightParen, "')' after expression")?;
                return Ok(first);
            }

            let mut elements = vec![first];
            while !self.at(TokenKind::RightParen) {
                elements.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let close = self.expect(TokenKind::RightParen, "')' after tuple elements")?;
            Ok(Expression::Tuple(TupleExpression {
                elements,
                span: open.span.merge(&close.span),
                ty: TypeSlot::new(),
            }))
        })();

        self.struct_literals = previous;
        result
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expression> {
        let open = self.expect(TokenKind::LeftBracket, "'['")?;
        let mut elements = vec![];
        while !self.at(TokenKind::RightBracket) {
            elements.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect(TokenKind::RightBracket, "']' after array elements")?;
        Ok(Expression::Array(ArrayLiteral {
            elements,
            span: open.span.merge(&close.span),
            ty: TypeSlot::new(),
        }))
    }

    fn parse_vector_literal(&mut self) -> ParseResult<Expression> {
        let open = self.expect(TokenKind::Less, "'<'")?;
        let mut elements = vec![];
        while !self.at(TokenKind::Greater) {
            elements.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect(TokenKind::Greater, "'>' after vector elements")?;
        Ok(Expression::Vector(VectorLiteral {
            elements,
            span: open.span.merge(&close.span),
            ty: TypeSlot::new(),
        }))
    }

    fn parse_cast(&mut self) -> ParseResult<Expression> {
        let keyword = self.expect(TokenKind::Cast, "'cast'")?;
        self.expect(TokenKind::Less, "'<' after 'cast'")?;
        let target = self.expect_type_name()?;
        self.expect(TokenKind::Greater, "'>' after cast target type")?;
        self.expect(TokenKind::LeftParen, "'(' before cast value")?;
        let value = self.parse_expression()?;
        let close = self.expect(TokenKind::RightParen, "')' after cast value")?;
        Ok(Expression::Cast(Cast {
            target,
            value: Box::new(value),
            span: keyword.span.merge(&close.span),
            ty: TypeSlot::new(),
        }))
    }

    fn parse_type_query(&mut self) -> ParseResult<Expression> {
        let keyword = self.advance();
        self.expect(TokenKind::Less, "'<' after type query")?;
        let target = self.expect_type_name()?;
        let close = self.expect(TokenKind::Greater, "'>' after type")?;
        let query = TypeQuery {
            target,
            target_ty: TypeSlot::new(),
            span: keyword.span.merge(&close.span),
            ty: TypeSlot::of(Type::Number(NumberKind::I64)),
        };
        Ok(match keyword.kind {
            TokenKind::TypeSize => Expression::TypeSize(query),
            _ => Expression::TypeAlign(query),
        })
    }

    fn parse_value_size(&mut self) -> ParseResult<Expression> {
        let keyword = self.expect(TokenKind::ValueSize, "'value_size'")?;
        self.expect(TokenKind::LeftParen, "'(' after 'value_size'")?;
        let value = self.parse_expression()?;
        let close = self.expect(TokenKind::RightParen, "')' after value")?;
        Ok(Expression::ValueSize(ValueSize {
            value: Box::new(value),
            span: keyword.span.merge(&close.span),
            ty: TypeSlot::of(Type::Number(NumberKind::I64)),
        }))
    }

    /// `fun (x int64) -> int64 { ... }` — the lambda's function-pointer
    /// type starts with an empty implicit list; captures are inferred
    /// during checking.
    fn parse_lambda(&mut self) -> ParseResult<Expression> {
        let keyword = self.expect(TokenKind::Fun, "'fun'")?;
        let (parameters, varargs) = self.parse_parameter_list()?;
        if !matches!(varargs, VarargsSpec::None) {
            return Err(self.error(keyword.span, "Lambdas can not take varargs"));
        }

        let return_type = if self.eat(TokenKind::Arrow) {
            self.expect_type_name()?
        } else {
            TypeName::named("void", keyword.span)
        };

        let body = self.parse_block()?;
        let span = keyword.span.merge(&body.span);
        Ok(Expression::Lambda(Lambda {
            parameters,
            return_type,
            body,
            implicit: std::cell::RefCell::new(vec![]),
            span,
            ty: TypeSlot::new(),
        }))
    }

    fn parse_if_expression(&mut self) -> ParseResult<Expression> {
        let keyword = self.expect(TokenKind::If, "'if'")?;
        let mut branches = vec![];

        let condition = self.parse_header_expression()?;
        self.expect(TokenKind::LeftBrace, "'{' before branch value")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::RightBrace, "'}' after branch value")?;
        branches.push((condition, value));

        loop {
            self.expect(TokenKind::Else, "'else' in if expression")?;
            if self.eat(TokenKind::If) {
                let condition = self.parse_header_expression()?;
                self.expect(TokenKind::LeftBrace, "'{' before branch value")?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::RightBrace, "'}' after branch value")?;
                branches.push((condition, value));
                continue;
            }
            self.expect(TokenKind::LeftBrace, "'{' before else value")?;
            let value = self.parse_expression()?;
            let close = self.expect(TokenKind::RightBrace, "'}' after else value")?;
            return Ok(Expression::If(IfExpression {
                branches,
                else_branch: Box::new(value),
                span: keyword.span.merge(&close.span),
                ty: TypeSlot::new(),
            }));
        }
    }

    fn parse_switch_expression(&mut self) -> ParseResult<Expression> {
        let keyword = self.expect(TokenKind::Switch, "'switch'")?;
        let argument = self.parse_header_expression()?;
        self.expect(TokenKind::LeftBrace, "'{' after switch argument")?;

        let mut cases = vec![];
        let mut else_branch = None;

        loop {
            if self.at(TokenKind::RightBrace) {
                break;
            }
            if self.eat(TokenKind::Else) {
                self.expect(TokenKind::Arrow, "'->' after 'else'")?;
                else_branch = Some(Box::new(self.parse_expression()?));
                self.eat(TokenKind::Semicolon);
                continue;
            }
            self.expect_case_keyword()?;
            let mut values = vec![self.parse_expression()?];
            while self.eat(TokenKind::Comma) {
                values.push(self.parse_expression()?);
            }
            self.expect(TokenKind::Arrow, "'->' after case values")?;
            let value = self.parse_expression()?;
            self.eat(TokenKind::Semicolon);
            cases.push((values, value));
        }
        let close = self.expect(TokenKind::RightBrace, "'}' after switch cases")?;

        Ok(Expression::Switch(SwitchExpression {
            argument: Box::new(argument),
            cases,
            else_branch,
            op: TokenKind::EqualEqual,
            span: keyword.span.merge(&close.span),
            ty: TypeSlot::new(),
        }))
    }

    fn parse_identifier_expression(&mut self) -> ParseResult<Expression> {
        let name = self.expect_identifier("a name")?;

        // `Enum::Member`
        if self.eat(TokenKind::ColonColon) {
            let member = self.expect_identifier("enum member")?;
            let span = name.span.merge(&member.span);
            return Ok(Expression::EnumAccess(EnumAccess {
                enum_name: name.lexeme,
                member: member.lexeme,
                discriminant: std::cell::Cell::new(None),
                span,
                ty: TypeSlot::new(),
            }));
        }

        // The floating point infinity constant.
        if name.lexeme == "infinity" {
            return Ok(Expression::Infinity(Infinity {
                span: name.span,
                ty: TypeSlot::new(),
            }));
        }

        // Speculative generic suffix: `name<T, U>(args)` or
        // `name<T, U> { fields }`. A failed parse falls back to treating
        // `<` as a comparison.
        if self.at(TokenKind::Less) {
            let start = self.index;
            if let Some(arguments) = self.parse_generic_argument_list() {
                if self.at(TokenKind::LeftParen) {
                    let callee = Expression::Id(Id {
                        name: name.lexeme,
                        span: name.span,
                        ty: TypeSlot::new(),
                    });
                    return self.parse_call(callee, arguments);
                }
                if self.at(TokenKind::LeftBrace) && self.struct_literals {
                    let type_name = TypeName::Generic {
                        name: name.lexeme,
                        arguments,
                        span: name.span,
                    };
                    return self.parse_init(type_name);
                }
            }
            self.index = start;
        }

        // Struct literal `Name { ... }`.
        if self.at(TokenKind::LeftBrace) && self.struct_literals {
            let type_name = TypeName::named(&name.lexeme, name.span);
            return self.parse_init(type_name);
        }

        Ok(Expression::Id(Id {
            name: name.lexeme,
            span: name.span,
            ty: TypeSlot::new(),
        }))
    }

    fn parse_generic_argument_list(&mut self) -> Option<Vec<TypeName>> {
        let start = self.index;
        if !self.eat(TokenKind::Less) {
            return None;
        }
        let mut arguments = vec![];
        loop {
            match self.parse_type_name_opt() {
                Some(argument) => arguments.push(argument),
                None => {
                    self.index = start;
                    return None;
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(TokenKind::Greater) {
            self.index = start;
            return None;
        }
        Some(arguments)
    }

    fn parse_init(&mut self, type_name: TypeName) -> ParseResult<Expression> {
        let open = self.expect(TokenKind::LeftBrace, "'{' before field values")?;
        let mut arguments = vec![];
        while !self.at(TokenKind::RightBrace) {
            arguments.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect(TokenKind::RightBrace, "'}' after field values")?;
        Ok(Expression::Init(Init {
            type_name,
            arguments,
            span: open.span.merge(&close.span),
            ty: TypeSlot::new(),
        }))
    }
}

// Small local aliases to keep node construction terse.
type RefCellString = std::cell::RefCell<String>;
type RefCellOverload = std::cell::RefCell<Option<String>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> CompilationUnit {
        let mut sink = DiagnosticSink::new();
        let file = sink.add_file("test.la", source);
        let tokens = Lexer::new(source, file).lex();
        match Parser::new(tokens, &mut sink).parse() {
            Ok(unit) => unit,
            Err(_) => panic!(
                "parse failed: {:?}",
                sink.diagnostics()
                    .iter()
                    .map(|d| d.message.clone())
                    .collect::<Vec<_>>()
            ),
        }
    }

    fn parse_fails(source: &str) -> Vec<String> {
        let mut sink = DiagnosticSink::new();
        let file = sink.add_file("test.la", source);
        let tokens = Lexer::new(source, file).lex();
        assert!(Parser::new(tokens, &mut sink).parse().is_err());
        sink.diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect()
    }

    fn first_expression(source: &str) -> Expression {
        let unit = parse(source);
        let Some(Statement::Function(function)) = unit.statements.first() else {
            panic!("expected a function");
        };
        match function.body.statements.first() {
            Some(Statement::Expression(statement)) => statement.expression.clone(),
            Some(Statement::Return(ret)) => ret.value.clone().expect("return value"),
            other => panic!("unexpected first statement: {other:?}"),
        }
    }

    #[test]
    fn test_parse_hello_world() {
        let unit = parse(
            r#"@extern fun printf(format *char, varargs Any) int64;
fun main() int64 {
    printf("Hello, World!\n");
    return 0;
}
"#,
        );
        assert_eq!(unit.statements.len(), 2);

        let Statement::Prototype(prototype) = &unit.statements[0] else {
            panic!("expected a prototype");
        };
        assert_eq!(prototype.name, "printf");
        assert!(prototype.is_extern);
        assert_eq!(prototype.parameters.len(), 1);
        assert_eq!(prototype.varargs, VarargsSpec::Any);

        let Statement::Function(main) = &unit.statements[1] else {
            panic!("expected a function");
        };
        assert_eq!(main.prototype.name, "main");
        assert_eq!(main.body.statements.len(), 2);
    }

    #[test]
    fn test_adjacent_greater_tokens_form_right_shift() {
        let expression = first_expression("fun f(a int64, b int64) int64 { return a >> b; }");
        let Expression::Bitwise(operation) = expression else {
            panic!("expected a shift, got {expression:?}");
        };
        assert_eq!(operation.op, TokenKind::RightShift);
    }

    #[test]
    fn test_nested_generic_arguments_close() {
        // The `>>` at the end closes two generic argument lists because
        // the lexer emitted it as two separate `>` tokens.
        let unit = parse("fun f() { var x : Pair<Pair<int64>>; }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!("expected a function");
        };
        let Statement::Field(field) = &function.body.statements[0] else {
            panic!("expected a declaration");
        };
        let Some(TypeName::Generic { name, arguments, .. }) = &field.type_name else {
            panic!("expected a generic type");
        };
        assert_eq!(name, "Pair");
        assert!(matches!(&arguments[0], TypeName::Generic { name, .. } if name == "Pair"));
    }

    #[test]
    fn test_precedence_of_multiplication() {
        let expression = first_expression("fun f() int64 { return 1 + 2 * 3; }");
        let Expression::Binary(add) = expression else {
            panic!("expected an addition");
        };
        assert_eq!(add.op, TokenKind::Plus);
        assert!(matches!(&*add.right, Expression::Binary(mul) if mul.op == TokenKind::Star));
    }

    #[test]
    fn test_comparison_binds_looser_than_shift() {
        let expression = first_expression("fun f(a int64) int64 { return a << 1 > 2; }");
        let Expression::Comparison(cmp) = expression else {
            panic!("expected a comparison");
        };
        assert!(matches!(&*cmp.left, Expression::Bitwise(shift) if shift.op == TokenKind::LeftShift));
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let unit = parse("fun f() { var a = 1; a += 2; }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::Expression(statement) = &function.body.statements[1] else {
            panic!("expected an expression statement");
        };
        let Expression::Assign(assign) = &statement.expression else {
            panic!("expected an assignment");
        };
        assert!(matches!(&*assign.value, Expression::Binary(op) if op.op == TokenKind::Plus));
    }

    #[test]
    fn test_struct_literals_are_suspended_in_headers() {
        let unit = parse("fun f(x int64) { if x { return; } while x { return; } }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        assert!(matches!(&function.body.statements[0], Statement::If(_)));
        assert!(matches!(&function.body.statements[1], Statement::While(_)));
    }

    #[test]
    fn test_switch_statement_with_cases_and_else() {
        let unit = parse(
            "fun f(x int64) int64 {
                switch x {
                    case 0, 1 -> return 1;
                    case 2 -> { return 2; }
                    else -> return 3;
                }
            }",
        );
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::Switch(switch) = &function.body.statements[0] else {
            panic!("expected a switch");
        };
        assert_eq!(switch.cases.len(), 2);
        assert_eq!(switch.cases[0].values.len(), 2);
        assert!(switch.has_default);
        assert!(!switch.should_perform_complete_check);
    }

    #[test]
    fn test_switch_without_else_requests_complete_check() {
        let unit = parse("fun f(x int64) { switch x { case 0 -> return; } }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::Switch(switch) = &function.body.statements[0] else {
            panic!();
        };
        assert!(switch.should_perform_complete_check);
    }

    #[test]
    fn test_for_variants() {
        let unit = parse(
            "fun f(xs [4]int64) {
                for { break; }
                for i in 0..10 { continue; }
                for i in 0..10 : 2 { }
                for x, i in xs { }
                for _ in xs { }
            }",
        );
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        assert!(matches!(&function.body.statements[0], Statement::ForEver(_)));
        assert!(matches!(
            &function.body.statements[1],
            Statement::ForRange(range) if range.step.is_none()
        ));
        assert!(matches!(
            &function.body.statements[2],
            Statement::ForRange(range) if range.step.is_some()
        ));
        assert!(matches!(
            &function.body.statements[3],
            Statement::ForEach(each) if each.index.as_deref() == Some("i")
        ));
        assert!(matches!(
            &function.body.statements[4],
            Statement::ForEach(each) if each.element == "_"
        ));
    }

    #[test]
    fn test_break_depth_literal() {
        let unit = parse("fun f() { for { for { break 2; } } }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::ForEver(outer) = &function.body.statements[0] else {
            panic!();
        };
        let Statement::ForEver(inner) = &outer.body.statements[0] else {
            panic!();
        };
        assert!(matches!(
            &inner.body.statements[0],
            Statement::Break(b) if b.times == 2 && b.explicit
        ));
    }

    #[test]
    fn test_break_zero_is_rejected() {
        let errors = parse_fails("fun f() { for { break 0; } }");
        assert!(errors.iter().any(|e| e.contains("positive")), "{errors:?}");
    }

    #[test]
    fn test_lambda_expression() {
        let unit = parse("fun f() { var g = fun (x int64) -> int64 { return x; }; }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::Field(field) = &function.body.statements[0] else {
            panic!("expected a declaration");
        };
        let Some(Expression::Lambda(lambda)) = &field.value else {
            panic!("expected a lambda");
        };
        assert_eq!(lambda.parameters.len(), 1);
        assert!(matches!(&lambda.return_type, TypeName::Named { name, .. } if name == "int64"));
    }

    #[test]
    fn test_pointer_to_function_type() {
        let unit = parse("struct S { f *((int64) -> int64); }");
        let Statement::Struct(declaration) = &unit.statements[0] else {
            panic!("expected a struct");
        };
        let TypeName::Pointer { base, .. } = &declaration.fields[0].1 else {
            panic!("expected a pointer field");
        };
        assert!(matches!(&**base, TypeName::Function { params, .. } if params.len() == 1));
    }

    #[test]
    fn test_operator_declaration() {
        let unit = parse(
            "struct V { x int64; }
            operator + (a V, b V) V { return a; }
            operator ++ postfix (a V) V { return a; }",
        );
        let Statement::OperatorFunction(add) = &unit.statements[1] else {
            panic!("expected an operator function");
        };
        assert_eq!(add.op, TokenKind::Plus);
        assert_eq!(add.fixity, Fixity::Infix);

        let Statement::OperatorFunction(inc) = &unit.statements[2] else {
            panic!("expected an operator function");
        };
        assert_eq!(inc.op, TokenKind::PlusPlus);
        assert_eq!(inc.fixity, Fixity::Postfix);
    }

    #[test]
    fn test_destructuring_is_function_scope_only() {
        let errors = parse_fails("var (a, b) = (1, 2);");
        assert!(
            errors.iter().any(|e| e.contains("inside functions")),
            "{errors:?}"
        );

        let unit = parse("fun f() { var (a, _, c) = (1, 2, 3); }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        assert!(matches!(
            &function.body.statements[0],
            Statement::Destructuring(d) if d.names.len() == 3
        ));
    }

    #[test]
    fn test_enum_and_access() {
        let unit = parse(
            "enum Color : int8 { Red, Green, Blue }
            fun f() int32 { return 0; }",
        );
        let Statement::Enum(declaration) = &unit.statements[0] else {
            panic!("expected an enum");
        };
        assert_eq!(declaration.members.len(), 3);

        let expression = first_expression(
            "fun g() Color { return Color::Red; }
            enum Color : int8 { Red }",
        );
        assert!(matches!(expression, Expression::EnumAccess(_)));
    }

    #[test]
    fn test_cast_and_queries() {
        let expression = first_expression("fun f(x int64) int32 { return cast<int32>(x); }");
        assert!(matches!(expression, Expression::Cast(_)));

        let expression = first_expression("fun f() int64 { return type_size<int64>; }");
        assert!(matches!(expression, Expression::TypeSize(_)));

        let expression = first_expression("fun f() int64 { return value_size(1 + 2); }");
        assert!(matches!(expression, Expression::ValueSize(_)));
    }

    #[test]
    fn test_generic_call_vs_comparison() {
        let call = first_expression("fun f() int64 { return id<int64>(42); }");
        let Expression::Call(call) = call else {
            panic!("expected a call");
        };
        assert_eq!(call.generic_arguments.len(), 1);

        // Without a call or literal suffix this is a comparison chain.
        let cmp = first_expression("fun f(a int64, b int64, c int64) int64 { return (a < b) == c > 1; }");
        assert!(matches!(cmp, Expression::Comparison(_)));
    }

    #[test]
    fn test_vector_and_array_literals() {
        let unit = parse("fun f() { var a = [1, 2, 3]; var v = <1u8, 2u8>; }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::Field(a) = &function.body.statements[0] else {
            panic!();
        };
        assert!(matches!(&a.value, Some(Expression::Array(array)) if array.elements.len() == 3));
        let Statement::Field(v) = &function.body.statements[1] else {
            panic!();
        };
        assert!(matches!(&v.value, Some(Expression::Vector(vector)) if vector.elements.len() == 2));
    }

    #[test]
    fn test_defer_takes_an_expression() {
        let unit = parse(r#"fun f() { defer g(); }"#);
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        assert!(matches!(
            &function.body.statements[0],
            Statement::Defer(defer) if matches!(defer.call, Expression::Call(_))
        ));
    }

    #[test]
    fn test_import_is_rejected() {
        let errors = parse_fails("import foo;");
        assert!(errors.iter().any(|e| e.contains("not supported")), "{errors:?}");
    }

    #[test]
    fn test_undefined_initializer() {
        let unit = parse("fun f() { var x : int32 = ---; }");
        let Statement::Function(function) = &unit.statements[0] else {
            panic!();
        };
        let Statement::Field(field) = &function.body.statements[0] else {
            panic!();
        };
        assert!(matches!(&field.value, Some(Expression::Undefined(_))));
    }
}
