//! Parser for the MyLang programming language
//!
//! Recursive descent over the token list with index-based lookahead
//! (`peek_at`). Unlike the lexer, the parser stops at the first error.
//!
//! Binary operators all share one precedence level and associate to the
//! left: `a + b * c` is `(a + b) * c`. Use parentheses to group.

use crate::ast::*;
use crate::error::{MyLangError, SyntaxError, SyntaxErrorCode};
use crate::lexer::{Lexer, Token, TokenKind};
use std::rc::Rc;

type ParseResult<T> = std::result::Result<T, SyntaxError>;

/// Lex and parse in one step
///
/// Any lexical error prevents parsing; all of them are returned together.
pub fn parse_source(source: &str) -> crate::error::Result<Program> {
    let output = Lexer::analyze(source);
    if !output.errors.is_empty() {
        return Err(MyLangError::Lex(output.errors));
    }
    Ok(Parser::new(output.tokens).parse()?)
}

/// Parser for MyLang source code
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::EndOf) {
            let position = tokens.last().map(|t| t.position).unwrap_or_default();
            tokens.push(Token::new(TokenKind::EndOf, "", position));
        }
        Parser { tokens, current: 0 }
    }

    /// Parse a complete program
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        Ok(Program { statements })
    }

    // Helper methods

    fn is_at_end(&self) -> bool {
        self.check(TokenKind::EndOf)
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Token `offset` places ahead of the cursor; `EndOf` past the end
    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_at(&self, offset: usize, kind: TokenKind) -> bool {
        self.peek_at(offset).kind == kind
    }

    fn match_token(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let token = self.peek();
        if token.kind == TokenKind::EndOf {
            return Err(SyntaxError::new(
                SyntaxErrorCode::UnexpectedEndOfInput,
                format!("{}, but reached end of input", message),
                token.position,
            ));
        }
        Err(SyntaxError::new(
            SyntaxErrorCode::ExpectedToken,
            format!("{}, found '{}'", message, token.value),
            token.position,
        ))
    }

    fn consume_identifier(&mut self, message: &str) -> ParseResult<String> {
        Ok(self.consume(TokenKind::Identifier, message)?.value)
    }

    fn unexpected(&self) -> SyntaxError {
        let token = self.peek();
        if token.kind == TokenKind::EndOf {
            SyntaxError::new(
                SyntaxErrorCode::UnexpectedEndOfInput,
                "Unexpected end of input",
                token.position,
            )
        } else {
            SyntaxError::new(
                SyntaxErrorCode::UnexpectedToken,
                format!("Unexpected token '{}'", token.value),
                token.position,
            )
        }
    }

    /// Trailing `;` is optional after every statement
    fn expect_semicolon_or_end(&mut self) {
        self.match_token(&[TokenKind::Semicolon]);
    }

    // Statements

    fn statement(&mut self) -> ParseResult<Statement> {
        let statement = match self.peek().kind {
            TokenKind::Var => self.var_declaration()?,
            TokenKind::Func if self.check_at(1, TokenKind::Identifier) => {
                Statement::Function(self.function(false)?)
            }
            TokenKind::Async
                if self.check_at(1, TokenKind::Func) && self.check_at(2, TokenKind::Identifier) =>
            {
                self.advance();
                Statement::Function(self.function(true)?)
            }
            TokenKind::Enum => self.enum_declaration()?,
            TokenKind::Import if !self.check_at(1, TokenKind::Dot) => self.import_declaration()?,
            TokenKind::Export => self.export_declaration()?,
            TokenKind::Throw => {
                let position = self.advance().position;
                let argument = self.expression()?;
                Statement::Throw { argument, position }
            }
            TokenKind::Defer => {
                let position = self.advance().position;
                let body = self.block()?;
                Statement::Defer { body, position }
            }
            TokenKind::Try => self.try_statement()?,
            TokenKind::Match => self.match_statement()?,
            TokenKind::If => self.if_statement()?,
            TokenKind::For => self.for_statement()?,
            TokenKind::While => {
                let position = self.advance().position;
                let test = self.expression()?;
                let body = self.block()?;
                Statement::While {
                    test,
                    body,
                    position,
                }
            }
            TokenKind::Break => Statement::Break {
                position: self.advance().position,
            },
            TokenKind::Continue => Statement::Continue {
                position: self.advance().position,
            },
            TokenKind::Return => self.return_statement()?,
            TokenKind::LeftBrace => Statement::Block(self.block()?),
            _ => {
                let position = self.peek().position;
                let expression = self.expression()?;
                Statement::Expression {
                    expression,
                    position,
                }
            }
        };
        self.expect_semicolon_or_end();
        Ok(statement)
    }

    fn block(&mut self) -> ParseResult<Block> {
        let position = self.consume(TokenKind::LeftBrace, "Expected '{'")?.position;
        let mut statements = Vec::new();

        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        self.consume(TokenKind::RightBrace, "Expected '}' after block")?;
        Ok(Block {
            statements,
            position,
        })
    }

    fn var_declaration(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Var, "Expected 'var'")?.position;
        let mut declarations = self.declarator_list()?;

        if declarations.len() == 1 {
            if let Some(declarator) = declarations.pop() {
                return Ok(Statement::Variable(declarator));
            }
        }
        Ok(Statement::CombinedVariable {
            declarations,
            position,
        })
    }

    fn declarator_list(&mut self) -> ParseResult<Vec<VariableDeclarator>> {
        let mut declarations = vec![self.declarator()?];
        while self.match_token(&[TokenKind::Comma]) {
            declarations.push(self.declarator()?);
        }
        Ok(declarations)
    }

    fn declarator(&mut self) -> ParseResult<VariableDeclarator> {
        let position = self.peek().position;
        let name = self.consume_identifier("Expected variable name")?;

        let init = if self.match_token(&[TokenKind::Assign]) {
            Some(self.expression()?)
        } else {
            None
        };

        let options = if self.match_token(&[TokenKind::As]) {
            match self.peek().kind {
                TokenKind::Const => {
                    self.advance();
                    Some(VarOptions::constant())
                }
                TokenKind::Readonly => {
                    self.advance();
                    Some(VarOptions::readonly())
                }
                _ => return Err(self.unexpected()),
            }
        } else {
            None
        };

        Ok(VariableDeclarator {
            name,
            init,
            options,
            position,
        })
    }

    /// `func [name](params) { body }`, cursor on `func`
    fn function(&mut self, is_async: bool) -> ParseResult<Rc<FunctionDecl>> {
        let position = self.consume(TokenKind::Func, "Expected 'func'")?.position;
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().value)
        } else {
            None
        };
        let params = self.parameters()?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl::new(
            name, params, is_async, body, position,
        )))
    }

    fn parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        self.consume(TokenKind::LeftParen, "Expected '(' before parameters")?;
        let mut params: Vec<Parameter> = Vec::new();

        while !self.check(TokenKind::RightParen) {
            if params.last().is_some_and(|p| p.rest) {
                return Err(SyntaxError::new(
                    SyntaxErrorCode::RestInvalid,
                    "Rest parameter must be last formal parameter",
                    self.peek().position,
                ));
            }

            let rest = self.match_token(&[TokenKind::Ellipsis]);
            let name = self.consume_identifier("Expected parameter name")?;
            let default = if self.match_token(&[TokenKind::Assign]) {
                if rest {
                    return Err(SyntaxError::new(
                        SyntaxErrorCode::RestInvalid,
                        "Rest parameter may not have a default initializer",
                        self.peek().position,
                    ));
                }
                Some(self.expression()?)
            } else {
                None
            };
            params.push(Parameter {
                name,
                default,
                rest,
            });

            if !self.match_token(&[TokenKind::Comma]) {
                break;
            }
        }

        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    fn enum_declaration(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Enum, "Expected 'enum'")?.position;
        let name = self.consume_identifier("Expected enum name")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after enum name")?;

        let mut members = Vec::new();
        let mut methods = Vec::new();

        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.peek().kind {
                TokenKind::Func => methods.push(self.function(false)?),
                TokenKind::Async if self.check_at(1, TokenKind::Func) => {
                    self.advance();
                    methods.push(self.function(true)?);
                }
                TokenKind::Identifier => {
                    let token = self.advance();
                    let value = if self.match_token(&[TokenKind::Assign]) {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    members.push(EnumMember {
                        name: token.value,
                        value,
                        position: token.position,
                    });
                }
                _ => return Err(self.unexpected()),
            }
            self.match_token(&[TokenKind::Semicolon, TokenKind::Comma]);
        }

        self.consume(TokenKind::RightBrace, "Expected '}' after enum body")?;
        Ok(Statement::Enum(Rc::new(EnumDecl {
            name,
            members,
            methods,
            position,
        })))
    }

    fn import_declaration(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Import, "Expected 'import'")?.position;
        let mut bindings = Vec::new();

        if self.match_token(&[TokenKind::LeftParen]) {
            while !self.check(TokenKind::RightParen) {
                bindings.push(self.import_binding()?);
                if !self.match_token(&[TokenKind::Comma]) {
                    break;
                }
            }
            self.consume(TokenKind::RightParen, "Expected ')' after imports")?;
        } else {
            bindings.push(self.import_binding()?);
        }

        Ok(Statement::Import { bindings, position })
    }

    fn import_binding(&mut self) -> ParseResult<ImportBinding> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::String => {
                self.advance();
                let name = if self.match_token(&[TokenKind::As]) {
                    Some(self.consume_identifier("Expected binding name after 'as'")?)
                } else {
                    None
                };
                Ok(ImportBinding {
                    name,
                    path: token.value,
                    position: token.position,
                })
            }
            TokenKind::Identifier if self.check_at(1, TokenKind::Colon) => {
                self.advance();
                self.advance();
                let path = self.consume(TokenKind::String, "Expected module path")?;
                Ok(ImportBinding {
                    name: Some(token.value),
                    path: path.value,
                    position: token.position,
                })
            }
            _ => Err(SyntaxError::new(
                SyntaxErrorCode::InvalidImport,
                format!("Invalid import near '{}'", token.value),
                token.position,
            )),
        }
    }

    fn export_declaration(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Export, "Expected 'export'")?.position;
        let mut items = Vec::new();

        match self.peek().kind {
            TokenKind::LeftParen => {
                self.advance();
                while !self.check(TokenKind::RightParen) {
                    items.push(self.export_item()?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
                self.consume(TokenKind::RightParen, "Expected ')' after exports")?;
            }
            TokenKind::Identifier | TokenKind::String => items.push(self.export_item()?),
            TokenKind::Var | TokenKind::Func | TokenKind::Async | TokenKind::Enum => {
                let declaration = self.statement()?;
                items.push(ExportItem::Declaration(Box::new(declaration)));
            }
            _ => {
                let token = self.peek();
                return Err(SyntaxError::new(
                    SyntaxErrorCode::InvalidExport,
                    format!("Invalid export near '{}'", token.value),
                    token.position,
                ));
            }
        }

        Ok(Statement::Export { items, position })
    }

    fn export_item(&mut self) -> ParseResult<ExportItem> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier if self.check_at(1, TokenKind::Colon) => {
                self.advance();
                self.advance();
                let value = self.expression()?;
                Ok(ExportItem::Named {
                    name: token.value,
                    value,
                })
            }
            TokenKind::Identifier | TokenKind::String => {
                self.advance();
                Ok(ExportItem::Name(token.value))
            }
            _ => Err(SyntaxError::new(
                SyntaxErrorCode::InvalidExport,
                format!("Invalid export near '{}'", token.value),
                token.position,
            )),
        }
    }

    fn try_statement(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Try, "Expected 'try'")?.position;
        let block = self.block()?;

        let mut param = None;
        let mut handler = None;
        if self.match_token(&[TokenKind::Catch]) {
            if self.match_token(&[TokenKind::LeftParen]) {
                param = Some(self.consume_identifier("Expected catch parameter")?);
                self.consume(TokenKind::RightParen, "Expected ')' after catch parameter")?;
            } else if self.check(TokenKind::Identifier) {
                param = Some(self.advance().value);
            }
            handler = Some(self.block()?);
        }

        let finalizer = if self.match_token(&[TokenKind::Finally]) {
            Some(self.block()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(SyntaxError::new(
                SyntaxErrorCode::ExpectedToken,
                "Missing catch or finally after try",
                self.peek().position,
            ));
        }

        Ok(Statement::Try {
            block,
            param,
            handler,
            finalizer,
            position,
        })
    }

    fn match_statement(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Match, "Expected 'match'")?.position;
        let discriminant = self.expression()?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after match discriminant")?;

        let mut cases = Vec::new();
        let mut default = None;

        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.peek().kind {
                TokenKind::Case => {
                    // case (a): case (b): body  -> both conditions share one block
                    let mut conditions = Vec::new();
                    while self.match_token(&[TokenKind::Case]) {
                        conditions.push(self.expression()?);
                        self.consume(TokenKind::Colon, "Expected ':' after case condition")?;
                    }
                    let block = Rc::new(self.case_body()?);
                    for condition in conditions {
                        cases.push(MatchCase {
                            condition,
                            block: Rc::clone(&block),
                        });
                    }
                }
                TokenKind::Default => {
                    self.advance();
                    self.consume(TokenKind::Colon, "Expected ':' after default")?;
                    default = Some(Rc::new(self.case_body()?));
                }
                _ => return Err(self.unexpected()),
            }
            self.expect_semicolon_or_end();
        }

        self.consume(TokenKind::RightBrace, "Expected '}' after match cases")?;
        Ok(Statement::Match {
            discriminant,
            cases,
            default,
            position,
        })
    }

    /// `{ block }`, `return ...` or a bare expression
    fn case_body(&mut self) -> ParseResult<Block> {
        let position = self.peek().position;
        match self.peek().kind {
            TokenKind::LeftBrace => self.block(),
            TokenKind::Return => Ok(Block {
                statements: vec![self.return_statement()?],
                position,
            }),
            _ => {
                let expression = self.expression()?;
                Ok(Block {
                    statements: vec![Statement::Expression {
                        expression,
                        position,
                    }],
                    position,
                })
            }
        }
    }

    fn if_statement(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::If, "Expected 'if'")?.position;
        let test = self.expression()?;
        let consequent = self.block()?;

        let alternate = if self.match_token(&[TokenKind::Else]) {
            if self.check(TokenKind::If) {
                Some(Box::new(self.if_statement()?))
            } else {
                Some(Box::new(Statement::Block(self.block()?)))
            }
        } else {
            None
        };

        Ok(Statement::If {
            test,
            consequent,
            alternate,
            position,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::For, "Expected 'for'")?.position;
        let parenthesized = self.match_token(&[TokenKind::LeftParen]);

        let is_for_in = (self.check(TokenKind::Var)
            && self.check_at(1, TokenKind::Identifier)
            && self.check_at(2, TokenKind::In))
            || (self.check(TokenKind::Identifier) && self.check_at(1, TokenKind::In));

        if is_for_in {
            let declared = self.match_token(&[TokenKind::Var]);
            let variable = self.consume_identifier("Expected loop variable")?;
            self.consume(TokenKind::In, "Expected 'in'")?;
            let iterable = self.expression()?;
            if parenthesized {
                self.consume(TokenKind::RightParen, "Expected ')' after for-in header")?;
            }
            let body = self.block()?;
            return Ok(Statement::ForIn {
                variable,
                declared,
                iterable,
                body,
                position,
            });
        }

        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            let var_position = self.advance().position;
            let mut declarations = self.declarator_list()?;
            let statement = if declarations.len() == 1 {
                match declarations.pop() {
                    Some(declarator) => Statement::Variable(declarator),
                    None => return Err(self.unexpected()),
                }
            } else {
                Statement::CombinedVariable {
                    declarations,
                    position: var_position,
                }
            };
            Some(Box::new(statement))
        } else {
            let expr_position = self.peek().position;
            Some(Box::new(Statement::Expression {
                expression: self.expression()?,
                position: expr_position,
            }))
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for initializer")?;

        let test = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for condition")?;

        let closing = if parenthesized {
            TokenKind::RightParen
        } else {
            TokenKind::LeftBrace
        };
        let update = if self.check(closing) {
            None
        } else {
            Some(self.expression()?)
        };
        if parenthesized {
            self.consume(TokenKind::RightParen, "Expected ')' after for clauses")?;
        }

        let body = self.block()?;
        Ok(Statement::For {
            init,
            test,
            update,
            body,
            position,
        })
    }

    fn return_statement(&mut self) -> ParseResult<Statement> {
        let position = self.consume(TokenKind::Return, "Expected 'return'")?.position;
        let mut values = Vec::new();

        let ends_here = matches!(
            self.peek().kind,
            TokenKind::Semicolon
                | TokenKind::RightBrace
                | TokenKind::EndOf
                | TokenKind::Case
                | TokenKind::Default
        );
        if !ends_here {
            values.push(self.expression()?);
            while self.match_token(&[TokenKind::Comma]) {
                values.push(self.expression()?);
            }
        }

        Ok(Statement::Return { values, position })
    }

    // Expressions

    fn expression(&mut self) -> ParseResult<Expression> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expression> {
        let expr = self.ternary()?;

        let operator = match self.peek().kind {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            _ => return Ok(expr),
        };
        let token = self.advance();

        if !is_assignable(&expr) {
            return Err(SyntaxError::new(
                SyntaxErrorCode::InvalidAssignmentTarget,
                "Invalid left-hand side in assignment",
                token.position,
            ));
        }

        let value = self.assignment()?;
        Ok(Expression::Assignment {
            position: expr.position(),
            target: Box::new(expr),
            operator,
            value: Box::new(value),
        })
    }

    fn ternary(&mut self) -> ParseResult<Expression> {
        let test = self.binary()?;

        if self.match_token(&[TokenKind::Question]) {
            let consequent = self.assignment()?;
            self.consume(TokenKind::Colon, "Expected ':' in ternary expression")?;
            let alternate = self.assignment()?;
            return Ok(Expression::Ternary {
                position: test.position(),
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }

        Ok(test)
    }

    fn binary(&mut self) -> ParseResult<Expression> {
        let mut expr = self.unary()?;

        while let Some(operator) = binary_operator(self.peek().kind) {
            self.advance();
            let right = self.unary()?;
            expr = Expression::Binary {
                position: expr.position(),
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expression> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Not | TokenKind::Minus => {
                self.advance();
                let argument = self.unary()?;
                let operator = if token.kind == TokenKind::Not {
                    UnaryOp::Not
                } else {
                    UnaryOp::Neg
                };
                Ok(Expression::Unary {
                    operator,
                    argument: Box::new(argument),
                    position: token.position,
                })
            }
            TokenKind::Increment | TokenKind::Decrement => {
                self.advance();
                let target = self.unary()?;
                if !is_assignable(&target) {
                    return Err(SyntaxError::new(
                        SyntaxErrorCode::InvalidAssignmentTarget,
                        "Invalid left-hand side expression in prefix operation",
                        token.position,
                    ));
                }
                Ok(Expression::Update {
                    operator: update_operator(token.kind),
                    prefix: true,
                    target: Box::new(target),
                    position: token.position,
                })
            }
            TokenKind::Await => {
                self.advance();
                let argument = self.unary()?;
                Ok(Expression::Await {
                    argument: Box::new(argument),
                    position: token.position,
                })
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> ParseResult<Expression> {
        let expr = self.call()?;

        if matches!(
            self.peek().kind,
            TokenKind::Increment | TokenKind::Decrement
        ) && is_assignable(&expr)
        {
            let token = self.advance();
            return Ok(Expression::Update {
                operator: update_operator(token.kind),
                prefix: false,
                position: expr.position(),
                target: Box::new(expr),
            });
        }

        Ok(expr)
    }

    fn call(&mut self) -> ParseResult<Expression> {
        let mut expr = self.primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    expr = self.finish_member(expr, Property::Named(name))?;
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.expression()?;
                    self.consume(TokenKind::RightBracket, "Expected ']' after index")?;
                    expr = self.finish_member(expr, Property::Computed(Box::new(key)))?;
                }
                TokenKind::LeftParen => {
                    let arguments = self.arguments()?;
                    expr = Expression::FunctionCall {
                        position: expr.position(),
                        callee: Box::new(expr),
                        arguments,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// A member access directly followed by `(` becomes a method call
    fn finish_member(&mut self, object: Expression, property: Property) -> ParseResult<Expression> {
        let position = object.position();
        if self.check(TokenKind::LeftParen) {
            let arguments = self.arguments()?;
            return Ok(Expression::Call {
                object: Box::new(object),
                method: property,
                arguments,
                position,
            });
        }
        Ok(Expression::Member {
            object: Box::new(object),
            property,
            position,
        })
    }

    /// Identifiers and keywords are both valid after `.`
    fn property_name(&mut self) -> ParseResult<String> {
        let token = self.peek();
        if token.kind == TokenKind::Identifier
            || token.kind == TokenKind::Nil
            || token.kind == TokenKind::Boolean
            || token.kind.is_keyword()
        {
            return Ok(self.advance().value);
        }
        Err(self.unexpected())
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expression>> {
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let mut args = Vec::new();

        while !self.check(TokenKind::RightParen) {
            args.push(self.expression()?);
            if !self.match_token(&[TokenKind::Comma]) {
                break;
            }
        }

        self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let token = self.peek().clone();
        let position = token.position;

        match token.kind {
            TokenKind::String => {
                self.advance();
                Ok(Expression::String {
                    value: token.value,
                    position,
                })
            }
            TokenKind::Int => {
                self.advance();
                let value = token.value.parse::<i64>().map_err(|_| {
                    SyntaxError::new(
                        SyntaxErrorCode::InvalidNumberLiteral,
                        format!("Integer literal '{}' is out of range", token.value),
                        position,
                    )
                })?;
                Ok(Expression::Int { value, position })
            }
            TokenKind::Float => {
                self.advance();
                let value = token.value.parse::<f64>().map_err(|_| {
                    SyntaxError::new(
                        SyntaxErrorCode::InvalidNumberLiteral,
                        format!("Invalid float literal '{}'", token.value),
                        position,
                    )
                })?;
                Ok(Expression::Float { value, position })
            }
            TokenKind::Boolean => {
                self.advance();
                Ok(Expression::Bool {
                    value: token.value == "true",
                    position,
                })
            }
            TokenKind::Nil => {
                self.advance();
                Ok(Expression::Nil { position })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expression::Identifier {
                    name: token.value,
                    position,
                })
            }
            // `import.resolve(...)`, `import.main`
            TokenKind::Import => {
                self.advance();
                Ok(Expression::Identifier {
                    name: "import".to_string(),
                    position,
                })
            }
            TokenKind::Func => Ok(Expression::Function(self.function(false)?)),
            TokenKind::Async if self.check_at(1, TokenKind::Func) => {
                self.advance();
                Ok(Expression::Function(self.function(true)?))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "Expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenKind::RightBracket) {
                    elements.push(self.expression()?);
                    if !self.match_token(&[TokenKind::Comma]) {
                        break;
                    }
                }
                self.consume(TokenKind::RightBracket, "Expected ']' after array elements")?;
                Ok(Expression::Array { elements, position })
            }
            TokenKind::LeftBrace => self.object_literal(),
            _ => Err(self.unexpected()),
        }
    }

    fn object_literal(&mut self) -> ParseResult<Expression> {
        let position = self.consume(TokenKind::LeftBrace, "Expected '{'")?.position;
        let mut properties = Vec::new();

        while !self.check(TokenKind::RightBrace) {
            let key_token = self.peek().clone();
            let key = match key_token.kind {
                TokenKind::String | TokenKind::Int | TokenKind::Identifier => {
                    self.advance().value
                }
                _ => self.property_name()?,
            };

            let value = if self.match_token(&[TokenKind::Colon]) {
                self.expression()?
            } else if key_token.kind == TokenKind::Identifier {
                // shorthand `{ name }`
                Expression::Identifier {
                    name: key.clone(),
                    position: key_token.position,
                }
            } else {
                return Err(self.unexpected());
            };
            properties.push(ObjectProperty { key, value });

            if !self.match_token(&[TokenKind::Comma]) {
                break;
            }
        }

        self.consume(TokenKind::RightBrace, "Expected '}' after object literal")?;
        Ok(Expression::Object {
            properties,
            position,
        })
    }
}

fn is_assignable(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Identifier { .. } | Expression::Member { .. }
    )
}

fn binary_operator(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Equal => BinaryOp::Eq,
        TokenKind::NotEqual => BinaryOp::NotEq,
        TokenKind::Less => BinaryOp::Lt,
        TokenKind::LessEqual => BinaryOp::LtEq,
        TokenKind::Greater => BinaryOp::Gt,
        TokenKind::GreaterEqual => BinaryOp::GtEq,
        TokenKind::And => BinaryOp::And,
        TokenKind::Or => BinaryOp::Or,
        _ => return None,
    };
    Some(op)
}

fn update_operator(kind: TokenKind) -> UpdateOp {
    if kind == TokenKind::Decrement {
        UpdateOp::Decrement
    } else {
        UpdateOp::Increment
    }
}
