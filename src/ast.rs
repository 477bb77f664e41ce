//! Abstract Syntax Tree definitions for MyLang
//!
//! Nodes are built once by the parser and never mutated afterwards. Function
//! bodies and grouped `match` blocks are shared through `Rc` so that closures
//! and case fan-out can refer to them without copying.

use crate::lexer::Position;
use serde::Serialize;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A complete MyLang program
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A braced statement list
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub position: Position,
}

/// Mutability tag attached to a binding with `as const` / `as readonly`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VarOptions {
    pub constant: bool,
    pub readonly: bool,
}

impl VarOptions {
    pub fn constant() -> Self {
        VarOptions {
            constant: true,
            readonly: false,
        }
    }

    pub fn readonly() -> Self {
        VarOptions {
            constant: true,
            readonly: true,
        }
    }
}

/// One `name [= init] [as const|readonly]` item of a `var` declaration
#[derive(Debug, Clone, Serialize)]
pub struct VariableDeclarator {
    pub name: String,
    pub init: Option<Expression>,
    pub options: Option<VarOptions>,
    pub position: Position,
}

/// Function parameter
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
    pub rest: bool,
}

static NEXT_FUNCTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Shared shape of function declarations and function expressions
#[derive(Debug, Serialize)]
pub struct FunctionDecl {
    pub id: usize,
    pub name: Option<String>,
    pub params: Vec<Parameter>,
    pub is_async: bool,
    pub body: Rc<Block>,
    pub position: Position,
}

impl FunctionDecl {
    pub fn new(
        name: Option<String>,
        params: Vec<Parameter>,
        is_async: bool,
        body: Block,
        position: Position,
    ) -> Self {
        FunctionDecl {
            id: NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed),
            name,
            params,
            is_async,
            body: Rc::new(body),
            position,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumMember {
    pub name: String,
    pub value: Option<Expression>,
    pub position: Position,
}

#[derive(Debug, Serialize)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
    pub methods: Vec<Rc<FunctionDecl>>,
    pub position: Position,
}

/// `"path"`, `name: "path"` or `"path" as name`
#[derive(Debug, Clone, Serialize)]
pub struct ImportBinding {
    /// Explicit binding name; derived from the path when absent
    pub name: Option<String>,
    pub path: String,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExportItem {
    /// `export name` or `export "name"`
    Name(String),
    /// `export (name: expr)`
    Named { name: String, value: Expression },
    /// `export func f() {}`, `export var x = 1`, ...
    Declaration(Box<Statement>),
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchCase {
    pub condition: Expression,
    pub block: Rc<Block>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectProperty {
    pub key: String,
    pub value: Expression,
}

/// Statements
#[derive(Debug, Clone, Serialize)]
pub enum Statement {
    Expression {
        expression: Expression,
        position: Position,
    },

    /// `var x = 1 as const`
    Variable(VariableDeclarator),

    /// `var a = 1, b, c = a`
    CombinedVariable {
        declarations: Vec<VariableDeclarator>,
        position: Position,
    },

    Function(Rc<FunctionDecl>),

    Enum(Rc<EnumDecl>),

    Import {
        bindings: Vec<ImportBinding>,
        position: Position,
    },

    Export {
        items: Vec<ExportItem>,
        position: Position,
    },

    Throw {
        argument: Expression,
        position: Position,
    },

    /// `defer { ... }`; the block runs where it is written
    Defer {
        body: Block,
        position: Position,
    },

    Block(Block),

    If {
        test: Expression,
        consequent: Block,
        /// Either a block or another `if` for `else if` chains
        alternate: Option<Box<Statement>>,
        position: Position,
    },

    /// C-style `for (init; test; update) { ... }`
    For {
        init: Option<Box<Statement>>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Block,
        position: Position,
    },

    /// `for (var x in items) { ... }` or `for (x in items) { ... }`
    ForIn {
        variable: String,
        declared: bool,
        iterable: Expression,
        body: Block,
        position: Position,
    },

    While {
        test: Expression,
        body: Block,
        position: Position,
    },

    Try {
        block: Block,
        param: Option<String>,
        handler: Option<Block>,
        finalizer: Option<Block>,
        position: Position,
    },

    Match {
        discriminant: Expression,
        cases: Vec<MatchCase>,
        default: Option<Rc<Block>>,
        position: Position,
    },

    Break {
        position: Position,
    },

    Continue {
        position: Position,
    },

    /// `return`, `return x` or `return a, b` (an array of the values)
    Return {
        values: Vec<Expression>,
        position: Position,
    },
}

impl Statement {
    /// Label used in error frames
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Expression { .. } => "ExpressionStatement",
            Statement::Variable(_) => "VariableDeclaration",
            Statement::CombinedVariable { .. } => "CombinedVariableDeclaration",
            Statement::Function(_) => "FunctionDeclaration",
            Statement::Enum(_) => "EnumDeclaration",
            Statement::Import { .. } => "ImportDeclaration",
            Statement::Export { .. } => "ExportsDeclaration",
            Statement::Throw { .. } => "ThrowDeclaration",
            Statement::Defer { .. } => "DeferDeclaration",
            Statement::Block(_) => "BlockStatement",
            Statement::If { .. } => "IfStatement",
            Statement::For { .. } => "ForStatement",
            Statement::ForIn { .. } => "ForInStatement",
            Statement::While { .. } => "WhileStatement",
            Statement::Try { .. } => "TryStatement",
            Statement::Match { .. } => "MatchStatement",
            Statement::Break { .. } => "BreakStatement",
            Statement::Continue { .. } => "ContinueStatement",
            Statement::Return { .. } => "ReturnStatement",
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Statement::Variable(declarator) => declarator.position,
            Statement::Function(decl) => decl.position,
            Statement::Enum(decl) => decl.position,
            Statement::Block(block) => block.position,
            Statement::Expression { position, .. }
            | Statement::CombinedVariable { position, .. }
            | Statement::Import { position, .. }
            | Statement::Export { position, .. }
            | Statement::Throw { position, .. }
            | Statement::Defer { position, .. }
            | Statement::If { position, .. }
            | Statement::For { position, .. }
            | Statement::ForIn { position, .. }
            | Statement::While { position, .. }
            | Statement::Try { position, .. }
            | Statement::Match { position, .. }
            | Statement::Break { position }
            | Statement::Continue { position }
            | Statement::Return { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// `=`, `+=`, `-=`, `*=`, `/=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// Binary operator applied by compound assignment
    pub fn binary(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

/// Member access key: `a.b` or `a[expr]`
#[derive(Debug, Clone, Serialize)]
pub enum Property {
    Named(String),
    Computed(Box<Expression>),
}

/// Expressions
#[derive(Debug, Clone, Serialize)]
pub enum Expression {
    String {
        value: String,
        position: Position,
    },
    Int {
        value: i64,
        position: Position,
    },
    Float {
        value: f64,
        position: Position,
    },
    Bool {
        value: bool,
        position: Position,
    },
    Nil {
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },

    Binary {
        left: Box<Expression>,
        operator: BinaryOp,
        right: Box<Expression>,
        position: Position,
    },

    Unary {
        operator: UnaryOp,
        argument: Box<Expression>,
        position: Position,
    },

    /// Method call `object.method(args)` / `object[key](args)`
    Call {
        object: Box<Expression>,
        method: Property,
        arguments: Vec<Expression>,
        position: Position,
    },

    /// Plain call `callee(args)`
    FunctionCall {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
        position: Position,
    },

    Member {
        object: Box<Expression>,
        property: Property,
        position: Position,
    },

    Assignment {
        target: Box<Expression>,
        operator: AssignOp,
        value: Box<Expression>,
        position: Position,
    },

    /// `++x`, `x--`
    Update {
        operator: UpdateOp,
        prefix: bool,
        target: Box<Expression>,
        position: Position,
    },

    Array {
        elements: Vec<Expression>,
        position: Position,
    },

    Object {
        properties: Vec<ObjectProperty>,
        position: Position,
    },

    Ternary {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
        position: Position,
    },

    Await {
        argument: Box<Expression>,
        position: Position,
    },

    Function(Rc<FunctionDecl>),
}

impl Expression {
    /// Label used in error frames
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::String { .. } => "StringLiteral",
            Expression::Int { .. } => "IntLiteral",
            Expression::Float { .. } => "FloatLiteral",
            Expression::Bool { .. } => "BoolLiteral",
            Expression::Nil { .. } => "NilLiteral",
            Expression::Identifier { .. } => "Identifier",
            Expression::Binary { .. } => "BinaryExpression",
            Expression::Unary { .. } => "UnaryExpression",
            Expression::Call { .. } => "CallExpression",
            Expression::FunctionCall { .. } => "FunctionCallExpression",
            Expression::Member { .. } => "MemberExpression",
            Expression::Assignment { .. } => "AssignmentExpression",
            Expression::Update { .. } => "UpdateExpression",
            Expression::Array { .. } => "ArrayExpression",
            Expression::Object { .. } => "ObjectExpression",
            Expression::Ternary { .. } => "TernaryExpression",
            Expression::Await { .. } => "AwaitExpression",
            Expression::Function(_) => "FunctionExpression",
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Expression::Function(decl) => decl.position,
            Expression::String { position, .. }
            | Expression::Int { position, .. }
            | Expression::Float { position, .. }
            | Expression::Bool { position, .. }
            | Expression::Nil { position }
            | Expression::Identifier { position, .. }
            | Expression::Binary { position, .. }
            | Expression::Unary { position, .. }
            | Expression::Call { position, .. }
            | Expression::FunctionCall { position, .. }
            | Expression::Member { position, .. }
            | Expression::Assignment { position, .. }
            | Expression::Update { position, .. }
            | Expression::Array { position, .. }
            | Expression::Object { position, .. }
            | Expression::Ternary { position, .. }
            | Expression::Await { position, .. } => *position,
        }
    }

    /// Literals cannot fail, so they never contribute error frames
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::String { .. }
                | Expression::Int { .. }
                | Expression::Float { .. }
                | Expression::Bool { .. }
                | Expression::Nil { .. }
        )
    }
}
