//! Interpreter for MyLang
//!
//! A tree-walking interpreter over the AST in [`crate::ast`]. All mutable
//! run state (task queue, call depth, module cache, the stack of files being
//! evaluated) lives on [`Interpreter`] and is threaded through every
//! `eval_*` call; statements report how they finished with [`ControlFlow`].
//!
//! ## Error frames
//!
//! Every statement and every non-literal expression that fails prepends a
//! frame `"<NodeKind> (<file>:<line>:<col>)"` to the error's `files` list on
//! its way out, so an uncaught error carries a trace of the constructs it
//! passed through, outermost first.

use crate::ast::*;
use crate::config::RunOptions;
use crate::environment::{Environment, Scope};
use crate::error::{ErrorKind, RuntimeError};
use crate::lexer::Position;
use crate::modules::{binding_name, FsResolver, ModuleLoader, SourceResolver};
use crate::parser::parse_source;
use crate::runtime::{with_stack, ControlFlow, Runtime, Task};
use crate::stdlib::{self, StdlibModule};
use crate::value::{deep_equal, Closure, Object, ObjectTag, Value, ITERATOR_KEY};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

type EvalResult<T> = Result<T, RuntimeError>;

/// Where `print`/`println` output goes
enum Output {
    Stdout,
    Captured(String),
}

/// Resolved left-hand side of an assignment or update
enum Target {
    Variable(String),
    Member {
        /// Identifier the member chain starts from, if any
        root: Option<String>,
        object: Value,
        key: Value,
    },
}

/// What a `for .. in` loop walks over
enum Iteration {
    /// Live view: items pushed during the loop are visited
    Array {
        items: Rc<RefCell<Vec<Value>>>,
        index: usize,
    },
    Items(std::vec::IntoIter<Value>),
    /// Object with a `next()` method returning `{ done, value }`
    Protocol(Value),
}

/// The MyLang interpreter
pub struct Interpreter {
    runtime: Runtime,
    options: RunOptions,
    pub(crate) modules: ModuleLoader,
    globals: Scope,
    /// Library methods callable on arrays, `xs.push(1)`
    array_methods: StdlibModule,
    output: Output,
}

impl Interpreter {
    pub fn new(options: RunOptions) -> Self {
        Self::with_resolver(options, Box::new(FsResolver))
    }

    /// Interpreter whose imports go through `resolver`
    pub fn with_resolver(mut options: RunOptions, resolver: Box<dyn SourceResolver>) -> Self {
        if options.paths.is_empty() {
            options.paths.push(options.main.display().to_string());
        }
        let mut interpreter = Interpreter {
            runtime: Runtime::new(options.max_call_depth),
            modules: ModuleLoader::new(resolver, options.disable_cache),
            globals: Environment::new_scope(),
            array_methods: stdlib::collections::init_array(),
            output: Output::Stdout,
            options,
        };
        interpreter.globals = interpreter.new_root_scope();
        interpreter
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Root scope of the main program
    pub fn globals(&self) -> Scope {
        Rc::clone(&self.globals)
    }

    pub fn set_globals(&mut self, scope: Scope) {
        self.globals = scope;
    }

    /// Buffer `print` output instead of writing it to stdout
    pub fn capture_output(&mut self) {
        self.output = Output::Captured(String::new());
    }

    /// Take everything captured so far
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Captured(buffer) => std::mem::take(buffer),
            Output::Stdout => String::new(),
        }
    }

    pub fn write_output(&mut self, text: &str) {
        match &mut self.output {
            Output::Stdout => {
                let mut stdout = std::io::stdout();
                // a closed stdout is not a script error
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Output::Captured(buffer) => buffer.push_str(text),
        }
    }

    /// Fresh root frame seeded with the host pseudo-bindings
    pub fn new_root_scope(&self) -> Scope {
        let scope = Environment::new_scope();
        {
            let mut env = scope.borrow_mut();
            env.define("import", self.import_object(), Some(VarOptions::constant()));
            env.define("process", self.process_object(), Some(VarOptions::constant()));
            env.define("#exports", Value::object(IndexMap::new()), None);
            env.define("#options", self.options_object(), None);
        }
        scope
    }

    fn import_object(&self) -> Value {
        let mut properties = IndexMap::new();
        properties.insert(
            "main".to_string(),
            Value::str(self.options.main.display().to_string()),
        );
        properties.insert(
            "base".to_string(),
            Value::str(self.options.base.display().to_string()),
        );
        properties.insert(
            "resolve".to_string(),
            Value::native("resolve", Some(1), |interp, args, _| match &args[0] {
                Value::Str(spec) => Ok(Value::str(interp.resolve_path(spec))),
                other => Err(RuntimeError::type_error(format!(
                    "resolve() requires a string, got {}",
                    other.type_name()
                ))),
            }),
        );
        Value::object(properties)
    }

    fn process_object(&self) -> Value {
        let mut env: IndexMap<String, Value> = std::env::vars()
            .map(|(key, value)| (key, Value::str(value)))
            .collect();
        for (key, value) in &self.options.env {
            env.insert(key.clone(), Value::str(value.clone()));
        }

        let mut properties = IndexMap::new();
        properties.insert("env".to_string(), Value::object(env));
        properties.insert(
            "argv".to_string(),
            Value::array(self.options.args.iter().cloned().map(Value::Str).collect()),
        );
        Value::object(properties)
    }

    fn options_object(&self) -> Value {
        let mut properties = IndexMap::new();
        properties.insert(
            "base".to_string(),
            Value::str(self.options.base.display().to_string()),
        );
        properties.insert(
            "main".to_string(),
            Value::str(self.options.main.display().to_string()),
        );
        properties.insert(
            "disableCache".to_string(),
            Value::Bool(self.options.disable_cache),
        );
        properties.insert(
            "maxCallDepth".to_string(),
            Value::Int(self.options.max_call_depth as i64),
        );
        Value::object(properties)
    }

    /// Lex, parse and run `source` as the main program
    pub fn run_source(&mut self, source: &str) -> crate::error::Result<Value> {
        let program = parse_source(source)?;
        Ok(self.run(&program)?)
    }

    /// Run a program in the global scope, then drain pending tasks
    pub fn run(&mut self, program: &Program) -> EvalResult<Value> {
        log::debug!("run started: {}", self.current_file());
        let globals = self.globals();
        let value = self.eval(program, &globals)?;
        self.drain_tasks()?;
        log::debug!("run finished: {}", self.current_file());
        Ok(value)
    }

    /// Evaluate top-level statements in `scope` without draining tasks
    pub fn eval(&mut self, program: &Program, scope: &Scope) -> EvalResult<Value> {
        match self.eval_statements(&program.statements, scope)? {
            ControlFlow::Normal(value) | ControlFlow::Return(value) => Ok(value),
            ControlFlow::Break | ControlFlow::Continue => Ok(Value::Nil),
        }
    }

    /// Evaluate `program` as the file `file` in a fresh root scope, returning that scope
    pub fn eval_file(&mut self, program: &Program, file: &str) -> EvalResult<Scope> {
        let root = self.new_root_scope();
        self.push_file(file.to_string());
        let result = self.eval(program, &root);
        self.pop_file();
        result?;
        Ok(root)
    }

    /// Run every task that was enqueued but never awaited, in FIFO order
    pub fn drain_tasks(&mut self) -> EvalResult<()> {
        if !self.runtime.tasks.is_empty() {
            log::debug!("draining {} queued task(s)", self.runtime.tasks.len());
        }
        while let Some(task) = self.runtime.tasks.pop() {
            if task.is_pending() {
                task.start(self)?;
            }
        }
        Ok(())
    }

    // ---- files and frames ----

    pub(crate) fn current_file(&self) -> String {
        self.options
            .paths
            .last()
            .cloned()
            .unwrap_or_else(|| self.options.main.display().to_string())
    }

    /// Directory relative imports are resolved against
    pub(crate) fn current_dir(&self) -> PathBuf {
        let file = self.current_file();
        if is_url(&file) {
            return self.options.base.clone();
        }
        Path::new(&file)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.options.base.clone())
    }

    pub(crate) fn push_file(&mut self, file: String) {
        self.options.paths.push(file);
    }

    pub(crate) fn pop_file(&mut self) {
        self.options.paths.pop();
    }

    fn frame(&self, kind: &str, position: Position) -> String {
        let file = self.current_file();
        let label = if is_url(&file) {
            file
        } else {
            self.options.display_path(Path::new(&file))
        };
        format!("{} ({}:{})", kind, label, position)
    }

    // ---- statements ----

    fn eval_statements(&mut self, statements: &[Statement], scope: &Scope) -> EvalResult<ControlFlow> {
        self.hoist_functions(statements, scope)?;

        let mut last = Value::Nil;
        for stmt in statements {
            match self.eval_statement(stmt, scope)? {
                ControlFlow::Normal(value) => last = value,
                flow => return Ok(flow),
            }
        }
        Ok(ControlFlow::Normal(last))
    }

    /// Function declarations are visible to the whole block
    fn hoist_functions(&mut self, statements: &[Statement], scope: &Scope) -> EvalResult<()> {
        for stmt in statements {
            let decl = match stmt {
                Statement::Function(decl) => decl,
                Statement::Export { items, .. } => {
                    for item in items {
                        if let ExportItem::Declaration(inner) = item {
                            if let Statement::Function(decl) = inner.as_ref() {
                                self.declare_function(decl, scope)?;
                            }
                        }
                    }
                    continue;
                }
                _ => continue,
            };
            self.declare_function(decl, scope)?;
        }
        Ok(())
    }

    fn declare_function(&mut self, decl: &Rc<FunctionDecl>, scope: &Scope) -> EvalResult<()> {
        let Some(name) = &decl.name else {
            return Ok(());
        };
        let closure = self.make_closure(decl, scope);
        let mut env = scope.borrow_mut();
        if env.has(name) {
            env.update(name, closure, None)?;
        } else {
            env.create(name, closure, None)?;
        }
        Ok(())
    }

    fn make_closure(&self, decl: &Rc<FunctionDecl>, scope: &Scope) -> Value {
        Value::Function(Rc::new(Closure {
            declaration: Rc::clone(decl),
            env: Rc::clone(scope),
            file: Rc::from(self.current_file()),
        }))
    }

    /// Execute a statement, adding a frame to any error it raises
    pub fn eval_statement(&mut self, stmt: &Statement, scope: &Scope) -> EvalResult<ControlFlow> {
        self.exec_statement(stmt, scope).map_err(|mut err| {
            err.push_frame(self.frame(stmt.kind(), stmt.position()));
            err
        })
    }

    fn exec_statement(&mut self, stmt: &Statement, scope: &Scope) -> EvalResult<ControlFlow> {
        match stmt {
            Statement::Expression { expression, .. } => {
                Ok(ControlFlow::Normal(self.eval_expression(expression, scope)?))
            }

            Statement::Variable(declarator) => {
                self.declare_variable(declarator, scope)?;
                Ok(ControlFlow::Normal(Value::Nil))
            }

            Statement::CombinedVariable { declarations, .. } => {
                for declarator in declarations {
                    self.declare_variable(declarator, scope)?;
                }
                Ok(ControlFlow::Normal(Value::Nil))
            }

            // bound when the enclosing block was entered
            Statement::Function(_) => Ok(ControlFlow::Normal(Value::Nil)),

            Statement::Enum(decl) => {
                self.declare_enum(decl, scope)?;
                Ok(ControlFlow::Normal(Value::Nil))
            }

            Statement::Import { bindings, .. } => {
                for binding in bindings {
                    let value = self.import_module(&binding.path)?;
                    let name = binding
                        .name
                        .clone()
                        .unwrap_or_else(|| binding_name(&binding.path));
                    let mut env = scope.borrow_mut();
                    if env.has(&name) {
                        env.update(&name, value, None)?;
                    } else {
                        env.create(&name, value, None)?;
                    }
                }
                Ok(ControlFlow::Normal(Value::Nil))
            }

            Statement::Export { items, .. } => {
                self.export_items(items, scope)?;
                Ok(ControlFlow::Normal(Value::Nil))
            }

            Statement::Throw { argument, .. } => {
                let value = self.eval_expression(argument, scope)?;
                Err(RuntimeError::thrown(value))
            }

            Statement::Defer { body, .. } | Statement::Block(body) => self.eval_block(body, scope),

            Statement::If {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval_expression(test, scope)?.is_truthy() {
                    self.eval_block(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.eval_statement(alternate, scope)
                } else {
                    Ok(ControlFlow::Normal(Value::Nil))
                }
            }

            Statement::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                let loop_scope = Environment::child(scope);
                if let Some(init) = init {
                    self.eval_statement(init, &loop_scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval_expression(test, &loop_scope)?.is_truthy() {
                            break;
                        }
                    }
                    match self.eval_block(body, &loop_scope)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                        ControlFlow::Normal(_) | ControlFlow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval_expression(update, &loop_scope)?;
                    }
                }
                Ok(ControlFlow::Normal(Value::Nil))
            }

            Statement::ForIn {
                variable,
                declared,
                iterable,
                body,
                ..
            } => self.eval_for_in(variable, *declared, iterable, body, scope),

            Statement::While { test, body, .. } => {
                while self.eval_expression(test, scope)?.is_truthy() {
                    match self.eval_block(body, scope)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                        ControlFlow::Normal(_) | ControlFlow::Continue => {}
                    }
                }
                Ok(ControlFlow::Normal(Value::Nil))
            }

            Statement::Try {
                block,
                param,
                handler,
                finalizer,
                ..
            } => self.eval_try(block, param.as_deref(), handler.as_ref(), finalizer.as_ref(), scope),

            Statement::Match {
                discriminant,
                cases,
                default,
                ..
            } => {
                let subject = self.eval_expression(discriminant, scope)?;
                let mut matched = false;
                for case in cases {
                    let candidate = self.eval_expression(&case.condition, scope)?;
                    if !deep_equal(&subject, &candidate) {
                        continue;
                    }
                    matched = true;
                    let flow = self.eval_block(&case.block, scope)?;
                    if !flow.is_normal() {
                        return Ok(flow);
                    }
                }
                match default {
                    Some(block) if !matched => self.eval_block(block, scope),
                    _ => Ok(ControlFlow::Normal(Value::Nil)),
                }
            }

            Statement::Break { .. } => Ok(ControlFlow::Break),

            Statement::Continue { .. } => Ok(ControlFlow::Continue),

            Statement::Return { values, .. } => {
                let mut results = Vec::with_capacity(values.len());
                for value in values {
                    results.push(self.eval_expression(value, scope)?);
                }
                let value = match results.len() {
                    0 => Value::Nil,
                    1 => results.remove(0),
                    _ => Value::array(results),
                };
                Ok(ControlFlow::Return(value))
            }
        }
    }

    /// Run a block in a fresh child scope
    pub fn eval_block(&mut self, block: &Block, scope: &Scope) -> EvalResult<ControlFlow> {
        let child = Environment::child(scope);
        with_stack(|| self.eval_statements(&block.statements, &child))
    }

    fn declare_variable(&mut self, declarator: &VariableDeclarator, scope: &Scope) -> EvalResult<()> {
        let value = match &declarator.init {
            Some(init) => self.eval_expression(init, scope)?,
            None => Value::Nil,
        };
        // `var b = a` inherits readonly from `a`
        let options = declarator.options.or_else(|| {
            declarator
                .init
                .as_ref()
                .and_then(|init| alias_options(init, scope))
        });
        scope
            .borrow_mut()
            .create(&declarator.name, value, options)
            .map_err(|e| RuntimeError::base(e.to_string()))
    }

    fn declare_enum(&mut self, decl: &EnumDecl, scope: &Scope) -> EvalResult<()> {
        let mut explicit = Vec::with_capacity(decl.members.len());
        for member in &decl.members {
            explicit.push(match &member.value {
                Some(expr) => Some(self.eval_expression(expr, scope)?),
                None => None,
            });
        }

        // the first numeric member fixes the start; its successor, if also numeric, the step
        let step = explicit
            .iter()
            .position(|value| value.as_ref().is_some_and(is_number))
            .and_then(|first| match (&explicit[first], explicit.get(first + 1)) {
                (Some(Value::Int(a)), Some(Some(Value::Int(b)))) => {
                    Some(Value::Int(b.wrapping_sub(*a)))
                }
                (Some(a), Some(Some(b))) if is_number(b) => {
                    Some(Value::Float(b.as_number()? - a.as_number()?))
                }
                _ => None,
            })
            .unwrap_or(Value::Int(1));

        let mut properties = IndexMap::new();
        let mut members = Vec::with_capacity(decl.members.len());
        let mut next = Value::Int(0);
        for (member, value) in decl.members.iter().zip(explicit) {
            let value = match value {
                Some(number) if is_number(&number) => {
                    next = advance(&number, &step);
                    number
                }
                Some(other) => other,
                None => {
                    let current = next;
                    next = advance(&current, &step);
                    current
                }
            };
            properties.insert(member.name.clone(), value);
            members.push(member.name.clone());
        }

        let mut synthetic = 0usize;
        let reverse: Vec<(String, Value)> = properties
            .iter()
            .map(|(name, value)| {
                let key = if value.is_primitive() {
                    value.to_string()
                } else {
                    synthetic += 1;
                    (synthetic - 1).to_string()
                };
                (key, Value::str(name.clone()))
            })
            .collect();
        for (key, name) in reverse {
            properties.entry(key).or_insert(name);
        }

        for method in &decl.methods {
            if let Some(name) = &method.name {
                properties.insert(name.clone(), self.make_closure(method, scope));
            }
        }

        let object = Object {
            properties,
            tag: ObjectTag::Enum {
                name: decl.name.clone(),
                members,
            },
        };
        scope
            .borrow_mut()
            .create(
                &decl.name,
                Value::Object(Rc::new(RefCell::new(object))),
                Some(VarOptions::readonly()),
            )
            .map_err(|e| RuntimeError::base(e.to_string()))
    }

    fn export_items(&mut self, items: &[ExportItem], scope: &Scope) -> EvalResult<()> {
        let exports = Environment::root(scope).borrow().get("#exports")?;
        let Value::Object(exports) = exports else {
            return Err(RuntimeError::base("Exports are not available in this scope"));
        };

        for item in items {
            match item {
                ExportItem::Name(name) => {
                    let value = scope.borrow().get(name)?;
                    exports.borrow_mut().properties.insert(name.clone(), value);
                }
                ExportItem::Named { name, value } => {
                    let value = self.eval_expression(value, scope)?;
                    exports.borrow_mut().properties.insert(name.clone(), value);
                }
                ExportItem::Declaration(stmt) => {
                    self.eval_statement(stmt, scope)?;
                    for name in declared_names(stmt) {
                        let value = scope.borrow().get(&name)?;
                        exports.borrow_mut().properties.insert(name, value);
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_for_in(
        &mut self,
        variable: &str,
        declared: bool,
        iterable: &Expression,
        body: &Block,
        scope: &Scope,
    ) -> EvalResult<ControlFlow> {
        let target = self.eval_expression(iterable, scope)?;
        let mut iteration = self.iteration(&target, scope)?;
        let bridge = Environment::child(scope);

        while let Some(item) = self.next_item(&mut iteration, scope)? {
            let frame = if declared {
                let frame = Environment::child(scope);
                frame.borrow_mut().define(variable, item, None);
                frame
            } else {
                bridge.borrow_mut().ensure(variable, item);
                Rc::clone(&bridge)
            };
            match self.eval_block(body, &frame)? {
                ControlFlow::Break => break,
                ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                ControlFlow::Normal(_) | ControlFlow::Continue => {}
            }
        }
        Ok(ControlFlow::Normal(Value::Nil))
    }

    fn iteration(&mut self, target: &Value, scope: &Scope) -> EvalResult<Iteration> {
        if let Some(iterator) = target.get_property(ITERATOR_KEY) {
            if iterator.is_callable() {
                let produced = self.call_value(&iterator, Vec::new(), Some(target.clone()), scope)?;
                return match produced {
                    Value::Array(items) => Ok(Iteration::Array { items, index: 0 }),
                    protocol if protocol.get_property("next").is_some_and(|n| n.is_callable()) => {
                        Ok(Iteration::Protocol(protocol))
                    }
                    other => Err(RuntimeError::type_error(format!(
                        "{} must return an array or an object with next(), got {}",
                        ITERATOR_KEY,
                        other.type_name()
                    ))),
                };
            }
        }

        match target {
            Value::Array(items) => Ok(Iteration::Array {
                items: Rc::clone(items),
                index: 0,
            }),
            Value::Object(obj) => {
                let obj = obj.borrow();
                let items: Vec<Value> = match &obj.tag {
                    ObjectTag::Enum { members, .. } => members
                        .iter()
                        .map(|name| {
                            let value = obj.properties.get(name).cloned().unwrap_or(Value::Nil);
                            Value::array(vec![Value::str(name.clone()), value])
                        })
                        .collect(),
                    ObjectTag::Plain => obj
                        .properties
                        .keys()
                        .map(|key| Value::str(key.clone()))
                        .collect(),
                };
                Ok(Iteration::Items(items.into_iter()))
            }
            Value::Str(s) => Ok(Iteration::Items(
                s.chars()
                    .map(|c| Value::Str(c.to_string()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            )),
            other => Err(RuntimeError::type_error(format!(
                "{} is not iterable",
                other.repr()
            ))),
        }
    }

    fn next_item(&mut self, iteration: &mut Iteration, scope: &Scope) -> EvalResult<Option<Value>> {
        match iteration {
            Iteration::Array { items, index } => {
                let item = items.borrow().get(*index).cloned();
                *index += 1;
                Ok(item)
            }
            Iteration::Items(items) => Ok(items.next()),
            Iteration::Protocol(protocol) => {
                let next = protocol.get_property("next").unwrap_or(Value::Nil);
                let step = self.call_value(&next, Vec::new(), Some(protocol.clone()), scope)?;
                if step.get_property("done").is_some_and(|done| done.is_truthy()) {
                    Ok(None)
                } else {
                    Ok(Some(step.get_property("value").unwrap_or(Value::Nil)))
                }
            }
        }
    }

    fn eval_try(
        &mut self,
        block: &Block,
        param: Option<&str>,
        handler: Option<&Block>,
        finalizer: Option<&Block>,
        scope: &Scope,
    ) -> EvalResult<ControlFlow> {
        let mut result = self.eval_block(block, scope);

        let caught = match (&result, handler) {
            (Err(err), Some(handler)) => Some((error_value(err), handler)),
            _ => None,
        };
        if let Some((error, handler)) = caught {
            let catch_scope = Environment::child(scope);
            if let Some(name) = param {
                catch_scope.borrow_mut().define(name, error, None);
            }
            result = self.eval_block(handler, &catch_scope);
        }

        if let Some(finalizer) = finalizer {
            let flow = self.eval_block(finalizer, scope)?;
            if !flow.is_normal() {
                return Ok(flow);
            }
        }
        result
    }

    // ---- expressions ----

    /// Evaluate an expression, adding a frame to any error it raises
    pub fn eval_expression(&mut self, expr: &Expression, scope: &Scope) -> EvalResult<Value> {
        if expr.is_literal() {
            return self.eval_inner(expr, scope);
        }
        self.eval_inner(expr, scope).map_err(|mut err| {
            err.push_frame(self.frame(expr.kind(), expr.position()));
            err
        })
    }

    fn eval_inner(&mut self, expr: &Expression, scope: &Scope) -> EvalResult<Value> {
        match expr {
            Expression::String { value, .. } => Ok(Value::Str(value.clone())),
            Expression::Int { value, .. } => Ok(Value::Int(*value)),
            Expression::Float { value, .. } => Ok(Value::Float(*value)),
            Expression::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expression::Nil { .. } => Ok(Value::Nil),

            Expression::Identifier { name, .. } => Ok(scope.borrow().get(name)?),

            Expression::Binary {
                left,
                operator,
                right,
                ..
            } => {
                let lhs = self.eval_expression(left, scope)?;
                match operator {
                    BinaryOp::And if !lhs.is_truthy() => Ok(lhs),
                    BinaryOp::Or if lhs.is_truthy() => Ok(lhs),
                    BinaryOp::And | BinaryOp::Or => self.eval_expression(right, scope),
                    _ => {
                        let rhs = self.eval_expression(right, scope)?;
                        eval_binary_op(*operator, &lhs, &rhs)
                    }
                }
            }

            Expression::Unary {
                operator, argument, ..
            } => {
                let value = self.eval_expression(argument, scope)?;
                match (operator, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::base("Integer overflow")),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Neg, other) => Err(RuntimeError::type_error(format!(
                        "Cannot negate {}",
                        other.type_name()
                    ))),
                }
            }

            Expression::Call {
                object,
                method,
                arguments,
                ..
            } => {
                let receiver = self.eval_expression(object, scope)?;
                let key = self.property_key(method, scope)?;
                let callee = get_member(&receiver, &key)?;
                let args = self.eval_arguments(arguments, scope)?;

                if callee.is_callable() {
                    return self.call_value(&callee, args, Some(receiver), scope);
                }
                if let (Value::Array(_), Value::Str(name)) = (&receiver, &key) {
                    if let Some(function) = self.array_methods.get(name).cloned() {
                        let mut full = Vec::with_capacity(args.len() + 1);
                        full.push(receiver);
                        full.extend(args);
                        return self.call_value(&function, full, None, scope);
                    }
                }
                Err(RuntimeError::type_error(format!(
                    "{}.{} is not a function",
                    describe(object),
                    key_string(&key)
                )))
            }

            Expression::FunctionCall {
                callee, arguments, ..
            } => {
                let function = self.eval_expression(callee, scope)?;
                let args = self.eval_arguments(arguments, scope)?;
                if !function.is_callable() {
                    return Err(RuntimeError::type_error(format!(
                        "{} is not a function",
                        describe(callee)
                    )));
                }
                self.call_value(&function, args, None, scope)
            }

            Expression::Member {
                object, property, ..
            } => {
                let target = self.eval_expression(object, scope)?;
                let key = self.property_key(property, scope)?;
                get_member(&target, &key)
            }

            Expression::Assignment {
                target,
                operator,
                value,
                ..
            } => {
                let target_ref = self.resolve_target(target, scope)?;
                let result = match operator.binary() {
                    Some(op) => {
                        let current = self.read_target(&target_ref, scope)?;
                        let rhs = self.eval_expression(value, scope)?;
                        eval_binary_op(op, &current, &rhs)?
                    }
                    None => self.eval_expression(value, scope)?,
                };
                let alias = match (operator, value.as_ref()) {
                    (AssignOp::Assign, Expression::Identifier { name, .. }) => Some(name.as_str()),
                    _ => None,
                };
                self.write_target(&target_ref, result.clone(), alias, scope)?;
                Ok(result)
            }

            Expression::Update {
                operator,
                prefix,
                target,
                ..
            } => {
                let target_ref = self.resolve_target(target, scope)?;
                let old = self.read_target(&target_ref, scope)?;
                let delta = match operator {
                    UpdateOp::Increment => 1,
                    UpdateOp::Decrement => -1,
                };
                let new = match &old {
                    Value::Int(n) => n
                        .checked_add(delta)
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::base("Integer overflow"))?,
                    Value::Float(f) => Value::Float(f + delta as f64),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "Cannot apply update operator to {}",
                            other.type_name()
                        )))
                    }
                };
                self.write_target(&target_ref, new.clone(), None, scope)?;
                Ok(if *prefix { new } else { old })
            }

            Expression::Array { elements, .. } => {
                Ok(Value::array(self.eval_arguments(elements, scope)?))
            }

            Expression::Object { properties, .. } => {
                let mut map = IndexMap::with_capacity(properties.len());
                for property in properties {
                    let value = self.eval_expression(&property.value, scope)?;
                    map.insert(property.key.clone(), value);
                }
                Ok(Value::object(map))
            }

            Expression::Ternary {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval_expression(test, scope)?.is_truthy() {
                    self.eval_expression(consequent, scope)
                } else {
                    self.eval_expression(alternate, scope)
                }
            }

            Expression::Await { argument, .. } => match self.eval_expression(argument, scope)? {
                Value::Task(task) => task.start(self),
                other => Err(RuntimeError::type_error(format!(
                    "await expects a task, got {}",
                    other.type_name()
                ))),
            },

            Expression::Function(decl) => Ok(self.make_closure(decl, scope)),
        }
    }

    fn eval_arguments(&mut self, arguments: &[Expression], scope: &Scope) -> EvalResult<Vec<Value>> {
        arguments
            .iter()
            .map(|arg| self.eval_expression(arg, scope))
            .collect()
    }

    fn property_key(&mut self, property: &Property, scope: &Scope) -> EvalResult<Value> {
        match property {
            Property::Named(name) => Ok(Value::str(name.clone())),
            Property::Computed(expr) => self.eval_expression(expr, scope),
        }
    }

    // ---- assignment ----

    fn resolve_target(&mut self, target: &Expression, scope: &Scope) -> EvalResult<Target> {
        match target {
            Expression::Identifier { name, .. } => {
                if !scope.borrow().is_defined(name) {
                    return Err(RuntimeError::reference(format!("{} is not defined", name)));
                }
                Ok(Target::Variable(name.clone()))
            }
            Expression::Member {
                object, property, ..
            } => {
                let object_value = self.eval_expression(object, scope)?;
                let key = self.property_key(property, scope)?;
                Ok(Target::Member {
                    root: root_identifier(object).map(str::to_string),
                    object: object_value,
                    key,
                })
            }
            other => Err(RuntimeError::assignment(format!(
                "Invalid assignment target: {}",
                other.kind()
            ))),
        }
    }

    fn read_target(&self, target: &Target, scope: &Scope) -> EvalResult<Value> {
        match target {
            Target::Variable(name) => Ok(scope.borrow().get(name)?),
            Target::Member { object, key, .. } => get_member(object, key),
        }
    }

    fn write_target(
        &self,
        target: &Target,
        value: Value,
        alias: Option<&str>,
        scope: &Scope,
    ) -> EvalResult<()> {
        match target {
            Target::Variable(name) => {
                if scope.borrow().options(name).is_some_and(|o| o.constant) {
                    return Err(RuntimeError::assignment(format!(
                        "Assignment to constant variable '{}'",
                        name
                    )));
                }
                // readonly follows aliasing and is dropped by any other assignment
                let options = alias.and_then(|source| {
                    scope
                        .borrow()
                        .is_readonly(source)
                        .then_some(VarOptions {
                            constant: false,
                            readonly: true,
                        })
                });
                let mut env = scope.borrow_mut();
                env.update(name, value, None)?;
                env.set_options(name, options)?;
                Ok(())
            }
            Target::Member { root, object, key } => {
                if let Value::Object(obj) = object {
                    if obj.borrow().is_enum() {
                        return Err(RuntimeError::assignment(format!(
                            "Cannot assign to '{}' of an enum",
                            key_string(key)
                        )));
                    }
                }
                if let Some(root) = root {
                    if scope.borrow().is_readonly(root) && !extends_array(object, key) {
                        return Err(RuntimeError::assignment(format!(
                            "Cannot assign to '{}' of readonly '{}'",
                            key_string(key),
                            root
                        )));
                    }
                }
                set_member(object, key, value)
            }
        }
    }

    // ---- calls ----

    /// Call any callable value; used by natives for callbacks
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        this: Option<Value>,
        scope: &Scope,
    ) -> EvalResult<Value> {
        match callee {
            Value::Function(closure) => self.call_function(closure, args, this),
            Value::Native(native) => {
                if let Some(arity) = native.arity {
                    if args.len() < arity {
                        return Err(RuntimeError::arguments(format!(
                            "{}() expects at least {} argument(s), got {}",
                            native.name,
                            arity,
                            args.len()
                        )));
                    }
                }
                (native.func)(self, args, scope)
            }
            other => Err(RuntimeError::type_error(format!(
                "{} is not a function",
                other.repr()
            ))),
        }
    }

    /// Call a closure; async closures are queued and return their task
    pub fn call_function(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> EvalResult<Value> {
        if closure.declaration.is_async {
            let task = Task::new(Rc::clone(closure), args, this);
            self.runtime.tasks.push(Rc::clone(&task));
            return Ok(Value::Task(task));
        }
        self.invoke_closure(closure, args, this)
    }

    /// Run a closure's body to completion
    pub fn invoke_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> EvalResult<Value> {
        self.runtime.enter_call()?;
        self.push_file(closure.file.to_string());
        let result = with_stack(|| self.invoke_body(closure, args, this));
        self.pop_file();
        self.runtime.exit_call();
        result
    }

    fn invoke_body(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        this: Option<Value>,
    ) -> EvalResult<Value> {
        let decl = &closure.declaration;
        let call_scope = Environment::child(&closure.env);

        let this = match this {
            Some(this) => this,
            None => Environment::root(&closure.env)
                .borrow()
                .get("process")
                .unwrap_or(Value::Nil),
        };
        {
            let mut env = call_scope.borrow_mut();
            env.define("this", this, None);
            env.define("arguments", Value::array(args.clone()), None);
        }

        for (index, param) in decl.params.iter().enumerate() {
            let value = if param.rest {
                Value::array(args.get(index..).map(<[Value]>::to_vec).unwrap_or_default())
            } else {
                let arg = args.get(index).cloned();
                match (&param.default, arg) {
                    (Some(_), Some(arg)) if arg.is_truthy() => arg,
                    // falsy arguments fall back to the default too
                    (Some(default), _) => self.eval_expression(default, &call_scope)?,
                    (None, arg) => arg.unwrap_or(Value::Nil),
                }
            };
            call_scope.borrow_mut().define(&param.name, value, None);
        }

        match self.eval_block(&decl.body, &call_scope)? {
            ControlFlow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}

fn is_url(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

fn alias_options(init: &Expression, scope: &Scope) -> Option<VarOptions> {
    match init {
        Expression::Identifier { name, .. } if scope.borrow().is_readonly(name) => Some(VarOptions {
            constant: false,
            readonly: true,
        }),
        _ => None,
    }
}

/// Names a declaration statement binds
fn declared_names(stmt: &Statement) -> Vec<String> {
    match stmt {
        Statement::Variable(declarator) => vec![declarator.name.clone()],
        Statement::CombinedVariable { declarations, .. } => {
            declarations.iter().map(|d| d.name.clone()).collect()
        }
        Statement::Function(decl) => decl.name.iter().cloned().collect(),
        Statement::Enum(decl) => vec![decl.name.clone()],
        _ => Vec::new(),
    }
}

/// Catch-clause view of an error: the thrown value itself, or an error object
fn error_value(err: &RuntimeError) -> Value {
    if err.kind == ErrorKind::ThrownError {
        if let Some(cause) = &err.cause {
            return cause.clone();
        }
    }
    let mut properties = IndexMap::new();
    properties.insert("name".to_string(), Value::str(err.name()));
    properties.insert("message".to_string(), Value::str(err.message.clone()));
    properties.insert(
        "code".to_string(),
        err.code.clone().map(Value::Str).unwrap_or(Value::Nil),
    );
    properties.insert("cause".to_string(), err.cause.clone().unwrap_or(Value::Nil));
    properties.insert(
        "files".to_string(),
        Value::array(err.files.iter().cloned().map(Value::Str).collect()),
    );
    Value::object(properties)
}

fn key_string(key: &Value) -> String {
    match key {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Source-ish name of an expression for error messages
fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Identifier { name, .. } => name.clone(),
        Expression::Member {
            object,
            property: Property::Named(name),
            ..
        } => format!("{}.{}", describe(object), name),
        Expression::Member { object, .. } => format!("{}[..]", describe(object)),
        other => other.kind().to_string(),
    }
}

fn root_identifier(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::Identifier { name, .. } => Some(name),
        Expression::Member { object, .. } => root_identifier(object),
        _ => None,
    }
}

/// Writing at or past the end grows an array without touching existing slots
fn extends_array(object: &Value, key: &Value) -> bool {
    match (object, key) {
        (Value::Array(items), Value::Int(index)) => *index >= items.borrow().len() as i64,
        _ => false,
    }
}

fn get_member(object: &Value, key: &Value) -> EvalResult<Value> {
    match (object, key) {
        (Value::Object(obj), key) => Ok(obj
            .borrow()
            .properties
            .get(&key_string(key))
            .cloned()
            .unwrap_or(Value::Nil)),
        (Value::Array(items), Value::Int(index)) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|i| items.borrow().get(i).cloned())
            .unwrap_or(Value::Nil)),
        (Value::Array(items), Value::Str(name)) if name == "length" => {
            Ok(Value::Int(items.borrow().len() as i64))
        }
        (Value::Str(s), Value::Int(index)) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::Nil)),
        (Value::Str(s), Value::Str(name)) if name == "length" => {
            Ok(Value::Int(s.chars().count() as i64))
        }
        (Value::Nil, key) => Err(RuntimeError::type_error(format!(
            "Cannot read properties of nil (reading '{}')",
            key_string(key)
        ))),
        _ => Ok(Value::Nil),
    }
}

/// Most nil slots a single index write may add to an array
const MAX_ARRAY_GAP: usize = 1 << 20;

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

/// Next auto-increment value of an enum
fn advance(current: &Value, step: &Value) -> Value {
    match (current, step) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
        _ => Value::Float(current.as_number().unwrap_or(0.0) + step.as_number().unwrap_or(0.0)),
    }
}

fn set_member(object: &Value, key: &Value, value: Value) -> EvalResult<()> {
    match (object, key) {
        (Value::Object(obj), key) => {
            obj.borrow_mut().properties.insert(key_string(key), value);
            Ok(())
        }
        (Value::Array(items), Value::Int(index)) => {
            let index = usize::try_from(*index).map_err(|_| {
                RuntimeError::type_error(format!("Invalid array index {}", index))
            })?;
            let mut items = items.borrow_mut();
            if index >= items.len() {
                if index - items.len() > MAX_ARRAY_GAP {
                    return Err(RuntimeError::base(format!(
                        "Array index {} is too far past the end (length {})",
                        index,
                        items.len()
                    )));
                }
                items.resize(index + 1, Value::Nil);
            }
            items[index] = value;
            Ok(())
        }
        (Value::Array(_), other) => Err(RuntimeError::type_error(format!(
            "Array index must be an int, got {}",
            other.type_name()
        ))),
        (other, key) => Err(RuntimeError::type_error(format!(
            "Cannot set property '{}' on {}",
            key_string(key),
            other.type_name()
        ))),
    }
}

/// Apply a non-short-circuit binary operator
pub fn eval_binary_op(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    let overflow = || RuntimeError::base("Integer overflow");
    match (op, lhs, rhs) {
        (BinaryOp::Eq, a, b) => Ok(Value::Bool(deep_equal(a, b))),
        (BinaryOp::NotEq, a, b) => Ok(Value::Bool(!deep_equal(a, b))),

        // Integer arithmetic
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOp::Div | BinaryOp::Mod, Value::Int(_), Value::Int(0)) => {
            Err(RuntimeError::base("Division by zero"))
        }
        (BinaryOp::Div, Value::Int(a), Value::Int(b)) if a.checked_rem(*b) == Some(0) => {
            a.checked_div(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Div, Value::Int(a), Value::Int(b)) => Ok(Value::Float(*a as f64 / *b as f64)),
        (BinaryOp::Mod, Value::Int(a), Value::Int(b)) => a.checked_rem(*b).map(Value::Int).ok_or_else(overflow),

        // String concatenation
        (BinaryOp::Add, Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, a, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),

        // Array concatenation
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::array(items))
        }

        (BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq, Value::Int(a), Value::Int(b)) => {
            Ok(Value::Bool(compare(op, a.cmp(b))))
        }
        (BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq, Value::Str(a), Value::Str(b)) => {
            Ok(Value::Bool(compare(op, a.cmp(b))))
        }

        // Mixed numeric and float
        (op, a, b) => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => match op {
                BinaryOp::Add => Ok(Value::Float(x + y)),
                BinaryOp::Sub => Ok(Value::Float(x - y)),
                BinaryOp::Mul => Ok(Value::Float(x * y)),
                BinaryOp::Div if y == 0.0 => Err(RuntimeError::base("Division by zero")),
                BinaryOp::Div => Ok(Value::Float(x / y)),
                BinaryOp::Mod => Ok(Value::Float(x % y)),
                BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                    match x.partial_cmp(&y) {
                        Some(ordering) => Ok(Value::Bool(compare(op, ordering))),
                        None => Ok(Value::Bool(false)),
                    }
                }
                _ => Err(unsupported(op, a, b)),
            },
            _ => Err(unsupported(op, a, b)),
        },
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Lt => ordering == Less,
        BinaryOp::LtEq => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::GtEq => ordering != Less,
        _ => false,
    }
}

fn unsupported(op: BinaryOp, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "Unsupported operand types for {}: {} and {}",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}
