//! Tree-walking evaluator over the OXC AST.
//!
//! All declarations of a call share one frame, and names resolve through the
//! active frames innermost first, so a function sees its caller's bindings
//! rather than a captured scope. Work is bounded by a step budget and a call
//! depth limit.

use oxc_ast::ast::{
    self, Argument, ArrayExpressionElement, ArrowFunctionExpression, AssignmentTarget,
    CallExpression, ChainElement, ComputedMemberExpression, Expression, ForStatementInit,
    ForStatementLeft, ObjectPropertyKind, PropertyKind, SimpleAssignmentTarget, Statement,
    StaticMemberExpression, SwitchStatement, TryStatement, VariableDeclaration,
};
use oxc_span::{GetSpan, Span};
use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use vernis_carton::FxHashMap;

use super::value::{property_key, set_property, Value, MAX_ARRAY_LENGTH, MAX_STRING_LENGTH};
use super::SandboxError;

const EXPORTS: &str = "exports";

/// Budget for loop iterations and calls. Every 64 bytes of string and every
/// 8 array elements built also cost a step.
const MAX_STEPS: u64 = 1_000_000;

const MAX_CALL_DEPTH: usize = 32;

/// Body of a function value.
#[derive(Clone, Copy)]
pub(super) enum Callable<'p, 'a> {
    Function(&'p ast::Function<'a>),
    Arrow(&'p ArrowFunctionExpression<'a>),
}

/// How a statement completed.
pub(super) enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Storage named by an assignment target.
enum Place {
    Binding(String),
    Property(Value, String),
}

pub(crate) struct Interpreter<'p, 'a> {
    source: &'p str,
    frames: Vec<FxHashMap<String, Value>>,
    functions: FxHashMap<u32, Callable<'p, 'a>>,
    steps: u64,
}

impl<'p, 'a> Interpreter<'p, 'a> {
    pub(crate) fn new(source: &'p str) -> Self {
        let mut global = FxHashMap::default();
        global.insert(
            EXPORTS.to_string(),
            Value::object(vec![
                ("required".to_string(), Value::array(Vec::new())),
                ("include".to_string(), Value::array(Vec::new())),
                ("init".to_string(), Value::Null),
                ("ready".to_string(), Value::Null),
            ]),
        );
        Self {
            source,
            frames: vec![global],
            functions: FxHashMap::default(),
            steps: 0,
        }
    }

    pub(crate) fn into_exports(self) -> Value {
        self.frames
            .into_iter()
            .next()
            .and_then(|mut global| global.remove(EXPORTS))
            .unwrap_or(Value::Undefined)
    }

    pub(crate) fn run(&mut self, body: &'p [Statement<'a>]) -> Result<(), SandboxError> {
        self.exec_block(body)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    pub(super) fn exec_block(&mut self, body: &'p [Statement<'a>]) -> Result<Flow, SandboxError> {
        self.hoist(body);
        for stmt in body {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn hoist(&mut self, body: &'p [Statement<'a>]) {
        for stmt in body {
            if let Statement::FunctionDeclaration(func) = stmt {
                if let Some(id) = &func.id {
                    let value = self.function_value(Callable::Function(func), func.span, None);
                    self.define(id.name.as_str(), value);
                }
            }
        }
    }

    fn exec(&mut self, stmt: &'p Statement<'a>) -> Result<Flow, SandboxError> {
        match stmt {
            Statement::EmptyStatement(_)
            | Statement::FunctionDeclaration(_)
            | Statement::DebuggerStatement(_) => Ok(Flow::Normal),
            Statement::ExpressionStatement(expr_stmt) => {
                self.eval(&expr_stmt.expression)?;
                Ok(Flow::Normal)
            }
            Statement::VariableDeclaration(decl) => {
                self.declare(decl)?;
                Ok(Flow::Normal)
            }
            Statement::BlockStatement(block) => self.exec_block(&block.body),
            Statement::IfStatement(if_stmt) => {
                if self.eval(&if_stmt.test)?.is_truthy() {
                    self.exec(&if_stmt.consequent)
                } else if let Some(alternate) = &if_stmt.alternate {
                    self.exec(alternate)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::ForStatement(for_stmt) => {
                if let Some(init) = &for_stmt.init {
                    match init {
                        ForStatementInit::VariableDeclaration(decl) => self.declare(decl)?,
                        init => match init.as_expression() {
                            Some(expr) => {
                                self.eval(expr)?;
                            }
                            None => return Err(self.unsupported("for initializer", init.span())),
                        },
                    }
                }
                loop {
                    self.tick()?;
                    if let Some(test) = &for_stmt.test {
                        if !self.eval(test)?.is_truthy() {
                            break;
                        }
                    }
                    if let Some(flow) = self.loop_body(&for_stmt.body)? {
                        return Ok(flow);
                    }
                    if let Some(update) = &for_stmt.update {
                        self.eval(update)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::ForOfStatement(for_of) => {
                if for_of.r#await {
                    return Err(self.unsupported("for await", for_of.span));
                }
                let right = self.eval(&for_of.right)?;
                let items = self.iterate(right)?;
                self.exec_for_each(&for_of.left, items, &for_of.body)
            }
            Statement::ForInStatement(for_in) => {
                let keys = self
                    .eval(&for_in.right)?
                    .keys()
                    .into_iter()
                    .map(Value::string)
                    .collect();
                self.exec_for_each(&for_in.left, keys, &for_in.body)
            }
            Statement::WhileStatement(while_stmt) => {
                loop {
                    self.tick()?;
                    if !self.eval(&while_stmt.test)?.is_truthy() {
                        break;
                    }
                    if let Some(flow) = self.loop_body(&while_stmt.body)? {
                        return Ok(flow);
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::DoWhileStatement(do_while) => {
                loop {
                    self.tick()?;
                    if let Some(flow) = self.loop_body(&do_while.body)? {
                        return Ok(flow);
                    }
                    if !self.eval(&do_while.test)?.is_truthy() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::BreakStatement(brk) => match brk.label {
                Some(_) => Err(self.unsupported("labeled break", brk.span)),
                None => Ok(Flow::Break),
            },
            Statement::ContinueStatement(cont) => match cont.label {
                Some(_) => Err(self.unsupported("labeled continue", cont.span)),
                None => Ok(Flow::Continue),
            },
            Statement::ReturnStatement(ret) => {
                let value = match &ret.argument {
                    Some(argument) => self.eval(argument)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Statement::SwitchStatement(switch) => self.exec_switch(switch),
            Statement::TryStatement(try_stmt) => self.exec_try(try_stmt),
            Statement::ThrowStatement(throw) => {
                Err(SandboxError::Thrown(self.thrown(&throw.argument)?))
            }
            other => Err(self.unsupported("statement", other.span())),
        }
    }

    fn declare(&mut self, decl: &'p VariableDeclaration<'a>) -> Result<(), SandboxError> {
        for declarator in decl.declarations.iter() {
            let Some(id) = declarator.id.get_binding_identifier() else {
                return Err(self.unsupported("destructuring pattern", declarator.span));
            };
            let value = match &declarator.init {
                Some(init) => self.eval(init)?,
                // `var x;` keeps an existing binding.
                None if self.top_frame_has(id.name.as_str()) => continue,
                None => Value::Undefined,
            };
            self.define(id.name.as_str(), value);
        }
        Ok(())
    }

    /// Run one loop iteration; `Some` ends the loop with that completion.
    fn loop_body(&mut self, body: &'p Statement<'a>) -> Result<Option<Flow>, SandboxError> {
        match self.exec(body)? {
            Flow::Break => Ok(Some(Flow::Normal)),
            Flow::Return(value) => Ok(Some(Flow::Return(value))),
            Flow::Normal | Flow::Continue => Ok(None),
        }
    }

    fn exec_for_each(
        &mut self,
        left: &'p ForStatementLeft<'a>,
        items: Vec<Value>,
        body: &'p Statement<'a>,
    ) -> Result<Flow, SandboxError> {
        for item in items {
            self.tick()?;
            match left {
                ForStatementLeft::VariableDeclaration(decl) => {
                    let Some(id) = decl
                        .declarations
                        .first()
                        .and_then(|d| d.id.get_binding_identifier())
                    else {
                        return Err(self.unsupported("destructuring pattern", decl.span));
                    };
                    self.define(id.name.as_str(), item);
                }
                left => match left.as_assignment_target() {
                    Some(target) => self.assign(target, item)?,
                    None => return Err(self.unsupported("loop target", left.span())),
                },
            }
            if let Some(flow) = self.loop_body(body)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_switch(&mut self, switch: &'p SwitchStatement<'a>) -> Result<Flow, SandboxError> {
        let discriminant = self.eval(&switch.discriminant)?;

        let mut start = None;
        for (index, case) in switch.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test)?.strict_equals(&discriminant) {
                    start = Some(index);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| switch.cases.iter().position(|c| c.test.is_none()))
        else {
            return Ok(Flow::Normal);
        };

        for case in switch.cases.iter().skip(start) {
            for stmt in case.consequent.iter() {
                match self.exec(stmt)? {
                    Flow::Normal => {}
                    Flow::Break => return Ok(Flow::Normal),
                    flow => return Ok(flow),
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(&mut self, try_stmt: &'p TryStatement<'a>) -> Result<Flow, SandboxError> {
        let result = match self.exec_block(&try_stmt.block.body) {
            Err(err) => match (err.caught_value(), &try_stmt.handler) {
                (Some(caught), Some(handler)) => {
                    if let Some(param) = &handler.param {
                        let Some(id) = param.pattern.get_binding_identifier() else {
                            return Err(self.unsupported("destructuring pattern", param.span));
                        };
                        self.define(id.name.as_str(), Value::string(caught));
                    }
                    self.exec_block(&handler.body.body)
                }
                _ => return Err(err),
            },
            ok => ok,
        };

        if let Some(finalizer) = &try_stmt.finalizer {
            match self.exec_block(&finalizer.body)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        result
    }

    /// Render a thrown value the way an uncaught exception is reported.
    fn thrown(&mut self, argument: &'p Expression<'a>) -> Result<String, SandboxError> {
        if let Expression::NewExpression(new_expr) = argument {
            if let Expression::Identifier(callee) = &new_expr.callee {
                if callee.name.as_str().ends_with("Error") {
                    let message = match new_expr.arguments.first().and_then(|a| a.as_expression()) {
                        Some(expr) => self.eval(expr)?.to_js_string(),
                        None => String::new(),
                    };
                    return Ok(if message.is_empty() {
                        callee.name.to_string()
                    } else {
                        format!("{}: {}", callee.name, message)
                    });
                }
            }
        }
        Ok(self.eval(argument)?.to_js_string())
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    pub(super) fn eval(&mut self, expr: &'p Expression<'a>) -> Result<Value, SandboxError> {
        match expr {
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NumericLiteral(lit) => Ok(Value::Number(lit.value)),
            Expression::StringLiteral(lit) => Ok(Value::string(lit.value.as_str())),
            Expression::TemplateLiteral(tpl) => {
                let mut text = String::new();
                for (index, quasi) in tpl.quasis.iter().enumerate() {
                    text.push_str(quasi.value.cooked.as_ref().unwrap_or(&quasi.value.raw));
                    if let Some(expr) = tpl.expressions.get(index) {
                        text.push_str(&self.eval(expr)?.to_js_string());
                    }
                    check_length(&text)?;
                }
                self.check_string(&text)?;
                Ok(Value::string(text))
            }
            Expression::Identifier(id) => self.lookup(id.name.as_str()),
            Expression::ThisExpression(_) => Ok(Value::Undefined),
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression),
            Expression::SequenceExpression(seq) => {
                let mut last = Value::Undefined;
                for expr in seq.expressions.iter() {
                    last = self.eval(expr)?;
                }
                Ok(last)
            }
            Expression::FunctionExpression(func) => {
                Ok(self.function_value(Callable::Function(func), func.span, None))
            }
            Expression::ArrowFunctionExpression(arrow) => {
                Ok(self.function_value(Callable::Arrow(arrow), arrow.span, None))
            }
            Expression::ArrayExpression(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in array.elements.iter() {
                    match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            let value = self.eval(&spread.argument)?;
                            let inner = self.iterate(value)?;
                            self.grow(&mut items, inner)?;
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Undefined),
                        element => match element.as_expression() {
                            Some(expr) => items.push(self.eval(expr)?),
                            None => return Err(self.unsupported("array element", element.span())),
                        },
                    }
                }
                Ok(Value::array(items))
            }
            Expression::ObjectExpression(object) => {
                let mut props: Vec<(String, Value)> = Vec::with_capacity(object.properties.len());
                for property in object.properties.iter() {
                    match property {
                        ObjectPropertyKind::ObjectProperty(prop) => {
                            if prop.kind != PropertyKind::Init {
                                return Err(self.unsupported("accessor property", prop.span));
                            }
                            let key = match prop.key.static_name() {
                                Some(name) if !prop.computed => name.into_owned(),
                                _ => match prop.key.as_expression() {
                                    Some(expr) => property_key(&self.eval(expr)?),
                                    None => {
                                        return Err(self.unsupported("property key", prop.span))
                                    }
                                },
                            };
                            let value = match &prop.value {
                                Expression::FunctionExpression(func) if prop.method => {
                                    let mut src = String::from("function");
                                    src.push_str(self.text(func.span));
                                    self.function_value(Callable::Function(func), func.span, Some(src))
                                }
                                value => self.eval(value)?,
                            };
                            set_property(&mut props, key, value);
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            let source = self.eval(&spread.argument)?;
                            for key in source.keys() {
                                let value = source.get(&key);
                                set_property(&mut props, key, value);
                            }
                        }
                    }
                }
                Ok(Value::object(props))
            }
            Expression::StaticMemberExpression(member) => {
                Ok(self.static_member(member)?.unwrap_or(Value::Undefined))
            }
            Expression::ComputedMemberExpression(member) => {
                Ok(self.computed_member(member)?.unwrap_or(Value::Undefined))
            }
            Expression::CallExpression(call) => Ok(self.call(call)?.unwrap_or(Value::Undefined)),
            Expression::ChainExpression(chain) => {
                let value = match &chain.expression {
                    ChainElement::CallExpression(call) => self.call(call)?,
                    ChainElement::StaticMemberExpression(member) => self.static_member(member)?,
                    ChainElement::ComputedMemberExpression(member) => {
                        self.computed_member(member)?
                    }
                    other => return Err(self.unsupported("chain element", other.span())),
                };
                Ok(value.unwrap_or(Value::Undefined))
            }
            Expression::AssignmentExpression(assign) => {
                let place = self.target_place(&assign.left)?;
                let value = match assign.operator {
                    AssignmentOperator::Assign => self.eval(&assign.right)?,
                    operator => {
                        let current = self.read_place(&place)?;
                        if let Some(logical) = operator.to_logical_operator() {
                            if short_circuits(logical, &current) {
                                return Ok(current);
                            }
                            self.eval(&assign.right)?
                        } else if let Some(binary) = operator.to_binary_operator() {
                            let right = self.eval(&assign.right)?;
                            self.binary(binary, current, right, assign.span)?
                        } else {
                            return Err(self.unsupported("assignment operator", assign.span));
                        }
                    }
                };
                self.write_place(place, value.clone())?;
                Ok(value)
            }
            Expression::UpdateExpression(update) => {
                let place = self.simple_place(&update.argument)?;
                let old = self.read_place(&place)?.to_number();
                let new = match update.operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.write_place(place, Value::Number(new))?;
                Ok(Value::Number(if update.prefix { new } else { old }))
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                if short_circuits(logical.operator, &left) {
                    Ok(left)
                } else {
                    self.eval(&logical.right)
                }
            }
            Expression::ConditionalExpression(cond) => {
                if self.eval(&cond.test)?.is_truthy() {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            Expression::BinaryExpression(binary) => {
                let left = self.eval(&binary.left)?;
                let right = self.eval(&binary.right)?;
                self.binary(binary.operator, left, right, binary.span)
            }
            Expression::UnaryExpression(unary) => match unary.operator {
                UnaryOperator::Typeof => {
                    if let Expression::Identifier(id) = &unary.argument {
                        if !self.is_bound(id.name.as_str()) {
                            let name = match id.name.as_str() {
                                "NaN" | "Infinity" => "number",
                                _ => "undefined",
                            };
                            return Ok(Value::string(name));
                        }
                    }
                    Ok(Value::string(self.eval(&unary.argument)?.type_of()))
                }
                UnaryOperator::LogicalNot => {
                    Ok(Value::Bool(!self.eval(&unary.argument)?.is_truthy()))
                }
                UnaryOperator::UnaryNegation => {
                    Ok(Value::Number(-self.eval(&unary.argument)?.to_number()))
                }
                UnaryOperator::UnaryPlus => Ok(Value::Number(self.eval(&unary.argument)?.to_number())),
                UnaryOperator::BitwiseNot => Ok(Value::Number(f64::from(!to_int32(
                    self.eval(&unary.argument)?.to_number(),
                )))),
                UnaryOperator::Void => {
                    self.eval(&unary.argument)?;
                    Ok(Value::Undefined)
                }
                UnaryOperator::Delete => Err(self.unsupported("delete", unary.span)),
            },
            other => Err(self.unsupported("expression", other.span())),
        }
    }

    fn binary(
        &mut self,
        operator: BinaryOperator,
        left: Value,
        right: Value,
        span: Span,
    ) -> Result<Value, SandboxError> {
        let number = |f: fn(f64, f64) -> f64| -> Result<Value, SandboxError> {
            Ok(Value::Number(f(left.to_number(), right.to_number())))
        };
        let int = |f: fn(i32, i32) -> i32| -> Result<Value, SandboxError> {
            Ok(Value::Number(f64::from(f(
                to_int32(left.to_number()),
                to_int32(right.to_number()),
            ))))
        };

        match operator {
            BinaryOperator::Addition => {
                if left.is_numeric_primitive() && right.is_numeric_primitive() {
                    return number(|a, b| a + b);
                }
                let mut text = left.to_js_string();
                text.push_str(&right.to_js_string());
                self.check_string(&text)?;
                Ok(Value::string(text))
            }
            BinaryOperator::Subtraction => number(|a, b| a - b),
            BinaryOperator::Multiplication => number(|a, b| a * b),
            BinaryOperator::Division => number(|a, b| a / b),
            BinaryOperator::Remainder => number(|a, b| a % b),
            BinaryOperator::Exponential => number(f64::powf),
            BinaryOperator::StrictEquality => Ok(Value::Bool(left.strict_equals(&right))),
            BinaryOperator::StrictInequality => Ok(Value::Bool(!left.strict_equals(&right))),
            BinaryOperator::Equality => Ok(Value::Bool(left.loose_equals(&right))),
            BinaryOperator::Inequality => Ok(Value::Bool(!left.loose_equals(&right))),
            BinaryOperator::LessThan => Ok(compare(&left, &right, |o| o.is_lt())),
            BinaryOperator::LessEqualThan => Ok(compare(&left, &right, |o| o.is_le())),
            BinaryOperator::GreaterThan => Ok(compare(&left, &right, |o| o.is_gt())),
            BinaryOperator::GreaterEqualThan => Ok(compare(&left, &right, |o| o.is_ge())),
            BinaryOperator::BitwiseAnd => int(|a, b| a & b),
            BinaryOperator::BitwiseOR => int(|a, b| a | b),
            BinaryOperator::BitwiseXOR => int(|a, b| a ^ b),
            BinaryOperator::ShiftLeft => int(|a, b| a.wrapping_shl(b as u32 & 31)),
            BinaryOperator::ShiftRight => int(|a, b| a.wrapping_shr(b as u32 & 31)),
            BinaryOperator::ShiftRightZeroFill => {
                let a = to_int32(left.to_number()) as u32;
                let b = to_int32(right.to_number()) as u32 & 31;
                Ok(Value::Number(f64::from(a >> b)))
            }
            BinaryOperator::In => match &right {
                Value::Object(_) | Value::Array(_) => {
                    let key = property_key(&left);
                    Ok(Value::Bool(
                        right.keys().contains(&key)
                            || (key == "length" && matches!(right, Value::Array(_))),
                    ))
                }
                other => Err(SandboxError::Type(format!(
                    "cannot use 'in' operator to search for '{}' in {}",
                    property_key(&left),
                    other.type_name()
                ))),
            },
            BinaryOperator::Instanceof => Err(self.unsupported("instanceof", span)),
        }
    }

    // ---------------------------------------------------------------------
    // Member access and calls
    // ---------------------------------------------------------------------

    /// `None` means an optional link short-circuited.
    fn link(&mut self, expr: &'p Expression<'a>) -> Result<Option<Value>, SandboxError> {
        match expr {
            Expression::StaticMemberExpression(member) => self.static_member(member),
            Expression::ComputedMemberExpression(member) => self.computed_member(member),
            Expression::CallExpression(call) => self.call(call),
            other => self.eval(other).map(Some),
        }
    }

    fn static_member(
        &mut self,
        member: &'p StaticMemberExpression<'a>,
    ) -> Result<Option<Value>, SandboxError> {
        let Some(object) = self.link(&member.object)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        read_property(&object, member.property.name.as_str()).map(Some)
    }

    fn computed_member(
        &mut self,
        member: &'p ComputedMemberExpression<'a>,
    ) -> Result<Option<Value>, SandboxError> {
        let Some(object) = self.link(&member.object)? else {
            return Ok(None);
        };
        if member.optional && object.is_nullish() {
            return Ok(None);
        }
        let key = property_key(&self.eval(&member.expression)?);
        read_property(&object, &key).map(Some)
    }

    fn call(&mut self, call: &'p CallExpression<'a>) -> Result<Option<Value>, SandboxError> {
        let (receiver, method) = match &call.callee {
            Expression::StaticMemberExpression(member) => {
                let method = member.property.name.as_str();
                if let Expression::Identifier(namespace) = &member.object {
                    let namespace = namespace.name.as_str();
                    if matches!(namespace, "Object" | "Array") && !self.is_bound(namespace) {
                        let args = self.eval_arguments(&call.arguments)?;
                        return self.call_static(namespace, method, args).map(Some);
                    }
                }
                let Some(object) = self.link(&member.object)? else {
                    return Ok(None);
                };
                if member.optional && object.is_nullish() {
                    return Ok(None);
                }
                (object, method.to_string())
            }
            Expression::ComputedMemberExpression(member) => {
                let Some(object) = self.link(&member.object)? else {
                    return Ok(None);
                };
                if member.optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = property_key(&self.eval(&member.expression)?);
                (object, key)
            }
            Expression::Identifier(id) if !self.is_bound(id.name.as_str()) => {
                let args = self.eval_arguments(&call.arguments)?;
                return match convert(id.name.as_str(), &args) {
                    Some(value) => Ok(Some(value)),
                    None => Err(SandboxError::Reference(id.name.to_string())),
                };
            }
            callee => {
                let Some(function) = self.link(callee)? else {
                    return Ok(None);
                };
                if call.optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_arguments(&call.arguments)?;
                return match function {
                    Value::Function(function) => self.invoke(function.id, args).map(Some),
                    other => Err(SandboxError::Type(format!(
                        "{} is not a function",
                        other.type_name()
                    ))),
                };
            }
        };

        if receiver.is_nullish() {
            return Err(SandboxError::Type(format!(
                "cannot read properties of {} (reading '{}')",
                receiver.type_name(),
                method
            )));
        }
        if let Value::Object(_) = receiver {
            match receiver.get(&method) {
                Value::Function(function) => {
                    let args = self.eval_arguments(&call.arguments)?;
                    return self.invoke(function.id, args).map(Some);
                }
                value if value.is_nullish() && call.optional => return Ok(None),
                _ => {}
            }
        }
        let args = self.eval_arguments(&call.arguments)?;
        self.call_method(receiver, &method, args).map(Some)
    }

    fn eval_arguments(&mut self, arguments: &'p [Argument<'a>]) -> Result<Vec<Value>, SandboxError> {
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            match argument {
                Argument::SpreadElement(spread) => {
                    let value = self.eval(&spread.argument)?;
                    let inner = self.iterate(value)?;
                    self.grow(&mut values, inner)?;
                }
                argument => match argument.as_expression() {
                    Some(expr) => values.push(self.eval(expr)?),
                    None => return Err(self.unsupported("argument", argument.span())),
                },
            }
        }
        Ok(values)
    }

    /// Call a function defined by the block.
    pub(super) fn invoke(&mut self, id: u32, args: Vec<Value>) -> Result<Value, SandboxError> {
        self.tick()?;
        let Some(callable) = self.functions.get(&id).copied() else {
            return Err(SandboxError::Type("value is not callable".to_string()));
        };
        if self.frames.len() > MAX_CALL_DEPTH {
            return Err(SandboxError::Range(
                "Maximum call stack size exceeded".to_string(),
            ));
        }

        self.frames.push(FxHashMap::default());
        let result = self.run_function(callable, args);
        self.frames.pop();
        result
    }

    fn run_function(
        &mut self,
        callable: Callable<'p, 'a>,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        let (params, span) = match callable {
            Callable::Function(func) => {
                if func.generator || func.r#async {
                    return Err(self.unsupported("generator or async call", func.span));
                }
                self.define("arguments", Value::array(args.clone()));
                (&func.params, func.span)
            }
            Callable::Arrow(arrow) => {
                if arrow.r#async {
                    return Err(self.unsupported("generator or async call", arrow.span));
                }
                (&arrow.params, arrow.span)
            }
        };

        let mut args = args.into_iter();
        for param in params.items.iter() {
            let Some(id) = param.pattern.get_binding_identifier() else {
                return Err(self.unsupported("destructuring parameter", param.span));
            };
            let mut value = args.next().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined) {
                if let Some(default) = &param.initializer {
                    value = self.eval(default)?;
                }
            }
            self.define(id.name.as_str(), value);
        }
        if let Some(rest) = &params.rest {
            let Some(id) = rest.rest.argument.get_binding_identifier() else {
                return Err(self.unsupported("destructuring parameter", rest.span));
            };
            self.define(id.name.as_str(), Value::array(args.collect()));
        }

        let statements = match callable {
            Callable::Arrow(arrow) if arrow.expression => {
                return match arrow.get_expression() {
                    Some(expr) => self.eval(expr),
                    None => Ok(Value::Undefined),
                };
            }
            Callable::Arrow(arrow) => &arrow.body.statements,
            Callable::Function(func) => match &func.body {
                Some(body) => &body.statements,
                None => return Err(self.unsupported("function without body", span)),
            },
        };
        match self.exec_block(statements)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn function_value(
        &mut self,
        callable: Callable<'p, 'a>,
        span: Span,
        source: Option<String>,
    ) -> Value {
        self.functions.insert(span.start, callable);
        let source = source.unwrap_or_else(|| self.text(span).to_string());
        Value::function(source, span.start)
    }

    // ---------------------------------------------------------------------
    // Bindings and places
    // ---------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Result<Value, SandboxError> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.get(name) {
                return Ok(value.clone());
            }
        }
        match name {
            "undefined" => Ok(Value::Undefined),
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Err(SandboxError::Reference(name.to_string())),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.frames.iter().any(|frame| frame.contains_key(name))
    }

    fn top_frame_has(&self, name: &str) -> bool {
        self.frames.last().is_some_and(|frame| frame.contains_key(name))
    }

    fn define(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    /// Assign to the innermost binding of `name`, or create a global.
    fn set_binding(&mut self, name: String, value: Value) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(&name) {
                *slot = value;
                return;
            }
        }
        if let Some(global) = self.frames.first_mut() {
            global.insert(name, value);
        }
    }

    fn assign(&mut self, target: &'p AssignmentTarget<'a>, value: Value) -> Result<(), SandboxError> {
        let place = self.target_place(target)?;
        self.write_place(place, value)
    }

    fn target_place(&mut self, target: &'p AssignmentTarget<'a>) -> Result<Place, SandboxError> {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(id) => Ok(Place::Binding(id.name.to_string())),
            AssignmentTarget::StaticMemberExpression(member) => {
                self.member_place(&member.object, |_| Ok(member.property.name.to_string()))
            }
            AssignmentTarget::ComputedMemberExpression(member) => {
                self.member_place(&member.object, |this| {
                    Ok(property_key(&this.eval(&member.expression)?))
                })
            }
            other => Err(self.unsupported("assignment target", other.span())),
        }
    }

    fn simple_place(&mut self, target: &'p SimpleAssignmentTarget<'a>) -> Result<Place, SandboxError> {
        match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => {
                Ok(Place::Binding(id.name.to_string()))
            }
            SimpleAssignmentTarget::StaticMemberExpression(member) => {
                self.member_place(&member.object, |_| Ok(member.property.name.to_string()))
            }
            SimpleAssignmentTarget::ComputedMemberExpression(member) => {
                self.member_place(&member.object, |this| {
                    Ok(property_key(&this.eval(&member.expression)?))
                })
            }
            other => Err(self.unsupported("update target", other.span())),
        }
    }

    fn member_place(
        &mut self,
        object: &'p Expression<'a>,
        key: impl FnOnce(&mut Self) -> Result<String, SandboxError>,
    ) -> Result<Place, SandboxError> {
        let holder = self.eval(object)?;
        let key = key(self)?;
        Ok(Place::Property(holder, key))
    }

    fn read_place(&self, place: &Place) -> Result<Value, SandboxError> {
        match place {
            Place::Binding(name) => self.lookup(name),
            Place::Property(holder, key) => read_property(holder, key),
        }
    }

    fn write_place(&mut self, place: Place, value: Value) -> Result<(), SandboxError> {
        match place {
            Place::Binding(name) => {
                self.set_binding(name, value);
                Ok(())
            }
            Place::Property(holder, key) => {
                let before = array_len(&holder);
                holder.set(&key, value)?;
                let grown = array_len(&holder).saturating_sub(before);
                self.charge((grown / 8) as u64)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Limits and helpers
    // ---------------------------------------------------------------------

    pub(super) fn tick(&mut self) -> Result<(), SandboxError> {
        self.charge(1)
    }

    fn charge(&mut self, steps: u64) -> Result<(), SandboxError> {
        self.steps = self.steps.saturating_add(steps);
        if self.steps > MAX_STEPS {
            return Err(SandboxError::StepLimit(MAX_STEPS));
        }
        Ok(())
    }

    /// Enforce the string length cap and charge for the bytes built.
    pub(super) fn check_string(&mut self, text: &str) -> Result<(), SandboxError> {
        check_length(text)?;
        self.charge((text.len() / 64) as u64)
    }

    /// Append `extra` to `items`, enforcing the array length cap.
    pub(super) fn grow(&mut self, items: &mut Vec<Value>, extra: Vec<Value>) -> Result<(), SandboxError> {
        if items.len() + extra.len() > MAX_ARRAY_LENGTH {
            return Err(SandboxError::Range("Invalid array length".to_string()));
        }
        self.charge((extra.len() / 8) as u64)?;
        items.extend(extra);
        Ok(())
    }

    /// Elements visited by spread and `for...of`.
    pub(super) fn iterate(&self, value: Value) -> Result<Vec<Value>, SandboxError> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            other => Err(SandboxError::Type(format!(
                "{} is not iterable",
                other.type_name()
            ))),
        }
    }

    #[inline]
    fn text(&self, span: Span) -> &'p str {
        &self.source[span.start as usize..span.end as usize]
    }

    fn unsupported(&self, construct: &str, span: Span) -> SandboxError {
        SandboxError::Unsupported {
            construct: construct.to_string(),
            offset: span.start,
        }
    }
}

fn read_property(object: &Value, key: &str) -> Result<Value, SandboxError> {
    if object.is_nullish() {
        return Err(SandboxError::Type(format!(
            "cannot read properties of {} (reading '{}')",
            object.type_name(),
            key
        )));
    }
    Ok(object.get(key))
}

pub(super) fn check_length(text: &str) -> Result<(), SandboxError> {
    if text.len() > MAX_STRING_LENGTH {
        return Err(SandboxError::Range("Invalid string length".to_string()));
    }
    Ok(())
}

fn array_len(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.borrow().len(),
        _ => 0,
    }
}

fn short_circuits(operator: LogicalOperator, left: &Value) -> bool {
    match operator {
        LogicalOperator::Or => left.is_truthy(),
        LogicalOperator::And => !left.is_truthy(),
        LogicalOperator::Coalesce => !left.is_nullish(),
    }
}

fn compare(left: &Value, right: &Value, test: fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Bool(ordering.is_some_and(test))
}

/// `ToInt32`.
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc() % 4_294_967_296.0) as i64 as u32 as i32
}

/// `String(x)`, `Number(x)` and `Boolean(x)` called as functions.
fn convert(name: &str, args: &[Value]) -> Option<Value> {
    let arg = args.first().cloned().unwrap_or(Value::Undefined);
    match name {
        "String" if args.is_empty() => Some(Value::string("")),
        "String" => Some(Value::string(arg.to_js_string())),
        "Number" if args.is_empty() => Some(Value::Number(0.0)),
        "Number" => Some(Value::Number(arg.to_number())),
        "Boolean" => Some(Value::Bool(arg.is_truthy())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::sandbox::{evaluate_exports, SandboxError};

    #[test]
    fn test_variables_and_spread() {
        let meta = evaluate_exports(
            r#"
            const base = "resources/js/";
            var libs = [base + "a.js", base + "b.js"];
            exports.include = [...libs, `resources/js/c.js`];
            "#,
        )
        .unwrap();
        assert_eq!(
            meta.include,
            vec!["resources/js/a.js", "resources/js/b.js", "resources/js/c.js"]
        );
    }

    #[test]
    fn test_push_and_concat_keep_order() {
        let meta = evaluate_exports(
            r#"
            exports.required.push("js/one.js", "js/two.js");
            exports.required = exports.required.concat(["js/three.js"], "js/four.js");
            "#,
        )
        .unwrap();
        assert_eq!(
            meta.required,
            vec!["js/one.js", "js/two.js", "js/three.js", "js/four.js"]
        );
    }

    #[test]
    fn test_hoisted_function_declaration() {
        let meta = evaluate_exports(
            r#"
            exports.init = boot;
            function boot() { console.log("hi"); }
            "#,
        )
        .unwrap();
        assert_eq!(meta.init.as_deref(), Some(r#"function boot() { console.log("hi"); }"#));
    }

    #[test]
    fn test_object_assignment_and_method_shorthand() {
        let meta = evaluate_exports(
            r#"
            exports = { include: ["x.js"], ready() { start(); } };
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["x.js"]);
        let ready = meta.ready.unwrap();
        assert!(ready.starts_with("function"));
        assert!(ready.contains("start();"));
    }

    #[test]
    fn test_computed_member_and_conditionals() {
        let meta = evaluate_exports(
            r#"
            var debug = false;
            exports["include"] = debug ? ["debug.js"] : ["prod.js"];
            if (!debug) { exports.required.push("js/analytics.js"); } else { throw "unreachable"; }
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["prod.js"]);
        assert_eq!(meta.required, vec!["js/analytics.js"]);
    }

    #[test]
    fn test_logical_defaults() {
        let meta = evaluate_exports(
            r#"
            var extra = undefined;
            exports.include = extra ?? ["fallback.js"];
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["fallback.js"]);
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let meta = evaluate_exports(
            r#"
            var n = 2 * 3 - 1;
            n += 10 / 5;
            n **= 2;
            exports.include.push("n" + n, String(7 % 4), String(1 < 2 && 3 >= 3));
            exports.include.push(String(5 == "5"), String(5 === "5"), String(-n | 0), String(1 << 4));
            "#,
        )
        .unwrap();
        assert_eq!(
            meta.include,
            vec!["n49", "3", "true", "true", "false", "-49", "16"]
        );
    }

    #[test]
    fn test_loops() {
        let meta = evaluate_exports(
            r#"
            for (var i = 0; i < 3; i++) {
                if (i === 1) continue;
                exports.include.push("a" + i + ".js");
            }
            for (const name of ["b", "c"]) exports.include.push(name + ".js");
            var k = 0;
            while (true) { if (++k > 2) break; }
            do { k--; } while (k > 0);
            exports.include.push("k" + k);
            for (var key in { x: 1, y: 2 }) exports.required.push(key);
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["a0.js", "a2.js", "b.js", "c.js", "k0"]);
        assert_eq!(meta.required, vec!["x", "y"]);
    }

    #[test]
    fn test_immediately_invoked_function() {
        let meta = evaluate_exports(
            r#"
            (function (root) {
                var lib = "js/lib.js";
                root.required.push(lib);
                exports.ready = function () { start(); };
            })(exports);
            "#,
        )
        .unwrap();
        assert_eq!(meta.required, vec!["js/lib.js"]);
        assert_eq!(meta.ready.as_deref(), Some("function () { start(); }"));
    }

    #[test]
    fn test_declared_functions_return_values() {
        let meta = evaluate_exports(
            r#"
            function asset(name, ext = ".js") { return "js/" + name + ext; }
            const all = (...names) => names.map(n => asset(n));
            exports.required = all("a", "b");
            "#,
        )
        .unwrap();
        assert_eq!(meta.required, vec!["js/a.js", "js/b.js"]);
    }

    #[test]
    fn test_array_callbacks() {
        let meta = evaluate_exports(
            r#"
            exports.include = ['a', 'b', 'c']
                .filter(function (x) { return x !== 'b'; })
                .map((x, i) => x + i + '.js');
            ['x', 'y'].forEach(x => exports.required.push(x.toUpperCase()));
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["a0.js", "c1.js"]);
        assert_eq!(meta.required, vec!["X", "Y"]);
    }

    #[test]
    fn test_arrays_are_shared_by_reference() {
        let meta = evaluate_exports(
            r#"
            var list = exports.include;
            list.push("shared.js");
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["shared.js"]);
    }

    #[test]
    fn test_switch_and_try() {
        let meta = evaluate_exports(
            r#"
            var mode = "prod";
            switch (mode) {
                case "dev": exports.include.push("dev.js"); break;
                case "prod": exports.include.push("prod.js");
                default: exports.include.push("always.js");
            }
            try { missing(); } catch (e) { exports.required.push("caught"); } finally { exports.required.push("finally"); }
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["prod.js", "always.js"]);
        assert_eq!(meta.required, vec!["caught", "finally"]);
    }

    #[test]
    fn test_optional_chaining_and_typeof() {
        let meta = evaluate_exports(
            r#"
            var cfg = { paths: null };
            exports.include.push(String(cfg.paths?.main), typeof window, typeof cfg);
            "#,
        )
        .unwrap();
        assert_eq!(meta.include, vec!["undefined", "undefined", "object"]);
    }

    #[test]
    fn test_template_substitution() {
        let meta = evaluate_exports("var v = 3; exports.include = [`lib-${v}.js`];").unwrap();
        assert_eq!(meta.include, vec!["lib-3.js"]);
    }

    #[test]
    fn test_infinite_loop_hits_step_limit() {
        let err = evaluate_exports("for (;;) {}").unwrap_err();
        assert!(matches!(err, SandboxError::StepLimit(_)), "{err:?}");
    }

    #[test]
    fn test_unbounded_recursion_is_a_range_error() {
        let err = evaluate_exports("function f() { return f(); } f();").unwrap_err();
        assert!(matches!(err, SandboxError::Range(_)), "{err:?}");
    }

    #[test]
    fn test_string_growth_is_capped() {
        let err = evaluate_exports("var s = 'x'; while (true) { s = s + s; }").unwrap_err();
        assert!(matches!(err, SandboxError::Range(_)), "{err:?}");
    }

    #[test]
    fn test_far_index_writes_are_errors() {
        let err = evaluate_exports("exports.include[1e20] = 'x';").unwrap_err();
        assert!(matches!(err, SandboxError::Type(_)), "{err:?}");

        let err = evaluate_exports("exports.required[1e9] = 'x';").unwrap_err();
        assert!(matches!(err, SandboxError::Range(_)), "{err:?}");

        let meta = evaluate_exports("exports.include[0] = 'a.js'; exports.include[1] = 'b.js';")
            .unwrap();
        assert_eq!(meta.include, vec!["a.js", "b.js"]);
    }

    #[test]
    fn test_array_growth_is_metered() {
        let err = evaluate_exports(
            r#"
            var keep = [];
            while (true) { var a = []; a[65535] = 1; keep.push(a); }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::StepLimit(_)), "{err:?}");
    }

    #[test]
    fn test_unsupported_constructs() {
        let err = evaluate_exports("class A {}").unwrap_err();
        assert_eq!(
            err,
            SandboxError::Unsupported {
                construct: "statement".to_string(),
                offset: 0
            }
        );
    }

    #[test]
    fn test_push_on_undefined_property() {
        let err = evaluate_exports("exports.nothing.push('a');").unwrap_err();
        assert!(matches!(err, SandboxError::Type(_)));
    }

    #[test]
    fn test_read_through_null() {
        let err = evaluate_exports("exports.init.source;").unwrap_err();
        assert!(matches!(err, SandboxError::Type(_)));
    }
}
