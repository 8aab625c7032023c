use std::sync::Arc;

use alchemy_jobs::{Job, JobContext, Parallel};
use alchemy_syntax::nodes::{
    ArgumentListNode, ArgumentNode, BinaryNode, IfNode, LiteralNode, NodeKind, PrimaryNode,
    PrimaryTailNode, UnaryNode,
};
use alchemy_syntax::{
    BinaryOp, BuiltInType, LiteralData, Modifiers, NodeIndex, PassBy, RawNodeIndex, SyntaxTree,
    TokenRange, UnaryOp,
};

use crate::builtins::BuiltIns;
use crate::conversions::{self, ParameterConversion};
use crate::diagnostics::Diagnostics;
use crate::expr::{
    ArithmeticOp, ComparisonOp, ConditionalOp, DeclarationSource, EqualityOp, ExprArena, ExprId,
    ExprKind, MethodBody, Scope, ScopeId, Vep, VepId,
};
use crate::file_info::{FileInfo, FileUsings, TypeBodies};
use crate::generic_cache::GenericTypeCache;
use crate::member_info::{MethodGroup, MethodInfo};
use crate::resolved_type::ResolvedType;
use crate::type_info::{ResolveMap, TypeClass, TypeInfo};
use crate::type_resolver::TypeResolver;

/// Fans the per-file introspection out as a batched parallel-for. Kept as
/// its own job so the pipeline's phase boundary is a single await.
pub struct ConstructExpressionTreesJob {
    pub files: Arc<Vec<Arc<FileInfo>>>,
    pub resolve_map: Arc<ResolveMap>,
    pub diagnostics: Arc<Diagnostics>,
    pub builtins: Arc<BuiltIns>,
    pub generic_cache: Arc<GenericTypeCache>,
}

impl Job for ConstructExpressionTreesJob {
    fn execute(&self, ctx: &JobContext) {
        ctx.run(
            Parallel::batch(self.files.len() as u32, 1),
            IntrospectJob {
                files: self.files.clone(),
                resolve_map: self.resolve_map.clone(),
                diagnostics: self.diagnostics.clone(),
                builtins: self.builtins.clone(),
                generic_cache: self.generic_cache.clone(),
            },
        );
    }
}

/// Walks every declared type's method bodies, building expression trees
/// with resolved identifiers and selected overloads.
pub struct IntrospectJob {
    pub files: Arc<Vec<Arc<FileInfo>>>,
    pub resolve_map: Arc<ResolveMap>,
    pub diagnostics: Arc<Diagnostics>,
    pub builtins: Arc<BuiltIns>,
    pub generic_cache: Arc<GenericTypeCache>,
}

impl Job for IntrospectJob {
    fn execute_range(&self, _ctx: &JobContext, start: u32, end: u32) {
        for index in start..end {
            let file = &self.files[index as usize];
            if file.was_changed() {
                self.introspect_file(file);
            }
        }
    }
}

impl IntrospectJob {
    fn introspect_file(&self, file: &Arc<FileInfo>) {
        let tree_guard = file.tree.read();
        let Some(parse) = tree_guard.as_ref() else {
            return;
        };
        let tree = &parse.tree;
        let usings = file.usings.read().clone();
        let declared = file.declared_types.read().clone();

        let mut all_bodies = Vec::with_capacity(declared.len());
        for type_info in &declared {
            let bodies = match type_info.type_class {
                TypeClass::Class | TypeClass::Struct | TypeClass::Interface => {
                    self.introspect_type(file, tree, &usings, type_info)
                }
                _ => TypeBodies::default(),
            };
            all_bodies.push(bodies);
        }

        drop(tree_guard);
        *file.bodies.write() = all_bodies;
    }

    fn introspect_type(
        &self,
        file: &Arc<FileInfo>,
        tree: &SyntaxTree,
        usings: &FileUsings,
        type_info: &Arc<TypeInfo>,
    ) -> TypeBodies {
        let Some(members) = type_info.members() else {
            return TypeBodies::default();
        };

        let mut bodies: Vec<Option<MethodBody>> = Vec::with_capacity(members.methods.len());
        for method in &members.methods {
            // expanded arity methods share their prototype's body
            if method.prototype.is_some() {
                bodies.push(None);
                continue;
            }

            let body_block = match tree.kind(method.node) {
                Some(NodeKind::Method(node)) => node.body,
                _ => NodeIndex::NONE,
            };
            if !body_block.is_valid() {
                bodies.push(None);
                continue;
            }

            let mut resolver = TypeResolver::new(
                file,
                tree,
                &self.resolve_map,
                &self.diagnostics,
                &self.builtins,
                &self.generic_cache,
                usings.clone(),
            );
            for arg in &type_info.generic_args {
                if let Some(arg_info) = &arg.type_info {
                    resolver.input_generic_args.push(arg_info.clone());
                }
            }
            for param in &method.generic_params {
                resolver.input_generic_args.push(param.clone());
            }

            let introspector = ScopeIntrospector {
                file,
                tree,
                diagnostics: &self.diagnostics,
                builtins: &self.builtins,
                type_info,
                resolver,
                arena: ExprArena::new(),
                scope_stack: Vec::new(),
                in_static_context: method.is_static(),
                return_type: method.return_type.clone(),
                variable_name_gen: 0,
            };

            bodies.push(Some(introspector.introspect_method(method, body_block)));
        }

        TypeBodies { methods: bodies }
    }
}

struct SiteChecks {
    can_be_private: bool,
    can_be_protected: bool,
    can_be_internal: bool,
    /// Call is qualified by an instance expression.
    instance_receiver: bool,
    in_static_context: bool,
}

struct RejectedCandidate {
    method: Arc<MethodInfo>,
    reason: &'static str,
    points: i32,
    scored: bool,
}

struct ScopeIntrospector<'a> {
    file: &'a Arc<FileInfo>,
    tree: &'a SyntaxTree,
    diagnostics: &'a Diagnostics,
    builtins: &'a BuiltIns,
    type_info: &'a Arc<TypeInfo>,
    resolver: TypeResolver<'a>,
    arena: ExprArena,
    scope_stack: Vec<ScopeId>,
    in_static_context: bool,
    return_type: ResolvedType,
    variable_name_gen: u32,
}

impl<'a> ScopeIntrospector<'a> {
    // ---- plumbing ----

    fn report(&self, range: TokenRange, message: String) {
        let location = self.tree.location_from_token(range.start);
        self.diagnostics
            .error(&self.file.path_string(), location, message);
    }

    fn current_scope(&self) -> ScopeId {
        *self
            .scope_stack
            .last()
            .unwrap_or(&ScopeId(0))
    }

    fn push_scope(&mut self) -> ScopeId {
        let parent = self.scope_stack.last().copied();
        let scope = self.arena.alloc_scope(Scope::block(parent));
        self.scope_stack.push(scope);
        scope
    }

    fn pop_scope(&mut self) -> Option<ScopeId> {
        self.scope_stack.pop()
    }

    fn add_statement(&mut self, statement: ExprId) {
        let scope = self.current_scope();
        self.arena.scope_mut(scope).statements.push(statement);
    }

    fn type_of(&self, id: ExprId) -> ResolvedType {
        self.arena.type_of(id, self.builtins)
    }

    fn semantic_error(&mut self, range: TokenRange) -> ExprId {
        self.arena.alloc(ExprKind::SemanticError, range)
    }

    fn bool_type(&self) -> ResolvedType {
        self.builtins.resolved(BuiltInType::Bool)
    }

    fn make_variable_name(&mut self) -> String {
        let name = format!("__var{}", self.variable_name_gen);
        self.variable_name_gen += 1;
        name
    }

    fn assert_can_read(&mut self, id: ExprId) {
        if self.arena.can_read(id) {
            return;
        }
        let range = self.arena.expr(id).token_range;
        let message = match &self.arena.expr(id).kind {
            ExprKind::IndexerAccess { .. } => "Indexer is not readable",
            _ => "Property is not readable",
        };
        self.report(range, message.to_string());
    }

    // ---- entry ----

    fn introspect_method(
        mut self,
        method: &Arc<MethodInfo>,
        body: NodeIndex<alchemy_syntax::nodes::BlockNode>,
    ) -> MethodBody {
        let mut root = Scope::block(None);
        root.return_type = method.return_type.clone();
        root.is_static_boundary = method.is_static();
        let root_scope = self.arena.alloc_scope(root);
        self.scope_stack.push(root_scope);

        if !method.is_static() {
            let this = self.arena.alloc_vep(Vep {
                name: "this".to_string(),
                ty: ResolvedType::from_type(self.type_info.clone()),
                source: DeclarationSource::This,
                pass_by: PassBy::None,
                is_assignable: false,
                is_closed_over: false,
                token_range: TokenRange::default(),
            });
            let scope = self.arena.scope_mut(root_scope);
            scope.instance = Some(this);
            scope.veps.push(this);
        }

        let mut parameters = Vec::with_capacity(method.parameters.len());
        for param in &method.parameters {
            let vep = self.arena.alloc_vep(Vep {
                name: param.name.clone(),
                ty: param.ty.clone(),
                source: DeclarationSource::Parameter,
                pass_by: param.pass_by,
                is_assignable: true,
                is_closed_over: false,
                token_range: self.tree.token_range(param.node),
            });
            self.arena.scope_mut(root_scope).veps.push(vep);
            parameters.push(vep);
        }

        if let Some(block) = self.tree.get(body) {
            self.visit_statement_list(block.first_statement);
        }

        self.scope_stack.pop();

        MethodBody {
            method: method.clone(),
            arena: self.arena,
            root_scope,
            parameters,
        }
    }

    // ---- statements ----

    fn visit_statement_list(&mut self, first: RawNodeIndex) {
        let mut cursor = first;
        while cursor.is_valid() {
            let next = self
                .tree
                .kind(cursor)
                .map(|k| k.next())
                .unwrap_or(RawNodeIndex::NONE);
            if let Some(statement) = self.visit_statement(cursor) {
                self.add_statement(statement);
            }
            cursor = next;
        }
    }

    fn visit_statement(&mut self, index: RawNodeIndex) -> Option<ExprId> {
        let kind = self.tree.kind(index)?.clone();
        let range = self.tree.token_range(index);

        match kind {
            NodeKind::Block(block) => {
                let scope = self.push_scope();
                self.visit_statement_list(block.first_statement);
                self.pop_scope();
                Some(self.arena.alloc(ExprKind::ScopeBlock { scope }, range))
            }

            NodeKind::ExpressionStatement(statement) => {
                self.visit_expression(None, statement.expression)
            }

            NodeKind::VariableDeclaration(decl) => {
                let declared_type = if decl.type_path.is_valid() {
                    Some(
                        self.resolver
                            .resolve_type_path(decl.type_path)
                            .unwrap_or_default(),
                    )
                } else {
                    None
                };

                let initializer = if decl.initializer.is_valid() {
                    self.visit_expression(declared_type.as_ref(), decl.initializer)
                } else {
                    None
                };

                let ty = match &declared_type {
                    Some(ty) => ty.clone(),
                    None => initializer
                        .map(|init| self.type_of(init))
                        .unwrap_or_else(ResolvedType::var),
                };

                let initializer = match (initializer, &declared_type) {
                    (Some(init), Some(target)) => Some(self.convert_or_report(init, target, range)),
                    (init, _) => init,
                };

                let name = self
                    .tree
                    .get(decl.identifier)
                    .map(|i| self.tree.token_text(i.token).to_string())
                    .unwrap_or_default();

                let current = self.current_scope();
                let duplicate = self
                    .arena
                    .scope(current)
                    .veps
                    .iter()
                    .any(|v| self.arena.vep(*v).name == name);
                if duplicate {
                    self.report(
                        range,
                        format!("A local named `{name}` is already declared in this scope"),
                    );
                }

                let vep = self.declare_local(&name, ty, DeclarationSource::LocalVariable, range);
                Some(self.arena.alloc(ExprKind::DeclareLocal { vep, initializer }, range))
            }

            NodeKind::If(node) => Some(self.visit_if(&node, range)),

            NodeKind::Return(node) => {
                let expression = if node.expression.is_valid() {
                    let return_type = self.return_type.clone();
                    let value = self.visit_expression(Some(&return_type), node.expression);
                    if self.return_type.is_void() {
                        self.report(range, "Cannot return a value from a void method".to_string());
                        value
                    } else {
                        value.map(|v| {
                            let target = self.return_type.clone();
                            self.convert_or_report(v, &target, range)
                        })
                    }
                } else {
                    if !self.return_type.is_void() {
                        self.report(
                            range,
                            format!(
                                "Method must return a value of type `{}`",
                                self.return_type.display_string()
                            ),
                        );
                    }
                    None
                };
                Some(self.arena.alloc(ExprKind::Return { expression }, range))
            }

            _ => self.visit_expression(None, index),
        }
    }

    fn declare_local(
        &mut self,
        name: &str,
        ty: ResolvedType,
        source: DeclarationSource,
        range: TokenRange,
    ) -> VepId {
        let vep = self.arena.alloc_vep(Vep {
            name: name.to_string(),
            ty,
            source,
            pass_by: PassBy::None,
            is_assignable: true,
            is_closed_over: false,
            token_range: range,
        });
        let scope = self.current_scope();
        self.arena.scope_mut(scope).veps.push(vep);
        vep
    }

    /// `if (cond_list) using (name_list) body else ...`: a non-null
    /// nullable condition with a requested name is rewritten through a
    /// synthesized local so the body sees the unwrapped value.
    fn visit_if(&mut self, node: &IfNode, range: TokenRange) -> ExprId {
        let mut context_names: Vec<(String, TokenRange)> = Vec::new();
        if let Some(context) = self.tree.get(node.context) {
            let mut cursor = context.first;
            while let Some(ident) = self.tree.get(cursor) {
                context_names.push((
                    self.tree.token_text(ident.token).to_string(),
                    self.tree.token_range(cursor.raw()),
                ));
                cursor = ident.next;
            }
        }

        let mut conditions = Vec::new();
        let mut context_values: Vec<Option<ExprId>> = Vec::new();

        if let Some(list) = self.tree.get(node.conditions) {
            let bool_type = self.bool_type();
            let mut cursor = list.first;
            let mut position = 0usize;
            while cursor.is_valid() {
                let next = self
                    .tree
                    .kind(cursor)
                    .map(|k| k.next())
                    .unwrap_or(RawNodeIndex::NONE);
                let cond_range = self.tree.token_range(cursor);

                if let Some(cond) = self.visit_expression(Some(&bool_type), cursor) {
                    let cond_type = self.type_of(cond);

                    if cond_type.is_bool() {
                        conditions.push(cond);
                        context_values
                            .push(Some(self.arena.alloc(ExprKind::BoolLiteral { value: true }, cond_range)));
                    } else if cond_type.is_nullable() && context_names.len() > position {
                        let name = self.make_variable_name();
                        let vep = self.declare_local(
                            &name,
                            cond_type.clone(),
                            DeclarationSource::LocalVariable,
                            cond_range,
                        );
                        let vep_decl = self
                            .arena
                            .alloc(ExprKind::DeclareLocal { vep, initializer: Some(cond) }, cond_range);
                        self.add_statement(vep_decl);

                        let vep_read = self.arena.alloc(ExprKind::Vep(vep), cond_range);
                        conditions.push(
                            self.arena
                                .alloc(ExprKind::NullableHasValue { expression: vep_read }, cond_range),
                        );
                        let vep_read_again = self.arena.alloc(ExprKind::Vep(vep), cond_range);
                        context_values.push(Some(self.arena.alloc(
                            ExprKind::NullableValue {
                                expression: vep_read_again,
                            },
                            cond_range,
                        )));
                    } else if cond_type.is_nullable() {
                        // no name asked for this slot; test presence only
                        conditions.push(
                            self.arena
                                .alloc(ExprKind::NullableHasValue { expression: cond }, cond_range),
                        );
                        context_values.push(None);
                    } else {
                        self.report(
                            cond_range,
                            "Expression type must be bool or nullable".to_string(),
                        );
                        conditions.push(cond);
                        context_values.push(None);
                    }
                }

                position += 1;
                cursor = next;
            }
        }

        // body scope owns the context bindings
        let body_scope = self.push_scope();
        for (index, (name, name_range)) in context_names.iter().enumerate() {
            let value = context_values.get(index).copied().flatten();
            let Some(value) = value else {
                continue;
            };
            let ty = self.type_of(value);
            let vep = self.declare_local(name, ty, DeclarationSource::ContextListParameter, *name_range);
            let statement = self
                .arena
                .alloc(ExprKind::DeclareLocal { vep, initializer: Some(value) }, *name_range);
            self.add_statement(statement);
        }

        match self.tree.kind(node.body).cloned() {
            Some(NodeKind::Block(block)) => {
                // statements flow into the context scope directly
                self.visit_statement_list(block.first_statement);
            }
            Some(_) => {
                if let Some(statement) = self.visit_statement(node.body) {
                    self.add_statement(statement);
                }
            }
            None => {}
        }
        self.pop_scope();

        let else_branch = if node.else_branch.is_valid() {
            self.visit_statement(node.else_branch)
        } else {
            None
        };

        self.arena.alloc(
            ExprKind::If {
                conditions,
                body: body_scope,
                else_branch,
            },
            range,
        )
    }

    // ---- expressions ----

    fn visit_expression(
        &mut self,
        target: Option<&ResolvedType>,
        index: RawNodeIndex,
    ) -> Option<ExprId> {
        let kind = self.tree.kind(index)?.clone();
        let range = self.tree.token_range(index);

        let expr = match kind {
            NodeKind::Literal(literal) => self.visit_literal(target, &literal, range),
            NodeKind::Binary(binary) => self.visit_binary(&binary, range),
            NodeKind::Unary(unary) => self.visit_unary(&unary, range),
            NodeKind::Assignment(assignment) => {
                let lhs = self.visit_expression(None, assignment.lhs)?;
                let lhs_type = self.type_of(lhs);
                self.check_assignable(lhs, range);
                let rhs = self.visit_expression(Some(&lhs_type), assignment.rhs)?;
                let rhs = self.convert_or_report(rhs, &lhs_type, range);
                self.arena.alloc(ExprKind::Assign { lhs, rhs }, range)
            }
            NodeKind::Paren(paren) => self.visit_expression(target, paren.expression)?,
            NodeKind::Primary(primary) => self.visit_primary(&primary, range),
            _ => {
                log::debug!("unhandled expression node at {range:?}");
                self.semantic_error(range)
            }
        };

        Some(expr)
    }

    fn check_assignable(&mut self, lhs: ExprId, range: TokenRange) {
        match &self.arena.expr(lhs).kind {
            ExprKind::Vep(vep) => {
                let vep = self.arena.vep(*vep);
                if !vep.is_assignable {
                    let name = vep.name.clone();
                    self.report(range, format!("Cannot assign to `{name}`"));
                }
            }
            ExprKind::PropertyAccess { property, .. } => {
                if !property.is_writable() {
                    let name = property.name.clone();
                    self.report(range, format!("Property `{name}` has no setter"));
                }
            }
            ExprKind::FieldAccess { field, .. } => {
                if field.is_const() {
                    let name = field.name.clone();
                    self.report(range, format!("Cannot assign to const field `{name}`"));
                }
            }
            _ => {}
        }
    }

    /// Wrap `expr` so its type matches `target`, or report why it cannot.
    fn convert_or_report(
        &mut self,
        expr: ExprId,
        target: &ResolvedType,
        range: TokenRange,
    ) -> ExprId {
        let source = self.type_of(expr);
        if source == *target || matches!(self.arena.expr(expr).kind, ExprKind::SemanticError) {
            return expr;
        }
        match conversions::try_convert_scored(&source, target) {
            Some((_, conversion)) => self.apply_conversion(expr, &conversion),
            None => {
                self.report(
                    range,
                    format!(
                        "Cannot implicitly convert type `{}` to `{}`",
                        source.display_string(),
                        target.display_string()
                    ),
                );
                expr
            }
        }
    }

    fn apply_conversion(&mut self, expr: ExprId, conversion: &ParameterConversion) -> ExprId {
        if !conversion.requires_conversion {
            return expr;
        }
        let range = self.arena.expr(expr).token_range;
        if let Some(user) = &conversion.user_conversion {
            let argument = self.arena.alloc(
                ExprKind::Argument {
                    pass_by: PassBy::None,
                    expression: expr,
                },
                range,
            );
            return self.arena.alloc(
                ExprKind::StaticCall {
                    method: user.clone(),
                    arguments: vec![argument],
                },
                range,
            );
        }
        self.arena.alloc(
            ExprKind::DirectCast {
                expression: expr,
                ty: conversion.convert_to.clone(),
            },
            range,
        )
    }

    fn visit_literal(
        &mut self,
        target: Option<&ResolvedType>,
        literal: &LiteralNode,
        range: TokenRange,
    ) -> ExprId {
        match literal.value {
            LiteralData::Null => {
                let ty = target.cloned().unwrap_or_else(ResolvedType::null);
                self.arena.alloc(ExprKind::NullLiteral { ty }, range)
            }
            LiteralData::Default => {
                if literal.default_type.is_valid() {
                    match self.resolver.resolve_type_path(literal.default_type) {
                        Some(ty) => {
                            if let Some(target) = target {
                                if *target != ty && !target.is_assignable_from(&ty) {
                                    self.report(
                                        range,
                                        format!(
                                            "default type `{}` is not assignable to `{}`",
                                            ty.display_string(),
                                            target.display_string()
                                        ),
                                    );
                                }
                            }
                            self.arena.alloc(ExprKind::DefaultLiteral { ty }, range)
                        }
                        None => {
                            let ty = ResolvedType::null();
                            self.arena.alloc(ExprKind::DefaultLiteral { ty }, range)
                        }
                    }
                } else {
                    let ty = target.cloned().unwrap_or_else(ResolvedType::null);
                    self.arena.alloc(ExprKind::DefaultLiteral { ty }, range)
                }
            }
            LiteralData::Bool(value) => self.arena.alloc(ExprKind::BoolLiteral { value }, range),
            value => self.arena.alloc(ExprKind::NumericLiteral { value }, range),
        }
    }

    fn visit_unary(&mut self, unary: &UnaryNode, range: TokenRange) -> ExprId {
        let Some(operand) = self.visit_expression(None, unary.operand) else {
            return self.semantic_error(range);
        };
        let operand_type = self.type_of(operand);

        match unary.op {
            UnaryOp::Plus => operand,
            UnaryOp::Minus => {
                if !operand_type.is_arithmetic() && !operand_type.is_vector() {
                    self.report(range, "Unary minus requires a numeric operand".to_string());
                    return operand;
                }
                let zero = self.arena.alloc(
                    ExprKind::NumericLiteral {
                        value: LiteralData::Int32(0),
                    },
                    range,
                );
                let zero = self.arena.alloc(
                    ExprKind::DirectCast {
                        expression: zero,
                        ty: operand_type,
                    },
                    range,
                );
                self.arena.alloc(
                    ExprKind::Arithmetic {
                        lhs: zero,
                        op: ArithmeticOp::Subtract,
                        rhs: operand,
                    },
                    range,
                )
            }
            UnaryOp::Not => {
                if !operand_type.is_bool() {
                    self.report(range, "Operand of `!` must be bool".to_string());
                }
                let false_literal = self.arena.alloc(ExprKind::BoolLiteral { value: false }, range);
                self.arena.alloc(
                    ExprKind::Equality {
                        lhs: operand,
                        op: EqualityOp::Equal,
                        rhs: false_literal,
                    },
                    range,
                )
            }
            UnaryOp::BitwiseNot => {
                self.report(range, "Operator `~` is not supported".to_string());
                self.semantic_error(range)
            }
        }
    }

    // ---- binary operators ----

    fn visit_binary(&mut self, binary: &BinaryNode, range: TokenRange) -> ExprId {
        if matches!(binary.op, BinaryOp::ConditionalAnd | BinaryOp::ConditionalOr) {
            let bool_type = self.bool_type();
            let lhs = self.visit_expression(Some(&bool_type), binary.lhs);
            let rhs = self.visit_expression(Some(&bool_type), binary.rhs);
            let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
                return self.semantic_error(range);
            };
            for operand in [lhs, rhs] {
                let ty = self.type_of(operand);
                if !ty.is_bool() && !ty.is_null_or_default() {
                    self.report(
                        range,
                        "Operands of a conditional expression must be bool".to_string(),
                    );
                    break;
                }
            }
            let op = if binary.op == BinaryOp::ConditionalOr {
                ConditionalOp::Or
            } else {
                ConditionalOp::And
            };
            return self.arena.alloc(ExprKind::Conditional { lhs, op, rhs }, range);
        }

        let lhs = self.visit_expression(None, binary.lhs);
        let rhs = self.visit_expression(None, binary.rhs);
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return self.semantic_error(range);
        };

        match binary.op {
            BinaryOp::Equal => self.make_equality(lhs, EqualityOp::Equal, rhs, range),
            BinaryOp::NotEqual => self.make_equality(lhs, EqualityOp::NotEqual, rhs, range),
            BinaryOp::LessThan => self.make_comparison(lhs, ComparisonOp::LessThan, rhs, range),
            BinaryOp::GreaterThan => {
                self.make_comparison(lhs, ComparisonOp::GreaterThan, rhs, range)
            }
            BinaryOp::LessThanOrEqual => {
                self.make_comparison(lhs, ComparisonOp::LessThanOrEqual, rhs, range)
            }
            BinaryOp::GreaterThanOrEqual => {
                self.make_comparison(lhs, ComparisonOp::GreaterThanOrEqual, rhs, range)
            }
            BinaryOp::Add => self.make_arithmetic(lhs, ArithmeticOp::Add, rhs, range),
            BinaryOp::Subtract => self.make_arithmetic(lhs, ArithmeticOp::Subtract, rhs, range),
            BinaryOp::Multiply => self.make_arithmetic(lhs, ArithmeticOp::Multiply, rhs, range),
            BinaryOp::Divide => self.make_arithmetic(lhs, ArithmeticOp::Divide, rhs, range),
            BinaryOp::Modulus => self.make_arithmetic(lhs, ArithmeticOp::Modulus, rhs, range),
            BinaryOp::BitwiseAnd
            | BinaryOp::BitwiseOr
            | BinaryOp::BitwiseXor
            | BinaryOp::ShiftLeft
            | BinaryOp::ShiftRight => {
                self.report(range, "Bitwise operators are not supported yet".to_string());
                self.semantic_error(range)
            }
            BinaryOp::ConditionalAnd | BinaryOp::ConditionalOr => unreachable!(),
        }
    }

    /// Wrap the less-precise operand in a `DirectCast` to the preferred
    /// common type.
    fn promote_operands(&mut self, lhs: ExprId, rhs: ExprId) -> Option<(ExprId, ExprId)> {
        let left_type = self.type_of(lhs);
        let right_type = self.type_of(rhs);
        let promoted = conversions::promoted_type(left_type.built_in, right_type.built_in)?;
        let promoted_type = self.builtins.resolved(promoted);

        let lhs = if left_type.built_in == promoted {
            lhs
        } else {
            let cast_range = self.arena.expr(lhs).token_range;
            self.arena.alloc(
                ExprKind::DirectCast {
                    expression: lhs,
                    ty: promoted_type.clone(),
                },
                cast_range,
            )
        };
        let rhs = if right_type.built_in == promoted {
            rhs
        } else {
            let cast_range = self.arena.expr(rhs).token_range;
            self.arena.alloc(
                ExprKind::DirectCast {
                    expression: rhs,
                    ty: promoted_type,
                },
                cast_range,
            )
        };
        Some((lhs, rhs))
    }

    fn make_equality(
        &mut self,
        lhs: ExprId,
        op: EqualityOp,
        rhs: ExprId,
        range: TokenRange,
    ) -> ExprId {
        self.assert_can_read(lhs);
        self.assert_can_read(rhs);

        let left_type = self.type_of(lhs);
        let right_type = self.type_of(rhs);

        if left_type == right_type {
            return self.arena.alloc(ExprKind::Equality { lhs, op, rhs }, range);
        }

        if left_type.is_arithmetic() && right_type.is_arithmetic() {
            if let Some((lhs, rhs)) = self.promote_operands(lhs, rhs) {
                return self.arena.alloc(ExprKind::Equality { lhs, op, rhs }, range);
            }
        }

        // null literal against a nullable or reference operand
        if left_type.is_null_or_default() || right_type.is_null_or_default() {
            let other = if left_type.is_null_or_default() {
                &right_type
            } else {
                &left_type
            };
            if other.is_nullable() || other.is_reference_type() {
                return self.arena.alloc(ExprKind::Equality { lhs, op, rhs }, range);
            }
        }

        if conversions::has_reference_equality(&left_type, &right_type) {
            return self.arena.alloc(ExprKind::Equality { lhs, op, rhs }, range);
        }

        self.report(
            range,
            format!(
                "Cannot compare operands of type `{}` and `{}`",
                left_type.display_string(),
                right_type.display_string()
            ),
        );
        self.arena.alloc(ExprKind::BoolLiteral { value: false }, range)
    }

    fn make_comparison(
        &mut self,
        lhs: ExprId,
        op: ComparisonOp,
        rhs: ExprId,
        range: TokenRange,
    ) -> ExprId {
        self.assert_can_read(lhs);
        self.assert_can_read(rhs);

        let left_type = self.type_of(lhs);
        let right_type = self.type_of(rhs);

        if left_type == right_type {
            if !left_type.is_arithmetic() && !left_type.is_enum() && !left_type.is_char() {
                self.report(
                    range,
                    "Comparison operands must be numeric or char type".to_string(),
                );
            }
            return self.arena.alloc(ExprKind::Comparison { lhs, op, rhs }, range);
        }

        if left_type.is_arithmetic() && right_type.is_arithmetic() {
            if left_type.is_unsigned_integer() != right_type.is_unsigned_integer()
                && !left_type.is_floating_point()
                && !right_type.is_floating_point()
            {
                self.report(
                    range,
                    "Cannot compare signed and unsigned types, a cast is required".to_string(),
                );
                return self.arena.alloc(ExprKind::BoolLiteral { value: false }, range);
            }
            if let Some((lhs, rhs)) = self.promote_operands(lhs, rhs) {
                return self.arena.alloc(ExprKind::Comparison { lhs, op, rhs }, range);
            }
        }

        self.report(
            range,
            "Comparison operands must both be numeric, an enum, or the char type".to_string(),
        );
        self.arena.alloc(ExprKind::BoolLiteral { value: false }, range)
    }

    fn make_arithmetic(
        &mut self,
        lhs: ExprId,
        op: ArithmeticOp,
        rhs: ExprId,
        range: TokenRange,
    ) -> ExprId {
        self.assert_can_read(lhs);
        self.assert_can_read(rhs);

        let left_type = self.type_of(lhs);
        let right_type = self.type_of(rhs);

        if left_type == right_type {
            if left_type.is_arithmetic() {
                return self.arena.alloc(ExprKind::Arithmetic { lhs, op, rhs }, range);
            }
            if left_type.is_vector() {
                return self
                    .arena
                    .alloc(ExprKind::VectorArithmetic { lhs, op, rhs }, range);
            }
            self.report(
                range,
                "Expected operands of arithmetic expression to be vectors or numbers".to_string(),
            );
            return lhs;
        }

        if left_type.is_arithmetic() && right_type.is_arithmetic() {
            if let Some((lhs, rhs)) = self.promote_operands(lhs, rhs) {
                return self.arena.alloc(ExprKind::Arithmetic { lhs, op, rhs }, range);
            }
        }

        self.report(
            range,
            "Invalid arithmetic expression, types do not match and are not implicitly convertable"
                .to_string(),
        );
        lhs
    }

    // ---- primary expressions ----

    fn visit_primary(&mut self, primary: &PrimaryNode, range: TokenRange) -> ExprId {
        let head_kind = self.tree.kind(primary.start).cloned();
        let mut expr = match head_kind {
            Some(NodeKind::Identifier(ident)) => {
                let name = self.tree.token_text(ident.token).to_string();
                let head_range = self.tree.token_range(primary.start);
                self.resolve_identifier_head(&name, head_range)
            }
            Some(NodeKind::PrimaryInvocation(invocation)) => {
                let head_range = self.tree.token_range(primary.start);
                self.visit_unqualified_call(&invocation, head_range)
            }
            Some(_) => self
                .visit_expression(None, primary.start)
                .unwrap_or_else(|| self.semantic_error(range)),
            None => self.semantic_error(range),
        };

        expr = self.visit_bracket_chain(expr, primary.bracket);

        // collect tail parts so member access can look one part ahead for
        // its invocation
        let mut tails: Vec<PrimaryTailNode> = Vec::new();
        let mut cursor = primary.tail;
        while let Some(tail) = self.tree.get(cursor) {
            tails.push(*tail);
            cursor = tail.next;
        }

        let mut index = 0usize;
        while index < tails.len() {
            let first_consumed = index;
            expr = self.visit_tail_part(expr, &tails, &mut index);
            // brackets of every part this step consumed, in order
            for consumed in first_consumed..=index {
                expr = self.visit_bracket_chain(expr, tails[consumed].bracket);
            }
            index += 1;
        }

        expr
    }

    fn visit_bracket_chain(
        &mut self,
        head: ExprId,
        bracket: NodeIndex<alchemy_syntax::nodes::BracketNode>,
    ) -> ExprId {
        let mut expr = head;
        let mut cursor = bracket;
        while let Some(node) = self.tree.get(cursor).copied() {
            let range = self.tree.token_range(cursor.raw());
            let head_type = self.type_of(expr);

            let index_expr = self
                .visit_expression(None, node.expression)
                .unwrap_or_else(|| self.semantic_error(range));

            if head_type.is_array() {
                expr = self.arena.alloc(
                    ExprKind::ArrayIndex {
                        array: expr,
                        index: index_expr,
                    },
                    range,
                );
            } else if let Some(indexer) = head_type
                .type_info
                .as_ref()
                .and_then(|t| t.first_indexer())
            {
                let index_expr = match indexer.parameters.first() {
                    Some(param) => {
                        let target = param.ty.clone();
                        self.convert_or_report(index_expr, &target, range)
                    }
                    None => index_expr,
                };
                expr = self.arena.alloc(
                    ExprKind::IndexerAccess {
                        instance: expr,
                        indexer,
                        arguments: vec![index_expr],
                    },
                    range,
                );
            } else {
                self.report(range, "type is not indexable".to_string());
                expr = self.semantic_error(range);
            }

            cursor = node.next;
        }
        expr
    }

    fn this_expression(&mut self, range: TokenRange) -> Option<ExprId> {
        let root = *self.scope_stack.first()?;
        let instance = self.arena.scope(root).instance?;
        Some(self.arena.alloc(ExprKind::Vep(instance), range))
    }

    /// Identifier at the head of a primary expression: scope stack first
    /// (flagging closure captures and static-boundary violations), then
    /// the enclosing type's members.
    fn resolve_identifier_head(&mut self, name: &str, range: TokenRange) -> ExprId {
        let mut passed_static_boundary = false;
        let mut passed_closure_boundary = false;

        for scope_index in (0..self.scope_stack.len()).rev() {
            let scope_id = self.scope_stack[scope_index];
            let vep_ids: Vec<VepId> = self.arena.scope(scope_id).veps.clone();
            for vep_id in vep_ids.into_iter().rev() {
                if self.arena.vep(vep_id).name != name {
                    continue;
                }
                if passed_closure_boundary {
                    self.arena.vep_mut(vep_id).is_closed_over = true;
                }
                if passed_static_boundary {
                    self.report(
                        range,
                        "cannot access this variable across a static boundary".to_string(),
                    );
                }
                return self.arena.alloc(ExprKind::Vep(vep_id), range);
            }

            let scope = self.arena.scope(scope_id);
            if scope.is_static_boundary {
                passed_static_boundary = true;
            }
            if scope.is_closure_boundary {
                passed_closure_boundary = true;
            }
        }

        if let Some(field) = self.type_info.try_get_field(name) {
            let instance = if field.is_static() {
                None
            } else if self.in_static_context {
                self.report(
                    range,
                    format!("`{name}` is an instance field and cannot be used in a static context"),
                );
                None
            } else {
                self.this_expression(range)
            };
            return self
                .arena
                .alloc(ExprKind::FieldAccess { instance, field }, range);
        }

        if let Some(property) = self.type_info.try_get_property(name) {
            let instance = if property.is_static() {
                None
            } else if self.in_static_context {
                self.report(
                    range,
                    format!(
                        "`{name}` is an instance property and cannot be used in a static context"
                    ),
                );
                None
            } else {
                self.this_expression(range)
            };
            return self
                .arena
                .alloc(ExprKind::PropertyAccess { instance, property }, range);
        }

        if let Some(group) = self.type_info.try_get_method_group(name) {
            return self
                .arena
                .alloc(ExprKind::MethodGroupAccess { instance: None, group }, range);
        }

        self.report(range, format!("Unable to resolve identifier `{name}`"));
        self.semantic_error(range)
    }

    fn collect_arguments(
        &self,
        list: NodeIndex<ArgumentListNode>,
    ) -> Vec<(ArgumentNode, TokenRange)> {
        let mut arguments = Vec::new();
        let Some(list) = self.tree.get(list) else {
            return arguments;
        };
        let mut cursor = list.first;
        while let Some(argument) = self.tree.get(cursor).copied() {
            arguments.push((argument, self.tree.token_range(cursor.raw())));
            cursor = argument.next;
        }
        arguments
    }

    fn visit_unqualified_call(
        &mut self,
        invocation: &alchemy_syntax::nodes::PrimaryInvocationNode,
        range: TokenRange,
    ) -> ExprId {
        let name = self
            .tree
            .get(invocation.identifier)
            .map(|i| self.tree.token_text(i.token).to_string())
            .unwrap_or_default();

        let arguments = self.collect_arguments(invocation.arguments);

        let group = self
            .type_info
            .try_get_method_group_with_parameter_count(&name, arguments.len());

        let Some(group) = group else {
            if self.type_info.has_any_method_with_name(&name) {
                self.report(range, "Incorrect number of arguments".to_string());
            } else {
                self.report(range, "No method with this name".to_string());
            }
            return self.semantic_error(range);
        };

        let instance = if self.in_static_context {
            None
        } else {
            self.this_expression(range)
        };

        let checks = SiteChecks {
            can_be_private: true,
            can_be_protected: true,
            can_be_internal: true,
            instance_receiver: false,
            in_static_context: self.in_static_context,
        };

        self.select_eligible_method(instance, &group, &arguments, checks, range)
    }

    fn visit_tail_part(
        &mut self,
        last: ExprId,
        tails: &[PrimaryTailNode],
        index: &mut usize,
    ) -> ExprId {
        let tail = tails[*index];
        let part_kind = self.tree.kind(tail.part).cloned();
        let range = self.tree.token_range(tail.part);

        match part_kind {
            Some(NodeKind::MemberAccess(access)) => {
                let name = self
                    .tree
                    .get(access.identifier)
                    .map(|i| self.tree.token_text(i.token).to_string())
                    .unwrap_or_default();
                self.visit_member_access(last, &name, tails, index, range)
            }
            Some(NodeKind::Invocation(_)) => {
                // a call part with no preceding method-group member
                self.report(range, "Expression is not callable".to_string());
                self.semantic_error(range)
            }
            _ => {
                self.report(range, "Unsupported member expression".to_string());
                self.semantic_error(range)
            }
        }
    }

    fn visit_member_access(
        &mut self,
        last: ExprId,
        name: &str,
        tails: &[PrimaryTailNode],
        index: &mut usize,
        range: TokenRange,
    ) -> ExprId {
        let last_type = self.type_of(last);

        let Some(last_info) = last_type.type_info.clone() else {
            self.report(range, format!("Unable to resolve member `{name}`"));
            return self.semantic_error(range);
        };

        if let Some(field) = last_info.try_get_field(name) {
            if field.is_const() {
                self.report(
                    range,
                    format!("`{name}` is a const field and cannot be accessed with an instance"),
                );
            }
            if field.is_static() {
                self.report(
                    range,
                    format!("`{name}` is a static field and cannot be accessed with an instance"),
                );
            }
            if last_type.is_nullable() || last_type.is_nullable_array() {
                self.report(
                    range,
                    "Nullable types do not allow access to fields, you must first convert to a non nullable type"
                        .to_string(),
                );
            }
            self.check_member_visibility(&last_info, field.modifiers, "Field", name, range);
            return self.arena.alloc(
                ExprKind::FieldAccess {
                    instance: Some(last),
                    field,
                },
                range,
            );
        }

        if let Some(property) = last_info.try_get_property(name) {
            if property.is_static() {
                self.report(
                    range,
                    format!("`{name}` is a static property and cannot be accessed with an instance"),
                );
            }
            if last_type.is_nullable() || last_type.is_nullable_array() {
                self.report(
                    range,
                    "Nullable types do not allow access to fields, you must first convert to a non nullable type"
                        .to_string(),
                );
            }
            self.check_member_visibility(&last_info, property.modifiers, "Property", name, range);
            return self.arena.alloc(
                ExprKind::PropertyAccess {
                    instance: Some(last),
                    property,
                },
                range,
            );
        }

        if last_info.has_any_method_with_name(name) {
            // is the next part the invocation for this member?
            let invocation = tails.get(*index + 1).and_then(|next_tail| {
                match self.tree.kind(next_tail.part) {
                    Some(NodeKind::Invocation(invocation)) => Some(*invocation),
                    _ => None,
                }
            });

            if let Some(invocation) = invocation {
                *index += 1; // consume the invocation part

                let arguments = self.collect_arguments(invocation.arguments);
                let group = last_info
                    .try_get_method_group_with_parameter_count(name, arguments.len());

                let Some(group) = group else {
                    self.report(range, "Incorrect number of arguments".to_string());
                    return self.semantic_error(range);
                };

                if group.methods.len() == 1 && !group.methods[0].is_generic_definition {
                    let method = group.methods[0].clone();
                    let argument_exprs =
                        self.visit_arguments_against(&arguments, Some(&method));
                    self.check_single_candidate(&method, &arguments, &argument_exprs);
                    return self.arena.alloc(
                        ExprKind::InstanceCall {
                            instance: Some(last),
                            method,
                            arguments: argument_exprs,
                        },
                        range,
                    );
                }

                let checks = SiteChecks {
                    can_be_private: Arc::ptr_eq(&last_info, self.type_info),
                    can_be_protected: self.type_info.is_subclass_of(&last_info)
                        || Arc::ptr_eq(&last_info, self.type_info),
                    can_be_internal: last_info.package_name() == self.type_info.package_name(),
                    instance_receiver: true,
                    in_static_context: self.in_static_context,
                };
                return self.select_eligible_method(Some(last), &group, &arguments, checks, range);
            }

            // plain method-group reference
            if let Some(group) = last_info.try_get_method_group(name) {
                return self.arena.alloc(
                    ExprKind::MethodGroupAccess {
                        instance: Some(last),
                        group,
                    },
                    range,
                );
            }
        }

        self.report(range, format!("Unable to resolve member `{name}`"));
        self.semantic_error(range)
    }

    fn check_member_visibility(
        &mut self,
        owner: &Arc<TypeInfo>,
        modifiers: Modifiers,
        what: &str,
        name: &str,
        range: TokenRange,
    ) {
        if Arc::ptr_eq(owner, self.type_info) || modifiers.contains(Modifiers::PUBLIC) {
            return;
        }
        if modifiers.contains(Modifiers::PRIVATE) {
            self.report(
                range,
                format!("{what} `{name}` is marked private and is not accessible here"),
            );
        } else if modifiers.contains(Modifiers::PROTECTED) {
            if !self.type_info.is_subclass_of(owner) {
                self.report(
                    range,
                    format!("{what} `{name}` is marked protected and is not accessible here"),
                );
            }
        } else if modifiers.contains(Modifiers::INTERNAL)
            && owner.package_name() != self.type_info.package_name()
        {
            self.report(
                range,
                format!("{what} `{name}` is marked internal and is not accessible here"),
            );
        }
    }

    // ---- arguments & overload selection ----

    /// Visit arguments, using the single candidate's parameter types as
    /// conversion targets when one is supplied.
    fn visit_arguments_against(
        &mut self,
        arguments: &[(ArgumentNode, TokenRange)],
        candidate: Option<&Arc<MethodInfo>>,
    ) -> Vec<ExprId> {
        arguments
            .iter()
            .enumerate()
            .map(|(i, (argument, range))| {
                let target = candidate
                    .and_then(|m| m.parameters.get(i))
                    .map(|p| p.ty.clone());
                self.visit_argument(target.as_ref(), argument, *range)
            })
            .collect()
    }

    fn visit_argument(
        &mut self,
        target: Option<&ResolvedType>,
        argument: &ArgumentNode,
        range: TokenRange,
    ) -> ExprId {
        let inner = match argument.pass_by {
            PassBy::None | PassBy::Ref => self
                .visit_expression(target, argument.expression)
                .unwrap_or_else(|| self.semantic_error(range)),
            PassBy::Out => {
                // `out Type name` and `out var name` introduce a local in
                // the enclosing scope
                if argument.identifier.is_valid() {
                    let ty = if argument.is_var {
                        target.cloned().unwrap_or_else(ResolvedType::var)
                    } else {
                        self.resolver
                            .resolve_type_path(argument.type_path)
                            .unwrap_or_default()
                    };
                    let name = self
                        .tree
                        .get(argument.identifier)
                        .map(|i| self.tree.token_text(i.token).to_string())
                        .unwrap_or_default();
                    let vep = self.declare_local(&name, ty, DeclarationSource::LocalVariable, range);
                    self.arena.alloc(ExprKind::Vep(vep), range)
                } else {
                    self.visit_expression(target, argument.expression)
                        .unwrap_or_else(|| self.semantic_error(range))
                }
            }
        };

        self.arena.alloc(
            ExprKind::Argument {
                pass_by: argument.pass_by,
                expression: inner,
            },
            range,
        )
    }

    fn check_single_candidate(
        &mut self,
        method: &Arc<MethodInfo>,
        arguments: &[(ArgumentNode, TokenRange)],
        argument_exprs: &[ExprId],
    ) {
        for (i, (argument, range)) in arguments.iter().enumerate() {
            let Some(param) = method.parameters.get(i) else {
                continue;
            };
            if argument.pass_by != param.pass_by {
                self.report(*range, "Argument modifier types do not match".to_string());
            }
            let arg_expr = argument_exprs[i];
            let arg_type = self.type_of(arg_expr);
            match conversions::try_convert_scored(&arg_type, &param.ty) {
                Some((_, conversion)) => self.rewrite_argument(arg_expr, &conversion),
                None => self.report(*range, "Argument types do not match".to_string()),
            }
        }
    }

    fn rewrite_argument(&mut self, argument: ExprId, conversion: &ParameterConversion) {
        if !conversion.requires_conversion {
            return;
        }
        let inner = match &self.arena.expr(argument).kind {
            ExprKind::Argument { expression, .. } => *expression,
            _ => return,
        };
        let converted = self.apply_conversion(inner, conversion);
        if let ExprKind::Argument { expression, .. } = &mut self.arena.exprs[argument.0 as usize].kind
        {
            *expression = converted;
        }
    }

    /// Candidate selection over a parameter-count-matched method group:
    /// reject impossible sites (recording reasons), score the rest with
    /// the conversion ladder, take the strict winner, diagnose ties, and
    /// on total failure surface the best-scoring rejection. A call
    /// expression is produced either way so the tree stays walkable.
    fn select_eligible_method(
        &mut self,
        instance: Option<ExprId>,
        group: &MethodGroup,
        arguments: &[(ArgumentNode, TokenRange)],
        checks: SiteChecks,
        range: TokenRange,
    ) -> ExprId {
        let mut possible: Vec<Arc<MethodInfo>> = Vec::with_capacity(group.methods.len());
        let mut rejected: Vec<RejectedCandidate> = Vec::new();

        for candidate in &group.methods {
            if !candidate.is_static() && checks.in_static_context && !checks.instance_receiver {
                rejected.push(RejectedCandidate {
                    method: candidate.clone(),
                    reason: "Cannot access instance method from a static context",
                    points: 0,
                    scored: false,
                });
                continue;
            }
            if candidate.is_static() && checks.instance_receiver {
                rejected.push(RejectedCandidate {
                    method: candidate.clone(),
                    reason: "Cannot access static method through an instance",
                    points: 0,
                    scored: false,
                });
                continue;
            }
            if candidate.modifiers.contains(Modifiers::PRIVATE) && !checks.can_be_private {
                rejected.push(RejectedCandidate {
                    method: candidate.clone(),
                    reason: "Cannot access private method here",
                    points: 0,
                    scored: false,
                });
                continue;
            }
            if candidate.modifiers.contains(Modifiers::INTERNAL) && !checks.can_be_internal {
                rejected.push(RejectedCandidate {
                    method: candidate.clone(),
                    reason: "Cannot access internal method here",
                    points: 0,
                    scored: false,
                });
                continue;
            }
            if candidate.modifiers.contains(Modifiers::PROTECTED) && !checks.can_be_protected {
                rejected.push(RejectedCandidate {
                    method: candidate.clone(),
                    reason: "Cannot access protected method here",
                    points: 0,
                    scored: false,
                });
                continue;
            }

            let modifier_mismatch = candidate
                .parameters
                .iter()
                .zip(arguments.iter())
                .any(|(param, (argument, _))| param.pass_by != argument.pass_by);
            if modifier_mismatch {
                rejected.push(RejectedCandidate {
                    method: candidate.clone(),
                    reason: "Parameter modifier type does not match",
                    points: 0,
                    scored: false,
                });
                continue;
            }

            possible.push(candidate.clone());
        }

        // visit each argument once; use a common target type where every
        // remaining candidate agrees on the parameter type
        let argument_exprs: Vec<ExprId> = arguments
            .iter()
            .enumerate()
            .map(|(i, (argument, arg_range))| {
                let common = possible.first().and_then(|first| {
                    let ty = first.parameters.get(i).map(|p| p.ty.clone())?;
                    let all_agree = possible
                        .iter()
                        .all(|m| m.parameters.get(i).map(|p| p.ty == ty).unwrap_or(false));
                    all_agree.then_some(ty)
                });
                self.visit_argument(common.as_ref(), argument, *arg_range)
            })
            .collect();

        let argument_types: Vec<ResolvedType> = argument_exprs
            .iter()
            .map(|id| self.type_of(*id))
            .collect();

        let mut winner: Option<usize> = None;
        let mut winner_points = i32::MIN;
        let mut winner_conversions: Vec<ParameterConversion> = Vec::new();
        let mut is_ambiguous = false;

        for (candidate_index, candidate) in possible.iter().enumerate() {
            let mut points = 0;
            let mut conversions_for_candidate = Vec::with_capacity(arguments.len());
            let mut valid = true;

            for (arg_type, param) in argument_types.iter().zip(candidate.parameters.iter()) {
                match conversions::try_convert_scored(arg_type, &param.ty) {
                    Some((score, conversion)) => {
                        points += score;
                        conversions_for_candidate.push(conversion);
                    }
                    None => {
                        valid = false;
                        rejected.push(RejectedCandidate {
                            method: candidate.clone(),
                            reason: "Cannot convert parameter type",
                            points,
                            scored: true,
                        });
                        break;
                    }
                }
            }

            if !valid {
                continue;
            }

            if points > winner_points {
                winner_points = points;
                winner = Some(candidate_index);
                winner_conversions = conversions_for_candidate;
                is_ambiguous = false;
            } else if points == winner_points && winner.is_some() {
                is_ambiguous = true;
            }
        }

        if let Some(winner_index) = winner {
            if is_ambiguous {
                self.report(range, format!("Ambiguous method call `{}`", group.name));
            }
            let method = possible[winner_index].clone();
            for (argument, conversion) in argument_exprs.iter().zip(winner_conversions.iter()) {
                self.rewrite_argument(*argument, conversion);
            }
            return self.make_call(instance, method, argument_exprs, range);
        }

        // no candidate survived: surface the best-scoring rejection
        for rejection in rejected.iter_mut().filter(|r| !r.scored) {
            let mut points = 0;
            for (arg_type, param) in argument_types.iter().zip(rejection.method.parameters.iter())
            {
                match conversions::try_convert_scored(arg_type, &param.ty) {
                    Some((score, _)) => points += score,
                    None => break,
                }
            }
            rejection.points = points;
            rejection.scored = true;
        }

        let best = rejected.iter().max_by_key(|r| r.points);
        match best {
            Some(best) => {
                self.report(range, best.reason.to_string());
                let method = best.method.clone();
                self.make_call(instance, method, argument_exprs, range)
            }
            None => self.semantic_error(range),
        }
    }

    fn make_call(
        &mut self,
        instance: Option<ExprId>,
        method: Arc<MethodInfo>,
        arguments: Vec<ExprId>,
        range: TokenRange,
    ) -> ExprId {
        if method.is_static() {
            self.arena.alloc(ExprKind::StaticCall { method, arguments }, range)
        } else {
            self.arena.alloc(
                ExprKind::InstanceCall {
                    instance,
                    method,
                    arguments,
                },
                range,
            )
        }
    }
}
