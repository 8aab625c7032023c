use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alchemy_jobs::{Job, JobContext, Parallel};
use alchemy_syntax::{BuiltInType, LiteralData};
use parking_lot::Mutex;

use crate::builtins::BuiltIns;
use crate::expr::{ExprArena, ExprId, ExprKind, MethodBody, ScopeId};
use crate::file_info::{FileId, FileInfo};
use crate::member_info::{ConstructorInfo, IndexerInfo, MethodInfo, PropertyInfo};
use crate::resolved_type::ResolvedType;
use crate::util::encode_ptr_base32;

/// What a code-gen fan-out job visits.
#[derive(Clone)]
pub enum VisitEntry {
    Type(ResolvedType),
    Method(Arc<MethodInfo>),
    Property(Arc<PropertyInfo>),
    Indexer(Arc<IndexerInfo>),
    Constructor(Arc<ConstructorInfo>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeGenOutputKind {
    Type,
    MethodSignature,
    MethodImplementation,
}

#[derive(Debug, Clone)]
pub struct CodeGenOutput {
    pub kind: CodeGenOutputKind,
    pub text: String,
}

/// Per-worker output slots; each worker appends to its own and the driver
/// unions the touched-type sets at the end.
#[derive(Default)]
pub struct WorkerOutputs {
    pub outputs: Mutex<Vec<CodeGenOutput>>,
    pub touched_types: Mutex<HashSet<ResolvedType>>,
}

pub struct CodeGenShared {
    pub workers: Vec<WorkerOutputs>,
    pub builtins: Arc<BuiltIns>,
    files_by_id: HashMap<FileId, Arc<FileInfo>>,
}

impl CodeGenShared {
    pub fn new(
        worker_count: usize,
        files: &[Arc<FileInfo>],
        builtins: Arc<BuiltIns>,
    ) -> CodeGenShared {
        CodeGenShared {
            workers: (0..worker_count).map(|_| WorkerOutputs::default()).collect(),
            builtins,
            files_by_id: files.iter().map(|f| (f.file_id, f.clone())).collect(),
        }
    }

    pub fn file_by_id(&self, id: FileId) -> Option<&Arc<FileInfo>> {
        self.files_by_id.get(&id)
    }

    pub fn union_touched_types(&self) -> HashSet<ResolvedType> {
        let mut union = HashSet::new();
        for worker in &self.workers {
            union.extend(worker.touched_types.lock().iter().cloned());
        }
        union
    }

    pub fn collect_outputs(&self) -> Vec<CodeGenOutput> {
        let mut outputs = Vec::new();
        for worker in &self.workers {
            outputs.extend(worker.outputs.lock().iter().cloned());
        }
        outputs
    }
}

/// Visits one reachable entry, emitting its text and scheduling a child
/// job for every method it references whose `has_code_gen` flag it wins.
pub struct GatherCodeGenEntriesJob {
    pub entry: VisitEntry,
    pub shared: Arc<CodeGenShared>,
}

impl Job for GatherCodeGenEntriesJob {
    fn execute(&self, ctx: &JobContext) {
        let slot = &self.shared.workers[ctx.worker_id().min(self.shared.workers.len() - 1)];
        let mut emitter = Emitter {
            shared: &self.shared,
            slot,
            ctx,
            buffer: String::new(),
        };

        match &self.entry {
            VisitEntry::Method(method) => {
                let signature = emitter.make_forward_declaration(method);
                slot.outputs.lock().push(CodeGenOutput {
                    kind: CodeGenOutputKind::MethodSignature,
                    text: signature,
                });
                let implementation = emitter.trace_method(method);
                slot.outputs.lock().push(CodeGenOutput {
                    kind: CodeGenOutputKind::MethodImplementation,
                    text: implementation,
                });
            }
            VisitEntry::Type(resolved) => {
                let text = emitter.trace_type(resolved);
                if !text.is_empty() {
                    slot.outputs.lock().push(CodeGenOutput {
                        kind: CodeGenOutputKind::Type,
                        text,
                    });
                }
            }
            // properties, indexers and constructors ride along with their
            // declaring type today
            VisitEntry::Property(_) | VisitEntry::Indexer(_) | VisitEntry::Constructor(_) => {}
        }
    }
}

struct Emitter<'a, 'c> {
    shared: &'a Arc<CodeGenShared>,
    slot: &'a WorkerOutputs,
    ctx: &'a JobContext<'c>,
    buffer: String,
}

impl Emitter<'_, '_> {
    fn add_type(&self, resolved: &ResolvedType) {
        if resolved.is_void() {
            return;
        }
        self.slot.touched_types.lock().insert(resolved.clone());
    }

    /// CAS gate: the winner schedules the method's visit job.
    fn add_method(&self, method: &Arc<MethodInfo>) {
        if method.try_begin_code_gen() {
            self.ctx.schedule(
                Parallel::single(),
                GatherCodeGenEntriesJob {
                    entry: VisitEntry::Method(method.clone()),
                    shared: self.shared.clone(),
                },
            );
        }
    }

    fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// `Type_Method_genArity_paramCount_base32(ptr)`
    fn write_method_name(&mut self, method: &Arc<MethodInfo>) {
        let type_name = method
            .declaring_type
            .upgrade()
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let encoded = encode_ptr_base32(Arc::as_ptr(method));
        let text = format!(
            "{type_name}_{}_{}_{}_{encoded}",
            method.name,
            method.generic_params.len(),
            method.parameters.len()
        );
        self.write(&text);
    }

    fn write_type(&mut self, resolved: &ResolvedType, emit_struct_keyword: bool) {
        if resolved.is_void() {
            self.write("void");
            return;
        }

        if emit_struct_keyword
            && (resolved.is_nullable() || resolved.is_array() || !resolved.is_primitive())
        {
            self.write("struct ");
        }

        if resolved.is_nullable() {
            self.write("nullable_");
        }

        match resolved.built_in {
            BuiltInType::Invalid => match &resolved.type_info {
                Some(info) => {
                    let encoded = encode_ptr_base32(Arc::as_ptr(info));
                    let text =
                        format!("{}_{}_{encoded}", info.name, info.generic_argument_count());
                    self.write(&text);
                }
                None => self.write("void"),
            },
            BuiltInType::Int8 => self.write("int8"),
            BuiltInType::Int16 => self.write("int16"),
            BuiltInType::Int32 => self.write("int32"),
            BuiltInType::Int64 => self.write("int64"),
            BuiltInType::UInt8 => self.write("uint8"),
            BuiltInType::UInt16 => self.write("uint16"),
            BuiltInType::UInt32 => self.write("uint32"),
            BuiltInType::UInt64 => self.write("uint64"),
            BuiltInType::Float => self.write("float"),
            BuiltInType::Double => self.write("double"),
            BuiltInType::Bool => self.write("bool"),
            BuiltInType::Char => self.write("unsigned char"),
            other => self.write(other.as_str()),
        }

        if resolved.is_array() {
            self.write("_array");
        }
    }

    fn make_signature(&mut self, method: &Arc<MethodInfo>) {
        let return_type = method.return_type.clone();
        self.write_type(&return_type, true);
        self.write(" ");
        self.write_method_name(method);
        self.write("(");

        if !method.is_static() {
            if let Some(declaring) = method.declaring_type.upgrade() {
                let this_type = ResolvedType::from_type(declaring);
                self.write_type(&this_type, true);
            }
            self.write("* pThis");
            if !method.parameters.is_empty() {
                self.write(", ");
            }
        }

        for (index, parameter) in method.parameters.iter().enumerate() {
            let ty = parameter.ty.clone();
            self.write_type(&ty, true);
            if parameter.pass_by != alchemy_syntax::PassBy::None {
                self.write("*");
            }
            self.write(" ");
            self.write(&parameter.name);
            if index != method.parameters.len() - 1 {
                self.write(", ");
            }
        }

        self.write(")");
    }

    fn make_forward_declaration(&mut self, method: &Arc<MethodInfo>) -> String {
        self.add_type(&method.return_type);
        if let Some(declaring) = method.declaring_type.upgrade() {
            self.add_type(&ResolvedType::from_type(declaring));
        }
        for parameter in &method.parameters {
            self.add_type(&parameter.ty);
        }
        self.make_signature(method);
        self.write(";");
        self.take()
    }

    fn find_body(&self, method: &Arc<MethodInfo>) -> Option<(Arc<FileInfo>, u32, u32)> {
        let declaring = method.declaring_type.upgrade()?;
        let file = self.shared.file_by_id(declaring.declaring_file_id)?.clone();
        let body_index = method
            .prototype
            .as_ref()
            .map(|p| p.member_index)
            .unwrap_or(method.member_index);
        Some((file, declaring.decl_slot, body_index))
    }

    fn trace_method(&mut self, method: &Arc<MethodInfo>) -> String {
        self.make_signature(method);
        self.write(" {\n");

        if let Some((file, type_slot, method_slot)) = self.find_body(method) {
            let bodies = file.bodies.read();
            let body = bodies
                .get(type_slot as usize)
                .and_then(|t| t.methods.get(method_slot as usize))
                .and_then(|b| b.as_ref());
            if let Some(body) = body {
                self.trace_scope(body, body.root_scope, 1);
            }
        }

        self.write("}\n");
        self.take()
    }

    fn write_indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.write("    ");
        }
    }

    fn trace_scope(&mut self, body: &MethodBody, scope: ScopeId, depth: usize) {
        let statements = body.arena.scope(scope).statements.clone();
        for statement in statements {
            self.write_indent(depth);
            self.trace_expr(body, statement, depth);
            self.write(";\n");
        }
    }

    /// Emit an expression while recording every referenced type and
    /// scheduling every newly-reached method.
    fn trace_expr(&mut self, body: &MethodBody, id: ExprId, depth: usize) {
        let arena: &ExprArena = &body.arena;
        match &arena.expr(id).kind {
            ExprKind::Vep(vep) => {
                let name = arena.vep(*vep).name.clone();
                self.write(&name);
            }
            ExprKind::FieldAccess { instance, field } => {
                if let Some(instance) = instance {
                    self.trace_expr(body, *instance, depth);
                    self.write(".");
                }
                self.add_type(&field.ty);
                let name = field.name.clone();
                self.write(&name);
            }
            ExprKind::PropertyAccess { instance, property } => {
                if let Some(instance) = instance {
                    self.trace_expr(body, *instance, depth);
                    self.write(".");
                }
                self.add_type(&property.ty);
                let name = property.name.clone();
                self.write(&name);
            }
            ExprKind::IndexerAccess {
                instance,
                indexer,
                arguments,
            } => {
                self.add_type(&indexer.ty);
                self.trace_expr(body, *instance, depth);
                self.write("[");
                for (i, argument) in arguments.iter().enumerate() {
                    if i != 0 {
                        self.write(", ");
                    }
                    self.trace_expr(body, *argument, depth);
                }
                self.write("]");
            }
            ExprKind::ArrayIndex { array, index } => {
                self.trace_expr(body, *array, depth);
                self.write("[");
                self.trace_expr(body, *index, depth);
                self.write("]");
            }
            ExprKind::MethodGroupAccess { group, .. } => {
                let name = group.name.clone();
                self.write(&name);
            }
            ExprKind::NumericLiteral { value } => {
                let text = match value {
                    LiteralData::Int32(v) => v.to_string(),
                    LiteralData::Int64(v) => v.to_string(),
                    LiteralData::UInt32(v) => v.to_string(),
                    LiteralData::UInt64(v) => v.to_string(),
                    LiteralData::Float(v) => format!("{v}f"),
                    LiteralData::Double(v) => v.to_string(),
                    _ => "0".to_string(),
                };
                self.write(&text);
            }
            ExprKind::BoolLiteral { value } => {
                self.write(if *value { "true" } else { "false" });
            }
            ExprKind::NullLiteral { .. } => self.write("0"),
            ExprKind::DefaultLiteral { ty } => {
                self.add_type(ty);
                self.write("{0}");
            }
            ExprKind::DirectCast { expression, ty } => {
                self.add_type(ty);
                self.write("(");
                let cast_type = ty.clone();
                self.write_type(&cast_type, false);
                self.write(")");
                self.trace_expr(body, *expression, depth);
            }
            ExprKind::Arithmetic { lhs, op, rhs } | ExprKind::VectorArithmetic { lhs, op, rhs } => {
                let symbol = match op {
                    crate::expr::ArithmeticOp::Add => "+",
                    crate::expr::ArithmeticOp::Subtract => "-",
                    crate::expr::ArithmeticOp::Multiply => "*",
                    crate::expr::ArithmeticOp::Divide => "/",
                    crate::expr::ArithmeticOp::Modulus => "%",
                };
                self.trace_expr(body, *lhs, depth);
                self.write(&format!(" {symbol} "));
                self.trace_expr(body, *rhs, depth);
            }
            ExprKind::Comparison { lhs, op, rhs } => {
                let symbol = match op {
                    crate::expr::ComparisonOp::GreaterThan => ">",
                    crate::expr::ComparisonOp::LessThan => "<",
                    crate::expr::ComparisonOp::GreaterThanOrEqual => ">=",
                    crate::expr::ComparisonOp::LessThanOrEqual => "<=",
                };
                self.trace_expr(body, *lhs, depth);
                self.write(&format!(" {symbol} "));
                self.trace_expr(body, *rhs, depth);
            }
            ExprKind::Equality { lhs, op, rhs } => {
                let symbol = match op {
                    crate::expr::EqualityOp::Equal => "==",
                    crate::expr::EqualityOp::NotEqual => "!=",
                };
                self.trace_expr(body, *lhs, depth);
                self.write(&format!(" {symbol} "));
                self.trace_expr(body, *rhs, depth);
            }
            ExprKind::Conditional { lhs, op, rhs } => {
                let symbol = match op {
                    crate::expr::ConditionalOp::And => "&&",
                    crate::expr::ConditionalOp::Or => "||",
                };
                self.trace_expr(body, *lhs, depth);
                self.write(&format!(" {symbol} "));
                self.trace_expr(body, *rhs, depth);
            }
            ExprKind::Argument { pass_by, expression } => {
                if *pass_by != alchemy_syntax::PassBy::None {
                    self.write("&");
                }
                self.trace_expr(body, *expression, depth);
            }
            ExprKind::StaticCall { method, arguments } => {
                let method = method.clone();
                self.add_method(&method);
                self.write_method_name(&method);
                self.write("(");
                for (i, argument) in arguments.iter().enumerate() {
                    if i != 0 {
                        self.write(", ");
                    }
                    self.trace_expr(body, *argument, depth);
                }
                self.write(")");
            }
            ExprKind::InstanceCall {
                instance,
                method,
                arguments,
            } => {
                let method = method.clone();
                if let Some(instance) = instance {
                    let instance_type = arena.type_of(*instance, &self.shared.builtins);
                    self.add_type(&instance_type);
                }
                self.add_method(&method);
                self.write_method_name(&method);
                self.write("(");
                if let Some(instance) = instance {
                    self.write("&");
                    self.trace_expr(body, *instance, depth);
                    if !arguments.is_empty() {
                        self.write(", ");
                    }
                }
                for (i, argument) in arguments.iter().enumerate() {
                    if i != 0 {
                        self.write(", ");
                    }
                    self.trace_expr(body, *argument, depth);
                }
                self.write(")");
            }
            ExprKind::Assign { lhs, rhs } => {
                self.trace_expr(body, *lhs, depth);
                self.write(" = ");
                self.trace_expr(body, *rhs, depth);
            }
            ExprKind::DeclareLocal { vep, initializer } => {
                let vep = arena.vep(*vep).clone();
                self.add_type(&vep.ty);
                self.write_type(&vep.ty, true);
                self.write(" ");
                self.write(&vep.name);
                if let Some(initializer) = initializer {
                    self.write(" = ");
                    self.trace_expr(body, *initializer, depth);
                }
            }
            ExprKind::Return { expression } => {
                self.write("return");
                if let Some(expression) = expression {
                    self.write(" ");
                    self.trace_expr(body, *expression, depth);
                }
            }
            ExprKind::NullableHasValue { expression } => {
                self.trace_expr(body, *expression, depth);
                self.write(".hasValue");
            }
            ExprKind::NullableValue { expression } => {
                self.trace_expr(body, *expression, depth);
                self.write(".value");
            }
            ExprKind::If {
                conditions,
                body: if_body,
                else_branch,
            } => {
                self.write("if (");
                for (i, condition) in conditions.iter().enumerate() {
                    if i != 0 {
                        self.write(" && ");
                    }
                    self.trace_expr(body, *condition, depth);
                }
                self.write(") {\n");
                self.trace_scope(body, *if_body, depth + 1);
                self.write_indent(depth);
                self.write("}");
                if let Some(else_branch) = else_branch {
                    self.write(" else ");
                    self.trace_expr(body, *else_branch, depth);
                }
            }
            ExprKind::ScopeBlock { scope } => {
                self.write("{\n");
                self.trace_scope(body, *scope, depth + 1);
                self.write_indent(depth);
                self.write("}");
            }
            ExprKind::SemanticError => self.write("/* error */"),
        }
    }

    /// Struct definition for a touched type; member types feed the next
    /// emission round's set.
    fn trace_type(&mut self, resolved: &ResolvedType) -> String {
        if resolved.is_primitive() || resolved.is_array() || resolved.is_nullable() {
            return String::new();
        }
        let Some(info) = &resolved.type_info else {
            return String::new();
        };
        let Some(members) = info.members() else {
            return String::new();
        };

        self.write("struct ");
        self.write_type(resolved, false);
        self.write(" {\n");
        for field in &members.fields {
            self.add_type(&field.ty);
            self.write("    ");
            let ty = field.ty.clone();
            self.write_type(&ty, true);
            self.write(" ");
            let name = field.name.clone();
            self.write(&name);
            self.write(";\n");
        }
        for property in &members.properties {
            self.add_type(&property.ty);
            if !property.is_backed() {
                continue;
            }
            self.write("    ");
            let ty = property.ty.clone();
            self.write_type(&ty, true);
            self.write(" ");
            let name = property.name.clone();
            self.write(&name);
            self.write(";\n");
        }
        self.write("};\n");
        self.take()
    }
}

/// Parallel-for over the union of touched types, emitting their struct
/// definitions.
pub struct EmitTypesJob {
    pub types: Arc<Vec<ResolvedType>>,
    pub shared: Arc<CodeGenShared>,
}

impl Job for EmitTypesJob {
    fn execute_index(&self, ctx: &JobContext, index: u32) {
        let job = GatherCodeGenEntriesJob {
            entry: VisitEntry::Type(self.types[index as usize].clone()),
            shared: self.shared.clone(),
        };
        job.execute(ctx);
    }
}
