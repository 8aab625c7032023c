//! Semantic analysis for the Alchemy compiler.
//!
//! The pipeline is a DAG of jobs over the file list:
//! `ParseFiles -> GatherTypes -> (ResolveMembers || FindEntryPoints) ->
//! ConstructExpressionTrees -> GatherCodeGenEntries*`. Every phase except
//! the last two is a batched parallel-for over `FileInfo`; reachable-code
//! discovery fans out dynamically, one job per entry-point method.
//!
//! Phase boundaries are global happens-before edges: when the await on
//! phase K returns, every write performed by any phase-K job is visible to
//! phase K+1 on any worker. Member tables are published through
//! write-once cells at the resolve-members boundary, so the hot lookup
//! paths after that run without locks.

pub mod builtins;
pub mod codegen;
pub mod compiler;
pub mod conversions;
pub mod diagnostics;
pub mod entry_points;
pub mod expr;
pub mod file_info;
pub mod gather_types;
pub mod generic_cache;
pub mod introspect;
pub mod member_info;
pub mod resolve_members;
pub mod resolved_type;
pub mod type_info;
pub mod type_resolver;
pub mod util;

pub use builtins::BuiltIns;
pub use compiler::{CompileError, CompileResult, Compiler, CompilerOptions, PackageRoot};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use entry_points::EntryPoint;
pub use file_info::{FileId, FileInfo, NO_FILE};
pub use generic_cache::GenericTypeCache;
pub use member_info::{FieldInfo, MethodGroup, MethodInfo, ParameterInfo, PropertyInfo};
pub use resolved_type::{ResolvedType, ResolvedTypeFlags};
pub use type_info::{ResolveMap, TypeClass, TypeInfo, TypeInfoFlags, TypeMembers};
