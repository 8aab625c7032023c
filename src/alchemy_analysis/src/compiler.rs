use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use alchemy_jobs::{Job, JobContext, JobSystem, Parallel, Pool};
use alchemy_syntax::{AlchemyParser, SourceParser};
use fixedbitset::FixedBitSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::builtins::BuiltIns;
use crate::codegen::{
    CodeGenOutput, CodeGenShared, EmitTypesJob, GatherCodeGenEntriesJob, VisitEntry,
};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::entry_points::{EntryPoint, FindEntryPointsJob};
use crate::file_info::{FileId, FileInfo};
use crate::gather_types::GatherTypesJob;
use crate::generic_cache::GenericTypeCache;
use crate::introspect::ConstructExpressionTreesJob;
use crate::resolve_members::ResolveMembersJob;
use crate::resolved_type::ResolvedType;
use crate::type_info::ResolveMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRoot {
    pub name: String,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Extra worker threads; one more slot is reserved for the submitter.
    pub worker_threads: usize,
    pub source_extension: String,
    pub packages: Vec<PackageRoot>,
    pub root_package: String,
    pub entry_points: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            worker_threads: 0,
            source_extension: ".ax".to_string(),
            packages: Vec::new(),
            root_package: String::new(),
            entry_points: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("package directory `{}` could not be read", .0.display())]
    PackageDirectory(PathBuf),
    #[error("no packages are registered")]
    NoPackages,
}

#[derive(Debug, Default)]
pub struct CompileResult {
    pub diagnostics: Vec<Diagnostic>,
    pub entry_points: Vec<EntryPoint>,
    pub outputs: Vec<CodeGenOutput>,
    pub touched_type_count: usize,
}

/// The compiler: file/package registry plus the phase pipeline. A compile
/// run is an atomic "execute the pipeline to completion" operation; state
/// carried between runs (file records, trees of unchanged files, the
/// generic-type cache) drives incremental invalidation.
pub struct Compiler {
    pub options: CompilerOptions,
    job_system: JobSystem,
    parser: Arc<dyn SourceParser>,
    diagnostics: Arc<Diagnostics>,
    resolve_map: Arc<ResolveMap>,
    generic_cache: Arc<GenericTypeCache>,
    builtins: Option<Arc<BuiltIns>>,
    files: Pool<Arc<FileInfo>>,
    by_path: HashMap<PathBuf, FileId>,
    touched: Vec<FileId>,
    changed: Vec<FileId>,
    added: Vec<PendingFile>,
}

struct PendingFile {
    package: String,
    path: PathBuf,
    last_edit: u64,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Compiler {
        Compiler::with_parser(options, Arc::new(AlchemyParser))
    }

    pub fn with_parser(options: CompilerOptions, parser: Arc<dyn SourceParser>) -> Compiler {
        Compiler {
            job_system: JobSystem::new(options.worker_threads),
            options,
            parser,
            diagnostics: Arc::new(Diagnostics::new()),
            resolve_map: Arc::new(ResolveMap::new()),
            generic_cache: Arc::new(GenericTypeCache::new()),
            builtins: None,
            files: Pool::new(),
            by_path: HashMap::new(),
            touched: Vec::new(),
            changed: Vec::new(),
            added: Vec::new(),
        }
    }

    pub fn add_package(&mut self, name: &str, directory: impl Into<PathBuf>) {
        self.options.packages.push(PackageRoot {
            name: name.to_string(),
            directory: directory.into(),
        });
    }

    pub fn add_entry_point_pattern(&mut self, pattern: &str) {
        self.options.entry_points.push(pattern.to_string());
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn generic_cache(&self) -> &Arc<GenericTypeCache> {
        &self.generic_cache
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Look a type up by fully-qualified name in the resolve map.
    pub fn resolve_type(&self, fully_qualified_name: &str) -> Option<Arc<crate::type_info::TypeInfo>> {
        self.resolve_map.get(fully_qualified_name)
    }

    /// Snapshot of the live file records, ordered by id.
    pub fn files(&self) -> Vec<Arc<FileInfo>> {
        let mut files: Vec<Arc<FileInfo>> = self.files.iter().map(|(_, f)| f.clone()).collect();
        files.sort_by_key(|f| f.file_id);
        files
    }

    /// One full compile run: enumerate packages, diff against the
    /// registry, run the invalidation closure, then execute the phase
    /// pipeline as a single root job.
    pub fn compile(&mut self) -> Result<CompileResult, CompileError> {
        if self.options.packages.is_empty() {
            return Err(CompileError::NoPackages);
        }

        self.diagnostics.clear();
        self.load_packages()?;
        self.setup_compilation_run();

        let mut files: Vec<Arc<FileInfo>> = self.files.iter().map(|(_, f)| f.clone()).collect();
        files.sort_by_key(|f| f.file_id);
        let files = Arc::new(files);

        let root_package = if self.options.root_package.is_empty() {
            self.options
                .packages
                .first()
                .map(|p| p.name.clone())
                .unwrap_or_default()
        } else {
            self.options.root_package.clone()
        };

        let shared = Arc::new(PipelineShared {
            files: files.clone(),
            parser: self.parser.clone(),
            diagnostics: self.diagnostics.clone(),
            resolve_map: self.resolve_map.clone(),
            generic_cache: self.generic_cache.clone(),
            root_package,
            entry_patterns: self.options.entry_points.clone(),
            previous_builtins: self.builtins.clone(),
            bound_builtins: Mutex::new(None),
            entry_points: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            touched_types: Mutex::new(HashSet::new()),
        });

        log::debug!("compiling {} files", files.len());
        self.job_system.execute(
            Parallel::single(),
            PipelineJob {
                shared: shared.clone(),
            },
        );

        self.complete_compilation_run();
        self.builtins = shared.bound_builtins.lock().clone();

        let entry_points = shared.entry_points.lock().clone();
        let outputs = shared.outputs.lock().clone();
        let touched_type_count = shared.touched_types.lock().len();

        Ok(CompileResult {
            diagnostics: self.diagnostics.sorted(),
            entry_points,
            outputs,
            touched_type_count,
        })
    }

    /// Recursive enumeration of every package root. Known paths are
    /// *touched* (and *changed* when the edit stamp moved); unknown paths
    /// are queued as *added*.
    fn load_packages(&mut self) -> Result<(), CompileError> {
        let packages = self.options.packages.clone();
        for package in &packages {
            if !package.directory.is_dir() {
                return Err(CompileError::PackageDirectory(package.directory.clone()));
            }
            self.load_directory(&package.name, &package.directory)?;
        }
        Ok(())
    }

    fn load_directory(&mut self, package: &str, directory: &Path) -> Result<(), CompileError> {
        let pattern = format!("**/*{}", self.options.source_extension);
        let walker = globwalk::GlobWalkerBuilder::new(directory, &pattern)
            .build()
            .map_err(|_| CompileError::PackageDirectory(directory.to_path_buf()))?;

        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry
                .path()
                .canonicalize()
                .unwrap_or_else(|_| entry.path().to_path_buf());
            let last_edit = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);

            match self.by_path.get(&path) {
                Some(&file_id) => {
                    self.touched.push(file_id);
                    if let Some(file) = self.files.get(file_id) {
                        if file.last_edit() != last_edit {
                            file.set_last_edit(last_edit);
                            self.changed.push(file_id);
                        }
                    }
                }
                None => self.added.push(PendingFile {
                    package: package.to_string(),
                    path,
                    last_edit,
                }),
            }
        }
        Ok(())
    }

    /// Between-runs bookkeeping: free deleted files (their ids go back on
    /// the reuse list), mark edited files changed, run the dependency
    /// closure to a fixed point, invalidate the generic cache against the
    /// final changed set, then admit the added files.
    fn setup_compilation_run(&mut self) {
        let slot_count = self
            .files
            .slot_count()
            .max(self.touched.len() + self.added.len());

        let mut touched_map = FixedBitSet::with_capacity(slot_count);
        for &id in &self.touched {
            touched_map.insert(id as usize);
        }

        let mut changed_map = FixedBitSet::with_capacity(slot_count);
        for &id in &self.changed {
            changed_map.insert(id as usize);
            if let Some(file) = self.files.get(id) {
                file.set_was_changed(true);
                file.invalidate();
            }
        }

        // files no longer touched were deleted; free their ids
        let deleted: Vec<FileId> = self
            .files
            .iter()
            .filter(|(id, _)| !touched_map.contains(*id as usize))
            .map(|(id, _)| id)
            .collect();
        for id in deleted {
            changed_map.insert(id as usize);
            if let Some(file) = self.files.remove(id) {
                file.invalidate();
                self.by_path.remove(&file.path);
            }
        }

        // invalidation closure: a file whose dependency bitmap intersects
        // the changed set is itself changed; invalidating clears its
        // bitmap, so the loop reaches a fixed point
        loop {
            let mut invalidated = false;
            for (id, file) in self.files.iter() {
                if changed_map.contains(id as usize) {
                    continue;
                }
                if file.depends_on_any(&changed_map) {
                    changed_map.insert(id as usize);
                    file.invalidate();
                    file.set_was_changed(true);
                    invalidated = true;
                }
            }
            if !invalidated {
                break;
            }
        }

        self.generic_cache.invalidate(&changed_map);

        for pending in self.added.drain(..) {
            let PendingFile {
                package,
                path,
                last_edit,
            } = pending;
            let id = self.files.insert_with(|id| {
                Arc::new(FileInfo::new(id, package, path.clone(), last_edit))
            });
            self.by_path.insert(path, id);
        }

        self.resolve_map.clear();

        // every live file's dependency bitmap must cover every live id
        let capacity = self.files.slot_count();
        for (_, file) in self.files.iter() {
            file.ensure_file_capacity(capacity);
        }

        self.touched.clear();
        self.changed.clear();
    }

    fn complete_compilation_run(&mut self) {
        for (_, file) in self.files.iter() {
            file.set_was_changed(false);
            // surviving method records must be schedulable into code gen
            // again next run
            for type_info in file.declared_types.read().iter() {
                if let Some(members) = type_info.members() {
                    for method in &members.methods {
                        method.reset_code_gen();
                    }
                }
            }
        }
        self.generic_cache.reset_code_gen_flags();
    }
}

struct PipelineShared {
    files: Arc<Vec<Arc<FileInfo>>>,
    parser: Arc<dyn SourceParser>,
    diagnostics: Arc<Diagnostics>,
    resolve_map: Arc<ResolveMap>,
    generic_cache: Arc<GenericTypeCache>,
    root_package: String,
    entry_patterns: Vec<String>,
    previous_builtins: Option<Arc<BuiltIns>>,
    bound_builtins: Mutex<Option<Arc<BuiltIns>>>,
    entry_points: Mutex<Vec<EntryPoint>>,
    outputs: Mutex<Vec<CodeGenOutput>>,
    touched_types: Mutex<HashSet<ResolvedType>>,
}

/// The phase DAG as one root job:
/// `ParseFiles -> GatherTypes -> (ResolveMembers || FindEntryPoints) ->
/// ConstructExpressionTrees -> GatherCodeGenEntries* -> emit types`.
struct PipelineJob {
    shared: Arc<PipelineShared>,
}

impl Job for PipelineJob {
    fn execute(&self, ctx: &JobContext) {
        let cx = &self.shared;
        let file_count = cx.files.len() as u32;

        ctx.run(
            Parallel::batch(file_count, 5),
            ParseFilesJob {
                files: cx.files.clone(),
                parser: cx.parser.clone(),
                diagnostics: cx.diagnostics.clone(),
            },
        );

        ctx.run(
            Parallel::batch(file_count, 1),
            GatherTypesJob {
                files: cx.files.clone(),
                resolve_map: cx.resolve_map.clone(),
                diagnostics: cx.diagnostics.clone(),
            },
        );

        // bind System::* names once the gather phase has registered every
        // declaration; later phases share the snapshot
        let builtins = Arc::new(BuiltIns::bind_with_previous(
            &cx.resolve_map,
            cx.previous_builtins.as_deref(),
        ));
        *cx.bound_builtins.lock() = Some(builtins.clone());

        let entry_points = Arc::new(Mutex::new(Vec::new()));

        let resolve_members = ctx.schedule(
            Parallel::batch(file_count, 1),
            ResolveMembersJob {
                files: cx.files.clone(),
                resolve_map: cx.resolve_map.clone(),
                diagnostics: cx.diagnostics.clone(),
                builtins: builtins.clone(),
                generic_cache: cx.generic_cache.clone(),
            },
        );
        let find_entry_points = ctx.schedule(
            Parallel::single(),
            FindEntryPointsJob {
                root_package: cx.root_package.clone(),
                files: cx.files.clone(),
                patterns: cx.entry_patterns.clone(),
                output: entry_points.clone(),
                diagnostics: cx.diagnostics.clone(),
                after: Some(resolve_members.clone()),
            },
        );
        ctx.wait_all(&[resolve_members, find_entry_points]);

        // instantiations requested mid-phase fill their member tables now
        cx.generic_cache.finalize_pending();

        ctx.run(
            Parallel::single(),
            ConstructExpressionTreesJob {
                files: cx.files.clone(),
                resolve_map: cx.resolve_map.clone(),
                diagnostics: cx.diagnostics.clone(),
                builtins: builtins.clone(),
                generic_cache: cx.generic_cache.clone(),
            },
        );

        // reachable-code fan-out: one job per entry-point method; each
        // visit may schedule further methods it wins the CAS for
        let entry_points: Vec<EntryPoint> = std::mem::take(&mut *entry_points.lock());
        let codegen = Arc::new(CodeGenShared::new(
            ctx.worker_count(),
            &cx.files,
            builtins.clone(),
        ));

        let mut handles = Vec::with_capacity(entry_points.len());
        for entry in &entry_points {
            if !entry.method.try_begin_code_gen() {
                continue;
            }
            handles.push(ctx.schedule(
                Parallel::single(),
                GatherCodeGenEntriesJob {
                    entry: VisitEntry::Method(entry.method.clone()),
                    shared: codegen.clone(),
                },
            ));
        }
        ctx.wait_all(&handles);

        // union the per-worker type sets, then emit struct definitions
        let touched: Vec<ResolvedType> = codegen.union_touched_types().into_iter().collect();
        if !touched.is_empty() {
            ctx.run(
                Parallel::foreach(touched.len() as u32, 8),
                EmitTypesJob {
                    types: Arc::new(touched),
                    shared: codegen.clone(),
                },
            );
        }

        *cx.entry_points.lock() = entry_points;
        *cx.outputs.lock() = codegen.collect_outputs();
        *cx.touched_types.lock() = codegen.union_touched_types();
    }
}

/// Parallel-for over files: parse changed files with the per-worker
/// parser, surfacing parse errors as diagnostics. Unchanged files keep
/// their trees.
struct ParseFilesJob {
    files: Arc<Vec<Arc<FileInfo>>>,
    parser: Arc<dyn SourceParser>,
    diagnostics: Arc<Diagnostics>,
}

impl Job for ParseFilesJob {
    fn execute_range(&self, _ctx: &JobContext, start: u32, end: u32) {
        for index in start..end {
            let file = &self.files[index as usize];
            if !file.was_changed() {
                continue;
            }

            let source = match std::fs::read_to_string(&file.path) {
                Ok(source) => source,
                Err(error) => {
                    self.diagnostics.error(
                        &file.path_string(),
                        Default::default(),
                        format!("Unable to read file: {error}"),
                    );
                    continue;
                }
            };

            let result = self.parser.parse(&source);
            for error in &result.errors {
                let location = result.tree.location_from_offset(error.offset);
                self.diagnostics
                    .error(&file.path_string(), location, error.message.clone());
            }
            *file.tree.write() = Some(result);
        }
    }
}
