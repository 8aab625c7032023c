use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alchemy_syntax::ParseResult;
use fixedbitset::FixedBitSet;
use parking_lot::{Mutex, RwLock};

use crate::expr::MethodBody;
use crate::type_info::TypeInfo;

pub type FileId = u32;

/// Sentinel for synthesized types that have no declaring file.
pub const NO_FILE: FileId = u32::MAX;

#[derive(Debug, Clone)]
pub struct UsingAlias {
    pub name: String,
    pub target: Arc<TypeInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct FileUsings {
    /// The file's package is implicitly the first entry.
    pub namespaces: Vec<String>,
    pub aliases: Vec<UsingAlias>,
}

/// Method bodies for one declared type, indexed by the method's member
/// index. Only methods without a `prototype` link get a body of their own;
/// expanded arity methods share their prototype's.
#[derive(Debug, Default)]
pub struct TypeBodies {
    pub methods: Vec<Option<MethodBody>>,
}

/// Per-file state. Created the first time a path is seen, destroyed when
/// the path disappears between compile runs. Each phase writes its own
/// section (tree, declared types, usings, bodies) while it exclusively
/// owns the file's job; later phases read behind the phase barrier.
#[derive(Debug)]
pub struct FileInfo {
    pub file_id: FileId,
    pub package: String,
    pub path: PathBuf,
    last_edit: AtomicU64,
    was_changed: AtomicBool,
    pub tree: RwLock<Option<ParseResult>>,
    pub declared_types: RwLock<Vec<Arc<TypeInfo>>>,
    pub usings: RwLock<FileUsings>,
    pub bodies: RwLock<Vec<TypeBodies>>,
    /// Bit `b` set <=> this file references a type declared in file `b`.
    /// Monotonic within a compile run.
    dependencies: Mutex<FixedBitSet>,
}

impl FileInfo {
    pub fn new(file_id: FileId, package: String, path: PathBuf, last_edit: u64) -> FileInfo {
        FileInfo {
            file_id,
            package,
            path,
            last_edit: AtomicU64::new(last_edit),
            was_changed: AtomicBool::new(true),
            tree: RwLock::new(None),
            declared_types: RwLock::new(Vec::new()),
            usings: RwLock::new(FileUsings::default()),
            bodies: RwLock::new(Vec::new()),
            dependencies: Mutex::new(FixedBitSet::new()),
        }
    }

    pub fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    pub fn last_edit(&self) -> u64 {
        self.last_edit.load(Ordering::Acquire)
    }

    pub fn set_last_edit(&self, value: u64) {
        self.last_edit.store(value, Ordering::Release);
    }

    pub fn was_changed(&self) -> bool {
        self.was_changed.load(Ordering::Acquire)
    }

    pub fn set_was_changed(&self, value: bool) {
        self.was_changed.store(value, Ordering::Release);
    }

    /// Drop everything derived from the file's content. Used for deleted
    /// files, edited files, and files invalidated through the dependency
    /// closure; the next run re-parses and re-analyzes from scratch.
    pub fn invalidate(&self) {
        *self.tree.write() = None;
        self.declared_types.write().clear();
        *self.usings.write() = FileUsings::default();
        self.bodies.write().clear();
        self.dependencies.lock().clear();
    }

    /// Grow the dependency bitmap so every live file id has a bit.
    pub fn ensure_file_capacity(&self, file_count: usize) {
        self.dependencies.lock().grow(file_count);
    }

    pub fn add_file_reference(&self, file_id: FileId) {
        if file_id == NO_FILE {
            return;
        }
        let mut deps = self.dependencies.lock();
        if deps.len() <= file_id as usize {
            deps.grow(file_id as usize + 1);
        }
        deps.insert(file_id as usize);
    }

    pub fn references_file(&self, file_id: FileId) -> bool {
        self.dependencies.lock().contains(file_id as usize)
    }

    pub fn dependency_snapshot(&self) -> FixedBitSet {
        self.dependencies.lock().clone()
    }

    pub fn depends_on_any(&self, changed: &FixedBitSet) -> bool {
        let deps = self.dependencies.lock();
        deps.intersection(changed).next().is_some()
    }
}
