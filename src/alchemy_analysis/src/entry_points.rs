use std::collections::HashSet;
use std::sync::Arc;

use alchemy_jobs::{Job, JobContext, JobHandle};
use alchemy_syntax::Modifiers;
use parking_lot::Mutex;

use crate::diagnostics::Diagnostics;
use crate::file_info::FileInfo;
use crate::member_info::MethodInfo;
use crate::type_info::TypeClass;

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub method: Arc<MethodInfo>,
}

struct PatternLookup {
    fully_qualified_name: String,
    package_name: String,
    method_name: Option<String>,
}

/// Matches entry-point patterns (`[Package::...::]Name[.Method]`) against
/// exported class methods. Runs once, concurrently with member
/// resolution; it only needs the gather phase's type identities.
pub struct FindEntryPointsJob {
    pub root_package: String,
    pub files: Arc<Vec<Arc<FileInfo>>>,
    pub patterns: Vec<String>,
    pub output: Arc<Mutex<Vec<EntryPoint>>>,
    pub diagnostics: Arc<Diagnostics>,
    /// Member tables must be published before the scan; while the gate is
    /// open this job helps drain the resolve phase instead of blocking.
    pub after: Option<JobHandle>,
}

impl FindEntryPointsJob {
    /// Split at the first `::...::` run for the package (defaulting to the
    /// root package) and at the first `.` for an optional method name.
    fn parse_pattern(&self, pattern: &str) -> PatternLookup {
        let (type_part, method_name) = match pattern.find('.') {
            Some(dot) => (&pattern[..dot], Some(pattern[dot + 1..].to_string())),
            None => (pattern, None),
        };

        match type_part.find("::") {
            Some(separator) => PatternLookup {
                fully_qualified_name: type_part.to_string(),
                package_name: type_part[..separator].to_string(),
                method_name,
            },
            None => PatternLookup {
                fully_qualified_name: format!("{}::{type_part}", self.root_package),
                package_name: self.root_package.clone(),
                method_name,
            },
        }
    }
}

impl Job for FindEntryPointsJob {
    fn execute(&self, ctx: &JobContext) {
        if let Some(gate) = &self.after {
            ctx.wait(gate);
        }

        // dedup by method identity so duplicated patterns stay harmless
        let mut seen: HashSet<usize> = HashSet::new();
        let mut found = Vec::new();

        let lookups: Vec<PatternLookup> =
            self.patterns.iter().map(|p| self.parse_pattern(p)).collect();

        for lookup in &lookups {
            for file in self.files.iter() {
                if file.package != lookup.package_name {
                    continue;
                }

                let declared = file.declared_types.read().clone();
                for declared_type in &declared {
                    if declared_type.fully_qualified_name != lookup.fully_qualified_name {
                        continue;
                    }

                    let location = {
                        let tree_guard = file.tree.read();
                        tree_guard
                            .as_ref()
                            .map(|parse| parse.tree.location_from_node(declared_type.node))
                            .unwrap_or_default()
                    };

                    if !declared_type.modifiers.contains(Modifiers::EXPORT) {
                        self.diagnostics.error(
                            &file.path_string(),
                            location,
                            format!(
                                "Entry points must be marked as `export`. {} is not marked as exported but is requested as an entry point",
                                declared_type.fully_qualified_name
                            ),
                        );
                        continue;
                    }

                    if !declared_type.generic_args.is_empty() {
                        self.diagnostics.error(
                            &file.path_string(),
                            location,
                            format!(
                                "Generic types cannot be used as entry points, {}",
                                declared_type.fully_qualified_name
                            ),
                        );
                        continue;
                    }

                    if declared_type.type_class != TypeClass::Class {
                        self.diagnostics.error(
                            &file.path_string(),
                            location,
                            format!(
                                "Only class types can be used as entry points, {} is not a class",
                                declared_type.fully_qualified_name
                            ),
                        );
                        continue;
                    }

                    let Some(members) = declared_type.members() else {
                        continue;
                    };

                    match &lookup.method_name {
                        None => {
                            // first exported method wins
                            for method in &members.methods {
                                if method.is_optional_parameter_prototype {
                                    continue;
                                }
                                if !method.modifiers.contains(Modifiers::EXPORT) {
                                    continue;
                                }
                                if seen.insert(Arc::as_ptr(method) as usize) {
                                    found.push(EntryPoint {
                                        method: method.clone(),
                                    });
                                }
                                break;
                            }
                        }
                        Some(method_name) => {
                            for method in &members.methods {
                                if method.is_optional_parameter_prototype
                                    || method.name != *method_name
                                {
                                    continue;
                                }
                                if !method.modifiers.contains(Modifiers::EXPORT) {
                                    self.diagnostics.error(
                                        &file.path_string(),
                                        location,
                                        "Method must be marked `export` in order to be used as an entry point"
                                            .to_string(),
                                    );
                                    continue;
                                }
                                if seen.insert(Arc::as_ptr(method) as usize) {
                                    found.push(EntryPoint {
                                        method: method.clone(),
                                    });
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.output.lock().extend(found);
    }
}
