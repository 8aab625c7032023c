use std::sync::Arc;

use alchemy_syntax::parse_types::BUILT_IN_TYPE_COUNT;
use alchemy_syntax::BuiltInType;

use crate::resolved_type::{ResolvedType, ResolvedTypeFlags};
use crate::type_info::{synthesize_builtin, ResolveMap, TypeInfo, TypeInfoFlags};

/// The `System::*` built-in table. Bound once after GatherTypes: names the
/// source packages declared are picked up from the resolve map, the rest
/// are synthesized and registered so resolution stays uniform. Read-only
/// for the remainder of the run.
#[derive(Debug)]
pub struct BuiltIns {
    table: Vec<Option<Arc<TypeInfo>>>,
}

impl BuiltIns {
    pub fn bind(resolve_map: &ResolveMap) -> BuiltIns {
        BuiltIns::bind_with_previous(resolve_map, None)
    }

    /// `previous` keeps synthesized records identical across compile
    /// runs, so member types held by unchanged files still compare equal
    /// to freshly resolved uses.
    pub fn bind_with_previous(resolve_map: &ResolveMap, previous: Option<&BuiltIns>) -> BuiltIns {
        let mut table = vec![None; BUILT_IN_TYPE_COUNT];

        for built_in in BuiltInType::all() {
            if built_in == BuiltInType::Void {
                continue;
            }
            let fqn = built_in.fully_qualified_name();
            let info = match resolve_map.get(fqn) {
                Some(info) => info,
                None => {
                    let info = previous
                        .and_then(|p| p.get(built_in))
                        .unwrap_or_else(|| synthesize_builtin(built_in.as_str(), fqn));
                    // binding runs between phases, single-threaded, so a
                    // racing source declaration is impossible here
                    let _ = resolve_map.try_insert(fqn, info.clone());
                    info
                }
            };
            if built_in.is_primitive() {
                info.add_flags(TypeInfoFlags::IS_PRIMITIVE);
            }
            table[built_in as usize] = Some(info);
        }

        BuiltIns { table }
    }

    /// Table for tests that never touch a resolve map.
    pub fn for_tests() -> BuiltIns {
        BuiltIns::bind(&ResolveMap::new())
    }

    pub fn get(&self, built_in: BuiltInType) -> Option<Arc<TypeInfo>> {
        self.table.get(built_in as usize).and_then(|t| t.clone())
    }

    /// A `ResolvedType` for a built-in name, with the table's `TypeInfo`
    /// attached so componentwise equality holds across construction sites.
    pub fn resolved(&self, built_in: BuiltInType) -> ResolvedType {
        if built_in == BuiltInType::Void {
            return ResolvedType::void();
        }
        let mut ty = ResolvedType {
            type_info: self.get(built_in),
            built_in,
            array_rank: 0,
            flags: ResolvedTypeFlags::empty(),
        };
        if built_in.is_vector() {
            ty.flags |= ResolvedTypeFlags::IS_VECTOR;
        }
        ty
    }
}
