use std::collections::HashSet;
use std::sync::{Arc, Weak};

use alchemy_analysis::member_info::FieldInfo;
use alchemy_analysis::type_info::TypeInfoFlags;
use alchemy_analysis::{BuiltIns, GenericTypeCache, ResolvedType, TypeClass, TypeInfo, TypeMembers};
use alchemy_syntax::{BuiltInType, Modifiers, RawNodeIndex};

fn make_open_list(declaring_file: u32) -> Arc<TypeInfo> {
    let t_param = Arc::new(TypeInfo::generic_argument("T", declaring_file, Weak::new()));
    let mut open = TypeInfo::new(
        declaring_file,
        Weak::new(),
        "List".to_string(),
        "App::List`1".to_string(),
        None,
        TypeClass::Class,
        Modifiers::PUBLIC,
        RawNodeIndex::NONE,
        0,
        TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION,
    );
    open.set_generic_args(vec![ResolvedType::from_type(t_param.clone())]);
    let open = Arc::new(open);

    open.set_members(TypeMembers {
        fields: vec![Arc::new(FieldInfo {
            name: "item".to_string(),
            declaring_type: Arc::downgrade(&open),
            ty: ResolvedType::from_type(t_param),
            modifiers: Modifiers::PUBLIC,
            node: RawNodeIndex::NONE,
        })],
        ..TypeMembers::default()
    });
    open
}

#[test]
fn concurrent_instantiation_returns_one_record() {
    let cache = Arc::new(GenericTypeCache::new());
    let builtins = Arc::new(BuiltIns::for_tests());
    let open = make_open_list(0);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let builtins = builtins.clone();
        let open = open.clone();
        handles.push(std::thread::spawn(move || {
            let mut pointers = Vec::new();
            for _ in 0..100 {
                let closed = cache.make_generic_type(
                    &open,
                    vec![builtins.resolved(BuiltInType::Int32)],
                );
                pointers.push(Arc::as_ptr(&closed) as usize);
            }
            pointers
        }));
    }

    let mut distinct: HashSet<usize> = HashSet::new();
    for handle in handles {
        distinct.extend(handle.join().expect("thread"));
    }
    assert_eq!(distinct.len(), 1, "all callers must agree on one record");
    assert_eq!(cache.len(), 1);
}

#[test]
fn instantiation_substitutes_member_types() {
    let cache = GenericTypeCache::new();
    let builtins = BuiltIns::for_tests();
    let open = make_open_list(0);

    let int32 = builtins.resolved(BuiltInType::Int32);
    let closed = cache.make_generic_type(&open, vec![int32.clone()]);

    assert_eq!(closed.fully_qualified_name, "App::List`1<int>");
    assert!(closed.flags().contains(TypeInfoFlags::INSTANTIATED_GENERIC));
    assert!(!closed.is_generic_definition());

    let members = closed.members().expect("members substituted eagerly");
    assert_eq!(members.fields.len(), 1);
    assert_eq!(members.fields[0].ty, int32);
    let owner = members.fields[0]
        .declaring_type
        .upgrade()
        .expect("declaring type alive");
    assert!(Arc::ptr_eq(&owner, &closed));
}

#[test]
fn pending_instantiations_finalize_at_the_phase_boundary() {
    let cache = GenericTypeCache::new();
    let builtins = BuiltIns::for_tests();

    // an open definition whose members are not published yet, as during
    // the resolve-members phase
    let t_param = Arc::new(TypeInfo::generic_argument("T", 0, Weak::new()));
    let mut open = TypeInfo::new(
        0,
        Weak::new(),
        "Box".to_string(),
        "App::Box`1".to_string(),
        None,
        TypeClass::Struct,
        Modifiers::PUBLIC,
        RawNodeIndex::NONE,
        0,
        TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION,
    );
    open.set_generic_args(vec![ResolvedType::from_type(t_param.clone())]);
    let open = Arc::new(open);

    let closed = cache.make_generic_type(&open, vec![builtins.resolved(BuiltInType::Bool)]);
    assert!(closed.members().is_none(), "members wait for the open type");

    open.set_members(TypeMembers {
        fields: vec![Arc::new(FieldInfo {
            name: "value".to_string(),
            declaring_type: Arc::downgrade(&open),
            ty: ResolvedType::from_type(t_param),
            modifiers: Modifiers::PUBLIC,
            node: RawNodeIndex::NONE,
        })],
        ..TypeMembers::default()
    });

    cache.finalize_pending();

    let members = closed.members().expect("finalized");
    assert_eq!(members.fields[0].ty, builtins.resolved(BuiltInType::Bool));

    // the same key still returns the same record
    let again = cache.make_generic_type(&open, vec![builtins.resolved(BuiltInType::Bool)]);
    assert!(Arc::ptr_eq(&closed, &again));
}

#[test]
fn invalidation_drops_types_from_changed_files() {
    let cache = GenericTypeCache::new();
    let builtins = BuiltIns::for_tests();

    let open_a = make_open_list(0);
    let mut open_b_inner = TypeInfo::new(
        1,
        Weak::new(),
        "Set".to_string(),
        "App::Set`1".to_string(),
        None,
        TypeClass::Class,
        Modifiers::PUBLIC,
        RawNodeIndex::NONE,
        0,
        TypeInfoFlags::IS_GENERIC_TYPE_DEFINITION,
    );
    let t = Arc::new(TypeInfo::generic_argument("T", 1, Weak::new()));
    open_b_inner.set_generic_args(vec![ResolvedType::from_type(t)]);
    let open_b = Arc::new(open_b_inner);
    open_b.set_members(TypeMembers::default());

    let list_int = cache.make_generic_type(&open_a, vec![builtins.resolved(BuiltInType::Int32)]);
    let set_int = cache.make_generic_type(&open_b, vec![builtins.resolved(BuiltInType::Int32)]);
    assert_eq!(cache.len(), 2);

    // only file 0 changed
    let mut changed = fixedbitset::FixedBitSet::with_capacity(2);
    changed.insert(0);
    cache.invalidate(&changed);

    assert!(!cache.contains_ptr(&list_int));
    assert!(cache.contains_ptr(&set_int));
    assert_eq!(cache.len(), 1);

    // re-interning after invalidation builds a fresh record
    let rebuilt = cache.make_generic_type(&open_a, vec![builtins.resolved(BuiltInType::Int32)]);
    assert!(!Arc::ptr_eq(&list_int, &rebuilt));
}
