//! Integration Tests for the Binding Registry
//!
//! Runs complete binding passes against the fake loader:
//! - Partial success with missing exports
//! - Default and explicit entry points
//! - Library-scoped passes
//! - Argument validation and load failures

mod common;

use std::sync::Arc;

use calli::{
    BindContext, BindableSlot, BindingRegistry, BindingStatus, CalliError, CallingConvention,
    NativeSlot, PassMode, SlotOptions,
};
use common::{math_loader, quiet_context, FakeLoader};

const C: SlotOptions = SlotOptions::new().convention(CallingConvention::C);

// =============================================================================
// Binding passes
// =============================================================================

#[test]
fn test_partial_binding_of_math_library() {
    let loader = Arc::new(math_loader());
    let context = quiet_context(loader.clone());

    let add: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("add_i32", "math.native", C);
    let sub: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("sub_i32", "math.native", C);

    let registry = BindingRegistry::with_slots(context, [&add as &dyn BindableSlot, &sub]);
    let report = registry.bind_all().unwrap();

    assert_eq!(report.bound, vec!["add_i32".to_string()]);
    assert_eq!(report.unsupported.len(), 1);
    assert_eq!(report.unsupported[0].slot, "sub_i32");
    assert_eq!(report.unsupported[0].entry_point, "sub_i32");
    assert_eq!(report.unsupported[0].library, "math.native");
    assert!(!report.is_complete());

    assert_eq!(add.status(), BindingStatus::Resolved);
    assert!(add.descriptor().is_resolved());
    assert_eq!(unsafe { add.try_call((2, 3)) }.unwrap(), 5);

    assert_eq!(sub.status(), BindingStatus::Unsupported);
    assert!(!sub.is_bound());
    assert!(matches!(
        unsafe { sub.try_call((2, 3)) },
        Err(CalliError::NotBound { .. })
    ));

    // Both slots share one load
    assert_eq!(loader.open_count(), 1);
    assert_eq!(registry.unsupported().len(), 1);
    assert_eq!(registry.unsupported()[0].name(), "sub_i32");
}

#[test]
fn test_second_pass_skips_bound_slots() {
    let loader = Arc::new(math_loader());
    let context = quiet_context(loader.clone());

    let add: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("add_i32", "math.native", C);
    let sub: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("sub_i32", "math.native", C);
    let registry = BindingRegistry::with_slots(context, [&add as &dyn BindableSlot, &sub]);

    registry.bind_all().unwrap();
    let address = add.get().map(|t| t.address());

    let report = registry.bind_all().unwrap();
    assert!(report.bound.is_empty());
    assert_eq!(report.already_bound, 1);
    // Unsupported slots are retried
    assert_eq!(report.unsupported.len(), 1);
    assert_eq!(add.get().map(|t| t.address()), address);
    assert_eq!(loader.open_count(), 1);
}

#[cfg(not(target_arch = "x86"))]
#[test]
fn test_stdcall_slot_does_not_stop_the_pass() {
    let context = quiet_context(Arc::new(math_loader()));

    let mul: NativeSlot<(i32, i32), i32> = NativeSlot::with_options(
        "mul_i32",
        "math.native",
        SlotOptions::new().convention(CallingConvention::StdCall),
    );
    let add: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("add_i32", "math.native", C);

    let report = BindingRegistry::with_slots(context, [&mul as &dyn BindableSlot, &add])
        .bind_all()
        .unwrap();

    assert_eq!(report.bound, vec!["mul_i32".to_string(), "add_i32".to_string()]);
    assert!(report.is_complete());
    assert_eq!(mul.get().map(|t| t.convention()), Some(CallingConvention::StdCall));
    assert_eq!(unsafe { mul.try_call((6, 7)) }.unwrap(), 42);
    assert_eq!(unsafe { add.try_call((2, 3)) }.unwrap(), 5);
}

#[test]
fn test_explicit_entry_point() {
    let context = quiet_context(Arc::new(math_loader()));

    let times: NativeSlot<(i32, i32), i32> =
        NativeSlot::with_options("times", "math.native", C.entry_point("mul_i32"));
    let square: NativeSlot<(f64,), f64> = NativeSlot::with_options("square", "math.native", C);

    let mut registry = BindingRegistry::new(context);
    registry.register(&times).register(&square);
    assert_eq!(registry.slots().len(), 2);

    let report = registry.bind_all().unwrap();
    assert!(report.is_complete());
    assert_eq!(times.descriptor().entry_point().as_deref(), Some("mul_i32"));
    assert_eq!(unsafe { times.try_call((6, 7)) }.unwrap(), 42);
    assert_eq!(unsafe { square.try_call((1.5,)) }.unwrap(), 2.25);
}

#[test]
fn test_default_entry_point_is_slot_name() {
    let context = quiet_context(Arc::new(math_loader()));

    let mul: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("mul_i32", "math.native", C);
    assert_eq!(mul.descriptor().entry_point(), None);

    BindingRegistry::with_slots(context, [&mul as &dyn BindableSlot])
        .bind_all()
        .unwrap();

    assert_eq!(mul.descriptor().entry_point().as_deref(), Some("mul_i32"));
    assert_eq!(unsafe { mul.try_call((3, 4)) }.unwrap(), 12);
}

#[test]
fn test_by_reference_binding() {
    let context = quiet_context(Arc::new(math_loader()));

    let add: NativeSlot<(i32, i32), i32> = NativeSlot::with_options(
        "add_by_ref",
        "math.native",
        C.pass_mode(PassMode::ByReference),
    );
    BindingRegistry::with_slots(context, [&add as &dyn BindableSlot])
        .bind_all()
        .unwrap();

    let trampoline = add.get().unwrap();
    assert_eq!(trampoline.pass_mode(), PassMode::ByReference);
    assert_eq!(unsafe { trampoline.call((20, 22)) }, 42);
}

// =============================================================================
// Library-scoped passes
// =============================================================================

#[test]
fn test_bind_library_leaves_other_libraries_alone() {
    let loader = Arc::new(math_loader());
    let context = quiet_context(loader.clone());

    let add: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("add_i32", "math.native", C);
    let version: NativeSlot<(), u32> = NativeSlot::with_options("version", "sys.native", C);
    let registry = BindingRegistry::with_slots(context.clone(), [&add as &dyn BindableSlot, &version]);

    let report = registry.bind_library("math.native").unwrap();
    assert_eq!(report.bound, vec!["add_i32".to_string()]);

    assert!(add.is_bound());
    assert_eq!(version.status(), BindingStatus::Unresolved);
    assert_eq!(loader.requested(), vec!["math.native".to_string()]);
    assert!(!context.cache().contains("sys.native"));

    let report = registry.bind_library("sys.native").unwrap();
    assert_eq!(report.bound, vec!["version".to_string()]);
    assert_eq!(unsafe { version.try_call(()) }.unwrap(), 3);
    assert_eq!(loader.open_count(), 2);
}

#[test]
fn test_bind_library_without_slots_still_loads() {
    let loader = Arc::new(math_loader());
    let registry = BindingRegistry::new(quiet_context(loader.clone()));

    let report = registry.bind_library("sys.native").unwrap();
    assert_eq!(report, Default::default());
    assert_eq!(loader.open_count(), 1);
}

#[test]
fn test_bind_library_rejects_empty_name() {
    let loader = Arc::new(math_loader());
    let registry = BindingRegistry::new(quiet_context(loader.clone()));

    assert!(matches!(
        registry.bind_library(""),
        Err(CalliError::InvalidArgument(_))
    ));
    assert_eq!(loader.open_count(), 0);
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_library_empty_name_never_reaches_loader() {
    let loader = Arc::new(math_loader());
    let registry = BindingRegistry::new(quiet_context(loader.clone()));

    assert!(matches!(
        registry.load_library(""),
        Err(CalliError::InvalidArgument(_))
    ));
    assert_eq!(loader.open_count(), 0);
}

#[test]
fn test_load_failure_is_not_cached() {
    let loader = Arc::new(math_loader());
    let registry = BindingRegistry::new(quiet_context(loader.clone()));

    let err = registry.load_library("missing.native").unwrap_err();
    match err {
        CalliError::LibraryNotFound { name, .. } => assert_eq!(name, "missing.native"),
        other => panic!("Expected LibraryNotFound, got {:?}", other),
    }

    let handle = registry.load_library("math.native").unwrap();
    assert_eq!(handle.name(), "math.native");
    assert!(registry.load_library("missing.native").is_err());
    assert_eq!(loader.open_count(), 3);
}

#[test]
fn test_load_library_is_idempotent() {
    let loader = Arc::new(math_loader());
    let context = quiet_context(loader.clone());
    let registry = BindingRegistry::new(context.clone());

    let first = registry.load_library("math.native").unwrap();
    let second = context.load_library("math.native").unwrap();

    assert_eq!(first, second);
    assert_eq!(loader.open_count(), 1);
    assert_eq!(context.cache().loaded_libraries(), vec!["math.native".to_string()]);
}

#[test]
fn test_missing_library_aborts_pass() {
    let loader = Arc::new(math_loader());
    let context = quiet_context(loader.clone());

    let add: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("add_i32", "math.native", C);
    let ghost: NativeSlot<(), i32> = NativeSlot::with_options("ghost", "ghost.native", C);
    let mul: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("mul_i32", "math.native", C);
    let registry = BindingRegistry::with_slots(context, [&add as &dyn BindableSlot, &ghost, &mul]);

    let err = registry.bind_all().unwrap_err();
    assert!(matches!(err, CalliError::LibraryNotFound { ref name, .. } if name == "ghost.native"));

    // Slots before the failure keep their bindings
    assert!(add.is_bound());
    assert!(!mul.is_bound());
}

#[test]
fn test_misconfigured_slot_fails_before_loading() {
    let loader = Arc::new(math_loader());
    let context = quiet_context(loader.clone());

    let orphan: NativeSlot<(), i32> = NativeSlot::declare("app::native", "orphan", "", C);
    let registry = BindingRegistry::with_slots(context, [&orphan as &dyn BindableSlot]);

    let err = registry.bind_all().unwrap_err();
    match &err {
        CalliError::MisconfiguredSlot { scope, slot, .. } => {
            assert_eq!(scope, "app::native");
            assert_eq!(slot, "orphan");
        }
        other => panic!("Expected MisconfiguredSlot, got {:?}", other),
    }
    assert!(err.to_string().contains("app::native::orphan"));
    assert_eq!(loader.open_count(), 0);
}

#[test]
fn test_signature_checked_at_install() {
    let context = quiet_context(Arc::new(math_loader()));

    let slot: NativeSlot<(i32, i32), i32> = NativeSlot::with_options("add_i32", "math.native", C);
    assert_eq!(slot.signature().to_string(), "i32(i32, i32)");

    BindingRegistry::with_slots(context, [&slot as &dyn BindableSlot])
        .bind_all()
        .unwrap();
    assert_eq!(slot.get().unwrap().signature(), &slot.signature());
}

#[test]
fn test_independent_contexts() {
    let first = Arc::new(math_loader());
    let second = Arc::new(FakeLoader::new());

    let a = quiet_context(first.clone());
    let b = Arc::new(BindContext::new(second.clone()));

    a.load_library("math.native").unwrap();
    assert!(b.load_library("math.native").is_err());
    assert_eq!(first.open_count(), 1);
    assert_eq!(second.open_count(), 1);
}
