// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use errwatch_config::{PrimaryModule, SecondaryModule};
use errwatch_core::peripherals::iofic::SimIofic;
use errwatch_core::{
    CollectError, CollectMode, Context, ControlFlags, FieldTemplate, Group, Handle, Iofic,
    IoficRef, Module, ModuleIdent, ModuleOps, ModuleParams, SelfTestConfig,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn quick() -> SelfTestConfig {
    SelfTestConfig {
        runs: 2,
        deadline: Duration::from_micros(200),
        poll_delay_every: 10,
        poll_delay: Duration::from_micros(1),
    }
}

fn ec_ident() -> ModuleIdent {
    ModuleIdent::new(PrimaryModule::Eth, 1).with_secondary(SecondaryModule::Ec, 0)
}

fn ec_template() -> Vec<FieldTemplate> {
    vec![
        FieldTemplate::iofic(0, "parser parity", 0, Group::A, 0),
        FieldTemplate::iofic(1, "rx fifo", 0, Group::A, 7),
        FieldTemplate::iofic(2, "tx fifo", 0, Group::B, 3),
        FieldTemplate::iofic(3, "msix", 0, Group::D, 31).with_mode(CollectMode::Polling),
    ]
}

fn ec_module(sim: &Arc<SimIofic>, ops: Option<Arc<dyn ModuleOps>>) -> Module {
    let mut params = ModuleParams::new(ec_ident())
        .controllers(vec![sim.clone() as IoficRef])
        .fields(&ec_template());
    if let Some(ops) = ops {
        params = params.ops(ops);
    }
    let mut m = Module::new(params).unwrap();
    m.post_init();
    m.unmask_interrupts();
    m
}

#[test]
fn test_self_test_passes_and_cleans_up() {
    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, None);
    let handle = Handle::default();

    assert!(m.test(&handle, &quick()));
    assert!(m.fields().iter().all(|f| f.counter == 0));
    for g in Group::ALL {
        assert_eq!(sim.peek_cause(g), 0);
        assert_eq!(sim.abort_mask_read(g), 0, "abort mask must be restored");
    }
}

#[test]
fn test_self_test_is_repeatable() {
    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, None);
    let handle = Handle::default();

    let first = m.test(&handle, &quick());
    m.clear();
    let second = m.test(&handle, &quick());
    assert_eq!(first, second);
    assert!(first);
}

#[test]
fn test_preexisting_abort_mask_is_kept() {
    let sim = Arc::new(SimIofic::new("ec1"));
    sim.abort_mask_set(Group::A, 1 << 7);
    let mut m = ec_module(&sim, None);

    assert!(m.test(&Handle::default(), &quick()));
    assert_eq!(sim.abort_mask_read(Group::A), 1 << 7);
}

#[test]
fn test_all_masked_skips() {
    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = Module::new(
        ModuleParams::new(ec_ident())
            .controllers(vec![sim.clone() as IoficRef])
            .fields(&ec_template()),
    )
    .unwrap();
    m.post_init();
    // Never unmasked: controller reset state

    let events = Arc::new(AtomicU32::new(0));
    let seen = events.clone();
    let handle = Handle::default().with_error_callback(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    assert!(m.test(&handle, &quick()));
    assert_eq!(events.load(Ordering::SeqCst), 0);
    assert!(m.fields().iter().all(|f| f.counter == 0));
    assert_eq!(sim.peek_cause(Group::A), 0);
}

#[test]
fn test_unmasked_polling_field_fails() {
    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, None);
    sim.unmask(Group::D, 1 << 31);

    assert!(!m.test(&Handle::default(), &quick()));
}

#[test]
fn test_post_init_masks_polling_fields() {
    let sim = Arc::new(SimIofic::new("ec1"));
    sim.unmask(Group::D, u32::MAX);
    sim.unmask(Group::A, u32::MAX);

    let mut m = Module::new(
        ModuleParams::new(ec_ident())
            .controllers(vec![sim.clone() as IoficRef])
            .fields(&ec_template()),
    )
    .unwrap();
    assert!(!m.has_polling_fields());

    m.post_init();

    assert!(m.has_polling_fields());
    assert_eq!(sim.read_mask(Group::D), 1 << 31);
    // Interrupt fields untouched
    assert_eq!(sim.read_mask(Group::A), 0);
}

#[test]
fn test_post_init_with_override_masks_everything() {
    let sim = Arc::new(SimIofic::new("ec1"));
    for g in Group::ALL {
        sim.unmask(g, u32::MAX);
    }
    let mut m = Module::new(
        ModuleParams::new(ec_ident())
            .controllers(vec![sim.clone() as IoficRef])
            .fields(&ec_template())
            .collect_mode(CollectMode::Polling),
    )
    .unwrap();
    m.post_init();

    for f in m.fields() {
        assert_ne!(sim.read_mask(f.group) & f.bit, 0, "{} left unmasked", f.name);
    }
}

#[test]
fn test_lost_injection_fails() {
    #[derive(Debug)]
    struct Deaf;
    impl ModuleOps for Deaf {
        fn collect(&self, _m: &mut Module, _h: &Handle, _mode: CollectMode) -> Result<(), CollectError> {
            Ok(())
        }
    }

    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, Some(Arc::new(Deaf)));

    assert!(!m.test(&Handle::default(), &quick()));
    // Failed injections are not left pending
    assert_eq!(sim.peek_cause(Group::A), 0);
    assert_eq!(sim.abort_mask_read(Group::A), 0);
}

#[test]
fn test_double_count_fails() {
    #[derive(Debug)]
    struct Echo;
    impl ModuleOps for Echo {
        fn collect(&self, m: &mut Module, h: &Handle, mode: CollectMode) -> Result<(), CollectError> {
            m.collect_groups(h, mode);
            if let Some(f) = m.field_mut(1) {
                if f.counter > 0 {
                    f.counter += 1;
                }
            }
            Ok(())
        }
    }

    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, Some(Arc::new(Echo)));
    assert!(!m.test(&Handle::default(), &quick()));
}

#[test]
fn test_clear_on_read_group_refused() {
    let sim = Arc::new(SimIofic::new("ec1"));
    sim.set_control_flags(Group::B, ControlFlags::CLEAR_ON_READ);
    let mut m = ec_module(&sim, None);

    assert!(!m.test(&Handle::default(), &quick()));
    assert_eq!(sim.peek_cause(Group::B), 0);
}

#[test]
fn test_threshold_of_one_keeps_masks_and_runs_both_passes() {
    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, None);
    let masks_before: Vec<u32> = Group::ALL.iter().map(|g| sim.read_mask(*g)).collect();

    let events = Arc::new(AtomicU32::new(0));
    let seen = events.clone();
    let handle = Handle::default()
        .with_threshold(Some(1))
        .with_error_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    assert!(m.test(&handle, &quick()));
    // Three interrupt fields, two passes
    assert_eq!(events.load(Ordering::SeqCst), 6);
    let masks_after: Vec<u32> = Group::ALL.iter().map(|g| sim.read_mask(*g)).collect();
    assert_eq!(masks_before, masks_after);
}

#[test]
fn test_zero_poll_interval_does_not_panic() {
    #[derive(Debug)]
    struct Deaf;
    impl ModuleOps for Deaf {
        fn collect(&self, _m: &mut Module, _h: &Handle, _mode: CollectMode) -> Result<(), CollectError> {
            Ok(())
        }
    }

    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, Some(Arc::new(Deaf)));
    let config = SelfTestConfig {
        poll_delay_every: 0,
        ..quick()
    };

    assert!(!m.test(&Handle::default(), &config));
    assert_eq!(sim.peek_cause(Group::A), 0);
}

#[test]
fn test_hardware_auto_mask_is_undone() {
    let sim = Arc::new(SimIofic::new("ec1"));
    sim.set_control_flags(Group::A, ControlFlags::AUTO_MASK);
    let mut m = ec_module(&sim, None);
    let mask_before = sim.read_mask(Group::A);

    assert!(!m.test(&Handle::default(), &quick()));
    assert_eq!(sim.read_mask(Group::A), mask_before);
}

#[test]
fn test_disabled_module_is_not_injected() {
    let sim = Arc::new(SimIofic::new("ec1"));
    let mut m = ec_module(&sim, None);
    m.set_enabled(false);
    sim.unmask(Group::D, 1 << 31);

    assert!(m.test(&Handle::default(), &quick()));
}

#[test]
fn test_context_self_test_all() {
    let good = Arc::new(SimIofic::new("ec1"));
    let bad = Arc::new(SimIofic::new("ec2"));
    bad.set_control_flags(Group::A, ControlFlags::AUTO_MASK);

    let mut ctx = Context::new(Handle::default()).with_self_test(quick());
    ctx.register(ec_module(&good, None)).unwrap();
    assert!(ctx.self_test_all());

    let mut other = Module::new(
        ModuleParams::new(ModuleIdent::new(PrimaryModule::Eth, 2).with_secondary(SecondaryModule::Ec, 0))
            .controllers(vec![bad.clone() as IoficRef])
            .fields(&ec_template()),
    )
    .unwrap();
    other.post_init();
    other.unmask_interrupts();
    ctx.register(other).unwrap();

    // Hardware auto-masks the injected bit before it can be serviced
    assert!(!ctx.self_test_all());
}
