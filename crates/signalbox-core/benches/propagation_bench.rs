//! Criterion benchmarks for signal propagation.
//!
//! Three benchmark groups:
//! - `fan_out`: one controller observed by 1000 receivers, toggled each iteration
//! - `advance`: 2000 receivers bound to 100 controllers, one tick each
//! - `serialization`: save and load of the `advance` layout

use criterion::{Criterion, criterion_group, criterion_main};
use signalbox_core::aspect::SignalAspect;
use signalbox_core::config::SignalConfig;
use signalbox_core::id::{BlockPos, ControllerKey};
use signalbox_core::node::BoxVariant;
use signalbox_core::test_utils::*;
use signalbox_core::world::SignalWorld;

// ===========================================================================
// Layout builders
// ===========================================================================

/// Receivers are spaced two blocks apart so none are adjacent.
fn receiver_pos(i: usize) -> BlockPos {
    BlockPos::new((i % 100) as i32 * 2, 64, (i / 100) as i32 * 2)
}

fn controller_key(i: usize) -> ControllerKey {
    ControllerKey(BlockPos::new(i as i32, 200, -1000))
}

fn build_layout(receivers: usize, controllers: usize) -> SignalWorld<RecordingHost> {
    let mut world = server_world();
    let keys: Vec<ControllerKey> = (0..controllers)
        .map(|i| signal_at(&mut world, controller_key(i).0))
        .collect();
    for i in 0..receivers {
        let pos = receiver_pos(i);
        world.add_box(pos, BoxVariant::Receiver).unwrap();
        world.bind_receiver(pos, keys[i % keys.len()]).unwrap();
    }
    world.host_mut().clear();
    world.drain_events();
    world
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut world = build_layout(1000, 1);
    let key = controller_key(0);
    let mut red = false;

    c.bench_function("fan_out_1000_receivers", |b| {
        b.iter(|| {
            red = !red;
            let aspect = if red { SignalAspect::Red } else { SignalAspect::Green };
            world.set_controller_aspect(key, aspect).unwrap();
            world.host_mut().clear();
        });
    });
}

fn bench_advance(c: &mut Criterion) {
    let mut world = build_layout(2000, 100);
    let mut tick = 0u64;

    c.bench_function("advance_2000_receivers", |b| {
        b.iter(|| {
            tick += 1;
            world.advance(tick);
            world.host_mut().clear();
        });
    });
}

fn bench_serialization(c: &mut Criterion) {
    let world = build_layout(2000, 100);
    let mut group = c.benchmark_group("serialization");

    group.bench_function("save_2000_receivers", |b| {
        b.iter(|| world.save().unwrap());
    });

    let data = world.save().unwrap();
    group.bench_function("load_2000_receivers", |b| {
        b.iter(|| {
            SignalWorld::load(&data, SignalConfig::default(), RecordingHost::default()).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_advance, bench_serialization);
criterion_main!(benches);
