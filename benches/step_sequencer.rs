//! Benchmark for step-sequence computation and budget checks
//!
//! Both run on every accepted step, so they should stay in the
//! sub-microsecond range even with many striped groups.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use growfs_wizard::domain::ports::{DeviceId, FileSystemInfo};
use growfs_wizard::workflow::{
    max_devices_addable, Facts, GrowthLimits, SelectionStore, SelectionTarget, StepSequencer,
    StripedGroupPlan,
};

fn facts() -> Facts {
    let info = FileSystemInfo {
        name: "qfs1".into(),
        mounted: true,
        combined_metadata_and_data: false,
        metadata_devices: 2,
        data_devices: 0,
        striped_groups: vec![4, 4],
    };
    Facts::derive(&info, &GrowthLimits::default())
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_sequencer");
    let facts = facts();

    for groups in [0u32, 8, 64, 126] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("compute", groups), &groups, |b, &groups| {
            b.iter(|| {
                StepSequencer::compute(
                    black_box(&facts),
                    true,
                    true,
                    black_box(StripedGroupPlan::Count(groups)),
                )
            });
        });
    }

    group.bench_function("compute_not_applicable", |b| {
        b.iter(|| StepSequencer::compute(black_box(&facts), true, true, StripedGroupPlan::NotApplicable));
    });

    group.finish();
}

fn bench_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth_constraints");
    let facts = facts();

    let mut store = SelectionStore::new(&facts);
    store.set_metadata(vec![DeviceId::from("/dev/m0")]);
    for g in 0..64u32 {
        let members = (0..2).map(|i| DeviceId::new(format!("/dev/g{}d{}", g, i))).collect();
        store.set_striped_group(g, members);
    }

    group.bench_function("max_devices_addable", |b| {
        b.iter(|| max_devices_addable(black_box(&facts), black_box(&store), SelectionTarget::StripedGroup(17)));
    });

    group.finish();
}

criterion_group!(benches, bench_compute, bench_budget);
criterion_main!(benches);
