//! Benchmarks for call dispatch and the sandbox lifecycle.
//!
//! - Cached dispatch of shadowed, call-through and pass-through calls
//! - Cold resolution after a registry swap invalidates the decision cache
//! - A full harness run, lease to reset, on a warm pool

extern crate shadowbox;

use criterion::{criterion_group, criterion_main, Criterion};
use shadowbox::prelude::*;
use std::{hint::black_box, sync::Arc};

const VIEW: &str = "android.view.View";
const BUTTON: &str = "android.widget.Button";

fn universe() -> Arc<TypeUniverse> {
    let universe = TypeUniverse::builder()
        .add(
            TypeDescriptor::new(VIEW)
                .field("visibility", Value::I32(0))
                .method(
                    MethodDescriptor::new("getVisibility")
                        .returns(ValueKind::I32)
                        .body(|ctx, call| ctx.get_field(call.this()?, "visibility")),
                )
                .method(
                    MethodDescriptor::new("performClick")
                        .returns(ValueKind::BOOL)
                        .body(|_, _| Ok(Value::Bool(false))),
                ),
        )
        .add(
            TypeDescriptor::new(BUTTON).extends(VIEW).method(
                MethodDescriptor::new("setEnabled")
                    .param(ValueKind::BOOL)
                    .body(|_, _| Ok(Value::Void)),
            ),
        )
        .build()
        .unwrap();
    Arc::new(universe)
}

fn shadow_view() -> Arc<ShadowType> {
    Arc::new(
        ShadowType::new("bench.ShadowView", VIEW)
            .call_through_by_default(true)
            .method(
                MethodDescriptor::new("performClick")
                    .returns(ValueKind::BOOL)
                    .body(|_, _| Ok(Value::Bool(true))),
            ),
    )
}

fn sandbox() -> Sandbox {
    let universe = universe();
    let mut builder = ShadowRegistry::builder();
    builder.add_shadow(&shadow_view());
    let registry = Arc::new(builder.build(&universe).unwrap());

    let key = SandboxKey::new(InstrumentationConfiguration::default(), 30);
    let mut sandbox = Sandbox::build(key, universe, Arc::new(NoopReporter)).unwrap();
    sandbox.install_registry(registry).unwrap();
    sandbox
}

/// Benchmark cached dispatch for each routing outcome.
fn bench_cached_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_cached");
    let mut sandbox = sandbox();

    sandbox
        .execute(|ctx| {
            let button = ctx.new_object(BUTTON)?;
            group.bench_function("route_to_shadow", |b| {
                b.iter(|| black_box(ctx.call(button, "performClick", &[]).unwrap()));
            });
            group.bench_function("call_through_proxy", |b| {
                b.iter(|| black_box(ctx.call(button, "getVisibility", &[]).unwrap()));
            });
            group.bench_function("call_original", |b| {
                b.iter(|| black_box(ctx.call_original(button, "performClick", &[]).unwrap()));
            });
            Ok(())
        })
        .unwrap();
    group.finish();
}

/// Benchmark resolution with an empty decision cache.
fn bench_cold_dispatch(c: &mut Criterion) {
    let mut sandbox = sandbox();

    sandbox
        .execute(|ctx| {
            let button = ctx.new_object(BUTTON)?;
            let receiver = Receiver::Instance(button);
            c.bench_function("dispatch_cold_resolve", |b| {
                b.iter(|| {
                    ctx.dispatcher().clear();
                    black_box(ctx.resolve_call(&receiver, "getVisibility", &[]).unwrap())
                });
            });
            Ok(())
        })
        .unwrap();
}

/// Benchmark a complete harness run on a warm pool.
fn bench_harness_run(c: &mut Criterion) {
    let harness = Harness::new(universe(), HarnessConfig::single(30)).unwrap();
    let test = TestConfig::new().with_shadow(&shadow_view());
    harness.prewarm(&[30]).unwrap();

    c.bench_function("harness_run_warm", |b| {
        b.iter(|| {
            let outcomes = harness
                .run(&test, |ctx| {
                    let button = ctx.new_object(BUTTON)?;
                    ctx.call(button, "performClick", &[])
                })
                .unwrap();
            black_box(outcomes)
        });
    });
}

criterion_group!(
    benches,
    bench_cached_dispatch,
    bench_cold_dispatch,
    bench_harness_run
);
criterion_main!(benches);
