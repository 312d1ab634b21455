//! Integration tests for call dispatch as seen through the public API.
//!
//! Every scenario runs through a [`Harness`] against a small media-player universe, the
//! way a test suite would use the engine.

use shadowbox::prelude::*;
use std::sync::Arc;

const PLAYER: &str = "media.Player";
const STREAMING: &str = "media.StreamingPlayer";

fn media_universe() -> Arc<TypeUniverse> {
    let universe = TypeUniverse::builder()
        .add(
            TypeDescriptor::new(PLAYER)
                .field("volume", Value::I64(5))
                .method(
                    MethodDescriptor::new("getVolume")
                        .returns(ValueKind::I64)
                        .body(|ctx, call| ctx.get_field(call.this()?, "volume")),
                )
                .method(
                    MethodDescriptor::new("setVolume")
                        .param(ValueKind::I64)
                        .body(|ctx, call| {
                            ctx.set_field(call.this()?, "volume", call.arg(0)?.clone())?;
                            Ok(Value::Void)
                        }),
                )
                .method(
                    MethodDescriptor::new("play")
                        .returns(ValueKind::BOOL)
                        .body(|_, _| Ok(Value::Bool(true))),
                )
                .method(
                    MethodDescriptor::new("volumeOf")
                        .param(ValueKind::object(PLAYER))
                        .returns(ValueKind::I64)
                        .body(|ctx, call| match call.arg(0)? {
                            Value::Object(other) => ctx.get_field(*other, "volume"),
                            other => Err(Error::invocation(
                                call.runtime_type,
                                call.method,
                                format!("expected a player, got {other:?}"),
                            )),
                        }),
                ),
        )
        .add(
            TypeDescriptor::new(STREAMING)
                .extends(PLAYER)
                .method(
                    MethodDescriptor::new("bufferSize")
                        .returns(ValueKind::I32)
                        .body(|_, _| Ok(Value::I32(64))),
                ),
        )
        .build()
        .unwrap();
    Arc::new(universe)
}

fn harness(levels: &[ApiLevel]) -> Harness {
    let config = HarnessConfig::default().with_api_levels(levels);
    Harness::new(media_universe(), config).unwrap()
}

fn results<T>(outcomes: Vec<TestOutcome<T>>) -> Vec<T> {
    outcomes.into_iter().map(|o| o.result.unwrap()).collect()
}

#[test]
fn test_loose_signature_matching_routes_widened_arguments() {
    let recording_volume = |loose: bool| {
        Arc::new(
            ShadowType::new("test.ShadowPlayer", PLAYER)
                .loose_signatures(loose)
                .method(
                    MethodDescriptor::new("setVolume")
                        .param(ValueKind::I64)
                        .body(|ctx, call| {
                            ctx.set_shadow_static("test.ShadowPlayer", "last", call.arg(0)?.clone());
                            Ok(Value::Void)
                        }),
                ),
        )
    };

    fn set_small_volume(ctx: &ExecutionContext<'_>) -> Result<(Option<Value>, Value)> {
        let player = ctx.new_object(PLAYER)?;
        ctx.call(player, "setVolume", &[Value::I32(3)])?;
        Ok((
            ctx.shadow_static("test.ShadowPlayer", "last"),
            ctx.call_original(player, "getVolume", &[])?,
        ))
    }

    let harness = harness(&[30]);

    let loose = TestConfig::new()
        .with_shadow(&recording_volume(true));
    let (recorded, volume) = results(harness.run(&loose, set_small_volume).unwrap()).remove(0);
    assert_eq!(recorded, Some(Value::I32(3)));
    assert_eq!(volume, Value::I64(5));

    let strict = TestConfig::new()
        .with_shadow(&recording_volume(false));
    let (recorded, volume) = results(harness.run(&strict, set_small_volume).unwrap()).remove(0);
    assert_eq!(recorded, None, "strict matching stubs the call instead");
    assert_eq!(volume, Value::I64(5));
}

#[test]
fn test_shadow_methods_respect_api_window() {
    let shadow = Arc::new(
        ShadowType::new("test.ShadowPlayer", PLAYER)
            .call_through_by_default(true)
            .method(
                MethodDescriptor::new("play")
                    .returns(ValueKind::BOOL)
                    .since(30)
                    .body(|_, _| Ok(Value::Bool(false))),
            ),
    );
    let test = TestConfig::new()
        .with_shadow(&shadow)
        .with_api(ApiSelector::Exact(vec![28, 30]));

    let outcomes = harness(&[28, 30])
        .run(&test, |ctx| {
            let player = ctx.new_object(PLAYER)?;
            ctx.call(player, "play", &[])
        })
        .unwrap();

    assert_eq!(outcomes[0].api_level, 28);
    assert_eq!(outcomes[0].result, Ok(Value::Bool(true)), "falls through to the original");
    assert_eq!(outcomes[1].api_level, 30);
    assert_eq!(outcomes[1].result, Ok(Value::Bool(false)));
}

#[test]
fn test_shadow_type_outside_its_window_is_ignored() {
    let shadow = Arc::new(
        ShadowType::new("test.ShadowPlayer", PLAYER)
            .until(28)
            .method(
                MethodDescriptor::new("getVolume")
                    .returns(ValueKind::I64)
                    .body(|_, _| Ok(Value::I64(11))),
            ),
    );
    let test = TestConfig::new().with_shadow(&shadow).with_api(ApiSelector::All);

    let volumes = results(
        harness(&[26, 28, 30])
            .run(&test, |ctx| {
                let player = ctx.new_object(PLAYER)?;
                ctx.call(player, "getVolume", &[])
            })
            .unwrap(),
    );
    assert_eq!(volumes, vec![Value::I64(11), Value::I64(11), Value::I64(5)]);
}

#[test]
fn test_parent_shadow_methods_are_inherited() {
    let parent = Arc::new(
        ShadowType::new("test.ShadowPlayer", PLAYER).method(
            MethodDescriptor::new("getVolume")
                .returns(ValueKind::I64)
                .body(|_, _| Ok(Value::I64(99))),
        ),
    );
    let child = |inherit: bool| {
        Arc::new(
            ShadowType::new("test.ShadowStreamingPlayer", STREAMING)
                .extends(&parent)
                .inherit_implementation_methods(inherit)
                .call_through_by_default(true),
        )
    };

    fn volume(ctx: &ExecutionContext<'_>) -> Result<Value> {
        let player = ctx.new_object(STREAMING)?;
        ctx.call(player, "getVolume", &[])
    }

    let harness = harness(&[30]);
    let inheriting = TestConfig::new().with_shadow(&child(true));
    let inherited = results(harness.run(&inheriting, volume).unwrap());
    assert_eq!(inherited, vec![Value::I64(99)]);

    let own_only = TestConfig::new().with_shadow(&child(false));
    let own_only = results(harness.run(&own_only, volume).unwrap());
    assert_eq!(own_only, vec![Value::I64(5)]);
}

#[test]
fn test_object_arguments_match_supertype_parameters() {
    let outcomes = harness(&[30])
        .run(&TestConfig::new(), |ctx| {
            let player = ctx.new_object(PLAYER)?;
            let streaming = ctx.new_object(STREAMING)?;
            ctx.call(streaming, "setVolume", &[Value::I64(8)])?;
            ctx.call(player, "volumeOf", &[Value::Object(streaming)])
        })
        .unwrap();
    assert_eq!(outcomes[0].result, Ok(Value::I64(8)));
}

#[test]
fn test_duplicate_shadow_declarations_are_ambiguous() {
    let shadow = Arc::new(
        ShadowType::new("test.ShadowPlayer", PLAYER)
            .method(
                MethodDescriptor::new("getVolume")
                    .returns(ValueKind::I64)
                    .body(|_, _| Ok(Value::I64(1))),
            )
            .method(
                MethodDescriptor::new("getVolume")
                    .returns(ValueKind::I64)
                    .body(|_, _| Ok(Value::I64(2))),
            ),
    );

    let outcomes = harness(&[30])
        .run(&TestConfig::new().with_shadow(&shadow), |ctx| {
            let player = ctx.new_object(PLAYER)?;
            ctx.call(player, "getVolume", &[])
        })
        .unwrap();

    match &outcomes[0].result {
        Err(Error::DispatchAmbiguity { candidates, .. }) => assert_eq!(candidates.len(), 2),
        other => panic!("expected an ambiguity, got {other:?}"),
    }
}

#[test]
fn test_shadow_state_does_not_leak_between_tests() {
    let shadow = Arc::new(
        ShadowType::new("test.ShadowPlayer", PLAYER).method(
            MethodDescriptor::new("play")
                .returns(ValueKind::BOOL)
                .body(|ctx, _| {
                    let plays = ctx
                        .shadow_static("test.ShadowPlayer", "plays")
                        .and_then(|v| v.as_i32())
                        .unwrap_or(0);
                    ctx.set_shadow_static("test.ShadowPlayer", "plays", plays + 1);
                    Ok(Value::Bool(true))
                }),
        ),
    );
    let test = TestConfig::new().with_shadow(&shadow);
    let harness = harness(&[30]);

    for _ in 0..3 {
        let plays = results(
            harness
                .run(&test, |ctx| {
                    let player = ctx.new_object(PLAYER)?;
                    ctx.call(player, "play", &[])?;
                    Ok(ctx.shadow_static("test.ShadowPlayer", "plays"))
                })
                .unwrap(),
        );
        assert_eq!(plays, vec![Some(Value::I32(1))]);
    }
    assert_eq!(harness.pool().stats().built, 1);
}
