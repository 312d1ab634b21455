//! Integration tests for multi-level runs, shadow providers and per-test overrides.

use shadowbox::prelude::*;
use std::sync::Arc;

const SETTINGS: &str = "android.provider.Settings";
const PREFS: &str = "app.Preferences";

fn universe() -> Arc<TypeUniverse> {
    let universe = TypeUniverse::builder()
        .add(
            TypeDescriptor::new(SETTINGS).method(
                MethodDescriptor::new("getString")
                    .static_method()
                    .param(ValueKind::String)
                    .returns(ValueKind::String)
                    .body(|_, _| Ok(Value::string("device"))),
            ),
        )
        .add(
            TypeDescriptor::new(PREFS).method(
                MethodDescriptor::new("theme")
                    .static_method()
                    .returns(ValueKind::String)
                    .body(|_, _| Ok(Value::string("light"))),
            ),
        )
        .build()
        .unwrap();
    Arc::new(universe)
}

fn settings_shadow(id: &str, answer: &'static str) -> Arc<ShadowType> {
    Arc::new(
        ShadowType::new(id, SETTINGS).method(
            MethodDescriptor::new("getString")
                .static_method()
                .param(ValueKind::String)
                .returns(ValueKind::String)
                .body(move |_, _| Ok(Value::string(answer))),
        ),
    )
}

fn setting(ctx: &ExecutionContext<'_>) -> Result<Value> {
    ctx.call_static(SETTINGS, "getString", &[Value::string("name")])
}

#[test]
fn test_provider_tiers_and_local_shadows_layer() {
    let base = StaticShadowProvider::new("framework")
        .with_shadow(&settings_shadow("framework.ShadowSettings", "framework"));
    let custom = StaticShadowProvider::custom("suite")
        .with_shadow(&settings_shadow("suite.ShadowSettings", "suite"));

    // Registration order does not matter, the custom tier always wins over the base tier.
    let harness = Harness::new(universe(), HarnessConfig::single(30))
        .unwrap()
        .with_provider(Arc::new(custom))
        .with_provider(Arc::new(base));

    let outcomes = harness.run(&TestConfig::new(), setting).unwrap();
    assert_eq!(outcomes[0].result, Ok(Value::string("suite")));

    let local = TestConfig::new().with_shadow(&settings_shadow("test.ShadowSettings", "local"));
    let outcomes = harness.run(&local, setting).unwrap();
    assert_eq!(outcomes[0].result, Ok(Value::string("local")));

    let outcomes = harness.run(&TestConfig::new(), setting).unwrap();
    assert_eq!(outcomes[0].result, Ok(Value::string("suite")));
}

#[test]
fn test_method_level_config_overrides_class_level() {
    let harness = Harness::new(
        universe(),
        HarnessConfig::default().with_api_levels(&[26, 28, 30, 33]),
    )
    .unwrap();

    let class_level = TestConfig::new()
        .with_shadow(&settings_shadow("test.ShadowSettings", "class"))
        .with_api(ApiSelector::All);
    let method_level = TestConfig::new().with_api(ApiSelector::Range {
        min: Some(28),
        max: Some(30),
    });
    let merged = TestConfig::merge(&class_level, &method_level);

    let outcomes = harness.run(&merged, setting).unwrap();
    let levels: Vec<_> = outcomes.iter().map(|o| o.api_level).collect();
    assert_eq!(levels, vec![28, 30]);
    assert!(outcomes
        .iter()
        .all(|o| o.result == Ok(Value::string("class"))));
}

#[test]
fn test_excluded_packages_run_originals() {
    let shadow = Arc::new(
        ShadowType::new("test.ShadowPreferences", PREFS).method(
            MethodDescriptor::new("theme")
                .static_method()
                .returns(ValueKind::String)
                .body(|_, _| Ok(Value::string("dark"))),
        ),
    );
    let config = HarnessConfig::single(30).with_instrumentation(
        InstrumentationConfiguration::builder()
            .with_default_exclusions()
            .instrument_package("android")
            .build(),
    );
    let harness = Harness::new(universe(), config).unwrap();

    fn theme(ctx: &ExecutionContext<'_>) -> Result<Value> {
        ctx.call_static(PREFS, "theme", &[])
    }

    // A local shadow pulls its real type into interception.
    let shadowed = TestConfig::new().with_shadow(&shadow);
    assert!(harness.instrumentation_for(&shadowed).should_instrument(PREFS));
    assert!(!harness.instrumentation_for(&TestConfig::new()).should_instrument(PREFS));
    let outcomes = harness.run(&shadowed, theme).unwrap();
    assert_eq!(outcomes[0].result, Ok(Value::string("dark")));

    // Without it the package rules leave the type alone.
    let outcomes = harness.run(&TestConfig::new(), theme).unwrap();
    assert_eq!(outcomes[0].result, Ok(Value::string("light")));
}

#[test]
fn test_unsupported_selection_fails_the_whole_run() {
    let harness = Harness::new(universe(), HarnessConfig::single(30)).unwrap();
    let test = TestConfig::new().with_api(ApiSelector::Exact(vec![19]));
    assert!(matches!(
        harness.run(&test, setting),
        Err(Error::Configuration { .. })
    ));
}

#[test]
fn test_prewarmed_levels_are_reused() {
    let harness = Harness::new(universe(), HarnessConfig::exhaustive()).unwrap();
    assert_eq!(harness.prewarm(&[28, 30, 34]).unwrap(), 3);
    assert_eq!(harness.pool().len(), 3);

    let test = TestConfig::new().with_api(ApiSelector::Exact(vec![28, 30, 34]));
    let outcomes = harness.run(&test, setting).unwrap();
    assert!(outcomes.iter().all(TestOutcome::is_success));

    let stats = harness.pool().stats();
    assert_eq!(stats.built, 3);
    assert_eq!(stats.reused, 3);
}
