//! A small Android-flavoured type universe and a few shadows for it.
//!
//! ```text
//! java.lang.Object
//! └── android.view.View
//!     └── android.widget.TextView
//!         └── android.widget.Button
//! android.os.Build        (final)
//! com.example.Widget      (proxiability edge cases)
//! com.example.Clock       (statics)
//! ```
use std::sync::Arc;

use crate::{
    instrumentation::InstrumentationConfiguration,
    sandbox::SandboxKey,
    shadow::ShadowType,
    types::{ApiLevel, MethodDescriptor, MethodModifiers, TypeDescriptor, TypeUniverse},
    value::{Value, ValueKind},
};

pub const WIDGET: &str = "com.example.Widget";
pub const CLOCK: &str = "com.example.Clock";

pub fn widget_universe() -> TypeUniverse {
    TypeUniverse::builder()
        .add(
            TypeDescriptor::new("java.lang.Object")
                .method(
                    MethodDescriptor::new("hashCode")
                        .returns(ValueKind::I32)
                        .body(|_, call| Ok(Value::I32(call.this()?.id as i32))),
                )
                .method(
                    MethodDescriptor::new("toString")
                        .returns(ValueKind::String)
                        .body(|_, call| Ok(Value::string(call.runtime_type))),
                ),
        )
        .add(
            TypeDescriptor::new("android.view.View")
                .extends("java.lang.Object")
                .static_field("sInstanceCount", Value::I32(0))
                .field("visibility", Value::I32(0))
                .method(
                    MethodDescriptor::new("getVisibility")
                        .returns(ValueKind::I32)
                        .body(|ctx, call| ctx.get_field(call.this()?, "visibility")),
                )
                .method(
                    MethodDescriptor::new("setVisibility")
                        .param(ValueKind::I32)
                        .body(|ctx, call| {
                            ctx.set_field(call.this()?, "visibility", call.arg(0)?.clone())?;
                            Ok(Value::Void)
                        }),
                )
                .method(
                    MethodDescriptor::new("performClick")
                        .returns(ValueKind::BOOL)
                        .body(|_, _| Ok(Value::Bool(false))),
                ),
        )
        .add(
            TypeDescriptor::new("android.widget.TextView")
                .extends("android.view.View")
                .field("text", Value::string(""))
                .method(
                    MethodDescriptor::new("getText")
                        .returns(ValueKind::String)
                        .body(|ctx, call| ctx.get_field(call.this()?, "text")),
                )
                .method(
                    MethodDescriptor::new("setText")
                        .param(ValueKind::String)
                        .body(|ctx, call| {
                            ctx.set_field(call.this()?, "text", call.arg(0)?.clone())?;
                            Ok(Value::Void)
                        }),
                ),
        )
        .add(
            TypeDescriptor::new("android.widget.Button")
                .extends("android.widget.TextView")
                .method(
                    MethodDescriptor::new("performClick")
                        .returns(ValueKind::BOOL)
                        .body(|_, _| Ok(Value::Bool(true))),
                ),
        )
        .add(
            TypeDescriptor::new("android.os.Build")
                .final_type()
                .static_field("SDK_INT", Value::I32(0))
                .method(
                    MethodDescriptor::new("getSerial")
                        .static_method()
                        .returns(ValueKind::String)
                        .body(|_, _| Ok(Value::string("unknown"))),
                )
                .method(
                    MethodDescriptor::new("getRadioVersion")
                        .returns(ValueKind::String)
                        .body(|_, _| Ok(Value::string("radio"))),
                ),
        )
        .add(
            TypeDescriptor::new(WIDGET)
                .static_field("drawCount", Value::I32(0))
                .method(MethodDescriptor::new("draw").body(|ctx, _| {
                    let count = ctx.get_static(WIDGET, "drawCount")?.as_i32().unwrap_or(0);
                    ctx.set_static(WIDGET, "drawCount", count + 1)?;
                    Ok(Value::Void)
                }))
                .method(
                    MethodDescriptor::new("size")
                        .returns(ValueKind::I32)
                        .body(|_, _| Ok(Value::I32(42))),
                )
                .method(
                    MethodDescriptor::new("resize")
                        .param(ValueKind::I64)
                        .returns(ValueKind::I64)
                        .body(|_, call| Ok(call.arg(0)?.clone())),
                )
                .method(
                    MethodDescriptor::new("id")
                        .modifiers(MethodModifiers::FINAL)
                        .returns(ValueKind::I32)
                        .body(|_, _| Ok(Value::I32(1))),
                )
                .method(
                    MethodDescriptor::new("secret")
                        .modifiers(MethodModifiers::PRIVATE)
                        .returns(ValueKind::String)
                        .body(|_, _| Ok(Value::string("s3cret"))),
                )
                .method(
                    MethodDescriptor::new("nativeHandle")
                        .modifiers(MethodModifiers::NATIVE)
                        .returns(ValueKind::I64),
                )
                .method(
                    MethodDescriptor::new("create")
                        .static_method()
                        .returns(ValueKind::object(WIDGET))
                        .body(|ctx, _| Ok(Value::Object(ctx.new_object(WIDGET)?))),
                ),
        )
        .add(
            TypeDescriptor::new(CLOCK)
                .static_field("now", Value::I64(1_000))
                .method(
                    MethodDescriptor::new("currentTimeMillis")
                        .static_method()
                        .returns(ValueKind::I64)
                        .body(|ctx, _| ctx.get_static(CLOCK, "now")),
                ),
        )
        .build()
        .expect("fixture universe is valid")
}

/// Replaces `Widget.size()` with a constant 7. No call-through.
pub fn shadow_widget() -> Arc<ShadowType> {
    Arc::new(
        ShadowType::new("test.ShadowWidget", WIDGET).method(
            MethodDescriptor::new("size")
                .returns(ValueKind::I32)
                .body(|_, _| Ok(Value::I32(7))),
        ),
    )
}

/// Freezes `Clock.currentTimeMillis()` at `now`.
pub fn shadow_clock(now: i64) -> Arc<ShadowType> {
    Arc::new(
        ShadowType::new("test.ShadowClock", CLOCK)
            .method(
                MethodDescriptor::new("currentTimeMillis")
                    .static_method()
                    .returns(ValueKind::I64)
                    .body(move |_, _| Ok(Value::I64(now))),
            )
            .resetter(|_| Ok(())),
    )
}

/// Sandbox key with the default runtime exclusions.
pub fn widget_key(api_level: ApiLevel) -> SandboxKey {
    SandboxKey::new(
        InstrumentationConfiguration::builder()
            .with_default_exclusions()
            .build(),
        api_level,
    )
}
