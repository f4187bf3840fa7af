//! Minimal runtime demo: an actor that greets itself once, logs the message,
//! and shuts the runtime down.
//!
//! ```sh
//! cargo run --example helloworld
//! ```

use selkie_core::{init_telemetry, Actor, ActorContext, Msg, TelemetryConfig};
use selkie_runtime::AppBuilder;
use tracing::info;

struct HelloWorld;

impl Actor for HelloWorld {
    fn init(&mut self, ctx: &ActorContext, _param: &str) -> selkie_core::Result<()> {
        ctx.send(ctx.name().clone(), "hello,world")
    }

    fn proc(&mut self, ctx: &ActorContext, msg: Msg) {
        info!(%msg, payload = msg.payload_str().unwrap_or(""), "received");
        ctx.request_shutdown().unwrap();
    }
}

fn main() -> selkie_core::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())?;

    let app = AppBuilder::new()
        .register_module_fn("example", |_| Box::new(HelloWorld))
        .build()?;
    app.spawn("example", "helloworld", "")?;
    app.exec()
}
