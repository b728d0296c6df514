//! Shared helpers for integration tests.
//!
//! Note: We use `helpers/mod.rs` instead of the modern `helpers.rs` + `helpers/` pattern
//! because Cargo auto-discovers top-level `.rs` files in `tests/` as integration tests.
//! A `tests/helpers.rs` file would be compiled as a standalone test, which we don't want.

#![allow(dead_code)]

pub mod fake_portia;

use portia_router::config::Settings;
use portia_router::dispatch::{Dispatcher, MemoryPublisher, Record};
use serde_json::Value;

pub use fake_portia::FakePortia;

/// Settings pointing at `endpoint` with a fast reconnect.
pub fn settings(endpoint: &str, routing: &str) -> Settings {
    let text = format!(
        "[portia]\nendpoint = \"{endpoint}\"\nrequest_timeout_ms = 5000\n\
         acquire_timeout_ms = 5000\nreconnect_initial_delay_ms = 10\n\n[routing]\n{routing}"
    );
    Settings::from_toml_str(&text).unwrap()
}

pub const NESTED_ROUTING: &str = r#"
receive_inbound_connectors = ["t1", "t2"]
receive_outbound_connectors = ["app"]

[routing.mapping.t1]
default = "mno1"

[routing.mapping.t2]
ep1 = "mno2"
"#;

pub const FLAT_ROUTING: &str = r#"
default_transport = "t_default"
transport_names = ["t1", "t2", "t_default"]
exposed_names = ["app"]

[routing.mappings]
mno1 = "t1"
mno2 = "t2"
"#;

pub fn dispatcher(server: &FakePortia, routing: &str) -> Dispatcher<MemoryPublisher> {
    Dispatcher::from_settings(&settings(&server.address(), routing), MemoryPublisher::new())
        .unwrap()
}

pub fn record(value: Value) -> Record {
    serde_json::from_value(value).unwrap()
}
