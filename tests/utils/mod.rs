#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use signed_webhooks::config::Config;
use signed_webhooks::domain::ports::{InboundEvent, SharedHandler, handler_fn};
use signed_webhooks::inbound::EventDispatcher;
use signed_webhooks::server::Server;

pub const SECRET: &str = "s3cr3t";

/// Test configuration bound to an ephemeral port, plus `overrides` as dotted keys
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("server.host", "127.0.0.1"),
        ("server.port", "0"),
        ("webhook.secret", SECRET),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    Config::load_with_sources(Some(vars)).unwrap()
}

pub async fn spawn_server() -> String {
    spawn_server_with(&test_config(&[])).await.0
}

/// Start a server for `config`; returns its base URL and handler registry
pub async fn spawn_server_with(config: &Config) -> (String, Arc<EventDispatcher>) {
    let server = Server::new(config).await.unwrap();

    let port = server.port();
    let dispatcher = server.dispatcher();
    tokio::spawn(server.run());

    (format!("http://{}:{}", config.server.host, port), dispatcher)
}

/// Handler that stores every event it receives
pub fn recording_handler(name: &str) -> (SharedHandler, Arc<Mutex<Vec<InboundEvent>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);

    let handler = handler_fn(name, move |event: InboundEvent| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(event);
            Ok(())
        }
    });

    (handler, received)
}
