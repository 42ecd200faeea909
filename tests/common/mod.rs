use std::collections::HashMap;

use ai_sorter_sidecar::config::Config;
use ai_sorter_sidecar::{app, AppState};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Binds `router` (a fake upstream classifier) on an ephemeral port and
/// returns its `/classify` URL plus the join handle keeping it alive.
pub async fn spawn_mock_upstream(router: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}/classify"), handle)
}

/// Spawns the real sidecar app on an ephemeral port using whatever `Config`
/// the caller already assembled via environment variables, mirroring the
/// retrieval pack's own `spawn_app` helper for its plugin pipeline.
pub async fn spawn_app() -> (String, JoinHandle<()>, AppState) {
    let config = Config::from_env().expect("valid test config");
    let state = AppState::build(config);
    state.lifecycle.mark_ready();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), handle, state)
}
