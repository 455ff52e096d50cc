mod actions;
mod api;
mod app;
mod components;
mod config;
mod form;
mod menu;
mod models;
mod pages;
mod state;
mod sync;
mod validation;

pub use app::App;

use leptos::prelude::*;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use crate::config::EnvConfig;
    use crate::validation::{BrowserTimer, Debouncer};
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn set_env(value: &JsValue) {
        let window = web_sys::window().expect("window");
        js_sys::Reflect::set(&window, &"ENV".into(), value).expect("set ENV");
    }

    #[wasm_bindgen_test]
    fn env_config_reads_window_env() {
        let env = js_sys::Object::new();
        js_sys::Reflect::set(&env, &"API_URL".into(), &"https://dash.example".into()).expect("set");
        js_sys::Reflect::set(&env, &"CSRF_TOKEN".into(), &"tok".into()).expect("set");
        js_sys::Reflect::set(&env, &"DEBOUNCE_MS".into(), &JsValue::from_f64(250.0)).expect("set");
        set_env(&env);

        let cfg = EnvConfig::new();
        assert_eq!(cfg.api_url, "https://dash.example");
        assert_eq!(cfg.csrf_token.as_deref(), Some("tok"));
        assert_eq!(cfg.debounce_ms, 250);
        assert_eq!(cfg.api_root(), "https://dash.example/api");

        set_env(&JsValue::UNDEFINED);
    }

    #[wasm_bindgen_test]
    fn env_config_blank_token_counts_as_missing() {
        let env = js_sys::Object::new();
        js_sys::Reflect::set(&env, &"CSRF_TOKEN".into(), &"   ".into()).expect("set");
        set_env(&env);

        assert!(EnvConfig::new().csrf_token.is_none());

        set_env(&JsValue::UNDEFINED);
    }

    #[wasm_bindgen_test]
    fn browser_timer_reschedule_keeps_one_pending() {
        let mut timers: Debouncer<BrowserTimer> = Debouncer::new();

        for _ in 0..3 {
            let timer = BrowserTimer::schedule(1_000, || {}).expect("window timer");
            timers.schedule("title", timer);
        }
        assert_eq!(timers.len(), 1);

        timers.cancel("title");
        assert!(!timers.is_pending("title"));
    }
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    // A second init (hot reload) only fails to replace the logger.
    let _ = console_log::init_with_level(log::Level::Debug);
    mount_to_body(App);
}
