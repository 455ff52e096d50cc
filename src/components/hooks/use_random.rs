use std::sync::atomic::{AtomicUsize, Ordering};

const PREFIX: &str = "dash"; // Must NOT contain "/" or "-"

static COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Unique DOM id for one mounted instance of `element`, e.g. `modal_dash_3`.
pub fn use_random_id_for(element: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{element}_{PREFIX}_{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_call() {
        let a = use_random_id_for("modal");
        let b = use_random_id_for("modal");
        assert_ne!(a, b);
        assert!(a.starts_with("modal_dash_"));
    }
}
