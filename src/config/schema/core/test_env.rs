use std::sync::{Mutex, MutexGuard, PoisonError};

/// Every variable the config layer reads.
const OPENPIMS_VARS: [&str; 3] = ["OPENPIMS_HOME", "OPENPIMS_LOG", "OPENPIMS_SERVER_URL"];

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Exclusive view of the process environment with all `OPENPIMS_*`
/// variables cleared. Whatever was set before comes back on drop.
pub(crate) struct ScopedEnv {
    saved: Vec<(&'static str, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    pub(crate) fn clean() -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = OPENPIMS_VARS
            .iter()
            .map(|&key| (key, std::env::var(key).ok()))
            .collect();
        for key in OPENPIMS_VARS {
            // SAFETY: ENV_LOCK is held, so no other test touches the environment.
            unsafe { std::env::remove_var(key) };
        }
        Self { saved, _lock: lock }
    }

    pub(crate) fn with(self, key: &'static str, value: &str) -> Self {
        debug_assert!(OPENPIMS_VARS.contains(&key), "{key} is not restored on drop");
        // SAFETY: ENV_LOCK is held for the lifetime of `self`.
        unsafe { std::env::set_var(key, value) };
        self
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            // SAFETY: the lock guard is a field and is released only after this runs.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_set_inside_scope_are_rolled_back() {
        let before = ScopedEnv::clean().saved.clone();

        {
            let _env = ScopedEnv::clean().with("OPENPIMS_LOG", "trace");
            assert_eq!(std::env::var("OPENPIMS_LOG").unwrap(), "trace");
            assert!(std::env::var("OPENPIMS_SERVER_URL").is_err());
        }
        // The next scope sees exactly what the previous ones started from.
        assert_eq!(ScopedEnv::clean().saved, before);
    }
}
