//! Process-wide tracker accessor
//!
//! Nothing in this crate reads the global instance; it exists for embedding
//! layers that cannot thread a `Tracker` through their call sites.

use std::sync::{Arc, OnceLock};

use crate::tracker::Tracker;

static INSTANCE: OnceLock<Arc<Tracker>> = OnceLock::new();

/// Installs the global tracker. Fails, returning the argument, if one is
/// already installed.
pub fn install(tracker: Arc<Tracker>) -> Result<(), Arc<Tracker>> {
    INSTANCE.set(tracker)
}

pub fn instance() -> Option<Arc<Tracker>> {
    INSTANCE.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, TrackerConfig};

    #[test]
    fn test_install_once() {
        let first = Arc::new(Tracker::new(TrackerConfig::default(), Capabilities::default()).unwrap());
        let second = Arc::new(Tracker::new(TrackerConfig::default(), Capabilities::default()).unwrap());

        assert!(install(Arc::clone(&first)).is_ok());
        assert!(install(second).is_err());
        assert!(Arc::ptr_eq(&instance().unwrap(), &first));
    }
}
