use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared shutdown request, raised from a signal handler or another thread.
///
/// The control loop checks it between ticks, never inside one.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(!flag.is_raised());
        std::thread::spawn(move || other.raise())
            .join()
            .expect("raiser thread");
        assert!(flag.is_raised());
    }
}
