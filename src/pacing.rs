use std::time::Duration;

/// Blocking pause used for request backoff and inter-track throttling.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::{cell::RefCell, time::Duration};

    use super::Sleeper;

    /// Records requested pauses without sleeping.
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        pub pauses: RefCell<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn count(&self) -> usize {
            self.pauses.borrow().len()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.pauses.borrow_mut().push(duration);
        }
    }
}
