//! Run log capability shared by every pipeline component

use log::Level;

/// Sink for human-readable progress lines.
///
/// Components get one at construction instead of threading a callback through every call.
pub trait Reporter {
    fn emit(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn emit(&self, level: Level, message: &str) {
        log::log!(level, "{message}");
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;

    use log::Level;

    use super::Reporter;

    /// Keeps every emitted line for assertions.
    #[derive(Debug, Default)]
    pub struct MemoryReporter {
        pub lines: RefCell<Vec<(Level, String)>>,
    }

    impl MemoryReporter {
        pub fn contains(&self, needle: &str) -> bool {
            self.lines.borrow().iter().any(|(_, line)| line.contains(needle))
        }

        pub fn count_at(&self, level: Level) -> usize {
            self.lines.borrow().iter().filter(|(l, _)| *l == level).count()
        }
    }

    impl Reporter for MemoryReporter {
        fn emit(&self, level: Level, message: &str) {
            self.lines.borrow_mut().push((level, message.to_string()));
        }
    }
}
