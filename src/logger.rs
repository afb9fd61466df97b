//! Diagnostics sink handed to the file system, a typical use is:
//!   let fs = MjolnFs::new(dev, cfg).with_logger(Arc::new(env_logger::Builder::from_default_env().build()));
//! Nothing is printed unless a logger is injected.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

pub const TARGET: &str = "mjoln";

/// Discards every record.
struct Silent;

impl Log for Silent {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }

    fn log(&self, _: &Record) {}

    fn flush(&self) {}
}

/// Cheaply clonable handle to the injected logger.
#[derive(Clone)]
pub struct Diag(Arc<dyn Log>);

impl Diag {
    pub fn new(logger: Arc<dyn Log>) -> Self {
        Self(logger)
    }

    pub fn silent() -> Self {
        Self(Arc::new(Silent))
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.0
            .enabled(&Metadata::builder().level(level).target(TARGET).build())
    }

    pub fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        self.0.log(
            &Record::builder()
                .args(args)
                .level(level)
                .target(TARGET)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }
}

impl Default for Diag {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Diag")
    }
}

/// `diag!(d, Level::Warn, "slot {} lost", n)`
macro_rules! diag {
    ($d:expr, $lvl:expr, $($arg:tt)+) => {
        $d.emit($lvl, format_args!($($arg)+))
    };
}

pub(crate) use diag;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(Level, String)>>);

    impl Log for Capture {
        fn enabled(&self, m: &Metadata) -> bool {
            m.level() <= Level::Info
        }
        fn log(&self, r: &Record) {
            self.0.lock().unwrap().push((r.level(), r.args().to_string()));
        }
        fn flush(&self) {}
    }

    #[test]
    fn silent_by_default() {
        let d = Diag::default();
        assert!(!d.enabled(Level::Error));
        diag!(d, Level::Error, "dropped {}", 1);
    }

    #[test]
    fn respects_the_logger_filter() {
        let capture = Arc::new(Capture::default());
        let d = Diag::new(capture.clone());
        diag!(d, Level::Warn, "kept {}", 1);
        diag!(d, Level::Debug, "filtered {}", 2);
        let seen = capture.0.lock().unwrap();
        assert_eq!(*seen, vec![(Level::Warn, "kept 1".to_string())]);
    }
}
