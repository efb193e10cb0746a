use std::io::Write;

/// Writes `timestamp level message` lines to stderr and, optionally, to a log file.
pub struct PredictionLogger {
    level: log::LevelFilter,
    file: Option<parking_lot::Mutex<std::fs::File>>,
}

impl PredictionLogger {
    pub fn new(level: log::LevelFilter, path: Option<&std::path::Path>) -> std::io::Result<Self> {
        let file = match path {
            Some(path) => Some(parking_lot::Mutex::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            )),
            None => None,
        };

        Ok(Self { level, file })
    }

    /// install as the global `log` backend
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    fn format(record: &log::Record) -> String {
        format!(
            "{:} {: <5} {:}",
            chrono::Local::now().format(&crate::DATETIME_FORMAT),
            record.level(),
            record.args()
        )
    }
}

impl log::Log for PredictionLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = Self::format(record);
        eprintln!("{line}");
        if let Some(file) = &self.file {
            let mut file = file.lock();
            // write failures are dropped
            let _ = writeln!(file, "{line}");
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}
