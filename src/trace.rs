use crate::mi_trace;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use strum_macros::Display;

/// Direction of MI traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[strum(serialize = "->")]
    Out,
    #[strum(serialize = "<-")]
    In,
}

/// MI traffic tracer. Every line goes to the `mi` log target and, if a trace
/// file is configured, is appended to it with a timestamp.
#[derive(Clone, Default)]
pub struct MiTracer {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MiTracer {
    /// Tracer that writes to log only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: &Path) -> crate::error::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
        })
    }

    pub fn line(&self, direction: Direction, text: &str) {
        let text = text.trim_end_matches(['\r', '\n']);
        mi_trace!(target: "mi", "{direction} {text}");

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
                _ = writeln!(file, "{ts} {direction} {text}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_trace_file() {
        let path = std::env::temp_dir().join(format!("mictl-trace-{}.log", uuid::Uuid::new_v4()));
        let tracer = MiTracer::with_file(&path).unwrap();
        tracer.line(Direction::Out, "1-exec-run\n");
        tracer.clone().line(Direction::In, "1^running");

        let data = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = data.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" -> 1-exec-run"));
        assert!(lines[1].ends_with(" <- 1^running"));
        fs::remove_file(path).unwrap();
    }
}
