//! Indexing progress reporting.
//!
//! `tshard index` reports what it is walking and how many documents have
//! been handed to the builder. Progress goes to **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;

/// A single progress event for one indexed root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// The walk started; the number of files is not known yet.
    Discovering { root: String },
    /// `added` documents accepted so far out of `seen` paths received.
    Ingesting { root: String, added: u64, seen: u64 },
    /// The builder finished.
    Done { root: String, added: u64, skipped: u64 },
}

pub trait IndexProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index /srv/repo  ingesting  1,234 / 1,240 files".
pub struct StderrProgress;

impl IndexProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Discovering { root } => format!("index {}  walking...\n", root),
            IndexProgressEvent::Ingesting { root, added, seen } => format!(
                "index {}  ingesting  {} / {} files\n",
                root,
                format_number(*added),
                format_number(*seen)
            ),
            IndexProgressEvent::Done { root, added, skipped } => format!(
                "index {}  done  {} added, {} skipped\n",
                root,
                format_number(*added),
                format_number(*skipped)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &IndexProgressEvent) -> serde_json::Value {
        match event {
            IndexProgressEvent::Discovering { root } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "discovering"
            }),
            IndexProgressEvent::Ingesting { root, added, seen } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "ingesting",
                "added": added,
                "seen": seen
            }),
            IndexProgressEvent::Done { root, added, skipped } => serde_json::json!({
                "event": "progress",
                "root": root,
                "phase": "done",
                "added": added,
                "skipped": skipped
            }),
        }
    }
}

impl IndexProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl IndexProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IndexProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!("unknown progress mode '{}': expected off, human or json", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(123_456), "123,456");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_carry_phase() {
        let v = JsonProgress::to_json(&IndexProgressEvent::Done {
            root: "/r".into(),
            added: 3,
            skipped: 1,
        });
        assert_eq!(v["phase"], "done");
        assert_eq!(v["added"], 3);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("json".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
