use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::profile::NodeProfile;
use crate::sink::MaterializedOutput;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_output(result: &MaterializedOutput) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_profiles(profiles: &[NodeProfile]) -> io::Result<()> {
        Self::print_json(&profiles)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub fn print_human(result: &MaterializedOutput) {
    match result {
        MaterializedOutput::Local { paths } => {
            println!("Averaged datasets: {}", paths.len());
            for path in paths {
                println!("  {path}");
            }
        }
        MaterializedOutput::Shared { url, .. } => {
            println!("URL to access the results: {url}");
        }
    }
}
