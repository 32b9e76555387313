use std::path::Path;

use apklab_core::host::{HighlightStyle, Host, LineSpan, NotifyLevel};
use log::{error, info, warn};

/// Presents everything in the terminal, through the logger.
pub struct ConsoleHost;

impl Host for ConsoleHost {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Info => info!("{message}"),
            NotifyLevel::Error => error!("{message}"),
        }
    }

    fn highlight(&self, file: &Path, style: HighlightStyle, spans: &[LineSpan]) {
        let contents = match std::fs::read_to_string(file) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Could not read {file:?} to show it: {err}");
                return;
            }
        };
        let lines: Vec<&str> = contents.lines().collect();

        let marker = match style {
            HighlightStyle::MethodBody => "  |",
            HighlightStyle::ApiCall => ">>|",
        };
        for span in spans {
            for index in span.start..=span.end {
                if let Some(line) = lines.get(index) {
                    println!("{marker} {:>5} {line}", index + 1);
                }
            }
            println!();
        }
    }

    fn reveal_line(&self, file: &Path, line: usize) {
        info!("{}:{}", file.display(), line + 1);
    }

    fn open_folder(&self, path: &Path) {
        info!("Project is ready at {}", path.display());
    }
}
