//! Console sink: renders build and push output to stdout.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::scan::{StreamEnd, scan_build, scan_push};
use crate::engine::OutputStream;
use crate::report::{BuildStatus, BuildStatusReport};
use crate::types::ImageRef;

type Writer = Arc<Mutex<dyn Write + Send>>;

/// Writes progress to the process's standard output (or a supplied writer).
///
/// Rendering never fails: write errors are ignored.
#[derive(Clone)]
pub struct ConsoleSink {
    out: Writer,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::with_writer(Arc::new(Mutex::new(io::stdout())))
    }

    pub fn with_writer(out: Writer) -> Self {
        Self { out }
    }

    fn write(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
    }

    /// Streams build output and prints the final status and duration.
    pub async fn render_build(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        report: &mut BuildStatusReport,
    ) -> BuildStatus {
        self.write(&format!(
            "===== Docker Build =====\nBuilding {}:{}\nFrom git context: {}\n",
            report.image_name, report.tag, report.build_context
        ));

        let status = scan_build(token, output, report, |text| self.write(text)).await;
        let duration = report.finish();

        self.write(&format!(
            "Build status: {status}\nBuild duration: {duration:?}\n"
        ));
        status
    }

    /// Streams push output and prints the push duration.
    pub async fn render_push(
        &self,
        token: &CancellationToken,
        output: OutputStream,
        image: &ImageRef,
    ) -> StreamEnd {
        self.write(&format!("===== Docker Push =====\nPushing {image} ...\n"));
        let start = Instant::now();
        let end = scan_push(token, output, |text| self.write(text)).await;
        self.write(&format!("Push duration: {:?}\n", start.elapsed()));
        end
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}
