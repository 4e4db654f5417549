// crates/nmos-testing-cli/src/report.rs
// ============================================================================
// Module: Outcome Reporting
// Description: JSON-lines outcome writer and run summary.
// Purpose: Hand outcomes to external report consumers one record per line.
// Dependencies: nmos-testing-core, serde_json
// ============================================================================

//! ## Overview
//! JSON-lines outcome writer and run summary, handing outcomes to external
//! report consumers one record per line.

use std::io;
use std::io::Write;

use nmos_testing_core::TestOutcome;
use nmos_testing_core::Verdict;
use nmos_testing_core::summarize;

/// Writes each outcome as one JSON object per line.
pub struct OutcomeWriter<W: Write> {
    /// Destination stream.
    writer: W,
    /// Outcomes written so far.
    written: usize,
}

impl<W: Write> OutcomeWriter<W> {
    /// Wraps a destination stream.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
        }
    }

    /// Writes one outcome.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] when serialization or the write fails.
    pub fn write(&mut self, outcome: &TestOutcome) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, outcome).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Writes every outcome and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] when any write fails.
    pub fn write_all(&mut self, outcomes: &[TestOutcome]) -> io::Result<()> {
        for outcome in outcomes {
            self.write(outcome)?;
        }
        self.writer.flush()
    }

    /// Returns how many outcomes have been written.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Returns the destination stream.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// One-line verdict tally, e.g. `2 PASS, 1 FAIL`.
#[must_use]
pub fn summary_line(outcomes: &[TestOutcome]) -> String {
    let counts = summarize(outcomes);
    if counts.is_empty() {
        return "no outcomes".to_string();
    }
    counts
        .iter()
        .map(|(verdict, count)| format!("{count} {verdict}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Returns true when any outcome failed.
#[must_use]
pub fn has_failures(outcomes: &[TestOutcome]) -> bool {
    outcomes.iter().any(|outcome| Verdict::is_failure(outcome.verdict))
}
