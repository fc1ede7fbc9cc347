//! Post-run summary of everything the pipeline skipped or flagged.

use serde::{Deserialize, Serialize};

use crate::hooks::HookKind;
use crate::pipeline::HookWarning;

/// Warnings collected across all stages of one conversion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    warnings: Vec<HookWarning>,
}

impl RunSummary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends warnings from one stage.
    pub fn extend(&mut self, warnings: impl IntoIterator<Item = HookWarning>) {
        self.warnings.extend(warnings);
    }

    /// All warnings in the order they occurred.
    pub fn warnings(&self) -> &[HookWarning] {
        &self.warnings
    }

    /// Warnings from one stage.
    pub fn for_stage(&self, stage: HookKind) -> impl Iterator<Item = &HookWarning> {
        self.warnings.iter().filter(move |w| w.stage == stage)
    }

    /// Number of hooks whose output was discarded.
    pub fn skipped_hooks(&self) -> usize {
        self.warnings.iter().filter(|w| w.is_skipped()).count()
    }

    /// Whether the run finished without any warning.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "All plugin hooks completed.");
        }
        writeln!(
            f,
            "{} plugin warning(s), {} hook(s) skipped:",
            self.warnings.len(),
            self.skipped_hooks()
        )?;
        for warning in &self.warnings {
            writeln!(f, "  - {warning}")?;
        }
        Ok(())
    }
}
