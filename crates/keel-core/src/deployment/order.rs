use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::deployment::deployer::Deployer;

/// Sort deployers by ascending priority, then by name for determinism.
/// Equal priorities are reported as a warning, not an error.
pub fn sort_deployers(deployers: &mut [Arc<dyn Deployer>]) {
    deployers.sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.name().cmp(b.name())));
    for pair in deployers.windows(2) {
        if pair[0].order() == pair[1].order() {
            log::warn!(
                "Deployers '{}' and '{}' share priority {}; ordering by name",
                pair[0].name(),
                pair[1].name(),
                pair[0].order()
            );
        }
    }
}

/// File ordering for startup directories: extensions listed earlier sort
/// first (descriptor files before code bundles), lexical order breaks
/// ties and places unlisted extensions last.
#[derive(Debug, Clone)]
pub struct ExtensionOrder {
    priorities: Vec<String>,
}

impl ExtensionOrder {
    pub fn new(priorities: Vec<String>) -> Self {
        Self { priorities }
    }

    fn rank(&self, path: &Path) -> usize {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.priorities.iter().position(|p| p == ext))
            .unwrap_or(self.priorities.len())
    }

    pub fn compare(&self, a: &Path, b: &Path) -> Ordering {
        self.rank(a).cmp(&self.rank(b)).then_with(|| a.cmp(b))
    }

    pub fn sort(&self, files: &mut [PathBuf]) {
        files.sort_by(|a, b| self.compare(a, b));
    }
}

impl Default for ExtensionOrder {
    fn default() -> Self {
        Self::new(vec![
            "unit".to_string(),
            "so".to_string(),
            "dylib".to_string(),
            "dll".to_string(),
        ])
    }
}
