use std::io::BufRead;

use tracing::debug;

use super::{StatsCollector, Walker, WalkerLimits};
use crate::cancel::CancellationFlag;
use crate::document::{TreeLimits, XmlDocument};
use crate::error::{IntrospectError, Result};
use crate::model::{ElementNode, StructureSummary, WalkMode};

/// Parses the full document, then walks the tree depth-first
#[derive(Debug, Clone)]
pub struct InMemoryWalker {
    limits: WalkerLimits,
}

impl InMemoryWalker {
    pub fn new(limits: WalkerLimits) -> Self {
        Self { limits }
    }

    fn visit(
        &self,
        node: &ElementNode,
        collector: &mut StatsCollector,
        cancel: &CancellationFlag,
    ) -> Result<()> {
        cancel.check()?;
        collector.open(
            &node.tag_name,
            node.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        if let Some(text) = node.text_content.as_deref() {
            collector.text(text);
        }
        for child in &node.children {
            self.visit(child, collector, cancel)?;
        }
        collector.close();
        Ok(())
    }
}

impl Walker for InMemoryWalker {
    fn mode(&self) -> WalkMode {
        WalkMode::InMemory
    }

    fn analyze(
        &self,
        source: &mut dyn BufRead,
        cancel: &CancellationFlag,
    ) -> Result<StructureSummary> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        let input = String::from_utf8(bytes).map_err(|e| IntrospectError::ParseFailure {
            details: format!("input is not valid UTF-8: {}", e),
        })?;

        let tree_limits = TreeLimits {
            max_depth: self.limits.max_depth_in_memory,
            max_elements: self.limits.max_elements_in_memory,
        };
        let parsed = XmlDocument::parse_bounded(&input, tree_limits, cancel)?;
        debug!(
            elements = parsed.document.root.element_count(),
            "document parsed into memory"
        );

        let mut collector = StatsCollector::new(WalkMode::InMemory, self.limits.capture);
        self.visit(&parsed.document.root, &mut collector, cancel)?;
        if let Some(recovery) = parsed.recovery {
            collector.record_recovery(recovery);
        }
        collector.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Recovery;

    fn analyze(input: &[u8], limits: WalkerLimits) -> Result<StructureSummary> {
        let mut source = input;
        InMemoryWalker::new(limits).analyze(&mut source, &CancellationFlag::new())
    }

    #[test]
    fn test_truncates_at_depth_limit() {
        let limits = WalkerLimits {
            max_depth_in_memory: 2,
            ..WalkerLimits::default()
        };
        let summary = analyze(b"<a><b><c><d><e/></d></c></b></a>", limits).unwrap();
        assert_eq!(summary.total_element_count, 3);
        assert_eq!(summary.max_depth, 2);
        assert!(matches!(summary.recoveries[0], Recovery::Truncated { .. }));
    }

    #[test]
    fn test_truncates_at_element_limit() {
        let limits = WalkerLimits {
            max_elements_in_memory: 3,
            ..WalkerLimits::default()
        };
        let summary = analyze(b"<r><i/><i/><i/><i/><i/></r>", limits).unwrap();
        assert_eq!(summary.total_element_count, 3);
        assert_eq!(summary.tag_stats["i"].count, 2);
        assert!(summary.is_partial());
    }

    #[test]
    fn test_invalid_utf8_is_parse_failure() {
        let result = analyze(b"<a>\xff\xfe</a>", WalkerLimits::default());
        assert!(matches!(result, Err(IntrospectError::ParseFailure { .. })));
    }

    #[test]
    fn test_cancelled_walk_stops() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let mut source: &[u8] = b"<a/>";
        let result = InMemoryWalker::new(WalkerLimits::default()).analyze(&mut source, &cancel);
        assert!(matches!(result, Err(IntrospectError::Cancelled)));
    }
}
