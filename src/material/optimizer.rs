//! Graph optimizer hook.

use crate::blocks::BlockId;
use crate::graph::MaterialGraph;

/// A graph-to-graph rewrite run between initialization and code emission.
///
/// Optimizers may merge, replace or drop blocks but must keep the output
/// nodes valid; the build traverses the graph again afterwards, so removed
/// blocks simply stop being reachable.
pub trait GraphOptimizer {
    fn name(&self) -> &str;

    fn optimize(
        &mut self,
        graph: &mut MaterialGraph,
        vertex_outputs: &[BlockId],
        fragment_outputs: &[BlockId],
    );
}
