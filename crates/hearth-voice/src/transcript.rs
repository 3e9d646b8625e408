//! Turn accumulator for the active session.

use hearth_types::{Turn, TurnRole};

/// Ordered conversation transcript, appended in finalization order.
///
/// No de-duplication or role alternation is enforced; the transcript is
/// exactly what the demultiplexer finalized, in the order it finalized it.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    turns: Vec<Turn>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: TurnRole, content: String) {
        self.turns.push(Turn { role, content });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Read-only copy of the transcript, used at session end.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }
}
