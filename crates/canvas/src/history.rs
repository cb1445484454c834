use crate::{CanvasCommand, CanvasDocument};

/// Undo/redo stacks over [`CanvasCommand`]s.
///
/// With a limit set, the oldest undo entry is evicted once the stack grows past
/// it. Redo entries are never evicted; they are cleared by the next `execute`.
#[derive(Debug, Default, Clone)]
pub struct CommandHistory {
    undo_stack: Vec<CanvasCommand>,
    redo_stack: Vec<CanvasCommand>,
    limit: Option<usize>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn execute(&mut self, mut command: CanvasCommand, doc: &CanvasDocument) -> CanvasDocument {
        let next = command.apply(doc);
        self.undo_stack.push(command);
        self.redo_stack.clear();
        self.evict();
        next
    }

    /// Reverts the most recent command. An empty stack returns `doc` unchanged.
    pub fn undo(&mut self, doc: &CanvasDocument) -> CanvasDocument {
        let Some(mut command) = self.undo_stack.pop() else {
            return doc.clone();
        };
        let next = command.undo(doc);
        self.redo_stack.push(command);
        next
    }

    pub fn redo(&mut self, doc: &CanvasDocument) -> CanvasDocument {
        let Some(mut command) = self.redo_stack.pop() else {
            return doc.clone();
        };
        let next = command.apply(doc);
        self.undo_stack.push(command);
        next
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn peek_undo_label(&self) -> Option<&'static str> {
        self.undo_stack.last().map(CanvasCommand::label)
    }

    pub fn peek_redo_label(&self) -> Option<&'static str> {
        self.redo_stack.last().map(CanvasCommand::label)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn evict(&mut self) {
        if let Some(limit) = self.limit {
            if self.undo_stack.len() > limit {
                let excess = self.undo_stack.len() - limit;
                self.undo_stack.drain(..excess);
            }
        }
    }
}
