use canvas::{apply_operation, CanvasCommand, CanvasDocument, CanvasNode, CommandHistory, Operation};
use tracing::{debug, info};

use crate::{DebouncedPersister, RealtimeEvent};

/// The document an orchestrator renders, its local undo history and the
/// snapshot writer, kept in step.
///
/// Local edits go through `execute`/`undo`/`redo`. Server-ordered operations go
/// through `apply_remote`, which uses the same reducer but never touches local
/// history. Every change schedules a debounced snapshot write.
pub struct CanvasStore {
    document: CanvasDocument,
    history: CommandHistory,
    persister: Option<DebouncedPersister>,
}

impl CanvasStore {
    pub fn new(document: CanvasDocument) -> Self {
        Self {
            document,
            history: CommandHistory::new(),
            persister: None,
        }
    }

    /// Resumes from the persister's snapshot, or starts empty. Loading is a bulk
    /// load and leaves no history entry.
    pub fn hydrate(persister: DebouncedPersister) -> Self {
        let document = match persister.load() {
            Some(snapshot) => {
                info!(
                    version = snapshot.document.version,
                    nodes = snapshot.document.len(),
                    "resumed canvas from snapshot"
                );
                snapshot.document
            }
            None => CanvasDocument::empty(),
        };
        Self::new(document).with_persister(persister)
    }

    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_persister(mut self, persister: DebouncedPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn document(&self) -> &CanvasDocument {
        &self.document
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn execute(&mut self, command: CanvasCommand) -> &CanvasDocument {
        let next = self.history.execute(command, &self.document);
        self.commit(next)
    }

    pub fn undo(&mut self) -> &CanvasDocument {
        if !self.history.can_undo() {
            return &self.document;
        }
        let next = self.history.undo(&self.document);
        self.commit(next)
    }

    pub fn redo(&mut self) -> &CanvasDocument {
        if !self.history.can_redo() {
            return &self.document;
        }
        let next = self.history.redo(&self.document);
        self.commit(next)
    }

    pub fn apply_remote(&mut self, op: &Operation) -> &CanvasDocument {
        let next = apply_operation(&self.document, op);
        self.commit(next)
    }

    /// Replaces every node from an authoritative bulk sync. Local history no
    /// longer describes the document afterwards and is cleared.
    pub fn replace_from_init(&mut self, nodes: impl IntoIterator<Item = CanvasNode>) -> &CanvasDocument {
        self.history.clear();
        let next = apply_operation(&self.document, &Operation::set_nodes(nodes));
        self.commit(next)
    }

    /// Folds a server event into the document: `Init` replaces every node,
    /// ordered operations go through the reducer. Returns whether the document
    /// changed.
    pub fn apply_event(&mut self, event: &RealtimeEvent) -> bool {
        if let RealtimeEvent::Init { nodes, version, .. } = event {
            debug!(version, nodes = nodes.len(), "replacing canvas from init");
            self.replace_from_init(nodes.iter().cloned());
            return true;
        }
        match event.operation() {
            Some(op) => {
                debug!(op = op.name(), "applying server-ordered operation");
                self.apply_remote(op);
                true
            }
            None => false,
        }
    }

    pub fn flush(&mut self) {
        if let Some(persister) = &mut self.persister {
            persister.flush();
        }
    }

    fn commit(&mut self, next: CanvasDocument) -> &CanvasDocument {
        self.document = next;
        if let Some(persister) = &mut self.persister {
            persister.schedule(&self.document);
        }
        &self.document
    }
}
