//! Local edits held back while a remote edit is being applied.

use tandem_shared::operation::Operation;

/// A local change waiting to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub path: String,
    pub changes: Vec<Operation>,
}

/// Gate between remote edit application and local edit submission.
///
/// While a remote edit is in progress every local edit is parked; once the
/// remote edit completes the parked edits are released in submission order.
#[derive(Debug, Default)]
pub struct EditBuffer {
    applying_remote: bool,
    pending: Vec<PendingEdit>,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_remote(&mut self) {
        self.applying_remote = true;
    }

    /// Returns the edit back when it may be sent right away
    pub fn submit_local(&mut self, edit: PendingEdit) -> Option<PendingEdit> {
        if self.applying_remote {
            self.pending.push(edit);
            None
        } else {
            Some(edit)
        }
    }

    /// End the remote application and release parked edits
    pub fn finish_remote(&mut self) -> Vec<PendingEdit> {
        self.applying_remote = false;
        std::mem::take(&mut self.pending)
    }

    pub fn is_applying_remote(&self) -> bool {
        self.applying_remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(text: &str) -> PendingEdit {
        PendingEdit {
            path: "main.rs".to_string(),
            changes: vec![Operation::insert(0, text, "alice", 0, 1000)],
        }
    }

    #[test]
    fn test_local_edit_passes_through_when_idle() {
        // テスト項目: リモート適用中でなければローカル編集はそのまま送信できる
        let mut buffer = EditBuffer::new();

        assert_eq!(buffer.submit_local(edit("a")), Some(edit("a")));
        assert!(buffer.finish_remote().is_empty());
    }

    #[test]
    fn test_local_edits_are_parked_during_remote_apply() {
        // テスト項目: リモート適用中のローカル編集は保留され、完了時に投入順で解放される
        // given (前提条件):
        let mut buffer = EditBuffer::new();
        buffer.begin_remote();

        // when (操作):
        let first = buffer.submit_local(edit("a"));
        let second = buffer.submit_local(edit("b"));
        let released = buffer.finish_remote();

        // then (期待する結果):
        assert_eq!(first, None);
        assert_eq!(second, None);
        assert_eq!(released, vec![edit("a"), edit("b")]);
        assert!(!buffer.is_applying_remote());
        assert_eq!(buffer.submit_local(edit("c")), Some(edit("c")));
    }
}
