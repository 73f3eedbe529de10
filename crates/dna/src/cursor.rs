//! Replay cursor over a sealed record

use crate::action::DnaAction;
use crate::dna::Dna;

/// Iterates the actions of a [`Dna`] in emission order, across sections.
///
/// The cursor can be rewound with [`DnaCursor::reset`] to replay again.
#[derive(Debug, Clone)]
pub struct DnaCursor<'a> {
    dna: &'a Dna,
    position: usize,
}

impl<'a> DnaCursor<'a> {
    pub(crate) const fn new(dna: &'a Dna) -> Self {
        Self { dna, position: 0 }
    }

    /// Record being replayed
    #[must_use]
    pub const fn dna(&self) -> &'a Dna {
        self.dna
    }

    /// Total number of actions in the record
    #[must_use]
    pub fn len(&self) -> usize {
        self.dna.action_count()
    }

    /// Whether the record has no actions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of actions already returned
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Next action without advancing
    #[must_use]
    pub fn peek(&self) -> Option<&'a DnaAction> {
        self.dna.actions().get(self.position)
    }

    /// Rewind to the first action
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl<'a> Iterator for DnaCursor<'a> {
    type Item = &'a DnaAction;

    fn next(&mut self) -> Option<Self::Item> {
        let action = self.peek()?;
        self.position += 1;
        Some(action)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len() - self.position;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DnaValue;
    use crate::writer::DnaWriter;
    use tessera_identity::{GroupId, ObjectId};

    #[test]
    fn test_cursor_replays_across_sections() {
        let mut writer = DnaWriter::delta(ObjectId::encode(1, GroupId::new(0)), "Log", 1);
        writer.add_logical_action(1, vec![DnaValue::Int(1)]);
        writer.mark_section_end();
        writer.add_logical_action(1, vec![DnaValue::Int(2)]);
        writer.mark_section_end();
        writer.add_logical_action(1, vec![DnaValue::Int(3)]);
        let dna = writer.finalize_dna().unwrap();

        let mut cursor = dna.cursor();
        assert_eq!(cursor.len(), 3);

        let first: Vec<_> = cursor.by_ref().cloned().collect();
        assert_eq!(cursor.position(), 3);
        assert!(cursor.next().is_none());

        cursor.reset();
        assert_eq!(cursor.peek(), first.first());
        let second: Vec<_> = cursor.cloned().collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            (1..=3)
                .map(|i| DnaAction::Logical {
                    method: 1,
                    params: vec![DnaValue::Int(i)],
                })
                .collect::<Vec<_>>()
        );
    }
}
