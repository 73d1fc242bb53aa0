//! Deferred branch targets.
//!
//! A label is created before the code it points to exists. Branches record
//! themselves as sources; the target is set once the target instruction is
//! emitted. Indices are positions in the owning function's instruction list.

use std::fmt;

use zlang_core::InternalError;

/// Identifies a label within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A branch target with the instructions branching to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label {
    sources: Vec<usize>,
    target: Option<usize>,
}

impl Label {
    /// Instructions branching to this label, in emission order.
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }
}

/// The labels of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<Label>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an untargeted label.
    pub fn create(&mut self) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(Label::default());
        id
    }

    /// Record the branch at `instruction` as a source of `label`.
    pub fn add_source(&mut self, label: LabelId, instruction: usize) {
        if let Some(l) = self.labels.get_mut(label.0 as usize) {
            l.sources.push(instruction);
        }
    }

    /// Point `label` at `instruction`.
    pub fn set_target(&mut self, label: LabelId, instruction: usize) -> Result<(), InternalError> {
        let l = self
            .labels
            .get_mut(label.0 as usize)
            .ok_or_else(|| InternalError::Invariant(format!("unknown label {label}")))?;
        match l.target {
            Some(existing) if existing != instruction => Err(InternalError::Invariant(format!(
                "label {label} retargeted from {existing} to {instruction}"
            ))),
            _ => {
                l.target = Some(instruction);
                Ok(())
            }
        }
    }

    pub fn get(&self, label: LabelId) -> Option<&Label> {
        self.labels.get(label.0 as usize)
    }

    /// The target of `label`; an untargeted label is an internal error.
    pub fn resolve(&self, label: LabelId, function: &str) -> Result<usize, InternalError> {
        self.get(label)
            .and_then(Label::target)
            .ok_or_else(|| InternalError::UntargetedLabel {
                function: function.to_string(),
                label: label.0 as usize,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &Label)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| (LabelId(i as u32), l))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_accumulate_and_target_resolves() {
        let mut labels = LabelTable::new();
        let exit = labels.create();
        labels.add_source(exit, 2);
        labels.add_source(exit, 7);
        labels.set_target(exit, 9).unwrap();

        assert_eq!(labels.get(exit).unwrap().sources(), &[2, 7]);
        assert_eq!(labels.resolve(exit, "main"), Ok(9));
    }

    #[test]
    fn untargeted_label_is_internal_error() {
        let mut labels = LabelTable::new();
        let dangling = labels.create();
        labels.add_source(dangling, 0);
        assert_eq!(
            labels.resolve(dangling, "f"),
            Err(InternalError::UntargetedLabel {
                function: "f".to_string(),
                label: 0
            })
        );
    }

    #[test]
    fn target_is_set_once() {
        let mut labels = LabelTable::new();
        let l = labels.create();
        labels.set_target(l, 3).unwrap();
        labels.set_target(l, 3).unwrap();
        assert!(labels.set_target(l, 4).is_err());
    }
}
