use std::fmt;

use serde::{Deserialize, Serialize};

/// One persisted slot of a logic version's storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub label: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl StorageSlot {
    pub fn new(label: &str, ty: &str) -> Self {
        Self {
            label: label.to_string(),
            ty: ty.to_string(),
        }
    }
}

impl fmt::Display for StorageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.ty)
    }
}

/// Ordered storage layout declared by a logic version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub slots: Vec<StorageSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("slot {index} changed from `{previous}` to `{next}`")]
    Changed {
        index: usize,
        previous: StorageSlot,
        next: StorageSlot,
    },
    #[error("slot {index} (`{previous}`) was removed")]
    Removed { index: usize, previous: StorageSlot },
}

impl StorageLayout {
    pub fn from_slots(slots: &[(&str, &str)]) -> Self {
        Self {
            slots: slots
                .iter()
                .map(|(label, ty)| StorageSlot::new(label, ty))
                .collect(),
        }
    }

    /// Appends slots after the existing ones.
    pub fn extended(&self, extra: &[(&str, &str)]) -> Self {
        let mut next = self.clone();
        next.slots
            .extend(extra.iter().map(|(label, ty)| StorageSlot::new(label, ty)));
        next
    }

    /// `self` may replace `previous` only if every previous slot keeps its
    /// position, label and type; new slots may only be appended.
    pub fn check_extends(&self, previous: &StorageLayout) -> Result<(), LayoutError> {
        for (index, old) in previous.slots.iter().enumerate() {
            match self.slots.get(index) {
                Some(new) if new == old => {}
                Some(new) => {
                    return Err(LayoutError::Changed {
                        index,
                        previous: old.clone(),
                        next: new.clone(),
                    })
                }
                None => {
                    return Err(LayoutError::Removed {
                        index,
                        previous: old.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}
