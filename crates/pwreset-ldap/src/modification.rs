//! Atomic multi-attribute modification requests.

use std::fmt;

use crate::Result;
use pwreset_core::Error;

/// Kind of change applied to one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    /// Add values.
    Add,
    /// Delete values.
    Delete,
    /// Replace all values.
    Replace,
}

/// LDAP modification of a single attribute.
///
/// Values are raw bytes so binary attributes such as `unicodePwd` travel unchanged.
#[derive(Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<Vec<u8>>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete.
        values: Vec<Vec<u8>>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<Vec<u8>>,
    },
}

impl DirectoryModification {
    /// Builds a modification from its parts.
    #[must_use]
    pub fn new(
        operation: ModifyOperation,
        attribute: impl Into<String>,
        values: Vec<Vec<u8>>,
    ) -> Self {
        let attribute = attribute.into();
        match operation {
            ModifyOperation::Add => Self::Add { attribute, values },
            ModifyOperation::Delete => Self::Delete { attribute, values },
            ModifyOperation::Replace => Self::Replace { attribute, values },
        }
    }

    /// Replaces `attribute` with a single text value.
    #[must_use]
    pub fn replace_text(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            ModifyOperation::Replace,
            attribute,
            vec![value.into().into_bytes()],
        )
    }

    /// Replaces `attribute` with a single binary value.
    #[must_use]
    pub fn replace_binary(attribute: impl Into<String>, value: Vec<u8>) -> Self {
        Self::new(ModifyOperation::Replace, attribute, vec![value])
    }

    /// Kind of change.
    #[must_use]
    pub const fn operation(&self) -> ModifyOperation {
        match self {
            Self::Add { .. } => ModifyOperation::Add,
            Self::Delete { .. } => ModifyOperation::Delete,
            Self::Replace { .. } => ModifyOperation::Replace,
        }
    }

    /// Attribute being changed.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Delete { attribute, .. }
            | Self::Replace { attribute, .. } => attribute,
        }
    }

    /// Values carried by the change.
    #[must_use]
    pub fn values(&self) -> &[Vec<u8>] {
        match self {
            Self::Add { values, .. }
            | Self::Delete { values, .. }
            | Self::Replace { values, .. } => values,
        }
    }
}

// Values routinely hold credentials, so only their count is printed.
impl fmt::Debug for DirectoryModification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryModification")
            .field("operation", &self.operation())
            .field("attribute", &self.attribute())
            .field("values", &self.values().len())
            .finish()
    }
}

/// Ordered list of modifications applied to one entry in a single request.
///
/// The directory commits every change or none. Construction enforces that the list is non-empty
/// and every change names an attribute and carries at least one value, so an invalid request is
/// rejected before any network traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationRequest {
    changes: Vec<DirectoryModification>,
}

impl ModificationRequest {
    /// Validates and wraps a list of modifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModification`] for an empty list, a blank attribute name or a
    /// change without values.
    pub fn new(changes: Vec<DirectoryModification>) -> Result<Self> {
        if changes.is_empty() {
            return Err(Error::InvalidModification(
                "modification request has no changes".to_string(),
            ));
        }

        for (index, change) in changes.iter().enumerate() {
            if change.attribute().trim().is_empty() {
                return Err(Error::InvalidModification(format!(
                    "change {index} has no attribute name"
                )));
            }
            if change.values().is_empty() {
                return Err(Error::InvalidModification(format!(
                    "change {index} on `{}` has no values",
                    change.attribute()
                )));
            }
        }

        Ok(Self { changes })
    }

    /// The changes in application order.
    #[must_use]
    pub fn changes(&self) -> &[DirectoryModification] {
        &self.changes
    }

    /// Number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Always false for a constructed request.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Names of the attributes touched, in order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> + '_ {
        self.changes.iter().map(DirectoryModification::attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_valid_request() {
        let request = ModificationRequest::new(vec![
            DirectoryModification::replace_binary("unicodePwd", vec![0x22, 0x00, 0x22, 0x00]),
            DirectoryModification::replace_text("pwdLastSet", "0"),
        ])
        .unwrap();

        assert_eq!(request.len(), 2);
        assert!(!request.is_empty());
        assert_eq!(
            request.attributes().collect::<Vec<_>>(),
            vec!["unicodePwd", "pwdLastSet"]
        );
        assert_eq!(request.changes()[1].values(), &[b"0".to_vec()]);
        assert_eq!(request.changes()[1].operation(), ModifyOperation::Replace);
    }

    #[test]
    fn rejects_empty_request() {
        assert!(matches!(
            ModificationRequest::new(Vec::new()),
            Err(Error::InvalidModification(_))
        ));
    }

    #[test]
    fn rejects_blank_attribute() {
        let err = ModificationRequest::new(vec![
            DirectoryModification::replace_text("pwdLastSet", "0"),
            DirectoryModification::replace_text(" ", "x"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidModification("change 1 has no attribute name".to_string())
        );
    }

    #[test]
    fn rejects_change_without_values() {
        for operation in [
            ModifyOperation::Add,
            ModifyOperation::Delete,
            ModifyOperation::Replace,
        ] {
            let changes = vec![DirectoryModification::new(operation, "info", vec![])];
            let err = ModificationRequest::new(changes).unwrap_err();
            assert!(matches!(err, Error::InvalidModification(_)));
        }
    }

    #[test]
    fn debug_hides_values() {
        let change = DirectoryModification::replace_text("info", "Ab3@xY9k");
        let debug = format!("{change:?}");
        assert!(!debug.contains("Ab3@xY9k"));
        assert!(debug.contains("info"));
    }
}
