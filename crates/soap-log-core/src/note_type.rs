//! Note types chosen on the form and the header colors they map to.

use serde::{Deserialize, Serialize};

/// Note type chosen on the form. Unrecognized answers are kept verbatim
/// because new form options can appear before this table is updated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    DirectTherapy,
    Supervision,
    ParentTraining,
    CaregiverReadiness,
    Other(String),
}

impl NoteType {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "Direct Therapy" => Self::DirectTherapy,
            "Supervision" => Self::Supervision,
            "Parent Training" => Self::ParentTraining,
            "Caregiver Readiness" => Self::CaregiverReadiness,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn display(&self) -> &str {
        match self {
            Self::DirectTherapy => "Direct Therapy",
            Self::Supervision => "Supervision",
            Self::ParentTraining => "Parent Training",
            Self::CaregiverReadiness => "Caregiver Readiness",
            Self::Other(raw) => raw,
        }
    }

    /// Header background for the note table.
    #[must_use]
    pub fn header_color(&self) -> Option<&'static str> {
        match self {
            Self::DirectTherapy => Some("#cfe2f3"),
            Self::Supervision => Some("#d9d2e9"),
            Self::ParentTraining => Some("#d9ead3"),
            Self::CaregiverReadiness => Some("#fff2cc"),
            Self::Other(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_have_fixed_colors() {
        for (label, color) in [
            ("Direct Therapy", "#cfe2f3"),
            ("Supervision", "#d9d2e9"),
            ("Parent Training", "#d9ead3"),
            ("Caregiver Readiness", "#fff2cc"),
        ] {
            let note_type = NoteType::parse(label);
            assert_eq!(note_type.display(), label);
            assert_eq!(note_type.header_color(), Some(color));
        }
    }

    #[test]
    fn unknown_types_keep_raw_text_without_color() {
        let note_type = NoteType::parse("Group Session");
        assert_eq!(note_type, NoteType::Other("Group Session".to_string()));
        assert_eq!(note_type.display(), "Group Session");
        assert_eq!(note_type.header_color(), None);

        let empty = NoteType::parse("");
        assert_eq!(empty.display(), "");
    }
}
