use serde::{Deserialize, Serialize};

/// How a detected value is rewritten (spec §4.5 "Masking strategies are
/// per-pattern: full replacement, partial (first/last visible),
/// domain-preserving (email), length-based"). Grounded on the teacher's
/// `MaskingType::{FullMask, PartialMask, PartialMaskFirst, EmailMask}`
/// match arms in `apply_masking`, narrowed to the strategies the spec
/// names (the teacher's `Shuffle`/`Substitution`/`Hash`/`FormatPreserving`
/// variants serve a table/column data-masking use case this crate does
/// not have).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskingStrategy {
    /// Replace the whole value with a fixed string.
    FullReplacement(String),
    /// Keep the first `show_first` characters, mask the rest.
    PartialFirst { show_first: usize },
    /// Keep the last `show_last` characters, mask the rest.
    PartialLast { show_last: usize },
    /// Email-specific: keep the domain, mask the local part down to its
    /// first character.
    DomainPreserving,
    /// Replace every character with `*`, preserving length.
    LengthBased,
}

impl MaskingStrategy {
    pub fn apply(&self, value: &str) -> String {
        match self {
            MaskingStrategy::FullReplacement(replacement) => replacement.clone(),

            MaskingStrategy::PartialFirst { show_first } => {
                let chars: Vec<char> = value.chars().collect();
                if chars.len() <= *show_first {
                    "*".repeat(chars.len())
                } else {
                    let visible: String = chars[..*show_first].iter().collect();
                    format!("{visible}{}", "*".repeat(chars.len() - show_first))
                }
            }

            MaskingStrategy::PartialLast { show_last } => {
                let chars: Vec<char> = value.chars().collect();
                if chars.len() <= *show_last {
                    "*".repeat(chars.len())
                } else {
                    let prefix_len = chars.len() - show_last;
                    let visible: String = chars[prefix_len..].iter().collect();
                    format!("{}{visible}", "*".repeat(prefix_len))
                }
            }

            MaskingStrategy::DomainPreserving => mask_email(value),

            MaskingStrategy::LengthBased => "*".repeat(value.chars().count()),
        }
    }
}

fn mask_email(value: &str) -> String {
    match value.find('@') {
        Some(at_pos) => {
            let (local, domain) = value.split_at(at_pos);
            let masked_local = if local.chars().count() <= 1 {
                "*".repeat(local.chars().count())
            } else {
                let mut chars = local.chars();
                let first = chars.next().unwrap();
                format!("{first}{}", "*".repeat(chars.count()))
            };
            format!("{masked_local}{domain}")
        }
        None => "*".repeat(value.chars().count()),
    }
}
