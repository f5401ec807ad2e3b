use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Synthetic per-row identifier column; never renamed and never catalogued as a field.
pub const ROW_KEY: &str = "rcd___id";

pub const FIELD_ID_SUFFIX_LEN: usize = 6;

const SLUG_FALLBACK: &str = "field";

/// Identity generated for one input column at table creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub field_id: Uuid,
    pub label: String,
    pub id: String,
}

/// Lower-cased ASCII slug using `_` as the only separator.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_separator = false;
    for ch in label.nfkd() {
        if !ch.is_ascii() || ch == '\'' {
            continue;
        }
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }
    slug.trim_matches('_').to_string()
}

pub fn random_suffix(length: usize) -> String {
    (0..length).map(|_| fastrand::alphabetic()).collect()
}

pub fn generate_field_id(label: &str) -> String {
    if label == ROW_KEY {
        return ROW_KEY.to_string();
    }
    let slug = slugify(label);
    let slug = if slug.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        slug
    };
    format!("{slug}_{}", random_suffix(FIELD_ID_SUFFIX_LEN))
}

pub fn generate_field_metadata<S: AsRef<str>>(columns: &[S]) -> Vec<FieldMetadata> {
    columns
        .iter()
        .map(|column| {
            let label = column.as_ref();
            FieldMetadata {
                field_id: Uuid::new_v4(),
                label: label.to_string(),
                id: generate_field_id(label),
            }
        })
        .collect()
}
