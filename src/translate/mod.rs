//! Identity and metadata translation between the virtual and host clusters

pub mod keys;
pub mod selector;
mod translator;

pub use keys::*;
pub use selector::{label_selector_matches, parse_selector_string, selector_string};
pub use translator::{gvk_of, gvk_string, safe_concat_name, NamespaceMode, OwnershipRecord, Translator};
