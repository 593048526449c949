//! Shared rendering of [`AttributeSet`] into the `key=value, ...` text `tracing`'s
//! macros accept as a single dynamic field, since the set of keys isn't known until
//! runtime.

use relay_core::observability::AttributeSet;
use std::fmt::Write;

pub(crate) fn render(attributes: AttributeSet<'_>) -> String {
    let mut out = String::new();
    for (index, kv) in attributes.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}={}", kv.key, kv.value.as_tag());
    }
    out
}
