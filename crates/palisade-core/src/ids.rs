//! Object-type identifier derivation
//!
//! Application models carry mixed-case, namespace-separated type labels
//! (`BillingAccount`, `Admin::Invoice`). The policy schema and the wire
//! protocol use lowercase underscore names (`billing_account`,
//! `admin/invoice`). [`object_type_from_label`] is the single place that
//! mapping happens; every operation that turns a record into an object type
//! goes through it, so call sites cannot drift apart.

use crate::error::{PalisadeError, Result};

/// Derives the canonical object-type name from an application type label.
///
/// `::` becomes `/`, an underscore is inserted at acronym boundaries
/// (`HTTPServer` → `http_server`) and between a lowercase letter or digit
/// and an uppercase letter (`BillingAccount` → `billing_account`,
/// `S3Bucket` → `s3_bucket`), hyphens become underscores, and the result is
/// lowercased. The function is pure and idempotent; a label that normalizes
/// to the empty string is an error rather than a silent empty type.
pub fn object_type_from_label(label: &str) -> Result<String> {
    let flattened = label.replace("::", "/");
    let chars: Vec<char> = flattened.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let after_word = matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit());
            let acronym_end = matches!(prev, Some(p) if p.is_ascii_uppercase())
                && matches!(next, Some(n) if n.is_ascii_lowercase());
            if after_word || acronym_end {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.extend(c.to_lowercase());
        }
    }

    if out.is_empty() {
        return Err(PalisadeError::invalid_identifier(label));
    }
    Ok(out)
}
