use thiserror::Error;

pub const DEFAULT_TLDS: &[&str] = &["com", "net", "org", "io", "co"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TldError {
    #[error("TLD list is empty")]
    Empty,
    #[error("Invalid TLD: {0:?}")]
    Invalid(String),
}

pub fn default_tlds() -> Vec<String> {
    DEFAULT_TLDS.iter().map(|s| s.to_string()).collect()
}

/// Lowercases, strips a leading dot and drops duplicates while keeping the
/// configured order, which is part of the enumeration order.
pub fn normalize_tlds<I, S>(tlds: I) -> Result<Vec<String>, TldError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for raw in tlds {
        let tld = raw.as_ref().trim().trim_start_matches('.').to_lowercase();
        let valid = !tld.is_empty()
            && !tld.starts_with('-')
            && !tld.ends_with('-')
            && tld.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(TldError::Invalid(raw.as_ref().to_string()));
        }
        if !out.contains(&tld) {
            out.push(tld);
        }
    }

    if out.is_empty() {
        return Err(TldError::Empty);
    }
    Ok(out)
}
