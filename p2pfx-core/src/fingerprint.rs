//! Row fingerprints for full-row deduplication.
//!
//! Rows carry `f64` columns, so they cannot derive `Eq`/`Hash`. Instead every
//! field is fed into a BLAKE3 hasher in column order with a presence tag and a
//! length prefix, so `None` never collides with an empty string and adjacent
//! string columns never run together. Floats hash by bit pattern.

/// Incremental, field-by-field row hasher.
pub struct RowHasher {
    inner: blake3::Hasher,
}

impl RowHasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.inner.update(&[1]);
        self.inner.update(&(value.len() as u64).to_le_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    pub fn opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.str(v),
            None => {
                self.inner.update(&[0]);
                self
            }
        }
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.inner.update(&[1]);
        self.inner.update(&value.to_bits().to_le_bytes());
        self
    }

    pub fn opt_f64(&mut self, value: Option<f64>) -> &mut Self {
        match value {
            Some(v) => self.f64(v),
            None => {
                self.inner.update(&[0]);
                self
            }
        }
    }

    pub fn int(&mut self, value: i64) -> &mut Self {
        self.inner.update(&[1]);
        self.inner.update(&value.to_le_bytes());
        self
    }

    pub fn finish(&self) -> blake3::Hash {
        self.inner.finalize()
    }
}

impl Default for RowHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_differs_from_empty_string() {
        let a = RowHasher::new().opt_str(None).finish();
        let b = RowHasher::new().opt_str(Some("")).finish();
        assert_ne!(a, b);
    }

    #[test]
    fn adjacent_strings_do_not_run_together() {
        let a = RowHasher::new().str("ab").str("c").finish();
        let b = RowHasher::new().str("a").str("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn identical_fields_hash_identically() {
        let a = RowHasher::new().int(3).f64(7.05).opt_f64(None).finish();
        let b = RowHasher::new().int(3).f64(7.05).opt_f64(None).finish();
        assert_eq!(a, b);
    }
}
