// Integer wire codes
//
// Enumerations that cross a wire boundary are persisted as integers. Decoding an
// integer that maps to no variant is always an error; readers never guess.

use thiserror::Error;

/// An integer code that does not correspond to any variant of the named enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {code}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: i32,
}

impl UnknownCode {
    pub fn new(kind: &'static str, code: i32) -> Self {
        Self { kind, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_code_display() {
        let err = UnknownCode::new("process instance state", 42);
        assert_eq!(err.to_string(), "unknown process instance state code: 42");
    }
}
