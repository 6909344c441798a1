//! Field-wise configuration override.
//!
//! Every configuration object is an explicit record with enumerated fields
//! and documented defaults; partial overrides combine via field-wise
//! override with the documented default. This module gives that convention a
//! name so every config struct in the workspace implements the same trait
//! instead of hand-rolling merge logic per type.

/// A configuration type with a documented default that can be selectively
/// overridden by a partial version of itself.
///
/// Implementors are plain structs; `Partial` is typically the same struct with
/// every field wrapped in `Option`.
pub trait Merge: Sized {
    /// The partial/override representation — every field optional.
    type Partial;

    /// Combines `self` (the documented default) with `partial`, letting any
    /// `Some` field in `partial` take precedence.
    fn merge(self, partial: Self::Partial) -> Self;
}

/// Overrides `base` with `override_` when the latter is `Some`.
pub fn override_or<T>(base: T, override_: Option<T>) -> T {
    override_.unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Limits {
        max_requests: u32,
        window_ms: u64,
    }

    #[derive(Debug, Default)]
    struct PartialLimits {
        max_requests: Option<u32>,
        window_ms: Option<u64>,
    }

    impl Merge for Limits {
        type Partial = PartialLimits;

        fn merge(self, partial: Self::Partial) -> Self {
            Self {
                max_requests: override_or(self.max_requests, partial.max_requests),
                window_ms: override_or(self.window_ms, partial.window_ms),
            }
        }
    }

    #[test]
    fn merge_overrides_only_provided_fields() {
        let base = Limits {
            max_requests: 10,
            window_ms: 1000,
        };
        let merged = base.clone().merge(PartialLimits {
            max_requests: Some(20),
            window_ms: None,
        });
        assert_eq!(
            merged,
            Limits {
                max_requests: 20,
                window_ms: 1000
            }
        );
    }
}
