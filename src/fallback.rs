//! Two-tier fallback: try a primary strategy, fall back to a second one.
//!
//! OCR (vision model → tesseract) and speech synthesis (neural voice → basic
//! voice) share the same shape: run the primary, keep its result only if it
//! passes a quality predicate, otherwise run the fallback. [`with_fallback`]
//! captures that once so both call sites stay a single expression.
//!
//! The fallback's result is taken as-is; the predicate only gates the
//! primary. When the fallback also fails, [`FallbackError`] carries both
//! causes so the caller can report them together.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Which tier produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    Fallback,
}

/// A value tagged with the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tiered<T> {
    pub value: T,
    pub tier: Tier,
}

/// Both tiers failed.
#[derive(Debug)]
pub struct FallbackError<E> {
    /// Error from the primary tier; `None` when the primary succeeded but its
    /// result was rejected by the quality predicate.
    pub primary: Option<E>,
    /// Error from the fallback tier.
    pub fallback: E,
}

impl<E: fmt::Display> FallbackError<E> {
    /// Human-readable description of the primary tier's outcome.
    pub fn primary_reason(&self) -> String {
        match &self.primary {
            Some(e) => e.to_string(),
            None => "result rejected as insufficient".to_string(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for FallbackError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "primary: {}; fallback: {}",
            self.primary_reason(),
            self.fallback
        )
    }
}

impl<E> std::error::Error for FallbackError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.fallback)
    }
}

/// Run `primary`; if it errors or `accept` rejects its value, run `fallback`.
///
/// `fallback` is only constructed (and therefore only does work) when the
/// primary is not accepted. It receives the primary's error, or `None` when
/// the primary's value was rejected.
pub async fn with_fallback<T, E, P, A, F, Fut>(
    primary: P,
    accept: A,
    fallback: F,
) -> Result<Tiered<T>, FallbackError<E>>
where
    P: Future<Output = Result<T, E>>,
    A: FnOnce(&T) -> bool,
    F: FnOnce(Option<&E>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let primary_err = match primary.await {
        Ok(value) => {
            if accept(&value) {
                return Ok(Tiered {
                    value,
                    tier: Tier::Primary,
                });
            }
            None
        }
        Err(e) => Some(e),
    };

    match fallback(primary_err.as_ref()).await {
        Ok(value) => Ok(Tiered {
            value,
            tier: Tier::Fallback,
        }),
        Err(fallback) => Err(FallbackError {
            primary: primary_err,
            fallback,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn accepted_primary_skips_fallback() {
        let ran = AtomicBool::new(false);
        let out = with_fallback(
            async { Ok::<_, String>("long enough".to_string()) },
            |s: &String| s.len() >= 5,
            |_| async {
                ran.store(true, Ordering::SeqCst);
                Ok("fallback".to_string())
            },
        )
        .await
        .unwrap();
        assert_eq!(out.tier, Tier::Primary);
        assert_eq!(out.value, "long enough");
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn rejected_primary_uses_fallback() {
        let out = with_fallback(
            async { Ok::<_, String>("ab".to_string()) },
            |s: &String| s.len() >= 5,
            |primary: Option<&String>| {
                assert!(primary.is_none());
                async { Ok("from fallback".to_string()) }
            },
        )
        .await
        .unwrap();
        assert_eq!(out.tier, Tier::Fallback);
        assert_eq!(out.value, "from fallback");
    }

    #[tokio::test]
    async fn failed_primary_uses_fallback() {
        let out = with_fallback(
            async { Err::<String, _>("boom".to_string()) },
            |_: &String| true,
            |primary: Option<&String>| {
                assert_eq!(primary.map(String::as_str), Some("boom"));
                async { Ok("rescued".to_string()) }
            },
        )
        .await
        .unwrap();
        assert_eq!(out.tier, Tier::Fallback);
    }

    #[tokio::test]
    async fn both_failing_reports_both() {
        let err = with_fallback(
            async { Err::<String, _>("primary down".to_string()) },
            |_: &String| true,
            |_| async { Err("fallback down".to_string()) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.primary.as_deref(), Some("primary down"));
        assert_eq!(err.fallback, "fallback down");
        assert!(err.to_string().contains("primary down"));
    }

    #[tokio::test]
    async fn rejected_primary_and_failed_fallback() {
        let err = with_fallback(
            async { Ok::<_, String>(String::new()) },
            |s: &String| !s.is_empty(),
            |_| async { Err("no detector".to_string()) },
        )
        .await
        .unwrap_err();
        assert!(err.primary.is_none());
        assert!(err.primary_reason().contains("rejected"));
    }
}
