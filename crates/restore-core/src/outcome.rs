use std::fmt;

/// Result of a mutator or an asynchronous provider.
///
/// Dispatch treats `Cancelled` as a silent abort: no state write, no event,
/// no middleware call.
#[must_use]
pub enum Outcome<T> {
    Ready(T),
    Failed(anyhow::Error),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        Outcome::Failed(err.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ready(v) => Outcome::Ready(f(v)),
            Outcome::Failed(err) => Outcome::Failed(err),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Ready(v) => f(v),
            Outcome::Failed(err) => Outcome::Failed(err),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<anyhow::Error>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Outcome::Ready(v),
            Err(err) => Outcome::Failed(err.into()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Outcome::Failed(err) => f.debug_tuple("Failed").field(&format_args!("{err:#}")).finish(),
            Outcome::Cancelled => f.write_str("Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_result() {
        let ok: Outcome<i32> = Ok::<_, std::io::Error>(3).into();
        assert_eq!(ok.ok(), Some(3));

        let err: Outcome<i32> = Err::<i32, _>(std::io::Error::other("boom")).into();
        assert!(err.is_failed());
        assert_eq!(err.error().map(|e| e.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn test_cancelled_survives_combinators() {
        let out: Outcome<i32> = Outcome::Cancelled;
        let mapped = out.map(|v| v + 1).and_then(|v| Outcome::Ready(v * 2));
        assert!(mapped.is_cancelled());
    }
}
