use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for personal data (attendee emails, mostly) that masks its value
/// in Debug/Display output so it cannot leak through log macros.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // API responses and the mailer need the real value; the wrapper only
        // guards Debug/Display, i.e. tracing::info!("{:?}", ...).
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    /// Borrow the wrapped value for intentional use (sending mail).
    pub fn expose(&self) -> &T {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let email = Masked("ana@example.com".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(email.expose(), "ana@example.com");
    }
}
