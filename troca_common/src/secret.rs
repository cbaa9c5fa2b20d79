use std::{
    fmt,
    fmt::{Debug, Display},
};

/// Keeps credentials (the PIX gateway access token, database passwords) from leaking into logs or error chains.
///
/// Both `Debug` and `Display` render as `****`, so a `Secret` is safe to embed in config structs that get dumped at
/// startup. The only way at the value is an explicit [`reveal`](Secret::reveal) at the point it is actually needed,
/// e.g. when building an `Authorization` header.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }

    /// Consumes the wrapper. For handing the credential to an API that wants ownership.
    pub fn reveal_owned(self) -> T {
        self.value
    }
}

impl<T: Clone + Default> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
