#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// The body broke off while streaming.
#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

/// Source of raw body chunks: a live HTTP response, or canned bytes in tests.
pub enum Chunks {
    Http(Response),
    #[cfg(test)]
    Canned(VecDeque<Bytes>),
}

impl Chunks {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Self::Http(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(chunks: VecDeque<Bytes>) -> Self {
        Self::Canned(chunks)
    }

    /// Returns the next chunk, or `None` at the end of the body.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Self::Http(response) => response
                .chunk()
                .await
                .map_err(|err| Error(format!("body stream failed: {err}"))),
            #[cfg(test)]
            Self::Canned(chunks) => Ok(chunks.pop_front()),
        }
    }
}
