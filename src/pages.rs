use std::fmt;

use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::prober::Prober;
use crate::template::PageTemplate;

/// A page URL confirmed to exist at the moment it was yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrl {
    pub index: u32,
    pub url: String,
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.url)
    }
}

/// Lazily yields the pages of a chapter, starting at `start`.
///
/// Each pull probes the next index; the stream ends at the first index the
/// prober reports missing. Indices are contiguous and strictly increasing, so
/// a hole in the chapter truncates it there. Every call starts a fresh cursor.
pub fn page_urls<'a, P>(
    template: &'a PageTemplate,
    start: u32,
    prober: &'a P,
) -> impl Stream<Item = PageUrl> + 'a
where
    P: Prober + ?Sized,
{
    stream::unfold(Some(start), move |cursor| async move {
        let index = cursor?;
        let url = template.bind_page(index);

        if !prober.exists(&url).await {
            debug!("Page {} not found at {}, end of sequence", index, url);
            return None;
        }

        Some((PageUrl { index, url }, index.checked_add(1)))
    })
}
