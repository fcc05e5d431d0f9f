use std::future::Future;

/// One page of a listing API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Page<T> {
        Page { items, next_token }
    }
}

/// Fetches every page, following continuation tokens until one is absent,
/// and concatenates the items in response order. The first error aborts
/// the listing and nothing fetched so far is returned.
///
/// AWS APIs occasionally answer with an empty continuation token on the
/// last page, so `Some("")` is treated the same as `None`.
pub async fn collect_pages<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut next_token = None;
    loop {
        let page = fetch(next_token.take()).await?;
        items.extend(page.items);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(items)
}
