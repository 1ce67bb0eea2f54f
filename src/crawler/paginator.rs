use std::collections::HashSet;
use url::Url;

/// Link-driven walk over a chain of paginated pages
///
/// Yields the first page, then whatever "next" link each fetched page
/// reports. A URL is never yielded twice, so a cyclic chain ends instead of
/// looping.
#[derive(Debug)]
pub struct PageChain {
    pending: Option<Url>,
    visited: HashSet<Url>,
}

impl PageChain {
    pub fn new(first: Url) -> Self {
        Self {
            pending: Some(first),
            visited: HashSet::new(),
        }
    }

    /// Takes the next page to fetch, if any
    pub fn next_page(&mut self) -> Option<Url> {
        let url = self.pending.take()?;
        self.visited.insert(url.clone());
        Some(url)
    }

    /// Records the "next" link found on the page just fetched
    pub fn follow(&mut self, next: Option<Url>) {
        self.pending = match next {
            Some(url) if self.visited.contains(&url) => {
                tracing::warn!("Pagination cycle back to {}, stopping", url);
                None
            }
            other => other,
        };
    }

    /// Number of pages handed out so far
    pub fn pages_visited(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(page: u32) -> Url {
        Url::parse(&format!("https://forum.example/viewforum.php?f=6&start={}", page * 25)).unwrap()
    }

    #[test]
    fn test_walks_finite_chain() {
        let mut chain = PageChain::new(url(0));
        let mut seen = Vec::new();

        while let Some(page) = chain.next_page() {
            seen.push(page.clone());
            let next = if seen.len() < 3 {
                Some(url(seen.len() as u32))
            } else {
                None
            };
            chain.follow(next);
        }

        assert_eq!(seen, vec![url(0), url(1), url(2)]);
        assert_eq!(chain.pages_visited(), 3);
    }

    #[test]
    fn test_stops_on_cycle() {
        let mut chain = PageChain::new(url(0));

        assert_eq!(chain.next_page(), Some(url(0)));
        chain.follow(Some(url(1)));
        assert_eq!(chain.next_page(), Some(url(1)));
        chain.follow(Some(url(0)));
        assert_eq!(chain.next_page(), None);
    }

    #[test]
    fn test_self_link_terminates() {
        let mut chain = PageChain::new(url(0));
        chain.next_page();
        chain.follow(Some(url(0)));
        assert_eq!(chain.next_page(), None);
        assert_eq!(chain.pages_visited(), 1);
    }
}
