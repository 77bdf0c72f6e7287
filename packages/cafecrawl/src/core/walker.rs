//! Cutoff-bounded walk over a board's listing pages.

use std::collections::HashSet;

use crate::error::FetchError;

use super::{CafeSource, Cafe, KnownPostSet, ListingItem, window::DateWindow};

/// What to do when the listing reaches a post that is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownPostPolicy {
    /// Everything older is assumed stored too; end the walk.
    Stop,
    /// Keep scanning past it. Used when filling gaps in older windows.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    StoppedAtCutoff { page: u32 },
    StoppedAtKnownPost { page: u32, article_id: u64 },
    ExhaustedEmpty { page: u32 },
    AbortedOnError { page: u32, error: FetchError },
    PageLimitReached { page: u32 },
}

enum WalkState {
    Scanning { page: u32 },
    Done(WalkOutcome),
}

#[derive(Debug)]
pub struct Walk {
    /// New article ids, in listing order.
    pub article_ids: Vec<u64>,
    pub outcome: WalkOutcome,
}

pub struct ListingWalker<'a, S> {
    source: &'a S,
    cafe: &'a Cafe,
    board_id: u64,
    known: &'a KnownPostSet,
    policy: KnownPostPolicy,
}

impl<'a, S: CafeSource> ListingWalker<'a, S> {
    /// Highest listing page ever requested for a board.
    pub const LAST_PAGE: u32 = 999;

    pub fn new(
        source: &'a S,
        cafe: &'a Cafe,
        board_id: u64,
        known: &'a KnownPostSet,
        policy: KnownPostPolicy,
    ) -> Self {
        Self {
            source,
            cafe,
            board_id,
            known,
            policy,
        }
    }

    /// Walks pages from `start_page` until a terminal state is reached.
    /// Listing errors end the walk; ids found before the error are kept.
    pub async fn walk(&self, window: &DateWindow, start_page: u32) -> Walk {
        let mut seen = HashSet::new();
        let mut article_ids = vec![];
        let mut state = WalkState::Scanning {
            page: start_page.max(1),
        };

        loop {
            let page = match state {
                WalkState::Scanning { page } => page,
                WalkState::Done(outcome) => {
                    return Walk {
                        article_ids,
                        outcome,
                    };
                }
            };
            if page > Self::LAST_PAGE {
                state = WalkState::Done(WalkOutcome::PageLimitReached {
                    page: Self::LAST_PAGE,
                });
                continue;
            }

            tracing::debug!(board = self.board_id, page, "Fetching listing page");
            state = match self.source.listing_page(self.cafe, self.board_id, page).await {
                Err(error) => WalkState::Done(WalkOutcome::AbortedOnError { page, error }),
                Ok(items) if items.is_empty() => {
                    WalkState::Done(WalkOutcome::ExhaustedEmpty { page })
                }
                Ok(items) => self.scan(page, &items, window, &mut seen, &mut article_ids),
            };
        }
    }

    fn scan(
        &self,
        page: u32,
        items: &[ListingItem],
        window: &DateWindow,
        seen: &mut HashSet<u64>,
        article_ids: &mut Vec<u64>,
    ) -> WalkState {
        for item in items {
            if item.written_at < window.cutoff() {
                return WalkState::Done(WalkOutcome::StoppedAtCutoff { page });
            }
            if window.until().is_some_and(|until| item.written_at >= until) {
                continue;
            }
            if self.known.contains(&self.cafe.name, item.article_id) {
                match self.policy {
                    KnownPostPolicy::Stop => {
                        return WalkState::Done(WalkOutcome::StoppedAtKnownPost {
                            page,
                            article_id: item.article_id,
                        });
                    }
                    KnownPostPolicy::Skip => continue,
                }
            }
            // Listings shift while we page, so the same post can show up twice.
            if seen.insert(item.article_id) {
                article_ids.push(item.article_id);
            }
        }
        WalkState::Scanning { page: page + 1 }
    }
}
