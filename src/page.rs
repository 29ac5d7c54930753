use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Raw attribute snapshot of one visible pin element.
///
/// The fingerprint is derived from the element's rendered position and
/// attributes and is only stable within a single pass; after a scroll the
/// page reflows and fingerprints must be regenerated.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawPin {
    pub fingerprint: String,
    pub image_src: Option<String>,
    pub pin_href: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// The scrollable, queryable feed view the collection loop drives.
///
/// Implemented by the live browser page; tests script a fake.
#[async_trait]
pub trait PinFeed {
    /// Wait until at least one pin element is attached. Returns `false` on
    /// timeout, which the loop treats as end of content.
    async fn wait_for_pins(&self, timeout: Duration) -> Result<bool>;

    /// Snapshot all currently attached pin elements. Per-element read
    /// failures are swallowed inside the snapshot, never surfaced here.
    async fn visible_pins(&self) -> Result<Vec<RawPin>>;

    async fn scroll_to_bottom(&self) -> Result<()>;

    async fn scroll_height(&self) -> Result<i64>;
}
