use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::{rng, Rng};
use tracing::{debug, info};

use crate::db::PinRecord;
use crate::extract;
use crate::page::PinFeed;

pub struct CollectOptions {
    pub board_url: String,
    pub target_count: usize,
    pub max_scrolls: u32,
    /// Bounded wait for pin elements to attach each pass.
    pub wait_timeout: Duration,
    /// Settle delay after each scroll (plus up to 1s of jitter).
    pub scroll_pause_secs: f64,
    /// Short randomized pause before reading a pass, so elements render.
    pub render_pause_secs: (f64, f64),
}

/// Scroll the feed and collect pins until the target is reached, the feed
/// runs out, or the scroll ceiling is hit.
///
/// Records come back in first-seen order, unique by pinterest id, never more
/// than `target_count`. A wait timeout is end of content, not an error.
pub async fn collect<F: PinFeed>(feed: &F, opts: &CollectOptions) -> Result<Vec<PinRecord>> {
    let mut records: Vec<PinRecord> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut last_height = feed.scroll_height().await?;
    let mut scroll_count = 0u32;

    info!(
        "Collecting up to {} pins from {}",
        opts.target_count, opts.board_url
    );

    while records.len() < opts.target_count {
        if !feed.wait_for_pins(opts.wait_timeout).await? {
            info!("No pin elements appeared within the wait window; end of content");
            break;
        }
        pause(opts.render_pause_secs.0, opts.render_pause_secs.1).await;

        let pins = feed.visible_pins().await?;

        // Fingerprints are only meaningful within this pass; the set is
        // rebuilt after every scroll because the page reflows.
        let mut processed: HashSet<String> = HashSet::new();
        let mut newly_collected = 0usize;

        for raw in &pins {
            if !processed.insert(raw.fingerprint.clone()) {
                continue;
            }
            let Some(record) = extract::pin_record(raw, &opts.board_url, Utc::now()) else {
                debug!(fingerprint = %raw.fingerprint, "Skipping element without a valid pin");
                continue;
            };
            if seen_ids.contains(&record.pinterest_id) {
                continue;
            }
            debug!(
                "Collected pin {} ({}/{})",
                record.pinterest_id,
                records.len() + 1,
                opts.target_count
            );
            seen_ids.insert(record.pinterest_id.clone());
            records.push(record);
            newly_collected += 1;
            if records.len() >= opts.target_count {
                break;
            }
        }

        info!(
            "Pass done: {} new, {}/{} total",
            newly_collected,
            records.len(),
            opts.target_count
        );

        if records.len() >= opts.target_count {
            info!("Target reached; stopping scroll");
            break;
        }

        feed.scroll_to_bottom().await?;
        pause(opts.scroll_pause_secs, opts.scroll_pause_secs + 1.0).await;

        let new_height = feed.scroll_height().await?;
        // Both conditions must hold: new pins can load without growing the
        // page (reflow), and the page can grow while only re-emitting
        // already-seen pins.
        if new_height == last_height && newly_collected == 0 {
            info!("Page height unchanged and no new pins; feed exhausted");
            break;
        }
        last_height = new_height;

        scroll_count += 1;
        if scroll_count >= opts.max_scrolls {
            info!("Scroll ceiling ({}) reached; stopping", opts.max_scrolls);
            break;
        }
    }

    info!("Collected {} unique pins", records.len());
    Ok(records)
}

async fn pause(min_secs: f64, max_secs: f64) {
    let secs = if max_secs > min_secs {
        rng().random_range(min_secs..max_secs)
    } else {
        min_secs
    };
    if secs > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::RawPin;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted feed: one element batch per pass, one height reading per
    /// `scroll_height` call (last value repeats when exhausted).
    struct FakeFeed {
        passes: Vec<Vec<RawPin>>,
        heights: Vec<i64>,
        pins_attach: bool,
        state: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        pass: usize,
        height_reads: usize,
    }

    impl FakeFeed {
        fn new(passes: Vec<Vec<RawPin>>, heights: Vec<i64>) -> Self {
            Self {
                passes,
                heights,
                pins_attach: true,
                state: Mutex::new(FakeState::default()),
            }
        }
    }

    #[async_trait]
    impl PinFeed for FakeFeed {
        async fn wait_for_pins(&self, _timeout: Duration) -> Result<bool> {
            Ok(self.pins_attach)
        }

        async fn visible_pins(&self) -> Result<Vec<RawPin>> {
            let state = self.state.lock().unwrap();
            let idx = state.pass.min(self.passes.len().saturating_sub(1));
            Ok(self.passes.get(idx).cloned().unwrap_or_default())
        }

        async fn scroll_to_bottom(&self) -> Result<()> {
            self.state.lock().unwrap().pass += 1;
            Ok(())
        }

        async fn scroll_height(&self) -> Result<i64> {
            let mut state = self.state.lock().unwrap();
            let idx = state.height_reads.min(self.heights.len() - 1);
            state.height_reads += 1;
            Ok(self.heights[idx])
        }
    }

    fn pin(fp: &str, id: u64) -> RawPin {
        RawPin {
            fingerprint: fp.to_string(),
            image_src: Some(format!("https://i.pinimg.com/736x/{}.jpg", id)),
            pin_href: Some(format!("/pin/{}/", id)),
            title: Some(format!("Pin {}", id)),
            description: None,
        }
    }

    fn opts(target: usize, max_scrolls: u32) -> CollectOptions {
        CollectOptions {
            board_url: "https://br.pinterest.com/feed/".into(),
            target_count: target,
            max_scrolls,
            wait_timeout: Duration::from_millis(10),
            scroll_pause_secs: 0.0,
            render_pause_secs: (0.0, 0.0),
        }
    }

    #[tokio::test]
    async fn stops_at_target_in_first_seen_order() {
        let pass = vec![pin("a", 1), pin("b", 2), pin("c", 3), pin("d", 4), pin("e", 5)];
        let feed = FakeFeed::new(vec![pass], vec![1000]);

        let records = collect(&feed, &opts(3, 200)).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.pinterest_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn exhausted_feed_returns_partial_result() {
        // Five pins, target ten. The second pass re-shows the same pins and
        // the height never grows, so the loop stops without error.
        let pass: Vec<RawPin> = (1..=5).map(|i| pin(&format!("fp{}", i), i)).collect();
        let feed = FakeFeed::new(vec![pass.clone(), pass], vec![1000]);

        let records = collect(&feed, &opts(10, 200)).await.unwrap();
        assert_eq!(records.len(), 5);
    }

    #[tokio::test]
    async fn ids_are_unique_across_passes() {
        let feed = FakeFeed::new(
            vec![
                vec![pin("a", 1), pin("b", 2)],
                vec![pin("c", 2), pin("d", 3)],
            ],
            vec![1000, 2000, 2000],
        );

        let records = collect(&feed, &opts(10, 200)).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.pinterest_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn repeated_fingerprint_is_processed_once_per_pass() {
        // Same fingerprint twice in one pass; the second occurrence points
        // at a different pin and must be skipped.
        let feed = FakeFeed::new(vec![vec![pin("same", 1), pin("same", 2)]], vec![1000]);

        let records = collect(&feed, &opts(10, 200)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pinterest_id, "1");
    }

    #[tokio::test]
    async fn height_growth_alone_keeps_the_loop_alive() {
        // Pass 2 adds nothing new but the page keeps growing; pass 3 then
        // delivers a fresh pin. Stopping requires BOTH unchanged height and
        // zero new records.
        let feed = FakeFeed::new(
            vec![
                vec![pin("a", 1), pin("b", 2)],
                vec![pin("c", 1), pin("d", 2)],
                vec![pin("e", 3)],
                vec![pin("f", 3)],
            ],
            vec![1000, 2000, 3000, 3000, 3000],
        );

        let records = collect(&feed, &opts(10, 200)).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.pinterest_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn scroll_ceiling_bounds_the_loop() {
        // Every pass has a fresh pin and the page keeps growing, so only
        // the ceiling can stop the loop.
        let passes: Vec<Vec<RawPin>> = (1..=20)
            .map(|i| vec![pin(&format!("fp{}", i), i)])
            .collect();
        let heights: Vec<i64> = (0..=21).map(|i| 1000 + i * 500).collect();
        let feed = FakeFeed::new(passes, heights);

        let records = collect(&feed, &opts(100, 3)).await.unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn wait_timeout_is_end_of_content() {
        let mut feed = FakeFeed::new(vec![vec![pin("a", 1)]], vec![1000]);
        feed.pins_attach = false;

        let records = collect(&feed, &opts(10, 200)).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn invalid_elements_are_skipped_not_fatal() {
        let mut bad = pin("bad", 9);
        bad.image_src = Some("https://tracker.example/pixel.gif".into());
        let feed = FakeFeed::new(vec![vec![bad, pin("ok", 7)]], vec![1000]);

        let records = collect(&feed, &opts(10, 200)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pinterest_id, "7");
    }

    #[tokio::test]
    async fn target_of_zero_yields_nothing() {
        // The bound holds before the first pass too: no waiting, no
        // scrolling, an empty result.
        let feed = FakeFeed::new(vec![vec![pin("a", 1)]], vec![1000]);

        let records = collect(&feed, &opts(0, 200)).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn result_never_exceeds_target() {
        let pass: Vec<RawPin> = (1..=50).map(|i| pin(&format!("fp{}", i), i)).collect();
        let feed = FakeFeed::new(vec![pass], vec![1000]);

        let records = collect(&feed, &opts(7, 200)).await.unwrap();
        assert_eq!(records.len(), 7);
    }
}
