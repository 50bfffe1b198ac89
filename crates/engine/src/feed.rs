use std::path::PathBuf;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::broadcast;
use tracing::{info, warn};

use common::{MarketDataFeed, MarketEvent};

/// In-process publisher. Anything holding the feed (or a sender from it)
/// can push events; each `subscribe` gets its own receiver.
#[derive(Clone)]
pub struct BroadcastFeed {
    tx: broadcast::Sender<MarketEvent>,
}

impl BroadcastFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: MarketEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn sender(&self) -> broadcast::Sender<MarketEvent> {
        self.tx.clone()
    }
}

impl Default for BroadcastFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MarketDataFeed for BroadcastFeed {
    fn subscribe(&self) -> BoxStream<'static, MarketEvent> {
        let rx = self.tx.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(dropped = n, "Market feed subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

/// Replays newline-delimited JSON `MarketEvent`s from a file.
///
/// Blank lines are skipped; malformed lines are logged and skipped. The
/// stream ends at end of file.
#[derive(Debug, Clone)]
pub struct JsonLinesFeed {
    path: PathBuf,
}

impl JsonLinesFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

enum Replay {
    Pending(PathBuf),
    Reading { lines: Lines<BufReader<File>>, line_no: usize },
    Done,
}

impl MarketDataFeed for JsonLinesFeed {
    fn subscribe(&self) -> BoxStream<'static, MarketEvent> {
        stream::unfold(Replay::Pending(self.path.clone()), |state| async move {
            let mut state = state;
            loop {
                state = match state {
                    Replay::Pending(path) => match File::open(&path).await {
                        Ok(file) => {
                            info!(path = %path.display(), "Replaying market events");
                            Replay::Reading {
                                lines: BufReader::new(file).lines(),
                                line_no: 0,
                            }
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Cannot open market event file");
                            Replay::Done
                        }
                    },
                    Replay::Reading { mut lines, line_no } => {
                        let line_no = line_no + 1;
                        match lines.next_line().await {
                            Ok(Some(line)) if line.trim().is_empty() => Replay::Reading { lines, line_no },
                            Ok(Some(line)) => match serde_json::from_str::<MarketEvent>(&line) {
                                Ok(event) => return Some((event, Replay::Reading { lines, line_no })),
                                Err(e) => {
                                    warn!(line = line_no, error = %e, "Skipping malformed market event");
                                    Replay::Reading { lines, line_no }
                                }
                            },
                            Ok(None) => {
                                info!(lines = line_no - 1, "Market event replay finished");
                                Replay::Done
                            }
                            Err(e) => {
                                warn!(line = line_no, error = %e, "Market event replay aborted");
                                Replay::Done
                            }
                        }
                    }
                    Replay::Done => return None,
                };
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(price: f64) -> MarketEvent {
        MarketEvent::new("MNQ", price, Some(2.0), Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap())
    }

    #[tokio::test]
    async fn broadcast_subscribers_receive_published_events() {
        let feed = BroadcastFeed::new(16);
        let mut stream = feed.subscribe();
        assert_eq!(feed.publish(event(100.0)), 1);
        assert_eq!(feed.publish(event(101.0)), 1);

        assert_eq!(stream.next().await.unwrap().price, 100.0);
        assert_eq!(stream.next().await.unwrap().price, 101.0);
    }

    #[tokio::test]
    async fn broadcast_stream_ends_when_publishers_drop() {
        let feed = BroadcastFeed::new(4);
        let mut stream = feed.subscribe();
        drop(feed);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn json_lines_skip_blank_and_malformed() {
        let path = std::env::temp_dir().join(format!("orb-feed-{}.jsonl", std::process::id()));
        let body = format!(
            "{}\n\nnot json\n{}\n",
            serde_json::to_string(&event(100.0)).unwrap(),
            serde_json::to_string(&event(102.5)).unwrap()
        );
        tokio::fs::write(&path, body).await.unwrap();

        let feed = JsonLinesFeed::new(&path);
        let prices: Vec<f64> = feed.subscribe().map(|e| e.price).collect().await;
        assert_eq!(prices, vec![100.0, 102.5]);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_stream() {
        let feed = JsonLinesFeed::new("/nonexistent/events.jsonl");
        assert!(feed.subscribe().next().await.is_none());
    }

    #[test]
    fn volume_is_optional_in_json() {
        let raw = r#"{"symbol":"MNQ","price":16234.5,"timestamp":"2024-03-04T14:30:00Z"}"#;
        let ev: MarketEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(ev.volume, None);
    }
}
