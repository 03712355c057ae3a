//! Simulated typing for replies that arrive all at once.
//!
//! Purely cosmetic: by the time anything here runs, the full reply has
//! already been stored in the conversation.

use futures::stream::{self, Stream, StreamExt};
use std::time::Duration;

/// Delay inserted before each chunk is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Emit everything immediately
    None,
    /// Sleep for a fixed duration per chunk
    Fixed(Duration),
}

impl Pacing {
    /// Fixed pacing from a millisecond count, with 0 meaning no delay
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Pacing::None
        } else {
            Pacing::Fixed(Duration::from_millis(ms))
        }
    }

    pub async fn wait(&self) {
        if let Pacing::Fixed(delay) = self {
            tokio::time::sleep(*delay).await;
        }
    }
}

/// Word chunks of a reply, each followed by a single space
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    words: std::str::Split<'a, char>,
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.words.next().map(|word| format!("{} ", word))
    }
}

/// Split `text` on single spaces. Consecutive spaces yield empty tokens, so
/// concatenating the chunks reproduces the text plus one trailing space.
pub fn present(text: &str) -> Chunks<'_> {
    Chunks {
        words: text.split(' '),
    }
}

/// `present` with `pacing` applied before each chunk
pub fn paced(text: &str, pacing: Pacing) -> impl Stream<Item = String> + '_ {
    stream::iter(present(text)).then(move |chunk| async move {
        pacing.wait().await;
        chunk
    })
}

/// Accumulates chunks for display while a reply is being typed out
#[derive(Debug, Clone, Default)]
pub struct TypingBuffer {
    text: String,
    active: bool,
}

impl TypingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.text.clear();
        self.active = true;
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    /// Text typed so far, if a reply is being typed
    pub fn visible(&self) -> Option<&str> {
        self.active.then_some(self.text.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn finish(&mut self) {
        self.text.clear();
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_carry_trailing_space() {
        let chunks: Vec<String> = present("Hi there friend").collect();
        assert_eq!(chunks, vec!["Hi ", "there ", "friend "]);
    }

    #[test]
    fn double_spaces_produce_empty_tokens() {
        let chunks: Vec<String> = present("a  b").collect();
        assert_eq!(chunks, vec!["a ", " ", "b "]);
        assert_eq!(chunks.concat(), "a  b ");
    }

    #[test]
    fn empty_text_yields_single_space() {
        let chunks: Vec<String> = present("").collect();
        assert_eq!(chunks, vec![" "]);
    }

    #[test]
    fn each_call_starts_over() {
        let text = "one two";
        let mut first = present(text);
        first.next();
        assert_eq!(present(text).count(), 2);
        assert_eq!(first.count(), 1);
    }

    #[tokio::test]
    async fn paced_stream_without_delay_matches_present() {
        let collected: Vec<String> = paced("Hello brave new world", Pacing::None).collect().await;
        let expected: Vec<String> = present("Hello brave new world").collect();
        assert_eq!(collected, expected);
    }

    #[tokio::test]
    async fn fixed_pacing_sleeps_per_chunk() {
        let start = std::time::Instant::now();
        let collected: Vec<String> = paced("a b c", Pacing::Fixed(Duration::from_millis(5)))
            .collect()
            .await;
        assert_eq!(collected.len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn zero_millis_means_no_pacing() {
        assert_eq!(Pacing::from_millis(0), Pacing::None);
        assert_eq!(Pacing::from_millis(20), Pacing::Fixed(Duration::from_millis(20)));
    }

    #[test]
    fn typing_buffer_accumulates_until_finished() {
        let mut buffer = TypingBuffer::new();
        assert_eq!(buffer.visible(), None);

        buffer.start();
        for chunk in present("Hi there") {
            buffer.push_chunk(&chunk);
        }
        assert_eq!(buffer.visible(), Some("Hi there "));

        buffer.finish();
        assert!(!buffer.is_active());
        assert_eq!(buffer.visible(), None);
    }
}
