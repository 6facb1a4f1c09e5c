//! Sentence Segmentation
//!
//! Splits AI output into display-ready units. One unit becomes one barrage.
//!
//! # Terminators
//!
//! A unit ends at (and includes) any of `。！？!?.`. A newline also ends a
//! unit but is not kept in the unit text. Text after the last terminator is
//! emitted as a final unit when it is not blank.
//!
//! # Streaming
//!
//! [`segment`] is stateless: calling it on successive streamed partials can
//! split one sentence across two units when a chunk boundary falls inside it.
//! Hosts that want whole sentences from a stream opt into [`StreamSegmenter`],
//! which carries the unterminated tail over to the next chunk.

/// Characters that close a display unit and stay in the unit text
const TERMINATORS: &[char] = &['。', '！', '？', '!', '?', '.'];

/// Returns true if `ch` closes a display unit
#[must_use]
pub fn is_terminator(ch: char) -> bool {
    ch == '\n' || TERMINATORS.contains(&ch)
}

/// Split `text` into trimmed, non-empty display units
///
/// Total over every input: empty or whitespace-only text yields no units.
#[must_use]
pub fn segment(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch != '\n' {
            current.push(ch);
        }
        if is_terminator(ch) {
            push_unit(&mut units, &current);
            current.clear();
        }
    }
    push_unit(&mut units, &current);

    units
}

fn push_unit(units: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        units.push(trimmed.to_string());
    }
}

/// Carry-over segmenter for streamed text
///
/// Emits only units that a terminator has closed and keeps the open tail
/// until more text arrives or [`finish`](Self::finish) is called.
#[derive(Debug, Default, Clone)]
pub struct StreamSegmenter {
    pending: String,
}

impl StreamSegmenter {
    /// Create an empty segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every unit it completes
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut units = Vec::new();
        for ch in chunk.chars() {
            if ch != '\n' {
                self.pending.push(ch);
            }
            if is_terminator(ch) {
                push_unit(&mut units, &self.pending);
                self.pending.clear();
            }
        }
        units
    }

    /// Flush the unterminated tail, if it is not blank
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.pending);
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Text received but not yet emitted
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_keeps_trailing_fragment() {
        assert_eq!(segment("a。b！c"), vec!["a。", "b！", "c"]);
    }

    #[test]
    fn test_segment_empty_and_blank() {
        assert!(segment("").is_empty());
        assert!(segment("   \n  ").is_empty());
        assert!(segment("\n\n\n").is_empty());
    }

    #[test]
    fn test_segment_latin_terminators() {
        assert_eq!(
            segment("Keep going! You are close. Really?"),
            vec!["Keep going!", "You are close.", "Really?"]
        );
    }

    #[test]
    fn test_segment_newline_is_dropped_from_unit() {
        assert_eq!(segment("first line\nsecond line"), vec!["first line", "second line"]);
    }

    #[test]
    fn test_segment_consecutive_terminators_drop_empty_units() {
        // "!!" produces "wow!" followed by a lone "!" unit
        assert_eq!(segment("wow!! ok"), vec!["wow!", "!", "ok"]);
        assert_eq!(segment("。。。"), vec!["。", "。", "。"]);
    }

    #[test]
    fn test_segment_is_stateless_across_partials() {
        // A chunk boundary inside a sentence yields two fragments
        let mut units = segment("You are doi");
        units.extend(segment("ng great."));
        assert_eq!(units, vec!["You are doi", "ng great."]);
    }

    #[test]
    fn test_stream_segmenter_carries_tail() {
        let mut seg = StreamSegmenter::new();
        assert!(seg.push("You are doi").is_empty());
        assert_eq!(seg.push("ng great. Keep"), vec!["You are doing great."]);
        assert_eq!(seg.pending(), " Keep");
        assert_eq!(seg.push(" it up！"), vec!["Keep it up！"]);
        assert_eq!(seg.finish(), None);
    }

    #[test]
    fn test_stream_segmenter_finish_flushes() {
        let mut seg = StreamSegmenter::new();
        seg.push("almost there");
        assert_eq!(seg.finish(), Some("almost there".to_string()));
        assert_eq!(seg.pending(), "");
    }
}
