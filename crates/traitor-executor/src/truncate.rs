//! Per-line output truncation.
//!
//! A script can print a single enormous line (a minified JSON blob, a binary
//! dumped to stdout). Lines over the configured limit are shortened with
//! middle-omission so both the start and the end survive in the debug view.

use std::collections::VecDeque;

/// Characters reserved for the omission marker itself.
const MARKER_RESERVE: usize = 40;

/// Worst-case UTF-8 width, used to size byte buffers from a char budget.
const MAX_CHAR_BYTES: usize = 4;

/// Shorten `line` to roughly `max_chars` characters.
///
/// Lines within budget are returned unchanged. Longer lines become
///
/// ```text
/// <head> ... [OUTPUT TRUNCATED: N chars omitted] ... <tail>
/// ```
///
/// Splitting happens on `char` boundaries, never inside a UTF-8 sequence.
pub fn truncate_output(line: &str, max_chars: usize) -> String {
    if line.len() <= max_chars {
        return line.to_owned();
    }

    let total = line.chars().count();
    if total <= max_chars {
        return line.to_owned();
    }

    let (head_len, tail_len) = split_budget(max_chars);
    let omitted = total - head_len - tail_len;

    let head: String = line.chars().take(head_len).collect();
    let tail: String = line.chars().skip(total - tail_len).collect();

    marked(&head, omitted, &tail)
}

fn split_budget(max_chars: usize) -> (usize, usize) {
    let keep = max_chars.saturating_sub(MARKER_RESERVE).max(2);
    let head_len = keep / 2;
    (head_len, keep - head_len)
}

fn marked(head: &str, omitted: usize, tail: &str) -> String {
    format!("{head} ... [OUTPUT TRUNCATED: {omitted} chars omitted] ... {tail}")
}

/// Accumulates one line of raw process output in bounded memory.
///
/// The first and last few KiB of the line are kept; everything in between
/// is only counted. A script printing gigabytes without a newline costs a
/// fixed amount of memory.
#[derive(Debug)]
pub struct LineBuffer {
    max_chars: usize,
    cap: usize,
    head: Vec<u8>,
    tail: VecDeque<u8>,
    /// Chars dropped between `head` and `tail`.
    dropped: usize,
}

impl LineBuffer {
    pub fn new(max_chars: usize) -> Self {
        let cap = max_chars.saturating_mul(MAX_CHAR_BYTES).max(64);
        Self {
            max_chars,
            cap,
            head: Vec::new(),
            tail: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    /// Bytes currently held; never more than twice the per-end cap.
    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        let room = self.cap - self.head.len();
        let (front, rest) = bytes.split_at(room.min(bytes.len()));
        self.head.extend_from_slice(front);

        if rest.len() >= self.cap {
            // Only the last `cap` bytes can survive; count the rest.
            let (gone, keep) = rest.split_at(rest.len() - self.cap);
            self.dropped += self.tail.iter().filter(|b| is_char_start(**b)).count();
            self.dropped += gone.iter().filter(|b| is_char_start(**b)).count();
            self.tail.clear();
            self.tail.extend(keep);
            return;
        }
        for &b in rest {
            if self.tail.len() == self.cap {
                if let Some(old) = self.tail.pop_front() {
                    if is_char_start(old) {
                        self.dropped += 1;
                    }
                }
            }
            self.tail.push_back(b);
        }
    }

    /// Finish the current line: strip ANSI escapes and apply the char
    /// budget. The buffer is left empty for the next line.
    pub fn take(&mut self) -> String {
        let mut head = std::mem::take(&mut self.head);
        let mut tail: Vec<u8> = self.tail.drain(..).collect();
        let dropped = std::mem::take(&mut self.dropped);

        let last = if tail.is_empty() { &mut head } else { &mut tail };
        if last.last() == Some(&b'\r') {
            last.pop();
        }

        if dropped == 0 {
            head.extend_from_slice(&tail);
            return truncate_output(&strip_text(&head), self.max_chars);
        }

        let head = strip_text(&head);
        let tail = strip_text(&tail);
        let (head_len, tail_len) = split_budget(self.max_chars);
        let head_total = head.chars().count();
        let tail_total = tail.chars().count();
        let head_keep = head_len.min(head_total);
        let tail_keep = tail_len.min(tail_total);

        let kept_head: String = head.chars().take(head_keep).collect();
        let kept_tail: String = tail.chars().skip(tail_total - tail_keep).collect();
        let omitted = (head_total - head_keep) + dropped + (tail_total - tail_keep);
        marked(&kept_head, omitted, &kept_tail)
    }
}

fn is_char_start(b: u8) -> bool {
    b & 0xC0 != 0x80
}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_line_untouched() {
        assert_eq!(truncate_output("hello", 100), "hello");
        assert_eq!(truncate_output("", 100), "");
    }

    #[test]
    fn line_at_limit_untouched() {
        let s = "x".repeat(100);
        assert_eq!(truncate_output(&s, 100), s);
    }

    #[test]
    fn long_line_keeps_both_ends() {
        let input = format!("{}{}{}", "A".repeat(100), "B".repeat(1_000), "C".repeat(100));
        let out = truncate_output(&input, 200);

        assert!(out.starts_with('A'));
        assert!(out.ends_with('C'));
        assert!(out.contains("OUTPUT TRUNCATED"));
        assert!(out.contains("1040 chars omitted"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn multibyte_chars_are_not_split() {
        // 3 bytes each, so the byte length alone exceeds the limit.
        let s = "€".repeat(50);
        assert_eq!(truncate_output(&s, 100), s);

        let long = "€".repeat(500);
        let out = truncate_output(&long, 100);
        assert!(out.starts_with('€'));
        assert!(out.ends_with('€'));
    }

    #[test]
    fn line_buffer_short_line_passes_through() {
        let mut buf = LineBuffer::new(100);
        buf.push(b"\x1b[31mred\x1b[0m\r");
        assert_eq!(buf.take(), "red");
        assert!(buf.is_empty());
    }

    #[test]
    fn line_buffer_memory_stays_bounded() {
        let mut buf = LineBuffer::new(100);
        let block = [b'a'; 4096];
        for _ in 0..2_500 {
            buf.push(&block);
            assert!(buf.buffered() <= 2 * 400);
        }
        buf.push(b"END");

        let out = buf.take();
        // 30 head chars and 30 tail chars survive out of 10_240_003.
        assert!(out.starts_with(&"a".repeat(30)));
        assert!(out.ends_with("END"));
        assert!(out.contains("10239943 chars omitted"), "{out}");
        assert!(out.chars().count() < 150);
        assert_eq!(buf.buffered(), 0);
    }

    #[test]
    fn line_buffer_matches_plain_truncation_when_nothing_dropped() {
        let line = format!("{}{}", "x".repeat(300), "y".repeat(300));
        let mut buf = LineBuffer::new(100);
        buf.push(line.as_bytes());
        assert_eq!(buf.take(), truncate_output(&line, 100));
    }

    #[test]
    fn tiny_budget_still_produces_marker() {
        let out = truncate_output(&"z".repeat(50), 10);
        assert!(out.starts_with('z'));
        assert!(out.contains("48 chars omitted"));
    }
}
