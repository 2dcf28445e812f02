//! Log volume reduction.

use crate::budget::{estimate_tokens, CHARS_PER_TOKEN};

/// Shrinks text to fit a token ceiling. Opaque to the pipeline.
pub trait LogReducer: Send + Sync {
    /// Return `text` reduced to at most `max_tokens`. `label` names the
    /// source in any omission marker.
    fn reduce(&self, text: &str, max_tokens: u64, label: &str) -> String;
}

/// Keeps the head and tail of a log, dropping the middle.
///
/// Failures tend to surface at the end of a log, so the tail gets the
/// larger share by default.
#[derive(Debug, Clone)]
pub struct HeadTailReducer {
    head_fraction: f64,
}

impl Default for HeadTailReducer {
    fn default() -> Self {
        Self { head_fraction: 0.3 }
    }
}

impl HeadTailReducer {
    pub fn new(head_fraction: f64) -> Self {
        Self {
            head_fraction: head_fraction.clamp(0.0, 1.0),
        }
    }
}

fn take_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn last_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if n >= total {
        return text;
    }
    match text.char_indices().nth(total - n) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

impl LogReducer for HeadTailReducer {
    fn reduce(&self, text: &str, max_tokens: u64, label: &str) -> String {
        if estimate_tokens(text) <= max_tokens {
            return text.to_string();
        }

        let lines: Vec<&str> = text.lines().collect();
        let budget_chars = (max_tokens * CHARS_PER_TOKEN) as usize;
        // Reserve room for the marker using the worst-case line count.
        let marker_len = format!("\n... [{} lines omitted from {label}] ...\n", lines.len())
            .chars()
            .count();
        if budget_chars <= marker_len {
            return take_chars(text, budget_chars).to_string();
        }

        let content_chars = budget_chars - marker_len;
        let head_budget = (content_chars as f64 * self.head_fraction) as usize;
        let tail_budget = content_chars - head_budget;

        let mut head_used = 0;
        let head_count = lines
            .iter()
            .take_while(|line| {
                let cost = line.chars().count() + 1;
                if head_used + cost > head_budget {
                    return false;
                }
                head_used += cost;
                true
            })
            .count();

        let mut tail_used = 0;
        let tail_count = lines[head_count..]
            .iter()
            .rev()
            .take_while(|line| {
                let cost = line.chars().count() + 1;
                if tail_used + cost > tail_budget {
                    return false;
                }
                tail_used += cost;
                true
            })
            .count();

        if head_count == 0 && tail_count == 0 {
            // Lines too long to keep whole; cut by characters instead.
            return format!(
                "{}\n... [content truncated from {label}] ...\n{}",
                take_chars(text, head_budget),
                last_chars(text, tail_budget.saturating_sub(label.len() + 32))
            );
        }

        let omitted = lines.len() - head_count - tail_count;
        let head = lines[..head_count].join("\n");
        let tail = lines[lines.len() - tail_count..].join("\n");
        format!("{head}\n... [{omitted} lines omitted from {label}] ...\n{tail}")
    }
}
