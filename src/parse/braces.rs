//! Brace expansion: `{a,b,c}` alternatives and `{from..to[..step]}` ranges.

use std::collections::VecDeque;

use super::tokenize::QuoteState;

/// Expand every brace group in `word` into the cartesian product of its variants.
///
/// Braces inside quotes or after a backslash are literal. A group with no
/// depth-0 comma and no valid range passes through unchanged, so `{x}` stays `{x}`.
/// Works from an explicit worklist; nesting depth never grows the call stack.
pub fn expand_braces(word: &str) -> Vec<String> {
    let mut pending = VecDeque::from([word.to_string()]);
    let mut out = Vec::new();

    while let Some(item) = pending.pop_front() {
        let chars: Vec<char> = item.chars().collect();
        match find_group(&chars) {
            Some((start, end, variants)) => {
                let prefix: String = chars[..start].iter().collect();
                let suffix: String = chars[end + 1..].iter().collect();
                // Front of the queue, in order, so output order follows the input.
                for v in variants.into_iter().rev() {
                    pending.push_front(format!("{prefix}{v}{suffix}"));
                }
            }
            None => out.push(item),
        }
    }
    out
}

/// Which chars of `chars` are outside quotes and escapes.
fn free_mask(chars: &[char]) -> Vec<bool> {
    let mut state = QuoteState::default();
    (0..chars.len())
        .map(|i| state.feed(chars[i], chars.get(i + 1).copied()))
        .collect()
}

/// The first brace group, by opening position, that expands.
/// Returns its `{` index, its `}` index and the variants.
fn find_group(chars: &[char]) -> Option<(usize, usize, Vec<String>)> {
    let free = free_mask(chars);
    for start in 0..chars.len() {
        if chars[start] != '{' || !free[start] {
            continue;
        }
        let Some(end) = matching_brace(chars, &free, start) else {
            continue;
        };
        if let Some(variants) = comma_variants(chars, &free, start, end) {
            return Some((start, end, variants));
        }
        let inner: String = chars[start + 1..end].iter().collect();
        if let Some(variants) = range_variants(&inner) {
            return Some((start, end, variants));
        }
    }
    None
}

fn matching_brace(chars: &[char], free: &[bool], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for i in start..chars.len() {
        if !free[i] {
            continue;
        }
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split the group body on depth-0 commas, or `None` if it has none.
fn comma_variants(chars: &[char], free: &[bool], start: usize, end: usize) -> Option<Vec<String>> {
    let mut variants = Vec::new();
    let mut cur = String::new();
    let mut depth = 0usize;
    let mut split = false;

    for i in start + 1..end {
        let c = chars[i];
        if free[i] {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    variants.push(std::mem::take(&mut cur));
                    split = true;
                    continue;
                }
                _ => {}
            }
        }
        cur.push(c);
    }
    variants.push(cur);
    split.then_some(variants)
}

/// Parse `from..to` or `from..to..step` into the inclusive sequence.
fn range_variants(inner: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = inner.split("..").collect();
    let (from, to, step) = match parts.as_slice() {
        [from, to] => (from.parse::<i64>().ok()?, to.parse::<i64>().ok()?, 1),
        [from, to, step] => (
            from.parse::<i64>().ok()?,
            to.parse::<i64>().ok()?,
            step.parse::<i64>().ok()?,
        ),
        _ => return None,
    };
    let step = step.checked_abs()?.max(1);

    let mut values = Vec::new();
    let mut v = from;
    if from <= to {
        while v <= to {
            values.push(v.to_string());
            v = v.checked_add(step)?;
        }
    } else {
        while v >= to {
            values.push(v.to_string());
            v = v.checked_sub(step)?;
        }
    }
    Some(values)
}
