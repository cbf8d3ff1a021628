// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splitting of oversized log lines.
//!
//! A line longer than the limit is halved at its midpoint, and each half is
//! split again until every piece fits. Pieces come out left to right, so
//! concatenating them gives back the original line.
//!
//! Splitting works on an explicit stack of pending pieces instead of
//! recursion. The stack never holds more than `log2(len / limit) + 2`
//! pieces.

use std::iter::FusedIterator;

use crate::constants::MAX_MESSAGE_SIZE;

/// Lazy iterator over the pieces of a split line. Cloning it restarts the
/// split from the current position.
#[derive(Debug, Clone)]
pub struct SplitMessages<'a> {
    pending: Vec<&'a str>,
    max_size: usize,
}

/// Splits `message` into pieces of at most [`MAX_MESSAGE_SIZE`] bytes.
#[must_use]
pub fn split_message(message: &str) -> SplitMessages<'_> {
    split_message_with_limit(message, MAX_MESSAGE_SIZE)
}

#[must_use]
pub fn split_message_with_limit(message: &str, max_size: usize) -> SplitMessages<'_> {
    SplitMessages {
        pending: vec![message],
        max_size,
    }
}

impl SplitMessages<'_> {
    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<'a> Iterator for SplitMessages<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(piece) = self.pending.pop() {
            if piece.len() <= self.max_size {
                return Some(piece);
            }
            let mid = char_midpoint(piece);
            if mid == 0 {
                // a single character wider than the limit
                return Some(piece);
            }
            let (left, right) = piece.split_at(mid);
            self.pending.push(right);
            self.pending.push(left);
        }
        None
    }
}

impl FusedIterator for SplitMessages<'_> {}

/// Byte midpoint, moved back to the closest character boundary, or forward
/// when the first character reaches past the midpoint. Returns 0 when `s` is
/// a single character.
fn char_midpoint(s: &str) -> usize {
    let half = s.len() / 2;
    (1..=half)
        .rev()
        .chain(half + 1..s.len())
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn generate_test_string(size: usize) -> String {
        "a".repeat(size)
    }

    #[test]
    fn test_split_empty_string() {
        let pieces: Vec<&str> = split_message("").collect();
        assert_eq!(pieces, vec![""]);
    }

    #[test]
    fn test_split_small_message() {
        let message = generate_test_string(MAX_MESSAGE_SIZE - 1);
        let pieces: Vec<&str> = split_message(&message).collect();
        assert_eq!(pieces, vec![message.as_str()]);
    }

    #[test]
    fn test_split_exact_size_message() {
        let message = generate_test_string(MAX_MESSAGE_SIZE);
        let pieces: Vec<&str> = split_message(&message).collect();
        assert_eq!(pieces, vec![message.as_str()]);
    }

    #[test]
    fn test_split_large_message() {
        let message = generate_test_string(MAX_MESSAGE_SIZE + 1);
        let pieces: Vec<&str> = split_message(&message).collect();
        assert_eq!(
            pieces,
            vec![
                &message[..MAX_MESSAGE_SIZE / 2],
                &message[MAX_MESSAGE_SIZE / 2..]
            ]
        );
    }

    #[test]
    fn test_split_keeps_left_half_first() {
        let pieces: Vec<&str> = split_message_with_limit("abcdefgh", 2).collect();
        assert_eq!(pieces, vec!["ab", "cd", "ef", "gh"]);
    }

    #[test]
    fn test_split_odd_length_halves_at_integer_midpoint() {
        let pieces: Vec<&str> = split_message_with_limit("abcde", 4).collect();
        assert_eq!(pieces, vec!["ab", "cde"]);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        // "é" is two bytes; the byte midpoint of "aéé" (5 bytes) falls inside
        // the first "é"
        let pieces: Vec<&str> = split_message_with_limit("aéé", 4).collect();
        assert_eq!(pieces, vec!["a", "éé"]);
    }

    #[test]
    fn test_split_moves_forward_past_wide_first_char() {
        // the 4-byte first character covers the midpoint of "𐀀0"
        let pieces: Vec<&str> = split_message_with_limit("𐀀0¡A  ", 4).collect();
        assert_eq!(pieces, vec!["𐀀", "0", "¡", "A  "]);
    }

    #[test]
    fn test_split_single_wide_char_is_kept_whole() {
        let pieces: Vec<&str> = split_message_with_limit("𐀀", 2).collect();
        assert_eq!(pieces, vec!["𐀀"]);
    }

    #[test]
    fn test_split_is_restartable() {
        let split = split_message_with_limit("abcdefgh", 2);
        let first: Vec<&str> = split.clone().collect();
        let second: Vec<&str> = split.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_split_stack_depth_is_logarithmic() {
        let message = generate_test_string(1 << 16);
        let mut split = split_message_with_limit(&message, 1);
        let mut max_pending = 0;
        let mut count = 0;
        while split.next().is_some() {
            max_pending = max_pending.max(split.pending_len());
            count += 1;
        }
        assert_eq!(count, 1 << 16);
        assert!(max_pending <= 17, "stack grew to {max_pending}");
    }

    proptest! {
        #[test]
        fn prop_split_reconstructs_and_bounds(message in ".{0,400}", max_size in 4usize..64) {
            let pieces: Vec<&str> = split_message_with_limit(&message, max_size).collect();
            prop_assert_eq!(pieces.concat(), message.as_str());
            for piece in pieces {
                prop_assert!(piece.len() <= max_size);
            }
        }
    }
}
