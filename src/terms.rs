//! Search term space
//!
//! Enumerates every lowercase ASCII string of length `1..=max_length`,
//! shortest first and lexicographic within a length:
//! `a, b, ..., z, aa, ab, ..., zz, aaa, ...`.
//!
//! The sequence is lazy and deterministic, so it can be recomputed instead
//! of checkpointed. Callers materialize it once and hand each search worker
//! one half.

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Lazy iterator over the search term space
#[derive(Debug, Clone)]
pub struct SearchTerms {
    max_length: usize,
    /// Alphabet index per position of the next term, `None` once exhausted
    digits: Option<Vec<usize>>,
}

impl SearchTerms {
    /// Create an iterator over all terms up to `max_length` characters
    pub fn new(max_length: usize) -> Self {
        let digits = if max_length == 0 { None } else { Some(vec![0]) };
        Self { max_length, digits }
    }

    /// Total number of terms this iterator yields from the start
    pub fn total(max_length: usize) -> usize {
        (1..=max_length as u32)
            .map(|len| ALPHABET.len().pow(len))
            .sum()
    }

    fn advance(&mut self) {
        let Some(digits) = self.digits.as_mut() else {
            return;
        };

        for pos in (0..digits.len()).rev() {
            if digits[pos] + 1 < ALPHABET.len() {
                digits[pos] += 1;
                return;
            }
            digits[pos] = 0;
        }

        // Every position wrapped: move on to the next length
        if digits.len() < self.max_length {
            digits.push(0);
        } else {
            self.digits = None;
        }
    }
}

impl Iterator for SearchTerms {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let term = self
            .digits
            .as_ref()?
            .iter()
            .map(|&d| ALPHABET[d] as char)
            .collect();
        self.advance();
        Some(term)
    }
}

/// Split terms into two contiguous halves at `len / 2`
///
/// The split balances term count, not expected work.
pub fn split_halves(mut terms: Vec<String>) -> (Vec<String>, Vec<String>) {
    let second = terms.split_off(terms.len() / 2);
    (terms, second)
}
