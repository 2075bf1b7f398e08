/// A utility class for building simple single-pass scanners.
///
/// Basically, a wrapper over &str with nice methods that help with parsing.
#[derive(Clone, Copy)]
#[must_use]
pub(crate) struct ParserState<'s> {
    s: &'s str,
}

impl<'s> ParserState<'s> {
    /// Creates a new parser from given input string.
    pub(crate) fn new(s: &'s str) -> Self {
        Self { s }
    }

    /// Skips characters from the beginning while they satisfy given predicate
    /// and returns them together with the new parser state.
    pub(crate) fn take_while(self, mut pred: impl FnMut(char) -> bool) -> (&'s str, Self) {
        let idx = self.s.find(move |c| !pred(c)).unwrap_or(self.s.len());
        let new = Self { s: &self.s[idx..] };
        (&self.s[..idx], new)
    }

    /// Consumes a single character.
    /// Returns None if the input was parsed completely.
    pub(crate) fn next_char(self) -> Option<(char, Self)> {
        let mut chars = self.s.chars();
        let c = chars.next()?;
        Some((c, Self { s: chars.as_str() }))
    }

    /// Returns the number of remaining bytes to parse.
    pub(crate) fn get_remaining(self) -> usize {
        self.s.len()
    }

    /// Returns true if the input string was parsed completely.
    pub(crate) fn is_at_eof(self) -> bool {
        self.s.is_empty()
    }

    /// Given the original string, returns the 1-based position
    /// of the next character to parse, counted in characters.
    /// If an incorrect string was given, the function may return None.
    pub(crate) fn calculate_position(self, original: &str) -> Option<usize> {
        calculate_position(original, self.get_remaining())
    }
}

fn calculate_position(original: &str, remaining: usize) -> Option<usize> {
    let prefix_len = original.len().checked_sub(remaining)?;
    let prefix = original.get(..prefix_len)?;
    Some(prefix.chars().count() + 1)
}
