use std::collections::VecDeque;

/// The command line left to parse.
///
/// In a completion run the stream ends in the partial word under the cursor
/// instead of plain end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tokens {
    words: VecDeque<String>,
    partial: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Next {
    End,
    Word(String),
    Complete(String),
}

impl Tokens {
    pub(crate) fn new(words: Vec<String>, partial: Option<String>) -> Self {
        Self {
            words: words.into(),
            partial,
        }
    }

    pub(crate) fn next(&mut self) -> Next {
        if let Some(word) = self.words.pop_front() {
            Next::Word(word)
        } else if let Some(partial) = self.partial.take() {
            Next::Complete(partial)
        } else {
            Next::End
        }
    }

    pub(crate) fn push_front(&mut self, word: String) {
        self.words.push_front(word);
    }

    /// No words and no completion request remain.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.words.is_empty() && self.partial.is_none()
    }

    pub(crate) fn drain_words(&mut self) -> Vec<String> {
        self.words.drain(..).collect()
    }

    pub(crate) fn words(&self) -> Vec<String> {
        self.words.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_then_partial_then_end() {
        let mut tokens = Tokens::new(vec!["a".into()], Some("b".into()));
        assert!(!tokens.is_exhausted());
        assert_eq!(tokens.next(), Next::Word("a".into()));
        assert_eq!(tokens.next(), Next::Complete("b".into()));
        assert!(tokens.is_exhausted());
        assert_eq!(tokens.next(), Next::End);
    }

    #[test]
    fn draining_keeps_the_partial() {
        let mut tokens = Tokens::new(vec!["x".into(), "y".into()], Some(String::new()));
        tokens.push_front("w".into());
        assert_eq!(tokens.drain_words(), vec!["w", "x", "y"]);
        assert_eq!(tokens.next(), Next::Complete(String::new()));
    }
}
