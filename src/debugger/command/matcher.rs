//! Prefix matching of command words and phrases.
//!
//! A word matches a registered word if it is a prefix of exactly one of them, or equal to one.
//! Phrases are matched word by word, the words left after a full phrase are its arguments.

use crate::debugger::error::Error;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Map of words with unambiguous prefix lookup.
#[derive(Debug, Clone)]
pub struct WordMatcher<V> {
    words: BTreeMap<String, V>,
}

impl<V> Default for WordMatcher<V> {
    fn default() -> Self {
        Self {
            words: BTreeMap::new(),
        }
    }
}

impl<V> WordMatcher<V> {
    pub fn add(&mut self, word: impl Into<String>, value: V) -> Option<V> {
        self.words.insert(word.into(), value)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    pub fn get_exact(&self, word: &str) -> Option<&V> {
        self.words.get(word)
    }

    pub fn get_exact_mut(&mut self, word: &str) -> Option<&mut V> {
        self.words.get_mut(word)
    }

    /// Value of the word equal to `prefix`, or of the single word starting with it.
    pub fn fuzzy_get(&self, prefix: &str) -> Option<&V> {
        if prefix.is_empty() {
            return None;
        }
        if let Some(value) = self.words.get(prefix) {
            return Some(value);
        }
        let mut candidates = self
            .words
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(word, _)| word.starts_with(prefix));
        match (candidates.next(), candidates.next()) {
            (Some((_, value)), None) => Some(value),
            _ => None,
        }
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.words.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.words.iter().map(|(w, v)| (w.as_str(), v))
    }
}

#[derive(Debug, Clone)]
enum Node<V> {
    Leaf(V),
    Branch(WordMatcher<Node<V>>),
}

/// Multi-word commands, each word matched by prefix.
#[derive(Debug, Clone)]
pub struct PhraseMatcher<V> {
    root: WordMatcher<Node<V>>,
}

impl<V> Default for PhraseMatcher<V> {
    fn default() -> Self {
        Self {
            root: WordMatcher::default(),
        }
    }
}

impl<V> PhraseMatcher<V> {
    /// Register a phrase. A phrase can't extend another phrase or be a prefix of one.
    pub fn add(&mut self, phrase: &str, value: V) -> Result<(), Error> {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        let Some((last, path)) = words.split_last() else {
            return Err(Error::Interpreter("empty command phrase".to_string()));
        };

        let mut level = &mut self.root;
        for word in path {
            if !level.contains(word) {
                level.add(*word, Node::Branch(WordMatcher::default()));
            }
            level = match level.get_exact_mut(word) {
                Some(Node::Branch(next)) => next,
                _ => {
                    return Err(Error::Interpreter(format!(
                        "`{phrase}` extends command `{word}`"
                    )))
                }
            };
        }

        if level.contains(last) {
            return Err(Error::Interpreter(format!("`{phrase}` already registered")));
        }
        level.add(*last, Node::Leaf(value));
        Ok(())
    }

    /// Match leading words of `text`, return the value with the remaining words.
    pub fn fuzzy_get<'a>(&self, text: &'a str) -> Option<(&V, Vec<&'a str>)> {
        let mut words = text.split_whitespace();
        let mut level = &self.root;
        loop {
            match level.fuzzy_get(words.next()?)? {
                Node::Leaf(value) => return Some((value, words.collect())),
                Node::Branch(next) => level = next,
            }
        }
    }

    /// Every registered phrase with its value.
    pub fn phrases(&self) -> Vec<(String, &V)> {
        fn collect<'m, V>(
            level: &'m WordMatcher<Node<V>>,
            prefix: &str,
            out: &mut Vec<(String, &'m V)>,
        ) {
            for (word, node) in level.iter() {
                let phrase = if prefix.is_empty() {
                    word.to_string()
                } else {
                    format!("{prefix} {word}")
                };
                match node {
                    Node::Leaf(value) => out.push((phrase, value)),
                    Node::Branch(next) => collect(next, &phrase, out),
                }
            }
        }

        let mut out = vec![];
        collect(&self.root, "", &mut out);
        out
    }
}
