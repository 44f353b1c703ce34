use crossterm::style::{Color, Stylize};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::history::MemHistory;
use rustyline::line_buffer::LineBuffer;
use rustyline::{Changeset, CompletionType, Config, Context, Editor};
use rustyline_derive::{Helper, Hinter, Validator};
use std::borrow::Cow;
use std::borrow::Cow::{Borrowed, Owned};
use std::sync::{Arc, Mutex};
use trie_rs::{Trie, TrieBuilder};

/// Completes whole command phrases: console commands and gdb commands known to the
/// interpreter.
pub struct CommandCompleter {
    phrases: Trie<u8>,
    breakpoint_ids: Vec<String>,
}

impl CommandCompleter {
    fn new(phrases: impl IntoIterator<Item = String>) -> Self {
        let mut builder = TrieBuilder::new();
        for phrase in phrases {
            builder.push(phrase);
        }
        Self {
            phrases: builder.build(),
            breakpoint_ids: vec![],
        }
    }

    pub fn replace_breakpoint_hints(&mut self, ids: impl IntoIterator<Item = u32>) {
        self.breakpoint_ids = ids.into_iter().map(|id| id.to_string()).collect();
    }
}

/// Commands whose argument is a breakpoint id.
const BREAKPOINT_ID_COMMANDS: &[&str] = &["enable ", "disable ", "delete ", "move "];

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        if let Some(cmd) = BREAKPOINT_ID_COMMANDS.iter().find(|c| line.starts_with(*c)) {
            let typed = &line[cmd.len()..];
            let pairs = self
                .breakpoint_ids
                .iter()
                .filter(|id| id.starts_with(typed))
                .map(|id| Pair {
                    display: id.clone(),
                    replacement: id.clone(),
                })
                .collect();
            return Ok((cmd.len(), pairs));
        }

        if line.trim().is_empty() {
            return Ok((0, vec![]));
        }
        let pairs = self
            .phrases
            .predictive_search(line)
            .into_iter()
            .filter_map(|v| String::from_utf8(v).ok())
            .map(|phrase| Pair {
                display: phrase.clone(),
                replacement: phrase,
            })
            .collect();
        Ok((0, pairs))
    }
}

#[derive(Helper, Hinter, Validator)]
pub struct RLHelper {
    pub completer: Arc<Mutex<CommandCompleter>>,
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    pub colored_prompt: String,
}

impl Completer for RLHelper {
    type Candidate = <CommandCompleter as Completer>::Candidate;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        match self.completer.lock() {
            Ok(completer) => completer.complete(line, pos, ctx),
            Err(_) => Ok((0, vec![])),
        }
    }

    fn update(&self, line: &mut LineBuffer, start: usize, elected: &str, cl: &mut Changeset) {
        if let Ok(completer) = self.completer.lock() {
            completer.update(line, start, elected, cl)
        }
    }
}

impl Highlighter for RLHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(format!("{}", hint.with(Color::Grey)))
    }
}

pub fn create_editor(
    prompt: &str,
    phrases: impl IntoIterator<Item = String>,
) -> anyhow::Result<Editor<RLHelper, MemHistory>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let h = RLHelper {
        completer: Arc::new(Mutex::new(CommandCompleter::new(phrases))),
        hinter: HistoryHinter {},
        colored_prompt: format!("{}", prompt.with(Color::DarkGreen)),
    };

    let mut editor = Editor::with_history(config, MemHistory::new())?;
    editor.set_helper(Some(h));
    Ok(editor)
}
