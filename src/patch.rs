//! Answers for git's interactive patch mode.
//!
//! `git add --patch`, `git restore --staged --patch` and `git checkout --patch`
//! show a file's hunks one at a time, in file order, and read one line of
//! stdin per hunk. Two ways of answering are provided:
//!
//! - [`PromptResponder`] reads each prompt, recognises the hunk git is showing
//!   and answers `y` for the target chunk, `n` for the others, and `q` once
//!   the target has been accepted.
//! - [`encode`] precomputes the whole answer list by position, padded with
//!   extra `n` answers, for callers that can only feed stdin up front.

use crate::diff::{Chunk, HunkHeader};
use crate::parse::{parse_hunk_header, parse_prompt_line};
use std::fmt;

/// Extra `n` answers appended by [`encode`].
pub const PROMPT_PADDING: usize = 10;

/// What to do with the selected chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchIntent {
    /// Add the chunk to the index
    Stage,
    /// Remove the chunk from the index
    Unstage,
    /// Discard the chunk from the working tree
    Reset,
}

impl PatchIntent {
    /// Git subcommand and flags that present this intent's prompts.
    pub fn git_args(self) -> &'static [&'static str] {
        match self {
            PatchIntent::Stage => &["add", "--patch"],
            PatchIntent::Unstage => &["restore", "--staged", "--patch"],
            PatchIntent::Reset => &["checkout", "--patch"],
        }
    }

    fn accept(self, chunk: &Chunk) -> &'static str {
        match self {
            PatchIntent::Stage | PatchIntent::Reset => chunk.stage_string(),
            PatchIntent::Unstage => chunk.unstage_string(),
        }
    }
}

impl fmt::Display for PatchIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchIntent::Stage => "stage",
            PatchIntent::Unstage => "unstage",
            PatchIntent::Reset => "discard",
        })
    }
}

/// Precompute the answer sequence for `target` among `all_chunks`.
///
/// One answer per known chunk in file order, followed by [`PROMPT_PADDING`]
/// `n` answers in case git shows more prompts than chunks.
pub fn encode(target: &Chunk, all_chunks: &[Chunk], intent: PatchIntent) -> Vec<String> {
    encode_with_padding(target, all_chunks, intent, PROMPT_PADDING)
}

/// [`encode`] with an explicit number of padding answers.
pub fn encode_with_padding(
    target: &Chunk,
    all_chunks: &[Chunk],
    intent: PatchIntent,
    padding: usize,
) -> Vec<String> {
    all_chunks
        .iter()
        .map(|chunk| {
            if chunk.id == target.id {
                intent.accept(target)
            } else {
                "n"
            }
        })
        .chain(std::iter::repeat_n("n", padding))
        .map(String::from)
        .collect()
}

/// One interactive patch prompt read from git's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// `(k/N)` one-based position and total, when git prints it
    pub position: Option<(u32, u32)>,
    /// e.g. `Stage this hunk`, `Stage mode change`, `Discard this hunk from worktree`
    pub action: String,
    pub choices: Vec<String>,
    /// Header of the hunk displayed since the previous prompt
    pub hunk: Option<HunkHeader>,
    /// Everything git printed since the previous prompt, prompt line included
    pub display: String,
}

impl Prompt {
    /// True for prompts about a hunk, as opposed to mode changes or whole-file
    /// additions and deletions.
    pub fn is_hunk_prompt(&self) -> bool {
        self.action.ends_with("hunk") || self.action.contains("hunk ")
    }
}

/// Recognise a pending prompt at the end of git's output.
///
/// `pending` is the text git printed since the previous answer. A prompt is
/// complete when its last, unterminated line reads like
/// `(1/3) Stage this hunk [y,n,q,a,d,e,?]? `.
pub fn detect_prompt(pending: &str) -> Option<Prompt> {
    let (shown, last_line) = match pending.rfind('\n') {
        Some(i) => pending.split_at(i + 1),
        None => ("", pending),
    };
    let line = parse_prompt_line(last_line)?;

    let hunk = shown
        .lines()
        .rev()
        .find(|line| line.starts_with("@@"))
        .and_then(|line| parse_hunk_header(line).ok());

    Some(Prompt {
        position: line.position,
        action: line.action.to_string(),
        choices: line.choices.split(',').map(String::from).collect(),
        hunk,
        display: pending.to_string(),
    })
}

/// A single answer to a patch prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Quit,
}

impl Answer {
    pub fn as_str(self) -> &'static str {
        match self {
            Answer::Yes => "y",
            Answer::No => "n",
            Answer::Quit => "q",
        }
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt-by-prompt answering state for one target chunk.
///
/// The hunk git displays is matched against the target by its header ranges.
/// When git displayed no header (some prompts only show a position), the
/// `(k/N)` position is compared with the target's place among the known
/// chunks instead.
#[derive(Debug)]
pub struct PromptResponder<'a> {
    target: &'a Chunk,
    ordinal: Option<usize>,
    total: usize,
    offered: usize,
    accepted: bool,
}

impl<'a> PromptResponder<'a> {
    pub fn new(target: &'a Chunk, all_chunks: &[Chunk]) -> Self {
        Self {
            target,
            ordinal: all_chunks.iter().position(|chunk| chunk.id == target.id),
            total: all_chunks.len(),
            offered: 0,
            accepted: false,
        }
    }

    /// Decide the answer to the next prompt.
    pub fn respond(&mut self, prompt: &Prompt) -> Answer {
        self.offered += 1;
        if self.accepted {
            Answer::Quit
        } else if self.is_target(prompt) {
            self.accepted = true;
            Answer::Yes
        } else {
            Answer::No
        }
    }

    fn is_target(&self, prompt: &Prompt) -> bool {
        match &prompt.hunk {
            Some(hunk) => hunk.same_ranges(&self.target.header),
            None => {
                prompt.is_hunk_prompt()
                    && matches!(
                        (prompt.position, self.ordinal),
                        (Some((k, n)), Some(ordinal))
                            if k as usize == ordinal + 1 && n as usize == self.total
                    )
            }
        }
    }

    /// Whether the target chunk has been answered `y`.
    pub fn accepted(&self) -> bool {
        self.accepted
    }

    /// Number of prompts answered so far.
    pub fn offered(&self) -> usize {
        self.offered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::diff::FileDiff;
    use similar_asserts::assert_eq;

    const THREE_CHUNKS: &str = "diff --git a/f.txt b/f.txt\n--- a/f.txt\n+++ b/f.txt\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n@@ -10,3 +10,3 @@\n j\n-k\n+K\n l\n@@ -20,3 +20,3 @@\n t\n-u\n+U\n v\n";

    fn chunks() -> Vec<Chunk> {
        FileDiff::parse(THREE_CHUNKS).unwrap().chunks
    }

    fn prompt(position: Option<(u32, u32)>, header: &str) -> Prompt {
        let mut text = String::new();
        if !header.is_empty() {
            text.push_str(header);
            text.push_str("\n x\n");
        }
        match position {
            Some((k, n)) => text.push_str(&format!("({k}/{n}) Stage this hunk [y,n,q,a,d,e,?]? ")),
            None => text.push_str("Stage this hunk [y,n,q,a,d,e,?]? "),
        }
        detect_prompt(&text).unwrap()
    }

    #[test]
    fn encode_second_of_three() {
        let mut chunks = chunks();
        chunks[1].id = "h1".to_string();

        let answers = encode(&chunks[1], &chunks, PatchIntent::Stage);
        assert_eq!(answers[..3].to_vec(), vec!["n", "y", "n"]);
        assert!(answers[3..].iter().all(|answer| answer == "n"));
        assert_eq!(answers.len(), 3 + PROMPT_PADDING);
    }

    #[test]
    fn encode_unstage_uses_unstage_answer() {
        let chunks = chunks();
        let answers = encode_with_padding(&chunks[0], &chunks, PatchIntent::Unstage, 0);
        assert_eq!(answers, vec!["y", "n", "n"]);
    }

    #[test]
    fn encode_reset_is_positional() {
        let chunks = chunks();
        let answers = encode_with_padding(&chunks[2], &chunks, PatchIntent::Reset, 1);
        assert_eq!(answers, vec!["n", "n", "y", "n"]);
    }

    #[test]
    fn detect_prompt_reads_last_header() {
        let text = "diff --git a/f.txt b/f.txt\nindex 1..2 100644\n--- a/f.txt\n+++ b/f.txt\n@@ -10,3 +10,3 @@ fn x()\n j\n-k\n+K\n l\n(2/3) Stage this hunk [y,n,q,a,d,K,j,J,g,/,e,p,?]? ";
        let prompt = detect_prompt(text).unwrap();
        assert_eq!(prompt.position, Some((2, 3)));
        assert_eq!(prompt.action, "Stage this hunk");
        assert!(prompt.choices.contains(&"y".to_string()));
        assert_eq!(prompt.hunk.unwrap().new.start, 10);
        assert!(prompt.display.ends_with("? "));
    }

    #[test]
    fn detect_prompt_needs_complete_prompt_line() {
        assert!(detect_prompt("@@ -1 +1 @@\n-a\n+b\n").is_none());
        assert!(detect_prompt("@@ -1 +1 @@\n-a\n+b\n(1/1) Stage this hu").is_none());
    }

    #[test]
    fn mode_change_prompt_is_not_a_hunk_prompt() {
        let prompt = detect_prompt("old mode 100644\nnew mode 100755\n(1/2) Stage mode change [y,n,q,a,d,j,J,g,/,?]? ").unwrap();
        assert!(!prompt.is_hunk_prompt());
        assert!(prompt.hunk.is_none());
    }

    #[test]
    fn responder_accepts_by_header_then_quits() {
        let chunks = chunks();
        let mut responder = PromptResponder::new(&chunks[1], &chunks);

        let answers: Vec<_> = [
            prompt(Some((1, 3)), "@@ -1,3 +1,3 @@"),
            prompt(Some((2, 3)), "@@ -10,3 +10,3 @@"),
            prompt(Some((3, 3)), "@@ -20,3 +20,3 @@"),
        ]
        .iter()
        .map(|p| responder.respond(p))
        .collect();

        assert_eq!(answers, vec![Answer::No, Answer::Yes, Answer::Quit]);
        assert!(responder.accepted());
        assert_eq!(responder.offered(), 3);
    }

    #[test]
    fn responder_ignores_position_when_header_differs() {
        let chunks = chunks();
        let mut responder = PromptResponder::new(&chunks[0], &chunks);

        // git split the diff differently: same position, different region
        let answer = responder.respond(&prompt(Some((1, 3)), "@@ -2,3 +2,3 @@"));
        assert_eq!(answer, Answer::No);
        assert!(!responder.accepted());
    }

    #[test]
    fn responder_falls_back_to_position() {
        let chunks = chunks();
        let mut responder = PromptResponder::new(&chunks[2], &chunks);

        assert_eq!(responder.respond(&prompt(Some((1, 3)), "")), Answer::No);
        assert_eq!(responder.respond(&prompt(Some((2, 3)), "")), Answer::No);
        assert_eq!(responder.respond(&prompt(Some((3, 3)), "")), Answer::Yes);
    }

    #[test]
    fn responder_position_needs_matching_total() {
        let chunks = chunks();
        let mut responder = PromptResponder::new(&chunks[0], &chunks);
        assert_eq!(responder.respond(&prompt(Some((1, 4)), "")), Answer::No);
        assert_eq!(responder.respond(&prompt(None, "")), Answer::No);
    }

    #[test]
    fn intent_arguments() {
        assert_eq!(PatchIntent::Stage.git_args().to_vec(), vec!["add", "--patch"]);
        assert_eq!(
            PatchIntent::Unstage.git_args().to_vec(),
            vec!["restore", "--staged", "--patch"]
        );
        assert_eq!(PatchIntent::Reset.git_args().to_vec(), vec!["checkout", "--patch"]);
        insta::assert_snapshot!(PatchIntent::Reset.to_string(), @"discard");
    }
}
