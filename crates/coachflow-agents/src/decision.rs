//! Classifying short human answers

/// Answer to a yes/no question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
    Unclear,
}

/// Answer to "would you like to make any edits?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditChoice {
    /// Nothing to change.
    Done,
    /// Throw the draft away and generate a new one.
    Regenerate,
    /// Anything else is an edit instruction.
    Edit,
}

const YES: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "confirm", "go ahead", "do it", "please do",
    "absolutely", "save", "save it", "sounds good",
];
const NO: &[&str] = &[
    "no", "n", "nope", "nah", "cancel", "don't", "do not", "stop", "never mind", "not now",
];
const DONE: &[&str] = &[
    "no", "n", "nope", "none", "no edits", "no changes", "looks good", "all good", "done",
    "that's fine", "it's fine", "fine", "perfect", "good", "nothing",
];
const REGENERATE: &[&str] = &["regenerate", "start over", "redo", "try again", "new one"];

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!'])
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keyword classification: an exact phrase, or a phrase followed by more
/// words ("yes please", "no thanks").
fn matches_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        text == *p
            || text
                .strip_prefix(p)
                .is_some_and(|rest| rest.starts_with([' ', ',']))
    })
}

pub fn classify(answer: &str) -> Decision {
    let text = normalize(answer);
    if matches_any(&text, NO) {
        Decision::No
    } else if matches_any(&text, YES) {
        Decision::Yes
    } else {
        Decision::Unclear
    }
}

pub fn classify_edit_choice(answer: &str) -> EditChoice {
    let text = normalize(answer);
    if text.is_empty() || DONE.contains(&text.as_str()) {
        EditChoice::Done
    } else if REGENERATE.iter().any(|p| text.contains(p)) {
        EditChoice::Regenerate
    } else {
        EditChoice::Edit
    }
}
