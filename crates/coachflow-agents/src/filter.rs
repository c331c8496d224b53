//! Locating existing items from free-text filters
//!
//! A filter is a list of rounds: the extracted target, then each clarifying
//! answer. A record matches when, for every round with usable words, its
//! name or data contains at least one of that round's words.

use crate::store::{render_value, EntityRecord};
use coachflow_core::{Error, Focus, Task};
use coachflow_graph::{NodeContext, NodeError};

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "one", "of", "for", "my", "please", "that", "this", "with", "and", "in",
    "on", "to", "it", "i", "mean", "meant", "is", "was", "called", "named",
];

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn haystack(record: &EntityRecord) -> String {
    let mut text = record.name.to_lowercase();
    for (k, v) in &record.data {
        text.push(' ');
        text.push_str(&k.to_lowercase());
        text.push(' ');
        text.push_str(&render_value(v).to_lowercase());
    }
    text
}

pub fn matches(record: &EntityRecord, rounds: &[String]) -> bool {
    let hay = haystack(record);
    let hay_words = words(&hay);
    rounds.iter().map(|r| words(r)).filter(|w| !w.is_empty()).all(|round| {
        round.iter().any(|w| {
            hay_words.iter().any(|h| h == w) || (w.len() > 3 && hay.contains(w.as_str()))
        })
    })
}

pub fn filter_records<'a>(records: &'a [EntityRecord], rounds: &[String]) -> Vec<&'a EntityRecord> {
    records.iter().filter(|r| matches(r, rounds)).collect()
}

/// Narrow `candidates` down to one record, asking the human when the
/// filter matches zero or several.
///
/// Several matches: the answer is added as a new round. Zero matches: the
/// answer replaces the filter. After `max_rounds` clarifying questions
/// the search fails with `NotFound`. Returns the record and the final rounds.
pub fn locate(
    ctx: &mut NodeContext,
    focus: Focus,
    candidates: &[EntityRecord],
    first_round: &str,
    max_rounds: usize,
) -> Result<(EntityRecord, Vec<String>), NodeError> {
    if candidates.is_empty() {
        return Err(Error::not_found(focus, format!("there is no {} yet", focus.label())).into());
    }

    let mut rounds = vec![first_round.to_string()];
    let mut asked = 0;
    loop {
        let found = filter_records(candidates, &rounds);
        if let [only] = found.as_slice() {
            return Ok(((*only).clone(), rounds));
        }
        if asked >= max_rounds {
            return Err(Error::not_found(
                focus,
                format!("could not tell which {} was meant: {}", focus.label(), rounds.join(" / ")),
            )
            .into());
        }

        let mut lines = Vec::new();
        let listed: Vec<&EntityRecord> = if found.is_empty() {
            lines.push(format!(
                "I couldn't find a {} matching \"{}\". These exist:",
                focus.label(),
                rounds.join(" ")
            ));
            candidates.iter().collect()
        } else {
            lines.push(format!(
                "{} {} entries match \"{}\":",
                found.len(),
                focus.label(),
                rounds.join(" ")
            ));
            found.clone()
        };
        lines.extend(listed.iter().map(|r| format!("- {}", r.summary())));
        lines.push("Which one did you mean?".into());

        let answer = ctx.interrupt(Task::Many(lines))?;
        asked += 1;
        if found.is_empty() {
            rounds = vec![answer];
        } else {
            rounds.push(answer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(id: i64, name: &str, kind: &str) -> EntityRecord {
        let mut data = Map::new();
        data.insert("kind".into(), json!(kind));
        EntityRecord {
            id,
            user_id: "u".into(),
            focus: Focus::DailyWorkout,
            parent_id: Some(1),
            name: name.into(),
            data,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn rounds_narrow_matches() {
        let records = vec![
            record(1, "Day 1", "strength"),
            record(2, "Day 2", "cardio"),
            record(3, "Day 3", "strength"),
        ];
        assert_eq!(filter_records(&records, &["day".into()]).len(), 3);
        assert_eq!(filter_records(&records, &["strength day".into()]).len(), 3);
        let narrowed = filter_records(&records, &["day".into(), "cardio".into()]);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, 2);
        let narrowed = filter_records(&records, &["strength".into(), "the 3 one".into()]);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].id, 3);
    }

    #[test]
    fn empty_rounds_match_everything() {
        let records = vec![record(1, "Day 1", "strength")];
        assert_eq!(filter_records(&records, &["".into(), "the one".into()]).len(), 1);
    }
}
