//! Commentary generation
//!
//! `TemplateCommentary` builds the commentator prompt for a batch of events
//! and renders a short broadcast line from it locally. A text-generation
//! backend can implement `CommentaryDispatcher` and reuse `build_prompt`.

use caster_core::{
    collaborators::RaceContext, model::strip_numbers, CommentaryDispatcher, DispatchError, Event,
};
use std::fmt::Write;
use tracing::info;

/// System prompt for the commentator persona
pub const SYSTEM_PROMPT: &str = "You are an energetic and insightful sim racing commentator.";

/// Render the user prompt for a batch of events
pub fn build_prompt(events: &[Event], context: &RaceContext) -> String {
    let mut prompt = String::from(
        "You will be provided with information about the state of a race, \
         and you will provide commentary on the event.\n\
         Prefer drivers' last names, and drop any numbers from their name if they exist.\n\
         Keep your response limited to no more than 10 words.\n",
    );

    if let Some(league) = &context.league {
        let _ = writeln!(prompt, "League: {} ({})", league.name, league.short_name);
    }
    if let Some(track) = &context.track_name {
        let _ = writeln!(prompt, "Track: {}", track);
    }
    if let Some(lap) = context.lap {
        let _ = writeln!(prompt, "Lap: {}", lap);
    }
    if !context.standings.is_empty() {
        prompt.push_str("Running order:\n");
        for s in &context.standings {
            let pit = if s.in_pits { " (pit lane)" } else { "" };
            let _ = writeln!(prompt, "  P{} #{} {}{}", s.position, s.car_number, s.name, pit);
        }
    }
    prompt.push_str("Events:\n");
    for e in events {
        let _ = writeln!(prompt, "  [{}] {}", e.kind, e.description);
    }
    prompt
}

/// Local stand-in for a text-generation backend
#[derive(Debug, Default)]
pub struct TemplateCommentary;

impl TemplateCommentary {
    pub fn new() -> Self {
        Self
    }

    /// Broadcast line for one event: shouted, numbers dropped from names
    fn call(event: &Event) -> String {
        let line = strip_numbers_keep_positions(&event.description)
            .trim_end_matches('.')
            .to_uppercase();
        format!("{line}!")
    }
}

/// Drop digits glued to words ("Berg7") but keep standalone tokens like "P3"
fn strip_numbers_keep_positions(text: &str) -> String {
    text.split_whitespace()
        .filter_map(|word| {
            let is_position = word.starts_with('P')
                && word.len() > 1
                && word.chars().skip(1).all(|c| c.is_ascii_digit());
            if is_position {
                Some(word.to_string())
            } else {
                let stripped = strip_numbers(word);
                (!stripped.is_empty()).then_some(stripped)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommentaryDispatcher for TemplateCommentary {
    fn generate(&self, events: &[Event], context: &RaceContext) -> Result<String, DispatchError> {
        if events.is_empty() {
            return Ok(String::new());
        }

        let prompt = build_prompt(events, context);
        tracing::debug!(%prompt, "Commentary prompt");

        let mut text = events.iter().map(Self::call).collect::<Vec<_>>().join(" ");
        if let Some(league) = &context.league {
            text = format!("[{}] {}", league.short_name, text);
        }
        info!("AI Commentary: {}", text);
        Ok(text)
    }
}
