//! Task and progress ledgers, and the parser for the orchestrator's
//! structured analysis.
//!
//! The orchestrator owns one [`TaskLedger`] and one [`ProgressLedger`] per
//! debate. The task ledger is append-only until the next question resets
//! it; the progress ledger tracks stalls so expert work cannot loop forever.

use serde::{Deserialize, Serialize};

use crate::persona::Role;

/// Stall count above which the debate is considered stuck.
pub const STALL_THRESHOLD: u32 = 2;

/// Known and missing facts plus the plan for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLedger {
    pub question: String,
    pub given_facts: Vec<String>,
    pub facts_to_lookup: Vec<String>,
    pub facts_to_derive: Vec<String>,
    pub educated_guesses: Vec<String>,
    pub task_plan: Vec<String>,
}

impl TaskLedger {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    /// Append every list section of `analysis`. Existing items are kept.
    pub fn absorb(&mut self, analysis: &Analysis) {
        self.given_facts.extend(analysis.given_facts.iter().cloned());
        self.facts_to_lookup
            .extend(analysis.facts_to_lookup.iter().cloned());
        self.facts_to_derive
            .extend(analysis.facts_to_derive.iter().cloned());
        self.educated_guesses
            .extend(analysis.educated_guesses.iter().cloned());
        self.task_plan.extend(analysis.task_plan.iter().cloned());
    }

    pub fn add_fact(&mut self, fact: impl Into<String>) {
        self.given_facts.push(fact.into());
    }
}

/// Completion and stall state of one debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressLedger {
    pub task_complete: bool,
    /// Total no-progress updates; unlike `stall_count` it never resets.
    pub unproductive_loops: u32,
    pub progress_being_made: bool,
    /// Empty when nobody is scheduled.
    pub next_speaker: String,
    pub next_speaker_instruction: String,
    /// Consecutive no-progress updates.
    pub stall_count: u32,
    pub completed_steps: Vec<String>,
}

impl Default for ProgressLedger {
    fn default() -> Self {
        Self {
            task_complete: false,
            unproductive_loops: 0,
            progress_being_made: true,
            next_speaker: String::new(),
            next_speaker_instruction: String::new(),
            stall_count: 0,
            completed_steps: Vec::new(),
        }
    }
}

impl ProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed step and whether it moved the task forward.
    pub fn update_progress(&mut self, step: impl Into<String>, progress_made: bool) {
        self.completed_steps.push(step.into());
        self.progress_being_made = progress_made;
        if progress_made {
            self.stall_count = 0;
        } else {
            self.stall_count += 1;
            self.unproductive_loops += 1;
        }
    }

    /// True once the debate should stop asking for more work.
    pub fn check_stall(&self) -> bool {
        self.stall_count > STALL_THRESHOLD || !self.progress_being_made
    }

    pub fn set_next_speaker(&mut self, speaker: impl Into<String>, instruction: impl Into<String>) {
        self.next_speaker = speaker.into();
        self.next_speaker_instruction = instruction.into();
    }
}

/// Parsed orchestrator analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub given_facts: Vec<String>,
    pub facts_to_lookup: Vec<String>,
    pub facts_to_derive: Vec<String>,
    pub educated_guesses: Vec<String>,
    pub task_plan: Vec<String>,
    /// `None` when the section is missing or unreadable.
    pub progress_being_made: Option<bool>,
    pub next_speaker: Option<String>,
    pub instruction: String,
    /// Recognized expert roles, in order of appearance, without duplicates.
    pub assigned_experts: Vec<Role>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    GivenFacts,
    FactsToLookup,
    FactsToDerive,
    EducatedGuesses,
    TaskPlan,
    Progress,
    NextSpeaker,
    Instruction,
    AssignedExperts,
    Reasoning,
}

impl Section {
    fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Some(match label.as_str() {
            "GIVEN_FACTS" => Self::GivenFacts,
            "FACTS_TO_LOOKUP" | "FACTS_TO_LOOK_UP" => Self::FactsToLookup,
            "FACTS_TO_DERIVE" => Self::FactsToDerive,
            "EDUCATED_GUESSES" => Self::EducatedGuesses,
            "TASK_PLAN" | "PLAN" => Self::TaskPlan,
            "PROGRESS_BEING_MADE" => Self::Progress,
            "NEXT_SPEAKER" => Self::NextSpeaker,
            "INSTRUCTION" | "NEXT_SPEAKER_INSTRUCTION" => Self::Instruction,
            "ASSIGNED_EXPERTS" => Self::AssignedExperts,
            "REASONING" => Self::Reasoning,
            _ => return None,
        })
    }

    fn is_list(self) -> bool {
        matches!(
            self,
            Self::GivenFacts
                | Self::FactsToLookup
                | Self::FactsToDerive
                | Self::EducatedGuesses
                | Self::TaskPlan
        )
    }
}

/// Split `line` into a known section label and the text after the colon.
fn section_header(line: &str) -> Option<(Section, &str)> {
    let line = line.trim_start_matches(['#', '*', ' ']);
    let (label, rest) = line.split_once(':')?;
    let section = Section::from_label(label.trim_end_matches('*'))?;
    Some((section, rest.trim_start_matches('*').trim()))
}

/// Strip a `-`, `*`, `•` or `1.`/`1)` list marker.
fn list_item(line: &str) -> Option<&str> {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

fn is_placeholder(item: &str) -> bool {
    matches!(
        item.trim().to_ascii_lowercase().as_str(),
        "" | "none" | "n/a" | "na" | "-" | "nothing"
    )
}

fn parse_flag(value: &str) -> Option<bool> {
    let word: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    match word.as_str() {
        "yes" | "true" | "y" => Some(true),
        "no" | "false" | "n" => Some(false),
        _ => None,
    }
}

/// Parse the orchestrator's labeled analysis.
///
/// Unknown labels and lines outside any section are ignored; a list
/// section accepts its inline value plus following bulleted or numbered
/// lines. Never fails.
pub fn parse_analysis(text: &str) -> Analysis {
    let mut analysis = Analysis::default();
    let mut current: Option<Section> = None;

    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }

        if let Some((section, value)) = section_header(raw) {
            current = Some(section);
            if !value.is_empty() {
                apply_value(&mut analysis, section, value);
            }
            continue;
        }

        match current {
            Some(section) if section.is_list() => {
                if let Some(item) = list_item(raw) {
                    apply_value(&mut analysis, section, item);
                }
            }
            Some(Section::Reasoning) => {
                if !analysis.reasoning.is_empty() {
                    analysis.reasoning.push(' ');
                }
                analysis.reasoning.push_str(raw.trim());
            }
            Some(Section::AssignedExperts) => {
                if let Some(item) = list_item(raw) {
                    apply_value(&mut analysis, Section::AssignedExperts, item);
                }
            }
            _ => {}
        }
    }

    analysis
}

fn apply_value(analysis: &mut Analysis, section: Section, value: &str) {
    let push = |list: &mut Vec<String>| {
        if !is_placeholder(value) {
            list.push(value.to_string());
        }
    };
    match section {
        Section::GivenFacts => push(&mut analysis.given_facts),
        Section::FactsToLookup => push(&mut analysis.facts_to_lookup),
        Section::FactsToDerive => push(&mut analysis.facts_to_derive),
        Section::EducatedGuesses => push(&mut analysis.educated_guesses),
        Section::TaskPlan => push(&mut analysis.task_plan),
        Section::Progress => analysis.progress_being_made = parse_flag(value),
        Section::NextSpeaker => {
            if !is_placeholder(value) {
                analysis.next_speaker = Some(value.to_string());
            }
        }
        Section::Instruction => analysis.instruction = value.to_string(),
        Section::Reasoning => analysis.reasoning = value.to_string(),
        Section::AssignedExperts => {
            for name in value.split([',', ';']) {
                match Role::from_name(name) {
                    Some(role) if role.is_expert() => {
                        if !analysis.assigned_experts.contains(&role) {
                            analysis.assigned_experts.push(role);
                        }
                    }
                    _ if is_placeholder(name) => {}
                    _ => tracing::debug!(name = name.trim(), "Ignoring unknown expert"),
                }
            }
        }
    }
}
