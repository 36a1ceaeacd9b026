//! Role table: every agent's persona, resolved at construction time.

use serde::{Deserialize, Serialize};

use crate::extract::ANSWER_FORMAT;
use crate::protocol::AgentId;

/// Enumerated agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Breaks problems down step by step.
    MethodicalSolver,
    /// Looks for alternative solution paths.
    CreativeSolver,
    /// Focuses on precision and double-checks.
    DetailSolver,
    /// Spots patterns and shortcuts.
    IntuitiveSolver,
    /// Tracks ledgers and assigns experts.
    Orchestrator,
    GeometryExpert,
    AlgebraExpert,
    /// Fallback expert when analysis names nobody.
    GeneralExpert,
    /// Reviews expert solutions and settles the answer.
    Evaluator,
}

impl Role {
    /// Solver personas, assigned round-robin across the ring.
    pub const SOLVERS: [Role; 4] = [
        Role::MethodicalSolver,
        Role::CreativeSolver,
        Role::DetailSolver,
        Role::IntuitiveSolver,
    ];

    /// Domain experts of the pipeline workflow.
    pub const EXPERTS: [Role; 3] = [Role::GeometryExpert, Role::AlgebraExpert, Role::GeneralExpert];

    /// Persona for the solver at `index` in the roster.
    pub fn solver_for_index(index: usize) -> Role {
        Self::SOLVERS[index % Self::SOLVERS.len()]
    }

    pub fn is_solver(self) -> bool {
        Self::SOLVERS.contains(&self)
    }

    pub fn is_expert(self) -> bool {
        Self::EXPERTS.contains(&self)
    }

    /// Bus identity for singleton roles.
    pub fn agent_id(self) -> AgentId {
        AgentId::new(self.to_string())
    }

    /// Resolve a role from free text such as `GeometryExpert`,
    /// `geometry_expert` or `geometry`.
    pub fn from_name(name: &str) -> Option<Role> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "geometryexpert" | "geometry" => Some(Self::GeometryExpert),
            "algebraexpert" | "algebra" => Some(Self::AlgebraExpert),
            "generalexpert" | "general" | "arithmeticexpert" | "arithmetic" => {
                Some(Self::GeneralExpert)
            }
            "evaluator" => Some(Self::Evaluator),
            "orchestrator" => Some(Self::Orchestrator),
            "methodicalsolver" => Some(Self::MethodicalSolver),
            "creativesolver" => Some(Self::CreativeSolver),
            "detailsolver" => Some(Self::DetailSolver),
            "intuitivesolver" => Some(Self::IntuitiveSolver),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::MethodicalSolver => "You are a methodical assistant who loves to break down problems step by step. You approach math problems systematically and show all your work clearly.",
            Self::CreativeSolver => "You are a creative assistant who likes to find alternative approaches to math problems. You often think outside the box and consider multiple solution paths.",
            Self::DetailSolver => "You are a detail-oriented assistant who focuses on precision and accuracy. You double-check your work and explain your reasoning thoroughly.",
            Self::IntuitiveSolver => "You are an intuitive assistant who can quickly identify patterns and shortcuts. You balance speed with accuracy in your mathematical reasoning.",
            Self::Orchestrator => "You are the orchestrator of a team of math experts. You analyze the problem, record known facts and a plan, and decide which experts should work on it.",
            Self::GeometryExpert => "You are a geometry expert. You reason about shapes, areas, perimeters, angles and volumes with precise formulas.",
            Self::AlgebraExpert => "You are an algebra expert. You set up equations for the unknowns and solve them rigorously.",
            Self::GeneralExpert => "You are a general mathematics expert. You solve arithmetic and word problems carefully, checking every step.",
            Self::Evaluator => "You are an evaluator. You review the solutions of other experts, check their reasoning and calculations, and decide the correct final answer.",
        }
    }

    /// Full system prompt for this role.
    pub fn system_prompt(self) -> String {
        match self {
            Self::Orchestrator => format!(
                "{} Answer using the labeled sections GIVEN_FACTS, FACTS_TO_LOOKUP, FACTS_TO_DERIVE, \
                 EDUCATED_GUESSES, TASK_PLAN (one '- item' per line), then PROGRESS_BEING_MADE: yes|no, \
                 NEXT_SPEAKER:, INSTRUCTION:, ASSIGNED_EXPERTS: (comma separated, choose from \
                 GeometryExpert, AlgebraExpert, GeneralExpert) and REASONING:.",
                self.description()
            ),
            _ => format!(
                "{} Your task is to assist in solving a math reasoning problem by providing a clear \
                 and detailed solution. Limit your output within 100 words, and {} \
                 For example, 'The answer is {{{{42}}}}.'",
                self.description(),
                lowercase_first(ANSWER_FORMAT)
            ),
        }
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MethodicalSolver => write!(f, "methodical_solver"),
            Self::CreativeSolver => write!(f, "creative_solver"),
            Self::DetailSolver => write!(f, "detail_solver"),
            Self::IntuitiveSolver => write!(f, "intuitive_solver"),
            Self::Orchestrator => write!(f, "orchestrator"),
            Self::GeometryExpert => write!(f, "geometry_expert"),
            Self::AlgebraExpert => write!(f, "algebra_expert"),
            Self::GeneralExpert => write!(f, "general_expert"),
            Self::Evaluator => write!(f, "evaluator"),
        }
    }
}
